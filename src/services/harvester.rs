//! Phase 1: scroll a search feed and bank every post link it surfaces.
//!
//! The harvester only discovers work. It never opens individual posts;
//! banked links sit at pending until the processor drains them.

use std::collections::HashSet;

use tracing::{debug, info, warn};

use crate::config::HarvestConfig;
use crate::repository::TaskRepository;
use crate::traits::PageDriver;

/// Links whose path carries this fragment are galleries, not posts.
const MEDIA_LINK_FRAGMENT: &str = "/media";

/// Why a harvest run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarvestOutcome {
    /// The store already held at least the target count; nothing was scrolled.
    AlreadySatisfied,
    /// The stored total reached the configured target during this run.
    TargetReached,
    /// Consecutive zero-growth flushes hit the stability threshold.
    FeedExhausted,
}

/// Result of one harvest run.
#[derive(Debug, Clone, Copy)]
pub struct HarvestReport {
    pub outcome: HarvestOutcome,
    /// Links stored for this keyword across all runs, after this one.
    pub total: u64,
    /// Links this run added.
    pub newly_stored: u64,
}

/// Scrolls one feed and flushes discovered links into the task store.
pub struct Harvester<'a, D: PageDriver> {
    store: &'a TaskRepository,
    driver: &'a D,
    config: HarvestConfig,
    keyword: String,
}

impl<'a, D: PageDriver> Harvester<'a, D> {
    pub fn new(
        store: &'a TaskRepository,
        driver: &'a D,
        config: HarvestConfig,
        keyword: impl Into<String>,
    ) -> Self {
        Self {
            store,
            driver,
            config,
            keyword: keyword.into(),
        }
    }

    /// Run the scroll loop until the target is met or the feed stops growing.
    ///
    /// Every batch is flushed as soon as it fills, so an interrupted run keeps
    /// everything flushed up to that point. The in-memory buffer is the only
    /// loss window.
    pub async fn run(&self) -> anyhow::Result<HarvestReport> {
        let mut total = self.store.count_by_keyword(&self.keyword).await?;
        if total >= self.config.target_count {
            info!(
                keyword = %self.keyword,
                total,
                target = self.config.target_count,
                "target already satisfied, skipping harvest"
            );
            return Ok(HarvestReport {
                outcome: HarvestOutcome::AlreadySatisfied,
                total,
                newly_stored: 0,
            });
        }

        let feed_url = self.config.feed_url_for(&self.keyword);
        info!(keyword = %self.keyword, url = %feed_url, "opening search feed");
        self.driver.navigate(&feed_url).await?;

        if let Some(selector) = &self.config.feed_ready_selector {
            let ready = self
                .driver
                .wait_for_selector(selector, self.config.feed_ready_timeout())
                .await;
            if !ready {
                warn!(selector = %selector, "feed readiness marker never appeared, scrolling anyway");
            }
        }

        let mut buffer: Vec<String> = Vec::new();
        let mut newly_stored = 0u64;

        // On an error path the buffer may still hold admitted links; bank
        // what we can before surfacing the original failure.
        let outcome = match self
            .scroll_until_stable(total, &mut buffer, &mut newly_stored)
            .await
        {
            Ok(outcome) => outcome,
            Err(err) => {
                if let Err(flush_err) = self.flush(&mut buffer).await {
                    warn!(error = %flush_err, "final flush failed after harvest error");
                }
                return Err(err);
            }
        };

        total = self.store.count_by_keyword(&self.keyword).await?;
        info!(
            keyword = %self.keyword,
            total,
            newly_stored,
            ?outcome,
            "harvest run finished"
        );
        Ok(HarvestReport {
            outcome,
            total,
            newly_stored,
        })
    }

    /// The scroll loop proper. Breaks when the target is met or the feed
    /// stops growing; I/O errors propagate with the buffer left intact for
    /// the caller to salvage.
    async fn scroll_until_stable(
        &self,
        mut total: u64,
        buffer: &mut Vec<String>,
        newly_stored: &mut u64,
    ) -> anyhow::Result<HarvestOutcome> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut zero_growth_flushes = 0u32;

        loop {
            self.driver.scroll_once().await?;
            tokio::time::sleep(self.config.scroll_pause()).await;

            let links = self.driver.visible_post_links().await?;
            let fresh = self.admit_links(links, &mut seen, buffer);
            debug!(fresh, buffered = buffer.len(), "scroll cycle complete");

            // A full buffer flushes for the target check; a barren cycle
            // flushes (possibly nothing) so the stability counter can see it.
            if buffer.len() < self.config.batch_size && fresh > 0 {
                continue;
            }

            let stored = self.flush(buffer).await?;
            *newly_stored += stored;
            total += stored;

            if stored > 0 {
                zero_growth_flushes = 0;
            } else {
                zero_growth_flushes += 1;
                info!(
                    streak = zero_growth_flushes,
                    threshold = self.config.stability_threshold,
                    "flush added nothing new"
                );
                if zero_growth_flushes >= self.config.stability_threshold {
                    return Ok(HarvestOutcome::FeedExhausted);
                }
            }

            if total >= self.config.target_count {
                return Ok(HarvestOutcome::TargetReached);
            }
        }
    }

    /// Filter one scrape of visible links into the buffer.
    ///
    /// Returns how many were unseen this run. Media gallery links and
    /// unparsable URLs are dropped outright.
    fn admit_links(
        &self,
        links: Vec<String>,
        seen: &mut HashSet<String>,
        buffer: &mut Vec<String>,
    ) -> usize {
        let mut fresh = 0;
        for link in links {
            if link.contains(MEDIA_LINK_FRAGMENT) {
                continue;
            }
            if url::Url::parse(&link).is_err() {
                debug!(link = %link, "dropping malformed post link");
                continue;
            }
            if seen.insert(link.clone()) {
                buffer.push(link);
                fresh += 1;
            }
        }
        fresh
    }

    /// Drain the buffer into the store; returns how many rows were new.
    async fn flush(&self, buffer: &mut Vec<String>) -> anyhow::Result<u64> {
        if buffer.is_empty() {
            return Ok(0);
        }
        let batch = std::mem::take(buffer);
        let stored = self.store.insert_links(&batch, &self.keyword).await?;
        info!(
            flushed = batch.len(),
            stored, "flushed link batch to store"
        );
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use tempfile::TempDir;

    use crate::repository::SqlitePool;

    /// Page driver that serves scripted link batches, one per scroll cycle.
    /// Once the script runs out it repeats the final batch, which is how a
    /// real feed looks after it stops loading new results.
    struct ScriptedFeed {
        batches: Vec<Vec<String>>,
        scrolls: AtomicUsize,
        ready_marker_visible: bool,
    }

    impl ScriptedFeed {
        fn new(batches: Vec<Vec<&str>>) -> Self {
            Self {
                batches: batches
                    .into_iter()
                    .map(|batch| batch.into_iter().map(String::from).collect())
                    .collect(),
                scrolls: AtomicUsize::new(0),
                ready_marker_visible: true,
            }
        }

        /// Same feed, but the readiness marker never renders.
        fn without_ready_marker(mut self) -> Self {
            self.ready_marker_visible = false;
            self
        }

        fn scroll_count(&self) -> usize {
            self.scrolls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PageDriver for ScriptedFeed {
        async fn navigate(&self, _url: &str) -> anyhow::Result<()> {
            Ok(())
        }

        async fn wait_for_selector(&self, _selector: &str, _timeout: Duration) -> bool {
            self.ready_marker_visible
        }

        async fn scroll_once(&self) -> anyhow::Result<()> {
            self.scrolls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn visible_post_links(&self) -> anyhow::Result<Vec<String>> {
            let cycle = self.scrolls.load(Ordering::SeqCst).saturating_sub(1);
            let index = cycle.min(self.batches.len().saturating_sub(1));
            Ok(self.batches.get(index).cloned().unwrap_or_default())
        }

        async fn markup(&self) -> anyhow::Result<String> {
            Ok(String::new())
        }
    }

    /// Driver that must never be touched; used to prove early exits.
    struct UntouchableDriver;

    #[async_trait]
    impl PageDriver for UntouchableDriver {
        async fn navigate(&self, _url: &str) -> anyhow::Result<()> {
            panic!("driver used despite satisfied target");
        }

        async fn wait_for_selector(&self, _selector: &str, _timeout: Duration) -> bool {
            panic!("driver used despite satisfied target");
        }

        async fn scroll_once(&self) -> anyhow::Result<()> {
            panic!("driver used despite satisfied target");
        }

        async fn visible_post_links(&self) -> anyhow::Result<Vec<String>> {
            panic!("driver used despite satisfied target");
        }

        async fn markup(&self) -> anyhow::Result<String> {
            panic!("driver used despite satisfied target");
        }
    }

    /// Driver whose navigation always fails.
    struct DeadDriver;

    #[async_trait]
    impl PageDriver for DeadDriver {
        async fn navigate(&self, _url: &str) -> anyhow::Result<()> {
            anyhow::bail!("net::ERR_CONNECTION_RESET")
        }

        async fn wait_for_selector(&self, _selector: &str, _timeout: Duration) -> bool {
            false
        }

        async fn scroll_once(&self) -> anyhow::Result<()> {
            Ok(())
        }

        async fn visible_post_links(&self) -> anyhow::Result<Vec<String>> {
            Ok(Vec::new())
        }

        async fn markup(&self) -> anyhow::Result<String> {
            Ok(String::new())
        }
    }

    async fn repository(dir: &TempDir) -> TaskRepository {
        let pool = SqlitePool::from_path(&dir.path().join("harvest.db"));
        let repo = TaskRepository::new(pool);
        repo.initialize().await.unwrap();
        repo
    }

    fn config(target: u64, batch: usize, threshold: u32) -> HarvestConfig {
        HarvestConfig {
            target_count: target,
            batch_size: batch,
            scroll_pause_secs: 0.0,
            stability_threshold: threshold,
            ..HarvestConfig::default()
        }
    }

    fn post(id: u32) -> String {
        format!("https://www.threads.com/@user/post/{id}")
    }

    #[tokio::test]
    async fn stops_after_threshold_zero_growth_flushes() {
        let dir = TempDir::new().unwrap();
        let repo = repository(&dir).await;
        // Two real batches, then the feed freezes on the second one.
        let feed = ScriptedFeed::new(vec![
            vec!["https://www.threads.com/@a/post/1"],
            vec![
                "https://www.threads.com/@a/post/1",
                "https://www.threads.com/@b/post/2",
            ],
        ]);
        let harvester = Harvester::new(&repo, &feed, config(100, 1, 3), "rust");

        let report = harvester.run().await.unwrap();

        assert_eq!(report.outcome, HarvestOutcome::FeedExhausted);
        assert_eq!(report.total, 2);
        assert_eq!(report.newly_stored, 2);
        // Two productive cycles, then exactly three barren ones.
        assert_eq!(feed.scroll_count(), 5);
    }

    #[tokio::test]
    async fn links_already_stored_count_as_zero_growth() {
        let dir = TempDir::new().unwrap();
        let repo = repository(&dir).await;
        repo.insert_links(&[post(1), post(2)], "rust").await.unwrap();

        // The feed only ever shows links a previous run already banked, so
        // every flush comes back empty and the stability rule fires.
        let feed = ScriptedFeed::new(vec![vec![
            "https://www.threads.com/@user/post/1",
            "https://www.threads.com/@user/post/2",
        ]]);
        let harvester = Harvester::new(&repo, &feed, config(100, 2, 2), "rust");

        let report = harvester.run().await.unwrap();

        assert_eq!(report.outcome, HarvestOutcome::FeedExhausted);
        assert_eq!(report.newly_stored, 0);
        assert_eq!(report.total, 2);
    }

    #[tokio::test]
    async fn missing_ready_marker_does_not_abort_the_run() {
        let dir = TempDir::new().unwrap();
        let repo = repository(&dir).await;
        let feed = ScriptedFeed::new(vec![vec!["https://www.threads.com/@a/post/1"]])
            .without_ready_marker();
        let harvest_config = HarvestConfig {
            feed_ready_selector: Some("div[role=\"main\"]".to_string()),
            ..config(100, 1, 2)
        };
        let harvester = Harvester::new(&repo, &feed, harvest_config, "rust");

        let report = harvester.run().await.unwrap();

        assert_eq!(report.outcome, HarvestOutcome::FeedExhausted);
        assert_eq!(report.newly_stored, 1);
        assert_eq!(report.total, 1);
    }

    #[tokio::test]
    async fn satisfied_target_skips_the_browser_entirely() {
        let dir = TempDir::new().unwrap();
        let repo = repository(&dir).await;
        repo.insert_links(&[post(1), post(2), post(3)], "rust")
            .await
            .unwrap();

        let harvester = Harvester::new(&repo, &UntouchableDriver, config(3, 10, 3), "rust");
        let report = harvester.run().await.unwrap();

        assert_eq!(report.outcome, HarvestOutcome::AlreadySatisfied);
        assert_eq!(report.total, 3);
        assert_eq!(report.newly_stored, 0);
    }

    #[tokio::test]
    async fn stops_once_the_target_is_reached() {
        let dir = TempDir::new().unwrap();
        let repo = repository(&dir).await;
        let feed = ScriptedFeed::new(vec![
            vec![
                "https://www.threads.com/@a/post/1",
                "https://www.threads.com/@a/post/2",
            ],
            vec![
                "https://www.threads.com/@a/post/3",
                "https://www.threads.com/@a/post/4",
            ],
            vec![
                "https://www.threads.com/@a/post/5",
                "https://www.threads.com/@a/post/6",
            ],
        ]);
        let harvester = Harvester::new(&repo, &feed, config(3, 2, 5), "rust");

        let report = harvester.run().await.unwrap();

        assert_eq!(report.outcome, HarvestOutcome::TargetReached);
        assert!(report.total >= 3);
        assert_eq!(repo.count_by_keyword("rust").await.unwrap(), report.total);
    }

    #[tokio::test]
    async fn media_and_malformed_links_never_reach_the_store() {
        let dir = TempDir::new().unwrap();
        let repo = repository(&dir).await;
        let feed = ScriptedFeed::new(vec![vec![
            "https://www.threads.com/@a/post/1",
            "https://www.threads.com/@a/post/1/media",
            "not a url at all",
        ]]);
        let harvester = Harvester::new(&repo, &feed, config(100, 1, 1), "rust");

        let report = harvester.run().await.unwrap();

        assert_eq!(report.total, 1);
        let task = repo
            .get_task("https://www.threads.com/@a/post/1")
            .await
            .unwrap();
        assert!(task.is_some());
    }

    #[tokio::test]
    async fn navigation_failure_is_fatal() {
        let dir = TempDir::new().unwrap();
        let repo = repository(&dir).await;
        let harvester = Harvester::new(&repo, &DeadDriver, config(100, 10, 3), "rust");

        let err = harvester.run().await.unwrap_err();
        assert!(err.to_string().contains("ERR_CONNECTION_RESET"));
        assert_eq!(repo.count_by_keyword("rust").await.unwrap(), 0);
    }
}
