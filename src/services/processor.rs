//! Phase 2: drain pending tasks, fetch each post and extract its text.
//!
//! One processor owns the queue. Claiming is a plain read of some pending
//! row, which is only safe because nothing else processes concurrently;
//! a second instance would double-fetch the same posts.

use rand::Rng;
use tracing::{error, info, warn};

use crate::config::ProcessConfig;
use crate::models::TaskStatus;
use crate::repository::TaskRepository;
use crate::retry::RetryPolicy;
use crate::traits::{ContentExtractor, PageDriver};

/// Tally of one processing run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessSummary {
    /// Tasks claimed and attempted.
    pub attempted: u64,
    /// Attempts that stored content.
    pub succeeded: u64,
    /// Failures returned to the queue with budget left.
    pub retried: u64,
    /// Failures that exhausted the retry budget.
    pub exhausted: u64,
}

/// Works through the pending queue one task at a time.
pub struct Processor<'a, D: PageDriver, E: ContentExtractor> {
    store: &'a TaskRepository,
    driver: &'a D,
    extractor: &'a E,
    config: ProcessConfig,
    policy: RetryPolicy,
}

impl<'a, D: PageDriver, E: ContentExtractor> Processor<'a, D, E> {
    pub fn new(
        store: &'a TaskRepository,
        driver: &'a D,
        extractor: &'a E,
        config: ProcessConfig,
    ) -> Self {
        let policy = RetryPolicy::new(config.max_retries);
        Self {
            store,
            driver,
            extractor,
            config,
            policy,
        }
    }

    /// Claim and attempt tasks until the queue drains or `limit` is hit.
    ///
    /// A failed attempt never aborts the run; the failure is recorded on the
    /// task and the loop moves on. Only store errors propagate.
    pub async fn run(&self, limit: Option<u64>) -> anyhow::Result<ProcessSummary> {
        let mut summary = ProcessSummary::default();

        loop {
            if let Some(limit) = limit {
                if summary.attempted >= limit {
                    info!(limit, "attempt limit reached, stopping");
                    break;
                }
            }
            let Some(link) = self.store.claim_pending_task().await? else {
                info!("pending queue drained");
                break;
            };
            summary.attempted += 1;
            info!(link = %link, attempt = summary.attempted, "processing task");

            match self.attempt(&link).await {
                Ok(content) => {
                    self.store.mark_success(&link, &content).await?;
                    summary.succeeded += 1;
                    info!(link = %link, chars = content.len(), "content stored");
                }
                Err(err) => {
                    let reason = first_line(&err.to_string());
                    let decision = self
                        .store
                        .mark_failure(&link, &reason, self.policy)
                        .await?;
                    match decision.status {
                        TaskStatus::PermanentFailure => {
                            summary.exhausted += 1;
                            error!(
                                link = %link,
                                retries = decision.retry_count,
                                reason = %reason,
                                "task abandoned after exhausting retries"
                            );
                        }
                        _ => {
                            summary.retried += 1;
                            warn!(
                                link = %link,
                                retries = decision.retry_count,
                                reason = %reason,
                                "attempt failed, task returned to queue"
                            );
                        }
                    }
                }
            }

            let stats = self.store.stats_by_status().await?;
            let at = |status: TaskStatus| stats.get(&status).copied().unwrap_or(0);
            info!(
                pending = at(TaskStatus::Pending),
                succeeded = at(TaskStatus::Success),
                failed = at(TaskStatus::PermanentFailure),
                "queue progress"
            );

            self.pause().await;
        }

        info!(
            attempted = summary.attempted,
            succeeded = summary.succeeded,
            retried = summary.retried,
            exhausted = summary.exhausted,
            "processing run finished"
        );
        Ok(summary)
    }

    /// One fetch-and-extract attempt against a single post.
    async fn attempt(&self, link: &str) -> anyhow::Result<String> {
        self.driver.navigate(link).await?;

        let found = self
            .driver
            .wait_for_selector(&self.config.content_selector, self.config.selector_timeout())
            .await;
        if !found {
            // The page may still have rendered under a shifted class name;
            // let the extractor make the final call.
            warn!(link = %link, "content container did not appear in time");
        }

        let markup = self.driver.markup().await?;
        match self.extractor.extract(&markup) {
            Some(content) => Ok(content),
            None => anyhow::bail!("no post content found in page"),
        }
    }

    /// Randomized pause between tasks. Pacing against the remote site, not
    /// backoff; it runs after successes too.
    async fn pause(&self) {
        let min = self.config.pause_min_secs.max(0.0);
        let max = self.config.pause_max_secs.max(min);
        if max <= 0.0 {
            return;
        }
        let secs = rand::rng().random_range(min..=max);
        tokio::time::sleep(std::time::Duration::from_secs_f64(secs)).await;
    }
}

/// Error logs hold one line per task; multi-line chains keep only the head.
fn first_line(message: &str) -> String {
    message.lines().next().unwrap_or_default().trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::time::Duration;

    use async_trait::async_trait;
    use tempfile::TempDir;

    use crate::repository::SqlitePool;

    /// Serves canned markup per URL. Navigation to an unknown URL fails the
    /// way a dead host would; `markup` returns the body of the last page
    /// successfully navigated to.
    struct CannedSite {
        pages: HashMap<String, String>,
        current: std::sync::Mutex<Option<String>>,
        selector_visible: bool,
    }

    impl CannedSite {
        fn new(pages: &[(&str, &str)]) -> Self {
            Self {
                pages: pages
                    .iter()
                    .map(|(url, body)| (url.to_string(), body.to_string()))
                    .collect(),
                current: std::sync::Mutex::new(None),
                selector_visible: true,
            }
        }

        /// Same site, but the selector wait always times out, as when the
        /// platform rotates its class names out from under the config.
        fn with_hidden_selector(mut self) -> Self {
            self.selector_visible = false;
            self
        }
    }

    #[async_trait]
    impl PageDriver for CannedSite {
        async fn navigate(&self, url: &str) -> anyhow::Result<()> {
            if !self.pages.contains_key(url) {
                anyhow::bail!("net::ERR_NAME_NOT_RESOLVED\ncaused by: dns lookup failed");
            }
            *self.current.lock().unwrap() = Some(url.to_string());
            Ok(())
        }

        async fn wait_for_selector(&self, _selector: &str, _timeout: Duration) -> bool {
            self.selector_visible
        }

        async fn scroll_once(&self) -> anyhow::Result<()> {
            Ok(())
        }

        async fn visible_post_links(&self) -> anyhow::Result<Vec<String>> {
            Ok(Vec::new())
        }

        async fn markup(&self) -> anyhow::Result<String> {
            let current = self.current.lock().unwrap();
            let url = current.as_deref().unwrap_or_default();
            Ok(self.pages.get(url).cloned().unwrap_or_default())
        }
    }

    /// Extractor keyed on a marker prefix instead of real selectors.
    struct MarkerExtractor;

    impl ContentExtractor for MarkerExtractor {
        fn extract(&self, markup: &str) -> Option<String> {
            markup
                .strip_prefix("CONTENT:")
                .map(str::trim)
                .filter(|text| !text.is_empty())
                .map(String::from)
        }
    }

    async fn repository_with(dir: &TempDir, links: &[&str]) -> TaskRepository {
        let pool = SqlitePool::from_path(&dir.path().join("process.db"));
        let repo = TaskRepository::new(pool);
        repo.initialize().await.unwrap();
        let links: Vec<String> = links.iter().map(|l| l.to_string()).collect();
        repo.insert_links(&links, "rust").await.unwrap();
        repo
    }

    fn quick_config(max_retries: u32) -> ProcessConfig {
        ProcessConfig {
            max_retries,
            pause_min_secs: 0.0,
            pause_max_secs: 0.0,
            ..ProcessConfig::default()
        }
    }

    #[tokio::test]
    async fn stores_extracted_content_and_drains_the_queue() {
        let dir = TempDir::new().unwrap();
        let link = "https://www.threads.com/@a/post/1";
        let repo = repository_with(&dir, &[link]).await;
        let site = CannedSite::new(&[(link, "CONTENT: hello from the feed")]);

        let processor = Processor::new(&repo, &site, &MarkerExtractor, quick_config(3));
        let summary = processor.run(None).await.unwrap();

        assert_eq!(summary.attempted, 1);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.retried, 0);

        let task = repo.get_task(link).await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Success);
        assert_eq!(task.content.as_deref(), Some("hello from the feed"));
    }

    #[tokio::test]
    async fn selector_timeout_does_not_fail_an_extractable_page() {
        let dir = TempDir::new().unwrap();
        let link = "https://www.threads.com/@a/post/1";
        let repo = repository_with(&dir, &[link]).await;
        let site =
            CannedSite::new(&[(link, "CONTENT: still here")]).with_hidden_selector();

        let processor = Processor::new(&repo, &site, &MarkerExtractor, quick_config(3));
        let summary = processor.run(None).await.unwrap();

        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.retried, 0);
        let task = repo.get_task(link).await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Success);
        assert_eq!(task.content.as_deref(), Some("still here"));
    }

    #[tokio::test]
    async fn missing_content_burns_retries_then_abandons() {
        let dir = TempDir::new().unwrap();
        let link = "https://www.threads.com/@a/post/1";
        let repo = repository_with(&dir, &[link]).await;
        // The page loads but carries nothing the extractor recognizes.
        let site = CannedSite::new(&[(link, "<html><body>gone</body></html>")]);

        let processor = Processor::new(&repo, &site, &MarkerExtractor, quick_config(3));
        let summary = processor.run(None).await.unwrap();

        assert_eq!(summary.attempted, 3);
        assert_eq!(summary.retried, 2);
        assert_eq!(summary.exhausted, 1);
        assert_eq!(summary.succeeded, 0);

        let task = repo.get_task(link).await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::PermanentFailure);
        assert_eq!(task.retry_count, 3);
        assert_eq!(
            task.error_log.as_deref(),
            Some("no post content found in page")
        );
    }

    #[tokio::test]
    async fn navigation_errors_record_only_the_first_line() {
        let dir = TempDir::new().unwrap();
        let link = "https://www.threads.com/@a/post/404";
        let repo = repository_with(&dir, &[link]).await;
        let site = CannedSite::new(&[]);

        let processor = Processor::new(&repo, &site, &MarkerExtractor, quick_config(1));
        let summary = processor.run(None).await.unwrap();

        assert_eq!(summary.exhausted, 1);
        let task = repo.get_task(link).await.unwrap().unwrap();
        assert_eq!(task.error_log.as_deref(), Some("net::ERR_NAME_NOT_RESOLVED"));
    }

    #[tokio::test]
    async fn limit_caps_the_number_of_attempts() {
        let dir = TempDir::new().unwrap();
        let links = [
            "https://www.threads.com/@a/post/1",
            "https://www.threads.com/@a/post/2",
            "https://www.threads.com/@a/post/3",
        ];
        let repo = repository_with(&dir, &links).await;
        let site = CannedSite::new(&[
            (links[0], "CONTENT: one"),
            (links[1], "CONTENT: two"),
            (links[2], "CONTENT: three"),
        ]);

        let processor = Processor::new(&repo, &site, &MarkerExtractor, quick_config(3));
        let summary = processor.run(Some(2)).await.unwrap();

        assert_eq!(summary.attempted, 2);
        assert_eq!(summary.succeeded, 2);
        // The third task is still waiting for the next run.
        assert!(repo.claim_pending_task().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn empty_queue_is_a_clean_noop() {
        let dir = TempDir::new().unwrap();
        let repo = repository_with(&dir, &[]).await;
        let site = CannedSite::new(&[]);

        let processor = Processor::new(&repo, &site, &MarkerExtractor, quick_config(3));
        let summary = processor.run(None).await.unwrap();

        assert_eq!(summary, ProcessSummary::default());
    }

    #[test]
    fn first_line_trims_error_chains() {
        assert_eq!(first_line("timeout\ncaused by: slow dns"), "timeout");
        assert_eq!(first_line("  spaced  "), "spaced");
        assert_eq!(first_line(""), "");
    }
}
