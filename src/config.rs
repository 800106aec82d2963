//! Runtime configuration: defaults, TOML overlay, environment overrides.
//!
//! There are no process-wide globals; everything the services need arrives
//! through these structs.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::browser::BrowserEngineConfig;

/// Config file looked up in the data directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILENAME: &str = "threadharvest.toml";

/// Default database filename inside the data directory.
pub const DEFAULT_DATABASE_FILENAME: &str = "threadharvest.db";

/// Parent container of a post's text content. Threads class chains are
/// generated; this is the stable-enough combination observed in the wild.
pub const DEFAULT_CONTENT_SELECTOR: &str =
    "div.x1n2onr6.x1f9n5g.x17dsfyh.xzzag5r.x1losyl9.xsag5q8.x1iorvi4.x1sqbtui";

/// Class fragment of the spans carrying the post body inside the container.
pub const DEFAULT_CONTENT_SPAN_CLASS: &str =
    "x1lliihq x1plvlek xryxfnj x1n2onr6 xyejjpt x15dsfln xi7mnp6 x193iq5w xeuugli";

/// Top-level settings, merged from defaults, the TOML file and environment.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Base data directory.
    pub data_dir: PathBuf,
    /// Database filename inside the data directory.
    pub database_filename: String,
    pub harvest: HarvestConfig,
    pub process: ProcessConfig,
    pub browser: BrowserEngineConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("."),
            database_filename: DEFAULT_DATABASE_FILENAME.to_string(),
            harvest: HarvestConfig::default(),
            process: ProcessConfig::default(),
            browser: BrowserEngineConfig::default(),
        }
    }
}

impl Settings {
    /// Load settings: defaults, overlaid by the TOML file when present,
    /// overlaid by explicit CLI overrides.
    pub fn load(config_path: Option<&Path>, data_dir: Option<&Path>) -> anyhow::Result<Self> {
        let path = config_path.map(Path::to_path_buf).or_else(|| {
            let dir = data_dir.unwrap_or(Path::new("."));
            let candidate = dir.join(DEFAULT_CONFIG_FILENAME);
            candidate.exists().then_some(candidate)
        });

        let mut settings = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(&path).map_err(|e| {
                    anyhow::anyhow!("could not read config file {}: {e}", path.display())
                })?;
                toml::from_str(&raw).map_err(|e| {
                    anyhow::anyhow!("could not parse config file {}: {e}", path.display())
                })?
            }
            None => Settings::default(),
        };

        if let Some(dir) = data_dir {
            settings.data_dir = dir.to_path_buf();
        }

        Ok(settings)
    }

    /// Path of the task database. `THREADHARVEST_DB` overrides the
    /// configured location.
    pub fn database_path(&self) -> PathBuf {
        if let Ok(url) = std::env::var("THREADHARVEST_DB") {
            if !url.is_empty() {
                let path = url.strip_prefix("sqlite:").unwrap_or(&url);
                return PathBuf::from(path);
            }
        }
        self.data_dir.join(&self.database_filename)
    }
}

/// Phase 1 knobs: feed discovery and the stability stop rule.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HarvestConfig {
    /// Search keyword that tags discovered links.
    pub keyword: Option<String>,
    /// Feed entry URL; synthesized from the keyword when unset.
    pub feed_url: Option<String>,
    /// Total link count to stop at.
    pub target_count: u64,
    /// Links buffered before a database flush.
    pub batch_size: usize,
    /// Settle time after each scroll step.
    pub scroll_pause_secs: f64,
    /// Consecutive zero-growth flushes before the feed counts as exhausted.
    pub stability_threshold: u32,
    /// Selector that signals the feed has rendered. Waiting on it is best
    /// effort; a timeout is logged and scrolling proceeds.
    pub feed_ready_selector: Option<String>,
    pub feed_ready_timeout_secs: u64,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            keyword: None,
            feed_url: None,
            target_count: 1000,
            batch_size: 100,
            scroll_pause_secs: 5.0,
            stability_threshold: 10,
            feed_ready_selector: None,
            feed_ready_timeout_secs: 15,
        }
    }
}

impl HarvestConfig {
    pub fn scroll_pause(&self) -> Duration {
        Duration::from_secs_f64(self.scroll_pause_secs.max(0.0))
    }

    pub fn feed_ready_timeout(&self) -> Duration {
        Duration::from_secs(self.feed_ready_timeout_secs)
    }

    /// Feed entry URL for `keyword`, preferring an explicit configuration.
    pub fn feed_url_for(&self, keyword: &str) -> String {
        self.feed_url.clone().unwrap_or_else(|| {
            format!(
                "https://www.threads.com/search?q={}&serp_type=default",
                urlencoding::encode(keyword)
            )
        })
    }
}

/// Phase 2 knobs: retry budget, pacing and extraction anchors.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessConfig {
    /// Failed attempts before a task becomes a permanent failure.
    pub max_retries: u32,
    /// Randomized inter-task pause bounds, in seconds. Pacing, not backoff.
    pub pause_min_secs: f64,
    pub pause_max_secs: f64,
    /// Parent container selector passed through to the extractor.
    pub content_selector: String,
    /// Class fragment of the content spans inside the container.
    pub content_span_class: String,
    /// Bounded wait for the content container; non-fatal on timeout.
    pub selector_timeout_secs: u64,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            pause_min_secs: 3.0,
            pause_max_secs: 8.0,
            content_selector: DEFAULT_CONTENT_SELECTOR.to_string(),
            content_span_class: DEFAULT_CONTENT_SPAN_CLASS.to_string(),
            selector_timeout_secs: 10,
        }
    }
}

impl ProcessConfig {
    pub fn selector_timeout(&self) -> Duration {
        Duration::from_secs(self.selector_timeout_secs)
    }
}
