//! Interfaces to the browser and extraction collaborators.
//!
//! The harvesting core never talks to Chrome directly; it drives these
//! seams, which keeps both services testable against scripted fakes.

use std::time::Duration;

use async_trait::async_trait;

/// Driver for one rendered page inside an authenticated browser session.
///
/// Successive `visible_post_links` reads overlap as the feed re-renders;
/// deduplication is the caller's job, not the driver's.
#[async_trait]
pub trait PageDriver {
    /// Navigate the session to `url` and wait for the initial document load.
    async fn navigate(&self, url: &str) -> anyhow::Result<()>;

    /// Wait until `selector` matches something, up to `timeout`.
    ///
    /// A timeout yields `false` rather than an error; callers decide whether
    /// a missing element matters.
    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> bool;

    /// Trigger one scroll step on the current page.
    async fn scroll_once(&self) -> anyhow::Result<()>;

    /// Post links currently rendered on the page.
    async fn visible_post_links(&self) -> anyhow::Result<Vec<String>>;

    /// Raw markup of the current page.
    async fn markup(&self) -> anyhow::Result<String>;
}

/// Extracts post text from raw markup.
///
/// `None` means no content could be located; it never fails on well-formed
/// input.
pub trait ContentExtractor {
    fn extract(&self, markup: &str) -> Option<String>;
}
