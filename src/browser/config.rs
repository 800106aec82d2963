//! Browser engine configuration types.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Browser engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BrowserEngineConfig {
    /// Run in headless mode (default: true).
    /// Set to false for debugging or if headless detection is an issue.
    pub headless: bool,

    /// Path to the JSON cookie file holding the authenticated session.
    /// Harvesting an authenticated feed without it will see little content.
    pub cookies_file: Option<PathBuf>,

    /// Proxy server URL (e.g., "socks5://127.0.0.1:1080").
    pub proxy: Option<String>,

    /// CDP request timeout in seconds.
    pub timeout: u64,

    /// Page navigation timeout in seconds.
    pub navigation_timeout_secs: u64,

    /// Additional Chrome arguments.
    pub chrome_args: Vec<String>,

    /// Remote Chrome DevTools URL (e.g., "ws://localhost:9222").
    /// If set, connects to an existing browser instead of launching one.
    pub remote_url: Option<String>,
}

impl Default for BrowserEngineConfig {
    fn default() -> Self {
        Self {
            headless: true,
            cookies_file: None,
            proxy: None,
            timeout: 30,
            navigation_timeout_secs: 60,
            chrome_args: Vec::new(),
            remote_url: None,
        }
    }
}

impl BrowserEngineConfig {
    pub fn navigation_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.navigation_timeout_secs)
    }
}
