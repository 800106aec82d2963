//! Chromium-driven page sessions.
//!
//! Implements the `PageDriver` seam with chromiumoxide (CDP). The session is
//! authenticated by injecting cookies from a JSON file before any
//! navigation; failing to load them aborts startup.

mod config;
#[cfg(feature = "browser")]
mod cookies;

pub use config::BrowserEngineConfig;

#[cfg(feature = "browser")]
use std::time::Duration;

use anyhow::Result;
#[cfg(feature = "browser")]
use anyhow::Context;
use async_trait::async_trait;
#[cfg(feature = "browser")]
use chromiumoxide::{Browser, BrowserConfig, Page};
#[cfg(feature = "browser")]
use futures::StreamExt;
#[cfg(feature = "browser")]
use tracing::{info, warn};

use crate::traits::PageDriver;

/// One scroll step, in CSS pixels. Matches a mouse-wheel flick; larger jumps
/// make the feed skip rendering intermediate batches.
#[cfg(feature = "browser")]
const SCROLL_STEP_PX: u32 = 1500;

/// Poll interval while waiting for a selector.
#[cfg(feature = "browser")]
const SELECTOR_POLL: Duration = Duration::from_millis(250);

/// Anchors whose href marks a post permalink.
#[cfg(feature = "browser")]
const COLLECT_POST_LINKS_JS: &str = r#"() => {
    const links = [];
    document.querySelectorAll('a[href*="/post/"]').forEach(a => {
        links.push(a.href);
    });
    return links;
}"#;

/// An authenticated browser session driving a single page.
#[cfg(feature = "browser")]
pub struct BrowserSession {
    // Kept alive for the lifetime of the session; dropping it closes Chrome.
    _browser: Browser,
    page: Page,
    navigation_timeout: Duration,
}

#[cfg(feature = "browser")]
impl BrowserSession {
    /// Common Chrome executable paths to check.
    const CHROME_PATHS: &'static [&'static str] = &[
        // Linux
        "/usr/bin/google-chrome",
        "/usr/bin/google-chrome-stable",
        "/usr/bin/chromium",
        "/usr/bin/chromium-browser",
        "/snap/bin/chromium",
        // macOS
        "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        "/Applications/Chromium.app/Contents/MacOS/Chromium",
        // Common install locations
        "/opt/google/chrome/google-chrome",
    ];

    /// Launch (or connect to) a browser and open a page with the session
    /// cookies applied.
    pub async fn launch(config: &BrowserEngineConfig) -> Result<Self> {
        let browser = match &config.remote_url {
            Some(url) => Self::connect_remote(url, config).await?,
            None => Self::launch_local(config).await?,
        };

        let page = browser
            .new_page("about:blank")
            .await
            .context("failed to open a page")?;

        match &config.cookies_file {
            Some(path) => cookies::load_cookies(&page, path).await?,
            None => warn!("no cookie file configured; running an unauthenticated session"),
        }

        Ok(Self {
            _browser: browser,
            page,
            navigation_timeout: config.navigation_timeout(),
        })
    }

    async fn launch_local(config: &BrowserEngineConfig) -> Result<Browser> {
        info!("launching browser (headless={})", config.headless);

        let chrome_path = Self::find_chrome()?;
        let mut builder = BrowserConfig::builder().chrome_executable(chrome_path);

        // with_head means NOT headless, confusingly
        if !config.headless {
            builder = builder.with_head();
        }

        if let Some(ref proxy) = config.proxy {
            builder = builder.arg(format!("--proxy-server={}", proxy));
        }

        builder = builder
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-infobars")
            .arg("--disable-dev-shm-usage")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--disable-background-networking")
            .arg("--disable-sync")
            .arg("--no-sandbox") // Often needed for headless in containers
            .arg("--disable-gpu");

        for arg in &config.chrome_args {
            builder = builder.arg(arg);
        }

        let browser_config = builder
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build browser config: {}", e))?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .context("failed to launch browser")?;

        tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if h.is_err() {
                    break;
                }
            }
        });

        Ok(browser)
    }

    /// Connect to a remote Chrome instance via its DevTools endpoint.
    async fn connect_remote(url: &str, config: &BrowserEngineConfig) -> Result<Browser> {
        info!("connecting to remote browser at {}", url);

        // Get the WebSocket URL from the /json/version endpoint
        let http_url = url
            .replace("ws://", "http://")
            .replace("wss://", "https://");
        let version_url = format!("{}/json/version", http_url.trim_end_matches('/'));

        let client = reqwest::Client::new();
        let resp: serde_json::Value = client
            .get(&version_url)
            .send()
            .await
            .context("failed to reach remote browser")?
            .json()
            .await
            .context("failed to parse browser version info")?;

        let ws_url = resp
            .get("webSocketDebuggerUrl")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("no webSocketDebuggerUrl in response"))?;

        let handler_config = chromiumoxide::handler::HandlerConfig {
            request_timeout: Duration::from_secs(config.timeout),
            ..Default::default()
        };

        let (browser, mut handler) = Browser::connect_with_config(ws_url, handler_config)
            .await
            .context("failed to connect to remote browser")?;

        tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if h.is_err() {
                    break;
                }
            }
        });

        Ok(browser)
    }

    /// Find a Chrome executable on common paths or in PATH.
    fn find_chrome() -> Result<std::path::PathBuf> {
        for path in Self::CHROME_PATHS {
            let p = std::path::Path::new(path);
            if p.exists() {
                info!("found Chrome at: {}", path);
                return Ok(p.to_path_buf());
            }
        }

        for cmd in &[
            "google-chrome",
            "google-chrome-stable",
            "chromium",
            "chromium-browser",
        ] {
            if let Ok(output) = std::process::Command::new("which").arg(cmd).output() {
                if output.status.success() {
                    let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
                    if !path.is_empty() {
                        info!("found Chrome in PATH: {}", path);
                        return Ok(std::path::PathBuf::from(path));
                    }
                }
            }
        }

        Err(anyhow::anyhow!(
            "Chrome/Chromium not found. Install it, or point remote_url at a running instance"
        ))
    }
}

#[cfg(feature = "browser")]
#[async_trait]
impl PageDriver for BrowserSession {
    async fn navigate(&self, url: &str) -> Result<()> {
        tokio::time::timeout(self.navigation_timeout, self.page.goto(url))
            .await
            .map_err(|_| anyhow::anyhow!("navigation to {url} timed out"))?
            .with_context(|| format!("navigation to {url} failed"))?;
        Ok(())
    }

    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.page.find_element(selector).await.is_ok() {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(SELECTOR_POLL).await;
        }
    }

    async fn scroll_once(&self) -> Result<()> {
        self.page
            .evaluate(format!("window.scrollBy(0, {SCROLL_STEP_PX})"))
            .await
            .context("scroll step failed")?;
        Ok(())
    }

    async fn visible_post_links(&self) -> Result<Vec<String>> {
        let links: Vec<String> = self
            .page
            .evaluate(COLLECT_POST_LINKS_JS)
            .await
            .context("link collection failed")?
            .into_value()
            .context("link collection returned non-string data")?;
        Ok(links)
    }

    async fn markup(&self) -> Result<String> {
        self.page
            .content()
            .await
            .context("could not read page content")
    }
}

// Stub for when the browser feature is disabled
#[cfg(not(feature = "browser"))]
pub struct BrowserSession;

#[cfg(not(feature = "browser"))]
impl BrowserSession {
    pub async fn launch(_config: &BrowserEngineConfig) -> Result<Self> {
        Err(anyhow::anyhow!(
            "browser support not compiled. Rebuild with: cargo build --features browser"
        ))
    }
}

#[cfg(not(feature = "browser"))]
#[async_trait]
impl PageDriver for BrowserSession {
    async fn navigate(&self, _url: &str) -> Result<()> {
        Err(anyhow::anyhow!("browser support not compiled"))
    }

    async fn wait_for_selector(&self, _selector: &str, _timeout: std::time::Duration) -> bool {
        false
    }

    async fn scroll_once(&self) -> Result<()> {
        Err(anyhow::anyhow!("browser support not compiled"))
    }

    async fn visible_post_links(&self) -> Result<Vec<String>> {
        Err(anyhow::anyhow!("browser support not compiled"))
    }

    async fn markup(&self) -> Result<String> {
        Err(anyhow::anyhow!("browser support not compiled"))
    }
}
