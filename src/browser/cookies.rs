//! Session cookie loading.

use std::path::Path;

use anyhow::Context;
use chromiumoxide::cdp::browser_protocol::network::CookieParam;
use chromiumoxide::Page;
use tracing::{info, warn};

/// Load cookies from a JSON file into the page's browser context.
///
/// The file is the credential source for the whole run: an unreadable or
/// empty file is an error (startup aborts), while individual malformed
/// entries are skipped with a warning.
pub(crate) async fn load_cookies(page: &Page, path: &Path) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("could not read cookie file {}", path.display()))?;
    let cookies: Vec<serde_json::Value> = serde_json::from_str(&content)
        .with_context(|| format!("cookie file {} is not a JSON array", path.display()))?;

    let mut applied = 0usize;
    for cookie in cookies {
        let name = cookie
            .get("name")
            .or_else(|| cookie.get("key"))
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        let value = cookie
            .get("value")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        let domain = cookie
            .get("domain")
            .and_then(|v| v.as_str())
            .unwrap_or_default();

        if name.is_empty() || domain.is_empty() {
            continue;
        }

        let param = CookieParam::builder()
            .name(name)
            .value(value)
            .domain(domain)
            .build();

        match param {
            Ok(param) => match page.set_cookie(param).await {
                Ok(_) => applied += 1,
                Err(e) => warn!(cookie = name, error = %e, "failed to set cookie"),
            },
            Err(e) => warn!(cookie = name, error = %e, "failed to build cookie"),
        }
    }

    if applied == 0 {
        anyhow::bail!("no usable cookies in {}", path.display());
    }

    info!(applied, "session cookies loaded");
    Ok(())
}
