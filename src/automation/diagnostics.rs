//! Best-effort failure screenshots.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::automation::driver::PageDriver;

/// Save a screenshot named after `tag` into `dir`.
///
/// Never fails: a missing directory setting, a driver error or a write
/// error are logged and swallowed.
pub async fn capture(driver: &dyn PageDriver, dir: Option<&Path>, tag: &str) -> Option<PathBuf> {
    let dir = dir?;
    let bytes = match driver.screenshot().await {
        Ok(b) => b,
        Err(e) => {
            warn!(tag, "Diagnostic screenshot failed: {}", e);
            return None;
        }
    };
    let safe_tag: String = tag
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    let path = dir.join(format!(
        "{}-{}.png",
        chrono::Utc::now().format("%Y%m%dT%H%M%S%.3f"),
        safe_tag
    ));
    let write = async {
        tokio::fs::create_dir_all(dir).await?;
        tokio::fs::write(&path, &bytes).await
    };
    match write.await {
        Ok(()) => {
            debug!(path = %path.display(), "Saved diagnostic screenshot");
            Some(path)
        }
        Err(e) => {
            warn!(path = %path.display(), "Could not write diagnostic screenshot: {}", e);
            None
        }
    }
}
