//! Headless Chromium sessions for the live backend.

use crate::error::ExtractError;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Environment variable naming an explicit Chromium binary.
pub const CHROMIUM_PATH_ENV: &str = "GLEANER_CHROMIUM_PATH";

/// Binaries looked up on `PATH`, in order of preference.
const PATH_BINARIES: &[&str] = &["google-chrome", "chromium", "chromium-browser"];

/// Installed browser locations relative to `~/.gleaner/chromium`.
#[cfg(target_os = "macos")]
const LOCAL_INSTALLS: &[&str] = &[
    "chrome-mac-arm64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing",
    "chrome-mac-x64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing",
    "chrome",
];
#[cfg(not(target_os = "macos"))]
const LOCAL_INSTALLS: &[&str] = &["chrome-linux64/chrome", "chrome"];

#[cfg(target_os = "macos")]
const SYSTEM_INSTALLS: &[&str] = &["/Applications/Google Chrome.app/Contents/MacOS/Google Chrome"];
#[cfg(not(target_os = "macos"))]
const SYSTEM_INSTALLS: &[&str] = &[];

/// Locate a Chromium binary: `GLEANER_CHROMIUM_PATH`, then a local install
/// under `~/.gleaner/chromium`, then `PATH`, then well-known system paths.
pub fn find_chromium() -> Option<PathBuf> {
    let explicit = std::env::var_os(CHROMIUM_PATH_ENV).map(PathBuf::from);
    let local = dirs::home_dir()
        .map(|home| home.join(".gleaner").join("chromium"))
        .into_iter()
        .flat_map(|root| LOCAL_INSTALLS.iter().map(move |rel| root.join(rel)));

    explicit
        .into_iter()
        .chain(local)
        .find(|path| path.exists())
        .or_else(|| PATH_BINARIES.iter().find_map(|name| which::which(name).ok()))
        .or_else(|| {
            SYSTEM_INSTALLS
                .iter()
                .map(PathBuf::from)
                .find(|path| path.exists())
        })
}

/// One headless browser shared by many sessions (tabs).
pub struct BrowserPool {
    browser: Browser,
    handler: JoinHandle<()>,
    active: Arc<AtomicUsize>,
}

impl BrowserPool {
    /// Launch headless Chromium.
    pub async fn launch() -> Result<Self, ExtractError> {
        let chrome_path = find_chromium().ok_or_else(|| {
            ExtractError::SessionAcquisition(format!(
                "Chromium not found; set {CHROMIUM_PATH_ENV} or put it on PATH"
            ))
        })?;

        let config = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--disable-background-networking")
            .build()
            .map_err(|e| {
                ExtractError::SessionAcquisition(format!("failed to build browser config: {e}"))
            })?;

        let (browser, mut handler) = Browser::launch(config).await.map_err(|e| {
            ExtractError::SessionAcquisition(format!("failed to launch Chromium: {e}"))
        })?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!(error = %e, "browser handler error");
                }
            }
        });

        Ok(Self {
            browser,
            handler,
            active: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Open a new tab.
    pub async fn acquire(&self) -> Result<BrowserSession, ExtractError> {
        let page = self.browser.new_page("about:blank").await.map_err(|e| {
            ExtractError::SessionAcquisition(format!("failed to open tab: {e}"))
        })?;
        self.active.fetch_add(1, Ordering::Relaxed);
        Ok(BrowserSession {
            page,
            active: Arc::clone(&self.active),
        })
    }

    /// Sessions acquired and not yet closed.
    pub fn active_sessions(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }
}

impl Drop for BrowserPool {
    fn drop(&mut self) {
        self.handler.abort();
    }
}

/// A single browser tab.
pub struct BrowserSession {
    page: Page,
    active: Arc<AtomicUsize>,
}

impl BrowserSession {
    pub fn page(&self) -> &Page {
        &self.page
    }

    /// Close the tab. Failures are logged; the session is gone either way.
    pub async fn close(self) {
        self.active.fetch_sub(1, Ordering::Relaxed);
        if let Err(e) = self.page.close().await {
            warn!(error = %e, "failed to close browser tab");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{DocumentAdapter, LiveDocument, LiveOptions};

    #[test]
    fn test_explicit_chromium_path_wins() {
        let dir = tempfile::tempdir().unwrap();
        let binary = dir.path().join("chrome");
        std::fs::write(&binary, b"").unwrap();

        std::env::set_var(CHROMIUM_PATH_ENV, &binary);
        let found = find_chromium();
        std::env::remove_var(CHROMIUM_PATH_ENV);

        assert_eq!(found, Some(binary));
    }

    #[tokio::test]
    #[ignore] // Requires Chromium to be installed
    async fn test_session_lifecycle() {
        let pool = BrowserPool::launch().await.expect("failed to launch");
        let session = pool.acquire().await.expect("failed to open tab");
        assert_eq!(pool.active_sessions(), 1);

        {
            let doc = LiveDocument::from_snapshot(
                session.page(),
                "<h1>Hello</h1><p>World</p>",
                "https://example.com/hello",
                &LiveOptions::default(),
            )
            .await
            .expect("render failed");
            let heading = doc.find_one("h1", None).await.unwrap().unwrap();
            assert_eq!(doc.text(&heading).await.unwrap(), "Hello");
            assert_eq!(doc.current_url(), "https://example.com/hello");
        }

        session.close().await;
        assert_eq!(pool.active_sessions(), 0);
    }
}
