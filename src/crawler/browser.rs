//! Headless browser session for rendered fetches

use crate::config::FetcherConfig;
use crate::crawler::fetcher::FetchError;
use chromiumoxide::cdp::browser_protocol::network::SetUserAgentOverrideParams;
use chromiumoxide::cdp::browser_protocol::page::NavigateParams;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Common Chrome executable locations
const CHROME_PATHS: &[&str] = &[
    "/usr/bin/google-chrome",
    "/usr/bin/google-chrome-stable",
    "/usr/bin/chromium",
    "/usr/bin/chromium-browser",
    "/snap/bin/chromium",
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    "/Applications/Chromium.app/Contents/MacOS/Chromium",
    "/opt/google/chrome/google-chrome",
];

const CHROME_COMMANDS: &[&str] = &[
    "google-chrome",
    "google-chrome-stable",
    "chromium",
    "chromium-browser",
];

/// A launched browser plus the task driving its CDP connection
pub struct BrowserSession {
    browser: Browser,
    handler: JoinHandle<()>,
}

impl BrowserSession {
    /// Launches Chrome, headless first and then once in a minimal visible mode
    pub async fn launch(config: &FetcherConfig) -> Result<Self, FetchError> {
        let chrome = find_chrome(config.chrome_path.as_deref())?;
        let timeout = config.navigation_timeout();

        if config.headless {
            match Self::launch_with(&chrome, true, timeout).await {
                Ok(session) => return Ok(session),
                Err(e) => {
                    tracing::warn!(error = %e, "Headless browser failed to start, retrying with a window");
                }
            }
        }

        Self::launch_with(&chrome, false, timeout).await
    }

    async fn launch_with(chrome: &Path, headless: bool, timeout: Duration) -> Result<Self, FetchError> {
        tracing::info!(headless, chrome = %chrome.display(), "Launching browser");

        let mut builder = BrowserConfig::builder().chrome_executable(chrome);
        if !headless {
            builder = builder.with_head().arg("--window-size=800,600");
        }
        let config = builder
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-dev-shm-usage")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--no-sandbox")
            .arg("--disable-gpu")
            .build()
            .map_err(FetchError::Browser)?;

        let (browser, mut handler) = tokio::time::timeout(timeout, Browser::launch(config))
            .await
            .map_err(|_| FetchError::Browser("browser launch timed out".to_string()))?
            .map_err(browser_error)?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        Ok(Self { browser, handler })
    }

    /// Navigates a fresh tab to `url` and returns the rendered document
    ///
    /// The navigation runs under its own deadline. A page that is not ready
    /// afterwards gets one extra `ready_wait` before the fetch gives up.
    pub async fn render(
        &self,
        url: &str,
        user_agent: &str,
        navigation_timeout: Duration,
        ready_wait: Duration,
    ) -> Result<String, FetchError> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(browser_error)?;

        let result = render_page(&page, url, user_agent, navigation_timeout, ready_wait).await;

        // Close the tab so they do not pile up across a run
        if let Err(e) = page.close().await {
            tracing::debug!(error = %e, "Failed to close browser tab");
        }
        result
    }

    pub async fn close(mut self) {
        if let Err(e) = self.browser.close().await {
            tracing::debug!(error = %e, "Browser did not close cleanly");
        }
        self.handler.abort();
    }
}

async fn render_page(
    page: &Page,
    url: &str,
    user_agent: &str,
    navigation_timeout: Duration,
    ready_wait: Duration,
) -> Result<String, FetchError> {
    page.execute(SetUserAgentOverrideParams::new(user_agent.to_string()))
        .await
        .map_err(browser_error)?;

    let params = NavigateParams::builder()
        .url(url)
        .build()
        .map_err(FetchError::Browser)?;

    tracing::debug!(url, "Navigating");
    let navigated = tokio::time::timeout(navigation_timeout, page.execute(params))
        .await
        .map_err(|_| FetchError::Timeout {
            url: url.to_string(),
            scope: "navigation",
        })?
        .map_err(browser_error)?;
    check_navigation(url, navigated.result.error_text.as_deref())?;

    if !is_ready(page, ready_wait).await {
        tokio::time::sleep(ready_wait).await;
        if !is_ready(page, ready_wait).await {
            return Err(FetchError::Browser(format!("page never became ready: {}", url)));
        }
    }

    page.content().await.map_err(browser_error)
}

/// Chrome reports network failures in the navigate reply and then shows its
/// own error page; that page must not pass for the fetched document.
fn check_navigation(url: &str, error_text: Option<&str>) -> Result<(), FetchError> {
    match error_text.filter(|e| !e.is_empty()) {
        Some(error) => Err(FetchError::Browser(format!("navigation to {} failed: {}", url, error))),
        None => Ok(()),
    }
}

async fn is_ready(page: &Page, bound: Duration) -> bool {
    let check = page.evaluate("document.readyState".to_string());
    match tokio::time::timeout(bound.max(Duration::from_millis(500)), check).await {
        Ok(Ok(result)) => {
            let state: String = result.into_value().unwrap_or_default();
            tracing::trace!(state = %state, "Page ready state");
            state == "complete" || state == "interactive"
        }
        Ok(Err(e)) => {
            tracing::debug!(error = %e, "Could not read page ready state");
            false
        }
        Err(_) => false,
    }
}

/// Finds a Chrome executable, preferring an explicit path
fn find_chrome(configured: Option<&Path>) -> Result<PathBuf, FetchError> {
    if let Some(path) = configured {
        if path.exists() {
            return Ok(path.to_path_buf());
        }
        return Err(FetchError::Browser(format!(
            "configured chrome-path {} does not exist",
            path.display()
        )));
    }

    if let Some(path) = CHROME_PATHS.iter().map(Path::new).find(|p| p.exists()) {
        return Ok(path.to_path_buf());
    }

    for cmd in CHROME_COMMANDS {
        if let Ok(output) = std::process::Command::new("which").arg(cmd).output() {
            if output.status.success() {
                let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
                if !path.is_empty() {
                    return Ok(PathBuf::from(path));
                }
            }
        }
    }

    Err(FetchError::Browser("Chrome/Chromium not found".to_string()))
}

fn browser_error(e: chromiumoxide::error::CdpError) -> FetchError {
    FetchError::Browser(e.to_string())
}
