//! Page fetcher
//!
//! This module handles page retrieval for a crawl run:
//! - Building the shared HTTP client
//! - Rendered fetches through a headless browser (feature `browser`)
//! - Plain HTTP fallback with browser-like headers and a body cap
//! - A short accessibility probe run before the first fetch
//! - Error classification (deadline vs. cancellation vs. failure)

use crate::config::FetcherConfig;
use crate::state::ScrapingRules;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, USER_AGENT};
use reqwest::{redirect::Policy, Client};
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use url::Url;

#[cfg(feature = "browser")]
use crate::crawler::browser::BrowserSession;
#[cfg(feature = "browser")]
use tokio::sync::Mutex;

const ACCEPT_HTML: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8";
const ACCEPT_LANGUAGE_VALUE: &str = "en-US,en;q=0.9";

/// Probe bodies are only scanned up to this size
const PROBE_BODY_LIMIT: usize = 64 * 1024;

/// Phrases that mark a bot-protection interstitial
const BOT_MARKERS: &[&str] = &[
    "cf-browser-verification",
    "challenge-platform",
    "just a moment...",
    "attention required",
    "access denied",
    "captcha",
    "ddos protection",
];

/// Errors that can occur while fetching a page
#[derive(Debug, Error)]
pub enum FetchError {
    /// A scoped deadline expired
    #[error("{scope} timed out for {url}")]
    Timeout { url: String, scope: &'static str },

    #[error("fetch cancelled")]
    Cancelled,

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("browser error: {0}")]
    Browser(String),

    #[error("browser unavailable")]
    Unavailable,
}

impl FetchError {
    /// True when an inner deadline expired (retryable, never a stop)
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Timeout { .. } => true,
            Self::Http(e) => e.is_timeout(),
            _ => false,
        }
    }

    /// True when the run itself was cancelled
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Result of the accessibility probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The seed answered with a normal page
    Clear,
    /// The seed looks like a bot-protection page
    Protected(String),
    /// The probe could not reach the seed
    Unreachable(String),
}

/// Builds the HTTP client shared by fetches and downloads
///
/// Deadlines are applied per request, so the client itself carries only a
/// connect timeout.
pub fn build_http_client(config: &FetcherConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.user_agent.clone())
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::limited(10))
        .gzip(true)
        .brotli(true)
        .build()
}

#[cfg(feature = "browser")]
enum BrowserState {
    NotStarted,
    Ready(BrowserSession),
    Disabled,
}

/// Dual-strategy page fetcher, created once per run
pub struct Fetcher {
    client: Client,
    config: FetcherConfig,
    user_agent: String,
    timeout_override: Option<Duration>,
    #[cfg(feature = "browser")]
    browser: Mutex<BrowserState>,
}

impl Fetcher {
    /// Creates a fetcher applying a job's user agent and timeout overrides
    pub fn new(client: Client, config: FetcherConfig, rules: &ScrapingRules) -> Self {
        let user_agent = if rules.user_agent.trim().is_empty() {
            config.user_agent.clone()
        } else {
            rules.user_agent.clone()
        };

        Self {
            client,
            user_agent,
            timeout_override: rules.timeout(),
            #[cfg(feature = "browser")]
            browser: Mutex::new(if config.browser {
                BrowserState::NotStarted
            } else {
                BrowserState::Disabled
            }),
            config,
        }
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    fn navigation_timeout(&self) -> Duration {
        self.timeout_override
            .unwrap_or_else(|| self.config.navigation_timeout())
    }

    fn plain_timeout(&self) -> Duration {
        self.timeout_override
            .unwrap_or_else(|| self.config.plain_timeout())
    }

    /// Fetches the document at `url`
    ///
    /// The rendered strategy is tried first; any failure other than
    /// cancellation falls through to a plain HTTP GET. Each strategy runs
    /// under its own deadline, and only `cancel` aborts the fetch as a whole.
    pub async fn fetch(&self, url: &Url, cancel: &CancellationToken) -> Result<String, FetchError> {
        if cancel.is_cancelled() {
            return Err(FetchError::Cancelled);
        }

        #[cfg(feature = "browser")]
        {
            match self.fetch_rendered(url, cancel).await {
                Ok(html) => return Ok(html),
                Err(FetchError::Cancelled) => return Err(FetchError::Cancelled),
                Err(FetchError::Unavailable) => {}
                Err(e) => {
                    tracing::debug!(url = %url, error = %e, "Rendered fetch failed, falling back to plain HTTP");
                }
            }
        }

        self.fetch_plain(url, cancel).await
    }

    #[cfg(feature = "browser")]
    async fn fetch_rendered(&self, url: &Url, cancel: &CancellationToken) -> Result<String, FetchError> {
        let mut state = self.browser.lock().await;

        if matches!(*state, BrowserState::NotStarted) {
            let launched = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(FetchError::Cancelled),
                launched = BrowserSession::launch(&self.config) => launched,
            };
            *state = match launched {
                Ok(session) => BrowserState::Ready(session),
                Err(e) => {
                    tracing::warn!(error = %e, "Browser unavailable, using plain HTTP for the rest of the run");
                    BrowserState::Disabled
                }
            };
        }

        let BrowserState::Ready(session) = &*state else {
            return Err(FetchError::Unavailable);
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(FetchError::Cancelled),
            result = session.render(
                url.as_str(),
                &self.user_agent,
                self.navigation_timeout(),
                self.config.ready_wait(),
            ) => result,
        }
    }

    async fn fetch_plain(&self, url: &Url, cancel: &CancellationToken) -> Result<String, FetchError> {
        let timeout = self.plain_timeout();
        let request = async {
            let mut response = self
                .client
                .get(url.clone())
                .header(USER_AGENT, &self.user_agent)
                .header(ACCEPT, ACCEPT_HTML)
                .header(ACCEPT_LANGUAGE, ACCEPT_LANGUAGE_VALUE)
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                return Err(FetchError::Status {
                    url: url.to_string(),
                    status: status.as_u16(),
                });
            }

            let limit = self.config.max_body_bytes;
            let mut body = Vec::new();
            while let Some(chunk) = response.chunk().await? {
                let room = limit - body.len();
                if chunk.len() >= room {
                    body.extend_from_slice(&chunk[..room]);
                    tracing::warn!(url = %url, limit, "Response body truncated");
                    break;
                }
                body.extend_from_slice(&chunk);
            }
            Ok(String::from_utf8_lossy(&body).into_owned())
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(FetchError::Cancelled),
            result = tokio::time::timeout(timeout, request) => {
                result.map_err(|_| FetchError::Timeout {
                    url: url.to_string(),
                    scope: "plain fetch",
                })?
            }
        }
    }

    /// Cheap check of the seed for bot protection; never fails the run
    pub async fn probe(&self, url: &Url, cancel: &CancellationToken) -> ProbeOutcome {
        let request = async {
            let mut response = self
                .client
                .get(url.clone())
                .header(USER_AGENT, &self.user_agent)
                .header(ACCEPT, ACCEPT_HTML)
                .send()
                .await?;

            let status = response.status().as_u16();
            let mut body = Vec::new();
            while let Some(chunk) = response.chunk().await? {
                body.extend_from_slice(&chunk);
                if body.len() >= PROBE_BODY_LIMIT {
                    break;
                }
            }
            Ok::<_, reqwest::Error>((status, String::from_utf8_lossy(&body).to_lowercase()))
        };

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return ProbeOutcome::Unreachable("cancelled".to_string()),
            result = tokio::time::timeout(self.config.probe_timeout(), request) => result,
        };

        match result {
            Err(_) => ProbeOutcome::Unreachable("probe timed out".to_string()),
            Ok(Err(e)) => ProbeOutcome::Unreachable(e.to_string()),
            Ok(Ok((status, body))) => classify_probe(status, &body),
        }
    }

    /// Shuts the browser down, if one was started
    pub async fn close(&self) {
        #[cfg(feature = "browser")]
        {
            let state = std::mem::replace(&mut *self.browser.lock().await, BrowserState::Disabled);
            if let BrowserState::Ready(session) = state {
                session.close().await;
            }
        }
    }
}

fn classify_probe(status: u16, body: &str) -> ProbeOutcome {
    if matches!(status, 403 | 429 | 503) {
        return ProbeOutcome::Protected(format!("HTTP {}", status));
    }
    match BOT_MARKERS.iter().find(|m| body.contains(*m)) {
        Some(marker) => ProbeOutcome::Protected(format!("page contains '{}'", marker)),
        None => ProbeOutcome::Clear,
    }
}
