//! Asset download with retry and backoff

use crate::config::DownloadConfig;
use reqwest::header::USER_AGENT;
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

/// Errors that can occur while downloading an asset
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("HTTP status {0}")]
    Status(u16),

    #[error("network error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("download timed out after {0:?}")]
    Timeout(Duration),

    #[error("download cancelled")]
    Cancelled,

    #[error("download failed after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: String },
}

/// Downloads single files to disk
#[derive(Debug, Clone)]
pub struct Downloader {
    client: Client,
    config: DownloadConfig,
}

impl Downloader {
    pub fn new(client: Client, config: DownloadConfig) -> Self {
        Self { client, config }
    }

    /// Downloads `url` to `destination`, returning the number of bytes written
    ///
    /// # Retry Logic
    ///
    /// | Condition | Action |
    /// |-----------|--------|
    /// | 2xx / 3xx | Success |
    /// | Any other status, network error, timeout | Retry after `attempt x backoff` |
    /// | Cancellation of `cancel` | Abort immediately |
    ///
    /// Each attempt runs under its own deadline (`download.timeout-secs`),
    /// independent of the run's lifetime. After the last attempt the failures
    /// are folded into a single `DownloadError::Exhausted`.
    pub async fn download(
        &self,
        url: &str,
        destination: &Path,
        user_agent: &str,
        cancel: &CancellationToken,
    ) -> Result<u64, DownloadError> {
        let attempts = self.config.attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=attempts {
            if attempt > 1 {
                let backoff = self.config.backoff() * (attempt - 1);
                tracing::debug!(url, attempt, ?backoff, "Backing off before retry");
                tokio::select! {
                    _ = cancel.cancelled() => return Err(DownloadError::Cancelled),
                    _ = tokio::time::sleep(backoff) => {}
                }
            }

            match self.attempt(url, destination, user_agent, cancel).await {
                Ok(size) => {
                    tracing::debug!(url, attempt, size, "Download complete");
                    return Ok(size);
                }
                Err(DownloadError::Cancelled) => return Err(DownloadError::Cancelled),
                Err(e) => {
                    tracing::warn!(url, attempt, error = %e, "Download attempt failed");
                    last_error = Some(e);
                }
            }
        }

        Err(DownloadError::Exhausted {
            attempts,
            last: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no attempt made".to_string()),
        })
    }

    async fn attempt(
        &self,
        url: &str,
        destination: &Path,
        user_agent: &str,
        cancel: &CancellationToken,
    ) -> Result<u64, DownloadError> {
        let timeout = self.config.timeout();
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(DownloadError::Cancelled),
            result = tokio::time::timeout(timeout, self.fetch_to_file(url, destination, user_agent)) => {
                result.unwrap_or(Err(DownloadError::Timeout(timeout)))
            }
        };

        if result.is_err() {
            remove_partial(destination).await;
        }
        result
    }

    async fn fetch_to_file(
        &self,
        url: &str,
        destination: &Path,
        user_agent: &str,
    ) -> Result<u64, DownloadError> {
        let mut response = self
            .client
            .get(url)
            .header(USER_AGENT, user_agent)
            .send()
            .await?;

        let status = response.status();
        if !(status.is_success() || status.is_redirection()) {
            return Err(DownloadError::Status(status.as_u16()));
        }

        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Written under a temporary name; `attempt` removes it when this fails
        let partial = partial_path(destination);
        let mut file = tokio::fs::File::create(&partial).await?;
        let mut size = 0u64;
        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk).await?;
            size += chunk.len() as u64;
        }
        file.flush().await?;
        drop(file);

        tokio::fs::rename(&partial, destination).await?;
        Ok(size)
    }
}

async fn remove_partial(destination: &Path) {
    let partial = partial_path(destination);
    match tokio::fs::remove_file(&partial).await {
        Ok(()) => tracing::debug!(path = %partial.display(), "Removed partial download"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %partial.display(), error = %e, "Could not remove partial download"),
    }
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".part");
    path.with_file_name(name)
}
