use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Browser-like user agent used when a job does not set its own
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Main configuration structure for the engine
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub fetcher: FetcherConfig,
    #[serde(default)]
    pub download: DownloadConfig,
    #[serde(default)]
    pub thumbnails: ThumbnailConfig,
}

/// Where job state and downloaded files live
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// JSON document holding the whole job table
    #[serde(rename = "jobs-file")]
    pub jobs_file: PathBuf,

    /// Root directory for downloaded assets (one subdirectory per job)
    #[serde(rename = "assets-dir")]
    pub assets_dir: PathBuf,

    /// Directory receiving generated thumbnails
    #[serde(rename = "thumbnails-dir")]
    pub thumbnails_dir: PathBuf,

    /// Directory holding `<type>.png` placeholder images
    #[serde(rename = "placeholders-dir")]
    pub placeholders_dir: PathBuf,

    /// Seconds between background saves of the job table
    #[serde(rename = "persist-interval-secs")]
    pub persist_interval_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            jobs_file: PathBuf::from("./data/jobs.json"),
            assets_dir: PathBuf::from("./data/assets"),
            thumbnails_dir: PathBuf::from("./data/thumbnails"),
            placeholders_dir: PathBuf::from("./static/placeholders"),
            persist_interval_secs: 60,
        }
    }
}

/// Page fetching behavior
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetcherConfig {
    /// Try the headless browser before plain HTTP
    pub browser: bool,

    /// Launch the browser without a window first
    pub headless: bool,

    /// Check the seed for bot protection before crawling
    pub probe: bool,

    /// Explicit Chrome/Chromium executable
    #[serde(rename = "chrome-path")]
    pub chrome_path: Option<PathBuf>,

    #[serde(rename = "navigation-timeout-secs")]
    pub navigation_timeout_secs: u64,

    #[serde(rename = "plain-timeout-secs")]
    pub plain_timeout_secs: u64,

    #[serde(rename = "probe-timeout-secs")]
    pub probe_timeout_secs: u64,

    /// Extra wait granted once when a rendered page is not ready yet
    #[serde(rename = "ready-wait-ms")]
    pub ready_wait_ms: u64,

    /// Plain-fetch bodies are truncated at this size
    #[serde(rename = "max-body-bytes")]
    pub max_body_bytes: usize,

    #[serde(rename = "user-agent")]
    pub user_agent: String,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            browser: true,
            headless: true,
            probe: true,
            chrome_path: None,
            navigation_timeout_secs: 30,
            plain_timeout_secs: 30,
            probe_timeout_secs: 10,
            ready_wait_ms: 2000,
            max_body_bytes: 10 * 1024 * 1024,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl FetcherConfig {
    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout_secs)
    }

    pub fn plain_timeout(&self) -> Duration {
        Duration::from_secs(self.plain_timeout_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn ready_wait(&self) -> Duration {
        Duration::from_millis(self.ready_wait_ms)
    }
}

/// Asset download behavior
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// Total attempts per asset, including the first
    pub attempts: u32,

    /// Base backoff, multiplied by the attempt index
    #[serde(rename = "backoff-ms")]
    pub backoff_ms: u64,

    /// Per-download deadline, long enough for large media
    #[serde(rename = "timeout-secs")]
    pub timeout_secs: u64,

    /// Concurrent asset tasks per run
    pub workers: usize,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff_ms: 2000,
            timeout_secs: 30 * 60,
            workers: 4,
        }
    }
}

impl DownloadConfig {
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Thumbnail generation
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ThumbnailConfig {
    /// ffmpeg executable used for frame extraction and scaling
    pub ffmpeg: PathBuf,

    /// Output width in pixels; height keeps the aspect ratio
    pub width: u32,

    /// Video position the frame is taken from
    #[serde(rename = "frame-offset-secs")]
    pub frame_offset_secs: u64,
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            width: 320,
            frame_offset_secs: 5,
        }
    }
}
