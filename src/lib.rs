//! Trawler: a scheduled asset crawler
//!
//! This crate implements the job execution engine of a website asset harvester:
//! it crawls from a seed URL along operator-defined selectors, fetches pages with
//! a headless browser (falling back to plain HTTP), downloads discovered assets
//! with retry and backoff, and keeps job state on disk across restarts.

pub mod assets;
pub mod config;
pub mod crawler;
pub mod scheduler;
pub mod state;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for engine operations
#[derive(Debug, Error)]
pub enum TrawlError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Asset {asset_id} not found in job {job_id}")]
    AssetNotFound { job_id: String, asset_id: String },

    #[error("Job {0} is already running")]
    AlreadyRunning(String),

    #[error("Job {0} is not running")]
    NotRunning(String),

    #[error("Invalid job definition: {0}")]
    InvalidJob(String),

    #[error("Storage error: {0}")]
    Store(#[from] storage::StoreError),

    #[error("Schedule error: {0}")]
    Schedule(#[from] scheduler::ScheduleError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] crawler::FetchError),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Run cancelled")]
    Cancelled,
}

impl TrawlError {
    /// Returns true when the error stems from an explicit stop rather than a failure
    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::Cancelled => true,
            Self::Fetch(e) => e.is_cancelled(),
            _ => false,
        }
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL")]
    MissingDomain,

    #[error("Invalid URL pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },
}

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, TrawlError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::Coordinator;
pub use state::{Asset, AssetType, Job, JobEvent, JobSpec, JobStatus, ScrapingRules, Selector};
pub use storage::JobStore;
