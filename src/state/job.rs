use crate::state::{Asset, JobStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Query language of a selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectorKind {
    /// CSS selector evaluated against the DOM
    Css,
    /// Path expression (XPath subset)
    #[serde(alias = "path")]
    Xpath,
}

/// What a selector's matches are used for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectorPurpose {
    Links,
    Assets,
    Metadata,
}

/// A rule for extracting something from a page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selector {
    #[serde(rename = "type")]
    pub kind: SelectorKind,
    pub query: String,
    #[serde(rename = "for")]
    pub purpose: SelectorPurpose,
}

impl Selector {
    pub fn css(query: impl Into<String>, purpose: SelectorPurpose) -> Self {
        Self {
            kind: SelectorKind::Css,
            query: query.into(),
            purpose,
        }
    }

    pub fn xpath(query: impl Into<String>, purpose: SelectorPurpose) -> Self {
        Self {
            kind: SelectorKind::Xpath,
            query: query.into(),
            purpose,
        }
    }
}

/// Bounds on a crawl
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrapingRules {
    /// Maximum link-follow hops from the seed, 0 = unlimited
    pub max_depth: u32,

    /// Maximum assets held by the job, 0 = unlimited
    pub max_assets: usize,

    /// Regex a followed URL must match, empty = no constraint
    pub include_pattern: String,

    /// Regex a followed URL must not match; wins over `include_pattern`
    pub exclude_pattern: String,

    /// Per-request timeout, 0 = engine default
    pub timeout_ms: u64,

    /// User agent sent with requests, empty = engine default
    pub user_agent: String,

    /// Delay before each page fetch
    pub request_delay_ms: u64,

    /// Scale the delay by a random factor in [0.5, 1.5]
    pub randomize_delay: bool,
}

impl ScrapingRules {
    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }

    /// Per-request timeout, when the job overrides the engine default
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_ms > 0).then(|| Duration::from_millis(self.timeout_ms))
    }

    /// True when `depth` lies beyond the configured maximum
    pub fn depth_exceeded(&self, depth: u32) -> bool {
        self.max_depth > 0 && depth > self.max_depth
    }

    /// True when holding `count` assets means the cap is reached
    pub fn asset_cap_reached(&self, count: usize) -> bool {
        self.max_assets > 0 && count >= self.max_assets
    }
}

/// A job definition as submitted by a collaborator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSpec {
    pub url: String,
    #[serde(default)]
    pub selectors: Vec<Selector>,
    #[serde(default)]
    pub rules: ScrapingRules,
    /// Five-field cron expression
    #[serde(default)]
    pub schedule: Option<String>,
}

/// One crawl configuration plus its run state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub url: String,
    pub selectors: Vec<Selector>,
    pub rules: ScrapingRules,
    #[serde(default)]
    pub schedule: Option<String>,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub last_run: Option<DateTime<Utc>>,
    #[serde(default)]
    pub next_run: Option<DateTime<Utc>>,
    #[serde(default)]
    pub assets: Vec<Asset>,
}

impl Job {
    /// Builds an idle job with a fresh identifier
    pub fn from_spec(spec: JobSpec) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            url: spec.url,
            selectors: spec.selectors,
            rules: spec.rules,
            schedule: spec.schedule.filter(|s| !s.trim().is_empty()),
            status: JobStatus::Idle,
            created_at: Utc::now(),
            last_run: None,
            next_run: None,
            assets: Vec::new(),
        }
    }

    /// Returns the cron expression when the job carries a non-empty schedule
    pub fn cron(&self) -> Option<&str> {
        self.schedule
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Selectors with the given purpose, in declaration order
    pub fn selectors_for(&self, purpose: SelectorPurpose) -> impl Iterator<Item = &Selector> {
        self.selectors.iter().filter(move |s| s.purpose == purpose)
    }

    pub fn find_asset(&self, asset_id: &str) -> Option<&Asset> {
        self.assets.iter().find(|a| a.id == asset_id)
    }
}
