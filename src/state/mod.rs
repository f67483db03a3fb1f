//! State module for jobs and their assets
//!
//! # Components
//!
//! - `JobStatus`: the run state machine of a job
//! - `Job`, `JobSpec`, `Selector`, `ScrapingRules`: crawl configuration
//! - `Asset`, `AssetType`: discovered items and their download outcome
//! - `JobEvent`: progress notifications for observers

mod asset;
mod event;
mod job;
mod job_status;

pub use asset::{Asset, AssetType};
pub use event::JobEvent;
pub use job::{Job, JobSpec, ScrapingRules, Selector, SelectorKind, SelectorPurpose};
pub use job_status::JobStatus;
