//! Asset pipeline
//!
//! Candidates are extracted from matched elements while the page is parsed,
//! then processed concurrently: classified, downloaded with retry, given a
//! thumbnail and appended to the job.

mod candidate;
mod classify;
mod download;
mod pipeline;
mod thumbnail;

pub use candidate::{extract_candidate, AssetCandidate, SOURCE_ATTRIBUTES};
pub use classify::classify;
pub use download::{DownloadError, Downloader};
pub use pipeline::AssetPipeline;
pub use thumbnail::ThumbnailGenerator;
