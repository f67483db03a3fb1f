//! Crawler module for job runs
//!
//! This module contains the core crawling logic, including:
//! - Selector compilation (CSS and a path-query subset)
//! - Rendered and plain page fetching with scoped deadlines
//! - HTML parsing into links and asset candidates
//! - Request throttling
//! - Recursive traversal and run coordination

#[cfg(feature = "browser")]
mod browser;
mod coordinator;
mod crawl;
mod fetcher;
mod parser;
mod selector;
mod throttle;

pub use coordinator::Coordinator;
pub use crawl::Crawler;
pub use fetcher::{build_http_client, FetchError, Fetcher, ProbeOutcome};
pub use parser::{parse_page, ParsedPage};
pub use selector::{CompiledSelector, CompiledSelectors, SelectorError};
pub use throttle::jittered_delay;
