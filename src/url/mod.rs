//! URL handling module
//!
//! This module provides URL resolution and normalization for discovered
//! references, and the include/exclude filter applied to followed links.

mod filter;
mod normalize;

pub use filter::UrlFilter;
pub use normalize::{last_segment, normalize_url, resolve_url};
