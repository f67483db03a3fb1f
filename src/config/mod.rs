//! Configuration module for the engine
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//! Every section is optional; missing keys fall back to their defaults.
//!
//! # Example
//!
//! ```no_run
//! use trawler::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("trawler.toml")).unwrap();
//! println!("Download attempts: {}", config.download.attempts);
//! ```

mod parser;
mod types;
mod validation;

pub use types::{
    Config, DownloadConfig, FetcherConfig, StorageConfig, ThumbnailConfig, DEFAULT_USER_AGENT,
};

pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
