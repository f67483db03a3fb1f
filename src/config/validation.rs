use crate::config::types::{
    Config, DownloadConfig, FetcherConfig, StorageConfig, ThumbnailConfig,
};
use crate::ConfigError;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_storage_config(&config.storage)?;
    validate_fetcher_config(&config.fetcher)?;
    validate_download_config(&config.download)?;
    validate_thumbnail_config(&config.thumbnails)?;
    Ok(())
}

fn validate_storage_config(config: &StorageConfig) -> Result<(), ConfigError> {
    for (name, path) in [
        ("jobs-file", &config.jobs_file),
        ("assets-dir", &config.assets_dir),
        ("thumbnails-dir", &config.thumbnails_dir),
        ("placeholders-dir", &config.placeholders_dir),
    ] {
        if path.as_os_str().is_empty() {
            return Err(ConfigError::Validation(format!("{} cannot be empty", name)));
        }
    }

    if config.persist_interval_secs == 0 {
        return Err(ConfigError::Validation(
            "persist-interval-secs must be >= 1".to_string(),
        ));
    }

    Ok(())
}

fn validate_fetcher_config(config: &FetcherConfig) -> Result<(), ConfigError> {
    for (name, value) in [
        ("navigation-timeout-secs", config.navigation_timeout_secs),
        ("plain-timeout-secs", config.plain_timeout_secs),
        ("probe-timeout-secs", config.probe_timeout_secs),
    ] {
        if value == 0 {
            return Err(ConfigError::Validation(format!("{} must be >= 1", name)));
        }
    }

    if config.max_body_bytes < 1024 {
        return Err(ConfigError::Validation(format!(
            "max-body-bytes must be >= 1024, got {}",
            config.max_body_bytes
        )));
    }

    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user-agent cannot be empty".to_string(),
        ));
    }

    Ok(())
}

fn validate_download_config(config: &DownloadConfig) -> Result<(), ConfigError> {
    if config.attempts < 1 || config.attempts > 10 {
        return Err(ConfigError::Validation(format!(
            "download attempts must be between 1 and 10, got {}",
            config.attempts
        )));
    }

    if config.workers < 1 || config.workers > 64 {
        return Err(ConfigError::Validation(format!(
            "download workers must be between 1 and 64, got {}",
            config.workers
        )));
    }

    if config.timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "download timeout-secs must be >= 1".to_string(),
        ));
    }

    Ok(())
}

fn validate_thumbnail_config(config: &ThumbnailConfig) -> Result<(), ConfigError> {
    if config.width == 0 {
        return Err(ConfigError::Validation(
            "thumbnail width must be >= 1".to_string(),
        ));
    }

    if config.ffmpeg.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "ffmpeg path cannot be empty".to_string(),
        ));
    }

    Ok(())
}
