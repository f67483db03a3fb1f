//! Thumbnail generation through ffmpeg, with type-keyed placeholders

use crate::config::ThumbnailConfig;
use crate::state::{Asset, AssetType};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;

const FFMPEG_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
enum ThumbnailError {
    #[error("failed to run ffmpeg: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("ffmpeg failed: {0}")]
    Failed(String),

    #[error("ffmpeg timed out")]
    Timeout,

    #[error("no media thumbnail for {0} assets")]
    Unsupported(AssetType),
}

/// Produces preview images for downloaded assets
#[derive(Debug, Clone)]
pub struct ThumbnailGenerator {
    config: ThumbnailConfig,
    thumbnails_dir: PathBuf,
    placeholders_dir: PathBuf,
}

impl ThumbnailGenerator {
    pub fn new(
        config: ThumbnailConfig,
        thumbnails_dir: impl Into<PathBuf>,
        placeholders_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            config,
            thumbnails_dir: thumbnails_dir.into(),
            placeholders_dir: placeholders_dir.into(),
        }
    }

    /// Generates a thumbnail for `asset` from its downloaded file at `source`
    ///
    /// Videos yield one frame taken at the configured offset, images are
    /// scaled directly. Other types, and any ffmpeg failure, fall back to
    /// `<placeholders-dir>/<type>.png`. Returns `None` when even the
    /// placeholder could not be copied; failures are only logged.
    pub async fn generate(&self, asset: &Asset, source: &Path) -> Option<PathBuf> {
        if let Err(e) = tokio::fs::create_dir_all(&self.thumbnails_dir).await {
            tracing::warn!(asset_id = %asset.id, error = %e, "Cannot create thumbnail directory");
            return None;
        }

        let target = self.thumbnails_dir.join(format!("{}.jpg", asset.id));
        match self.render(asset.asset_type, source, &target).await {
            Ok(()) => return Some(target),
            Err(ThumbnailError::Unsupported(_)) => {}
            Err(e) => {
                tracing::warn!(asset_id = %asset.id, error = %e, "Thumbnail generation failed, using placeholder");
            }
        }

        self.placeholder(asset).await
    }

    async fn render(
        &self,
        asset_type: AssetType,
        source: &Path,
        target: &Path,
    ) -> Result<(), ThumbnailError> {
        let scale = format!("scale={}:-1", self.config.width);
        let mut cmd = Command::new(&self.config.ffmpeg);
        cmd.args(["-y", "-loglevel", "error"]);

        match asset_type {
            AssetType::Video => {
                cmd.arg("-ss")
                    .arg(self.config.frame_offset_secs.to_string())
                    .arg("-i")
                    .arg(source)
                    .args(["-frames:v", "1", "-vf", &scale]);
            }
            AssetType::Image => {
                cmd.arg("-i").arg(source).args(["-vf", &scale]);
            }
            other => return Err(ThumbnailError::Unsupported(other)),
        }
        cmd.arg(target);

        let output = cmd
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(FFMPEG_TIMEOUT, output)
            .await
            .map_err(|_| ThumbnailError::Timeout)?
            .map_err(ThumbnailError::Spawn)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ThumbnailError::Failed(stderr.trim().to_string()));
        }
        Ok(())
    }

    async fn placeholder(&self, asset: &Asset) -> Option<PathBuf> {
        let source = self
            .placeholders_dir
            .join(format!("{}.png", asset.asset_type.as_str()));
        let target = self.thumbnails_dir.join(format!("{}.png", asset.id));

        match tokio::fs::copy(&source, &target).await {
            Ok(_) => Some(target),
            Err(e) => {
                tracing::warn!(
                    asset_id = %asset.id,
                    placeholder = %source.display(),
                    error = %e,
                    "Cannot copy placeholder thumbnail"
                );
                None
            }
        }
    }
}
