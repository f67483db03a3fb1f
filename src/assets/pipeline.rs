//! Per-asset processing: classify, describe, download, thumbnail, record

use crate::assets::candidate::AssetCandidate;
use crate::assets::classify::classify;
use crate::assets::download::{DownloadError, Downloader};
use crate::assets::thumbnail::ThumbnailGenerator;
use crate::config::Config;
use crate::state::{Asset, JobEvent};
use crate::storage::{JobHandle, JobStore};
use crate::url::last_segment;
use reqwest::Client;
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use url::Url;

/// The job table is saved after every this many assets added in a run
const PERSIST_EVERY: usize = 5;

const MAX_NAME_LEN: usize = 96;

/// Turns candidates into recorded assets
pub struct AssetPipeline {
    downloader: Downloader,
    thumbnails: ThumbnailGenerator,
    assets_dir: PathBuf,
    store: Arc<JobStore>,
    events: broadcast::Sender<JobEvent>,
}

impl AssetPipeline {
    pub fn new(
        client: Client,
        config: &Config,
        store: Arc<JobStore>,
        events: broadcast::Sender<JobEvent>,
    ) -> Self {
        Self {
            downloader: Downloader::new(client, config.download.clone()),
            thumbnails: ThumbnailGenerator::new(
                config.thumbnails.clone(),
                config.storage.thumbnails_dir.clone(),
                config.storage.placeholders_dir.clone(),
            ),
            assets_dir: config.storage.assets_dir.clone(),
            store,
            events,
        }
    }

    /// Processes one reserved candidate and appends the resulting asset
    ///
    /// The caller must have reserved the candidate's URL on the job slot.
    /// Download and thumbnail failures end up on the asset; they never fail
    /// the run. A run stopped before or during the download records nothing,
    /// so the URL is picked up again by the next run.
    pub async fn process(
        &self,
        job: &JobHandle,
        candidate: AssetCandidate,
        user_agent: &str,
        cancel: &CancellationToken,
    ) -> Option<Asset> {
        if cancel.is_cancelled() {
            job.lock().await.release_reservation();
            return None;
        }

        let mut asset = Asset::new(candidate.url.as_str(), classify(&candidate.url));
        asset.title = candidate.title;
        asset.description = candidate.description;
        asset.metadata = candidate.metadata;

        let destination = self.asset_path(job.id(), &candidate.url);
        match self
            .downloader
            .download(&asset.url, &destination, user_agent, cancel)
            .await
        {
            Ok(size) => {
                asset.downloaded = true;
                asset.size = size;
                asset.thumbnail_path = self.thumbnails.generate(&asset, &destination).await;
                asset.local_path = Some(destination);
                tracing::info!(
                    job_id = job.id(),
                    url = %asset.url,
                    asset_type = %asset.asset_type,
                    size,
                    "Asset downloaded"
                );
            }
            Err(DownloadError::Cancelled) => {
                job.lock().await.release_reservation();
                tracing::debug!(job_id = job.id(), url = %asset.url, "Download abandoned, run stopped");
                return None;
            }
            Err(e) => {
                tracing::warn!(job_id = job.id(), url = %asset.url, error = %e, "Asset download failed");
                asset.error = e.to_string();
            }
        }

        let added = job.lock().await.complete_asset(asset.clone());

        let _ = self.events.send(JobEvent::AssetAdded {
            job_id: job.id().to_string(),
            asset: asset.clone(),
        });

        if added % PERSIST_EVERY == 0 {
            self.store.save_logged().await;
        }

        Some(asset)
    }

    /// `<assets-dir>/<job-id>/<url-hash>-<name>`
    fn asset_path(&self, job_id: &str, url: &Url) -> PathBuf {
        let digest = hex::encode(Sha256::digest(url.as_str().as_bytes()));
        let name = last_segment(url)
            .map(|s| sanitize_file_name(&s))
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "asset".to_string());
        self.assets_dir
            .join(job_id)
            .join(format!("{}-{}", &digest[..16], name))
    }
}

fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = cleaned.trim_matches('.');
    trimmed.chars().take(MAX_NAME_LEN).collect()
}
