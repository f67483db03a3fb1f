//! In-memory job table with atomic JSON persistence

use crate::state::{Job, JobStatus};
use crate::storage::slot::JobHandle;
use crate::storage::traits::{StoreError, StoreResult};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// Keyed collection of jobs, owned by the engine and passed by reference
#[derive(Debug)]
pub struct JobStore {
    path: PathBuf,
    jobs: RwLock<HashMap<String, Arc<JobHandle>>>,
    save_lock: Mutex<()>,
}

impl JobStore {
    /// Creates an empty store persisting to `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            jobs: RwLock::new(HashMap::new()),
            save_lock: Mutex::new(()),
        }
    }

    /// Loads the job table from `path`
    ///
    /// A missing file yields an empty store. Runtime-only state (run guard,
    /// cancellation handle, dedup set) is rebuilt empty. Jobs persisted while
    /// running belonged to a process that died mid-run and come back stopped.
    pub async fn load(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();
        let store = Self::new(path.clone());

        let content = match tokio::fs::read(&path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No job table at {}, starting empty", path.display());
                return Ok(store);
            }
            Err(e) => return Err(StoreError::io(&path, e)),
        };

        let table: BTreeMap<String, Job> = serde_json::from_slice(&content)?;
        {
            let mut jobs = store.jobs.write().await;
            for (id, mut job) in table {
                if job.status == JobStatus::Running {
                    tracing::warn!(job_id = %id, "Job was running at shutdown, marking stopped");
                    job.status = JobStatus::Stopped;
                }
                job.id = id.clone();
                jobs.insert(id, Arc::new(JobHandle::new(job)));
            }
            tracing::info!("Loaded {} jobs from {}", jobs.len(), path.display());
        }

        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Serializes every job to disk through a temp file and a rename
    pub async fn save(&self) -> StoreResult<()> {
        let _guard = self.save_lock.lock().await;

        let mut table = BTreeMap::new();
        for handle in self.handles().await {
            table.insert(handle.id().to_string(), handle.snapshot().await);
        }
        let bytes = serde_json::to_vec_pretty(&table)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::io(parent, e))?;
        }

        let tmp = temp_path(&self.path);
        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|e| StoreError::io(&tmp, e))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| StoreError::io(&self.path, e))?;

        tracing::debug!("Saved {} jobs to {}", table.len(), self.path.display());
        Ok(())
    }

    /// Saves and logs instead of failing; used on hot paths of a run
    pub async fn save_logged(&self) {
        if let Err(e) = self.save().await {
            tracing::error!("Failed to persist job table: {}", e);
        }
    }

    pub async fn insert(&self, job: Job) -> Arc<JobHandle> {
        let handle = Arc::new(JobHandle::new(job));
        self.jobs
            .write()
            .await
            .insert(handle.id().to_string(), handle.clone());
        handle
    }

    pub async fn get(&self, id: &str) -> Option<Arc<JobHandle>> {
        self.jobs.read().await.get(id).cloned()
    }

    pub async fn remove(&self, id: &str) -> Option<Arc<JobHandle>> {
        self.jobs.write().await.remove(id)
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }

    /// All handles, in no particular order
    pub async fn handles(&self) -> Vec<Arc<JobHandle>> {
        self.jobs.read().await.values().cloned().collect()
    }

    /// Snapshots of all jobs, oldest first
    pub async fn list(&self) -> Vec<Job> {
        let mut jobs = Vec::new();
        for handle in self.handles().await {
            jobs.push(handle.snapshot().await);
        }
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        jobs
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
