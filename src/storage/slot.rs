//! Per-job runtime state guarded by the job's exclusive lock

use crate::state::{Asset, Job, JobStatus};
use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;

/// A job plus the run-only state that is never persisted
#[derive(Debug)]
pub struct JobSlot {
    pub job: Job,

    /// URLs visited or queued as assets during the current run
    seen: HashSet<String>,

    /// Assets admitted past the cap check but not yet appended
    reserved: usize,

    /// Assets appended during the current run
    added_this_run: usize,

    /// Cancels the active run
    cancel: Option<CancellationToken>,

    /// Set once the job is deleted; no run may begin afterwards
    retired: bool,
}

impl JobSlot {
    pub fn new(job: Job) -> Self {
        Self {
            job,
            seen: HashSet::new(),
            reserved: 0,
            added_this_run: 0,
            cancel: None,
            retired: false,
        }
    }

    /// Moves the job to `to` if the state machine allows it
    pub fn transition(&mut self, to: JobStatus) -> bool {
        if !self.job.status.can_transition_to(to) {
            return false;
        }
        self.job.status = to;
        true
    }

    /// Prepares run-scoped state and moves the job to running
    ///
    /// The dedup set is seeded with the URLs of assets the job already holds.
    pub fn begin_run(&mut self, cancel: CancellationToken) -> bool {
        if self.retired || !self.transition(JobStatus::Running) {
            return false;
        }
        self.job.last_run = Some(Utc::now());
        self.seen = self.job.assets.iter().map(|a| a.url.clone()).collect();
        self.seen.insert(self.job.url.clone());
        self.reserved = 0;
        self.added_this_run = 0;
        self.cancel = Some(cancel);
        true
    }

    /// Drops the run's cancellation handle and dedup set
    pub fn end_run(&mut self) {
        self.cancel = None;
        self.seen.clear();
        self.reserved = 0;
    }

    /// Marks the job deleted and cancels its active run, if any
    pub fn retire(&mut self) {
        self.retired = true;
        if let Some(cancel) = &self.cancel {
            cancel.cancel();
        }
    }

    pub fn is_retired(&self) -> bool {
        self.retired
    }

    pub fn added_this_run(&self) -> usize {
        self.added_this_run
    }

    pub fn cancel_token(&self) -> Option<&CancellationToken> {
        self.cancel.as_ref()
    }

    /// Records `url` as visited; returns false when it was already seen
    pub fn mark_seen(&mut self, url: &str) -> bool {
        self.seen.insert(url.to_string())
    }

    pub fn is_seen(&self, url: &str) -> bool {
        self.seen.contains(url)
    }

    /// True once recorded plus in-flight assets reach the job's cap
    pub fn asset_cap_reached(&self) -> bool {
        self.job
            .rules
            .asset_cap_reached(self.job.assets.len() + self.reserved)
    }

    /// Admits an asset URL for processing
    ///
    /// Returns false when the URL was already seen or the cap is reached.
    /// An admitted URL holds a reservation until `complete_asset`.
    pub fn reserve_asset(&mut self, url: &str) -> bool {
        if self.seen.contains(url) || self.asset_cap_reached() {
            return false;
        }
        self.seen.insert(url.to_string());
        self.reserved += 1;
        true
    }

    /// Gives back a reservation whose asset will never be appended
    pub fn release_reservation(&mut self) {
        self.reserved = self.reserved.saturating_sub(1);
    }

    /// Appends a terminal asset, releasing its reservation
    ///
    /// Returns the number of assets added during the current run.
    pub fn complete_asset(&mut self, asset: Asset) -> usize {
        self.reserved = self.reserved.saturating_sub(1);
        self.job.assets.push(asset);
        self.added_this_run += 1;
        self.added_this_run
    }
}

/// Shared handle to one job in the store
#[derive(Debug)]
pub struct JobHandle {
    id: String,
    slot: Mutex<JobSlot>,
    run_guard: Arc<Mutex<()>>,
}

impl JobHandle {
    pub fn new(job: Job) -> Self {
        Self {
            id: job.id.clone(),
            slot: Mutex::new(JobSlot::new(job)),
            run_guard: Arc::new(Mutex::new(())),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Acquires the job's exclusive lock
    pub async fn lock(&self) -> MutexGuard<'_, JobSlot> {
        self.slot.lock().await
    }

    /// Clones the current job record
    pub async fn snapshot(&self) -> Job {
        self.slot.lock().await.job.clone()
    }

    pub async fn status(&self) -> JobStatus {
        self.slot.lock().await.job.status
    }

    /// Takes the exclusive run guard, or `None` while another run holds it
    pub fn try_acquire_run(&self) -> Option<OwnedMutexGuard<()>> {
        self.run_guard.clone().try_lock_owned().ok()
    }

    /// Resolves once no run holds the guard
    pub async fn wait_idle(&self) {
        let _guard = self.run_guard.lock().await;
    }
}
