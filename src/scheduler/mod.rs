//! Cron scheduler for recurring jobs
//!
//! Each scheduled job gets one timer task. When a timer fires, the job's
//! status is checked first; a job that is still running skips the firing
//! (no queueing, no overlap). Otherwise the job ID is sent on the firing
//! channel, which the coordinator turns into a run.

mod expression;

pub use expression::{next_fire, parse_cron, CronSchedule};

use crate::state::JobStatus;
use crate::storage::JobStore;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

/// Errors raised while registering schedules
#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("Invalid cron expression '{expression}': {message}")]
    InvalidCron { expression: String, message: String },
}

/// What a timer does when it fires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FireDecision {
    /// Trigger a run
    Fire,
    /// The previous run is still active
    Skip,
    /// The job no longer exists
    Retire,
}

/// Maps cron expressions to job triggers
pub struct CronScheduler {
    store: Arc<JobStore>,
    timers: Mutex<HashMap<String, CancellationToken>>,
    fire_tx: mpsc::UnboundedSender<String>,
    shutdown: CancellationToken,
}

impl CronScheduler {
    /// Creates a scheduler and the receiving end of its firing channel
    pub fn new(store: Arc<JobStore>) -> (Self, mpsc::UnboundedReceiver<String>) {
        let (fire_tx, fire_rx) = mpsc::unbounded_channel();
        let scheduler = Self {
            store,
            timers: Mutex::new(HashMap::new()),
            fire_tx,
            shutdown: CancellationToken::new(),
        };
        (scheduler, fire_rx)
    }

    /// Registers (or replaces) the schedule of a job
    ///
    /// Replacing a schedule stops the old timer; it does not affect a run in flight.
    pub async fn register(&self, job_id: &str, expression: &str) -> Result<(), ScheduleError> {
        let schedule = parse_cron(expression)?;
        let cancel = self.shutdown.child_token();

        let previous = self.timers.lock().await.insert(job_id.to_string(), cancel.clone());
        if let Some(previous) = previous {
            previous.cancel();
        }

        tracing::info!(job_id, expression, "Scheduled job");
        tokio::spawn(run_timer(
            job_id.to_string(),
            schedule,
            self.store.clone(),
            self.fire_tx.clone(),
            cancel,
        ));
        Ok(())
    }

    /// Stops future firings for a job; returns false if it had no schedule
    pub async fn unregister(&self, job_id: &str) -> bool {
        match self.timers.lock().await.remove(job_id) {
            Some(timer) => {
                timer.cancel();
                tracing::info!(job_id, "Unscheduled job");
                true
            }
            None => false,
        }
    }

    pub async fn is_registered(&self, job_id: &str) -> bool {
        self.timers.lock().await.contains_key(job_id)
    }

    /// Stops every timer
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.timers.lock().await.clear();
    }
}

/// Decides what a firing timer should do for `job_id`
async fn decide(store: &JobStore, job_id: &str) -> FireDecision {
    match store.get(job_id).await {
        None => FireDecision::Retire,
        Some(handle) if handle.status().await == JobStatus::Running => FireDecision::Skip,
        Some(_) => FireDecision::Fire,
    }
}

async fn run_timer(
    job_id: String,
    schedule: CronSchedule,
    store: Arc<JobStore>,
    fire_tx: mpsc::UnboundedSender<String>,
    cancel: CancellationToken,
) {
    let mut from = Utc::now();
    loop {
        let Some(next) = next_fire(&schedule, from) else {
            tracing::warn!(job_id = %job_id, "Schedule has no upcoming firings");
            break;
        };

        match store.get(&job_id).await {
            Some(handle) => handle.lock().await.job.next_run = Some(next),
            None => break,
        }

        let wait = (next - Utc::now()).to_std().unwrap_or_default();
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(wait) => {}
        }
        from = next;

        match decide(&store, &job_id).await {
            FireDecision::Fire => {
                tracing::info!(job_id = %job_id, "Schedule fired");
                if fire_tx.send(job_id.clone()).is_err() {
                    break;
                }
            }
            FireDecision::Skip => {
                tracing::debug!(job_id = %job_id, "Previous run still active, skipping firing");
            }
            FireDecision::Retire => break,
        }
    }
}
