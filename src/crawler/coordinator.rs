//! Coordinator - job lifecycle and the collaborator-facing API
//!
//! This module ties the engine together:
//! - Loading the job table and re-arming schedules at startup
//! - Validating and storing submitted jobs
//! - Starting, stopping and deleting runs
//! - Turning scheduler firings into runs
//! - Periodic persistence and graceful shutdown

use crate::assets::AssetPipeline;
use crate::config::Config;
use crate::crawler::crawl::Crawler;
use crate::crawler::fetcher::build_http_client;
use crate::crawler::selector::CompiledSelectors;
use crate::scheduler::{parse_cron, CronScheduler};
use crate::state::{Asset, Job, JobEvent, JobSpec, JobStatus};
use crate::storage::{JobHandle, JobStore};
use crate::url::{normalize_url, UrlFilter};
use crate::{Result, TrawlError};
use reqwest::Client;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Events buffered per subscriber before slow readers start lagging
const EVENT_CAPACITY: usize = 256;

struct Inner {
    config: Config,
    store: Arc<JobStore>,
    scheduler: CronScheduler,
    client: Client,
    pipeline: Arc<AssetPipeline>,
    events: broadcast::Sender<JobEvent>,
    shutdown: CancellationToken,
    tasks: TaskTracker,
}

/// Entry point of the engine
///
/// Cheap to clone; all clones drive the same job table.
#[derive(Clone)]
pub struct Coordinator {
    inner: Arc<Inner>,
}

impl Coordinator {
    /// Loads the job table named in `config` and starts background tasks
    pub async fn open(config: Config) -> Result<Self> {
        let store = JobStore::load(config.storage.jobs_file.clone()).await?;
        Self::with_store(config, store).await
    }

    /// Starts the engine over an already loaded store
    ///
    /// Every job carrying a schedule whose status is not running is
    /// registered with the scheduler.
    pub async fn with_store(config: Config, store: JobStore) -> Result<Self> {
        let store = Arc::new(store);
        let client = build_http_client(&config.fetcher)?;
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (scheduler, firings) = CronScheduler::new(store.clone());
        let pipeline = Arc::new(AssetPipeline::new(
            client.clone(),
            &config,
            store.clone(),
            events.clone(),
        ));

        let coordinator = Self {
            inner: Arc::new(Inner {
                config,
                store,
                scheduler,
                client,
                pipeline,
                events,
                shutdown: CancellationToken::new(),
                tasks: TaskTracker::new(),
            }),
        };

        let mut scheduled = 0;
        for job in coordinator.inner.store.list().await {
            let Some(expression) = job.cron() else {
                continue;
            };
            if job.status == JobStatus::Running {
                continue;
            }
            match coordinator.inner.scheduler.register(&job.id, expression).await {
                Ok(()) => scheduled += 1,
                Err(e) => tracing::warn!(job_id = %job.id, error = %e, "Not rescheduling job"),
            }
        }
        tracing::info!(
            "Engine ready: {} jobs, {} scheduled",
            coordinator.inner.store.len().await,
            scheduled
        );

        coordinator.spawn_dispatcher(firings);
        coordinator.spawn_persister();
        Ok(coordinator)
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn store(&self) -> &Arc<JobStore> {
        &self.inner.store
    }

    /// Receives status changes and added assets from now on
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.inner.events.subscribe()
    }

    /// Validates and stores a new job, scheduling it when it has a schedule
    ///
    /// # Validation
    ///
    /// - The seed URL parses as an absolute http(s) URL
    /// - Every selector compiles
    /// - Include/exclude patterns are valid regular expressions
    /// - The schedule, when present, is a valid cron expression
    pub async fn submit(&self, spec: JobSpec) -> Result<Job> {
        let seed = normalize_url(&spec.url)?;
        CompiledSelectors::compile(&spec.selectors)
            .map_err(|e| TrawlError::InvalidJob(e.to_string()))?;
        UrlFilter::new(&spec.rules.include_pattern, &spec.rules.exclude_pattern)?;

        let mut job = Job::from_spec(spec);
        job.url = seed.to_string();
        if let Some(expression) = job.cron() {
            parse_cron(expression)?;
        }

        let handle = self.inner.store.insert(job.clone()).await;
        if let Some(expression) = job.cron() {
            self.inner.scheduler.register(&job.id, expression).await?;
        }
        self.inner.store.save().await?;

        tracing::info!(job_id = %job.id, url = %job.url, "Job submitted");
        Ok(handle.snapshot().await)
    }

    /// Starts a run of `job_id` in the background
    ///
    /// Rejected with `AlreadyRunning` while a previous run is active.
    pub async fn start(&self, job_id: &str) -> Result<()> {
        let handle = self.handle(job_id).await?;
        let run_guard = handle
            .try_acquire_run()
            .ok_or_else(|| TrawlError::AlreadyRunning(job_id.to_string()))?;

        let cancel = self.inner.shutdown.child_token();
        {
            let mut slot = handle.lock().await;
            if slot.is_retired() {
                return Err(TrawlError::JobNotFound(job_id.to_string()));
            }
            if !slot.begin_run(cancel.clone()) {
                return Err(TrawlError::AlreadyRunning(job_id.to_string()));
            }
        }

        tracing::info!(job_id, "Starting run");
        self.emit_status(job_id, JobStatus::Running);
        self.inner.store.save_logged().await;

        let inner = self.inner.clone();
        self.inner
            .tasks
            .spawn(execute_run(inner, handle, cancel, run_guard));
        Ok(())
    }

    /// Cancels the active run of `job_id` and marks it stopped
    pub async fn stop(&self, job_id: &str) -> Result<()> {
        let handle = self.handle(job_id).await?;
        {
            let mut slot = handle.lock().await;
            if slot.job.status != JobStatus::Running {
                return Err(TrawlError::NotRunning(job_id.to_string()));
            }
            if let Some(cancel) = slot.cancel_token() {
                cancel.cancel();
            }
            slot.transition(JobStatus::Stopped);
        }

        tracing::info!(job_id, "Run stopped");
        self.emit_status(job_id, JobStatus::Stopped);
        self.inner.store.save_logged().await;
        Ok(())
    }

    /// Removes a job, cancelling and awaiting any active run
    ///
    /// The job leaves the table before the wait, and its slot is retired so a
    /// concurrent `start` holding the old handle cannot begin another run.
    pub async fn delete(&self, job_id: &str) -> Result<()> {
        let handle = self
            .inner
            .store
            .remove(job_id)
            .await
            .ok_or_else(|| TrawlError::JobNotFound(job_id.to_string()))?;

        self.inner.scheduler.unregister(job_id).await;
        handle.lock().await.retire();
        handle.wait_idle().await;

        self.inner.store.save().await?;
        tracing::info!(job_id, "Job deleted");
        Ok(())
    }

    /// Resolves once `job_id` has no active run
    pub async fn wait(&self, job_id: &str) -> Result<()> {
        self.handle(job_id).await?.wait_idle().await;
        Ok(())
    }

    pub async fn list_jobs(&self) -> Vec<Job> {
        self.inner.store.list().await
    }

    pub async fn get_job(&self, job_id: &str) -> Result<Job> {
        Ok(self.handle(job_id).await?.snapshot().await)
    }

    pub async fn list_assets(&self, job_id: &str) -> Result<Vec<Asset>> {
        Ok(self.get_job(job_id).await?.assets)
    }

    pub async fn get_asset(&self, job_id: &str, asset_id: &str) -> Result<Asset> {
        self.get_job(job_id)
            .await?
            .find_asset(asset_id)
            .cloned()
            .ok_or_else(|| TrawlError::AssetNotFound {
                job_id: job_id.to_string(),
                asset_id: asset_id.to_string(),
            })
    }

    pub async fn is_scheduled(&self, job_id: &str) -> bool {
        self.inner.scheduler.is_registered(job_id).await
    }

    /// Stops schedules and runs, waits for them to settle and saves
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Shutting down");
        self.inner.scheduler.shutdown().await;
        self.inner.shutdown.cancel();
        self.inner.tasks.close();
        self.inner.tasks.wait().await;
        self.inner.store.save().await?;
        Ok(())
    }

    async fn handle(&self, job_id: &str) -> Result<Arc<JobHandle>> {
        self.inner
            .store
            .get(job_id)
            .await
            .ok_or_else(|| TrawlError::JobNotFound(job_id.to_string()))
    }

    fn emit_status(&self, job_id: &str, status: JobStatus) {
        emit_status(&self.inner.events, job_id, status);
    }

    /// Turns scheduler firings into runs
    fn spawn_dispatcher(&self, mut firings: mpsc::UnboundedReceiver<String>) {
        let inner: Weak<Inner> = Arc::downgrade(&self.inner);
        let shutdown = self.inner.shutdown.clone();

        self.inner.tasks.spawn(async move {
            loop {
                let job_id = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    next = firings.recv() => match next {
                        Some(job_id) => job_id,
                        None => break,
                    },
                };
                let Some(inner) = inner.upgrade() else {
                    break;
                };

                match (Coordinator { inner }).start(&job_id).await {
                    Ok(()) => {}
                    Err(TrawlError::AlreadyRunning(_)) => {
                        tracing::debug!(job_id = %job_id, "Scheduled firing skipped, run active");
                    }
                    Err(e) => {
                        tracing::warn!(job_id = %job_id, error = %e, "Scheduled run failed to start");
                    }
                }
            }
        });
    }

    /// Saves the job table every `persist-interval-secs`
    fn spawn_persister(&self) {
        let store = self.inner.store.clone();
        let shutdown = self.inner.shutdown.clone();
        let period = Duration::from_secs(self.inner.config.storage.persist_interval_secs.max(1));

        self.inner.tasks.spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = interval.tick() => store.save_logged().await,
                }
            }
        });
    }
}

fn emit_status(events: &broadcast::Sender<JobEvent>, job_id: &str, status: JobStatus) {
    let _ = events.send(JobEvent::StatusChanged {
        job_id: job_id.to_string(),
        status,
    });
}

/// Drives one run to its terminal status
///
/// The status becomes terminal only after every dispatched asset task has
/// settled. A stop request already moved the job to stopped; that status is
/// left alone.
async fn execute_run(
    inner: Arc<Inner>,
    handle: Arc<JobHandle>,
    cancel: CancellationToken,
    _run_guard: OwnedMutexGuard<()>,
) {
    let job_id = handle.id().to_string();

    let outcome = match Crawler::new(
        handle.clone(),
        inner.client.clone(),
        &inner.config,
        inner.pipeline.clone(),
        cancel.clone(),
    )
    .await
    {
        Ok(crawler) => crawler.run().await,
        Err(e) => Err(e),
    };

    let status = match &outcome {
        _ if cancel.is_cancelled() => JobStatus::Stopped,
        Ok(()) => JobStatus::Completed,
        Err(e) if e.is_cancelled() => JobStatus::Stopped,
        Err(e) => {
            tracing::error!(job_id = %job_id, error = %e, "Run failed");
            JobStatus::Failed
        }
    };

    let (changed, added) = {
        let mut slot = handle.lock().await;
        let changed = slot.job.status == JobStatus::Running && slot.transition(status);
        let added = slot.added_this_run();
        slot.end_run();
        (changed, added)
    };

    if changed {
        emit_status(&inner.events, &job_id, status);
    }
    inner.store.save_logged().await;

    tracing::info!(job_id = %job_id, %status, assets_added = added, "Run finished");
}
