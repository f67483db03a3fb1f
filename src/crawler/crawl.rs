//! Recursive crawl of one job run

use crate::assets::{AssetCandidate, AssetPipeline};
use crate::config::Config;
use crate::crawler::fetcher::{Fetcher, ProbeOutcome};
use crate::crawler::parser::parse_page;
use crate::crawler::selector::CompiledSelectors;
use crate::crawler::throttle;
use crate::state::ScrapingRules;
use crate::storage::JobHandle;
use crate::url::UrlFilter;
use crate::TrawlError;
use futures::future::{BoxFuture, FutureExt};
use reqwest::Client;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use url::Url;

/// State of a single run: what to follow, how to fetch, where assets go
pub struct Crawler {
    job: Arc<JobHandle>,
    seed: Url,
    rules: ScrapingRules,
    selectors: CompiledSelectors,
    filter: UrlFilter,
    fetcher: Fetcher,
    pipeline: Arc<AssetPipeline>,
    probe: bool,
    cancel: CancellationToken,
    tracker: TaskTracker,
    workers: Arc<Semaphore>,
}

impl Crawler {
    /// Prepares a run of `job` from its current definition
    pub async fn new(
        job: Arc<JobHandle>,
        client: Client,
        config: &Config,
        pipeline: Arc<AssetPipeline>,
        cancel: CancellationToken,
    ) -> Result<Self, TrawlError> {
        let snapshot = job.snapshot().await;
        let seed = Url::parse(&snapshot.url)?;
        let selectors = CompiledSelectors::compile(&snapshot.selectors)
            .map_err(|e| TrawlError::InvalidJob(e.to_string()))?;
        let filter = UrlFilter::new(
            &snapshot.rules.include_pattern,
            &snapshot.rules.exclude_pattern,
        )?;
        let fetcher = Fetcher::new(client, config.fetcher.clone(), &snapshot.rules);

        Ok(Self {
            job,
            seed,
            rules: snapshot.rules,
            selectors,
            filter,
            fetcher,
            pipeline,
            probe: config.fetcher.probe,
            cancel,
            tracker: TaskTracker::new(),
            workers: Arc::new(Semaphore::new(config.download.workers.max(1))),
        })
    }

    /// Crawls from the seed and waits for every dispatched asset task
    ///
    /// Returns an error only when the seed page cannot be fetched or the run
    /// was cancelled.
    pub async fn run(&self) -> Result<(), TrawlError> {
        if self.probe {
            self.probe_seed().await;
        }

        let result = self.crawl(self.seed.clone(), 0).await;

        self.tracker.close();
        self.tracker.wait().await;
        self.fetcher.close().await;

        result
    }

    async fn probe_seed(&self) {
        match self.fetcher.probe(&self.seed, &self.cancel).await {
            ProbeOutcome::Clear => {
                tracing::debug!(job_id = self.job.id(), "Seed passed accessibility probe");
            }
            ProbeOutcome::Protected(reason) => {
                tracing::warn!(
                    job_id = self.job.id(),
                    url = %self.seed,
                    reason = %reason,
                    "Seed looks bot-protected, results may be incomplete"
                );
            }
            ProbeOutcome::Unreachable(reason) => {
                tracing::warn!(
                    job_id = self.job.id(),
                    url = %self.seed,
                    reason = %reason,
                    "Accessibility probe failed"
                );
            }
        }
    }

    /// Visits `url` at `depth` and recurses into its links
    ///
    /// Exceeding the depth or the asset cap ends the branch without error.
    /// A child's failure is logged and its siblings continue; only
    /// cancellation propagates from children.
    fn crawl(&self, url: Url, depth: u32) -> BoxFuture<'_, Result<(), TrawlError>> {
        async move {
            if self.cancel.is_cancelled() {
                return Err(TrawlError::Cancelled);
            }
            if self.rules.depth_exceeded(depth) {
                return Ok(());
            }
            if self.job.lock().await.asset_cap_reached() {
                tracing::debug!(job_id = self.job.id(), url = %url, "Asset cap reached, not fetching");
                return Ok(());
            }

            let delay = throttle::jittered_delay(self.rules.request_delay(), self.rules.randomize_delay);
            throttle::wait(delay, &self.cancel).await?;

            tracing::debug!(job_id = self.job.id(), url = %url, depth, "Fetching page");
            let html = match self.fetcher.fetch(&url, &self.cancel).await {
                Ok(html) => html,
                Err(e) if e.is_cancelled() => return Err(TrawlError::Cancelled),
                Err(e) => return Err(e.into()),
            };

            let page = parse_page(&html, &url, &self.selectors);
            tracing::debug!(
                job_id = self.job.id(),
                url = %url,
                depth,
                links = page.links.len(),
                assets = page.assets.len(),
                "Parsed page"
            );

            self.dispatch_assets(page.assets).await;

            if self.rules.depth_exceeded(depth + 1) {
                return Ok(());
            }

            for link in page.links {
                if self.cancel.is_cancelled() {
                    return Err(TrawlError::Cancelled);
                }
                if !self.filter.allows(link.as_str()) {
                    tracing::trace!(url = %link, "Filtered out");
                    continue;
                }
                if !self.job.lock().await.mark_seen(link.as_str()) {
                    continue;
                }

                match self.crawl(link.clone(), depth + 1).await {
                    Ok(()) => {}
                    Err(e) if e.is_cancelled() => return Err(e),
                    Err(e) => {
                        tracing::warn!(
                            job_id = self.job.id(),
                            url = %link,
                            depth = depth + 1,
                            error = %e,
                            "Skipping branch"
                        );
                    }
                }
            }

            Ok(())
        }
        .boxed()
    }

    /// Reserves each new candidate and hands it to the worker pool
    ///
    /// Stops at the first candidate seen with the asset cap reached.
    async fn dispatch_assets(&self, candidates: Vec<AssetCandidate>) {
        for candidate in candidates {
            if self.cancel.is_cancelled() {
                return;
            }

            {
                let mut slot = self.job.lock().await;
                if slot.asset_cap_reached() {
                    tracing::debug!(job_id = self.job.id(), "Asset cap reached, skipping remaining assets");
                    return;
                }
                if !slot.reserve_asset(candidate.url.as_str()) {
                    continue;
                }
            }

            let job = self.job.clone();
            let pipeline = self.pipeline.clone();
            let workers = self.workers.clone();
            let cancel = self.cancel.clone();
            let user_agent = self.fetcher.user_agent().to_string();

            self.tracker.spawn(async move {
                let Ok(_permit) = workers.acquire_owned().await else {
                    job.lock().await.release_reservation();
                    return;
                };
                pipeline.process(&job, candidate, &user_agent, &cancel).await;
            });
        }
    }
}
