//! Trawler main entry point
//!
//! This is the command-line interface for the Trawler asset crawler.

use anyhow::Context;
use clap::Parser;
use std::path::{Path, PathBuf};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;
use trawler::config::load_config_with_hash;
use trawler::{Coordinator, JobEvent, JobSpec};

/// Trawler: a scheduled website asset crawler
///
/// Trawler follows operator-defined selectors from a seed URL, downloads the
/// assets it discovers and keeps job state on disk. Jobs with a cron schedule
/// run on their own while the engine is serving.
#[derive(Parser, Debug)]
#[command(name = "trawler")]
#[command(version = "1.0.0")]
#[command(about = "A scheduled website asset crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Submit the job definition in this JSON file
    #[arg(long, value_name = "FILE")]
    submit: Option<PathBuf>,

    /// Run this job once, wait for it and exit
    #[arg(long, value_name = "ID", conflicts_with = "list")]
    start: Option<String>,

    /// List stored jobs and exit
    #[arg(long)]
    list: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load configuration {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    let coordinator = Coordinator::open(config)
        .await
        .context("Failed to open job store")?;

    if let Some(path) = &cli.submit {
        handle_submit(&coordinator, path).await?;
    }

    if cli.list {
        handle_list(&coordinator).await;
    } else if let Some(job_id) = &cli.start {
        handle_start(&coordinator, job_id).await?;
    } else {
        handle_serve(&coordinator).await?;
    }

    coordinator.shutdown().await?;
    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("trawler=info,warn"),
            1 => EnvFilter::new("trawler=debug,info"),
            2 => EnvFilter::new("trawler=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles --submit: reads a job definition and stores it
async fn handle_submit(coordinator: &Coordinator, path: &Path) -> anyhow::Result<()> {
    let content = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read job file {}", path.display()))?;
    let spec: JobSpec = serde_json::from_slice(&content)
        .with_context(|| format!("Invalid job definition in {}", path.display()))?;

    let job = coordinator.submit(spec).await?;
    println!("Submitted job {} ({})", job.id, job.url);
    if let Some(schedule) = &job.schedule {
        println!("  Schedule: {}", schedule);
    }
    Ok(())
}

/// Handles --list: prints one line per job
async fn handle_list(coordinator: &Coordinator) {
    let jobs = coordinator.list_jobs().await;
    if jobs.is_empty() {
        println!("No jobs stored");
        return;
    }

    println!("{:<36}  {:<9}  {:>6}  {:<16}  URL", "ID", "STATUS", "ASSETS", "SCHEDULE");
    for job in jobs {
        println!(
            "{:<36}  {:<9}  {:>6}  {:<16}  {}",
            job.id,
            job.status.as_str(),
            job.assets.len(),
            job.schedule.as_deref().unwrap_or("-"),
            job.url
        );
    }
}

/// Handles --start: runs one job to completion, stopping it on Ctrl-C
async fn handle_start(coordinator: &Coordinator, job_id: &str) -> anyhow::Result<()> {
    coordinator.start(job_id).await?;

    tokio::select! {
        result = coordinator.wait(job_id) => result?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupted, stopping job {}", job_id);
            coordinator.stop(job_id).await?;
            coordinator.wait(job_id).await?;
        }
    }

    let job = coordinator.get_job(job_id).await?;
    let downloaded = job.assets.iter().filter(|a| a.downloaded).count();
    println!("=== Run finished ===");
    println!("  Job: {}", job.id);
    println!("  Status: {}", job.status);
    println!(
        "  Assets: {} ({} downloaded, {} failed)",
        job.assets.len(),
        downloaded,
        job.assets.len() - downloaded
    );
    Ok(())
}

/// Serves scheduled jobs until Ctrl-C, logging job events
async fn handle_serve(coordinator: &Coordinator) -> anyhow::Result<()> {
    tracing::info!("Serving scheduled jobs, press Ctrl-C to exit");
    let mut events = coordinator.subscribe();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(JobEvent::StatusChanged { job_id, status }) => {
                    tracing::info!("Job {} is now {}", job_id, status);
                }
                Ok(JobEvent::AssetAdded { job_id, asset }) => {
                    tracing::debug!("Job {} added {} asset {}", job_id, asset.asset_type, asset.url);
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!("Event feed lagged, {} events skipped", skipped);
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    Ok(())
}
