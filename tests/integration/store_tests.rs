//! Integration tests for job persistence and submission
//!
//! These tests reopen the engine over the same job file to check what
//! survives a restart, and exercise the validation done on submit.

use tempfile::TempDir;
use trawler::state::SelectorPurpose;
use trawler::storage::JobStore;
use trawler::{Config, Coordinator, Job, JobSpec, JobStatus, ScrapingRules, Selector, TrawlError};

fn create_test_config(dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.storage.jobs_file = dir.path().join("jobs.json");
    config.storage.assets_dir = dir.path().join("assets");
    config.storage.thumbnails_dir = dir.path().join("thumbnails");
    config.storage.placeholders_dir = dir.path().join("placeholders");
    config.fetcher.browser = false;
    config.fetcher.probe = false;
    config
}

fn spec(schedule: Option<&str>) -> JobSpec {
    JobSpec {
        url: "https://example.com/gallery".to_string(),
        selectors: vec![
            Selector::css("a.next", SelectorPurpose::Links),
            Selector::css("img", SelectorPurpose::Assets),
        ],
        rules: ScrapingRules {
            max_depth: 2,
            max_assets: 50,
            ..Default::default()
        },
        schedule: schedule.map(str::to_string),
    }
}

#[tokio::test]
async fn test_submitted_job_survives_restart() {
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&dir);

    let coordinator = Coordinator::open(config.clone()).await.unwrap();
    let submitted = coordinator.submit(spec(None)).await.unwrap();
    assert_eq!(submitted.status, JobStatus::Idle);
    coordinator.shutdown().await.unwrap();

    let store = JobStore::load(&config.storage.jobs_file).await.unwrap();
    let restored = store.get(&submitted.id).await.unwrap().snapshot().await;
    assert_eq!(restored.url, submitted.url);
    assert_eq!(restored.selectors, submitted.selectors);
    assert_eq!(restored.rules, submitted.rules);
    assert_eq!(restored.status, JobStatus::Idle);

    let reopened = Coordinator::open(config).await.unwrap();
    assert_eq!(reopened.list_jobs().await.len(), 1);
    assert!(!reopened.is_scheduled(&submitted.id).await);
    reopened.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_schedule_rearmed_after_restart() {
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&dir);

    let coordinator = Coordinator::open(config.clone()).await.unwrap();
    let job = coordinator.submit(spec(Some("0 3 * * *"))).await.unwrap();
    assert!(coordinator.is_scheduled(&job.id).await);
    coordinator.shutdown().await.unwrap();

    let reopened = Coordinator::open(config).await.unwrap();
    assert!(reopened.is_scheduled(&job.id).await);
    assert_eq!(reopened.get_job(&job.id).await.unwrap().status, JobStatus::Idle);
    reopened.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_interrupted_run_loads_as_stopped() {
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&dir);

    let mut job = Job::from_spec(spec(Some("*/5 * * * *")));
    job.status = JobStatus::Running;
    let store = JobStore::new(&config.storage.jobs_file);
    store.insert(job.clone()).await;
    store.save().await.unwrap();

    let coordinator = Coordinator::open(config).await.unwrap();
    let loaded = coordinator.get_job(&job.id).await.unwrap();
    assert_eq!(loaded.status, JobStatus::Stopped);
    assert!(coordinator.is_scheduled(&job.id).await);
    assert!(matches!(
        coordinator.stop(&job.id).await,
        Err(TrawlError::NotRunning(_))
    ));
    coordinator.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_delete_removes_job_and_schedule() {
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&dir);

    let coordinator = Coordinator::open(config.clone()).await.unwrap();
    let job = coordinator.submit(spec(Some("0 * * * *"))).await.unwrap();
    coordinator.delete(&job.id).await.unwrap();

    assert!(!coordinator.is_scheduled(&job.id).await);
    assert!(matches!(
        coordinator.get_job(&job.id).await,
        Err(TrawlError::JobNotFound(_))
    ));
    assert!(matches!(
        coordinator.delete(&job.id).await,
        Err(TrawlError::JobNotFound(_))
    ));
    coordinator.shutdown().await.unwrap();

    let store = JobStore::load(&config.storage.jobs_file).await.unwrap();
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn test_submit_rejects_invalid_definitions() {
    let dir = TempDir::new().unwrap();
    let coordinator = Coordinator::open(create_test_config(&dir)).await.unwrap();

    let mut bad_url = spec(None);
    bad_url.url = "not a url".to_string();
    assert!(matches!(
        coordinator.submit(bad_url).await,
        Err(TrawlError::UrlError(_))
    ));

    let mut bad_scheme = spec(None);
    bad_scheme.url = "ftp://example.com/".to_string();
    assert!(coordinator.submit(bad_scheme).await.is_err());

    assert!(matches!(
        coordinator.submit(spec(Some("every day"))).await,
        Err(TrawlError::Schedule(_))
    ));

    let mut bad_pattern = spec(None);
    bad_pattern.rules.include_pattern = "gallery/(".to_string();
    assert!(matches!(
        coordinator.submit(bad_pattern).await,
        Err(TrawlError::UrlError(_))
    ));

    let mut bad_selector = spec(None);
    bad_selector
        .selectors
        .push(Selector::css("a[", SelectorPurpose::Links));
    assert!(matches!(
        coordinator.submit(bad_selector).await,
        Err(TrawlError::InvalidJob(_))
    ));

    assert!(coordinator.list_jobs().await.is_empty());
    coordinator.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_unknown_ids_are_reported() {
    let dir = TempDir::new().unwrap();
    let coordinator = Coordinator::open(create_test_config(&dir)).await.unwrap();
    let job = coordinator.submit(spec(None)).await.unwrap();

    assert!(coordinator.list_assets(&job.id).await.unwrap().is_empty());
    assert!(matches!(
        coordinator.get_asset(&job.id, "missing").await,
        Err(TrawlError::AssetNotFound { .. })
    ));
    assert!(matches!(
        coordinator.start("missing").await,
        Err(TrawlError::JobNotFound(_))
    ));
    coordinator.shutdown().await.unwrap();
}
