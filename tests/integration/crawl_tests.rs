//! Integration tests for job runs
//!
//! These tests use wiremock to create mock HTTP servers and drive complete
//! runs through the coordinator, with the browser and probe disabled.

use std::collections::HashSet;
use std::time::Duration;
use tempfile::TempDir;
use trawler::state::SelectorPurpose;
use trawler::{Config, Coordinator, JobEvent, JobSpec, JobStatus, ScrapingRules, Selector, TrawlError};
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration rooted in `dir`
fn create_test_config(dir: &TempDir) -> Config {
    let placeholders = dir.path().join("placeholders");
    std::fs::create_dir_all(&placeholders).expect("Failed to create placeholders");
    for name in ["video", "image", "audio", "document", "unknown"] {
        std::fs::write(placeholders.join(format!("{name}.png")), name)
            .expect("Failed to write placeholder");
    }

    let mut config = Config::default();
    config.storage.jobs_file = dir.path().join("jobs.json");
    config.storage.assets_dir = dir.path().join("assets");
    config.storage.thumbnails_dir = dir.path().join("thumbnails");
    config.storage.placeholders_dir = placeholders;
    config.fetcher.browser = false;
    config.fetcher.probe = false;
    config.fetcher.plain_timeout_secs = 5;
    config.download.backoff_ms = 10;
    config.download.timeout_secs = 5;
    config.thumbnails.ffmpeg = dir.path().join("missing-ffmpeg");
    config
}

fn gallery_spec(base_url: &str, rules: ScrapingRules) -> JobSpec {
    JobSpec {
        url: format!("{}/", base_url),
        selectors: vec![
            Selector::css("a.next", SelectorPurpose::Links),
            Selector::css("img", SelectorPurpose::Assets),
            Selector::css("h2", SelectorPurpose::Metadata),
        ],
        rules,
        schedule: None,
    }
}

fn html(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .set_body_string(format!("<html><body>{}</body></html>", body))
        .insert_header("content-type", "text/html")
}

fn image() -> ResponseTemplate {
    ResponseTemplate::new(200)
        .set_body_bytes(vec![0xffu8; 32])
        .insert_header("content-type", "image/jpeg")
}

async fn run_to_end(coordinator: &Coordinator, job_id: &str) -> trawler::Job {
    coordinator.start(job_id).await.expect("Failed to start job");
    tokio::time::timeout(Duration::from_secs(30), coordinator.wait(job_id))
        .await
        .expect("Run did not finish")
        .expect("Job vanished");
    coordinator.get_job(job_id).await.expect("Job vanished")
}

#[tokio::test]
async fn test_depth_one_crawl_collects_unique_assets() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(
            r#"<a class="next" href="/p1">1</a><a class="next" href="/p2">2</a>
               <img src="/img/s1.jpg"><img src="/img/s2.jpg"><img src="/img/s3.jpg">"#,
        ))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/p1"))
        .respond_with(html(
            r#"<a class="next" href="/p3">deeper</a>
               <img src="/img/a1.jpg"><img src="/img/a2.jpg"><img src="/img/s1.jpg">"#,
        ))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/p2"))
        .respond_with(html(
            r#"<a class="next" href="/">home</a>
               <img src="/img/b1.jpg"><img src="/img/b2.jpg"><img src="/img/b3.jpg">"#,
        ))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/p3"))
        .respond_with(html("<img src=\"/img/deep.jpg\">"))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/img/"))
        .respond_with(image())
        .expect(8)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let coordinator = Coordinator::open(create_test_config(&dir)).await.unwrap();
    let rules = ScrapingRules {
        max_depth: 1,
        ..Default::default()
    };
    let job = coordinator.submit(gallery_spec(&base, rules)).await.unwrap();

    let job = run_to_end(&coordinator, &job.id).await;

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.assets.len(), 8);
    let urls: HashSet<&str> = job.assets.iter().map(|a| a.url.as_str()).collect();
    assert_eq!(urls.len(), 8, "asset URLs must be unique");
    assert!(!urls.iter().any(|u| u.ends_with("/img/deep.jpg")));
    assert!(job.assets.iter().all(|a| a.downloaded && a.error.is_empty()));
    assert!(job.assets.iter().all(|a| a.thumbnail_path.is_some()));

    coordinator.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_max_assets_caps_recorded_assets() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(
            r#"<img src="/img/1.jpg"><img src="/img/2.jpg"><img src="/img/3.jpg">
               <img src="/img/4.jpg"><img src="/img/5.jpg">"#,
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/img/"))
        .respond_with(image())
        .expect(2)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let coordinator = Coordinator::open(create_test_config(&dir)).await.unwrap();
    let rules = ScrapingRules {
        max_assets: 2,
        ..Default::default()
    };
    let job = coordinator.submit(gallery_spec(&server.uri(), rules)).await.unwrap();

    let job = run_to_end(&coordinator, &job.id).await;

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.assets.len(), 2);
    coordinator.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_exclude_wins_over_include() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(
            r#"<a class="next" href="/gallery/1">in</a>
               <a class="next" href="/gallery/skip-2">both</a>
               <a class="next" href="/blog/3">out</a>"#,
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/gallery/1"))
        .respond_with(html("<p>kept</p>"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/gallery/skip-2"))
        .respond_with(html("<p>excluded</p>"))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/blog/3"))
        .respond_with(html("<p>not included</p>"))
        .expect(0)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let coordinator = Coordinator::open(create_test_config(&dir)).await.unwrap();
    let rules = ScrapingRules {
        max_depth: 1,
        include_pattern: "/gallery/".to_string(),
        exclude_pattern: "skip".to_string(),
        ..Default::default()
    };
    let job = coordinator.submit(gallery_spec(&server.uri(), rules)).await.unwrap();

    let job = run_to_end(&coordinator, &job.id).await;
    assert_eq!(job.status, JobStatus::Completed);
    coordinator.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_root_failure_fails_run() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let coordinator = Coordinator::open(create_test_config(&dir)).await.unwrap();
    let job = coordinator
        .submit(gallery_spec(&server.uri(), ScrapingRules::default()))
        .await
        .unwrap();

    let job = run_to_end(&coordinator, &job.id).await;
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.assets.is_empty());
    coordinator.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_child_failure_still_completes() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(
            r#"<a class="next" href="/broken">x</a><a class="next" href="/fine">y</a>"#,
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/fine"))
        .respond_with(html(r#"<h2>Fine</h2><img src="/img/fine.jpg">"#))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/img/fine.jpg"))
        .respond_with(image())
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let coordinator = Coordinator::open(create_test_config(&dir)).await.unwrap();
    let job = coordinator
        .submit(gallery_spec(&server.uri(), ScrapingRules::default()))
        .await
        .unwrap();

    let job = run_to_end(&coordinator, &job.id).await;
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.assets.len(), 1);
    assert_eq!(job.assets[0].title, "Fine");
    coordinator.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_stop_yields_stopped_not_failed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html("<p>slow</p>").set_delay(Duration::from_secs(10)))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let coordinator = Coordinator::open(create_test_config(&dir)).await.unwrap();
    let rules = ScrapingRules {
        timeout_ms: 20_000,
        ..Default::default()
    };
    let job = coordinator
        .submit(gallery_spec(&server.uri(), rules))
        .await
        .unwrap();

    coordinator.start(&job.id).await.unwrap();
    assert!(matches!(
        coordinator.start(&job.id).await,
        Err(TrawlError::AlreadyRunning(_))
    ));

    tokio::time::sleep(Duration::from_millis(200)).await;
    coordinator.stop(&job.id).await.unwrap();
    tokio::time::timeout(Duration::from_secs(5), coordinator.wait(&job.id))
        .await
        .expect("Run did not observe cancellation")
        .unwrap();

    let job = coordinator.get_job(&job.id).await.unwrap();
    assert_eq!(job.status, JobStatus::Stopped);
    assert!(matches!(
        coordinator.stop(&job.id).await,
        Err(TrawlError::NotRunning(_))
    ));
    coordinator.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_delete_cancels_active_run() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html("<p>slow</p>").set_delay(Duration::from_secs(10)))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let coordinator = Coordinator::open(create_test_config(&dir)).await.unwrap();
    let rules = ScrapingRules {
        timeout_ms: 20_000,
        ..Default::default()
    };
    let job = coordinator
        .submit(gallery_spec(&server.uri(), rules))
        .await
        .unwrap();

    coordinator.start(&job.id).await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    tokio::time::timeout(Duration::from_secs(5), coordinator.delete(&job.id))
        .await
        .expect("Delete did not cancel the run")
        .unwrap();

    assert!(matches!(
        coordinator.start(&job.id).await,
        Err(TrawlError::JobNotFound(_))
    ));
    assert!(coordinator.list_jobs().await.is_empty());
    coordinator.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_download_retried_until_success() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(r#"<img src="/img/flaky.jpg">"#))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/img/flaky.jpg"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/img/flaky.jpg"))
        .respond_with(image())
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let coordinator = Coordinator::open(create_test_config(&dir)).await.unwrap();
    let job = coordinator
        .submit(gallery_spec(&server.uri(), ScrapingRules::default()))
        .await
        .unwrap();

    let job = run_to_end(&coordinator, &job.id).await;
    assert_eq!(job.assets.len(), 1);
    let asset = &job.assets[0];
    assert!(asset.downloaded);
    assert!(asset.error.is_empty());
    assert_eq!(asset.size, 32);
    coordinator.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_download_failing_three_times_records_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(r#"<img src="/img/gone.jpg">"#))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/img/gone.jpg"))
        .respond_with(ResponseTemplate::new(404))
        .expect(3)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let coordinator = Coordinator::open(create_test_config(&dir)).await.unwrap();
    let job = coordinator
        .submit(gallery_spec(&server.uri(), ScrapingRules::default()))
        .await
        .unwrap();

    let job = run_to_end(&coordinator, &job.id).await;
    assert_eq!(job.status, JobStatus::Completed);
    let asset = &job.assets[0];
    assert!(!asset.downloaded);
    assert!(!asset.error.is_empty());
    assert!(asset.local_path.is_none());
    coordinator.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_second_run_does_not_repeat_assets() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(r#"<img src="/img/once.jpg">"#))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/img/once.jpg"))
        .respond_with(image())
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let coordinator = Coordinator::open(create_test_config(&dir)).await.unwrap();
    let job = coordinator
        .submit(gallery_spec(&server.uri(), ScrapingRules::default()))
        .await
        .unwrap();

    run_to_end(&coordinator, &job.id).await;
    let job = run_to_end(&coordinator, &job.id).await;
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.assets.len(), 1);
    coordinator.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_events_report_lifecycle() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(r#"<img src="/img/e.jpg">"#))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/img/e.jpg"))
        .respond_with(image())
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let coordinator = Coordinator::open(create_test_config(&dir)).await.unwrap();
    let job = coordinator
        .submit(gallery_spec(&server.uri(), ScrapingRules::default()))
        .await
        .unwrap();

    let mut events = coordinator.subscribe();
    run_to_end(&coordinator, &job.id).await;

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    assert!(matches!(
        seen.first(),
        Some(JobEvent::StatusChanged { status: JobStatus::Running, .. })
    ));
    assert!(seen
        .iter()
        .any(|e| matches!(e, JobEvent::AssetAdded { .. })));
    assert!(matches!(
        seen.last(),
        Some(JobEvent::StatusChanged { status: JobStatus::Completed, .. })
    ));
    assert!(seen.iter().all(|e| e.job_id() == job.id));
    coordinator.shutdown().await.unwrap();
}
