//! Integration tests for the request -> poll -> fetch -> merge run

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

use report_segment_downloader::downloader::{PollConfig, RateLimiter};
use report_segment_downloader::materializer::{MaterializeError, Materializer, RunState};
use report_segment_downloader::output::{OutputError, RunLock, RunManifest};
use report_segment_downloader::shutdown::ShutdownCoordinator;
use report_segment_downloader::{ReportParams, ReportStatus, Segment};

use crate::support::{gzip, test_config, url, MockApi, MockSource};

fn poll_config(max_attempts: u32) -> PollConfig {
    PollConfig {
        interval: Duration::from_secs(10),
        max_attempts,
    }
}

fn segment(id: &str) -> Segment {
    Segment::new(id, Some(url(id).as_str()))
}

/// Three segments for `i1` (one gzipped), none for `i2`
fn fixture(statuses: &[ReportStatus]) -> (MockApi, MockSource) {
    let api = MockApi::new(statuses)
        .with_instance("i1", vec![segment("p1"), segment("p2"), segment("p3")])
        .with_instance("i2", Vec::new());
    let source = MockSource::new()
        .with_payload(url("p1"), b"a,b\n1,x\n".to_vec())
        .with_payload(url("p2"), gzip(b"a,b\n2,y\n"))
        .with_payload(url("p3"), b"a,b\r\n\r\n3,z\r\n".to_vec());
    (api, source)
}

fn materializer(api: Arc<MockApi>, source: Arc<MockSource>, root: &TempDir) -> Materializer {
    Materializer::new(api, source, Arc::new(RateLimiter::default()), root.path())
        .with_download_config(test_config())
        .with_poll_config(poll_config(5))
}

fn record_states(materializer: Materializer) -> (Materializer, Arc<Mutex<Vec<RunState>>>) {
    let states: Arc<Mutex<Vec<RunState>>> = Arc::default();
    let sink = states.clone();
    let materializer = materializer
        .with_state_observer(Arc::new(move |s: &RunState| sink.lock().unwrap().push(s.clone())));
    (materializer, states)
}

#[tokio::test(start_paused = true)]
async fn test_run_materializes_and_merges() {
    let root = TempDir::new().unwrap();
    let (api, source) = fixture(&[ReportStatus::Created, ReportStatus::Processing, ReportStatus::Completed]);
    let api = Arc::new(api);
    let (materializer, states) = record_states(materializer(api.clone(), Arc::new(source), &root));

    let outcome = materializer.run(&ReportParams::new()).await.unwrap();

    assert_eq!(outcome.request_id, "req-1");
    assert_eq!(api.created.load(Ordering::SeqCst), 1);
    assert_eq!(api.polls.load(Ordering::SeqCst), 3);
    assert_eq!(outcome.instances.len(), 1, "instance without segments is skipped");

    let instance_dir = root.path().join("req-1").join("instance-i1");
    assert_eq!(outcome.instances[0].dir, instance_dir);
    for name in ["segment-001.csv", "segment-002.csv", "segment-003.csv"] {
        assert!(instance_dir.join(name).exists(), "{name} missing");
    }
    assert_eq!(
        std::fs::read_to_string(instance_dir.join("segment-002.csv")).unwrap(),
        "a,b\n2,y\n"
    );

    let merged = std::fs::read_to_string(instance_dir.join("merged.csv")).unwrap();
    assert_eq!(merged, "a,b\n1,x\n2,y\n3,z\n");

    let manifest = RunManifest::load(&outcome.manifest_path).unwrap();
    assert_eq!(outcome.manifest_path, root.path().join("req-1").join("manifest.json"));
    assert_eq!(manifest.request_id, "req-1");
    assert_eq!(manifest.written_count(), 3);
    assert_eq!(manifest.failed_count(), 0);
    assert_eq!(
        manifest.instances[0].merged.as_deref(),
        Some(instance_dir.join("merged.csv").as_path())
    );

    let states = states.lock().unwrap();
    assert_eq!(
        *states,
        vec![
            RunState::Requested,
            RunState::Polling(ReportStatus::Created),
            RunState::Polling(ReportStatus::Processing),
            RunState::Polling(ReportStatus::Completed),
            RunState::Fetching {
                instance_id: "i1".into(),
                index: 1,
                total: 1
            },
            RunState::Merging {
                instance_id: "i1".into()
            },
            RunState::Done,
        ]
    );
    assert!(!outcome.deleted);
}

#[tokio::test(start_paused = true)]
async fn test_provider_failure_is_terminal() {
    let root = TempDir::new().unwrap();
    let (api, source) = fixture(&[ReportStatus::Processing, ReportStatus::Failed]);
    let source = Arc::new(source);
    let (materializer, states) = record_states(materializer(Arc::new(api), source.clone(), &root));

    let err = materializer.run(&ReportParams::new()).await.unwrap_err();

    assert!(matches!(err, MaterializeError::ReportFailed { ref request_id } if request_id == "req-1"));
    assert_eq!(states.lock().unwrap().last(), Some(&RunState::Failed));
    assert_eq!(source.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_polling_ceiling_is_a_timeout() {
    let root = TempDir::new().unwrap();
    let (api, source) = fixture(&[ReportStatus::Processing]);
    let api = Arc::new(api);
    let materializer = materializer(api.clone(), Arc::new(source), &root)
        .with_poll_config(poll_config(3));

    let started = tokio::time::Instant::now();
    let err = materializer.resume("req-1").await.unwrap_err();

    assert!(matches!(err, MaterializeError::Timeout { attempts: 3, .. }));
    assert_eq!(api.polls.load(Ordering::SeqCst), 3);
    // no sleep after the final poll
    assert_eq!(started.elapsed(), Duration::from_secs(20));
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_interrupts_polling() {
    let root = TempDir::new().unwrap();
    let (api, source) = fixture(&[ReportStatus::Processing]);
    let api = Arc::new(api);
    let shutdown = ShutdownCoordinator::shared();
    let materializer = materializer(api.clone(), Arc::new(source), &root)
        .with_poll_config(poll_config(360))
        .with_shutdown(shutdown.clone());

    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            tokio::time::sleep(Duration::from_secs(25)).await;
            shutdown.request_shutdown();
        }
    });

    let err = materializer.resume("req-1").await.unwrap_err();

    assert!(matches!(err, MaterializeError::Cancelled { .. }));
    assert_eq!(api.polls.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn test_resume_skips_creation_and_existing_files() {
    let root = TempDir::new().unwrap();
    let (api, source) = fixture(&[ReportStatus::Completed]);
    let api = Arc::new(api);
    let source = Arc::new(source);
    let materializer = materializer(api.clone(), source.clone(), &root);

    materializer.resume("req-1").await.unwrap();
    assert_eq!(source.calls(), 3);

    let outcome = materializer.resume("req-1").await.unwrap();
    assert_eq!(api.created.load(Ordering::SeqCst), 0);
    assert_eq!(source.calls(), 3);
    assert_eq!(outcome.instances[0].report.resumed, 3);
    assert_eq!(outcome.files().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_no_instances_and_no_segments_are_distinct() {
    let root = TempDir::new().unwrap();

    let api = Arc::new(MockApi::new(&[ReportStatus::Completed]));
    let err = materializer(api, Arc::new(MockSource::new()), &root)
        .resume("req-1")
        .await
        .unwrap_err();
    assert!(matches!(err, MaterializeError::NoInstances { .. }));

    let api = Arc::new(
        MockApi::new(&[ReportStatus::Completed])
            .with_instance("i1", Vec::new())
            .with_instance("i2", Vec::new()),
    );
    let err = materializer(api, Arc::new(MockSource::new()), &root)
        .resume("req-1")
        .await
        .unwrap_err();
    assert!(matches!(err, MaterializeError::NoSegments { .. }));
}

#[tokio::test(start_paused = true)]
async fn test_delete_after_only_when_complete() {
    let root = TempDir::new().unwrap();
    let (api, source) = fixture(&[ReportStatus::Completed]);
    let api = Arc::new(api);
    let outcome = materializer(api.clone(), Arc::new(source), &root)
        .with_delete_after(true)
        .resume("req-1")
        .await
        .unwrap();
    assert!(outcome.deleted);
    assert_eq!(api.deletes.load(Ordering::SeqCst), 1);

    let other = TempDir::new().unwrap();
    let api = Arc::new(
        MockApi::new(&[ReportStatus::Completed])
            .with_instance("i1", vec![segment("present"), segment("absent")]),
    );
    let source = MockSource::new().with_payload(url("present"), b"a,b\n1,2\n".to_vec());
    let outcome = materializer(api.clone(), Arc::new(source), &other)
        .with_delete_after(true)
        .resume("req-1")
        .await
        .unwrap();
    assert_eq!(outcome.failed_count(), 1);
    assert!(!outcome.deleted);
    assert_eq!(api.deletes.load(Ordering::SeqCst), 0);

    let manifest = RunManifest::load(&outcome.manifest_path).unwrap();
    assert_eq!(manifest.instances[0].failed, vec!["absent"]);
}

#[tokio::test(start_paused = true)]
async fn test_merge_can_be_disabled() {
    let root = TempDir::new().unwrap();
    let (api, source) = fixture(&[ReportStatus::Completed]);
    let outcome = materializer(Arc::new(api), Arc::new(source), &root)
        .with_download_config(test_config().with_merge(false))
        .resume("req-1")
        .await
        .unwrap();

    assert!(outcome.instances[0].merged.is_none());
    assert!(!root.path().join("req-1/instance-i1/merged.csv").exists());
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_run_on_same_request_is_rejected() {
    let root = TempDir::new().unwrap();
    let (api, source) = fixture(&[ReportStatus::Completed]);
    let api = Arc::new(api);

    let mut lock = RunLock::open(&root.path().join("req-1").join(".lock")).unwrap();
    let _held = lock.try_exclusive().unwrap();

    let err = materializer(api.clone(), Arc::new(source), &root)
        .resume("req-1")
        .await
        .unwrap_err();
    assert!(matches!(err, MaterializeError::Output(OutputError::LockError(_))));
    assert_eq!(api.polls.load(Ordering::SeqCst), 0);
}
