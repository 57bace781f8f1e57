//! Integration tests for event/poll reconciliation and queue completion.

mod helpers;

use std::sync::{Arc, Mutex};

use helpers::{FakeBridge, runtime_config, wait_for, wait_for_calls, wait_until};
use uplift_core::error::ErrorKind;
use uplift_core::tier::UploadTier;
use uplift_core::types::{ProgressEvent, UploadItem, UploadStatus};
use uplift_engine::{ApplyOutcome, IgnoreReason, QueuePhase, UploadManager};

const A: &str = "/data/a.bin";
const B: &str = "/data/b.bin";
const C: &str = "/data/c.bin";
const MIB: u64 = 1_048_576;

async fn collect_completions(manager: &UploadManager) -> Arc<Mutex<Vec<String>>> {
    let completed = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&completed);
    manager
        .engine()
        .on_complete(move |items| {
            sink.lock().unwrap().extend(items.into_iter().map(|i| i.id));
        })
        .await;
    completed
}

#[tokio::test]
async fn test_two_files_upload_end_to_end() {
    let bridge = FakeBridge::new(&[(A, MIB), (B, 2 * MIB)]);
    let manager = helpers::manager(bridge.clone(), &runtime_config(UploadTier::Premium));
    let completed = collect_completions(&manager).await;

    manager.connect().await.unwrap();
    let selection = manager.pick_files(true, None).await.unwrap();
    assert_eq!(selection.total_size, 3 * MIB);
    manager.start().await.unwrap();

    let snapshot = manager.snapshot().await;
    assert!(snapshot.is_uploading);
    assert_eq!(snapshot.items.len(), 2);
    assert!(snapshot.staged.is_none());

    bridge.progress(A, MIB / 2, MIB, UploadStatus::InProgress).await;
    let snapshot = wait_for(manager.engine(), |s| s.stats.uploaded_bytes == MIB / 2).await;
    assert_eq!(snapshot.stats.rounded_progress(), 17);
    assert_eq!(snapshot.stats.active_speed_mbps, 2.0);

    bridge.progress(A, MIB, MIB, UploadStatus::Completed).await;
    bridge.progress(B, 2 * MIB, 2 * MIB, UploadStatus::Completed).await;

    let snapshot = wait_for(manager.engine(), |s| !s.is_uploading).await;
    assert_eq!(snapshot.stats.overall_progress_percent, 100.0);
    assert_eq!(snapshot.stats.completed_count, 2);
    assert_eq!(snapshot.phase, QueuePhase::Idle);

    wait_until(|| completed.lock().unwrap().len() == 2).await;
    let mut ids = completed.lock().unwrap().clone();
    ids.sort();
    assert_eq!(ids, vec![A.to_string(), B.to_string()]);

    wait_for_calls(&bridge, "stop_processing", 1).await;
}

#[tokio::test]
async fn test_completion_reports_only_completed_items() {
    let bridge = FakeBridge::new(&[(A, 100), (B, 100), (C, 100)]);
    let manager = helpers::manager(bridge.clone(), &runtime_config(UploadTier::Premium));
    let completed = collect_completions(&manager).await;

    manager.connect().await.unwrap();
    manager.pick_files(true, None).await.unwrap();
    manager.start().await.unwrap();

    bridge.progress(A, 100, 100, UploadStatus::Completed).await;
    bridge.fail(B, 40, 100, "connection reset").await;
    bridge.progress(C, 100, 100, UploadStatus::Completed).await;

    let snapshot = wait_for(manager.engine(), |s| !s.is_uploading).await;
    assert_eq!(snapshot.stats.failed_count, 1);
    let failed = snapshot.items.iter().find(|i| i.id == B).unwrap();
    assert_eq!(failed.error_message.as_deref(), Some("connection reset"));

    wait_until(|| completed.lock().unwrap().len() == 2).await;
    let ids = completed.lock().unwrap().clone();
    assert!(ids.contains(&A.to_string()));
    assert!(ids.contains(&C.to_string()));
    assert!(!ids.contains(&B.to_string()));
}

#[tokio::test]
async fn test_poll_ignored_while_uploading() {
    let bridge = FakeBridge::new(&[(A, 1000)]);
    let manager = helpers::manager(bridge.clone(), &runtime_config(UploadTier::Free));
    manager.connect().await.unwrap();
    manager.pick_files(false, None).await.unwrap();
    manager.start().await.unwrap();

    bridge.progress(A, 600, 1000, UploadStatus::InProgress).await;
    wait_for(manager.engine(), |s| s.stats.uploaded_bytes == 600).await;

    // The backend regresses; a snapshot must not clobber the event state.
    bridge.backend.lock().await.items[0].uploaded_bytes = 0;
    let outcome = manager.engine().refresh().await.unwrap();
    assert_eq!(outcome, ApplyOutcome::Ignored(IgnoreReason::UploadInProgress));
    assert_eq!(manager.snapshot().await.stats.uploaded_bytes, 600);
}

#[tokio::test]
async fn test_events_out_of_range_are_clamped() {
    let bridge = FakeBridge::new(&[(A, 1000)]);
    let manager = helpers::manager(bridge.clone(), &runtime_config(UploadTier::Free));
    manager.connect().await.unwrap();
    manager.pick_files(false, None).await.unwrap();
    manager.start().await.unwrap();

    let mut event = ProgressEvent::from_bytes(A, 5000, 1000, f64::INFINITY, UploadStatus::InProgress);
    event.percentage = 180.0;
    bridge.emit(event).await;

    let snapshot = wait_for(manager.engine(), |s| s.stats.uploaded_bytes > 0).await;
    let item = &snapshot.items[0];
    assert_eq!(item.uploaded_bytes, 1000);
    assert_eq!(item.progress, 100.0);
    assert_eq!(item.speed_mbps, 0.0);
    assert_eq!(snapshot.stats.overall_progress_percent, 100.0);
    assert!(snapshot.is_uploading);
}

#[tokio::test]
async fn test_retry_is_forwarded_without_local_mutation() {
    let bridge = FakeBridge::new(&[(A, 100)]);
    let manager = helpers::manager(bridge.clone(), &runtime_config(UploadTier::Free));
    manager.connect().await.unwrap();
    manager.pick_files(false, None).await.unwrap();
    manager.start().await.unwrap();

    bridge.fail(A, 30, 100, "timeout").await;
    wait_for(manager.engine(), |s| !s.is_uploading).await;

    manager.retry(A).await.unwrap();
    let snapshot = manager.snapshot().await;
    assert_eq!(snapshot.items.len(), 1);
    assert_eq!(snapshot.items[0].status, UploadStatus::Failed);

    // Second retry is refused by the backend; nothing is duplicated.
    let err = manager.retry(A).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Conflict);
    assert_eq!(bridge.calls("retry_item").await, 2);

    manager.engine().refresh().await.unwrap();
    let snapshot = manager.snapshot().await;
    assert_eq!(snapshot.items.len(), 1);
    assert_eq!(snapshot.items[0].status, UploadStatus::Pending);
    assert_eq!(snapshot.items[0].retry_count, 1);
}

#[tokio::test]
async fn test_restart_after_retry_resumes_backend_queue() {
    let bridge = FakeBridge::new(&[(A, 100)]);
    let manager = helpers::manager(bridge.clone(), &runtime_config(UploadTier::Free));
    manager.connect().await.unwrap();
    manager.pick_files(false, None).await.unwrap();
    manager.start().await.unwrap();

    bridge.fail(A, 30, 100, "timeout").await;
    wait_for(manager.engine(), |s| !s.is_uploading).await;
    manager.retry(A).await.unwrap();

    manager.start().await.unwrap();
    assert!(manager.snapshot().await.is_uploading);
    assert_eq!(bridge.calls("add_files_to_queue").await, 1);

    bridge.progress(A, 100, 100, UploadStatus::Completed).await;
    let snapshot = wait_for(manager.engine(), |s| !s.is_uploading).await;
    assert_eq!(snapshot.stats.completed_count, 1);
}

#[tokio::test]
async fn test_submission_failure_leaves_state_untouched() {
    let bridge = FakeBridge::new(&[(A, 100)]);
    let manager = helpers::manager(bridge.clone(), &runtime_config(UploadTier::Free));
    manager.connect().await.unwrap();
    manager.pick_files(false, None).await.unwrap();
    bridge.backend.lock().await.fail_add = true;

    let err = manager.start().await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Submission);

    let snapshot = manager.snapshot().await;
    assert!(!snapshot.is_uploading);
    assert_eq!(snapshot.phase, QueuePhase::Idle);
    assert!(snapshot.items.is_empty());
    assert_eq!(snapshot.staged.map(|s| s.count), Some(1));
    assert_eq!(snapshot.last_error.as_deref(), Some("Backend rejected the files"));
    assert_eq!(bridge.calls("start_processing").await, 0);
}

#[tokio::test]
async fn test_start_failure_returns_to_idle() {
    let bridge = FakeBridge::new(&[(A, 100)]);
    let manager = helpers::manager(bridge.clone(), &runtime_config(UploadTier::Free));
    manager.connect().await.unwrap();
    manager.pick_files(false, None).await.unwrap();
    bridge.backend.lock().await.fail_start = true;

    let err = manager.start().await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Processing);
    let snapshot = manager.snapshot().await;
    assert!(!snapshot.is_uploading);
    assert_eq!(snapshot.items.len(), 1);
    assert!(snapshot.last_error.is_some());
}

#[tokio::test]
async fn test_stop_never_sticks_in_uploading() {
    let bridge = FakeBridge::new(&[(A, 100)]);
    let manager = helpers::manager(bridge.clone(), &runtime_config(UploadTier::Free));
    manager.connect().await.unwrap();
    manager.pick_files(false, None).await.unwrap();
    manager.start().await.unwrap();
    bridge.backend.lock().await.fail_stop = true;

    assert!(manager.stop().await.is_err());
    let snapshot = manager.snapshot().await;
    assert!(!snapshot.is_uploading);
    assert_eq!(snapshot.last_error.as_deref(), Some("Backend unreachable"));

    manager.dismiss_error().await;
    assert!(manager.snapshot().await.last_error.is_none());
}

#[tokio::test]
async fn test_remove_and_clear() {
    let bridge = FakeBridge::new(&[(A, 100), (B, 200)]);
    let manager = helpers::manager(bridge.clone(), &runtime_config(UploadTier::Premium));
    manager.connect().await.unwrap();
    manager.pick_files(true, None).await.unwrap();
    manager.start().await.unwrap();
    manager.stop().await.unwrap();

    manager.remove(A).await.unwrap();
    let snapshot = manager.snapshot().await;
    assert_eq!(snapshot.items.len(), 1);
    assert_eq!(snapshot.stats.total_bytes, 200);

    let err = manager.remove(A).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);
    assert_eq!(manager.snapshot().await.items.len(), 1);

    manager.clear().await.unwrap();
    let snapshot = manager.snapshot().await;
    assert!(snapshot.items.is_empty());
    assert!(snapshot.staged.is_none());
    assert_eq!(snapshot.stats.total_count, 0);
}

#[tokio::test]
async fn test_stop_during_submission_wins() {
    let bridge = FakeBridge::new(&[(A, 100)]);
    let manager = helpers::manager(bridge.clone(), &runtime_config(UploadTier::Free));
    manager.connect().await.unwrap();
    manager.pick_files(false, None).await.unwrap();

    // Holding the backend parks `add_files_to_queue` while the stop lands.
    let backend = bridge.backend.lock().await;
    let stopper = async {
        wait_for(manager.engine(), |s| s.phase == QueuePhase::Submitting).await;
        drop(backend);
        manager.stop().await
    };
    let (started, stopped) = tokio::join!(manager.start(), stopper);

    stopped.unwrap();
    assert_eq!(started.unwrap_err().kind, ErrorKind::Conflict);
    let snapshot = manager.snapshot().await;
    assert_eq!(snapshot.phase, QueuePhase::Idle);
    assert!(!snapshot.is_uploading);
    assert!(snapshot.staged.is_none());
    assert_eq!(bridge.calls("add_files_to_queue").await, 1);
    assert_eq!(bridge.calls("start_processing").await, 0);
}

fn fast_polling(tier: UploadTier) -> uplift_core::config::upload::UploadRuntimeConfig {
    let mut runtime = runtime_config(tier);
    runtime.poll_interval_ms = 5;
    runtime
}

#[tokio::test]
async fn test_idle_engine_polls_backend_changes() {
    let bridge = FakeBridge::new(&[]);
    let manager = helpers::manager(bridge.clone(), &fast_polling(UploadTier::Free));
    manager.connect().await.unwrap();

    bridge
        .backend
        .lock()
        .await
        .items
        .push(UploadItem::pending(A, A, "a.bin", 100, "uploads/a.bin"));

    let snapshot = wait_for(manager.engine(), |s| s.items.len() == 1).await;
    assert_eq!(snapshot.items[0].id, A);
    assert_eq!(snapshot.stats.total_bytes, 100);
    assert!(snapshot.backend_stats.is_some());
}

#[tokio::test]
async fn test_polling_suspended_while_uploading_and_resumed_after_stop() {
    let bridge = FakeBridge::new(&[(A, 1000)]);
    let manager = helpers::manager(bridge.clone(), &fast_polling(UploadTier::Free));
    manager.connect().await.unwrap();
    manager.pick_files(false, None).await.unwrap();
    manager.start().await.unwrap();

    bridge.progress(A, 600, 1000, UploadStatus::InProgress).await;
    wait_for(manager.engine(), |s| s.stats.uploaded_bytes == 600).await;

    bridge.backend.lock().await.items[0].uploaded_bytes = 0;
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    assert_eq!(manager.snapshot().await.stats.uploaded_bytes, 600);

    manager.stop().await.unwrap();
    let snapshot = wait_for(manager.engine(), |s| s.stats.uploaded_bytes == 0).await;
    assert_eq!(snapshot.phase, QueuePhase::Idle);
}
