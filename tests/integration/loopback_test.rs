//! End-to-end tests against the loopback bridge with real files on disk.

mod helpers;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use helpers::{runtime_config, test_credentials, wait_for};
use uplift_bridge::MemoryBridge;
use uplift_core::tier::UploadTier;
use uplift_core::types::UploadStatus;
use uplift_engine::{EngineOptions, ReconciliationEngine, UploadManager};

const MIB: usize = 1_048_576;

fn write_file(dir: &tempfile::TempDir, name: &str, size: usize) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, vec![0u8; size]).unwrap();
    path
}

fn loopback(tier: UploadTier, files: Vec<PathBuf>) -> (Arc<MemoryBridge>, UploadManager) {
    let runtime = runtime_config(tier);
    let bridge = Arc::new(
        MemoryBridge::new(64, Duration::from_millis(50)).with_picker_candidates(files),
    );
    let engine = ReconciliationEngine::new(bridge.clone(), EngineOptions::from_config(&runtime));
    (bridge, UploadManager::new(engine, &runtime, test_credentials()))
}

#[tokio::test(start_paused = true)]
async fn test_free_tier_uploads_two_files_to_completion() {
    let dir = tempfile::tempdir().unwrap();
    let a = write_file(&dir, "a.bin", MIB);
    let b = write_file(&dir, "b.bin", 2 * MIB);
    let (_bridge, manager) = loopback(UploadTier::Free, vec![a, b]);

    manager.connect().await.unwrap();
    let selection = manager.pick_files(true, None).await.unwrap();
    assert_eq!(selection.count, 2);
    assert_eq!(selection.total_size, 3 * MIB as u64);

    manager.start().await.unwrap();
    let snapshot = wait_for(manager.engine(), |s| !s.is_uploading).await;

    assert_eq!(snapshot.items.len(), 2);
    assert_eq!(snapshot.stats.completed_count, 2);
    assert_eq!(snapshot.stats.uploaded_bytes, 3 * MIB as u64);
    assert_eq!(snapshot.stats.rounded_progress(), 100);
    assert!(snapshot.items.iter().all(|i| i.status == UploadStatus::Completed));
    assert!(snapshot.items.iter().all(|i| i.s3_key.starts_with("uploads/")));
    assert!(snapshot.last_error.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_failed_item_retries_and_completes() {
    let dir = tempfile::tempdir().unwrap();
    let a = write_file(&dir, "a.bin", MIB);
    let b = write_file(&dir, "b.bin", 2 * MIB);
    let (bridge, manager) = loopback(UploadTier::Premium, vec![a, b]);
    bridge.fail_first_attempt("b.bin").await;

    manager.connect().await.unwrap();
    manager.pick_files(true, None).await.unwrap();
    manager.start().await.unwrap();

    let snapshot = wait_for(manager.engine(), |s| !s.is_uploading).await;
    assert_eq!(snapshot.stats.completed_count, 1);
    assert_eq!(snapshot.stats.failed_count, 1);
    let failed = snapshot
        .items
        .iter()
        .find(|i| i.file_name == "b.bin")
        .unwrap()
        .clone();
    assert_eq!(failed.status, UploadStatus::Failed);
    assert!(failed.error_message.is_some());

    manager.retry(&failed.id).await.unwrap();
    manager.start().await.unwrap();

    let snapshot = wait_for(manager.engine(), |s| !s.is_uploading).await;
    assert_eq!(snapshot.items.len(), 2);
    assert_eq!(snapshot.stats.completed_count, 2);
    let retried = snapshot.items.iter().find(|i| i.id == failed.id).unwrap();
    assert_eq!(retried.status, UploadStatus::Completed);
    assert_eq!(retried.retry_count, 1);
}

#[tokio::test(start_paused = true)]
async fn test_free_tier_refuses_second_batch_while_pending() {
    let dir = tempfile::tempdir().unwrap();
    let a = write_file(&dir, "a.bin", MIB);
    let (_bridge, manager) = loopback(UploadTier::Free, vec![a]);

    manager.connect().await.unwrap();
    manager.pick_files(false, None).await.unwrap();
    manager.start().await.unwrap();
    manager.stop().await.unwrap();

    manager.pick_files(false, None).await.unwrap();
    let err = manager.start().await.unwrap_err();
    assert_eq!(err.kind, uplift_core::error::ErrorKind::Submission);
    let snapshot = manager.snapshot().await;
    assert!(!snapshot.is_uploading);
    assert_eq!(snapshot.items.len(), 1);
}
