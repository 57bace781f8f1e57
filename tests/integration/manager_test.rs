//! Integration tests for the upload manager: tiers, credentials and limits.

mod helpers;

use helpers::{FakeBridge, runtime_config, test_credentials, wait_for, wait_for_listeners};
use uplift_core::error::ErrorKind;
use uplift_core::tier::{UploadSettings, UploadTier, resolve};
use uplift_core::types::{AwsCredentials, UploadStatus};
use uplift_engine::{EngineOptions, ReconciliationEngine, UploadManager};

const A: &str = "/data/a.bin";
const B: &str = "/data/b.bin";

#[tokio::test]
async fn test_tier_switch_replaces_entire_config() {
    let bridge = FakeBridge::new(&[(A, 100)]);
    let mut manager = helpers::manager(bridge.clone(), &runtime_config(UploadTier::Free));
    manager.connect().await.unwrap();
    assert_eq!(
        bridge.last_config().await.unwrap(),
        resolve(test_credentials(), "test-bucket", UploadTier::Free)
    );

    manager.change_tier(UploadTier::Premium).await.unwrap();
    let premium = resolve(test_credentials(), "test-bucket", UploadTier::Premium);
    assert_eq!(manager.config(), &premium);
    assert_eq!(bridge.last_config().await.unwrap(), premium);
    assert_eq!(manager.config().max_concurrent_uploads, 8);
    assert!(manager.config().enable_resume);

    manager.change_tier(UploadTier::Free).await.unwrap();
    let free = manager.config();
    assert_eq!(free.max_concurrent_uploads, 1);
    assert_eq!(free.max_concurrent_parts, 1);
    assert_eq!(free.chunk_size_mb, 5);
    assert_eq!(free.max_chunk_size_mb, 5);
    assert_eq!(free.retry_attempts, 3);
    assert_eq!(free.timeout_seconds, 600);
    assert!(!free.adaptive_chunk_size);
    assert!(!free.enable_resume);
    assert_eq!(bridge.calls("initialize_queue").await, 3);
}

#[tokio::test]
async fn test_tier_switch_replaces_progress_listener() {
    let bridge = FakeBridge::new(&[(A, 100)]);
    let mut manager = helpers::manager(bridge.clone(), &runtime_config(UploadTier::Free));
    manager.connect().await.unwrap();
    wait_for_listeners(&bridge, 1).await;

    manager.change_tier(UploadTier::Premium).await.unwrap();
    assert_eq!(bridge.calls("on_progress").await, 2);
    wait_for_listeners(&bridge, 1).await;

    // The new session receives events.
    manager.pick_files(true, None).await.unwrap();
    manager.start().await.unwrap();
    bridge.progress(A, 50, 100, UploadStatus::InProgress).await;
    let snapshot = wait_for(manager.engine(), |s| s.stats.uploaded_bytes == 50).await;
    assert_eq!(snapshot.items.len(), 1);
}

#[tokio::test]
async fn test_tier_switch_discards_local_queue() {
    let bridge = FakeBridge::new(&[(A, 100)]);
    let mut manager = helpers::manager(bridge.clone(), &runtime_config(UploadTier::Free));
    manager.connect().await.unwrap();
    manager.pick_files(false, None).await.unwrap();
    manager.start().await.unwrap();
    manager.stop().await.unwrap();
    assert_eq!(manager.snapshot().await.items.len(), 1);

    manager.change_tier(UploadTier::Premium).await.unwrap();
    let snapshot = manager.snapshot().await;
    assert!(snapshot.items.is_empty());
    assert_eq!(manager.tier(), UploadTier::Premium);
}

#[tokio::test]
async fn test_tier_switch_refused_while_uploading() {
    let bridge = FakeBridge::new(&[(A, 100)]);
    let mut manager = helpers::manager(bridge.clone(), &runtime_config(UploadTier::Free));
    manager.connect().await.unwrap();
    manager.pick_files(false, None).await.unwrap();
    manager.start().await.unwrap();

    let err = manager.change_tier(UploadTier::Premium).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Conflict);
    assert_eq!(manager.tier(), UploadTier::Free);
    assert_eq!(bridge.calls("initialize_queue").await, 1);
}

#[tokio::test]
async fn test_selection_over_free_cap_is_rejected() {
    let bridge = FakeBridge::new(&[(A, 600), (B, 600)]);
    let mut runtime = runtime_config(UploadTier::Free);
    runtime.free_max_selection_bytes = 1000;
    let mut manager = helpers::manager(bridge.clone(), &runtime);
    manager.connect().await.unwrap();

    let err = manager.pick_files(true, None).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Validation);
    let snapshot = manager.snapshot().await;
    assert!(snapshot.staged.is_none());
    assert!(snapshot.last_error.is_some());

    // Start has nothing to submit and never reaches the backend queue.
    assert!(manager.start().await.is_err());
    assert_eq!(bridge.calls("add_files_to_queue").await, 0);

    manager.change_tier(UploadTier::Premium).await.unwrap();
    let selection = manager.pick_files(true, None).await.unwrap();
    assert_eq!(selection.total_size, 1200);
}

#[tokio::test]
async fn test_missing_credentials_block_operations() {
    let bridge = FakeBridge::new(&[(A, 100)]);
    let runtime = runtime_config(UploadTier::Free);
    let engine = ReconciliationEngine::new(bridge.clone(), EngineOptions::from_config(&runtime));
    let manager = UploadManager::new(engine, &runtime, AwsCredentials::default());

    let err = manager.connect().await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Configuration);
    assert_eq!(bridge.calls("initialize_queue").await, 0);

    let err = manager.start().await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Configuration);
    assert_eq!(bridge.calls("add_files_to_queue").await, 0);
    assert_eq!(
        manager.snapshot().await.last_error.as_deref(),
        Some("AWS access key ID is not set")
    );
}

#[tokio::test]
async fn test_missing_bucket_blocks_operations() {
    let bridge = FakeBridge::new(&[(A, 100)]);
    let mut runtime = runtime_config(UploadTier::Free);
    runtime.bucket = String::new();
    let manager = helpers::manager(bridge.clone(), &runtime);

    let err = manager.connect().await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Configuration);
    assert_eq!(bridge.calls("initialize_queue").await, 0);
}

#[tokio::test]
async fn test_change_credentials_opens_new_session() {
    let bridge = FakeBridge::new(&[(A, 100)]);
    let mut manager = helpers::manager(bridge.clone(), &runtime_config(UploadTier::Premium));
    manager.connect().await.unwrap();

    let mut credentials = test_credentials();
    credentials.region = "eu-west-1".to_string();
    manager
        .change_credentials(credentials.clone(), "other-bucket")
        .await
        .unwrap();
    let config = bridge.last_config().await.unwrap();
    assert_eq!(config.bucket_name, "other-bucket");
    assert_eq!(config.aws_credentials.region, "eu-west-1");
    assert_eq!(config.tier, UploadTier::Premium);

    let err = manager
        .change_credentials(credentials, "  ")
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Configuration);
    assert_eq!(manager.config().bucket_name, "other-bucket");
    assert_eq!(bridge.calls("initialize_queue").await, 2);
}

#[tokio::test]
async fn test_apply_settings_only_on_premium() {
    let bridge = FakeBridge::new(&[(A, 100)]);
    let mut manager = helpers::manager(bridge.clone(), &runtime_config(UploadTier::Free));
    manager.connect().await.unwrap();

    let mut settings = manager.config().settings();
    settings.chunk_size_mb = 10;
    settings.max_chunk_size_mb = 10;
    let err = manager.apply_settings(&settings).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Configuration);
    assert_eq!(manager.config().chunk_size_mb, 5);

    manager.change_tier(UploadTier::Premium).await.unwrap();
    let settings = UploadSettings {
        max_concurrent_uploads: 4,
        chunk_size_mb: 50,
        ..manager.config().settings()
    };
    manager.apply_settings(&settings).await.unwrap();
    assert_eq!(manager.config().max_concurrent_uploads, 4);
    assert_eq!(manager.config().chunk_size_mb, 50);
    assert_eq!(bridge.last_config().await.unwrap().chunk_size_mb, 50);

    let invalid = UploadSettings {
        max_concurrent_uploads: 0,
        ..manager.config().settings()
    };
    let err = manager.apply_settings(&invalid).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Validation);
    assert_eq!(manager.config().max_concurrent_uploads, 4);
}

#[tokio::test]
async fn test_failed_subscription_keeps_previous_session() {
    let bridge = FakeBridge::new(&[(A, 100)]);
    let mut manager = helpers::manager(bridge.clone(), &runtime_config(UploadTier::Free));
    manager.connect().await.unwrap();
    wait_for_listeners(&bridge, 1).await;
    bridge.backend.lock().await.fail_subscribe = true;

    let err = manager.change_tier(UploadTier::Premium).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Transport);
    assert_eq!(manager.tier(), UploadTier::Free);
    assert_eq!(bridge.calls("initialize_queue").await, 1);
    assert_eq!(
        manager.snapshot().await.last_error.as_deref(),
        Some("Progress channel unavailable")
    );

    // The original listener still feeds the engine.
    wait_for_listeners(&bridge, 1).await;
    manager.pick_files(false, None).await.unwrap();
    manager.start().await.unwrap();
    bridge.progress(A, 100, 100, UploadStatus::Completed).await;
    let snapshot = wait_for(manager.engine(), |s| !s.is_uploading).await;
    assert_eq!(snapshot.stats.completed_count, 1);
}
