//! End-to-end behavior through the service facade: retrying commands,
//! deferring offline work, and draining on reconnect

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use serde_json::json;

use amoria_resilience::{
    CommandOutcome, ConfigUpdate, MemoryStore, NoopConnection, OperationCommand, ResilienceConfig,
    ResilienceError, ResilienceService,
};

mod common;
use common::{fast_config, init_tracing, FlakyHandler, RecordingHandler, SwitchProbe};

async fn service(
    probe: Arc<SwitchProbe>,
    store: Arc<MemoryStore>,
    config: ResilienceConfig,
) -> Arc<ResilienceService> {
    init_tracing();
    Arc::new(ResilienceService::new(probe, store, Arc::new(NoopConnection), config).await)
}

#[tokio::test]
async fn run_command_completes_after_transient_failures() {
    let probe = SwitchProbe::new(true);
    let store = Arc::new(MemoryStore::new());
    let service = service(probe, store, fast_config()).await;

    let handler = FlakyHandler::new(2, || ResilienceError::backend("unavailable", "down"));
    service.register_handler("send_message", handler.clone()).await;

    let outcome = service
        .run_command(
            OperationCommand::new("send_message", json!({ "body": "hey" })),
            HashMap::new(),
        )
        .await
        .unwrap();

    assert_eq!(outcome, CommandOutcome::Completed(json!({ "body": "hey" })));
    assert_eq!(handler.call_count(), 3);
    assert_eq!(service.offline_queue_len().await, 0);
}

#[tokio::test]
async fn run_command_defers_offline_instead_of_failing() {
    let probe = SwitchProbe::new(false);
    let store = Arc::new(MemoryStore::new());
    let service = service(probe, store, fast_config()).await;

    let handler = FlakyHandler::new(0, || ResilienceError::network("unused"));
    service.register_handler("send_message", handler.clone()).await;

    let outcome = service
        .run_command(
            OperationCommand::new("send_message", json!({ "body": "hey" })),
            HashMap::new(),
        )
        .await
        .unwrap();

    match outcome {
        CommandOutcome::Queued(id) => assert!(!id.is_empty()),
        other => panic!("expected Queued, got {other:?}"),
    }
    // The handler never ran; the work waits for connectivity.
    assert_eq!(handler.call_count(), 0);
    assert_eq!(service.offline_queue_len().await, 1);
}

#[tokio::test]
async fn run_command_without_handler_is_an_error() {
    let probe = SwitchProbe::new(true);
    let store = Arc::new(MemoryStore::new());
    let service = service(probe, store, fast_config()).await;

    let result = service
        .run_command(
            OperationCommand::new("never_registered", json!({})),
            HashMap::new(),
        )
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn reconnect_drains_queued_work() {
    let probe = SwitchProbe::new(false);
    let store = Arc::new(MemoryStore::new());
    let service = service(probe.clone(), store, fast_config()).await;
    service.start().await;

    let handler = RecordingHandler::new();
    service.register_handler("send_message", handler.clone()).await;

    for label in ["first", "second"] {
        service
            .enqueue_offline(
                OperationCommand::new("send_message", json!({ "label": label })),
                HashMap::new(),
            )
            .await
            .unwrap();
    }
    assert_eq!(service.offline_queue_len().await, 2);

    probe.set_connected(true);
    service.handle_connectivity_change(true).await;

    // Give the background subscriber a moment to run the drain.
    for _ in 0..100 {
        if service.offline_queue_len().await == 0 && !service.is_queue_processing() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert_eq!(service.offline_queue_len().await, 0);
    assert_eq!(handler.executed().await, vec!["first", "second"]);
    service.shutdown().await;
}

#[tokio::test]
async fn queued_work_survives_a_restart() {
    let probe = SwitchProbe::new(false);
    let store = Arc::new(MemoryStore::new());

    {
        let service = service(probe.clone(), store.clone(), fast_config()).await;
        service
            .enqueue_offline(
                OperationCommand::new("send_message", json!({ "label": "persisted" })),
                HashMap::new(),
            )
            .await
            .unwrap();
    }

    // New service over the same store, as after an app relaunch.
    probe.set_connected(true);
    let service = service(probe, store, fast_config()).await;
    assert_eq!(service.offline_queue_len().await, 1);

    let handler = RecordingHandler::new();
    service.register_handler("send_message", handler.clone()).await;
    service.drain_now().await;

    assert_eq!(service.offline_queue_len().await, 0);
    assert_eq!(handler.executed().await, vec!["persisted"]);
}

#[tokio::test]
async fn config_update_changes_retry_behavior() {
    let probe = SwitchProbe::new(true);
    let store = Arc::new(MemoryStore::new());
    let service = service(probe, store, fast_config()).await;

    service
        .update_config(ConfigUpdate {
            max_retries: Some(1),
            ..Default::default()
        })
        .await;

    let handler = FlakyHandler::new(2, || ResilienceError::backend("deadline-exceeded", "slow"));
    service.register_handler("load_matches", handler.clone()).await;

    // With a single execution allowed, the first transient failure is final.
    let result = service
        .run_command(
            OperationCommand::new("load_matches", json!({})),
            HashMap::new(),
        )
        .await;
    assert!(result.is_err());
    assert_eq!(handler.call_count(), 1);
    assert_eq!(service.config().await.retry.max_retries, 1);
}

#[tokio::test]
async fn failures_are_visible_in_error_stats() {
    let probe = SwitchProbe::new(true);
    let store = Arc::new(MemoryStore::new());
    let service = service(probe, store, fast_config()).await;

    let handler = FlakyHandler::new(1, || ResilienceError::backend("unavailable", "down"));
    service.register_handler("send_message", handler.clone()).await;
    service
        .run_command(
            OperationCommand::new("send_message", json!({})),
            HashMap::new(),
        )
        .await
        .unwrap();

    let stats = service.error_stats(1).await;
    assert_eq!(stats.total, 1);
    assert_eq!(stats.by_operation["send_message"], 1);

    let recent = service.recent_errors(5).await;
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0].code.as_deref(), Some("unavailable"));
}

#[tokio::test]
async fn user_messages_come_from_the_taxonomy() {
    let probe = SwitchProbe::new(true);
    let store = Arc::new(MemoryStore::new());
    let service = service(probe, store, fast_config()).await;

    let error = ResilienceError::backend("unavailable", "raw transport detail");
    let message = service.error_message(&error);
    assert!(!message.contains("transport"));
    assert_eq!(message, ResilienceError::network("x").user_message());
}
