//! Integration tests for driving operations through an event channel

use escalator_core::DEFAULT_PROGRESS_CHANNEL;
use escalator_harness::{LocalEventBus, Recorder};
use escalator_runtime::{
    BridgeEvent, EscalationConfigManager, EscalationLevel, EventChannel, Operation,
    OperationManager, OperationStatus, PartialEscalationConfig, ProgressBridge, StartOptions,
};
use serde_json::json;
use std::sync::Arc;
use tokio::time::{sleep, Duration};
use tokio_test::assert_ok;

fn attached_bridge() -> (ProgressBridge, LocalEventBus, OperationManager) {
    let bus = LocalEventBus::new();
    let manager = OperationManager::new();
    let bridge = ProgressBridge::new(manager.clone(), Arc::new(bus.clone()));
    assert!(bridge.start());
    (bridge, bus, manager)
}

#[tokio::test(start_paused = true)]
async fn test_progress_then_complete() {
    let (_bridge, bus, manager) = attached_bridge();

    bus.emit(
        DEFAULT_PROGRESS_CHANNEL,
        json!({ "operationId": "x", "type": "progress", "progress": { "current": 25, "total": 100 } }),
    );
    let op = manager.get_operation("x").unwrap();
    assert_eq!(op.status, OperationStatus::Running);
    assert_eq!(op.progress.value(), Some(25.0));

    bus.emit(
        DEFAULT_PROGRESS_CHANNEL,
        json!({ "operationId": "x", "type": "complete", "result": "ok" }),
    );
    let op = manager.get_operation("x").unwrap();
    assert_eq!(op.status, OperationStatus::Completed);
    assert_eq!(op.result, Some(json!("ok")));
}

#[tokio::test(start_paused = true)]
async fn test_bridged_operation_escalates_like_any_other() {
    let (_bridge, bus, manager) = attached_bridge();
    let recorder = Recorder::new();
    manager.subscribe("reindex", recorder.sink());

    assert_ok!(bus.emit_json(DEFAULT_PROGRESS_CHANNEL, &BridgeEvent::progress("reindex", 1.0, 10.0)));
    sleep(Duration::from_millis(1_100)).await;
    assert_ok!(bus.emit_json(DEFAULT_PROGRESS_CHANNEL, &BridgeEvent::cancelled("reindex")));

    let op = manager.get_operation("reindex").unwrap();
    assert_eq!(op.status, OperationStatus::Cancelled);
    assert_eq!(op.escalation_level, EscalationLevel::Overlay);

    let last: Operation = recorder.last().unwrap();
    assert_eq!(last.status, OperationStatus::Cancelled);
}

#[tokio::test(start_paused = true)]
async fn test_events_for_locally_started_operation() {
    let (_bridge, bus, manager) = attached_bridge();
    let handle = assert_ok!(manager.start_operation(StartOptions::new("upload")));

    assert_ok!(bus.emit_json(
        DEFAULT_PROGRESS_CHANNEL,
        &BridgeEvent::progress("upload", 3.0, 4.0).with_message("chunk 3"),
    ));
    assert_ok!(bus.emit_json(DEFAULT_PROGRESS_CHANNEL, &BridgeEvent::error("upload", "quota exceeded")));

    let op = handle.snapshot().unwrap();
    assert_eq!(op.progress.value(), Some(75.0));
    assert_eq!(op.progress.message(), Some("chunk 3"));
    assert_eq!(op.status, OperationStatus::Failed);
    assert_eq!(op.error.unwrap().to_string(), "quota exceeded");
}

#[tokio::test(start_paused = true)]
async fn test_events_after_finish_are_ignored() {
    let (_bridge, bus, manager) = attached_bridge();

    assert_ok!(bus.emit_json(DEFAULT_PROGRESS_CHANNEL, &BridgeEvent::progress("x", 1.0, 2.0)));
    assert_ok!(bus.emit_json(DEFAULT_PROGRESS_CHANNEL, &BridgeEvent::complete("x", None)));
    assert_ok!(bus.emit_json(DEFAULT_PROGRESS_CHANNEL, &BridgeEvent::error("x", "late")));
    assert_ok!(bus.emit_json(DEFAULT_PROGRESS_CHANNEL, &BridgeEvent::progress("x", 2.0, 2.0)));

    let op = manager.get_operation("x").unwrap();
    assert_eq!(op.status, OperationStatus::Completed);
    assert!(op.error.is_none());
    assert_eq!(op.progress.value(), Some(50.0));
}

#[tokio::test(start_paused = true)]
async fn test_auto_started_operations_use_global_layer() {
    let configs = Arc::new(EscalationConfigManager::new());
    configs.set_global_config(PartialEscalationConfig::new().timeout_ms(400));
    let manager = OperationManager::builder()
        .with_config_manager(configs)
        .build();
    let bus = LocalEventBus::new();
    let bridge = ProgressBridge::new(manager.clone(), Arc::new(bus.clone()));
    bridge.start();

    assert_ok!(bus.emit_json(DEFAULT_PROGRESS_CHANNEL, &BridgeEvent::progress("sync", 0.0, 1.0)));
    sleep(Duration::from_millis(450)).await;

    let op = manager.get_operation("sync").unwrap();
    assert_eq!(op.status, OperationStatus::Failed);
    assert!(op.error.unwrap().is_timeout());
}

#[tokio::test(start_paused = true)]
async fn test_disposed_bridge_stops_listening() {
    let (bridge, bus, manager) = attached_bridge();
    assert!(bridge.dispose());

    bus.emit(
        DEFAULT_PROGRESS_CHANNEL,
        json!({ "operationId": "x", "type": "progress", "progress": { "current": 1, "total": 2 } }),
    );
    assert!(manager.get_operation("x").is_none());

    drop(bridge);
    assert_eq!(bus.listener_count(DEFAULT_PROGRESS_CHANNEL), 0);
}
