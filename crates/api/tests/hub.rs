//! Unit tests for the realtime hub, driven through `HubHandle` without any
//! HTTP upgrade.

use std::time::Duration;

use axum::extract::ws::Message;
use quill_api::ws::{Hub, HubHandle};
use quill_core::envelope::EventEnvelope;
use quill_core::realtime::SubscriptionTarget;
use quill_core::types::new_id;
use quill_events::EventBus;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

fn spawn_hub(buffer: usize) -> HubHandle {
    let (hub, _task) = Hub::spawn(buffer, None, CancellationToken::new());
    hub
}

fn note_event(id: &str) -> Value {
    json!({
        "event_id": new_id(),
        "entity": "note",
        "type": "note.updated",
        "note_id": id,
        "data": { "id": id, "title": "Groceries" },
    })
}

async fn next_json(rx: &mut mpsc::Receiver<Message>) -> Value {
    let message = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("timed out waiting for a frame")
        .expect("channel closed");
    match message {
        Message::Text(text) => serde_json::from_str(text.as_str()).unwrap(),
        other => panic!("expected a text frame, got {other:?}"),
    }
}

/// Everything queued so far, after a round trip through the hub so all
/// earlier commands have been applied.
async fn drain(hub: &HubHandle, rx: &mut mpsc::Receiver<Message>) -> Vec<Message> {
    hub.connection_count().await;
    let mut frames = Vec::new();
    while let Ok(frame) = rx.try_recv() {
        frames.push(frame);
    }
    frames
}

// ---------------------------------------------------------------------------
// Registration
// ---------------------------------------------------------------------------

#[tokio::test]
async fn register_and_unregister_track_connection_count() {
    let hub = spawn_hub(8);
    assert_eq!(hub.connection_count().await, 0);

    let (a, _rx_a) = hub.register(new_id()).await.unwrap();
    let (_b, _rx_b) = hub.register(new_id()).await.unwrap();
    assert_eq!(hub.connection_count().await, 2);

    hub.unregister(a).await;
    hub.unregister(new_id()).await;
    assert_eq!(hub.connection_count().await, 1);
}

// ---------------------------------------------------------------------------
// Subscriptions
// ---------------------------------------------------------------------------

#[tokio::test]
async fn new_subscription_is_confirmed_once() {
    let hub = spawn_hub(8);
    let (client, mut rx) = hub.register(new_id()).await.unwrap();
    let target = SubscriptionTarget::new("note", Some("123".into()));

    assert!(hub.subscribe(client, target.clone()).await.unwrap());
    assert!(!hub.subscribe(client, target).await.unwrap());

    let confirmation = next_json(&mut rx).await;
    assert_eq!(confirmation["type"], "subscription");
    assert_eq!(confirmation["event"], "confirmed");
    assert_eq!(confirmation["payload"], json!({ "resource": "note", "id": "123" }));
    assert!(drain(&hub, &mut rx).await.is_empty());
}

#[tokio::test]
async fn resource_subscription_only_receives_that_resource() {
    let hub = spawn_hub(8);
    let (client, mut rx) = hub.register(new_id()).await.unwrap();
    hub.subscribe(client, SubscriptionTarget::new("note", Some("123".into())))
        .await
        .unwrap();
    next_json(&mut rx).await;

    assert_eq!(hub.broadcast(note_event("456")).await.unwrap(), 0);
    assert_eq!(hub.broadcast(note_event("123")).await.unwrap(), 1);

    let frame = next_json(&mut rx).await;
    assert_eq!(frame["type"], "event");
    assert_eq!(frame["event"], "note.updated");
    assert_eq!(frame["payload"]["note_id"], "123");
    assert!(drain(&hub, &mut rx).await.is_empty());
}

#[tokio::test]
async fn all_subscription_receives_everything() {
    let hub = spawn_hub(8);
    let (client, mut rx) = hub.register(new_id()).await.unwrap();
    hub.subscribe(client, SubscriptionTarget::new("all", None))
        .await
        .unwrap();
    next_json(&mut rx).await;

    hub.broadcast(note_event("1")).await.unwrap();
    hub.broadcast(json!({ "entity": "block", "type": "block.created", "block_id": "b1" }))
        .await
        .unwrap();

    assert_eq!(next_json(&mut rx).await["event"], "note.updated");
    assert_eq!(next_json(&mut rx).await["event"], "block.created");
}

#[tokio::test]
async fn unroutable_event_reaches_only_all_subscribers() {
    let hub = spawn_hub(8);
    let (everything, mut rx_all) = hub.register(new_id()).await.unwrap();
    let (notes, mut rx_notes) = hub.register(new_id()).await.unwrap();
    hub.subscribe(everything, SubscriptionTarget::new("all", None))
        .await
        .unwrap();
    hub.subscribe(notes, SubscriptionTarget::new("note", None))
        .await
        .unwrap();
    next_json(&mut rx_all).await;
    next_json(&mut rx_notes).await;

    let maintenance = json!({
        "event_id": new_id(),
        "type": "system.maintenance",
        "data": { "message": "read-only for 5 minutes" },
    });
    assert_eq!(hub.broadcast(maintenance).await.unwrap(), 1);

    let frame = next_json(&mut rx_all).await;
    assert_eq!(frame["event"], "system.maintenance");
    assert_eq!(frame["payload"]["data"]["message"], "read-only for 5 minutes");
    assert!(drain(&hub, &mut rx_notes).await.is_empty());
}

#[tokio::test]
async fn unsubscribe_stops_delivery() {
    let hub = spawn_hub(8);
    let (client, mut rx) = hub.register(new_id()).await.unwrap();
    let target = SubscriptionTarget::new("note", None);
    hub.subscribe(client, target.clone()).await.unwrap();
    next_json(&mut rx).await;

    hub.unsubscribe(client, target).await;
    assert_eq!(hub.broadcast(note_event("1")).await.unwrap(), 0);
}

#[tokio::test]
async fn notebook_subscription_receives_its_notes() {
    let hub = spawn_hub(8);
    let (client, mut rx) = hub.register(new_id()).await.unwrap();
    hub.subscribe(client, SubscriptionTarget::new("notebook", Some("nb1".into())))
        .await
        .unwrap();
    next_json(&mut rx).await;

    let mut event = note_event("n1");
    event["notebook_id"] = json!("nb1");
    assert_eq!(hub.broadcast(event).await.unwrap(), 1);
}

// ---------------------------------------------------------------------------
// Backpressure
// ---------------------------------------------------------------------------

#[tokio::test]
async fn client_with_full_buffer_is_evicted() {
    let hub = spawn_hub(2);
    let (slow, mut slow_rx) = hub.register(new_id()).await.unwrap();
    let (fast, mut fast_rx) = hub.register(new_id()).await.unwrap();
    for client in [slow, fast] {
        hub.subscribe(client, SubscriptionTarget::new("all", None))
            .await
            .unwrap();
    }
    next_json(&mut fast_rx).await;

    // Confirmation plus one event fill the slow client's buffer.
    assert_eq!(hub.broadcast(note_event("1")).await.unwrap(), 2);
    next_json(&mut fast_rx).await;
    assert_eq!(hub.broadcast(note_event("2")).await.unwrap(), 1);

    assert_eq!(hub.connection_count().await, 1);
    assert_eq!(next_json(&mut fast_rx).await["payload"]["note_id"], "2");

    // The evicted client's channel drains and then closes.
    assert_eq!(drain(&hub, &mut slow_rx).await.len(), 2);
    assert!(slow_rx.recv().await.is_none());
}

// ---------------------------------------------------------------------------
// Bus and lifecycle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn bus_messages_are_fanned_out() {
    let bus = EventBus::new(16);
    let (hub, _task) = Hub::spawn(8, Some(bus.subscribe()), CancellationToken::new());
    let (client, mut rx) = hub.register(new_id()).await.unwrap();
    hub.subscribe(client, SubscriptionTarget::new("block", None))
        .await
        .unwrap();
    next_json(&mut rx).await;

    let block_id = new_id();
    bus.send(
        "block",
        EventEnvelope {
            event_id: new_id(),
            timestamp: chrono::Utc::now(),
            entity: "block".into(),
            event_type: "block.updated".into(),
            actor_id: None,
            data: json!({ "id": block_id, "content": { "text": "hi" } }),
            note_id: None,
            notebook_id: None,
            block_id: Some(block_id),
            task_id: None,
            user_id: None,
        },
    );

    let frame = next_json(&mut rx).await;
    assert_eq!(frame["event"], "block.updated");
    assert_eq!(frame["payload"]["block_id"], json!(block_id));
}

#[tokio::test]
async fn shutdown_closes_clients_and_stops_the_hub() {
    let (hub, task) = Hub::spawn(8, None, CancellationToken::new());
    let (_client, mut rx) = hub.register(new_id()).await.unwrap();

    hub.shutdown().await;
    tokio::time::timeout(Duration::from_secs(1), task)
        .await
        .expect("hub did not stop")
        .unwrap();

    assert!(matches!(rx.recv().await, Some(Message::Close(None))));
    assert!(rx.recv().await.is_none());
    assert_eq!(hub.connection_count().await, 0);
    assert!(hub.register(new_id()).await.is_err());
}

#[tokio::test]
async fn cancellation_stops_the_hub() {
    let cancel = CancellationToken::new();
    let (hub, task) = Hub::spawn(8, None, cancel.clone());

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(1), task)
        .await
        .expect("hub did not stop")
        .unwrap();
    assert_eq!(hub.connection_count().await, 0);
}
