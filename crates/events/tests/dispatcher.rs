//! Tests for `OutboxDispatcher` against the in-memory store.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use quill_core::envelope::EventEnvelope;
use quill_core::types::new_id;
use quill_db::models::note::CreateNote;
use quill_db::{ContentStore, MemoryStore, OutboxStore, StoreError};
use quill_events::{DispatchReport, EventBus, OutboxDispatcher, PublishError, Publisher};
use tokio::sync::Mutex;

/// Records every publish; refuses all of them while `down` is set.
#[derive(Default)]
struct FlakyPublisher {
    down: AtomicBool,
    published: Mutex<Vec<(String, EventEnvelope)>>,
}

#[async_trait]
impl Publisher for FlakyPublisher {
    async fn publish(&self, topic: &str, envelope: &EventEnvelope) -> Result<(), PublishError> {
        if self.down.load(Ordering::SeqCst) {
            return Err(PublishError::Unavailable("connection refused".into()));
        }
        self.published
            .lock()
            .await
            .push((topic.to_string(), envelope.clone()));
        Ok(())
    }
}

async fn seed_notes(store: &MemoryStore, n: usize) {
    let user = new_id();
    for i in 0..n {
        store
            .create_note(
                Some(user),
                CreateNote {
                    user_id: user,
                    notebook_id: None,
                    title: format!("Note {i}"),
                    is_primary: false,
                },
            )
            .await
            .unwrap();
    }
}

fn dispatcher(store: &Arc<MemoryStore>, publisher: &Arc<FlakyPublisher>) -> Arc<OutboxDispatcher> {
    Arc::new(
        OutboxDispatcher::new(store.clone(), publisher.clone())
            .with_poll_interval(Duration::from_millis(10)),
    )
}

// ---------------------------------------------------------------------------
// Test: one tick drains every pending row when the bus is reachable
// ---------------------------------------------------------------------------

#[tokio::test]
async fn one_tick_dispatches_all_pending() {
    let store = Arc::new(MemoryStore::new());
    let publisher = Arc::new(FlakyPublisher::default());
    seed_notes(&store, 5).await;

    let report = dispatcher(&store, &publisher)
        .dispatch_pending()
        .await
        .unwrap();

    assert_eq!(report, DispatchReport { published: 5, failed: 0 });
    assert!(store.list_undispatched().await.unwrap().is_empty());
    let published = publisher.published.lock().await;
    assert_eq!(published.len(), 5);
    assert!(published.iter().all(|(topic, _)| topic == "note"));
    let outbox = store.outbox().await;
    let ids: Vec<_> = published.iter().map(|(_, env)| env.event_id).collect();
    let expected: Vec<_> = outbox.iter().map(|e| e.id).collect();
    assert_eq!(ids, expected, "published in insertion order");
}

// ---------------------------------------------------------------------------
// Test: unreachable bus leaves rows pending; they go out once it recovers
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unreachable_bus_retries_without_loss_or_duplication() {
    let store = Arc::new(MemoryStore::new());
    let publisher = Arc::new(FlakyPublisher::default());
    publisher.down.store(true, Ordering::SeqCst);
    seed_notes(&store, 3).await;
    let dispatcher = dispatcher(&store, &publisher);

    for _ in 0..3 {
        let report = dispatcher.dispatch_pending().await.unwrap();
        assert_eq!(report, DispatchReport { published: 0, failed: 3 });
    }
    assert_eq!(store.list_undispatched().await.unwrap().len(), 3);
    assert_eq!(store.outbox().await.len(), 3);

    publisher.down.store(false, Ordering::SeqCst);
    let report = dispatcher.dispatch_pending().await.unwrap();

    assert_eq!(report.published, 3);
    assert!(store.list_undispatched().await.unwrap().is_empty());
    assert_eq!(store.outbox().await.len(), 3);
    assert_eq!(publisher.published.lock().await.len(), 3);
}

// ---------------------------------------------------------------------------
// Test: a store outage fails the tick without touching rows
// ---------------------------------------------------------------------------

#[tokio::test]
async fn store_outage_surfaces_as_error() {
    let store = Arc::new(MemoryStore::new());
    let publisher = Arc::new(FlakyPublisher::default());
    seed_notes(&store, 1).await;
    store.set_unavailable(true);

    let result = dispatcher(&store, &publisher).dispatch_pending().await;

    assert!(matches!(result, Err(StoreError::Database(_))));
    store.set_unavailable(false);
    assert_eq!(store.list_undispatched().await.unwrap().len(), 1);
}

// ---------------------------------------------------------------------------
// Test: start/stop lifecycle is idempotent and the ticker drains the outbox
// ---------------------------------------------------------------------------

#[tokio::test]
async fn start_and_stop_are_idempotent() {
    let store = Arc::new(MemoryStore::new());
    let publisher = Arc::new(FlakyPublisher::default());
    let dispatcher = dispatcher(&store, &publisher);

    dispatcher.stop().await;
    dispatcher.start().await;
    dispatcher.start().await;
    assert!(dispatcher.is_running().await);

    seed_notes(&store, 2).await;
    tokio::time::timeout(Duration::from_secs(5), async {
        while !store.list_undispatched().await.unwrap().is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("ticker should drain the outbox");

    dispatcher.stop().await;
    dispatcher.stop().await;
    assert!(!dispatcher.is_running().await);
    assert_eq!(publisher.published.lock().await.len(), 2);
}

// ---------------------------------------------------------------------------
// Test: envelopes reach bus subscribers on the entity topic
// ---------------------------------------------------------------------------

#[tokio::test]
async fn publishes_envelopes_onto_event_bus() {
    let store = Arc::new(MemoryStore::new());
    let bus = Arc::new(EventBus::default());
    let mut rx = bus.subscribe();
    seed_notes(&store, 1).await;

    let dispatcher = OutboxDispatcher::new(store.clone(), bus.clone());
    dispatcher.dispatch_pending().await.unwrap();

    let message = rx.recv().await.unwrap();
    assert_eq!(message.topic, "note");
    assert_eq!(message.envelope.event_type, "note.created");
    assert!(message.envelope.note_id.is_some());
    assert!(message.envelope.user_id.is_some());
}
