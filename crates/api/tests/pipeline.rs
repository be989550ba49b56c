//! Outbox -> bus -> synchronizer and hub, all running as background tasks.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::Fixture;
use quill_api::ws::Hub;
use quill_core::realtime::SubscriptionTarget;
use quill_core::types::new_id;
use quill_db::{ContentStore, OutboxStore};
use quill_events::{EventBus, OutboxDispatcher, Publisher};
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn task_block_flows_through_dispatcher_to_synchronizer_and_clients() {
    let fx = Fixture::new();
    let bus = Arc::new(EventBus::new(64));
    let cancel = CancellationToken::new();

    let sync_task = tokio::spawn(fx.sync.clone().run(bus.subscribe(), cancel.clone()));
    let (hub, _hub_task) = Hub::spawn(16, Some(bus.subscribe()), cancel.clone());
    let (client, mut rx) = hub.register(new_id()).await.unwrap();
    hub.subscribe(client, SubscriptionTarget::new("task", None))
        .await
        .unwrap();

    let outbox: Arc<dyn OutboxStore> = fx.store.clone();
    let publisher: Arc<dyn Publisher> = bus.clone();
    let dispatcher = Arc::new(
        OutboxDispatcher::new(outbox, publisher).with_poll_interval(Duration::from_millis(10)),
    );
    dispatcher.start().await;

    let owner = new_id();
    let note = fx.note(owner, "Today", true).await;
    let block = fx.block(owner, &note, "task", "water plants").await;

    let mut linked = false;
    for _ in 0..100 {
        if !fx.store.list_tasks_by_block(block.id).await.unwrap().is_empty() {
            linked = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(linked, "task was never created for the block");

    // Let the echoes drain, then the outbox must be quiet.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(fx.store.list_undispatched().await.unwrap().is_empty());
    assert_eq!(fx.store.task_writes(), 1);

    // Confirmation, then the task.created event.
    let mut saw_task_event = false;
    while let Ok(frame) = rx.try_recv() {
        if let axum::extract::ws::Message::Text(text) = frame {
            saw_task_event |= text.as_str().contains("task.created");
        }
    }
    assert!(saw_task_event);

    dispatcher.stop().await;
    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(1), sync_task)
        .await
        .expect("synchronizer did not stop")
        .unwrap();
}
