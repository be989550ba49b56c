//! Outbox event dispatcher.
//!
//! Polls the `events` table every `poll_interval`, publishes each pending row
//! to its entity topic and marks it dispatched. A row whose publish fails is
//! left pending and retried on the next tick, indefinitely. Delivery is
//! at-least-once: consumers dedupe on `event_id`.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use quill_db::{OutboxStore, StoreError};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::bus::Publisher;
use crate::envelope::build_envelope;
use crate::topics::topic_for;

/// Default polling interval for the dispatcher loop.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Outcome of one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Rows published and marked dispatched.
    pub published: usize,
    /// Rows left pending for the next tick.
    pub failed: usize,
}

struct Running {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Background outbox mover with an idempotent `start`/`stop` lifecycle.
pub struct OutboxDispatcher {
    store: Arc<dyn OutboxStore>,
    publisher: Arc<dyn Publisher>,
    poll_interval: Duration,
    running: Mutex<Option<Running>>,
}

impl OutboxDispatcher {
    /// Create a dispatcher with the default 1-second poll interval.
    pub fn new(store: Arc<dyn OutboxStore>, publisher: Arc<dyn Publisher>) -> Self {
        Self {
            store,
            publisher,
            poll_interval: DEFAULT_POLL_INTERVAL,
            running: Mutex::new(None),
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }

    /// Spawn the ticker task. No-op if already running.
    pub async fn start(self: &Arc<Self>) {
        let mut running = self.running.lock().await;
        if running.is_some() {
            tracing::debug!("Outbox dispatcher already running");
            return;
        }

        let cancel = CancellationToken::new();
        let dispatcher = Arc::clone(self);
        let token = cancel.clone();
        let handle = tokio::spawn(async move { dispatcher.run(token).await });
        *running = Some(Running { cancel, handle });
    }

    /// Stop the ticker and wait for it to exit. An in-flight tick runs to
    /// completion first. No-op if not running.
    pub async fn stop(&self) {
        let Some(Running { cancel, handle }) = self.running.lock().await.take() else {
            return;
        };
        cancel.cancel();
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "Outbox dispatcher task panicked");
        }
    }

    async fn run(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        tracing::info!(
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            "Outbox dispatcher started",
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Outbox dispatcher shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    match self.dispatch_pending().await {
                        Ok(report) if report.published > 0 || report.failed > 0 => {
                            tracing::debug!(
                                published = report.published,
                                failed = report.failed,
                                "Outbox tick complete",
                            );
                        }
                        Ok(_) => {}
                        Err(e) => {
                            tracing::error!(error = %e, "Outbox tick failed to load pending events");
                        }
                    }
                }
            }
        }
    }

    /// One tick: publish every pending row in insertion order, sequentially.
    ///
    /// Fails only when the pending set itself cannot be read. Per-row
    /// failures are counted in the report and logged.
    pub async fn dispatch_pending(&self) -> Result<DispatchReport, StoreError> {
        let pending = self.store.list_undispatched().await?;
        let mut report = DispatchReport::default();

        for event in pending {
            let envelope = build_envelope(&event);
            let topic = topic_for(&event.entity);

            if let Err(e) = self.publisher.publish(topic, &envelope).await {
                tracing::warn!(
                    event_id = %event.id,
                    event_type = %event.event_type,
                    topic,
                    error = %e,
                    "Publish failed, event stays pending",
                );
                report.failed += 1;
                continue;
            }

            match self.store.mark_dispatched(event.id, Utc::now()).await {
                Ok(()) => report.published += 1,
                Err(e) => {
                    // Already on the bus; the next tick publishes it again.
                    tracing::error!(
                        event_id = %event.id,
                        error = %e,
                        "Failed to mark event dispatched",
                    );
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }
}
