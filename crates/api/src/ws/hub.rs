//! Connection registry and event fan-out.
//!
//! A single task owns the client map. Connection handlers and the bus talk
//! to it through [`HubHandle`], so no lock is ever held across a send.

use std::collections::{HashMap, HashSet};

use axum::extract::ws::Message;
use quill_core::realtime::{
    extract_route, subscription_matches, ServerMessage, SubscriptionTarget, SUBSCRIPTION_ALL,
};
use quill_core::types::{new_id, DbId, Timestamp};
use quill_events::BusMessage;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Identifier of one live connection.
pub type ClientId = DbId;

/// Capacity of the registry's command queue.
const COMMAND_QUEUE_CAPACITY: usize = 1024;

#[derive(Debug, thiserror::Error)]
pub enum HubError {
    #[error("realtime hub is not running")]
    Stopped,
}

struct Client {
    user_id: DbId,
    subscriptions: HashSet<String>,
    sender: mpsc::Sender<Message>,
    connected_at: Timestamp,
}

enum HubCommand {
    Register {
        user_id: DbId,
        reply: oneshot::Sender<(ClientId, mpsc::Receiver<Message>)>,
    },
    Unregister {
        client_id: ClientId,
    },
    Subscribe {
        client_id: ClientId,
        target: SubscriptionTarget,
        reply: oneshot::Sender<bool>,
    },
    Unsubscribe {
        client_id: ClientId,
        target: SubscriptionTarget,
    },
    SendTo {
        client_id: ClientId,
        message: ServerMessage,
    },
    Broadcast {
        envelope: Value,
        reply: oneshot::Sender<usize>,
    },
    Count {
        reply: oneshot::Sender<usize>,
    },
    Shutdown,
}

/// Cloneable front door to the hub task.
#[derive(Clone)]
pub struct HubHandle {
    commands: mpsc::Sender<HubCommand>,
}

impl HubHandle {
    /// Add a connection for `user_id`. The receiver yields every frame the
    /// hub wants written to the socket; it closes when the client is
    /// unregistered or evicted.
    pub async fn register(
        &self,
        user_id: DbId,
    ) -> Result<(ClientId, mpsc::Receiver<Message>), HubError> {
        let (reply, rx) = oneshot::channel();
        self.send(HubCommand::Register { user_id, reply }).await?;
        rx.await.map_err(|_| HubError::Stopped)
    }

    pub async fn unregister(&self, client_id: ClientId) {
        let _ = self.send(HubCommand::Unregister { client_id }).await;
    }

    /// Returns `true` when the subscription is new. Only new subscriptions
    /// are confirmed to the client.
    pub async fn subscribe(
        &self,
        client_id: ClientId,
        target: SubscriptionTarget,
    ) -> Result<bool, HubError> {
        let (reply, rx) = oneshot::channel();
        self.send(HubCommand::Subscribe {
            client_id,
            target,
            reply,
        })
        .await?;
        rx.await.map_err(|_| HubError::Stopped)
    }

    pub async fn unsubscribe(&self, client_id: ClientId, target: SubscriptionTarget) {
        let _ = self
            .send(HubCommand::Unsubscribe { client_id, target })
            .await;
    }

    /// Queue a frame for one client.
    pub async fn send_to(&self, client_id: ClientId, message: ServerMessage) {
        let _ = self.send(HubCommand::SendTo { client_id, message }).await;
    }

    /// Deliver an envelope to every matching client. Returns how many
    /// clients it was queued for.
    pub async fn broadcast(&self, envelope: Value) -> Result<usize, HubError> {
        let (reply, rx) = oneshot::channel();
        self.send(HubCommand::Broadcast { envelope, reply }).await?;
        rx.await.map_err(|_| HubError::Stopped)
    }

    /// Number of registered clients; zero once the hub has stopped.
    pub async fn connection_count(&self) -> usize {
        let (reply, rx) = oneshot::channel();
        if self.send(HubCommand::Count { reply }).await.is_err() {
            return 0;
        }
        rx.await.unwrap_or(0)
    }

    /// Close every connection and stop the hub task.
    pub async fn shutdown(&self) {
        let _ = self.send(HubCommand::Shutdown).await;
    }

    async fn send(&self, command: HubCommand) -> Result<(), HubError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| HubError::Stopped)
    }
}

/// The registry task.
pub struct Hub {
    clients: HashMap<ClientId, Client>,
    client_buffer: usize,
}

impl Hub {
    /// Start the hub. When `bus` is given, every bus message is fanned out
    /// as if it had been passed to [`HubHandle::broadcast`].
    pub fn spawn(
        client_buffer: usize,
        bus: Option<broadcast::Receiver<BusMessage>>,
        cancel: CancellationToken,
    ) -> (HubHandle, JoinHandle<()>) {
        let (commands, rx) = mpsc::channel(COMMAND_QUEUE_CAPACITY);
        let hub = Hub {
            clients: HashMap::new(),
            client_buffer: client_buffer.max(1),
        };
        let handle = tokio::spawn(hub.run(rx, bus, cancel));
        (HubHandle { commands }, handle)
    }

    async fn run(
        mut self,
        mut commands: mpsc::Receiver<HubCommand>,
        mut bus: Option<broadcast::Receiver<BusMessage>>,
        cancel: CancellationToken,
    ) {
        tracing::info!("Realtime hub started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                command = commands.recv() => match command {
                    Some(HubCommand::Shutdown) | None => break,
                    Some(command) => self.apply(command),
                },
                message = next_bus_message(&mut bus) => match message {
                    Ok(message) => match serde_json::to_value(&message.envelope) {
                        Ok(envelope) => {
                            self.fan_out(&envelope);
                        }
                        Err(e) => tracing::warn!(
                            event_id = %message.envelope.event_id,
                            error = %e,
                            "Failed to encode envelope for clients",
                        ),
                    },
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(skipped = n, "Realtime hub lagged behind the bus");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::info!("Event bus closed, hub continues with direct broadcasts only");
                        bus = None;
                    }
                },
            }
        }
        self.close_all();
        tracing::info!("Realtime hub stopped");
    }

    fn apply(&mut self, command: HubCommand) {
        match command {
            HubCommand::Register { user_id, reply } => {
                let client_id = new_id();
                let (sender, receiver) = mpsc::channel(self.client_buffer);
                self.clients.insert(
                    client_id,
                    Client {
                        user_id,
                        subscriptions: HashSet::new(),
                        sender,
                        connected_at: chrono::Utc::now(),
                    },
                );
                tracing::debug!(%client_id, %user_id, "Client registered");
                if reply.send((client_id, receiver)).is_err() {
                    self.clients.remove(&client_id);
                }
            }
            HubCommand::Unregister { client_id } => {
                if let Some(client) = self.clients.remove(&client_id) {
                    let connected_for = chrono::Utc::now() - client.connected_at;
                    tracing::debug!(
                        %client_id,
                        user_id = %client.user_id,
                        connected_secs = connected_for.num_seconds(),
                        "Client unregistered",
                    );
                }
            }
            HubCommand::Subscribe {
                client_id,
                target,
                reply,
            } => {
                let added = self.subscribe(client_id, &target);
                let _ = reply.send(added);
            }
            HubCommand::Unsubscribe { client_id, target } => {
                if let Some(client) = self.clients.get_mut(&client_id) {
                    client.subscriptions.remove(&target.key());
                }
            }
            HubCommand::SendTo { client_id, message } => {
                if let Some(frame) = encode(&message) {
                    self.deliver(client_id, frame);
                }
            }
            HubCommand::Broadcast { envelope, reply } => {
                let delivered = self.fan_out(&envelope);
                let _ = reply.send(delivered);
            }
            HubCommand::Count { reply } => {
                let _ = reply.send(self.clients.len());
            }
            HubCommand::Shutdown => {}
        }
    }

    fn subscribe(&mut self, client_id: ClientId, target: &SubscriptionTarget) -> bool {
        let Some(client) = self.clients.get_mut(&client_id) else {
            return false;
        };
        if !client.subscriptions.insert(target.key()) {
            return false;
        }
        tracing::debug!(%client_id, key = %target.key(), "Subscription added");
        if let Some(frame) = encode(&ServerMessage::subscription_confirmed(target)) {
            self.deliver(client_id, frame);
        }
        true
    }

    /// Queue `envelope` for every client whose subscriptions match it.
    /// An envelope that names no resource still reaches `all` subscribers.
    fn fan_out(&mut self, envelope: &Value) -> usize {
        let target = extract_route(envelope);
        if target.is_none() {
            tracing::debug!("Envelope names no resource, delivering to `all` only");
        }
        let event_type = envelope
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let Some(frame) = encode(&ServerMessage::event(event_type, envelope.clone())) else {
            return 0;
        };

        let recipients: Vec<ClientId> = self
            .clients
            .iter()
            .filter(|(_, client)| match &target {
                Some(target) => subscription_matches(&client.subscriptions, target),
                None => client.subscriptions.contains(SUBSCRIPTION_ALL),
            })
            .map(|(id, _)| *id)
            .collect();

        recipients
            .into_iter()
            .filter(|client_id| self.deliver(*client_id, frame.clone()))
            .count()
    }

    /// Non-blocking send. A client whose buffer is full or whose writer has
    /// gone away is evicted.
    fn deliver(&mut self, client_id: ClientId, frame: Message) -> bool {
        let Some(client) = self.clients.get(&client_id) else {
            return false;
        };
        match client.sender.try_send(frame) {
            Ok(()) => true,
            Err(e) => {
                let reason = match e {
                    mpsc::error::TrySendError::Full(_) => "buffer full",
                    mpsc::error::TrySendError::Closed(_) => "channel closed",
                };
                tracing::warn!(%client_id, user_id = %client.user_id, reason, "Evicting client");
                self.clients.remove(&client_id);
                false
            }
        }
    }

    fn close_all(&mut self) {
        let count = self.clients.len();
        for client in self.clients.values() {
            let _ = client.sender.try_send(Message::Close(None));
        }
        self.clients.clear();
        tracing::info!(count, "Closed all realtime connections");
    }
}

async fn next_bus_message(
    bus: &mut Option<broadcast::Receiver<BusMessage>>,
) -> Result<BusMessage, broadcast::error::RecvError> {
    match bus {
        Some(receiver) => receiver.recv().await,
        None => std::future::pending().await,
    }
}

fn encode(message: &ServerMessage) -> Option<Message> {
    match serde_json::to_string(message) {
        Ok(text) => Some(Message::Text(text.into())),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to encode server message");
            None
        }
    }
}
