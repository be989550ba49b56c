use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket};
use futures::stream::SplitSink;
use futures::SinkExt;
use tokio::sync::mpsc;

use super::hub::ClientId;

/// Write half of one connection.
///
/// Forwards frames queued by the hub and sends a Ping every `interval`.
/// Returns when the hub drops the client's channel, after a Close frame, or
/// when the socket stops accepting writes.
pub(super) async fn run_writer(
    client_id: ClientId,
    mut sink: SplitSink<WebSocket, Message>,
    mut outbound: mpsc::Receiver<Message>,
    interval: Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        let frame = tokio::select! {
            frame = outbound.recv() => match frame {
                Some(frame) => frame,
                None => {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
            },
            _ = ticker.tick() => Message::Ping(Bytes::new()),
        };
        let closing = matches!(frame, Message::Close(_));
        if sink.send(frame).await.is_err() {
            tracing::debug!(%client_id, "WebSocket sink closed");
            break;
        }
        if closing {
            break;
        }
    }
}
