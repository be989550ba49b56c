use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use futures::StreamExt;
use quill_core::error::CoreError;
use quill_core::realtime::{parse_client_message, ClientCommand, ServerMessage};
use serde::Deserialize;

use crate::error::AppError;
use crate::middleware::auth::{bearer_token, AuthUser};
use crate::state::AppState;
use crate::ws::hub::{ClientId, HubHandle};

use super::heartbeat::run_writer;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub token: Option<String>,
}

/// HTTP handler that authenticates the caller and upgrades the connection.
///
/// Browsers cannot set headers on a WebSocket handshake, so the token may
/// also come as `?token=`.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let token = query
        .token
        .as_deref()
        .or_else(|| bearer_token(&headers))
        .ok_or_else(|| AppError::Core(CoreError::Unauthorized("Missing access token".into())))?;
    let user = AuthUser::from_token(token, &state)?;

    let hub = state.hub.clone();
    let heartbeat = state.config.realtime.heartbeat_interval;
    let read_timeout = state.config.realtime.read_timeout;
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, hub, user, heartbeat, read_timeout)))
}

/// Run one connection until either side goes away.
///
/// The writer runs on its own task; this task reads control frames and
/// enforces the read deadline. Any inbound frame, including Pong, counts as
/// liveness.
async fn handle_socket(
    socket: WebSocket,
    hub: HubHandle,
    user: AuthUser,
    heartbeat: Duration,
    read_timeout: Duration,
) {
    let (client_id, outbound) = match hub.register(user.user_id).await {
        Ok(registered) => registered,
        Err(e) => {
            tracing::warn!(user_id = %user.user_id, error = %e, "WebSocket rejected");
            return;
        }
    };
    tracing::info!(%client_id, user_id = %user.user_id, "WebSocket connected");

    let (sink, mut stream) = socket.split();
    let mut send_task = tokio::spawn(run_writer(client_id, sink, outbound, heartbeat));

    loop {
        let next = tokio::select! {
            _ = &mut send_task => break,
            next = tokio::time::timeout(read_timeout, stream.next()) => next,
        };
        match next {
            Err(_) => {
                tracing::info!(%client_id, "WebSocket read deadline exceeded");
                break;
            }
            Ok(None) | Ok(Some(Ok(Message::Close(_)))) => break,
            Ok(Some(Ok(Message::Text(text)))) => {
                handle_control(&hub, client_id, text.as_str()).await;
            }
            Ok(Some(Ok(Message::Pong(_)))) => {
                tracing::trace!(%client_id, "Pong received");
            }
            Ok(Some(Ok(_))) => {}
            Ok(Some(Err(e))) => {
                tracing::debug!(%client_id, error = %e, "WebSocket receive error");
                break;
            }
        }
    }

    hub.unregister(client_id).await;
    send_task.abort();
    tracing::info!(%client_id, "WebSocket disconnected");
}

async fn handle_control(hub: &HubHandle, client_id: ClientId, text: &str) {
    match parse_client_message(text) {
        Ok(ClientCommand::Subscribe(target)) => {
            if let Err(e) = hub.subscribe(client_id, target).await {
                tracing::debug!(%client_id, error = %e, "Subscribe failed");
            }
        }
        Ok(ClientCommand::Unsubscribe(target)) => {
            hub.unsubscribe(client_id, target).await;
        }
        Err(e) => {
            tracing::debug!(%client_id, error = %e, "Invalid control message");
            hub.send_to(client_id, ServerMessage::error(e.to_string()))
                .await;
        }
    }
}
