use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use stormboard_core::protocol::ClientMessage;
use stormboard_core::types::ConnId;

use crate::engine::EngineCommand;
use crate::state::AppState;
use crate::ws::manager::WsManager;

/// HTTP handler that upgrades the connection to WebSocket.
///
/// After the upgrade the connection is registered with `WsManager` and
/// managed by two tasks (sender + receiver). Every parsed inbound event
/// is forwarded into the engine's command queue.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state.ws_manager, state.engine_tx))
}

/// Manage a single WebSocket connection after upgrade.
///
/// Splits the socket into a sink (outbound) and stream (inbound), then:
///   1. Registers the connection with `WsManager`.
///   2. Tells the engine a participant connected (it replies with the
///      full-state snapshot through the bus).
///   3. Spawns a sender task that forwards messages from the manager
///      channel.
///   4. Parses inbound events on the current task and queues them for the
///      engine.
///   5. Cleans up on disconnect.
async fn handle_socket(
    socket: WebSocket,
    ws_manager: Arc<WsManager>,
    engine_tx: mpsc::UnboundedSender<EngineCommand>,
) {
    let conn_id: ConnId = uuid::Uuid::new_v4().to_string();
    tracing::info!(conn_id = %conn_id, "WebSocket connected");

    // Register and get the receiver for outbound messages.
    let mut rx = ws_manager.add(conn_id.clone()).await;

    let (mut sink, mut stream) = socket.split();

    // Sender task: forward channel messages to the WebSocket sink.
    let sender_conn_id = conn_id.clone();
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sink.send(msg).await.is_err() {
                tracing::debug!(conn_id = %sender_conn_id, "WebSocket sink closed");
                break;
            }
        }
    });

    // The engine replies with sync-notes / session-sync / current-session.
    let _ = engine_tx.send(EngineCommand::Connected {
        conn_id: conn_id.clone(),
    });

    // Receiver loop: parse inbound events and queue them for the engine.
    while let Some(result) = stream.next().await {
        match result {
            Ok(Message::Close(_)) => break,
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(message) => {
                    let _ = engine_tx.send(EngineCommand::Inbound {
                        conn_id: conn_id.clone(),
                        message,
                    });
                }
                Err(e) => {
                    // A malformed frame never takes the server down; it is
                    // logged and dropped.
                    tracing::warn!(conn_id = %conn_id, error = %e, "Unparseable client event");
                }
            },
            Ok(Message::Pong(_)) => {
                tracing::trace!(conn_id = %conn_id, "Pong received");
            }
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(conn_id = %conn_id, error = %e, "WebSocket receive error");
                break;
            }
        }
    }

    // Clean up: remove connection, drop its identity, abort sender task.
    ws_manager.remove(&conn_id).await;
    let _ = engine_tx.send(EngineCommand::Disconnected {
        conn_id: conn_id.clone(),
    });
    send_task.abort();
    tracing::info!(conn_id = %conn_id, "WebSocket disconnected");
}
