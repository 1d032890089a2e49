//! Event-to-WebSocket fan-out.
//!
//! [`BroadcastRouter`] subscribes to the board event bus and delivers
//! each event through the [`WsManager`] according to its scope: all
//! connections, all except the originator, or exactly one (snapshots and
//! ack replies). Runs as a long-lived background task and shuts down
//! when the bus sender is dropped.

use std::sync::Arc;

use axum::extract::ws::Message;
use tokio::sync::broadcast;

use stormboard_events::{BoardEvent, Scope};

use crate::ws::WsManager;

/// Routes board events to WebSocket connections.
pub struct BroadcastRouter {
    ws_manager: Arc<WsManager>,
}

impl BroadcastRouter {
    /// Create a new router delivering through the given manager.
    pub fn new(ws_manager: Arc<WsManager>) -> Self {
        Self { ws_manager }
    }

    /// Run the main fan-out loop.
    ///
    /// Subscribes to the event bus via `receiver` and delivers each event.
    /// The loop exits when the channel is closed (i.e. the
    /// [`EventBus`](stormboard_events::EventBus) is dropped).
    pub async fn run(self, mut receiver: broadcast::Receiver<BoardEvent>) {
        loop {
            match receiver.recv().await {
                Ok(event) => self.deliver(event).await,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "Broadcast router lagged, events were dropped");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!("Event bus closed, broadcast router shutting down");
                    break;
                }
            }
        }
    }

    /// Serialize one event and deliver it according to its scope.
    async fn deliver(&self, event: BoardEvent) {
        let text = match serde_json::to_string(&event.message) {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize board event");
                return;
            }
        };
        let message = Message::Text(text.into());

        match event.scope {
            Scope::All => self.ws_manager.broadcast(message).await,
            Scope::AllExcept(ref origin) => {
                self.ws_manager.broadcast_except(origin, message).await;
            }
            Scope::Only(ref conn_id) => {
                if !self.ws_manager.send_to(conn_id, message).await {
                    // The target disconnected between publish and delivery.
                    tracing::debug!(conn_id = %conn_id, "Scoped event target is gone");
                }
            }
        }
    }
}
