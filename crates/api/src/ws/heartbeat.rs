use std::sync::Arc;
use std::time::Duration;

use crate::ws::manager::WsManager;

/// Spawn a background task that sends periodic Ping frames to all
/// connected WebSocket clients.
///
/// The interval comes from server configuration. The returned
/// `JoinHandle` is used to abort the task during shutdown.
pub fn start_heartbeat(
    ws_manager: Arc<WsManager>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);

        loop {
            ticker.tick().await;
            let count = ws_manager.connection_count().await;
            tracing::debug!(count, "WebSocket heartbeat ping");
            ws_manager.ping_all().await;
        }
    })
}
