use std::sync::Arc;

use tokio::sync::mpsc;

use crate::config::ServerConfig;
use crate::engine::EngineCommand;
use crate::ws::WsManager;

/// Shared application state available to all Axum handlers via
/// `State<AppState>`. Cheaply cloneable; inner data is behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: stormboard_db::DbPool,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// WebSocket connection manager.
    pub ws_manager: Arc<WsManager>,
    /// Command queue into the mutation engine. Every inbound client
    /// message is pushed here and handled strictly in arrival order.
    pub engine_tx: mpsc::UnboundedSender<EngineCommand>,
}
