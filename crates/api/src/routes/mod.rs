//! Route registration.

pub mod health;

use axum::routing::get;
use axum::Router;

use crate::state::AppState;
use crate::ws;

/// Mount the real-time endpoint. Everything except the health check goes
/// over the WebSocket channel.
pub fn api_routes() -> Router<AppState> {
    Router::new().route("/ws", get(ws::ws_handler))
}
