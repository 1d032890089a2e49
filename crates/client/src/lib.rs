//! Participant-side client for the stormboard sync core.
//!
//! [`BoardClient`] maintains a WebSocket connection to the authoritative
//! server (with bounded, fixed-backoff reconnection), mirrors the board
//! state locally, and applies every inbound broadcast through the same
//! combine logic the server uses -- so all participants converge on
//! identical derived state even though merge/link/resolve events carry
//! only ids.

pub mod client;
pub mod reconciler;
pub mod reconnect;

pub use client::{BoardClient, ClientError};
pub use reconciler::ClientState;
pub use reconnect::RetryPolicy;
