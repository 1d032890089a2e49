//! HTTP/WebSocket server hosting the authoritative sync core.
//!
//! One process owns the in-memory note projection for the current
//! session. Client traffic arrives over WebSocket, is serialized into a
//! single command queue, applied by the [`engine`], and fanned back out
//! to all participants through the event bus and [`ws`] manager.

pub mod broadcast;
pub mod config;
pub mod engine;
pub mod router;
pub mod routes;
pub mod state;
pub mod ws;
