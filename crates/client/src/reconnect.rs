//! Bounded fixed-backoff reconnection for the board WebSocket.
//!
//! Transport drops are expected; the client retries a bounded number of
//! times with a fixed delay between attempts and resynchronizes from the
//! server's full-state snapshot once reconnected.

use std::time::Duration;

use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

/// A live WebSocket stream to the board server.
pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Tunable parameters for the retry strategy: a fixed delay between a
/// bounded number of attempts.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum connection attempts per (re)connect cycle.
    pub max_attempts: u32,
    /// Fixed delay between attempts.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay: Duration::from_secs(1),
        }
    }
}

/// Attempt to connect, retrying per `policy`.
///
/// Returns `Some(stream)` once a connection succeeds, or `None` when the
/// attempt budget is exhausted or `cancel` is triggered first.
pub async fn connect_with_retry(
    url: &str,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
) -> Option<WsStream> {
    let mut attempt = 0u32;

    loop {
        attempt += 1;

        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Connect cancelled");
                return None;
            }
            result = connect_async(url) => {
                match result {
                    Ok((stream, _response)) => {
                        tracing::info!(attempt, "Connected to {url}");
                        return Some(stream);
                    }
                    Err(e) => {
                        tracing::warn!(attempt, error = %e, "Connection attempt failed");
                        if attempt >= policy.max_attempts {
                            tracing::warn!(
                                attempts = policy.max_attempts,
                                "Giving up on {url}"
                            );
                            return None;
                        }
                    }
                }
            }
        }

        // Wait before the next attempt, respecting cancellation.
        tokio::select! {
            _ = cancel.cancelled() => return None,
            _ = tokio::time::sleep(policy.delay) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_matches_transport_contract() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.delay, Duration::from_secs(1));
    }

    #[tokio::test]
    async fn cancellation_token_stops_connecting() {
        let cancel = CancellationToken::new();
        // Cancel up front -- connect_with_retry must return None without
        // burning through the attempt budget.
        cancel.cancel();

        let policy = RetryPolicy::default();
        let result = connect_with_retry("ws://localhost:9999/ws", &policy, &cancel).await;
        assert!(result.is_none());
    }
}
