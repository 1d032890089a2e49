//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] is the hub between the mutation engine (the only
//! publisher) and the WebSocket fan-out task. Each [`BoardEvent`] carries
//! a delivery [`Scope`] so the transport layer can exclude the
//! originating connection or target a single one, without the engine ever
//! touching sockets.

use tokio::sync::broadcast;

use stormboard_core::protocol::ServerMessage;
use stormboard_core::types::ConnId;

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// Which connections a board event is delivered to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    /// Every connected participant, including the originator. Used by
    /// `note-liked`, user moderation fan-out, timer transitions, and
    /// session switches.
    All,
    /// Every participant except the originating connection, which already
    /// applied its optimistic local copy.
    AllExcept(ConnId),
    /// Exactly one connection: snapshots on connect and ack replies.
    Only(ConnId),
}

/// A scoped message ready for WebSocket delivery.
#[derive(Debug, Clone)]
pub struct BoardEvent {
    pub scope: Scope,
    pub message: ServerMessage,
}

/// In-process fan-out event bus.
///
/// Wraps a [`broadcast::Sender`] so that any number of subscribers can
/// independently receive every published [`BoardEvent`]. Designed to be
/// shared via `Arc<EventBus>`.
pub struct EventBus {
    sender: broadcast::Sender<BoardEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full, the oldest un-consumed messages are
    /// dropped and slow receivers observe a `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish a message with the given delivery scope.
    ///
    /// If there are no active subscribers the event is silently dropped;
    /// that only happens before the fan-out task has started or during
    /// shutdown.
    pub fn publish(&self, scope: Scope, message: ServerMessage) {
        let _ = self.sender.send(BoardEvent { scope, message });
    }

    /// Subscribe to all events published on this bus.
    pub fn subscribe(&self) -> broadcast::Receiver<BoardEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_and_receive_single_subscriber() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        bus.publish(
            Scope::AllExcept("conn-1".into()),
            ServerMessage::NoteLiked("n1".into()),
        );

        let event = rx.recv().await.expect("should receive the event");
        assert_eq!(event.scope, Scope::AllExcept("conn-1".into()));
        assert!(matches!(event.message, ServerMessage::NoteLiked(ref id) if id == "n1"));
    }

    #[tokio::test]
    async fn multiple_subscribers_receive_same_event() {
        let bus = EventBus::default();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.publish(Scope::All, ServerMessage::SessionEnded);

        assert!(matches!(
            rx1.recv().await.unwrap().message,
            ServerMessage::SessionEnded
        ));
        assert!(matches!(
            rx2.recv().await.unwrap().message,
            ServerMessage::SessionEnded
        ));
    }

    #[test]
    fn publish_with_no_subscribers_does_not_panic() {
        let bus = EventBus::default();
        bus.publish(Scope::All, ServerMessage::SessionEnded);
    }
}
