//! The participant client: connection supervision, outbound traffic, and
//! ack correlation.
//!
//! A supervisor task owns the connection lifecycle: connect (with the
//! bounded fixed-backoff policy), re-identify, pump inbound frames into
//! the reconciler, and start over when the transport drops. User actions
//! are applied optimistically to the local mirror and emitted to the
//! server; ack-style calls await the correlated `ack` reply.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use stormboard_core::note::{Note, Quadrant};
use stormboard_core::protocol::{AckData, ClientMessage, RegistrationResult, ReqId, ServerMessage};
use stormboard_core::session::{CreateSession, Session, SessionStats};
use stormboard_core::types::{NoteId, SessionId, UserId};
use stormboard_core::user::User;

use crate::reconciler::{self, ClientState};
use crate::reconnect::{connect_with_retry, RetryPolicy, WsStream};

/// How long to wait for the server's ack before giving up on a call.
const ACK_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("not connected to the server")]
    NotConnected,
    #[error("the connection closed before the reply arrived")]
    AckDropped,
    #[error("timed out waiting for the server reply")]
    AckTimeout,
    #[error("the reply payload did not match the request")]
    UnexpectedAck,
    #[error("note submissions are closed")]
    SubmissionsClosed,
    #[error("only an admin may perform this action")]
    NotAdmin,
}

/// Handle to a running board client. Cheaply cloneable.
#[derive(Clone)]
pub struct BoardClient {
    inner: Arc<Inner>,
}

struct Inner {
    url: String,
    policy: RetryPolicy,
    state: Mutex<ClientState>,
    pending: Mutex<HashMap<ReqId, oneshot::Sender<AckData>>>,
    outbound: Mutex<Option<mpsc::UnboundedSender<Message>>>,
    next_req_id: AtomicU64,
    cancel: CancellationToken,
}

impl BoardClient {
    /// Create a client and start its connection supervisor.
    pub fn connect(url: impl Into<String>, policy: RetryPolicy) -> Self {
        let inner = Arc::new(Inner {
            url: url.into(),
            policy,
            state: Mutex::new(ClientState::default()),
            pending: Mutex::new(HashMap::new()),
            outbound: Mutex::new(None),
            next_req_id: AtomicU64::new(1),
            cancel: CancellationToken::new(),
        });
        tokio::spawn(supervisor(Arc::clone(&inner)));
        Self { inner }
    }

    /// Stop the supervisor and drop the connection.
    pub fn shutdown(&self) {
        self.inner.cancel.cancel();
    }

    pub async fn is_connected(&self) -> bool {
        self.inner.state.lock().await.connected
    }

    /// Read from the local state mirror.
    pub async fn with_state<R>(&self, f: impl FnOnce(&ClientState) -> R) -> R {
        let state = self.inner.state.lock().await;
        f(&state)
    }

    // -----------------------------------------------------------------------
    // Note actions (optimistic echo + fire-and-forget emit)
    // -----------------------------------------------------------------------

    /// Submit a new note. Gated locally on the brainstorm window, exactly
    /// like the server gates it on arrival.
    pub async fn add_note(&self, mut note: Note) -> Result<(), ClientError> {
        {
            let mut state = self.inner.state.lock().await;
            if !state.can_add_notes() {
                return Err(ClientError::SubmissionsClosed);
            }
            if note.session_id.is_none() {
                note.session_id = Some(state.current_session.clone());
            }
            if let Err(e) = state.board.add_note(note.clone()) {
                tracing::debug!(error = %e, "Local echo dropped");
            }
        }
        self.send(ClientMessage::AddNote(note)).await
    }

    pub async fn update_quadrant(&self, id: NoteId, quadrant: Quadrant) -> Result<(), ClientError> {
        self.echo(|board| board.update_quadrant(&id, quadrant).err())
            .await;
        self.send(ClientMessage::UpdateQuadrant { id, quadrant }).await
    }

    pub async fn merge_notes(
        &self,
        source_id: NoteId,
        target_id: NoteId,
    ) -> Result<(), ClientError> {
        self.echo(|board| board.merge_notes(&source_id, &target_id).err())
            .await;
        self.send(ClientMessage::MergeNotes {
            source_id,
            target_id,
        })
        .await
    }

    pub async fn link_notes(
        &self,
        note_id_1: NoteId,
        note_id_2: NoteId,
    ) -> Result<(), ClientError> {
        self.echo(|board| board.link_notes(&note_id_1, &note_id_2).err())
            .await;
        self.send(ClientMessage::LinkNotes {
            note_id_1,
            note_id_2,
        })
        .await
    }

    pub async fn unlink_notes(
        &self,
        note_id_1: NoteId,
        note_id_2: NoteId,
    ) -> Result<(), ClientError> {
        self.echo(|board| board.unlink_notes(&note_id_1, &note_id_2).err())
            .await;
        self.send(ClientMessage::UnlinkNotes {
            note_id_1,
            note_id_2,
        })
        .await
    }

    pub async fn mark_solution_complete(&self, solution_id: NoteId) -> Result<(), ClientError> {
        self.echo(|board| board.resolve_solution(&solution_id).err())
            .await;
        self.send(ClientMessage::SolutionComplete(solution_id)).await
    }

    /// Like a note. Deliberately no local echo: the server loops the
    /// `note-liked` broadcast back to the sender, and that loop-back is
    /// the single increment on every peer.
    pub async fn like_note(&self, id: NoteId) -> Result<(), ClientError> {
        self.send(ClientMessage::LikeNote(id)).await
    }

    // -----------------------------------------------------------------------
    // Identity
    // -----------------------------------------------------------------------

    /// Register (or re-register -- idempotent per phone) and adopt the
    /// stored status/role on success.
    pub async fn register(&self, user: User) -> Result<RegistrationResult, ClientError> {
        let result = self
            .request(|req_id| ClientMessage::RegisterUser {
                req_id,
                user: user.clone(),
            })
            .await?;
        let AckData::Registration(result) = result else {
            return Err(ClientError::UnexpectedAck);
        };
        if result.success {
            let mut adopted = user;
            if let Some(status) = result.status {
                adopted.status = status;
            }
            if let Some(role) = result.role {
                adopted.role = role;
            }
            self.inner.state.lock().await.current_user = Some(adopted);
        }
        Ok(result)
    }

    /// Log in by phone. `None` means the phone is not registered.
    pub async fn login_by_phone(&self, phone: String) -> Result<Option<User>, ClientError> {
        let result = self
            .request(|req_id| ClientMessage::LoginByPhone { req_id, phone })
            .await?;
        let AckData::User(user) = result else {
            return Err(ClientError::UnexpectedAck);
        };
        if let Some(ref user) = user {
            self.inner.state.lock().await.current_user = Some(user.clone());
        }
        Ok(user)
    }

    /// Drop the local identity. Purely client-side.
    pub async fn logout(&self) {
        self.inner.state.lock().await.current_user = None;
    }

    /// Fetch one user by id (used to refresh status/role after reconnect).
    pub async fn fetch_user(&self, user_id: UserId) -> Result<Option<User>, ClientError> {
        let result = self
            .request(|req_id| ClientMessage::GetUser { req_id, user_id })
            .await?;
        match result {
            AckData::User(user) => Ok(user),
            _ => Err(ClientError::UnexpectedAck),
        }
    }

    // -----------------------------------------------------------------------
    // Moderation
    // -----------------------------------------------------------------------

    pub async fn fetch_pending_users(&self) -> Result<Vec<User>, ClientError> {
        let result = self
            .request(|req_id| ClientMessage::GetPendingUsers { req_id })
            .await?;
        let AckData::PendingUsers(users) = result else {
            return Err(ClientError::UnexpectedAck);
        };
        self.inner.state.lock().await.pending_users = users.clone();
        Ok(users)
    }

    pub async fn approve_user(
        &self,
        user_id: UserId,
        role: stormboard_core::user::UserRole,
    ) -> Result<(), ClientError> {
        self.send(ClientMessage::ApproveUser { user_id, role }).await
    }

    pub async fn delete_pending_user(&self, user_id: UserId) -> Result<(), ClientError> {
        self.send(ClientMessage::DeletePendingUser(user_id)).await
    }

    // -----------------------------------------------------------------------
    // Timer control (admin)
    // -----------------------------------------------------------------------

    pub async fn start_brainstorm(&self, minutes: i64) -> Result<(), ClientError> {
        self.require_local_admin().await?;
        self.send(ClientMessage::StartSession { minutes }).await
    }

    pub async fn extend_brainstorm(&self, minutes: i64) -> Result<(), ClientError> {
        self.require_local_admin().await?;
        self.send(ClientMessage::ExtendSession { minutes }).await
    }

    pub async fn end_brainstorm(&self) -> Result<(), ClientError> {
        self.require_local_admin().await?;
        self.send(ClientMessage::EndSession).await
    }

    // -----------------------------------------------------------------------
    // Session management
    // -----------------------------------------------------------------------

    pub async fn fetch_sessions(&self) -> Result<Vec<Session>, ClientError> {
        let result = self
            .request(|req_id| ClientMessage::GetSessions { req_id })
            .await?;
        let AckData::Sessions(sessions) = result else {
            return Err(ClientError::UnexpectedAck);
        };
        self.inner.state.lock().await.sessions = sessions.clone();
        Ok(sessions)
    }

    /// Create a session with a generated id. Returns whether the server
    /// accepted it.
    pub async fn create_session(
        &self,
        name: String,
        description: String,
    ) -> Result<bool, ClientError> {
        let created_by = self
            .inner
            .state
            .lock()
            .await
            .current_user
            .as_ref()
            .map(|u| u.id.clone())
            .unwrap_or_else(|| "anonymous".to_owned());
        let session = CreateSession {
            id: format!("session-{}", uuid::Uuid::new_v4()),
            name,
            description,
            created_by,
        };
        let result = self
            .request(|req_id| ClientMessage::CreateSession {
                req_id,
                session: session.clone(),
            })
            .await?;
        match result {
            AckData::Done { success } => Ok(success),
            _ => Err(ClientError::UnexpectedAck),
        }
    }

    /// Ask the server to switch every participant to another session.
    pub async fn switch_session(&self, session_id: SessionId) -> Result<bool, ClientError> {
        let result = self
            .request(|req_id| ClientMessage::SwitchSession { req_id, session_id })
            .await?;
        match result {
            AckData::Done { success } => Ok(success),
            _ => Err(ClientError::UnexpectedAck),
        }
    }

    /// Fetch dashboard statistics; `None` targets the current session.
    pub async fn session_stats(
        &self,
        session_id: Option<SessionId>,
    ) -> Result<SessionStats, ClientError> {
        let result = self
            .request(|req_id| ClientMessage::GetSessionStats { req_id, session_id })
            .await?;
        match result {
            AckData::Stats(stats) => Ok(stats),
            _ => Err(ClientError::UnexpectedAck),
        }
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    /// Apply an optimistic local echo; rejections are logged, not fatal
    /// (the server re-validates everything on arrival).
    async fn echo(
        &self,
        f: impl FnOnce(&mut stormboard_core::board::BoardState) -> Option<stormboard_core::board::Rejection>,
    ) {
        let mut state = self.inner.state.lock().await;
        if let Some(rejection) = f(&mut state.board) {
            tracing::debug!(error = %rejection, "Local echo dropped");
        }
    }

    async fn require_local_admin(&self) -> Result<(), ClientError> {
        let state = self.inner.state.lock().await;
        match state.current_user {
            Some(ref user) if user.is_admin() => Ok(()),
            _ => Err(ClientError::NotAdmin),
        }
    }

    async fn send(&self, message: ClientMessage) -> Result<(), ClientError> {
        send_message(&self.inner, &message).await
    }

    async fn request(
        &self,
        build: impl FnOnce(ReqId) -> ClientMessage,
    ) -> Result<AckData, ClientError> {
        request(&self.inner, build).await
    }
}

async fn send_message(inner: &Arc<Inner>, message: &ClientMessage) -> Result<(), ClientError> {
    let text = serde_json::to_string(message).expect("protocol messages always serialize");
    let outbound = inner.outbound.lock().await;
    match outbound.as_ref() {
        Some(sender) if sender.send(Message::Text(text)).is_ok() => Ok(()),
        _ => Err(ClientError::NotConnected),
    }
}

async fn request(
    inner: &Arc<Inner>,
    build: impl FnOnce(ReqId) -> ClientMessage,
) -> Result<AckData, ClientError> {
    let req_id = inner.next_req_id.fetch_add(1, Ordering::Relaxed);
    let (tx, rx) = oneshot::channel();
    inner.pending.lock().await.insert(req_id, tx);

    let message = build(req_id);
    if let Err(e) = send_message(inner, &message).await {
        inner.pending.lock().await.remove(&req_id);
        return Err(e);
    }

    match tokio::time::timeout(ACK_TIMEOUT, rx).await {
        Ok(Ok(data)) => Ok(data),
        Ok(Err(_)) => Err(ClientError::AckDropped),
        Err(_) => {
            inner.pending.lock().await.remove(&req_id);
            Err(ClientError::AckTimeout)
        }
    }
}

/// Resolve one correlated ack; unknown ids are stale (timed out) replies.
async fn resolve_ack(inner: &Arc<Inner>, req_id: ReqId, result: AckData) {
    match inner.pending.lock().await.remove(&req_id) {
        Some(tx) => {
            let _ = tx.send(result);
        }
        None => tracing::debug!(req_id, "Ack for unknown request dropped"),
    }
}

/// Drop every pending request so callers see `AckDropped` instead of
/// hanging across a reconnect.
async fn fail_pending(inner: &Arc<Inner>) {
    inner.pending.lock().await.clear();
}

/// Own the connection lifecycle until shutdown: connect with bounded
/// retry, attach a writer, re-identify, pump inbound frames, repeat.
async fn supervisor(inner: Arc<Inner>) {
    loop {
        let Some(stream) = connect_with_retry(&inner.url, &inner.policy, &inner.cancel).await
        else {
            // Retry budget exhausted or shutdown requested.
            inner.state.lock().await.connected = false;
            tracing::warn!("Connection supervisor stopping");
            return;
        };

        run_connection(&inner, stream).await;

        // Teardown before the next cycle.
        *inner.outbound.lock().await = None;
        inner.state.lock().await.connected = false;
        fail_pending(&inner).await;

        if inner.cancel.is_cancelled() {
            return;
        }
        tracing::info!("Connection lost; reconnecting");
    }
}

/// Pump one established connection until it drops.
async fn run_connection(inner: &Arc<Inner>, stream: WsStream) {
    let (mut sink, mut stream) = stream.split();

    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    *inner.outbound.lock().await = Some(tx);
    inner.state.lock().await.connected = true;

    // Writer task: forward outbound frames to the sink.
    let writer = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sink.send(msg).await.is_err() {
                tracing::debug!("WebSocket sink closed");
                break;
            }
        }
    });

    // Re-identify so the server can confirm current approval/role status,
    // which may have changed while we were away.
    if inner.state.lock().await.current_user.is_some() {
        tokio::spawn(resync_identity(Arc::clone(inner)));
    }

    // Read loop.
    loop {
        tokio::select! {
            _ = inner.cancel.cancelled() => break,
            frame = stream.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ServerMessage>(&text) {
                            Ok(ServerMessage::Ack { req_id, result }) => {
                                resolve_ack(inner, req_id, result).await;
                            }
                            Ok(message) => {
                                let mut state = inner.state.lock().await;
                                reconciler::apply(&mut state, &message);
                            }
                            Err(e) => {
                                tracing::warn!(error = %e, "Unparseable server event");
                            }
                        }
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        let outbound = inner.outbound.lock().await;
                        if let Some(sender) = outbound.as_ref() {
                            let _ = sender.send(Message::Pong(payload));
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::debug!(error = %e, "WebSocket receive error");
                        break;
                    }
                }
            }
        }
    }

    writer.abort();
}

/// After a reconnect, re-register the stored identity (idempotent per
/// phone) and refresh status/role from the store, since both may have
/// changed while disconnected.
async fn resync_identity(inner: Arc<Inner>) {
    let Some(user) = inner.state.lock().await.current_user.clone() else {
        return;
    };

    let registration = request(&inner, |req_id| ClientMessage::RegisterUser {
        req_id,
        user: user.clone(),
    })
    .await;
    match registration {
        Ok(AckData::Registration(result)) if result.success => {}
        Ok(_) | Err(_) => {
            tracing::warn!("Identity re-sync registration failed");
            return;
        }
    }

    match request(&inner, |req_id| ClientMessage::GetUser {
        req_id,
        user_id: user.id.clone(),
    })
    .await
    {
        Ok(AckData::User(Some(stored))) => {
            if stored.status != user.status || stored.role != user.role {
                tracing::info!(
                    status = stored.status.as_str(),
                    role = stored.role.as_str(),
                    "User status synced from the server"
                );
            }
            inner.state.lock().await.current_user = Some(stored);
        }
        Ok(AckData::User(None)) => {
            // Deleted while we were away: forced logout.
            tracing::info!("Stored identity no longer exists; logging out");
            inner.state.lock().await.current_user = None;
        }
        Ok(_) | Err(_) => tracing::warn!("Identity refresh failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stormboard_core::user::{UserRole, UserStatus};

    fn test_inner() -> Arc<Inner> {
        Arc::new(Inner {
            url: "ws://localhost:9999/ws".into(),
            policy: RetryPolicy::default(),
            state: Mutex::new(ClientState::default()),
            pending: Mutex::new(HashMap::new()),
            outbound: Mutex::new(None),
            next_req_id: AtomicU64::new(1),
            cancel: CancellationToken::new(),
        })
    }

    #[tokio::test]
    async fn acks_resolve_their_pending_request() {
        let inner = test_inner();
        let (tx, rx) = oneshot::channel();
        inner.pending.lock().await.insert(7, tx);

        resolve_ack(&inner, 7, AckData::Done { success: true }).await;

        assert!(matches!(rx.await, Ok(AckData::Done { success: true })));
        assert!(inner.pending.lock().await.is_empty());
    }

    #[tokio::test]
    async fn stale_acks_are_ignored() {
        let inner = test_inner();
        // No pending entry for this id; must not panic.
        resolve_ack(&inner, 42, AckData::Done { success: false }).await;
    }

    #[tokio::test]
    async fn disconnect_fails_pending_requests() {
        let inner = test_inner();
        let (tx, rx) = oneshot::channel();
        inner.pending.lock().await.insert(1, tx);

        fail_pending(&inner).await;
        assert!(rx.await.is_err());
    }

    #[tokio::test]
    async fn sends_without_a_connection_are_rejected() {
        let inner = test_inner();
        let result = send_message(&inner, &ClientMessage::LikeNote("n1".into())).await;
        assert!(matches!(result, Err(ClientError::NotConnected)));
    }

    #[tokio::test]
    async fn timer_controls_require_a_local_admin() {
        let inner = test_inner();
        let client = BoardClient {
            inner: Arc::clone(&inner),
        };
        assert!(matches!(
            client.start_brainstorm(5).await,
            Err(ClientError::NotAdmin)
        ));

        inner.state.lock().await.current_user = Some(User {
            id: "u1".into(),
            name: "Ana".into(),
            phone: "0811111111".into(),
            status: UserStatus::Approved,
            role: UserRole::Admin,
        });
        // Now admin locally, but still not connected.
        assert!(matches!(
            client.start_brainstorm(5).await,
            Err(ClientError::NotConnected)
        ));
    }
}
