//! The authoritative mutation engine.
//!
//! One engine task owns the in-memory note projection for the current
//! session, the brainstorm timer, and the connection-to-user identity
//! map. Every inbound client event is pushed onto a single unbounded
//! command queue and handled one at a time, in arrival order, so no two
//! mutations are ever applied concurrently to the authoritative copy.
//!
//! The in-memory projection is committed first; durable writes are
//! spawned fire-and-forget afterwards. A failed write is logged and the
//! in-memory state stands -- the divergence heals on the next full reload
//! (restart or session switch). Operations addressing missing ids or
//! violating preconditions are silent no-ops: logged server-side, never
//! surfaced as errors to other participants.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use validator::Validate;

use stormboard_core::board::BoardState;
use stormboard_core::note::{Note, NoteStatus, Quadrant};
use stormboard_core::protocol::{AckData, ClientMessage, RegistrationResult, ReqId, ServerMessage};
use stormboard_core::session::CreateSession;
use stormboard_core::timer::BrainstormTimer;
use stormboard_core::types::{ConnId, NoteId, SessionId, UserId, DEFAULT_SESSION_ID};
use stormboard_core::user::{User, UserRole, UserStatus};

use stormboard_db::repositories::{NoteRepo, SessionRepo, UserRepo};
use stormboard_db::DbPool;

use stormboard_events::{EventBus, Scope};

/// A unit of work for the engine's command queue.
#[derive(Debug)]
pub enum EngineCommand {
    /// A participant connected; reply with the full-state snapshot.
    Connected { conn_id: ConnId },
    /// A parsed client event.
    Inbound {
        conn_id: ConnId,
        message: ClientMessage,
    },
    /// The connection went away; forget its identity.
    Disconnected { conn_id: ConnId },
}

/// The single authority over the current session's projection.
pub struct MutationEngine {
    pool: DbPool,
    bus: Arc<EventBus>,
    board: BoardState,
    timer: BrainstormTimer,
    current_session: SessionId,
    /// Which user each live connection has identified as (via
    /// registration or login). Re-populated on every reconnect.
    identities: HashMap<ConnId, UserId>,
}

impl MutationEngine {
    /// Build an engine with the default session's projection loaded from
    /// the durable store. The timer always starts inactive.
    pub async fn new(pool: DbPool, bus: Arc<EventBus>) -> Result<Self, sqlx::Error> {
        let notes = NoteRepo::list_by_session(&pool, DEFAULT_SESSION_ID).await?;
        tracing::info!(
            count = notes.len(),
            session_id = DEFAULT_SESSION_ID,
            "Loaded note projection"
        );
        Ok(Self {
            pool,
            bus,
            board: BoardState::from_notes(notes),
            timer: BrainstormTimer::default(),
            current_session: DEFAULT_SESSION_ID.to_owned(),
            identities: HashMap::new(),
        })
    }

    /// Spawn the engine task, returning the sender half of its queue.
    pub fn spawn(self) -> (mpsc::UnboundedSender<EngineCommand>, tokio::task::JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(self.run(rx));
        (tx, handle)
    }

    /// Drain the command queue until every sender is dropped.
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<EngineCommand>) {
        while let Some(cmd) = rx.recv().await {
            self.handle(cmd).await;
        }
        tracing::info!("Engine command queue closed, shutting down");
    }

    async fn handle(&mut self, cmd: EngineCommand) {
        match cmd {
            EngineCommand::Connected { conn_id } => self.send_snapshot(&conn_id),
            EngineCommand::Disconnected { conn_id } => {
                self.identities.remove(&conn_id);
            }
            EngineCommand::Inbound { conn_id, message } => self.apply(conn_id, message).await,
        }
    }

    /// Full-state resynchronization for a newly connected participant.
    /// There is no incremental catch-up log, only this snapshot.
    fn send_snapshot(&self, conn_id: &ConnId) {
        self.publish_to(
            conn_id,
            ServerMessage::SyncNotes(self.board.notes().to_vec()),
        );
        self.publish_to(conn_id, ServerMessage::SessionSync(self.timer.clone()));
        self.publish_to(
            conn_id,
            ServerMessage::CurrentSession(self.current_session.clone()),
        );
    }

    async fn apply(&mut self, conn_id: ConnId, message: ClientMessage) {
        match message {
            ClientMessage::AddNote(note) => self.add_note(conn_id, note),
            ClientMessage::UpdateQuadrant { id, quadrant } => {
                self.update_quadrant(conn_id, id, quadrant)
            }
            ClientMessage::MergeNotes {
                source_id,
                target_id,
            } => self.merge_notes(conn_id, source_id, target_id),
            ClientMessage::LinkNotes {
                note_id_1,
                note_id_2,
            } => self.link_notes(conn_id, note_id_1, note_id_2),
            ClientMessage::UnlinkNotes {
                note_id_1,
                note_id_2,
            } => self.unlink_notes(conn_id, note_id_1, note_id_2),
            ClientMessage::SolutionComplete(solution_id) => {
                self.solution_complete(conn_id, solution_id)
            }
            ClientMessage::LikeNote(id) => self.like_note(id),

            ClientMessage::RegisterUser { req_id, user } => {
                self.register_user(conn_id, req_id, user).await
            }
            ClientMessage::GetUser { req_id, user_id } => {
                self.get_user(conn_id, req_id, user_id).await
            }
            ClientMessage::LoginByPhone { req_id, phone } => {
                self.login_by_phone(conn_id, req_id, phone).await
            }
            ClientMessage::GetPendingUsers { req_id } => {
                self.get_pending_users(conn_id, req_id).await
            }
            ClientMessage::ApproveUser { user_id, role } => {
                self.approve_user(conn_id, user_id, role).await
            }
            ClientMessage::DeletePendingUser(user_id) => {
                self.delete_pending_user(conn_id, user_id).await
            }

            ClientMessage::StartSession { minutes } => self.start_timer(conn_id, minutes).await,
            ClientMessage::ExtendSession { minutes } => self.extend_timer(conn_id, minutes).await,
            ClientMessage::EndSession => self.end_timer(conn_id).await,

            ClientMessage::GetSessions { req_id } => self.get_sessions(conn_id, req_id).await,
            ClientMessage::CreateSession { req_id, session } => {
                self.create_session(conn_id, req_id, session).await
            }
            ClientMessage::SwitchSession { req_id, session_id } => {
                self.switch_session(conn_id, req_id, session_id).await
            }
            ClientMessage::GetSessionStats { req_id, session_id } => {
                self.get_session_stats(conn_id, req_id, session_id).await
            }
        }
    }

    // -----------------------------------------------------------------------
    // Note mutations
    // -----------------------------------------------------------------------

    fn add_note(&mut self, conn_id: ConnId, mut note: Note) {
        // Server-side gate: submissions are only open inside the active
        // brainstorm window. A closed gate drops the note entirely -- no
        // projection change, no persistence, no broadcast.
        if !self.timer.can_add_notes(Utc::now()) {
            tracing::warn!(note_id = %note.id, "Note rejected: submissions are closed");
            return;
        }

        note.session_id = Some(self.current_session.clone());
        if let Err(rejection) = self.board.add_note(note.clone()) {
            tracing::warn!(error = %rejection, "Note rejected");
            return;
        }

        self.publish_except(&conn_id, ServerMessage::NoteAdded(note.clone()));

        let pool = self.pool.clone();
        let session_id = self.current_session.clone();
        spawn_persist("note.insert", async move {
            NoteRepo::insert(&pool, &note, &session_id).await
        });
    }

    fn update_quadrant(&mut self, conn_id: ConnId, id: NoteId, quadrant: Quadrant) {
        if let Err(rejection) = self.board.update_quadrant(&id, quadrant) {
            tracing::warn!(error = %rejection, "Quadrant update dropped");
            return;
        }

        let pool = self.pool.clone();
        let note_id = id.clone();
        spawn_persist("note.quadrant", async move {
            NoteRepo::update_quadrant(&pool, &note_id, quadrant).await
        });

        self.publish_except(&conn_id, ServerMessage::QuadrantUpdated { id, quadrant });
    }

    fn merge_notes(&mut self, conn_id: ConnId, source_id: NoteId, target_id: NoteId) {
        if let Err(rejection) = self.board.merge_notes(&source_id, &target_id) {
            tracing::warn!(error = %rejection, "Merge dropped");
            return;
        }

        // The combine already ran; persist the two mutated rows.
        if let Some(target) = self.board.get(&target_id) {
            let pool = self.pool.clone();
            let id = target_id.clone();
            let content = target.content.clone();
            let merged_from = target.merged_from_ids.clone();
            let likes = target.likes;
            spawn_persist("note.merge_target", async move {
                NoteRepo::update_merge_target(&pool, &id, &content, &merged_from, likes).await
            });
        }
        let pool = self.pool.clone();
        let id = source_id.clone();
        spawn_persist("note.merge_source", async move {
            NoteRepo::update_status(&pool, &id, NoteStatus::Merged).await
        });

        // Receivers recompute the same merge deterministically from their
        // own copies; the broadcast carries only the two ids.
        self.publish_except(
            &conn_id,
            ServerMessage::NotesMerged {
                source_id,
                target_id,
            },
        );
    }

    fn link_notes(&mut self, conn_id: ConnId, note_id_1: NoteId, note_id_2: NoteId) {
        if let Err(rejection) = self.board.link_notes(&note_id_1, &note_id_2) {
            tracing::warn!(error = %rejection, "Link dropped");
            return;
        }
        self.persist_link_sides(&note_id_1, &note_id_2);
        self.publish_except(
            &conn_id,
            ServerMessage::NotesLinked {
                note_id_1,
                note_id_2,
            },
        );
    }

    fn unlink_notes(&mut self, conn_id: ConnId, note_id_1: NoteId, note_id_2: NoteId) {
        if let Err(rejection) = self.board.unlink_notes(&note_id_1, &note_id_2) {
            tracing::warn!(error = %rejection, "Unlink dropped");
            return;
        }
        self.persist_link_sides(&note_id_1, &note_id_2);
        self.publish_except(
            &conn_id,
            ServerMessage::NotesUnlinked {
                note_id_1,
                note_id_2,
            },
        );
    }

    /// Persist both sides of the symmetric link relation as they now are.
    fn persist_link_sides(&self, id1: &str, id2: &str) {
        for id in [id1, id2] {
            if let Some(note) = self.board.get(id) {
                let pool = self.pool.clone();
                let note_id = note.id.clone();
                let links = note.linked_note_ids.clone();
                spawn_persist("note.links", async move {
                    NoteRepo::update_links(&pool, &note_id, &links).await
                });
            }
        }
    }

    fn solution_complete(&mut self, conn_id: ConnId, solution_id: NoteId) {
        let resolved = match self.board.resolve_solution(&solution_id) {
            Ok(resolved) => resolved,
            Err(rejection) => {
                tracing::warn!(error = %rejection, "Resolve dropped");
                return;
            }
        };

        for id in std::iter::once(&solution_id).chain(resolved.iter()) {
            let pool = self.pool.clone();
            let note_id = id.clone();
            spawn_persist("note.resolve", async move {
                NoteRepo::update_status(&pool, &note_id, NoteStatus::Resolved).await
            });
        }

        self.publish_except(&conn_id, ServerMessage::SolutionCompleted(solution_id));
    }

    fn like_note(&mut self, id: NoteId) {
        if let Err(rejection) = self.board.like_note(&id) {
            tracing::warn!(error = %rejection, "Like dropped");
            return;
        }

        if let Some(note) = self.board.get(&id) {
            let pool = self.pool.clone();
            let note_id = id.clone();
            let likes = note.likes;
            spawn_persist("note.likes", async move {
                NoteRepo::update_likes(&pool, &note_id, likes).await
            });
        }

        // Likes loop back to the sender too: the originator applies the
        // increment from the broadcast rather than echoing locally.
        self.publish_all(ServerMessage::NoteLiked(id));
    }

    // -----------------------------------------------------------------------
    // Users and moderation
    // -----------------------------------------------------------------------

    async fn register_user(&mut self, conn_id: ConnId, req_id: ReqId, user: User) {
        if let Err(e) = user.validate() {
            tracing::warn!(error = %e, "Registration payload rejected");
            self.ack(
                &conn_id,
                req_id,
                AckData::Registration(RegistrationResult::failed()),
            );
            return;
        }

        match UserRepo::register(&self.pool, &user).await {
            Ok(stored) => {
                tracing::info!(
                    user_id = %stored.id,
                    status = stored.status.as_str(),
                    role = stored.role.as_str(),
                    "User registered"
                );
                self.identities.insert(conn_id.clone(), stored.id.clone());
                self.ack(
                    &conn_id,
                    req_id,
                    AckData::Registration(RegistrationResult::accepted(
                        stored.status,
                        stored.role,
                    )),
                );
                // Admins watching the approval queue learn about the new
                // pending registrant immediately.
                if stored.status == UserStatus::Pending {
                    self.publish_all(ServerMessage::NewPendingUser(stored));
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "Registration failed");
                self.ack(
                    &conn_id,
                    req_id,
                    AckData::Registration(RegistrationResult::failed()),
                );
            }
        }
    }

    async fn get_user(&mut self, conn_id: ConnId, req_id: ReqId, user_id: UserId) {
        let user = UserRepo::find_by_id(&self.pool, &user_id)
            .await
            .unwrap_or_else(|e| {
                tracing::error!(error = %e, "User lookup failed");
                None
            });
        self.ack(&conn_id, req_id, AckData::User(user));
    }

    async fn login_by_phone(&mut self, conn_id: ConnId, req_id: ReqId, phone: String) {
        let user = UserRepo::find_by_phone(&self.pool, &phone)
            .await
            .unwrap_or_else(|e| {
                tracing::error!(error = %e, "Login lookup failed");
                None
            });
        if let Some(ref user) = user {
            self.identities.insert(conn_id.clone(), user.id.clone());
        }
        self.ack(&conn_id, req_id, AckData::User(user));
    }

    async fn get_pending_users(&mut self, conn_id: ConnId, req_id: ReqId) {
        let users = UserRepo::list_pending(&self.pool).await.unwrap_or_else(|e| {
            tracing::error!(error = %e, "Pending user listing failed");
            Vec::new()
        });
        self.ack(&conn_id, req_id, AckData::PendingUsers(users));
    }

    async fn approve_user(&mut self, conn_id: ConnId, user_id: UserId, role: UserRole) {
        if self.require_admin(&conn_id, "approve-user").await.is_none() {
            return;
        }
        match UserRepo::approve(&self.pool, &user_id, role).await {
            Ok(true) => {
                tracing::info!(user_id = %user_id, role = role.as_str(), "User approved");
                self.publish_all(ServerMessage::UserApproved { user_id, role });
            }
            Ok(false) => {
                tracing::warn!(user_id = %user_id, "Approval for unknown user dropped");
            }
            Err(e) => tracing::error!(error = %e, "Approval failed"),
        }
    }

    async fn delete_pending_user(&mut self, conn_id: ConnId, user_id: UserId) {
        if self
            .require_admin(&conn_id, "delete-pending-user")
            .await
            .is_none()
        {
            return;
        }
        match UserRepo::delete(&self.pool, &user_id).await {
            Ok(true) => {
                tracing::info!(user_id = %user_id, "User deleted");
                // Any live connection for that user loses its identity;
                // the broadcast forces the client-side logout.
                self.identities.retain(|_, uid| uid != &user_id);
                self.publish_all(ServerMessage::UserDeleted(user_id));
            }
            Ok(false) => {
                tracing::warn!(user_id = %user_id, "Deletion of unknown user dropped");
            }
            Err(e) => tracing::error!(error = %e, "Deletion failed"),
        }
    }

    // -----------------------------------------------------------------------
    // Timer control
    // -----------------------------------------------------------------------

    async fn start_timer(&mut self, conn_id: ConnId, minutes: i64) {
        let Some(admin_id) = self.require_admin(&conn_id, "start-session").await else {
            return;
        };
        match self.timer.start(Utc::now(), minutes, admin_id.clone()) {
            Ok(end_time) => {
                tracing::info!(minutes, started_by = %admin_id, "Brainstorm window started");
                self.publish_all(ServerMessage::SessionStarted {
                    end_time,
                    started_by: admin_id,
                });
            }
            Err(e) => tracing::warn!(error = %e, "Timer start dropped"),
        }
    }

    async fn extend_timer(&mut self, conn_id: ConnId, minutes: i64) {
        if self.require_admin(&conn_id, "extend-session").await.is_none() {
            return;
        }
        match self.timer.extend(minutes) {
            Ok(end_time) => {
                tracing::info!(minutes, "Brainstorm window extended");
                self.publish_all(ServerMessage::SessionExtended { end_time });
            }
            Err(e) => tracing::warn!(error = %e, "Timer extend dropped"),
        }
    }

    async fn end_timer(&mut self, conn_id: ConnId) {
        if self.require_admin(&conn_id, "end-session").await.is_none() {
            return;
        }
        self.timer.end();
        tracing::info!("Brainstorm window ended");
        self.publish_all(ServerMessage::SessionEnded);
    }

    // -----------------------------------------------------------------------
    // Session registry
    // -----------------------------------------------------------------------

    async fn get_sessions(&mut self, conn_id: ConnId, req_id: ReqId) {
        let sessions = SessionRepo::list(&self.pool).await.unwrap_or_else(|e| {
            tracing::error!(error = %e, "Session listing failed");
            Vec::new()
        });
        self.ack(&conn_id, req_id, AckData::Sessions(sessions));
    }

    async fn create_session(&mut self, conn_id: ConnId, req_id: ReqId, input: CreateSession) {
        if self.require_admin(&conn_id, "create-session").await.is_none() {
            self.ack(&conn_id, req_id, AckData::Done { success: false });
            return;
        }
        if let Err(e) = input.validate() {
            tracing::warn!(error = %e, "Session payload rejected");
            self.ack(&conn_id, req_id, AckData::Done { success: false });
            return;
        }

        match SessionRepo::create(&self.pool, &input).await {
            Ok(session) => {
                tracing::info!(session_id = %session.id, name = %session.name, "Session created");
                self.ack(&conn_id, req_id, AckData::Done { success: true });
                self.publish_all(ServerMessage::SessionCreated(session));
            }
            Err(e) => {
                tracing::error!(error = %e, "Session creation failed");
                self.ack(&conn_id, req_id, AckData::Done { success: false });
            }
        }
    }

    /// Atomically swap the entire projection to another session and push
    /// the new state to every connected participant. This is a global,
    /// disruptive operation by design -- the current session is
    /// process-wide, not per client.
    async fn switch_session(&mut self, conn_id: ConnId, req_id: ReqId, session_id: SessionId) {
        match SessionRepo::find_by_id(&self.pool, &session_id).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                tracing::warn!(session_id = %session_id, "Switch to unknown session dropped");
                self.ack(&conn_id, req_id, AckData::Done { success: false });
                return;
            }
            Err(e) => {
                tracing::error!(error = %e, "Session lookup failed");
                self.ack(&conn_id, req_id, AckData::Done { success: false });
                return;
            }
        }

        match NoteRepo::list_by_session(&self.pool, &session_id).await {
            Ok(notes) => {
                tracing::info!(
                    session_id = %session_id,
                    count = notes.len(),
                    "Switched session"
                );
                self.board.replace(notes);
                self.current_session = session_id.clone();
                self.ack(&conn_id, req_id, AckData::Done { success: true });
                self.publish_all(ServerMessage::CurrentSession(session_id));
                self.publish_all(ServerMessage::SyncNotes(self.board.notes().to_vec()));
            }
            Err(e) => {
                // The projection is left untouched on a failed reload.
                tracing::error!(error = %e, "Session reload failed");
                self.ack(&conn_id, req_id, AckData::Done { success: false });
            }
        }
    }

    async fn get_session_stats(
        &mut self,
        conn_id: ConnId,
        req_id: ReqId,
        session_id: Option<SessionId>,
    ) {
        let target = session_id.unwrap_or_else(|| self.current_session.clone());
        let stats = SessionRepo::stats(&self.pool, &target)
            .await
            .unwrap_or_else(|e| {
                tracing::error!(error = %e, "Stats query failed");
                Default::default()
            });
        self.ack(&conn_id, req_id, AckData::Stats(stats));
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    /// Resolve the connection's identity to an approved admin, re-reading
    /// the store so a role revoked mid-session takes effect immediately.
    async fn require_admin(&self, conn_id: &ConnId, action: &'static str) -> Option<UserId> {
        let Some(user_id) = self.identities.get(conn_id) else {
            tracing::warn!(action, "Admin action from unidentified connection dropped");
            return None;
        };
        match UserRepo::find_by_id(&self.pool, user_id).await {
            Ok(Some(user)) if user.is_admin() => Some(user.id),
            Ok(_) => {
                tracing::warn!(action, user_id = %user_id, "Admin action from non-admin dropped");
                None
            }
            Err(e) => {
                tracing::error!(action, error = %e, "Admin lookup failed");
                None
            }
        }
    }

    fn ack(&self, conn_id: &ConnId, req_id: ReqId, result: AckData) {
        self.publish_to(conn_id, ServerMessage::Ack { req_id, result });
    }

    fn publish_to(&self, conn_id: &ConnId, message: ServerMessage) {
        self.bus.publish(Scope::Only(conn_id.clone()), message);
    }

    fn publish_except(&self, conn_id: &ConnId, message: ServerMessage) {
        self.bus.publish(Scope::AllExcept(conn_id.clone()), message);
    }

    fn publish_all(&self, message: ServerMessage) {
        self.bus.publish(Scope::All, message);
    }
}

/// Run a durable write in the background. The in-memory projection was
/// already updated; a failed write is logged and never rolled back.
fn spawn_persist<T, F>(op: &'static str, fut: F)
where
    T: Send + 'static,
    F: Future<Output = Result<T, sqlx::Error>> + Send + 'static,
{
    tokio::spawn(async move {
        if let Err(e) = fut.await {
            tracing::error!(error = %e, op, "Durable write failed; in-memory state stands");
        }
    });
}
