//! Applies server broadcasts to the local state mirror.
//!
//! Every participant holds a [`ClientState`] and feeds each inbound
//! [`ServerMessage`] through [`apply`]. Mutation events are replayed
//! through `stormboard_core::board`, the exact functions the server used,
//! so id-only payloads (merge, link, resolve) produce identical state on
//! every peer.

use stormboard_core::board::BoardState;
use stormboard_core::protocol::ServerMessage;
use stormboard_core::session::Session;
use stormboard_core::timer::BrainstormTimer;
use stormboard_core::types::{SessionId, DEFAULT_SESSION_ID};
use stormboard_core::user::{User, UserStatus};

/// The client-local mirror of engine state plus participant-only fields
/// (current user, pending approval queue, known sessions).
#[derive(Debug, Clone)]
pub struct ClientState {
    pub board: BoardState,
    pub timer: BrainstormTimer,
    pub current_session: SessionId,
    pub current_user: Option<User>,
    pub pending_users: Vec<User>,
    pub sessions: Vec<Session>,
    pub connected: bool,
}

impl Default for ClientState {
    fn default() -> Self {
        Self {
            board: BoardState::new(),
            timer: BrainstormTimer::default(),
            current_session: DEFAULT_SESSION_ID.to_owned(),
            current_user: None,
            pending_users: Vec::new(),
            sessions: Vec::new(),
            connected: false,
        }
    }
}

impl ClientState {
    /// Note submission is open iff the window is active and unexpired.
    pub fn can_add_notes(&self) -> bool {
        self.timer.can_add_notes(chrono::Utc::now())
    }
}

/// Apply one inbound broadcast to the mirror.
///
/// Rejections from the board (a stale id, a replayed merge) are expected
/// when notes vanish concurrently; they are logged and dropped exactly
/// like on the server.
pub fn apply(state: &mut ClientState, message: &ServerMessage) {
    match message {
        // --- Snapshots ---
        ServerMessage::SyncNotes(notes) => {
            state.board.replace(notes.clone());
        }
        ServerMessage::SessionSync(timer) => {
            state.timer = timer.clone();
        }
        ServerMessage::CurrentSession(session_id) => {
            state.current_session = session_id.clone();
        }

        // --- Note mutation fan-out ---
        ServerMessage::NoteAdded(note) => {
            if let Err(e) = state.board.add_note(note.clone()) {
                tracing::debug!(error = %e, "Inbound note dropped");
            }
        }
        ServerMessage::QuadrantUpdated { id, quadrant } => {
            if let Err(e) = state.board.update_quadrant(id, *quadrant) {
                tracing::debug!(error = %e, "Inbound quadrant update dropped");
            }
        }
        ServerMessage::NotesMerged {
            source_id,
            target_id,
        } => {
            if let Err(e) = state.board.merge_notes(source_id, target_id) {
                tracing::debug!(error = %e, "Inbound merge dropped");
            }
        }
        ServerMessage::NotesLinked {
            note_id_1,
            note_id_2,
        } => {
            if let Err(e) = state.board.link_notes(note_id_1, note_id_2) {
                tracing::debug!(error = %e, "Inbound link dropped");
            }
        }
        ServerMessage::NotesUnlinked {
            note_id_1,
            note_id_2,
        } => {
            if let Err(e) = state.board.unlink_notes(note_id_1, note_id_2) {
                tracing::debug!(error = %e, "Inbound unlink dropped");
            }
        }
        ServerMessage::SolutionCompleted(solution_id) => {
            if let Err(e) = state.board.resolve_solution(solution_id) {
                tracing::debug!(error = %e, "Inbound resolve dropped");
            }
        }
        ServerMessage::NoteLiked(id) => {
            // Likes are not echoed locally on send; the loop-back
            // broadcast is the single increment for every peer.
            if let Err(e) = state.board.like_note(id) {
                tracing::debug!(error = %e, "Inbound like dropped");
            }
        }

        // --- User fan-out ---
        ServerMessage::NewPendingUser(user) => {
            state.pending_users.insert(0, user.clone());
        }
        ServerMessage::UserApproved { user_id, role } => {
            state.pending_users.retain(|u| &u.id != user_id);
            if let Some(user) = state.current_user.as_mut() {
                if &user.id == user_id {
                    user.status = UserStatus::Approved;
                    user.role = *role;
                }
            }
        }
        ServerMessage::UserDeleted(user_id) => {
            state.pending_users.retain(|u| &u.id != user_id);
            // Forced logout when it is us.
            if state
                .current_user
                .as_ref()
                .is_some_and(|u| &u.id == user_id)
            {
                tracing::info!("This user was removed by an admin; logging out");
                state.current_user = None;
            }
        }

        // --- Timer fan-out ---
        ServerMessage::SessionStarted {
            end_time,
            started_by,
        } => {
            state.timer = BrainstormTimer {
                is_active: true,
                end_time: Some(*end_time),
                started_by: Some(started_by.clone()),
            };
        }
        ServerMessage::SessionExtended { end_time } => {
            state.timer.end_time = Some(*end_time);
        }
        ServerMessage::SessionEnded => {
            state.timer = BrainstormTimer::default();
        }

        // --- Session fan-out ---
        ServerMessage::SessionCreated(session) => {
            state.sessions.insert(0, session.clone());
        }

        // Acks are correlated by the connection task, never applied here.
        ServerMessage::Ack { .. } => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use stormboard_core::note::{Category, Note, NoteStatus, NoteType, Quadrant};
    use stormboard_core::protocol::ServerMessage;
    use stormboard_core::user::UserRole;

    fn note(id: &str, note_type: NoteType) -> Note {
        Note {
            id: id.into(),
            content: format!("content of {id}"),
            author: "Ana".into(),
            avatar_url: None,
            category: Category::Customer,
            note_type,
            quadrant: Quadrant::Unsorted,
            status: NoteStatus::Active,
            timestamp: Utc.with_ymd_and_hms(2026, 1, 5, 10, 0, 0).unwrap(),
            likes: 0,
            linked_note_ids: vec![],
            merged_from_ids: vec![],
            created_by_user_id: None,
            created_by_phone: None,
            created_by_name: None,
            session_id: None,
        }
    }

    fn user(id: &str) -> User {
        User {
            id: id.into(),
            name: format!("user {id}"),
            phone: format!("08{id}"),
            status: UserStatus::Pending,
            role: UserRole::User,
        }
    }

    #[test]
    fn id_only_broadcasts_converge() {
        let mut state = ClientState::default();
        apply(
            &mut state,
            &ServerMessage::SyncNotes(vec![
                note("p1", NoteType::Problem),
                note("p2", NoteType::Problem),
                note("s1", NoteType::Solution),
            ]),
        );

        apply(
            &mut state,
            &ServerMessage::NotesMerged {
                source_id: "p1".into(),
                target_id: "p2".into(),
            },
        );
        apply(
            &mut state,
            &ServerMessage::NotesLinked {
                note_id_1: "s1".into(),
                note_id_2: "p2".into(),
            },
        );
        apply(&mut state, &ServerMessage::SolutionCompleted("s1".into()));

        let p1 = state.board.get("p1").unwrap();
        assert_eq!(p1.status, NoteStatus::Merged);
        let p2 = state.board.get("p2").unwrap();
        assert_eq!(p2.status, NoteStatus::Resolved);
        assert!(p2.content.contains("[merged from: content of p1]"));
        let s1 = state.board.get("s1").unwrap();
        assert_eq!(s1.status, NoteStatus::Resolved);
        assert_eq!(s1.linked_note_ids, vec!["p2".to_owned()]);
    }

    #[test]
    fn replayed_merge_does_not_double_apply() {
        let mut state = ClientState::default();
        apply(
            &mut state,
            &ServerMessage::SyncNotes(vec![
                note("p1", NoteType::Problem),
                note("p2", NoteType::Problem),
            ]),
        );
        let merged = ServerMessage::NotesMerged {
            source_id: "p1".into(),
            target_id: "p2".into(),
        };
        apply(&mut state, &merged);
        apply(&mut state, &merged);

        let p2 = state.board.get("p2").unwrap();
        assert_eq!(p2.merged_from_ids.len(), 1);
        assert_eq!(p2.content.matches("[merged from:").count(), 1);
    }

    #[test]
    fn like_broadcast_is_the_single_increment() {
        let mut state = ClientState::default();
        apply(
            &mut state,
            &ServerMessage::SyncNotes(vec![note("n1", NoteType::Problem)]),
        );
        apply(&mut state, &ServerMessage::NoteLiked("n1".into()));
        assert_eq!(state.board.get("n1").unwrap().likes, 1);
    }

    #[test]
    fn sync_replaces_the_projection_wholesale() {
        let mut state = ClientState::default();
        apply(
            &mut state,
            &ServerMessage::SyncNotes(vec![note("n1", NoteType::Problem)]),
        );
        // A switch to an empty session clears the mirror too.
        apply(&mut state, &ServerMessage::SyncNotes(vec![]));
        assert!(state.board.is_empty());
    }

    #[test]
    fn approval_updates_the_current_user() {
        let mut state = ClientState::default();
        state.current_user = Some(user("u1"));
        state.pending_users = vec![user("u1"), user("u2")];

        apply(
            &mut state,
            &ServerMessage::UserApproved {
                user_id: "u1".into(),
                role: UserRole::Admin,
            },
        );

        assert_eq!(state.pending_users.len(), 1);
        let me = state.current_user.as_ref().unwrap();
        assert_eq!(me.status, UserStatus::Approved);
        assert_eq!(me.role, UserRole::Admin);
    }

    #[test]
    fn deletion_forces_logout() {
        let mut state = ClientState::default();
        state.current_user = Some(user("u1"));

        apply(&mut state, &ServerMessage::UserDeleted("u2".into()));
        assert!(state.current_user.is_some());

        apply(&mut state, &ServerMessage::UserDeleted("u1".into()));
        assert!(state.current_user.is_none());
    }

    #[test]
    fn timer_fanout_drives_the_gate() {
        let mut state = ClientState::default();
        assert!(!state.can_add_notes());

        let end = Utc::now() + Duration::minutes(5);
        apply(
            &mut state,
            &ServerMessage::SessionStarted {
                end_time: end,
                started_by: "admin".into(),
            },
        );
        assert!(state.can_add_notes());

        let extended = end + Duration::minutes(5);
        apply(
            &mut state,
            &ServerMessage::SessionExtended { end_time: extended },
        );
        assert_eq!(state.timer.end_time, Some(extended));

        apply(&mut state, &ServerMessage::SessionEnded);
        assert!(!state.can_add_notes());
        assert_eq!(state.timer, BrainstormTimer::default());
    }
}
