//! Wire protocol between the server and participant clients.
//!
//! Every frame is JSON with an adjacently tagged `event` / `data`
//! envelope, so each message reads as a named event with a minimal
//! payload. Fire-and-forget mutations broadcast ids and changed fields
//! only; receivers reconstruct the full effect through
//! [`crate::board::BoardState`].
//!
//! Request/response style calls (registration, login, listings, session
//! management) carry a client-chosen `reqId`; the server answers with a
//! single `ack` event echoing that id, so the caller can resolve or
//! reject exactly one pending action.

use serde::{Deserialize, Serialize};

use crate::note::{Note, Quadrant};
use crate::session::{CreateSession, Session, SessionStats};
use crate::timer::BrainstormTimer;
use crate::types::{NoteId, SessionId, Timestamp, UserId};
use crate::user::{User, UserRole, UserStatus};

/// Correlation id for ack-style request/response calls.
pub type ReqId = u64;

/// Messages a participant sends to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum ClientMessage {
    // --- Note mutations (fire-and-forget) ---
    AddNote(Note),
    UpdateQuadrant { id: NoteId, quadrant: Quadrant },
    MergeNotes { source_id: NoteId, target_id: NoteId },
    LinkNotes { note_id_1: NoteId, note_id_2: NoteId },
    UnlinkNotes { note_id_1: NoteId, note_id_2: NoteId },
    SolutionComplete(NoteId),
    LikeNote(NoteId),

    // --- User management ---
    RegisterUser { req_id: ReqId, user: User },
    GetUser { req_id: ReqId, user_id: UserId },
    LoginByPhone { req_id: ReqId, phone: String },
    GetPendingUsers { req_id: ReqId },
    ApproveUser { user_id: UserId, role: UserRole },
    DeletePendingUser(UserId),

    // --- Timer control (admin) ---
    StartSession { minutes: i64 },
    ExtendSession { minutes: i64 },
    EndSession,

    // --- Session management ---
    GetSessions { req_id: ReqId },
    CreateSession { req_id: ReqId, session: CreateSession },
    SwitchSession { req_id: ReqId, session_id: SessionId },
    GetSessionStats {
        req_id: ReqId,
        session_id: Option<SessionId>,
    },
}

/// Messages the server sends to participants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum ServerMessage {
    // --- Snapshots (sent to one connection on connect / switch) ---
    SyncNotes(Vec<Note>),
    SessionSync(BrainstormTimer),
    CurrentSession(SessionId),

    // --- Mutation fan-out ---
    NoteAdded(Note),
    QuadrantUpdated { id: NoteId, quadrant: Quadrant },
    NotesMerged { source_id: NoteId, target_id: NoteId },
    NotesLinked { note_id_1: NoteId, note_id_2: NoteId },
    NotesUnlinked { note_id_1: NoteId, note_id_2: NoteId },
    SolutionCompleted(NoteId),
    /// Unlike the other fan-outs, this one reaches the originator too;
    /// the sender does not echo likes locally.
    NoteLiked(NoteId),

    // --- User fan-out ---
    NewPendingUser(User),
    UserApproved { user_id: UserId, role: UserRole },
    /// Receivers matching this id force-log-out.
    UserDeleted(UserId),

    // --- Timer fan-out ---
    SessionStarted {
        end_time: Timestamp,
        started_by: UserId,
    },
    SessionExtended { end_time: Timestamp },
    SessionEnded,

    // --- Session fan-out ---
    SessionCreated(Session),

    // --- Correlated reply to an ack-style request ---
    Ack { req_id: ReqId, result: AckData },
}

/// Payload of an [`ServerMessage::Ack`], tagged by request kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "kebab-case")]
pub enum AckData {
    Registration(RegistrationResult),
    /// `get-user` and `login-by-phone`: `null` means not found.
    User(Option<User>),
    PendingUsers(Vec<User>),
    Sessions(Vec<Session>),
    Stats(SessionStats),
    /// `create-session` / `switch-session`.
    Done { success: bool },
}

/// Result of a registration attempt. Duplicate phones are idempotent and
/// still successful; status/role then reflect the stored row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<UserStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<UserRole>,
}

impl RegistrationResult {
    pub fn failed() -> Self {
        Self {
            success: false,
            status: None,
            role: None,
        }
    }

    pub fn accepted(status: UserStatus, role: UserRole) -> Self {
        Self {
            success: true,
            status: Some(status),
            role: Some(role),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::note::{Category, NoteStatus, NoteType};
    use chrono::{TimeZone, Utc};

    fn sample_note() -> Note {
        Note {
            id: "n1".into(),
            content: "slow builds".into(),
            author: "Ana".into(),
            avatar_url: None,
            category: Category::Tools,
            note_type: NoteType::Problem,
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

    #[test]
    fn event_names_match_the_wire_contract() {
        let msg = ClientMessage::MergeNotes {
            source_id: "n1".into(),
            target_id: "n2".into(),
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["event"], "merge-notes");
        assert_eq!(value["data"]["sourceId"], "n1");
        assert_eq!(value["data"]["targetId"], "n2");

        let msg = ClientMessage::LinkNotes {
            note_id_1: "p1".into(),
            note_id_2: "s1".into(),
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["event"], "link-notes");
        assert_eq!(value["data"]["noteId1"], "p1");
        assert_eq!(value["data"]["noteId2"], "s1");

        let value = serde_json::to_value(&ServerMessage::SessionEnded).unwrap();
        assert_eq!(value["event"], "session-ended");
    }

    #[test]
    fn add_note_round_trips() {
        let msg = ClientMessage::AddNote(sample_note());
        let text = serde_json::to_string(&msg).unwrap();
        let back: ClientMessage = serde_json::from_str(&text).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn unit_event_parses_without_data() {
        let msg: ClientMessage = serde_json::from_str(r#"{"event":"end-session"}"#).unwrap();
        assert_eq!(msg, ClientMessage::EndSession);
    }

    #[test]
    fn ack_envelope_correlates_by_req_id() {
        let msg = ServerMessage::Ack {
            req_id: 7,
            result: AckData::Done { success: true },
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["event"], "ack");
        assert_eq!(value["data"]["reqId"], 7);
        assert_eq!(value["data"]["result"]["kind"], "done");

        let back: ServerMessage = serde_json::from_value(value).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn login_miss_is_a_null_user() {
        let msg = ServerMessage::Ack {
            req_id: 3,
            result: AckData::User(None),
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["data"]["result"]["value"], serde_json::Value::Null);
    }
}
