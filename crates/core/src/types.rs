/// Opaque note identifier. Client-generated, immutable once created.
pub type NoteId = String;

/// Opaque user identifier.
pub type UserId = String;

/// Identifier of a brainstorm collection (a "session" of notes).
pub type SessionId = String;

/// Identifier of a single WebSocket connection (server-generated UUID).
pub type ConnId = String;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// The session that always exists and is active after a cold start.
pub const DEFAULT_SESSION_ID: &str = "default";
