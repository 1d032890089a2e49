//! Brainstorm collections ("sessions"): named partitions of notes.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::types::{SessionId, Timestamp, UserId};

/// A named collection of notes. Exactly one session is current for the
/// whole server process at any time; sessions are never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: SessionId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub created_at: Timestamp,
    pub is_active: bool,
    pub created_by: UserId,
}

/// Payload for creating a new session. Creation is append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateSession {
    #[validate(length(min = 1))]
    pub id: SessionId,
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub created_by: UserId,
}

/// Aggregated dashboard statistics for one session. Merged notes are
/// excluded from every count.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStats {
    pub total_problems: i64,
    pub resolved_problems: i64,
    pub active_problems: i64,
    pub total_solutions: i64,
    pub category_breakdown: Vec<CategoryCount>,
    pub quadrant_breakdown: Vec<QuadrantCount>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryCount {
    pub category: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuadrantCount {
    pub quadrant: String,
    pub count: i64,
}
