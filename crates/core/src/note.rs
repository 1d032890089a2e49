//! Note entity: a single submitted idea, either a problem or a solution.

use serde::{Deserialize, Serialize};

use crate::types::{NoteId, SessionId, Timestamp, UserId};

/// Whether a note describes a problem or a proposed solution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NoteType {
    #[serde(rename = "PROBLEM")]
    Problem,
    #[serde(rename = "SOLUTION")]
    Solution,
}

impl NoteType {
    /// The only type a note of this type may link to.
    pub fn opposite(self) -> Self {
        match self {
            NoteType::Problem => NoteType::Solution,
            NoteType::Solution => NoteType::Problem,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            NoteType::Problem => "PROBLEM",
            NoteType::Solution => "SOLUTION",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "PROBLEM" => Some(NoteType::Problem),
            "SOLUTION" => Some(NoteType::Solution),
            _ => None,
        }
    }
}

/// Priority-matrix placement. The meaning of Q1-Q4 differs between the
/// problem and solution views, but the mechanism is identical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Quadrant {
    #[serde(rename = "UNSORTED")]
    Unsorted,
    Q1,
    Q2,
    Q3,
    Q4,
}

impl Default for Quadrant {
    fn default() -> Self {
        Quadrant::Unsorted
    }
}

impl Quadrant {
    pub fn as_str(self) -> &'static str {
        match self {
            Quadrant::Unsorted => "UNSORTED",
            Quadrant::Q1 => "Q1",
            Quadrant::Q2 => "Q2",
            Quadrant::Q3 => "Q3",
            Quadrant::Q4 => "Q4",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "UNSORTED" => Some(Quadrant::Unsorted),
            "Q1" => Some(Quadrant::Q1),
            "Q2" => Some(Quadrant::Q2),
            "Q3" => Some(Quadrant::Q3),
            "Q4" => Some(Quadrant::Q4),
            _ => None,
        }
    }
}

/// Lifecycle status. `Merged` and `Resolved` are terminal soft-states;
/// notes are never hard-deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NoteStatus {
    #[serde(rename = "ACTIVE")]
    Active,
    #[serde(rename = "RESOLVED")]
    Resolved,
    #[serde(rename = "MERGED")]
    Merged,
}

impl Default for NoteStatus {
    fn default() -> Self {
        NoteStatus::Active
    }
}

impl NoteStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            NoteStatus::Active => "ACTIVE",
            NoteStatus::Resolved => "RESOLVED",
            NoteStatus::Merged => "MERGED",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "ACTIVE" => Some(NoteStatus::Active),
            "RESOLVED" => Some(NoteStatus::Resolved),
            "MERGED" => Some(NoteStatus::Merged),
            _ => None,
        }
    }
}

/// Fixed categorization of where a problem/solution belongs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Category {
    Customer,
    Process,
    Tools,
    People,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Customer => "Customer",
            Category::Process => "Process",
            Category::Tools => "Tools",
            Category::People => "People",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "Customer" => Some(Category::Customer),
            "Process" => Some(Category::Process),
            "Tools" => Some(Category::Tools),
            "People" => Some(Category::People),
            _ => None,
        }
    }
}

/// A single board note.
///
/// `linked_note_ids` is a mirrored many-to-many relation between problems
/// and solutions: if A lists B, B lists A. `merged_from_ids` is an
/// append-only audit trail of notes absorbed into this one. The creator
/// fields are retained for audit and never rendered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: NoteId,
    pub content: String,
    pub author: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    pub category: Category,
    #[serde(rename = "type")]
    pub note_type: NoteType,
    #[serde(default)]
    pub quadrant: Quadrant,
    #[serde(default)]
    pub status: NoteStatus,
    pub timestamp: Timestamp,
    #[serde(default)]
    pub likes: i64,
    #[serde(default)]
    pub linked_note_ids: Vec<NoteId>,
    #[serde(default)]
    pub merged_from_ids: Vec<NoteId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by_user_id: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by_phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
}
