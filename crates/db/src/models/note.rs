//! Note row model.

use sqlx::types::Json;
use sqlx::FromRow;

use stormboard_core::note::{Category, Note, NoteStatus, NoteType, Quadrant};
use stormboard_core::types::{NoteId, Timestamp};

use super::bad_enum;

/// Full note row from the `notes` table.
#[derive(Debug, Clone, FromRow)]
pub struct NoteRow {
    pub id: String,
    pub content: String,
    pub author: String,
    pub avatar_url: Option<String>,
    pub category: String,
    pub note_type: String,
    pub quadrant: String,
    pub status: String,
    pub created_at: Timestamp,
    pub likes: i64,
    pub linked_note_ids: Json<Vec<NoteId>>,
    pub merged_from_ids: Json<Vec<NoteId>>,
    pub created_by_user_id: Option<String>,
    pub created_by_phone: Option<String>,
    pub created_by_name: Option<String>,
    pub session_id: String,
}

impl NoteRow {
    /// Convert into the domain entity, rejecting unknown enum strings.
    pub fn into_note(self) -> Result<Note, sqlx::Error> {
        Ok(Note {
            category: Category::from_str(&self.category)
                .ok_or_else(|| bad_enum("notes.category", &self.category))?,
            note_type: NoteType::from_str(&self.note_type)
                .ok_or_else(|| bad_enum("notes.note_type", &self.note_type))?,
            quadrant: Quadrant::from_str(&self.quadrant)
                .ok_or_else(|| bad_enum("notes.quadrant", &self.quadrant))?,
            status: NoteStatus::from_str(&self.status)
                .ok_or_else(|| bad_enum("notes.status", &self.status))?,
            id: self.id,
            content: self.content,
            author: self.author,
            avatar_url: self.avatar_url,
            timestamp: self.created_at,
            likes: self.likes,
            linked_note_ids: self.linked_note_ids.0,
            merged_from_ids: self.merged_from_ids.0,
            created_by_user_id: self.created_by_user_id,
            created_by_phone: self.created_by_phone,
            created_by_name: self.created_by_name,
            session_id: Some(self.session_id),
        })
    }
}
