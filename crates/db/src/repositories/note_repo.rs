//! Repository for the `notes` table.

use sqlx::types::Json;
use sqlx::PgPool;

use stormboard_core::note::{Note, NoteStatus, Quadrant};
use stormboard_core::types::NoteId;

use crate::models::NoteRow;

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "id, content, author, avatar_url, category, note_type, quadrant, status, \
                       created_at, likes, linked_note_ids, merged_from_ids, \
                       created_by_user_id, created_by_phone, created_by_name, session_id";

/// Provides CRUD operations for notes.
pub struct NoteRepo;

impl NoteRepo {
    /// Insert a new note into the given session.
    pub async fn insert(pool: &PgPool, note: &Note, session_id: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO notes (id, content, author, avatar_url, category, note_type, quadrant, \
                                status, created_at, likes, linked_note_ids, merged_from_ids, \
                                created_by_user_id, created_by_phone, created_by_name, session_id)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)",
        )
        .bind(&note.id)
        .bind(&note.content)
        .bind(&note.author)
        .bind(&note.avatar_url)
        .bind(note.category.as_str())
        .bind(note.note_type.as_str())
        .bind(note.quadrant.as_str())
        .bind(note.status.as_str())
        .bind(note.timestamp)
        .bind(note.likes)
        .bind(Json(&note.linked_note_ids))
        .bind(Json(&note.merged_from_ids))
        .bind(&note.created_by_user_id)
        .bind(&note.created_by_phone)
        .bind(&note.created_by_name)
        .bind(session_id)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Load every note belonging to a session, newest first.
    pub async fn list_by_session(
        pool: &PgPool,
        session_id: &str,
    ) -> Result<Vec<Note>, sqlx::Error> {
        let query =
            format!("SELECT {COLUMNS} FROM notes WHERE session_id = $1 ORDER BY created_at DESC");
        let rows = sqlx::query_as::<_, NoteRow>(&query)
            .bind(session_id)
            .fetch_all(pool)
            .await?;
        rows.into_iter().map(NoteRow::into_note).collect()
    }

    /// Reassign a note's quadrant. Returns `true` if the row was updated.
    pub async fn update_quadrant(
        pool: &PgPool,
        id: &str,
        quadrant: Quadrant,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE notes SET quadrant = $2 WHERE id = $1")
            .bind(id)
            .bind(quadrant.as_str())
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Update a note's lifecycle status (merge source, resolve cascade).
    pub async fn update_status(
        pool: &PgPool,
        id: &str,
        status: NoteStatus,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE notes SET status = $2 WHERE id = $1")
            .bind(id)
            .bind(status.as_str())
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Write the merge-target side of a merge: extended content, the
    /// grown merge trail, and the summed like counter.
    pub async fn update_merge_target(
        pool: &PgPool,
        id: &str,
        content: &str,
        merged_from_ids: &[NoteId],
        likes: i64,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE notes SET content = $2, merged_from_ids = $3, likes = $4 WHERE id = $1",
        )
        .bind(id)
        .bind(content)
        .bind(Json(merged_from_ids))
        .bind(likes)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Replace one side of the symmetric link relation.
    pub async fn update_links(
        pool: &PgPool,
        id: &str,
        linked_note_ids: &[NoteId],
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE notes SET linked_note_ids = $2 WHERE id = $1")
            .bind(id)
            .bind(Json(linked_note_ids))
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Store an updated like counter.
    pub async fn update_likes(pool: &PgPool, id: &str, likes: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE notes SET likes = $2 WHERE id = $1")
            .bind(id)
            .bind(likes)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
