//! Repository for the `sessions` table and per-session aggregates.

use sqlx::PgPool;

use stormboard_core::session::{
    CategoryCount, CreateSession, QuadrantCount, Session, SessionStats,
};

use crate::models::SessionRow;

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "id, name, description, created_at, is_active, created_by";

/// Provides CRUD operations for sessions. Sessions are append-only; there
/// is no deletion or archival.
pub struct SessionRepo;

impl SessionRepo {
    /// List all sessions, newest first.
    pub async fn list(pool: &PgPool) -> Result<Vec<Session>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM sessions ORDER BY created_at DESC");
        let rows = sqlx::query_as::<_, SessionRow>(&query)
            .fetch_all(pool)
            .await?;
        Ok(rows.into_iter().map(Session::from).collect())
    }

    /// Find a session by id.
    pub async fn find_by_id(pool: &PgPool, id: &str) -> Result<Option<Session>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM sessions WHERE id = $1");
        let row = sqlx::query_as::<_, SessionRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await?;
        Ok(row.map(Session::from))
    }

    /// Insert a new session, returning the stored row.
    pub async fn create(pool: &PgPool, input: &CreateSession) -> Result<Session, sqlx::Error> {
        let query = format!(
            "INSERT INTO sessions (id, name, description, created_by)
             VALUES ($1, $2, $3, $4)
             RETURNING {COLUMNS}"
        );
        let row = sqlx::query_as::<_, SessionRow>(&query)
            .bind(&input.id)
            .bind(&input.name)
            .bind(&input.description)
            .bind(&input.created_by)
            .fetch_one(pool)
            .await?;
        Ok(row.into())
    }

    /// Aggregate dashboard statistics for one session. Merged notes are
    /// excluded from every count.
    pub async fn stats(pool: &PgPool, session_id: &str) -> Result<SessionStats, sqlx::Error> {
        let (total_problems,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM notes
             WHERE session_id = $1 AND note_type = 'PROBLEM' AND status != 'MERGED'",
        )
        .bind(session_id)
        .fetch_one(pool)
        .await?;

        let (resolved_problems,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM notes
             WHERE session_id = $1 AND note_type = 'PROBLEM' AND status = 'RESOLVED'",
        )
        .bind(session_id)
        .fetch_one(pool)
        .await?;

        let (active_problems,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM notes
             WHERE session_id = $1 AND note_type = 'PROBLEM' AND status = 'ACTIVE'",
        )
        .bind(session_id)
        .fetch_one(pool)
        .await?;

        let (total_solutions,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM notes
             WHERE session_id = $1 AND note_type = 'SOLUTION' AND status != 'MERGED'",
        )
        .bind(session_id)
        .fetch_one(pool)
        .await?;

        let category_breakdown: Vec<(String, i64)> = sqlx::query_as(
            "SELECT category, COUNT(*) FROM notes
             WHERE session_id = $1 AND note_type = 'PROBLEM' AND status != 'MERGED'
             GROUP BY category",
        )
        .bind(session_id)
        .fetch_all(pool)
        .await?;

        let quadrant_breakdown: Vec<(String, i64)> = sqlx::query_as(
            "SELECT quadrant, COUNT(*) FROM notes
             WHERE session_id = $1 AND note_type = 'PROBLEM' AND status != 'MERGED'
             GROUP BY quadrant",
        )
        .bind(session_id)
        .fetch_all(pool)
        .await?;

        Ok(SessionStats {
            total_problems,
            resolved_problems,
            active_problems,
            total_solutions,
            category_breakdown: category_breakdown
                .into_iter()
                .map(|(category, count)| CategoryCount { category, count })
                .collect(),
            quadrant_breakdown: quadrant_breakdown
                .into_iter()
                .map(|(quadrant, count)| QuadrantCount { quadrant, count })
                .collect(),
        })
    }
}
