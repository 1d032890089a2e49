//! Session row model.

use sqlx::FromRow;

use stormboard_core::session::Session;
use stormboard_core::types::Timestamp;

/// Full session row from the `sessions` table.
#[derive(Debug, Clone, FromRow)]
pub struct SessionRow {
    pub id: String,
    pub name: String,
    pub description: String,
    pub created_at: Timestamp,
    pub is_active: bool,
    pub created_by: String,
}

impl From<SessionRow> for Session {
    fn from(row: SessionRow) -> Self {
        Session {
            id: row.id,
            name: row.name,
            description: row.description,
            created_at: row.created_at,
            is_active: row.is_active,
            created_by: row.created_by,
        }
    }
}
