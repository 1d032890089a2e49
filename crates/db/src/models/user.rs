//! User row model.

use sqlx::FromRow;

use stormboard_core::types::Timestamp;
use stormboard_core::user::{User, UserRole, UserStatus};

use super::bad_enum;

/// Full user row from the `users` table.
#[derive(Debug, Clone, FromRow)]
pub struct UserRow {
    pub id: String,
    pub name: String,
    pub phone: String,
    pub status: String,
    pub role: String,
    pub created_at: Timestamp,
}

impl UserRow {
    pub fn into_user(self) -> Result<User, sqlx::Error> {
        Ok(User {
            status: UserStatus::from_str(&self.status)
                .ok_or_else(|| bad_enum("users.status", &self.status))?,
            role: UserRole::from_str(&self.role)
                .ok_or_else(|| bad_enum("users.role", &self.role))?,
            id: self.id,
            name: self.name,
            phone: self.phone,
        })
    }
}
