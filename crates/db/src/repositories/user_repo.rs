//! Repository for the `users` table.

use sqlx::PgPool;

use stormboard_core::user::{User, UserRole, UserStatus};

use crate::models::UserRow;

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "id, name, phone, status, role, created_at";

/// Provides CRUD operations for users.
pub struct UserRepo;

impl UserRepo {
    /// Count all registered users.
    pub async fn count(pool: &PgPool) -> Result<i64, sqlx::Error> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
            .fetch_one(pool)
            .await?;
        Ok(row.0)
    }

    /// Register a user, keyed by phone with insert-ignore semantics.
    ///
    /// The very first registrant is stored approved as admin; everyone
    /// after starts pending. A duplicate phone leaves the existing row
    /// untouched. Returns the stored row for the phone, which for a
    /// duplicate reflects the original registration (and any approvals
    /// since), not the incoming payload.
    pub async fn register(pool: &PgPool, user: &User) -> Result<User, sqlx::Error> {
        let is_first = Self::count(pool).await? == 0;
        let (status, role) = if is_first {
            (UserStatus::Approved, UserRole::Admin)
        } else {
            (UserStatus::Pending, UserRole::User)
        };

        sqlx::query(
            "INSERT INTO users (id, name, phone, status, role)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (phone) DO NOTHING",
        )
        .bind(&user.id)
        .bind(&user.name)
        .bind(&user.phone)
        .bind(status.as_str())
        .bind(role.as_str())
        .execute(pool)
        .await?;

        match Self::find_by_phone(pool, &user.phone).await? {
            Some(stored) => Ok(stored),
            None => Err(sqlx::Error::RowNotFound),
        }
    }

    /// Find a user by id.
    pub async fn find_by_id(pool: &PgPool, id: &str) -> Result<Option<User>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM users WHERE id = $1");
        let row = sqlx::query_as::<_, UserRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await?;
        row.map(UserRow::into_user).transpose()
    }

    /// Find a user by phone (the login key).
    pub async fn find_by_phone(pool: &PgPool, phone: &str) -> Result<Option<User>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM users WHERE phone = $1");
        let row = sqlx::query_as::<_, UserRow>(&query)
            .bind(phone)
            .fetch_optional(pool)
            .await?;
        row.map(UserRow::into_user).transpose()
    }

    /// List users awaiting moderation, newest first.
    pub async fn list_pending(pool: &PgPool) -> Result<Vec<User>, sqlx::Error> {
        let query =
            format!("SELECT {COLUMNS} FROM users WHERE status = 'PENDING' ORDER BY created_at DESC");
        let rows = sqlx::query_as::<_, UserRow>(&query).fetch_all(pool).await?;
        rows.into_iter().map(UserRow::into_user).collect()
    }

    /// Approve a user with the given role. Returns `true` if a row was
    /// updated.
    pub async fn approve(pool: &PgPool, id: &str, role: UserRole) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE users SET status = 'APPROVED', role = $2 WHERE id = $1")
            .bind(id)
            .bind(role.as_str())
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Remove a user entirely. Returns `true` if a row was deleted.
    pub async fn delete(pool: &PgPool, id: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
