//! User entity: a participant identity keyed by phone number.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::types::UserId;

/// Moderation status of a participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserStatus {
    #[serde(rename = "PENDING")]
    Pending,
    #[serde(rename = "APPROVED")]
    Approved,
    #[serde(rename = "REJECTED")]
    Rejected,
}

impl Default for UserStatus {
    fn default() -> Self {
        UserStatus::Pending
    }
}

impl UserStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            UserStatus::Pending => "PENDING",
            UserStatus::Approved => "APPROVED",
            UserStatus::Rejected => "REJECTED",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(UserStatus::Pending),
            "APPROVED" => Some(UserStatus::Approved),
            "REJECTED" => Some(UserStatus::Rejected),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserRole {
    #[serde(rename = "USER")]
    User,
    #[serde(rename = "ADMIN")]
    Admin,
}

impl Default for UserRole {
    fn default() -> Self {
        UserRole::User
    }
}

impl UserRole {
    pub fn as_str(self) -> &'static str {
        match self {
            UserRole::User => "USER",
            UserRole::Admin => "ADMIN",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "USER" => Some(UserRole::User),
            "ADMIN" => Some(UserRole::Admin),
            _ => None,
        }
    }
}

/// A participant.
///
/// The phone number is the natural login key: registration is idempotent
/// per phone, and login is a plain phone lookup. The very first user ever
/// registered is auto-approved as admin; everyone after starts pending.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[validate(length(min = 1))]
    pub id: UserId,
    #[validate(length(min = 1))]
    pub name: String,
    #[validate(length(min = 1, max = 32))]
    pub phone: String,
    #[serde(default)]
    pub status: UserStatus,
    #[serde(default)]
    pub role: UserRole,
}

impl User {
    /// Whether this user may perform admin-gated operations.
    pub fn is_admin(&self) -> bool {
        self.status == UserStatus::Approved && self.role == UserRole::Admin
    }
}
