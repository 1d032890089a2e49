//! Row types mirroring the database schema, plus conversions into the
//! domain entities from `stormboard-core`.

pub mod note;
pub mod session;
pub mod user;

pub use note::NoteRow;
pub use session::SessionRow;
pub use user::UserRow;

/// Build a decode error for an enum-ish TEXT column holding an unknown
/// value.
pub(crate) fn bad_enum(column: &'static str, value: &str) -> sqlx::Error {
    sqlx::Error::Decode(format!("unexpected value '{value}' in column {column}").into())
}
