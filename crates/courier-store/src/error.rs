//! Error types for the store.

/// Errors that can occur in store operations.
///
/// "Not found" and "already exists under get-or-create" are not errors; those
/// surface as `Option` / fetch-on-conflict in the individual operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// SQLite database error
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A uniqueness constraint was violated on an explicit insert
    /// (e.g. two accounts registered with the same phone-number-id).
    #[error("conflict: {0}")]
    Conflict(String),

    /// General internal error
    #[error("{0}")]
    Internal(String),
}

/// Convenience Result type.
pub type Result<T> = std::result::Result<T, Error>;
