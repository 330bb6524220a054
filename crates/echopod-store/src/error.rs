//! Error types for the EchoPod store.

/// A specialized `Result` type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur while reading or writing the database.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Underlying SQLite failure.
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A username collided with an existing account.
    #[error("username '{username}' is already taken")]
    UsernameTaken {
        /// The username that collided.
        username: String,
    },
}

impl StoreError {
    /// Returns `true` if this error is a uniqueness conflict the caller can
    /// surface as a client error rather than a server fault.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::UsernameTaken { .. })
    }
}
