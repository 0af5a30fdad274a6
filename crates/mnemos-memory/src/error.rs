use thiserror::Error;

/// Errors that can arise from memory store operations.
///
/// A missing memory is never an error: lookups return `None` or `false`.
#[derive(Error, Debug)]
pub enum MemoryError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Failed to encode memory payload: {0}")]
    Encode(#[from] serde_json::Error),

    /// A stored row could not be decoded. Raised during startup and fatal.
    #[error("Corrupt memory row {id}: {reason}")]
    CorruptRow { id: String, reason: String },
}
