//! Storage error definitions.

use thiserror::Error;

/// Result alias for persistence adapter operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors surfaced by the persistence adapter.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Failed to open or configure the database file.
    #[error("failed to open database: {0}")]
    Open(String),

    /// The embedded engine rejected a statement.
    #[error("sql error: {0}")]
    Sql(#[from] rusqlite::Error),

    /// A batch failed and was rolled back.
    #[error("batch failed at statement {index}: {source}")]
    Batch {
        /// Zero-based position of the failing statement.
        index: usize,
        #[source]
        source: rusqlite::Error,
    },

    /// Schema initialization script could not be read or applied.
    #[error("schema initialization failed: {0}")]
    Schema(String),

    /// The blocking worker running the query was cancelled or panicked.
    #[error("database worker failed: {0}")]
    Worker(String),

    /// The connection lock was poisoned by a panic in another query.
    #[error("database connection poisoned")]
    Poisoned,
}
