//! Error types for the storage engine.

use crate::types::PageId;
use thiserror::Error;

/// Result type alias for storage operations
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur in the storage engine.
///
/// These correspond one-to-one with the error kinds the design calls
/// for: `NoSpace`, `ValueTooLarge`, `CorruptNode`, `StorageFailure`,
/// `DoubleFree`. `NotFound` exists for internal plumbing only — the
/// façade (`Db::search`/`Db::delete`) never surfaces it, returning
/// `Ok(None)`/`Ok(false)` instead (a search miss or idempotent delete
/// is not an error).
#[derive(Error, Debug)]
pub enum StorageError {
    /// The allocator has no free page left in the file.
    #[error("no free page available")]
    NoSpace,

    /// Key exceeds the fixed key length `L_K` configured for this database.
    #[error("key too long: {len} bytes (max {max})")]
    KeyTooLong { len: usize, max: usize },

    /// Value exceeds `P` minus the value-page header.
    #[error("value too large: {size} bytes (max {max})")]
    ValueTooLarge { size: usize, max: usize },

    /// A node page failed to deserialize into a structurally valid node.
    #[error("corrupt node at page {page}: {reason}")]
    CorruptNode { page: PageId, reason: String },

    /// Underlying I/O failure. Fatal to the database instance.
    #[error("storage failure: {0}")]
    StorageFailure(#[from] std::io::Error),

    /// A page was freed while its bitmap bit was already clear.
    #[error("double free of page {0}")]
    DoubleFree(PageId),

    /// Search miss. Internal only; never returned across the façade.
    #[error("key not found")]
    NotFound,

    /// The file does not look like a database created by this engine,
    /// or its metadata page is corrupt.
    #[error("invalid database file: {0}")]
    InvalidDatabaseFile(String),

    /// Misuse of an internal API (e.g. reading the metadata page as a node).
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
}

impl StorageError {
    /// Create a `CorruptNode` error with context.
    pub fn corrupt_node(page: PageId, reason: impl Into<String>) -> Self {
        Self::CorruptNode {
            page,
            reason: reason.into(),
        }
    }

    /// Create an `InvalidDatabaseFile` error with a message.
    pub fn invalid_db(msg: impl Into<String>) -> Self {
        Self::InvalidDatabaseFile(msg.into())
    }

    /// Create an `InvalidOperation` error with a message.
    pub fn invalid_operation(msg: impl Into<String>) -> Self {
        Self::InvalidOperation(msg.into())
    }

    /// Fatal errors leave the database instance unusable and require `close()`.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::StorageFailure(_) | Self::CorruptNode { .. })
    }
}
