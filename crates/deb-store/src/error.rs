use crate::location::{BlockId, Version};

/// Errors from block store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Transport or I/O failure; the store cannot serve the request.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The requested block does not exist.
    #[error("block not found: {0}")]
    NotFound(BlockId),

    /// The stored version differs from the version the writer expected.
    #[error("concurrent modification of {id}: expected {expected}, found {actual}")]
    ConcurrentModification {
        id: BlockId,
        expected: Version,
        actual: Version,
    },

    /// The location is malformed or unknown to this store.
    #[error("invalid location: {0}")]
    InvalidLocation(String),

    /// The record exceeds the store's per-record ceiling.
    #[error("record of {size} bytes exceeds the {limit}-byte ceiling")]
    RecordTooLarge { size: usize, limit: usize },

    /// A stored record could not be decoded by the backend.
    #[error("corrupt record {id}: {reason}")]
    Corrupt { id: BlockId, reason: String },

    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
