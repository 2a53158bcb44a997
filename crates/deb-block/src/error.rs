use thiserror::Error;

#[derive(Debug, Error)]
pub enum BlockError {
    #[error("invalid block magic: expected {expected}, got {actual}")]
    InvalidMagic { expected: String, actual: String },

    #[error("unsupported block format: {0}")]
    UnsupportedFormat(u32),

    #[error("block checksum mismatch: stored {stored:#010x}, computed {computed:#010x}")]
    ChecksumMismatch { stored: u32, computed: u32 },

    #[error("corrupt block: {0}")]
    Corrupt(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("transaction of {size} bytes cannot fit in a block limited to {limit} bytes")]
    TransactionTooLarge { size: usize, limit: usize },

    #[error("invalid block configuration: {0}")]
    InvalidConfig(String),
}

impl From<bincode::Error> for BlockError {
    fn from(err: bincode::Error) -> Self {
        BlockError::Serialization(err.to_string())
    }
}

pub type BlockResult<T> = Result<T, BlockError>;
