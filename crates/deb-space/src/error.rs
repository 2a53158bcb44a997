use deb_block::BlockError;
use deb_store::{BlockId, StoreError, Version};
use deb_types::TypeError;
use thiserror::Error;

/// Errors surfaced by space operations.
#[derive(Debug, Error)]
pub enum SpaceError {
    /// The backing store cannot serve the request.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("block not found: {0}")]
    NotFound(BlockId),

    /// The block changed between read and write.
    #[error("concurrent modification of {block}: expected {expected}, found {found}")]
    ConcurrentModification {
        block: BlockId,
        expected: Version,
        found: Version,
    },

    #[error("invalid location: {0}")]
    InvalidLocation(String),

    #[error("invalid range: {0}")]
    InvalidRange(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("corrupt block: {0}")]
    CorruptBlock(String),

    #[error("transaction of {size} bytes cannot fit in a block limited to {limit} bytes")]
    TransactionTooLarge { size: usize, limit: usize },

    #[error("record of {size} bytes exceeds the {limit}-byte ceiling")]
    RecordTooLarge { size: usize, limit: usize },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Sliced and projected spaces cannot be appended to.
    #[error("space is read-only")]
    ReadOnly,

    /// A read or write flow stopped before its work was handed over.
    #[error("{0} flow closed unexpectedly")]
    FlowClosed(&'static str),
}

impl SpaceError {
    /// A decode failure attributed to the block it came from.
    pub fn corrupt(block: &BlockId, err: BlockError) -> Self {
        SpaceError::CorruptBlock(format!("{block}: {err}"))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, SpaceError::ConcurrentModification { .. })
    }
}

impl From<StoreError> for SpaceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(reason) => SpaceError::StoreUnavailable(reason),
            StoreError::Io(err) => SpaceError::StoreUnavailable(err.to_string()),
            StoreError::NotFound(id) => SpaceError::NotFound(id),
            StoreError::ConcurrentModification {
                id,
                expected,
                actual,
            } => SpaceError::ConcurrentModification {
                block: id,
                expected,
                found: actual,
            },
            StoreError::InvalidLocation(reason) => SpaceError::InvalidLocation(reason),
            StoreError::RecordTooLarge { size, limit } => SpaceError::RecordTooLarge { size, limit },
            StoreError::Corrupt { id, reason } => SpaceError::CorruptBlock(format!("{id}: {reason}")),
        }
    }
}

impl From<BlockError> for SpaceError {
    fn from(err: BlockError) -> Self {
        match err {
            BlockError::TransactionTooLarge { size, limit } => {
                SpaceError::TransactionTooLarge { size, limit }
            }
            BlockError::InvalidConfig(reason) => SpaceError::InvalidConfig(reason),
            other => SpaceError::CorruptBlock(other.to_string()),
        }
    }
}

impl From<TypeError> for SpaceError {
    fn from(err: TypeError) -> Self {
        match err {
            TypeError::InvalidRange { .. } => SpaceError::InvalidRange(err.to_string()),
            other => SpaceError::InvalidInput(other.to_string()),
        }
    }
}

pub type SpaceResult<T> = Result<T, SpaceError>;

#[cfg(test)]
mod tests {
    use super::*;
    use deb_store::Location;

    #[test]
    fn store_conflict_maps_field_for_field() {
        let id = BlockId::new(Location::root(1), 4);
        let err: SpaceError = StoreError::ConcurrentModification {
            id: id.clone(),
            expected: Version::new(1),
            actual: Version::new(2),
        }
        .into();
        match err {
            SpaceError::ConcurrentModification {
                block,
                expected,
                found,
            } => {
                assert_eq!(block, id);
                assert_eq!(expected, Version::new(1));
                assert_eq!(found, Version::new(2));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn io_errors_mean_unavailable() {
        let err: SpaceError = StoreError::Io(std::io::Error::other("disk gone")).into();
        assert!(matches!(err, SpaceError::StoreUnavailable(_)));
    }

    #[test]
    fn decode_errors_name_the_block() {
        let id = BlockId::new(Location::root(2), 9);
        let err = SpaceError::corrupt(&id, BlockError::UnsupportedFormat(7));
        assert!(err.to_string().contains("2#9"));
    }
}
