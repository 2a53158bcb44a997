use serde::{Deserialize, Serialize};

use crate::codec::EMPTY_BLOCK_SIZE;
use crate::error::{BlockError, BlockResult};

/// Block sizing.
///
/// `soft_limit` bounds every block the packer produces; `record_limit` is the
/// hard ceiling the store accepts for a single record. Leaving headroom
/// between the two keeps a full block writable.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockConfig {
    pub soft_limit: usize,
    pub record_limit: usize,
}

impl Default for BlockConfig {
    fn default() -> Self {
        Self {
            soft_limit: 1014 * 1024,
            record_limit: 1024 * 1024,
        }
    }
}

impl BlockConfig {
    pub fn validate(&self) -> BlockResult<()> {
        if self.soft_limit <= EMPTY_BLOCK_SIZE {
            return Err(BlockError::InvalidConfig(format!(
                "soft_limit {} must exceed the empty block size {EMPTY_BLOCK_SIZE}",
                self.soft_limit
            )));
        }
        if self.soft_limit >= self.record_limit {
            return Err(BlockError::InvalidConfig(format!(
                "soft_limit {} must be below record_limit {}",
                self.soft_limit, self.record_limit
            )));
        }
        Ok(())
    }
}
