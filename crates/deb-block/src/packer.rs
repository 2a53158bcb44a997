use deb_store::BlockRef;
use deb_types::Transaction;
use tracing::debug;

use crate::codec::{transaction_size, DataBlock, EMPTY_BLOCK_SIZE};
use crate::error::{BlockError, BlockResult};

/// A block ready to be written.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingBlock {
    /// The stored block this one replaces, with the version observed when it
    /// was read. `None` for a brand-new block.
    pub origin: Option<BlockRef>,
    pub block: DataBlock,
    /// How many of the block's transactions are new in this write.
    pub appended: usize,
}

impl PendingBlock {
    pub fn is_rewrite(&self) -> bool {
        self.origin.is_some()
    }

    fn fresh() -> Self {
        Self {
            origin: None,
            block: DataBlock::new(),
            appended: 0,
        }
    }
}

/// Packs transactions, in arrival order, into blocks no larger than a soft
/// limit.
///
/// A packer is owned by a single write flow; concurrent appends each have
/// their own. When the next transaction would push the open block over the
/// limit the open block is sealed and returned, and a new one is started.
#[derive(Debug)]
pub struct BlockPacker {
    soft_limit: usize,
    current: PendingBlock,
    sealed: usize,
}

impl BlockPacker {
    /// A packer that starts with an empty, brand-new block.
    pub fn new(soft_limit: usize) -> Self {
        Self {
            soft_limit,
            current: PendingBlock::fresh(),
            sealed: 0,
        }
    }

    /// A packer that tops up an existing stored block before opening new ones.
    ///
    /// The stored block is rewritten in full if at least one transaction is
    /// added to it. A block already at or over the limit is left untouched.
    pub fn resume(soft_limit: usize, origin: BlockRef, block: DataBlock) -> Self {
        if block.encoded_len() >= soft_limit {
            return Self::new(soft_limit);
        }
        debug!(block = %origin.id, size = block.encoded_len(), "resuming tail block");
        Self {
            soft_limit,
            current: PendingBlock {
                origin: Some(origin),
                block,
                appended: 0,
            },
            sealed: 0,
        }
    }

    pub fn soft_limit(&self) -> usize {
        self.soft_limit
    }

    /// Transactions added to the open block so far.
    pub fn pending(&self) -> usize {
        self.current.appended
    }

    /// Blocks sealed so far.
    pub fn sealed(&self) -> usize {
        self.sealed
    }

    /// Add a transaction. Returns the previous block if it had to be sealed.
    ///
    /// Fails with [`BlockError::TransactionTooLarge`] if the transaction
    /// cannot fit even in an empty block; the packer is left unchanged.
    pub fn push(&mut self, tx: Transaction) -> BlockResult<Option<PendingBlock>> {
        let size = transaction_size(&tx)?;
        if EMPTY_BLOCK_SIZE + size > self.soft_limit {
            return Err(BlockError::TransactionTooLarge {
                size: EMPTY_BLOCK_SIZE + size,
                limit: self.soft_limit,
            });
        }

        let mut sealed = None;
        if self.current.block.encoded_len() + size > self.soft_limit {
            let full = std::mem::replace(&mut self.current, PendingBlock::fresh());
            sealed = self.seal(full);
        }

        self.current.block.push_measured(tx, size);
        self.current.appended += 1;
        Ok(sealed)
    }

    /// Seal the open block, if it holds anything new.
    pub fn finish(mut self) -> Option<PendingBlock> {
        let current = std::mem::replace(&mut self.current, PendingBlock::fresh());
        self.seal(current)
    }

    fn seal(&mut self, block: PendingBlock) -> Option<PendingBlock> {
        // A resumed block that received nothing new is not rewritten.
        if block.appended == 0 {
            return None;
        }
        self.sealed += 1;
        Some(block)
    }
}
