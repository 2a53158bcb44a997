use async_trait::async_trait;

use crate::error::StoreResult;
use crate::location::{BlockId, BlockRef, Location, Version};

/// A block as held by the store: identity, version and opaque bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredBlock {
    pub id: BlockId,
    pub version: Version,
    pub data: Vec<u8>,
}

impl StoredBlock {
    pub fn block_ref(&self) -> BlockRef {
        BlockRef::new(self.id.clone(), self.version)
    }
}

/// Where a [`BlockStore::put`] writes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PutTarget {
    /// First write of a new block under a location. The store allocates the
    /// identity and the write succeeds unconditionally.
    New(Location),
    /// Rewrite of an existing block. Succeeds only if the stored version is
    /// still `expected`.
    Existing { id: BlockId, expected: Version },
}

/// Lazy, forward-only sequence of blocks produced by [`BlockStore::scan`].
///
/// Dropping a cursor releases whatever the backend holds for it.
#[async_trait]
pub trait BlockCursor: Send {
    /// The next block, or `Ok(None)` once the scan is exhausted.
    async fn next(&mut self) -> StoreResult<Option<StoredBlock>>;
}

/// Versioned block storage.
///
/// All implementations must satisfy these invariants:
/// - `put` to an existing block is an atomic compare-and-swap on its
///   version; a stale `expected` version fails with
///   `ConcurrentModification` and writes nothing.
/// - Every successful write produces a version never seen before for that
///   block.
/// - `scan` yields blocks directly under a location in ascending id order
///   and only sees blocks that existed when it was opened.
/// - Concurrent reads are always safe.
/// - The store never interprets block contents.
/// - All I/O errors are propagated, never silently ignored.
#[async_trait]
pub trait BlockStore: Send + Sync {
    /// Per-record ceiling in bytes. Larger writes fail with `RecordTooLarge`.
    fn record_limit(&self) -> usize;

    /// Allocate a fresh location, as a child of `parent` or as a new root.
    async fn new_location(&self, parent: Option<&Location>) -> StoreResult<Location>;

    /// Returns `true` if the location has been allocated in this store.
    async fn has_location(&self, location: &Location) -> StoreResult<bool>;

    /// Open a cursor over every block directly under `location`.
    async fn scan(&self, location: &Location) -> StoreResult<Box<dyn BlockCursor>>;

    /// Read one block. Fails with `NotFound` if absent.
    async fn get(&self, id: &BlockId) -> StoreResult<StoredBlock>;

    /// Write a block and return its identity and new version.
    async fn put(&self, target: PutTarget, data: Vec<u8>) -> StoreResult<BlockRef>;

    /// The last block under `location` in scan order.
    ///
    /// Default implementation drains a scan. Backends that can find the
    /// tail directly should override it.
    async fn last_block(&self, location: &Location) -> StoreResult<Option<StoredBlock>> {
        let mut cursor = self.scan(location).await?;
        let mut last = None;
        while let Some(block) = cursor.next().await? {
            last = Some(block);
        }
        Ok(last)
    }
}
