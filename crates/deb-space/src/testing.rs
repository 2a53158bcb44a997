//! Store wrappers and fixtures shared by the crate's tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use deb_store::{
    BlockCursor, BlockId, BlockRef, BlockStore, InMemoryBlockStore, Location, PutTarget,
    StoreError, StoreResult, StoredBlock,
};
use deb_types::{Account, Date, Moment, Transaction};
use tokio::sync::Barrier;

/// A balanced two-entry transaction at `moment`.
pub fn sample(moment: u64) -> Transaction {
    Transaction::new(
        Moment::from_micros(moment),
        Date::from_days(19_000 + (moment % 30) as u32),
        [(Account::new(1), 100 + moment as i64), (Account::new(2), -(100 + moment as i64))].into(),
    )
}

/// Cursors opened on this store fail after yielding `healthy` blocks.
pub struct FlakyStore {
    inner: Arc<InMemoryBlockStore>,
    healthy: usize,
}

impl FlakyStore {
    pub fn new(inner: Arc<InMemoryBlockStore>, healthy: usize) -> Self {
        Self { inner, healthy }
    }
}

struct FlakyCursor {
    inner: Box<dyn BlockCursor>,
    remaining: usize,
}

#[async_trait]
impl BlockCursor for FlakyCursor {
    async fn next(&mut self) -> StoreResult<Option<StoredBlock>> {
        if self.remaining == 0 {
            return Err(StoreError::Unavailable("connection reset".into()));
        }
        self.remaining -= 1;
        self.inner.next().await
    }
}

#[async_trait]
impl BlockStore for FlakyStore {
    fn record_limit(&self) -> usize {
        self.inner.record_limit()
    }

    async fn new_location(&self, parent: Option<&Location>) -> StoreResult<Location> {
        self.inner.new_location(parent).await
    }

    async fn has_location(&self, location: &Location) -> StoreResult<bool> {
        self.inner.has_location(location).await
    }

    async fn scan(&self, location: &Location) -> StoreResult<Box<dyn BlockCursor>> {
        Ok(Box::new(FlakyCursor {
            inner: self.inner.scan(location).await?,
            remaining: self.healthy,
        }))
    }

    async fn get(&self, id: &BlockId) -> StoreResult<StoredBlock> {
        self.inner.get(id).await
    }

    async fn put(&self, target: PutTarget, data: Vec<u8>) -> StoreResult<BlockRef> {
        self.inner.put(target, data).await
    }
}

/// Holds every `last_block` caller at a barrier until all parties have
/// read the tail, so racing appends observe the same version.
pub struct GatedStore {
    inner: Arc<InMemoryBlockStore>,
    gate: Barrier,
}

impl GatedStore {
    pub fn new(inner: Arc<InMemoryBlockStore>, parties: usize) -> Self {
        Self {
            inner,
            gate: Barrier::new(parties),
        }
    }
}

#[async_trait]
impl BlockStore for GatedStore {
    fn record_limit(&self) -> usize {
        self.inner.record_limit()
    }

    async fn new_location(&self, parent: Option<&Location>) -> StoreResult<Location> {
        self.inner.new_location(parent).await
    }

    async fn has_location(&self, location: &Location) -> StoreResult<bool> {
        self.inner.has_location(location).await
    }

    async fn scan(&self, location: &Location) -> StoreResult<Box<dyn BlockCursor>> {
        self.inner.scan(location).await
    }

    async fn get(&self, id: &BlockId) -> StoreResult<StoredBlock> {
        self.inner.get(id).await
    }

    async fn put(&self, target: PutTarget, data: Vec<u8>) -> StoreResult<BlockRef> {
        self.inner.put(target, data).await
    }

    async fn last_block(&self, location: &Location) -> StoreResult<Option<StoredBlock>> {
        let tail = self.inner.last_block(location).await?;
        self.gate.wait().await;
        Ok(tail)
    }
}

/// Panics inside `put` once `healthy` writes have gone through.
pub struct CrashingStore {
    inner: Arc<InMemoryBlockStore>,
    remaining: AtomicUsize,
}

impl CrashingStore {
    pub fn new(inner: Arc<InMemoryBlockStore>, healthy: usize) -> Self {
        Self {
            inner,
            remaining: AtomicUsize::new(healthy),
        }
    }
}

#[async_trait]
impl BlockStore for CrashingStore {
    fn record_limit(&self) -> usize {
        self.inner.record_limit()
    }

    async fn new_location(&self, parent: Option<&Location>) -> StoreResult<Location> {
        self.inner.new_location(parent).await
    }

    async fn has_location(&self, location: &Location) -> StoreResult<bool> {
        self.inner.has_location(location).await
    }

    async fn scan(&self, location: &Location) -> StoreResult<Box<dyn BlockCursor>> {
        self.inner.scan(location).await
    }

    async fn get(&self, id: &BlockId) -> StoreResult<StoredBlock> {
        self.inner.get(id).await
    }

    async fn put(&self, target: PutTarget, data: Vec<u8>) -> StoreResult<BlockRef> {
        let left = self.remaining.load(Ordering::SeqCst);
        if left == 0 {
            panic!("store crashed");
        }
        self.remaining.store(left - 1, Ordering::SeqCst);
        self.inner.put(target, data).await
    }
}
