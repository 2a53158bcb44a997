use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::error::{StoreError, StoreResult};
use crate::location::{BlockId, BlockRef, Location, Version};
use crate::traits::{BlockCursor, BlockStore, PutTarget, StoredBlock};

/// Default per-record ceiling: 1 MiB.
pub const DEFAULT_RECORD_LIMIT: usize = 1024 * 1024;

#[derive(Clone)]
struct Slot {
    version: Version,
    data: Arc<Vec<u8>>,
}

type Blocks = BTreeMap<u64, Slot>;

/// In-memory, HashMap-based block store.
///
/// Intended for tests and embedding. Locations and blocks are held behind a
/// `RwLock`; block payloads are shared with open cursors through `Arc` so a
/// scan never copies more than the block it is currently yielding.
pub struct InMemoryBlockStore {
    record_limit: usize,
    locations: Arc<RwLock<HashMap<Location, Blocks>>>,
    next_id: AtomicU64,
    next_version: AtomicU64,
    open_cursors: Arc<AtomicUsize>,
}

impl InMemoryBlockStore {
    /// Create a new empty store with the default record ceiling.
    pub fn new() -> Self {
        Self::with_record_limit(DEFAULT_RECORD_LIMIT)
    }

    /// Create a new empty store with a custom record ceiling.
    pub fn with_record_limit(record_limit: usize) -> Self {
        Self {
            record_limit,
            locations: Arc::new(RwLock::new(HashMap::new())),
            next_id: AtomicU64::new(1),
            next_version: AtomicU64::new(1),
            open_cursors: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of blocks stored directly under `location`.
    pub fn block_count(&self, location: &Location) -> usize {
        self.locations
            .read()
            .expect("lock poisoned")
            .get(location)
            .map(BTreeMap::len)
            .unwrap_or(0)
    }

    /// Copy of every block under `location`, in scan order.
    pub fn snapshot(&self, location: &Location) -> Vec<StoredBlock> {
        let map = self.locations.read().expect("lock poisoned");
        map.get(location)
            .map(|blocks| {
                blocks
                    .iter()
                    .map(|(seq, slot)| StoredBlock {
                        id: BlockId::new(location.clone(), *seq),
                        version: slot.version,
                        data: slot.data.as_ref().clone(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Number of scans currently open against this store.
    pub fn open_cursors(&self) -> usize {
        self.open_cursors.load(Ordering::SeqCst)
    }

    fn next_version(&self) -> Version {
        Version::new(self.next_version.fetch_add(1, Ordering::SeqCst))
    }

    fn check_size(&self, data: &[u8]) -> StoreResult<()> {
        if data.len() > self.record_limit {
            return Err(StoreError::RecordTooLarge {
                size: data.len(),
                limit: self.record_limit,
            });
        }
        Ok(())
    }
}

impl Default for InMemoryBlockStore {
    fn default() -> Self {
        Self::new()
    }
}

struct MemoryCursor {
    location: Location,
    pending: std::vec::IntoIter<u64>,
    locations: Arc<RwLock<HashMap<Location, Blocks>>>,
    open_cursors: Arc<AtomicUsize>,
}

#[async_trait]
impl BlockCursor for MemoryCursor {
    async fn next(&mut self) -> StoreResult<Option<StoredBlock>> {
        for seq in self.pending.by_ref() {
            let slot = {
                let map = self
                    .locations
                    .read()
                    .map_err(|_| StoreError::Unavailable("lock poisoned".into()))?;
                map.get(&self.location).and_then(|b| b.get(&seq)).cloned()
            };
            if let Some(slot) = slot {
                return Ok(Some(StoredBlock {
                    id: BlockId::new(self.location.clone(), seq),
                    version: slot.version,
                    data: slot.data.as_ref().clone(),
                }));
            }
        }
        Ok(None)
    }
}

impl Drop for MemoryCursor {
    fn drop(&mut self) {
        self.open_cursors.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl BlockStore for InMemoryBlockStore {
    fn record_limit(&self) -> usize {
        self.record_limit
    }

    async fn new_location(&self, parent: Option<&Location>) -> StoreResult<Location> {
        let mut map = self.locations.write().expect("lock poisoned");
        let segment = self.next_id.fetch_add(1, Ordering::SeqCst);
        let location = match parent {
            Some(parent) if !map.contains_key(parent) => {
                return Err(StoreError::InvalidLocation(format!("unknown parent {parent}")));
            }
            Some(parent) => parent.child(segment),
            None => Location::root(segment),
        };
        map.insert(location.clone(), Blocks::new());
        Ok(location)
    }

    async fn has_location(&self, location: &Location) -> StoreResult<bool> {
        let map = self.locations.read().expect("lock poisoned");
        Ok(map.contains_key(location))
    }

    async fn scan(&self, location: &Location) -> StoreResult<Box<dyn BlockCursor>> {
        let map = self.locations.read().expect("lock poisoned");
        let blocks = map
            .get(location)
            .ok_or_else(|| StoreError::InvalidLocation(location.to_string()))?;
        let pending: Vec<u64> = blocks.keys().copied().collect();
        self.open_cursors.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryCursor {
            location: location.clone(),
            pending: pending.into_iter(),
            locations: Arc::clone(&self.locations),
            open_cursors: Arc::clone(&self.open_cursors),
        }))
    }

    async fn get(&self, id: &BlockId) -> StoreResult<StoredBlock> {
        let map = self.locations.read().expect("lock poisoned");
        let slot = map
            .get(&id.location)
            .and_then(|blocks| blocks.get(&id.seq))
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        Ok(StoredBlock {
            id: id.clone(),
            version: slot.version,
            data: slot.data.as_ref().clone(),
        })
    }

    async fn put(&self, target: PutTarget, data: Vec<u8>) -> StoreResult<BlockRef> {
        self.check_size(&data)?;
        let mut map = self.locations.write().expect("lock poisoned");
        match target {
            PutTarget::New(location) => {
                let blocks = map
                    .get_mut(&location)
                    .ok_or_else(|| StoreError::InvalidLocation(location.to_string()))?;
                let seq = self.next_id.fetch_add(1, Ordering::SeqCst);
                let version = self.next_version();
                blocks.insert(
                    seq,
                    Slot {
                        version,
                        data: Arc::new(data),
                    },
                );
                Ok(BlockRef::new(BlockId::new(location, seq), version))
            }
            PutTarget::Existing { id, expected } => {
                let slot = map
                    .get_mut(&id.location)
                    .and_then(|blocks| blocks.get_mut(&id.seq))
                    .ok_or_else(|| StoreError::NotFound(id.clone()))?;
                if slot.version != expected {
                    return Err(StoreError::ConcurrentModification {
                        id,
                        expected,
                        actual: slot.version,
                    });
                }
                let version = self.next_version();
                *slot = Slot {
                    version,
                    data: Arc::new(data),
                };
                Ok(BlockRef::new(id, version))
            }
        }
    }

    async fn last_block(&self, location: &Location) -> StoreResult<Option<StoredBlock>> {
        let map = self.locations.read().expect("lock poisoned");
        let blocks = map
            .get(location)
            .ok_or_else(|| StoreError::InvalidLocation(location.to_string()))?;
        Ok(blocks.iter().next_back().map(|(seq, slot)| StoredBlock {
            id: BlockId::new(location.clone(), *seq),
            version: slot.version,
            data: slot.data.as_ref().clone(),
        }))
    }
}

impl std::fmt::Debug for InMemoryBlockStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let locations = self.locations.read().expect("lock poisoned").len();
        f.debug_struct("InMemoryBlockStore")
            .field("record_limit", &self.record_limit)
            .field("location_count", &locations)
            .finish()
    }
}
