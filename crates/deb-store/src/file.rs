use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::location::{BlockId, BlockRef, Location, Version};
use crate::memory::DEFAULT_RECORD_LIMIT;
use crate::traits::{BlockCursor, BlockStore, PutTarget, StoredBlock};

/// Block file extension.
const BLOCK_EXT: &str = "blk";

/// Per-location advisory lock file.
const LOCK_FILE: &str = ".lock";

/// Header size: 8 bytes version (little-endian u64).
const HEADER_SIZE: usize = 8;

/// Directory-backed block store.
///
/// On-disk layout:
/// ```text
/// <root>/<seg>/<seg>/...          one directory per location
/// <root>/<seg>/.../.lock          writer lock for the location
/// <root>/<seg>/.../<seq>.blk      one file per block
/// ```
///
/// Block file format:
/// ```text
/// [8 bytes: version stamp (little-endian u64)]
/// [N bytes: block data]
/// ```
///
/// Every write holds an exclusive advisory lock on the location's `.lock`
/// file from the version check until the new file is renamed into place, so
/// compare-and-swap is atomic across store handles and processes sharing
/// the directory. Data goes to a uniquely named temporary file first; a
/// reader never sees a half-written block.
pub struct FileBlockStore {
    root: PathBuf,
    record_limit: usize,
    clock: AtomicU64,
}

impl FileBlockStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub async fn open(root: impl AsRef<Path>) -> StoreResult<Self> {
        Self::open_with_record_limit(root, DEFAULT_RECORD_LIMIT).await
    }

    pub async fn open_with_record_limit(
        root: impl AsRef<Path>,
        record_limit: usize,
    ) -> StoreResult<Self> {
        let root = root.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&root).await?;
        debug!(root = %root.display(), record_limit, "file block store opened");
        Ok(Self {
            root,
            record_limit,
            clock: AtomicU64::new(0),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Strictly increasing stamp: wall-clock microseconds, bumped past the
    /// previous stamp when the clock has not advanced.
    fn next_stamp(&self) -> u64 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_micros() as u64;
        let mut last = self.clock.load(Ordering::SeqCst);
        loop {
            let next = now.max(last + 1);
            match self
                .clock
                .compare_exchange(last, next, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => return next,
                Err(actual) => last = actual,
            }
        }
    }

    /// Keep later stamps from this handle ahead of one another handle wrote.
    fn observe(&self, stamp: u64) {
        self.clock.fetch_max(stamp, Ordering::SeqCst);
    }

    fn location_dir(&self, location: &Location) -> PathBuf {
        let mut dir = self.root.clone();
        for segment in location.segments() {
            dir.push(segment.to_string());
        }
        dir
    }

    fn block_path(&self, id: &BlockId) -> PathBuf {
        self.location_dir(&id.location).join(block_file_name(id.seq))
    }

    async fn require_location(&self, location: &Location) -> StoreResult<PathBuf> {
        let dir = self.location_dir(location);
        match tokio::fs::metadata(&dir).await {
            Ok(meta) if meta.is_dir() => Ok(dir),
            Ok(_) => Err(StoreError::InvalidLocation(location.to_string())),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(StoreError::InvalidLocation(location.to_string()))
            }
            Err(e) => Err(StoreError::Io(e)),
        }
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

    async fn list_blocks(&self, location: &Location) -> StoreResult<Vec<u64>> {
        let dir = self.require_location(location).await?;
        let mut entries = tokio::fs::read_dir(&dir).await?;
        let mut seqs = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            seqs.extend(block_seq(&entry.path()));
        }
        seqs.sort_unstable();
        Ok(seqs)
    }
}

fn block_file_name(seq: u64) -> String {
    format!("{seq:020}.{BLOCK_EXT}")
}

fn block_seq(path: &Path) -> Option<u64> {
    if path.extension().map(|e| e == BLOCK_EXT).unwrap_or(false) {
        path.file_stem()
            .and_then(|s| s.to_str())
            .and_then(|s| s.parse::<u64>().ok())
    } else {
        None
    }
}

fn decode_block_file(bytes: Vec<u8>, id: &BlockId) -> StoreResult<StoredBlock> {
    if bytes.len() < HEADER_SIZE {
        return Err(StoreError::Corrupt {
            id: id.clone(),
            reason: format!("file of {} bytes has no version header", bytes.len()),
        });
    }
    let mut stamp = [0u8; HEADER_SIZE];
    stamp.copy_from_slice(&bytes[..HEADER_SIZE]);
    Ok(StoredBlock {
        id: id.clone(),
        version: Version::new(u64::from_le_bytes(stamp)),
        data: bytes[HEADER_SIZE..].to_vec(),
    })
}

async fn read_block_file(path: &Path, id: &BlockId) -> StoreResult<Option<StoredBlock>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => decode_block_file(bytes, id).map(Some),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(StoreError::Io(e)),
    }
}

// Writers below run on the blocking pool while holding the location lock.

fn with_location_lock<T>(dir: &Path, f: impl FnOnce() -> StoreResult<T>) -> StoreResult<T> {
    let file = std::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(dir.join(LOCK_FILE))?;
    let mut lock = fd_lock::RwLock::new(file);
    let _guard = lock.write()?;
    f()
}

fn write_block_file(dir: &Path, path: &Path, version: Version, data: &[u8]) -> StoreResult<()> {
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(&version.stamp().to_le_bytes())?;
    tmp.write_all(data)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| StoreError::Io(e.error))?;
    Ok(())
}

/// Create a block whose sequence number sorts after every block already in
/// `dir`, whichever handle wrote them.
fn create_locked(dir: &Path, seq_floor: u64, stamp: u64, data: &[u8]) -> StoreResult<(u64, Version)> {
    with_location_lock(dir, || {
        let mut last = None;
        for entry in std::fs::read_dir(dir)? {
            last = last.max(block_seq(&entry?.path()));
        }
        let seq = match last {
            Some(last) => seq_floor.max(last + 1),
            None => seq_floor,
        };
        let version = Version::new(stamp);
        write_block_file(dir, &dir.join(block_file_name(seq)), version, data)?;
        Ok((seq, version))
    })
}

fn rewrite_locked(
    dir: &Path,
    id: &BlockId,
    expected: Version,
    stamp: u64,
    data: &[u8],
) -> StoreResult<Version> {
    if !dir.is_dir() {
        return Err(StoreError::NotFound(id.clone()));
    }
    with_location_lock(dir, || {
        let path = dir.join(block_file_name(id.seq));
        let current = match std::fs::read(&path) {
            Ok(bytes) => decode_block_file(bytes, id)?,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StoreError::NotFound(id.clone()))
            }
            Err(e) => return Err(StoreError::Io(e)),
        };
        if current.version != expected {
            return Err(StoreError::ConcurrentModification {
                id: id.clone(),
                expected,
                actual: current.version,
            });
        }
        let version = Version::new(stamp.max(current.version.stamp() + 1));
        write_block_file(dir, &path, version, data)?;
        Ok(version)
    })
}

async fn run_blocking<T, F>(f: F) -> StoreResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> StoreResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StoreError::Unavailable(format!("block write task failed: {e}")))?
}

struct FileCursor {
    dir: PathBuf,
    location: Location,
    pending: std::vec::IntoIter<u64>,
}

#[async_trait]
impl BlockCursor for FileCursor {
    async fn next(&mut self) -> StoreResult<Option<StoredBlock>> {
        while let Some(seq) = self.pending.next() {
            let id = BlockId::new(self.location.clone(), seq);
            let path = self.dir.join(block_file_name(seq));
            if let Some(block) = read_block_file(&path, &id).await? {
                return Ok(Some(block));
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl BlockStore for FileBlockStore {
    fn record_limit(&self) -> usize {
        self.record_limit
    }

    async fn new_location(&self, parent: Option<&Location>) -> StoreResult<Location> {
        let base = match parent {
            Some(parent) => self.require_location(parent).await?,
            None => self.root.clone(),
        };
        loop {
            let segment = self.next_stamp();
            match tokio::fs::create_dir(base.join(segment.to_string())).await {
                Ok(()) => {
                    let location = match parent {
                        Some(parent) => parent.child(segment),
                        None => Location::root(segment),
                    };
                    debug!(%location, "location allocated");
                    return Ok(location);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(StoreError::Io(e)),
            }
        }
    }

    async fn has_location(&self, location: &Location) -> StoreResult<bool> {
        match self.require_location(location).await {
            Ok(_) => Ok(true),
            Err(StoreError::InvalidLocation(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn scan(&self, location: &Location) -> StoreResult<Box<dyn BlockCursor>> {
        let seqs = self.list_blocks(location).await?;
        Ok(Box::new(FileCursor {
            dir: self.location_dir(location),
            location: location.clone(),
            pending: seqs.into_iter(),
        }))
    }

    async fn get(&self, id: &BlockId) -> StoreResult<StoredBlock> {
        read_block_file(&self.block_path(id), id)
            .await?
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }

    async fn put(&self, target: PutTarget, data: Vec<u8>) -> StoreResult<BlockRef> {
        self.check_size(&data)?;
        match target {
            PutTarget::New(location) => {
                let dir = self.require_location(&location).await?;
                let seq_floor = self.next_stamp();
                let stamp = self.next_stamp();
                let size = data.len();
                let (seq, version) =
                    run_blocking(move || create_locked(&dir, seq_floor, stamp, &data)).await?;
                self.observe(seq);
                let id = BlockId::new(location, seq);
                debug!(block = %id, %version, size, "block created");
                Ok(BlockRef::new(id, version))
            }
            PutTarget::Existing { id, expected } => {
                let dir = self.location_dir(&id.location);
                let stamp = self.next_stamp();
                let size = data.len();
                let target = id.clone();
                let version =
                    run_blocking(move || rewrite_locked(&dir, &target, expected, stamp, &data))
                        .await?;
                self.observe(version.stamp());
                debug!(block = %id, %version, size, "block rewritten");
                Ok(BlockRef::new(id, version))
            }
        }
    }

    async fn last_block(&self, location: &Location) -> StoreResult<Option<StoredBlock>> {
        let seqs = self.list_blocks(location).await?;
        for seq in seqs.into_iter().rev() {
            let id = BlockId::new(location.clone(), seq);
            if let Some(block) = read_block_file(&self.block_path(&id), &id).await? {
                return Ok(Some(block));
            }
        }
        Ok(None)
    }
}

impl std::fmt::Debug for FileBlockStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileBlockStore")
            .field("root", &self.root)
            .field("record_limit", &self.record_limit)
            .finish()
    }
}
