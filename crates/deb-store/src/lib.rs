//! Versioned block storage for the double-entry ledger space.
//!
//! A block store is the narrow boundary between the ledger engine and
//! whatever persists its data. It stores opaque byte records ("blocks")
//! grouped under hierarchical locations, and versions every record so that
//! writers can detect conflicting updates without locks.
//!
//! # Operations
//!
//! - [`BlockStore::scan`]: lazy cursor over all blocks under a location
//! - [`BlockStore::get`]: read one block and its version
//! - [`BlockStore::put`]: create a block, or compare-and-swap an existing one
//! - [`BlockStore::new_location`]: allocate a fresh location
//!
//! # Storage Backends
//!
//! - [`InMemoryBlockStore`]: `HashMap`-based store for tests and embedding
//! - [`FileBlockStore`]: one directory per location, one file per block
//!
//! # Design Rules
//!
//! 1. Identities and versions are opaque tokens; callers compare, never parse.
//! 2. Rewrites are conditional on the version the writer last observed.
//! 3. Concurrent reads are always safe.
//! 4. The store never interprets block contents.
//! 5. All I/O errors are propagated, never silently ignored.

pub mod error;
pub mod file;
pub mod location;
pub mod memory;
pub mod traits;

// Re-export primary types at crate root for ergonomic imports.
pub use error::{StoreError, StoreResult};
pub use file::FileBlockStore;
pub use location::{BlockId, BlockRef, Location, Version};
pub use memory::{InMemoryBlockStore, DEFAULT_RECORD_LIMIT};
pub use traits::{BlockCursor, BlockStore, PutTarget, StoredBlock};
