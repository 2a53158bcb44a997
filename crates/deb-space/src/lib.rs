//! Chunked ledger space for double-entry transactions.
//!
//! A [`Space`] presents an unbounded set of transactions as one logical
//! container while the data lives in a versioned block store whose records
//! are far smaller than the ledger. It provides:
//! - `append` of another space or an in-memory batch, packed into blocks
//!   under a soft size limit
//! - `slice` and `projection` as derived, lazily evaluated spaces
//! - `transactions`, a lazy stream fed one block at a time
//! - optimistic concurrency at block granularity, with one outcome per
//!   block written
//!
//! # Flows
//!
//! Every read runs in its own tokio task that sends transactions over a
//! bounded channel ([`TransactionStream`]). Every append runs a separate
//! write task ([`WriteFlow`]) fed sealed blocks over another bounded
//! channel, so a space can be appended to itself without deadlock.

pub mod config;
pub mod error;
pub mod pipeline;
pub mod read;
pub mod report;
pub mod space;
pub mod write;

#[cfg(test)]
mod testing;

pub use config::SpaceConfig;
pub use error::{SpaceError, SpaceResult};
pub use pipeline::{Pipeline, Stage};
pub use read::TransactionStream;
pub use report::{AppendError, AppendReport, BlockFailure};
pub use space::{BlockInfo, Space};
pub use write::{BlockOutcome, WriteFlow};
