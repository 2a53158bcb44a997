//! Block format and packing for the double-entry ledger space.
//!
//! Transactions are persisted in blocks: ordered runs of transactions
//! encoded as one store record. This crate owns the block wire format and
//! the packer that groups an incoming transaction sequence into blocks under
//! a soft size limit.
//!
//! # Architecture
//!
//! - **DataBlock**: magic + format header, bincode payload, CRC32 trailer
//! - **BlockPacker**: fills blocks in arrival order, optionally topping up an
//!   existing tail block first
//! - **BlockConfig**: soft limit and record ceiling

pub mod codec;
pub mod config;
pub mod error;
pub mod packer;

pub use codec::{transaction_size, DataBlock, BLOCK_MAGIC, EMPTY_BLOCK_SIZE, FORMAT_VERSION};
pub use config::BlockConfig;
pub use error::{BlockError, BlockResult};
pub use packer::{BlockPacker, PendingBlock};
