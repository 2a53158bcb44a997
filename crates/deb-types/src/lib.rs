//! Foundation types for the double-entry ledger space.
//!
//! Every other `deb` crate depends on `deb-types`. The types here are plain
//! values with structural equality and ordering; they carry no storage or
//! concurrency behaviour.
//!
//! # Key Types
//!
//! - [`Account`]: opaque numeric account identifier
//! - [`Date`] / [`Moment`]: day and microsecond resolution time points
//! - [`DateRange`] / [`MomentRange`]: half-open `[start, end)` intervals
//! - [`Entries`]: signed amount per account
//! - [`Transaction`]: `{ moment, date, entries }`
//! - [`Filter`]: the slice/projection predicate

pub mod account;
pub mod entries;
pub mod error;
pub mod filter;
pub mod temporal;
pub mod transaction;

pub use account::Account;
pub use entries::{Entries, EntrySpec};
pub use error::TypeError;
pub use filter::Filter;
pub use temporal::{Date, DateRange, Moment, MomentRange, TimeRange};
pub use transaction::Transaction;
