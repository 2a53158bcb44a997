use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid range: start {start} is after end {end}")]
    InvalidRange { start: String, end: String },

    #[error("invalid date: {0}")]
    InvalidDate(String),

    #[error("invalid account: {0}")]
    InvalidAccount(String),

    #[error("invalid entry {0:?}: expected ACCOUNT=AMOUNT")]
    InvalidEntry(String),
}
