use deb_store::{BlockId, BlockRef};
use thiserror::Error;

use crate::error::SpaceError;
use crate::write::BlockOutcome;

/// A block that could not be written.
#[derive(Debug)]
pub struct BlockFailure {
    pub seq: usize,
    /// The stored block that was to be rewritten; `None` for a new block.
    pub block: Option<BlockId>,
    /// Transactions lost with this block.
    pub transactions: usize,
    pub error: SpaceError,
}

/// What an append wrote.
#[derive(Debug, Default)]
pub struct AppendReport {
    /// Written blocks, in write order.
    pub committed: Vec<BlockRef>,
    pub failures: Vec<BlockFailure>,
    /// Failure reading the source, which stopped the append early.
    pub source_error: Option<SpaceError>,
    /// Transactions persisted by committed blocks.
    pub transactions_written: usize,
    /// Transactions accepted from the source but never handed to the store.
    pub unwritten: usize,
}

impl AppendReport {
    pub(crate) fn from_outcomes(
        outcomes: Vec<BlockOutcome>,
        source_error: Option<SpaceError>,
        unwritten: usize,
    ) -> Self {
        let mut report = Self {
            source_error,
            unwritten,
            ..Default::default()
        };
        for outcome in outcomes {
            match outcome.result {
                Ok(written) => {
                    report.transactions_written += outcome.transactions;
                    report.committed.push(written);
                }
                Err(error) => report.failures.push(BlockFailure {
                    seq: outcome.seq,
                    block: outcome.origin.map(|origin| origin.id),
                    transactions: outcome.transactions,
                    error,
                }),
            }
        }
        report
    }

    /// `true` when every block was written and the source was read to the end.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty() && self.source_error.is_none()
    }

    /// The first block lost to a concurrent writer.
    pub fn first_conflict(&self) -> Option<&BlockFailure> {
        self.failures.iter().find(|f| f.error.is_conflict())
    }

    /// Every error in the report, block failures first.
    pub fn errors(&self) -> impl Iterator<Item = &SpaceError> {
        self.failures
            .iter()
            .map(|f| &f.error)
            .chain(self.source_error.as_ref())
    }

    /// Classify the report as the result of an append.
    ///
    /// A complete report is a success. When nothing was committed and there
    /// is a single error, that error alone describes the outcome.
    pub(crate) fn into_result(self) -> Result<AppendReport, AppendError> {
        if self.is_complete() {
            return Ok(self);
        }
        let single = self.failures.len() + usize::from(self.source_error.is_some()) == 1;
        let mut report = self;
        if report.committed.is_empty() && single {
            let lone = match report.failures.pop() {
                Some(failure) => Some(failure.error),
                None => report.source_error.take(),
            };
            if let Some(err) = lone {
                return Err(AppendError::Failed(err));
            }
        }
        Err(AppendError::Partial(report))
    }
}

/// Why an append did not fully succeed.
#[derive(Debug, Error)]
pub enum AppendError {
    /// Nothing was written.
    #[error("append failed: {0}")]
    Failed(#[from] SpaceError),

    /// Some blocks were written; the report says which.
    #[error(
        "append partially failed: {} block(s) committed, {} failed",
        .0.committed.len(),
        .0.failures.len()
    )]
    Partial(AppendReport),
}

impl AppendError {
    /// The conflict that caused this failure, if one did.
    pub fn conflict(&self) -> Option<&SpaceError> {
        match self {
            AppendError::Failed(err) if err.is_conflict() => Some(err),
            AppendError::Failed(_) => None,
            AppendError::Partial(report) => report.first_conflict().map(|f| &f.error),
        }
    }

    pub fn report(&self) -> Option<&AppendReport> {
        match self {
            AppendError::Partial(report) => Some(report),
            AppendError::Failed(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deb_store::{Location, Version};

    fn block_ref(seq: u64) -> BlockRef {
        BlockRef::new(BlockId::new(Location::root(1), seq), Version::new(seq))
    }

    fn conflict(seq: u64) -> SpaceError {
        SpaceError::ConcurrentModification {
            block: block_ref(seq).id,
            expected: Version::new(1),
            found: Version::new(2),
        }
    }

    fn ok(seq: usize, transactions: usize) -> BlockOutcome {
        BlockOutcome {
            seq,
            origin: None,
            transactions,
            result: Ok(block_ref(seq as u64)),
        }
    }

    fn failed(seq: usize, transactions: usize) -> BlockOutcome {
        BlockOutcome {
            seq,
            origin: Some(block_ref(seq as u64)),
            transactions,
            result: Err(conflict(seq as u64)),
        }
    }

    #[test]
    fn all_committed_is_ok() {
        let report = AppendReport::from_outcomes(vec![ok(0, 3), ok(1, 2)], None, 0)
            .into_result()
            .unwrap();
        assert_eq!(report.committed.len(), 2);
        assert_eq!(report.transactions_written, 5);
    }

    #[test]
    fn empty_append_is_ok() {
        let report = AppendReport::from_outcomes(vec![], None, 0).into_result().unwrap();
        assert!(report.committed.is_empty());
    }

    #[test]
    fn lone_conflict_is_failed() {
        let err = AppendReport::from_outcomes(vec![failed(0, 4)], None, 0)
            .into_result()
            .unwrap_err();
        assert!(matches!(err, AppendError::Failed(SpaceError::ConcurrentModification { .. })));
        assert!(err.conflict().is_some());
    }

    #[test]
    fn mixed_outcomes_are_partial() {
        let err = AppendReport::from_outcomes(vec![failed(0, 4), ok(1, 2)], None, 0)
            .into_result()
            .unwrap_err();
        let report = err.report().unwrap();
        assert_eq!(report.committed.len(), 1);
        assert_eq!(report.failures[0].block, Some(block_ref(0).id));
        assert_eq!(report.failures[0].transactions, 4);
        assert!(err.conflict().is_some());
        assert!(err.to_string().contains("1 block(s) committed, 1 failed"));
    }

    #[test]
    fn source_error_after_commit_is_partial() {
        let err = AppendReport::from_outcomes(
            vec![ok(0, 2)],
            Some(SpaceError::StoreUnavailable("reset".into())),
            3,
        )
        .into_result()
        .unwrap_err();
        let report = err.report().unwrap();
        assert_eq!(report.unwritten, 3);
        assert_eq!(report.errors().count(), 1);
        assert!(err.conflict().is_none());
    }
}
