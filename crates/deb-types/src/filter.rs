use serde::{Deserialize, Serialize};

use crate::account::Account;
use crate::error::TypeError;
use crate::temporal::{DateRange, MomentRange};
use crate::transaction::Transaction;

/// Tri-dimensional transaction predicate.
///
/// A transaction matches when every non-empty dimension matches:
/// - `accounts`: its entries touch at least one listed account;
/// - `dates`: its date falls in at least one range;
/// - `moments`: its moment falls in at least one range.
///
/// An empty list places no restriction on that dimension.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    pub accounts: Vec<Account>,
    pub dates: Vec<DateRange>,
    pub moments: Vec<MomentRange>,
}

impl Filter {
    /// Build a filter, rejecting inverted ranges.
    pub fn new(
        accounts: Vec<Account>,
        dates: Vec<DateRange>,
        moments: Vec<MomentRange>,
    ) -> Result<Self, TypeError> {
        for range in &dates {
            range.validate()?;
        }
        for range in &moments {
            range.validate()?;
        }
        Ok(Self {
            accounts,
            dates,
            moments,
        })
    }

    /// A filter that matches everything.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn is_unrestricted(&self) -> bool {
        self.accounts.is_empty() && self.dates.is_empty() && self.moments.is_empty()
    }

    pub fn matches(&self, tx: &Transaction) -> bool {
        if !self.accounts.is_empty() && !tx.entries.touches_any(&self.accounts) {
            return false;
        }
        if !self.dates.is_empty() && !self.dates.iter().any(|r| r.contains(tx.date)) {
            return false;
        }
        if !self.moments.is_empty() && !self.moments.iter().any(|r| r.contains(tx.moment)) {
            return false;
        }
        true
    }

    /// Restrict a matching transaction's entries to the listed accounts.
    ///
    /// Returns `None` when the transaction does not match. Amounts of
    /// retained entries are never changed; the result may be unbalanced.
    pub fn project(&self, mut tx: Transaction) -> Option<Transaction> {
        if !self.matches(&tx) {
            return None;
        }
        if !self.accounts.is_empty() {
            tx.entries.retain_accounts(&self.accounts);
        }
        Some(tx)
    }
}
