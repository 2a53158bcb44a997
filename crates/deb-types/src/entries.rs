use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::account::Account;
use crate::error::TypeError;

/// Signed amounts per account, in minor currency units.
///
/// Keys are unique. Storage is ordered by account so that equality, ordering
/// and the encoded form are independent of insertion order. Positive
/// amounts are debits, negative amounts credits.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Entries(BTreeMap<Account, i64>);

impl Entries {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Set the amount for an account, returning the previous one.
    pub fn insert(&mut self, account: Account, amount: i64) -> Option<i64> {
        self.0.insert(account, amount)
    }

    pub fn get(&self, account: Account) -> Option<i64> {
        self.0.get(&account).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Account, i64)> + '_ {
        self.0.iter().map(|(account, amount)| (*account, *amount))
    }

    pub fn accounts(&self) -> impl Iterator<Item = Account> + '_ {
        self.0.keys().copied()
    }

    /// Sum of all amounts, widened so it cannot overflow.
    pub fn balance(&self) -> i128 {
        self.0.values().map(|v| i128::from(*v)).sum()
    }

    /// Double-entry invariant: amounts sum to zero.
    pub fn is_balanced(&self) -> bool {
        self.balance() == 0
    }

    /// Returns `true` if any of `accounts` has an entry.
    pub fn touches_any(&self, accounts: &[Account]) -> bool {
        accounts.iter().any(|a| self.0.contains_key(a))
    }

    /// Drop every entry whose account is not in `accounts`.
    pub fn retain_accounts(&mut self, accounts: &[Account]) {
        self.0.retain(|account, _| accounts.contains(account));
    }
}

impl FromIterator<(Account, i64)> for Entries {
    fn from_iter<I: IntoIterator<Item = (Account, i64)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<const N: usize> From<[(Account, i64); N]> for Entries {
    fn from(pairs: [(Account, i64); N]) -> Self {
        pairs.into_iter().collect()
    }
}

impl fmt::Display for Entries {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (account, amount) in self.iter() {
            if !first {
                write!(f, " ")?;
            }
            write!(f, "{account}:{amount:+}")?;
            first = false;
        }
        Ok(())
    }
}

/// A single `ACCOUNT=AMOUNT` pair, as typed on a command line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EntrySpec {
    pub account: Account,
    pub amount: i64,
}

impl FromStr for EntrySpec {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (account, amount) = s
            .split_once('=')
            .or_else(|| s.split_once(':'))
            .ok_or_else(|| TypeError::InvalidEntry(s.to_string()))?;
        let account = account.parse()?;
        let amount = amount
            .trim()
            .parse::<i64>()
            .map_err(|_| TypeError::InvalidEntry(s.to_string()))?;
        Ok(Self { account, amount })
    }
}
