use std::fmt;

use serde::{Deserialize, Serialize};

use crate::entries::Entries;
use crate::temporal::{Date, Moment};

/// An immutable double-entry bookkeeping transaction.
///
/// Transactions are never edited in place once stored; a correction is a
/// new transaction. Ordering is structural: moment, then date, then
/// entries.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Transaction {
    pub moment: Moment,
    pub date: Date,
    pub entries: Entries,
}

impl Transaction {
    pub fn new(moment: Moment, date: Date, entries: Entries) -> Self {
        Self {
            moment,
            date,
            entries,
        }
    }

    /// Returns `true` when the entries sum to zero.
    pub fn is_balanced(&self) -> bool {
        self.entries.is_balanced()
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @{} {}", self.date, self.moment, self.entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::Account;

    #[test]
    fn display_format() {
        let tx = Transaction::new(
            Moment::from_micros(100),
            Date::from_days(0),
            Entries::from([(Account::new(1), 500), (Account::new(2), -500)]),
        );
        assert_eq!(tx.to_string(), "1970-01-01 @100 1:+500 2:-500");
        assert!(tx.is_balanced());
    }

    #[test]
    fn ordering_is_by_moment_first() {
        let early = Transaction::new(Moment::from_micros(1), Date::from_days(9), Entries::new());
        let late = Transaction::new(Moment::from_micros(2), Date::from_days(0), Entries::new());
        assert!(early < late);
    }

    #[test]
    fn serde_roundtrip() {
        let tx = Transaction::new(
            Moment::from_micros(42),
            Date::from_days(3),
            Entries::from([(Account::new(10), -7), (Account::new(11), 7)]),
        );
        let json = serde_json::to_string(&tx).unwrap();
        let parsed: Transaction = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, tx);
    }
}
