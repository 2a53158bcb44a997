use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Opaque numeric identifier of a ledger account.
///
/// The chart of accounts that gives an `Account` its name, number and
/// hierarchy lives outside the ledger space; here it is only a key into a
/// transaction's [`Entries`](crate::Entries).
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Account(u16);

impl Account {
    pub const fn new(id: u16) -> Self {
        Self(id)
    }

    pub const fn id(&self) -> u16 {
        self.0
    }
}

impl From<u16> for Account {
    fn from(id: u16) -> Self {
        Self(id)
    }
}

impl fmt::Display for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Account {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u16>()
            .map(Self)
            .map_err(|e| TypeError::InvalidAccount(format!("{s:?}: {e}")))
    }
}
