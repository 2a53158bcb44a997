use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TypeError;

const MICROS_PER_DAY: u64 = 86_400_000_000;

fn epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default()
}

/// Calendar day, counted in whole days since 1970-01-01.
///
/// Used for range filtering independent of time of day.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Date(u32);

impl Date {
    pub const fn from_days(days: u32) -> Self {
        Self(days)
    }

    pub const fn days(&self) -> u32 {
        self.0
    }

    /// Convert a calendar date. Dates before the epoch are rejected.
    pub fn from_naive(date: NaiveDate) -> Result<Self, TypeError> {
        let days = date.signed_duration_since(epoch()).num_days();
        u32::try_from(days)
            .map(Self)
            .map_err(|_| TypeError::InvalidDate(format!("{date} is outside the supported range")))
    }

    pub fn to_naive(&self) -> Option<NaiveDate> {
        epoch().checked_add_days(Days::new(u64::from(self.0)))
    }
}

impl fmt::Display for Date {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_naive() {
            Some(date) => write!(f, "{}", date.format("%Y-%m-%d")),
            None => write!(f, "day {}", self.0),
        }
    }
}

impl FromStr for Date {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let date = NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
            .map_err(|e| TypeError::InvalidDate(format!("{s:?}: {e}")))?;
        Self::from_naive(date)
    }
}

/// Point in time with microsecond resolution, counted from the Unix epoch.
///
/// Orders transactions within a day.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Moment(u64);

impl Moment {
    pub const fn from_micros(micros: u64) -> Self {
        Self(micros)
    }

    pub const fn micros(&self) -> u64 {
        self.0
    }

    /// The current wall-clock moment.
    pub fn now() -> Self {
        let micros = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_micros() as u64;
        Self(micros)
    }

    pub fn from_datetime(at: DateTime<Utc>) -> Result<Self, TypeError> {
        u64::try_from(at.timestamp_micros())
            .map(Self)
            .map_err(|_| TypeError::InvalidDate(format!("{at} is before the epoch")))
    }

    /// The calendar day this moment falls on (UTC).
    pub fn date(&self) -> Date {
        Date((self.0 / MICROS_PER_DAY) as u32)
    }
}

impl fmt::Display for Moment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Half-open interval `[start, end)` over an ordered time type.
///
/// `start == end` is a valid, empty range. Adjacent ranges such as
/// `[a, b)` and `[b, c)` never overlap.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TimeRange<T> {
    pub start: T,
    pub end: T,
}

pub type DateRange = TimeRange<Date>;
pub type MomentRange = TimeRange<Moment>;

impl<T: Ord + Copy + fmt::Display> TimeRange<T> {
    /// Build a range, rejecting `start > end`.
    pub fn new(start: T, end: T) -> Result<Self, TypeError> {
        let range = Self { start, end };
        range.validate()?;
        Ok(range)
    }

    pub fn validate(&self) -> Result<(), TypeError> {
        if self.start > self.end {
            return Err(TypeError::InvalidRange {
                start: self.start.to_string(),
                end: self.end.to_string(),
            });
        }
        Ok(())
    }

    pub fn contains(&self, value: T) -> bool {
        self.start <= value && value < self.end
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}

impl<T: fmt::Display> fmt::Display for TimeRange<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}
