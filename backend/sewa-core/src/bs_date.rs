// src/bs_date.rs
//! Bikram Sambat calendar dates.
//!
//! `BsDate` is an immutable value type. Validity is a lookup into the month-length
//! table in [`crate::bs_calendar`]; ordering is lexicographic over (year, month, day).
//! Nothing in here panics on bad input: parsing returns `Result`, arithmetic that
//! leaves the supported range returns `None`.

use chrono::{Datelike, Days, Local, NaiveDate};
use once_cell::sync::Lazy;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::{fmt, str::FromStr};
use thiserror::Error;

use crate::bs_calendar::{ad_anchor, days_in_month, days_in_year, BS_MAX_YEAR, BS_MIN_YEAR};

// --- Errors ---

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BsDateError {
    #[error("expected YYYY/MM/DD or YYYY-MM-DD, got '{0}'")]
    WrongPartCount(String),
    #[error("non-numeric date component in '{0}'")]
    NonNumeric(String),
    #[error("{year}-{month}-{day} is not a day of the BS calendar")]
    OutOfRange { year: i32, month: u32, day: u32 },
}

// --- Value Type ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BsDate {
    year: i32,
    month: u32,
    day: u32,
}

/// Elapsed whole years, months and remaining days between two dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Ymd {
    pub years: i64,
    pub months: i64,
    pub days: i64,
}

// Day offset (from BS 1970-01-01) of the first day of every table year, plus one
// trailing entry for the day after the table ends.
static YEAR_START_OFFSETS: Lazy<Vec<i64>> = Lazy::new(|| {
    let mut offsets = Vec::with_capacity((BS_MAX_YEAR - BS_MIN_YEAR + 2) as usize);
    let mut acc = 0i64;
    for year in BS_MIN_YEAR..=BS_MAX_YEAR {
        offsets.push(acc);
        acc += days_in_year(year).unwrap_or(0) as i64;
    }
    offsets.push(acc);
    offsets
});

impl BsDate {
    /// Builds a date, returning `None` when the day does not exist in the calendar.
    pub fn new(year: i32, month: u32, day: u32) -> Option<Self> {
        let max_day = days_in_month(year, month)?;
        if day == 0 || day > max_day {
            return None;
        }
        Some(Self { year, month, day })
    }

    /// For compile-time constants; the caller guarantees the day exists.
    pub(crate) const fn from_ymd_unchecked(year: i32, month: u32, day: u32) -> Self {
        Self { year, month, day }
    }

    /// Parses `YYYY/MM/DD` or `YYYY-MM-DD`. Surrounding whitespace is ignored.
    pub fn parse(s: &str) -> Result<Self, BsDateError> {
        let trimmed = s.trim();
        let parts: Vec<&str> = trimmed.split(['/', '-']).collect();
        if parts.len() != 3 {
            return Err(BsDateError::WrongPartCount(s.to_string()));
        }
        let numeric = |p: &str| -> Result<u32, BsDateError> {
            let p = p.trim();
            if p.is_empty() || !p.chars().all(|c| c.is_ascii_digit()) {
                return Err(BsDateError::NonNumeric(s.to_string()));
            }
            p.parse::<u32>()
                .map_err(|_| BsDateError::NonNumeric(s.to_string()))
        };
        let year = numeric(parts[0])? as i32;
        let month = numeric(parts[1])?;
        let day = numeric(parts[2])?;
        Self::new(year, month, day).ok_or(BsDateError::OutOfRange { year, month, day })
    }

    pub fn is_valid(s: &str) -> bool {
        Self::parse(s).is_ok()
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn day(&self) -> u32 {
        self.day
    }

    /// Canonical `YYYY-MM-DD` rendering.
    pub fn format(&self) -> String {
        self.to_string()
    }

    /// Days elapsed since BS 1970-01-01.
    fn ordinal(&self) -> i64 {
        let year_start = YEAR_START_OFFSETS[(self.year - BS_MIN_YEAR) as usize];
        let month_start: i64 = (1..self.month)
            .map(|m| days_in_month(self.year, m).unwrap_or(0) as i64)
            .sum();
        year_start + month_start + self.day as i64 - 1
    }

    fn from_ordinal(ordinal: i64) -> Option<Self> {
        let offsets = &*YEAR_START_OFFSETS;
        let table_end = *offsets.last()?;
        if ordinal < 0 || ordinal >= table_end {
            return None;
        }
        // Index of the last year that starts at or before `ordinal`.
        let idx = offsets.partition_point(|start| *start <= ordinal) - 1;
        let year = BS_MIN_YEAR + idx as i32;
        let mut remaining = ordinal - offsets[idx];
        for month in 1..=12 {
            let len = days_in_month(year, month)? as i64;
            if remaining < len {
                return Self::new(year, month, remaining as u32 + 1);
            }
            remaining -= len;
        }
        None
    }

    /// The Gregorian date of the same day.
    pub fn to_ad(&self) -> NaiveDate {
        ad_anchor() + Days::new(self.ordinal() as u64)
    }

    /// Converts a Gregorian date, `None` outside the table's range.
    pub fn from_ad(date: NaiveDate) -> Option<Self> {
        let offset = date.signed_duration_since(ad_anchor()).num_days();
        Self::from_ordinal(offset)
    }

    /// Monotonic day number (Gregorian days from the common era); only meaningful for
    /// comparison and subtraction.
    pub fn to_gregorian_ordinal(&self) -> i64 {
        self.to_ad().num_days_from_ce() as i64
    }

    pub fn add_days(&self, days: i64) -> Option<Self> {
        Self::from_ordinal(self.ordinal() + days)
    }

    pub fn day_after(&self) -> Option<Self> {
        self.add_days(1)
    }

    pub fn day_before(&self) -> Option<Self> {
        self.add_days(-1)
    }

    /// Today's date according to the local clock.
    pub fn today() -> Option<Self> {
        Self::from_ad(Local::now().date_naive())
    }
}

/// `b - a` in days; negative when `b` precedes `a`.
pub fn diff_days(a: &BsDate, b: &BsDate) -> i64 {
    b.ordinal() - a.ordinal()
}

/// Whole BS years and months from `a` to `b`, then leftover days.
///
/// Day underflow borrows the length of the month(s) preceding `b`'s month, so the
/// result follows real BS month lengths rather than a 30-day approximation. When
/// `b` precedes `a` every component is negated.
pub fn diff_ymd(a: &BsDate, b: &BsDate) -> Ymd {
    if b < a {
        let forward = diff_ymd(b, a);
        return Ymd {
            years: -forward.years,
            months: -forward.months,
            days: -forward.days,
        };
    }

    let mut years = (b.year - a.year) as i64;
    let mut months = b.month as i64 - a.month as i64;
    let mut days = b.day as i64 - a.day as i64;

    let (mut borrow_year, mut borrow_month) = (b.year, b.month);
    while days < 0 {
        if borrow_month == 1 {
            borrow_year -= 1;
            borrow_month = 12;
        } else {
            borrow_month -= 1;
        }
        months -= 1;
        days += days_in_month(borrow_year, borrow_month).unwrap_or(30) as i64;
    }

    while months < 0 {
        years -= 1;
        months += 12;
    }

    Ymd { years, months, days }
}

// --- Trait impls ---

impl fmt::Display for BsDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}-{:02}", self.year, self.month, self.day)
    }
}

impl FromStr for BsDate {
    type Err = BsDateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for BsDate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for BsDate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(de::Error::custom)
    }
}
