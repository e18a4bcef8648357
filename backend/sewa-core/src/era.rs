// src/era.rs
//! Old/new scoring-era split around the policy cutoff date.

use serde::{Deserialize, Serialize};

use crate::bs_date::{diff_days, BsDate};

/// Last day scored under the old system (BS 2079 Asar 32).
pub const DEFAULT_ERA_CUTOFF: BsDate = BsDate::from_ymd_unchecked(2079, 3, 32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Era {
    Old,
    New,
}

/// Inclusive date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BsRange {
    pub start: BsDate,
    pub end: BsDate,
}

impl BsRange {
    pub fn new(start: BsDate, end: BsDate) -> Self {
        Self { start, end }
    }

    /// Day count including both ends.
    pub fn num_days(&self) -> i64 {
        diff_days(&self.start, &self.end) + 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EraSplit {
    pub old_part: Option<BsRange>,
    pub new_part: Option<BsRange>,
    pub entirely_old: bool,
    pub entirely_new: bool,
}

impl EraSplit {
    /// The non-empty sides in chronological order.
    pub fn parts(&self) -> Vec<(Era, BsRange)> {
        let mut out = Vec::with_capacity(2);
        if let Some(old) = self.old_part {
            out.push((Era::Old, old));
        }
        if let Some(new) = self.new_part {
            out.push((Era::New, new));
        }
        out
    }

    pub fn num_days_old(&self) -> i64 {
        self.old_part.map(|r| r.num_days()).unwrap_or(0)
    }

    pub fn num_days_new(&self) -> i64 {
        self.new_part.map(|r| r.num_days()).unwrap_or(0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EraSplitter {
    cutoff: BsDate,
}

impl Default for EraSplitter {
    fn default() -> Self {
        Self {
            cutoff: DEFAULT_ERA_CUTOFF,
        }
    }
}

impl EraSplitter {
    pub fn new(cutoff: BsDate) -> Self {
        Self { cutoff }
    }

    pub fn cutoff(&self) -> BsDate {
        self.cutoff
    }

    pub fn era_of(&self, date: &BsDate) -> Era {
        if *date <= self.cutoff {
            Era::Old
        } else {
            Era::New
        }
    }

    /// Splits an inclusive range at the cutoff.
    ///
    /// The cutoff day itself belongs to the old side; the new side starts the
    /// following day. A range ending on or before the cutoff is entirely old; one
    /// starting on or after it is entirely new.
    pub fn split(&self, range: BsRange) -> EraSplit {
        if range.end <= self.cutoff {
            return EraSplit {
                old_part: Some(range),
                new_part: None,
                entirely_old: true,
                entirely_new: false,
            };
        }
        if range.start >= self.cutoff {
            return EraSplit {
                old_part: None,
                new_part: Some(range),
                entirely_old: false,
                entirely_new: true,
            };
        }
        match self.cutoff.day_after() {
            Some(first_new_day) => EraSplit {
                old_part: Some(BsRange::new(range.start, self.cutoff)),
                new_part: Some(BsRange::new(first_new_day, range.end)),
                entirely_old: false,
                entirely_new: false,
            },
            // Cutoff on the last day of the table: nothing can be after it.
            None => EraSplit {
                old_part: Some(range),
                new_part: None,
                entirely_old: true,
                entirely_new: false,
            },
        }
    }
}
