// src/marks.rs
//! Marks formulas.
//!
//! Every segment is scored from an annual rate: `years × rate + months × rate/12 +
//! days × rate/365`. Where the rate comes from depends on the era, the presence
//! days accumulated in the segment's category, and the employee's gender.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::bs_date::Ymd;
use crate::era::Era;
use crate::records::Gender;
use crate::reference::ReferenceLookup;

// --- Constants ---

/// Annual seniority marks.
pub const SENIORITY_RATE: Decimal = dec!(3.75);
/// Annual new-system marks while presence in the category is still short.
pub const NEW_ERA_FLAT_RATE: Decimal = dec!(1.75);
/// Neutral rate used by the per-assignment path when reference data is missing.
pub const MISSING_REFERENCE_RATE: Decimal = dec!(1);

/// Below this many presence days an old-system segment is scored with the
/// previous segment's category.
pub const OLD_ERA_MIN_PRESENT_DAYS: i64 = 90;
/// Below this many presence days a new-system segment gets the flat rate.
pub const NEW_ERA_MIN_PRESENT_DAYS: i64 = 233;

const MONTHS_PER_YEAR: Decimal = dec!(12);
const DAYS_PER_YEAR: Decimal = dec!(365);
const DAYS_PER_MONTH: Decimal = dec!(30.44);

// --- Marks ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Marks {
    pub marks_year: Decimal,
    pub year_marks: Decimal,
    pub month_marks: Decimal,
    pub days_marks: Decimal,
    pub total_marks: Decimal,
}

impl Marks {
    pub fn zero() -> Self {
        Self::default()
    }

    /// Applies an annual rate to an elapsed period.
    pub fn from_rate(rate: Decimal, elapsed: &Ymd) -> Self {
        let year_marks = Decimal::from(elapsed.years) * rate;
        let month_marks = Decimal::from(elapsed.months) * (rate / MONTHS_PER_YEAR);
        let days_marks = Decimal::from(elapsed.days) * (rate / DAYS_PER_YEAR);
        Self {
            marks_year: rate,
            year_marks,
            month_marks,
            days_marks,
            total_marks: year_marks + month_marks + days_marks,
        }
    }
}

/// Splits a day count into years/months/days with fixed 365-day years and
/// 30.44-day months. This is the convention seniority marks are calibrated on;
/// era and geographical marks use calendar-accurate [`crate::bs_date::diff_ymd`].
pub fn fixed_constant_ymd(total_days: i64) -> Ymd {
    if total_days <= 0 {
        return Ymd::default();
    }
    let years = total_days / 365;
    let remainder = Decimal::from(total_days % 365);
    let months = (remainder / DAYS_PER_MONTH).floor();
    let days = (remainder - months * DAYS_PER_MONTH).floor();
    Ymd {
        years,
        months: months.to_i64().unwrap_or(0),
        days: days.to_i64().unwrap_or(0),
    }
}

// --- Presence days ---

/// Running presence-day count along an employee's ordered segments.
///
/// Consecutive segments with the same category add up; a category change starts a
/// new streak; a break registers zero and ends the streak.
#[derive(Debug, Clone, Default)]
pub struct PresenceTracker {
    streak_category: Option<Option<String>>,
    streak_days: i64,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one segment and returns its presence days.
    pub fn observe(&mut self, category: Option<&str>, num_days: i64, is_break: bool) -> i64 {
        if is_break {
            self.streak_category = None;
            self.streak_days = 0;
            return 0;
        }
        let category = category.map(str::to_string);
        match &self.streak_category {
            Some(current) if *current == category => self.streak_days += num_days,
            _ => {
                self.streak_category = Some(category);
                self.streak_days = num_days;
            }
        }
        self.streak_days
    }
}

// --- Segment scoring ---

/// Everything the calculator needs to know about one segment.
#[derive(Debug, Clone, Copy)]
pub struct SegmentContext<'a> {
    pub is_break: bool,
    pub era: Era,
    pub present_days: i64,
    pub category: Option<&'a str>,
    /// Category of the segment immediately before this one, if any.
    pub prior_category: Option<&'a str>,
    pub gender: Option<Gender>,
    pub elapsed: Ymd,
}

/// Outcome of scoring, with the category whose rate was applied.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SegmentScore {
    pub marks: Marks,
    pub applied_category: Option<String>,
    pub carried_back: bool,
}

impl SegmentScore {
    fn zero() -> Self {
        Self::default()
    }
}

/// Scores one timeline segment.
///
/// Missing reference data scores zero here (unlike the per-assignment path).
pub async fn score_segment(ctx: &SegmentContext<'_>, lookup: &ReferenceLookup) -> SegmentScore {
    if ctx.is_break {
        return SegmentScore::zero();
    }

    match ctx.era {
        Era::Old => {
            let carried_back = ctx.present_days < OLD_ERA_MIN_PRESENT_DAYS;
            let category = if carried_back {
                ctx.prior_category
            } else {
                ctx.category
            };
            let Some(category) = category else {
                debug!(
                    "Old-system segment without usable category (present days {}), scoring 0",
                    ctx.present_days
                );
                return SegmentScore::zero();
            };
            let Some(gender) = ctx.gender else {
                debug!("Gender unknown, old-system segment scores 0");
                return SegmentScore::zero();
            };
            let rate = lookup
                .old_marks(category, gender)
                .await
                .unwrap_or(Decimal::ZERO);
            SegmentScore {
                marks: Marks::from_rate(rate, &ctx.elapsed),
                applied_category: Some(category.to_string()),
                carried_back,
            }
        }
        Era::New => {
            if ctx.present_days < NEW_ERA_MIN_PRESENT_DAYS {
                return SegmentScore {
                    marks: Marks::from_rate(NEW_ERA_FLAT_RATE, &ctx.elapsed),
                    applied_category: None,
                    carried_back: false,
                };
            }
            let Some(category) = ctx.category else {
                return SegmentScore::zero();
            };
            let rate = lookup.new_marks(category).await.unwrap_or(Decimal::ZERO);
            SegmentScore {
                marks: Marks::from_rate(rate, &ctx.elapsed),
                applied_category: Some(category.to_string()),
                carried_back: false,
            }
        }
    }
}
