// src/seniority.rs
//! Whole-career seniority timeline.
//!
//! `[seniority date, evaluation end]` is carved around absences and non-standard
//! leaves; every normal piece earns the fixed seniority rate. No era split applies.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::bs_date::{diff_days, BsDate};
use crate::marks::{fixed_constant_ymd, Marks, SENIORITY_RATE};
use crate::partition::{partition, Interval};
use crate::records::{break_intervals, AbsentDetail, LeaveDetail};
use crate::timeline::TimelineError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SenioritySegment {
    pub start_date: String,
    pub end_date: String,
    pub years: i64,
    pub months: i64,
    pub days: i64,
    pub total_num_days: i64,
    pub is_break: bool,
    #[serde(flatten)]
    pub marks: Marks,
    pub remarks: Option<String>,
}

impl SenioritySegment {
    fn unscored(start: &str, end: &str, remark: &str) -> Self {
        Self {
            start_date: start.to_string(),
            end_date: end.to_string(),
            years: 0,
            months: 0,
            days: 0,
            total_num_days: 0,
            is_break: false,
            marks: Marks::zero(),
            remarks: Some(remark.to_string()),
        }
    }
}

/// Builds the seniority timeline.
///
/// Unusable dates yield one zero-mark segment; a seniority date after the
/// evaluation end is an error.
pub fn build_seniority_timeline(
    seniority_date: &str,
    evaluation_end: &str,
    absences: &[AbsentDetail],
    leaves: &[LeaveDetail],
) -> Result<Vec<SenioritySegment>, TimelineError> {
    let (start, end) = match (BsDate::parse(seniority_date), BsDate::parse(evaluation_end)) {
        (Ok(s), Ok(e)) => (s, e),
        (Err(e), _) | (_, Err(e)) => {
            warn!(
                "Seniority period {}..{} is unusable ({}); scoring 0",
                seniority_date, evaluation_end, e
            );
            return Ok(vec![SenioritySegment::unscored(
                seniority_date,
                evaluation_end,
                "Invalid date",
            )]);
        }
    };
    if start > end {
        return Err(TimelineError::InvalidChronology {
            what: "seniority date".to_string(),
            start: start.format(),
            end: end.format(),
        });
    }

    let base = Interval::new(start.format(), end.format());
    let breaks = break_intervals(absences, leaves);
    let segments: Vec<SenioritySegment> = partition(&base, &breaks)
        .into_iter()
        .map(|part| {
            let num_days = match (BsDate::parse(&part.start), BsDate::parse(&part.end)) {
                (Ok(s), Ok(e)) => diff_days(&s, &e) + 1,
                _ => 0,
            };
            let elapsed = fixed_constant_ymd(num_days);
            let marks = if part.is_break() {
                Marks::zero()
            } else {
                Marks::from_rate(SENIORITY_RATE, &elapsed)
            };
            SenioritySegment {
                is_break: part.is_break(),
                start_date: part.start,
                end_date: part.end,
                years: elapsed.years,
                months: elapsed.months,
                days: elapsed.days,
                total_num_days: num_days,
                marks,
                remarks: part.remark,
            }
        })
        .collect();

    info!(
        "Seniority timeline {}..{}: {} segment(s), {} marks",
        base.start,
        base.end,
        segments.len(),
        total_seniority_marks(&segments)
    );
    Ok(segments)
}

pub fn total_seniority_marks(segments: &[SenioritySegment]) -> Decimal {
    segments.iter().map(|s| s.marks.total_marks).sum()
}
