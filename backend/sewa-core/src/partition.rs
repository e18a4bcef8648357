// src/partition.rs
//! Splits a service interval around absence / non-standard-leave intervals.
//!
//! Date strings are inclusive on both ends. Internally every interval becomes a
//! half-open day range `[start, end + 1)` so that touching intervals never produce
//! empty pieces and the emitted parts tile the base exactly.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::bs_date::BsDate;

/// An inclusive BS interval as it comes from records; dates may be malformed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Interval {
    pub start: String,
    pub end: String,
    pub remark: Option<String>,
}

impl Interval {
    pub fn new(start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
            remark: None,
        }
    }

    pub fn with_remark(mut self, remark: impl Into<String>) -> Self {
        self.remark = Some(remark.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartKind {
    Normal,
    Break,
}

/// One piece of a partitioned interval (inclusive dates).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    pub start: String,
    pub end: String,
    pub kind: PartKind,
    pub remark: Option<String>,
}

impl Part {
    pub fn is_break(&self) -> bool {
        self.kind == PartKind::Break
    }
}

// Half-open range of Gregorian day numbers.
#[derive(Debug, Clone, Copy)]
struct DayRange {
    start: i64,
    end: i64,
}

fn to_day_range(start: &str, end: &str) -> Option<DayRange> {
    let start = BsDate::parse(start).ok()?;
    let end = BsDate::parse(end).ok()?;
    Some(DayRange {
        start: start.to_gregorian_ordinal(),
        end: end.to_gregorian_ordinal() + 1,
    })
}

fn day_to_string(day: i64) -> Option<String> {
    let ad = NaiveDate::from_num_days_from_ce_opt(i32::try_from(day).ok()?)?;
    BsDate::from_ad(ad).map(|d| d.format())
}

fn make_part(range: DayRange, kind: PartKind, remark: Option<String>) -> Option<Part> {
    Some(Part {
        start: day_to_string(range.start)?,
        end: day_to_string(range.end - 1)?,
        kind,
        remark,
    })
}

fn unsplit(base: &Interval) -> Vec<Part> {
    vec![Part {
        start: base.start.clone(),
        end: base.end.clone(),
        kind: PartKind::Normal,
        remark: None,
    }]
}

/// Partitions `base` into contiguous normal / break parts.
///
/// Breaks are clipped to the base and applied in (start, end) order; a break that
/// lies entirely behind the cursor is skipped. Any unparseable date, in the base
/// or in a break, returns the base as one unsplit normal part.
pub fn partition(base: &Interval, breaks: &[Interval]) -> Vec<Part> {
    let Some(base_range) = to_day_range(&base.start, &base.end) else {
        warn!(
            "Cannot partition interval {}..{}: invalid BS date",
            base.start, base.end
        );
        return unsplit(base);
    };
    if base_range.end <= base_range.start {
        return unsplit(base);
    }

    let mut clipped: Vec<(DayRange, Option<String>)> = Vec::with_capacity(breaks.len());
    for b in breaks {
        let Some(range) = to_day_range(&b.start, &b.end) else {
            warn!(
                "Break {}..{} has an invalid BS date; leaving {}..{} unsplit",
                b.start, b.end, base.start, base.end
            );
            return unsplit(base);
        };
        let start = range.start.max(base_range.start);
        let end = range.end.min(base_range.end);
        if start < end {
            clipped.push((DayRange { start, end }, b.remark.clone()));
        }
    }
    clipped.sort_by_key(|(r, _)| (r.start, r.end));

    let mut parts = Vec::new();
    let mut cursor = base_range.start;
    for (range, remark) in clipped {
        if range.end <= cursor {
            continue;
        }
        if range.start > cursor {
            parts.extend(make_part(
                DayRange { start: cursor, end: range.start },
                PartKind::Normal,
                None,
            ));
        }
        let start = cursor.max(range.start);
        parts.extend(make_part(
            DayRange { start, end: range.end },
            PartKind::Break,
            remark,
        ));
        cursor = range.end;
    }
    if cursor < base_range.end {
        parts.extend(make_part(
            DayRange { start: cursor, end: base_range.end },
            PartKind::Normal,
            None,
        ));
    }

    if parts.is_empty() {
        return unsplit(base);
    }
    debug!(
        "Partitioned {}..{} into {} part(s)",
        base.start,
        base.end,
        parts.len()
    );
    parts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bs_date::diff_days;

    fn bs(s: &str) -> BsDate {
        BsDate::parse(s).unwrap()
    }

    fn spans(parts: &[Part]) -> Vec<(&str, &str, PartKind)> {
        parts
            .iter()
            .map(|p| (p.start.as_str(), p.end.as_str(), p.kind))
            .collect()
    }

    // Parts must tile the base: first starts at base start, each starts the day
    // after the previous ends, the last ends at base end.
    fn assert_tiles(base: &Interval, parts: &[Part]) {
        assert_eq!(bs(&parts[0].start), bs(&base.start));
        assert_eq!(bs(&parts.last().unwrap().end), bs(&base.end));
        for pair in parts.windows(2) {
            assert_eq!(bs(&pair[0].end).day_after(), Some(bs(&pair[1].start)));
        }
        let total: i64 = parts
            .iter()
            .map(|p| diff_days(&bs(&p.start), &bs(&p.end)) + 1)
            .sum();
        assert_eq!(total, diff_days(&bs(&base.start), &bs(&base.end)) + 1);
    }

    #[test]
    fn no_breaks_returns_base() {
        let base = Interval::new("2078-01-01", "2078-12-30");
        let parts = partition(&base, &[]);
        assert_eq!(
            spans(&parts),
            vec![("2078-01-01", "2078-12-30", PartKind::Normal)]
        );
    }

    #[test]
    fn break_in_the_middle_splits_three_ways() {
        let base = Interval::new("2078-01-01", "2078-12-30");
        let breaks = [Interval::new("2078-05-10", "2078-05-20").with_remark("Absent")];
        let parts = partition(&base, &breaks);
        assert_eq!(
            spans(&parts),
            vec![
                ("2078-01-01", "2078-05-09", PartKind::Normal),
                ("2078-05-10", "2078-05-20", PartKind::Break),
                ("2078-05-21", "2078-12-30", PartKind::Normal),
            ]
        );
        assert_eq!(parts[1].remark.as_deref(), Some("Absent"));
        assert_tiles(&base, &parts);
    }

    #[test]
    fn breaks_are_clipped_to_the_base() {
        let base = Interval::new("2078-01-01", "2078-01-31");
        let breaks = [
            Interval::new("2077-12-01", "2078-01-05"),
            Interval::new("2078-01-25", "2078-03-01"),
            Interval::new("2079-01-01", "2079-01-05"),
        ];
        let parts = partition(&base, &breaks);
        assert_eq!(
            spans(&parts),
            vec![
                ("2078-01-01", "2078-01-05", PartKind::Break),
                ("2078-01-06", "2078-01-24", PartKind::Normal),
                ("2078-01-25", "2078-01-31", PartKind::Break),
            ]
        );
        assert_tiles(&base, &parts);
    }

    #[test]
    fn overlapping_and_unsorted_breaks() {
        let base = Interval::new("2078-02-01", "2078-02-31");
        let breaks = [
            Interval::new("2078-02-12", "2078-02-14"),
            Interval::new("2078-02-10", "2078-02-15"),
            Interval::new("2078-02-11", "2078-02-12"),
        ];
        let parts = partition(&base, &breaks);
        assert_eq!(
            spans(&parts),
            vec![
                ("2078-02-01", "2078-02-09", PartKind::Normal),
                ("2078-02-10", "2078-02-15", PartKind::Break),
                ("2078-02-16", "2078-02-31", PartKind::Normal),
            ]
        );
        assert_tiles(&base, &parts);
    }

    #[test]
    fn adjacent_breaks_leave_no_empty_parts() {
        let base = Interval::new("2078-01-01", "2078-01-10");
        let breaks = [
            Interval::new("2078-01-01", "2078-01-03"),
            Interval::new("2078-01-04", "2078-01-10"),
        ];
        let parts = partition(&base, &breaks);
        assert_eq!(
            spans(&parts),
            vec![
                ("2078-01-01", "2078-01-03", PartKind::Break),
                ("2078-01-04", "2078-01-10", PartKind::Break),
            ]
        );
        assert_tiles(&base, &parts);
    }

    #[test]
    fn invalid_dates_short_circuit() {
        let base = Interval::new("2078-01-01", "2078-01-10");
        let breaks = [
            Interval::new("2078-01-02", "2078-01-03"),
            Interval::new("2078-01-05", "not a date"),
        ];
        assert_eq!(
            spans(&partition(&base, &breaks)),
            vec![("2078-01-01", "2078-01-10", PartKind::Normal)]
        );

        let bad_base = Interval::new("2078/13/01", "2078-01-10");
        let parts = partition(&bad_base, &breaks[..1]);
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].start, "2078/13/01");
    }
}
