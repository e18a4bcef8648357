// src/geographic.rs
//! Per-assignment geographical marks.
//!
//! The older scoring path, whose results are stored back onto assignment rows:
//! each assignment is split at the era cutoff and both sides are scored as a whole,
//! without absence/leave partitioning. Missing reference data is worth the neutral
//! rate of 1 here, not 0.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::bs_date::BsDate;
use crate::era::{BsRange, EraSplitter};
use crate::marks::{
    Marks, MISSING_REFERENCE_RATE, NEW_ERA_FLAT_RATE, NEW_ERA_MIN_PRESENT_DAYS,
    OLD_ERA_MIN_PRESENT_DAYS,
};
use crate::records::{chronological, effective_end_dates, Assignment, Gender};
use crate::reference::ReferenceLookup;
use crate::timeline::{inclusive_elapsed, TimelineError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentMarks {
    pub employee_id: String,
    pub start_date: String,
    pub end_date: String,
    pub work_office: String,
    pub level: i32,
    pub synthetic: bool,
    pub num_days_old: i64,
    pub num_days_new: i64,
    pub total_num_days: i64,
    pub old_marks: Decimal,
    pub new_marks: Decimal,
    pub total_geographical_marks: Decimal,
}

impl AssignmentMarks {
    fn empty(assignment: &Assignment, end: &str) -> Self {
        Self {
            employee_id: assignment.employee_id.clone(),
            start_date: assignment.start_date.clone(),
            end_date: end.to_string(),
            work_office: assignment.work_office.clone(),
            level: assignment.level,
            synthetic: assignment.synthetic,
            num_days_old: 0,
            num_days_new: 0,
            total_num_days: 0,
            old_marks: Decimal::ZERO,
            new_marks: Decimal::ZERO,
            total_geographical_marks: Decimal::ZERO,
        }
    }
}

async fn old_rate(
    lookup: &ReferenceLookup,
    office: &str,
    gender: Option<Gender>,
) -> Decimal {
    let Some(gender) = gender else {
        return MISSING_REFERENCE_RATE;
    };
    let Some(category) = lookup.category_for_office(office).await else {
        return MISSING_REFERENCE_RATE;
    };
    lookup
        .old_marks(&category, gender)
        .await
        .unwrap_or(MISSING_REFERENCE_RATE)
}

async fn new_rate(lookup: &ReferenceLookup, office: &str) -> Decimal {
    let Some(category) = lookup.category_for_office(office).await else {
        return MISSING_REFERENCE_RATE;
    };
    lookup
        .new_marks(&category)
        .await
        .unwrap_or(MISSING_REFERENCE_RATE)
}

/// Scores one assignment over `[start_date, end]`.
///
/// `previous` is the assignment held before this one; a short old-system stay is
/// scored with its work office instead.
pub async fn assignment_geographical_marks(
    assignment: &Assignment,
    end: &str,
    previous: Option<&Assignment>,
    gender: Option<Gender>,
    splitter: &EraSplitter,
    lookup: &ReferenceLookup,
) -> Result<AssignmentMarks, TimelineError> {
    let (start_date, end_date) = match (BsDate::parse(&assignment.start_date), BsDate::parse(end)) {
        (Ok(s), Ok(e)) => (s, e),
        _ => {
            warn!(
                "Assignment of {} at '{}' has unusable dates {}..{}; scoring 0",
                assignment.employee_id, assignment.work_office, assignment.start_date, end
            );
            return Ok(AssignmentMarks::empty(assignment, end));
        }
    };
    if end_date < start_date && assignment.has_open_end() {
        warn!(
            "Assignment of {} at '{}' starting {} is overlapped by the next row; scoring 0",
            assignment.employee_id, assignment.work_office, assignment.start_date
        );
        return Ok(AssignmentMarks::empty(assignment, end));
    }
    if end_date < start_date {
        return Err(TimelineError::InvalidChronology {
            what: format!(
                "assignment of {} at '{}'",
                assignment.employee_id, assignment.work_office
            ),
            start: start_date.format(),
            end: end_date.format(),
        });
    }

    let whole = BsRange::new(start_date, end_date);
    let split = splitter.split(whole);
    let num_days_old = split.num_days_old();
    let num_days_new = split.num_days_new();

    let mut old_marks = Decimal::ZERO;
    if let Some(old) = split.old_part {
        let office = match previous {
            Some(prev) if num_days_old < OLD_ERA_MIN_PRESENT_DAYS => {
                debug!(
                    "{} old-system days at '{}', scoring with previous office '{}'",
                    num_days_old, assignment.work_office, prev.work_office
                );
                prev.work_office.as_str()
            }
            _ => assignment.work_office.as_str(),
        };
        let rate = old_rate(lookup, office, gender).await;
        old_marks = Marks::from_rate(rate, &inclusive_elapsed(&old.start, &old.end)).total_marks;
    }

    let mut new_marks = Decimal::ZERO;
    if let Some(new) = split.new_part {
        let rate = if num_days_new < NEW_ERA_MIN_PRESENT_DAYS {
            NEW_ERA_FLAT_RATE
        } else {
            new_rate(lookup, &assignment.work_office).await
        };
        new_marks = Marks::from_rate(rate, &inclusive_elapsed(&new.start, &new.end)).total_marks;
    }

    Ok(AssignmentMarks {
        employee_id: assignment.employee_id.clone(),
        start_date: start_date.format(),
        end_date: end_date.format(),
        work_office: assignment.work_office.clone(),
        level: assignment.level,
        synthetic: assignment.synthetic,
        num_days_old,
        num_days_new,
        total_num_days: whole.num_days(),
        old_marks,
        new_marks,
        total_geographical_marks: old_marks + new_marks,
    })
}

/// Scores every assignment of one employee, oldest first.
pub async fn employee_assignment_marks(
    employee_id: &str,
    assignments: &[Assignment],
    gender: Option<Gender>,
    today: BsDate,
    splitter: &EraSplitter,
    lookup: &ReferenceLookup,
) -> Result<Vec<AssignmentMarks>, TimelineError> {
    let own: Vec<Assignment> = assignments
        .iter()
        .filter(|a| a.employee_id.trim() == employee_id.trim())
        .cloned()
        .collect();
    let ordered = chronological(&own);
    let ends = effective_end_dates(&ordered, today);

    let mut out = Vec::with_capacity(ordered.len());
    for (idx, (assignment, end)) in ordered.iter().zip(ends.iter()).enumerate() {
        let previous = idx.checked_sub(1).map(|p| ordered[p]);
        out.push(
            assignment_geographical_marks(assignment, end, previous, gender, splitter, lookup)
                .await?,
        );
    }
    let total: Decimal = out.iter().map(|m| m.total_geographical_marks).sum();
    info!(
        "Per-assignment geographical marks for {}: {} assignment(s), {} marks",
        employee_id,
        out.len(),
        total
    );
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::{CsvReferenceStore, MarksType};
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn lookup() -> ReferenceLookup {
        let store = CsvReferenceStore::new()
            .with_office("Humla Office", "Humla")
            .with_office("Kathmandu Office", "Kathmandu")
            .with_district("Humla", "A")
            .with_district("Kathmandu", "D")
            .with_category_marks("A", MarksType::Old, Some(Gender::Male), dec!(3.5))
            .with_category_marks("D", MarksType::Old, Some(Gender::Male), dec!(1.25))
            .with_category_marks("A", MarksType::New, None, dec!(3))
            .with_category_marks("D", MarksType::New, None, dec!(1));
        ReferenceLookup::new(Arc::new(store))
    }

    fn assignment(office: &str, start: &str) -> Assignment {
        Assignment {
            employee_id: "E1".to_string(),
            start_date: start.to_string(),
            work_office: office.to_string(),
            level: 5,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn spanning_assignment_days_add_up() {
        let a = assignment("Humla Office", "2078/01/01");
        let m = assignment_geographical_marks(
            &a,
            "2080/01/01",
            None,
            Some(Gender::Male),
            &EraSplitter::default(),
            &lookup(),
        )
        .await
        .unwrap();
        assert!(m.num_days_old > 0 && m.num_days_new > 0);
        assert_eq!(m.num_days_old + m.num_days_new, m.total_num_days);
        assert_eq!(m.total_geographical_marks, m.old_marks + m.new_marks);
    }

    #[tokio::test]
    async fn one_old_year_uses_the_category_rate() {
        // 2077-04-01 .. 2078-03-31 is one calendar year, all before the cutoff.
        let a = assignment("Humla Office", "2077-04-01");
        let end = BsDate::parse("2078-04-01").unwrap().day_before().unwrap().format();
        let m = assignment_geographical_marks(
            &a,
            &end,
            None,
            Some(Gender::Male),
            &EraSplitter::default(),
            &lookup(),
        )
        .await
        .unwrap();
        assert_eq!(m.num_days_new, 0);
        assert_eq!(m.old_marks, dec!(3.5));
    }

    #[tokio::test]
    async fn short_old_stay_uses_previous_office() {
        let prev = assignment("Kathmandu Office", "2070-01-01");
        // 2079-03-01 .. 2079-03-32: 32 days, entirely old.
        let a = assignment("Humla Office", "2079-03-01");
        let m = assignment_geographical_marks(
            &a,
            "2079-03-32",
            Some(&prev),
            Some(Gender::Male),
            &EraSplitter::default(),
            &lookup(),
        )
        .await
        .unwrap();
        assert_eq!(m.num_days_old, 32);
        assert_eq!(m.old_marks, dec!(1.25) / dec!(12) * dec!(1));
    }

    #[tokio::test]
    async fn short_new_stay_uses_flat_rate_and_missing_data_is_neutral() {
        let a = assignment("Unknown Office", "2080-01-01");
        let m = assignment_geographical_marks(
            &a,
            "2080-01-31",
            None,
            Some(Gender::Male),
            &EraSplitter::default(),
            &lookup(),
        )
        .await
        .unwrap();
        assert_eq!(m.num_days_old, 0);
        assert_eq!(m.new_marks, NEW_ERA_FLAT_RATE / dec!(12));

        let old = assignment("Unknown Office", "2075-01-01");
        let m = assignment_geographical_marks(
            &old,
            &BsDate::parse("2076-01-01").unwrap().day_before().unwrap().format(),
            None,
            None,
            &EraSplitter::default(),
            &lookup(),
        )
        .await
        .unwrap();
        assert_eq!(m.old_marks, MISSING_REFERENCE_RATE);
    }

    #[tokio::test]
    async fn end_before_start_is_rejected_and_bad_dates_score_zero() {
        let a = Assignment {
            end_date: Some("2079-04-01".to_string()),
            ..assignment("Humla Office", "2079-05-01")
        };
        let err = assignment_geographical_marks(
            &a,
            "2079-04-01",
            None,
            Some(Gender::Male),
            &EraSplitter::default(),
            &lookup(),
        )
        .await;
        assert!(err.is_err());

        let bad = assignment("Humla Office", "2079-15-01");
        let m = assignment_geographical_marks(
            &bad,
            "2080-01-01",
            None,
            Some(Gender::Male),
            &EraSplitter::default(),
            &lookup(),
        )
        .await
        .unwrap();
        assert_eq!(m.total_geographical_marks, Decimal::ZERO);
    }

    #[tokio::test]
    async fn open_row_overlapped_by_a_same_day_row_scores_zero() {
        let rows = vec![
            assignment("Humla Office", "2078-01-01"),
            Assignment {
                end_date: Some("2079-01-01".to_string()),
                ..assignment("Kathmandu Office", "2078-01-01")
            },
        ];
        let today = BsDate::parse("2080-01-01").unwrap();
        let marks = employee_assignment_marks(
            "E1",
            &rows,
            Some(Gender::Male),
            today,
            &EraSplitter::default(),
            &lookup(),
        )
        .await
        .unwrap();
        assert_eq!(marks.len(), 2);
        assert_eq!(marks[0].work_office, "Humla Office");
        assert_eq!(marks[0].end_date, "2077-12-31");
        assert_eq!(marks[0].total_geographical_marks, Decimal::ZERO);
        assert!(marks[1].total_geographical_marks > Decimal::ZERO);
    }
}
