// src/records.rs
//! Service records as they arrive from ingestion: assignments, absences, leaves.
//!
//! Dates are kept as (normalised) BS strings. A malformed date must not stop an
//! employee's timeline from being computed, so parsing happens where each value is
//! used and failures degrade there.

use serde::{Deserialize, Serialize};

use crate::bs_date::BsDate;
use crate::partition::Interval;

/// Leave type that zeroes marks like an absence, compared without case/whitespace.
pub const NON_STANDARD_LEAVE: &str = "NON STANDARD";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    /// Lenient parse: `male`/`m`/`female`/`f`, any case.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "male" | "m" => Some(Gender::Male),
            "female" | "f" => Some(Gender::Female),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    pub employee_id: String,
    pub start_date: String,
    /// `None` while the assignment is current.
    pub end_date: Option<String>,
    pub position: String,
    pub jobs: String,
    pub function: String,
    pub emp_category: String,
    pub emp_type: String,
    pub work_office: String,
    pub level: i32,
    pub seniority_date: Option<String>,
    pub perm_level_date: Option<String>,
    pub reason_for_position: Option<String>,
    /// Generated to cover time held at a level before its first recorded row.
    #[serde(default)]
    pub synthetic: bool,
}

impl Assignment {
    pub fn start(&self) -> Option<BsDate> {
        BsDate::parse(&self.start_date).ok()
    }

    pub fn has_open_end(&self) -> bool {
        self.end_date
            .as_deref()
            .map(|s| s.trim().is_empty())
            .unwrap_or(true)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AbsentDetail {
    pub employee_id: String,
    pub from_date: String,
    pub to_date: String,
    pub duration: Option<String>,
    pub remarks: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaveDetail {
    pub employee_id: String,
    pub from_date: String,
    pub to_date: String,
    pub duration: Option<String>,
    pub remarks: Option<String>,
    pub leave_type: String,
}

impl LeaveDetail {
    pub fn is_non_standard(&self) -> bool {
        let squash = |s: &str| -> String {
            s.chars()
                .filter(|c| !c.is_whitespace())
                .collect::<String>()
                .to_uppercase()
        };
        squash(&self.leave_type) == squash(NON_STANDARD_LEAVE)
    }
}

/// Basic employee fields the engine needs.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmployeeProfile {
    pub employee_id: String,
    pub gender: Option<Gender>,
    pub level: Option<i32>,
    pub seniority_date: Option<String>,
}

/// All rows of one employee.
#[derive(Debug, Clone, Default)]
pub struct EmployeeRecords {
    pub assignments: Vec<Assignment>,
    pub absences: Vec<AbsentDetail>,
    pub leaves: Vec<LeaveDetail>,
}

impl EmployeeRecords {
    /// Keeps only rows belonging to `employee_id`.
    pub fn for_employee(&self, employee_id: &str) -> EmployeeRecords {
        let matches = |id: &str| id.trim() == employee_id.trim();
        EmployeeRecords {
            assignments: self
                .assignments
                .iter()
                .filter(|a| matches(&a.employee_id))
                .cloned()
                .collect(),
            absences: self
                .absences
                .iter()
                .filter(|a| matches(&a.employee_id))
                .cloned()
                .collect(),
            leaves: self
                .leaves
                .iter()
                .filter(|l| matches(&l.employee_id))
                .cloned()
                .collect(),
        }
    }
}

/// Intervals that zero marks: every absence and every non-standard leave.
pub fn break_intervals(absences: &[AbsentDetail], leaves: &[LeaveDetail]) -> Vec<Interval> {
    let absent = absences.iter().map(|a| {
        let remark = match a.remarks.as_deref().map(str::trim) {
            Some(r) if !r.is_empty() => format!("Absent: {}", r),
            _ => "Absent".to_string(),
        };
        Interval::new(a.from_date.clone(), a.to_date.clone()).with_remark(remark)
    });
    let leave = leaves.iter().filter(|l| l.is_non_standard()).map(|l| {
        Interval::new(l.from_date.clone(), l.to_date.clone()).with_remark("Non standard leave")
    });
    absent.chain(leave).collect()
}

/// Assignments as they stood on `end`: rows starting after it are dropped and
/// recorded ends after it are cut back to it. Open ends stay open.
pub fn clipped_to(assignments: &[Assignment], end: BsDate) -> Vec<Assignment> {
    assignments
        .iter()
        .filter(|a| a.start().map_or(true, |start| start <= end))
        .map(|a| {
            let mut a = a.clone();
            let recorded = a.end_date.as_deref().and_then(|e| BsDate::parse(e).ok());
            if matches!(recorded, Some(e) if e > end) {
                a.end_date = Some(end.format());
            }
            a
        })
        .collect()
}

/// Assignments in chronological order of start date; unparseable starts go last,
/// keeping their relative order.
pub fn chronological(assignments: &[Assignment]) -> Vec<&Assignment> {
    let mut ordered: Vec<&Assignment> = assignments.iter().collect();
    ordered.sort_by_key(|a| match a.start() {
        Some(d) => (0, Some(d)),
        None => (1, None),
    });
    ordered
}

/// Effective end date string for each assignment of an ordered slice.
///
/// Recorded end dates are used as-is. An open end on the last assignment becomes
/// `today`; an open end on any earlier one becomes the day before the next
/// assignment starts (or `today` when that start is unusable).
pub fn effective_end_dates(ordered: &[&Assignment], today: BsDate) -> Vec<String> {
    ordered
        .iter()
        .enumerate()
        .map(|(idx, a)| {
            if !a.has_open_end() {
                return a.end_date.clone().unwrap_or_default();
            }
            let is_last = idx + 1 == ordered.len();
            if is_last {
                return today.format();
            }
            ordered[idx + 1]
                .start()
                .and_then(|next| next.day_before())
                .unwrap_or(today)
                .format()
        })
        .collect()
}
