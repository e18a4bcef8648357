// src/ingest.rs
//! Mapping of raw spreadsheet rows onto service records.
//!
//! The first row of a sheet is its header. Header names are compared after
//! normalisation (lower case, alphanumerics only), so "Work Office", "work_office"
//! and "WORKOFFICE" are the same column. Date cells go through
//! [`crate::excel_date::normalize`]. A row that cannot be mapped is skipped with a
//! warning; only a missing required column fails the whole sheet.

use std::collections::{HashMap, HashSet};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::bs_date::BsDate;
use crate::excel_date::{self, RawCell};
use crate::records::{AbsentDetail, Assignment, EmployeeProfile, Gender, LeaveDetail};

// --- Errors ---

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IngestError {
    #[error("{sheet} sheet is empty (no header row)")]
    NoHeader { sheet: &'static str },
    #[error("{sheet} sheet has no '{column}' column")]
    MissingColumn {
        sheet: &'static str,
        column: &'static str,
    },
}

// --- Header mapping ---

/// A known column with every header spelling it is exported under.
struct ColumnSpec {
    name: &'static str,
    aliases: &'static [&'static str],
    required: bool,
}

const fn required(name: &'static str, aliases: &'static [&'static str]) -> ColumnSpec {
    ColumnSpec {
        name,
        aliases,
        required: true,
    }
}

const fn optional(name: &'static str, aliases: &'static [&'static str]) -> ColumnSpec {
    ColumnSpec {
        name,
        aliases,
        required: false,
    }
}

const EMPLOYEE_ID: &[&str] = &["employeeid", "empid", "employeecode", "empcode", "code"];

const ASSIGNMENT_COLUMNS: &[ColumnSpec] = &[
    required("employeeId", EMPLOYEE_ID),
    required("startDate", &["startdate", "fromdate", "datefrom", "from"]),
    optional("endDate", &["enddate", "todate", "dateto", "to"]),
    optional("position", &["position", "designation"]),
    optional("jobs", &["jobs", "job"]),
    optional("function", &["function"]),
    optional("empCategory", &["empcategory", "employeecategory"]),
    optional("empType", &["emptype", "employeetype"]),
    required("workOffice", &["workoffice", "office"]),
    required("level", &["level"]),
    optional("seniorityDate", &["senioritydate"]),
    optional("permLevelDate", &["permleveldate", "permanentleveldate"]),
    optional("reasonForPosition", &["reasonforposition", "reason"]),
];

const ABSENCE_COLUMNS: &[ColumnSpec] = &[
    required("employeeId", EMPLOYEE_ID),
    required("fromDate", &["fromdate", "datefrom", "from", "startdate"]),
    required("toDate", &["todate", "dateto", "to", "enddate"]),
    optional("duration", &["duration", "days"]),
    optional("remarks", &["remarks", "remark"]),
];

const LEAVE_COLUMNS: &[ColumnSpec] = &[
    required("employeeId", EMPLOYEE_ID),
    required("fromDate", &["fromdate", "datefrom", "from", "startdate"]),
    required("toDate", &["todate", "dateto", "to", "enddate"]),
    optional("duration", &["duration", "days"]),
    optional("remarks", &["remarks", "remark"]),
    required("leaveType", &["leavetype", "type"]),
];

const EMPLOYEE_COLUMNS: &[ColumnSpec] = &[
    required("employeeId", EMPLOYEE_ID),
    optional("gender", &["gender", "sex"]),
    optional("level", &["level"]),
    optional("seniorityDate", &["senioritydate"]),
];

/// Lower case, alphanumerics only.
pub fn normalize_header(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Column name -> cell index for one sheet.
struct HeaderMap {
    columns: HashMap<&'static str, usize>,
}

impl HeaderMap {
    fn resolve(
        sheet: &'static str,
        header: &[RawCell],
        specs: &'static [ColumnSpec],
    ) -> Result<Self, IngestError> {
        let normalized: Vec<String> = header
            .iter()
            .map(|c| normalize_header(&c.as_text()))
            .collect();
        let mut columns = HashMap::new();
        for spec in specs {
            // Aliases are in preference order.
            let found = spec
                .aliases
                .iter()
                .find_map(|alias| normalized.iter().position(|h| h == alias));
            match found {
                Some(idx) => {
                    columns.insert(spec.name, idx);
                }
                None if spec.required => {
                    return Err(IngestError::MissingColumn {
                        sheet,
                        column: spec.name,
                    })
                }
                None => debug!("{} sheet has no optional '{}' column", sheet, spec.name),
            }
        }
        for (idx, h) in normalized.iter().enumerate() {
            if !h.is_empty() && !columns.values().any(|&c| c == idx) {
                debug!("{} sheet: ignoring column '{}'", sheet, h);
            }
        }
        Ok(Self { columns })
    }

    fn cell<'r>(&self, row: &'r [RawCell], column: &str) -> Option<&'r RawCell> {
        self.columns.get(column).and_then(|&idx| row.get(idx))
    }

    fn text(&self, row: &[RawCell], column: &str) -> String {
        self.cell(row, column).map(RawCell::as_text).unwrap_or_default()
    }

    fn opt_text(&self, row: &[RawCell], column: &str) -> Option<String> {
        Some(self.text(row, column)).filter(|s| !s.is_empty())
    }

    fn date(&self, row: &[RawCell], column: &str) -> String {
        self.cell(row, column)
            .map(excel_date::normalize)
            .unwrap_or_default()
    }

    fn opt_date(&self, row: &[RawCell], column: &str) -> Option<String> {
        Some(self.date(row, column)).filter(|s| !s.is_empty())
    }

    fn level(&self, row: &[RawCell], column: &str) -> Option<i32> {
        parse_level(&self.text(row, column))
    }
}

/// Whole numbers only; `"6"` and `"6.0"` are level 6, `"5.9"` and `"NaN"` are rejected.
fn parse_level(text: &str) -> Option<i32> {
    if let Ok(level) = text.parse::<i32>() {
        return Some(level);
    }
    let value = text.parse::<f64>().ok()?;
    if !value.is_finite() || value.fract() != 0.0 {
        return None;
    }
    if value < i32::MIN as f64 || value > i32::MAX as f64 {
        return None;
    }
    Some(value as i32)
}

fn split_header<'a>(
    sheet: &'static str,
    rows: &'a [Vec<RawCell>],
) -> Result<(&'a [RawCell], &'a [Vec<RawCell>]), IngestError> {
    match rows.split_first() {
        Some((header, data)) => Ok((header.as_slice(), data)),
        None => Err(IngestError::NoHeader { sheet }),
    }
}

fn is_blank(row: &[RawCell]) -> bool {
    row.iter().all(RawCell::is_empty)
}

// --- Sheets ---

pub fn parse_assignments(rows: &[Vec<RawCell>]) -> Result<Vec<Assignment>, IngestError> {
    const SHEET: &str = "assignment";
    let (header, data) = split_header(SHEET, rows)?;
    let map = HeaderMap::resolve(SHEET, header, ASSIGNMENT_COLUMNS)?;

    let mut out = Vec::new();
    for (idx, row) in data.iter().enumerate() {
        if is_blank(row) {
            continue;
        }
        let line = idx + 2;
        let employee_id = map.text(row, "employeeId");
        let start_date = map.date(row, "startDate");
        if employee_id.is_empty() || start_date.is_empty() {
            warn!("Assignment row {}: missing employee id or start date, skipped", line);
            continue;
        }
        let Some(level) = map.level(row, "level") else {
            warn!(
                "Assignment row {}: level '{}' is not a number, skipped",
                line,
                map.text(row, "level")
            );
            continue;
        };
        out.push(Assignment {
            employee_id,
            start_date,
            end_date: map.opt_date(row, "endDate"),
            position: map.text(row, "position"),
            jobs: map.text(row, "jobs"),
            function: map.text(row, "function"),
            emp_category: map.text(row, "empCategory"),
            emp_type: map.text(row, "empType"),
            work_office: map.text(row, "workOffice"),
            level,
            seniority_date: map.opt_date(row, "seniorityDate"),
            perm_level_date: map.opt_date(row, "permLevelDate"),
            reason_for_position: map.opt_text(row, "reasonForPosition"),
            synthetic: false,
        });
    }
    info!("Parsed {} assignment row(s) of {}", out.len(), data.len());
    Ok(out)
}

pub fn parse_absences(rows: &[Vec<RawCell>]) -> Result<Vec<AbsentDetail>, IngestError> {
    const SHEET: &str = "absence";
    let (header, data) = split_header(SHEET, rows)?;
    let map = HeaderMap::resolve(SHEET, header, ABSENCE_COLUMNS)?;

    let mut out = Vec::new();
    for (idx, row) in data.iter().enumerate() {
        if is_blank(row) {
            continue;
        }
        let employee_id = map.text(row, "employeeId");
        let from_date = map.date(row, "fromDate");
        let to_date = map.date(row, "toDate");
        if employee_id.is_empty() || from_date.is_empty() || to_date.is_empty() {
            warn!("Absence row {}: incomplete, skipped", idx + 2);
            continue;
        }
        out.push(AbsentDetail {
            employee_id,
            from_date,
            to_date,
            duration: map.opt_text(row, "duration"),
            remarks: map.opt_text(row, "remarks"),
        });
    }
    info!("Parsed {} absence row(s) of {}", out.len(), data.len());
    Ok(out)
}

pub fn parse_leaves(rows: &[Vec<RawCell>]) -> Result<Vec<LeaveDetail>, IngestError> {
    const SHEET: &str = "leave";
    let (header, data) = split_header(SHEET, rows)?;
    let map = HeaderMap::resolve(SHEET, header, LEAVE_COLUMNS)?;

    let mut out = Vec::new();
    for (idx, row) in data.iter().enumerate() {
        if is_blank(row) {
            continue;
        }
        let employee_id = map.text(row, "employeeId");
        let from_date = map.date(row, "fromDate");
        let to_date = map.date(row, "toDate");
        if employee_id.is_empty() || from_date.is_empty() || to_date.is_empty() {
            warn!("Leave row {}: incomplete, skipped", idx + 2);
            continue;
        }
        out.push(LeaveDetail {
            employee_id,
            from_date,
            to_date,
            duration: map.opt_text(row, "duration"),
            remarks: map.opt_text(row, "remarks"),
            leave_type: map.text(row, "leaveType"),
        });
    }
    info!("Parsed {} leave row(s) of {}", out.len(), data.len());
    Ok(out)
}

pub fn parse_employees(rows: &[Vec<RawCell>]) -> Result<Vec<EmployeeProfile>, IngestError> {
    const SHEET: &str = "employee";
    let (header, data) = split_header(SHEET, rows)?;
    let map = HeaderMap::resolve(SHEET, header, EMPLOYEE_COLUMNS)?;

    let mut out = Vec::new();
    for (idx, row) in data.iter().enumerate() {
        let employee_id = map.text(row, "employeeId");
        if employee_id.is_empty() {
            if !is_blank(row) {
                warn!("Employee row {}: no employee id, skipped", idx + 2);
            }
            continue;
        }
        let gender_text = map.text(row, "gender");
        let gender = Gender::parse(&gender_text);
        if gender.is_none() && !gender_text.is_empty() {
            warn!("Employee {}: unknown gender '{}'", employee_id, gender_text);
        }
        out.push(EmployeeProfile {
            employee_id,
            gender,
            level: map.level(row, "level"),
            seniority_date: map.opt_date(row, "seniorityDate"),
        });
    }
    Ok(out)
}

// --- Synthetic pre-level assignments ---

#[derive(Default)]
struct LevelFold {
    previous: HashMap<String, Assignment>,
    levels_seen: HashSet<(String, i32)>,
    out: Vec<Assignment>,
}

impl LevelFold {
    fn step(mut self, row: Assignment) -> Self {
        let key = (row.employee_id.trim().to_string(), row.level);
        if self.levels_seen.insert(key) {
            let template = self.previous.get(row.employee_id.trim()).unwrap_or(&row);
            if let Some(synthetic) = pre_level_assignment(&row, template) {
                debug!(
                    "Synthesised level {} assignment for {}: {}..{}",
                    synthetic.level,
                    synthetic.employee_id,
                    synthetic.start_date,
                    synthetic.end_date.as_deref().unwrap_or("")
                );
                self.out.push(synthetic);
            }
        }
        self.previous
            .insert(row.employee_id.trim().to_string(), row.clone());
        self.out.push(row);
        self
    }
}

// Covers [seniority date, day before `first` starts] when there is a gap.
fn pre_level_assignment(first: &Assignment, template: &Assignment) -> Option<Assignment> {
    let seniority = BsDate::parse(first.seniority_date.as_deref()?).ok()?;
    let start = first.start()?;
    if seniority >= start {
        return None;
    }
    let end = start.day_before()?;
    Some(Assignment {
        employee_id: first.employee_id.clone(),
        start_date: seniority.format(),
        end_date: Some(end.format()),
        position: template.position.clone(),
        jobs: template.jobs.clone(),
        function: template.function.clone(),
        emp_category: template.emp_category.clone(),
        emp_type: template.emp_type.clone(),
        work_office: template.work_office.clone(),
        level: first.level,
        seniority_date: first.seniority_date.clone(),
        perm_level_date: first.perm_level_date.clone(),
        reason_for_position: first.reason_for_position.clone(),
        synthetic: true,
    })
}

/// Inserts a synthetic assignment before the first row of each (employee, level)
/// whose seniority date precedes that row's start.
///
/// Rows are visited per employee in chronological order; the synthetic row copies
/// its office and job fields from the employee's previous row, or from the first
/// row itself when there is none.
pub fn synthesize_pre_level_assignments(rows: Vec<Assignment>) -> Vec<Assignment> {
    let mut rows = rows;
    rows.sort_by(|a, b| {
        a.employee_id
            .trim()
            .cmp(b.employee_id.trim())
            .then_with(|| match (a.start(), b.start()) {
                (Some(x), Some(y)) => x.cmp(&y),
                (Some(_), None) => std::cmp::Ordering::Less,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (None, None) => std::cmp::Ordering::Equal,
            })
    });
    let total = rows.len();
    let out = rows
        .into_iter()
        .fold(LevelFold::default(), LevelFold::step)
        .out;
    if out.len() > total {
        info!("Added {} synthetic assignment(s)", out.len() - total);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_row(cells: &[&str]) -> Vec<RawCell> {
        cells
            .iter()
            .map(|c| {
                if c.is_empty() {
                    RawCell::Empty
                } else {
                    RawCell::Text(c.to_string())
                }
            })
            .collect()
    }

    #[test]
    fn header_normalisation() {
        assert_eq!(normalize_header("Work Office"), "workoffice");
        assert_eq!(normalize_header("work_office"), "workoffice");
        assert_eq!(normalize_header(" Emp. ID "), "empid");
    }

    #[test]
    fn assignments_map_by_header_and_normalise_dates() {
        let rows = vec![
            text_row(&["Emp ID", "Level", "Work Office", "From Date", "To Date", "Remarks"]),
            vec![
                RawCell::Text("E1".into()),
                RawCell::Number(5.0),
                RawCell::Text("Humla Office".into()),
                RawCell::Date(65383.0),
                RawCell::Empty,
                RawCell::Text("ignored".into()),
            ],
            text_row(&["", "", "", "", "", ""]),
            text_row(&["E1", "five", "Humla Office", "2079/01/01", "", ""]),
            text_row(&["E1", "6", "Humla Office", "", "", ""]),
        ];
        let parsed = parse_assignments(&rows).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].start_date, "2079-01-03");
        assert_eq!(parsed[0].end_date, None);
        assert_eq!(parsed[0].level, 5);
        assert!(parsed[0].has_open_end());
    }

    #[test]
    fn levels_must_be_whole_numbers() {
        assert_eq!(parse_level("6"), Some(6));
        assert_eq!(parse_level("6.0"), Some(6));
        assert_eq!(parse_level("5.9"), None);
        assert_eq!(parse_level("NaN"), None);
        assert_eq!(parse_level("inf"), None);
        assert_eq!(parse_level("1e12"), None);

        let rows = vec![
            text_row(&["Employee Id", "Level", "Office", "Start Date"]),
            text_row(&["E1", "5.9", "Humla Office", "2079/01/01"]),
            text_row(&["E1", "NaN", "Humla Office", "2079/02/01"]),
            vec![
                RawCell::Text("E1".into()),
                RawCell::Number(7.0),
                RawCell::Text("Humla Office".into()),
                RawCell::Text("2079/03/01".into()),
            ],
        ];
        let parsed = parse_assignments(&rows).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].level, 7);
    }

    #[test]
    fn missing_required_column_fails_the_sheet() {
        let rows = vec![text_row(&["Employee Id", "From Date", "To Date"])];
        assert_eq!(
            parse_leaves(&rows),
            Err(IngestError::MissingColumn {
                sheet: "leave",
                column: "leaveType"
            })
        );
        assert_eq!(
            parse_absences(&[]),
            Err(IngestError::NoHeader { sheet: "absence" })
        );
    }

    #[test]
    fn header_echo_rows_are_skipped() {
        let rows = vec![
            text_row(&["Employee Id", "From Date", "To Date", "Remarks"]),
            text_row(&["E1", "From Date", "To Date", ""]),
            text_row(&["E1", "2078/01/01", "2078/01/05", "strike"]),
        ];
        let parsed = parse_absences(&rows).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].from_date, "2078-01-01");
        assert_eq!(parsed[0].remarks.as_deref(), Some("strike"));
    }

    fn assignment(office: &str, level: i32, start: &str, seniority: &str) -> Assignment {
        Assignment {
            employee_id: "E1".to_string(),
            start_date: start.to_string(),
            work_office: office.to_string(),
            level,
            seniority_date: Some(seniority.to_string()),
            reason_for_position: Some("Promotion".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn gap_before_first_row_of_a_level_is_filled() {
        let rows = vec![
            assignment("Kalikot Office", 6, "2078/04/07", "2076/08/13"),
            assignment("Humla Office", 5, "2070/01/01", "2070/01/01"),
            assignment("Jumla Office", 6, "2080/01/01", "2076/08/13"),
        ];
        let out = synthesize_pre_level_assignments(rows);
        assert_eq!(out.len(), 4);

        let synthetic = &out[1];
        assert!(synthetic.synthetic);
        assert_eq!(synthetic.start_date, "2076-08-13");
        assert_eq!(synthetic.end_date.as_deref(), Some("2078-04-06"));
        assert_eq!(synthetic.work_office, "Humla Office");
        assert_eq!(synthetic.level, 6);
        assert_eq!(synthetic.reason_for_position.as_deref(), Some("Promotion"));

        assert_eq!(out[2].work_office, "Kalikot Office");
        assert!(!out[3].synthetic);
    }

    #[test]
    fn first_ever_row_inherits_from_itself() {
        let rows = vec![assignment("Humla Office", 4, "2075-01-10", "2075-01-01")];
        let out = synthesize_pre_level_assignments(rows);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].work_office, "Humla Office");
        assert_eq!(out[0].end_date.as_deref(), Some("2075-01-09"));
    }

    #[test]
    fn no_gap_no_synthetic_row() {
        let rows = vec![
            assignment("Humla Office", 4, "2075-01-01", "2075-01-01"),
            assignment("Humla Office", 4, "2076-01-01", "bad date"),
        ];
        assert_eq!(synthesize_pre_level_assignments(rows).len(), 2);
    }
}
