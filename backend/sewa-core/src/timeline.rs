// src/timeline.rs
//! Geographical-marks timeline of one employee.
//!
//! Assignments are ordered, their open ends resolved, split at the era cutoff,
//! carved around absences and non-standard leaves, and finally scored one segment
//! at a time. Scoring is sequential: a segment's presence days and carry-back
//! category depend on the segments before it.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::bs_date::{diff_days, diff_ymd, BsDate, Ymd};
use crate::era::{BsRange, Era, EraSplitter};
use crate::marks::{score_segment, Marks, PresenceTracker, SegmentContext};
use crate::partition::{partition, Interval};
use crate::records::{
    break_intervals, chronological, effective_end_dates, AbsentDetail, Assignment, Gender,
    LeaveDetail,
};
use crate::reference::ReferenceLookup;

// --- Errors ---

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimelineError {
    #[error("{what}: {start} is after {end}")]
    InvalidChronology {
        what: String,
        start: String,
        end: String,
    },
}

// --- Output ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    pub start_date: String,
    pub end_date: String,
    pub years: i64,
    pub months: i64,
    pub days: i64,
    pub total_num_days: i64,
    /// On or before the era cutoff (old system).
    pub before_break: bool,
    pub era: Option<Era>,
    pub is_break: bool,
    pub level: i32,
    pub position: String,
    pub work_office: String,
    pub district: Option<String>,
    pub category: Option<String>,
    /// Category whose rate was applied, after any carry-back.
    pub marks_category: Option<String>,
    pub present_days: i64,
    #[serde(flatten)]
    pub marks: Marks,
    pub remarks: Option<String>,
    pub synthetic: bool,
}

/// Inputs for one employee's timeline.
#[derive(Debug, Clone)]
pub struct TimelineRequest<'a> {
    pub employee_id: &'a str,
    pub gender: Option<Gender>,
    pub level_range: Option<RangeInclusive<i32>>,
    pub assignments: &'a [Assignment],
    pub absences: &'a [AbsentDetail],
    pub leaves: &'a [LeaveDetail],
    /// Substituted for the open end of the most recent assignment.
    pub today: BsDate,
}

/// Elapsed Y/M/D covering both ends of an inclusive range.
pub fn inclusive_elapsed(start: &BsDate, end: &BsDate) -> Ymd {
    match end.day_after() {
        Some(next) => diff_ymd(start, &next),
        None => {
            let mut ymd = diff_ymd(start, end);
            ymd.days += 1;
            ymd
        }
    }
}

// A piece of an assignment before scoring.
struct Piece<'a> {
    assignment: &'a Assignment,
    era: Option<Era>,
    start: String,
    end: String,
    is_break: bool,
    remark: Option<String>,
}

pub struct TimelineBuilder {
    splitter: EraSplitter,
    lookup: ReferenceLookup,
}

impl TimelineBuilder {
    pub fn new(splitter: EraSplitter, lookup: ReferenceLookup) -> Self {
        Self { splitter, lookup }
    }

    pub fn splitter(&self) -> &EraSplitter {
        &self.splitter
    }

    pub fn lookup(&self) -> &ReferenceLookup {
        &self.lookup
    }

    /// Builds the scored segment list for one employee.
    pub async fn build_timeline(
        &self,
        request: &TimelineRequest<'_>,
    ) -> Result<Vec<Segment>, TimelineError> {
        let employee_id = request.employee_id.trim();
        let selected: Vec<Assignment> = request
            .assignments
            .iter()
            .filter(|a| a.employee_id.trim() == employee_id)
            .filter(|a| match &request.level_range {
                Some(range) => range.contains(&a.level),
                None => true,
            })
            .cloned()
            .collect();
        let absences: Vec<AbsentDetail> = request
            .absences
            .iter()
            .filter(|a| a.employee_id.trim() == employee_id)
            .cloned()
            .collect();
        let leaves: Vec<LeaveDetail> = request
            .leaves
            .iter()
            .filter(|l| l.employee_id.trim() == employee_id)
            .cloned()
            .collect();
        let breaks = break_intervals(&absences, &leaves);

        let ordered = chronological(&selected);
        let ends = effective_end_dates(&ordered, request.today);

        let mut pieces: Vec<Piece> = Vec::new();
        for (assignment, end) in ordered.iter().copied().zip(ends) {
            pieces.extend(self.pieces_for(assignment, &end, &breaks)?);
        }

        let segments = self.score_pieces(pieces, request.gender).await;
        let total: Decimal = segments.iter().map(|s| s.marks.total_marks).sum();
        info!(
            "Built geographical timeline for {}: {} segment(s), {} marks",
            employee_id,
            segments.len(),
            total
        );
        Ok(segments)
    }

    // Era split, then partition of each era part around the breaks.
    fn pieces_for<'a>(
        &self,
        assignment: &'a Assignment,
        end: &str,
        breaks: &[Interval],
    ) -> Result<Vec<Piece<'a>>, TimelineError> {
        let (start_date, end_date) = match (
            BsDate::parse(&assignment.start_date),
            BsDate::parse(end),
        ) {
            (Ok(s), Ok(e)) => (s, e),
            _ => {
                warn!(
                    "Assignment of {} at '{}' has unusable dates {}..{}; scoring 0",
                    assignment.employee_id, assignment.work_office, assignment.start_date, end
                );
                return Ok(vec![Piece {
                    assignment,
                    era: None,
                    start: assignment.start_date.clone(),
                    end: end.to_string(),
                    is_break: false,
                    remark: Some("Invalid date".to_string()),
                }]);
            }
        };
        if end_date < start_date && assignment.has_open_end() {
            // A derived end lands before the start when two rows share a start date.
            warn!(
                "Assignment of {} at '{}' starting {} is overlapped by the next row; scoring 0",
                assignment.employee_id, assignment.work_office, assignment.start_date
            );
            return Ok(vec![Piece {
                assignment,
                era: None,
                start: start_date.format(),
                end: end_date.format(),
                is_break: false,
                remark: Some("Ends before it starts".to_string()),
            }]);
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

        let split = self.splitter.split(BsRange::new(start_date, end_date));
        let mut pieces = Vec::new();
        for (era, range) in split.parts() {
            let base = Interval::new(range.start.format(), range.end.format());
            for part in partition(&base, breaks) {
                pieces.push(Piece {
                    assignment,
                    era: Some(era),
                    is_break: part.is_break(),
                    start: part.start,
                    end: part.end,
                    remark: part.remark,
                });
            }
        }
        Ok(pieces)
    }

    async fn score_pieces(&self, pieces: Vec<Piece<'_>>, gender: Option<Gender>) -> Vec<Segment> {
        let mut presence = PresenceTracker::new();
        let mut prior_category: Option<String> = None;
        let mut segments = Vec::with_capacity(pieces.len());

        for piece in pieces {
            let placement = self
                .lookup
                .placement_for_office(&piece.assignment.work_office)
                .await;
            let category = placement.category.clone();

            let dates = match (BsDate::parse(&piece.start), BsDate::parse(&piece.end)) {
                (Ok(s), Ok(e)) if piece.era.is_some() => Some((s, e)),
                _ => None,
            };

            let segment = match (dates, piece.era) {
                (Some((start, end)), Some(era)) => {
                    let elapsed = inclusive_elapsed(&start, &end);
                    let total_num_days = diff_days(&start, &end) + 1;
                    let present_days =
                        presence.observe(category.as_deref(), total_num_days, piece.is_break);
                    let ctx = SegmentContext {
                        is_break: piece.is_break,
                        era,
                        present_days,
                        category: category.as_deref(),
                        prior_category: prior_category.as_deref(),
                        gender,
                        elapsed,
                    };
                    let score = score_segment(&ctx, &self.lookup).await;
                    debug!(
                        "{}..{} {:?} break={} present={} -> {}",
                        piece.start,
                        piece.end,
                        era,
                        piece.is_break,
                        present_days,
                        score.marks.total_marks
                    );
                    Segment {
                        start_date: piece.start,
                        end_date: piece.end,
                        years: elapsed.years,
                        months: elapsed.months,
                        days: elapsed.days,
                        total_num_days,
                        before_break: era == Era::Old,
                        era: Some(era),
                        is_break: piece.is_break,
                        level: piece.assignment.level,
                        position: piece.assignment.position.clone(),
                        work_office: piece.assignment.work_office.clone(),
                        district: placement.district,
                        category: category.clone(),
                        marks_category: score.applied_category,
                        present_days,
                        marks: score.marks,
                        remarks: piece.remark,
                        synthetic: piece.assignment.synthetic,
                    }
                }
                // Unusable dates: keep the row visible, worth nothing.
                _ => Segment {
                    start_date: piece.start,
                    end_date: piece.end,
                    years: 0,
                    months: 0,
                    days: 0,
                    total_num_days: 0,
                    before_break: false,
                    era: None,
                    is_break: false,
                    level: piece.assignment.level,
                    position: piece.assignment.position.clone(),
                    work_office: piece.assignment.work_office.clone(),
                    district: placement.district,
                    category: category.clone(),
                    marks_category: None,
                    present_days: 0,
                    marks: Marks::zero(),
                    remarks: piece.remark,
                    synthetic: piece.assignment.synthetic,
                },
            };

            prior_category = category;
            segments.push(segment);
        }
        segments
    }
}

/// Sum of a timeline's marks.
pub fn total_marks(segments: &[Segment]) -> Decimal {
    segments.iter().map(|s| s.marks.total_marks).sum()
}
