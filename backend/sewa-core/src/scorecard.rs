// src/scorecard.rs
//! Applicant scorecard for a vacancy announcement (bigyapan).
//!
//! Both marks are evaluated as of the announcement's closing date.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use thiserror::Error;
use tracing::info;

use crate::bs_date::{BsDate, BsDateError};
use crate::records::{chronological, clipped_to, EmployeeProfile, EmployeeRecords};
use crate::seniority::{build_seniority_timeline, total_seniority_marks};
use crate::timeline::{total_marks, TimelineBuilder, TimelineError, TimelineRequest};

#[derive(Error, Debug)]
pub enum ScorecardError {
    #[error("Invalid bigyapan end date '{value}': {source}")]
    InvalidEndDate {
        value: String,
        #[source]
        source: BsDateError,
    },
    #[error("Employee {0} has no seniority date")]
    NoSeniorityDate(String),
    #[error(transparent)]
    Timeline(#[from] TimelineError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scorecard {
    pub employee_id: String,
    pub seniority_marks: Decimal,
    pub geographical_marks: Decimal,
    pub total_marks: Decimal,
    pub evaluation_end_date: String,
}

/// The vacancy an applicant is scored for.
#[derive(Debug, Clone)]
pub struct Vacancy {
    pub bigyapan_end_date: String,
    /// Only assignments at these levels count towards geographical marks.
    pub level_range: Option<RangeInclusive<i32>>,
}

// Profile first, then the latest assignment that records one.
fn seniority_date_of(profile: &EmployeeProfile, records: &EmployeeRecords) -> Option<String> {
    profile
        .seniority_date
        .clone()
        .filter(|s| !s.trim().is_empty())
        .or_else(|| {
            chronological(&records.assignments)
                .into_iter()
                .rev()
                .find_map(|a| a.seniority_date.clone())
        })
}

pub async fn build_scorecard(
    builder: &TimelineBuilder,
    profile: &EmployeeProfile,
    records: &EmployeeRecords,
    vacancy: &Vacancy,
) -> Result<Scorecard, ScorecardError> {
    let end = BsDate::parse(&vacancy.bigyapan_end_date).map_err(|source| {
        ScorecardError::InvalidEndDate {
            value: vacancy.bigyapan_end_date.clone(),
            source,
        }
    })?;
    let own = records.for_employee(&profile.employee_id);

    let seniority_date = seniority_date_of(profile, &own)
        .ok_or_else(|| ScorecardError::NoSeniorityDate(profile.employee_id.clone()))?;
    let seniority =
        build_seniority_timeline(&seniority_date, &end.format(), &own.absences, &own.leaves)?;
    let seniority_marks = total_seniority_marks(&seniority);

    let assignments = clipped_to(&own.assignments, end);
    let request = TimelineRequest {
        employee_id: &profile.employee_id,
        gender: profile.gender,
        level_range: vacancy.level_range.clone(),
        assignments: &assignments,
        absences: &own.absences,
        leaves: &own.leaves,
        today: end,
    };
    let timeline = builder.build_timeline(&request).await?;
    let geographical_marks = total_marks(&timeline);

    info!(
        "Scorecard {}: seniority {} + geographical {}",
        profile.employee_id, seniority_marks, geographical_marks
    );
    Ok(Scorecard {
        employee_id: profile.employee_id.clone(),
        seniority_marks,
        geographical_marks,
        total_marks: seniority_marks + geographical_marks,
        evaluation_end_date: end.format(),
    })
}
