// src/lib.rs
//! Seniority and geographical marks engine for civil-service service records.
//!
//! Dates are Bikram Sambat throughout. Spreadsheet rows are normalised by
//! [`ingest`], turned into scored timelines by [`timeline`] and [`seniority`],
//! and aggregated into applicant [`scorecard`]s.

pub mod bs_calendar;
pub mod bs_date;
pub mod config;
pub mod era;
pub mod excel_date;
pub mod geographic;
pub mod ingest;
pub mod marks;
pub mod partition;
pub mod records;
pub mod reference;
pub mod scorecard;
pub mod seniority;
pub mod timeline;
pub mod workbook;

mod timeline_tests;

pub use bs_date::{diff_days, diff_ymd, BsDate, BsDateError, Ymd};
pub use era::{Era, EraSplitter};
pub use marks::Marks;
pub use records::{AbsentDetail, Assignment, EmployeeProfile, EmployeeRecords, Gender, LeaveDetail};
pub use reference::{CsvReferenceStore, ReferenceLookup, ReferenceStore};
pub use timeline::{Segment, TimelineBuilder, TimelineError, TimelineRequest};
