// src/workbook.rs
//! Reads spreadsheets and CSV exports into rows of [`RawCell`]s.

use calamine::{open_workbook_auto, Data, Reader};
use std::io::Read;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

use crate::excel_date::RawCell;

#[derive(Error, Debug)]
pub enum WorkbookError {
    #[error("Failed to open workbook: {0}")]
    Spreadsheet(#[from] calamine::Error),
    #[error("Failed to read CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("Workbook has no sheet named '{0}'")]
    NoSuchSheet(String),
    #[error("Workbook has no sheets")]
    NoSheets,
    #[error("Unsupported file type: {0}")]
    UnsupportedFormat(String),
}

/// Maps a calamine cell onto a [`RawCell`]. Date-formatted cells keep their serial.
pub fn data_to_cell(data: &Data) -> RawCell {
    match data {
        Data::String(s) => RawCell::Text(s.clone()),
        Data::Float(f) => RawCell::Number(*f),
        Data::Int(i) => RawCell::Number(*i as f64),
        Data::Bool(b) => RawCell::Text(b.to_string()),
        Data::DateTime(dt) => RawCell::Date(dt.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => RawCell::Text(s.clone()),
        Data::Empty | Data::Error(_) => RawCell::Empty,
    }
}

/// Reads one sheet (the first when `sheet` is `None`) of an xlsx/xls/ods file.
pub fn read_sheet(path: &Path, sheet: Option<&str>) -> Result<Vec<Vec<RawCell>>, WorkbookError> {
    let mut workbook = open_workbook_auto(path)?;
    let names = workbook.sheet_names().to_owned();
    let name = match sheet {
        Some(wanted) => names
            .iter()
            .find(|n| n.trim().eq_ignore_ascii_case(wanted.trim()))
            .cloned()
            .ok_or_else(|| WorkbookError::NoSuchSheet(wanted.to_string()))?,
        None => names.first().cloned().ok_or(WorkbookError::NoSheets)?,
    };
    let range = workbook.worksheet_range(&name)?;
    let rows: Vec<Vec<RawCell>> = range
        .rows()
        .map(|r| r.iter().map(data_to_cell).collect())
        .collect();
    info!("Read {} row(s) from sheet '{}' of {:?}", rows.len(), name, path);
    Ok(rows)
}

/// Reads CSV records as text cells; the header stays the first row.
pub fn read_csv<R: Read>(reader: R) -> Result<Vec<Vec<RawCell>>, WorkbookError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);
    let mut rows = Vec::new();
    for record in csv_reader.records() {
        let record = record?;
        rows.push(record.iter().map(RawCell::from).collect());
    }
    debug!("Read {} CSV row(s)", rows.len());
    Ok(rows)
}

/// Picks the reader by file extension.
pub fn read_rows(path: &Path, sheet: Option<&str>) -> Result<Vec<Vec<RawCell>>, WorkbookError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "csv" => {
            let file = std::fs::File::open(path).map_err(csv::Error::from)?;
            read_csv(file)
        }
        "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => read_sheet(path, sheet),
        other => Err(WorkbookError::UnsupportedFormat(other.to_string())),
    }
}
