// src/excel_date.rs
//! Normalisation of spreadsheet date cells into canonical BS strings.
//!
//! Service-record exports mix several encodings in the same column: Excel serials
//! that were typed as BS dates, Gregorian timestamps, literal `YYYY/MM/DD` BS
//! strings and repeated header rows. [`normalize`] folds them into `YYYY-MM-DD`
//! and falls back to the raw text when nothing matches.

use chrono::{DateTime, Datelike, Days, NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::bs_date::BsDate;

/// Excel serials outside this range are not treated as dates.
pub const EXCEL_SERIAL_MIN: f64 = 20_000.0;
pub const EXCEL_SERIAL_MAX: f64 = 120_000.0;

// "from date", "To  Date", "date from", ... echoed into data rows by merged headers.
static HEADER_ECHO: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(?:(?:from|to)\s*date|date\s*(?:from|to))\s*$")
        .expect("header echo pattern is valid")
});

const AD_DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M",
];

/// A single spreadsheet cell as delivered by the reader.
#[derive(Debug, Clone, PartialEq)]
pub enum RawCell {
    Text(String),
    Number(f64),
    /// A date-formatted cell; the payload is its Excel serial.
    Date(f64),
    Empty,
}

impl RawCell {
    /// The cell rendered as text, integers without a fractional part.
    pub fn as_text(&self) -> String {
        match self {
            RawCell::Text(s) => s.trim().to_string(),
            RawCell::Number(n) | RawCell::Date(n) => {
                if (n.floor() - n).abs() < f64::EPSILON {
                    format!("{}", *n as i64)
                } else {
                    format!("{}", n)
                }
            }
            RawCell::Empty => String::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            RawCell::Empty => true,
            RawCell::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    fn as_number(&self) -> Option<f64> {
        match self {
            RawCell::Number(n) | RawCell::Date(n) => Some(*n),
            RawCell::Text(s) => s.trim().parse::<f64>().ok(),
            RawCell::Empty => None,
        }
    }
}

impl From<&str> for RawCell {
    fn from(value: &str) -> Self {
        if value.trim().is_empty() {
            RawCell::Empty
        } else {
            RawCell::Text(value.to_string())
        }
    }
}

/// Whether the text is a header label repeated inside the data.
pub fn is_header_echo(s: &str) -> bool {
    HEADER_ECHO.is_match(s)
}

/// Converts an Excel 1900-system serial to the calendar date Excel displays for it.
///
/// Serial 1 is 1900-01-01. Excel counts a nonexistent 1900-02-29 (serial 60), so
/// serials past it are one day ahead of the real count.
pub fn excel_serial_to_components(serial: f64) -> Option<(i32, u32, u32)> {
    if !serial.is_finite() || serial < 1.0 {
        return None;
    }
    let mut days = serial.floor() as u64;
    if days > 59 {
        days -= 1;
    }
    let base = NaiveDate::from_ymd_opt(1899, 12, 31)?;
    let date = base.checked_add_days(Days::new(days))?;
    Some((date.year(), date.month(), date.day()))
}

fn parse_ad_timestamp(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.date_naive());
    }
    AD_DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|dt| dt.date())
}

/// Normalises a raw cell into `YYYY-MM-DD` (BS), an empty string for header echoes,
/// or the cell's own text when no rule applies.
pub fn normalize(raw: &RawCell) -> String {
    let text = raw.as_text();

    // 1. Header echoes.
    if is_header_echo(&text) {
        return String::new();
    }

    // 2. Excel serials stored BS dates verbatim; reinterpret the components.
    if let Some(serial) = raw.as_number() {
        if (EXCEL_SERIAL_MIN..=EXCEL_SERIAL_MAX).contains(&serial) {
            if let Some((y, m, d)) = excel_serial_to_components(serial) {
                let out = format!("{:04}-{:02}-{:02}", y, m, d);
                debug!("Excel serial {} read as BS {}", serial, out);
                return out;
            }
        }
        return unchanged(raw, text);
    }

    // 3. Gregorian timestamps are converted properly.
    if let Some(ad) = parse_ad_timestamp(&text) {
        if let Some(bs) = BsDate::from_ad(ad) {
            debug!("AD timestamp '{}' converted to BS {}", text, bs);
            return bs.format();
        }
    }

    // 4. Literal BS strings, separators canonicalised.
    if let Ok(bs) = BsDate::parse(&text) {
        return bs.format();
    }

    // 5. Leave whatever it is for the caller to judge.
    unchanged(raw, text)
}

// Text cells come back exactly as read, untrimmed.
fn unchanged(raw: &RawCell, text: String) -> String {
    match raw {
        RawCell::Text(s) => s.clone(),
        _ => text,
    }
}

/// Shorthand for text input.
pub fn normalize_str(s: &str) -> String {
    normalize(&RawCell::Text(s.to_string()))
}
