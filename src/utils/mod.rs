use anyhow::{anyhow, Result};
use chrono::{NaiveDate, NaiveDateTime, Utc};
use sha2::{Digest, Sha256};

pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}

/// Hash of a whole grid, used to tell write attempts apart in the write log.
pub fn sha256_grid(grid: &[Vec<String>]) -> String {
    let mut hasher = Sha256::new();
    for row in grid {
        for cell in row {
            hasher.update(cell.as_bytes());
            hasher.update([0x1f]);
        }
        hasher.update([0x1e]);
    }
    hex::encode(hasher.finalize())
}

pub fn format_decimal(value: f64) -> String {
    format!("{:.2}", value)
}

/// Text form of a number for a sheet cell: integral values without a fraction.
pub fn format_number(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

pub fn parse_decimal(value: &str) -> Result<f64> {
    let raw = value.trim();
    let normalized = if raw.contains(',') && raw.contains('.') {
        raw.replace('.', "").replace(',', ".")
    } else {
        raw.replace(',', ".")
    };
    let parsed = normalized
        .parse::<f64>()
        .map_err(|e| anyhow!("Parse decimal: {}", e))?;
    if !parsed.is_finite() {
        return Err(anyhow!("Parse decimal: not a finite number"));
    }
    Ok(parsed)
}

/// Numeric coercion for a cell: blank or invalid becomes missing.
pub fn coerce_number(value: &str) -> Option<f64> {
    if value.trim().is_empty() {
        return None;
    }
    parse_decimal(value).ok()
}

/// Numeric coercion for a cell: blank or invalid becomes zero.
pub fn coerce_number_or_zero(value: &str) -> f64 {
    coerce_number(value).unwrap_or(0.0)
}

const DAY_FIRST_DATES: [&str; 7] = [
    "%d/%m/%Y", "%d-%m-%Y", "%d.%m.%Y", "%d/%m/%y", "%Y-%m-%d", "%Y/%m/%d", "%Y.%m.%d",
];

const DAY_FIRST_DATETIMES: [&str; 6] = [
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
    "%d-%m-%Y %H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
];

/// Day-first date parsing. Anything unparseable is `None`, never an error.
pub fn parse_day_first_date(value: &str) -> Option<NaiveDate> {
    let raw = value.trim();
    if raw.is_empty() {
        return None;
    }

    for fmt in DAY_FIRST_DATES.iter() {
        if let Ok(date) = NaiveDate::parse_from_str(raw, fmt) {
            return Some(date);
        }
    }
    for fmt in DAY_FIRST_DATETIMES.iter() {
        if let Ok(datetime) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(datetime.date());
        }
    }
    None
}

/// Dates go back to the sheet in the same day-first form the form writes.
pub fn format_sheet_date(date: NaiveDate) -> String {
    date.format("%d/%m/%Y").to_string()
}
