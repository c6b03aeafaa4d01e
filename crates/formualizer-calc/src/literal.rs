//! Rendering of variable values as engine expression literals.

use crate::value::{CellValue, VariableValue};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;

/// Day zero of the serial date system used for date-looking variables.
const SERIAL_EPOCH: NaiveDate = NaiveDate::from_ymd_opt(1899, 12, 30).unwrap();

const SECONDS_PER_DAY: f64 = 86_400.0;

static ISO_DATE_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}").expect("static pattern"));

const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

fn serial_from_datetime(dt: NaiveDateTime) -> f64 {
    let epoch = SERIAL_EPOCH.and_hms_opt(0, 0, 0).unwrap_or_default();
    let delta = dt - epoch;
    let millis = delta.num_milliseconds() as f64;
    millis / 1000.0 / SECONDS_PER_DAY
}

/// Convert an ISO-8601 date or date-time into days since 1899-12-30 (UTC).
///
/// Returns `None` when the text does not start with `YYYY-MM-DD` or does not parse as a
/// real date. Offsets are normalised to UTC; date-times without an offset are read as UTC.
pub fn iso_date_serial(text: &str) -> Option<f64> {
    if !ISO_DATE_PREFIX.is_match(text) {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(serial_from_datetime(dt.naive_utc()));
    }
    for format in NAIVE_DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, format) {
            return Some(serial_from_datetime(dt));
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(serial_from_datetime)
}

/// Quote text as a formula string literal, doubling embedded quotes.
pub fn quote_text(text: &str) -> String {
    format!("\"{}\"", text.replace('"', "\"\""))
}

fn render_number(n: f64) -> String {
    format!("{n}")
}

/// Render a variable value as the right-hand side of a named constant.
pub fn render_literal(value: &VariableValue) -> String {
    match value {
        VariableValue::Number(n) => render_number(*n),
        VariableValue::Boolean(true) => "TRUE".to_string(),
        VariableValue::Boolean(false) => "FALSE".to_string(),
        VariableValue::Text(text) => match iso_date_serial(text) {
            Some(serial) => render_number(serial),
            None => quote_text(text),
        },
    }
}

/// Full expression bound for a variable: `=<literal>`.
pub fn constant_expression(value: &VariableValue) -> String {
    format!("={}", render_literal(value))
}

/// Read back an expression produced by [`constant_expression`].
///
/// Returns `None` for anything that is not a plain number, boolean or quoted string.
pub fn parse_constant(expression: &str) -> Option<CellValue> {
    let body = expression.strip_prefix('=')?;
    match body {
        "TRUE" => return Some(CellValue::Boolean(true)),
        "FALSE" => return Some(CellValue::Boolean(false)),
        _ => {}
    }
    if let Some(inner) = body.strip_prefix('"').and_then(|rest| rest.strip_suffix('"')) {
        // Every quote inside must be doubled.
        if inner.replace("\"\"", "").contains('"') {
            return None;
        }
        return Some(CellValue::Text(inner.replace("\"\"", "\"")));
    }
    body.parse::<f64>()
        .ok()
        .filter(|n| n.is_finite())
        .map(CellValue::Number)
}
