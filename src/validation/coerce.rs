//! Cell coercion shared by the validator and the normalizer
//!
//! Every function returns `None` when the cell cannot be read as the target
//! type. The validator turns `None` into a type violation; the normalizer
//! only ever sees cells that already passed.

use chrono::{Days, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::CellValue;

/// Date layouts accepted in text cells, tried in order
pub const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d", "%d-%m-%Y", "%m/%d/%Y", "%Y/%m/%d", "%d/%m/%Y", "%m-%d-%Y", "%d.%m.%Y",
    "%d %b %Y", "%d %B %Y", "%b %d, %Y", "%B %d, %Y",
];

/// Largest serial Excel can represent (9999-12-31)
const MAX_EXCEL_SERIAL: f64 = 2_958_465.0;

static MONEY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^\s*(?P<pre>₹|rs\.?|inr|us\$|usd|\$|€|eur|£|gbp)?\s*(?P<num>[-+]?[\d,]*\.?\d+)\s*(?P<post>/-|₹|rs\.?|inr|usd|eur|gbp)?\s*$",
    )
    .unwrap()
});

/// A money amount with the currency it was written in, if any
#[derive(Debug, Clone, PartialEq)]
pub struct Money {
    pub amount: f64,
    /// ISO 4217 code detected from a symbol or code, `None` when unmarked
    pub currency: Option<String>,
}

/// Whole number; accepts `"1,200"` and integral floats such as `3.0`
pub fn parse_integer(cell: &CellValue) -> Option<i64> {
    match cell {
        CellValue::Number(n) if n.is_finite() && n.fract() == 0.0 => Some(*n as i64),
        CellValue::Text(s) => {
            let cleaned = strip_separators(s);
            cleaned.parse::<i64>().ok().or_else(|| {
                cleaned
                    .parse::<f64>()
                    .ok()
                    .filter(|n| n.is_finite() && n.fract() == 0.0)
                    .map(|n| n as i64)
            })
        }
        _ => None,
    }
}

/// Finite number; accepts thousands separators
pub fn parse_number(cell: &CellValue) -> Option<f64> {
    match cell {
        CellValue::Number(n) if n.is_finite() => Some(*n),
        CellValue::Text(s) => strip_separators(s)
            .parse::<f64>()
            .ok()
            .filter(|n| n.is_finite()),
        _ => None,
    }
}

/// Money amount such as `"₹1,200.50"`, `"Rs. 300"`, `"$12"`, `"45 EUR"` or `"1,500/-"`
pub fn parse_money(cell: &CellValue) -> Option<Money> {
    match cell {
        CellValue::Number(n) if n.is_finite() => Some(Money {
            amount: *n,
            currency: None,
        }),
        CellValue::Text(s) => {
            let caps = MONEY_RE.captures(s)?;
            let amount = strip_separators(caps.name("num")?.as_str())
                .parse::<f64>()
                .ok()
                .filter(|n| n.is_finite())?;
            let pre = caps.name("pre").and_then(|m| currency_code(m.as_str()));
            let post = caps.name("post").and_then(|m| currency_code(m.as_str()));
            let currency = match (pre, post) {
                (Some(a), Some(b)) if a != b => return None,
                (a, b) => a.or(b),
            };
            Some(Money {
                amount,
                currency: currency.map(str::to_string),
            })
        }
        _ => None,
    }
}

/// Calendar date from a date cell, an Excel serial, or text in `DATE_FORMATS`
pub fn parse_date(cell: &CellValue) -> Option<NaiveDate> {
    match cell {
        CellValue::Date(d) => Some(*d),
        CellValue::Number(n) => excel_serial_to_date(*n),
        CellValue::Text(s) => parse_date_text(s),
        _ => None,
    }
}

/// Parse a text date, tolerating a trailing time component
pub fn parse_date_text(text: &str) -> Option<NaiveDate> {
    let trimmed = text.trim();
    let candidates = [
        trimmed,
        trimmed.split(['T', ' ']).next().unwrap_or(trimmed),
    ];
    for candidate in candidates {
        for format in DATE_FORMATS {
            if let Ok(date) = NaiveDate::parse_from_str(candidate, format) {
                return Some(date);
            }
        }
    }
    None
}

/// Convert a 1900-system Excel serial day number
///
/// Day zero is 1899-12-30, which absorbs Excel's phantom 1900-02-29 for every
/// serial after February 1900.
pub fn excel_serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || !(1.0..=MAX_EXCEL_SERIAL).contains(&serial) {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    epoch.checked_add_days(Days::new(serial.floor() as u64))
}

/// Canonical text of a cell for string columns
pub fn cell_text(cell: &CellValue) -> Option<String> {
    if cell.is_blank() {
        None
    } else {
        Some(cell.to_string().trim().to_string())
    }
}

fn strip_separators(s: &str) -> String {
    s.trim()
        .chars()
        .filter(|c| !matches!(c, ',' | '_' | ' ' | '\u{a0}'))
        .collect()
}

fn currency_code(marker: &str) -> Option<&'static str> {
    match marker.trim().to_lowercase().as_str() {
        "₹" | "rs" | "rs." | "inr" | "/-" => Some("INR"),
        "$" | "us$" | "usd" => Some("USD"),
        "€" | "eur" => Some("EUR"),
        "£" | "gbp" => Some("GBP"),
        _ => None,
    }
}
