//! Loose invoice-date parsing
//!
//! Numeric dates are split on `/` or `-` into `[a, b, c]` and disambiguated in
//! this order: `a > 31` means year-first, `c > 31` means day-first, anything
//! else goes to the locale-default parser. The locale default follows the
//! en-ZA/en-GB convention and reads numeric dates day-first, so a date like
//! `"03/04/26"` is 3 April 2026. Dates whose parts are all ≤ 31 remain
//! inherently ambiguous; that is a known limitation.

use chrono::{DateTime, NaiveDate, NaiveDateTime};

/// Locale-default numeric formats, day-first. Two-digit years are tried
/// first because `%Y` would otherwise accept "26" as the year 26.
const LOCALE_NUMERIC_FORMATS: &[&str] = &["%d/%m/%y", "%d-%m-%y", "%d/%m/%Y", "%d-%m-%Y"];

/// Locale-default textual formats
const LOCALE_TEXT_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%d %B %Y",
    "%d %b %Y",
    "%B %d, %Y",
    "%b %d, %Y",
    "%B %d %Y",
    "%b %d %Y",
    "%d-%b-%Y",
    "%d.%m.%Y",
];

const LOCALE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
];

/// Parse a loosely formatted date string into a calendar date.
///
/// # Examples
/// ```
/// use chrono::NaiveDate;
/// use esgtrack::services::dates::parse_date;
///
/// assert_eq!(parse_date("2026-03-15"), NaiveDate::from_ymd_opt(2026, 3, 15));
/// assert_eq!(parse_date("15-03-2026"), NaiveDate::from_ymd_opt(2026, 3, 15));
/// ```
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Some([a, b, c]) = numeric_parts(raw) {
        if a > 31 {
            return ymd(a, b, c);
        }
        if c > 31 {
            return ymd(c, b, a);
        }
    }

    parse_locale_default(raw)
}

/// Locale-default parse, used when the numeric heuristic cannot decide
pub fn parse_locale_default(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();

    for fmt in LOCALE_NUMERIC_FORMATS.iter().chain(LOCALE_TEXT_FORMATS) {
        if let Ok(date) = NaiveDate::parse_from_str(raw, fmt) {
            return Some(date);
        }
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.date_naive());
    }

    LOCALE_DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|dt| dt.date())
}

/// Split into exactly three all-digit parts
fn numeric_parts(raw: &str) -> Option<[u32; 3]> {
    let parts: Vec<&str> = raw.split(['/', '-']).collect();
    if parts.len() != 3 {
        return None;
    }

    let mut out = [0u32; 3];
    for (slot, part) in out.iter_mut().zip(&parts) {
        if part.is_empty() || !part.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        *slot = part.parse().ok()?;
    }
    Some(out)
}

fn ymd(year: u32, month: u32, day: u32) -> Option<NaiveDate> {
    let year = i32::try_from(year).ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}
