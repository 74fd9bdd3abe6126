//! Canonical billing-period ordering
//!
//! Period labels mix month abbreviations and two-digit years ("Oct-26",
//! "Jan 2024"), so lexical sorting is wrong. Labels are ranked by:
//! 1. position in the configured period sequence (matched ignoring case and
//!    separators, or by equal month/year),
//! 2. calendar month for other labels that parse as month + year,
//! 3. first-seen order for everything else.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

/// Default six-period billing window
pub const DEFAULT_PERIOD_SEQUENCE: &[&str] =
    &["Oct-26", "Nov-26", "Dec-26", "Jan-26", "Feb-26", "Mar-26"];

const MONTHS: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];

static MONTH_NAME_YEAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?i)([a-z]{3,9})[\s\-_/'.,]*(\d{4}|\d{2})$").expect("valid regex")
});
static YEAR_MONTH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{4})[\-/.](\d{1,2})$").expect("valid regex"));
static MONTH_YEAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{1,2})[\-/.](\d{4})$").expect("valid regex"));

/// Sort key for a period label
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PeriodRank {
    /// Index in the configured sequence
    Listed(usize),
    /// (year, month) of a label outside the sequence
    Calendar(i32, u32),
    /// First-seen index of an unrecognised label
    Unlisted(usize),
}

#[derive(Debug, Clone)]
struct SequenceEntry {
    key: String,
    month_year: Option<(i32, u32)>,
}

/// Fixed lookup table of period labels in billing order
#[derive(Debug, Clone)]
pub struct PeriodOrder {
    sequence: Vec<SequenceEntry>,
}

impl PeriodOrder {
    pub fn new<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let sequence = labels
            .into_iter()
            .map(|label| SequenceEntry {
                key: normalize_label(label.as_ref()),
                month_year: parse_month_year(label.as_ref()),
            })
            .collect();
        Self { sequence }
    }

    /// Rank a label; `first_seen` breaks ties between unrecognised labels
    pub fn rank(&self, label: &str, first_seen: usize) -> PeriodRank {
        let key = normalize_label(label);
        let month_year = parse_month_year(label);

        let listed = self.sequence.iter().position(|entry| {
            entry.key == key || (month_year.is_some() && entry.month_year == month_year)
        });
        if let Some(index) = listed {
            return PeriodRank::Listed(index);
        }

        match month_year {
            Some((year, month)) => PeriodRank::Calendar(year, month),
            None => PeriodRank::Unlisted(first_seen),
        }
    }

    /// Stable sort of `items` into canonical period order
    pub fn sort_by_label<T, F>(&self, items: &mut [T], label: F)
    where
        F: Fn(&T) -> &str,
    {
        let mut first_seen: HashMap<String, usize> = HashMap::new();
        for (index, item) in items.iter().enumerate() {
            first_seen
                .entry(label(item).trim().to_string())
                .or_insert(index);
        }

        items.sort_by_cached_key(|item| {
            let text = label(item).trim();
            let seen = first_seen.get(text).copied().unwrap_or(usize::MAX);
            self.rank(text, seen)
        });
    }
}

impl Default for PeriodOrder {
    fn default() -> Self {
        Self::new(DEFAULT_PERIOD_SEQUENCE)
    }
}

/// Lowercase alphanumerics only: "Oct-26", "oct 26" and "OCT26" are one key
pub fn normalize_label(label: &str) -> String {
    label
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Parse "Jan 2024", "Jan-24", "January 2024", "2024-01" or "01/2024"
pub fn parse_month_year(label: &str) -> Option<(i32, u32)> {
    let label = label.trim();

    if let Some(caps) = MONTH_NAME_YEAR.captures(label) {
        let name = caps[1].to_ascii_lowercase();
        let month = MONTHS.iter().position(|m| name.starts_with(m))? as u32 + 1;
        let year: i32 = caps[2].parse().ok()?;
        let year = if caps[2].len() == 2 { 2000 + year } else { year };
        return Some((year, month));
    }

    let (year, month) = if let Some(caps) = YEAR_MONTH.captures(label) {
        (caps[1].parse().ok()?, caps[2].parse().ok()?)
    } else if let Some(caps) = MONTH_YEAR.captures(label) {
        (caps[2].parse().ok()?, caps[1].parse().ok()?)
    } else {
        return None;
    };

    (1..=12).contains(&month).then_some((year, month))
}
