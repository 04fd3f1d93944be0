//! The canonical calendar-period set.
//!
//! Pivot column ordering and dataset summaries both rely on the fixed
//! `Jan..Dec` ordering; period values outside this set are still valid data
//! (they sort after the canonical months).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Month {
    Jan,
    Feb,
    Mar,
    Apr,
    May,
    Jun,
    Jul,
    Aug,
    Sep,
    Oct,
    Nov,
    Dec,
}

/// All twelve months in calendar order.
pub const CANONICAL: [Month; 12] = [
    Month::Jan,
    Month::Feb,
    Month::Mar,
    Month::Apr,
    Month::May,
    Month::Jun,
    Month::Jul,
    Month::Aug,
    Month::Sep,
    Month::Oct,
    Month::Nov,
    Month::Dec,
];

impl Month {
    pub fn as_str(&self) -> &'static str {
        match self {
            Month::Jan => "Jan",
            Month::Feb => "Feb",
            Month::Mar => "Mar",
            Month::Apr => "Apr",
            Month::May => "May",
            Month::Jun => "Jun",
            Month::Jul => "Jul",
            Month::Aug => "Aug",
            Month::Sep => "Sep",
            Month::Oct => "Oct",
            Month::Nov => "Nov",
            Month::Dec => "Dec",
        }
    }

    /// Zero-based position in the calendar year.
    pub fn ordinal(&self) -> usize {
        *self as usize
    }

    /// Parse a period label. Case-sensitive: the canonical labels are
    /// three-letter title case (`"Jan"`), matching the expected data format.
    pub fn parse(s: &str) -> Option<Month> {
        CANONICAL.iter().copied().find(|m| m.as_str() == s)
    }
}

impl std::fmt::Display for Month {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sort key for period labels: canonical months first in calendar order,
/// anything else after, in a caller-defined tiebreak position.
pub fn sort_key(label: &str) -> usize {
    match Month::parse(label) {
        Some(m) => m.ordinal(),
        None => CANONICAL.len(),
    }
}
