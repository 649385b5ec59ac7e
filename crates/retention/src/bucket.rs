//! Calendar buckets used to deduplicate backups per retention tier

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use std::fmt;

/// Calendar period size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Granularity {
    Day,
    Week,
    Month,
}

/// Identifier of a calendar period
///
/// Keys compare by value: two backups share a bucket iff their embedded
/// timestamps fall in the same local-calendar period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BucketKey {
    /// Calendar date
    Day(NaiveDate),
    /// ISO-8601 week (the week-year may differ from the calendar year)
    Week { iso_year: i32, week: u32 },
    /// Calendar month
    Month { year: i32, month: u32 },
}

impl BucketKey {
    pub fn granularity(&self) -> Granularity {
        match self {
            BucketKey::Day(_) => Granularity::Day,
            BucketKey::Week { .. } => Granularity::Week,
            BucketKey::Month { .. } => Granularity::Month,
        }
    }
}

impl fmt::Display for BucketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BucketKey::Day(date) => write!(f, "{}", date.format("%Y-%m-%d")),
            BucketKey::Week { iso_year, week } => write!(f, "{:04}-W{:02}", iso_year, week),
            BucketKey::Month { year, month } => write!(f, "{:04}-{:02}", year, month),
        }
    }
}

/// Map a capture instant to its bucket at the given granularity
///
/// Weeks follow ISO-8601: the week containing the year's first Thursday is
/// week 1, so late-December dates can belong to week 1 of the next year.
pub fn bucket_key_for(captured_at: NaiveDateTime, granularity: Granularity) -> BucketKey {
    let date = captured_at.date();
    match granularity {
        Granularity::Day => BucketKey::Day(date),
        Granularity::Week => {
            let iso = date.iso_week();
            BucketKey::Week {
                iso_year: iso.year(),
                week: iso.week(),
            }
        }
        Granularity::Month => BucketKey::Month {
            year: date.year(),
            month: date.month(),
        },
    }
}
