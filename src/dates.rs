//! Calendar helpers shared by both engines

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime};
use serde::Deserialize;

/// First day of a reporting week.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum WeekStart {
    /// US convention, matches a warehouse `DATE_TRUNC(d, WEEK)`
    #[default]
    Sunday,
    /// ISO 8601 weeks
    Monday,
}

const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%Y-%m-%d %H:%M",
];

fn epoch() -> NaiveDate {
    NaiveDate::default()
}

/// Days since 1970-01-01.
pub fn day_number(date: NaiveDate) -> i64 {
    date.signed_duration_since(epoch()).num_days()
}

pub fn from_day_number(day: i64) -> NaiveDate {
    epoch() + Duration::days(day)
}

/// Truncate `date` to the start of its week.
pub fn week_start(date: NaiveDate, start: WeekStart) -> NaiveDate {
    let back = match start {
        WeekStart::Sunday => date.weekday().num_days_from_sunday(),
        WeekStart::Monday => date.weekday().num_days_from_monday(),
    };
    date - Duration::days(i64::from(back))
}

/// Sequential week index of the week containing `date`.
///
/// Week starts are exactly seven days apart, so the difference of two
/// indices is the week offset between them.
pub fn week_index(date: NaiveDate, start: WeekStart) -> i64 {
    day_number(week_start(date, start)).div_euclid(7)
}

/// Inverse of [`week_index`].
pub fn week_from_index(index: i64, start: WeekStart) -> NaiveDate {
    // 1970-01-01 was a Thursday; the index grid is anchored on the week
    // start preceding it.
    let anchor = week_start(epoch(), start);
    let anchor_index = day_number(anchor).div_euclid(7);
    anchor + Duration::weeks(index - anchor_index)
}

/// Parse the timestamp layouts found in retail and analytics exports.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_utc());
    }
    for format in NAIVE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok()
}
