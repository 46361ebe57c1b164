//! GTFS time-of-day and date literals.

use chrono::NaiveDate;

/// Parses `H:MM:SS` / `HH:MM:SS` into seconds since service-day midnight.
///
/// Hours past 23 are kept as-is, so `25:30:00` is 91800. Values that do
/// not fit in `u32` seconds are rejected.
pub fn parse_gtfs_time(s: &str) -> Option<u32> {
    let mut parts = s.trim().split(':');
    let hours: u32 = parts.next()?.parse().ok()?;
    let minutes: u32 = parts.next()?.parse().ok()?;
    let seconds: u32 = parts.next()?.parse().ok()?;
    if parts.next().is_some() || minutes > 59 || seconds > 59 {
        return None;
    }
    hours.checked_mul(3600)?.checked_add(minutes * 60 + seconds)
}

pub fn format_gtfs_time(seconds: u32) -> String {
    format!("{:02}:{:02}:{:02}", seconds / 3600, (seconds / 60) % 60, seconds % 60)
}

/// Parses the compact `YYYYMMDD` date form
pub fn parse_gtfs_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y%m%d").ok()
}

pub fn format_gtfs_date(date: NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}
