pub mod auth;
pub mod config;
pub mod events;
pub mod schedule;
pub mod windows;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};

/// Parse a deadline argument: full RFC3339, or a bare `YYYY-MM-DD` taken as
/// 17:00 UTC that day.
pub fn parse_deadline(s: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(date) = s.parse::<NaiveDate>() {
        let eod = NaiveTime::from_hms_opt(17, 0, 0).unwrap_or(NaiveTime::MIN);
        return Ok(date.and_time(eod).and_utc());
    }
    Err(format!(
        "cannot parse '{s}' as a deadline (expected RFC3339 or YYYY-MM-DD)"
    ))
}
