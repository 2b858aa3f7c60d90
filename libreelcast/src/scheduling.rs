//! Parsing of human-readable schedule times
//!
//! Accepted forms, tried in order:
//! - RFC 3339: "2025-11-20T15:00:00Z", "2025-11-20T15:00:00-03:00"
//! - "YYYY-MM-DD HH:MM", read as UTC
//! - Relative durations: "30m", "2h", "1d 6h"
//! - Natural language: "tomorrow 3pm", "next monday 10am"

use crate::error::{ReelcastError, Result};
use chrono::{DateTime, Duration, NaiveDateTime, Utc};

const DATE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Parse a schedule string relative to the current time
pub fn parse_schedule(input: &str) -> Result<DateTime<Utc>> {
    parse_schedule_at(input, Utc::now())
}

/// Parse a schedule string relative to `now`
pub fn parse_schedule_at(input: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    let input = input.trim();
    if input.is_empty() {
        return Err(ReelcastError::InvalidInput(
            "Schedule string cannot be empty".to_string(),
        ));
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Ok(dt.with_timezone(&Utc));
    }

    if let Ok(naive) = NaiveDateTime::parse_from_str(input, DATE_TIME_FORMAT) {
        return Ok(naive.and_utc());
    }

    if let Ok(duration) = parse_duration(input) {
        return Ok(now + duration);
    }

    chrono_english::parse_date_string(input, now, chrono_english::Dialect::Us).map_err(|e| {
        ReelcastError::InvalidInput(format!("Could not parse schedule string '{}': {}", input, e))
    })
}

fn parse_duration(input: &str) -> Result<Duration> {
    let std_duration = humantime::parse_duration(input)
        .map_err(|e| ReelcastError::InvalidInput(format!("Could not parse duration: {}", e)))?;

    Duration::try_seconds(std_duration.as_secs() as i64)
        .ok_or_else(|| ReelcastError::InvalidInput("Duration out of range".to_string()))
}

/// Format a Unix timestamp for display, RFC 3339 in UTC
pub fn format_timestamp(timestamp: i64) -> String {
    DateTime::from_timestamp(timestamp, 0)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| timestamp.to_string())
}
