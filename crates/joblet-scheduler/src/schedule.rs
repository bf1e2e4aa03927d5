// SPDX-License-Identifier: MIT
//! Schedule-string parsing (§4.5): ISO-8601 absolute timestamps and
//! hand-rolled human-relative durations (`45s`, `30min`, `2h30m`, `1hour`).
//! Negative and zero durations are rejected; the maximum horizon is one
//! year.

use joblet_core::error::JobletError;
use std::time::Duration;

pub const MAX_HORIZON: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Units recognized in relative schedule strings, longest-match first so
/// `"min"` isn't swallowed as `"m"` + stray `"in"`.
const UNITS: &[(&str, u64)] = &[
    ("hours", 3600),
    ("hour", 3600),
    ("hrs", 3600),
    ("hr", 3600),
    ("mins", 60),
    ("min", 60),
    ("secs", 1),
    ("sec", 1),
    ("h", 3600),
    ("m", 60),
    ("s", 1),
];

/// Parse a relative duration string like `"2h30m"` or `"45s"`. Returns
/// `None` if the string doesn't look like a relative form at all (no
/// leading digit), so the caller can fall back to absolute parsing.
fn parse_relative(s: &str) -> Result<Option<Duration>, JobletError> {
    let bytes = s.as_bytes();
    if bytes.first().map(|b| b.is_ascii_digit()) != Some(true) {
        return Ok(None);
    }

    let mut total_seconds: u64 = 0;
    let mut rest = s;
    while !rest.is_empty() {
        let digit_len = rest.bytes().take_while(|b| b.is_ascii_digit()).count();
        if digit_len == 0 {
            return Err(JobletError::validation(s, "expected a number before the unit"));
        }
        let (number, tail) = rest.split_at(digit_len);
        let n: u64 = number
            .parse()
            .map_err(|_| JobletError::validation(s, "duration component too large"))?;

        let unit_len = tail.bytes().take_while(|b| b.is_ascii_alphabetic()).count();
        if unit_len == 0 {
            return Err(JobletError::validation(s, "expected a unit after the number"));
        }
        let (unit, remainder) = tail.split_at(unit_len);
        let factor = UNITS
            .iter()
            .find(|(name, _)| *name == unit)
            .map(|(_, f)| *f)
            .ok_or_else(|| JobletError::validation(s, format!("unknown duration unit '{unit}'")))?;
        total_seconds = total_seconds
            .checked_add(n.checked_mul(factor).ok_or_else(|| JobletError::validation(s, "duration overflow"))?)
            .ok_or_else(|| JobletError::validation(s, "duration overflow"))?;
        rest = remainder;
    }
    Ok(Some(Duration::from_secs(total_seconds)))
}

/// Resolve a schedule string to an absolute epoch-ms due time, given the
/// current epoch-ms. Accepts RFC3339 absolute timestamps or the relative
/// forms above.
pub fn resolve_due_ms(schedule: &str, now_ms: u64) -> Result<u64, JobletError> {
    let schedule = schedule.trim();

    if let Some(duration) = parse_relative(schedule)? {
        if duration.is_zero() {
            return Err(JobletError::validation(schedule, "schedule duration must be positive"));
        }
        if duration > MAX_HORIZON {
            return Err(JobletError::validation(schedule, "schedule duration exceeds the one-year horizon"));
        }
        return Ok(now_ms + duration.as_millis() as u64);
    }

    let parsed = chrono::DateTime::parse_from_rfc3339(schedule)
        .map_err(|e| JobletError::validation(schedule, format!("not a valid RFC3339 timestamp: {e}")))?;
    let due_ms = parsed.timestamp_millis();
    if due_ms <= now_ms as i64 {
        return Err(JobletError::validation(schedule, "scheduled time must be in the future"));
    }
    let delta = Duration::from_millis((due_ms - now_ms as i64) as u64);
    if delta > MAX_HORIZON {
        return Err(JobletError::validation(schedule, "scheduled time exceeds the one-year horizon"));
    }
    Ok(due_ms as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_seconds() {
        assert_eq!(resolve_due_ms("45s", 1_000).unwrap(), 1_000 + 45_000);
    }

    #[test]
    fn parses_minutes() {
        assert_eq!(resolve_due_ms("30min", 0).unwrap(), 30 * 60 * 1000);
    }

    #[test]
    fn parses_compound_hours_and_minutes() {
        assert_eq!(resolve_due_ms("2h30m", 0).unwrap(), (2 * 3600 + 30 * 60) * 1000);
    }

    #[test]
    fn parses_full_word_hour() {
        assert_eq!(resolve_due_ms("1hour", 0).unwrap(), 3600 * 1000);
    }

    #[test]
    fn rejects_zero_duration() {
        assert!(resolve_due_ms("0s", 0).is_err());
    }

    #[test]
    fn rejects_duration_past_one_year_horizon() {
        assert!(resolve_due_ms("400d", 0).is_err() || resolve_due_ms("999999h", 0).is_err());
    }

    #[test]
    fn rejects_unknown_unit() {
        assert!(resolve_due_ms("5x", 0).is_err());
    }

    #[test]
    fn parses_absolute_rfc3339_in_the_future() {
        let now_ms = 1_700_000_000_000u64;
        let future = chrono::DateTime::from_timestamp_millis(now_ms as i64 + 60_000)
            .unwrap()
            .to_rfc3339();
        assert_eq!(resolve_due_ms(&future, now_ms).unwrap(), now_ms + 60_000);
    }

    #[test]
    fn rejects_absolute_timestamp_in_the_past() {
        let now_ms = 1_700_000_000_000u64;
        let past = chrono::DateTime::from_timestamp_millis(now_ms as i64 - 60_000)
            .unwrap()
            .to_rfc3339();
        assert!(resolve_due_ms(&past, now_ms).is_err());
    }

    #[test]
    fn rejects_garbage_schedule_string() {
        assert!(resolve_due_ms("not-a-schedule", 0).is_err());
    }
}
