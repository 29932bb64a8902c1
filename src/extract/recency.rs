/// Relative upload-date parsing ("3 hours ago")
use chrono::{DateTime, Utc};
use regex::Regex;
use std::sync::OnceLock;

const MINUTE: i64 = 60;
const HOUR: i64 = 60 * MINUTE;
const DAY: i64 = 24 * HOUR;

/// Unit fragments and their length in seconds, matched by substring in this order
const UNITS: [(&str, i64); 7] = [
    ("second", 1),
    ("minute", MINUTE),
    ("hour", HOUR),
    ("day", DAY),
    ("week", 7 * DAY),
    ("month", 30 * DAY),
    ("year", 365 * DAY),
];

fn relative_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"(\S+)\s+(\S+)\s+ago\s*$").ok())
        .as_ref()
}

/// Convert `"<N> <unit> ago"` into a unix timestamp relative to `now`.
///
/// Returns `None` when the count is not a number or the unit is not recognized.
pub fn parse_relative_date(text: &str, now: DateTime<Utc>) -> Option<i64> {
    let lowered = text.trim().to_lowercase();
    let captures = relative_pattern()?.captures(&lowered)?;

    let count: i64 = captures.get(1)?.as_str().parse().ok()?;
    let unit = captures.get(2)?.as_str();
    let unit_seconds = UNITS
        .iter()
        .find(|(name, _)| unit.contains(name))
        .map(|(_, seconds)| *seconds)?;

    let offset = count.checked_mul(unit_seconds)?;
    now.timestamp().checked_sub(offset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_units() {
        let base = now().timestamp();
        assert_eq!(parse_relative_date("30 seconds ago", now()), Some(base - 30));
        assert_eq!(parse_relative_date("1 minute ago", now()), Some(base - 60));
        assert_eq!(parse_relative_date("3 hours ago", now()), Some(base - 3 * 3600));
        assert_eq!(parse_relative_date("2 days ago", now()), Some(base - 2 * 86400));
        assert_eq!(parse_relative_date("1 week ago", now()), Some(base - 7 * 86400));
        assert_eq!(parse_relative_date("4 months ago", now()), Some(base - 120 * 86400));
        assert_eq!(parse_relative_date("1 year ago", now()), Some(base - 365 * 86400));
    }

    #[test]
    fn test_prefixed_phrase() {
        let base = now().timestamp();
        assert_eq!(parse_relative_date("Streamed 5 hours ago", now()), Some(base - 5 * 3600));
    }

    #[test]
    fn test_unknown_inputs() {
        assert_eq!(parse_relative_date("a few hours ago", now()), None);
        assert_eq!(parse_relative_date("3 fortnights ago", now()), None);
        assert_eq!(parse_relative_date("1.2M views", now()), None);
        assert_eq!(parse_relative_date("", now()), None);
    }

    #[test]
    fn test_newer_is_larger() {
        let hours = parse_relative_date("2 hours ago", now()).unwrap();
        let day = parse_relative_date("1 day ago", now()).unwrap();
        assert!(hours > day);
    }
}
