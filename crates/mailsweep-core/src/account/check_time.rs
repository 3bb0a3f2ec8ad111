//! Parsing of stored last-check timestamps.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer};

const NAIVE_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

/// Normalizes a stored check time into a UTC instant.
///
/// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS[.fff]` and bare `YYYY-MM-DD`.
/// Times without an offset are taken as UTC. Anything else yields `None`,
/// which makes the next pass fetch everything.
#[must_use]
pub fn normalize_check_time(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(at) = DateTime::parse_from_rfc3339(value) {
        return Some(at.with_timezone(&Utc));
    }

    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Some(naive.and_utc());
        }
    }

    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Serde adapter reading an optional check time through [`normalize_check_time`].
///
/// Unparseable strings become `None` rather than failing the whole record.
pub(crate) fn deserialize_check_time<'de, D>(
    deserializer: D,
) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<String> = Option::deserialize(deserializer)?;
    Ok(value.as_deref().and_then(normalize_check_time))
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_rfc3339_converted_to_utc() {
        let at = normalize_check_time("2024-01-01T08:00:00+08:00").unwrap();
        assert_eq!(at, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_space_separated() {
        let at = normalize_check_time("2024-03-05 12:30:45").unwrap();
        assert_eq!(at, Utc.with_ymd_and_hms(2024, 3, 5, 12, 30, 45).unwrap());

        let at = normalize_check_time("2024-03-05 12:30:45.123456").unwrap();
        assert_eq!(at.timestamp(), Utc.with_ymd_and_hms(2024, 3, 5, 12, 30, 45).unwrap().timestamp());
    }

    #[test]
    fn test_date_only() {
        let at = normalize_check_time("2024-01-01").unwrap();
        assert_eq!(at, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_unparseable() {
        assert!(normalize_check_time("").is_none());
        assert!(normalize_check_time("yesterday").is_none());
        assert!(normalize_check_time("2024-13-01").is_none());
    }
}
