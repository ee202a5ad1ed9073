//! Local wall-clock timestamps in the storage format.

use chrono::{Local, NaiveDateTime};

/// Storage format for all persisted timestamps.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Current local time, formatted for storage.
pub fn now_stamp() -> String {
    Local::now().format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a stored timestamp. Invalid input yields None, not an error.
pub fn parse_stamp(raw: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT).ok()
}

/// Normalize a user-supplied date/time to the storage format.
///
/// Accepts a full timestamp or a bare date (midnight assumed). Anything else
/// yields None — callers treat that as "filter not applied".
pub fn normalize_stamp(raw: &str) -> Option<String> {
    if let Some(dt) = parse_stamp(raw) {
        return Some(dt.format(TIMESTAMP_FORMAT).to_string());
    }
    chrono::NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .map(|d| {
            d.and_hms_opt(0, 0, 0)
                .unwrap_or_default()
                .format(TIMESTAMP_FORMAT)
                .to_string()
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_stamp_round_trips() {
        let stamp = now_stamp();
        assert!(parse_stamp(&stamp).is_some());
    }

    #[test]
    fn test_normalize_bare_date() {
        assert_eq!(
            normalize_stamp("2026-03-01").as_deref(),
            Some("2026-03-01 00:00:00")
        );
    }

    #[test]
    fn test_normalize_invalid() {
        assert!(normalize_stamp("not a date").is_none());
        assert!(normalize_stamp("2026-13-40").is_none());
    }
}
