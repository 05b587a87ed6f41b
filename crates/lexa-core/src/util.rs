//! Shared utility functions used across multiple modules.

use chrono::{DateTime, FixedOffset, NaiveDate, Offset, Utc};

/// Normalize optional text by trimming whitespace and removing empties.
///
/// Returns `None` when the input is `None` or the trimmed value is empty.
pub fn normalize_text_option(value: Option<String>) -> Option<String> {
    let value = value?;
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Check if a string starts with `http://` or `https://`.
pub fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

/// Truncate text to at most 180 characters for error messages.
pub fn compact_text(value: &str) -> String {
    value.trim().chars().take(180).collect()
}

/// Current Unix timestamp in milliseconds.
pub fn unix_millis_now() -> i64 {
    Utc::now().timestamp_millis()
}

/// Fixed offset for a whole-hour UTC offset, clamped to the valid range.
pub fn fixed_offset_hours(hours: i32) -> FixedOffset {
    let hours = hours.clamp(-23, 23);
    FixedOffset::east_opt(hours * 3600).unwrap_or_else(|| Utc.fix())
}

/// Calendar date of a unix-ms instant as seen in `offset`.
pub fn date_in_offset(timestamp_ms: i64, offset: FixedOffset) -> NaiveDate {
    DateTime::<Utc>::from_timestamp_millis(timestamp_ms)
        .unwrap_or_default()
        .with_timezone(&offset)
        .date_naive()
}

/// `[start, end)` unix-ms bounds of `date` in `offset`.
pub fn day_bounds_millis(date: NaiveDate, offset: FixedOffset) -> (i64, i64) {
    let start = date
        .and_hms_opt(0, 0, 0)
        .unwrap_or_default()
        .and_local_timezone(offset)
        .single()
        .map_or(0, |start| start.timestamp_millis());
    (start, start + 86_400_000)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_text_option_rejects_empty() {
        assert_eq!(normalize_text_option(None), None);
        assert_eq!(normalize_text_option(Some("   ".to_string())), None);
    }

    #[test]
    fn normalize_text_option_trims_value() {
        assert_eq!(
            normalize_text_option(Some(" https://example.com ".to_string())),
            Some("https://example.com".to_string())
        );
    }

    #[test]
    fn is_http_url_accepts_valid_schemes() {
        assert!(is_http_url("http://localhost"));
        assert!(is_http_url("https://example.com"));
        assert!(!is_http_url("ftp://example.com"));
        assert!(!is_http_url("example.com"));
    }

    #[test]
    fn date_in_offset_crosses_midnight() {
        // 2026-02-13T20:00:00Z is already the 14th in UTC+8
        let instant = 1_771_012_800_000;
        assert_eq!(
            date_in_offset(instant, fixed_offset_hours(0)),
            NaiveDate::from_ymd_opt(2026, 2, 13).unwrap()
        );
        assert_eq!(
            date_in_offset(instant, fixed_offset_hours(8)),
            NaiveDate::from_ymd_opt(2026, 2, 14).unwrap()
        );
    }

    #[test]
    fn day_bounds_cover_one_day() {
        let date = NaiveDate::from_ymd_opt(2026, 2, 14).unwrap();
        let offset = fixed_offset_hours(8);
        let (start, end) = day_bounds_millis(date, offset);
        assert_eq!(end - start, 86_400_000);
        assert_eq!(date_in_offset(start, offset), date);
        assert_eq!(date_in_offset(end - 1, offset), date);
    }
}
