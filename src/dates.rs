//! Helpers for the free-form `date` strings submitters type in.
//!
//! Dates are stored exactly as entered. Anything that does not parse sorts as
//! the epoch and yields `N/A` where a year is shown.

use chrono::{DateTime, Datelike, NaiveDate};

pub const NOT_AVAILABLE: &str = "N/A";

/// Parses `YYYY-MM-DD`, or a full RFC 3339 timestamp (date part only).
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.date_naive()))
}

/// Sort key for "newest first" ordering. Malformed dates count as epoch zero.
pub fn sort_key(raw: &str) -> i64 {
    parse_date(raw)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc().timestamp())
        .unwrap_or(0)
}

/// Calendar year used by the wall's year filter.
pub fn calendar_year(raw: &str) -> Option<i32> {
    parse_date(raw).map(|d| d.year())
}

/// Academic year label. January to May belong to the year that started the
/// previous June: `2024-03-15` is `2023-2024`, `2024-07-01` is `2024-2025`.
pub fn academic_year(raw: &str) -> String {
    match parse_date(raw) {
        Some(date) if date.month() <= 5 => format!("{}-{}", date.year() - 1, date.year()),
        Some(date) => format!("{}-{}", date.year(), date.year() + 1),
        None => NOT_AVAILABLE.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_academic_year_boundaries() {
        assert_eq!(academic_year("2024-03-15"), "2023-2024");
        assert_eq!(academic_year("2024-07-01"), "2024-2025");
        assert_eq!(academic_year("2024-05-31"), "2023-2024");
        assert_eq!(academic_year("2024-06-01"), "2024-2025");
        assert_eq!(academic_year("2024-01-01"), "2023-2024");
        assert_eq!(academic_year("2024-12-31"), "2024-2025");
    }

    #[test]
    fn test_malformed_dates() {
        assert_eq!(academic_year("sometime in spring"), NOT_AVAILABLE);
        assert_eq!(academic_year(""), NOT_AVAILABLE);
        assert_eq!(sort_key("31/12/2024"), 0);
        assert_eq!(calendar_year("tbd"), None);
    }

    #[test]
    fn test_rfc3339_is_accepted() {
        assert_eq!(calendar_year("2023-11-02T10:00:00Z"), Some(2023));
        assert_eq!(academic_year("2023-11-02T10:00:00+05:30"), "2023-2024");
    }

    #[test]
    fn test_sort_key_orders_by_date() {
        assert!(sort_key("2024-02-01") > sort_key("2024-01-31"));
        assert!(sort_key("1999-01-01") > sort_key("garbage"));
    }
}
