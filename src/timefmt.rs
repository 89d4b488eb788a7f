//! ISO-8601 timestamp helpers.
//!
//! Every writer in the crate formats timestamps through [`iso`], so stored
//! values compare correctly as plain strings (range and cutoff queries rely on
//! lexicographic order).

use chrono::{Duration, NaiveDateTime, SubsecRound, Utc};

use crate::error::{AppError, Result};

const ISO_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

pub fn iso(dt: NaiveDateTime) -> String {
    dt.format(ISO_FORMAT).to_string()
}

/// Truncated to the precision [`iso`] writes, so values survive a round trip.
pub fn now() -> NaiveDateTime {
    Utc::now().naive_utc().trunc_subsecs(6)
}

pub fn now_iso() -> String {
    iso(now())
}

/// Longest lookback honored, in either direction. Keeps the cutoff inside
/// four-digit years, where string order still matches time order.
pub const MAX_LOOKBACK_DAYS: i64 = 2_900_000;

/// Cutoff for "last N days" queries. Windows beyond [`MAX_LOOKBACK_DAYS`]
/// are clamped to it.
pub fn days_ago_iso(days: i64) -> String {
    let days = days.clamp(-MAX_LOOKBACK_DAYS, MAX_LOOKBACK_DAYS);
    iso(now() - Duration::days(days))
}

/// Accepts `YYYY-MM-DDTHH:MM:SS[.fraction]` and bare `YYYY-MM-DD`.
pub fn parse_iso(s: &str) -> Result<NaiveDateTime> {
    let trimmed = s.trim();
    if let Ok(dt) = trimmed.parse::<NaiveDateTime>() {
        return Ok(dt);
    }
    chrono::NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .ok_or_else(|| AppError::InvalidTimestamp(s.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formatted_timestamps_sort_chronologically() {
        let earlier = iso(now() - Duration::hours(3));
        let later = now_iso();
        assert!(earlier < later);
        assert_eq!(later.len(), "2026-01-01T00:00:00.000000".len());
    }

    #[test]
    fn parses_python_style_and_date_only() {
        let dt = parse_iso("2025-03-04T10:11:12.345678").expect("full timestamp");
        assert_eq!(iso(dt), "2025-03-04T10:11:12.345678");
        let dt = parse_iso("2025-03-04T10:11:12").expect("no fraction");
        assert_eq!(iso(dt), "2025-03-04T10:11:12.000000");
        let dt = parse_iso("2025-03-04").expect("date only");
        assert_eq!(iso(dt), "2025-03-04T00:00:00.000000");
    }

    #[test]
    fn huge_windows_clamp_instead_of_overflowing() {
        let oldest = days_ago_iso(i64::MAX);
        assert!(oldest.starts_with('-'), "{oldest}");
        assert!(oldest.as_str() < "0001-01-01");

        let newest = days_ago_iso(i64::MIN);
        assert!(newest.as_str() > now_iso().as_str());
        assert!(newest.as_str() < "9999-12-31T23:59:59.999999");
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            parse_iso("yesterday"),
            Err(AppError::InvalidTimestamp(_))
        ));
    }
}
