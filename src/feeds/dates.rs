//! Publication date normalization.
//!
//! Feeds publish dates in many shapes: RFC 822 with numeric or named zones,
//! ISO 8601 with or without offsets and fractions, bare dates. Everything is
//! converted to `DateTime<Utc>`. Inputs without zone information are taken as
//! UTC, never as local time.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

/// Leading day name such as `Thu, ` or `Thursday,`.
static WEEKDAY_PREFIX: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"^[A-Za-z]+,\s*").ok());

/// How a fallback layout should be interpreted.
#[derive(Debug, Clone, Copy)]
enum Layout {
    /// Layout carries an offset (`%z`).
    Zoned(&'static str),
    /// Layout has no offset, or a zone name chrono can only skip; assumed UTC.
    Naive(&'static str),
    /// Date without a time of day; midnight UTC.
    DateOnly(&'static str),
}

/// Fallback layouts, tried in order after RFC 2822 and RFC 3339.
const LAYOUTS: &[Layout] = &[
    Layout::Zoned("%Y-%m-%dT%H:%M:%S%z"),
    Layout::Zoned("%Y-%m-%dT%H:%M:%S%.f%z"),
    Layout::Naive("%Y-%m-%dT%H:%M:%SZ"),
    Layout::Naive("%Y-%m-%dT%H:%M:%S%.fZ"),
    Layout::Naive("%Y-%m-%dT%H:%M:%S"),
    Layout::Naive("%Y-%m-%dT%H:%M:%S%.f"),
    Layout::Zoned("%a, %d %b %Y %H:%M:%S %z"),
    Layout::Zoned("%d %b %Y %H:%M:%S %z"),
    Layout::Naive("%a, %d %b %Y %H:%M:%S %Z"),
    Layout::Naive("%a, %d %b %Y %H:%M:%S"),
    Layout::Naive("%a, %d %b %Y %H:%M %Z"),
    Layout::Naive("%d %b %Y %H:%M:%S %Z"),
    Layout::Naive("%d %b %Y %H:%M:%S"),
    Layout::Naive("%d %b %Y %H:%M %Z"),
    Layout::Naive("%Y-%m-%d %H:%M:%S"),
    Layout::DateOnly("%Y-%m-%d"),
];

/// Parse a feed date into a UTC timestamp.
///
/// RFC 2822 and RFC 3339 are tried first, then the fallback layouts. When
/// nothing matches and the text starts with a day name, the day name is
/// dropped and everything is tried again, so `Mon, 22 May 2025 ...` (wrong
/// weekday) and `Thursday, 22 May 2025 ...` still parse.
///
/// # Arguments
///
/// * `text` - Raw date text from the feed; surrounding whitespace is ignored
///
/// # Returns
///
/// The instant in UTC, or `None` (with a warning logged) when no known layout
/// matches. Inputs without zone information are read as UTC.
///
/// # Examples
///
/// ```ignore
/// let dt = parse_date("Thu, 22 May 2025 10:00:00 -0300").unwrap();
/// assert_eq!(dt.to_rfc3339(), "2025-05-22T13:00:00+00:00");
/// assert_eq!(parse_date("yesterday"), None);
/// ```
pub fn parse_date(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if text.is_empty() {
        debug!("Empty date string");
        return None;
    }

    if let Some(parsed) = parse_with_layouts(text) {
        return Some(parsed);
    }

    let without_weekday = WEEKDAY_PREFIX
        .as_ref()
        .and_then(|re| re.find(text))
        .map(|m| &text[m.end()..]);
    if let Some(rest) = without_weekday {
        if let Some(parsed) = parse_with_layouts(rest) {
            debug!(date = %text, "Parsed date after dropping the day name");
            return Some(parsed);
        }
    }

    warn!(date = %text, "Could not parse date");
    None
}

fn parse_with_layouts(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc2822(text) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }

    for layout in LAYOUTS {
        let parsed = match *layout {
            Layout::Zoned(fmt) => DateTime::parse_from_str(text, fmt)
                .ok()
                .map(|dt| dt.with_timezone(&Utc)),
            Layout::Naive(fmt) => NaiveDateTime::parse_from_str(text, fmt)
                .ok()
                .map(|naive| naive.and_utc()),
            Layout::DateOnly(fmt) => NaiveDate::parse_from_str(text, fmt)
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
                .map(|naive| naive.and_utc()),
        };
        if parsed.is_some() {
            debug!(date = %text, ?layout, "Parsed date with fallback layout");
            return parsed;
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, m: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, mi, s).unwrap()
    }

    #[test]
    fn test_rfc822_numeric_offset_converted_to_utc() {
        assert_eq!(
            parse_date("Thu, 22 May 2025 10:00:00 -0300"),
            Some(utc(2025, 5, 22, 13, 0, 0))
        );
    }

    #[test]
    fn test_rfc822_named_zone() {
        assert_eq!(
            parse_date("Thu, 22 May 2025 10:00:00 GMT"),
            Some(utc(2025, 5, 22, 10, 0, 0))
        );
    }

    #[test]
    fn test_rfc822_without_zone_assumed_utc() {
        assert_eq!(
            parse_date("Thu, 22 May 2025 10:00:00"),
            Some(utc(2025, 5, 22, 10, 0, 0))
        );
    }

    #[test]
    fn test_wrong_or_long_day_name_is_ignored() {
        let expected = Some(utc(2025, 5, 22, 10, 0, 0));
        assert_eq!(parse_date("Mon, 22 May 2025 10:00:00 GMT"), expected);
        assert_eq!(parse_date("Thursday, 22 May 2025 10:00:00 GMT"), expected);
        assert_eq!(parse_date("Thursday, 22 May 2025 10:00:00"), expected);
        assert_eq!(parse_date("Fri, 22 May 2025 12:00:00 +0200"), expected);
        assert_eq!(parse_date("Sun,22 May 2025 10:00 GMT"), expected);
    }

    #[test]
    fn test_iso8601_variants() {
        let expected = Some(utc(2025, 5, 22, 10, 0, 0));
        assert_eq!(parse_date("2025-05-22T10:00:00Z"), expected);
        assert_eq!(parse_date("2025-05-22T10:00:00.123Z").map(|d| d.timestamp()), expected.map(|d| d.timestamp()));
        assert_eq!(parse_date("2025-05-22T12:00:00+02:00"), expected);
        assert_eq!(parse_date("2025-05-22T12:00:00+0200"), expected);
        assert_eq!(parse_date("2025-05-22T10:00:00"), expected);
    }

    #[test]
    fn test_space_separated_and_date_only() {
        assert_eq!(
            parse_date("2025-05-22 10:00:00"),
            Some(utc(2025, 5, 22, 10, 0, 0))
        );
        assert_eq!(parse_date("2025-05-22"), Some(utc(2025, 5, 22, 0, 0, 0)));
    }

    #[test]
    fn test_surrounding_whitespace_is_ignored() {
        assert_eq!(
            parse_date("\n   2025-05-22T10:00:00Z  \n"),
            Some(utc(2025, 5, 22, 10, 0, 0))
        );
    }

    #[test]
    fn test_unparseable_returns_none() {
        assert_eq!(parse_date(""), None);
        assert_eq!(parse_date("yesterday afternoon"), None);
        assert_eq!(parse_date("2025-13-45"), None);
    }

    #[test]
    fn test_round_trip_for_supported_layouts() {
        let timestamps = [
            utc(2024, 2, 29, 23, 59, 59),
            utc(2025, 1, 1, 0, 0, 0),
            utc(2025, 10, 19, 7, 30, 15),
        ];
        let layouts = [
            "%a, %d %b %Y %H:%M:%S %z",
            "%a, %d %b %Y %H:%M:%S GMT",
            "%a, %d %b %Y %H:%M:%S",
            "%d %b %Y %H:%M:%S %z",
            "%Y-%m-%dT%H:%M:%SZ",
            "%Y-%m-%dT%H:%M:%S%.3fZ",
            "%Y-%m-%dT%H:%M:%S%:z",
            "%Y-%m-%dT%H:%M:%S%z",
            "%Y-%m-%dT%H:%M:%S",
            "%Y-%m-%d %H:%M:%S",
        ];

        for ts in timestamps {
            for layout in layouts {
                let text = ts.format(layout).to_string();
                assert_eq!(parse_date(&text), Some(ts), "layout {layout} text {text}");
            }
        }
    }
}
