use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::TimestampError;

static LONG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b(\d{1,2}):([0-5]\d):([0-5]\d)\b").unwrap());
static SHORT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b(\d{1,3}):([0-5]\d)\b").unwrap());

/// Parse `M:SS`/`MM:SS` or `H:MM:SS` into whole seconds
pub fn parse(label: &str) -> Result<u64, TimestampError> {
    let parts: Vec<&str> = label.trim().split(':').collect();
    if !(2..=3).contains(&parts.len()) {
        return Err(TimestampError::Arity(label.to_string()));
    }

    let mut total = 0u64;
    for part in parts {
        let value: u64 = part.trim().parse().map_err(|_| TimestampError::NotANumber {
            label: label.to_string(),
            part: part.to_string(),
        })?;
        total = total
            .checked_mul(60)
            .and_then(|t| t.checked_add(value))
            .ok_or_else(|| TimestampError::Overflow(label.to_string()))?;
    }
    Ok(total)
}

/// Format whole seconds as `M:SS` below one hour, `H:MM:SS` from there on
pub fn format(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    if hours > 0 {
        format!("{hours}:{minutes:02}:{secs:02}")
    } else {
        format!("{minutes}:{secs:02}")
    }
}

/// Like [`format`], flooring fractional seconds. Negative and NaN input clamp to zero.
pub fn format_f64(seconds: f64) -> String {
    format(floor_seconds(seconds))
}

pub fn floor_seconds(seconds: f64) -> u64 {
    if seconds.is_finite() && seconds > 0.0 {
        seconds.floor() as u64
    } else {
        0
    }
}

/// A time pattern found inside free text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Found {
    pub label: String,
    pub seconds: u64,
    pub span: Range<usize>,
}

/// Find the first time pattern in `text`. `H:MM:SS` is tried before `M:SS`
/// so that `1:02:03` is never read as `1:02`.
pub fn find_in(text: &str) -> Option<Found> {
    for re in [&*LONG_RE, &*SHORT_RE] {
        if let Some(m) = re.find(text) {
            let label = m.as_str().to_string();
            if let Ok(seconds) = parse(&label) {
                return Some(Found {
                    label,
                    seconds,
                    span: m.range(),
                });
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minutes_seconds() {
        assert_eq!(parse("0:05").unwrap(), 5);
        assert_eq!(parse("12:34").unwrap(), 754);
    }

    #[test]
    fn test_parse_hours() {
        assert_eq!(parse("1:30:00").unwrap(), 5400);
        assert_eq!(parse("01:02:03").unwrap(), 3723);
    }

    #[test]
    fn test_parse_bad_arity() {
        assert_eq!(parse("42"), Err(TimestampError::Arity("42".to_string())));
        assert!(parse("1:2:3:4").is_err());
    }

    #[test]
    fn test_parse_not_a_number() {
        assert!(matches!(parse("1:xx"), Err(TimestampError::NotANumber { .. })));
        assert!(parse(":").is_err());
    }

    #[test]
    fn test_parse_overflow_is_error() {
        let label = "18446744073709551615:59:59";
        assert_eq!(parse(label), Err(TimestampError::Overflow(label.to_string())));
        assert!(matches!(parse("99999999999999999999:00"), Err(TimestampError::NotANumber { .. })));
    }

    #[test]
    fn test_format() {
        assert_eq!(format(0), "0:00");
        assert_eq!(format(5), "0:05");
        assert_eq!(format(90), "1:30");
        assert_eq!(format(3599), "59:59");
        assert_eq!(format(3600), "1:00:00");
        assert_eq!(format(5400), "1:30:00");
    }

    #[test]
    fn test_format_f64_floors() {
        assert_eq!(format_f64(65.99), "1:05");
        assert_eq!(format_f64(-3.0), "0:00");
        assert_eq!(format_f64(f64::NAN), "0:00");
    }

    #[test]
    fn test_round_trip() {
        for n in 0..=359_999u64 {
            assert_eq!(parse(&format(n)).unwrap(), n, "round trip failed for {n}");
        }
    }

    #[test]
    fn test_find_in_prefers_long_form() {
        let found = find_in("1:02:03 welcome back").unwrap();
        assert_eq!(found.label, "1:02:03");
        assert_eq!(found.seconds, 3723);
        assert_eq!(found.span, 0..7);
    }

    #[test]
    fn test_find_in_short_form() {
        let found = find_in("intro 0:05 hello").unwrap();
        assert_eq!(found.label, "0:05");
        assert_eq!(found.seconds, 5);
        assert_eq!(found.span, 6..10);
    }

    #[test]
    fn test_find_in_none() {
        assert!(find_in("no time here").is_none());
        assert!(find_in("ratio 3:1").is_none());
    }
}
