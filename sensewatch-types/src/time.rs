//! Millisecond timestamps and period parsing.
//!
//! All scheduling inside sensewatch works on plain millisecond counts: wake
//! keys are absolute Unix timestamps, periods and durations are spans.

use std::time::{SystemTime, UNIX_EPOCH};

/// Absolute time in milliseconds since the Unix epoch.
pub type Timestamp = u64;

/// A span of time in milliseconds.
pub type Millis = u64;

/// Suffix to milliseconds multiplier (longer suffixes first).
const UNITS: &[(&str, f64)] = &[
    ("ms", 1.0),
    ("s", 1_000.0),
    ("m", 60_000.0),
    ("h", 3_600_000.0),
];

/// Current wall-clock time in milliseconds.
pub fn current_timestamp_ms() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Parse period strings like "500ms", "1.5s", "2m" or a bare millisecond count.
///
/// Returns `None` for anything else, including negative values.
pub fn parse_millis(s: &str) -> Option<Millis> {
    let s = s.trim();
    if let Ok(ms) = s.parse::<u64>() {
        return Some(ms);
    }

    for (suffix, multiplier) in UNITS {
        if let Some(val_str) = s.strip_suffix(suffix) {
            let val: f64 = val_str.trim().parse().ok()?;
            if !val.is_finite() || val < 0.0 {
                return None;
            }
            return Some((val * multiplier) as u64);
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_units() {
        assert_eq!(parse_millis("500ms"), Some(500));
        assert_eq!(parse_millis("1.5s"), Some(1_500));
        assert_eq!(parse_millis("2m"), Some(120_000));
        assert_eq!(parse_millis("1h"), Some(3_600_000));
        assert_eq!(parse_millis("250"), Some(250));
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(parse_millis("soon"), None);
        assert_eq!(parse_millis("-1s"), None);
        assert_eq!(parse_millis(""), None);
    }

    #[test]
    fn clock_is_after_2020() {
        assert!(current_timestamp_ms() > 1_577_836_800_000);
    }
}
