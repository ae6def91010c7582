//! ICS file generation and parsing.
//!
//! This module reads and writes VCALENDAR documents holding one event group
//! according to RFC 5545.

mod generate;
mod parse;

pub use generate::generate_ics;
pub use parse::parse_events;

/// Format a trigger offset as an RFC 5545 duration, e.g. `-PT15M` or `P1D`.
pub(crate) fn format_duration(seconds: i64) -> String {
    if seconds == 0 {
        return "PT0S".to_string();
    }
    let sign = if seconds < 0 { "-" } else { "" };
    let mut rest = seconds.unsigned_abs();
    let days = rest / 86_400;
    rest %= 86_400;
    let hours = rest / 3600;
    rest %= 3600;
    let minutes = rest / 60;
    let secs = rest % 60;

    let mut out = format!("{sign}P");
    if days > 0 {
        out.push_str(&format!("{days}D"));
    }
    if hours > 0 || minutes > 0 || secs > 0 {
        out.push('T');
        if hours > 0 {
            out.push_str(&format!("{hours}H"));
        }
        if minutes > 0 {
            out.push_str(&format!("{minutes}M"));
        }
        if secs > 0 {
            out.push_str(&format!("{secs}S"));
        }
    }
    out
}

/// Parse an RFC 5545 duration into signed seconds.
pub(crate) fn parse_duration(value: &str) -> Option<i64> {
    let value = value.trim();
    let (negative, rest) = match value.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, value.strip_prefix('+').unwrap_or(value)),
    };

    let duration = iso8601::duration(rest).ok()?;
    let std_duration: std::time::Duration = duration.into();
    let seconds = i64::try_from(std_duration.as_secs()).ok()?;

    Some(if negative { -seconds } else { seconds })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(-900), "-PT15M");
        assert_eq!(format_duration(-86_400), "-P1D");
        assert_eq!(format_duration(-90_000), "-P1DT1H");
        assert_eq!(format_duration(0), "PT0S");
        assert_eq!(format_duration(30), "PT30S");
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("-PT15M"), Some(-900));
        assert_eq!(parse_duration("PT1H"), Some(3600));
        assert_eq!(parse_duration("-P1D"), Some(-86_400));
        assert_eq!(parse_duration("-P1W"), Some(-604_800));
        assert_eq!(parse_duration("garbage"), None);
    }
}
