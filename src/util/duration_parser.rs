//! Duration parser for timeout settings.
//!
//! Supported formats:
//! - Plain seconds: `30`
//! - Milliseconds: `500ms`
//! - Seconds, minutes, hours: `10s`, `2m`, `1h`

use std::time::Duration;

/// Error type for duration parsing failures.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("failed to parse duration '{input}': {message}")]
pub struct DurationParseError {
    pub input: String,
    pub message: String,
}

/// Parses a duration string.
///
/// | Format | Example | Description |
/// |--------|---------|-------------|
/// | Seconds | `30` | Bare number of seconds |
/// | Milliseconds | `500ms` | |
/// | Unit suffix | `10s`, `2m`, `1h` | Seconds, minutes, hours |
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use mongolat::util::parse_duration;
///
/// assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
/// assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
/// ```
pub fn parse_duration(input: &str) -> Result<Duration, DurationParseError> {
    let input = input.trim();

    if let Some(duration) = try_parse_seconds(input) {
        return Ok(duration);
    }

    if let Some(duration) = try_parse_with_unit(input) {
        return Ok(duration);
    }

    Err(DurationParseError {
        input: input.to_string(),
        message: "Unrecognized format. Use: seconds (30), milliseconds (500ms), \
                  or a unit suffix (10s, 2m, 1h)"
            .to_string(),
    })
}

/// Bare integer seconds.
fn try_parse_seconds(input: &str) -> Option<Duration> {
    if !input.is_empty() && input.chars().all(|c| c.is_ascii_digit()) {
        input.parse::<u64>().ok().map(Duration::from_secs)
    } else {
        None
    }
}

fn try_parse_with_unit(input: &str) -> Option<Duration> {
    // "ms" must be checked before the single-letter units.
    if let Some(number) = input.strip_suffix("ms") {
        return parse_number(number).map(Duration::from_millis);
    }

    let unit = input.chars().last()?;
    let number = parse_number(&input[..input.len() - unit.len_utf8()])?;

    let seconds = match unit {
        's' => number,
        'm' => number.checked_mul(60)?,
        'h' => number.checked_mul(3600)?,
        _ => return None,
    };

    Some(Duration::from_secs(seconds))
}

fn parse_number(number: &str) -> Option<u64> {
    let number = number.trim();
    if number.is_empty() || !number.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    number.parse().ok()
}
