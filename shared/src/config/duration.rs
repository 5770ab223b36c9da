//! Human-readable duration parsing (`500ms`, `5s`, `1.5m`, `1h`).

use serde::{Deserialize, Deserializer};
use std::time::Duration;

/// Parses a duration made of a decimal number followed by a unit.
///
/// Supported units are `ms`, `s`, `m` and `h`.
///
/// # Errors
///
/// Returns a description of the problem if the input has no unit, an unknown
/// unit, or a number that is negative or not finite.
///
/// # Examples
///
/// ```
/// use shared::config::parse_duration;
/// use std::time::Duration;
///
/// assert_eq!(parse_duration("250ms"), Ok(Duration::from_millis(250)));
/// assert_eq!(parse_duration("1.5s"), Ok(Duration::from_millis(1500)));
/// ```
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let input = input.trim();
    let split = input
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .ok_or_else(|| format!("missing unit in duration '{input}'"))?;
    let (number, unit) = input.split_at(split);

    let number: f64 = number
        .parse()
        .map_err(|_| format!("invalid number in duration '{input}'"))?;
    if !number.is_finite() || number < 0.0 {
        return Err(format!("invalid duration '{input}'"));
    }

    let seconds = match unit {
        "ms" => number / 1000.0,
        "s" => number,
        "m" => number * 60.0,
        "h" => number * 3600.0,
        other => return Err(format!("unknown unit '{other}' in duration '{input}'")),
    };

    Duration::try_from_secs_f64(seconds).map_err(|e| format!("invalid duration '{input}': {e}"))
}

/// Deserializes a duration from either a string such as `"5s"` or a number of milliseconds.
pub(crate) fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Millis(u64),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Text(text) => parse_duration(&text).map_err(serde::de::Error::custom),
        Raw::Millis(ms) => Ok(Duration::from_millis(ms)),
    }
}
