//! TTL parsing.

use viborm_core::error::{Error, Result};

/// A TTL as supplied by the caller: a number of milliseconds or a
/// human-readable duration string.
#[derive(Debug, Clone, PartialEq)]
pub enum TtlSpec {
    Millis(u64),
    Text(String),
}

impl From<u64> for TtlSpec {
    fn from(ms: u64) -> Self {
        TtlSpec::Millis(ms)
    }
}

impl From<&str> for TtlSpec {
    fn from(text: &str) -> Self {
        TtlSpec::Text(text.to_string())
    }
}

impl TtlSpec {
    /// Resolves to integer milliseconds. Non-positive durations are errors.
    pub fn resolve(&self) -> Result<u64> {
        match self {
            TtlSpec::Millis(0) => Err(Error::InvalidTtl {
                input: "0".to_string(),
            }),
            TtlSpec::Millis(ms) => Ok(*ms),
            TtlSpec::Text(text) => parse_ttl(text),
        }
    }
}

/// Parses `"20 seconds"`, `"1 hour"`, `"2.5 h"`, `"150ms"` into
/// milliseconds.
pub fn parse_ttl(input: &str) -> Result<u64> {
    let trimmed = input.trim();
    let invalid = || Error::InvalidTtl {
        input: input.to_string(),
    };

    let split = trimmed
        .char_indices()
        .find(|(_, ch)| !ch.is_ascii_digit() && *ch != '.' && *ch != '-')
        .map(|(i, _)| i)
        .unwrap_or(trimmed.len());
    let (number, unit) = trimmed.split_at(split);
    let amount: f64 = number.parse().map_err(|_| invalid())?;

    let unit_ms = match unit.trim().to_ascii_lowercase().as_str() {
        "ms" | "millisecond" | "milliseconds" => 1.0,
        "" | "s" | "sec" | "secs" | "second" | "seconds" => 1_000.0,
        "m" | "min" | "mins" | "minute" | "minutes" => 60_000.0,
        "h" | "hr" | "hrs" | "hour" | "hours" => 3_600_000.0,
        "d" | "day" | "days" => 86_400_000.0,
        "w" | "week" | "weeks" => 604_800_000.0,
        _ => return Err(invalid()),
    };

    let ms = amount * unit_ms;
    if !ms.is_finite() || ms <= 0.0 {
        return Err(invalid());
    }
    Ok(ms as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_common_forms() {
        assert_eq!(parse_ttl("20 seconds").unwrap(), 20_000);
        assert_eq!(parse_ttl("1 hour").unwrap(), 3_600_000);
        assert_eq!(parse_ttl("2.5 h").unwrap(), 9_000_000);
        assert_eq!(parse_ttl("150ms").unwrap(), 150);
        assert_eq!(parse_ttl("45").unwrap(), 45_000);
    }

    #[test]
    fn rejects_non_positive_and_garbage() {
        assert!(parse_ttl("0 seconds").is_err());
        assert!(parse_ttl("-5 minutes").is_err());
        assert!(parse_ttl("soon").is_err());
        assert!(parse_ttl("10 fortnights").is_err());
    }
}
