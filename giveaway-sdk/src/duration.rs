//! Operator duration syntax.
//!
//! Durations are written as a run of `<number><unit>` pairs, for example
//! `90s`, `15m`, `1h`, `1d12h` or `2w 3d`. Supported units are `s`, `m`, `h`,
//! `d` and `w`. A bare number is read as seconds.

use std::time::Duration;

/// Errors returned by [`parse_duration`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DurationParseError {
    #[error("duration is empty")]
    Empty,
    #[error("unknown duration unit '{0}'")]
    UnknownUnit(char),
    #[error("expected a number before '{0}'")]
    MissingNumber(char),
    #[error("duration is too large")]
    Overflow,
    #[error("duration must be greater than zero")]
    Zero,
}

fn unit_seconds(unit: char) -> Option<u64> {
    match unit.to_ascii_lowercase() {
        's' => Some(1),
        'm' => Some(60),
        'h' => Some(60 * 60),
        'd' => Some(24 * 60 * 60),
        'w' => Some(7 * 24 * 60 * 60),
        _ => None,
    }
}

/// Parse an operator duration such as `1d12h` into a [`Duration`].
pub fn parse_duration(input: &str) -> Result<Duration, DurationParseError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(DurationParseError::Empty);
    }

    let mut total: u64 = 0;
    let mut number: Option<u64> = None;

    for c in input.chars() {
        if c.is_whitespace() {
            continue;
        }
        if let Some(digit) = c.to_digit(10) {
            let current = number.unwrap_or(0);
            number = Some(
                current
                    .checked_mul(10)
                    .and_then(|n| n.checked_add(u64::from(digit)))
                    .ok_or(DurationParseError::Overflow)?,
            );
            continue;
        }
        let multiplier = unit_seconds(c).ok_or(DurationParseError::UnknownUnit(c))?;
        let value = number.take().ok_or(DurationParseError::MissingNumber(c))?;
        total = value
            .checked_mul(multiplier)
            .and_then(|secs| total.checked_add(secs))
            .ok_or(DurationParseError::Overflow)?;
    }

    // Trailing number without a unit counts as seconds.
    if let Some(value) = number {
        total = total
            .checked_add(value)
            .ok_or(DurationParseError::Overflow)?;
    }

    if total == 0 {
        return Err(DurationParseError::Zero);
    }
    Ok(Duration::from_secs(total))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_units() {
        assert_eq!(parse_duration("90s"), Ok(Duration::from_secs(90)));
        assert_eq!(parse_duration("15m"), Ok(Duration::from_secs(900)));
        assert_eq!(parse_duration("1h"), Ok(Duration::from_secs(3600)));
        assert_eq!(parse_duration("1d"), Ok(Duration::from_secs(86_400)));
        assert_eq!(parse_duration("2w"), Ok(Duration::from_secs(1_209_600)));
    }

    #[test]
    fn test_compound_and_whitespace() {
        assert_eq!(parse_duration("1d12h"), Ok(Duration::from_secs(129_600)));
        assert_eq!(parse_duration(" 1h 30m "), Ok(Duration::from_secs(5400)));
        assert_eq!(parse_duration("1H30M"), Ok(Duration::from_secs(5400)));
    }

    #[test]
    fn test_bare_number_is_seconds() {
        assert_eq!(parse_duration("45"), Ok(Duration::from_secs(45)));
        assert_eq!(parse_duration("1m30"), Ok(Duration::from_secs(90)));
    }

    #[test]
    fn test_rejects_invalid_input() {
        assert_eq!(parse_duration(""), Err(DurationParseError::Empty));
        assert_eq!(parse_duration("   "), Err(DurationParseError::Empty));
        assert_eq!(parse_duration("1y"), Err(DurationParseError::UnknownUnit('y')));
        assert_eq!(parse_duration("h"), Err(DurationParseError::MissingNumber('h')));
        assert_eq!(parse_duration("0h"), Err(DurationParseError::Zero));
        assert_eq!(
            parse_duration("99999999999999999999w"),
            Err(DurationParseError::Overflow)
        );
    }
}
