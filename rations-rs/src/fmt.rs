//! Provides parsing and formatting helpers for the durations used throughout the config.
use std::fmt::Write;
use std::time::Duration;

/// Parses a duration from a given string.
///
/// This string can have the following suffixes:
/// * **ms** or **MS**: treats the value as milliseconds
/// * **s** or **S**: treats the value as seconds
/// * **m** or **M**: treats the value as minutes
/// * **h** or **H**: treats the value as hours
/// * **d** or **D**: treats the value as days
///
/// A plain number without any suffix is treated as milliseconds.
///
/// Returns an **Err** if a non-integer value is given, if an unknown suffix was provided or if the
/// value overflows.
///
/// # Examples
///
/// ```
/// # use std::time::Duration;
/// assert_eq!(rations::fmt::parse_duration("500ms").unwrap(), Duration::from_millis(500));
/// assert_eq!(rations::fmt::parse_duration("15 s").unwrap(), Duration::from_secs(15));
/// assert_eq!(rations::fmt::parse_duration("30m").unwrap(), Duration::from_secs(30 * 60));
/// assert_eq!(rations::fmt::parse_duration("2 H").unwrap(), Duration::from_secs(2 * 60 * 60));
/// assert_eq!(rations::fmt::parse_duration("1d").unwrap(), Duration::from_secs(24 * 60 * 60));
///
/// // An invalid suffix results in an error...
/// assert_eq!(rations::fmt::parse_duration("3 w").is_err(), true);
///
/// // Decimal and negative numbers are rejected as well...
/// assert_eq!(rations::fmt::parse_duration("1.5m").is_err(), true);
/// assert_eq!(rations::fmt::parse_duration("-1s").is_err(), true);
///
/// // So are values which don't fit into a duration...
/// assert_eq!(rations::fmt::parse_duration("999999999999999d").is_err(), true);
/// ```
pub fn parse_duration(str: impl AsRef<str>) -> anyhow::Result<Duration> {
    lazy_static::lazy_static! {
        static ref NUMBER_AND_SUFFIX: regex::Regex =
            regex::Regex::new(r"^ *(\d+) *((ms|s|m|h|d|MS|S|M|H|D)?) *$").unwrap();
    }

    let captures = NUMBER_AND_SUFFIX.captures(str.as_ref()).ok_or_else(|| {
        anyhow::anyhow!(
            "Cannot parse '{}' into a duration expression. \
             Expected a positive number and optionally 'ms', 's', 'm', 'h' or 'd' as suffix.",
            str.as_ref()
        )
    })?;

    let number = captures[1]
        .parse::<u64>()
        .map_err(|error| anyhow::anyhow!("Invalid duration '{}': {}", str.as_ref(), error))?;

    let seconds_per_unit = match &captures[2] {
        "s" | "S" => 1,
        "m" | "M" => 60,
        "h" | "H" => 60 * 60,
        "d" | "D" => 60 * 60 * 24,
        _ => return Ok(Duration::from_millis(number)),
    };

    number
        .checked_mul(seconds_per_unit)
        .map(Duration::from_secs)
        .ok_or_else(|| anyhow::anyhow!("The duration '{}' is too large.", str.as_ref()))
}

/// Formats a duration into a string like "1h 30m 12s".
///
/// Units which are zero are skipped. A zero duration is rendered as "0ms" so that log lines
/// never contain an empty value.
///
/// # Examples
///
/// ```
/// # use std::time::Duration;
/// assert_eq!(rations::fmt::format_duration(Duration::from_millis(0)), "0ms");
/// assert_eq!(rations::fmt::format_duration(Duration::from_millis(250)), "250ms");
/// assert_eq!(rations::fmt::format_duration(Duration::from_millis(15_250)), "15s 250ms");
/// assert_eq!(rations::fmt::format_duration(Duration::from_secs(30 * 60)), "30m");
/// assert_eq!(rations::fmt::format_duration(Duration::from_secs(90 * 60 + 5)), "1h 30m 5s");
/// assert_eq!(rations::fmt::format_duration(Duration::from_secs(25 * 60 * 60)), "1d 1h");
/// ```
pub fn format_duration(duration: Duration) -> String {
    const UNITS: [(u128, &str); 5] = [
        (1000 * 60 * 60 * 24, "d"),
        (1000 * 60 * 60, "h"),
        (1000 * 60, "m"),
        (1000, "s"),
        (1, "ms"),
    ];

    let mut result = String::new();
    let mut value = duration.as_millis();

    for (millis_per_unit, suffix) in UNITS {
        let amount = value / millis_per_unit;
        if amount > 0 {
            if !result.is_empty() {
                result.push(' ');
            }
            let _ = write!(result, "{}{}", amount, suffix);
            value %= millis_per_unit;
        }
    }

    if result.is_empty() {
        result.push_str("0ms");
    }

    result
}
