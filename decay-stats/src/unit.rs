use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Display unit for a distribution. Samples are always recorded in
/// nanoseconds and scaled into the unit at read time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimeUnit {
    Nanoseconds,
    Microseconds,
    Milliseconds,
    #[default]
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl TimeUnit {
    /// Number of nanoseconds in one of this unit.
    pub const fn nanos(self) -> u64 {
        match self {
            TimeUnit::Nanoseconds => 1,
            TimeUnit::Microseconds => 1_000,
            TimeUnit::Milliseconds => 1_000_000,
            TimeUnit::Seconds => 1_000_000_000,
            TimeUnit::Minutes => 60 * 1_000_000_000,
            TimeUnit::Hours => 3_600 * 1_000_000_000,
            TimeUnit::Days => 86_400 * 1_000_000_000,
        }
    }

    /// Converts a raw nanosecond value into this unit. Undefined inputs
    /// (NaN, infinities) come back as NaN.
    pub fn convert(self, nanos: f64) -> f64 {
        if !nanos.is_finite() {
            return f64::NAN;
        }
        nanos / self.nanos() as f64
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            TimeUnit::Nanoseconds => "NANOSECONDS",
            TimeUnit::Microseconds => "MICROSECONDS",
            TimeUnit::Milliseconds => "MILLISECONDS",
            TimeUnit::Seconds => "SECONDS",
            TimeUnit::Minutes => "MINUTES",
            TimeUnit::Hours => "HOURS",
            TimeUnit::Days => "DAYS",
        }
    }
}

impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimeUnit {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unit = match s.trim().to_ascii_lowercase().as_str() {
            "ns" | "nanos" | "nanoseconds" => TimeUnit::Nanoseconds,
            "us" | "µs" | "micros" | "microseconds" => TimeUnit::Microseconds,
            "ms" | "millis" | "milliseconds" => TimeUnit::Milliseconds,
            "s" | "secs" | "seconds" => TimeUnit::Seconds,
            "m" | "min" | "minutes" => TimeUnit::Minutes,
            "h" | "hours" => TimeUnit::Hours,
            "d" | "days" => TimeUnit::Days,
            _ => {
                return Err(Error::invalid_argument("unknown time unit").with_context("unit", s));
            }
        };
        Ok(unit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_nanos() {
        assert_eq!(TimeUnit::Seconds.convert(2_500_000_000.0), 2.5);
        assert_eq!(TimeUnit::Milliseconds.convert(1_000_000.0), 1.0);
        assert_eq!(TimeUnit::Nanoseconds.convert(-7.0), -7.0);
        assert!(TimeUnit::Seconds.convert(f64::NAN).is_nan());
        assert!(TimeUnit::Seconds.convert(f64::INFINITY).is_nan());
    }

    #[test]
    fn parses_names_and_abbreviations() {
        assert_eq!("ms".parse::<TimeUnit>().unwrap(), TimeUnit::Milliseconds);
        assert_eq!("SECONDS".parse::<TimeUnit>().unwrap(), TimeUnit::Seconds);
        assert_eq!(" us ".parse::<TimeUnit>().unwrap(), TimeUnit::Microseconds);
        assert!("fortnights".parse::<TimeUnit>().is_err());
    }

    #[test]
    fn display_round_trips_through_parse() {
        for unit in [TimeUnit::Nanoseconds, TimeUnit::Hours, TimeUnit::Days] {
            assert_eq!(unit.to_string().parse::<TimeUnit>().unwrap(), unit);
        }
    }
}
