//! Duration units and unit conversion.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;

/// Unit in which a time span's `duration` is expressed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    /// Milliseconds.
    Millisecond,
    /// Seconds.
    Second,
    /// Minutes.
    Minute,
    /// Hours.
    Hour,
    /// Days (length given by `hours_per_day`).
    #[default]
    Day,
    /// Weeks (length given by `days_per_week`).
    Week,
    /// Months (length given by `days_per_month`).
    Month,
    /// Three months.
    Quarter,
    /// Twelve months.
    Year,
}

impl TimeUnit {
    /// Canonical lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            TimeUnit::Millisecond => "millisecond",
            TimeUnit::Second => "second",
            TimeUnit::Minute => "minute",
            TimeUnit::Hour => "hour",
            TimeUnit::Day => "day",
            TimeUnit::Week => "week",
            TimeUnit::Month => "month",
            TimeUnit::Quarter => "quarter",
            TimeUnit::Year => "year",
        }
    }
}

impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimeUnit {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unit = match s.trim().to_ascii_lowercase().as_str() {
            "ms" | "millisecond" | "milliseconds" => TimeUnit::Millisecond,
            "s" | "second" | "seconds" => TimeUnit::Second,
            "mi" | "min" | "minute" | "minutes" => TimeUnit::Minute,
            "h" | "hour" | "hours" => TimeUnit::Hour,
            "d" | "day" | "days" => TimeUnit::Day,
            "w" | "week" | "weeks" => TimeUnit::Week,
            "mo" | "month" | "months" => TimeUnit::Month,
            "q" | "quarter" | "quarters" => TimeUnit::Quarter,
            "y" | "year" | "years" => TimeUnit::Year,
            other => return Err(ConfigError::Invalid(format!("unknown time unit '{other}'"))),
        };
        Ok(unit)
    }
}

/// Converts durations between units and milliseconds.
///
/// Day, week and month lengths are configurable so that a "day" of work
/// can mean 8 hours on a working-time calendar. Quarter = 3 months,
/// year = 12 months.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DurationConverter {
    /// Hours in one day.
    pub hours_per_day: f64,
    /// Days in one week.
    pub days_per_week: f64,
    /// Days in one month.
    pub days_per_month: f64,
}

impl Default for DurationConverter {
    fn default() -> Self {
        Self {
            hours_per_day: 24.0,
            days_per_week: 7.0,
            days_per_month: 30.0,
        }
    }
}

impl DurationConverter {
    /// Creates a converter with custom day/week/month lengths.
    pub fn new(hours_per_day: f64, days_per_week: f64, days_per_month: f64) -> Self {
        Self {
            hours_per_day,
            days_per_week,
            days_per_month,
        }
    }

    /// Length of one `unit` in milliseconds.
    pub fn unit_ms(&self, unit: TimeUnit) -> f64 {
        let day = self.hours_per_day * 3_600_000.0;
        match unit {
            TimeUnit::Millisecond => 1.0,
            TimeUnit::Second => 1_000.0,
            TimeUnit::Minute => 60_000.0,
            TimeUnit::Hour => 3_600_000.0,
            TimeUnit::Day => day,
            TimeUnit::Week => day * self.days_per_week,
            TimeUnit::Month => day * self.days_per_month,
            TimeUnit::Quarter => day * self.days_per_month * 3.0,
            TimeUnit::Year => day * self.days_per_month * 12.0,
        }
    }

    /// Converts `value` expressed in `unit` to whole milliseconds.
    pub fn to_ms(&self, value: f64, unit: TimeUnit) -> i64 {
        (value * self.unit_ms(unit)).round() as i64
    }

    /// Converts milliseconds to a value expressed in `unit`.
    pub fn from_ms(&self, ms: i64, unit: TimeUnit) -> f64 {
        ms as f64 / self.unit_ms(unit)
    }
}
