//! Error types.
//!
//! Hard failures only. Recoverable conditions met while deriving or
//! committing (inverted ranges, exhausted calendars, truncated
//! iteration) are reported as [`Diagnostic`](crate::engine::Diagnostic)s.

use thiserror::Error;

/// Failure to parse a recurrence rule string.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuleParseError {
    #[error("rule is missing FREQ")]
    MissingFrequency,

    #[error("malformed rule part '{0}'")]
    MalformedPart(String),

    #[error("invalid value '{value}' for {key}")]
    InvalidValue { key: String, value: String },

    #[error("COUNT and UNTIL are mutually exclusive")]
    CountWithUntil,
}

/// Failure to parse a recurring calendar schedule.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScheduleParseError {
    #[error("expected 5 cron fields, found {0}")]
    FieldCount(usize),

    #[error("invalid {field} field '{value}'")]
    InvalidField { field: &'static str, value: String },

    #[error("empty schedule")]
    Empty,
}

/// Configuration-related errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Invalid time zone: {0}")]
    InvalidTimeZone(String),

    #[error("Calendar validation failed: {0}")]
    Validation(String),
}

/// Errors raised by the invalidation engine's public API.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("unknown record {0}")]
    UnknownRecord(usize),

    #[error("unknown calendar {0}")]
    UnknownCalendar(usize),

    #[error("record {0} is not recurring")]
    NotRecurring(usize),

    #[error("calendar {calendar} has no interval {index}")]
    UnknownInterval { calendar: usize, index: usize },

    #[error("calendar {0} cannot be its own ancestor")]
    CalendarCycle(usize),

    #[error("project has been destroyed")]
    Destroyed,
}
