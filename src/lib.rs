//! Temporal engine for scheduling applications.
//!
//! Keeps the start, end and duration of scheduled items consistent,
//! expands recurring series, and measures time in working-time
//! calendars. The same core serves Gantt charts, event calendars and
//! shift planners.
//!
//! # Modules
//!
//! - **`time`**: Units, time zones and date formats
//! - **`models`**: Time spans and the start/end/duration derivation rules
//! - **`recurrence`**: Recurrence rules, exceptions and occurrence expansion
//! - **`calendar`**: Working-time calendars with hierarchy and priorities
//! - **`engine`**: Records, invalidation and batched commits
//! - **`config`**: Project and calendar configuration
//! - **`validation`**: Calendar definition checks
//!
//! # References
//!
//! - RFC 5545, "Internet Calendaring and Scheduling Core Object Specification"
//! - IEEE Std 1003.1, crontab field syntax

pub mod calendar;
pub mod config;
pub mod engine;
pub mod error;
pub mod models;
pub mod recurrence;
pub mod time;
pub mod validation;
