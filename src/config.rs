//! Project configuration.
//!
//! All settings have defaults, so an empty JSON object is a valid
//! configuration:
//!
//! ```json
//! {
//!   "timezone": "Europe/Berlin",
//!   "adjust_duration_to_dst": true,
//!   "hours_per_day": 8,
//!   "calendars": [
//!     { "id": "office", "unspecified_time_is_working": false, "intervals": [
//!       { "name": "hours", "is_working": true,
//!         "recurrent_start_date": "0 9 * * MON-FRI", "recurrent_end_date": "0 17 * * *" }
//!     ] },
//!     { "id": "berlin", "parent": "office", "intervals": [
//!       { "name": "xmas", "start_date": "2024-12-25T00:00:00", "end_date": "2024-12-26T00:00:00" }
//!     ] }
//!   ]
//! }
//! ```

use chrono::{NaiveDateTime, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::rc::Rc;

use crate::calendar::{CalendarId, CalendarInterval, CalendarStore, CronSchedule, EndSchedule};
use crate::error::ConfigError;
use crate::time::{DurationConverter, TimeZoneModel};
use crate::validation::validate_calendars;

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    /// Treat durations as wall-clock lengths across DST changes.
    pub adjust_duration_to_dst: bool,
    /// Write the first commit back without change notifications.
    pub silent_initial_commit: bool,
    /// Delay between the first invalidation and the scheduled commit.
    pub commit_delay_ms: u64,
    /// IANA zone name; `None` = floating time.
    pub timezone: Option<String>,
    /// First day of the week for weekly recurrence.
    pub week_start_day: Weekday,
    /// Unit conversion.
    pub hours_per_day: f64,
    pub days_per_week: f64,
    pub days_per_month: f64,
    /// Calendar cache tuning.
    pub calendar: CalendarConfig,
    /// Declarative calendars.
    pub calendars: Vec<CalendarDefinition>,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            adjust_duration_to_dst: false,
            silent_initial_commit: true,
            commit_delay_ms: 10,
            timezone: None,
            week_start_day: Weekday::Mon,
            hours_per_day: 24.0,
            days_per_week: 7.0,
            days_per_month: 30.0,
            calendar: CalendarConfig::default(),
            calendars: Vec::new(),
        }
    }
}

impl ProjectConfig {
    /// Parse configuration from a JSON string.
    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        let config: ProjectConfig = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the settings (calendars are checked when built).
    fn validate(&self) -> Result<(), ConfigError> {
        self.time_zone()?;
        for (name, value) in [
            ("hours_per_day", self.hours_per_day),
            ("days_per_week", self.days_per_week),
            ("days_per_month", self.days_per_month),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::Invalid(format!("{name} must be > 0")));
            }
        }
        if self.calendar.chunk_days == 0 {
            return Err(ConfigError::Invalid("calendar.chunk_days must be > 0".to_string()));
        }
        if self.calendar.max_range_days == 0 {
            return Err(ConfigError::Invalid("calendar.max_range_days must be > 0".to_string()));
        }
        Ok(())
    }

    /// The configured zone.
    pub fn time_zone(&self) -> Result<TimeZoneModel, ConfigError> {
        match &self.timezone {
            Some(name) => TimeZoneModel::named(name),
            None => Ok(TimeZoneModel::floating()),
        }
    }

    /// Unit converter for the configured work week.
    pub fn converter(&self) -> DurationConverter {
        DurationConverter::new(self.hours_per_day, self.days_per_week, self.days_per_month)
    }

    /// Validates the calendar definitions and loads them into a store.
    ///
    /// Returns the store and the mapping from definition id to calendar.
    pub fn build_calendars(&self) -> Result<(CalendarStore, HashMap<String, CalendarId>), ConfigError> {
        validate_calendars(&self.calendars).map_err(|errors| {
            let messages: Vec<String> = errors.into_iter().map(|e| e.message).collect();
            ConfigError::Validation(messages.join("; "))
        })?;

        let mut store = CalendarStore::new(self.calendar.clone())
            .with_zone(self.time_zone()?)
            .with_dst_adjustment(self.adjust_duration_to_dst);
        let mut ids: HashMap<String, CalendarId> = HashMap::new();

        // Parents before children; validation rules out cycles and
        // unknown parents, so every round adds at least one calendar.
        while ids.len() < self.calendars.len() {
            let before = ids.len();
            for definition in &self.calendars {
                if ids.contains_key(&definition.id) {
                    continue;
                }
                let parent = match &definition.parent {
                    Some(parent) => match ids.get(parent) {
                        Some(id) => Some(*id),
                        None => continue,
                    },
                    None => None,
                };
                let id = store
                    .add_calendar(definition.name.as_deref().unwrap_or(&definition.id), parent)
                    .map_err(|e| ConfigError::Invalid(e.to_string()))?;
                store
                    .set_unspecified_time_is_working(id, definition.unspecified_time_is_working)
                    .map_err(|e| ConfigError::Invalid(e.to_string()))?;
                for interval in &definition.intervals {
                    if let Some(interval) = interval.to_interval() {
                        store
                            .add_interval(id, interval)
                            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
                    }
                }
                ids.insert(definition.id.clone(), id);
            }
            if ids.len() == before {
                return Err(ConfigError::Validation("calendar hierarchy cannot be resolved".to_string()));
            }
        }
        tracing::debug!(calendars = ids.len(), "loaded calendars");
        Ok((store, ids))
    }
}

/// Calendar cache tuning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CalendarConfig {
    /// Cache fill chunk.
    pub chunk_days: u32,
    /// Longest availability walk without an explicit end (5 years).
    pub max_range_days: u32,
    /// Most cache extensions a single walk may trigger.
    pub max_cache_extend_cycles: u32,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            chunk_days: 30,
            max_range_days: 1826,
            max_cache_extend_cycles: 1000,
        }
    }
}

/// A calendar definition.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CalendarDefinition {
    /// Unique id, referenced by `parent`.
    pub id: String,
    /// Display name (defaults to the id).
    pub name: Option<String>,
    /// Parent calendar id.
    pub parent: Option<String>,
    /// Status of time no interval covers; `None` inherits.
    pub unspecified_time_is_working: Option<bool>,
    pub intervals: Vec<IntervalDefinition>,
}

impl CalendarDefinition {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn with_unspecified_time_is_working(mut self, value: bool) -> Self {
        self.unspecified_time_is_working = Some(value);
        self
    }

    pub fn with_interval(mut self, interval: IntervalDefinition) -> Self {
        self.intervals.push(interval);
        self
    }
}

/// An interval definition: either static (`start_date`/`end_date`) or
/// recurrent (`recurrent_start_date`/`recurrent_end_date` schedules).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IntervalDefinition {
    pub name: String,
    pub is_working: bool,
    pub priority: Option<i32>,
    pub start_date: Option<NaiveDateTime>,
    pub end_date: Option<NaiveDateTime>,
    /// Cron expression of interval starts.
    pub recurrent_start_date: Option<String>,
    /// Cron expression of interval ends, or `"EOD"`.
    pub recurrent_end_date: Option<String>,
}

impl IntervalDefinition {
    /// A static interval.
    pub fn fixed(name: impl Into<String>, start: Option<NaiveDateTime>, end: Option<NaiveDateTime>) -> Self {
        Self {
            name: name.into(),
            start_date: start,
            end_date: end,
            ..Self::default()
        }
    }

    /// A recurrent interval.
    pub fn recurrent(name: impl Into<String>, start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            recurrent_start_date: Some(start.into()),
            recurrent_end_date: Some(end.into()),
            ..Self::default()
        }
    }

    pub fn working(mut self, is_working: bool) -> Self {
        self.is_working = is_working;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn is_recurrent(&self) -> bool {
        self.recurrent_start_date.is_some() || self.recurrent_end_date.is_some()
    }

    /// Builds the interval; `None` (with a warning) when a schedule does
    /// not parse.
    pub fn to_interval(&self) -> Option<CalendarInterval> {
        let mut interval = if self.is_recurrent() {
            let start = self.recurrent_start_date.as_deref().unwrap_or_default();
            let end = self.recurrent_end_date.as_deref().unwrap_or_default();
            let parsed = start
                .parse::<CronSchedule>()
                .and_then(|start| Ok((start, EndSchedule::parse(end)?)));
            match parsed {
                Ok((start, end)) => CalendarInterval::recurrent(&self.name, Rc::new(start), end, self.is_working),
                Err(error) => {
                    tracing::warn!(interval = %self.name, %error, "dropping interval with unparsable schedule");
                    return None;
                }
            }
        } else {
            CalendarInterval::fixed(&self.name, self.start_date, self.end_date, self.is_working)
        };
        interval.priority = self.priority;
        Some(interval)
    }
}
