//! Commit results, listeners and calendar-backed duration math.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use super::record::RecordId;
use crate::calendar::CalendarRef;
use crate::models::{DeriveIssue, DurationMath, FieldValue, MathError, SpanField, TimeSpanValue};
use crate::time::{DurationConverter, TimeUnit};

/// Category of a recoverable problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiagnosticKind {
    /// End before start; the duration was clamped to 0.
    InvalidTemporalRange,
    /// A negative duration was clamped to 0.
    NegativeDuration,
    /// Not enough working time within the calendar's search range.
    CalendarExhausted,
    /// A date fell outside the representable range.
    OutOfRange,
}

/// A recoverable problem met while deriving or committing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Record concerned, if any.
    pub record: Option<RecordId>,
    pub kind: DiagnosticKind,
    pub message: String,
}

impl Diagnostic {
    /// Diagnostic for a derivation issue of `record`.
    pub fn from_issue(record: RecordId, issue: &DeriveIssue) -> Self {
        let (kind, message) = match *issue {
            DeriveIssue::InvalidTemporalRange { start, end } => (
                DiagnosticKind::InvalidTemporalRange,
                format!("end {end} precedes start {start}; duration clamped to 0"),
            ),
            DeriveIssue::NegativeDuration(value) => (
                DiagnosticKind::NegativeDuration,
                format!("negative duration {value} clamped to 0"),
            ),
            DeriveIssue::Unresolved { field, cause } => (
                match cause {
                    MathError::CalendarExhausted => DiagnosticKind::CalendarExhausted,
                    MathError::OutOfRange => DiagnosticKind::OutOfRange,
                },
                format!("{} left unresolved", field.name()),
            ),
        };
        Self {
            record: Some(record),
            kind,
            message,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.record {
            Some(record) => write!(f, "record {record}: {:?}: {}", self.kind, self.message),
            None => write!(f, "{:?}: {}", self.kind, self.message),
        }
    }
}

/// One written field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    pub record: RecordId,
    pub field: SpanField,
    pub old_value: FieldValue,
    pub new_value: FieldValue,
}

/// Outcome of one commit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommitReport {
    /// Records whose derivation ran.
    pub calculated: usize,
    /// Records whose values changed on write-back.
    pub written: usize,
    /// Field changes (empty for a silent commit).
    pub changes: Vec<FieldChange>,
    pub diagnostics: Vec<Diagnostic>,
    /// The project was destroyed mid-commit.
    pub aborted: bool,
    /// Nothing ran because the project was already destroyed.
    pub skipped: bool,
    /// Written without change notifications.
    pub silent: bool,
}

/// Observer of the commit phases.
pub trait ChangeListener {
    /// Called after `record` has been derived, before write-back.
    /// Returns records affected by the new value; they are invalidated
    /// for the next commit, never the current one.
    fn derived(&mut self, record: RecordId, value: &TimeSpanValue) -> Vec<RecordId> {
        let _ = (record, value);
        Vec::new()
    }

    /// Called after a non-silent write-back, while auto-commit is still
    /// suspended. Returned records are invalidated once it resumes.
    fn changed(&mut self, changes: &[FieldChange]) -> Vec<RecordId> {
        let _ = changes;
        Vec::new()
    }
}

/// Shared destruction flag of a project.
///
/// Clones observe the same flag, so a listener holding one can end the
/// project while a commit is running.
#[derive(Debug, Clone, Default)]
pub struct DestroyHandle(Rc<Cell<bool>>);

impl DestroyHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn destroy(&self) {
        self.0.set(true);
    }

    pub fn is_destroyed(&self) -> bool {
        self.0.get()
    }
}

/// Duration math in a calendar's working time.
#[derive(Debug, Clone, Copy)]
pub struct CalendarMath<'a> {
    calendar: CalendarRef<'a>,
    converter: DurationConverter,
}

impl<'a> CalendarMath<'a> {
    pub fn new(calendar: CalendarRef<'a>, converter: DurationConverter) -> Self {
        Self { calendar, converter }
    }
}

impl DurationMath for CalendarMath<'_> {
    fn end_from(&self, start: NaiveDateTime, duration: f64, unit: TimeUnit) -> Result<NaiveDateTime, MathError> {
        let ms = self.converter.to_ms(duration, unit);
        self.calendar
            .calculate_end_date(start, ms)
            .ok_or(MathError::CalendarExhausted)
    }

    fn start_from(&self, end: NaiveDateTime, duration: f64, unit: TimeUnit) -> Result<NaiveDateTime, MathError> {
        let ms = self.converter.to_ms(duration, unit);
        self.calendar
            .calculate_start_date(end, ms)
            .ok_or(MathError::CalendarExhausted)
    }

    fn duration_between(&self, start: NaiveDateTime, end: NaiveDateTime, unit: TimeUnit) -> Result<f64, MathError> {
        let ms = self.calendar.calculate_duration_ms(start, end);
        Ok(self.converter.from_ms(ms, unit))
    }
}
