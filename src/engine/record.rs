//! Scheduled records.
//!
//! A record owns its committed time span plus the edits proposed since
//! the last commit. Edits never change the committed values directly;
//! they are merged into one pending proposal that the next commit
//! derives and writes back.

use serde::{Deserialize, Serialize};

use crate::calendar::CalendarId;
use crate::models::{Proposal, TemporalDerivable, TimeSpanValue};
use crate::recurrence::{Recurrence, Recurring};

/// Index of a record in its project.
pub type RecordId = usize;

/// Capability of records that measure duration in a calendar's working
/// time.
pub trait CalendarAware {
    /// The calendar, if any.
    fn calendar(&self) -> Option<CalendarId>;
}

/// An edit to a record's non-temporal fields, applied at commit.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct PendingEdit {
    pub proposal: Proposal,
    pub recurrence: Option<Option<Recurrence>>,
    pub calendar: Option<Option<CalendarId>>,
}

impl PendingEdit {
    pub fn is_empty(&self) -> bool {
        self.proposal.is_empty() && self.recurrence.is_none() && self.calendar.is_none()
    }
}

/// A scheduled item: an event, task bar, shift, ...
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledRecord {
    /// Display name.
    pub name: String,
    span: TimeSpanValue,
    calendar: Option<CalendarId>,
    recurrence: Option<Recurrence>,
    #[serde(skip)]
    pub(crate) pending: PendingEdit,
}

impl ScheduledRecord {
    /// Creates an unscheduled record.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            span: TimeSpanValue::new(),
            calendar: None,
            recurrence: None,
            pending: PendingEdit::default(),
        }
    }

    /// Sets the initial time span.
    pub fn with_span(mut self, span: TimeSpanValue) -> Self {
        self.span = span;
        self
    }

    /// Measures duration in this calendar's working time.
    pub fn with_calendar(mut self, calendar: CalendarId) -> Self {
        self.calendar = Some(calendar);
        self
    }

    /// Makes the record the anchor of a recurring series.
    pub fn with_recurrence(mut self, recurrence: Recurrence) -> Self {
        self.recurrence = Some(recurrence);
        self
    }

    /// Committed time span.
    pub fn span(&self) -> &TimeSpanValue {
        &self.span
    }

    /// Whether edits are waiting for a commit.
    pub fn has_pending_changes(&self) -> bool {
        !self.pending.is_empty()
    }

    pub(crate) fn set_span(&mut self, span: TimeSpanValue) {
        self.span = span;
    }

    pub(crate) fn set_calendar(&mut self, calendar: Option<CalendarId>) {
        self.calendar = calendar;
    }

    pub(crate) fn set_recurrence(&mut self, recurrence: Option<Recurrence>) {
        self.recurrence = recurrence;
    }
}

impl TemporalDerivable for ScheduledRecord {
    fn time_span(&self) -> &TimeSpanValue {
        &self.span
    }
}

impl Recurring for ScheduledRecord {
    fn recurrence(&self) -> Option<&Recurrence> {
        self.recurrence.as_ref()
    }

    fn anchor_span(&self) -> &TimeSpanValue {
        &self.span
    }
}

impl CalendarAware for ScheduledRecord {
    fn calendar(&self) -> Option<CalendarId> {
        self.calendar
    }
}
