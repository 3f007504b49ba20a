//! Time span model.
//!
//! A time span is the temporal part of a scheduled item: start, end,
//! duration and the duration's unit. At most two of {start, end,
//! duration} are independently authoritative; the third is derived
//! (see [`derive`](super::derive)).

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::time::{DurationConverter, TimeUnit};

/// One of the three temporal fields of a span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SpanField {
    /// `startDate`.
    Start,
    /// `endDate`.
    End,
    /// `duration`.
    Duration,
}

impl SpanField {
    /// Field name as exposed to record stores.
    pub fn name(self) -> &'static str {
        match self {
            SpanField::Start => "startDate",
            SpanField::End => "endDate",
            SpanField::Duration => "duration",
        }
    }
}

/// Temporal fields of a scheduled item.
///
/// `duration` is expressed in `duration_unit`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeSpanValue {
    /// Start instant (inclusive).
    pub start: Option<NaiveDateTime>,
    /// End instant (exclusive).
    pub end: Option<NaiveDateTime>,
    /// Length in `duration_unit`.
    pub duration: Option<f64>,
    /// Unit of `duration`.
    pub duration_unit: TimeUnit,
}

impl TimeSpanValue {
    /// Creates an empty span with durations in days.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the start.
    pub fn with_start(mut self, start: NaiveDateTime) -> Self {
        self.start = Some(start);
        self
    }

    /// Sets the end.
    pub fn with_end(mut self, end: NaiveDateTime) -> Self {
        self.end = Some(end);
        self
    }

    /// Sets the duration and its unit.
    pub fn with_duration(mut self, duration: f64, unit: TimeUnit) -> Self {
        self.duration = Some(duration);
        self.duration_unit = unit;
        self
    }

    /// Sets the duration unit only.
    pub fn with_unit(mut self, unit: TimeUnit) -> Self {
        self.duration_unit = unit;
        self
    }

    /// Value of one field (for change records).
    pub fn field(&self, field: SpanField) -> FieldValue {
        match field {
            SpanField::Start => FieldValue::Date(self.start),
            SpanField::End => FieldValue::Date(self.end),
            SpanField::Duration => FieldValue::Number(self.duration),
        }
    }

    /// A milestone has zero duration.
    pub fn is_milestone(&self) -> bool {
        self.duration == Some(0.0)
    }

    /// Both dates are set and the span is not inverted.
    pub fn is_scheduled(&self) -> bool {
        match (self.start, self.end) {
            (Some(start), Some(end)) => end >= start,
            _ => false,
        }
    }

    /// Duration in milliseconds, if known.
    pub fn duration_ms(&self, converter: &DurationConverter) -> Option<i64> {
        self.duration
            .map(|value| converter.to_ms(value, self.duration_unit))
    }

    /// Fields whose values differ between `self` and `other`.
    pub fn diff(&self, other: &TimeSpanValue) -> Vec<SpanField> {
        let mut fields = Vec::new();
        if self.start != other.start {
            fields.push(SpanField::Start);
        }
        if self.end != other.end {
            fields.push(SpanField::End);
        }
        if self.duration != other.duration {
            fields.push(SpanField::Duration);
        }
        fields
    }
}

/// A single field value, used in change notifications.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// A start or end date.
    Date(Option<NaiveDateTime>),
    /// A duration.
    Number(Option<f64>),
}
