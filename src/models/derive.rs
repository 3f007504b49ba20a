//! Derivation rules between start, end and duration.
//!
//! # State Machine
//! The fields proposed since the last commit select exactly one
//! calculation target:
//!
//! | Proposed | Result |
//! |----------|--------|
//! | start | clear end if start is null; clamp if start > end; else end from duration (when kept or no end); else duration |
//! | end | mirror image of the start rule |
//! | duration | clear end if null; end from start (when start kept or no end, negative clamps to 0 under keep-start); else start |
//! | start + end | duration (inverted range clamps duration to 0 and end to start) |
//! | start + duration | end |
//! | end + duration | start |
//! | all three | duration if null, else start if null, else end |
//!
//! Arithmetic goes through a [`DurationMath`] implementation so that the
//! same rules serve both plain wall-clock spans and working-time spans.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::timespan::{SpanField, TimeSpanValue};
use crate::time::{DurationConverter, TimeUnit, TimeZoneModel};

/// Flags that relax the derivation rules for one proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposeOptions {
    /// Moving one endpoint moves the other (duration is preserved).
    pub keep_duration: bool,
    /// Changing the duration keeps the start fixed.
    pub keep_start: bool,
}

impl Default for ProposeOptions {
    fn default() -> Self {
        Self {
            keep_duration: false,
            keep_start: true,
        }
    }
}

/// Pending field values for one record.
///
/// The outer `Option` tells whether the field was proposed, the inner
/// one carries the proposed value (which may be null). Later proposals
/// for the same field overwrite earlier ones.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Proposal {
    /// Proposed start.
    pub start: Option<Option<NaiveDateTime>>,
    /// Proposed end.
    pub end: Option<Option<NaiveDateTime>>,
    /// Proposed duration.
    pub duration: Option<Option<f64>>,
    /// Relaxation flags.
    pub options: ProposeOptions,
}

impl Proposal {
    /// An empty proposal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Proposes all three fields of `span`; deriving it normalizes the span.
    pub fn all(span: &TimeSpanValue) -> Self {
        Self {
            start: Some(span.start),
            end: Some(span.end),
            duration: Some(span.duration),
            options: ProposeOptions::default(),
        }
    }

    /// Proposes a start.
    pub fn start(mut self, start: Option<NaiveDateTime>) -> Self {
        self.start = Some(start);
        self
    }

    /// Proposes an end.
    pub fn end(mut self, end: Option<NaiveDateTime>) -> Self {
        self.end = Some(end);
        self
    }

    /// Proposes a duration.
    pub fn duration(mut self, duration: Option<f64>) -> Self {
        self.duration = Some(duration);
        self
    }

    /// Sets the relaxation flags.
    pub fn with_options(mut self, options: ProposeOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets `keep_duration`.
    pub fn keep_duration(mut self, keep: bool) -> Self {
        self.options.keep_duration = keep;
        self
    }

    /// Sets `keep_start`.
    pub fn keep_start(mut self, keep: bool) -> Self {
        self.options.keep_start = keep;
        self
    }

    /// Folds a later proposal into this one.
    pub fn merge(&mut self, later: Proposal) {
        if later.start.is_some() {
            self.start = later.start;
        }
        if later.end.is_some() {
            self.end = later.end;
        }
        if later.duration.is_some() {
            self.duration = later.duration;
        }
        self.options = later.options;
    }

    /// No field proposed.
    pub fn is_empty(&self) -> bool {
        self.start.is_none() && self.end.is_none() && self.duration.is_none()
    }
}

/// Failure of a single arithmetic step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MathError {
    /// Result outside the representable date range.
    OutOfRange,
    /// The calendar ran out of working time within its search range.
    CalendarExhausted,
}

/// Problems met while deriving; none of them aborts the derivation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DeriveIssue {
    /// End precedes start.
    InvalidTemporalRange {
        start: NaiveDateTime,
        end: NaiveDateTime,
    },
    /// A negative duration was clamped to 0.
    NegativeDuration(f64),
    /// A field could not be computed and was left unresolved.
    Unresolved { field: SpanField, cause: MathError },
}

/// Result of running the derivation rules.
#[derive(Debug, Clone, PartialEq)]
pub struct Derivation {
    /// The derived span.
    pub value: TimeSpanValue,
    /// Problems found along the way.
    pub issues: Vec<DeriveIssue>,
}

/// Date arithmetic used by the derivation rules.
///
/// Durations are given in the span's unit.
pub trait DurationMath {
    /// `start + duration`.
    fn end_from(&self, start: NaiveDateTime, duration: f64, unit: TimeUnit) -> Result<NaiveDateTime, MathError>;

    /// `end - duration`.
    fn start_from(&self, end: NaiveDateTime, duration: f64, unit: TimeUnit) -> Result<NaiveDateTime, MathError>;

    /// `end - start`, in `unit`.
    fn duration_between(&self, start: NaiveDateTime, end: NaiveDateTime, unit: TimeUnit) -> Result<f64, MathError>;
}

/// Calendar-free arithmetic with optional DST compensation.
#[derive(Debug, Clone, Copy, Default)]
pub struct WallClock {
    /// Zone used for offset lookups.
    pub zone: TimeZoneModel,
    /// Unit conversion.
    pub converter: DurationConverter,
    /// Treat durations as wall-clock lengths.
    pub adjust_duration_to_dst: bool,
}

impl WallClock {
    /// Wall clock with the given zone and settings.
    pub fn new(zone: TimeZoneModel, converter: DurationConverter, adjust_duration_to_dst: bool) -> Self {
        Self {
            zone,
            converter,
            adjust_duration_to_dst,
        }
    }
}

impl DurationMath for WallClock {
    fn end_from(&self, start: NaiveDateTime, duration: f64, unit: TimeUnit) -> Result<NaiveDateTime, MathError> {
        let ms = self.converter.to_ms(duration, unit);
        self.zone
            .add_ms(start, ms, self.adjust_duration_to_dst)
            .ok_or(MathError::OutOfRange)
    }

    fn start_from(&self, end: NaiveDateTime, duration: f64, unit: TimeUnit) -> Result<NaiveDateTime, MathError> {
        let ms = self.converter.to_ms(duration, unit);
        self.zone
            .add_ms(end, -ms, self.adjust_duration_to_dst)
            .ok_or(MathError::OutOfRange)
    }

    fn duration_between(&self, start: NaiveDateTime, end: NaiveDateTime, unit: TimeUnit) -> Result<f64, MathError> {
        let ms = self.zone.diff_ms(start, end, self.adjust_duration_to_dst);
        Ok(self.converter.from_ms(ms, unit))
    }
}

/// A record whose temporal fields follow the derivation rules.
pub trait TemporalDerivable {
    /// Current (committed) temporal fields.
    fn time_span(&self) -> &TimeSpanValue;

    /// Runs the derivation rules for `proposal` against the current value.
    fn derive_with(&self, proposal: &Proposal, math: &dyn DurationMath) -> Derivation {
        derive(self.time_span(), proposal, math)
    }
}

impl TemporalDerivable for TimeSpanValue {
    fn time_span(&self) -> &TimeSpanValue {
        self
    }
}

/// Normalizes a freshly constructed span: the missing field is derived
/// from the other two.
pub fn normalize(span: &TimeSpanValue, math: &dyn DurationMath) -> Derivation {
    derive(span, &Proposal::all(span), math)
}

/// Applies `proposal` to `current` and derives the calculation target.
pub fn derive(current: &TimeSpanValue, proposal: &Proposal, math: &dyn DurationMath) -> Derivation {
    let mut state = DeriveState {
        value: *current,
        issues: Vec::new(),
        math,
    };
    if let Some(start) = proposal.start {
        state.value.start = start;
    }
    if let Some(end) = proposal.end {
        state.value.end = end;
    }
    if let Some(duration) = proposal.duration {
        state.value.duration = duration;
    }

    let options = proposal.options;
    match (
        proposal.start.is_some(),
        proposal.end.is_some(),
        proposal.duration.is_some(),
    ) {
        (false, false, false) => {}
        (true, false, false) => state.start_changed(options),
        (false, true, false) => state.end_changed(options),
        (false, false, true) => state.duration_changed(options),
        (true, true, false) => state.dates_changed(),
        (true, false, true) => state.recompute_end(),
        (false, true, true) => state.recompute_start(),
        (true, true, true) => {
            if state.value.duration.is_none() {
                state.recompute_duration();
            } else if state.value.start.is_none() {
                state.recompute_start();
            } else {
                state.recompute_end();
            }
        }
    }

    state.check_range();
    tracing::trace!(issues = state.issues.len(), "derived time span");
    Derivation {
        value: state.value,
        issues: state.issues,
    }
}

struct DeriveState<'a> {
    value: TimeSpanValue,
    issues: Vec<DeriveIssue>,
    math: &'a dyn DurationMath,
}

impl DeriveState<'_> {
    fn start_changed(&mut self, options: ProposeOptions) {
        let Some(start) = self.value.start else {
            self.value.end = None;
            return;
        };
        match self.value.end {
            Some(end) if start > end && !options.keep_duration => {
                self.issues
                    .push(DeriveIssue::InvalidTemporalRange { start, end });
                self.value.end = Some(start);
                self.value.duration = Some(0.0);
            }
            end => {
                if self.value.duration.is_some() && (options.keep_duration || end.is_none()) {
                    self.recompute_end();
                } else if end.is_some() {
                    self.recompute_duration();
                }
            }
        }
    }

    fn end_changed(&mut self, options: ProposeOptions) {
        let Some(end) = self.value.end else {
            self.value.start = None;
            return;
        };
        match self.value.start {
            Some(start) if end < start && !options.keep_duration => {
                self.issues
                    .push(DeriveIssue::InvalidTemporalRange { start, end });
                self.value.start = Some(end);
                self.value.duration = Some(0.0);
            }
            start => {
                if self.value.duration.is_some() && (options.keep_duration || start.is_none()) {
                    self.recompute_start();
                } else if start.is_some() {
                    self.recompute_duration();
                }
            }
        }
    }

    fn duration_changed(&mut self, options: ProposeOptions) {
        let Some(duration) = self.value.duration else {
            self.value.end = None;
            return;
        };
        if self.value.start.is_some() && (options.keep_start || self.value.end.is_none()) {
            if duration < 0.0 && options.keep_start {
                self.issues.push(DeriveIssue::NegativeDuration(duration));
                self.value.duration = Some(0.0);
            }
            self.recompute_end();
        } else if self.value.end.is_some() {
            self.recompute_start();
        }
    }

    fn dates_changed(&mut self) {
        match (self.value.start, self.value.end) {
            (Some(start), Some(end)) if end < start => {
                self.issues
                    .push(DeriveIssue::InvalidTemporalRange { start, end });
                self.value.end = Some(start);
                self.value.duration = Some(0.0);
            }
            _ => self.recompute_duration(),
        }
    }

    fn recompute_end(&mut self) {
        self.value.end = match (self.value.start, self.value.duration) {
            (Some(start), Some(duration)) => self.resolve(
                SpanField::End,
                self.math.end_from(start, duration, self.value.duration_unit),
            ),
            _ => None,
        };
    }

    fn recompute_start(&mut self) {
        self.value.start = match (self.value.end, self.value.duration) {
            (Some(end), Some(duration)) => self.resolve(
                SpanField::Start,
                self.math.start_from(end, duration, self.value.duration_unit),
            ),
            _ => None,
        };
    }

    fn recompute_duration(&mut self) {
        self.value.duration = match (self.value.start, self.value.end) {
            (Some(start), Some(end)) => self.resolve(
                SpanField::Duration,
                self.math
                    .duration_between(start, end, self.value.duration_unit),
            ),
            _ => None,
        };
    }

    fn resolve<T>(&mut self, field: SpanField, result: Result<T, MathError>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(cause) => {
                self.issues.push(DeriveIssue::Unresolved { field, cause });
                None
            }
        }
    }

    // Inversions the rules did not already report.
    fn check_range(&mut self) {
        if let (Some(start), Some(end)) = (self.value.start, self.value.end) {
            let reported = self
                .issues
                .iter()
                .any(|issue| matches!(issue, DeriveIssue::InvalidTemporalRange { .. }));
            if end < start && !reported {
                self.issues
                    .push(DeriveIssue::InvalidTemporalRange { start, end });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, d)
            .and_then(|date| date.and_hms_opt(h, 0, 0))
            .unwrap()
    }

    fn clock() -> WallClock {
        WallClock::default()
    }

    fn workday() -> TimeSpanValue {
        TimeSpanValue::new()
            .with_start(at(1, 9))
            .with_end(at(1, 17))
            .with_duration(8.0, TimeUnit::Hour)
    }

    #[test]
    fn test_normalize_fills_missing_field() {
        let from_start = TimeSpanValue::new()
            .with_start(at(1, 9))
            .with_duration(8.0, TimeUnit::Hour);
        assert_eq!(normalize(&from_start, &clock()).value.end, Some(at(1, 17)));

        let from_dates = TimeSpanValue::new()
            .with_start(at(1, 9))
            .with_end(at(1, 13))
            .with_unit(TimeUnit::Hour);
        assert_eq!(normalize(&from_dates, &clock()).value.duration, Some(4.0));

        let from_end = TimeSpanValue::new()
            .with_end(at(1, 17))
            .with_duration(2.0, TimeUnit::Hour);
        assert_eq!(normalize(&from_end, &clock()).value.start, Some(at(1, 15)));
    }

    #[test]
    fn test_start_null_clears_end() {
        let result = derive(&workday(), &Proposal::new().start(None), &clock());
        assert_eq!(result.value.start, None);
        assert_eq!(result.value.end, None);
        assert_eq!(result.value.duration, Some(8.0));
    }

    #[test]
    fn test_start_after_end_clamps() {
        let result = derive(&workday(), &Proposal::new().start(Some(at(1, 20))), &clock());
        assert_eq!(result.value.end, Some(at(1, 20)));
        assert_eq!(result.value.duration, Some(0.0));
        assert!(matches!(
            result.issues[0],
            DeriveIssue::InvalidTemporalRange { .. }
        ));
    }

    #[test]
    fn test_start_keep_duration_moves_end() {
        let proposal = Proposal::new().start(Some(at(1, 11))).keep_duration(true);
        let result = derive(&workday(), &proposal, &clock());
        assert_eq!(result.value.end, Some(at(1, 19)));
        assert_eq!(result.value.duration, Some(8.0));
        assert!(result.issues.is_empty());
    }

    #[test]
    fn test_start_without_keep_duration_resizes() {
        let result = derive(&workday(), &Proposal::new().start(Some(at(1, 11))), &clock());
        assert_eq!(result.value.end, Some(at(1, 17)));
        assert_eq!(result.value.duration, Some(6.0));
    }

    #[test]
    fn test_start_with_duration_and_no_end() {
        let span = TimeSpanValue::new().with_duration(2.0, TimeUnit::Hour);
        let result = derive(&span, &Proposal::new().start(Some(at(1, 9))), &clock());
        assert_eq!(result.value.end, Some(at(1, 11)));
    }

    #[test]
    fn test_end_recomputes_duration() {
        let proposal = Proposal::new().end(Some(at(1, 13))).keep_duration(false);
        let result = derive(&workday(), &proposal, &clock());
        assert_eq!(result.value.duration, Some(4.0));
        assert_eq!(result.value.start, Some(at(1, 9)));
    }

    #[test]
    fn test_end_keep_duration_moves_start() {
        let proposal = Proposal::new().end(Some(at(1, 19))).keep_duration(true);
        let result = derive(&workday(), &proposal, &clock());
        assert_eq!(result.value.start, Some(at(1, 11)));
    }

    #[test]
    fn test_end_before_start_clamps() {
        let result = derive(&workday(), &Proposal::new().end(Some(at(1, 7))), &clock());
        assert_eq!(result.value.start, Some(at(1, 7)));
        assert_eq!(result.value.duration, Some(0.0));
        assert_eq!(result.issues.len(), 1);
    }

    #[test]
    fn test_end_null_clears_start() {
        let result = derive(&workday(), &Proposal::new().end(None), &clock());
        assert_eq!(result.value.start, None);
        assert_eq!(result.value.duration, Some(8.0));
    }

    #[test]
    fn test_duration_keep_start() {
        let result = derive(&workday(), &Proposal::new().duration(Some(2.0)), &clock());
        assert_eq!(result.value.end, Some(at(1, 11)));
        assert_eq!(result.value.start, Some(at(1, 9)));
    }

    #[test]
    fn test_duration_without_keep_start_moves_start() {
        let proposal = Proposal::new().duration(Some(2.0)).keep_start(false);
        let result = derive(&workday(), &proposal, &clock());
        assert_eq!(result.value.start, Some(at(1, 15)));
        assert_eq!(result.value.end, Some(at(1, 17)));
    }

    #[test]
    fn test_negative_duration_clamps_under_keep_start() {
        let result = derive(&workday(), &Proposal::new().duration(Some(-3.0)), &clock());
        assert_eq!(result.value.duration, Some(0.0));
        assert_eq!(result.value.end, Some(at(1, 9)));
        assert_eq!(result.issues, vec![DeriveIssue::NegativeDuration(-3.0)]);
    }

    #[test]
    fn test_duration_null_clears_end() {
        let result = derive(&workday(), &Proposal::new().duration(None), &clock());
        assert_eq!(result.value.end, None);
        assert_eq!(result.value.start, Some(at(1, 9)));
    }

    #[test]
    fn test_both_dates() {
        let proposal = Proposal::new().start(Some(at(2, 8))).end(Some(at(2, 18)));
        let result = derive(&workday(), &proposal, &clock());
        assert_eq!(result.value.duration, Some(10.0));

        let cleared = derive(&workday(), &Proposal::new().start(None).end(None), &clock());
        assert_eq!(cleared.value.duration, None);
    }

    #[test]
    fn test_both_dates_inverted() {
        let proposal = Proposal::new().start(Some(at(2, 18))).end(Some(at(2, 8)));
        let result = derive(&workday(), &proposal, &clock());
        assert_eq!(result.value.duration, Some(0.0));
        assert_eq!(result.value.end, Some(at(2, 18)));
        assert_eq!(result.issues.len(), 1);
    }

    #[test]
    fn test_pairs_with_duration() {
        let start_duration = Proposal::new().start(Some(at(2, 8))).duration(Some(1.0));
        assert_eq!(derive(&workday(), &start_duration, &clock()).value.end, Some(at(2, 9)));

        let end_duration = Proposal::new().end(Some(at(2, 8))).duration(Some(1.0));
        assert_eq!(derive(&workday(), &end_duration, &clock()).value.start, Some(at(2, 7)));
    }

    #[test]
    fn test_all_three() {
        let all = Proposal::new()
            .start(Some(at(2, 8)))
            .end(Some(at(2, 20)))
            .duration(Some(2.0));
        assert_eq!(derive(&workday(), &all, &clock()).value.end, Some(at(2, 10)));

        let no_start = Proposal::new().start(None).end(Some(at(2, 20))).duration(Some(2.0));
        assert_eq!(derive(&workday(), &no_start, &clock()).value.start, Some(at(2, 18)));

        let no_duration = Proposal::new().start(Some(at(2, 8))).end(Some(at(2, 20))).duration(None);
        assert_eq!(derive(&workday(), &no_duration, &clock()).value.duration, Some(12.0));
    }

    #[test]
    fn test_merge_keeps_latest() {
        let mut proposal = Proposal::new().start(Some(at(1, 10)));
        proposal.merge(Proposal::new().start(Some(at(1, 12))).keep_duration(true));
        assert_eq!(proposal.start, Some(Some(at(1, 12))));
        assert!(proposal.options.keep_duration);
        assert!(proposal.end.is_none());
    }

    #[test]
    fn test_out_of_range_is_unresolved() {
        let span = TimeSpanValue::new()
            .with_start(NaiveDateTime::MAX)
            .with_duration(1.0, TimeUnit::Day);
        let result = normalize(&span, &clock());
        assert_eq!(result.value.end, None);
        assert_eq!(
            result.issues,
            vec![DeriveIssue::Unresolved {
                field: SpanField::End,
                cause: MathError::OutOfRange
            }]
        );
    }

    #[test]
    fn test_dst_adjusted_duration() {
        let zone = TimeZoneModel::named("Europe/Berlin").unwrap();
        let spring = NaiveDate::from_ymd_opt(2024, 3, 30)
            .and_then(|d| d.and_hms_opt(12, 0, 0))
            .unwrap();
        let span = TimeSpanValue::new()
            .with_start(spring)
            .with_duration(24.0, TimeUnit::Hour);

        let real = normalize(&span, &WallClock::new(zone, DurationConverter::default(), false));
        assert_eq!(real.value.end, Some(spring + chrono::Duration::hours(25)));

        let wall = normalize(&span, &WallClock::new(zone, DurationConverter::default(), true));
        assert_eq!(wall.value.end, Some(spring + chrono::Duration::hours(24)));
    }
}
