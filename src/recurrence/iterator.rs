//! Occurrence iteration shared by all frequencies.
//!
//! # Algorithm
//! 1. `process_iteration_config` clamps the window to the anchor's start,
//!    discovers the end date implied by `COUNT` with one exploratory pass,
//!    and picks the first period to walk: the period containing the
//!    iteration start, widened one interval backward.
//! 2. The period walker asks a [`FrequencyIterator`] for the candidate
//!    days of every `interval`-th period, merges the anchor's own start
//!    in, and stops at the end bounds, on `ControlFlow::Break`, or at
//!    [`MAX_OCCURRENCES_COUNT`] steps.
//! 3. Excepted dates are skipped but still consume a position.
//!
//! Candidate lists are ascending and deduplicated per period, and periods
//! are walked in ascending order, so the emitted sequence is strictly
//! ascending.

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use std::ops::ControlFlow;

use super::daily::DailyIterator;
use super::exceptions::Recurrence;
use super::monthly::MonthlyIterator;
use super::rule::{DaySelector, Frequency};
use super::weekly::WeeklyIterator;
use super::yearly::YearlyIterator;
use crate::models::TimeSpanValue;
use crate::time::{add_wall_ms, wall_diff_ms};

/// Upper bound on the steps of one iteration pass.
pub const MAX_OCCURRENCES_COUNT: usize = 1_000_000;

/// Per-frequency expansion of a rule into candidate days.
///
/// Periods are indexed in frequency units (days, weeks, months, years)
/// from the period containing the anchor's start, which is period 0.
pub trait FrequencyIterator {
    /// Index of the period containing `date`.
    fn period_of(&self, date: NaiveDate) -> i64;

    /// First day of period `index`.
    fn period_start(&self, index: i64) -> Option<NaiveDate>;

    /// Appends the candidate days of period `index`, ascending and
    /// deduplicated.
    fn expand(&self, index: i64, out: &mut Vec<NaiveDate>);
}

/// The anchor of a recurring series: its first occurrence and its
/// recurrence definition.
#[derive(Debug, Clone, Copy)]
pub struct RecurrenceAnchor<'a> {
    /// Start of the anchor occurrence.
    pub start: NaiveDateTime,
    /// End of the anchor occurrence (gives the occurrence length).
    pub end: Option<NaiveDateTime>,
    /// Rule and exceptions.
    pub recurrence: &'a Recurrence,
}

impl<'a> RecurrenceAnchor<'a> {
    /// Builds an anchor from a span; `None` when the span has no start.
    pub fn from_span(span: &TimeSpanValue, recurrence: &'a Recurrence) -> Option<Self> {
        Some(Self {
            start: span.start?,
            end: span.end,
            recurrence,
        })
    }

    /// Occurrence length in ms (0 for milestones and open ends).
    pub fn duration_ms(&self) -> i64 {
        self.end
            .map(|end| wall_diff_ms(self.start, end).max(0))
            .unwrap_or(0)
    }
}

/// Capability of records that own a recurring series.
pub trait Recurring {
    /// The series definition, if the record recurs.
    fn recurrence(&self) -> Option<&Recurrence>;

    /// The anchor occurrence's span.
    fn anchor_span(&self) -> &TimeSpanValue;

    /// Whether an occurrence starting at `date` is excepted.
    fn has_exception(&self, date: NaiveDateTime) -> bool {
        self.recurrence()
            .is_some_and(|recurrence| recurrence.has_exception(date))
    }

    /// The anchor, when both a recurrence and a start exist.
    fn anchor(&self) -> Option<RecurrenceAnchor<'_>> {
        RecurrenceAnchor::from_span(self.anchor_span(), self.recurrence()?)
    }
}

/// Window and mode of one iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IterationConfig {
    /// Window start; defaults to the anchor's start.
    pub start_date: Option<NaiveDateTime>,
    /// Window end (exclusive); `None` = unbounded.
    pub end_date: Option<NaiveDateTime>,
    /// Only occurrences *starting* in the window are visible; otherwise
    /// any occurrence intersecting it is.
    pub start_only: bool,
    /// First day of the week for weekly periods.
    pub week_start_day: Weekday,
}

impl Default for IterationConfig {
    fn default() -> Self {
        Self {
            start_date: None,
            end_date: None,
            start_only: true,
            week_start_day: Weekday::Mon,
        }
    }
}

impl IterationConfig {
    /// A window `[start, end)`.
    pub fn window(start: NaiveDateTime, end: NaiveDateTime) -> Self {
        Self {
            start_date: Some(start),
            end_date: Some(end),
            ..Self::default()
        }
    }

    /// Sets start-only visibility.
    pub fn start_only(mut self, start_only: bool) -> Self {
        self.start_only = start_only;
        self
    }

    /// Sets the week start day.
    pub fn with_week_start(mut self, day: Weekday) -> Self {
        self.week_start_day = day;
        self
    }
}

/// One visible occurrence passed to the iteration callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OccurrenceDate {
    /// Occurrence start.
    pub date: NaiveDateTime,
    /// 1-based position within this iteration pass (excepted dates
    /// included).
    pub counter: usize,
    /// The occurrence is the anchor itself.
    pub is_first: bool,
}

/// Summary of an iteration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IterationOutcome {
    /// Occurrences passed to the callback.
    pub emitted: usize,
    /// The callback requested a stop.
    pub stopped: bool,
    /// The safety cap ended an unbounded series.
    pub truncated: bool,
}

/// Resolved bounds of one iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IterationPlan {
    /// Lower visibility bound.
    pub earliest_visible_date: NaiveDateTime,
    /// Date the walk starts from (earlier than the visible bound in
    /// intersecting mode).
    pub iteration_start: NaiveDateTime,
    /// Exclusive window end.
    pub end_date: Option<NaiveDateTime>,
    /// Inclusive series end (`UNTIL`, or the date implied by `COUNT`).
    pub until: Option<NaiveDateTime>,
    /// The exploratory pass hit the safety cap.
    pub truncated: bool,
}

/// Builds the frequency-specific expander for an anchor.
pub fn frequency_iterator(anchor: &RecurrenceAnchor<'_>, week_start_day: Weekday) -> Box<dyn FrequencyIterator> {
    let rule = &anchor.recurrence.rule;
    let day = anchor.start.date();
    match rule.frequency() {
        Frequency::Daily => Box::new(DailyIterator::new(rule, day)),
        Frequency::Weekly => Box::new(WeeklyIterator::new(rule, day, week_start_day)),
        Frequency::Monthly => Box::new(MonthlyIterator::new(rule, day)),
        Frequency::Yearly => Box::new(YearlyIterator::new(rule, day)),
    }
}

/// Resolves the iteration window for an anchor.
pub fn process_iteration_config(
    anchor: &RecurrenceAnchor<'_>,
    config: &IterationConfig,
    iterator: &dyn FrequencyIterator,
) -> IterationPlan {
    let rule = &anchor.recurrence.rule;
    let earliest_visible_date = config
        .start_date
        .map_or(anchor.start, |start| start.max(anchor.start));

    let iteration_start = if config.start_only {
        earliest_visible_date
    } else {
        add_wall_ms(earliest_visible_date, -anchor.duration_ms())
            .map_or(anchor.start, |date| date.max(anchor.start))
    };

    let mut until = rule.end_date();
    let mut truncated = false;
    if let (Some(count), None) = (rule.count(), until) {
        let mut seen = 0u32;
        let mut last = None;
        let walk = walk_periods(anchor, iterator, 0, None, None, |date, _| {
            seen += 1;
            last = Some(date);
            if seen >= count {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        });
        if seen >= count {
            until = last;
        } else if walk.truncated {
            truncated = true;
        } else {
            // The series ended by itself before reaching COUNT.
            until = last;
        }
    }

    IterationPlan {
        earliest_visible_date,
        iteration_start,
        end_date: config.end_date,
        until,
        truncated,
    }
}

/// Calls `f` for every visible occurrence of the anchor's series.
///
/// Returning `ControlFlow::Break` from `f` stops the iteration.
pub fn for_each_date<F>(anchor: &RecurrenceAnchor<'_>, config: &IterationConfig, mut f: F) -> IterationOutcome
where
    F: FnMut(OccurrenceDate) -> ControlFlow<()>,
{
    let iterator = frequency_iterator(anchor, config.week_start_day);
    let plan = process_iteration_config(anchor, config, iterator.as_ref());
    let mut outcome = IterationOutcome {
        truncated: plan.truncated,
        ..IterationOutcome::default()
    };

    if let Some(end) = plan.end_date {
        if end <= plan.earliest_visible_date {
            return outcome;
        }
    }

    let interval = i64::from(anchor.recurrence.rule.interval());
    let aligned = align_down(iterator.period_of(plan.iteration_start.date()), interval);
    let first_index = (aligned - interval).max(0);

    let duration_ms = anchor.duration_ms();
    let mut counter = 0usize;
    let walk = walk_periods(
        anchor,
        iterator.as_ref(),
        first_index,
        plan.end_date,
        plan.until,
        |date, is_first| {
            counter += 1;
            if anchor.recurrence.has_exception(date) {
                return ControlFlow::Continue(());
            }
            if !is_visible(date, duration_ms, &plan, config.start_only) {
                return ControlFlow::Continue(());
            }
            outcome.emitted += 1;
            f(OccurrenceDate {
                date,
                counter,
                is_first,
            })
        },
    );

    outcome.stopped = walk.stopped;
    outcome.truncated |= walk.truncated;
    if outcome.truncated {
        tracing::warn!(
            anchor = %anchor.start,
            rule = %anchor.recurrence.rule,
            "recurrence iteration truncated at safety cap"
        );
    }
    outcome
}

/// Collects visible occurrence starts into a vector.
pub fn collect_dates(anchor: &RecurrenceAnchor<'_>, config: &IterationConfig) -> (Vec<NaiveDateTime>, IterationOutcome) {
    let mut dates = Vec::new();
    let outcome = for_each_date(anchor, config, |occurrence| {
        dates.push(occurrence.date);
        ControlFlow::Continue(())
    });
    (dates, outcome)
}

fn is_visible(date: NaiveDateTime, duration_ms: i64, plan: &IterationPlan, start_only: bool) -> bool {
    if start_only || duration_ms == 0 {
        return date >= plan.earliest_visible_date;
    }
    add_wall_ms(date, duration_ms).is_some_and(|end| end > plan.earliest_visible_date)
}

#[derive(Debug, Default)]
struct WalkResult {
    stopped: bool,
    truncated: bool,
}

fn walk_periods<F>(
    anchor: &RecurrenceAnchor<'_>,
    iterator: &dyn FrequencyIterator,
    first_index: i64,
    end_exclusive: Option<NaiveDateTime>,
    until: Option<NaiveDateTime>,
    mut visit: F,
) -> WalkResult
where
    F: FnMut(NaiveDateTime, bool) -> ControlFlow<()>,
{
    let interval = i64::from(anchor.recurrence.rule.interval());
    let time = anchor.start.time();
    let past_end = |date: NaiveDateTime| {
        end_exclusive.is_some_and(|end| date >= end) || until.is_some_and(|until| date > until)
    };

    let mut result = WalkResult::default();
    let mut steps = 0usize;

    // The anchor precedes every other date of the series.
    if first_index == 0 {
        if past_end(anchor.start) {
            return result;
        }
        steps += 1;
        if visit(anchor.start, true).is_break() {
            result.stopped = true;
            return result;
        }
    }

    let mut candidates = Vec::new();
    let mut index = first_index;
    loop {
        if steps >= MAX_OCCURRENCES_COUNT {
            result.truncated = true;
            return result;
        }
        let Some(period_start) = iterator.period_start(index) else {
            // Ran off the representable calendar without reaching an end.
            result.truncated = true;
            return result;
        };
        if past_end(period_start.and_time(NaiveTime::MIN)) {
            return result;
        }

        candidates.clear();
        iterator.expand(index, &mut candidates);

        let mut produced = 0usize;
        for day in &candidates {
            let date = day.and_time(time);
            if date <= anchor.start {
                continue;
            }
            if past_end(date) {
                return result;
            }
            if steps >= MAX_OCCURRENCES_COUNT {
                result.truncated = true;
                return result;
            }
            steps += 1;
            produced += 1;
            if visit(date, false).is_break() {
                result.stopped = true;
                return result;
            }
        }
        if produced == 0 {
            steps += 1;
        }
        index += interval;
    }
}

fn align_down(index: i64, interval: i64) -> i64 {
    index - index.rem_euclid(interval)
}

/// Number of days in a month.
pub(crate) fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|first| first.pred_opt())
        .map_or(28, |last| last.day())
}

/// Month index counted from year 0 (`year * 12 + month0`).
pub(crate) fn month_index(date: NaiveDate) -> i64 {
    i64::from(date.year()) * 12 + i64::from(date.month0())
}

/// First day of the month with the given month index.
pub(crate) fn month_from_index(index: i64) -> Option<NaiveDate> {
    let year = i32::try_from(index.div_euclid(12)).ok()?;
    let month = u32::try_from(index.rem_euclid(12)).ok()? + 1;
    NaiveDate::from_ymd_opt(year, month, 1)
}

/// Resolves a (possibly negative) day of month; `None` if the month is
/// too short.
pub(crate) fn resolve_month_day(year: i32, month: u32, month_day: i32) -> Option<NaiveDate> {
    let length = i32::try_from(days_in_month(year, month)).ok()?;
    let day = if month_day < 0 { length + month_day + 1 } else { month_day };
    if day < 1 || day > length {
        return None;
    }
    NaiveDate::from_ymd_opt(year, month, u32::try_from(day).ok()?)
}

/// Days of a month matching a weekday selector. An ordinal selects a
/// single match counted from the start (positive) or the end (negative).
pub(crate) fn weekday_days_in_month(year: i32, month: u32, selector: &DaySelector, out: &mut Vec<NaiveDate>) {
    let Some(first) = NaiveDate::from_ymd_opt(year, month, 1) else {
        return;
    };
    let offset = (selector.weekday.num_days_from_monday() + 7 - first.weekday().num_days_from_monday()) % 7;
    let matches: Vec<NaiveDate> = (offset + 1..=days_in_month(year, month))
        .step_by(7)
        .filter_map(|day| NaiveDate::from_ymd_opt(year, month, day))
        .collect();
    match selector.ordinal {
        None => out.extend(matches),
        Some(ordinal) => {
            if let Some(day) = pick_position(&matches, ordinal) {
                out.push(day);
            }
        }
    }
}

/// Sorts, deduplicates and applies BYSETPOS selection.
pub(crate) fn finish_candidates(candidates: &mut Vec<NaiveDate>, positions: &[i32]) {
    candidates.sort_unstable();
    candidates.dedup();
    if positions.is_empty() {
        return;
    }
    let mut selected: Vec<NaiveDate> = positions
        .iter()
        .filter_map(|&position| pick_position(candidates, position))
        .collect();
    selected.sort_unstable();
    selected.dedup();
    *candidates = selected;
}

pub(crate) fn pick_position<T: Copy>(items: &[T], position: i32) -> Option<T> {
    let len = i64::try_from(items.len()).ok()?;
    let position = i64::from(position);
    let index = if position > 0 { position - 1 } else { len + position };
    if index < 0 || index >= len {
        return None;
    }
    items.get(usize::try_from(index).ok()?).copied()
}
