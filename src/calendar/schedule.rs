//! Recurring schedules for calendar intervals.
//!
//! A recurring interval is described by two schedules: one yielding the
//! instants where the interval starts, one yielding where it ends. The
//! provided engine is a 5-field cron expression.
//!
//! # Cron Format
//!
//! ```text
//! ┌──────── minute        0-59
//! │ ┌────── hour          0-23
//! │ │ ┌──── day of month  1-31
//! │ │ │ ┌── month         1-12 or JAN-DEC
//! │ │ │ │ ┌ day of week   0-7 or SUN-SAT (0 and 7 = Sunday)
//! 0 9 * * MON-FRI
//! ```
//!
//! Each field accepts `*`, single values, ranges `a-b`, steps `*/n` or
//! `a-b/n`, and comma lists. When both day fields are restricted a day
//! matches if *either* matches (standard cron semantics).

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

use crate::error::ScheduleParseError;

/// Days searched for an unbounded `next` or `previous` query (one full
/// 28-year weekday/leap cycle).
const UNBOUNDED_SEARCH_DAYS: i64 = 28 * 366;

/// Source of recurring instants.
pub trait RecurringSchedule: fmt::Debug {
    /// Up to `count` instants in `[from, to)`, ascending. `None` (NEVER)
    /// when the schedule has no instant in range.
    fn next(&self, count: usize, from: NaiveDateTime, to: Option<NaiveDateTime>) -> Option<Vec<NaiveDateTime>>;

    /// The latest instant strictly before `before`, if any.
    fn previous(&self, before: NaiveDateTime) -> Option<NaiveDateTime>;
}

/// End of a recurring interval.
#[derive(Debug, Clone)]
pub enum EndSchedule {
    /// The first instant of this schedule after the interval's start.
    At(Rc<dyn RecurringSchedule>),
    /// Midnight after the day the interval starts (`"EOD"`).
    EndOfDay,
}

impl EndSchedule {
    /// Parses `"EOD"` or a cron expression.
    pub fn parse(text: &str) -> Result<Self, ScheduleParseError> {
        if text.trim().eq_ignore_ascii_case("EOD") {
            return Ok(EndSchedule::EndOfDay);
        }
        let cron: CronSchedule = text.parse()?;
        Ok(EndSchedule::At(Rc::new(cron)))
    }

    /// End of the interval starting at `start`.
    pub fn end_for(&self, start: NaiveDateTime) -> Option<NaiveDateTime> {
        match self {
            EndSchedule::EndOfDay => start.date().succ_opt().map(|day| day.and_time(NaiveTime::MIN)),
            EndSchedule::At(schedule) => {
                let from = start.checked_add_signed(Duration::seconds(1))?;
                schedule.next(1, from, None)?.first().copied()
            }
        }
    }
}

/// Bit set over the values of one cron field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FieldSet(u64);

impl FieldSet {
    fn contains(self, value: u32) -> bool {
        value < 64 && self.0 & (1 << value) != 0
    }

    fn values(self, max: u32) -> impl DoubleEndedIterator<Item = u32> {
        (0..=max).filter(move |v| self.contains(*v))
    }
}

/// A parsed 5-field cron expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronSchedule {
    source: String,
    minutes: FieldSet,
    hours: FieldSet,
    month_days: FieldSet,
    months: FieldSet,
    weekdays: FieldSet,
    month_days_restricted: bool,
    weekdays_restricted: bool,
}

struct FieldSpec {
    name: &'static str,
    min: u32,
    max: u32,
    names: &'static [&'static str],
}

const MINUTE: FieldSpec = FieldSpec { name: "minute", min: 0, max: 59, names: &[] };
const HOUR: FieldSpec = FieldSpec { name: "hour", min: 0, max: 23, names: &[] };
const MONTH_DAY: FieldSpec = FieldSpec { name: "day-of-month", min: 1, max: 31, names: &[] };
const MONTH: FieldSpec = FieldSpec {
    name: "month",
    min: 1,
    max: 12,
    names: &["JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC"],
};
const WEEKDAY: FieldSpec = FieldSpec {
    name: "day-of-week",
    min: 0,
    max: 7,
    names: &["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT"],
};

impl FieldSpec {
    fn invalid(&self, value: &str) -> ScheduleParseError {
        ScheduleParseError::InvalidField {
            field: self.name,
            value: value.to_string(),
        }
    }

    fn value(&self, text: &str) -> Result<u32, ScheduleParseError> {
        let upper = text.to_ascii_uppercase();
        if let Some(pos) = self.names.iter().position(|n| *n == upper) {
            // Month names are 1-based, weekday names 0-based.
            return Ok(pos as u32 + self.min);
        }
        let value: u32 = text.parse().map_err(|_| self.invalid(text))?;
        if value < self.min || value > self.max {
            return Err(self.invalid(text));
        }
        Ok(value)
    }

    /// Parses one field. Returns the set and whether it was restricted
    /// (anything but a bare `*`).
    fn parse(&self, text: &str) -> Result<(FieldSet, bool), ScheduleParseError> {
        let mut bits = 0u64;
        for item in text.split(',') {
            let (range, step) = match item.split_once('/') {
                Some((range, step)) => {
                    let step: u32 = step.parse().map_err(|_| self.invalid(item))?;
                    if step == 0 {
                        return Err(self.invalid(item));
                    }
                    (range, step)
                }
                None => (item, 1),
            };
            let (low, high) = if range == "*" {
                (self.min, self.max)
            } else if let Some((low, high)) = range.split_once('-') {
                (self.value(low)?, self.value(high)?)
            } else {
                let value = self.value(range)?;
                // `5/15` runs from 5 to the field maximum.
                if item.contains('/') { (value, self.max) } else { (value, value) }
            };
            if low > high {
                return Err(self.invalid(item));
            }
            for value in (low..=high).step_by(step as usize) {
                bits |= 1 << value;
            }
        }
        Ok((FieldSet(bits), text != "*"))
    }
}

impl CronSchedule {
    /// The expression this schedule was parsed from.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Whether `day` satisfies the day-of-month, month and weekday fields.
    pub fn matches_day(&self, day: NaiveDate) -> bool {
        if !self.months.contains(day.month()) {
            return false;
        }
        let by_month_day = self.month_days.contains(day.day());
        let by_weekday = self.weekdays.contains(day.weekday().num_days_from_sunday());
        match (self.month_days_restricted, self.weekdays_restricted) {
            (true, true) => by_month_day || by_weekday,
            (true, false) => by_month_day,
            (false, true) => by_weekday,
            (false, false) => true,
        }
    }

    /// Whether the schedule fires at `date` (seconds ignored).
    pub fn matches(&self, date: NaiveDateTime) -> bool {
        self.matches_day(date.date()) && self.hours.contains(date.hour()) && self.minutes.contains(date.minute())
    }
}

impl FromStr for CronSchedule {
    type Err = ScheduleParseError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = text.split_whitespace().collect();
        if fields.is_empty() {
            return Err(ScheduleParseError::Empty);
        }
        if fields.len() != 5 {
            return Err(ScheduleParseError::FieldCount(fields.len()));
        }
        let (minutes, _) = MINUTE.parse(fields[0])?;
        let (hours, _) = HOUR.parse(fields[1])?;
        let (month_days, month_days_restricted) = MONTH_DAY.parse(fields[2])?;
        let (months, _) = MONTH.parse(fields[3])?;
        let (mut weekdays, weekdays_restricted) = WEEKDAY.parse(fields[4])?;
        if weekdays.contains(7) {
            weekdays = FieldSet(weekdays.0 | 1);
        }
        Ok(Self {
            source: fields.join(" "),
            minutes,
            hours,
            month_days,
            months,
            weekdays,
            month_days_restricted,
            weekdays_restricted,
        })
    }
}

impl fmt::Display for CronSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl RecurringSchedule for CronSchedule {
    fn next(&self, count: usize, from: NaiveDateTime, to: Option<NaiveDateTime>) -> Option<Vec<NaiveDateTime>> {
        let last_day = match to {
            Some(to) => to.date(),
            None => from.date().checked_add_signed(Duration::days(UNBOUNDED_SEARCH_DAYS))?,
        };
        let mut found = Vec::new();
        let mut day = from.date();
        'days: while day <= last_day && found.len() < count {
            if self.matches_day(day) {
                for hour in self.hours.values(23) {
                    for minute in self.minutes.values(59) {
                        let Some(time) = NaiveTime::from_hms_opt(hour, minute, 0) else {
                            continue;
                        };
                        let instant = day.and_time(time);
                        if instant < from {
                            continue;
                        }
                        if to.is_some_and(|to| instant >= to) {
                            break 'days;
                        }
                        found.push(instant);
                        if found.len() >= count {
                            break 'days;
                        }
                    }
                }
            }
            match day.succ_opt() {
                Some(next) => day = next,
                None => break,
            }
        }
        if found.is_empty() {
            None
        } else {
            Some(found)
        }
    }

    fn previous(&self, before: NaiveDateTime) -> Option<NaiveDateTime> {
        let first_day = before
            .date()
            .checked_sub_signed(Duration::days(UNBOUNDED_SEARCH_DAYS))
            .unwrap_or(NaiveDate::MIN);
        let mut day = before.date();
        while day >= first_day {
            if self.matches_day(day) {
                for hour in self.hours.values(23).rev() {
                    for minute in self.minutes.values(59).rev() {
                        let Some(time) = NaiveTime::from_hms_opt(hour, minute, 0) else {
                            continue;
                        };
                        let instant = day.and_time(time);
                        if instant < before {
                            return Some(instant);
                        }
                    }
                }
            }
            day = day.pred_opt()?;
        }
        None
    }
}
