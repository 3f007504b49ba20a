//! Exception dates and the per-anchor recurrence container.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use super::rule::RecurrenceRule;
use crate::error::RuleParseError;
use crate::time::format::{format_basic, parse_basic};

/// Days on which a recurring series is skipped.
///
/// Keyed by calendar day: any occurrence starting on an excepted day is
/// suppressed regardless of its time of day.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExceptionDates {
    days: BTreeSet<NaiveDate>,
}

impl ExceptionDates {
    /// No exceptions.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the set from instants.
    pub fn from_dates(dates: impl IntoIterator<Item = NaiveDateTime>) -> Self {
        Self {
            days: dates.into_iter().map(|d| d.date()).collect(),
        }
    }

    /// Adds the day of `date`. Returns `false` if already present.
    pub fn add(&mut self, date: NaiveDateTime) -> bool {
        self.days.insert(date.date())
    }

    /// Removes the day of `date`. Returns `false` if absent.
    pub fn remove(&mut self, date: NaiveDateTime) -> bool {
        self.days.remove(&date.date())
    }

    /// Whether an occurrence starting at `date` is excepted.
    pub fn contains(&self, date: NaiveDateTime) -> bool {
        self.days.contains(&date.date())
    }

    /// Drops exceptions on days after `end`.
    pub fn prune_after(&mut self, end: NaiveDateTime) -> usize {
        let before = self.days.len();
        let cutoff = end.date();
        self.days.retain(|day| *day <= cutoff);
        before - self.days.len()
    }

    pub fn len(&self) -> usize {
        self.days.len()
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    /// Excepted days in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.days.iter().copied()
    }
}

impl fmt::Display for ExceptionDates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for day in &self.days {
            if !first {
                f.write_str(",")?;
            }
            first = false;
            match day.and_hms_opt(0, 0, 0) {
                Some(midnight) => f.write_str(&format_basic(midnight))?,
                None => return Err(fmt::Error),
            }
        }
        Ok(())
    }
}

impl FromStr for ExceptionDates {
    type Err = RuleParseError;

    /// Parses a comma-separated list of basic-format dates.
    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let mut exceptions = ExceptionDates::new();
        for item in text.split(',').map(str::trim).filter(|i| !i.is_empty()) {
            let date = parse_basic(item).ok_or_else(|| RuleParseError::InvalidValue {
                key: "EXDATE".to_string(),
                value: item.to_string(),
            })?;
            exceptions.add(date);
        }
        Ok(exceptions)
    }
}

/// Recurrence definition owned by an anchor record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recurrence {
    /// The rule.
    pub rule: RecurrenceRule,
    /// Skipped days.
    pub exceptions: ExceptionDates,
}

impl Recurrence {
    /// A recurrence without exceptions.
    pub fn new(rule: RecurrenceRule) -> Self {
        Self {
            rule,
            exceptions: ExceptionDates::new(),
        }
    }

    /// Parses rule text; malformed text yields no recurrence.
    pub fn from_rule_text(text: &str) -> Option<Self> {
        RecurrenceRule::parse_lenient(text).map(Self::new)
    }

    /// Adds exceptions.
    pub fn with_exceptions(mut self, exceptions: ExceptionDates) -> Self {
        self.exceptions = exceptions;
        self
    }

    /// Sets the end date, pruning exceptions past it.
    pub fn set_end_date(&mut self, end_date: Option<NaiveDateTime>) {
        self.rule.set_end_date(end_date);
        if let Some(end) = end_date {
            let pruned = self.exceptions.prune_after(end);
            if pruned > 0 {
                tracing::debug!(pruned, "dropped exception dates past new end date");
            }
        }
    }

    /// Sets the occurrence limit.
    pub fn set_count(&mut self, count: Option<u32>) {
        self.rule.set_count(count);
    }

    /// Whether an occurrence starting at `date` is excepted.
    pub fn has_exception(&self, date: NaiveDateTime) -> bool {
        self.exceptions.contains(date)
    }
}
