//! Monthly expansion.
//!
//! `BYDAY` selects weekdays of the month (an ordinal picks one match);
//! otherwise `BYMONTHDAY` selects days, defaulting to the anchor's day of
//! month. Months too short for a requested day contribute nothing.
//! When both are given, `BYDAY` wins and `BYMONTHDAY` is ignored.

use chrono::{Datelike, NaiveDate};

use super::iterator::{
    finish_candidates, month_from_index, month_index, resolve_month_day, weekday_days_in_month,
    FrequencyIterator,
};
use super::rule::{DaySelector, RecurrenceRule};

/// Expands `FREQ=MONTHLY` rules.
#[derive(Debug, Clone)]
pub struct MonthlyIterator {
    anchor_month: i64,
    days: Vec<DaySelector>,
    month_days: Vec<i32>,
    months: Vec<u32>,
    positions: Vec<i32>,
}

impl MonthlyIterator {
    pub fn new(rule: &RecurrenceRule, anchor_day: NaiveDate) -> Self {
        let month_days = if rule.month_days().is_empty() && rule.days().is_empty() {
            vec![anchor_day.day() as i32]
        } else {
            rule.month_days().to_vec()
        };
        Self {
            anchor_month: month_index(anchor_day),
            days: rule.days().to_vec(),
            month_days,
            months: rule.months().to_vec(),
            positions: rule.positions().to_vec(),
        }
    }
}

/// Candidate days of one month for a day-of-month/weekday selection.
pub(crate) fn month_candidates(
    year: i32,
    month: u32,
    days: &[DaySelector],
    month_days: &[i32],
    out: &mut Vec<NaiveDate>,
) {
    if days.is_empty() {
        out.extend(
            month_days
                .iter()
                .filter_map(|&md| resolve_month_day(year, month, md)),
        );
        return;
    }
    for selector in days {
        weekday_days_in_month(year, month, selector, out);
    }
}

impl FrequencyIterator for MonthlyIterator {
    fn period_of(&self, date: NaiveDate) -> i64 {
        month_index(date) - self.anchor_month
    }

    fn period_start(&self, index: i64) -> Option<NaiveDate> {
        month_from_index(self.anchor_month.checked_add(index)?)
    }

    fn expand(&self, index: i64, out: &mut Vec<NaiveDate>) {
        let Some(first) = self.period_start(index) else {
            return;
        };
        if !self.months.is_empty() && !self.months.contains(&first.month()) {
            return;
        }
        let start = out.len();
        month_candidates(first.year(), first.month(), &self.days, &self.month_days, out);
        let mut period = out.split_off(start);
        finish_candidates(&mut period, &self.positions);
        out.extend(period);
    }
}
