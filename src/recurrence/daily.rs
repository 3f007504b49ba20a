//! Daily expansion: one candidate per day, optionally limited by
//! `BYDAY` weekdays and `BYMONTH` months.

use chrono::{Datelike, Days, NaiveDate, Weekday};

use super::iterator::FrequencyIterator;
use super::rule::RecurrenceRule;

/// Expands `FREQ=DAILY` rules.
#[derive(Debug, Clone)]
pub struct DailyIterator {
    anchor_day: NaiveDate,
    weekdays: Vec<Weekday>,
    months: Vec<u32>,
}

impl DailyIterator {
    pub fn new(rule: &RecurrenceRule, anchor_day: NaiveDate) -> Self {
        Self {
            anchor_day,
            weekdays: rule.days().iter().map(|d| d.weekday).collect(),
            months: rule.months().to_vec(),
        }
    }
}

impl FrequencyIterator for DailyIterator {
    fn period_of(&self, date: NaiveDate) -> i64 {
        date.signed_duration_since(self.anchor_day).num_days()
    }

    fn period_start(&self, index: i64) -> Option<NaiveDate> {
        let days = Days::new(index.unsigned_abs());
        if index >= 0 {
            self.anchor_day.checked_add_days(days)
        } else {
            self.anchor_day.checked_sub_days(days)
        }
    }

    fn expand(&self, index: i64, out: &mut Vec<NaiveDate>) {
        let Some(day) = self.period_start(index) else {
            return;
        };
        if !self.weekdays.is_empty() && !self.weekdays.contains(&day.weekday()) {
            return;
        }
        if !self.months.is_empty() && !self.months.contains(&day.month()) {
            return;
        }
        out.push(day);
    }
}
