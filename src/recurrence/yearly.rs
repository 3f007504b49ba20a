//! Yearly expansion.
//!
//! Months come from `BYMONTH` (default: the anchor's month) and each is
//! expanded like a monthly period. `BYDAY` without `BYMONTH` selects
//! weekdays of the whole year, with ordinals counted across the year.
//! As in monthly periods, `BYDAY` overrides `BYMONTHDAY`.
//! `BYSETPOS` applies to the year's full candidate set.

use chrono::{Datelike, NaiveDate};

use super::iterator::{finish_candidates, pick_position, FrequencyIterator};
use super::monthly::month_candidates;
use super::rule::{DaySelector, RecurrenceRule};

/// Expands `FREQ=YEARLY` rules.
#[derive(Debug, Clone)]
pub struct YearlyIterator {
    anchor_year: i32,
    days: Vec<DaySelector>,
    month_days: Vec<i32>,
    months: Vec<u32>,
    positions: Vec<i32>,
    whole_year_weekdays: bool,
}

impl YearlyIterator {
    pub fn new(rule: &RecurrenceRule, anchor_day: NaiveDate) -> Self {
        let whole_year_weekdays = rule.months().is_empty() && !rule.days().is_empty();
        let months = if rule.months().is_empty() {
            vec![anchor_day.month()]
        } else {
            rule.months().to_vec()
        };
        let month_days = if rule.month_days().is_empty() && rule.days().is_empty() {
            vec![anchor_day.day() as i32]
        } else {
            rule.month_days().to_vec()
        };
        Self {
            anchor_year: anchor_day.year(),
            days: rule.days().to_vec(),
            month_days,
            months,
            positions: rule.positions().to_vec(),
            whole_year_weekdays,
        }
    }

    fn year(&self, index: i64) -> Option<i32> {
        i32::try_from(i64::from(self.anchor_year).checked_add(index)?).ok()
    }
}

fn weekday_days_in_year(year: i32, selector: &DaySelector, out: &mut Vec<NaiveDate>) {
    let Some(first) = NaiveDate::from_ymd_opt(year, 1, 1) else {
        return;
    };
    let offset = (selector.weekday.num_days_from_monday() + 7 - first.weekday().num_days_from_monday()) % 7;
    let matches: Vec<NaiveDate> = first
        .iter_days()
        .skip(offset as usize)
        .step_by(7)
        .take_while(|day| day.year() == year)
        .collect();
    match selector.ordinal {
        None => out.extend(matches),
        Some(ordinal) => out.extend(pick_position(&matches, ordinal)),
    }
}

impl FrequencyIterator for YearlyIterator {
    fn period_of(&self, date: NaiveDate) -> i64 {
        i64::from(date.year()) - i64::from(self.anchor_year)
    }

    fn period_start(&self, index: i64) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year(index)?, 1, 1)
    }

    fn expand(&self, index: i64, out: &mut Vec<NaiveDate>) {
        let Some(year) = self.year(index) else {
            return;
        };
        let mut period = Vec::new();
        if self.whole_year_weekdays {
            for selector in &self.days {
                weekday_days_in_year(year, selector, &mut period);
            }
        } else {
            for &month in &self.months {
                month_candidates(year, month, &self.days, &self.month_days, &mut period);
            }
        }
        finish_candidates(&mut period, &self.positions);
        out.extend(period);
    }
}
