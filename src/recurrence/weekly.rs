//! Weekly expansion.
//!
//! Weeks begin on the configured week start day. Each selected weekday
//! (default: the anchor's weekday) yields one candidate per week, in
//! week order. Ordinals on `BYDAY` have no meaning here and are ignored.

use chrono::{Datelike, Days, NaiveDate, Weekday};

use super::iterator::FrequencyIterator;
use super::rule::RecurrenceRule;

/// Expands `FREQ=WEEKLY` rules.
#[derive(Debug, Clone)]
pub struct WeeklyIterator {
    anchor_week: NaiveDate,
    week_start_day: Weekday,
    // Day offsets from the week start, ascending and unique.
    offsets: Vec<u64>,
}

impl WeeklyIterator {
    pub fn new(rule: &RecurrenceRule, anchor_day: NaiveDate, week_start_day: Weekday) -> Self {
        let mut offsets: Vec<u64> = if rule.days().is_empty() {
            vec![offset_in_week(anchor_day.weekday(), week_start_day)]
        } else {
            rule.days()
                .iter()
                .map(|d| offset_in_week(d.weekday, week_start_day))
                .collect()
        };
        offsets.sort_unstable();
        offsets.dedup();
        Self {
            anchor_week: week_start(anchor_day, week_start_day),
            week_start_day,
            offsets,
        }
    }
}

fn offset_in_week(day: Weekday, week_start_day: Weekday) -> u64 {
    u64::from((day.num_days_from_monday() + 7 - week_start_day.num_days_from_monday()) % 7)
}

/// First day of the week containing `date`.
pub(crate) fn week_start(date: NaiveDate, week_start_day: Weekday) -> NaiveDate {
    let offset = offset_in_week(date.weekday(), week_start_day);
    date.checked_sub_days(Days::new(offset)).unwrap_or(date)
}

impl FrequencyIterator for WeeklyIterator {
    fn period_of(&self, date: NaiveDate) -> i64 {
        week_start(date, self.week_start_day)
            .signed_duration_since(self.anchor_week)
            .num_days()
            .div_euclid(7)
    }

    fn period_start(&self, index: i64) -> Option<NaiveDate> {
        let days = Days::new(index.unsigned_abs().checked_mul(7)?);
        if index >= 0 {
            self.anchor_week.checked_add_days(days)
        } else {
            self.anchor_week.checked_sub_days(days)
        }
    }

    fn expand(&self, index: i64, out: &mut Vec<NaiveDate>) {
        let Some(start) = self.period_start(index) else {
            return;
        };
        out.extend(
            self.offsets
                .iter()
                .filter_map(|&offset| start.checked_add_days(Days::new(offset))),
        );
    }
}
