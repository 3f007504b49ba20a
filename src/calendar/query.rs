//! Availability queries.
//!
//! Every query is built on [`CalendarRef::for_each_availability_interval`],
//! which walks maximal runs of constant working status forward or
//! backward, filling the calendar's cache one chunk at a time.

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use std::ops::ControlFlow;
use std::rc::Rc;

use super::interval::TimeWindow;
use super::interval_cache::AvailabilityDescriptor;
use super::store::{CalendarId, CalendarStore};
use crate::time::MS_PER_DAY;

/// How an availability walk ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationStatus {
    /// The requested window was walked completely.
    FullRangeIterated,
    /// The callback stopped the walk.
    StoppedByIterator,
    /// The cache had to be extended too many times.
    MaxCacheExtendCyclesReached,
    /// The walk reached the maximum range before the window's end.
    MaxRangeReached,
}

/// Bounds and direction of an availability walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AvailabilityOptions {
    /// Where the walk begins (exclusive upper bound when backward).
    pub start_date: NaiveDateTime,
    /// Where it ends: later than `start_date` when forward, earlier when
    /// backward. `None` walks up to the maximum range.
    pub end_date: Option<NaiveDateTime>,
    /// Walk direction.
    pub is_forward: bool,
    /// Overrides the store's maximum range (ms).
    pub max_range_ms: Option<i64>,
}

impl AvailabilityOptions {
    /// Forward walk from `start_date`.
    pub fn forward(start_date: NaiveDateTime) -> Self {
        Self {
            start_date,
            end_date: None,
            is_forward: true,
            max_range_ms: None,
        }
    }

    /// Backward walk from `start_date`.
    pub fn backward(start_date: NaiveDateTime) -> Self {
        Self {
            is_forward: false,
            ..Self::forward(start_date)
        }
    }

    /// Stops at `end_date`.
    pub fn until(mut self, end_date: NaiveDateTime) -> Self {
        self.end_date = Some(end_date);
        self
    }

    /// Limits the walk to `ms` from its start.
    pub fn with_max_range_ms(mut self, ms: i64) -> Self {
        self.max_range_ms = Some(ms);
        self
    }
}

/// Query handle for one calendar of a store.
#[derive(Debug, Clone, Copy)]
pub struct CalendarRef<'a> {
    store: &'a CalendarStore,
    id: CalendarId,
}

type Pending = (NaiveDateTime, NaiveDateTime, Rc<AvailabilityDescriptor>);

impl<'a> CalendarRef<'a> {
    pub(crate) fn new(store: &'a CalendarStore, id: CalendarId) -> Self {
        Self { store, id }
    }

    pub fn id(&self) -> CalendarId {
        self.id
    }

    pub fn name(&self) -> &'a str {
        self.store.get(self.id).map_or("", |node| node.name.as_str())
    }

    pub fn store(&self) -> &'a CalendarStore {
        self.store
    }

    /// Calls `f(start, end, descriptor)` for each maximal interval of
    /// constant working status within the options' window.
    ///
    /// Forward walks report intervals in ascending order; backward walks
    /// in descending order. The first and last intervals are clipped to
    /// the window. Touching segments with the same status form one
    /// interval, reported with the descriptor of the first one walked.
    pub fn for_each_availability_interval<F>(&self, options: AvailabilityOptions, mut f: F) -> IterationStatus
    where
        F: FnMut(NaiveDateTime, NaiveDateTime, &AvailabilityDescriptor) -> ControlFlow<()>,
    {
        let settings = self.store.settings();
        let max_range_ms = options
            .max_range_ms
            .unwrap_or_else(|| i64::from(settings.max_range_days) * MS_PER_DAY);
        let max_range = Duration::try_milliseconds(max_range_ms).unwrap_or(Duration::MAX);
        let chunk = Duration::days(i64::from(settings.chunk_days.max(1)));
        let max_cycles = settings.max_cache_extend_cycles;
        let start = options.start_date;

        let (limit, range_bound) = if options.is_forward {
            let range_limit = start.checked_add_signed(max_range).unwrap_or(NaiveDateTime::MAX);
            match options.end_date {
                Some(end) if end <= range_limit => (end, false),
                _ => (range_limit, true),
            }
        } else {
            let range_limit = start.checked_sub_signed(max_range).unwrap_or(NaiveDateTime::MIN);
            match options.end_date {
                Some(end) if end >= range_limit => (end, false),
                _ => (range_limit, true),
            }
        };

        let Some(node) = self.store.get(self.id) else {
            return IterationStatus::FullRangeIterated;
        };
        let mut cycles = 0u32;
        let mut pending: Option<Pending> = None;
        let mut cursor = start;
        let mut emit = |interval: Pending| f(interval.0, interval.1, &interval.2);

        loop {
            let done = if options.is_forward { cursor >= limit } else { cursor <= limit };
            if done {
                break;
            }

            let needs_fill = {
                let cache = node.cache.borrow();
                match cache.cached_window() {
                    None => true,
                    Some(w) if options.is_forward => !w.contains(cursor),
                    Some(w) => !(w.start < cursor && cursor <= w.end),
                }
            };
            if needs_fill {
                if cycles >= max_cycles {
                    tracing::warn!(calendar = %node.name, cycles, "calendar cache extend limit reached");
                    return IterationStatus::MaxCacheExtendCyclesReached;
                }
                cycles += 1;
                let window = if options.is_forward {
                    TimeWindow::new(cursor, cursor.checked_add_signed(chunk).unwrap_or(limit).min(limit))
                } else {
                    TimeWindow::new(cursor.checked_sub_signed(chunk).unwrap_or(limit).max(limit), cursor)
                };
                self.store.ensure_cache_filled(self.id, window);
            }

            let cache = node.cache.borrow();
            let Some(cached) = cache.cached_window() else {
                return IterationStatus::MaxCacheExtendCyclesReached;
            };
            let (segment_start, segment_end, descriptor) = if options.is_forward {
                let segment = cache.intervals().segment_at(cursor);
                let end = segment.end.map_or(cached.end, |e| e.min(cached.end)).min(limit);
                (cursor, end, segment.descriptor)
            } else {
                let segment = cache.intervals().segment_before(cursor);
                let begin = segment.start.max(cached.start).max(limit);
                (begin, cursor, segment.descriptor)
            };
            drop(cache);

            pending = match pending.take() {
                Some((s, e, d)) if d.is_working == descriptor.is_working => {
                    if options.is_forward {
                        Some((s, segment_end, d))
                    } else {
                        Some((segment_start, e, d))
                    }
                }
                Some(previous) => {
                    if emit(previous).is_break() {
                        return IterationStatus::StoppedByIterator;
                    }
                    Some((segment_start, segment_end, descriptor))
                }
                None => Some((segment_start, segment_end, descriptor)),
            };
            cursor = if options.is_forward { segment_end } else { segment_start };
        }

        if let Some(last) = pending {
            if emit(last).is_break() {
                return IterationStatus::StoppedByIterator;
            }
        }
        if range_bound {
            IterationStatus::MaxRangeReached
        } else {
            IterationStatus::FullRangeIterated
        }
    }

    fn length_ms(&self, start: NaiveDateTime, end: NaiveDateTime) -> i64 {
        self.store
            .zone()
            .diff_ms(start, end, self.store.adjust_duration_to_dst())
    }

    /// Walks `duration_ms` of working time from `date`.
    ///
    /// Returns the date reached and the working time still missing; a
    /// positive remainder means the calendar ran out of working time
    /// within the maximum range.
    pub fn accumulate_working_time(&self, date: NaiveDateTime, duration_ms: i64, is_forward: bool) -> (NaiveDateTime, i64) {
        if duration_ms <= 0 {
            return (date, 0);
        }
        let zone = self.store.zone();
        let wall_clock = self.store.adjust_duration_to_dst();
        let mut remaining = duration_ms;
        let mut reached = date;
        let options = if is_forward {
            AvailabilityOptions::forward(date)
        } else {
            AvailabilityOptions::backward(date)
        };

        self.for_each_availability_interval(options, |start, end, descriptor| {
            if !descriptor.is_working {
                return ControlFlow::Continue(());
            }
            let length = self.length_ms(start, end);
            if length >= remaining {
                let target = if is_forward {
                    zone.add_ms(start, remaining, wall_clock)
                } else {
                    zone.add_ms(end, -remaining, wall_clock)
                };
                if let Some(target) = target {
                    reached = target;
                    remaining = 0;
                }
                return ControlFlow::Break(());
            }
            remaining -= length;
            reached = if is_forward { end } else { start };
            ControlFlow::Continue(())
        });

        if remaining > 0 {
            tracing::warn!(
                calendar = %self.name(),
                %date,
                duration_ms,
                remaining,
                "calendar has not enough working time"
            );
        }
        (reached, remaining)
    }

    /// End of `duration_ms` working time starting at `start`.
    pub fn calculate_end_date(&self, start: NaiveDateTime, duration_ms: i64) -> Option<NaiveDateTime> {
        match self.accumulate_working_time(start, duration_ms, true) {
            (end, 0) => Some(end),
            _ => None,
        }
    }

    /// Start of `duration_ms` working time ending at `end`.
    pub fn calculate_start_date(&self, end: NaiveDateTime, duration_ms: i64) -> Option<NaiveDateTime> {
        match self.accumulate_working_time(end, duration_ms, false) {
            (start, 0) => Some(start),
            _ => None,
        }
    }

    /// Working time in `[start, end)` (negative when `end < start`).
    pub fn calculate_duration_ms(&self, start: NaiveDateTime, end: NaiveDateTime) -> i64 {
        if end < start {
            return -self.calculate_duration_ms(end, start);
        }
        let mut total = 0i64;
        let options = AvailabilityOptions::forward(start)
            .until(end)
            .with_max_range_ms(i64::MAX);
        self.for_each_availability_interval(options, |s, e, descriptor| {
            if descriptor.is_working {
                total += self.length_ms(s, e);
            }
            ControlFlow::Continue(())
        });
        total
    }

    /// The nearest working instant from `date` in the walk direction:
    /// `date` itself when it is working time, otherwise the start
    /// (forward) or end (backward) of the nearest working interval.
    pub fn skip_non_working_time(&self, date: NaiveDateTime, is_forward: bool) -> Option<NaiveDateTime> {
        let options = if is_forward {
            AvailabilityOptions::forward(date)
        } else {
            AvailabilityOptions::backward(date)
        };
        let mut found = None;
        self.for_each_availability_interval(options, |start, end, descriptor| {
            if descriptor.is_working {
                found = Some(if is_forward { start } else { end });
                return ControlFlow::Break(());
            }
            ControlFlow::Continue(())
        });
        found
    }

    /// Whether `[start, end)` has working time.
    ///
    /// Without `end` only the instant `start` is checked. With
    /// `fully_contained` the whole range must be working time.
    pub fn is_working_time(&self, start: NaiveDateTime, end: Option<NaiveDateTime>, fully_contained: bool) -> bool {
        let end = match end {
            Some(end) if end > start => end,
            _ => {
                let probe = start.checked_add_signed(Duration::milliseconds(1)).unwrap_or(start);
                return self.first_interval(start, probe).is_some_and(|(_, _, working)| working);
            }
        };
        if fully_contained {
            return self
                .first_interval(start, end)
                .is_some_and(|(_, interval_end, working)| working && interval_end >= end);
        }
        let mut working = false;
        self.for_each_availability_interval(AvailabilityOptions::forward(start).until(end), |_, _, descriptor| {
            if descriptor.is_working {
                working = true;
                return ControlFlow::Break(());
            }
            ControlFlow::Continue(())
        });
        working
    }

    /// Whether the day has any working time.
    pub fn is_day_with_working_time(&self, day: NaiveDate) -> bool {
        let start = day.and_time(NaiveTime::MIN);
        let end = day.succ_opt().map(|next| next.and_time(NaiveTime::MIN));
        self.is_working_time(start, end, false)
    }

    fn first_interval(&self, start: NaiveDateTime, end: NaiveDateTime) -> Option<(NaiveDateTime, NaiveDateTime, bool)> {
        let mut first = None;
        self.for_each_availability_interval(AvailabilityOptions::forward(start).until(end), |s, e, descriptor| {
            first = Some((s, e, descriptor.is_working));
            ControlFlow::Break(())
        });
        first
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::{CalendarInterval, CronSchedule, EndSchedule};
    use crate::config::CalendarConfig;
    use crate::time::MS_PER_HOUR;

    fn at(m: u32, d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, m, d)
            .and_then(|date| date.and_hms_opt(h, 0, 0))
            .unwrap()
    }

    /// Mon-Fri 09:00-17:00, everything else non-working.
    fn office() -> (CalendarStore, CalendarId) {
        let mut store = CalendarStore::new(CalendarConfig::default());
        let id = store.add_calendar("office", None).unwrap();
        store.set_unspecified_time_is_working(id, Some(false)).unwrap();
        let start: CronSchedule = "0 9 * * MON-FRI".parse().unwrap();
        let end = EndSchedule::parse("0 17 * * *").unwrap();
        store
            .add_interval(id, CalendarInterval::recurrent("hours", Rc::new(start), end, true))
            .unwrap();
        (store, id)
    }

    #[test]
    fn test_intervals_are_maximal() {
        let mut store = CalendarStore::new(CalendarConfig::default());
        let id = store.add_calendar("plain", None).unwrap();
        store
            .add_interval(id, CalendarInterval::fixed("off", Some(at(1, 10, 0)), Some(at(1, 11, 0)), false))
            .unwrap();
        let calendar = store.calendar(id).unwrap();
        let mut seen = Vec::new();
        // The window spans several cache chunks
        let status = calendar.for_each_availability_interval(
            AvailabilityOptions::forward(at(1, 1, 0)).until(at(4, 1, 0)),
            |s, e, d| {
                seen.push((s, e, d.is_working));
                ControlFlow::Continue(())
            },
        );
        assert_eq!(status, IterationStatus::FullRangeIterated);
        assert_eq!(
            seen,
            vec![
                (at(1, 1, 0), at(1, 10, 0), true),
                (at(1, 10, 0), at(1, 11, 0), false),
                (at(1, 11, 0), at(4, 1, 0), true),
            ]
        );
    }

    #[test]
    fn test_touching_working_intervals_merge() {
        let mut store = CalendarStore::new(CalendarConfig::default());
        let id = store.add_calendar("split shift", None).unwrap();
        store.set_unspecified_time_is_working(id, Some(false)).unwrap();
        store
            .add_interval(id, CalendarInterval::fixed("morning", Some(at(1, 2, 9)), Some(at(1, 2, 12)), true))
            .unwrap();
        store
            .add_interval(id, CalendarInterval::fixed("afternoon", Some(at(1, 2, 12)), Some(at(1, 2, 17)), true))
            .unwrap();
        let calendar = store.calendar(id).unwrap();

        let mut seen = Vec::new();
        calendar.for_each_availability_interval(
            AvailabilityOptions::forward(at(1, 2, 0)).until(at(1, 3, 0)),
            |s, e, d| {
                seen.push((s, e, d.is_working));
                ControlFlow::Continue(())
            },
        );
        assert_eq!(
            seen,
            vec![
                (at(1, 2, 0), at(1, 2, 9), false),
                (at(1, 2, 9), at(1, 2, 17), true),
                (at(1, 2, 17), at(1, 3, 0), false),
            ]
        );
        assert!(calendar.is_working_time(at(1, 2, 10), Some(at(1, 2, 14)), true));
        assert_eq!(calendar.skip_non_working_time(at(1, 2, 15), false), Some(at(1, 2, 15)));
    }

    #[test]
    fn test_long_recurrent_interval_seen_on_fresh_cache() {
        let mut store = CalendarStore::new(CalendarConfig::default());
        let id = store.add_calendar("month end close", None).unwrap();
        store.set_unspecified_time_is_working(id, Some(false)).unwrap();
        let start: CronSchedule = "0 0 1 * *".parse().unwrap();
        let end = EndSchedule::parse("0 0 28 * *").unwrap();
        store
            .add_interval(id, CalendarInterval::recurrent("open", Rc::new(start), end, true))
            .unwrap();

        let calendar = store.calendar(id).unwrap();
        assert!(calendar.is_working_time(at(1, 20, 12), None, false));
        assert!(!calendar.is_working_time(at(1, 29, 12), None, false));
        assert_eq!(calendar.skip_non_working_time(at(1, 20, 12), false), Some(at(1, 20, 12)));

        // Same answers once an earlier window is cached
        store.bump_version();
        let calendar = store.calendar(id).unwrap();
        assert!(calendar.is_working_time(at(1, 2, 0), None, false));
        assert!(calendar.is_working_time(at(1, 20, 12), None, false));
    }

    #[test]
    fn test_backward_walk() {
        let (store, id) = office();
        let calendar = store.calendar(id).unwrap();
        let mut seen = Vec::new();
        // Wednesday Jan 3, 12:00 back to Tuesday Jan 2, 12:00
        calendar.for_each_availability_interval(
            AvailabilityOptions::backward(at(1, 3, 12)).until(at(1, 2, 12)),
            |s, e, d| {
                seen.push((s, e, d.is_working));
                ControlFlow::Continue(())
            },
        );
        assert_eq!(
            seen,
            vec![
                (at(1, 3, 9), at(1, 3, 12), true),
                (at(1, 2, 17), at(1, 3, 9), false),
                (at(1, 2, 12), at(1, 2, 17), true),
            ]
        );
    }

    #[test]
    fn test_stop_and_range_status() {
        let (store, id) = office();
        let calendar = store.calendar(id).unwrap();
        let stopped = calendar.for_each_availability_interval(AvailabilityOptions::forward(at(1, 1, 0)), |_, _, _| {
            ControlFlow::Break(())
        });
        assert_eq!(stopped, IterationStatus::StoppedByIterator);

        let ranged = calendar.for_each_availability_interval(
            AvailabilityOptions::forward(at(1, 1, 0)).with_max_range_ms(2 * MS_PER_DAY),
            |_, _, _| ControlFlow::Continue(()),
        );
        assert_eq!(ranged, IterationStatus::MaxRangeReached);
    }

    #[test]
    fn test_extend_cycle_limit() {
        let mut settings = CalendarConfig::default();
        settings.chunk_days = 1;
        settings.max_cache_extend_cycles = 3;
        let mut store = CalendarStore::new(settings);
        let id = store.add_calendar("tiny", None).unwrap();
        let calendar = store.calendar(id).unwrap();
        let status = calendar.for_each_availability_interval(
            AvailabilityOptions::forward(at(1, 1, 0)).until(at(1, 10, 0)),
            |_, _, _| ControlFlow::Continue(()),
        );
        assert_eq!(status, IterationStatus::MaxCacheExtendCyclesReached);
    }

    #[test]
    fn test_end_date_over_weekend() {
        let (store, id) = office();
        let calendar = store.calendar(id).unwrap();
        // Friday Jan 5, 15:00 + 4h working time
        assert_eq!(calendar.calculate_end_date(at(1, 5, 15), 4 * MS_PER_HOUR), Some(at(1, 8, 11)));
        assert_eq!(calendar.calculate_start_date(at(1, 8, 11), 4 * MS_PER_HOUR), Some(at(1, 5, 15)));
        assert_eq!(calendar.calculate_duration_ms(at(1, 5, 15), at(1, 8, 11)), 4 * MS_PER_HOUR);
        assert_eq!(calendar.calculate_duration_ms(at(1, 8, 11), at(1, 5, 15)), -4 * MS_PER_HOUR);
    }

    #[test]
    fn test_exhausted_calendar() {
        let mut store = CalendarStore::new(CalendarConfig::default());
        let id = store.add_calendar("never", None).unwrap();
        store.set_unspecified_time_is_working(id, Some(false)).unwrap();
        let calendar = store.calendar(id).unwrap();
        let (_, remaining) = calendar.accumulate_working_time(at(1, 1, 0), MS_PER_HOUR, true);
        assert_eq!(remaining, MS_PER_HOUR);
        assert_eq!(calendar.calculate_end_date(at(1, 1, 0), MS_PER_HOUR), None);
    }

    #[test]
    fn test_skip_non_working_time() {
        let (store, id) = office();
        let calendar = store.calendar(id).unwrap();
        assert_eq!(calendar.skip_non_working_time(at(1, 6, 12), true), Some(at(1, 8, 9)));
        assert_eq!(calendar.skip_non_working_time(at(1, 6, 12), false), Some(at(1, 5, 17)));
        assert_eq!(calendar.skip_non_working_time(at(1, 8, 10), true), Some(at(1, 8, 10)));
    }

    #[test]
    fn test_working_time_checks() {
        let (store, id) = office();
        let calendar = store.calendar(id).unwrap();
        assert!(calendar.is_working_time(at(1, 2, 10), None, false));
        assert!(!calendar.is_working_time(at(1, 2, 8), None, false));
        assert!(calendar.is_working_time(at(1, 2, 8), Some(at(1, 2, 10)), false));
        assert!(!calendar.is_working_time(at(1, 2, 8), Some(at(1, 2, 10)), true));
        assert!(calendar.is_working_time(at(1, 2, 9), Some(at(1, 2, 17)), true));
        assert!(!calendar.is_working_time(at(1, 2, 9), Some(at(1, 3, 10)), true));

        assert!(calendar.is_day_with_working_time(at(1, 5, 0).date()));
        assert!(!calendar.is_day_with_working_time(at(1, 6, 0).date()));
    }
}
