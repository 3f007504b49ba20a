//! Calendar intervals and time windows.
//!
//! # Priority
//! Overlapping intervals are resolved by priority, highest wins:
//!
//! | Component | Value |
//! |-----------|-------|
//! | Base | 10000 |
//! | Calendar depth | depth × 100 (a child beats its parent) |
//! | Explicit priority | as configured |
//! | Default, recurrent | 20 |
//! | Default, static | 30 (one-off exceptions beat weekly patterns) |

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::rc::Rc;

use super::schedule::{EndSchedule, RecurringSchedule};
use crate::time::wall_diff_ms;

const PRIORITY_BASE: i32 = 10_000;
const PRIORITY_DEPTH_STEP: i32 = 100;
const RECURRENT_DEFAULT_PRIORITY: i32 = 20;
const STATIC_DEFAULT_PRIORITY: i32 = 30;

/// A time interval [start, end).
///
/// Half-open interval: includes start, excludes end.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimeWindow {
    /// Interval start (inclusive).
    pub start: NaiveDateTime,
    /// Interval end (exclusive).
    pub end: NaiveDateTime,
}

impl TimeWindow {
    /// Creates a new time window.
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Self {
        Self { start, end }
    }

    /// Wall-clock length (ms).
    #[inline]
    pub fn duration_ms(&self) -> i64 {
        wall_diff_ms(self.start, self.end)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// Whether an instant falls within this window.
    #[inline]
    pub fn contains(&self, date: NaiveDateTime) -> bool {
        date >= self.start && date < self.end
    }

    /// Whether two windows overlap.
    pub fn overlaps(&self, other: &Self) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// The overlapping part of two windows.
    pub fn intersection(&self, other: &Self) -> Option<Self> {
        let window = Self::new(self.start.max(other.start), self.end.min(other.end));
        (!window.is_empty()).then_some(window)
    }
}

/// How an interval is placed in time.
#[derive(Debug, Clone)]
pub enum IntervalKind {
    /// A fixed range; a missing bound is open.
    Static {
        start: Option<NaiveDateTime>,
        end: Option<NaiveDateTime>,
    },
    /// Repeats: each start instant opens an interval that the end
    /// schedule closes.
    Recurrent {
        start: Rc<dyn RecurringSchedule>,
        end: EndSchedule,
    },
}

/// A named working or non-working interval of a calendar.
#[derive(Debug, Clone)]
pub struct CalendarInterval {
    /// Display name.
    pub name: String,
    /// Working time (`true`) or a break/holiday (`false`).
    pub is_working: bool,
    /// Explicit priority (replaces the kind's default).
    pub priority: Option<i32>,
    /// Placement in time.
    pub kind: IntervalKind,
}

impl CalendarInterval {
    /// A static interval.
    pub fn fixed(
        name: impl Into<String>,
        start: Option<NaiveDateTime>,
        end: Option<NaiveDateTime>,
        is_working: bool,
    ) -> Self {
        Self {
            name: name.into(),
            is_working,
            priority: None,
            kind: IntervalKind::Static { start, end },
        }
    }

    /// A recurrent interval.
    pub fn recurrent(
        name: impl Into<String>,
        start: Rc<dyn RecurringSchedule>,
        end: EndSchedule,
        is_working: bool,
    ) -> Self {
        Self {
            name: name.into(),
            is_working,
            priority: None,
            kind: IntervalKind::Recurrent { start, end },
        }
    }

    /// Sets an explicit priority.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn is_recurrent(&self) -> bool {
        matches!(self.kind, IntervalKind::Recurrent { .. })
    }

    /// Priority of this interval in a calendar at `depth` (root = 0).
    pub fn effective_priority(&self, depth: usize) -> i32 {
        let own = self.priority.unwrap_or(if self.is_recurrent() {
            RECURRENT_DEFAULT_PRIORITY
        } else {
            STATIC_DEFAULT_PRIORITY
        });
        let depth = i32::try_from(depth).unwrap_or(i32::MAX / PRIORITY_DEPTH_STEP);
        PRIORITY_BASE
            .saturating_add(depth.saturating_mul(PRIORITY_DEPTH_STEP))
            .saturating_add(own)
    }

    /// Concrete windows of this interval intersecting `window`, clipped
    /// to it.
    ///
    /// Static bounds pass through `to_local` first. For recurrent
    /// intervals the last start before the window is included when its
    /// occurrence is still running; ends never decrease with the start,
    /// so earlier occurrences cannot reach further.
    pub fn windows_in(&self, window: TimeWindow, to_local: impl Fn(NaiveDateTime) -> NaiveDateTime) -> Vec<TimeWindow> {
        match &self.kind {
            IntervalKind::Static { start, end } => {
                let full = TimeWindow::new(
                    start.map_or(NaiveDateTime::MIN, &to_local),
                    end.map_or(NaiveDateTime::MAX, &to_local),
                );
                full.intersection(&window).into_iter().collect()
            }
            IntervalKind::Recurrent { start, end } => {
                let running = start.previous(window.start);
                let starts = start.next(usize::MAX, window.start, Some(window.end)).unwrap_or_default();
                running
                    .into_iter()
                    .chain(starts)
                    .filter_map(|s| {
                        let e = end.end_for(s)?;
                        TimeWindow::new(s, e).intersection(&window)
                    })
                    .collect()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::CronSchedule;
    use chrono::NaiveDate;

    fn at(d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, d)
            .and_then(|date| date.and_hms_opt(h, 0, 0))
            .unwrap()
    }

    fn office_hours() -> CalendarInterval {
        let start: CronSchedule = "0 9 * * MON-FRI".parse().unwrap();
        CalendarInterval::recurrent("office", Rc::new(start), EndSchedule::parse("0 17 * * *").unwrap(), true)
    }

    #[test]
    fn test_time_window() {
        let w = TimeWindow::new(at(1, 0), at(2, 0));
        assert!(w.contains(at(1, 0)));
        assert!(!w.contains(at(2, 0)));
        assert_eq!(w.duration_ms(), 86_400_000);
        assert!(w.overlaps(&TimeWindow::new(at(1, 23), at(3, 0))));
        assert!(!w.overlaps(&TimeWindow::new(at(2, 0), at(3, 0))));
        assert_eq!(
            w.intersection(&TimeWindow::new(at(1, 12), at(5, 0))),
            Some(TimeWindow::new(at(1, 12), at(2, 0)))
        );
    }

    #[test]
    fn test_effective_priority() {
        let holiday = CalendarInterval::fixed("holiday", Some(at(1, 0)), Some(at(2, 0)), false);
        assert_eq!(holiday.effective_priority(0), 10_030);
        assert_eq!(office_hours().effective_priority(1), 10_120);
        assert_eq!(office_hours().with_priority(50).effective_priority(2), 10_250);
    }

    #[test]
    fn test_static_windows_clip() {
        let open_ended = CalendarInterval::fixed("from", Some(at(3, 12)), None, true);
        let window = TimeWindow::new(at(1, 0), at(5, 0));
        assert_eq!(
            open_ended.windows_in(window, |d| d),
            vec![TimeWindow::new(at(3, 12), at(5, 0))]
        );
        let before = CalendarInterval::fixed("old", None, Some(at(1, 0)), true);
        assert!(before.windows_in(window, |d| d).is_empty());
    }

    #[test]
    fn test_recurrent_windows() {
        // Friday 5th to Tuesday 9th
        let window = TimeWindow::new(at(5, 12), at(9, 10));
        let windows = office_hours().windows_in(window, |d| d);
        assert_eq!(
            windows,
            vec![
                TimeWindow::new(at(5, 12), at(5, 17)),
                TimeWindow::new(at(8, 9), at(8, 17)),
                TimeWindow::new(at(9, 9), at(9, 10)),
            ]
        );
    }

    #[test]
    fn test_recurrent_window_running_at_start() {
        let start: CronSchedule = "0 0 1 * *".parse().unwrap();
        let close = CalendarInterval::recurrent("close", Rc::new(start), EndSchedule::parse("0 0 28 * *").unwrap(), true);
        let window = TimeWindow::new(at(20, 12), at(31, 0));
        assert_eq!(close.windows_in(window, |d| d), vec![TimeWindow::new(at(20, 12), at(28, 0))]);
        // An occurrence ending exactly at the window start is left out
        let after = TimeWindow::new(at(28, 0), at(30, 0));
        assert!(close.windows_in(after, |d| d).is_empty());
    }
}
