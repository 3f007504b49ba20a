//! Working-time calendars.
//!
//! A calendar answers "is this working time?" and "when do N hours of
//! work end?". It is made of [`CalendarInterval`]s, static ranges or
//! cron-driven recurring ones, each marked working or non-working.
//! Overlaps resolve by priority; time no interval covers follows the
//! calendar's `unspecified_time_is_working` setting.
//!
//! # Caching
//! Resolved availability is kept per calendar in a sorted map that is
//! filled lazily, one chunk (default 30 days) at a time, as queries walk
//! through time. A child calendar first imports its parent's resolved
//! intervals for the chunk, then layers its own on top. Any change to
//! any calendar clears all caches.
//!
//! # Example
//!
//! ```
//! use std::rc::Rc;
//! use chrono::NaiveDate;
//! use u_timeline::calendar::{CalendarInterval, CalendarStore, CronSchedule, EndSchedule};
//! use u_timeline::config::CalendarConfig;
//!
//! let mut store = CalendarStore::new(CalendarConfig::default());
//! let id = store.add_calendar("office", None).unwrap();
//! store.set_unspecified_time_is_working(id, Some(false)).unwrap();
//! let start: CronSchedule = "0 9 * * MON-FRI".parse().unwrap();
//! let end = EndSchedule::parse("0 17 * * *").unwrap();
//! store.add_interval(id, CalendarInterval::recurrent("hours", Rc::new(start), end, true)).unwrap();
//!
//! let monday = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(10, 0, 0).unwrap();
//! assert!(store.calendar(id).unwrap().is_working_time(monday, None, false));
//! ```

mod cache;
mod interval;
mod interval_cache;
mod query;
mod schedule;
mod store;

pub use cache::CalendarIntervalCache;
pub use interval::{CalendarInterval, IntervalKind, TimeWindow};
pub use interval_cache::{AvailabilityDescriptor, IntervalCache, IntervalRef, Segment};
pub use query::{AvailabilityOptions, CalendarRef, IterationStatus};
pub use schedule::{CronSchedule, EndSchedule, RecurringSchedule};
pub use store::{CalendarId, CalendarNode, CalendarStore};
