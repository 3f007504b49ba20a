//! Time primitives shared by every subsystem.
//!
//! # Time Model
//! All instants are wall-clock [`NaiveDateTime`] values in the project's
//! time zone. The zone itself lives in [`TimeZoneModel`], which supplies
//! UTC offsets so that DST transitions can be compensated when durations
//! are added or measured.
//!
//! - [`TimeUnit`]: duration units (millisecond … year)
//! - [`DurationConverter`]: unit ↔ millisecond conversion with
//!   configurable hours-per-day / days-per-week / days-per-month
//! - [`TimeZoneModel`]: offsets, DST-aware add/diff
//! - [`format`]: the basic ISO form `YYYYMMDDTHHmmss` used by rule text
//!   and exception lists, plus canonical date keys

pub mod format;
mod unit;
mod zone;

pub use unit::{DurationConverter, TimeUnit};
pub use zone::TimeZoneModel;

use chrono::{Duration, NaiveDateTime};

/// Milliseconds in one (24 hour) day.
pub const MS_PER_DAY: i64 = 86_400_000;

/// Milliseconds in one hour.
pub const MS_PER_HOUR: i64 = 3_600_000;

/// Adds `ms` milliseconds of wall-clock time; `None` on overflow.
pub fn add_wall_ms(date: NaiveDateTime, ms: i64) -> Option<NaiveDateTime> {
    date.checked_add_signed(Duration::try_milliseconds(ms)?)
}

/// Wall-clock milliseconds between two instants (`end - start`).
#[inline]
pub fn wall_diff_ms(start: NaiveDateTime, end: NaiveDateTime) -> i64 {
    end.signed_duration_since(start).num_milliseconds()
}
