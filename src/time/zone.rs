//! Time zone offsets and DST compensation.
//!
//! # DST Rule
//! Durations are either *real elapsed* time (the default) or *wall-clock*
//! length (`adjust_duration_to_dst`). Adding real elapsed time to a
//! wall-clock instant means correcting the naive sum by the difference
//! of the UTC offsets of the two endpoints; measuring real elapsed time
//! subtracts the same delta from the wall-clock difference.

use chrono::{NaiveDateTime, Offset, TimeZone};
use chrono_tz::Tz;

use super::{add_wall_ms, wall_diff_ms};
use crate::error::ConfigError;

/// Optional IANA zone used for offset lookups.
///
/// Without a zone every offset is 0 and all DST corrections vanish.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TimeZoneModel {
    tz: Option<Tz>,
}

impl TimeZoneModel {
    /// A zone-less model (all offsets 0).
    pub fn floating() -> Self {
        Self { tz: None }
    }

    /// Model backed by a `chrono_tz` zone.
    pub fn with_zone(tz: Tz) -> Self {
        Self { tz: Some(tz) }
    }

    /// Looks up an IANA zone by name (e.g. `"Europe/Berlin"`).
    pub fn named(name: &str) -> Result<Self, ConfigError> {
        name.parse::<Tz>()
            .map(Self::with_zone)
            .map_err(|e| ConfigError::InvalidTimeZone(format!("{name}: {e}")))
    }

    /// The underlying zone, if any.
    pub fn zone(&self) -> Option<Tz> {
        self.tz
    }

    /// UTC offset (minutes east of UTC) in effect at a local instant.
    ///
    /// Ambiguous instants (fall-back overlap) resolve to the earlier
    /// mapping; instants inside a spring-forward gap use the offset
    /// obtained by reading the value as UTC.
    pub fn offset_minutes(&self, local: NaiveDateTime) -> i32 {
        let Some(tz) = self.tz else {
            return 0;
        };
        let offset = match tz.offset_from_local_datetime(&local).earliest() {
            Some(offset) => offset.fix(),
            None => tz.offset_from_utc_datetime(&local).fix(),
        };
        offset.local_minus_utc() / 60
    }

    /// Offset change (ms) between two local instants: `offset(to) - offset(from)`.
    pub fn offset_delta_ms(&self, from: NaiveDateTime, to: NaiveDateTime) -> i64 {
        i64::from(self.offset_minutes(to) - self.offset_minutes(from)) * 60_000
    }

    /// Adds a duration to a local instant.
    ///
    /// With `wall_clock` the naive sum is returned; otherwise `ms` is
    /// treated as real elapsed time.
    pub fn add_ms(&self, date: NaiveDateTime, ms: i64, wall_clock: bool) -> Option<NaiveDateTime> {
        let naive = add_wall_ms(date, ms)?;
        if wall_clock || self.tz.is_none() {
            return Some(naive);
        }
        add_wall_ms(naive, self.offset_delta_ms(date, naive))
    }

    /// Duration between two local instants.
    ///
    /// With `wall_clock` this is the naive difference; otherwise the real
    /// elapsed time.
    pub fn diff_ms(&self, start: NaiveDateTime, end: NaiveDateTime, wall_clock: bool) -> i64 {
        let naive = wall_diff_ms(start, end);
        if wall_clock {
            naive
        } else {
            naive - self.offset_delta_ms(start, end)
        }
    }

    /// Converts a UTC instant into this zone's local wall-clock time.
    pub fn utc_to_local(&self, utc: NaiveDateTime) -> NaiveDateTime {
        match self.tz {
            Some(tz) => tz.from_utc_datetime(&utc).naive_local(),
            None => utc,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::MS_PER_HOUR;
    use chrono::NaiveDate;

    fn at(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .and_then(|date| date.and_hms_opt(h, 0, 0))
            .unwrap()
    }

    #[test]
    fn test_floating_has_no_offsets() {
        let zone = TimeZoneModel::floating();
        assert_eq!(zone.offset_minutes(at(2024, 7, 1, 0)), 0);
        assert_eq!(zone.add_ms(at(2024, 3, 30, 12), 24 * MS_PER_HOUR, false), Some(at(2024, 3, 31, 12)));
    }

    #[test]
    fn test_berlin_offsets() {
        let zone = TimeZoneModel::named("Europe/Berlin").unwrap();
        assert_eq!(zone.offset_minutes(at(2024, 1, 15, 12)), 60);
        assert_eq!(zone.offset_minutes(at(2024, 7, 15, 12)), 120);
        assert_eq!(zone.offset_delta_ms(at(2024, 3, 30, 12), at(2024, 3, 31, 12)), MS_PER_HOUR);
    }

    #[test]
    fn test_real_elapsed_across_spring_forward() {
        let zone = TimeZoneModel::named("Europe/Berlin").unwrap();
        let start = at(2024, 3, 30, 12);
        // 24 real hours cover 25 wall-clock hours on the transition day
        assert_eq!(zone.add_ms(start, 24 * MS_PER_HOUR, false), Some(at(2024, 3, 31, 13)));
        assert_eq!(zone.diff_ms(start, at(2024, 3, 31, 13), false), 24 * MS_PER_HOUR);
    }

    #[test]
    fn test_wall_clock_across_spring_forward() {
        let zone = TimeZoneModel::named("Europe/Berlin").unwrap();
        let start = at(2024, 3, 30, 12);
        assert_eq!(zone.add_ms(start, 24 * MS_PER_HOUR, true), Some(at(2024, 3, 31, 12)));
        assert_eq!(zone.diff_ms(start, at(2024, 3, 31, 12), true), 24 * MS_PER_HOUR);
    }

    #[test]
    fn test_invalid_zone_name() {
        assert!(TimeZoneModel::named("Mars/Olympus").is_err());
    }

    #[test]
    fn test_utc_to_local() {
        let zone = TimeZoneModel::named("Europe/Berlin").unwrap();
        assert_eq!(zone.utc_to_local(at(2024, 12, 25, 0)), at(2024, 12, 25, 1));
        assert_eq!(TimeZoneModel::floating().utc_to_local(at(2024, 12, 25, 0)), at(2024, 12, 25, 0));
    }
}
