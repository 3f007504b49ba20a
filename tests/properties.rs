//! Property-based tests for recurrence, derivation, calendars and commits.

use std::rc::Rc;
use std::time::Instant;

use chrono::{Duration, NaiveDate, NaiveDateTime, Weekday};
use proptest::prelude::*;
use u_timeline::calendar::{CalendarInterval, CalendarStore, CronSchedule, EndSchedule};
use u_timeline::config::{CalendarConfig, ProjectConfig};
use u_timeline::engine::{Project, ScheduledRecord};
use u_timeline::models::{derive, Proposal, TimeSpanValue, WallClock};
use u_timeline::recurrence::{
    collect_dates, DaySelector, ExceptionDates, Frequency, IterationConfig, Recurrence, RecurrenceAnchor,
    RecurrenceRule,
};
use u_timeline::time::TimeUnit;

// =============================================================================
// Strategies
// =============================================================================

const WEEKDAYS: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

fn base() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap()
}

fn minutes(n: i64) -> NaiveDateTime {
    base() + Duration::minutes(n)
}

fn frequency() -> impl Strategy<Value = Frequency> {
    prop_oneof![
        Just(Frequency::Daily),
        Just(Frequency::Weekly),
        Just(Frequency::Monthly),
        Just(Frequency::Yearly),
    ]
}

fn day_selector() -> impl Strategy<Value = DaySelector> {
    (0usize..7, prop_oneof![Just(0i32), -5i32..=-1, 1i32..=5]).prop_map(|(day, ordinal)| {
        if ordinal == 0 {
            DaySelector::every(WEEKDAYS[day])
        } else {
            DaySelector::nth(ordinal, WEEKDAYS[day])
        }
    })
}

fn rule() -> impl Strategy<Value = RecurrenceRule> {
    (
        frequency(),
        1u32..6,
        prop_oneof![Just(None), (1u32..50).prop_map(Some)],
        prop::collection::vec(day_selector(), 0..3),
        prop::collection::vec(prop_oneof![1i32..=31, -31i32..=-1], 0..3),
        prop::collection::vec(1u32..=12, 0..3),
        prop::collection::vec(prop_oneof![1i32..=5, -5i32..=-1], 0..2),
    )
        .prop_map(|(frequency, interval, count, days, month_days, months, positions)| {
            let mut rule = RecurrenceRule::new(frequency)
                .with_interval(interval)
                .with_days(days)
                .with_month_days(month_days)
                .with_months(months)
                .with_positions(positions);
            rule.set_count(count);
            rule
        })
}

fn occurrence_days(recurrence: &Recurrence, anchor_start: NaiveDateTime) -> Vec<NaiveDate> {
    let span = TimeSpanValue::new().with_start(anchor_start).with_duration(1.0, TimeUnit::Hour);
    let anchor = RecurrenceAnchor::from_span(&span, recurrence).unwrap();
    let window = IterationConfig::window(anchor_start, anchor_start + Duration::days(800));
    let (dates, _) = collect_dates(&anchor, &window);
    dates.iter().map(|d| d.date()).collect()
}

fn office() -> CalendarStore {
    let mut store = CalendarStore::new(CalendarConfig::default());
    let id = store.add_calendar("office", None).unwrap();
    store.set_unspecified_time_is_working(id, Some(false)).unwrap();
    let start: CronSchedule = "0 9 * * MON-FRI".parse().unwrap();
    store
        .add_interval(
            id,
            CalendarInterval::recurrent("hours", Rc::new(start), EndSchedule::parse("0 17 * * *").unwrap(), true),
        )
        .unwrap();
    store
}

// =============================================================================
// Recurrence properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Rule text written by Display parses back to the same rule.
    #[test]
    fn rule_text_roundtrip(rule in rule()) {
        let text = rule.to_string();
        let parsed: RecurrenceRule = text.parse().unwrap();
        prop_assert_eq!(parsed, rule);
    }
}

proptest! {
    // Rules that never match walk to the safety cap when counted
    #![proptest_config(ProptestConfig::with_cases(96))]

    /// Occurrences come out strictly ascending, one per day at most.
    #[test]
    fn occurrences_strictly_ascending(rule in rule(), offset in 0i64..365) {
        let anchor_start = base() + Duration::days(offset) + Duration::hours(9);
        let days = occurrence_days(&Recurrence::new(rule), anchor_start);
        prop_assert!(!days.is_empty());
        prop_assert_eq!(days[0], anchor_start.date());
        prop_assert!(days.windows(2).all(|w| w[0] < w[1]));
    }

    /// Excepting one day removes exactly that day.
    #[test]
    fn exception_removes_single_day(rule in rule(), offset in 0i64..365, pick in 0usize..1_000) {
        let anchor_start = base() + Duration::days(offset) + Duration::hours(9);
        let plain = Recurrence::new(rule.clone());
        let days = occurrence_days(&plain, anchor_start);
        prop_assume!(days.len() > 1);
        let excepted = days[1 + pick % (days.len() - 1)];

        let midnight = excepted.and_hms_opt(0, 0, 0).unwrap();
        let with_exception = Recurrence::new(rule).with_exceptions(ExceptionDates::from_dates([midnight]));
        let expected: Vec<NaiveDate> = days.iter().copied().filter(|d| *d != excepted).collect();
        prop_assert_eq!(occurrence_days(&with_exception, anchor_start), expected);
    }
}

// =============================================================================
// Derivation and calendar properties
// =============================================================================

#[derive(Clone, Debug)]
enum Edit {
    Start(i64),
    End(i64),
    Duration(i64),
}

fn edit() -> impl Strategy<Value = Edit> {
    prop_oneof![
        (0i64..100_000).prop_map(Edit::Start),
        (0i64..100_000).prop_map(Edit::End),
        (0i64..10_000).prop_map(Edit::Duration),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// After any edits the three fields stay consistent.
    #[test]
    fn derivation_keeps_fields_consistent(
        start in 0i64..100_000,
        length in 0i64..10_000,
        edits in prop::collection::vec(prop::collection::vec(edit(), 1..3), 1..6),
    ) {
        let math = WallClock::default();
        let mut span = TimeSpanValue::new()
            .with_start(minutes(start))
            .with_duration(length as f64, TimeUnit::Minute);
        span = derive(&span, &Proposal::all(&span), &math).value;

        for batch in edits {
            let mut proposal = Proposal::new();
            for edit in batch {
                proposal = match edit {
                    Edit::Start(m) => proposal.start(Some(minutes(m))),
                    Edit::End(m) => proposal.end(Some(minutes(m))),
                    Edit::Duration(m) => proposal.duration(Some(m as f64)),
                };
            }
            span = derive(&span, &proposal, &math).value;

            let (s, e, d) = (span.start.unwrap(), span.end.unwrap(), span.duration.unwrap());
            prop_assert!(s <= e);
            prop_assert_eq!((e - s).num_minutes() as f64, d);
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    /// Working time over adjacent ranges adds up.
    #[test]
    fn working_time_is_additive(a in 0i64..1_000, b in 0i64..1_000, c in 0i64..1_000) {
        let mut hours = [a, b, c];
        hours.sort_unstable();
        let [a, b, c] = hours.map(|h| base() + Duration::hours(h));

        let store = office();
        let calendar = store.calendar(0).unwrap();
        let left = calendar.calculate_duration_ms(a, b);
        let right = calendar.calculate_duration_ms(b, c);
        prop_assert_eq!(left + right, calendar.calculate_duration_ms(a, c));
    }

    /// Walking X then Y working hours lands where walking X + Y does.
    #[test]
    fn accumulated_working_time_composes(
        start in 0i64..20_000,
        x in 1i64..1_800,
        y in 1i64..1_800,
        is_forward in any::<bool>(),
    ) {
        let store = office();
        let calendar = store.calendar(0).unwrap();
        let date = base() + Duration::minutes(start * 5);
        let (x, y) = (x * 60_000, y * 60_000);

        let (first, rest) = calendar.accumulate_working_time(date, x, is_forward);
        prop_assert_eq!(rest, 0);
        let (second, rest) = calendar.accumulate_working_time(first, y, is_forward);
        prop_assert_eq!(rest, 0);
        let (direct, rest) = calendar.accumulate_working_time(date, x + y, is_forward);
        prop_assert_eq!(rest, 0);
        prop_assert_eq!(second, direct);
    }

    /// Moving the end by working time and measuring it back is lossless.
    #[test]
    fn working_time_end_roundtrip(start in 0i64..1_000, length in 1i64..80) {
        let store = office();
        let calendar = store.calendar(0).unwrap();
        let start = base() + Duration::hours(start);
        let ms = length * 3_600_000;
        let end = calendar.calculate_end_date(start, ms).unwrap();
        prop_assert_eq!(calendar.calculate_duration_ms(start, end), ms);
        prop_assert!(calendar.is_working_time(end - Duration::milliseconds(1), None, false));
    }

    /// A second commit with nothing proposed changes nothing.
    #[test]
    fn commit_is_idempotent(start in 0i64..100_000, length in 0i64..10_000, moved in 0i64..100_000) {
        let mut project = Project::new(ProjectConfig::default()).unwrap();
        let id = project.add_record(
            ScheduledRecord::new("item").with_span(
                TimeSpanValue::new()
                    .with_start(minutes(start))
                    .with_duration(length as f64, TimeUnit::Minute),
            ),
        );
        let now = Instant::now();
        project.set_start(id, Some(minutes(moved)), now).unwrap();
        project.commit_at(now);
        let committed = *project.record(id).unwrap().span();

        let report = project.commit_at(now);
        prop_assert_eq!(report.calculated, 0);
        project.invalidate(id, now).unwrap();
        let report = project.commit_at(now);
        prop_assert_eq!(report.calculated, 1);
        prop_assert_eq!(report.written, 0);
        prop_assert_eq!(*project.record(id).unwrap().span(), committed);
    }
}

