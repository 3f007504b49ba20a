//! End-to-end scenarios across recurrence, calendars and the commit engine.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Instant;

use chrono::{NaiveDate, NaiveDateTime};
use u_timeline::calendar::{CalendarInterval, CalendarStore};
use u_timeline::config::{CalendarConfig, ProjectConfig};
use u_timeline::engine::{ChangeListener, FieldChange, Project, RecordId, ScheduledRecord};
use u_timeline::models::{SpanField, TimeSpanValue};
use u_timeline::recurrence::{
    collect_dates, ExceptionDates, IterationConfig, Recurrence, RecurrenceAnchor, RecurrenceRule,
};
use u_timeline::time::TimeUnit;

fn at(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, d)
        .and_then(|date| date.and_hms_opt(h, 0, 0))
        .unwrap()
}

fn dates(rule: &str, anchor: NaiveDateTime, from: NaiveDateTime, to: NaiveDateTime) -> Vec<NaiveDate> {
    let recurrence = Recurrence::new(rule.parse::<RecurrenceRule>().unwrap());
    let span = TimeSpanValue::new().with_start(anchor).with_duration(1.0, TimeUnit::Hour);
    let anchor = RecurrenceAnchor::from_span(&span, &recurrence).unwrap();
    let (dates, _) = collect_dates(&anchor, &IterationConfig::window(from, to));
    dates.iter().map(|d| d.date()).collect()
}

fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

#[test]
fn weekly_on_three_weekdays() {
    let result = dates(
        "FREQ=WEEKLY;INTERVAL=1;BYDAY=MO,WE,FR",
        at(2024, 1, 1, 9),
        at(2024, 1, 1, 0),
        at(2024, 1, 15, 0),
    );
    assert_eq!(
        result,
        vec![
            day(2024, 1, 1),
            day(2024, 1, 3),
            day(2024, 1, 5),
            day(2024, 1, 8),
            day(2024, 1, 10),
            day(2024, 1, 12),
        ]
    );
}

#[test]
fn static_holiday_is_not_working() {
    let mut store = CalendarStore::new(CalendarConfig::default());
    let id = store.add_calendar("general", None).unwrap();
    store
        .add_interval(
            id,
            CalendarInterval::fixed("christmas", Some(at(2024, 12, 25, 0)), Some(at(2024, 12, 26, 0)), false),
        )
        .unwrap();
    let calendar = store.calendar(id).unwrap();
    assert!(!calendar.is_working_time(at(2024, 12, 25, 10), None, false));
    assert!(calendar.is_working_time(at(2024, 12, 24, 10), None, false));
}

#[test]
fn proposing_end_recomputes_duration() {
    let mut project = Project::new(ProjectConfig::default()).unwrap();
    let id = project.add_record(
        ScheduledRecord::new("shift")
            .with_span(TimeSpanValue::new().with_start(at(2024, 1, 1, 9)).with_duration(8.0, TimeUnit::Hour)),
    );
    assert_eq!(project.record(id).unwrap().span().end, Some(at(2024, 1, 1, 17)));

    project.set_end(id, Some(at(2024, 1, 1, 13)), Instant::now()).unwrap();
    project.commit();
    let span = project.record(id).unwrap().span();
    assert_eq!(span.start, Some(at(2024, 1, 1, 9)));
    assert!((span.duration.unwrap() - 4.0).abs() < 1e-9);
}

#[test]
fn monthly_31st_skips_short_months() {
    let result = dates(
        "FREQ=MONTHLY;BYMONTHDAY=31",
        at(2024, 1, 31, 9),
        at(2024, 1, 1, 0),
        at(2024, 4, 1, 0),
    );
    assert_eq!(result, vec![day(2024, 1, 31), day(2024, 3, 31)]);
}

#[derive(Default)]
struct Collector {
    batches: Rc<RefCell<Vec<Vec<FieldChange>>>>,
}

impl ChangeListener for Collector {
    fn changed(&mut self, changes: &[FieldChange]) -> Vec<RecordId> {
        self.batches.borrow_mut().push(changes.to_vec());
        Vec::new()
    }
}

#[test]
fn repeated_invalidation_writes_back_once() {
    let config = ProjectConfig {
        silent_initial_commit: false,
        ..ProjectConfig::default()
    };
    let mut project = Project::new(config).unwrap();
    let batches = Rc::new(RefCell::new(Vec::new()));
    project.add_listener(Box::new(Collector {
        batches: Rc::clone(&batches),
    }));
    let id = project.add_record(
        ScheduledRecord::new("meeting")
            .with_span(TimeSpanValue::new().with_start(at(2024, 1, 1, 9)).with_duration(2.0, TimeUnit::Hour)),
    );

    let now = Instant::now();
    project.set_start(id, Some(at(2024, 1, 1, 10)), now).unwrap();
    project.set_start(id, Some(at(2024, 1, 1, 8)), now).unwrap();
    let report = project.commit_at(now);

    assert_eq!(report.calculated, 1);
    assert_eq!(report.written, 1);
    let batches = batches.borrow();
    assert_eq!(batches.len(), 1);
    let start_changes: Vec<&FieldChange> = batches[0].iter().filter(|c| c.field == SpanField::Start).collect();
    assert_eq!(start_changes.len(), 1);
    assert_eq!(project.record(id).unwrap().span().start, Some(at(2024, 1, 1, 8)));
    assert!((project.record(id).unwrap().span().duration.unwrap() - 3.0).abs() < 1e-9);
}

#[test]
fn exceptions_consume_count() {
    let recurrence = Recurrence::new("FREQ=DAILY;COUNT=5".parse::<RecurrenceRule>().unwrap())
        .with_exceptions(ExceptionDates::from_dates([at(2024, 1, 3, 0)]));
    let span = TimeSpanValue::new().with_start(at(2024, 1, 1, 9)).with_duration(1.0, TimeUnit::Hour);
    let anchor = RecurrenceAnchor::from_span(&span, &recurrence).unwrap();
    let (dates, _) = collect_dates(&anchor, &IterationConfig::window(at(2024, 1, 1, 0), at(2024, 2, 1, 0)));
    let days: Vec<NaiveDate> = dates.iter().map(|d| d.date()).collect();
    assert_eq!(days, vec![day(2024, 1, 1), day(2024, 1, 2), day(2024, 1, 4), day(2024, 1, 5)]);
}

const OFFICE_CONFIG: &str = r#"{
  "hours_per_day": 8,
  "days_per_week": 5,
  "days_per_month": 20,
  "calendars": [
    { "id": "berlin", "parent": "office", "intervals": [
      { "name": "xmas", "start_date": "2024-12-25T00:00:00", "end_date": "2024-12-26T00:00:00" }
    ] },
    { "id": "office", "unspecified_time_is_working": false, "intervals": [
      { "name": "hours", "is_working": true,
        "recurrent_start_date": "0 9 * * MON-FRI", "recurrent_end_date": "0 17 * * *" }
    ] }
  ]
}"#;

#[test]
fn child_calendar_overrides_parent() {
    let config = ProjectConfig::from_json_str(OFFICE_CONFIG).unwrap();
    let project = Project::new(config).unwrap();
    let office = project.calendars().calendar(project.calendar_id("office").unwrap()).unwrap();
    let berlin = project.calendars().calendar(project.calendar_id("berlin").unwrap()).unwrap();

    assert!(office.is_working_time(at(2024, 12, 25, 10), None, false));
    assert!(!berlin.is_working_time(at(2024, 12, 25, 10), None, false));
    assert!(berlin.is_working_time(at(2024, 12, 24, 10), None, false));
    // inherited weekend
    assert!(!berlin.is_working_time(at(2024, 12, 21, 10), None, false));
    assert!(!berlin.is_day_with_working_time(day(2024, 12, 25)));
}

#[test]
fn working_time_span_skips_holiday() {
    let config = ProjectConfig::from_json_str(OFFICE_CONFIG).unwrap();
    let mut project = Project::new(config).unwrap();
    let berlin = project.calendar_id("berlin").unwrap();
    let id = project.add_record(
        ScheduledRecord::new("install")
            .with_span(TimeSpanValue::new().with_start(at(2024, 12, 24, 9)).with_duration(2.0, TimeUnit::Day))
            .with_calendar(berlin),
    );
    assert_eq!(project.record(id).unwrap().span().end, Some(at(2024, 12, 26, 17)));

    project.set_end(id, Some(at(2024, 12, 27, 17)), Instant::now()).unwrap();
    project.commit();
    assert!((project.record(id).unwrap().span().duration.unwrap() - 3.0).abs() < 1e-9);
}

#[test]
fn duration_across_dst_follows_setting() {
    for (adjust, expected) in [(true, at(2024, 3, 31, 12)), (false, at(2024, 3, 31, 13))] {
        let config = ProjectConfig {
            timezone: Some("Europe/Berlin".to_string()),
            adjust_duration_to_dst: adjust,
            ..ProjectConfig::default()
        };
        let mut project = Project::new(config).unwrap();
        let id = project.add_record(
            ScheduledRecord::new("trip")
                .with_span(TimeSpanValue::new().with_start(at(2024, 3, 30, 12)).with_duration(1.0, TimeUnit::Day)),
        );
        assert_eq!(project.record(id).unwrap().span().end, Some(expected));
    }
}
