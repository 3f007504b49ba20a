//! Recurrence rules and occurrence iteration.
//!
//! A recurring record (the *anchor*) owns a [`Recurrence`]: an RFC 5545
//! subset rule plus exception dates. The iteration driver expands the
//! rule into occurrence start dates inside a window, one frequency
//! variant per `FREQ` value.
//!
//! # Rule text
//!
//! ```text
//! FREQ=WEEKLY;INTERVAL=2;BYDAY=MO,WE,FR;COUNT=10
//! FREQ=MONTHLY;BYDAY=MO,TU,WE,TH,FR;BYSETPOS=-1
//! FREQ=YEARLY;BYMONTH=11;BYDAY=4TH;UNTIL=20301231T000000
//! ```
//!
//! | Part | Meaning |
//! |------|---------|
//! | `FREQ` | Period unit: day, week, month, year |
//! | `INTERVAL` | Every n-th period (default 1) |
//! | `COUNT` / `UNTIL` | Series length / inclusive end (mutually exclusive) |
//! | `BYDAY` | Weekdays, optionally with an ordinal (`2TU`, `-1FR`) |
//! | `BYMONTHDAY` | Days of month, negative from the end |
//! | `BYMONTH` | Months of year |
//! | `BYSETPOS` | Picks positions from each period's candidate list |
//!
//! # Reference
//! RFC 5545 §3.3.10 (Recurrence Rule)

mod daily;
mod exceptions;
mod iterator;
mod monthly;
mod occurrences;
mod rule;
mod weekly;
mod yearly;

pub use daily::DailyIterator;
pub use exceptions::{ExceptionDates, Recurrence};
pub use iterator::{
    collect_dates, for_each_date, frequency_iterator, process_iteration_config, FrequencyIterator,
    IterationConfig, IterationOutcome, IterationPlan, OccurrenceDate, RecurrenceAnchor, Recurring,
    MAX_OCCURRENCES_COUNT,
};
pub use monthly::MonthlyIterator;
pub use occurrences::{occurrence_id, Occurrence, OccurrenceCache, GENERATED_ID_PREFIX};
pub use rule::{DaySelector, Frequency, RecurrenceRule};
pub use weekly::WeeklyIterator;
pub use yearly::YearlyIterator;
