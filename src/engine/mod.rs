//! Record ownership and the invalidation/commit cycle.
//!
//! Edits are proposed against a [`Project`], which marks the record
//! invalidated and schedules a commit. The commit derives every
//! invalidated record in one pass and writes the results back
//! atomically.
//!
//! ```
//! use std::time::Instant;
//! use chrono::NaiveDate;
//! use u_timeline::config::ProjectConfig;
//! use u_timeline::engine::{Project, ScheduledRecord};
//! use u_timeline::models::TimeSpanValue;
//! use u_timeline::time::TimeUnit;
//!
//! let nine = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(9, 0, 0).unwrap();
//! let mut project = Project::new(ProjectConfig::default()).unwrap();
//! let id = project.add_record(
//!     ScheduledRecord::new("review")
//!         .with_span(TimeSpanValue::new().with_start(nine).with_duration(2.0, TimeUnit::Hour)),
//! );
//!
//! project.set_duration(id, Some(3.0), Instant::now()).unwrap();
//! project.commit();
//! assert_eq!(project.record(id).unwrap().span().end, nine.checked_add_signed(chrono::Duration::hours(3)));
//! ```

mod commit;
mod project;
mod record;
mod scheduler;

pub use commit::{
    CalendarMath, ChangeListener, CommitReport, DestroyHandle, Diagnostic, DiagnosticKind,
    FieldChange,
};
pub use project::Project;
pub use record::{CalendarAware, RecordId, ScheduledRecord};
pub use scheduler::CommitScheduler;
