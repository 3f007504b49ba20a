//! Validation of calendar definitions.
//!
//! Checks structural integrity of declarative calendars before they are
//! loaded. Detects:
//! - Duplicate calendar IDs
//! - Parents that don't exist
//! - Circular parent chains
//! - Static intervals ending before they start
//! - Intervals that are neither static nor recurrent
//! - Recurrent schedules that don't parse
//!
//! # Reference
//! Cormen et al. (2009), "Introduction to Algorithms", Ch. 22.3 (Depth-First Search)

use crate::calendar::{CronSchedule, EndSchedule};
use crate::config::{CalendarDefinition, IntervalDefinition};
use std::collections::{HashMap, HashSet};

/// Validation result.
pub type ValidationResult = Result<(), Vec<ValidationError>>;

/// A validation error.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    /// Error category.
    pub kind: ValidationErrorKind,
    /// Human-readable description.
    pub message: String,
}

/// Categories of validation errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationErrorKind {
    /// Two calendars share the same ID.
    DuplicateId,
    /// A calendar names a parent that doesn't exist.
    UnknownParent,
    /// The parent chain loops back on itself.
    CyclicHierarchy,
    /// A static interval ends before it starts.
    InvalidRange,
    /// An interval has neither static bounds nor both schedules.
    IncompleteInterval,
    /// A recurrent schedule doesn't parse.
    InvalidSchedule,
}

impl ValidationError {
    fn new(kind: ValidationErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Validates calendar definitions.
///
/// Checks:
/// 1. No duplicate calendar IDs
/// 2. All parent references point to existing calendars
/// 3. No circular parent chains
/// 4. Every interval is static with `end >= start`, or recurrent with
///    two parsable schedules
///
/// # Returns
/// `Ok(())` if all checks pass, `Err(errors)` with all detected issues.
pub fn validate_calendars(calendars: &[CalendarDefinition]) -> ValidationResult {
    let mut errors = Vec::new();

    let mut ids = HashSet::new();
    for calendar in calendars {
        if !ids.insert(calendar.id.as_str()) {
            errors.push(ValidationError::new(
                ValidationErrorKind::DuplicateId,
                format!("Duplicate calendar ID: {}", calendar.id),
            ));
        }
    }

    for calendar in calendars {
        if let Some(parent) = &calendar.parent {
            if !ids.contains(parent.as_str()) {
                errors.push(ValidationError::new(
                    ValidationErrorKind::UnknownParent,
                    format!("Calendar '{}' references unknown parent '{}'", calendar.id, parent),
                ));
            }
        }
        for interval in &calendar.intervals {
            validate_interval(&calendar.id, interval, &mut errors);
        }
    }

    if let Some(cycle_err) = detect_cycles(calendars) {
        errors.push(cycle_err);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_interval(calendar: &str, interval: &IntervalDefinition, errors: &mut Vec<ValidationError>) {
    if interval.is_recurrent() {
        match (&interval.recurrent_start_date, &interval.recurrent_end_date) {
            (Some(start), Some(end)) => {
                if let Err(e) = start.parse::<CronSchedule>() {
                    errors.push(ValidationError::new(
                        ValidationErrorKind::InvalidSchedule,
                        format!("Interval '{}' of calendar '{calendar}': start schedule: {e}", interval.name),
                    ));
                }
                if let Err(e) = EndSchedule::parse(end) {
                    errors.push(ValidationError::new(
                        ValidationErrorKind::InvalidSchedule,
                        format!("Interval '{}' of calendar '{calendar}': end schedule: {e}", interval.name),
                    ));
                }
            }
            _ => errors.push(ValidationError::new(
                ValidationErrorKind::IncompleteInterval,
                format!(
                    "Interval '{}' of calendar '{calendar}' needs both recurrent schedules",
                    interval.name
                ),
            )),
        }
        return;
    }

    match (interval.start_date, interval.end_date) {
        (None, None) => errors.push(ValidationError::new(
            ValidationErrorKind::IncompleteInterval,
            format!("Interval '{}' of calendar '{calendar}' has no dates", interval.name),
        )),
        (Some(start), Some(end)) if end < start => errors.push(ValidationError::new(
            ValidationErrorKind::InvalidRange,
            format!(
                "Interval '{}' of calendar '{calendar}' ends ({end}) before it starts ({start})",
                interval.name
            ),
        )),
        _ => {}
    }
}

/// Detects cycles in the parent graph using DFS.
fn detect_cycles(calendars: &[CalendarDefinition]) -> Option<ValidationError> {
    // child → parent edges
    let mut adj: HashMap<&str, Vec<&str>> = HashMap::new();
    for calendar in calendars {
        if let Some(parent) = &calendar.parent {
            adj.entry(calendar.id.as_str()).or_default().push(parent.as_str());
        }
    }

    let mut visited = HashSet::new();
    let mut in_stack = HashSet::new();

    for calendar in calendars {
        let node = calendar.id.as_str();
        if !visited.contains(node) && has_cycle_dfs(node, &adj, &mut visited, &mut in_stack) {
            return Some(ValidationError::new(
                ValidationErrorKind::CyclicHierarchy,
                format!("Circular parent chain detected involving calendar '{node}'"),
            ));
        }
    }

    None
}

fn has_cycle_dfs<'a>(
    node: &'a str,
    adj: &HashMap<&'a str, Vec<&'a str>>,
    visited: &mut HashSet<&'a str>,
    in_stack: &mut HashSet<&'a str>,
) -> bool {
    visited.insert(node);
    in_stack.insert(node);

    if let Some(neighbors) = adj.get(node) {
        for &next in neighbors {
            if in_stack.contains(next) {
                return true; // Back edge → cycle
            }
            if !visited.contains(next) && has_cycle_dfs(next, adj, visited, in_stack) {
                return true;
            }
        }
    }

    in_stack.remove(node);
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime};

    fn day(d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 12, d)
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .unwrap()
    }

    fn sample_calendars() -> Vec<CalendarDefinition> {
        vec![
            CalendarDefinition::new("general")
                .with_unspecified_time_is_working(false)
                .with_interval(IntervalDefinition::recurrent("hours", "0 9 * * MON-FRI", "0 17 * * *").working(true)),
            CalendarDefinition::new("team")
                .with_parent("general")
                .with_interval(IntervalDefinition::fixed("xmas", Some(day(25)), Some(day(26)))),
            CalendarDefinition::new("night")
                .with_parent("general")
                .with_interval(IntervalDefinition::recurrent("late", "0 22 * * *", "EOD").working(true)),
        ]
    }

    #[test]
    fn test_valid_calendars() {
        assert!(validate_calendars(&sample_calendars()).is_ok());
    }

    #[test]
    fn test_duplicate_id() {
        let mut calendars = sample_calendars();
        calendars.push(CalendarDefinition::new("team"));
        let errors = validate_calendars(&calendars).unwrap_err();
        assert!(errors.iter().any(|e| e.kind == ValidationErrorKind::DuplicateId));
    }

    #[test]
    fn test_unknown_parent() {
        let calendars = vec![CalendarDefinition::new("a").with_parent("ghost")];
        let errors = validate_calendars(&calendars).unwrap_err();
        assert!(errors.iter().any(|e| e.kind == ValidationErrorKind::UnknownParent));
    }

    #[test]
    fn test_cyclic_hierarchy() {
        // a → b → c → a
        let calendars = vec![
            CalendarDefinition::new("a").with_parent("c"),
            CalendarDefinition::new("b").with_parent("a"),
            CalendarDefinition::new("c").with_parent("b"),
        ];
        let errors = validate_calendars(&calendars).unwrap_err();
        assert!(errors.iter().any(|e| e.kind == ValidationErrorKind::CyclicHierarchy));
    }

    #[test]
    fn test_no_cycle_in_chain() {
        let calendars = vec![
            CalendarDefinition::new("a"),
            CalendarDefinition::new("b").with_parent("a"),
            CalendarDefinition::new("c").with_parent("b"),
        ];
        assert!(validate_calendars(&calendars).is_ok());
    }

    #[test]
    fn test_interval_checks() {
        let calendars = vec![CalendarDefinition::new("a")
            .with_interval(IntervalDefinition::fixed("backwards", Some(day(26)), Some(day(25))))
            .with_interval(IntervalDefinition::fixed("nothing", None, None))
            .with_interval(IntervalDefinition::recurrent("bad", "every monday", "EOD"))
            .with_interval(IntervalDefinition {
                name: "half".into(),
                recurrent_start_date: Some("0 9 * * *".into()),
                ..IntervalDefinition::default()
            })];
        let errors = validate_calendars(&calendars).unwrap_err();
        let kinds: Vec<_> = errors.iter().map(|e| e.kind.clone()).collect();
        assert_eq!(
            kinds,
            vec![
                ValidationErrorKind::InvalidRange,
                ValidationErrorKind::IncompleteInterval,
                ValidationErrorKind::InvalidSchedule,
                ValidationErrorKind::IncompleteInterval,
            ]
        );
    }

    #[test]
    fn test_open_ended_interval_is_valid() {
        let calendars = vec![CalendarDefinition::new("a")
            .with_interval(IntervalDefinition::fixed("from", Some(day(1)), None))];
        assert!(validate_calendars(&calendars).is_ok());
    }
}
