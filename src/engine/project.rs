//! The invalidation/commit engine.
//!
//! # Commit Pass
//! 1. Snapshot and clear the invalidated set.
//! 2. Derive every snapshot record (calendar-aware where attached);
//!    listeners may name dependent records, which are queued for the
//!    *next* commit.
//! 3. Suspend auto-commit and write every derived value back, silently
//!    on the first commit if configured.
//! 4. Notify listeners; invalidations they request are deferred.
//! 5. Resume and re-queue what was deferred.
//!
//! Destruction observed during step 2 aborts the pass before anything is
//! written; during step 3 it stops between records, so no record is ever
//! half-written.

use chrono::NaiveDateTime;
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use super::commit::{
    CalendarMath, ChangeListener, CommitReport, DestroyHandle, Diagnostic, FieldChange,
};
use super::record::{CalendarAware, PendingEdit, RecordId, ScheduledRecord};
use super::scheduler::CommitScheduler;
use crate::calendar::{CalendarId, CalendarStore};
use crate::config::ProjectConfig;
use crate::error::{ConfigError, EngineError};
use crate::models::{derive, normalize, Derivation, DurationMath, Proposal, TimeSpanValue, WallClock};
use crate::recurrence::{IterationConfig, Occurrence, OccurrenceCache, Recurring};
use crate::time::{DurationConverter, TimeZoneModel};

/// A derived record waiting for write-back.
struct Finalized {
    id: RecordId,
    value: TimeSpanValue,
    edit: PendingEdit,
}

/// Owner of scheduled records and the calendars they use.
pub struct Project {
    records: Vec<ScheduledRecord>,
    calendars: CalendarStore,
    calendar_ids: HashMap<String, CalendarId>,
    config: ProjectConfig,
    zone: TimeZoneModel,
    converter: DurationConverter,
    invalidated: HashSet<RecordId>,
    invalidation_order: Vec<RecordId>,
    scheduler: CommitScheduler,
    listeners: Vec<Box<dyn ChangeListener>>,
    auto_commit_suspended: bool,
    deferred: Vec<RecordId>,
    pending_diagnostics: Vec<Diagnostic>,
    has_committed: bool,
    commit_count: u64,
    destroyed: DestroyHandle,
    occurrences: OccurrenceCache,
}

impl Project {
    /// Builds a project, loading the configured calendars.
    pub fn new(config: ProjectConfig) -> Result<Self, ConfigError> {
        let zone = config.time_zone()?;
        let converter = config.converter();
        let (calendars, calendar_ids) = config.build_calendars()?;
        Ok(Self {
            records: Vec::new(),
            calendars,
            calendar_ids,
            zone,
            converter,
            invalidated: HashSet::new(),
            invalidation_order: Vec::new(),
            scheduler: CommitScheduler::new(Duration::from_millis(config.commit_delay_ms)),
            listeners: Vec::new(),
            auto_commit_suspended: false,
            deferred: Vec::new(),
            pending_diagnostics: Vec::new(),
            has_committed: false,
            commit_count: 0,
            destroyed: DestroyHandle::new(),
            occurrences: OccurrenceCache::new(),
            config,
        })
    }

    pub fn config(&self) -> &ProjectConfig {
        &self.config
    }

    pub fn calendars(&self) -> &CalendarStore {
        &self.calendars
    }

    /// Mutable access to the calendars. Call [`Project::calendar_changed`]
    /// afterwards so that attached records are re-derived.
    pub fn calendars_mut(&mut self) -> &mut CalendarStore {
        &mut self.calendars
    }

    /// Calendar id of a configured calendar definition.
    pub fn calendar_id(&self, definition_id: &str) -> Option<CalendarId> {
        self.calendar_ids.get(definition_id).copied()
    }

    /// Registers a listener.
    pub fn add_listener(&mut self, listener: Box<dyn ChangeListener>) {
        self.listeners.push(listener);
    }

    /// Adds a record, normalizing its span immediately.
    pub fn add_record(&mut self, mut record: ScheduledRecord) -> RecordId {
        let id = self.records.len();
        let derivation = normalize(record.span(), self.math_for(record.calendar()).as_ref());
        let diagnostics = Self::diagnose(id, &derivation);
        self.pending_diagnostics.extend(diagnostics);
        record.set_span(derivation.value);
        record.pending = PendingEdit::default();
        self.records.push(record);
        id
    }

    pub fn record(&self, id: RecordId) -> Option<&ScheduledRecord> {
        self.records.get(id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Proposes field values for a record.
    ///
    /// Leaves the committed values untouched: derived fields are stale
    /// until the next commit.
    pub fn propose(&mut self, id: RecordId, proposal: Proposal, now: Instant) -> Result<(), EngineError> {
        self.check_alive()?;
        self.record_mut(id)?.pending.proposal.merge(proposal);
        self.invalidate(id, now)
    }

    /// Proposes a start.
    pub fn set_start(&mut self, id: RecordId, start: Option<NaiveDateTime>, now: Instant) -> Result<(), EngineError> {
        self.propose(id, Proposal::new().start(start), now)
    }

    /// Proposes an end.
    pub fn set_end(&mut self, id: RecordId, end: Option<NaiveDateTime>, now: Instant) -> Result<(), EngineError> {
        self.propose(id, Proposal::new().end(end), now)
    }

    /// Proposes a duration in the record's unit.
    pub fn set_duration(&mut self, id: RecordId, duration: Option<f64>, now: Instant) -> Result<(), EngineError> {
        self.propose(id, Proposal::new().duration(duration), now)
    }

    /// Replaces the recurrence at the next commit.
    pub fn set_recurrence(
        &mut self,
        id: RecordId,
        recurrence: Option<crate::recurrence::Recurrence>,
        now: Instant,
    ) -> Result<(), EngineError> {
        self.check_alive()?;
        self.record_mut(id)?.pending.recurrence = Some(recurrence);
        self.invalidate(id, now)
    }

    /// Attaches the record to a calendar at the next commit; the end is
    /// then recomputed in the calendar's working time.
    pub fn set_calendar(&mut self, id: RecordId, calendar: Option<CalendarId>, now: Instant) -> Result<(), EngineError> {
        self.check_alive()?;
        if let Some(calendar) = calendar {
            if self.calendars.get(calendar).is_none() {
                return Err(EngineError::UnknownCalendar(calendar));
            }
        }
        self.record_mut(id)?.pending.calendar = Some(calendar);
        self.invalidate(id, now)
    }

    /// Invalidates every record attached to `calendar` or a descendant.
    /// Returns the number invalidated.
    pub fn calendar_changed(&mut self, calendar: CalendarId, now: Instant) -> usize {
        self.calendars.bump_version();
        let affected: Vec<RecordId> = self
            .records
            .iter()
            .enumerate()
            .filter_map(|(id, record)| {
                let attached = record.calendar()?;
                let hit = attached == calendar || self.calendars.ancestors(attached).any(|a| a == calendar);
                hit.then_some(id)
            })
            .collect();
        for &id in &affected {
            // Re-deriving keeps start and duration and moves the end.
            if let Some(record) = self.records.get_mut(id) {
                if record.pending.proposal.is_empty() {
                    let start = record.span().start;
                    record.pending.proposal = Proposal::new().start(start).keep_duration(true);
                }
            }
            let _ = self.invalidate(id, now);
        }
        affected.len()
    }

    /// Marks a record for recomputation and schedules a commit.
    ///
    /// During write-back the record is deferred to the commit after the
    /// current one.
    pub fn invalidate(&mut self, id: RecordId, now: Instant) -> Result<(), EngineError> {
        self.check_alive()?;
        if id >= self.records.len() {
            return Err(EngineError::UnknownRecord(id));
        }
        if self.auto_commit_suspended {
            self.deferred.push(id);
            return Ok(());
        }
        if self.invalidated.insert(id) {
            self.invalidation_order.push(id);
        }
        if self.scheduler.schedule(now) {
            tracing::debug!(record = id, "commit scheduled");
        }
        Ok(())
    }

    pub fn is_invalidated(&self, id: RecordId) -> bool {
        self.invalidated.contains(&id)
    }

    /// Whether a commit is scheduled.
    pub fn has_scheduled_commit(&self) -> bool {
        self.scheduler.is_scheduled()
    }

    /// Drops the scheduled commit; invalidated records stay invalidated
    /// until an explicit commit.
    pub fn cancel_scheduled_commit(&mut self) -> bool {
        self.scheduler.cancel()
    }

    /// Runs the scheduled commit if it is due at `now`.
    pub fn poll(&mut self, now: Instant) -> Option<CommitReport> {
        if self.scheduler.is_due(now) {
            Some(self.commit_at(now))
        } else {
            None
        }
    }

    /// Commits now.
    pub fn commit(&mut self) -> CommitReport {
        self.commit_at(Instant::now())
    }

    /// Runs one commit pass.
    pub fn commit_at(&mut self, now: Instant) -> CommitReport {
        let mut report = CommitReport {
            diagnostics: std::mem::take(&mut self.pending_diagnostics),
            ..CommitReport::default()
        };
        if self.destroyed.is_destroyed() {
            report.skipped = true;
            return report;
        }

        self.scheduler.start();
        self.invalidated.clear();
        let snapshot = std::mem::take(&mut self.invalidation_order);
        self.commit_count += 1;
        tracing::debug!(commit = self.commit_count, records = snapshot.len(), "commit started");

        // Calculation phase.
        let mut finalized = Vec::with_capacity(snapshot.len());
        let mut next_round = Vec::new();
        for id in snapshot {
            let Some(record) = self.records.get_mut(id) else {
                continue;
            };
            let edit = std::mem::take(&mut record.pending);
            let calendar = edit.calendar.unwrap_or(record.calendar());
            let current = *record.span();

            let mut proposal = edit.proposal;
            if proposal.is_empty() && edit.calendar.is_some() {
                proposal = Proposal::new().start(current.start).keep_duration(true);
            }
            let derivation = derive(&current, &proposal, self.math_for(calendar).as_ref());
            report.diagnostics.extend(Self::diagnose(id, &derivation));
            report.calculated += 1;

            for listener in &mut self.listeners {
                next_round.extend(listener.derived(id, &derivation.value));
            }
            finalized.push(Finalized {
                id,
                value: derivation.value,
                edit,
            });

            if self.destroyed.is_destroyed() {
                tracing::warn!(commit = self.commit_count, "project destroyed during calculation, commit aborted");
                report.aborted = true;
                return report;
            }
        }

        // Write-back phase.
        self.auto_commit_suspended = true;
        let silent = !self.has_committed && self.config.silent_initial_commit;
        report.silent = silent;
        for item in finalized {
            if self.destroyed.is_destroyed() {
                report.aborted = true;
                break;
            }
            if self.write_back(item, silent, &mut report.changes) {
                report.written += 1;
            }
        }
        if !report.aborted && !silent && !report.changes.is_empty() {
            let mut requested = Vec::new();
            for listener in &mut self.listeners {
                requested.extend(listener.changed(&report.changes));
            }
            for id in requested {
                let _ = self.invalidate(id, now);
            }
        }
        self.auto_commit_suspended = false;
        self.has_committed = true;

        if !report.aborted {
            let deferred = std::mem::take(&mut self.deferred);
            for id in deferred.into_iter().chain(next_round) {
                let _ = self.invalidate(id, now);
            }
        }

        tracing::debug!(
            commit = self.commit_count,
            calculated = report.calculated,
            written = report.written,
            aborted = report.aborted,
            "commit finished"
        );
        report
    }

    /// Writes one derived record back. Returns whether anything changed.
    fn write_back(&mut self, item: Finalized, silent: bool, changes: &mut Vec<FieldChange>) -> bool {
        let Some(record) = self.records.get_mut(item.id) else {
            return false;
        };
        let old = *record.span();
        let fields = old.diff(&item.value);
        if !silent {
            changes.extend(fields.iter().map(|&field| FieldChange {
                record: item.id,
                field,
                old_value: old.field(field),
                new_value: item.value.field(field),
            }));
        }
        record.set_span(item.value);
        let mut changed = !fields.is_empty();
        if let Some(calendar) = item.edit.calendar {
            changed |= record.calendar() != calendar;
            record.set_calendar(calendar);
        }
        let recurrence_changed = item.edit.recurrence.is_some();
        if let Some(recurrence) = item.edit.recurrence {
            changed |= record.recurrence() != recurrence.as_ref();
            record.set_recurrence(recurrence);
        }
        if changed || recurrence_changed {
            let dropped = self.occurrences.invalidate_anchor(item.id);
            if dropped > 0 {
                tracing::debug!(record = item.id, dropped, "occurrence cache invalidated");
            }
        }
        changed
    }

    /// Occurrences of a recurring record intersecting `[start, end)`.
    pub fn occurrences(
        &mut self,
        anchor: RecordId,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<Occurrence>, EngineError> {
        self.check_alive()?;
        let record = self.records.get(anchor).ok_or(EngineError::UnknownRecord(anchor))?;
        let series = record.anchor().ok_or(EngineError::NotRecurring(anchor))?;
        let config = IterationConfig::default()
            .start_only(false)
            .with_week_start(self.config.week_start_day);
        Ok(self.occurrences.materialize(anchor, &series, start, end, config))
    }

    /// A materialized occurrence by its synthetic id.
    pub fn occurrence(&self, id: &str) -> Option<&Occurrence> {
        self.occurrences.get(id)
    }

    /// Handle sharing this project's destruction flag.
    pub fn destroy_handle(&self) -> DestroyHandle {
        self.destroyed.clone()
    }

    /// Destroys the project: pending work is dropped and later commits
    /// are no-ops.
    pub fn destroy(&mut self) {
        self.destroyed.destroy();
        self.scheduler.cancel();
        self.invalidated.clear();
        self.invalidation_order.clear();
        self.deferred.clear();
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.is_destroyed()
    }

    fn math_for(&self, calendar: Option<CalendarId>) -> Box<dyn DurationMath + '_> {
        match calendar.and_then(|id| self.calendars.calendar(id)) {
            Some(calendar) => Box::new(CalendarMath::new(calendar, self.converter)),
            None => Box::new(WallClock::new(
                self.zone,
                self.converter,
                self.config.adjust_duration_to_dst,
            )),
        }
    }

    fn diagnose(id: RecordId, derivation: &Derivation) -> Vec<Diagnostic> {
        derivation
            .issues
            .iter()
            .map(|issue| {
                let diagnostic = Diagnostic::from_issue(id, issue);
                tracing::warn!(record = id, kind = ?diagnostic.kind, "{}", diagnostic.message);
                diagnostic
            })
            .collect()
    }

    fn record_mut(&mut self, id: RecordId) -> Result<&mut ScheduledRecord, EngineError> {
        self.records.get_mut(id).ok_or(EngineError::UnknownRecord(id))
    }

    fn check_alive(&self) -> Result<(), EngineError> {
        if self.destroyed.is_destroyed() {
            Err(EngineError::Destroyed)
        } else {
            Ok(())
        }
    }
}
