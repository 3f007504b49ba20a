//! Calendar arena.
//!
//! Calendars form a forest: each may name a parent whose intervals it
//! inherits and overrides. Calendars live in one arena and refer to
//! their parent by id. Any change to any calendar clears every cache.

use std::cell::RefCell;

use super::cache::CalendarIntervalCache;
use super::interval::{CalendarInterval, TimeWindow};
use super::interval_cache::IntervalRef;
use super::query::CalendarRef;
use crate::config::CalendarConfig;
use crate::error::EngineError;
use crate::time::TimeZoneModel;

/// Index of a calendar in its store.
pub type CalendarId = usize;

/// One calendar of the store.
#[derive(Debug)]
pub struct CalendarNode {
    /// Display name.
    pub name: String,
    /// Parent calendar.
    pub parent: Option<CalendarId>,
    /// Status of time no interval covers; `None` inherits.
    pub unspecified_time_is_working: Option<bool>,
    /// Own intervals.
    pub intervals: Vec<CalendarInterval>,
    pub(crate) cache: RefCell<CalendarIntervalCache>,
}

/// Arena of hierarchical calendars.
#[derive(Debug, Default)]
pub struct CalendarStore {
    calendars: Vec<CalendarNode>,
    zone: TimeZoneModel,
    settings: CalendarConfig,
    adjust_duration_to_dst: bool,
    version: u64,
}

impl CalendarStore {
    /// An empty store.
    pub fn new(settings: CalendarConfig) -> Self {
        Self {
            settings,
            ..Self::default()
        }
    }

    /// Sets the project zone. Static interval bounds are then read as UTC.
    pub fn with_zone(mut self, zone: TimeZoneModel) -> Self {
        self.zone = zone;
        self.bump_version();
        self
    }

    /// Measures working time as wall-clock length.
    pub fn with_dst_adjustment(mut self, adjust_duration_to_dst: bool) -> Self {
        self.adjust_duration_to_dst = adjust_duration_to_dst;
        self
    }

    pub fn zone(&self) -> &TimeZoneModel {
        &self.zone
    }

    pub fn settings(&self) -> &CalendarConfig {
        &self.settings
    }

    pub fn adjust_duration_to_dst(&self) -> bool {
        self.adjust_duration_to_dst
    }

    /// Changes on every modification of any calendar.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn len(&self) -> usize {
        self.calendars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calendars.is_empty()
    }

    /// Adds a calendar.
    pub fn add_calendar(&mut self, name: impl Into<String>, parent: Option<CalendarId>) -> Result<CalendarId, EngineError> {
        if let Some(parent) = parent {
            self.node(parent)?;
        }
        let id = self.calendars.len();
        self.calendars.push(CalendarNode {
            name: name.into(),
            parent,
            unspecified_time_is_working: None,
            intervals: Vec::new(),
            cache: RefCell::new(CalendarIntervalCache::new(true)),
        });
        self.bump_version();
        Ok(id)
    }

    /// Moves a calendar under a new parent.
    pub fn set_parent(&mut self, id: CalendarId, parent: Option<CalendarId>) -> Result<(), EngineError> {
        self.node(id)?;
        if let Some(parent) = parent {
            self.node(parent)?;
            if parent == id || self.ancestors(parent).any(|ancestor| ancestor == id) {
                return Err(EngineError::CalendarCycle(id));
            }
        }
        self.node_mut(id)?.parent = parent;
        self.bump_version();
        Ok(())
    }

    /// Adds an interval; returns its index.
    pub fn add_interval(&mut self, id: CalendarId, interval: CalendarInterval) -> Result<usize, EngineError> {
        let node = self.node_mut(id)?;
        node.intervals.push(interval);
        let index = node.intervals.len() - 1;
        self.bump_version();
        Ok(index)
    }

    /// Removes an interval by index.
    pub fn remove_interval(&mut self, id: CalendarId, index: usize) -> Result<CalendarInterval, EngineError> {
        let node = self.node_mut(id)?;
        if index >= node.intervals.len() {
            return Err(EngineError::UnknownInterval { calendar: id, index });
        }
        let removed = node.intervals.remove(index);
        self.bump_version();
        Ok(removed)
    }

    /// Sets the status of time no interval covers (`None` inherits).
    pub fn set_unspecified_time_is_working(&mut self, id: CalendarId, value: Option<bool>) -> Result<(), EngineError> {
        self.node_mut(id)?.unspecified_time_is_working = value;
        self.bump_version();
        Ok(())
    }

    /// A calendar by id.
    pub fn get(&self, id: CalendarId) -> Option<&CalendarNode> {
        self.calendars.get(id)
    }

    /// Query handle for a calendar.
    pub fn calendar(&self, id: CalendarId) -> Option<CalendarRef<'_>> {
        self.calendars.get(id).map(|_| CalendarRef::new(self, id))
    }

    /// Looks a calendar up by name.
    pub fn find(&self, name: &str) -> Option<CalendarId> {
        self.calendars.iter().position(|node| node.name == name)
    }

    /// Parent chain of `id`, nearest first.
    pub fn ancestors(&self, id: CalendarId) -> impl Iterator<Item = CalendarId> + '_ {
        let mut current = self.calendars.get(id).and_then(|node| node.parent);
        let mut steps = 0;
        std::iter::from_fn(move || {
            let id = current?;
            steps += 1;
            if steps > self.calendars.len() {
                return None;
            }
            current = self.calendars.get(id).and_then(|node| node.parent);
            Some(id)
        })
    }

    /// Depth in the hierarchy (root = 0).
    pub fn depth(&self, id: CalendarId) -> usize {
        self.ancestors(id).count()
    }

    /// Resolved status of unspecified time: own setting, else the nearest
    /// ancestor's, else working.
    pub fn unspecified_time_is_working(&self, id: CalendarId) -> bool {
        std::iter::once(id)
            .chain(self.ancestors(id))
            .find_map(|c| self.calendars.get(c).and_then(|node| node.unspecified_time_is_working))
            .unwrap_or(true)
    }

    /// Clears every cache and advances the version.
    pub fn bump_version(&mut self) {
        self.version += 1;
        for id in 0..self.calendars.len() {
            let default_working = self.unspecified_time_is_working(id);
            self.calendars[id].cache.borrow_mut().reset(default_working);
        }
    }

    /// Extends the cache of `id` to cover `window`.
    pub(crate) fn ensure_cache_filled(&self, id: CalendarId, window: TimeWindow) {
        let Some(node) = self.calendars.get(id) else {
            return;
        };
        let parts = node.cache.borrow().missing(window);
        for part in parts {
            self.fill_cache(id, part);
        }
    }

    fn fill_cache(&self, id: CalendarId, part: TimeWindow) {
        let Some(node) = self.calendars.get(id) else {
            return;
        };

        // Inherited intervals first, as the parent resolved them.
        let inherited = match node.parent {
            Some(parent) => {
                self.ensure_cache_filled(parent, part);
                self.calendars
                    .get(parent)
                    .map(|p| p.cache.borrow().intervals().segments_in(part.start, part.end))
                    .unwrap_or_default()
            }
            None => Vec::new(),
        };

        let depth = self.depth(id);
        let mut cache = node.cache.borrow_mut();
        let map = cache.intervals_mut();
        for segment in &inherited {
            let end = segment.end.unwrap_or(part.end);
            for interval in &segment.descriptor.intervals {
                map.add(segment.start, end, *interval);
            }
        }

        let mut added = 0usize;
        for (index, interval) in node.intervals.iter().enumerate() {
            let reference = IntervalRef {
                calendar: id,
                index,
                priority: interval.effective_priority(depth),
                is_working: interval.is_working,
            };
            for window in interval.windows_in(part, |d| self.zone.utc_to_local(d)) {
                map.add(window.start, window.end, reference);
                added += 1;
            }
        }
        cache.record_fill(part);
        tracing::debug!(
            calendar = %node.name,
            start = %part.start,
            end = %part.end,
            inherited = inherited.len(),
            added,
            "filled calendar cache"
        );
    }

    fn node(&self, id: CalendarId) -> Result<&CalendarNode, EngineError> {
        self.calendars.get(id).ok_or(EngineError::UnknownCalendar(id))
    }

    fn node_mut(&mut self, id: CalendarId) -> Result<&mut CalendarNode, EngineError> {
        self.calendars.get_mut(id).ok_or(EngineError::UnknownCalendar(id))
    }
}
