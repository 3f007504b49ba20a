//! Per-calendar availability cache.
//!
//! Wraps an [`IntervalCache`] with the window it has been filled for.
//! The window only ever grows, and always stays contiguous: a request
//! reaching past either side is filled with at most two sub-fills, one
//! per side, and never re-fills covered time.

use super::interval::TimeWindow;
use super::interval_cache::IntervalCache;

/// Lazily filled availability map of one calendar.
#[derive(Debug, Clone)]
pub struct CalendarIntervalCache {
    intervals: IntervalCache,
    cached: Option<TimeWindow>,
    fill_count: usize,
}

impl CalendarIntervalCache {
    /// An empty cache.
    pub fn new(default_working: bool) -> Self {
        Self {
            intervals: IntervalCache::new(default_working),
            cached: None,
            fill_count: 0,
        }
    }

    /// Window the map is valid for.
    pub fn cached_window(&self) -> Option<TimeWindow> {
        self.cached
    }

    /// Number of fills since the last reset.
    pub fn fill_count(&self) -> usize {
        self.fill_count
    }

    pub fn intervals(&self) -> &IntervalCache {
        &self.intervals
    }

    pub(crate) fn intervals_mut(&mut self) -> &mut IntervalCache {
        &mut self.intervals
    }

    /// Whether `window` lies inside the cached window.
    pub fn covers(&self, window: TimeWindow) -> bool {
        self.cached
            .is_some_and(|cached| cached.start <= window.start && window.end <= cached.end)
    }

    /// Sub-windows that must be filled so that the cache covers `window`.
    ///
    /// The result keeps the cache contiguous: a window detached from the
    /// cached one also pulls in the gap between them.
    pub fn missing(&self, window: TimeWindow) -> Vec<TimeWindow> {
        if window.is_empty() {
            return Vec::new();
        }
        let Some(cached) = self.cached else {
            return vec![window];
        };
        let mut parts = Vec::with_capacity(2);
        if window.start < cached.start {
            parts.push(TimeWindow::new(window.start, cached.start));
        }
        if window.end > cached.end {
            parts.push(TimeWindow::new(cached.end, window.end));
        }
        parts
    }

    /// Records that `part` has been filled.
    pub(crate) fn record_fill(&mut self, part: TimeWindow) {
        self.fill_count += 1;
        self.cached = Some(match self.cached {
            None => part,
            Some(cached) => TimeWindow::new(cached.start.min(part.start), cached.end.max(part.end)),
        });
    }

    /// Drops all cached segments.
    pub fn reset(&mut self, default_working: bool) {
        self.intervals.clear(default_working);
        self.cached = None;
        self.fill_count = 0;
    }
}
