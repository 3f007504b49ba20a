//! Sorted-map interval structure.
//!
//! Each key opens a segment that lasts until the next key; the value
//! describes every calendar interval covering that segment. A sentinel
//! at [`NaiveDateTime::MIN`] holds the "unspecified time" descriptor, so
//! every instant has exactly one segment. Neighbouring segments never
//! carry equal descriptors.

use chrono::NaiveDateTime;
use std::collections::BTreeMap;
use std::ops::Bound::{Excluded, Included, Unbounded};
use std::rc::Rc;

use super::store::CalendarId;

/// Reference to one interval of one calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IntervalRef {
    /// Owning calendar.
    pub calendar: CalendarId,
    /// Index in the calendar's interval list.
    pub index: usize,
    /// Effective priority.
    pub priority: i32,
    /// Working flag of the interval.
    pub is_working: bool,
}

/// Intervals covering one segment, highest priority first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvailabilityDescriptor {
    /// Covering intervals, by descending priority.
    pub intervals: Vec<IntervalRef>,
    /// Resolved status: the first interval's flag, or the calendar's
    /// unspecified-time default.
    pub is_working: bool,
}

impl AvailabilityDescriptor {
    /// Descriptor of time no interval covers.
    pub fn unspecified(is_working: bool) -> Self {
        Self {
            intervals: Vec::new(),
            is_working,
        }
    }

    /// The winning interval, if any.
    pub fn top(&self) -> Option<&IntervalRef> {
        self.intervals.first()
    }

    /// This descriptor with `interval` added. Existing intervals are never
    /// replaced; duplicates are ignored.
    fn combine(&self, interval: IntervalRef, default_working: bool) -> Self {
        let mut intervals = self.intervals.clone();
        if !intervals.contains(&interval) {
            intervals.push(interval);
        }
        // Equal priorities: the later calendar, then the later interval wins.
        intervals.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(b.calendar.cmp(&a.calendar))
                .then(b.index.cmp(&a.index))
        });
        let is_working = intervals.first().map_or(default_working, |top| top.is_working);
        Self { intervals, is_working }
    }
}

/// A segment of the map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// Segment start.
    pub start: NaiveDateTime,
    /// Segment end; `None` when it runs to the end of time.
    pub end: Option<NaiveDateTime>,
    /// Covering intervals.
    pub descriptor: Rc<AvailabilityDescriptor>,
}

/// Sorted map of availability segments.
#[derive(Debug, Clone)]
pub struct IntervalCache {
    segments: BTreeMap<NaiveDateTime, Rc<AvailabilityDescriptor>>,
    default_working: bool,
}

impl IntervalCache {
    /// A map with only the unspecified-time sentinel.
    pub fn new(default_working: bool) -> Self {
        let mut segments = BTreeMap::new();
        segments.insert(
            NaiveDateTime::MIN,
            Rc::new(AvailabilityDescriptor::unspecified(default_working)),
        );
        Self {
            segments,
            default_working,
        }
    }

    /// Status of time no interval covers.
    pub fn default_working(&self) -> bool {
        self.default_working
    }

    /// Number of segments (sentinel included).
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    fn descriptor_at(&self, date: NaiveDateTime) -> Rc<AvailabilityDescriptor> {
        self.segments
            .range(..=date)
            .next_back()
            .map(|(_, descriptor)| Rc::clone(descriptor))
            .unwrap_or_else(|| Rc::new(AvailabilityDescriptor::unspecified(self.default_working)))
    }

    /// Ensures a segment boundary at `date`.
    fn split_at(&mut self, date: NaiveDateTime) {
        if !self.segments.contains_key(&date) {
            let descriptor = self.descriptor_at(date);
            self.segments.insert(date, descriptor);
        }
    }

    /// Adds `interval` to every segment in `[start, end)`.
    pub fn add(&mut self, start: NaiveDateTime, end: NaiveDateTime, interval: IntervalRef) {
        if end <= start {
            return;
        }
        self.split_at(start);
        if end != NaiveDateTime::MAX {
            self.split_at(end);
        }
        let default_working = self.default_working;
        for (_, descriptor) in self.segments.range_mut((Included(start), Excluded(end))) {
            if !descriptor.intervals.contains(&interval) {
                *descriptor = Rc::new(descriptor.combine(interval, default_working));
            }
        }
        self.coalesce(start, end);
    }

    /// Merges equal neighbours around `[start, end]`.
    fn coalesce(&mut self, start: NaiveDateTime, end: NaiveDateTime) {
        let from = self
            .segments
            .range(..start)
            .next_back()
            .map_or(start, |(key, _)| *key);
        let keys: Vec<NaiveDateTime> = self.segments.range(from..=end).map(|(key, _)| *key).collect();
        let mut previous: Option<Rc<AvailabilityDescriptor>> = None;
        for key in keys {
            let Some(current) = self.segments.get(&key).cloned() else {
                continue;
            };
            if previous.as_ref().is_some_and(|p| *p == current) && key != NaiveDateTime::MIN {
                self.segments.remove(&key);
            } else {
                previous = Some(current);
            }
        }
    }

    /// The segment containing `date`.
    pub fn segment_at(&self, date: NaiveDateTime) -> Segment {
        let (start, descriptor) = self
            .segments
            .range(..=date)
            .next_back()
            .map(|(key, d)| (*key, Rc::clone(d)))
            .unwrap_or_else(|| {
                (
                    NaiveDateTime::MIN,
                    Rc::new(AvailabilityDescriptor::unspecified(self.default_working)),
                )
            });
        let end = self
            .segments
            .range((Excluded(date), Unbounded))
            .next()
            .map(|(key, _)| *key);
        Segment {
            start,
            end,
            descriptor,
        }
    }

    /// The segment ending at or containing the instant just before `date`.
    pub fn segment_before(&self, date: NaiveDateTime) -> Segment {
        match self.segments.range(..date).next_back() {
            Some((key, descriptor)) => Segment {
                start: *key,
                end: self
                    .segments
                    .range((Excluded(*key), Unbounded))
                    .next()
                    .map(|(k, _)| *k),
                descriptor: Rc::clone(descriptor),
            },
            None => self.segment_at(date),
        }
    }

    /// Segments intersecting `[start, end)`, clipped to it.
    pub fn segments_in(&self, start: NaiveDateTime, end: NaiveDateTime) -> Vec<Segment> {
        let mut result = Vec::new();
        let mut cursor = start;
        while cursor < end {
            let segment = self.segment_at(cursor);
            let segment_end = segment.end.map_or(end, |e| e.min(end));
            result.push(Segment {
                start: cursor,
                end: Some(segment_end),
                descriptor: segment.descriptor,
            });
            cursor = segment_end;
        }
        result
    }

    /// Drops all segments, keeping a fresh sentinel.
    pub fn clear(&mut self, default_working: bool) {
        *self = Self::new(default_working);
    }
}
