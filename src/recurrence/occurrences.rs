//! Materialized occurrences of recurring records.
//!
//! Occurrences are regenerable views of an anchor for one date. They are
//! cached per anchor (date → id) and globally (id → occurrence) so that
//! repeated views of the same window hand out the same ids.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::ops::ControlFlow;

use super::iterator::{for_each_date, IterationConfig, RecurrenceAnchor};
use crate::engine::RecordId;
use crate::time::add_wall_ms;
use crate::time::format::date_key;

/// Prefix of synthetic occurrence ids.
pub const GENERATED_ID_PREFIX: &str = "_generated";

/// Synthetic id of the occurrence of `anchor` on `day`.
pub fn occurrence_id(anchor: RecordId, day: NaiveDate) -> String {
    format!("{GENERATED_ID_PREFIX}:{anchor}:{}", date_key(day))
}

/// One materialized occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Occurrence {
    /// Synthetic id (`_generated:<anchorId>:<YYYY-MM-DD>`).
    pub id: String,
    /// Anchor record.
    pub anchor: RecordId,
    /// Occurrence start.
    pub start: NaiveDateTime,
    /// Occurrence end (anchor's length applied to `start`).
    pub end: Option<NaiveDateTime>,
}

/// Occurrence caches for all anchors of a project.
#[derive(Debug, Default)]
pub struct OccurrenceCache {
    by_anchor: HashMap<RecordId, BTreeMap<NaiveDate, String>>,
    global: HashMap<String, Occurrence>,
}

impl OccurrenceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Occurrences of the series intersecting `[start, end)`, excluding
    /// the anchor itself.
    pub fn materialize(
        &mut self,
        anchor_id: RecordId,
        anchor: &RecurrenceAnchor<'_>,
        start: NaiveDateTime,
        end: NaiveDateTime,
        config: IterationConfig,
    ) -> Vec<Occurrence> {
        let config = IterationConfig {
            start_date: Some(start),
            end_date: Some(end),
            ..config
        };
        let duration_ms = anchor.duration_ms();
        let has_end = anchor.end.is_some();
        let per_anchor = self.by_anchor.entry(anchor_id).or_default();
        let global = &mut self.global;
        let mut result = Vec::new();

        for_each_date(anchor, &config, |occurrence| {
            if occurrence.is_first {
                return ControlFlow::Continue(());
            }
            let day = occurrence.date.date();
            let id = per_anchor
                .entry(day)
                .or_insert_with(|| occurrence_id(anchor_id, day))
                .clone();
            let materialized = global
                .entry(id.clone())
                .or_insert_with(|| Occurrence {
                    id,
                    anchor: anchor_id,
                    start: occurrence.date,
                    end: if has_end {
                        add_wall_ms(occurrence.date, duration_ms)
                    } else {
                        None
                    },
                })
                .clone();
            result.push(materialized);
            ControlFlow::Continue(())
        });
        result
    }

    /// Looks up an occurrence by id.
    pub fn get(&self, id: &str) -> Option<&Occurrence> {
        self.global.get(id)
    }

    /// Id of the cached occurrence of `anchor` on `day`.
    pub fn id_on(&self, anchor: RecordId, day: NaiveDate) -> Option<&str> {
        self.by_anchor.get(&anchor)?.get(&day).map(String::as_str)
    }

    /// Drops every cached occurrence of `anchor`. Returns the number
    /// removed.
    pub fn invalidate_anchor(&mut self, anchor: RecordId) -> usize {
        let Some(days) = self.by_anchor.remove(&anchor) else {
            return 0;
        };
        for id in days.values() {
            self.global.remove(id);
        }
        days.len()
    }

    /// Number of cached occurrences.
    pub fn len(&self) -> usize {
        self.global.len()
    }

    pub fn is_empty(&self) -> bool {
        self.global.is_empty()
    }
}
