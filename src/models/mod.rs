//! Temporal data models.
//!
//! Provides the time span of a scheduled item and the pure derivation
//! rules that keep its start, end and duration mutually consistent.
//!
//! # Domain Mappings
//!
//! | u-timeline | Gantt | Calendar app | Shift planner |
//! |------------|-------|--------------|---------------|
//! | TimeSpanValue | Task bar | Event | Shift |
//! | Proposal | Drag / resize | Edit form | Swap request |
//! | DurationMath | Working-time calendar | Wall clock | Roster calendar |

mod derive;
mod timespan;

pub use derive::{
    derive, normalize, Derivation, DeriveIssue, DurationMath, MathError, ProposeOptions,
    Proposal, TemporalDerivable, WallClock,
};
pub use timespan::{FieldValue, SpanField, TimeSpanValue};
