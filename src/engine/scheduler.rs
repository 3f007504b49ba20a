//! Deferred commit scheduling.
//!
//! The first invalidation after a commit schedules the next one a short
//! delay ahead; later invalidations join it. Cancelling bumps a
//! generation counter so a stale due time can never fire.

use std::time::{Duration, Instant};

/// Pending-commit bookkeeping.
#[derive(Debug, Clone)]
pub struct CommitScheduler {
    delay: Duration,
    generation: u64,
    due: Option<(u64, Instant)>,
}

impl CommitScheduler {
    /// A scheduler committing `delay` after the first invalidation.
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            generation: 0,
            due: None,
        }
    }

    /// Schedules a commit unless one is pending. Returns `true` if this
    /// call scheduled it.
    pub fn schedule(&mut self, now: Instant) -> bool {
        if self.due.is_some() {
            return false;
        }
        self.generation += 1;
        self.due = Some((self.generation, now + self.delay));
        true
    }

    /// Drops the pending commit. Returns `true` if one was pending.
    pub fn cancel(&mut self) -> bool {
        self.generation += 1;
        self.due.take().is_some()
    }

    /// Whether a commit is pending.
    pub fn is_scheduled(&self) -> bool {
        self.due.is_some()
    }

    /// Whether the pending commit should run at `now`.
    pub fn is_due(&self, now: Instant) -> bool {
        self.due
            .is_some_and(|(generation, at)| generation == self.generation && now >= at)
    }

    /// When the pending commit is due.
    pub fn due_at(&self) -> Option<Instant> {
        self.due.map(|(_, at)| at)
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Marks the pending commit as started.
    pub(crate) fn start(&mut self) {
        self.due = None;
    }
}
