//! Process-wide sweep counters.
//!
//! Each finished `(event, offset)` outcome is folded in once with
//! [`Metrics::record`]. The counters mirror [`SweepTotals`] summed over
//! every sweep the process has run; [`Metrics::flush`] logs them.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::scheduler::{OffsetOutcome, OffsetStatus, SweepTotals};

pub static METRICS: Metrics = Metrics::new();

pub struct Metrics {
    completed: AtomicU64,
    skipped: AtomicU64,
    failed: AtomicU64,
    dispatched: AtomicU64,
    candidates: AtomicU64,
    seeds_dropped: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            completed: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            dispatched: AtomicU64::new(0),
            candidates: AtomicU64::new(0),
            seeds_dropped: AtomicU64::new(0),
        }
    }

    pub fn record(&self, outcome: &OffsetOutcome) {
        let status = match outcome.status {
            OffsetStatus::Completed => &self.completed,
            OffsetStatus::Skipped => &self.skipped,
            OffsetStatus::Failed => &self.failed,
        };
        status.fetch_add(1, Ordering::Relaxed);
        if outcome.dispatched {
            self.dispatched.fetch_add(1, Ordering::Relaxed);
        }
        self.candidates
            .fetch_add(outcome.candidates as u64, Ordering::Relaxed);
        self.seeds_dropped
            .fetch_add(outcome.dropped as u64, Ordering::Relaxed);
        tracing::trace!(run_id = %outcome.run_id, status = ?outcome.status, "outcome recorded");
    }

    pub fn totals(&self) -> SweepTotals {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed) as usize;
        SweepTotals {
            completed: load(&self.completed),
            skipped: load(&self.skipped),
            failed: load(&self.failed),
            dispatched: load(&self.dispatched),
            candidates: load(&self.candidates),
            seeds_dropped: load(&self.seeds_dropped),
        }
    }

    /// Log the current totals as one `info!` event.
    pub fn flush(&self) {
        let t = self.totals();
        tracing::info!(
            metric = "sweep_totals",
            completed = t.completed,
            skipped = t.skipped,
            failed = t.failed,
            dispatched = t.dispatched,
            candidates = t.candidates,
            seeds_dropped = t.seeds_dropped,
        );
    }
}
