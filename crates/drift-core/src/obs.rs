//! Structured observability hooks for sweep lifecycle events.
//!
//! This module provides:
//! - A sweep-scoped tracing span via the `SweepSpan` RAII guard
//! - Emission functions for the per-run lifecycle: skipped, dispatched,
//!   completed, failed, plus seed filtering and transport review flags
//!
//! Events are emitted at `info!` level, failures at `warn!`. Use
//! `RUST_LOG` to filter and `--json` on the CLI for JSON lines.

use tracing::{info, warn};

/// RAII guard that enters a sweep-scoped tracing span.
///
/// # Example
///
/// ```ignore
/// let _span = SweepSpan::enter("packages-2013");
/// // every event emitted below carries catalog = "packages-2013"
/// ```
pub struct SweepSpan {
    _span: tracing::span::EnteredSpan,
}

impl SweepSpan {
    pub fn enter(catalog: &str) -> Self {
        let span = tracing::info_span!("drifttrack.sweep", catalog = %catalog);
        Self {
            _span: span.entered(),
        }
    }
}

/// Emit event: sweep started.
pub fn emit_sweep_started(catalog: &str, events: usize, offsets: usize) {
    info!(event = "sweep.started", catalog = %catalog, events = events, offsets = offsets);
}

/// Emit event: an existing artifact satisfied the run.
pub fn emit_run_skipped(run_id: &str) {
    info!(event = "run.skipped", run_id = %run_id);
}

/// Emit event: run handed to the integrator.
pub fn emit_run_dispatched(run_id: &str, ndrifters: usize, streamline: bool) {
    info!(
        event = "run.dispatched",
        run_id = %run_id,
        ndrifters = ndrifters,
        streamline = streamline,
    );
}

/// Emit event: artifact committed.
pub fn emit_run_completed(run_id: &str, duration_ms: u64) {
    info!(event = "run.completed", run_id = %run_id, duration_ms = duration_ms);
}

/// Emit event: run recorded as failed (warning level).
pub fn emit_run_failed(run_id: &str, error: &dyn std::fmt::Display) {
    warn!(event = "run.failed", run_id = %run_id, error = %error);
}

/// Emit event: masking result for one seed set.
pub fn emit_seeds_filtered(run_id: &str, candidates: usize, valid: usize, dropped: usize) {
    info!(
        event = "seeds.filtered",
        run_id = %run_id,
        candidates = candidates,
        valid = valid,
        dropped = dropped,
    );
}

/// Emit event: zero initial transport (warning level).
pub fn emit_transport_flagged(run_id: &str, ndrifters: usize) {
    warn!(event = "transport.flagged", run_id = %run_id, ndrifters = ndrifters);
}

/// Emit event: sweep finished with per-status totals.
pub fn emit_sweep_finished(
    catalog: &str,
    duration_ms: u64,
    completed: usize,
    skipped: usize,
    failed: usize,
    seeds_dropped: usize,
) {
    info!(
        event = "sweep.finished",
        catalog = %catalog,
        duration_ms = duration_ms,
        completed = completed,
        skipped = skipped,
        failed = failed,
        seeds_dropped = seeds_dropped,
    );
}
