//! Resume-aware sweep over events x time offsets.
//!
//! Every `(event, offset)` pair walks
//! `NotStarted -> Scheduling -> {Dispatching, Skipping} -> Done`. A pair
//! whose artifact already exists is skipped; all others are seeded, masked
//! and handed to the integrator. Pairs run concurrently, bounded by
//! `max_concurrent`, and a failed pair never stops the sweep.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use drift_state::{RunCatalog, RunId};
use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::{instrument, warn, Instrument};

use crate::config::{SweepConfig, TimeWindow};
use crate::error::{IntegrationError, SweepError};
use crate::event::{EventCatalog, RecoveryEvent};
use crate::grid::CurvilinearGrid;
use crate::integrator::Integrator;
use crate::mask::{MaskFilter, MaskReport};
use crate::metrics::METRICS;
use crate::obs;
use crate::request::{Direction, IntegratorParams, RunRequest};
use crate::seed::{stream_id, SeedGenerator, SeedStrategy};
use crate::transport::TransportAccumulator;

/// Masked seeds keyed by event location bits.
type SeedCache = HashMap<(u64, u64), Arc<MaskReport>>;

/// Knobs of one sweep.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleOptions {
    pub seeding: SeedStrategy,
    pub window: TimeWindow,
    pub direction: Direction,
    pub streamline: bool,
    pub max_concurrent: usize,
    /// Per-call integrator timeout; 0 waits indefinitely.
    pub timeout_secs: u64,
    pub params: IntegratorParams,
}

impl Default for ScheduleOptions {
    fn default() -> Self {
        Self::from(&SweepConfig::default())
    }
}

impl From<&SweepConfig> for ScheduleOptions {
    fn from(config: &SweepConfig) -> Self {
        Self {
            seeding: config.seeding.clone(),
            window: config.window.clone(),
            direction: config.direction,
            streamline: config.streamline,
            max_concurrent: config.max_concurrent,
            timeout_secs: config.timeout_secs,
            params: config.params.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventPhase {
    NotStarted,
    Scheduling,
    Dispatching,
    Skipping,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OffsetStatus {
    Completed,
    Skipped,
    Failed,
}

/// One `(event, offset)` pair with its identifier, before any work.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlannedRun {
    pub event_index: usize,
    pub offset_hours: i64,
    pub start: DateTime<Utc>,
    pub run_id: RunId,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OffsetOutcome {
    pub event_index: usize,
    pub offset_hours: i64,
    pub start: DateTime<Utc>,
    pub run_id: RunId,
    pub status: OffsetStatus,
    /// Seed points generated before masking.
    pub candidates: usize,
    pub dropped: usize,
    /// The integrator was invoked.
    pub dispatched: bool,
    pub transport_flagged: bool,
    pub detail: Option<String>,
    pub phases: Vec<EventPhase>,
}

impl OffsetOutcome {
    fn begin(planned: &PlannedRun) -> Self {
        Self {
            event_index: planned.event_index,
            offset_hours: planned.offset_hours,
            start: planned.start,
            run_id: planned.run_id.clone(),
            status: OffsetStatus::Failed,
            candidates: 0,
            dropped: 0,
            dispatched: false,
            transport_flagged: false,
            detail: None,
            phases: vec![EventPhase::NotStarted, EventPhase::Scheduling],
        }
    }

    fn finish(mut self, status: OffsetStatus) -> Self {
        self.status = status;
        self.phases.push(EventPhase::Done);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventReport {
    pub event_index: usize,
    pub label: String,
    pub outcomes: Vec<OffsetOutcome>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepTotals {
    pub completed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub dispatched: usize,
    pub candidates: usize,
    pub seeds_dropped: usize,
}

impl SweepTotals {
    pub fn add(&mut self, outcome: &OffsetOutcome) {
        match outcome.status {
            OffsetStatus::Completed => self.completed += 1,
            OffsetStatus::Skipped => self.skipped += 1,
            OffsetStatus::Failed => self.failed += 1,
        }
        self.dispatched += usize::from(outcome.dispatched);
        self.candidates += outcome.candidates;
        self.seeds_dropped += outcome.dropped;
    }
}

/// Per-event, per-offset status of a finished sweep.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SweepReport {
    pub catalog: String,
    pub events: Vec<EventReport>,
    pub totals: SweepTotals,
    pub duration_ms: u64,
}

impl SweepReport {
    pub fn outcomes(&self) -> impl Iterator<Item = &OffsetOutcome> {
        self.events.iter().flat_map(|e| e.outcomes.iter())
    }

    /// Identifiers with an artifact, in event order.
    pub fn completed_ids(&self) -> Vec<RunId> {
        self.outcomes()
            .filter(|o| o.status != OffsetStatus::Failed)
            .map(|o| o.run_id.clone())
            .collect()
    }
}

/// Every `(event, offset)` pair for `events` under `window`, in catalog
/// order.
///
/// Fails with `IdentifierCollision` if an identifier repeats for anything
/// but the very same event and offset. An exact duplicate entry is planned
/// once.
pub fn plan_runs(
    events: &EventCatalog,
    window: &TimeWindow,
) -> Result<Vec<PlannedRun>, SweepError> {
    let offsets = window.offsets();
    let mut seen: HashMap<RunId, (&RecoveryEvent, i64)> = HashMap::new();
    let mut planned = Vec::with_capacity(events.len() * offsets.len());

    for event in &events.events {
        for &offset in &offsets {
            let run_id = RunId::build(event.index, event.found_date, offset, &event.label);
            if let Some(&(first, first_offset)) = seen.get(&run_id) {
                if first == event && first_offset == offset {
                    continue;
                }
                return Err(SweepError::IdentifierCollision {
                    run_id,
                    first_event: first.index,
                    first_offset,
                    second_event: event.index,
                    second_offset: offset,
                });
            }
            seen.insert(run_id.clone(), (event, offset));
            planned.push(PlannedRun {
                event_index: event.index,
                offset_hours: offset,
                start: RunRequest::start_date(event, offset),
                run_id,
            });
        }
    }
    Ok(planned)
}

/// Drives a sweep over an event catalog.
#[derive(Clone)]
pub struct TimeWindowScheduler {
    grid: Arc<CurvilinearGrid>,
    catalog: Arc<dyn RunCatalog>,
    integrator: Arc<dyn Integrator>,
    options: Arc<ScheduleOptions>,
    /// Filled only for offset-invariant strategies.
    seed_cache: Arc<Mutex<SeedCache>>,
}

impl TimeWindowScheduler {
    pub fn new(
        grid: Arc<CurvilinearGrid>,
        catalog: Arc<dyn RunCatalog>,
        integrator: Arc<dyn Integrator>,
        options: ScheduleOptions,
    ) -> Self {
        Self {
            grid,
            catalog,
            integrator,
            options: Arc::new(options),
            seed_cache: Arc::default(),
        }
    }

    pub fn options(&self) -> &ScheduleOptions {
        &self.options
    }

    /// Every `(event, offset)` of the sweep with its identifier.
    pub fn plan(&self, events: &EventCatalog) -> Result<Vec<PlannedRun>, SweepError> {
        plan_runs(events, &self.options.window)
    }

    /// Run the sweep. Only planning errors abort it; every pair ends up in
    /// the report as Completed, Skipped or Failed.
    #[instrument(skip_all, fields(catalog = %events.version))]
    pub async fn run(&self, events: &EventCatalog) -> Result<SweepReport, SweepError> {
        let started = Instant::now();
        let planned = self.plan(events)?;
        let offsets = self.options.window.offsets().len();
        obs::emit_sweep_started(&events.version, events.len(), offsets);

        let by_index: HashMap<usize, &RecoveryEvent> =
            events.events.iter().map(|e| (e.index, e)).collect();
        let sem = Arc::new(Semaphore::new(self.options.max_concurrent.max(1)));

        let mut tasks = Vec::with_capacity(planned.len());
        for run in planned {
            let Some(event) = by_index.get(&run.event_index).map(|e| (*e).clone()) else {
                continue;
            };
            let scheduler = self.clone();
            let sem = Arc::clone(&sem);
            let span = tracing::info_span!("run", run_id = %run.run_id);
            let fallback = OffsetOutcome::begin(&run);
            let task = tokio::spawn(
                async move {
                    let _permit = sem.acquire_owned().await.ok();
                    scheduler.run_offset(&event, run).await
                }
                .instrument(span),
            );
            tasks.push((fallback, task));
        }

        let mut reports: Vec<EventReport> = events
            .events
            .iter()
            .map(|e| EventReport {
                event_index: e.index,
                label: e.label.clone(),
                outcomes: Vec::new(),
            })
            .collect();
        let position: HashMap<usize, usize> = reports
            .iter()
            .enumerate()
            .map(|(k, r)| (r.event_index, k))
            .collect();

        let mut totals = SweepTotals::default();
        for (fallback, task) in tasks {
            let outcome = match task.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(run_id = %fallback.run_id, error = %e, "run task aborted");
                    self.fail(fallback, format!("task aborted: {e}")).await
                }
            };
            METRICS.record(&outcome);
            totals.add(&outcome);
            if let Some(&k) = position.get(&outcome.event_index) {
                reports[k].outcomes.push(outcome);
            }
        }

        let duration_ms = started.elapsed().as_millis() as u64;
        obs::emit_sweep_finished(
            &events.version,
            duration_ms,
            totals.completed,
            totals.skipped,
            totals.failed,
            totals.seeds_dropped,
        );
        Ok(SweepReport {
            catalog: events.version.clone(),
            events: reports,
            totals,
            duration_ms,
        })
    }

    async fn run_offset(&self, event: &RecoveryEvent, planned: PlannedRun) -> OffsetOutcome {
        let mut outcome = OffsetOutcome::begin(&planned);
        let run_id = planned.run_id;

        match self.catalog.exists(&run_id).await {
            Ok(true) => {
                if let Err(e) = self.catalog.mark_complete(&run_id).await {
                    warn!(run_id = %run_id, error = %e, "could not adopt existing artifact");
                }
                outcome.phases.push(EventPhase::Skipping);
                obs::emit_run_skipped(run_id.as_str());
                return outcome.finish(OffsetStatus::Skipped);
            }
            Ok(false) => {}
            Err(e) => return self.fail(outcome, e.to_string()).await,
        }
        if let Err(e) = self.catalog.register(&run_id).await {
            return self.fail(outcome, e.to_string()).await;
        }

        let report = self.seeds_for(event, planned.offset_hours);
        outcome.candidates = report.candidates();
        outcome.dropped = report.dropped;
        obs::emit_seeds_filtered(
            run_id.as_str(),
            report.candidates(),
            report.valid.len(),
            report.dropped,
        );

        let seeds = match Arc::unwrap_or_clone(report).require_valid() {
            Ok(seeds) => seeds,
            Err(e) => return self.fail(outcome, e.to_string()).await,
        };

        let mut request = RunRequest {
            run_id: run_id.clone(),
            event: event.clone(),
            offset_hours: planned.offset_hours,
            start: planned.start,
            direction: self.options.direction,
            seeds,
            params: self.options.params.clone(),
            transport: None,
        };

        let mut accumulator = None;
        if self.options.streamline {
            let flux = match self.bounded(self.integrator.initial_flux(&request)).await {
                Ok(flux) => flux,
                Err(e) => return self.fail(outcome, e.to_string()).await,
            };
            let state = match TransportAccumulator::initialize(&self.grid, &request.seeds, &flux) {
                Ok(state) => state,
                Err(e) => return self.fail(outcome, e.to_string()).await,
            };
            if state.needs_review {
                outcome.transport_flagged = true;
                obs::emit_transport_flagged(run_id.as_str(), state.ndrifters);
            }
            request.transport = Some(state.clone());
            accumulator = Some(TransportAccumulator::new(state));
        }

        outcome.phases.push(EventPhase::Dispatching);
        outcome.dispatched = true;
        obs::emit_run_dispatched(run_id.as_str(), request.ndrifters(), request.streamline());

        let started = Instant::now();
        let integrated = self
            .bounded(self.integrator.integrate(&request, accumulator.as_mut()))
            .await;
        let transport = accumulator.map(TransportAccumulator::into_state);
        let artifact = integrated.and_then(|output| output.into_artifact(&request, transport));
        let artifact = match artifact {
            Ok(artifact) => artifact,
            Err(e) => return self.fail(outcome, e.to_string()).await,
        };
        if let Err(e) = self.catalog.commit(&artifact).await {
            return self.fail(outcome, e.to_string()).await;
        }

        obs::emit_run_completed(run_id.as_str(), started.elapsed().as_millis() as u64);
        outcome.finish(OffsetStatus::Completed)
    }

    /// Masked seeds of one pair. Strategies that ignore the stream are
    /// computed once per event location and shared across offsets.
    fn seeds_for(&self, event: &RecoveryEvent, offset_hours: i64) -> Arc<MaskReport> {
        if self.options.seeding.varies_with_stream() {
            let stream = stream_id(event.index, offset_hours);
            return Arc::new(self.mask_candidates(event, stream));
        }
        let key = (event.longitude.to_bits(), event.latitude.to_bits());
        if let Some(hit) = self.cached_seeds().get(&key) {
            return Arc::clone(hit);
        }
        let report = Arc::new(self.mask_candidates(event, 0));
        Arc::clone(self.cached_seeds().entry(key).or_insert(report))
    }

    fn mask_candidates(&self, event: &RecoveryEvent, stream: u64) -> MaskReport {
        let generator = SeedGenerator::new(&self.grid, self.options.seeding.clone());
        MaskFilter::filter(&generator.generate(event, stream), &self.grid)
    }

    fn cached_seeds(&self) -> MutexGuard<'_, SeedCache> {
        self.seed_cache.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, IntegrationError>>,
    ) -> Result<T, IntegrationError> {
        let secs = self.options.timeout_secs;
        if secs == 0 {
            return call.await;
        }
        tokio::time::timeout(Duration::from_secs(secs), call)
            .await
            .map_err(|_| IntegrationError::TimedOut(secs))?
    }

    async fn fail(&self, mut outcome: OffsetOutcome, detail: String) -> OffsetOutcome {
        if let Err(e) = self.catalog.mark_failed(&outcome.run_id, &detail).await {
            warn!(run_id = %outcome.run_id, error = %e, "could not record failure");
        }
        obs::emit_run_failed(outcome.run_id.as_str(), &detail);
        outcome.detail = Some(detail);
        outcome.finish(OffsetStatus::Failed)
    }
}
