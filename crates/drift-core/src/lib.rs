//! drifttrack core library
//!
//! Seeding, resume-aware scheduling and transport bookkeeping for sweeps of
//! backward- or forward-tracked drifters around recovery events.

pub mod aggregate;
pub mod config;
pub mod error;
pub mod event;
pub mod grid;
pub mod integrator;
pub mod mapper;
pub mod mask;
pub mod metrics;
pub mod obs;
pub mod reporting;
pub mod request;
pub mod scheduler;
pub mod seed;
pub mod spatial_index;
pub mod telemetry;
pub mod transport;

/// Run identifiers are built by the state layer so artifact names and
/// catalog keys can never drift apart.
pub use drift_state::{sanitize_label, RunCatalog, RunId, RunStatus};

pub use aggregate::{AggregateResult, ResultAggregator, RunSlice};
pub use config::{SweepConfig, TimeWindow, WindowPlacement};
pub use error::{
    ConfigError, DriftError, GridError, IntegrationError, Result, SeedError, SweepError,
    TransportError,
};
pub use event::{EventCatalog, RecoveryEvent, BUILTIN_VERSIONS};
pub use grid::{Bounds, CurvilinearGrid, FaceField, GridFile};
pub use integrator::{CommandIntegrator, Crossings, Integrator, TrackOutput};
pub use mapper::GridIndexMapper;
pub use mask::{GeoPoint, MaskFilter, MaskReport, SeedPoint};
pub use request::{Direction, IntegratorParams, RunRequest, Turbulence, VerticalPlacement};
pub use scheduler::{
    plan_runs, EventPhase, EventReport, OffsetOutcome, OffsetStatus, PlannedRun,
    ScheduleOptions, SweepReport, SweepTotals, TimeWindowScheduler,
};
pub use seed::{SeedGenerator, SeedStrategy};
pub use transport::{FluxSnapshot, TransportAccumulator, TransportState};

/// Crate version, stamped into sweep reports by the CLI.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
