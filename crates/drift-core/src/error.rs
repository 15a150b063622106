//! Error taxonomy for drifttrack sweeps.

use drift_state::{RunId, StorageError};

/// Errors from grid construction and coordinate mapping.
#[derive(Debug, thiserror::Error)]
pub enum GridError {
    /// The geographic point lies outside every grid cell.
    #[error("point ({lon}, {lat}) is outside the grid domain")]
    OutOfDomain { lon: f64, lat: f64 },

    /// The fractional index lies outside `[0, nx-1] x [0, ny-1]`.
    #[error("index ({i}, {j}) is outside the grid domain")]
    IndexOutOfDomain { i: f64, j: f64 },

    #[error("invalid grid: {0}")]
    Shape(String),

    #[error("grid file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("grid file is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Errors from seed generation and masking.
#[derive(Debug, thiserror::Error)]
pub enum SeedError {
    #[error("all {dropped} candidate seed points are on land or outside the grid")]
    AllSeedsInvalid { dropped: usize },
}

/// Errors from streamline-mode transport initialization.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("{face} flux has shape {actual:?}, grid faces are {expected:?}")]
    FluxShape {
        face: &'static str,
        expected: (usize, usize),
        actual: (usize, usize),
    },

    #[error("cannot compute transport for an empty seed set")]
    NoSeeds,
}

/// Any non-success outcome of the external integrator.
#[derive(Debug, thiserror::Error)]
pub enum IntegrationError {
    #[error("integrator failed: {0}")]
    Failed(String),

    #[error("integrator timed out after {0}s")]
    TimedOut(u64),

    #[error("integrator output is malformed: {0}")]
    Malformed(String),

    #[error("integrator io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("cannot write config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error("unknown event catalog version: {0}")]
    UnknownCatalog(String),

    #[error("cannot parse event catalog: {0}")]
    Catalog(#[from] serde_json::Error),
}

/// Errors that abort a whole sweep.
#[derive(Debug, thiserror::Error)]
pub enum SweepError {
    /// Two distinct requests map onto one identifier.
    #[error(
        "identifier collision on {run_id}: event {first_event} offset {first_offset}h \
         and event {second_event} offset {second_offset}h"
    )]
    IdentifierCollision {
        run_id: RunId,
        first_event: usize,
        first_offset: i64,
        second_event: usize,
        second_offset: i64,
    },

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Top-level drifttrack errors.
#[derive(Debug, thiserror::Error)]
pub enum DriftError {
    #[error(transparent)]
    Grid(#[from] GridError),

    #[error(transparent)]
    Seed(#[from] SeedError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Integration(#[from] IntegrationError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Sweep(#[from] SweepError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Result type for drifttrack operations.
pub type Result<T> = std::result::Result<T, DriftError>;
