//! Error types for drift-state

use thiserror::Error;

use crate::storage_traits::RunStatus;

/// Errors raised by run catalogs and artifact handling.
#[derive(Error, Debug)]
pub enum StorageError {
    /// No artifact has been committed for this run.
    #[error("artifact not found for run {run_id}")]
    NotFound { run_id: String },

    /// An artifact exists but is truncated or inconsistent.
    #[error("stale artifact for run {run_id}: {reason}")]
    StaleArtifact { run_id: String, reason: String },

    /// No record has been registered for this run.
    #[error("run record not found: {run_id}")]
    RunNotFound { run_id: String },

    /// A record was asked to move out of a terminal state.
    #[error("invalid transition for run {run_id}: {from} -> {to}")]
    InvalidTransition {
        run_id: String,
        from: RunStatus,
        to: RunStatus,
    },

    /// The string cannot be used as a run identifier.
    #[error("invalid run identifier: {0:?}")]
    InvalidRunId(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
