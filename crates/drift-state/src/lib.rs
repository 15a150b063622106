//! drift-state: run catalog persistence for drifttrack
//!
//! This crate owns everything a sweep needs to decide whether a simulation
//! has already been computed:
//!
//! - `RunId`: deterministic, filesystem-safe run identifiers
//! - `TrackArtifact`: the per-run result document written by a sweep
//! - `RunCatalog`: async catalog trait (existence, records, atomic commit)
//! - `FsRunCatalog`: filesystem backend with write-then-rename commits
//! - `fakes::MemoryRunCatalog`: in-memory backend for tests

mod error;
pub mod fakes;
pub mod fs_catalog;
pub mod identifier;
mod records;
pub mod storage_traits;

pub use error::StorageError;
pub use fs_catalog::FsRunCatalog;
pub use identifier::{sanitize_label, RunId, SEPARATOR};
pub use records::RecordBook;
pub use storage_traits::{
    content_digest, FaceValues, RunCatalog, RunRecord, RunStatus, StorageResult,
    TrackArtifact, TransportSnapshot, ARTIFACT_SCHEMA_VERSION,
};
