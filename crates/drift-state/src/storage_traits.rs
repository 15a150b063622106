//! Storage trait definitions for drifttrack
//!
//! - `RunCatalog`: resume gate for sweeps (artifact existence, run records,
//!   atomic commit of results)
//! - `TrackArtifact`: the result document one run commits
//!
//! Traits are async and backend-agnostic. An in-memory fake is provided in
//! the `fakes` module.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::StorageError;
use crate::identifier::RunId;

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Artifact layout version written by this crate.
pub const ARTIFACT_SCHEMA_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// Run records
// ---------------------------------------------------------------------------

/// Status of a run record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RunStatus {
    Pending,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStatus::Pending => "Pending",
            RunStatus::Completed => "Completed",
            RunStatus::Failed => "Failed",
        };
        f.write_str(s)
    }
}

/// Lifecycle record for one run identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: RunId,
    pub status: RunStatus,
    /// Number of dispatch attempts opened for this identifier.
    pub attempts: u32,
    /// Failure reason of the latest attempt.
    pub detail: Option<String>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Track artifacts
// ---------------------------------------------------------------------------

/// A flat 2-D array over one family of cell faces, indexed `[j * nx + i]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceValues {
    pub nx: usize,
    pub ny: usize,
    pub values: Vec<f64>,
}

/// Streamline-mode transport state stored with a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportSnapshot {
    #[serde(rename = "T0")]
    pub t0: f64,
    #[serde(rename = "U")]
    pub u: FaceValues,
    #[serde(rename = "V")]
    pub v: FaceValues,
}

/// Result document of one run.
///
/// Variable names follow the tracking tool's track files: `lonp`, `latp`,
/// `zp` hold one series per drifter, `t` the shared output times.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackArtifact {
    pub schema_version: u32,
    pub run_id: RunId,
    /// SHA-256 of the canonical request that produced this run.
    pub request_digest: String,
    pub ndrifters: usize,
    /// Output times, seconds since the run's start date.
    pub t: Vec<f64>,
    pub lonp: Vec<Vec<f64>>,
    pub latp: Vec<Vec<f64>>,
    /// Depth series; empty for two-dimensional runs.
    #[serde(default)]
    pub zp: Vec<Vec<f64>>,
    #[serde(default)]
    pub transport: Option<TransportSnapshot>,
    pub written_at: DateTime<Utc>,
}

impl TrackArtifact {
    /// Check the internal consistency of the document.
    ///
    /// Returns the reason on failure; catalogs turn this into
    /// [`StorageError::StaleArtifact`].
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.schema_version != ARTIFACT_SCHEMA_VERSION {
            return Err(format!("unsupported schema version {}", self.schema_version));
        }
        if self.t.is_empty() {
            return Err("no output times".to_string());
        }
        if self.lonp.len() != self.ndrifters || self.latp.len() != self.ndrifters {
            return Err(format!(
                "ndrifters = {} but lonp has {} and latp has {} series",
                self.ndrifters,
                self.lonp.len(),
                self.latp.len()
            ));
        }
        if !self.zp.is_empty() && self.zp.len() != self.ndrifters {
            return Err(format!("zp has {} series", self.zp.len()));
        }
        let nt = self.t.len();
        let ragged = self
            .lonp
            .iter()
            .chain(self.latp.iter())
            .chain(self.zp.iter())
            .any(|series| series.len() != nt);
        if ragged {
            return Err(format!("a drifter series does not have {nt} samples"));
        }
        if let Some(transport) = &self.transport {
            if !(transport.t0 >= 0.0) {
                return Err(format!("negative or NaN T0 {}", transport.t0));
            }
            for (name, face) in [("U", &transport.u), ("V", &transport.v)] {
                if face.values.len() != face.nx * face.ny {
                    return Err(format!("{name} shape does not match its values"));
                }
            }
        }
        Ok(())
    }

    /// Final-timestep `(lon, lat)` of every drifter.
    pub fn final_positions(&self) -> Vec<(f64, f64)> {
        self.lonp
            .iter()
            .zip(&self.latp)
            .filter_map(|(lon, lat)| Some((*lon.last()?, *lat.last()?)))
            .collect()
    }
}

/// SHA-256 hex digest of `data`.
pub fn content_digest(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

// ---------------------------------------------------------------------------
// RunCatalog
// ---------------------------------------------------------------------------

/// Resume gate for sweeps.
///
/// Guarantees:
/// - `exists` is false before anything is committed, and false for a
///   missing, truncated or inconsistent artifact.
/// - `commit` is atomic: concurrent readers observe either no artifact or
///   the complete document. Repeated commits of one identifier are allowed
///   (last writer wins).
/// - Records move Pending → Completed | Failed and never back. A Failed
///   attempt stays failed; `register` on a failed identifier opens a new
///   attempt, and a well-formed artifact found for a failed identifier is
///   adopted as a new, Completed attempt.
#[async_trait]
pub trait RunCatalog: Send + Sync {
    /// Whether a completed, well-formed artifact exists for `run_id`.
    async fn exists(&self, run_id: &RunId) -> StorageResult<bool>;

    /// Load the artifact for `run_id`.
    async fn load(&self, run_id: &RunId) -> StorageResult<TrackArtifact>;

    /// Open a Pending record for `run_id` (or return the Completed one).
    async fn register(&self, run_id: &RunId) -> StorageResult<RunRecord>;

    /// Atomically write `artifact` and mark its run Completed.
    async fn commit(&self, artifact: &TrackArtifact) -> StorageResult<RunRecord>;

    /// Mark `run_id` Completed; its artifact must already be well-formed.
    async fn mark_complete(&self, run_id: &RunId) -> StorageResult<RunRecord>;

    /// Mark the current attempt for `run_id` Failed.
    async fn mark_failed(&self, run_id: &RunId, detail: &str) -> StorageResult<RunRecord>;

    /// Current record for `run_id`, if one was registered.
    async fn record(&self, run_id: &RunId) -> StorageResult<Option<RunRecord>>;

    /// All records, ordered by identifier.
    async fn records(&self) -> StorageResult<Vec<RunRecord>>;
}

/// Decode and check artifact bytes read for `run_id`.
pub(crate) fn decode_artifact(run_id: &RunId, bytes: &[u8]) -> StorageResult<TrackArtifact> {
    let stale = |reason: String| StorageError::StaleArtifact {
        run_id: run_id.to_string(),
        reason,
    };
    let artifact: TrackArtifact =
        serde_json::from_slice(bytes).map_err(|e| stale(format!("unreadable: {e}")))?;
    if &artifact.run_id != run_id {
        return Err(stale(format!("artifact names run {}", artifact.run_id)));
    }
    artifact.validate().map_err(stale)?;
    Ok(artifact)
}


#[cfg(test)]
mod tests {
    use super::test_support::artifact;
    use super::*;

    fn id() -> RunId {
        RunId::try_from("20130524T00_e14_o+000h_test").unwrap()
    }

    #[test]
    fn well_formed_artifact_validates() {
        assert!(artifact(&id(), 4).validate().is_ok());
    }

    #[test]
    fn drifter_count_mismatch_is_rejected() {
        let mut a = artifact(&id(), 4);
        a.ndrifters = 5;
        assert!(a.validate().is_err());
    }

    #[test]
    fn short_series_is_rejected() {
        let mut a = artifact(&id(), 2);
        a.latp[1].pop();
        let reason = a.validate().unwrap_err();
        assert!(reason.contains("3 samples"));
    }

    #[test]
    fn empty_times_rejected() {
        let mut a = artifact(&id(), 0);
        a.t.clear();
        assert!(a.validate().is_err());
    }

    #[test]
    fn negative_transport_rejected() {
        let mut a = artifact(&id(), 1);
        let face = FaceValues {
            nx: 1,
            ny: 1,
            values: vec![0.0],
        };
        a.transport = Some(TransportSnapshot {
            t0: -1.0,
            u: face.clone(),
            v: face,
        });
        assert!(a.validate().is_err());
    }

    #[test]
    fn final_positions_take_last_sample() {
        let a = artifact(&id(), 2);
        assert_eq!(a.final_positions(), vec![(-94.2, 29.2), (-95.2, 30.2)]);
    }

    #[test]
    fn decode_rejects_truncated_bytes() {
        let bytes = serde_json::to_vec(&artifact(&id(), 3)).unwrap();
        let err = decode_artifact(&id(), &bytes[..bytes.len() / 2]).unwrap_err();
        assert!(matches!(err, StorageError::StaleArtifact { .. }));
    }

    #[test]
    fn decode_rejects_foreign_run_id() {
        let other = RunId::try_from("20130524T00_e15_o+000h_test").unwrap();
        let bytes = serde_json::to_vec(&artifact(&other, 1)).unwrap();
        assert!(decode_artifact(&id(), &bytes).is_err());
    }

    #[test]
    fn transport_uses_track_file_names() {
        let mut a = artifact(&id(), 1);
        let face = FaceValues {
            nx: 1,
            ny: 1,
            values: vec![0.0],
        };
        a.transport = Some(TransportSnapshot {
            t0: 2.0,
            u: face.clone(),
            v: face,
        });
        let raw = serde_json::to_value(&a).unwrap();
        assert_eq!(raw["transport"]["T0"], serde_json::json!(2.0));
        assert!(raw["transport"].get("U").is_some());
        assert!(raw.get("lonp").is_some());
        assert!(raw.get("ndrifters").is_some());
    }

    #[test]
    fn status_display() {
        assert_eq!(RunStatus::Completed.to_string(), "Completed");
        assert!(RunStatus::Failed.is_terminal());
        assert!(!RunStatus::Pending.is_terminal());
    }
}
