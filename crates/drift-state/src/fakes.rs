//! In-memory fakes for storage traits (testing only)
//!
//! `MemoryRunCatalog` keeps serialized artifact bytes in a map so tests can
//! plant truncated or foreign documents next to well-formed ones.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::StorageError;
use crate::identifier::RunId;
use crate::records::RecordBook;
use crate::storage_traits::*;

/// In-memory run catalog backed by a `HashMap<run id, artifact bytes>`.
#[derive(Debug, Default)]
pub struct MemoryRunCatalog {
    artifacts: Mutex<HashMap<RunId, Vec<u8>>>,
    records: RecordBook,
}

impl MemoryRunCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store raw bytes as the artifact of `run_id`, bypassing validation.
    pub fn insert_raw(&self, run_id: &RunId, bytes: Vec<u8>) {
        self.artifacts.lock().unwrap().insert(run_id.clone(), bytes);
    }

    /// Drop the artifact of `run_id`, if any.
    pub fn remove(&self, run_id: &RunId) {
        self.artifacts.lock().unwrap().remove(run_id);
    }

    /// Number of stored artifacts, well-formed or not.
    pub fn artifact_count(&self) -> usize {
        self.artifacts.lock().unwrap().len()
    }

    fn read(&self, run_id: &RunId) -> StorageResult<TrackArtifact> {
        let bytes = self
            .artifacts
            .lock()
            .unwrap()
            .get(run_id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound {
                run_id: run_id.to_string(),
            })?;
        decode_artifact(run_id, &bytes)
    }
}

#[async_trait]
impl RunCatalog for MemoryRunCatalog {
    async fn exists(&self, run_id: &RunId) -> StorageResult<bool> {
        match self.read(run_id) {
            Ok(_) => Ok(true),
            Err(StorageError::NotFound { .. }) | Err(StorageError::StaleArtifact { .. }) => {
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    async fn load(&self, run_id: &RunId) -> StorageResult<TrackArtifact> {
        self.read(run_id)
    }

    async fn register(&self, run_id: &RunId) -> StorageResult<RunRecord> {
        Ok(self.records.register(run_id))
    }

    async fn commit(&self, artifact: &TrackArtifact) -> StorageResult<RunRecord> {
        artifact
            .validate()
            .map_err(|reason| StorageError::StaleArtifact {
                run_id: artifact.run_id.to_string(),
                reason,
            })?;
        let bytes = serde_json::to_vec(artifact)?;
        self.insert_raw(&artifact.run_id, bytes);
        self.records.complete(&artifact.run_id)
    }

    async fn mark_complete(&self, run_id: &RunId) -> StorageResult<RunRecord> {
        self.read(run_id)?;
        self.records.complete(run_id)
    }

    async fn mark_failed(&self, run_id: &RunId, detail: &str) -> StorageResult<RunRecord> {
        self.records.fail(run_id, detail)
    }

    async fn record(&self, run_id: &RunId) -> StorageResult<Option<RunRecord>> {
        Ok(self.records.get(run_id))
    }

    async fn records(&self) -> StorageResult<Vec<RunRecord>> {
        Ok(self.records.all())
    }
}
