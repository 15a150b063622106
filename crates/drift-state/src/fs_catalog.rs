use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::StorageError;
use crate::identifier::RunId;
use crate::records::RecordBook;
use crate::storage_traits::{
    decode_artifact, RunCatalog, RunRecord, StorageResult, TrackArtifact,
};

/// Filesystem-backed run catalog.
///
/// Layout: `<root>/tracks/<run id>.json`. Artifacts are written to a temp
/// file in the same directory and renamed into place, so a reader sees
/// either nothing or a complete document.
pub struct FsRunCatalog {
    tracks_dir: PathBuf,
    records: RecordBook,
}

impl FsRunCatalog {
    /// Create a catalog rooted at `root`. Creates `root/tracks/` if needed.
    pub fn new(root: impl AsRef<Path>) -> StorageResult<Self> {
        let tracks_dir = root.as_ref().join("tracks");
        fs::create_dir_all(&tracks_dir)?;
        Ok(Self {
            tracks_dir,
            records: RecordBook::new(),
        })
    }

    pub fn tracks_dir(&self) -> &Path {
        &self.tracks_dir
    }

    /// Path of the artifact for `run_id`.
    pub fn artifact_path(&self, run_id: &RunId) -> PathBuf {
        self.tracks_dir.join(run_id.file_name())
    }

    fn read_artifact(&self, run_id: &RunId) -> StorageResult<TrackArtifact> {
        let path = self.artifact_path(run_id);
        let bytes = fs::read(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound {
                    run_id: run_id.to_string(),
                }
            } else {
                StorageError::Io(e)
            }
        })?;
        decode_artifact(run_id, &bytes)
    }

    fn write_artifact(&self, artifact: &TrackArtifact) -> StorageResult<()> {
        let path = self.artifact_path(&artifact.run_id);
        let bytes = serde_json::to_vec(artifact)?;

        let mut tmp = NamedTempFile::new_in(&self.tracks_dir)?;
        tmp.write_all(&bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path).map_err(|e| e.error)?;

        debug!(run_id = %artifact.run_id, path = %path.display(), "artifact committed");
        Ok(())
    }
}

#[async_trait]
impl RunCatalog for FsRunCatalog {
    async fn exists(&self, run_id: &RunId) -> StorageResult<bool> {
        match self.read_artifact(run_id) {
            Ok(_) => Ok(true),
            Err(StorageError::NotFound { .. }) => Ok(false),
            Err(StorageError::StaleArtifact { reason, .. }) => {
                warn!(run_id = %run_id, reason = %reason, "stale artifact treated as missing");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    async fn load(&self, run_id: &RunId) -> StorageResult<TrackArtifact> {
        self.read_artifact(run_id)
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
        self.write_artifact(artifact)?;
        self.records.complete(&artifact.run_id)
    }

    async fn mark_complete(&self, run_id: &RunId) -> StorageResult<RunRecord> {
        self.read_artifact(run_id)?;
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
