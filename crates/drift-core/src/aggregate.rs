//! Combine the final positions of completed runs.

use std::sync::Arc;

use drift_state::{RunCatalog, RunId, RunStatus, StorageError, StorageResult};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Where one run's drifters sit in the combined arrays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSlice {
    pub run_id: RunId,
    /// Index of the run's first drifter.
    pub first: usize,
    pub count: usize,
}

/// Ragged concatenation of final `(lon, lat)` across runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateResult {
    pub lon: Vec<f64>,
    pub lat: Vec<f64>,
    pub runs: Vec<RunSlice>,
    /// Failed, missing or malformed runs left out.
    pub skipped: usize,
    pub skipped_ids: Vec<RunId>,
}

impl AggregateResult {
    /// Total drifters merged.
    pub fn len(&self) -> usize {
        self.lon.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lon.is_empty()
    }

    /// Final positions of the run at `runs[k]`.
    pub fn run_positions(&self, k: usize) -> Option<impl Iterator<Item = (f64, f64)> + '_> {
        let slice = self.runs.get(k)?;
        let range = slice.first..slice.first + slice.count;
        Some(self.lon[range.clone()].iter().copied().zip(self.lat[range].iter().copied()))
    }

    fn skip(&mut self, run_id: &RunId) {
        self.skipped += 1;
        self.skipped_ids.push(run_id.clone());
    }
}

pub struct ResultAggregator {
    catalog: Arc<dyn RunCatalog>,
}

impl ResultAggregator {
    pub fn new(catalog: Arc<dyn RunCatalog>) -> Self {
        Self { catalog }
    }

    /// Merge runs in the order given. Runs recorded as Failed, or without a
    /// well-formed artifact, are counted in `skipped` rather than merged.
    pub async fn aggregate(&self, run_ids: &[RunId]) -> StorageResult<AggregateResult> {
        let mut result = AggregateResult::default();
        for run_id in run_ids {
            let failed = matches!(
                self.catalog.record(run_id).await?,
                Some(record) if record.status == RunStatus::Failed
            );
            if failed {
                debug!(run_id = %run_id, "skipping failed run");
                result.skip(run_id);
                continue;
            }

            let artifact = match self.catalog.load(run_id).await {
                Ok(artifact) => artifact,
                Err(StorageError::NotFound { .. }) => {
                    result.skip(run_id);
                    continue;
                }
                Err(StorageError::StaleArtifact { reason, .. }) => {
                    warn!(run_id = %run_id, reason = %reason, "skipping malformed artifact");
                    result.skip(run_id);
                    continue;
                }
                Err(e) => return Err(e),
            };

            let positions = artifact.final_positions();
            result.runs.push(RunSlice {
                run_id: run_id.clone(),
                first: result.lon.len(),
                count: positions.len(),
            });
            for (lon, lat) in positions {
                result.lon.push(lon);
                result.lat.push(lat);
            }
        }
        Ok(result)
    }
}
