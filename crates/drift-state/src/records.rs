//! In-process run record bookkeeping shared by catalog backends.

use std::collections::BTreeMap;
use std::sync::Mutex;

use chrono::Utc;

use crate::error::StorageError;
use crate::identifier::RunId;
use crate::storage_traits::{RunRecord, RunStatus, StorageResult};

/// Run records keyed by identifier, enforcing forward-only transitions.
#[derive(Debug, Default)]
pub struct RecordBook {
    records: Mutex<BTreeMap<RunId, RunRecord>>,
}

impl RecordBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a Pending attempt. Completed records are returned unchanged.
    pub fn register(&self, run_id: &RunId) -> RunRecord {
        let mut records = self.lock();
        let now = Utc::now();
        let record = records.entry(run_id.clone()).or_insert_with(|| RunRecord {
            run_id: run_id.clone(),
            status: RunStatus::Pending,
            attempts: 0,
            detail: None,
            updated_at: now,
        });
        match record.status {
            RunStatus::Completed => {}
            RunStatus::Pending if record.attempts > 0 => {}
            RunStatus::Pending | RunStatus::Failed => {
                record.status = RunStatus::Pending;
                record.attempts += 1;
                record.detail = None;
                record.updated_at = now;
            }
        }
        record.clone()
    }

    /// Move to Completed. An artifact found without a prior record is
    /// adopted as Completed with zero attempts. Over a Failed record the
    /// artifact is adopted as a new attempt; the failed one is left behind.
    pub fn complete(&self, run_id: &RunId) -> StorageResult<RunRecord> {
        let mut records = self.lock();
        let now = Utc::now();
        let record = records.entry(run_id.clone()).or_insert_with(|| RunRecord {
            run_id: run_id.clone(),
            status: RunStatus::Pending,
            attempts: 0,
            detail: None,
            updated_at: now,
        });
        if record.status == RunStatus::Failed {
            record.attempts += 1;
        }
        record.status = RunStatus::Completed;
        record.detail = None;
        record.updated_at = now;
        Ok(record.clone())
    }

    /// Move the current attempt to Failed.
    pub fn fail(&self, run_id: &RunId, detail: &str) -> StorageResult<RunRecord> {
        let mut records = self.lock();
        let record = records
            .get_mut(run_id)
            .ok_or_else(|| StorageError::RunNotFound {
                run_id: run_id.to_string(),
            })?;
        if record.status == RunStatus::Completed {
            return Err(StorageError::InvalidTransition {
                run_id: run_id.to_string(),
                from: RunStatus::Completed,
                to: RunStatus::Failed,
            });
        }
        record.status = RunStatus::Failed;
        record.detail = Some(detail.to_string());
        record.updated_at = Utc::now();
        Ok(record.clone())
    }

    pub fn get(&self, run_id: &RunId) -> Option<RunRecord> {
        self.lock().get(run_id).cloned()
    }

    pub fn all(&self) -> Vec<RunRecord> {
        self.lock().values().cloned().collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<RunId, RunRecord>> {
        // Mutations never leave a record half-updated.
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }
}
