use crate::storage::Storage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

/// Terminality: every created run id ends as Completed or Error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Completed,
    Error,
}

/// Coarse-grained progress record for one batch run, readable by external
/// observers while the run is in flight. Written only by the run that owns
/// the run id; reads may be stale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncStatus {
    pub run_id: String,
    pub status: RunStatus,
    pub progress: u32,
    pub total: usize,
    pub processed: usize,
    pub message: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl SyncStatus {
    pub fn new(run_id: &str) -> Self {
        Self {
            run_id: run_id.to_string(),
            status: RunStatus::Running,
            progress: 0,
            total: 0,
            processed: 0,
            message: "Sync started".to_string(),
            started_at: Utc::now(),
            completed_at: None,
            error: None,
        }
    }
}

pub fn compute_progress(processed: usize, total: usize) -> u32 {
    if total == 0 {
        return 0;
    }
    ((processed as f64 / total as f64) * 100.0).round() as u32
}

/// Records run progress through the storage backend. Reporting is
/// observability, not correctness: every failure here is logged and
/// swallowed so it can never take down the run it describes.
#[derive(Clone)]
pub struct ProgressReporter {
    storage: Arc<dyn Storage>,
}

impl ProgressReporter {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    pub async fn create(&self, run_id: &str) {
        let status = SyncStatus::new(run_id);
        if let Err(e) = self.storage.create_sync_status(&status).await {
            warn!("Failed to create sync status for run {}: {}", run_id, e);
        }
    }

    pub async fn update(&self, run_id: &str, processed: usize, total: usize, message: &str) {
        let mut status = match self.storage.get_sync_status(run_id).await {
            Ok(Some(status)) => status,
            Ok(None) => {
                warn!("No sync status record for run {}", run_id);
                return;
            }
            Err(e) => {
                warn!("Failed to read sync status for run {}: {}", run_id, e);
                return;
            }
        };

        status.processed = processed;
        status.total = total;
        status.progress = compute_progress(processed, total);
        status.message = message.to_string();

        if let Err(e) = self.storage.update_sync_status(&status).await {
            warn!("Failed to update sync status for run {}: {}", run_id, e);
        }
    }

    pub async fn complete(&self, run_id: &str) {
        self.finalize(run_id, RunStatus::Completed, None).await;
    }

    pub async fn fail(&self, run_id: &str, error_message: &str) {
        self.finalize(run_id, RunStatus::Error, Some(error_message.to_string()))
            .await;
    }

    async fn finalize(&self, run_id: &str, outcome: RunStatus, error: Option<String>) {
        let mut status = match self.storage.get_sync_status(run_id).await {
            Ok(Some(status)) => status,
            Ok(None) => {
                warn!("No sync status record for run {}", run_id);
                return;
            }
            Err(e) => {
                warn!("Failed to read sync status for run {}: {}", run_id, e);
                return;
            }
        };

        status.status = outcome;
        status.completed_at = Some(Utc::now());
        match outcome {
            RunStatus::Completed => {
                status.progress = 100;
                status.message = "Sync completed".to_string();
            }
            RunStatus::Error => {
                status.message = "Sync failed".to_string();
                status.error = error;
            }
            RunStatus::Running => unreachable!("finalize is only called with a terminal status"),
        }

        if let Err(e) = self.storage.update_sync_status(&status).await {
            warn!("Failed to finalize sync status for run {}: {}", run_id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_is_rounded_percentage() {
        assert_eq!(compute_progress(0, 3), 0);
        assert_eq!(compute_progress(1, 3), 33);
        assert_eq!(compute_progress(2, 3), 67);
        assert_eq!(compute_progress(3, 3), 100);
    }

    #[test]
    fn zero_total_stays_at_zero_until_finalized() {
        assert_eq!(compute_progress(0, 0), 0);
    }
}
