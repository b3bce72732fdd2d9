use crate::domain::jobs::StatusRecord;
use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("status io: {0}")]
    Io(#[from] std::io::Error),
    #[error("status record is malformed: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Durable per-job status records.
#[async_trait]
pub trait StatusStore: Send + Sync {
    async fn write(&self, job_id: &str, record: &StatusRecord) -> Result<(), StoreError>;

    /// `Ok(None)` means no record was ever written for this job.
    async fn read(&self, job_id: &str) -> Result<Option<StatusRecord>, StoreError>;
}

/// Fire-and-forget publish: failures are logged and swallowed so a status
/// write can never abort the encode that triggered it.
pub async fn publish(store: &dyn StatusStore, job_id: &str, record: StatusRecord) {
    tracing::debug!(
        job_id,
        status = ?record.status,
        progress = record.progress,
        mode = %record.mode,
        "publishing status"
    );
    if let Err(e) = store.write(job_id, &record).await {
        tracing::warn!(job_id, error = %e, "failed to publish status record");
    }
}
