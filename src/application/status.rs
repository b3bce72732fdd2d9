//! Status lookups for viewers polling a job.

use crate::adapters::local::fs::MovieLibrary;
use crate::domain::jobs::{JobStatus, StatusRecord};
use crate::domain::slug::{validate_id, InvalidId};
use crate::domain::strategy::Mode;
use crate::ports::status::{StatusStore, StoreError};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum StatusQueryError {
    #[error(transparent)]
    InvalidId(#[from] InvalidId),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ViewStatus {
    Processing,
    Ready,
    Error,
    NotFound,
}

impl From<JobStatus> for ViewStatus {
    fn from(status: JobStatus) -> Self {
        match status {
            JobStatus::Processing => ViewStatus::Processing,
            JobStatus::Ready => ViewStatus::Ready,
            JobStatus::Error => ViewStatus::Error,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusView {
    pub status: ViewStatus,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<Mode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<StatusRecord> for StatusView {
    fn from(record: StatusRecord) -> Self {
        Self {
            status: record.status.into(),
            progress: record.progress,
            mode: Some(record.mode),
            error: record.error,
        }
    }
}

impl StatusView {
    fn inferred(status: ViewStatus, progress: u8) -> Self {
        Self {
            status,
            progress,
            mode: None,
            error: None,
        }
    }
}

/// Current state of a job.
///
/// Directories from before status records existed have none; they are
/// reported ready when the final playlist is there and not-found otherwise.
/// A record that cannot be parsed is treated the same way.
pub async fn query_status(
    store: &dyn StatusStore,
    library: &MovieLibrary,
    slug: &str,
) -> Result<StatusView, StatusQueryError> {
    validate_id(slug)?;

    match store.read(slug).await {
        Ok(Some(record)) => return Ok(record.into()),
        Ok(None) => {}
        Err(StoreError::Malformed(e)) => {
            tracing::warn!(slug, error = %e, "ignoring unreadable status record");
        }
        Err(e) => return Err(e.into()),
    }

    if library.has_final_manifest(slug).await {
        Ok(StatusView::inferred(ViewStatus::Ready, 100))
    } else {
        Ok(StatusView::inferred(ViewStatus::NotFound, 0))
    }
}
