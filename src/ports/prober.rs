use crate::domain::av::MediaProbe;
use async_trait::async_trait;
use std::path::Path;

/// One-shot media inspection.
///
/// Probing is advisory: implementations return `MediaProbe::default()` when
/// inspection fails, and callers fall back to a single audio track.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, input: &Path) -> MediaProbe;
}
