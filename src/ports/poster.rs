use async_trait::async_trait;
use std::path::Path;

/// Still-frame extraction for the gallery.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PosterGenerator: Send + Sync {
    /// Grab one frame at `at_seconds` into `output`.
    async fn generate(
        &self,
        input: &Path,
        output: &Path,
        at_seconds: f64,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}
