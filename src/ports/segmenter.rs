use async_trait::async_trait;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum SegmentError {
    #[error("segmenter io: {0}")]
    Io(#[from] std::io::Error),
    #[error("segmenter failed: {0}")]
    Failed(String),
    #[error("segmentation produced no chunks")]
    NoChunks,
}

/// Lossless splitting of an input into fixed-duration pieces.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Segmenter: Send + Sync {
    /// Split `input` into `chunk_seconds` long files inside `chunk_dir`,
    /// returning them in playback order.
    async fn segment(
        &self,
        input: &Path,
        chunk_dir: &Path,
        chunk_seconds: u32,
    ) -> Result<Vec<PathBuf>, SegmentError>;
}
