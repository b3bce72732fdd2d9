use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::strategy::Mode;

/// File names inside a job's working directory.
pub const FINAL_MANIFEST: &str = "movie.m3u8";
pub const STATUS_FILE: &str = "status.json";
pub const METADATA_FILE: &str = "metadata.json";
pub const POSTER_FILE: &str = "poster.jpg";
pub const CHUNK_DIR: &str = ".chunks";

/// A single transcode job, owned by the pipeline for its lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Slug derived from the title
    pub id: String,
    pub title: String,
    pub input_path: PathBuf,
    pub work_dir: PathBuf,
    pub created_at: DateTime<Utc>,
}

impl Job {
    pub fn final_manifest(&self) -> PathBuf {
        self.work_dir.join(FINAL_MANIFEST)
    }

    pub fn chunk_dir(&self) -> PathBuf {
        self.work_dir.join(CHUNK_DIR)
    }
}

/// A time-bounded slice of the original input produced by lossless segmentation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub index: usize,
    pub input_path: PathBuf,
    pub manifest_path: PathBuf,
}

impl Chunk {
    pub fn manifest_name(index: usize) -> String {
        format!("chunk_{:03}.m3u8", index)
    }

    pub fn segment_pattern(index: usize) -> String {
        format!("chunk_{:03}_%03d.ts", index)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Processing,
    Ready,
    Error,
}

/// Machine-readable progress record polled by external viewers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRecord {
    pub status: JobStatus,
    pub progress: u8,
    pub mode: Mode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StatusRecord {
    pub fn processing(mode: Mode, progress: u8) -> Self {
        Self {
            status: JobStatus::Processing,
            progress: progress.min(100),
            mode,
            error: None,
        }
    }

    pub fn ready(mode: Mode) -> Self {
        Self {
            status: JobStatus::Ready,
            progress: 100,
            mode,
            error: None,
        }
    }

    pub fn failed(mode: Mode, progress: u8, message: impl Into<String>) -> Self {
        Self {
            status: JobStatus::Error,
            progress: progress.min(100),
            mode,
            error: Some(message.into()),
        }
    }
}

/// Per-item metadata written next to the media, read by the gallery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovieMetadata {
    pub title: String,
    pub slug: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "unknown_duration")]
    pub duration: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

fn unknown_duration() -> String {
    String::from("Unknown")
}

impl MovieMetadata {
    pub fn new(title: &str, slug: &str, description: &str, created_at: DateTime<Utc>) -> Self {
        Self {
            title: title.to_string(),
            slug: slug.to_string(),
            description: description.to_string(),
            duration: unknown_duration(),
            created_at: Some(created_at),
        }
    }
}

/// Render seconds the way the gallery shows durations, e.g. `1h 32m` or `7m 05s`.
pub fn format_duration(seconds: f64) -> String {
    let total = seconds.max(0.0).round() as u64;
    let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
    if h > 0 {
        format!("{}h {:02}m", h, m)
    } else {
        format!("{}m {:02}s", m, s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_record_shape() {
        let record = StatusRecord::processing(Mode::SemiTurbo, 40);
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(
            value,
            json!({"status": "processing", "progress": 40, "mode": "semi-turbo"})
        );
    }

    #[test]
    fn test_failed_record_carries_error() {
        let record = StatusRecord::failed(Mode::Safe, 250, "boom");
        assert_eq!(record.progress, 100);
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["error"], "boom");
        assert_eq!(value["status"], "error");
    }

    #[test]
    fn test_metadata_defaults() {
        let meta: MovieMetadata =
            serde_json::from_str(r#"{"title": "Old", "slug": "old"}"#).unwrap();
        assert_eq!(meta.duration, "Unknown");
        assert_eq!(meta.description, "");
        assert!(meta.created_at.is_none());
    }

    #[test]
    fn test_chunk_names() {
        assert_eq!(Chunk::manifest_name(7), "chunk_007.m3u8");
        assert_eq!(Chunk::segment_pattern(12), "chunk_012_%03d.ts");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(425.0), "7m 05s");
        assert_eq!(format_duration(5520.4), "1h 32m");
    }
}
