//! Filesystem storage: status records, metadata and per-movie directories.

use crate::domain::jobs::{
    MovieMetadata, StatusRecord, FINAL_MANIFEST, METADATA_FILE, POSTER_FILE, STATUS_FILE,
};
use crate::domain::slug::{validate_id, InvalidId};
use crate::ports::status::{StatusStore, StoreError};
use async_trait::async_trait;
use serde::Serialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;

#[derive(Debug, thiserror::Error)]
pub enum LibraryError {
    #[error(transparent)]
    InvalidId(#[from] InvalidId),
    #[error("library io: {0}")]
    Io(#[from] std::io::Error),
    #[error("metadata serialization: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Write through a sibling temp file and rename, so readers never observe a
/// half-written document.
pub async fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let raw = serde_json::to_vec_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, raw).await?;
    fs::rename(&tmp, path).await?;
    Ok(())
}

/// `status.json` inside each movie directory.
#[derive(Debug, Clone)]
pub struct FsStatusStore {
    root: PathBuf,
}

impl FsStatusStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, job_id: &str) -> PathBuf {
        self.root.join(job_id).join(STATUS_FILE)
    }
}

#[async_trait]
impl StatusStore for FsStatusStore {
    async fn write(&self, job_id: &str, record: &StatusRecord) -> Result<(), StoreError> {
        write_json_atomic(&self.path_for(job_id), record).await
    }

    async fn read(&self, job_id: &str) -> Result<Option<StatusRecord>, StoreError> {
        match fs::read(self.path_for(job_id)).await {
            Ok(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Gallery entry returned by [`MovieLibrary::list`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MovieEntry {
    #[serde(flatten)]
    pub metadata: MovieMetadata,
    pub stream_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poster_url: Option<String>,
}

/// The movies root: one directory per job.
#[derive(Debug, Clone)]
pub struct MovieLibrary {
    root: PathBuf,
}

impl MovieLibrary {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn movie_dir(&self, slug: &str) -> PathBuf {
        self.root.join(slug)
    }

    pub async fn read_metadata(&self, slug: &str) -> Result<Option<MovieMetadata>, LibraryError> {
        match fs::read(self.movie_dir(slug).join(METADATA_FILE)).await {
            Ok(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn write_metadata(&self, metadata: &MovieMetadata) -> Result<(), LibraryError> {
        let path = self.movie_dir(&metadata.slug).join(METADATA_FILE);
        write_json_atomic(&path, metadata).await.map_err(|e| match e {
            StoreError::Io(e) => LibraryError::Io(e),
            StoreError::Malformed(e) => LibraryError::Serialization(e),
        })
    }

    pub async fn has_final_manifest(&self, slug: &str) -> bool {
        fs::try_exists(self.movie_dir(slug).join(FINAL_MANIFEST))
            .await
            .unwrap_or(false)
    }

    /// Create an empty directory for a job, clearing whatever a previous run
    /// of the same title left behind.
    pub async fn prepare_dir(&self, slug: &str) -> Result<PathBuf, LibraryError> {
        validate_id(slug)?;
        let dir = self.movie_dir(slug);
        match fs::remove_dir_all(&dir).await {
            Ok(()) => tracing::info!(?dir, "cleared previous contents"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        fs::create_dir_all(&dir).await?;
        Ok(dir)
    }

    /// Every directory with readable metadata, newest first.
    pub async fn list(&self) -> Result<Vec<MovieEntry>, LibraryError> {
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut movies = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with('.') || !entry.file_type().await?.is_dir() {
                continue;
            }
            let metadata = match self.read_metadata(&name).await {
                Ok(Some(metadata)) => metadata,
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!(
                        slug = %name,
                        error = %e,
                        "skipping movie with unreadable metadata"
                    );
                    continue;
                }
            };
            let has_poster = fs::try_exists(entry.path().join(POSTER_FILE))
                .await
                .unwrap_or(false);
            movies.push(MovieEntry {
                stream_url: format!("/hls/{}/{}", name, FINAL_MANIFEST),
                poster_url: has_poster.then(|| format!("/hls/{}/{}", name, POSTER_FILE)),
                metadata,
            });
        }

        movies.sort_by(|a, b| b.metadata.created_at.cmp(&a.metadata.created_at));
        Ok(movies)
    }

    /// Remove a movie's directory. Deleting an absent movie succeeds.
    pub async fn delete(&self, slug: &str) -> Result<(), LibraryError> {
        validate_id(slug)?;
        match fs::remove_dir_all(self.movie_dir(slug)).await {
            Ok(()) => {
                tracing::info!(slug, "movie deleted");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::strategy::Mode;
    use chrono::{Duration, Utc};

    #[tokio::test]
    async fn test_status_store_roundtrip_and_absence() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("alien")).await.unwrap();
        let store = FsStatusStore::new(dir.path());

        assert!(store.read("alien").await.unwrap().is_none());

        let record = StatusRecord::processing(Mode::Turbo, 12);
        store.write("alien", &record).await.unwrap();
        assert_eq!(store.read("alien").await.unwrap(), Some(record));
        assert!(!dir.path().join("alien/status.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_status_write_into_missing_dir_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStatusStore::new(dir.path());
        let result = store.write("ghost", &StatusRecord::ready(Mode::Turbo)).await;
        assert!(matches!(result, Err(StoreError::Io(_))));
    }

    #[tokio::test]
    async fn test_list_skips_invalid_and_sorts_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let library = MovieLibrary::new(dir.path());
        let now = Utc::now();

        for (slug, age) in [("old", 10), ("new", 1)] {
            library.prepare_dir(slug).await.unwrap();
            let meta = MovieMetadata::new(slug, slug, "", now - Duration::minutes(age));
            library.write_metadata(&meta).await.unwrap();
        }
        fs::write(dir.path().join("new").join(POSTER_FILE), b"jpg").await.unwrap();
        fs::create_dir_all(dir.path().join("no-metadata")).await.unwrap();
        fs::create_dir_all(dir.path().join("broken")).await.unwrap();
        fs::write(dir.path().join("broken").join(METADATA_FILE), b"{").await.unwrap();
        fs::write(dir.path().join(".transcode.lock"), b"{}").await.unwrap();

        let movies = library.list().await.unwrap();
        let slugs: Vec<_> = movies.iter().map(|m| m.metadata.slug.as_str()).collect();
        assert_eq!(slugs, vec!["new", "old"]);
        assert_eq!(movies[0].stream_url, "/hls/new/movie.m3u8");
        assert_eq!(movies[0].poster_url.as_deref(), Some("/hls/new/poster.jpg"));
        assert!(movies[1].poster_url.is_none());
    }

    #[tokio::test]
    async fn test_list_missing_root_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let library = MovieLibrary::new(dir.path().join("nope"));
        assert!(library.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let library = MovieLibrary::new(dir.path().join("movies"));
        fs::create_dir_all(dir.path().join("precious")).await.unwrap();

        let result = library.delete("../precious").await;
        assert!(matches!(result, Err(LibraryError::InvalidId(_))));
        assert!(dir.path().join("precious").exists());
    }

    #[tokio::test]
    async fn test_delete_removes_directory() {
        let dir = tempfile::tempdir().unwrap();
        let library = MovieLibrary::new(dir.path());
        let movie = library.prepare_dir("alien").await.unwrap();
        fs::write(movie.join("segment_000.ts"), b"ts").await.unwrap();

        library.delete("alien").await.unwrap();
        assert!(!movie.exists());
        library.delete("alien").await.unwrap();
    }

    #[tokio::test]
    async fn test_prepare_dir_clears_leftovers() {
        let dir = tempfile::tempdir().unwrap();
        let library = MovieLibrary::new(dir.path());
        let movie = library.prepare_dir("alien").await.unwrap();
        fs::write(movie.join("chunk_003.m3u8"), b"partial").await.unwrap();

        let movie = library.prepare_dir("alien").await.unwrap();
        assert!(!movie.join("chunk_003.m3u8").exists());
        assert!(movie.is_dir());
    }
}
