//! Upload admission and the background transcode that follows it.

use super::selector::{SelectorSettings, StrategyReport, StrategySelector};
use super::status::{query_status, StatusQueryError, StatusView};
use crate::adapters::local::fs::{LibraryError, MovieEntry, MovieLibrary};
use crate::adapters::local::lock::{Acquire, LockError, LockGuard, LockManager};
use crate::domain::jobs::{format_duration, Job, MovieMetadata, StatusRecord, POSTER_FILE};
use crate::domain::slug::slugify;
use crate::domain::strategy::Mode;
use crate::ports::clock::Clock;
use crate::ports::encoder::Encoder;
use crate::ports::poster::PosterGenerator;
use crate::ports::prober::Prober;
use crate::ports::segmenter::Segmenter;
use crate::ports::status::{publish, StatusStore};
use axum::body::Bytes;
use axum::BoxError;
use futures::{Stream, TryStreamExt};
use std::io;
use std::path::Path;
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::task::JoinHandle;
use tokio_util::io::StreamReader;
use tracing::{error, info, warn};

/// Where in the movie the poster frame is grabbed, as a fraction of its length.
const POSTER_POSITION: f64 = 0.1;
const DEFAULT_EXTENSION: &str = "mp4";

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error(transparent)]
    Lock(#[from] LockError),
    #[error(transparent)]
    Library(#[from] LibraryError),
    #[error("saving upload: {0}")]
    Upload(#[source] io::Error),
}

/// Everything about an upload except its bytes.
#[derive(Debug, Clone, Default)]
pub struct UploadRequest {
    pub title: String,
    pub description: String,
    /// Client-side file name, only used for its extension
    pub file_name: Option<String>,
    pub skip_poster: bool,
}

#[derive(Debug)]
pub enum Admission {
    /// The upload is on disk and the transcode runs in the background
    Accepted {
        slug: String,
        task: JoinHandle<StrategyReport>,
    },
    RejectedBusy {
        holder: Option<String>,
        lock_age: chrono::Duration,
    },
    RejectedInvalid(String),
}

/// External tools the pipeline drives.
#[derive(Clone)]
pub struct Toolchain {
    pub prober: Arc<dyn Prober>,
    pub encoder: Arc<dyn Encoder>,
    pub segmenter: Arc<dyn Segmenter>,
    pub poster: Arc<dyn PosterGenerator>,
}

#[derive(Clone)]
pub struct Pipeline {
    lock: Arc<LockManager>,
    library: MovieLibrary,
    status: Arc<dyn StatusStore>,
    tools: Toolchain,
    clock: Arc<dyn Clock>,
    settings: SelectorSettings,
}

impl Pipeline {
    pub fn new(
        lock: Arc<LockManager>,
        library: MovieLibrary,
        status: Arc<dyn StatusStore>,
        tools: Toolchain,
        clock: Arc<dyn Clock>,
        settings: SelectorSettings,
    ) -> Self {
        Self {
            lock,
            library,
            status,
            tools,
            clock,
            settings,
        }
    }

    pub fn lock(&self) -> &LockManager {
        &self.lock
    }

    pub fn library(&self) -> &MovieLibrary {
        &self.library
    }

    /// Admit an upload: at most one job runs at a time, and a rejected upload
    /// leaves nothing behind.
    pub async fn ingest<S, E>(
        &self,
        request: UploadRequest,
        body: S,
    ) -> Result<Admission, IngestError>
    where
        S: Stream<Item = Result<Bytes, E>>,
        E: Into<BoxError>,
    {
        let title = request.title.trim();
        if title.is_empty() {
            return Ok(Admission::RejectedInvalid(String::from("title is required")));
        }
        let slug = slugify(title);
        if slug.is_empty() {
            return Ok(Admission::RejectedInvalid(format!(
                "title {:?} has no usable characters",
                title
            )));
        }

        let guard = match self.lock.try_acquire(title, false).await? {
            Acquire::Granted(guard) => guard,
            Acquire::StaleReclaimed {
                guard,
                previous_holder,
                age,
            } => {
                warn!(?previous_holder, age_secs = age.num_seconds(), "took over abandoned lock");
                guard
            }
            Acquire::Busy { holder, age } => {
                return Ok(Admission::RejectedBusy {
                    holder,
                    lock_age: age,
                })
            }
        };

        // Checked under the lock so two colliding titles cannot both pass. A
        // directory whose owner cannot be read is never wiped.
        match self.library.read_metadata(&slug).await {
            Ok(Some(existing)) if existing.title != title => {
                return Ok(Admission::RejectedInvalid(format!(
                    "{:?} is already used by {:?}",
                    slug, existing.title
                )));
            }
            Ok(_) => {}
            Err(e) => {
                warn!(%slug, error = %e, "existing movie metadata is unreadable");
                return Ok(Admission::RejectedInvalid(format!(
                    "{:?} is already used by a movie with unreadable metadata",
                    slug
                )));
            }
        }

        let work_dir = self.library.prepare_dir(&slug).await?;
        let extension = input_extension(request.file_name.as_deref());
        let input_path = work_dir.join(format!("input.{}", extension));
        info!(%slug, path = ?input_path, "receiving upload");

        let written = match stream_to_file(&input_path, body).await {
            Ok(written) => written,
            Err(e) => {
                self.discard(&slug).await;
                return Err(IngestError::Upload(e));
            }
        };
        if written == 0 {
            self.discard(&slug).await;
            return Ok(Admission::RejectedInvalid(String::from("uploaded file is empty")));
        }

        let created_at = self.clock.now();
        let metadata = MovieMetadata::new(title, &slug, request.description.trim(), created_at);
        if let Err(e) = self.library.write_metadata(&metadata).await {
            self.discard(&slug).await;
            return Err(e.into());
        }
        publish(self.status.as_ref(), &slug, StatusRecord::processing(Mode::Turbo, 0)).await;

        let job = Job {
            id: slug.clone(),
            title: title.to_string(),
            input_path,
            work_dir,
            created_at,
        };
        info!(job_id = %job.id, bytes = written, "upload accepted");

        let pipeline = self.clone();
        let skip_poster = request.skip_poster;
        let task = tokio::spawn(async move { pipeline.transcode(job, guard, skip_poster).await });

        Ok(Admission::Accepted { slug, task })
    }

    /// Probe, grab a poster, run the strategy ladder, release the lock.
    pub async fn transcode(&self, job: Job, guard: LockGuard, skip_poster: bool) -> StrategyReport {
        let probe = self.tools.prober.probe(&job.input_path).await;
        info!(
            job_id = %job.id,
            audio_tracks = probe.audio_streams.len(),
            duration = ?probe.duration,
            "input probed"
        );

        if let Some(duration) = probe.duration {
            self.record_duration(&job.id, duration).await;
        }

        if !skip_poster {
            let at = probe.duration.map_or(0.0, |d| d * POSTER_POSITION);
            let output = job.work_dir.join(POSTER_FILE);
            if let Err(e) = self.tools.poster.generate(&job.input_path, &output, at).await {
                warn!(job_id = %job.id, error = %e, "poster generation failed");
            }
        }

        let selector = StrategySelector::new(
            self.tools.encoder.clone(),
            self.tools.segmenter.clone(),
            self.status.clone(),
            self.settings.clone(),
        );
        let report = selector.run(&job, &probe).await;

        if let Err(e) = guard.release().await {
            error!(job_id = %job.id, error = %e, "failed to release lock");
        }
        info!(
            job_id = %job.id,
            state = ?report.final_state,
            modes = ?report.modes_visited(),
            "job finished"
        );
        report
    }

    pub async fn status(&self, slug: &str) -> Result<StatusView, StatusQueryError> {
        query_status(self.status.as_ref(), &self.library, slug).await
    }

    pub async fn list_movies(&self) -> Result<Vec<MovieEntry>, LibraryError> {
        self.library.list().await
    }

    pub async fn delete_movie(&self, slug: &str) -> Result<(), LibraryError> {
        self.library.delete(slug).await
    }

    async fn record_duration(&self, slug: &str, seconds: f64) {
        let result = async {
            if let Some(mut metadata) = self.library.read_metadata(slug).await? {
                metadata.duration = format_duration(seconds);
                self.library.write_metadata(&metadata).await?;
            }
            Ok::<_, LibraryError>(())
        }
        .await;
        if let Err(e) = result {
            warn!(job_id = slug, error = %e, "could not record duration");
        }
    }

    async fn discard(&self, slug: &str) {
        if let Err(e) = self.library.delete(slug).await {
            warn!(%slug, error = %e, "could not clean up rejected upload");
        }
    }
}

/// Extension of the client file name when it looks sane, `mp4` otherwise.
fn input_extension(file_name: Option<&str>) -> String {
    file_name
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| {
            !ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric())
        })
        .map(str::to_ascii_lowercase)
        .unwrap_or_else(|| DEFAULT_EXTENSION.to_string())
}

/// Save a `Stream` to a file, returning the number of bytes written.
pub async fn stream_to_file<S, E>(path: &Path, stream: S) -> io::Result<u64>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: Into<BoxError>,
{
    let body_with_io_error = stream.map_err(|err| io::Error::new(io::ErrorKind::Other, err));
    let body_reader = StreamReader::new(body_with_io_error);
    futures::pin_mut!(body_reader);

    let mut file = BufWriter::new(File::create(path).await?);
    let written = tokio::io::copy(&mut body_reader, &mut file).await?;
    file.flush().await?;

    Ok(written)
}
