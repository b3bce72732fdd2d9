//! Drives one job down the Turbo → SemiTurbo → Safe ladder until it is ready
//! or every rung has failed.

use crate::domain::av::{MediaProbe, StreamMap};
use crate::domain::jobs::{Chunk, Job, StatusRecord, FINAL_MANIFEST};
use crate::domain::stitch::stitch;
use crate::domain::strategy::{modes_visited, Mode, Outcome, State, StrategyMachine, Transition};
use crate::ports::encoder::{EncodeEvent, EncodeRequest, Encoder, VideoCodec};
use crate::ports::segmenter::Segmenter;
use crate::ports::status::{publish, StatusStore};
use futures::StreamExt;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tracing::{error, info, warn};

const TURBO_SEGMENT_PATTERN: &str = "segment_%03d.ts";

#[derive(Debug, Clone)]
pub struct SelectorSettings {
    pub chunk_seconds: u32,
    /// Pause between chunk encodes to let the host cool down
    pub chunk_cooldown: Duration,
}

impl Default for SelectorSettings {
    fn default() -> Self {
        Self {
            chunk_seconds: 300,
            chunk_cooldown: Duration::from_secs(2),
        }
    }
}

/// What happened to a job, returned by the background task.
#[derive(Debug, Clone)]
pub struct StrategyReport {
    pub final_state: State,
    pub transitions: Vec<Transition>,
}

impl StrategyReport {
    pub fn modes_visited(&self) -> Vec<Mode> {
        modes_visited(&self.transitions)
    }

    pub fn is_ready(&self) -> bool {
        self.final_state == State::Ready
    }
}

/// Built per job; owns nothing but handles to the shared capabilities.
pub struct StrategySelector {
    encoder: Arc<dyn Encoder>,
    segmenter: Arc<dyn Segmenter>,
    status: Arc<dyn StatusStore>,
    settings: SelectorSettings,
}

impl StrategySelector {
    pub fn new(
        encoder: Arc<dyn Encoder>,
        segmenter: Arc<dyn Segmenter>,
        status: Arc<dyn StatusStore>,
        settings: SelectorSettings,
    ) -> Self {
        Self {
            encoder,
            segmenter,
            status,
            settings,
        }
    }

    /// Run the ladder to a terminal state, publishing status along the way.
    pub async fn run(&self, job: &Job, probe: &MediaProbe) -> StrategyReport {
        let mut machine = StrategyMachine::new();
        let mut progress = 0u8;

        while !machine.state().is_terminal() {
            let mode = machine.mode();
            info!(job_id = %job.id, %mode, "encoding attempt started");
            let outcome = if mode.is_chunked() {
                self.run_chunked(job, mode, &mut progress).await
            } else {
                self.run_turbo(job, probe, &mut progress).await
            };
            let reason = outcome.reason().map(str::to_string);

            match machine.apply(outcome) {
                State::Encoding(next) => {
                    warn!(
                        job_id = %job.id,
                        from = %mode,
                        to = %next,
                        reason = reason.as_deref().unwrap_or_default(),
                        "falling back"
                    );
                    clear_partial_outputs(job).await;
                    progress = 0;
                    publish(self.status.as_ref(), &job.id, StatusRecord::processing(next, 0)).await;
                }
                State::Ready => {
                    info!(job_id = %job.id, %mode, "job ready");
                    publish(self.status.as_ref(), &job.id, StatusRecord::ready(mode)).await;
                }
                State::Error => {
                    let message = reason.unwrap_or_else(|| String::from("encoding failed"));
                    error!(job_id = %job.id, %mode, error = %message, "every strategy failed");
                    clear_partial_outputs(job).await;
                    publish(
                        self.status.as_ref(),
                        &job.id,
                        StatusRecord::failed(mode, progress, message),
                    )
                    .await;
                }
            }
        }

        StrategyReport {
            final_state: machine.state(),
            transitions: machine.into_history(),
        }
    }

    async fn run_turbo(&self, job: &Job, probe: &MediaProbe, progress: &mut u8) -> Outcome {
        let request = EncodeRequest {
            input: job.input_path.clone(),
            output_dir: job.work_dir.clone(),
            playlist_name: FINAL_MANIFEST.to_string(),
            segment_pattern: TURBO_SEGMENT_PATTERN.to_string(),
            video: VideoCodec::Copy,
            stream_map: StreamMap::for_audio(&probe.audio_streams),
            duration: probe.duration,
        };

        match self.drive(job, Mode::Turbo, request, Some(progress)).await {
            Ok(()) if exists(&job.final_manifest()).await => Outcome::Succeeded,
            Ok(()) => Outcome::EncodeFailed(String::from("encoder finished without a playlist")),
            Err(reason) => Outcome::EncodeFailed(reason),
        }
    }

    async fn run_chunked(&self, job: &Job, mode: Mode, progress: &mut u8) -> Outcome {
        let chunk_dir = job.chunk_dir();
        remove_dir(&chunk_dir).await;
        if let Err(e) = fs::create_dir_all(&chunk_dir).await {
            return Outcome::SegmentationFailed(e.to_string());
        }

        let inputs = match self
            .segmenter
            .segment(&job.input_path, &chunk_dir, self.settings.chunk_seconds)
            .await
        {
            Ok(inputs) => inputs,
            Err(e) => {
                remove_dir(&chunk_dir).await;
                return Outcome::SegmentationFailed(e.to_string());
            }
        };

        let total = inputs.len();
        info!(job_id = %job.id, %mode, chunks = total, "input segmented");
        let video = if mode.copies_video() {
            VideoCodec::Copy
        } else {
            VideoCodec::H264
        };

        let mut manifests = Vec::with_capacity(total);
        for (index, input_path) in inputs.into_iter().enumerate() {
            let chunk = Chunk {
                index,
                input_path,
                manifest_path: job.work_dir.join(Chunk::manifest_name(index)),
            };

            if index > 0 && !self.settings.chunk_cooldown.is_zero() {
                tokio::time::sleep(self.settings.chunk_cooldown).await;
            }
            *progress = (index * 100 / total) as u8;
            publish(
                self.status.as_ref(),
                &job.id,
                StatusRecord::processing(mode, *progress),
            )
            .await;

            let request = EncodeRequest {
                input: chunk.input_path.clone(),
                output_dir: job.work_dir.clone(),
                playlist_name: Chunk::manifest_name(index),
                segment_pattern: Chunk::segment_pattern(index),
                video,
                stream_map: StreamMap::Single,
                duration: None,
            };
            let result = self.drive(job, mode, request, None).await;

            // Raw chunks are only needed until their own encode is over
            if let Err(e) = fs::remove_file(&chunk.input_path).await {
                warn!(path = ?chunk.input_path, error = %e, "could not remove raw chunk");
            }

            match result {
                Ok(()) if exists(&chunk.manifest_path).await => manifests.push(chunk.manifest_path),
                Ok(()) => {
                    remove_dir(&chunk_dir).await;
                    return Outcome::ChunkFailed {
                        index,
                        reason: String::from("encoder finished without a playlist"),
                    };
                }
                Err(reason) => {
                    remove_dir(&chunk_dir).await;
                    return Outcome::ChunkFailed { index, reason };
                }
            }
        }

        let stitched = stitch(&manifests, &job.final_manifest()).await;
        remove_dir(&chunk_dir).await;
        match stitched {
            Ok(playlist) => {
                info!(job_id = %job.id, segments = playlist.segments.len(), "chunks stitched");
                Outcome::Succeeded
            }
            Err(e) => Outcome::StitchFailed(e.to_string()),
        }
    }

    /// Consume an encode's event stream. Progress is forwarded to the status
    /// store only when `progress` is given, and only when it grows.
    async fn drive(
        &self,
        job: &Job,
        mode: Mode,
        request: EncodeRequest,
        mut progress: Option<&mut u8>,
    ) -> Result<(), String> {
        let mut events = self.encoder.run_encode(request);
        while let Some(event) = events.next().await {
            match event {
                EncodeEvent::Progress(percent) => {
                    if let Some(last) = progress.as_deref_mut() {
                        if percent > *last {
                            *last = percent;
                            publish(
                                self.status.as_ref(),
                                &job.id,
                                StatusRecord::processing(mode, percent),
                            )
                            .await;
                        }
                    }
                }
                EncodeEvent::Done => return Ok(()),
                EncodeEvent::Failed(reason) => return Err(reason),
            }
        }
        Err(String::from("encoder stopped without reporting an exit status"))
    }
}

async fn exists(path: &Path) -> bool {
    fs::try_exists(path).await.unwrap_or(false)
}

async fn remove_dir(path: &Path) {
    match fs::remove_dir_all(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!(?path, error = %e, "could not remove directory"),
    }
}

/// Remove playlists, segments and chunk leftovers of a failed attempt. The
/// uploaded input and the job's json records stay.
async fn clear_partial_outputs(job: &Job) {
    remove_dir(&job.chunk_dir()).await;

    let mut entries = match fs::read_dir(&job.work_dir).await {
        Ok(entries) => entries,
        Err(e) => {
            warn!(dir = ?job.work_dir, error = %e, "could not list work dir for cleanup");
            return;
        }
    };
    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => {
                warn!(dir = ?job.work_dir, error = %e, "cleanup listing interrupted");
                break;
            }
        };
        let path = entry.path();
        if path == job.input_path {
            continue;
        }
        let is_output = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("m3u8") | Some("ts")
        );
        if is_output {
            if let Err(e) = fs::remove_file(&path).await {
                warn!(?path, error = %e, "could not remove partial output");
            }
        }
    }
}
