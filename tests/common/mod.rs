//! Fakes shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use reelhouse::adapters::local::{FsStatusStore, LockManager, MovieLibrary};
use reelhouse::application::SelectorSettings;
use reelhouse::domain::av::MediaProbe;
use reelhouse::ports::clock::SystemClock;
use reelhouse::ports::encoder::{EncodeEvent, EncodeRequest, Encoder};
use reelhouse::ports::poster::PosterGenerator;
use reelhouse::ports::prober::Prober;
use reelhouse::ports::segmenter::{SegmentError, Segmenter};
use reelhouse::{Pipeline, Toolchain};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;

pub enum Step {
    Succeed { segments: usize },
    Fail(&'static str),
    /// Succeed once the paired sender fires
    Gate(oneshot::Receiver<()>),
}

/// Encoder writing real playlists and segment files, following a script.
pub struct ScriptedEncoder {
    steps: Mutex<VecDeque<Step>>,
    pub calls: Mutex<Vec<EncodeRequest>>,
}

impl ScriptedEncoder {
    pub fn new(steps: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            steps: Mutex::new(steps.into()),
            calls: Mutex::new(Vec::new()),
        })
    }
}

fn write_playlist(request: &EncodeRequest, segments: usize) {
    let mut playlist = String::from("#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-TARGETDURATION:6\n");
    for i in 0..segments {
        let name = request.segment_pattern.replace("%03d", &format!("{:03}", i));
        std::fs::write(request.output_dir.join(&name), b"ts").unwrap();
        playlist.push_str(&format!("#EXTINF:6.000000,\n{}\n", name));
    }
    playlist.push_str("#EXT-X-ENDLIST\n");
    std::fs::write(request.output_dir.join(&request.playlist_name), playlist).unwrap();
}

impl Encoder for ScriptedEncoder {
    fn run_encode(&self, request: EncodeRequest) -> BoxStream<'static, EncodeEvent> {
        self.calls.lock().unwrap().push(request.clone());
        let step = self
            .steps
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Step::Succeed { segments: 3 });
        match step {
            Step::Succeed { segments } => {
                write_playlist(&request, segments);
                stream::iter(vec![EncodeEvent::Progress(50), EncodeEvent::Done]).boxed()
            }
            Step::Fail(reason) => {
                stream::iter(vec![EncodeEvent::Failed(reason.to_string())]).boxed()
            }
            Step::Gate(rx) => stream::once(async move {
                let _ = rx.await;
                write_playlist(&request, 3);
                EncodeEvent::Done
            })
            .boxed(),
        }
    }
}

pub struct FixedProber(pub MediaProbe);

#[async_trait]
impl Prober for FixedProber {
    async fn probe(&self, _input: &Path) -> MediaProbe {
        self.0.clone()
    }
}

/// Segmenter that writes `chunks` raw chunk files without looking at the input.
pub struct FakeSegmenter {
    pub chunks: usize,
}

#[async_trait]
impl Segmenter for FakeSegmenter {
    async fn segment(
        &self,
        _input: &Path,
        chunk_dir: &Path,
        _chunk_seconds: u32,
    ) -> Result<Vec<PathBuf>, SegmentError> {
        let mut out = Vec::new();
        for i in 0..self.chunks {
            let path = chunk_dir.join(format!("chunk_{:03}.mkv", i));
            tokio::fs::write(&path, b"raw").await?;
            out.push(path);
        }
        Ok(out)
    }
}

pub struct TouchPoster;

#[async_trait]
impl PosterGenerator for TouchPoster {
    async fn generate(
        &self,
        _input: &Path,
        output: &Path,
        _at_seconds: f64,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        tokio::fs::write(output, b"jpg").await?;
        Ok(())
    }
}

pub fn pipeline(root: &Path, encoder: Arc<ScriptedEncoder>, chunks: usize) -> Pipeline {
    let clock = Arc::new(SystemClock);
    let lock = LockManager::new(
        root.join(".transcode.lock"),
        chrono::Duration::minutes(5),
        clock.clone(),
    );
    Pipeline::new(
        Arc::new(lock),
        MovieLibrary::new(root),
        Arc::new(FsStatusStore::new(root)),
        Toolchain {
            prober: Arc::new(FixedProber(MediaProbe {
                audio_streams: Vec::new(),
                duration: Some(5400.0),
            })),
            encoder,
            segmenter: Arc::new(FakeSegmenter { chunks }),
            poster: Arc::new(TouchPoster),
        },
        clock,
        SelectorSettings {
            chunk_seconds: 300,
            chunk_cooldown: Duration::ZERO,
        },
    )
}
