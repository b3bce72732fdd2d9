//! ffmpeg-backed encoder, segmenter and poster grabber.

use super::cmd::{stderr_tail, CommandRunner, SystemRunner};
use crate::domain::av::progress::{parse_progress_line, percent, ProgressLine};
use crate::domain::av::StreamMap;
use crate::ports::encoder::{EncodeEvent, EncodeRequest, Encoder, VideoCodec};
use crate::ports::poster::PosterGenerator;
use crate::ports::segmenter::{SegmentError, Segmenter};
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::fs;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

const STDERR_TAIL_LINES: usize = 5;

fn base_args() -> Vec<String> {
    ["-y", "-nostdin", "-hide_banner", "-loglevel", "error"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

/// Full ffmpeg argument list for one HLS encode.
pub fn encode_args(request: &EncodeRequest, hls_time: u32) -> Vec<String> {
    let mut args = base_args();
    args.extend(["-progress", "pipe:1", "-nostats", "-i"].map(String::from));
    args.push(path_arg(&request.input));
    args.extend(request.stream_map.map_args());

    match request.video {
        VideoCodec::Copy => args.extend(["-c:v", "copy"].map(String::from)),
        VideoCodec::H264 => args.extend(
            ["-c:v", "libx264", "-preset", "veryfast", "-crf", "23", "-pix_fmt", "yuv420p"]
                .map(String::from),
        ),
    }
    args.extend(["-c:a", "aac", "-b:a", "160k", "-ac", "2"].map(String::from));
    args.extend(["-f", "hls", "-hls_playlist_type", "vod", "-hls_time"].map(String::from));
    args.push(hls_time.to_string());

    match &request.stream_map {
        StreamMap::Single => {
            args.push("-hls_segment_filename".into());
            args.push(path_arg(&request.output_dir.join(&request.segment_pattern)));
            args.push(path_arg(&request.output_dir.join(&request.playlist_name)));
        }
        map @ StreamMap::Variants(_) => {
            args.push("-master_pl_name".into());
            args.push(request.playlist_name.clone());
            if let Some(var_map) = map.var_stream_map() {
                args.push("-var_stream_map".into());
                args.push(var_map);
            }
            args.push("-hls_segment_filename".into());
            args.push(path_arg(&request.output_dir.join("stream_%v_%03d.ts")));
            args.push(path_arg(&request.output_dir.join("stream_%v.m3u8")));
        }
    }
    args
}

/// Spawns one ffmpeg process per encode and watches its progress stream.
#[derive(Debug, Clone)]
pub struct FfmpegEncoder {
    bin: String,
    hls_time: u32,
}

impl FfmpegEncoder {
    pub fn new(bin: impl Into<String>, hls_time: u32) -> Self {
        Self {
            bin: bin.into(),
            hls_time,
        }
    }
}

impl Encoder for FfmpegEncoder {
    fn run_encode(&self, request: EncodeRequest) -> BoxStream<'static, EncodeEvent> {
        let (tx, rx) = mpsc::channel(32);
        let args = encode_args(&request, self.hls_time);
        let bin = self.bin.clone();
        tokio::spawn(watch_encode(bin, args, request.duration, tx));
        ReceiverStream::new(rx).boxed()
    }
}

async fn watch_encode(
    bin: String,
    args: Vec<String>,
    duration: Option<f64>,
    tx: mpsc::Sender<EncodeEvent>,
) {
    tracing::debug!(bin = %bin, ?args, "starting encode");
    let mut child = match Command::new(&bin)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
    {
        Ok(child) => child,
        Err(e) => {
            let _ = tx
                .send(EncodeEvent::Failed(format!("could not start {}: {}", bin, e)))
                .await;
            return;
        }
    };

    let stderr_task = child.stderr.take().map(|stderr| {
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            let mut collected = Vec::new();
            while let Ok(Some(line)) = lines.next_line().await {
                collected.extend_from_slice(line.as_bytes());
                collected.push(b'\n');
            }
            stderr_tail(&collected, STDERR_TAIL_LINES)
        })
    });

    if let Some(stdout) = child.stdout.take() {
        let mut lines = BufReader::new(stdout).lines();
        let mut last: Option<u8> = None;
        let mut ended = false;
        // Keep draining after `progress=end` so ffmpeg never writes to a closed pipe
        while let Ok(Some(line)) = lines.next_line().await {
            let out_time = match parse_progress_line(&line) {
                Some(ProgressLine::OutTime(out_time)) if !ended => out_time,
                Some(ProgressLine::Block { end: true }) => {
                    ended = true;
                    continue;
                }
                _ => continue,
            };
            let Some(pct) = percent(out_time, duration) else {
                continue;
            };
            if last.map_or(true, |l| pct > l) {
                last = Some(pct);
                if tx.send(EncodeEvent::Progress(pct)).await.is_err() {
                    tracing::warn!("encode watcher dropped, killing ffmpeg");
                    let _ = child.kill().await;
                    return;
                }
            }
        }
    }

    let status = child.wait().await;
    let tail = match stderr_task {
        Some(task) => task.await.unwrap_or_default(),
        None => String::new(),
    };

    let event = match status {
        Ok(status) if status.success() => EncodeEvent::Done,
        Ok(status) => EncodeEvent::Failed(format!("ffmpeg exited with {}: {}", status, tail)),
        Err(e) => EncodeEvent::Failed(format!("waiting on ffmpeg failed: {}", e)),
    };
    let _ = tx.send(event).await;
}

/// Lossless stream-copy chunking through ffmpeg's segment muxer.
pub struct FfmpegSegmenter<R = SystemRunner> {
    bin: String,
    runner: R,
}

impl FfmpegSegmenter<SystemRunner> {
    pub fn new(bin: impl Into<String>) -> Self {
        Self::with_runner(bin, SystemRunner)
    }
}

impl<R: CommandRunner> FfmpegSegmenter<R> {
    pub fn with_runner(bin: impl Into<String>, runner: R) -> Self {
        Self {
            bin: bin.into(),
            runner,
        }
    }

    pub fn args(input: &Path, chunk_dir: &Path, chunk_seconds: u32) -> Vec<String> {
        let mut args = base_args();
        args.push("-i".into());
        args.push(path_arg(input));
        args.extend(
            ["-map", "0:v:0", "-map", "0:a?", "-c", "copy", "-f", "segment", "-segment_time"]
                .map(String::from),
        );
        args.push(chunk_seconds.to_string());
        args.extend(["-reset_timestamps", "1"].map(String::from));
        args.push(path_arg(&chunk_dir.join("chunk_%03d.mkv")));
        args
    }
}

#[async_trait]
impl<R: CommandRunner> Segmenter for FfmpegSegmenter<R> {
    async fn segment(
        &self,
        input: &Path,
        chunk_dir: &Path,
        chunk_seconds: u32,
    ) -> Result<Vec<PathBuf>, SegmentError> {
        fs::create_dir_all(chunk_dir).await?;

        let output = self
            .runner
            .output(&self.bin, &Self::args(input, chunk_dir, chunk_seconds))
            .await?;
        if !output.status.success() {
            return Err(SegmentError::Failed(format!(
                "ffmpeg exited with {}: {}",
                output.status,
                stderr_tail(&output.stderr, STDERR_TAIL_LINES)
            )));
        }

        let mut chunks = Vec::new();
        let mut entries = fs::read_dir(chunk_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with("chunk_") && name.ends_with(".mkv") {
                chunks.push(entry.path());
            }
        }
        // Zero-padded names sort in playback order
        chunks.sort();

        if chunks.is_empty() {
            return Err(SegmentError::NoChunks);
        }
        tracing::debug!(?input, chunks = chunks.len(), "segment muxer finished");
        Ok(chunks)
    }
}

/// Grabs a single scaled frame as the poster image.
pub struct FfmpegPoster<R = SystemRunner> {
    bin: String,
    runner: R,
}

impl FfmpegPoster<SystemRunner> {
    pub fn new(bin: impl Into<String>) -> Self {
        Self::with_runner(bin, SystemRunner)
    }
}

impl<R: CommandRunner> FfmpegPoster<R> {
    pub fn with_runner(bin: impl Into<String>, runner: R) -> Self {
        Self {
            bin: bin.into(),
            runner,
        }
    }
}

#[async_trait]
impl<R: CommandRunner> PosterGenerator for FfmpegPoster<R> {
    async fn generate(
        &self,
        input: &Path,
        output: &Path,
        at_seconds: f64,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let mut args = base_args();
        args.push("-ss".into());
        args.push(format!("{:.3}", at_seconds.max(0.0)));
        args.push("-i".into());
        args.push(path_arg(input));
        args.extend(["-frames:v", "1", "-vf", "scale=320:-2"].map(String::from));
        args.push(path_arg(output));

        let result = self.runner.output(&self.bin, &args).await?;
        if !result.status.success() {
            return Err(format!(
                "poster extraction failed: {}",
                stderr_tail(&result.stderr, STDERR_TAIL_LINES)
            )
            .into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::local::cmd::tests::mock_output;
    use crate::adapters::local::cmd::MockCommandRunner;
    use crate::domain::av::AudioStreamDescriptor;

    fn request(stream_map: StreamMap, video: VideoCodec) -> EncodeRequest {
        EncodeRequest {
            input: PathBuf::from("/m/alien/input.mkv"),
            output_dir: PathBuf::from("/m/alien"),
            playlist_name: "movie.m3u8".into(),
            segment_pattern: "segment_%03d.ts".into(),
            video,
            stream_map,
            duration: Some(100.0),
        }
    }

    fn window<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
        args.iter()
            .position(|a| a == flag)
            .and_then(|i| args.get(i + 1))
            .map(String::as_str)
    }

    #[test]
    fn test_single_variant_copy_args() {
        let args = encode_args(&request(StreamMap::Single, VideoCodec::Copy), 6);
        assert_eq!(window(&args, "-i"), Some("/m/alien/input.mkv"));
        assert_eq!(window(&args, "-c:v"), Some("copy"));
        assert_eq!(window(&args, "-c:a"), Some("aac"));
        assert_eq!(window(&args, "-hls_time"), Some("6"));
        assert_eq!(window(&args, "-progress"), Some("pipe:1"));
        assert_eq!(
            window(&args, "-hls_segment_filename"),
            Some("/m/alien/segment_%03d.ts")
        );
        assert_eq!(args.last().unwrap(), "/m/alien/movie.m3u8");
        assert!(!args.contains(&"-master_pl_name".to_string()));
    }

    #[test]
    fn test_multi_variant_args() {
        let tracks = vec![
            AudioStreamDescriptor { index: 0, language: "eng".into() },
            AudioStreamDescriptor { index: 1, language: "ger".into() },
        ];
        let args = encode_args(&request(StreamMap::for_audio(&tracks), VideoCodec::Copy), 6);
        assert_eq!(window(&args, "-master_pl_name"), Some("movie.m3u8"));
        assert_eq!(
            window(&args, "-var_stream_map"),
            Some("v:0,a:0,name:eng v:1,a:1,name:ger")
        );
        assert_eq!(args.last().unwrap(), "/m/alien/stream_%v.m3u8");
    }

    #[test]
    fn test_reencode_args() {
        let args = encode_args(&request(StreamMap::Single, VideoCodec::H264), 4);
        assert_eq!(window(&args, "-c:v"), Some("libx264"));
        assert_eq!(window(&args, "-pix_fmt"), Some("yuv420p"));
    }

    #[tokio::test]
    async fn test_segmenter_lists_chunks_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let chunk_dir = dir.path().join(".chunks");
        let written_dir = chunk_dir.clone();

        let mut runner = MockCommandRunner::new();
        runner
            .expect_output()
            .withf(|_, args| {
                args.contains(&"segment".to_string()) && args.contains(&"300".to_string())
            })
            .times(1)
            .returning(move |_, _| {
                for name in ["chunk_002.mkv", "chunk_000.mkv", "chunk_001.mkv", "notes.txt"] {
                    std::fs::write(written_dir.join(name), b"x").unwrap();
                }
                mock_output("", "", true)
            });

        let segmenter = FfmpegSegmenter::with_runner("ffmpeg", runner);
        let chunks = segmenter
            .segment(Path::new("/m/input.mkv"), &chunk_dir, 300)
            .await
            .unwrap();
        let names: Vec<_> = chunks
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["chunk_000.mkv", "chunk_001.mkv", "chunk_002.mkv"]);
    }

    #[tokio::test]
    async fn test_segmenter_failure() {
        let dir = tempfile::tempdir().unwrap();
        let mut runner = MockCommandRunner::new();
        runner
            .expect_output()
            .times(1)
            .returning(|_, _| mock_output("", "Invalid data found when processing input", false));

        let segmenter = FfmpegSegmenter::with_runner("ffmpeg", runner);
        let result = segmenter
            .segment(Path::new("/m/input.wmv"), &dir.path().join(".chunks"), 300)
            .await;
        match result {
            Err(SegmentError::Failed(msg)) => assert!(msg.contains("Invalid data")),
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_segmenter_no_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let mut runner = MockCommandRunner::new();
        runner.expect_output().returning(|_, _| mock_output("", "", true));

        let segmenter = FfmpegSegmenter::with_runner("ffmpeg", runner);
        let result = segmenter
            .segment(Path::new("/m/input.mp4"), &dir.path().join(".chunks"), 300)
            .await;
        assert!(matches!(result, Err(SegmentError::NoChunks)));
    }

    #[tokio::test]
    async fn test_poster_seeks_and_scales() {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_output()
            .withf(|_, args| {
                window(args, "-ss") == Some("42.500")
                    && window(args, "-frames:v") == Some("1")
                    && args.last().unwrap() == "/m/alien/poster.jpg"
            })
            .times(1)
            .returning(|_, _| mock_output("", "", true));

        let poster = FfmpegPoster::with_runner("ffmpeg", runner);
        poster
            .generate(Path::new("/m/alien/input.mp4"), Path::new("/m/alien/poster.jpg"), 42.5)
            .await
            .unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_encoder_reports_progress_and_exit_status() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = |name: &str, body: &str| {
            let path = dir.path().join(name);
            std::fs::write(&path, format!("#!/bin/sh\n{}", body)).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path.to_string_lossy().to_string()
        };
        let ok = script(
            "ok.sh",
            "echo out_time_us=25000000\necho progress=continue\n\
             echo out_time_us=50000000\necho out_time_us=50000000\necho progress=end\n\
             echo out_time_us=80000000\nexit 0\n",
        );
        let bad = script("bad.sh", "echo 'Unknown encoder' >&2\nexit 1\n");

        let events: Vec<_> = FfmpegEncoder::new(ok, 6)
            .run_encode(request(StreamMap::Single, VideoCodec::Copy))
            .collect()
            .await;
        assert_eq!(
            events,
            vec![
                EncodeEvent::Progress(25),
                EncodeEvent::Progress(50),
                EncodeEvent::Done
            ]
        );

        let events: Vec<_> = FfmpegEncoder::new(bad, 6)
            .run_encode(request(StreamMap::Single, VideoCodec::Copy))
            .collect()
            .await;
        match events.as_slice() {
            [EncodeEvent::Failed(reason)] => assert!(reason.contains("Unknown encoder")),
            other => panic!("unexpected events {:?}", other),
        }

        let events: Vec<_> = FfmpegEncoder::new("/nonexistent/ffmpeg", 6)
            .run_encode(request(StreamMap::Single, VideoCodec::Copy))
            .collect()
            .await;
        assert!(matches!(events.as_slice(), [EncodeEvent::Failed(_)]));
    }
}
