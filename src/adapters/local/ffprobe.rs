use super::cmd::{stderr_tail, CommandRunner, SystemRunner};
use crate::domain::av::audio_stream::audio_descriptors;
use crate::domain::av::stream::parse_probe_json;
use crate::domain::av::MediaProbe;
use crate::ports::prober::Prober;
use async_trait::async_trait;
use std::path::Path;

pub struct FfprobeProber<R = SystemRunner> {
    bin: String,
    runner: R,
}

impl FfprobeProber<SystemRunner> {
    pub fn new(bin: impl Into<String>) -> Self {
        Self::with_runner(bin, SystemRunner)
    }
}

impl<R: CommandRunner> FfprobeProber<R> {
    pub fn with_runner(bin: impl Into<String>, runner: R) -> Self {
        Self {
            bin: bin.into(),
            runner,
        }
    }

    fn args(input: &Path) -> Vec<String> {
        vec![
            "-v".into(),
            "error".into(),
            "-show_format".into(),
            "-show_streams".into(),
            "-print_format".into(),
            "json".into(),
            input.to_string_lossy().to_string(),
        ]
    }
}

#[async_trait]
impl<R: CommandRunner> Prober for FfprobeProber<R> {
    async fn probe(&self, input: &Path) -> MediaProbe {
        let output = match self.runner.output(&self.bin, &Self::args(input)).await {
            Ok(output) => output,
            Err(e) => {
                tracing::warn!(?input, error = %e, "could not run ffprobe");
                return MediaProbe::default();
            }
        };

        if !output.status.success() {
            tracing::warn!(
                ?input,
                status = %output.status,
                stderr = %stderr_tail(&output.stderr, 3),
                "ffprobe failed"
            );
            return MediaProbe::default();
        }

        match parse_probe_json(&output.stdout) {
            Some(parsed) => MediaProbe {
                audio_streams: audio_descriptors(&parsed.streams),
                duration: parsed.duration,
            },
            None => {
                tracing::warn!(?input, "ffprobe output was not understood");
                MediaProbe::default()
            }
        }
    }
}
