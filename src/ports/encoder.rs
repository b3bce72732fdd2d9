use crate::domain::av::StreamMap;
use futures::stream::BoxStream;
use std::path::PathBuf;

/// Video handling for one encode step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoCodec {
    /// Repackage the existing bitstream
    Copy,
    /// Re-encode to H.264
    H264,
}

/// Everything an encoder needs to turn one input into an HLS playlist.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodeRequest {
    pub input: PathBuf,
    pub output_dir: PathBuf,
    /// Media playlist name, or the master playlist name for multi-variant maps
    pub playlist_name: String,
    /// Segment file pattern (`%03d` style) for single-variant output
    pub segment_pattern: String,
    pub video: VideoCodec,
    pub stream_map: StreamMap,
    /// Input duration in seconds, used to turn positions into percentages
    pub duration: Option<f64>,
}

/// Events reported by a running encode.
#[derive(Debug, Clone, PartialEq)]
pub enum EncodeEvent {
    Progress(u8),
    Done,
    Failed(String),
}

/// Capability to run an external encode.
///
/// The returned stream ends after `Done` or `Failed`. A stream that ends
/// without either is treated as a failure by callers.
pub trait Encoder: Send + Sync {
    fn run_encode(&self, request: EncodeRequest) -> BoxStream<'static, EncodeEvent>;
}
