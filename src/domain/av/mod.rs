//! Audio/Video helpers: ffprobe parsing, stream layout and ffmpeg progress.

pub mod audio_stream;
pub mod progress;
pub mod stream;
pub mod stream_map;

pub use audio_stream::AudioStreamDescriptor;
pub use stream_map::StreamMap;

/// What the pipeline knows about an input after probing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MediaProbe {
    pub audio_streams: Vec<AudioStreamDescriptor>,
    pub duration: Option<f64>,
}
