//! Local adapters: filesystem, child processes and HTTP.

pub mod cmd;
pub mod ffmpeg;
pub mod ffprobe;
pub mod fs;
pub mod http;
pub mod lock;

pub use ffmpeg::{FfmpegEncoder, FfmpegPoster, FfmpegSegmenter};
pub use ffprobe::FfprobeProber;
pub use fs::{FsStatusStore, MovieLibrary};
pub use lock::LockManager;
