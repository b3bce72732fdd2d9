//! Reelhouse - single-host movie transcoding pipeline
//!
//! Hexagonal Architecture:
//! - domain/: Pure logic (slugs, jobs, strategy ladder, hls, stitching, av helpers)
//! - ports/: Trait definitions (encoder, segmenter, prober, poster, status, clock)
//! - adapters/: Concrete implementations (ffmpeg, ffprobe, filesystem, lock, HTTP)
//! - application/: Strategy selector, ingest pipeline, status query
//! - config: Environment configuration

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;

// Re-exports for convenience
pub use application::{Admission, Pipeline, Toolchain, UploadRequest};
pub use config::Config;
pub use domain::{av, hls};
