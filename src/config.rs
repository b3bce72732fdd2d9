//! Configuration loaded from the environment.

use crate::adapters::local::lock::DEFAULT_STALE_AFTER_SECS;
use crate::application::SelectorSettings;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Configuration for a single-host deployment.
#[derive(Clone, Debug)]
pub struct Config {
    /// HTTP server bind address
    pub addr: String,
    /// HTTP server port
    pub port: String,
    /// Root of the per-movie working directories
    pub movies_dir: PathBuf,
    /// Marker file of the transcode lock
    pub lock_path: PathBuf,
    /// Age after which a lock marker is considered abandoned
    pub stale_lock_after: chrono::Duration,
    /// Length of each piece on the chunked path, in seconds
    pub chunk_seconds: u32,
    /// Target HLS segment duration, in seconds
    pub hls_time: u32,
    /// Pause between chunk encodes
    pub chunk_cooldown: Duration,
    pub ffmpeg_bin: String,
    pub ffprobe_bin: String,
}

impl Config {
    /// Load configuration from environment variables. Unset or unparsable
    /// values fall back to defaults.
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let movies_dir =
            PathBuf::from(lookup("MOVIES_DIR").unwrap_or_else(|| String::from("./movies")));
        let lock_path = lookup("LOCK_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| movies_dir.join(".transcode.lock"));

        Self {
            addr: lookup("ADDR").unwrap_or_else(|| String::from("127.0.0.1")),
            port: lookup("PORT").unwrap_or_else(|| String::from("3000")),
            lock_path,
            movies_dir,
            stale_lock_after: chrono::Duration::seconds(parsed(
                &lookup,
                "STALE_LOCK_SECS",
                DEFAULT_STALE_AFTER_SECS,
            )),
            chunk_seconds: parsed(&lookup, "CHUNK_SECONDS", 300),
            hls_time: parsed(&lookup, "HLS_TIME", 6),
            chunk_cooldown: Duration::from_millis(parsed(&lookup, "CHUNK_COOLDOWN_MS", 2000)),
            ffmpeg_bin: lookup("FFMPEG_BIN").unwrap_or_else(|| String::from("ffmpeg")),
            ffprobe_bin: lookup("FFPROBE_BIN").unwrap_or_else(|| String::from("ffprobe")),
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.addr, self.port)
    }

    pub fn selector_settings(&self) -> SelectorSettings {
        SelectorSettings {
            chunk_seconds: self.chunk_seconds,
            chunk_cooldown: self.chunk_cooldown,
        }
    }
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    match lookup(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, "ignoring unparsable setting");
            default
        }),
        None => default,
    }
}
