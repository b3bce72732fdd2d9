//! Reelhouse server binary.
//!
//! Wires the local adapters (ffmpeg, ffprobe, filesystem, lock marker) into
//! the pipeline and serves the HTTP API.

use reelhouse::adapters::local::http::router;
use reelhouse::adapters::local::{
    FfmpegEncoder, FfmpegPoster, FfmpegSegmenter, FfprobeProber, FsStatusStore, LockManager,
    MovieLibrary,
};
use reelhouse::config::Config;
use reelhouse::ports::clock::SystemClock;
use reelhouse::{Pipeline, Toolchain};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let config = Config::from_env();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = tokio::fs::create_dir_all(&config.movies_dir).await {
        tracing::error!(dir = ?config.movies_dir, error = %e, "cannot create movies directory");
        std::process::exit(1);
    }

    // 1. Adapters
    let clock = Arc::new(SystemClock);
    let lock = Arc::new(LockManager::new(
        &config.lock_path,
        config.stale_lock_after,
        clock.clone(),
    ));
    match lock.inspect().await {
        Ok(Some(info)) => tracing::warn!(
            holder = %info.holder,
            started_at = %info.started_at,
            "lock marker left by a previous run, it will be reclaimed once stale"
        ),
        Ok(None) => {}
        Err(e) => tracing::warn!(error = %e, "could not inspect lock marker"),
    }

    let tools = Toolchain {
        prober: Arc::new(FfprobeProber::new(&config.ffprobe_bin)),
        encoder: Arc::new(FfmpegEncoder::new(&config.ffmpeg_bin, config.hls_time)),
        segmenter: Arc::new(FfmpegSegmenter::new(&config.ffmpeg_bin)),
        poster: Arc::new(FfmpegPoster::new(&config.ffmpeg_bin)),
    };

    // 2. Application
    let pipeline = Pipeline::new(
        lock,
        MovieLibrary::new(&config.movies_dir),
        Arc::new(FsStatusStore::new(&config.movies_dir)),
        tools,
        clock,
        config.selector_settings(),
    );

    // 3. HTTP
    let app = router(pipeline);
    let listener = match tokio::net::TcpListener::bind(config.bind_addr()).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(addr = %config.bind_addr(), error = %e, "failed to bind TCP listener");
            std::process::exit(1);
        }
    };
    tracing::info!(addr = %config.bind_addr(), movies = ?config.movies_dir, "listening");
    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!(error = %e, "server error");
        std::process::exit(1);
    }
}
