//! Merge independently encoded chunk playlists into one VOD playlist.

use super::hls::MediaPlaylist;
use std::path::{Path, PathBuf};
use tokio::fs;

#[derive(Debug, thiserror::Error)]
pub enum StitchError {
    #[error("no chunk manifests to stitch")]
    Empty,
    #[error("chunk manifest {path:?} lists no segments")]
    EmptyChunk { path: PathBuf },
    #[error("manifest io on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Build the final playlist from chunk playlists given in chunk order.
///
/// Every chunk after the first starts with a discontinuity, since each chunk
/// was encoded on its own and its timestamps restart at zero.
pub fn stitch_playlists(chunks: &[MediaPlaylist], output_dir: &Path) -> MediaPlaylist {
    let mut stitched = MediaPlaylist::vod();
    for (chunk_index, chunk) in chunks.iter().enumerate() {
        for (segment_index, segment) in chunk.segments.iter().enumerate() {
            let uri = sanitize_uri(&segment.uri, output_dir);
            if chunk_index > 0 && segment_index == 0 {
                stitched.add_discontinuity_segment(segment.duration, uri);
            } else {
                stitched.add_segment(segment.duration, uri);
            }
        }
    }
    stitched.fit_target_duration();
    stitched
}

/// Read the chunk manifests, write the stitched playlist to `final_path` and
/// delete the chunk manifests that were absorbed.
pub async fn stitch(
    chunk_manifests: &[PathBuf],
    final_path: &Path,
) -> Result<MediaPlaylist, StitchError> {
    if chunk_manifests.is_empty() {
        return Err(StitchError::Empty);
    }
    let output_dir = final_path.parent().unwrap_or_else(|| Path::new("."));

    let mut chunks = Vec::with_capacity(chunk_manifests.len());
    for path in chunk_manifests {
        let content = fs::read_to_string(path).await.map_err(|source| StitchError::Io {
            path: path.clone(),
            source,
        })?;
        let playlist = MediaPlaylist::parse(&content);
        if playlist.segments.is_empty() {
            return Err(StitchError::EmptyChunk { path: path.clone() });
        }
        chunks.push(playlist);
    }

    let stitched = stitch_playlists(&chunks, output_dir);
    stitched
        .write_to(final_path)
        .await
        .map_err(|source| StitchError::Io {
            path: final_path.to_path_buf(),
            source,
        })?;

    for path in chunk_manifests {
        if let Err(e) = fs::remove_file(path).await {
            tracing::warn!(?path, error = %e, "could not remove absorbed chunk manifest");
        }
    }

    Ok(stitched)
}

/// Rewrite an absolute filesystem path in a segment reference so it is
/// relative to the output directory. Relative references and URLs pass through.
pub fn sanitize_uri(uri: &str, output_dir: &Path) -> String {
    if !is_absolute_path(uri) {
        return uri.to_string();
    }
    if let Ok(relative) = Path::new(uri).strip_prefix(output_dir) {
        let relative = relative.to_string_lossy().replace('\\', "/");
        if !relative.is_empty() {
            return relative;
        }
    }
    uri.rsplit(&['/', '\\'][..]).next().unwrap_or(uri).to_string()
}

fn is_absolute_path(uri: &str) -> bool {
    if uri.starts_with('/') || uri.starts_with('\\') {
        return true;
    }
    let bytes = uri.as_bytes();
    bytes.len() > 2
        && bytes[0].is_ascii_alphabetic()
        && bytes[1] == b':'
        && (bytes[2] == b'\\' || bytes[2] == b'/')
}
