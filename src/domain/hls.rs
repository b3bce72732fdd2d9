use std::path::Path;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

#[derive(Debug, Clone, PartialEq)]
pub struct MediaSegment {
    pub duration: f64,
    pub uri: String,
    /// Emit `#EXT-X-DISCONTINUITY` before this segment
    pub discontinuity: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MediaPlaylist {
    pub version: u8,
    pub target_duration: u64,
    pub media_sequence: u64,
    pub segments: Vec<MediaSegment>,
    pub end_list: bool,
    pub playlist_type: Option<String>,
}

impl MediaPlaylist {
    pub fn new(target_duration: u64) -> Self {
        Self {
            version: 3,
            target_duration,
            media_sequence: 0,
            segments: Vec::new(),
            end_list: true,
            playlist_type: None,
        }
    }

    pub fn vod() -> Self {
        let mut playlist = Self::new(0);
        playlist.playlist_type = Some("VOD".to_string());
        playlist
    }

    pub fn add_segment(&mut self, duration: f64, uri: String) {
        self.segments.push(MediaSegment {
            duration,
            uri,
            discontinuity: false,
        });
    }

    /// Append a segment that starts a new timestamp domain.
    pub fn add_discontinuity_segment(&mut self, duration: f64, uri: String) {
        self.segments.push(MediaSegment {
            duration,
            uri,
            discontinuity: true,
        });
    }

    /// Smallest integer target duration covering every segment.
    pub fn fit_target_duration(&mut self) {
        let max = self
            .segments
            .iter()
            .map(|s| s.duration)
            .fold(0.0_f64, f64::max);
        self.target_duration = max.ceil() as u64;
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str("#EXTM3U\n");
        out.push_str(&format!("#EXT-X-VERSION:{}\n", self.version));
        out.push_str(&format!("#EXT-X-TARGETDURATION:{}\n", self.target_duration));
        out.push_str(&format!("#EXT-X-MEDIA-SEQUENCE:{}\n", self.media_sequence));

        if let Some(pt) = &self.playlist_type {
            out.push_str(&format!("#EXT-X-PLAYLIST-TYPE:{}\n", pt));
        }

        for segment in &self.segments {
            if segment.discontinuity {
                out.push_str("#EXT-X-DISCONTINUITY\n");
            }
            // Using {:.6} for reasonable precision on float duration
            out.push_str(&format!("#EXTINF:{:.6},\n", segment.duration));
            out.push_str(&segment.uri);
            out.push('\n');
        }

        if self.end_list {
            out.push_str("#EXT-X-ENDLIST\n");
        }
        out
    }

    pub async fn write_to(&self, path: &Path) -> Result<(), std::io::Error> {
        let mut file = File::create(path).await?;
        file.write_all(self.render().as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    /// Parse the segment list of a media playlist.
    ///
    /// Only `#EXTINF` durations and the URI line following each are kept;
    /// header tags are regenerated on render.
    pub fn parse(content: &str) -> Self {
        let mut playlist = Self::vod();
        let mut pending: Option<f64> = None;
        let mut discontinuity = false;

        for line in content.lines().map(str::trim).filter(|l| !l.is_empty()) {
            if let Some(rest) = line.strip_prefix("#EXTINF:") {
                let duration = rest.split(',').next().unwrap_or("");
                pending = duration.trim().parse::<f64>().ok();
            } else if line == "#EXT-X-DISCONTINUITY" {
                discontinuity = true;
            } else if let Some(rest) = line.strip_prefix("#EXT-X-TARGETDURATION:") {
                playlist.target_duration = rest.trim().parse().unwrap_or(0);
            } else if line.starts_with('#') {
                continue;
            } else if let Some(duration) = pending.take() {
                playlist.segments.push(MediaSegment {
                    duration,
                    uri: line.to_string(),
                    discontinuity,
                });
                discontinuity = false;
            }
        }
        playlist
    }
}
