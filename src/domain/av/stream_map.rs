use super::audio_stream::AudioStreamDescriptor;
use std::collections::HashSet;

/// One output rendition: the first video track paired with one audio track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variant {
    pub audio_index: usize,
    pub name: String,
}

/// How input streams are laid out in the HLS output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamMap {
    /// First video plus the first audio track when there is one
    Single,
    /// One rendition per audio track, joined by a master playlist
    Variants(Vec<Variant>),
}

impl StreamMap {
    /// Zero or one audio track maps to `Single`; probing failures land here too.
    pub fn for_audio(tracks: &[AudioStreamDescriptor]) -> Self {
        if tracks.len() < 2 {
            return StreamMap::Single;
        }

        let mut seen = HashSet::new();
        let variants = tracks
            .iter()
            .map(|track| {
                let mut name: String = track
                    .language
                    .chars()
                    .filter(|c| c.is_ascii_alphanumeric())
                    .collect();
                if name.is_empty() {
                    name = format!("audio{}", track.index);
                }
                if !seen.insert(name.clone()) {
                    name = format!("{}{}", name, track.index);
                    seen.insert(name.clone());
                }
                Variant {
                    audio_index: track.index,
                    name,
                }
            })
            .collect();
        StreamMap::Variants(variants)
    }

    pub fn is_multi_variant(&self) -> bool {
        matches!(self, StreamMap::Variants(_))
    }

    /// `-map` arguments selecting the input streams.
    pub fn map_args(&self) -> Vec<String> {
        match self {
            StreamMap::Single => vec![
                "-map".into(),
                "0:v:0".into(),
                "-map".into(),
                "0:a:0?".into(),
            ],
            StreamMap::Variants(variants) => variants
                .iter()
                .flat_map(|v| {
                    [
                        "-map".to_string(),
                        "0:v:0".to_string(),
                        "-map".to_string(),
                        format!("0:a:{}", v.audio_index),
                    ]
                })
                .collect(),
        }
    }

    /// Value for ffmpeg's `-var_stream_map`, indexed by output stream order.
    pub fn var_stream_map(&self) -> Option<String> {
        match self {
            StreamMap::Single => None,
            StreamMap::Variants(variants) => Some(
                variants
                    .iter()
                    .enumerate()
                    .map(|(i, v)| format!("v:{i},a:{i},name:{}", v.name))
                    .collect::<Vec<_>>()
                    .join(" "),
            ),
        }
    }
}
