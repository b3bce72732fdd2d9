use super::stream::FromStream;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One audio track of the input, as seen by ffprobe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioStreamDescriptor {
    /// Position among the audio streams (the `N` in `0:a:N`)
    pub index: usize,
    /// Language tag, or a synthesized `audio<N>` when the container has none
    pub language: String,
}

/// Intermediate parse of a single ffprobe stream entry.
#[derive(Debug)]
pub(crate) struct AudioStream {
    language: Option<String>,
}

impl FromStream for AudioStream {
    fn from_stream(stream_data: &Value) -> Option<Box<AudioStream>> {
        match stream_data.get("codec_type").and_then(|v| v.as_str()) {
            Some("audio") => {
                let language = stream_data
                    .get("tags")
                    .and_then(|tags| tags.get("language"))
                    .and_then(|lang| lang.as_str())
                    .map(|lang| lang.trim().to_lowercase())
                    .filter(|lang| !lang.is_empty() && lang != "und");
                Some(Box::new(AudioStream { language }))
            }
            _ => None,
        }
    }
}

/// Collect the audio descriptors of a probed file, in stream order.
pub fn audio_descriptors(streams: &[Value]) -> Vec<AudioStreamDescriptor> {
    streams
        .iter()
        .filter_map(|stream| AudioStream::from_stream(stream))
        .enumerate()
        .map(|(index, stream)| AudioStreamDescriptor {
            index,
            language: stream
                .language
                .unwrap_or_else(|| format!("audio{}", index)),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_stream_valid_audio() {
        let stream_data = json!({
            "codec_type": "audio",
            "codec_name": "aac",
            "tags": {"language": "ENG"}
        });
        let stream = AudioStream::from_stream(&stream_data).unwrap();
        assert_eq!(stream.language.as_deref(), Some("eng"));
    }

    #[test]
    fn test_from_stream_non_audio_codec_type() {
        let stream_data = json!({"codec_type": "video", "codec_name": "h264"});
        assert!(AudioStream::from_stream(&stream_data).is_none());
    }

    #[test]
    fn test_from_stream_missing_codec_type() {
        let stream_data = json!({"codec_name": "aac"});
        assert!(AudioStream::from_stream(&stream_data).is_none());
    }

    #[test]
    fn test_descriptors_index_audio_only_and_synthesize_language() {
        let streams = vec![
            json!({"codec_type": "video"}),
            json!({"codec_type": "audio", "tags": {"language": "eng"}}),
            json!({"codec_type": "subtitle", "tags": {"language": "eng"}}),
            json!({"codec_type": "audio", "tags": {"language": "und"}}),
            json!({"codec_type": "audio"}),
        ];
        let descriptors = audio_descriptors(&streams);
        assert_eq!(
            descriptors,
            vec![
                AudioStreamDescriptor { index: 0, language: "eng".into() },
                AudioStreamDescriptor { index: 1, language: "audio1".into() },
                AudioStreamDescriptor { index: 2, language: "audio2".into() },
            ]
        );
    }
}
