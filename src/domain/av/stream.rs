use serde_json::Value;

/// Build a typed stream descriptor from one entry of ffprobe's `streams` array.
pub trait FromStream {
    fn from_stream(stream_data: &Value) -> Option<Box<Self>>
    where
        Self: Sized;
}

/// Parsed `ffprobe -show_format -show_streams -print_format json` output.
#[derive(Debug, Clone, Default)]
pub struct ProbeOutput {
    pub streams: Vec<Value>,
    pub duration: Option<f64>,
}

/// Parse raw ffprobe JSON. Returns `None` when the document is not valid JSON
/// or has no `streams` array.
pub fn parse_probe_json(raw: &[u8]) -> Option<ProbeOutput> {
    let v: Value = serde_json::from_slice(raw).ok()?;
    let streams = v.get("streams")?.as_array()?.clone();

    // ffprobe prints the duration as a string
    let duration = v
        .get("format")
        .and_then(|format| format.get("duration"))
        .and_then(|duration| match duration {
            Value::String(s) => s.parse::<f64>().ok(),
            other => other.as_f64(),
        })
        .filter(|d| d.is_finite() && *d > 0.0);

    Some(ProbeOutput { streams, duration })
}
