//! Parsing of ffmpeg's `-progress` key=value stream.

/// One meaningful line of ffmpeg progress output.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressLine {
    /// Output position in seconds
    OutTime(f64),
    /// `progress=continue` or `progress=end`
    Block { end: bool },
}

pub fn parse_progress_line(line: &str) -> Option<ProgressLine> {
    let (key, value) = line.trim().split_once('=')?;
    let value = value.trim();
    match key.trim() {
        // Both keys carry microseconds; out_time_ms is misnamed upstream.
        "out_time_us" | "out_time_ms" => value
            .parse::<i64>()
            .ok()
            .filter(|us| *us >= 0)
            .map(|us| ProgressLine::OutTime(us as f64 / 1_000_000.0)),
        "progress" => Some(ProgressLine::Block {
            end: value == "end",
        }),
        _ => None,
    }
}

/// Whole-percent completion, clamped to `0..=99` until the encoder exits.
pub fn percent(out_time: f64, duration: Option<f64>) -> Option<u8> {
    let duration = duration.filter(|d| *d > 0.0)?;
    let pct = (out_time / duration * 100.0).floor();
    Some(pct.clamp(0.0, 99.0) as u8)
}
