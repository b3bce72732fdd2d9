//! Encoder fallback ladder.
//!
//! Turbo stream-copies the whole input in one pass. When that fails the job
//! drops to SemiTurbo (chunked, video still copied) and then to Safe (chunked,
//! video re-encoded). Safe is the last rung: any failure there is terminal.
//!
//! ```text
//! Turbo ──ok──────────────────────────────▶ Ready
//!   │ fail
//!   ▼
//! SemiTurbo ──ok──────────────────────────▶ Ready
//!   │ segmentation, chunk or stitch failed
//!   ▼
//! Safe ──ok───────────────────────────────▶ Ready
//!   │ any failure
//!   ▼
//! Error
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Encoding strategy, also published as the status record's `mode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Mode {
    Turbo,
    SemiTurbo,
    Safe,
}

impl Mode {
    /// Whether this mode goes through segmentation and per-chunk encodes.
    pub fn is_chunked(self) -> bool {
        !matches!(self, Mode::Turbo)
    }

    /// Whether the video track is stream-copied rather than re-encoded.
    pub fn copies_video(self) -> bool {
        !matches!(self, Mode::Safe)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Turbo => write!(f, "turbo"),
            Mode::SemiTurbo => write!(f, "semi-turbo"),
            Mode::Safe => write!(f, "safe"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Encoding(Mode),
    Ready,
    Error,
}

impl State {
    pub fn is_terminal(self) -> bool {
        matches!(self, State::Ready | State::Error)
    }
}

/// Result of running one attempt in the current mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Succeeded,
    /// Whole-input encode failed (Turbo only)
    EncodeFailed(String),
    /// Lossless chunking of the input failed
    SegmentationFailed(String),
    /// A per-chunk encode failed
    ChunkFailed { index: usize, reason: String },
    /// Chunk playlists could not be merged
    StitchFailed(String),
}

impl Outcome {
    pub fn reason(&self) -> Option<&str> {
        match self {
            Outcome::Succeeded => None,
            Outcome::EncodeFailed(reason)
            | Outcome::SegmentationFailed(reason)
            | Outcome::StitchFailed(reason) => Some(reason),
            Outcome::ChunkFailed { reason, .. } => Some(reason),
        }
    }
}

/// The explicit transition function of the ladder.
pub fn transition(state: State, outcome: &Outcome) -> State {
    match (state, outcome) {
        (State::Encoding(_), Outcome::Succeeded) => State::Ready,
        (State::Encoding(Mode::Turbo), _) => State::Encoding(Mode::SemiTurbo),
        (State::Encoding(Mode::SemiTurbo), _) => State::Encoding(Mode::Safe),
        (State::Encoding(Mode::Safe), _) => State::Error,
        (terminal, _) => terminal,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub from: State,
    pub to: State,
    pub outcome: Outcome,
    pub at: DateTime<Utc>,
}

/// Ladder state plus an audit log of every transition taken.
#[derive(Debug, Clone)]
pub struct StrategyMachine {
    state: State,
    history: Vec<Transition>,
}

impl Default for StrategyMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StrategyMachine {
    pub fn new() -> Self {
        Self {
            state: State::Encoding(Mode::Turbo),
            history: Vec::new(),
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Mode currently being attempted, or the last one attempted once terminal.
    pub fn mode(&self) -> Mode {
        match self.state {
            State::Encoding(mode) => mode,
            _ => self
                .history
                .iter()
                .rev()
                .find_map(|t| match t.from {
                    State::Encoding(mode) => Some(mode),
                    _ => None,
                })
                .unwrap_or(Mode::Turbo),
        }
    }

    pub fn apply(&mut self, outcome: Outcome) -> State {
        let next = transition(self.state, &outcome);
        if next != self.state {
            self.history.push(Transition {
                from: self.state,
                to: next,
                outcome,
                at: Utc::now(),
            });
            self.state = next;
        }
        next
    }

    pub fn history(&self) -> &[Transition] {
        &self.history
    }

    pub fn into_history(self) -> Vec<Transition> {
        self.history
    }

    /// Every mode attempted, in order.
    pub fn modes_visited(&self) -> Vec<Mode> {
        modes_visited(&self.history)
    }
}

pub fn modes_visited(history: &[Transition]) -> Vec<Mode> {
    let mut modes = vec![Mode::Turbo];
    for t in history {
        if let State::Encoding(mode) = t.to {
            modes.push(mode);
        }
    }
    modes
}
