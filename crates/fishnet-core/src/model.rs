//! Domain types shared between the engine dialogue, the job executor, and transport.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Per-side clock state attached to a `move` job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Clock {
    pub wtime_cs: u64,
    pub btime_cs: u64,
    pub inc_s: u64,
}

/// The work-type-specific half of a [`Job`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobKind {
    /// Reverse-ply analysis of every position in `moves`.
    Analysis {
        /// Node budget per ply; defaults to 3_500_000 when absent.
        nodes: Option<u64>,
        /// Ply indices that must be recorded as `{skipped: true}` rather than searched.
        skip_positions: HashSet<usize>,
    },
    /// A single best-move search at a given skill level.
    Move {
        /// Skill knob, 1..=8.
        level: u8,
        /// Remaining clock, if the request carries one.
        clock: Option<Clock>,
    },
}

/// One unit of remote work, as leased from `acquire`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    /// Opaque job id, used to build the `analysis/<id>` / `move/<id>` / `abort/<id>` paths.
    pub id: String,
    pub kind: JobKind,
    /// Variant name, e.g. `standard`, `threecheck`, `crazyhouse`.
    pub variant: String,
    pub chess960: bool,
    /// Starting position, as a FEN string.
    pub position: String,
    /// Moves played from `position`, in UCI move-token form.
    pub moves: Vec<String>,
    pub nnue: bool,
    /// Human-readable label for logging only.
    pub game_id: Option<String>,
}

impl Job {
    /// Number of plies played from the starting position.
    pub fn ply_count(&self) -> usize {
        self.moves.len()
    }
}

/// The sign/kind of a [`Score`]: centipawns, or distance to mate in plies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoreValue {
    Cp(i64),
    Mate(i64),
}

/// Engine evaluation of a position: a centipawn or mate score, possibly a bound rather
/// than an exact value (as reported by aspiration-window fail-high/fail-low `info` lines).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Score {
    #[serde(flatten)]
    pub value: ScoreValue,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub lowerbound: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub upperbound: bool,
}

impl Score {
    pub fn cp(v: i64) -> Self {
        Self { value: ScoreValue::Cp(v), lowerbound: false, upperbound: false }
    }

    pub fn mate(v: i64) -> Self {
        Self { value: ScoreValue::Mate(v), lowerbound: false, upperbound: false }
    }

    /// True if this score carries no `lowerbound`/`upperbound` flag.
    pub fn is_exact(&self) -> bool {
        !self.lowerbound && !self.upperbound
    }

    pub fn is_mate(&self) -> bool {
        matches!(self.value, ScoreValue::Mate(_))
    }

    pub fn mate_value(&self) -> Option<i64> {
        match self.value {
            ScoreValue::Mate(v) => Some(v),
            ScoreValue::Cp(_) => None,
        }
    }

    pub fn cp_value(&self) -> Option<i64> {
        match self.value {
            ScoreValue::Cp(v) => Some(v),
            ScoreValue::Mate(_) => None,
        }
    }
}

/// Latest snapshot of engine telemetry for one search.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SearchInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub depth: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seldepth: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nodes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nps: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tbhits: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hashfull: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpuload: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub multipv: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<Score>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pv: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub string: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currmove: Option<String>,
    /// Move token, or `None`; the literal `(none)` is always normalized away.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bestmove: Option<String>,
}

/// One slot of an `AnalysisResult` array: either skipped, or a completed search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnalysisEntry {
    Skipped { skipped: bool },
    Info(Box<SearchInfo>),
}

impl AnalysisEntry {
    pub fn skipped() -> Self {
        Self::Skipped { skipped: true }
    }

    pub fn info(info: SearchInfo) -> Self {
        Self::Info(Box::new(info))
    }
}

/// `{bestmove, fen}`, the outcome of a `move` job after applying the chosen move.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MoveResult {
    pub bestmove: Option<String>,
    pub fen: String,
}
