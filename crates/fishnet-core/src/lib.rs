#![forbid(unsafe_code)]
#![deny(unreachable_pub)]

//! Shared domain types and leaf utilities for the `fishnet` client.

pub mod config;
pub mod cpu;
pub mod identity;
pub mod level;
pub mod model;
pub mod nnue;
pub mod position;
pub mod variant;

pub use config::{ConfigError, ConfigOverrides, FishnetConfig};
pub use cpu::{detect_cpu, CpuInfo};
pub use identity::ClientIdentity;
pub use level::{depth_cap, movetime_ms, skill, LVL_DEPTHS, LVL_MOVETIMES, LVL_SKILL};
pub use model::{AnalysisEntry, Clock, Job, JobKind, MoveResult, Score, ScoreValue, SearchInfo};
pub use position::fen_after;
pub use variant::{modded_variant, uci_variant_name};
