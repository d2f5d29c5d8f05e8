#![deny(unreachable_pub)]

//! Drives a UCI chess engine subprocess: spawns it, carries out the handshake, and turns
//! its line-oriented protocol into typed commands and search telemetry.

pub mod channel;
pub mod dialogue;
pub mod parser;
pub mod wire_log;

pub use channel::{ChannelError, EngineChannel};
pub use dialogue::{DialogueError, EngineDialogue, GoLimits};
pub use parser::{apply_info_line, parse_bestmove_line};
pub use wire_log::set_engine_log_level;
