#![forbid(unsafe_code)]
#![deny(unreachable_pub)]

//! Supervisor and worker runtime for the `fishnet` client: HTTP transport, the
//! lossy progress reporter, the per-engine worker loop, and the process-wide
//! supervisor that sizes the pool and ties them together.

pub mod api;
pub use fishnet_uci as uci;

mod backend;
mod backoff;
mod engine;
mod executor;
mod progress;
mod update;
mod worker;

pub use api::{
    EngineEvent, EngineHandle, JobSummary, StatusSnapshot, SupervisorConfig, SupervisorOutcome,
    WorkerSnapshot, WorkerStage, start_engine,
};
pub use backend::{BackendError, StockfishInfo, Transport};
