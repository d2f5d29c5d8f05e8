//! Public API types for the `fishnet-engine` supervisor.

use fishnet_core::{ClientIdentity, FishnetConfig};
use serde::{Deserialize, Serialize};

/// Worker pool + client configuration the supervisor is built from.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub identity: ClientIdentity,
    pub config: FishnetConfig,
    /// Threads given to each engine process; the pool size is derived from
    /// `cores / threads_per_process`.
    pub threads_per_process: u32,
    /// Extra `setoption` key/value pairs applied to every engine after the handshake.
    pub extra_options: Vec<(String, String)>,
    /// How often the supervisor emits a cumulative stats tick.
    pub stats_interval: std::time::Duration,
    /// If a newer release is found on the package index, raise `update-required`
    /// instead of just warning about it.
    pub auto_update: bool,
}

/// Current activity of one worker.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum WorkerStage {
    Idle,
    Handshaking,
    Acquiring,
    Searching,
    Submitting,
}

/// Minimal, loggable summary of the job a worker is carrying.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobSummary {
    pub id: String,
    pub kind: &'static str,
    pub variant: String,
    pub game_id: Option<String>,
}

/// Snapshot of a single worker's current state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkerSnapshot {
    pub worker_idx: usize,
    pub stage: WorkerStage,
    pub job: Option<JobSummary>,
    pub threads: u32,
    pub hash_mb: u64,
}

/// Current supervisor state snapshot, pull-based via [`EngineHandle::snapshot`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusSnapshot {
    pub stop_requested: bool,
    pub workers: Vec<WorkerSnapshot>,
    pub positions_done: u64,
    pub nodes_done: u64,
}

/// Broadcast event stream, consumed by the binary's display loop.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum EngineEvent {
    Started,
    StopRequested,
    WorkerStage { worker_idx: usize, stage: WorkerStage },
    WorkerJobStarted { worker_idx: usize, job: JobSummary },
    WorkerJobFinished { worker_idx: usize, job_id: String, error: Option<String> },
    /// `at` is a Unix timestamp (seconds), so a display loop can log wall-clock time
    /// alongside the cumulative counters without calling `Utc::now()` itself.
    StatsTick { positions_done: u64, nodes_done: u64, at: i64 },
    Warning { message: String },
    Error { message: String },
    UpdateRequired { message: String },
    Stopped,
}

/// Why the supervisor stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorOutcome {
    Normal,
    UpdateRequired,
}

/// Handle to a running supervisor instance.
pub struct EngineHandle {
    pub(crate) inner: std::sync::Arc<crate::engine::EngineInner>,
    pub(crate) join: tokio::task::JoinHandle<anyhow::Result<SupervisorOutcome>>,
}

/// Start a new supervisor instance.
pub fn start_engine(config: SupervisorConfig) -> EngineHandle {
    crate::engine::start_engine(config)
}

impl EngineHandle {
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<EngineEvent> {
        self.inner.event_tx.subscribe()
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        self.inner.snapshot_rx.borrow().clone()
    }

    /// Let running jobs finish, then stop; no new work is acquired.
    pub fn request_stop_soon(&self) {
        self.inner.request_stop(false);
    }

    /// Kill engines and abort in-flight jobs immediately.
    pub fn request_stop_now(&self) {
        self.inner.request_stop(true);
    }

    pub async fn wait(self) -> anyhow::Result<SupervisorOutcome> {
        match self.join.await {
            Ok(res) => res,
            Err(err) => Err(anyhow::anyhow!("supervisor task join error: {err}")),
        }
    }
}
