//! The supervisor: sizes the worker pool from the configured cores/memory budget,
//! starts a shared progress reporter and one worker per engine slot, and aggregates
//! their events into a broadcast stream and a pull-based status snapshot.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{Notify, broadcast, mpsc, watch};
use tokio::task::JoinSet;

use crate::api::{
    EngineEvent, EngineHandle, StatusSnapshot, SupervisorConfig, SupervisorOutcome,
    WorkerSnapshot, WorkerStage,
};
use crate::backend::Transport;
use crate::progress::ProgressReporter;
use crate::worker::{WorkerConfig, WorkerInternalEvent, run_worker};

pub(crate) struct EngineInner {
    pub(crate) event_tx: broadcast::Sender<EngineEvent>,
    pub(crate) snapshot_rx: watch::Receiver<StatusSnapshot>,
    stop_soon: AtomicBool,
    stop_now: AtomicBool,
    notify: Notify,
}

impl EngineInner {
    pub(crate) fn request_stop(&self, immediate: bool) {
        let already_requested = self.stop_soon.swap(true, Ordering::SeqCst);
        if immediate {
            self.stop_now.store(true, Ordering::SeqCst);
        }
        if !already_requested {
            let _ = self.event_tx.send(EngineEvent::StopRequested);
        }
        self.notify.notify_waiters();
    }

    pub(crate) fn should_stop_soon(&self) -> bool {
        self.stop_soon.load(Ordering::SeqCst)
    }

    pub(crate) fn should_stop_now(&self) -> bool {
        self.stop_now.load(Ordering::SeqCst)
    }

    pub(crate) async fn notified(&self) {
        self.notify.notified().await;
    }
}

/// Split `cores` into `pool` roughly equal buckets, each driving one engine process with
/// that many threads. Mirrors the supervisor's own thread/hash accounting: every worker
/// gets `ceil(cores/pool)` threads and an equal share of the memory budget.
fn pool_size(cores: usize, threads_per_process: u32) -> usize {
    let threads_per_process = threads_per_process.max(1) as usize;
    (cores / threads_per_process).max(1)
}

fn worker_threads(cores: usize, pool: usize) -> u32 {
    (cores.div_ceil(pool)) as u32
}

struct Supervisor {
    cfg: SupervisorConfig,
    inner: Arc<EngineInner>,
    event_tx: broadcast::Sender<EngineEvent>,
    snapshot_tx: watch::Sender<StatusSnapshot>,
    workers: Vec<WorkerSnapshot>,
    positions_done: u64,
    nodes_done: u64,
    worker_join: JoinSet<()>,
    internal_rx: mpsc::Receiver<WorkerInternalEvent>,
    progress: ProgressReporter,
    update_required: bool,
    update_client: reqwest::Client,
    update_tx: mpsc::Sender<WorkerInternalEvent>,
}

impl Supervisor {
    fn emit(&self, event: EngineEvent) {
        let _ = self.event_tx.send(event);
    }

    fn push_snapshot(&self) {
        let snapshot = StatusSnapshot {
            stop_requested: self.inner.should_stop_soon(),
            workers: self.workers.clone(),
            positions_done: self.positions_done,
            nodes_done: self.nodes_done,
        };
        let _ = self.snapshot_tx.send(snapshot);
    }

    fn handle_internal_event(&mut self, event: WorkerInternalEvent) {
        match event {
            WorkerInternalEvent::StageChanged { worker_idx, stage } => {
                if let Some(w) = self.workers.get_mut(worker_idx) {
                    w.stage = stage;
                }
                self.emit(EngineEvent::WorkerStage { worker_idx, stage });
            }
            WorkerInternalEvent::JobStarted { worker_idx, job } => {
                if let Some(w) = self.workers.get_mut(worker_idx) {
                    w.job = Some(job.clone());
                }
                self.emit(EngineEvent::WorkerJobStarted { worker_idx, job });
            }
            WorkerInternalEvent::JobFinished { worker_idx, job_id, error } => {
                if let Some(w) = self.workers.get_mut(worker_idx) {
                    w.job = None;
                }
                self.emit(EngineEvent::WorkerJobFinished { worker_idx, job_id, error });
            }
            WorkerInternalEvent::StatsDelta { positions, nodes } => {
                self.positions_done += positions;
                self.nodes_done += nodes;
            }
            WorkerInternalEvent::Warning { worker_idx, message } => {
                self.emit(EngineEvent::Warning { message: format!("worker {worker_idx}: {message}") });
            }
            WorkerInternalEvent::Error { worker_idx, message } => {
                self.emit(EngineEvent::Error { message: format!("worker {worker_idx}: {message}") });
            }
            WorkerInternalEvent::UpdateRequired => {
                self.update_required = true;
                self.inner.request_stop(false);
                self.emit(EngineEvent::UpdateRequired {
                    message: "coordinator requested an updated client build".to_string(),
                });
            }
            WorkerInternalEvent::NewerVersionAvailable { version } => {
                if self.cfg.auto_update {
                    self.update_required = true;
                    self.inner.request_stop(false);
                    self.emit(EngineEvent::UpdateRequired {
                        message: format!("a newer fishnet release ({version}) is available"),
                    });
                } else {
                    self.emit(EngineEvent::Warning {
                        message: format!(
                            "a newer fishnet release ({version}) is available; rerun with --auto-update to upgrade automatically"
                        ),
                    });
                }
            }
        }
        self.push_snapshot();
    }

    /// Roll the dice on whether to consult the package index this tick, and if so, spawn
    /// the check in the background so a slow or unreachable index never stalls the main
    /// select loop.
    fn maybe_check_for_update(&self) {
        if fastrand::f64() >= crate::update::CHECK_PROBABILITY {
            return;
        }
        let client = self.update_client.clone();
        let current = self.cfg.identity.version.clone();
        let tx = self.update_tx.clone();
        tokio::spawn(async move {
            if let Some(version) = crate::update::check_for_newer_version(&client, &current).await {
                let _ = tx.send(WorkerInternalEvent::NewerVersionAvailable { version }).await;
            }
        });
    }

    async fn run(mut self) -> anyhow::Result<SupervisorOutcome> {
        self.emit(EngineEvent::Started);
        self.push_snapshot();

        let mut stats_tick = tokio::time::interval(self.cfg.stats_interval);
        stats_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = stats_tick.tick() => {
                    self.emit(EngineEvent::StatsTick {
                        positions_done: self.positions_done,
                        nodes_done: self.nodes_done,
                        at: chrono::Utc::now().timestamp(),
                    });
                    self.maybe_check_for_update();
                }
                _ = self.inner.notified() => {}
                ev = self.internal_rx.recv() => {
                    match ev {
                        Some(ev) => self.handle_internal_event(ev),
                        None => {}
                    }
                }
                res = self.worker_join.join_next() => {
                    if res.is_none() {
                        break;
                    }
                }
            }

            if self.worker_join.is_empty() {
                break;
            }
        }

        while let Ok(ev) = self.internal_rx.try_recv() {
            self.handle_internal_event(ev);
        }

        let reporter = self.progress.clone();
        reporter.shutdown().await;

        self.emit(EngineEvent::Stopped);
        self.push_snapshot();

        Ok(if self.update_required { SupervisorOutcome::UpdateRequired } else { SupervisorOutcome::Normal })
    }
}

/// Start a new supervisor instance: size the worker pool, spawn the shared progress
/// reporter, then one worker task per pool slot.
pub(crate) fn start_engine(cfg: SupervisorConfig) -> EngineHandle {
    let (event_tx, _) = broadcast::channel::<EngineEvent>(1024);
    let (snapshot_tx, snapshot_rx) = watch::channel(StatusSnapshot {
        stop_requested: false,
        workers: Vec::new(),
        positions_done: 0,
        nodes_done: 0,
    });

    let inner = Arc::new(EngineInner {
        event_tx: event_tx.clone(),
        snapshot_rx,
        stop_soon: AtomicBool::new(false),
        stop_now: AtomicBool::new(false),
        notify: Notify::new(),
    });

    let join = tokio::spawn(run_supervisor(cfg, inner.clone(), event_tx, snapshot_tx));
    EngineHandle { inner, join }
}

async fn run_supervisor(
    cfg: SupervisorConfig,
    inner: Arc<EngineInner>,
    event_tx: broadcast::Sender<EngineEvent>,
    snapshot_tx: watch::Sender<StatusSnapshot>,
) -> anyhow::Result<SupervisorOutcome> {
    let pool = pool_size(cfg.config.cores, cfg.threads_per_process);
    let threads = worker_threads(cfg.config.cores, pool);
    let hash_mb = (cfg.config.memory_mb / pool as u64).max(1);

    let transport = Transport::new(cfg.config.endpoint.clone(), cfg.identity.clone(), cfg.config.key.clone())?;
    let progress = ProgressReporter::spawn(
        transport.client(),
        transport.base_url().to_string(),
        cfg.identity.user_agent(),
        pool + 4,
    );

    let (internal_tx, internal_rx) = mpsc::channel(256);
    let mut worker_join = JoinSet::new();
    let mut workers = Vec::with_capacity(pool);

    for worker_idx in 0..pool {
        let extra_options: HashMap<String, String> = cfg.extra_options.iter().cloned().collect();
        let worker_cfg = WorkerConfig {
            worker_idx,
            engine_command: cfg.config.engine_command.clone().unwrap_or_else(|| "stockfish".to_string()),
            engine_dir: cfg.config.engine_dir.clone(),
            threads,
            hash_mb,
            extra_options,
            fixed_backoff: cfg.config.fixed_backoff,
        };
        workers.push(WorkerSnapshot { worker_idx, stage: WorkerStage::Idle, job: None, threads, hash_mb });

        let inner = inner.clone();
        let transport = transport.clone();
        let progress = progress.clone();
        let events = internal_tx.clone();
        worker_join.spawn(async move {
            run_worker(worker_cfg, inner, transport, progress, events).await;
        });
    }
    let update_tx = internal_tx.clone();
    drop(internal_tx);

    let supervisor = Supervisor {
        update_client: transport.client(),
        cfg,
        inner,
        event_tx,
        snapshot_tx,
        workers,
        positions_done: 0,
        nodes_done: 0,
        worker_join,
        internal_rx,
        progress,
        update_required: false,
        update_tx,
    };

    supervisor.run().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_size_divides_cores_by_threads_per_process() {
        assert_eq!(pool_size(8, 2), 4);
        assert_eq!(pool_size(8, 3), 2);
        assert_eq!(pool_size(1, 4), 1);
    }

    #[test]
    fn worker_threads_rounds_up() {
        assert_eq!(worker_threads(8, 4), 2);
        assert_eq!(worker_threads(10, 4), 3);
        assert_eq!(worker_threads(1, 1), 1);
    }
}
