//! Per-engine worker loop: keep one engine subprocess alive, alternate between
//! acquiring work and running it, and report outcomes back to the supervisor.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use fishnet_core::{AnalysisEntry, Job, JobKind};
use fishnet_uci::EngineDialogue;
use tokio::sync::mpsc;

use crate::api::{JobSummary, WorkerStage};
use crate::backend::{RequestOutcome, StockfishInfo, Transport, WorkOutcome};
use crate::backoff::Backoff;
use crate::engine::EngineInner;
use crate::executor;
use crate::progress::ProgressReporter;

/// Static configuration for one worker; built once by the supervisor and handed to the
/// worker's task.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub worker_idx: usize,
    pub engine_command: String,
    pub engine_dir: Option<PathBuf>,
    pub threads: u32,
    pub hash_mb: u64,
    pub extra_options: HashMap<String, String>,
    pub fixed_backoff: bool,
}

/// Events a worker reports to the supervisor's aggregation loop.
#[derive(Debug)]
pub enum WorkerInternalEvent {
    StageChanged { worker_idx: usize, stage: WorkerStage },
    JobStarted { worker_idx: usize, job: JobSummary },
    JobFinished { worker_idx: usize, job_id: String, error: Option<String> },
    StatsDelta { positions: u64, nodes: u64 },
    Warning { worker_idx: usize, message: String },
    Error { worker_idx: usize, message: String },
    UpdateRequired,
    /// The package index reports a release newer than this build.
    NewerVersionAvailable { version: String },
}

fn job_summary(job: &Job) -> JobSummary {
    JobSummary {
        id: job.id.clone(),
        kind: match job.kind {
            JobKind::Move { .. } => "move",
            JobKind::Analysis { .. } => "analysis",
        },
        variant: job.variant.clone(),
        game_id: job.game_id.clone(),
    }
}

async fn interruptible_sleep(inner: &EngineInner, dur: Duration) {
    if dur.is_zero() {
        return;
    }
    tokio::select! {
        _ = tokio::time::sleep(dur) => {}
        _ = inner.notified() => {}
    }
}

/// Spawn the engine, perform the handshake, and apply the shared option snapshot
/// (`Threads`, `Hash`, user options). Returns the dialogue and the identification used to
/// build the outgoing `stockfish` envelope section.
async fn spawn_engine(cfg: &WorkerConfig) -> anyhow::Result<(EngineDialogue, StockfishInfo)> {
    let mut dialogue = EngineDialogue::start(&cfg.engine_command, cfg.engine_dir.as_deref()).await?;
    executor::apply_engine_options(&mut dialogue, cfg.threads, cfg.hash_mb, &cfg.extra_options).await?;

    let mut options: HashMap<String, String> = HashMap::new();
    options.insert("threads".to_string(), cfg.threads.to_string());
    options.insert("hash".to_string(), cfg.hash_mb.to_string());
    for (name, value) in &cfg.extra_options {
        options.insert(name.to_lowercase(), value.clone());
    }

    let name = dialogue
        .identification()
        .get("name")
        .cloned()
        .unwrap_or_else(|| "Stockfish <?>".to_string());

    let stockfish = StockfishInfo { name, options, nnue: fishnet_core::nnue::known_eval_files() };
    Ok((dialogue, stockfish))
}

enum RunJobResult {
    Move(fishnet_core::MoveResult, u64),
    Analysis(Vec<AnalysisEntry>),
}

/// Run one worker to completion (until the supervisor asks it to stop, or the server
/// demands an update).
pub async fn run_worker(
    cfg: WorkerConfig,
    inner: Arc<EngineInner>,
    transport: Transport,
    progress: ProgressReporter,
    events: mpsc::Sender<WorkerInternalEvent>,
) {
    let mut backoff = Backoff::new(cfg.fixed_backoff);
    let mut engine: Option<(EngineDialogue, StockfishInfo)> = None;
    let mut current_job: Option<Job> = None;

    while !inner.should_stop_now() {
        if current_job.is_none() && inner.should_stop_soon() {
            break;
        }

        if engine.is_none() {
            let _ = events
                .send(WorkerInternalEvent::StageChanged { worker_idx: cfg.worker_idx, stage: WorkerStage::Handshaking })
                .await;
            match spawn_engine(&cfg).await {
                Ok(started) => engine = Some(started),
                Err(err) => {
                    let _ = events
                        .send(WorkerInternalEvent::Error {
                            worker_idx: cfg.worker_idx,
                            message: format!("failed to start engine: {err}"),
                        })
                        .await;
                    if let Some(job) = current_job.take() {
                        let placeholder = StockfishInfo {
                            name: "Stockfish <?>".to_string(),
                            options: HashMap::new(),
                            nnue: Vec::new(),
                        };
                        let _ = transport.abort(&job.id, &placeholder).await;
                    }
                    interruptible_sleep(&inner, backoff.next()).await;
                    continue;
                }
            }
        }

        let (dialogue, stockfish) = engine.as_mut().expect("engine started above");

        let outcome = if let Some(job) = current_job.take() {
            run_job(&cfg, dialogue, &transport, &progress, stockfish, job, &events).await
        } else {
            let _ = events
                .send(WorkerInternalEvent::StageChanged { worker_idx: cfg.worker_idx, stage: WorkerStage::Acquiring })
                .await;
            transport.acquire(stockfish).await.map_err(anyhow::Error::from)
        };

        match outcome {
            Ok(RequestOutcome::Work(WorkOutcome::Assigned(job))) => {
                backoff.reset();
                current_job = Some(job);
            }
            Ok(RequestOutcome::Work(WorkOutcome::NoJob)) => {
                interruptible_sleep(&inner, backoff.next()).await;
            }
            Ok(RequestOutcome::Retry { retry_after }) => {
                interruptible_sleep(&inner, backoff.next() + retry_after).await;
            }
            Ok(RequestOutcome::UpdateRequired) => {
                let _ = events.send(WorkerInternalEvent::UpdateRequired).await;
                return;
            }
            Err(err) => {
                let _ = events
                    .send(WorkerInternalEvent::Error {
                        worker_idx: cfg.worker_idx,
                        message: format!("engine died: {err}"),
                    })
                    .await;
                if let Some((mut dialogue, _)) = engine.take() {
                    dialogue.kill().await;
                }
                interruptible_sleep(&inner, backoff.next()).await;
            }
        }
    }

    if let Some(job) = current_job {
        if let Some((_, stockfish)) = &engine {
            let _ = transport.abort(&job.id, stockfish).await;
        }
    }
    if let Some((mut dialogue, _)) = engine {
        dialogue.kill().await;
    }
    let _ = events
        .send(WorkerInternalEvent::StageChanged { worker_idx: cfg.worker_idx, stage: WorkerStage::Idle })
        .await;
}

/// Execute `job` on `dialogue`, submit the result, and return the server's response the
/// same way `acquire` would (every submit endpoint doubles as the next assignment).
async fn run_job(
    cfg: &WorkerConfig,
    dialogue: &mut EngineDialogue,
    transport: &Transport,
    progress: &ProgressReporter,
    stockfish: &StockfishInfo,
    job: Job,
    events: &mpsc::Sender<WorkerInternalEvent>,
) -> anyhow::Result<RequestOutcome> {
    let _ = events
        .send(WorkerInternalEvent::JobStarted { worker_idx: cfg.worker_idx, job: job_summary(&job) })
        .await;
    let _ = events
        .send(WorkerInternalEvent::StageChanged { worker_idx: cfg.worker_idx, stage: WorkerStage::Searching })
        .await;

    let result: anyhow::Result<RunJobResult> = match &job.kind {
        JobKind::Move { .. } => {
            executor::bestmove(dialogue, &job, cfg.threads, cfg.engine_dir.as_deref())
                .await
                .map(|(result, nodes)| RunJobResult::Move(result, nodes))
        }
        JobKind::Analysis { .. } => {
            let job_id = job.id.clone();
            let transport_for_progress = transport.clone();
            let progress_for_reports = progress.clone();
            let stockfish_for_progress = stockfish.clone();
            let on_progress = move |snapshot: &[AnalysisEntry]| {
                let body = transport_for_progress.progress_body(&stockfish_for_progress, snapshot.to_vec());
                progress_for_reports.report(&job_id, body);
            };
            let warn_events = events.clone();
            let worker_idx = cfg.worker_idx;
            let warn = move |message: String| {
                let _ = warn_events.try_send(WorkerInternalEvent::Warning { worker_idx, message });
            };
            executor::analysis(dialogue, &job, cfg.engine_dir.as_deref(), on_progress, warn)
                .await
                .map(RunJobResult::Analysis)
        }
    };

    let _ = events
        .send(WorkerInternalEvent::StageChanged { worker_idx: cfg.worker_idx, stage: WorkerStage::Submitting })
        .await;

    match result {
        Ok(RunJobResult::Move(move_result, nodes)) => {
            let _ = events
                .send(WorkerInternalEvent::StatsDelta { positions: 1, nodes })
                .await;
            let _ = events
                .send(WorkerInternalEvent::JobFinished { worker_idx: cfg.worker_idx, job_id: job.id.clone(), error: None })
                .await;
            transport.submit_move(&job.id, stockfish, move_result).await.map_err(anyhow::Error::from)
        }
        Ok(RunJobResult::Analysis(entries)) => {
            let positions = entries
                .iter()
                .filter(|e| matches!(e, AnalysisEntry::Info(_)))
                .count() as u64;
            let nodes = entries
                .iter()
                .filter_map(|e| match e {
                    AnalysisEntry::Info(info) => info.nodes,
                    AnalysisEntry::Skipped { .. } => None,
                })
                .sum();
            let _ = events.send(WorkerInternalEvent::StatsDelta { positions, nodes }).await;
            let _ = events
                .send(WorkerInternalEvent::JobFinished { worker_idx: cfg.worker_idx, job_id: job.id.clone(), error: None })
                .await;
            transport.submit_analysis(&job.id, stockfish, entries).await.map_err(anyhow::Error::from)
        }
        Err(err) => {
            let _ = events
                .send(WorkerInternalEvent::JobFinished {
                    worker_idx: cfg.worker_idx,
                    job_id: job.id.clone(),
                    error: Some(err.to_string()),
                })
                .await;
            Err(err)
        }
    }
}
