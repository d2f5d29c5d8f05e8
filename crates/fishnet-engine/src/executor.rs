//! Drives one [`EngineSession`] through a [`Job`]: configures the engine for the job's
//! variant and skill, then runs either a single best-move search or a reverse-ply
//! analysis walk. Generic over the session trait so tests can substitute a scripted fake
//! for a real engine subprocess.

use std::collections::HashMap;
use std::path::Path;
use std::time::{Duration, Instant};

use fishnet_core::{
    depth_cap, fen_after, modded_variant, movetime_ms, nnue::resolve_eval_file, skill,
    uci_variant_name, AnalysisEntry, Clock, Job, JobKind, MoveResult, SearchInfo,
};
use fishnet_uci::{EngineDialogue, GoLimits};

/// Node budget used for analysis when a job does not specify one.
const DEFAULT_ANALYSIS_NODES: u64 = 3_500_000;
/// Per-ply movetime cap for analysis, alongside the node budget (whichever hits first).
const ANALYSIS_MOVETIME_MS: u64 = 4_000;
/// Minimum interval between progress-reporter snapshots during an analysis job.
const PROGRESS_REPORT_INTERVAL: Duration = Duration::from_secs(5);
/// Implausible nps readings above this are dropped rather than reported.
const IMPLAUSIBLE_NPS: u64 = 100_000_000;
/// A non-mate search finishing faster than this is suspicious but kept, with a warning.
const SUSPICIOUSLY_FAST_MS: u64 = 100;

/// The subset of [`EngineDialogue`] the job executor needs, abstracted so tests can run
/// it against an in-memory double instead of a real engine subprocess.
pub trait EngineSession: Send {
    fn set_option(
        &mut self,
        name: &str,
        value: &str,
    ) -> impl std::future::Future<Output = anyhow::Result<()>> + Send;

    fn sync_ready(&mut self) -> impl std::future::Future<Output = anyhow::Result<()>> + Send;

    fn ucinewgame(&mut self) -> impl std::future::Future<Output = anyhow::Result<()>> + Send;

    fn set_position(
        &mut self,
        fen: &str,
        moves: &[String],
    ) -> impl std::future::Future<Output = anyhow::Result<()>> + Send;

    fn run_search(
        &mut self,
        limits: GoLimits,
    ) -> impl std::future::Future<Output = anyhow::Result<(SearchInfo, Option<String>, Option<String>)>> + Send;
}

impl EngineSession for EngineDialogue {
    async fn set_option(&mut self, name: &str, value: &str) -> anyhow::Result<()> {
        EngineDialogue::set_option(self, name, value).await.map_err(Into::into)
    }

    async fn sync_ready(&mut self) -> anyhow::Result<()> {
        EngineDialogue::sync_ready(self).await.map_err(Into::into)
    }

    async fn ucinewgame(&mut self) -> anyhow::Result<()> {
        EngineDialogue::ucinewgame(self).await.map_err(Into::into)
    }

    async fn set_position(&mut self, fen: &str, moves: &[String]) -> anyhow::Result<()> {
        EngineDialogue::set_position(self, fen, moves).await.map_err(Into::into)
    }

    async fn run_search(
        &mut self,
        limits: GoLimits,
    ) -> anyhow::Result<(SearchInfo, Option<String>, Option<String>)> {
        EngineDialogue::run_search(self, limits).await.map_err(Into::into)
    }
}

/// Warnings the executor itself cannot log (it has no event channel); the worker loop
/// forwards these as `EngineEvent::Warning`s.
pub type Warn<'a> = dyn FnMut(String) + Send + 'a;

async fn configure_variant<S: EngineSession>(
    session: &mut S,
    job: &Job,
    engine_dir: Option<&Path>,
) -> anyhow::Result<String> {
    let effective = modded_variant(&job.variant, job.chess960, &job.position);
    session
        .set_option("UCI_Chess960", if job.chess960 { "true" } else { "false" })
        .await?;
    if let Some(eval_file) = resolve_eval_file(engine_dir, &effective, job.nnue) {
        session.set_option("EvalFile", &eval_file).await?;
    }
    session.set_option("UCI_Variant", uci_variant_name(&effective)).await?;
    Ok(effective)
}

fn clock_limits(clock: Option<Clock>) -> (Option<u64>, Option<u64>, Option<u64>, Option<u64>) {
    match clock {
        Some(c) => (
            Some(c.wtime_cs * 10),
            Some(c.btime_cs * 10),
            Some(c.inc_s * 1000),
            Some(c.inc_s * 1000),
        ),
        None => (None, None, None, None),
    }
}

/// Run a single best-move search for a `move` job and return `{bestmove, fen}` plus the
/// node count the search consumed (for the worker's cumulative stats counter only, not
/// part of the wire result).
pub async fn bestmove<S: EngineSession>(
    session: &mut S,
    job: &Job,
    threads: u32,
    engine_dir: Option<&Path>,
) -> anyhow::Result<(MoveResult, u64)> {
    let (level, clock) = match &job.kind {
        JobKind::Move { level, clock } => (*level, *clock),
        JobKind::Analysis { .. } => anyhow::bail!("bestmove() called on an analysis job"),
    };

    configure_variant(session, job, engine_dir).await?;
    session.set_option("Skill Level", &skill(level).to_string()).await?;
    session.set_option("UCI_AnalyseMode", "false").await?;
    session.ucinewgame().await?;
    session.sync_ready().await?;
    session.set_position(&job.position, &job.moves).await?;

    let (wtime_ms, btime_ms, winc_ms, binc_ms) = clock_limits(clock);
    let limits = GoLimits {
        movetime_ms: Some(movetime_ms(level, threads)),
        depth: Some(depth_cap(level)),
        wtime_ms,
        btime_ms,
        winc_ms,
        binc_ms,
        ..Default::default()
    };

    let (info, bestmove, _ponder) = session.run_search(limits).await?;

    let fen = if let Some(mv) = &bestmove {
        let mut moves = job.moves.clone();
        moves.push(mv.clone());
        fen_after(&job.variant, &job.position, &moves, job.chess960, false, false)?
    } else {
        job.position.clone()
    };

    Ok((MoveResult { bestmove, fen }, info.nodes.unwrap_or(0)))
}

/// Run the reverse-ply analysis walk for an `analysis` job, reporting a partial snapshot
/// through `on_progress` no more than once every [`PROGRESS_REPORT_INTERVAL`].
pub async fn analysis<S: EngineSession>(
    session: &mut S,
    job: &Job,
    engine_dir: Option<&Path>,
    mut on_progress: impl FnMut(&[AnalysisEntry]),
    mut warn: impl FnMut(String),
) -> anyhow::Result<Vec<AnalysisEntry>> {
    let (node_budget, skip_positions) = match &job.kind {
        JobKind::Analysis { nodes, skip_positions } => {
            (nodes.unwrap_or(DEFAULT_ANALYSIS_NODES), skip_positions)
        }
        JobKind::Move { .. } => anyhow::bail!("analysis() called on a move job"),
    };

    configure_variant(session, job, engine_dir).await?;
    session.set_option("Skill Level", &skill(8).to_string()).await?;
    session.set_option("UCI_AnalyseMode", "true").await?;
    session.ucinewgame().await?;
    session.sync_ready().await?;

    let ply_count = job.ply_count();
    let mut entries: Vec<Option<AnalysisEntry>> = vec![None; ply_count + 1];
    let mut last_report = Instant::now();

    for ply in (0..=ply_count).rev() {
        if skip_positions.contains(&ply) {
            entries[ply] = Some(AnalysisEntry::skipped());
            continue;
        }

        if last_report.elapsed() >= PROGRESS_REPORT_INTERVAL {
            let snapshot: Vec<AnalysisEntry> = entries
                .iter()
                .map(|e| e.clone().unwrap_or(AnalysisEntry::skipped()))
                .collect();
            on_progress(&snapshot);
            last_report = Instant::now();
        }

        session.set_position(&job.position, &job.moves[..ply]).await?;
        let limits = GoLimits {
            nodes: Some(node_budget),
            movetime_ms: Some(ANALYSIS_MOVETIME_MS),
            ..Default::default()
        };
        let (mut info, bestmove, _ponder) = session.run_search(limits).await?;
        info.bestmove = bestmove;

        let non_mate_and_fast = info.score.is_some_and(|s| !s.is_mate())
            && info.time_ms.is_some_and(|t| t < SUSPICIOUSLY_FAST_MS);
        if non_mate_and_fast {
            warn(format!("very low time reported: {} ms", info.time_ms.unwrap_or(0)));
        }
        if info.nps.is_some_and(|n| n >= IMPLAUSIBLE_NPS) {
            warn(format!("dropping exorbitant nps: {}", info.nps.unwrap_or(0)));
            info.nps = None;
        }

        entries[ply] = Some(AnalysisEntry::info(info));
    }

    Ok(entries.into_iter().map(|e| e.unwrap_or(AnalysisEntry::skipped())).collect())
}

/// `Threads`/`Hash`/user option snapshot applied to a freshly spawned engine, before any
/// job-specific configuration.
pub async fn apply_engine_options<S: EngineSession>(
    session: &mut S,
    threads: u32,
    hash_mb: u64,
    extra_options: &HashMap<String, String>,
) -> anyhow::Result<()> {
    session.set_option("Threads", &threads.to_string()).await?;
    session.set_option("Hash", &hash_mb.to_string()).await?;
    for (name, value) in extra_options {
        session.set_option(name, value).await?;
    }
    session.sync_ready().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// A scripted engine: `lines` is the transcript the engine would emit for the
    /// upcoming `go` command, fed back one at a time from `run_search`; every other
    /// method is a no-op recorded into `sent` for assertions.
    struct ScriptedEngine {
        sent: Vec<String>,
        transcripts: VecDeque<Vec<&'static str>>,
    }

    impl ScriptedEngine {
        fn new(transcripts: Vec<Vec<&'static str>>) -> Self {
            Self { sent: Vec::new(), transcripts: transcripts.into_iter().collect() }
        }
    }

    impl EngineSession for ScriptedEngine {
        async fn set_option(&mut self, name: &str, value: &str) -> anyhow::Result<()> {
            self.sent.push(format!("setoption {name}={value}"));
            Ok(())
        }

        async fn sync_ready(&mut self) -> anyhow::Result<()> {
            self.sent.push("isready".to_string());
            Ok(())
        }

        async fn ucinewgame(&mut self) -> anyhow::Result<()> {
            self.sent.push("ucinewgame".to_string());
            Ok(())
        }

        async fn set_position(&mut self, fen: &str, moves: &[String]) -> anyhow::Result<()> {
            self.sent.push(format!("position {fen} moves {}", moves.join(" ")));
            Ok(())
        }

        async fn run_search(
            &mut self,
            _limits: GoLimits,
        ) -> anyhow::Result<(SearchInfo, Option<String>, Option<String>)> {
            let transcript = self.transcripts.pop_front().expect("unscripted search");
            let mut info = SearchInfo::default();
            let mut bestmove = None;
            for line in transcript {
                if let Some((mv, _ponder)) = fishnet_uci::parse_bestmove_line(line) {
                    bestmove = mv;
                } else {
                    fishnet_uci::apply_info_line(&mut info, line);
                }
            }
            Ok((info, bestmove, None))
        }
    }

    fn standard_job(moves: &[&str]) -> Job {
        Job {
            id: "job1".to_string(),
            kind: JobKind::Move { level: 8, clock: None },
            variant: "standard".to_string(),
            chess960: false,
            position: "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1".to_string(),
            moves: moves.iter().map(|s| s.to_string()).collect(),
            nnue: false,
            game_id: None,
        }
    }

    #[tokio::test]
    async fn bestmove_applies_variant_and_skill_then_derives_fen() {
        let mut engine = ScriptedEngine::new(vec![vec![
            "info depth 10 score cp 20",
            "bestmove e2e4",
        ]]);
        let job = standard_job(&[]);

        let (result, nodes) = bestmove(&mut engine, &job, 1, None).await.unwrap();
        assert_eq!(result.bestmove.as_deref(), Some("e2e4"));
        assert!(result.fen.starts_with("rnbqkbnr/pppppppp/8/8/4P3"));
        assert_eq!(nodes, 0);
        assert!(engine.sent.iter().any(|l| l.contains("Skill Level=20")));
        assert!(engine.sent.iter().any(|l| l == "ucinewgame"));
    }

    #[tokio::test]
    async fn bestmove_none_normalizes_to_null_and_keeps_starting_fen() {
        let mut engine = ScriptedEngine::new(vec![vec!["bestmove (none)"]]);
        let job = standard_job(&[]);

        let (result, _nodes) = bestmove(&mut engine, &job, 1, None).await.unwrap();
        assert_eq!(result.bestmove, None);
        assert_eq!(result.fen, job.position);
    }

    #[tokio::test]
    async fn analysis_result_length_matches_moves_plus_one() {
        let moves = ["f2f3", "e7e6", "g2g4", "d8h4"];
        let job = Job {
            id: "job2".to_string(),
            kind: JobKind::Analysis { nodes: None, skip_positions: [1].into_iter().collect() },
            variant: "standard".to_string(),
            chess960: false,
            position: "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1".to_string(),
            moves: moves.iter().map(|s| s.to_string()).collect(),
            nnue: false,
            game_id: None,
        };

        let mut engine = ScriptedEngine::new(vec![
            vec!["info depth 1 score mate 0", "bestmove d8h4"],
            vec!["info depth 5 score mate 1 pv d8h4", "bestmove d8h4"],
            vec!["info depth 8 score cp 40", "bestmove g2g4"],
            vec!["info depth 8 score cp 30", "bestmove f2f3"],
        ]);

        let mut warnings = Vec::new();
        let result =
            analysis(&mut engine, &job, None, |_| {}, |w| warnings.push(w)).await.unwrap();

        assert_eq!(result.len(), moves.len() + 1);
        assert!(matches!(result[1], AnalysisEntry::Skipped { skipped: true }));
        if let AnalysisEntry::Info(info) = &result[4] {
            assert_eq!(info.score.unwrap().mate_value(), Some(0));
        } else {
            panic!("expected SearchInfo at ply 4");
        }
        if let AnalysisEntry::Info(info) = &result[3] {
            assert_eq!(info.score.unwrap().mate_value(), Some(1));
            assert_eq!(info.pv.as_deref(), Some("d8h4"));
        } else {
            panic!("expected SearchInfo at ply 3");
        }
    }

    #[tokio::test]
    async fn bestmove_threecheck_capture_derives_check_giving_fen() {
        let mut engine = ScriptedEngine::new(vec![vec![
            "info depth 12 score cp 250",
            "bestmove c4f7",
        ]]);
        let job = Job {
            id: "job4".to_string(),
            kind: JobKind::Move { level: 8, clock: None },
            variant: "threecheck".to_string(),
            chess960: false,
            position: "rnbqkb1r/pppp1ppp/5n2/4p3/2B1P3/8/PPPP1PPP/RNBQK1NR w KQkq - 4 4"
                .to_string(),
            moves: vec![],
            nnue: false,
            game_id: None,
        };

        let (result, _nodes) = bestmove(&mut engine, &job, 1, None).await.unwrap();
        assert_eq!(result.bestmove.as_deref(), Some("c4f7"));
        assert!(engine.sent.iter().any(|l| l.contains("UCI_Variant=threecheck")));
        assert_ne!(result.fen, job.position);
    }

    #[tokio::test]
    async fn bestmove_crazyhouse_only_move_drops_pawn_from_pocket() {
        let mut engine = ScriptedEngine::new(vec![vec![
            "info depth 6 score mate 3",
            "bestmove P@f2",
        ]]);
        let job = Job {
            id: "job5".to_string(),
            kind: JobKind::Move { level: 8, clock: None },
            variant: "crazyhouse".to_string(),
            chess960: false,
            position: "rnbqkbnr/pppppppp/8/8/8/8/PPPPP1PP/RNBQKBNR[P] w KQkq - 0 1".to_string(),
            moves: vec![],
            nnue: false,
            game_id: None,
        };

        let (result, _nodes) = bestmove(&mut engine, &job, 1, None).await.unwrap();
        assert_eq!(result.bestmove.as_deref(), Some("P@f2"));
        assert!(engine.sent.iter().any(|l| l.contains("UCI_Variant=crazyhouse")));
        assert!(!result.fen.contains("[P]"));
    }

    #[tokio::test]
    async fn analysis_drops_implausible_nps_and_keeps_fast_exact_scores() {
        let job = Job {
            id: "job3".to_string(),
            kind: JobKind::Analysis { nodes: None, skip_positions: Default::default() },
            variant: "standard".to_string(),
            chess960: false,
            position: "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1".to_string(),
            moves: vec![],
            nnue: false,
            game_id: None,
        };
        let mut engine = ScriptedEngine::new(vec![vec![
            "info depth 1 time 40 nps 500000000 score cp 10",
            "bestmove e2e4",
        ]]);

        let mut warnings = Vec::new();
        let result =
            analysis(&mut engine, &job, None, |_| {}, |w| warnings.push(w)).await.unwrap();

        if let AnalysisEntry::Info(info) = &result[0] {
            assert_eq!(info.nps, None);
            assert_eq!(info.score.unwrap().cp_value(), Some(10));
        } else {
            panic!("expected SearchInfo at ply 0");
        }
        assert!(warnings.iter().any(|w| w.contains("exorbitant")));
        assert!(warnings.iter().any(|w| w.contains("low time")));
    }
}
