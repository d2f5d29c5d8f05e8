//! HTTP transport: the `acquire`/`analysis/<id>`/`move/<id>`/`abort/<id>`/`key/<key>`
//! endpoints, and the envelope every request carries.

use std::collections::HashMap;
use std::time::Duration;

use fishnet_core::{AnalysisEntry, ClientIdentity, Clock, Job, JobKind, MoveResult};
use serde::{Deserialize, Serialize};

const HTTP_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("request to {path} failed: {source}")]
    Transport { path: String, #[source] source: reqwest::Error },
    #[error("could not build http client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("malformed job in acquire response: {0}")]
    MalformedJob(String),
}

fn default_true() -> bool {
    true
}

fn default_variant() -> String {
    "standard".to_string()
}

#[derive(Debug, Deserialize)]
struct WireClock {
    wtime: u64,
    btime: u64,
    inc: u64,
}

impl From<WireClock> for Clock {
    fn from(w: WireClock) -> Self {
        Clock { wtime_cs: w.wtime, btime_cs: w.btime, inc_s: w.inc }
    }
}

#[derive(Debug, Deserialize)]
struct WireWork {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    level: Option<u8>,
    clock: Option<WireClock>,
    nodes: Option<u64>,
    #[serde(rename = "skipPositions", default)]
    skip_positions: Vec<usize>,
}

#[derive(Debug, Deserialize)]
struct WireJob {
    work: WireWork,
    game_id: Option<String>,
    #[serde(default = "default_variant")]
    variant: String,
    #[serde(default)]
    chess960: bool,
    position: String,
    #[serde(default)]
    moves: String,
    #[serde(default = "default_true")]
    nnue: bool,
}

impl TryFrom<WireJob> for Job {
    type Error = BackendError;

    fn try_from(wire: WireJob) -> Result<Self, Self::Error> {
        let moves: Vec<String> = if wire.moves.trim().is_empty() {
            Vec::new()
        } else {
            wire.moves.split_whitespace().map(str::to_string).collect()
        };

        let kind = match wire.work.kind.as_str() {
            "move" => JobKind::Move {
                level: wire
                    .work
                    .level
                    .ok_or_else(|| BackendError::MalformedJob("move job missing level".into()))?,
                clock: wire.work.clock.map(Clock::from),
            },
            "analysis" => JobKind::Analysis {
                nodes: wire.work.nodes,
                skip_positions: wire.work.skip_positions.into_iter().collect(),
            },
            other => return Err(BackendError::MalformedJob(format!("unknown work type {other:?}"))),
        };

        Ok(Job {
            id: wire.work.id,
            kind,
            variant: wire.variant,
            chess960: wire.chess960,
            position: wire.position,
            moves,
            nnue: wire.nnue,
            game_id: wire.game_id,
        })
    }
}

/// Outcome of a request that may hand back the next job to work on (`acquire`, and every
/// submit endpoint, which doubles as the next `acquire` in one round trip).
#[derive(Debug)]
pub enum WorkOutcome {
    NoJob,
    Assigned(Job),
}

/// A classified HTTP outcome the worker needs to act on.
#[derive(Debug)]
pub enum RequestOutcome {
    Work(WorkOutcome),
    /// Back off for `retry_after` before trying again.
    Retry { retry_after: Duration },
    /// The server told us to stop running this build.
    UpdateRequired,
}

/// Engine identification and option snapshot sent with every request.
#[derive(Debug, Clone, Serialize)]
pub struct StockfishInfo {
    pub name: String,
    pub options: HashMap<String, String>,
    pub nnue: Vec<String>,
}

#[derive(Debug, Serialize)]
struct FishnetInfo {
    version: String,
    /// Historical field name kept for server-side schema compatibility; this client has
    /// no Python runtime, so the value is just a compatibility placeholder.
    python: String,
    apikey: Option<String>,
}

#[derive(Debug, Serialize)]
struct Envelope<'a, T> {
    fishnet: FishnetInfo,
    stockfish: &'a StockfishInfo,
    #[serde(flatten)]
    result: T,
}

#[derive(Debug, Serialize)]
struct EmptyResult {}

#[derive(Debug, Serialize)]
struct MoveResultBody {
    #[serde(rename = "move")]
    move_: MoveResult,
}

#[derive(Debug, Serialize)]
struct AnalysisResultBody {
    analysis: Vec<AnalysisEntry>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

/// The HTTP session shared by every worker: persistent connections and a consistent
/// `User-Agent`. reqwest already pools connections per client, so one `Transport` is
/// meant to be cloned and shared rather than rebuilt per request.
#[derive(Clone)]
pub struct Transport {
    client: reqwest::Client,
    base_url: String,
    identity: ClientIdentity,
    apikey: Option<String>,
}

impl Transport {
    pub fn new(base_url: String, identity: ClientIdentity, apikey: Option<String>) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .user_agent(identity.user_agent())
            .build()
            .map_err(BackendError::Client)?;
        Ok(Self { client, base_url, identity, apikey })
    }

    pub fn client(&self) -> reqwest::Client {
        self.client.clone()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn identity(&self) -> &ClientIdentity {
        &self.identity
    }

    fn envelope<T>(&self, stockfish: &StockfishInfo, result: T) -> Envelope<'_, T> {
        Envelope {
            fishnet: FishnetInfo {
                version: self.identity.version.clone(),
                python: "n/a".to_string(),
                apikey: self.apikey.clone(),
            },
            stockfish,
            result,
        }
    }

    /// Send one POST, with a single bounded retry if the request itself fails (timeout,
    /// connection reset, …) rather than coming back with an HTTP status to classify.
    async fn post_with_retry(
        &self,
        url: &str,
        body: &impl Serialize,
        path: &str,
    ) -> Result<reqwest::Response, BackendError> {
        match self.client.post(url).json(body).send().await {
            Ok(response) => Ok(response),
            Err(_first) => self
                .client
                .post(url)
                .json(body)
                .send()
                .await
                .map_err(|source| BackendError::Transport { path: path.to_string(), source }),
        }
    }

    async fn post_for_work(&self, path: &str, body: impl Serialize) -> Result<RequestOutcome, BackendError> {
        let url = format!("{}{path}", self.base_url);
        let response = self.post_with_retry(&url, &body, path).await?;

        let status = response.status();
        match status.as_u16() {
            204 => Ok(RequestOutcome::Work(WorkOutcome::NoJob)),
            202 => {
                let wire: WireJob = response
                    .json()
                    .await
                    .map_err(|source| BackendError::Transport { path: path.to_string(), source })?;
                let job = Job::try_from(wire)?;
                Ok(RequestOutcome::Work(WorkOutcome::Assigned(job)))
            }
            429 => Ok(RequestOutcome::Retry { retry_after: Duration::from_secs(60) }),
            400..=499 => {
                if let Ok(body) = response.json::<ErrorBody>().await {
                    if body.error.contains("Please restart fishnet to upgrade.") {
                        return Ok(RequestOutcome::UpdateRequired);
                    }
                }
                Ok(RequestOutcome::Retry { retry_after: Duration::ZERO })
            }
            _ => Ok(RequestOutcome::Retry { retry_after: Duration::ZERO }),
        }
    }

    /// `POST acquire`.
    pub async fn acquire(&self, stockfish: &StockfishInfo) -> Result<RequestOutcome, BackendError> {
        let body = self.envelope(stockfish, EmptyResult {});
        self.post_for_work("acquire", body).await
    }

    /// `POST move/<id>`, returning the next assignment in the same response.
    pub async fn submit_move(
        &self,
        job_id: &str,
        stockfish: &StockfishInfo,
        result: MoveResult,
    ) -> Result<RequestOutcome, BackendError> {
        let body = self.envelope(stockfish, MoveResultBody { move_: result });
        self.post_for_work(&format!("move/{job_id}"), body).await
    }

    /// `POST analysis/<id>`, returning the next assignment in the same response.
    pub async fn submit_analysis(
        &self,
        job_id: &str,
        stockfish: &StockfishInfo,
        analysis: Vec<AnalysisEntry>,
    ) -> Result<RequestOutcome, BackendError> {
        let body = self.envelope(stockfish, AnalysisResultBody { analysis });
        self.post_for_work(&format!("analysis/{job_id}"), body).await
    }

    /// Serialize a partial-progress body for an in-flight `analysis/<id>` job. Sending
    /// is delegated to [`crate::progress::ProgressReporter`] so a slow server cannot
    /// stall the worker that produced the report.
    pub fn progress_body(&self, stockfish: &StockfishInfo, analysis: Vec<AnalysisEntry>) -> Vec<u8> {
        let body = self.envelope(stockfish, AnalysisResultBody { analysis });
        serde_json::to_vec(&body).unwrap_or_default()
    }

    /// `POST abort/<id>`. Best-effort: errors are for the caller to log, not retry.
    pub async fn abort(&self, job_id: &str, stockfish: &StockfishInfo) -> Result<(), BackendError> {
        let body = self.envelope(stockfish, EmptyResult {});
        let path = format!("abort/{job_id}");
        let url = format!("{}{path}", self.base_url);
        let response = self.post_with_retry(&url, &body, &path).await?;
        if response.status().as_u16() != 204 {
            return Err(BackendError::MalformedJob(format!(
                "unexpected status {} for {path}",
                response.status()
            )));
        }
        Ok(())
    }

    /// `GET key/<key>`. Returns `true` if the key is accepted by the server.
    pub async fn validate_key(&self, key: &str) -> Result<bool, BackendError> {
        let path = format!("key/{key}");
        let url = format!("{}{path}", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|source| BackendError::Transport { path, source })?;
        Ok(response.status().is_success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_job_parses_move_work() {
        let wire: WireJob = serde_json::from_value(serde_json::json!({
            "work": {"id": "abc", "type": "move", "level": 8},
            "variant": "standard",
            "position": "startpos",
            "moves": "e2e4 e7e5",
        }))
        .unwrap();
        let job = Job::try_from(wire).unwrap();
        assert_eq!(job.id, "abc");
        assert_eq!(job.moves, vec!["e2e4".to_string(), "e7e5".to_string()]);
        assert!(matches!(job.kind, JobKind::Move { level: 8, clock: None }));
    }

    #[test]
    fn wire_job_parses_analysis_work_with_skip_positions() {
        let wire: WireJob = serde_json::from_value(serde_json::json!({
            "work": {
                "id": "def",
                "type": "analysis",
                "nodes": 1_000_000,
                "skipPositions": [0, 2],
            },
            "position": "startpos",
        }))
        .unwrap();
        let job = Job::try_from(wire).unwrap();
        match job.kind {
            JobKind::Analysis { nodes, skip_positions } => {
                assert_eq!(nodes, Some(1_000_000));
                assert!(skip_positions.contains(&0));
                assert!(skip_positions.contains(&2));
            }
            JobKind::Move { .. } => panic!("expected analysis"),
        }
    }

    #[test]
    fn wire_job_rejects_move_work_without_a_level() {
        let wire: WireJob = serde_json::from_value(serde_json::json!({
            "work": {"id": "ghi", "type": "move"},
            "position": "startpos",
        }))
        .unwrap();
        assert!(Job::try_from(wire).is_err());
    }

    #[test]
    fn wire_job_rejects_unknown_work_type() {
        let wire: WireJob = serde_json::from_value(serde_json::json!({
            "work": {"id": "jkl", "type": "puzzle"},
            "position": "startpos",
        }))
        .unwrap();
        assert!(Job::try_from(wire).is_err());
    }

    #[test]
    fn empty_moves_string_yields_no_moves() {
        let wire: WireJob = serde_json::from_value(serde_json::json!({
            "work": {"id": "mno", "type": "move", "level": 1},
            "position": "startpos",
            "moves": "",
        }))
        .unwrap();
        let job = Job::try_from(wire).unwrap();
        assert!(job.moves.is_empty());
    }
}
