//! The UCI handshake and command vocabulary, layered over [`EngineChannel`].

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::time::Duration;

use fishnet_core::SearchInfo;

use crate::channel::{ChannelError, EngineChannel};
use crate::parser::{apply_info_line, parse_bestmove_line};

const UCI_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
const READY_TIMEOUT: Duration = Duration::from_secs(5);
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, thiserror::Error)]
pub enum DialogueError {
    #[error(transparent)]
    Channel(#[from] ChannelError),
    #[error("engine did not send uciok within {0:?}")]
    HandshakeTimeout(Duration),
    #[error("engine did not send readyok within {0:?}")]
    ReadyTimeout(Duration),
    #[error("engine closed its output stream unexpectedly")]
    Closed,
}

/// Search bounds for a single `go` invocation. At least one field should be set, or the
/// engine will search until an explicit `stop`.
#[derive(Debug, Clone, Copy, Default)]
pub struct GoLimits {
    pub movetime_ms: Option<u64>,
    pub depth: Option<u32>,
    pub nodes: Option<u64>,
    pub wtime_ms: Option<u64>,
    pub btime_ms: Option<u64>,
    pub winc_ms: Option<u64>,
    pub binc_ms: Option<u64>,
}

impl GoLimits {
    fn to_command(self) -> String {
        let mut parts = vec!["go".to_string()];
        if let Some(v) = self.depth {
            parts.push(format!("depth {v}"));
        }
        if let Some(v) = self.nodes {
            parts.push(format!("nodes {v}"));
        }
        if let Some(v) = self.wtime_ms {
            parts.push(format!("wtime {v}"));
        }
        if let Some(v) = self.btime_ms {
            parts.push(format!("btime {v}"));
        }
        if let Some(v) = self.winc_ms {
            parts.push(format!("winc {v}"));
        }
        if let Some(v) = self.binc_ms {
            parts.push(format!("binc {v}"));
        }
        if let Some(v) = self.movetime_ms {
            parts.push(format!("movetime {v}"));
        }
        parts.join(" ")
    }
}

/// A handshaken, ready-to-drive UCI engine session.
pub struct EngineDialogue {
    channel: EngineChannel,
    identification: HashMap<String, String>,
    supported_variants: HashSet<String>,
}

/// Parse one `id <key> <value...>` line into a `(key, value)` pair.
fn parse_id_line(line: &str) -> Option<(String, String)> {
    let rest = line.strip_prefix("id ")?;
    let (key, value) = rest.split_once(char::is_whitespace)?;
    Some((key.to_string(), value.trim().to_string()))
}

/// Parse `option name UCI_Variant type combo default chess var X var Y ...` into the set
/// of variant names the engine supports. Any other `option` line yields an empty set.
fn parse_variant_option_line(line: &str) -> HashSet<String> {
    let mut variants = HashSet::new();
    let mut tokens = line.split_whitespace().peekable();
    let Some(&"option") = tokens.peek() else { return variants };
    tokens.next();
    let Some(&"name") = tokens.peek() else { return variants };
    tokens.next();
    let Some(&"UCI_Variant") = tokens.peek() else { return variants };
    tokens.next();

    while let Some(tok) = tokens.next() {
        if tok == "var" {
            if let Some(name) = tokens.next() {
                variants.insert(name.to_string());
            }
        }
    }
    variants
}

impl EngineDialogue {
    /// Spawn `command` and perform the `uci`/`uciok` then `isready`/`readyok` handshake,
    /// accumulating engine identification and the supported-variants set along the way.
    pub async fn start(command: &str, dir: Option<&Path>) -> Result<Self, DialogueError> {
        let mut channel = EngineChannel::spawn(command, dir).await?;
        channel.write_line("uci").await?;

        let mut identification = HashMap::new();
        let mut supported_variants = HashSet::new();

        let handshake = tokio::time::timeout(UCI_HANDSHAKE_TIMEOUT, async {
            loop {
                match channel.next_line().await? {
                    Some(line) if line.trim() == "uciok" => return Ok(()),
                    Some(line) if line.starts_with("id ") => {
                        if let Some((k, v)) = parse_id_line(&line) {
                            identification.insert(k, v);
                        }
                        continue;
                    }
                    Some(line) if line.starts_with("option ") => {
                        supported_variants.extend(parse_variant_option_line(&line));
                        continue;
                    }
                    Some(_) => continue,
                    None => return Err(DialogueError::Closed),
                }
            }
        })
        .await;
        match handshake {
            Ok(result) => result?,
            Err(_) => return Err(DialogueError::HandshakeTimeout(UCI_HANDSHAKE_TIMEOUT)),
        }

        let mut dialogue = Self { channel, identification, supported_variants };
        dialogue.sync_ready().await?;
        Ok(dialogue)
    }

    /// Engine identification accumulated from `id <key> <value>` lines during the
    /// handshake (typically at least `name` and `author`).
    pub fn identification(&self) -> &HashMap<String, String> {
        &self.identification
    }

    /// Variant names advertised by the engine's `UCI_Variant` combo option.
    pub fn supported_variants(&self) -> &HashSet<String> {
        &self.supported_variants
    }

    /// Send `isready` and block until `readyok`. Used after the handshake and after every
    /// batch of `setoption` commands, matching engines that apply options asynchronously.
    pub async fn sync_ready(&mut self) -> Result<(), DialogueError> {
        self.channel.write_line("isready").await?;
        let wait = tokio::time::timeout(READY_TIMEOUT, async {
            loop {
                match self.channel.next_line().await? {
                    Some(line) if line.trim() == "readyok" => return Ok(()),
                    Some(_) => continue,
                    None => return Err(DialogueError::Closed),
                }
            }
        })
        .await;
        match wait {
            Ok(result) => result,
            Err(_) => Err(DialogueError::ReadyTimeout(READY_TIMEOUT)),
        }
    }

    pub async fn set_option(&mut self, name: &str, value: &str) -> Result<(), DialogueError> {
        self.channel
            .write_line(&format!("setoption name {name} value {value}"))
            .await?;
        Ok(())
    }

    pub async fn set_position(&mut self, fen: &str, moves: &[String]) -> Result<(), DialogueError> {
        let line = if moves.is_empty() {
            format!("position fen {fen}")
        } else {
            format!("position fen {fen} moves {}", moves.join(" "))
        };
        self.channel.write_line(&line).await?;
        Ok(())
    }

    pub async fn go(&mut self, limits: GoLimits) -> Result<(), DialogueError> {
        self.channel.write_line(&limits.to_command()).await?;
        Ok(())
    }

    pub async fn stop(&mut self) -> Result<(), DialogueError> {
        self.channel.write_line("stop").await?;
        Ok(())
    }

    pub async fn ucinewgame(&mut self) -> Result<(), DialogueError> {
        self.channel.write_line("ucinewgame").await?;
        Ok(())
    }

    /// Read the next raw output line from the engine.
    pub async fn next_line(&mut self) -> Result<Option<String>, DialogueError> {
        Ok(self.channel.next_line().await?)
    }

    /// Drive a single search to completion: send `go`, accumulate `info` lines into a
    /// [`SearchInfo`] snapshot, and return it together with the terminating `bestmove`
    /// (already normalized, so a literal `(none)` surfaces as `None`) and `ponder`.
    ///
    /// If the running score becomes an exact mate-in-0 at `multipv` 1, `stop` is sent
    /// immediately; any further `info` lines before `bestmove` are superfluous and are
    /// folded into the snapshot like any other, and the engine is resynchronized with
    /// `isready` once `bestmove` arrives.
    pub async fn run_search(
        &mut self,
        limits: GoLimits,
    ) -> Result<(SearchInfo, Option<String>, Option<String>), DialogueError> {
        self.go(limits).await?;

        let mut info = SearchInfo::default();
        let mut stopped = false;
        loop {
            let line = match self.next_line().await? {
                Some(line) => line,
                None => return Err(DialogueError::Closed),
            };
            if let Some((bestmove, ponder)) = parse_bestmove_line(&line) {
                if stopped {
                    self.sync_ready().await?;
                }
                return Ok((info, bestmove, ponder));
            }

            apply_info_line(&mut info, &line);

            if !stopped {
                let is_mate_zero = info
                    .score
                    .is_some_and(|s| s.is_exact() && s.mate_value() == Some(0));
                if is_mate_zero && info.multipv.unwrap_or(1) == 1 {
                    self.stop().await?;
                    stopped = true;
                }
            }
        }
    }

    /// Send `quit`, then force-kill if the engine does not exit promptly.
    pub async fn shutdown(self) {
        self.channel.shutdown(SHUTDOWN_GRACE).await;
    }

    /// Terminate the engine immediately, without attempting `quit` first. Used when the
    /// engine is already known to be misbehaving (e.g. it just closed its output stream).
    pub async fn kill(&mut self) {
        self.channel.kill().await;
    }

    pub fn pid(&self) -> Option<u32> {
        self.channel.id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_id_name_and_author() {
        assert_eq!(
            parse_id_line("id name Stockfish 16"),
            Some(("name".to_string(), "Stockfish 16".to_string()))
        );
        assert_eq!(
            parse_id_line("id author the Stockfish developers"),
            Some(("author".to_string(), "the Stockfish developers".to_string()))
        );
    }

    #[test]
    fn parses_uci_variant_option_line() {
        let line = "option name UCI_Variant type combo default chess var chess var crazyhouse var atomic";
        let variants = parse_variant_option_line(line);
        assert_eq!(variants.len(), 3);
        assert!(variants.contains("chess"));
        assert!(variants.contains("crazyhouse"));
        assert!(variants.contains("atomic"));
    }

    #[test]
    fn non_variant_option_lines_yield_no_variants() {
        assert!(parse_variant_option_line("option name Hash type spin default 16").is_empty());
    }

    #[test]
    fn go_limits_formats_relevant_subset() {
        let limits = GoLimits { movetime_ms: Some(100), depth: Some(5), ..Default::default() };
        assert_eq!(limits.to_command(), "go depth 5 movetime 100");
    }

    #[test]
    fn go_limits_formats_clock() {
        let limits = GoLimits {
            wtime_ms: Some(60_000),
            btime_ms: Some(55_000),
            winc_ms: Some(1_000),
            binc_ms: Some(1_000),
            ..Default::default()
        };
        assert_eq!(limits.to_command(), "go wtime 60000 btime 55000 winc 1000 binc 1000");
    }
}
