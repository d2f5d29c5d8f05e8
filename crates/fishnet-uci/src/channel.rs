//! Spawns a UCI engine subprocess and exposes it as a line-oriented channel: write a
//! command line in, read an output line out. Stderr is drained on a background task so a
//! chatty engine can never block on a full pipe buffer.

use std::path::Path;
use std::process::Stdio;
use std::sync::LazyLock;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex as AsyncMutex;

/// Serializes `fork`/`exec` across every worker in this process; some libc allocators
/// are not safe to fork from a multi-threaded process while another fork is in flight.
static SPAWN_LOCK: LazyLock<AsyncMutex<()>> = LazyLock::new(|| AsyncMutex::new(()));

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("failed to spawn engine {command:?}: {source}")]
    Spawn { command: String, #[source] source: std::io::Error },
    #[error("engine process has no stdin pipe")]
    NoStdin,
    #[error("engine process has no stdout pipe")]
    NoStdout,
    #[error("i/o error talking to engine: {0}")]
    Io(#[from] std::io::Error),
    #[error("engine exited before completing the handshake")]
    UnexpectedExit,
}

/// A running engine process, isolated in its own process group so a forceful shutdown
/// can reap any children it spawned too.
pub struct EngineChannel {
    child: Child,
    stdin: ChildStdin,
    stdout_lines: Lines<BufReader<ChildStdout>>,
}

fn split_command(command: &str) -> Result<(String, Vec<String>), ChannelError> {
    let mut parts = command.split_whitespace();
    let program = parts
        .next()
        .ok_or_else(|| ChannelError::Spawn { command: command.to_string(), source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty engine command") })?
        .to_string();
    Ok((program, parts.map(str::to_string).collect()))
}

impl EngineChannel {
    /// Spawn `command` (a program path, optionally followed by arguments), run with
    /// `dir` as its working directory when given (so a relative `EvalFile` resolves
    /// against the engine's own directory rather than this process's).
    pub async fn spawn(command: &str, dir: Option<&Path>) -> Result<Self, ChannelError> {
        let (program, args) = split_command(command)?;

        let mut cmd = Command::new(&program);
        cmd.args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = dir {
            cmd.current_dir(dir);
        }

        #[cfg(unix)]
        {
            // Own process group: a forced shutdown can signal the whole group, not just
            // this one pid, in case the engine itself forks helpers.
            cmd.process_group(0);
        }

        let mut child = {
            let _guard = SPAWN_LOCK.lock().await;
            cmd.spawn()
                .map_err(|source| ChannelError::Spawn { command: command.to_string(), source })?
        };

        let stdin = child.stdin.take().ok_or(ChannelError::NoStdin)?;
        let stdout = child.stdout.take().ok_or(ChannelError::NoStdout)?;
        let stdout_lines = BufReader::new(stdout).lines();

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    eprintln!("[engine stderr] {line}");
                }
            });
        }

        Ok(Self { child, stdin, stdout_lines })
    }

    pub async fn write_line(&mut self, line: &str) -> Result<(), ChannelError> {
        crate::wire_log::log_sent(line);
        self.stdin.write_all(line.as_bytes()).await?;
        self.stdin.write_all(b"\n").await?;
        self.stdin.flush().await?;
        Ok(())
    }

    /// Read the next output line, or `Ok(None)` if the engine closed its stdout.
    pub async fn next_line(&mut self) -> Result<Option<String>, ChannelError> {
        let line = self.stdout_lines.next_line().await?;
        if let Some(line) = &line {
            crate::wire_log::log_received(line);
        }
        Ok(line)
    }

    /// Send `quit`, give the engine `grace` to exit on its own, then force-kill it.
    pub async fn shutdown(mut self, grace: Duration) {
        let _ = self.write_line("quit").await;
        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(Ok(_)) => {}
            _ => self.kill().await,
        }
    }

    /// Terminate the engine's whole process group immediately and wait for it to be
    /// reaped. Used when the engine is unresponsive or has already died unexpectedly.
    pub async fn kill(&mut self) {
        #[cfg(unix)]
        if let Some(pid) = self.child.id() {
            // SAFETY: killpg with a valid pid and SIGKILL has no preconditions beyond
            // the pid being a real process group leader, which spawn()'s process_group(0)
            // guarantees.
            unsafe {
                libc::killpg(pid as libc::pid_t, libc::SIGKILL);
            }
        }
        let _ = self.child.kill().await;
        let _ = self.child.wait().await;
    }

    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }
}
