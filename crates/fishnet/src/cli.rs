use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[cfg(feature = "prod-backend")]
const DEFAULT_ENDPOINT_HELP: &str = "compiled default: https://lichess.org/fishnet/";

#[cfg(not(feature = "prod-backend"))]
const DEFAULT_ENDPOINT_HELP: &str = "compiled default: http://127.0.0.1:8080/";

#[derive(Debug, Parser)]
#[command(name = "fishnet", version, about = "Distributed chess analysis worker")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    #[command(flatten)]
    pub global: GlobalArgs,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Start the worker pool and run until stopped (default when no subcommand is given).
    Run,
    /// Interactively set up `fishnet.ini`: personal key, CPU/memory budget.
    Configure,
    /// Print a systemd unit file for this binary to stdout.
    Systemd,
    /// Print detected CPU features as JSON and exit.
    Cpuid,
}

/// Flags shared by every subcommand; most only matter to `run`/`configure`/`systemd`,
/// which all need the resolved [`fishnet_core::FishnetConfig`].
#[derive(Debug, Clone, Args)]
pub struct GlobalArgs {
    /// Increase log verbosity; repeatable (`-v`, `-vv`).
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Opt into self-update: a newer release on the package index raises update-required.
    #[arg(long, global = true)]
    pub auto_update: bool,

    /// Path to the INI config file (default: the XDG config dir's `fishnet/config.ini`).
    #[arg(long, value_name = "PATH", global = true)]
    pub conf: Option<PathBuf>,

    /// Skip the config file layer entirely; only env vars, CLI flags, and defaults apply.
    #[arg(long, global = true, conflicts_with = "conf")]
    pub no_conf: bool,

    /// Personal access key issued by the coordinator.
    #[arg(long, global = true)]
    pub key: Option<String>,

    /// Number of CPU cores to use across the whole worker pool.
    #[arg(long, global = true)]
    pub cores: Option<usize>,

    /// Memory budget in MiB, shared across the worker pool's hash tables.
    #[arg(long, global = true)]
    pub memory: Option<u64>,

    /// Coordinator base URL.
    #[arg(long, global = true, help = DEFAULT_ENDPOINT_HELP)]
    pub endpoint: Option<String>,

    /// Working directory the engine subprocess is spawned in.
    #[arg(long = "engine-dir", value_name = "PATH", global = true)]
    pub engine_dir: Option<PathBuf>,

    /// Engine command line, e.g. `stockfish` or `/opt/engines/stockfish-avx2`.
    #[arg(long = "stockfish-command", global = true)]
    pub stockfish_command: Option<String>,

    /// Threads given to each engine process; the pool size is `cores / this`.
    #[arg(long = "threads-per-process", global = true)]
    pub threads_per_process: Option<u32>,

    /// Use a flat `[0, 3.0)` second backoff instead of the default expanding schedule.
    #[arg(long = "fixed-backoff", global = true, overrides_with = "no_fixed_backoff")]
    pub fixed_backoff: bool,

    /// Force the default expanding backoff schedule, overriding a config-file setting.
    #[arg(long = "no-fixed-backoff", global = true, overrides_with = "fixed_backoff")]
    pub no_fixed_backoff: bool,

    /// Extra engine option to apply after the handshake, e.g. `--setoption Move-Overhead 100`.
    /// Repeatable.
    #[arg(
        long = "setoption",
        global = true,
        num_args = 2,
        value_names = ["NAME", "VALUE"],
        action = clap::ArgAction::Append
    )]
    pub setoption: Vec<String>,
}

impl GlobalArgs {
    /// Tri-state read of the two `--[no-]fixed-backoff` flags: `None` when neither was
    /// passed, so the config file's own value is left alone.
    pub fn fixed_backoff_override(&self) -> Option<bool> {
        match (self.fixed_backoff, self.no_fixed_backoff) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            (false, false) => None,
        }
    }

    /// `--setoption NAME VALUE` pairs, in the order they were given.
    pub fn setoption_pairs(&self) -> Vec<(String, String)> {
        self.setoption
            .chunks_exact(2)
            .map(|pair| (pair[0].clone(), pair[1].clone()))
            .collect()
    }

    pub fn to_overrides(&self) -> fishnet_core::ConfigOverrides {
        fishnet_core::ConfigOverrides {
            key: self.key.clone(),
            endpoint: self.endpoint.clone(),
            cores: self.cores,
            memory_mb: self.memory,
            engine_dir: self.engine_dir.clone(),
            engine_command: self.stockfish_command.clone(),
            threads_per_process: self.threads_per_process,
            fixed_backoff: self.fixed_backoff_override(),
            extra_options: self.setoption_pairs(),
        }
    }

    /// `Some(explicit path)` / `Some(None)` for `--no-conf` / `None` for the XDG default,
    /// matching [`fishnet_core::config::resolve`]'s `conf_path` parameter.
    pub fn conf_path(&self) -> Option<Option<&std::path::Path>> {
        if self.no_conf {
            Some(None)
        } else if let Some(path) = &self.conf {
            Some(Some(path.as_path()))
        } else {
            None
        }
    }
}
