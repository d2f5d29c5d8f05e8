mod cli;
mod shutdown;
mod systemd;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use fishnet_core::config::{self, default_config_path};
use fishnet_core::ClientIdentity;
use fishnet_engine::{EngineEvent, SupervisorConfig, SupervisorOutcome, Transport};

use crate::cli::{Cli, Command, GlobalArgs};
use crate::shutdown::{spawn_signal_handlers, ShutdownController, ShutdownEvent};

/// Exit codes shared by every subcommand that can fail: `0` success, `70` update
/// required, `78` configuration error.
const EXIT_UPDATE_REQUIRED: i32 = 70;
const EXIT_CONFIG_ERROR: i32 = 78;

const STATS_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let code = dispatch(cli).await;
    std::process::exit(code);
}

async fn dispatch(cli: Cli) -> i32 {
    match cli.command.clone().unwrap_or(Command::Run) {
        Command::Run => run(cli.global).await,
        Command::Configure => configure(cli.global).await,
        Command::Systemd => {
            print_systemd_unit(&cli.global);
            0
        }
        Command::Cpuid => {
            print_cpuid();
            0
        }
    }
}

fn config_error_exit(err: impl std::fmt::Display) -> i32 {
    eprintln!("configuration error: {err}");
    EXIT_CONFIG_ERROR
}

async fn run(global: GlobalArgs) -> i32 {
    let cfg = match config::resolve(global.conf_path(), global.to_overrides()) {
        Ok(cfg) => cfg,
        Err(err) => return config_error_exit(err),
    };

    // `-vvv` (or higher) turns on the raw engine send/recv transcript.
    fishnet_engine::uci::set_engine_log_level(global.verbose.saturating_sub(2));

    let identity = ClientIdentity::current();
    println!(
        "fishnet {} ({}-{}), endpoint {}",
        identity.version, identity.os, identity.arch, cfg.endpoint
    );
    println!(
        "cores={} memory={}MiB threads-per-process={} fixed-backoff={}",
        cfg.cores, cfg.memory_mb, cfg.threads_per_process, cfg.fixed_backoff
    );

    let supervisor_cfg = SupervisorConfig {
        identity,
        threads_per_process: cfg.threads_per_process,
        extra_options: cfg.engine_options.clone(),
        config: cfg,
        stats_interval: STATS_INTERVAL,
        auto_update: global.auto_update,
    };

    let engine = fishnet_engine::start_engine(supervisor_cfg);
    let mut events = engine.subscribe();

    let shutdown = Arc::new(ShutdownController::new());
    let (shutdown_tx, mut shutdown_rx) = tokio::sync::mpsc::unbounded_channel::<ShutdownEvent>();
    spawn_signal_handlers(shutdown, shutdown_tx);

    println!("Running (Ctrl+C to stop; twice to stop immediately) ...");

    let verbose = global.verbose;
    let mut forced_update_required = false;

    loop {
        tokio::select! {
            ev = shutdown_rx.recv() => {
                match ev {
                    Some(ShutdownEvent::Graceful) => {
                        println!("Stop requested: finishing current jobs, no new work will be acquired.");
                        engine.request_stop_soon();
                    }
                    Some(ShutdownEvent::Immediate) => {
                        println!("Stop requested again: killing engines and aborting in-flight jobs.");
                        engine.request_stop_now();
                    }
                    Some(ShutdownEvent::UpdateRequired) => {
                        println!("Update requested: stopping to pick up a new build.");
                        forced_update_required = true;
                        engine.request_stop_now();
                    }
                    None => {}
                }
            }
            ev = events.recv() => {
                match ev {
                    Ok(event) => {
                        let is_stopped = matches!(event, EngineEvent::Stopped);
                        print_engine_event(event, verbose);
                        if is_stopped {
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    match engine.wait().await {
        Ok(SupervisorOutcome::Normal) if forced_update_required => EXIT_UPDATE_REQUIRED,
        Ok(SupervisorOutcome::Normal) => 0,
        Ok(SupervisorOutcome::UpdateRequired) => EXIT_UPDATE_REQUIRED,
        Err(err) => {
            eprintln!("fatal: {err:#}");
            1
        }
    }
}

fn print_engine_event(event: EngineEvent, verbose: u8) {
    match event {
        EngineEvent::Started => {
            if verbose >= 1 {
                println!("supervisor started");
            }
        }
        EngineEvent::StopRequested => {
            if verbose >= 1 {
                println!("stop requested");
            }
        }
        EngineEvent::WorkerStage { worker_idx, stage } => {
            if verbose >= 2 {
                println!("worker {worker_idx}: {stage:?}");
            }
        }
        EngineEvent::WorkerJobStarted { worker_idx, job } => {
            if verbose >= 1 {
                let label = job.game_id.as_deref().unwrap_or(&job.id);
                println!("worker {worker_idx}: {} {} ({label})", job.kind, job.variant);
            }
        }
        EngineEvent::WorkerJobFinished { worker_idx, job_id, error } => match error {
            Some(err) => eprintln!("worker {worker_idx}: job {job_id} failed: {err}"),
            None if verbose >= 1 => println!("worker {worker_idx}: job {job_id} done"),
            None => {}
        },
        EngineEvent::StatsTick { positions_done, nodes_done, at } => {
            let timestamp = chrono::DateTime::from_timestamp(at, 0)
                .map(|dt| dt.to_rfc3339())
                .unwrap_or_default();
            println!("{timestamp}: {positions_done} positions, {nodes_done} nodes done");
        }
        EngineEvent::Warning { message } => eprintln!("warning: {message}"),
        EngineEvent::Error { message } => eprintln!("error: {message}"),
        EngineEvent::UpdateRequired { message } => println!("update required: {message}"),
        EngineEvent::Stopped => {
            if verbose >= 1 {
                println!("supervisor stopped");
            }
        }
    }
}

async fn configure(global: GlobalArgs) -> i32 {
    let existing = match config::resolve(global.conf_path(), global.to_overrides()) {
        Ok(cfg) => cfg,
        Err(err) => return config_error_exit(err),
    };

    let cfg = match config::prompt_configure(&existing) {
        Ok(cfg) => cfg,
        Err(err) => {
            eprintln!("configuration error: failed to read prompt input: {err}");
            return EXIT_CONFIG_ERROR;
        }
    };

    if let Some(key) = &cfg.key {
        let identity = ClientIdentity::current();
        match Transport::new(cfg.endpoint.clone(), identity, cfg.key.clone()) {
            Ok(transport) => match transport.validate_key(key).await {
                Ok(true) => println!("Key accepted."),
                Ok(false) => println!("Warning: the coordinator rejected this key."),
                Err(err) => println!("Warning: could not validate key ({err})."),
            },
            Err(err) => println!("Warning: could not validate key ({err})."),
        }
    }

    let path = match &global.conf {
        Some(path) => path.clone(),
        None => match default_config_path() {
            Ok(path) => path,
            Err(err) => return config_error_exit(err),
        },
    };

    if let Err(err) = config::save_ini(&path, &cfg) {
        return config_error_exit(err);
    }

    println!("Wrote configuration to {}", path.display());
    0
}

fn print_systemd_unit(global: &GlobalArgs) {
    let exe = std::env::current_exe()
        .ok()
        .and_then(|p| p.to_str().map(str::to_string))
        .unwrap_or_else(|| "fishnet".to_string());
    print!("{}", systemd::render(&exe, global));
}

fn print_cpuid() {
    let cpu = fishnet_core::detect_cpu();
    let tier = fishnet_core::cpu::best_build_tier();
    let report = serde_json::json!({
        "vendor": cpu.vendor,
        "modern": cpu.modern,
        "bmi2": cpu.bmi2,
        "recommended_build": tier.as_str(),
    });
    println!("{}", serde_json::to_string_pretty(&report).expect("cpuid report serializes"));
}
