//! Emits a systemd unit file for this binary, so `fishnet systemd > /etc/systemd/system/fishnet.service`
//! gives an operator a working service definition without hand-writing one.

use crate::cli::GlobalArgs;

/// Render a unit file that re-invokes this binary's `run` subcommand with the same
/// flags the operator passed to `fishnet systemd`, so a saved config round-trips.
pub fn render(exe: &str, global: &GlobalArgs) -> String {
    let mut exec_start = format!("{exe} run");

    if let Some(conf) = &global.conf {
        exec_start.push_str(&format!(" --conf {}", conf.display()));
    }
    if global.no_conf {
        exec_start.push_str(" --no-conf");
    }
    if let Some(key) = &global.key {
        exec_start.push_str(&format!(" --key {key}"));
    }
    if let Some(cores) = global.cores {
        exec_start.push_str(&format!(" --cores {cores}"));
    }
    if let Some(memory) = global.memory {
        exec_start.push_str(&format!(" --memory {memory}"));
    }
    if let Some(endpoint) = &global.endpoint {
        exec_start.push_str(&format!(" --endpoint {endpoint}"));
    }
    if let Some(dir) = &global.engine_dir {
        exec_start.push_str(&format!(" --engine-dir {}", dir.display()));
    }
    if let Some(cmd) = &global.stockfish_command {
        exec_start.push_str(&format!(" --stockfish-command {cmd:?}"));
    }
    if let Some(threads) = global.threads_per_process {
        exec_start.push_str(&format!(" --threads-per-process {threads}"));
    }
    match global.fixed_backoff_override() {
        Some(true) => exec_start.push_str(" --fixed-backoff"),
        Some(false) => exec_start.push_str(" --no-fixed-backoff"),
        None => {}
    }
    for (name, value) in global.setoption_pairs() {
        exec_start.push_str(&format!(" --setoption {name:?} {value:?}"));
    }
    for _ in 0..global.verbose {
        exec_start.push_str(" -v");
    }
    if global.auto_update {
        exec_start.push_str(" --auto-update");
    }

    format!(
        "[Unit]\n\
         Description=Fishnet distributed analysis worker\n\
         After=network-online.target\n\
         Wants=network-online.target\n\
         \n\
         [Service]\n\
         ExecStart={exec_start}\n\
         Restart=always\n\
         RestartSec=10\n\
         Nice=19\n\
         \n\
         [Install]\n\
         WantedBy=multi-user.target\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_cores_and_memory_into_exec_start() {
        let global = GlobalArgs {
            verbose: 0,
            auto_update: false,
            conf: None,
            no_conf: false,
            key: None,
            cores: Some(4),
            memory: Some(2048),
            endpoint: None,
            engine_dir: None,
            stockfish_command: None,
            threads_per_process: None,
            fixed_backoff: false,
            no_fixed_backoff: false,
            setoption: Vec::new(),
        };
        let unit = render("/usr/local/bin/fishnet", &global);
        assert!(unit.contains("ExecStart=/usr/local/bin/fishnet run --cores 4 --memory 2048"));
        assert!(unit.contains("[Install]"));
    }
}
