//! Layered configuration: built-in defaults, an INI file, environment variables, and
//! finally CLI flags, each overriding the last. The file format and its location follow
//! the XDG base-directory convention, generalizing the config-path resolution used
//! elsewhere in this workspace for other small on-disk settings files.

use std::path::{Path, PathBuf};

use configparser::ini::Ini;
use serde::{Deserialize, Serialize};
use url::Url;

const SECTION: &str = "fishnet";
/// INI section whose keys are passed straight through as engine `setoption` commands.
const ENGINE_OPTIONS_SECTION: &str = "stockfish";
const DEFAULT_ENDPOINT: &str = "https://lichess.org/fishnet/";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not determine a config directory: {0}")]
    NoConfigDir(String),
    #[error("failed to read {path}: {source}")]
    Read { path: PathBuf, #[source] source: std::io::Error },
    #[error("failed to write {path}: {source}")]
    Write { path: PathBuf, #[source] source: std::io::Error },
    #[error("failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },
    #[error("invalid value for {field}: {value:?}")]
    InvalidValue { field: &'static str, value: String },
    #[error("no key configured; run `fishnet configure` or pass --key")]
    MissingKey,
}

/// Fully resolved client configuration, after merging every layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FishnetConfig {
    pub key: Option<String>,
    pub endpoint: String,
    pub cores: usize,
    pub memory_mb: u64,
    /// Working directory the engine command is spawned in (`EngineDir`).
    pub engine_dir: Option<PathBuf>,
    /// Engine command line (`StockfishCommand`).
    pub engine_command: Option<String>,
    /// Hint for the number of threads per engine process (`Threads`).
    pub threads_per_process: u32,
    pub fixed_backoff: bool,
    /// Extra `[Stockfish]`-section UCI options, passed straight through to `setoption`.
    pub engine_options: Vec<(String, String)>,
}

const DEFAULT_THREADS_PER_PROCESS: u32 = 1;

impl Default for FishnetConfig {
    fn default() -> Self {
        Self {
            key: None,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            cores: default_cores(),
            memory_mb: 1024,
            engine_dir: None,
            engine_command: None,
            threads_per_process: DEFAULT_THREADS_PER_PROCESS,
            fixed_backoff: false,
            engine_options: Vec::new(),
        }
    }
}

fn default_cores() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1).max(1)
}

/// Overrides supplied on the command line; `None` fields fall through to the layers
/// beneath (INI file, then environment, then built-in defaults).
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub key: Option<String>,
    pub endpoint: Option<String>,
    pub cores: Option<usize>,
    pub memory_mb: Option<u64>,
    pub engine_dir: Option<PathBuf>,
    pub engine_command: Option<String>,
    pub threads_per_process: Option<u32>,
    pub fixed_backoff: Option<bool>,
    /// `--setoption NAME VALUE`, repeatable; appended after whatever the INI file set.
    pub extra_options: Vec<(String, String)>,
}

fn xdg_config_home() -> Result<PathBuf, ConfigError> {
    if let Some(dir) = std::env::var_os("XDG_CONFIG_HOME") {
        let dir = PathBuf::from(dir);
        if dir.as_os_str().is_empty() {
            return Err(ConfigError::NoConfigDir("XDG_CONFIG_HOME is set but empty".into()));
        }
        return Ok(dir);
    }

    let home = std::env::var_os("HOME")
        .ok_or_else(|| ConfigError::NoConfigDir("HOME is not set".into()))?;
    let home = PathBuf::from(home);
    if home.as_os_str().is_empty() {
        return Err(ConfigError::NoConfigDir("HOME is set but empty".into()));
    }
    Ok(home.join(".config"))
}

/// Default path of the INI config file: `$XDG_CONFIG_HOME/fishnet/config.ini`.
pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    Ok(xdg_config_home()?.join("fishnet").join("config.ini"))
}

fn parse_bool(value: &str, field: &'static str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::InvalidValue { field, value: other.to_string() }),
    }
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() { None } else { Some(trimmed.to_string()) }
}

/// Load the INI file at `path`, if it exists, applying it on top of `base`.
fn apply_ini_file(base: &mut FishnetConfig, path: &Path) -> Result<(), ConfigError> {
    if !path.exists() {
        return Ok(());
    }
    let mut ini = Ini::new();
    ini.load(path).map_err(|message| ConfigError::Parse { path: path.to_path_buf(), message })?;

    if let Some(v) = ini.get(SECTION, "key").and_then(non_empty) {
        base.key = Some(v);
    }
    if let Some(v) = ini.get(SECTION, "endpoint").and_then(non_empty) {
        base.endpoint = v;
    }
    if let Some(v) = ini.get(SECTION, "cores") {
        base.cores = v.trim().parse().map_err(|_| ConfigError::InvalidValue {
            field: "cores",
            value: v,
        })?;
    }
    if let Some(v) = ini.get(SECTION, "memory") {
        base.memory_mb = v.trim().parse().map_err(|_| ConfigError::InvalidValue {
            field: "memory",
            value: v,
        })?;
    }
    if let Some(v) = ini.get(SECTION, "enginedir").and_then(non_empty) {
        base.engine_dir = Some(PathBuf::from(v));
    }
    if let Some(v) = ini.get(SECTION, "stockfishcommand").and_then(non_empty) {
        base.engine_command = Some(v);
    }
    if let Some(v) = ini.get(SECTION, "threads") {
        base.threads_per_process = v.trim().parse().map_err(|_| ConfigError::InvalidValue {
            field: "threads",
            value: v,
        })?;
    }
    if let Some(v) = ini.get(SECTION, "fixedbackoff") {
        base.fixed_backoff = parse_bool(&v, "fixed_backoff")?;
    }
    if let Some(options) = ini.get_map_ref().get(ENGINE_OPTIONS_SECTION) {
        for (name, value) in options {
            if let Some(value) = value.clone() {
                base.engine_options.push((name.clone(), value));
            }
        }
    }
    Ok(())
}

/// Apply `FISHNET_*` environment variables on top of `base`.
fn apply_env(base: &mut FishnetConfig) -> Result<(), ConfigError> {
    if let Ok(v) = std::env::var("FISHNET_KEY") {
        if let Some(v) = non_empty(v) {
            base.key = Some(v);
        }
    }
    if let Ok(v) = std::env::var("FISHNET_ENDPOINT") {
        if let Some(v) = non_empty(v) {
            base.endpoint = v;
        }
    }
    if let Ok(v) = std::env::var("FISHNET_CORES") {
        base.cores = v.trim().parse().map_err(|_| ConfigError::InvalidValue {
            field: "cores",
            value: v,
        })?;
    }
    if let Ok(v) = std::env::var("FISHNET_MEMORY") {
        base.memory_mb = v.trim().parse().map_err(|_| ConfigError::InvalidValue {
            field: "memory",
            value: v,
        })?;
    }
    Ok(())
}

fn apply_overrides(base: &mut FishnetConfig, overrides: ConfigOverrides) {
    if let Some(v) = overrides.key {
        base.key = Some(v);
    }
    if let Some(v) = overrides.endpoint {
        base.endpoint = v;
    }
    if let Some(v) = overrides.cores {
        base.cores = v;
    }
    if let Some(v) = overrides.memory_mb {
        base.memory_mb = v;
    }
    if let Some(v) = overrides.engine_dir {
        base.engine_dir = Some(v);
    }
    if let Some(v) = overrides.engine_command {
        base.engine_command = Some(v);
    }
    if let Some(v) = overrides.threads_per_process {
        base.threads_per_process = v;
    }
    if let Some(v) = overrides.fixed_backoff {
        base.fixed_backoff = v;
    }
    base.engine_options.extend(overrides.extra_options);
}

/// Resolve the final configuration: defaults, then the INI file at `conf_path` (or the
/// XDG default if `conf_path` is `None`), then environment variables, then `overrides`.
///
/// Pass `conf_path = Some(None)` to explicitly skip the file layer (`--no-conf`).
pub fn resolve(
    conf_path: Option<Option<&Path>>,
    overrides: ConfigOverrides,
) -> Result<FishnetConfig, ConfigError> {
    let mut cfg = FishnetConfig::default();

    match conf_path {
        Some(Some(explicit)) => apply_ini_file(&mut cfg, explicit)?,
        Some(None) => {}
        None => {
            let default_path = default_config_path()?;
            apply_ini_file(&mut cfg, &default_path)?;
        }
    }

    apply_env(&mut cfg)?;
    apply_overrides(&mut cfg, overrides);

    cfg.endpoint = normalize_endpoint(&cfg.endpoint)?;
    Ok(cfg)
}

fn normalize_endpoint(raw: &str) -> Result<String, ConfigError> {
    let mut url = Url::parse(raw)
        .map_err(|_| ConfigError::InvalidValue { field: "endpoint", value: raw.to_string() })?;
    if !url.path().ends_with('/') {
        url.set_path(&format!("{}/", url.path()));
    }
    Ok(url.to_string())
}

/// Write `cfg` to `path` as an INI file, creating parent directories and replacing the
/// file atomically (write to a temp file, then rename).
pub fn save_ini(path: &Path, cfg: &FishnetConfig) -> Result<(), ConfigError> {
    let dir = path.parent().ok_or_else(|| ConfigError::NoConfigDir(format!("invalid config path: {}", path.display())))?;
    std::fs::create_dir_all(dir).map_err(|source| ConfigError::Write { path: path.to_path_buf(), source })?;

    let mut ini = Ini::new();
    if let Some(key) = &cfg.key {
        ini.set(SECTION, "key", Some(key.clone()));
    }
    ini.set(SECTION, "endpoint", Some(cfg.endpoint.clone()));
    ini.set(SECTION, "cores", Some(cfg.cores.to_string()));
    ini.set(SECTION, "memory", Some(cfg.memory_mb.to_string()));
    if let Some(dir) = &cfg.engine_dir {
        ini.set(SECTION, "enginedir", Some(dir.display().to_string()));
    }
    if let Some(engine) = &cfg.engine_command {
        ini.set(SECTION, "stockfishcommand", Some(engine.clone()));
    }
    ini.set(SECTION, "threads", Some(cfg.threads_per_process.to_string()));
    ini.set(SECTION, "fixedbackoff", Some(cfg.fixed_backoff.to_string()));
    for (name, value) in &cfg.engine_options {
        ini.set(ENGINE_OPTIONS_SECTION, name, Some(value.clone()));
    }

    let tmp = path.with_extension("ini.tmp");
    ini.write(&tmp).map_err(|source| ConfigError::Write { path: tmp.clone(), source })?;
    std::fs::rename(&tmp, path).map_err(|source| ConfigError::Write { path: path.to_path_buf(), source })?;
    Ok(())
}

fn prompt_line(prompt: &str) -> std::io::Result<String> {
    use std::io::Write as _;
    let mut out = std::io::stdout();
    out.write_all(prompt.as_bytes())?;
    out.flush()?;
    let mut buf = String::new();
    std::io::stdin().read_line(&mut buf)?;
    Ok(buf.trim().to_string())
}

/// Interactive first-run wizard for the `configure` subcommand: prompts for a key and
/// core/memory budget, starting from whatever is already on disk (or the defaults).
pub fn prompt_configure(existing: &FishnetConfig) -> std::io::Result<FishnetConfig> {
    let mut cfg = existing.clone();

    println!("Fishnet setup. Press ENTER to keep the current value shown in [brackets].");

    let key_prompt = format!("Personal access key [{}]: ", cfg.key.as_deref().unwrap_or("none"));
    let key = prompt_line(&key_prompt)?;
    if !key.is_empty() {
        cfg.key = Some(key);
    }

    let cores_prompt = format!("CPU cores to use [{}]: ", cfg.cores);
    let cores = prompt_line(&cores_prompt)?;
    if let Ok(v) = cores.parse() {
        cfg.cores = v;
    }

    let memory_prompt = format!("Memory budget in MiB [{}]: ", cfg.memory_mb);
    let memory = prompt_line(&memory_prompt)?;
    if let Ok(v) = memory.parse() {
        cfg.memory_mb = v;
    }

    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_have_a_usable_endpoint() {
        let cfg = FishnetConfig::default();
        assert!(cfg.endpoint.starts_with("https://"));
        assert!(cfg.endpoint.ends_with('/'));
    }

    #[test]
    fn overrides_win_over_defaults() {
        let mut cfg = FishnetConfig::default();
        apply_overrides(&mut cfg, ConfigOverrides {
            cores: Some(7),
            fixed_backoff: Some(true),
            ..Default::default()
        });
        assert_eq!(cfg.cores, 7);
        assert!(cfg.fixed_backoff);
    }

    #[test]
    fn normalize_endpoint_appends_trailing_slash() {
        assert_eq!(normalize_endpoint("https://lichess.org/fishnet").unwrap(), "https://lichess.org/fishnet/");
    }

    #[test]
    fn normalize_endpoint_rejects_garbage() {
        assert!(normalize_endpoint("not a url").is_err());
    }
}
