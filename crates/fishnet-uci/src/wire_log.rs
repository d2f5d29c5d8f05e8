//! A dedicated "engine" log level for the raw send/recv traffic on the UCI wire.
//!
//! This is a single process-wide verbosity knob the binary sets once at startup from its
//! `-v` count, and [`channel::EngineChannel`] consults on every line.

use std::sync::atomic::{AtomicU8, Ordering};

static ENGINE_LOG_LEVEL: AtomicU8 = AtomicU8::new(0);

/// Set the process-wide engine wire-traffic verbosity. `0` is silent; `1` or higher
/// prints every line sent to and received from every engine subprocess.
pub fn set_engine_log_level(level: u8) {
    ENGINE_LOG_LEVEL.store(level, Ordering::Relaxed);
}

pub(crate) fn engine_log_enabled() -> bool {
    ENGINE_LOG_LEVEL.load(Ordering::Relaxed) > 0
}

pub(crate) fn log_sent(line: &str) {
    if engine_log_enabled() {
        eprintln!("[engine >] {line}");
    }
}

pub(crate) fn log_received(line: &str) {
    if engine_log_enabled() {
        eprintln!("[engine <] {line}");
    }
}
