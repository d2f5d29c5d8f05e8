use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use tokio::sync::mpsc;

/// Tracks how many times a shutdown has been requested, so a second interrupt can
/// collapse a graceful shutdown into an immediate one.
#[derive(Debug)]
pub struct ShutdownController {
    requests: AtomicU8,
}

#[derive(Debug, Clone, Copy)]
pub enum ShutdownEvent {
    /// Let running jobs finish; acquire no new work.
    Graceful,
    /// Kill engines and abort in-flight jobs now.
    Immediate,
    /// The coordinator (or an operator, via SIGUSR1) says this build must stop running.
    UpdateRequired,
}

impl ShutdownController {
    pub fn new() -> Self {
        Self { requests: AtomicU8::new(0) }
    }

    /// Record one more shutdown request and return the running count (1-based).
    pub fn bump(&self) -> u8 {
        self.requests.fetch_add(1, Ordering::SeqCst) + 1
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

/// Install Ctrl+C (first = graceful, second = immediate) and, on Unix, SIGTERM
/// (immediate) and SIGUSR1 (update-required) handlers, forwarding classified events to
/// `tx`. Terminate escalates straight to a hard stop; interrupt is graceful the first
/// time and immediate on any repeat.
pub fn spawn_signal_handlers(shutdown: Arc<ShutdownController>, tx: mpsc::UnboundedSender<ShutdownEvent>) {
    let ctrl_c_shutdown = shutdown.clone();
    let ctrl_c_tx = tx.clone();
    tokio::spawn(async move {
        loop {
            if tokio::signal::ctrl_c().await.is_err() {
                return;
            }
            let n = ctrl_c_shutdown.bump();
            let event = if n == 1 { ShutdownEvent::Graceful } else { ShutdownEvent::Immediate };
            if ctrl_c_tx.send(event).is_err() {
                return;
            }
        }
    });

    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        if let Ok(mut term) = signal(SignalKind::terminate()) {
            let tx = tx.clone();
            tokio::spawn(async move {
                while term.recv().await.is_some() {
                    if tx.send(ShutdownEvent::Immediate).is_err() {
                        return;
                    }
                }
            });
        }

        if let Ok(mut usr1) = signal(SignalKind::user_defined1()) {
            tokio::spawn(async move {
                while usr1.recv().await.is_some() {
                    if tx.send(ShutdownEvent::UpdateRequired).is_err() {
                        return;
                    }
                }
            });
        }
    }
}
