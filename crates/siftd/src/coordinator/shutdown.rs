//! Two-level shutdown: drain first, force on a repeated signal.

use std::fmt;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use signal_hook::consts::signal::{SIGINT, SIGTERM};
use signal_hook::iterator::{Handle, Signals};
use tracing::info;

use super::{COORDINATOR_TARGET, CoordinatorError};

/// Shutdown level reached after a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownLevel {
    /// Finish the job in flight, then stop fetching.
    Drain,
    /// Kill the job in flight and stop.
    Force,
}

impl fmt::Display for ShutdownLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Drain => "drain",
            Self::Force => "force",
        })
    }
}

/// Shared shutdown state observed by the coordinator and its monitor.
#[derive(Debug, Clone, Default)]
pub struct ShutdownToken {
    drain: Arc<AtomicBool>,
    force: Arc<AtomicBool>,
}

impl ShutdownToken {
    /// A token with no shutdown requested.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stops the loop once the job in flight has been reported.
    pub fn request_drain(&self) {
        self.drain.store(true, Ordering::SeqCst);
    }

    /// Kills the job in flight. Implies a drain.
    pub fn request_force(&self) {
        self.drain.store(true, Ordering::SeqCst);
        self.force.store(true, Ordering::SeqCst);
    }

    /// Returns `true` once a drain (or force) was requested.
    #[must_use]
    pub fn drain_requested(&self) -> bool {
        self.drain.load(Ordering::SeqCst)
    }

    /// Returns `true` once a force shutdown was requested.
    #[must_use]
    pub fn force_requested(&self) -> bool {
        self.force.load(Ordering::SeqCst)
    }

    /// Flag raised on force shutdown, shared with the monitor.
    #[must_use]
    pub fn force_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.force)
    }

    /// Moves one level up: drain on the first call, force afterwards.
    pub fn escalate(&self) -> ShutdownLevel {
        if self.drain.swap(true, Ordering::SeqCst) {
            self.force.store(true, Ordering::SeqCst);
            ShutdownLevel::Force
        } else {
            ShutdownLevel::Drain
        }
    }
}

/// Background listener translating `SIGTERM`/`SIGINT` into shutdown requests.
///
/// Dropping the listener stops it.
#[derive(Debug)]
pub struct SignalListener {
    handle: Handle,
    thread: Option<thread::JoinHandle<()>>,
}

impl Drop for SignalListener {
    fn drop(&mut self) {
        self.handle.close();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// Installs handlers mapping the first termination signal to a drain and the
/// second to a force shutdown.
///
/// # Errors
///
/// [`CoordinatorError::Signals`] when the handlers or the listener thread
/// cannot be set up.
pub fn install_signal_handlers(token: &ShutdownToken) -> Result<SignalListener, CoordinatorError> {
    let mut signals = Signals::new([SIGTERM, SIGINT]).map_err(signal_error)?;
    let handle = signals.handle();
    let token = token.clone();
    let thread = thread::Builder::new()
        .name(String::from("shutdown-signals"))
        .spawn(move || {
            for signal in signals.forever() {
                let level = token.escalate();
                info!(
                    target: COORDINATOR_TARGET,
                    signal,
                    level = %level,
                    "shutdown signal received"
                );
            }
        })
        .map_err(signal_error)?;
    Ok(SignalListener {
        handle,
        thread: Some(thread),
    })
}

fn signal_error(source: io::Error) -> CoordinatorError {
    CoordinatorError::Signals {
        source: Arc::new(source),
    }
}
