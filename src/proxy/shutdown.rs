use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::signal;
use tokio::sync::Notify;

/// What ended the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    Interrupt,
    Terminate,
    Requested,
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownReason::Interrupt => write!(f, "Ctrl-C"),
            ShutdownReason::Terminate => write!(f, "SIGTERM"),
            ShutdownReason::Requested => write!(f, "shutdown requested"),
        }
    }
}

/// Resolves the server's graceful-shutdown future on Ctrl-C, SIGTERM or
/// [`request`](Self::request).
#[derive(Default)]
pub struct ShutdownManager {
    requested: AtomicBool,
    notify: Notify,
}

impl ShutdownManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn wait(&self) -> std::io::Result<ShutdownReason> {
        let requested = self.notify.notified();
        if self.is_requested() {
            return Ok(ShutdownReason::Requested);
        }

        #[cfg(unix)]
        let reason = {
            let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;
            tokio::select! {
                _ = signal::ctrl_c() => ShutdownReason::Interrupt,
                _ = sigterm.recv() => ShutdownReason::Terminate,
                _ = requested => ShutdownReason::Requested,
            }
        };

        #[cfg(not(unix))]
        let reason = tokio::select! {
            _ = signal::ctrl_c() => ShutdownReason::Interrupt,
            _ = requested => ShutdownReason::Requested,
        };

        self.requested.store(true, Ordering::SeqCst);
        tracing::info!(%reason, "Stopping proxy, draining in-flight requests");
        Ok(reason)
    }

    pub fn request(&self) {
        self.requested.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }
}
