//! Shared, reloadable application config.

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::config::loader::ConfigError;
use crate::config::types::Config;

/// Config handle shared by the server, the dispatcher and the transport.
///
/// Readers get an `Arc` snapshot, so a long failover loop keeps the bounds
/// it started with while a reload swaps in new ones for the next request.
#[derive(Clone)]
pub struct ConfigStore {
    current: Arc<RwLock<Arc<Config>>>,
    source: PathBuf,
}

impl ConfigStore {
    pub fn new(config: Config, source: PathBuf) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(config))),
            source,
        }
    }

    pub fn get(&self) -> Arc<Config> {
        self.current.read().clone()
    }

    /// Swap in `config` after validating it. An invalid config is rejected
    /// and the current one stays in effect.
    pub fn replace(&self, config: Config) -> Result<(), ConfigError> {
        config.validate()?;
        let failover_changed = self.current.read().failover != config.failover;
        *self.current.write() = Arc::new(config);
        if failover_changed {
            tracing::info!(source = %self.source.display(), "Failover settings changed");
        }
        Ok(())
    }

    /// Re-read the source file. Keeps the current config on any error.
    pub fn reload(&self) -> Result<(), ConfigError> {
        let config = Config::load_from(&self.source)?;
        self.replace(config)
    }

    /// Reload on every SIGHUP for as long as the returned task runs.
    #[cfg(unix)]
    pub fn spawn_reload_on_hangup(&self) -> std::io::Result<tokio::task::JoinHandle<()>> {
        use tokio::signal::unix::{signal, SignalKind};

        let mut hangups = signal(SignalKind::hangup())?;
        let store = self.clone();
        Ok(tokio::spawn(async move {
            while hangups.recv().await.is_some() {
                match store.reload() {
                    Ok(()) => tracing::info!(source = %store.source.display(), "Config reloaded"),
                    Err(e) => tracing::warn!(error = %e, "Config reload failed, keeping current config"),
                }
            }
        }))
    }
}
