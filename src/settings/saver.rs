use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use super::{SettingsError, SettingsStore, StateSink};
use crate::rotation::RotationState;

/// Coalesces bursts of snapshots into one write per debounce window.
///
/// The proxy advances the cursor on every request; writing the file each
/// time would serialize requests on disk I/O. Only the latest snapshot is
/// written.
pub struct DebouncedSaver {
    tx: watch::Sender<Option<RotationState>>,
    store: Arc<dyn SettingsStore>,
}

impl DebouncedSaver {
    /// Start the background writer. Must be called inside a tokio runtime.
    pub fn spawn(store: Arc<dyn SettingsStore>, debounce: Duration) -> Self {
        let (tx, mut rx) = watch::channel::<Option<RotationState>>(None);
        let writer_store = store.clone();

        tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                tokio::time::sleep(debounce).await;
                let latest = rx.borrow_and_update().clone();
                let Some(state) = latest else {
                    continue;
                };
                let store = writer_store.clone();
                match tokio::task::spawn_blocking(move || store.save(&state)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => tracing::warn!(error = %e, "Failed to save rotation settings"),
                    Err(e) => tracing::warn!(error = %e, "Settings writer task failed"),
                }
            }
            tracing::debug!("Settings writer stopped");
        });

        Self { tx, store }
    }

    /// Write the latest snapshot now, bypassing the debounce window.
    pub fn flush(&self) -> Result<(), SettingsError> {
        let latest = self.tx.borrow().clone();
        match latest {
            Some(state) => self.store.save(&state),
            None => Ok(()),
        }
    }
}

impl StateSink for DebouncedSaver {
    fn persist(&self, state: &RotationState) {
        self.tx.send_replace(Some(state.clone()));
    }
}
