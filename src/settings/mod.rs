//! Durable storage for the rotation state.
//!
//! The settings file is a JSON object keyed by extension identifier; each
//! store owns exactly one key and leaves the others alone.

mod file;
mod saver;

use std::path::PathBuf;

use parking_lot::Mutex;
use thiserror::Error;

use crate::rotation::RotationState;

pub use file::JsonFileStore;
pub use saver::DebouncedSaver;

/// Default key inside the settings file.
pub const DEFAULT_SETTINGS_KEY: &str = "api-rotator";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Failed to access settings file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode settings: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Load/save collaborator for `RotationState`.
pub trait SettingsStore: Send + Sync {
    /// Load the stored state, filling missing fields with defaults.
    fn load(&self) -> Result<RotationState, SettingsError>;

    fn save(&self, state: &RotationState) -> Result<(), SettingsError>;
}

/// Receives a snapshot after every rotation mutation. Never fails: saving is
/// fire-and-forget from the rotator's point of view.
pub trait StateSink: Send + Sync {
    fn persist(&self, state: &RotationState);
}

/// Sink for rotators that live only in memory.
pub struct NoopSink;

impl StateSink for NoopSink {
    fn persist(&self, _state: &RotationState) {}
}

/// In-memory store, used by embedders without a filesystem and by tests.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    state: Option<RotationState>,
    saves: usize,
}

impl MemoryStore {
    /// Number of saves performed so far.
    pub fn save_count(&self) -> usize {
        self.inner.lock().saves
    }
}

impl SettingsStore for MemoryStore {
    fn load(&self) -> Result<RotationState, SettingsError> {
        Ok(self.inner.lock().state.clone().unwrap_or_default())
    }

    fn save(&self, state: &RotationState) -> Result<(), SettingsError> {
        let mut inner = self.inner.lock();
        inner.state = Some(state.clone());
        inner.saves += 1;
        Ok(())
    }
}

impl StateSink for MemoryStore {
    fn persist(&self, state: &RotationState) {
        let _ = self.save(state);
    }
}
