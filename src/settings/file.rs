use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use serde_json::{Map, Value};

use super::{SettingsError, SettingsStore, StateSink};
use crate::rotation::{Endpoint, EndpointId, RotationState};

/// JSON settings file shared by key.
pub struct JsonFileStore {
    path: PathBuf,
    key: String,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>, key: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            key: key.into(),
        }
    }

    /// `~/.config/api-rotator/settings.json` on Unix, the platform
    /// equivalent elsewhere, or the current directory as a last resort.
    pub fn default_path() -> PathBuf {
        let config_dir = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        config_dir.join("api-rotator").join("settings.json")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> SettingsError {
        SettingsError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn lock_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".lock");
        PathBuf::from(name)
    }

    fn read_map(&self) -> Result<Option<Map<String, Value>>, SettingsError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io_error(e)),
        };

        match serde_json::from_str::<Value>(&content) {
            Ok(Value::Object(map)) => Ok(Some(map)),
            Ok(_) => {
                tracing::warn!(path = %self.path.display(), "Settings file is not a JSON object, ignoring it");
                Ok(None)
            }
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Settings file is not valid JSON, ignoring it");
                Ok(None)
            }
        }
    }
}

/// Decode a stored settings object, keeping whatever is usable.
///
/// Unknown or mistyped top-level fields fall back to their defaults and
/// endpoint entries that cannot be decoded are dropped individually.
pub(crate) fn decode_state(value: Value) -> RotationState {
    let Value::Object(mut object) = value else {
        tracing::warn!("Stored settings are not an object, using defaults");
        return RotationState::default();
    };

    let entries = match object.remove("apiList") {
        Some(Value::Array(entries)) => entries,
        Some(_) => {
            tracing::warn!("Stored apiList is not an array, ignoring it");
            Vec::new()
        }
        None => Vec::new(),
    };

    let mut state = RotationState::default();
    for (field, value) in object {
        let mut single = Map::new();
        single.insert(field.clone(), value);
        match serde_json::from_value::<RotationState>(Value::Object(single)) {
            Ok(parsed) => match field.as_str() {
                "cursor" => state.cursor = parsed.cursor,
                "mode" => state.mode = parsed.mode,
                "switchPolicy" => state.switch_policy = parsed.switch_policy,
                "enabled" => state.enabled = parsed.enabled,
                "lastPick" => state.last_pick = parsed.last_pick,
                _ => {}
            },
            Err(e) => {
                tracing::warn!(field = %field, error = %e, "Ignoring malformed settings field");
            }
        }
    }

    for (index, entry) in entries.into_iter().enumerate() {
        let decoded = serde_json::from_value::<Endpoint>(entry)
            .map_err(|e| e.to_string())
            .and_then(|endpoint| endpoint.revalidated().map_err(|e| e.to_string()));
        match decoded {
            Ok(mut endpoint) => {
                // Duplicate id in a hand-edited file: keep the entry, not the id.
                if state.find(&endpoint.id).is_some() {
                    endpoint.id = EndpointId::new();
                }
                state.endpoints.push(endpoint);
            }
            Err(e) => {
                tracing::warn!(index, error = %e, "Dropping malformed endpoint entry");
            }
        }
    }

    state
}

impl SettingsStore for JsonFileStore {
    fn load(&self) -> Result<RotationState, SettingsError> {
        let Some(mut map) = self.read_map()? else {
            return Ok(RotationState::default());
        };
        match map.remove(&self.key) {
            Some(value) => Ok(decode_state(value)),
            None => Ok(RotationState::default()),
        }
    }

    fn save(&self, state: &RotationState) -> Result<(), SettingsError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
            }
        }

        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(self.lock_path())
            .map_err(|e| self.io_error(e))?;
        lock.lock_exclusive().map_err(|e| self.io_error(e))?;

        let result = self.write_locked(state);

        let _ = FileExt::unlock(&lock);
        result
    }
}

impl JsonFileStore {
    fn write_locked(&self, state: &RotationState) -> Result<(), SettingsError> {
        let mut map = self.read_map()?.unwrap_or_default();
        map.insert(self.key.clone(), serde_json::to_value(state)?);
        let content = serde_json::to_string_pretty(&Value::Object(map))?;

        let mut tmp_name = self.path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);

        {
            use std::io::Write;
            let mut file = File::create(&tmp_path).map_err(|e| self.io_error(e))?;
            file.write_all(content.as_bytes())
                .map_err(|e| self.io_error(e))?;
            file.sync_all().map_err(|e| self.io_error(e))?;
        }
        fs::rename(&tmp_path, &self.path).map_err(|e| self.io_error(e))?;

        tracing::debug!(path = %self.path.display(), endpoints = state.endpoints.len(), "Settings saved");
        Ok(())
    }
}

impl StateSink for JsonFileStore {
    fn persist(&self, state: &RotationState) {
        if let Err(e) = self.save(state) {
            tracing::warn!(error = %e, "Failed to save rotation settings");
        }
    }
}
