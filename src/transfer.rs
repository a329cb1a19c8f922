//! Endpoint list import/export.
//!
//! File shape: `{ "version": "..", "exportTime": "..", "apiList": [ {name,
//! endpoint, apiKey, model, enabled}, .. ] }`. Ids are not exported; every
//! imported entry gets a fresh one.
//!
//! Merge policy: append, skipping entries whose exact `(name, endpoint)`
//! pair already exists in the list or earlier in the same file.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::rotation::{Endpoint, EndpointDraft, RotationState};

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("Failed to read import file '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write export file '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Import file is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Import file has no apiList array")]
    MissingList,

    #[error("Import entry #{index} is invalid: {reason}")]
    InvalidEntry { index: usize, reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub export_time: Option<DateTime<Utc>>,
    pub api_list: Vec<ExportedEndpoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedEndpoint {
    pub name: String,
    pub endpoint: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl From<&Endpoint> for ExportedEndpoint {
    fn from(endpoint: &Endpoint) -> Self {
        Self {
            name: endpoint.name.clone(),
            endpoint: endpoint.base_url.clone(),
            api_key: endpoint.api_key.clone(),
            model: endpoint.model.clone(),
            enabled: endpoint.enabled,
        }
    }
}

impl ExportedEndpoint {
    fn to_draft(&self) -> EndpointDraft {
        EndpointDraft {
            name: self.name.clone(),
            base_url: self.endpoint.clone(),
            api_key: self.api_key.clone(),
            model: self.model.clone(),
            enabled: Some(self.enabled),
        }
    }
}

/// Result of a merge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub added: usize,
    pub skipped: usize,
}

impl ExportDocument {
    pub fn from_state(state: &RotationState) -> Self {
        Self {
            version: Some(env!("CARGO_PKG_VERSION").to_string()),
            export_time: Some(Utc::now()),
            api_list: state.endpoints.iter().map(ExportedEndpoint::from).collect(),
        }
    }

    /// Parse and validate an import document.
    ///
    /// Any invalid entry rejects the whole document so a bad file can never
    /// half-apply.
    pub fn parse(text: &str) -> Result<Self, TransferError> {
        let value: serde_json::Value = serde_json::from_str(text)?;
        if !value.get("apiList").is_some_and(|list| list.is_array()) {
            return Err(TransferError::MissingList);
        }
        let document: ExportDocument = serde_json::from_value(value)?;

        for (index, entry) in document.api_list.iter().enumerate() {
            entry
                .to_draft()
                .validated()
                .map_err(|e| TransferError::InvalidEntry {
                    index: index + 1,
                    reason: e.to_string(),
                })?;
        }
        Ok(document)
    }

    pub fn read_from(path: &Path) -> Result<Self, TransferError> {
        let text = std::fs::read_to_string(path).map_err(|e| TransferError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::parse(&text)
    }

    pub fn to_json(&self) -> Result<String, TransferError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn write_to(&self, path: &Path) -> Result<(), TransferError> {
        let json = self.to_json()?;
        std::fs::write(path, json).map_err(|e| TransferError::Write {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

impl RotationState {
    /// Append the document's entries with fresh ids, skipping exact
    /// `(name, endpoint)` duplicates.
    pub fn merge_import(&mut self, document: &ExportDocument) -> ImportSummary {
        let mut summary = ImportSummary::default();
        for entry in &document.api_list {
            let endpoint = match Endpoint::from_draft(entry.to_draft()) {
                Ok(endpoint) => endpoint,
                Err(e) => {
                    tracing::warn!(name = %entry.name, error = %e, "Skipping invalid import entry");
                    summary.skipped += 1;
                    continue;
                }
            };
            if self.contains_pair(&endpoint.name, &endpoint.base_url) {
                summary.skipped += 1;
                continue;
            }
            self.endpoints.push(endpoint);
            summary.added += 1;
        }
        tracing::info!(added = summary.added, skipped = summary.skipped, "Import merged");
        summary
    }
}
