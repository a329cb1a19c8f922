//! Endpoint model.
//!
//! An endpoint is one OpenAI-compatible backend the proxy can rotate to.
//! Field names on the wire follow the settings/export format (`endpoint`,
//! `apiKey`) so files written by older tooling load unchanged.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::RotationError;

/// Opaque, immutable endpoint identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EndpointId(Uuid);

impl EndpointId {
    /// Generate a fresh random id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

}

impl Default for EndpointId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for EndpointId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// One configured backend.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    /// Assigned at creation, never changes. Missing ids in hand-edited
    /// settings files get a fresh one on load.
    #[serde(default)]
    pub id: EndpointId,
    pub name: String,
    #[serde(rename = "endpoint")]
    pub base_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "empty_as_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "empty_as_none")]
    pub model: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value: Option<String> = Option::deserialize(deserializer)?;
    Ok(value.and_then(non_empty))
}

pub(crate) fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

impl Endpoint {
    /// Build a new enabled endpoint from a validated draft.
    pub fn from_draft(draft: EndpointDraft) -> Result<Self, RotationError> {
        let draft = draft.validated()?;
        Ok(Self {
            id: EndpointId::new(),
            name: draft.name,
            base_url: draft.base_url,
            api_key: draft.api_key,
            model: draft.model,
            enabled: draft.enabled.unwrap_or(true),
        })
    }

    /// Re-run draft validation on a stored endpoint, keeping its id and
    /// enabled flag.
    pub fn revalidated(self) -> Result<Self, RotationError> {
        let (id, enabled) = (self.id, self.enabled);
        let draft = EndpointDraft {
            name: self.name,
            base_url: self.base_url,
            api_key: self.api_key,
            model: self.model,
            enabled: Some(enabled),
        }
        .validated()?;
        Ok(Self {
            id,
            name: draft.name,
            base_url: draft.base_url,
            api_key: draft.api_key,
            model: draft.model,
            enabled,
        })
    }

    /// API key with empty values treated as absent.
    pub fn bearer_key(&self) -> Option<&str> {
        self.api_key.as_deref().filter(|k| !k.is_empty())
    }

    /// Model override with empty values treated as absent.
    pub fn model_override(&self) -> Option<&str> {
        self.model.as_deref().filter(|m| !m.is_empty())
    }

    /// Copy of this endpoint safe to hand to status surfaces.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        copy.api_key = copy.api_key.as_deref().map(redact_key);
        copy
    }
}

// Keys never end up in logs through `{:?}`.
impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "••••••••"))
            .field("model", &self.model)
            .field("enabled", &self.enabled)
            .finish()
    }
}

/// Masks all but the last four characters of a key.
pub fn redact_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 8 {
        return "••••••••".to_string();
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("••••{}", tail)
}

/// User input for creating or replacing an endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointDraft {
    pub name: String,
    #[serde(rename = "endpoint")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    /// New endpoints start enabled when this is absent; updates keep the
    /// current flag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
}

impl EndpointDraft {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            api_key: None,
            model: None,
            enabled: None,
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = Some(false);
        self
    }

    /// Trim fields, drop empty optionals and check the required ones.
    pub fn validated(self) -> Result<Self, RotationError> {
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(RotationError::InvalidEndpoint {
                reason: "name must not be empty".to_string(),
            });
        }

        let base_url = self.base_url.trim().to_string();
        if base_url.is_empty() {
            return Err(RotationError::InvalidEndpoint {
                reason: "endpoint URL must not be empty".to_string(),
            });
        }
        match reqwest::Url::parse(&base_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            Ok(url) => {
                return Err(RotationError::InvalidEndpoint {
                    reason: format!("unsupported URL scheme '{}'", url.scheme()),
                })
            }
            Err(e) => {
                return Err(RotationError::InvalidEndpoint {
                    reason: format!("invalid endpoint URL '{}': {}", base_url, e),
                })
            }
        }

        Ok(Self {
            name,
            base_url,
            api_key: self.api_key.and_then(non_empty),
            model: self.model.and_then(non_empty),
            enabled: self.enabled,
        })
    }
}
