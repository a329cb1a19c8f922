use serde::{Deserialize, Serialize};

use super::endpoint::{Endpoint, EndpointId};

/// How `advance` picks the next endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RotationMode {
    /// Round-robin over enabled endpoints in list order.
    #[default]
    #[serde(alias = "round-robin", alias = "roundRobin")]
    Sequential,
    /// Uniform pick that never repeats the previous pick when more than one
    /// endpoint is enabled.
    Random,
}

impl std::fmt::Display for RotationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RotationMode::Sequential => write!(f, "sequential"),
            RotationMode::Random => write!(f, "random"),
        }
    }
}

/// Whether the cursor moves on every dispatch or only on failover.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SwitchPolicy {
    #[default]
    #[serde(alias = "per-request")]
    PerRequest,
    #[serde(alias = "sticky-until-error", alias = "sticky")]
    StickyUntilError,
}

impl std::fmt::Display for SwitchPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SwitchPolicy::PerRequest => write!(f, "per-request"),
            SwitchPolicy::StickyUntilError => write!(f, "sticky-until-error"),
        }
    }
}

/// Durable rotation configuration.
///
/// `cursor` indexes the *enabled* subset and is reduced modulo its length at
/// use time, so enabling or disabling entries never leaves it out of range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RotationState {
    #[serde(rename = "apiList")]
    pub endpoints: Vec<Endpoint>,
    pub cursor: usize,
    pub mode: RotationMode,
    pub switch_policy: SwitchPolicy,
    /// Master switch for the whole rotation feature.
    pub enabled: bool,
    /// Endpoint returned by the most recent `advance`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_pick: Option<EndpointId>,
}

impl Default for RotationState {
    fn default() -> Self {
        Self {
            endpoints: Vec::new(),
            cursor: 0,
            mode: RotationMode::Sequential,
            switch_policy: SwitchPolicy::PerRequest,
            enabled: true,
            last_pick: None,
        }
    }
}

impl RotationState {
    pub fn find(&self, id: &EndpointId) -> Option<&Endpoint> {
        self.endpoints.iter().find(|e| &e.id == id)
    }

    pub(crate) fn position(&self, id: &EndpointId) -> Option<usize> {
        self.endpoints.iter().position(|e| &e.id == id)
    }

    /// Position of an endpoint within the enabled subset.
    pub(crate) fn enabled_position(&self, id: &EndpointId) -> Option<usize> {
        self.endpoints
            .iter()
            .filter(|e| e.enabled)
            .position(|e| &e.id == id)
    }

    pub fn contains_pair(&self, name: &str, base_url: &str) -> bool {
        self.endpoints
            .iter()
            .any(|e| e.name == name && e.base_url == base_url)
    }
}
