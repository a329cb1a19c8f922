//! Typed user intents and the reducer that applies them.
//!
//! The presentation layer (CLI, HTTP admin surface) never writes fields of
//! `RotationState` directly; it emits an `EndpointIntent` and the rotator
//! applies it here.

use serde::{Deserialize, Serialize};

use super::endpoint::{non_empty, Endpoint, EndpointDraft, EndpointId};
use super::state::{RotationMode, RotationState, SwitchPolicy};
use super::RotationError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EndpointIntent {
    Add { draft: EndpointDraft },
    /// Replace name, URL, key and model; the id is kept. The enabled flag
    /// changes only when the draft carries one.
    Update { id: EndpointId, draft: EndpointDraft },
    Rename { id: EndpointId, name: String },
    Delete { id: EndpointId },
    Toggle { id: EndpointId },
    SetEnabled { id: EndpointId, enabled: bool },
    /// "Use endpoint #n": put the cursor on this endpoint.
    Select { id: EndpointId },
    MoveUp { id: EndpointId },
    MoveDown { id: EndpointId },
    SetMode { mode: RotationMode },
    SetSwitchPolicy { policy: SwitchPolicy },
    SetRotationEnabled { enabled: bool },
}

/// What an applied intent changed, for user feedback.
#[derive(Debug, Clone, PartialEq)]
pub enum IntentOutcome {
    Added(Endpoint),
    Updated(Endpoint),
    Removed(Endpoint),
    Selected(Endpoint),
    /// Reorder at the edge of the list; nothing moved.
    Unchanged,
    Settings,
}

impl RotationState {
    /// Apply one intent. On error the state is left untouched.
    pub fn apply(&mut self, intent: EndpointIntent) -> Result<IntentOutcome, RotationError> {
        match intent {
            EndpointIntent::Add { draft } => {
                let endpoint = Endpoint::from_draft(draft)?;
                self.endpoints.push(endpoint.clone());
                Ok(IntentOutcome::Added(endpoint))
            }
            EndpointIntent::Update { id, draft } => {
                let draft = draft.validated()?;
                let endpoint = self.find_mut(&id)?;
                endpoint.name = draft.name;
                endpoint.base_url = draft.base_url;
                endpoint.api_key = draft.api_key;
                endpoint.model = draft.model;
                if let Some(enabled) = draft.enabled {
                    endpoint.enabled = enabled;
                }
                Ok(IntentOutcome::Updated(endpoint.clone()))
            }
            EndpointIntent::Rename { id, name } => {
                let name = non_empty(name).ok_or_else(|| RotationError::InvalidEndpoint {
                    reason: "name must not be empty".to_string(),
                })?;
                let endpoint = self.find_mut(&id)?;
                endpoint.name = name;
                Ok(IntentOutcome::Updated(endpoint.clone()))
            }
            EndpointIntent::Delete { id } => {
                let index = self
                    .position(&id)
                    .ok_or(RotationError::EndpointNotFound { id })?;
                let removed = self.endpoints.remove(index);
                if self.last_pick == Some(id) {
                    self.last_pick = None;
                }
                Ok(IntentOutcome::Removed(removed))
            }
            EndpointIntent::Toggle { id } => {
                let endpoint = self.find_mut(&id)?;
                endpoint.enabled = !endpoint.enabled;
                Ok(IntentOutcome::Updated(endpoint.clone()))
            }
            EndpointIntent::SetEnabled { id, enabled } => {
                let endpoint = self.find_mut(&id)?;
                endpoint.enabled = enabled;
                Ok(IntentOutcome::Updated(endpoint.clone()))
            }
            EndpointIntent::Select { id } => {
                let endpoint = self
                    .find(&id)
                    .cloned()
                    .ok_or(RotationError::EndpointNotFound { id })?;
                let index = self
                    .enabled_position(&id)
                    .ok_or_else(|| RotationError::EndpointDisabled {
                        name: endpoint.name.clone(),
                    })?;
                self.cursor = index;
                self.last_pick = Some(id);
                Ok(IntentOutcome::Selected(endpoint))
            }
            EndpointIntent::MoveUp { id } => {
                let index = self
                    .position(&id)
                    .ok_or(RotationError::EndpointNotFound { id })?;
                if index == 0 {
                    return Ok(IntentOutcome::Unchanged);
                }
                self.endpoints.swap(index, index - 1);
                Ok(IntentOutcome::Updated(self.endpoints[index - 1].clone()))
            }
            EndpointIntent::MoveDown { id } => {
                let index = self
                    .position(&id)
                    .ok_or(RotationError::EndpointNotFound { id })?;
                if index + 1 >= self.endpoints.len() {
                    return Ok(IntentOutcome::Unchanged);
                }
                self.endpoints.swap(index, index + 1);
                Ok(IntentOutcome::Updated(self.endpoints[index + 1].clone()))
            }
            EndpointIntent::SetMode { mode } => {
                self.mode = mode;
                Ok(IntentOutcome::Settings)
            }
            EndpointIntent::SetSwitchPolicy { policy } => {
                self.switch_policy = policy;
                Ok(IntentOutcome::Settings)
            }
            EndpointIntent::SetRotationEnabled { enabled } => {
                self.enabled = enabled;
                Ok(IntentOutcome::Settings)
            }
        }
    }

    fn find_mut(&mut self, id: &EndpointId) -> Result<&mut Endpoint, RotationError> {
        self.endpoints
            .iter_mut()
            .find(|e| &e.id == id)
            .ok_or(RotationError::EndpointNotFound { id: *id })
    }
}
