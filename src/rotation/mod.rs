//! Endpoint rotation: the endpoint list, the selection cursor and the
//! operations that move it.

mod endpoint;
mod intent;
mod rotator;
mod selector;
mod state;

use thiserror::Error;

pub use endpoint::{redact_key, Endpoint, EndpointDraft, EndpointId};
pub use intent::{EndpointIntent, IntentOutcome};
pub use rotator::Rotator;
pub use state::{RotationMode, RotationState, SwitchPolicy};

/// Errors from user intents. Selection itself never fails.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RotationError {
    #[error("Endpoint '{id}' not found")]
    EndpointNotFound { id: EndpointId },

    #[error("Endpoint '{name}' is disabled")]
    EndpointDisabled { name: String },

    #[error("Invalid endpoint: {reason}")]
    InvalidEndpoint { reason: String },
}
