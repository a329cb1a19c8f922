//! Transient notifications about rotation activity.
//!
//! The dispatcher publishes; a front end (the `serve` command, a tray, a
//! test) subscribes. Publishing with nobody listening is fine.

use serde::Serialize;
use tokio::sync::broadcast;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RotationEvent {
    /// An attempt is about to use this endpoint.
    Using { endpoint: String, attempt: u32 },
    AttemptFailed { endpoint: String, reason: String },
    /// Every allowed endpoint failed for one request.
    Exhausted { attempted: Vec<String> },
    /// Rotation did not apply; the request went to its original target.
    Passthrough { reason: String },
}

impl RotationEvent {
    /// Whether the event is a warning rather than an informational notice.
    pub fn is_warning(&self) -> bool {
        matches!(
            self,
            RotationEvent::AttemptFailed { .. } | RotationEvent::Exhausted { .. }
        )
    }
}

impl std::fmt::Display for RotationEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RotationEvent::Using { endpoint, attempt } if *attempt > 1 => {
                write!(f, "Using {} (attempt {})", endpoint, attempt)
            }
            RotationEvent::Using { endpoint, .. } => write!(f, "Using {}", endpoint),
            RotationEvent::AttemptFailed { endpoint, reason } => {
                write!(f, "{} failed: {}", endpoint, reason)
            }
            RotationEvent::Exhausted { attempted } => {
                write!(f, "All endpoints failed ({})", attempted.join(", "))
            }
            RotationEvent::Passthrough { reason } => write!(f, "Passed through: {}", reason),
        }
    }
}

#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<RotationEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn publish(&self, event: RotationEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RotationEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
