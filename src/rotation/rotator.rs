//! Shared rotation handle.
//!
//! Many concurrent readers (proxied requests) and occasional writers
//! (intents) share one `RotationState`. Each operation takes the lock once,
//! so a cursor update is never observed half-done by the failover loop.
//! Concurrent requests can still both read cursor `k` before either
//! advances; exact fairness across requests is not guaranteed.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;

use super::endpoint::{Endpoint, EndpointId};
use super::intent::{EndpointIntent, IntentOutcome};
use super::state::RotationState;
use super::RotationError;
use crate::settings::{NoopSink, StateSink};
use crate::transfer::{ExportDocument, ImportSummary};

#[derive(Clone)]
pub struct Rotator {
    inner: Arc<Mutex<RotatorInner>>,
    sink: Arc<dyn StateSink>,
}

struct RotatorInner {
    state: RotationState,
    rng: StdRng,
}

impl Rotator {
    pub fn new(state: RotationState, sink: Arc<dyn StateSink>) -> Self {
        Self::with_rng(state, sink, StdRng::from_entropy())
    }

    /// Deterministic random mode, for tests and reproducible runs.
    pub fn with_rng(state: RotationState, sink: Arc<dyn StateSink>, rng: StdRng) -> Self {
        Self {
            inner: Arc::new(Mutex::new(RotatorInner { state, rng })),
            sink,
        }
    }

    /// Rotator that never persists.
    pub fn in_memory(state: RotationState) -> Self {
        Self::new(state, Arc::new(NoopSink))
    }

    pub fn snapshot(&self) -> RotationState {
        self.inner.lock().state.clone()
    }

    /// Master switch on and at least one enabled endpoint.
    pub fn is_active(&self) -> bool {
        let inner = self.inner.lock();
        inner.state.enabled && inner.state.enabled_count() > 0
    }

    pub fn enabled_count(&self) -> usize {
        self.inner.lock().state.enabled_count()
    }

    pub fn current(&self) -> Option<Endpoint> {
        self.inner.lock().state.current_endpoint().cloned()
    }

    pub fn advance(&self) -> Option<Endpoint> {
        self.mutate_selection(|state, rng| state.advance(rng))
    }

    pub fn select_for_dispatch(&self) -> Option<Endpoint> {
        self.mutate_selection(|state, rng| state.select_for_dispatch(rng))
    }

    /// Next endpoint not yet tried by the current logical request.
    pub fn advance_untried(&self, tried: &HashSet<EndpointId>) -> Option<Endpoint> {
        self.mutate_selection(|state, rng| state.advance_untried(rng, tried))
    }

    /// Apply a user intent and persist the result.
    pub fn apply(&self, intent: EndpointIntent) -> Result<IntentOutcome, RotationError> {
        let (outcome, snapshot) = {
            let mut inner = self.inner.lock();
            let outcome = inner.state.apply(intent)?;
            (outcome, inner.state.clone())
        };
        self.sink.persist(&snapshot);
        Ok(outcome)
    }

    /// Merge an import document and persist the result.
    pub fn import(&self, document: &ExportDocument) -> ImportSummary {
        let (summary, snapshot) = {
            let mut inner = self.inner.lock();
            let summary = inner.state.merge_import(document);
            (summary, inner.state.clone())
        };
        if summary.added > 0 {
            self.sink.persist(&snapshot);
        }
        summary
    }

    pub fn export(&self) -> ExportDocument {
        ExportDocument::from_state(&self.inner.lock().state)
    }

    fn mutate_selection<F>(&self, select: F) -> Option<Endpoint>
    where
        F: FnOnce(&mut RotationState, &mut StdRng) -> Option<Endpoint>,
    {
        let (picked, snapshot) = {
            let mut guard = self.inner.lock();
            let inner = &mut *guard;
            let before = (inner.state.cursor, inner.state.last_pick);
            let picked = select(&mut inner.state, &mut inner.rng);
            let changed = before != (inner.state.cursor, inner.state.last_pick);
            (picked, changed.then(|| inner.state.clone()))
        };
        if let Some(snapshot) = snapshot {
            self.sink.persist(&snapshot);
        }
        picked
    }
}
