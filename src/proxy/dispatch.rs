//! Dispatch and failover.
//!
//! One call to [`Dispatcher::dispatch`] is one logical request. It may try
//! several endpoints, but never more than `min(max_endpoints, N)` distinct
//! ones, and never more than `retries_per_endpoint + 1` attempts on each.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::Response;
use thiserror::Error;

use crate::config::{ConfigStore, FailoverConfig};
use crate::events::{EventBus, RotationEvent};
use crate::proxy::rewrite::{rewrite, ApiPath, OutboundRequest};
use crate::proxy::transport::{Transport, TransportError};
use crate::rotation::{Endpoint, EndpointId, Rotator};

/// Why a single attempt did not succeed.
#[derive(Debug)]
pub enum AttemptFailure {
    /// The endpoint answered with a non-2xx status.
    Status(Response<Body>),
    /// No response at all.
    Transport(TransportError),
}

impl fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptFailure::Status(resp) => write!(f, "HTTP {}", resp.status().as_u16()),
            AttemptFailure::Transport(err) => write!(f, "{}", err),
        }
    }
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("All endpoints failed ({}): {last}", .attempted.join(", "))]
    Exhausted {
        attempted: Vec<String>,
        last: AttemptFailure,
    },

    #[error("Pass-through request failed: {0}")]
    Passthrough(#[source] TransportError),
}

pub struct Dispatcher {
    rotator: Rotator,
    transport: Arc<dyn Transport>,
    config: ConfigStore,
    events: EventBus,
}

impl Dispatcher {
    pub fn new(
        rotator: Rotator,
        transport: Arc<dyn Transport>,
        config: ConfigStore,
        events: EventBus,
    ) -> Self {
        Self {
            rotator,
            transport,
            config,
            events,
        }
    }

    pub fn rotator(&self) -> &Rotator {
        &self.rotator
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Send `req`, rotating across endpoints when it is a completion call.
    ///
    /// Returns `Ok` for the first 2xx response and for any pass-through
    /// response regardless of status.
    pub async fn dispatch(&self, req: OutboundRequest) -> Result<Response<Body>, DispatchError> {
        if !self.rotator.is_active() {
            return self
                .passthrough(req, "rotation disabled or no enabled endpoints")
                .await;
        }
        if ApiPath::recognize(&req.url).is_none() {
            tracing::trace!(url = %req.url, "Not a completion call, passing through");
            return self.passthrough(req, "not a completion call").await;
        }

        let config = self.config.get();
        let notify_switch = config.notifications.on_switch;
        let limit = endpoint_limit(&config.failover, self.rotator.enabled_count());

        let Some(mut endpoint) = self.rotator.select_for_dispatch() else {
            return self.passthrough(req, "no endpoint selected").await;
        };

        let mut tried: HashSet<EndpointId> = HashSet::new();
        let mut attempted: Vec<String> = Vec::new();
        let mut attempt = 0u32;

        loop {
            tried.insert(endpoint.id);
            attempted.push(endpoint.name.clone());

            let Some(outbound) = rewrite(&req, &endpoint) else {
                return self.passthrough(req, "request could not be rewritten").await;
            };

            let failure = match self
                .attempt_endpoint(&endpoint, outbound, &config.failover, notify_switch, &mut attempt)
                .await
            {
                Ok(resp) => return Ok(resp),
                Err(failure) => failure,
            };

            if tried.len() >= limit {
                return Err(self.exhausted(attempted, failure));
            }

            match self.rotator.advance_untried(&tried) {
                Some(next) if !tried.contains(&next.id) => {
                    tracing::info!(
                        from = %endpoint.name,
                        to = %next.name,
                        "Failing over to next endpoint"
                    );
                    endpoint = next;
                }
                _ => return Err(self.exhausted(attempted, failure)),
            }
        }
    }

    /// Try one endpoint, retrying it in place up to `retries_per_endpoint`
    /// times with exponential backoff.
    async fn attempt_endpoint(
        &self,
        endpoint: &Endpoint,
        outbound: OutboundRequest,
        failover: &FailoverConfig,
        notify_switch: bool,
        attempt: &mut u32,
    ) -> Result<Response<Body>, AttemptFailure> {
        let mut retry = 0u32;

        loop {
            *attempt += 1;
            tracing::info!(
                endpoint = %endpoint.name,
                attempt = *attempt,
                url = %outbound.url,
                "Dispatching request"
            );
            if notify_switch {
                self.events.publish(RotationEvent::Using {
                    endpoint: endpoint.name.clone(),
                    attempt: *attempt,
                });
            }

            let failure = match self.transport.send(outbound.clone()).await {
                Ok(resp) if resp.status().is_success() => return Ok(resp),
                Ok(resp) => AttemptFailure::Status(resp),
                Err(err) => AttemptFailure::Transport(err),
            };

            tracing::warn!(
                endpoint = %endpoint.name,
                attempt = *attempt,
                error = %failure,
                "Endpoint attempt failed"
            );
            self.events.publish(RotationEvent::AttemptFailed {
                endpoint: endpoint.name.clone(),
                reason: failure.to_string(),
            });

            if retry >= failover.retries_per_endpoint {
                return Err(failure);
            }

            let delay = backoff_delay(failover.retry_backoff_base_ms, retry);
            retry += 1;
            tracing::debug!(
                endpoint = %endpoint.name,
                delay_ms = delay.as_millis() as u64,
                "Retrying same endpoint after backoff"
            );
            tokio::time::sleep(delay).await;
        }
    }

    async fn passthrough(
        &self,
        req: OutboundRequest,
        reason: &str,
    ) -> Result<Response<Body>, DispatchError> {
        tracing::debug!(url = %req.url, reason, "Passing request through unmodified");
        self.events.publish(RotationEvent::Passthrough {
            reason: reason.to_string(),
        });
        self.transport
            .send(req)
            .await
            .map_err(DispatchError::Passthrough)
    }

    fn exhausted(&self, attempted: Vec<String>, last: AttemptFailure) -> DispatchError {
        tracing::error!(
            attempted = ?attempted,
            error = %last,
            "All endpoint attempts failed"
        );
        self.events.publish(RotationEvent::Exhausted {
            attempted: attempted.clone(),
        });
        DispatchError::Exhausted { attempted, last }
    }
}

/// Distinct endpoints one logical request may try.
pub fn endpoint_limit(failover: &FailoverConfig, enabled: usize) -> usize {
    if !failover.enabled {
        return 1;
    }
    (failover.max_endpoints as usize).min(enabled).max(1)
}

/// `base * 2^retry`, capped so the shift cannot overflow.
pub fn backoff_delay(base_ms: u64, retry: u32) -> Duration {
    Duration::from_millis(base_ms.saturating_mul(1u64 << retry.min(16)))
}
