//! Errors the proxy turns into JSON responses of its own.
//!
//! Upstream answers that fail over to exhaustion are returned as-is by the
//! router; only failures without any upstream response end up here.

use axum::http::header::CONTENT_TYPE;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

use crate::proxy::dispatch::DispatchError;
use crate::proxy::transport::TransportError;
use crate::rotation::RotationError;

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error(transparent)]
    Rotation(#[from] RotationError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    /// No endpoint in the attempt budget produced a usable response.
    #[error("All endpoints failed ({}): {message}", .attempted.join(", "))]
    Exhausted {
        attempted: Vec<String>,
        message: String,
    },

    #[error("Request body exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },

    #[error("Bad request body: {0}")]
    BadBody(String),
}

impl From<DispatchError> for ProxyError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::Exhausted { attempted, last } => ProxyError::Exhausted {
                attempted,
                message: last.to_string(),
            },
            DispatchError::Passthrough(source) => ProxyError::Transport(source),
        }
    }
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        use ProxyError::*;
        match self {
            Rotation(RotationError::EndpointNotFound { .. }) => StatusCode::NOT_FOUND,
            Rotation(_) | BadBody(_) => StatusCode::BAD_REQUEST,
            Transport(TransportError::Timeout { .. }) => StatusCode::GATEWAY_TIMEOUT,
            Transport(_) | Exhausted { .. } => StatusCode::BAD_GATEWAY,
            PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        }
    }

    /// Stable machine-readable tag for the `error.type` field.
    pub fn kind(&self) -> &'static str {
        use ProxyError::*;
        match self {
            Rotation(RotationError::EndpointNotFound { .. }) => "endpoint_not_found",
            Rotation(RotationError::EndpointDisabled { .. }) => "endpoint_disabled",
            Rotation(RotationError::InvalidEndpoint { .. }) => "invalid_endpoint",
            Transport(TransportError::Timeout { .. }) => "request_timeout",
            Transport(TransportError::Connection { .. }) => "connection_error",
            Transport(TransportError::InvalidRequest(_)) => "upstream_request_error",
            Exhausted { .. } => "endpoints_exhausted",
            PayloadTooLarge { .. } => "payload_too_large",
            BadBody(_) => "invalid_request",
        }
    }

    /// `{"error": {"type", "message", "request_id"}}` with the mapped status.
    pub fn to_response(&self, request_id: &str) -> Response {
        let payload = json!({
            "error": {
                "type": self.kind(),
                "message": self.to_string(),
                "request_id": request_id,
            }
        });
        let mut response = (self.status(), payload.to_string()).into_response();
        response.headers_mut().insert(
            CONTENT_TYPE,
            axum::http::HeaderValue::from_static("application/json"),
        );
        response
    }
}
