use std::sync::Arc;

use axum::body::Body;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Request, State};
use axum::http::header::{CONTENT_LENGTH, HOST};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use http_body_util::{BodyExt, LengthLimitError, Limited};
use serde::Serialize;
use uuid::Uuid;

use crate::config::ConfigStore;
use crate::proxy::dispatch::{AttemptFailure, DispatchError, Dispatcher};
use crate::proxy::error::ProxyError;
use crate::proxy::rewrite::{normalize_base_url, OutboundRequest};
use crate::rotation::{Endpoint, EndpointId, EndpointIntent, RotationMode, RotationState, SwitchPolicy};

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: String,
    pub service: String,
}

/// Rotation state as reported over HTTP. Keys are redacted.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RotationStatus {
    pub enabled: bool,
    pub mode: RotationMode,
    pub switch_policy: SwitchPolicy,
    pub cursor: usize,
    pub current: Option<EndpointId>,
    pub endpoints: Vec<Endpoint>,
}

impl RotationStatus {
    pub fn from_state(state: &RotationState) -> Self {
        Self {
            enabled: state.enabled,
            mode: state.mode,
            switch_policy: state.switch_policy,
            cursor: state.cursor,
            current: state.current_endpoint().map(|e| e.id),
            endpoints: state.endpoints.iter().map(Endpoint::redacted).collect(),
        }
    }
}

#[derive(Clone)]
pub struct RouterEngine {
    config: ConfigStore,
    dispatcher: Arc<Dispatcher>,
}

impl RouterEngine {
    pub fn new(config: ConfigStore, dispatcher: Arc<Dispatcher>) -> Self {
        Self { config, dispatcher }
    }

    /// Forward an incoming request to its original target, rotating when it
    /// is a completion call.
    pub async fn forward(&self, req: Request) -> Result<Response, ProxyError> {
        let config = self.config.get();
        let (parts, body) = req.into_parts();

        let path_and_query = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        let url = format!(
            "{}{}",
            normalize_base_url(&config.proxy.upstream_base_url),
            path_and_query
        );

        let limit = config.proxy.max_body_bytes;
        let body = Limited::new(body, limit)
            .collect()
            .await
            .map_err(|e| {
                if e.downcast_ref::<LengthLimitError>().is_some() {
                    ProxyError::PayloadTooLarge { limit }
                } else {
                    ProxyError::BadBody(e.to_string())
                }
            })?
            .to_bytes();

        let mut headers = parts.headers;
        headers.remove(HOST);
        headers.remove(CONTENT_LENGTH);

        let outbound = OutboundRequest {
            method: parts.method,
            url,
            headers,
            body,
        };

        match self.dispatcher.dispatch(outbound).await {
            Ok(resp) => Ok(resp),
            // The caller sees the last upstream answer, status and body intact.
            Err(DispatchError::Exhausted {
                last: AttemptFailure::Status(resp),
                ..
            }) => Ok(resp),
            Err(e) => Err(e.into()),
        }
    }
}

pub fn build_router(engine: RouterEngine) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/rotation", get(rotation_status))
        .route("/rotation/intents", post(apply_intent))
        .fallback(proxy_handler)
        .with_state(engine)
}

async fn health() -> Json<HealthStatus> {
    Json(HealthStatus {
        status: "healthy".to_string(),
        service: "api-rotator".to_string(),
    })
}

async fn rotation_status(State(engine): State<RouterEngine>) -> Json<RotationStatus> {
    Json(RotationStatus::from_state(
        &engine.dispatcher.rotator().snapshot(),
    ))
}

async fn apply_intent(
    State(engine): State<RouterEngine>,
    intent: Result<Json<EndpointIntent>, JsonRejection>,
) -> Response {
    let intent = match intent {
        Ok(Json(intent)) => intent,
        Err(rejection) => {
            let request_id = Uuid::new_v4().to_string();
            tracing::warn!(request_id = %request_id, error = %rejection, "Malformed rotation intent");
            return ProxyError::BadBody(rejection.body_text()).to_response(&request_id);
        }
    };

    let rotator = engine.dispatcher.rotator();
    match rotator.apply(intent) {
        Ok(outcome) => {
            tracing::info!(?outcome, "Applied rotation intent");
            Json(RotationStatus::from_state(&rotator.snapshot())).into_response()
        }
        Err(e) => {
            let request_id = Uuid::new_v4().to_string();
            tracing::warn!(request_id = %request_id, error = %e, "Rejected rotation intent");
            ProxyError::from(e).to_response(&request_id)
        }
    }
}

async fn proxy_handler(State(engine): State<RouterEngine>, req: Request<Body>) -> Response {
    let request_id = Uuid::new_v4().to_string();
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    match engine.forward(req).await {
        Ok(resp) => {
            tracing::debug!(
                request_id = %request_id,
                method = %method,
                path = %path,
                status = resp.status().as_u16(),
                "Proxied request"
            );
            resp
        }
        Err(e) => {
            tracing::error!(
                request_id = %request_id,
                method = %method,
                path = %path,
                error = %e,
                "Proxy request failed"
            );
            e.to_response(&request_id)
        }
    }
}
