//! Model-listing probe, also used as the "test connection" check.
//!
//! Probing never fails hard: an unreachable endpoint, a non-success status
//! or a body without a `data` array all mean zero models.

use std::time::{Duration, Instant};

use reqwest::header::AUTHORIZATION;
use reqwest::Client;
use serde::Deserialize;

use crate::proxy::rewrite::strip_version;
use crate::rotation::Endpoint;

/// Entries are kept loose so one odd entry does not hide the rest.
#[derive(Debug, Deserialize)]
struct ModelList {
    data: Vec<serde_json::Value>,
}

impl ModelList {
    fn ids(self) -> Vec<String> {
        self.data
            .into_iter()
            .filter_map(|entry| match entry.get("id") {
                Some(serde_json::Value::String(id)) => Some(id.clone()),
                _ => None,
            })
            .collect()
    }
}

/// Result of `GET {base}/v1/models`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelProbe {
    /// HTTP status, if the endpoint answered at all.
    pub status: Option<u16>,
    pub models: Vec<String>,
    pub error: Option<String>,
}

impl ModelProbe {
    pub fn is_success(&self) -> bool {
        self.status.is_some_and(|s| (200..300).contains(&s))
    }

    fn failed(status: Option<u16>, error: impl Into<String>) -> Self {
        Self {
            status,
            models: Vec::new(),
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionReport {
    pub name: String,
    pub reachable: bool,
    pub status: Option<u16>,
    pub model_count: usize,
    pub latency: Duration,
    pub error: Option<String>,
}

/// Model listing URL. A trailing `/v1` on the base is folded in, so both
/// `https://host` and `https://host/v1/` give `https://host/v1/models`.
pub fn models_url(base_url: &str) -> String {
    format!("{}/v1/models", strip_version(base_url))
}

pub async fn list_models(client: &Client, base_url: &str, api_key: Option<&str>) -> ModelProbe {
    let url = models_url(base_url);
    let mut request = client.get(&url);
    if let Some(key) = api_key.filter(|k| !k.is_empty()) {
        request = request.header(AUTHORIZATION, format!("Bearer {}", key));
    }

    let response = match request.send().await {
        Ok(resp) => resp,
        Err(e) => {
            tracing::debug!(url = %url, error = %e, "Model probe failed to connect");
            return ModelProbe::failed(None, e.to_string());
        }
    };

    let status = response.status();
    if !status.is_success() {
        return ModelProbe::failed(Some(status.as_u16()), format!("HTTP {}", status.as_u16()));
    }

    let body = match response.bytes().await {
        Ok(body) => body,
        Err(e) => return ModelProbe::failed(Some(status.as_u16()), e.to_string()),
    };

    match serde_json::from_slice::<ModelList>(&body) {
        Ok(list) => ModelProbe {
            status: Some(status.as_u16()),
            models: list.ids(),
            error: None,
        },
        Err(e) => {
            tracing::debug!(url = %url, error = %e, "Model list has no usable data array");
            ModelProbe {
                status: Some(status.as_u16()),
                models: Vec::new(),
                error: None,
            }
        }
    }
}

pub async fn test_connection(client: &Client, endpoint: &Endpoint) -> ConnectionReport {
    let started = Instant::now();
    let probe = list_models(client, &endpoint.base_url, endpoint.bearer_key()).await;
    let latency = started.elapsed();

    tracing::info!(
        endpoint = %endpoint.name,
        status = ?probe.status,
        models = probe.models.len(),
        latency_ms = latency.as_millis() as u64,
        "Connection test finished"
    );

    ConnectionReport {
        name: endpoint.name.clone(),
        reachable: probe.is_success(),
        status: probe.status,
        model_count: probe.models.len(),
        latency,
        error: probe.error,
    }
}
