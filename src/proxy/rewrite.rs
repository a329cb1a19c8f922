//! Request rewriting.
//!
//! Only recognized completion calls are redirected; anything else goes to
//! its original target untouched.

use axum::body::Bytes;
use axum::http::header::{AUTHORIZATION, CONTENT_LENGTH, HOST};
use axum::http::{HeaderMap, HeaderValue, Method};
use serde_json::Value;

use crate::rotation::Endpoint;

/// Everything the transport needs for one attempt.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl OutboundRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_header(mut self, name: &'static str, value: &str) -> Self {
        if let Ok(value) = HeaderValue::from_str(value) {
            self.headers.insert(name, value);
        }
        self
    }
}

/// Completion APIs the rotator is allowed to redirect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiPath {
    ChatCompletions,
    Completions,
    Messages,
}

impl ApiPath {
    // Longest suffix first: "/chat/completions" also ends with "/completions".
    const ALL: [ApiPath; 3] = [ApiPath::ChatCompletions, ApiPath::Completions, ApiPath::Messages];

    pub fn suffix(&self) -> &'static str {
        match self {
            ApiPath::ChatCompletions => "/chat/completions",
            ApiPath::Completions => "/completions",
            ApiPath::Messages => "/messages",
        }
    }

    /// Match the path of `url` (query excluded) against the known suffixes.
    pub fn recognize(url: &str) -> Option<Self> {
        let path = url_path(url);
        let path = path.trim_end_matches('/');
        Self::ALL.into_iter().find(|p| path.ends_with(p.suffix()))
    }
}

fn url_path(url: &str) -> &str {
    let without_query = url.split(['?', '#']).next().unwrap_or(url);
    match without_query.find("://") {
        Some(scheme_end) => {
            let rest = &without_query[scheme_end + 3..];
            rest.find('/').map(|i| &rest[i..]).unwrap_or("")
        }
        None => without_query,
    }
}

fn url_query(url: &str) -> Option<&str> {
    let without_fragment = url.split('#').next().unwrap_or(url);
    without_fragment
        .split_once('?')
        .map(|(_, q)| q)
        .filter(|q| !q.is_empty())
}

/// Strip trailing slashes.
pub fn normalize_base_url(base_url: &str) -> &str {
    base_url.trim().trim_end_matches('/')
}

/// Strip trailing slashes and a trailing `/v1` segment, for building
/// `/v1/...` URLs such as the model listing.
pub fn strip_version(base_url: &str) -> &str {
    let normalized = normalize_base_url(base_url);
    normalized
        .strip_suffix("/v1")
        .map(|s| s.trim_end_matches('/'))
        .unwrap_or(normalized)
}

/// Full target URL for `path` on `endpoint`.
///
/// A base that already ends in `/v1` gets the suffix appended directly;
/// otherwise `/v1` is inserted, so `https://foo.com/v1/` and `https://foo.com`
/// both resolve to `https://foo.com/v1/chat/completions`.
pub fn target_url(base_url: &str, path: ApiPath) -> String {
    let base = normalize_base_url(base_url);
    if base.ends_with("/v1") {
        format!("{}{}", base, path.suffix())
    } else {
        format!("{}/v1{}", base, path.suffix())
    }
}

/// Rewrite `req` to target `endpoint`.
///
/// Returns `None` when the URL is not a recognized completion call; the
/// caller must then send the original request unmodified.
pub fn rewrite(req: &OutboundRequest, endpoint: &Endpoint) -> Option<OutboundRequest> {
    let path = ApiPath::recognize(&req.url)?;

    let mut url = target_url(&endpoint.base_url, path);
    if let Some(query) = url_query(&req.url) {
        url.push('?');
        url.push_str(query);
    }

    let mut headers = req.headers.clone();
    headers.remove(HOST);
    headers.remove(CONTENT_LENGTH);
    if let Some(key) = endpoint.bearer_key() {
        match HeaderValue::from_str(&format!("Bearer {}", key)) {
            Ok(mut value) => {
                value.set_sensitive(true);
                headers.insert(AUTHORIZATION, value);
            }
            Err(_) => {
                tracing::warn!(endpoint = %endpoint.name, "API key is not a valid header value, sending without it");
            }
        }
    }

    let body = match endpoint.model_override() {
        Some(model) => inject_model(&req.body, model),
        None => req.body.clone(),
    };

    Some(OutboundRequest {
        method: req.method.clone(),
        url,
        headers,
        body,
    })
}

/// Overwrite the `model` field of a JSON object body. Anything that is not
/// a JSON object passes through unchanged.
pub fn inject_model(body: &Bytes, model: &str) -> Bytes {
    if body.is_empty() {
        return body.clone();
    }
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(mut object)) => {
            object.insert("model".to_string(), Value::String(model.to_string()));
            match serde_json::to_vec(&Value::Object(object)) {
                Ok(encoded) => Bytes::from(encoded),
                Err(_) => body.clone(),
            }
        }
        Ok(_) => body.clone(),
        Err(e) => {
            tracing::debug!(error = %e, "Request body is not JSON, model override skipped");
            body.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rotation::EndpointDraft;

    fn endpoint(base_url: &str) -> Endpoint {
        Endpoint::from_draft(EndpointDraft::new("test", base_url)).unwrap()
    }

    #[test]
    fn test_recognize_prefers_chat_completions() {
        assert_eq!(
            ApiPath::recognize("http://host/v1/chat/completions"),
            Some(ApiPath::ChatCompletions)
        );
        assert_eq!(
            ApiPath::recognize("http://host/v1/completions?x=1"),
            Some(ApiPath::Completions)
        );
        assert_eq!(ApiPath::recognize("/v1/messages"), Some(ApiPath::Messages));
        assert_eq!(ApiPath::recognize("http://host/v1/models"), None);
        assert_eq!(ApiPath::recognize("http://host/v1/models?p=/messages"), None);
    }

    #[test]
    fn test_target_url_no_double_v1() {
        assert_eq!(
            target_url("https://foo.com/v1/", ApiPath::ChatCompletions),
            "https://foo.com/v1/chat/completions"
        );
        assert_eq!(
            target_url("https://foo.com///", ApiPath::Messages),
            "https://foo.com/v1/messages"
        );
    }

    #[test]
    fn test_strip_version() {
        assert_eq!(strip_version("https://foo.com/v1/"), "https://foo.com");
        assert_eq!(strip_version("https://foo.com/"), "https://foo.com");
        assert_eq!(strip_version("https://foo.com/api/v1"), "https://foo.com/api");
    }

    #[test]
    fn test_query_is_preserved() {
        let req = OutboundRequest::new(Method::POST, "http://orig/v1/chat/completions?api-version=2");
        let out = rewrite(&req, &endpoint("https://foo.com/v1")).unwrap();
        assert_eq!(out.url, "https://foo.com/v1/chat/completions?api-version=2");
    }

    #[test]
    fn test_inject_model_skips_non_object() {
        let body = Bytes::from_static(b"[1,2]");
        assert_eq!(inject_model(&body, "m"), body);
        let body = Bytes::from_static(b"{broken");
        assert_eq!(inject_model(&body, "m"), body);
    }
}
