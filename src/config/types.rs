use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::settings::DEFAULT_SETTINGS_KEY;

/// Root configuration container.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub proxy: ProxyConfig,
    #[serde(default)]
    pub defaults: Defaults,
    #[serde(default)]
    pub failover: FailoverConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
    #[serde(default)]
    pub settings: SettingsConfig,
}

/// Proxy configuration for local routing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Bind address for the local proxy server (host:port).
    #[serde(default = "default_proxy_bind_addr")]
    pub bind_addr: String,
    /// Where requests go when rotation does not apply.
    #[serde(default = "default_upstream_base_url")]
    pub upstream_base_url: String,
    /// Largest request body the proxy will buffer.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

/// Transport timeouts and connection pool settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Defaults {
    /// Request timeout in seconds (default: 300).
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u32,
    /// Connection timeout in seconds (default: 10).
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u32,
    /// Pool idle timeout in seconds (default: 90).
    #[serde(default = "default_pool_idle_timeout")]
    pub pool_idle_timeout_seconds: u32,
    /// Max idle connections per host (default: 8).
    #[serde(default = "default_pool_max_idle_per_host")]
    pub pool_max_idle_per_host: u32,
}

/// Failover bounds. Both bounds are finite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailoverConfig {
    /// Rotate to another endpoint when an attempt fails (default: true).
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Max distinct endpoints tried per request (default: 3).
    #[serde(default = "default_max_endpoints")]
    pub max_endpoints: u32,
    /// Extra attempts on the same endpoint before rotating away (default: 0).
    #[serde(default)]
    pub retries_per_endpoint: u32,
    /// Base backoff in milliseconds between same-endpoint retries (default: 200).
    #[serde(default = "default_retry_backoff_base_ms")]
    pub retry_backoff_base_ms: u64,
}

/// Transient user-facing notices.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Announce the endpoint used for every dispatch (default: false).
    #[serde(default)]
    pub on_switch: bool,
}

/// Where rotation state is persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingsConfig {
    /// Settings file; defaults to `<config_dir>/api-rotator/settings.json`.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Key of this instance inside the settings file.
    #[serde(default = "default_settings_key")]
    pub key: String,
    /// Debounce window for background saves in milliseconds (default: 250).
    #[serde(default = "default_save_debounce_ms")]
    pub save_debounce_ms: u64,
}

fn default_true() -> bool {
    true
}

fn default_proxy_bind_addr() -> String {
    "127.0.0.1:8787".to_string()
}

fn default_upstream_base_url() -> String {
    "https://api.openai.com".to_string()
}

fn default_max_body_bytes() -> usize {
    32 * 1024 * 1024
}

fn default_timeout() -> u32 {
    300
}

fn default_connect_timeout() -> u32 {
    10
}

fn default_pool_idle_timeout() -> u32 {
    90
}

fn default_pool_max_idle_per_host() -> u32 {
    8
}

fn default_max_endpoints() -> u32 {
    3
}

fn default_retry_backoff_base_ms() -> u64 {
    200
}

fn default_settings_key() -> String {
    DEFAULT_SETTINGS_KEY.to_string()
}

fn default_save_debounce_ms() -> u64 {
    250
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_proxy_bind_addr(),
            upstream_base_url: default_upstream_base_url(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            timeout_seconds: default_timeout(),
            connect_timeout_seconds: default_connect_timeout(),
            pool_idle_timeout_seconds: default_pool_idle_timeout(),
            pool_max_idle_per_host: default_pool_max_idle_per_host(),
        }
    }
}

impl Default for FailoverConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_endpoints: default_max_endpoints(),
            retries_per_endpoint: 0,
            retry_backoff_base_ms: default_retry_backoff_base_ms(),
        }
    }
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            path: None,
            key: default_settings_key(),
            save_debounce_ms: default_save_debounce_ms(),
        }
    }
}
