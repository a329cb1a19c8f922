use std::fs;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::config::types::Config;
use crate::settings::JsonFileStore;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid TOML in {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Upper bound on same-endpoint retries.
pub const MAX_RETRIES_PER_ENDPOINT: u32 = 10;

fn ensure(ok: bool, message: impl FnOnce() -> String) -> Result<(), ConfigError> {
    if ok {
        Ok(())
    } else {
        Err(ConfigError::Invalid(message()))
    }
}

impl Config {
    /// `<config_dir>/api-rotator/config.toml`, or `./api-rotator/config.toml`
    /// when the platform has no config dir.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("api-rotator")
            .join("config.toml")
    }

    /// A missing file means defaults. Anything else must read, parse and
    /// validate.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Config::default()),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        let config: Config = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let proxy = &self.proxy;
        ensure(proxy.bind_addr.parse::<SocketAddr>().is_ok(), || {
            format!("bind address '{}' is not host:port", proxy.bind_addr)
        })?;

        let upstream_ok = reqwest::Url::parse(&proxy.upstream_base_url)
            .map(|url| matches!(url.scheme(), "http" | "https"))
            .unwrap_or(false);
        ensure(upstream_ok, || {
            format!(
                "upstream_base_url '{}' must be an http(s) URL",
                proxy.upstream_base_url
            )
        })?;

        ensure(self.failover.max_endpoints >= 1, || {
            "failover.max_endpoints must be at least 1".to_string()
        })?;
        ensure(
            self.failover.retries_per_endpoint <= MAX_RETRIES_PER_ENDPOINT,
            || format!("failover.retries_per_endpoint must be at most {MAX_RETRIES_PER_ENDPOINT}"),
        )?;
        ensure(!self.settings.key.trim().is_empty(), || {
            "settings.key must not be empty".to_string()
        })
    }

    /// Settings file path, honouring the `[settings] path` override.
    pub fn settings_path(&self) -> PathBuf {
        self.settings
            .path
            .clone()
            .unwrap_or_else(JsonFileStore::default_path)
    }
}
