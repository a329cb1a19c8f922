mod loader;
mod store;
mod types;

pub use loader::{ConfigError, MAX_RETRIES_PER_ENDPOINT};
pub use store::ConfigStore;
pub use types::{
    Config, Defaults, FailoverConfig, NotificationConfig, ProxyConfig, SettingsConfig,
};
