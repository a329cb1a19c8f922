//! Helpers shared by the integration tests: configs, rotators and a
//! proxy running in the background.

#![allow(dead_code)]

pub mod mock_backend;

use std::net::{SocketAddr, TcpListener};
use std::path::PathBuf;
use std::time::Duration;

use api_rotator::config::{Config, ConfigStore};
use api_rotator::proxy::ProxyServer;
use api_rotator::rotation::{EndpointDraft, EndpointIntent, RotationState, Rotator};

/// A port nothing listens on once this returns, for "unreachable" cases.
pub fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .and_then(|l| l.local_addr())
        .map(|a| a.port())
        .expect("ephemeral port")
}

/// Config on an OS-assigned port with short timeouts and no backoff.
pub fn test_config(upstream_base_url: &str) -> Config {
    let mut config = Config::default();
    config.proxy.bind_addr = "127.0.0.1:0".to_string();
    config.proxy.upstream_base_url = upstream_base_url.to_string();
    config.defaults.timeout_seconds = 5;
    config.defaults.connect_timeout_seconds = 2;
    config.failover.retry_backoff_base_ms = 0;
    config
}

/// In-memory rotator holding one enabled endpoint per `(name, base_url)`.
pub fn rotator_with<S: AsRef<str>>(endpoints: &[(&str, S)]) -> Rotator {
    let rotator = Rotator::in_memory(RotationState::default());
    for (name, base_url) in endpoints {
        rotator
            .apply(EndpointIntent::Add {
                draft: EndpointDraft::new(*name, base_url.as_ref()),
            })
            .expect("valid endpoint");
    }
    rotator
}

/// Bind a proxy, serve it on a background task and return its address.
pub async fn start_proxy(config: Config, rotator: Rotator) -> SocketAddr {
    let store = ConfigStore::new(config, PathBuf::from("config.toml"));
    let mut server = ProxyServer::new(store.clone(), rotator).expect("proxy server");
    let addr = server.try_bind(&store).await.expect("bind proxy");
    tokio::spawn(server.run());

    assert!(
        accepts_connections(addr, Duration::from_secs(2)).await,
        "proxy on {addr} never came up"
    );
    addr
}

/// Poll `addr` until a TCP connect succeeds or `within` elapses.
pub async fn accepts_connections(addr: SocketAddr, within: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + within;
    loop {
        if tokio::net::TcpStream::connect(addr).await.is_ok() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
