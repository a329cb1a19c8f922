use std::net::SocketAddr;
use std::ops::RangeInclusive;
use std::sync::Arc;

use thiserror::Error;
use tokio::net::TcpListener;

use crate::config::ConfigStore;
use crate::events::EventBus;
use crate::proxy::dispatch::Dispatcher;
use crate::proxy::router::{build_router, RouterEngine};
use crate::proxy::shutdown::ShutdownManager;
use crate::proxy::transport::{HttpTransport, TimeoutConfig, Transport, TransportError};
use crate::rotation::Rotator;

/// How many ports above the configured one are tried when it is taken.
const PORT_SEARCH_SPAN: u16 = 100;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Invalid bind address '{addr}': {message}")]
    InvalidBindAddr { addr: String, message: String },

    #[error("No free port in {start}-{end}")]
    NoFreePort { start: u16, end: u16 },

    #[error("Proxy is not bound to a port yet")]
    NotBound,

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Server I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Local HTTP front of the rotator.
///
/// Binding and serving are separate steps so the caller learns the actual
/// port before traffic starts. The listener bound by
/// [`try_bind`](Self::try_bind) is the one [`run`](Self::run) serves on.
pub struct ProxyServer {
    pub addr: SocketAddr,
    listener: Option<TcpListener>,
    engine: RouterEngine,
    dispatcher: Arc<Dispatcher>,
    stop: Arc<ShutdownManager>,
}

impl ProxyServer {
    /// Server with the reqwest transport built from `[defaults]`.
    pub fn new(config: ConfigStore, rotator: Rotator) -> Result<Self, ServerError> {
        let timeouts = TimeoutConfig::from(&config.get().defaults);
        let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new(timeouts)?);
        Ok(Self::with_transport(config, rotator, transport))
    }

    pub fn with_transport(
        config: ConfigStore,
        rotator: Rotator,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let dispatcher = Arc::new(Dispatcher::new(
            rotator,
            transport,
            config.clone(),
            EventBus::default(),
        ));
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            listener: None,
            engine: RouterEngine::new(config, dispatcher.clone()),
            dispatcher,
            stop: Arc::new(ShutdownManager::new()),
        }
    }

    /// Bind the configured address, or the next free port above it.
    pub async fn try_bind(&mut self, config: &ConfigStore) -> Result<SocketAddr, ServerError> {
        let requested = config.get().proxy.bind_addr.clone();
        let wanted: SocketAddr =
            requested
                .parse()
                .map_err(|e: std::net::AddrParseError| ServerError::InvalidBindAddr {
                    addr: requested.clone(),
                    message: e.to_string(),
                })?;

        let listener = bind_first_free(wanted).await?;
        self.addr = listener.local_addr()?;
        self.listener = Some(listener);
        tracing::info!(addr = %self.addr, "Proxy bound");
        Ok(self.addr)
    }

    pub fn events(&self) -> EventBus {
        self.dispatcher.events().clone()
    }

    pub fn handle(&self) -> ProxyHandle {
        ProxyHandle {
            stop: self.stop.clone(),
        }
    }

    /// Serve until Ctrl-C, SIGTERM or [`ProxyHandle::shutdown`].
    pub async fn run(self) -> Result<(), ServerError> {
        let Some(listener) = self.listener else {
            return Err(ServerError::NotBound);
        };
        tracing::info!(addr = %self.addr, "Proxy listening");

        let stop = self.stop;
        let drained = async move {
            if let Err(e) = stop.wait().await {
                tracing::warn!(error = %e, "Signal handler failed, stopping");
            }
        };
        axum::serve(listener, build_router(self.engine))
            .with_graceful_shutdown(drained)
            .await?;

        tracing::info!("Proxy stopped");
        Ok(())
    }
}

fn candidate_ports(start: u16) -> RangeInclusive<u16> {
    // Port 0 lets the OS choose, so there is nothing to walk.
    if start == 0 {
        0..=0
    } else {
        start..=start.saturating_add(PORT_SEARCH_SPAN)
    }
}

async fn bind_first_free(wanted: SocketAddr) -> Result<TcpListener, ServerError> {
    let ports = candidate_ports(wanted.port());
    for port in ports.clone() {
        match TcpListener::bind(SocketAddr::new(wanted.ip(), port)).await {
            Ok(listener) => return Ok(listener),
            Err(e) => tracing::debug!(port, error = %e, "Port unavailable"),
        }
    }
    Err(ServerError::NoFreePort {
        start: *ports.start(),
        end: *ports.end(),
    })
}

/// Cloneable remote control for a running [`ProxyServer`].
#[derive(Clone)]
pub struct ProxyHandle {
    stop: Arc<ShutdownManager>,
}

impl ProxyHandle {
    /// Stop accepting connections; in-flight requests finish first.
    pub fn shutdown(&self) {
        self.stop.request();
    }
}
