//! Local HTTP proxy: request rewriting, failover dispatch and the axum
//! server around them.

pub mod dispatch;
pub mod error;
pub mod rewrite;
pub mod router;
pub mod server;
pub mod shutdown;
pub mod transport;

pub use dispatch::{AttemptFailure, DispatchError, Dispatcher};
pub use error::ProxyError;
pub use rewrite::{rewrite, ApiPath, OutboundRequest};
pub use router::{build_router, RotationStatus, RouterEngine};
pub use server::{ProxyHandle, ProxyServer, ServerError};
pub use shutdown::{ShutdownManager, ShutdownReason};
pub use transport::{HttpTransport, TimeoutConfig, Transport, TransportError};
