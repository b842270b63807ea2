//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Server::start
//!     → Connector::bind (blocks the calling thread)
//!     → accept → parse head (http::codec) → discard body
//!     → connection::dispatch → HttpDispatcher::handle_http
//!     → response_bytes → socket
//!
//! Server::stop
//!     → Connector::close → in-flight and queued requests answered
//!     → bind returns → close returns → applications destroyed
//! ```
//!
//! # Design Decisions
//! - Two interchangeable connectors behind one trait, chosen by config
//! - One request per connection; the response always closes it
//! - A panic while dispatching becomes a `500`, never a dead worker

pub mod blocking;
pub mod connection;
pub mod gate;
pub mod pool;
pub mod reactor;

use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;

use crate::config::{ConnectorConfig, ConnectorKind};
use crate::server::HttpDispatcher;

pub use blocking::BlockingConnector;
pub use reactor::ReactorConnector;

#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to start connector runtime: {0}")]
    Runtime(#[source] std::io::Error),
}

/// Owns the listening socket and feeds requests to a dispatcher.
pub trait Connector: Send + Sync + std::fmt::Debug {
    /// Listen on `host:port` and serve until [`Connector::close`] is called.
    ///
    /// Blocks the calling thread. Returns immediately if the connector is
    /// already closed. A second `bind` waits for the running one to end.
    fn bind(&self, host: &str, port: u16, dispatcher: Arc<dyn HttpDispatcher>) -> Result<(), ConnectorError>;

    /// Stop accepting and block until the running `bind` has drained and
    /// returned. Accepted requests are answered first; the reactor connector
    /// aborts whatever is left after its drain timeout. Idempotent.
    ///
    /// Must not be called from a request handler: it would wait on itself.
    fn close(&self);

    /// Re-arm a closed connector so `bind` can run again.
    fn reset(&self);

    /// Bound address while listening.
    fn local_addr(&self) -> Option<SocketAddr>;

    fn name(&self) -> &'static str;
}

pub fn build_connector(config: &ConnectorConfig) -> Arc<dyn Connector> {
    match config.kind {
        ConnectorKind::Blocking => Arc::new(BlockingConnector::new(config)),
        ConnectorKind::Reactor => Arc::new(ReactorConnector::new(config)),
    }
}
