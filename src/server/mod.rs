//! Server subsystem.
//!
//! # Data Flow
//! ```text
//! Connector
//!     → Server::handle_http
//!     → content_path(request path) → cached app lookup
//!     → WebApp::handle (servlet + filter chain)
//!     → root application fallback → DefaultHandler
//! ```

pub mod content_path;
pub mod dispatcher;
#[allow(clippy::module_inception)]
pub mod server;

pub use content_path::content_path;
pub use dispatcher::{DefaultHandler, HttpDispatcher, NotFoundHandler};
pub use server::{Server, ServerError, ServerState};
