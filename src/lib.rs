//! Minimal HTTP/1.1 server hosting multiple applications.

// Wire format and connectors
pub mod http;
pub mod net;

// Applications
pub mod component;
pub mod context;
pub mod descriptor;
pub mod routing;
pub mod webapp;

// Server and cross-cutting concerns
pub mod config;
pub mod lifecycle;
pub mod observability;
pub mod server;

pub use component::ComponentRegistry;
pub use config::ServerConfig;
pub use server::{Server, ServerError, ServerState};
pub use webapp::WebApp;
