//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ServerConfig (validated, immutable)
//!     → Server, connector, observability built from it
//!
//! On descriptor change:
//!     watcher.rs detects a modified <root>/WEB-INF/web.xml
//!     → application root sent to the reload loop
//!     → Server::reload_app re-installs that application
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; only application descriptors reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, ConfigError};
pub use schema::{ApplicationConfig, ConnectorConfig, ConnectorKind, ObservabilityConfig, ServerConfig};
pub use watcher::DescriptorWatcher;
