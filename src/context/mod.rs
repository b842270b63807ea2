//! Application context and registration model.
//!
//! # Data Flow
//! ```text
//! WebApp install
//!     → app_context.rs (declare registrations, mappings, listeners)
//!     → registration.rs (Open: init params and mappings mutable)
//!     → initialize: registrations Frozen, components created,
//!       listener.rs context_initialized in declaration order
//!     → requests read attributes.rs and component instances
//!     → destroy: context_destroyed in reverse order
//! ```
//!
//! # Design Decisions
//! - The context never owns its server; it carries an `AppId`, the server
//!   name and a weak `ContextDirectory` for cross-application lookups
//! - Attribute values are `serde_json::Value`

pub mod app_context;
pub mod attributes;
pub mod listener;
pub mod registration;
pub mod session;

pub use app_context::{AppContext, AppId, ContextDirectory, ContextError, ContextState};
pub use attributes::{AttributeChange, AttributeScope};
pub use listener::{AttributeListener, ContextListener, Listener};
pub use registration::{Registration, RegistrationError, RegistrationState};
pub use session::{Session, SessionStore, SESSION_COOKIE};
