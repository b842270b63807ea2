//! Lifecycle and attribute listener contracts.

use std::sync::Arc;

use serde_json::Value;

use crate::context::AppContext;

/// Notified when an application context starts and stops.
pub trait ContextListener: Send + Sync {
    fn context_initialized(&self, _context: &AppContext) {}

    fn context_destroyed(&self, _context: &AppContext) {}
}

/// Notified on every change to a context attribute.
pub trait AttributeListener: Send + Sync {
    fn attribute_added(&self, _name: &str, _value: &Value) {}

    fn attribute_replaced(&self, _name: &str, _old: &Value, _new: &Value) {}

    fn attribute_removed(&self, _name: &str, _value: &Value) {}
}

/// A listener instance produced by the component registry.
#[derive(Clone)]
pub enum Listener {
    Context(Arc<dyn ContextListener>),
    Attribute(Arc<dyn AttributeListener>),
}

impl std::fmt::Debug for Listener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Listener::Context(_) => f.write_str("Listener::Context"),
            Listener::Attribute(_) => f.write_str("Listener::Attribute"),
        }
    }
}
