//! Implementation reference → factory lookup.
//!
//! Descriptors name implementations by string (`servlet-class`,
//! `filter-class`, `listener-class`). The registry is populated before any
//! application is installed and is read-only afterwards.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::component::builtin::{HeaderFilter, LifecycleLogger, TextServlet};
use crate::component::{Filter, Servlet};
use crate::context::listener::{AttributeListener, ContextListener, Listener};

type ServletFactory = Arc<dyn Fn() -> Box<dyn Servlet> + Send + Sync>;
type FilterFactory = Arc<dyn Fn() -> Box<dyn Filter> + Send + Sync>;
type ListenerFactory = Arc<dyn Fn() -> Listener + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("no {kind} implementation registered for `{class}`")]
    Unresolved { kind: &'static str, class: String },
}

/// Maps implementation references to factories.
#[derive(Clone, Default)]
pub struct ComponentRegistry {
    servlets: HashMap<String, ServletFactory>,
    filters: HashMap<String, FilterFactory>,
    listeners: HashMap<String, ListenerFactory>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry preloaded with the components in [`builtin`](crate::component::builtin).
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register_servlet(TextServlet::CLASS, || Box::new(TextServlet::default()));
        registry.register_filter(HeaderFilter::CLASS, || Box::new(HeaderFilter::default()));
        registry.register_context_listener(LifecycleLogger::CLASS, || Arc::new(LifecycleLogger));
        registry
    }

    pub fn register_servlet<F>(&mut self, class: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn() -> Box<dyn Servlet> + Send + Sync + 'static,
    {
        self.servlets.insert(class.into(), Arc::new(factory));
        self
    }

    pub fn register_filter<F>(&mut self, class: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn() -> Box<dyn Filter> + Send + Sync + 'static,
    {
        self.filters.insert(class.into(), Arc::new(factory));
        self
    }

    pub fn register_context_listener<F>(&mut self, class: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn() -> Arc<dyn ContextListener> + Send + Sync + 'static,
    {
        self.listeners
            .insert(class.into(), Arc::new(move || Listener::Context(factory())));
        self
    }

    pub fn register_attribute_listener<F>(&mut self, class: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn() -> Arc<dyn AttributeListener> + Send + Sync + 'static,
    {
        self.listeners
            .insert(class.into(), Arc::new(move || Listener::Attribute(factory())));
        self
    }

    pub fn create_servlet(&self, class: &str) -> Result<Box<dyn Servlet>, RegistryError> {
        self.servlets
            .get(class)
            .map(|factory| factory())
            .ok_or_else(|| unresolved("servlet", class))
    }

    pub fn create_filter(&self, class: &str) -> Result<Box<dyn Filter>, RegistryError> {
        self.filters
            .get(class)
            .map(|factory| factory())
            .ok_or_else(|| unresolved("filter", class))
    }

    pub fn create_listener(&self, class: &str) -> Result<Listener, RegistryError> {
        self.listeners
            .get(class)
            .map(|factory| factory())
            .ok_or_else(|| unresolved("listener", class))
    }

    pub fn has_servlet(&self, class: &str) -> bool {
        self.servlets.contains_key(class)
    }

    pub fn has_filter(&self, class: &str) -> bool {
        self.filters.contains_key(class)
    }

    pub fn has_listener(&self, class: &str) -> bool {
        self.listeners.contains_key(class)
    }
}

impl fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut servlets: Vec<_> = self.servlets.keys().collect();
        let mut filters: Vec<_> = self.filters.keys().collect();
        let mut listeners: Vec<_> = self.listeners.keys().collect();
        servlets.sort();
        filters.sort();
        listeners.sort();
        f.debug_struct("ComponentRegistry")
            .field("servlets", &servlets)
            .field("filters", &filters)
            .field("listeners", &listeners)
            .finish()
    }
}

fn unresolved(kind: &'static str, class: &str) -> RegistryError {
    RegistryError::Unresolved {
        kind,
        class: class.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_resolve() {
        let registry = ComponentRegistry::with_builtins();
        assert!(registry.create_servlet(TextServlet::CLASS).is_ok());
        assert!(registry.create_filter(HeaderFilter::CLASS).is_ok());
        assert!(matches!(
            registry.create_listener(LifecycleLogger::CLASS),
            Ok(Listener::Context(_))
        ));
    }

    #[test]
    fn unknown_reference_is_unresolved() {
        let registry = ComponentRegistry::new();
        assert_eq!(
            registry.create_servlet("x.Missing").err(),
            Some(RegistryError::Unresolved {
                kind: "servlet",
                class: "x.Missing".into()
            })
        );
        assert!(!registry.has_filter("x.Missing"));
    }
}
