//! Request-handling components.
//!
//! # Data Flow
//! ```text
//! Descriptor declares `servlet-class` / `filter-class` / `listener-class`
//!     → registry.rs (implementation reference → factory)
//!     → Servlet / Filter instance, `init` with its ComponentConfig
//!     → FilterChain (matching filters in order, then the servlet)
//! ```
//!
//! # Design Decisions
//! - Components are trait objects created by registered factories
//! - `init` runs on an owned instance before it is shared
//! - Each filter decides whether the chain continues

pub mod builtin;
pub mod registry;

use std::sync::Arc;

use crate::http::{Request, Response};

pub use registry::{ComponentRegistry, RegistryError};

/// Error returned by a component while handling a request.
#[derive(Debug, thiserror::Error)]
pub enum ComponentError {
    #[error("{0}")]
    Failed(String),

    #[error("missing init parameter `{0}`")]
    MissingParameter(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ComponentError {
    pub fn failed(message: impl Into<String>) -> Self {
        ComponentError::Failed(message.into())
    }

    /// Name matched against `exception-type` in error pages.
    pub fn kind(&self) -> &'static str {
        match self {
            ComponentError::Failed(_) => "Failed",
            ComponentError::MissingParameter(_) => "MissingParameter",
            ComponentError::Io(_) => "Io",
        }
    }
}

/// Name and init parameters handed to a component's `init`.
#[derive(Debug, Clone, Default)]
pub struct ComponentConfig {
    pub name: String,
    pub init_params: Vec<(String, String)>,
}

impl ComponentConfig {
    pub fn new(name: impl Into<String>, init_params: Vec<(String, String)>) -> Self {
        Self {
            name: name.into(),
            init_params,
        }
    }

    pub fn init_parameter(&self, name: &str) -> Option<&str> {
        self.init_params
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn require(&self, name: &str) -> Result<&str, ComponentError> {
        self.init_parameter(name)
            .ok_or_else(|| ComponentError::MissingParameter(name.to_string()))
    }
}

/// Terminal request handler.
pub trait Servlet: Send + Sync {
    fn init(&mut self, _config: &ComponentConfig) -> Result<(), ComponentError> {
        Ok(())
    }

    fn service(&self, request: &Request, response: &mut Response) -> Result<(), ComponentError>;

    fn destroy(&self) {}
}

/// Interceptor that runs before the servlet and may short-circuit.
pub trait Filter: Send + Sync {
    fn init(&mut self, _config: &ComponentConfig) -> Result<(), ComponentError> {
        Ok(())
    }

    /// Call `chain.proceed(..)` to continue; returning without it stops the chain.
    fn do_filter(
        &self,
        request: &Request,
        response: &mut Response,
        chain: FilterChain<'_>,
    ) -> Result<(), ComponentError>;

    fn destroy(&self) {}
}

/// The remaining filters and the servlet at the end of the chain.
#[derive(Clone, Copy)]
pub struct FilterChain<'a> {
    filters: &'a [Arc<dyn Filter>],
    servlet: Option<&'a dyn Servlet>,
}

impl<'a> FilterChain<'a> {
    pub fn new(filters: &'a [Arc<dyn Filter>], servlet: Option<&'a dyn Servlet>) -> Self {
        Self { filters, servlet }
    }

    /// Invoke the next filter, or the servlet once filters are exhausted.
    pub fn proceed(self, request: &Request, response: &mut Response) -> Result<(), ComponentError> {
        match self.filters.split_first() {
            Some((filter, rest)) => filter.do_filter(
                request,
                response,
                FilterChain {
                    filters: rest,
                    servlet: self.servlet,
                },
            ),
            None => match self.servlet {
                Some(servlet) => servlet.service(request, response),
                None => Ok(()),
            },
        }
    }

    pub fn remaining(&self) -> usize {
        self.filters.len()
    }
}
