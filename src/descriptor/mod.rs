//! Application descriptor subsystem.
//!
//! # Data Flow
//! ```text
//! <root>/WEB-INF/web.xml
//!     → loader.rs (read, parse the element tree)
//!     → schema.rs (raw shape, unknown elements collected)
//!     → loader.rs (reference checks, pattern normalization)
//!     → AppDescriptor (validated, immutable)
//! ```
//!
//! # Design Decisions
//! - A mapping naming an undeclared component fails the whole load
//! - Unknown elements are logged, never fatal
//! - Elements are matched by local name; namespaces are ignored
//! - Declaration order is preserved everywhere it is observable

pub mod loader;
pub(crate) mod schema;

use std::fmt;

use serde::Serialize;

pub use loader::{load_descriptor, parse_descriptor, DescriptorError, DESCRIPTOR_PATH};

/// Version assumed when the descriptor does not declare one.
pub const DEFAULT_VERSION: &str = "3.1";

/// The two kinds of request-handling components an application declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentKind {
    Servlet,
    Filter,
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComponentKind::Servlet => f.write_str("servlet"),
            ComponentKind::Filter => f.write_str("filter"),
        }
    }
}

/// A declared servlet or filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComponentDecl {
    pub name: String,
    /// Implementation reference resolved through the component registry.
    pub class: String,
    /// Init parameters in declaration order.
    pub init_params: Vec<(String, String)>,
}

/// A URL pattern bound to a component name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PatternMapping {
    pub pattern: String,
    pub component: String,
}

/// A filter applied by servlet name rather than by URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServletFilterMapping {
    pub servlet: String,
    pub filter: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorPage {
    pub error_code: Option<u16>,
    pub exception_type: Option<String>,
    pub location: String,
}

/// Everything an application descriptor declares.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppDescriptor {
    pub id: String,
    pub version: String,
    pub display_name: String,
    pub description: String,
    pub context_params: Vec<(String, String)>,
    pub servlets: Vec<ComponentDecl>,
    pub filters: Vec<ComponentDecl>,
    pub servlet_mappings: Vec<PatternMapping>,
    pub filter_mappings: Vec<PatternMapping>,
    pub servlet_filter_mappings: Vec<ServletFilterMapping>,
    /// Listener implementation references in declaration order.
    pub listeners: Vec<String>,
    pub error_pages: Vec<ErrorPage>,
    pub welcome_files: Vec<String>,
    /// `<session-config><session-timeout>` in minutes.
    pub session_timeout: Option<u32>,
}

impl AppDescriptor {
    pub fn servlet(&self, name: &str) -> Option<&ComponentDecl> {
        self.servlets.iter().find(|s| s.name == name)
    }

    pub fn filter(&self, name: &str) -> Option<&ComponentDecl> {
        self.filters.iter().find(|f| f.name == name)
    }

    /// Location configured for an HTTP error status.
    pub fn error_page_for(&self, status: u16) -> Option<&str> {
        self.error_pages
            .iter()
            .find(|page| page.error_code == Some(status))
            .map(|page| page.location.as_str())
    }
}
