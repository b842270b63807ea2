//! Descriptor loading from disk.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::descriptor::schema::{RawDescriptor, RawParam, ShapeError};
use crate::descriptor::{
    AppDescriptor, ComponentDecl, ComponentKind, ErrorPage, PatternMapping, ServletFilterMapping,
    DEFAULT_VERSION,
};

/// Descriptor location relative to an application root.
pub const DESCRIPTOR_PATH: &str = "WEB-INF/web.xml";

/// Error type for descriptor loading. `root` identifies the application.
#[derive(Debug, thiserror::Error)]
pub enum DescriptorError {
    #[error("failed to read descriptor {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed descriptor for {root}: {source}")]
    Parse {
        root: String,
        #[source]
        source: roxmltree::Error,
    },

    #[error("<{parent}> without <{child}> in descriptor of {root}")]
    MissingElement {
        parent: &'static str,
        child: &'static str,
        root: String,
    },

    #[error("invalid <{element}> value `{value}` in descriptor of {root}")]
    InvalidValue {
        element: &'static str,
        value: String,
        root: String,
    },

    #[error("{kind} `{name}` is mapped but not declared in descriptor of {root}")]
    UndeclaredComponent {
        kind: ComponentKind,
        name: String,
        root: String,
    },

    #[error("{kind} `{name}` is declared more than once in descriptor of {root}")]
    DuplicateComponent {
        kind: ComponentKind,
        name: String,
        root: String,
    },

    #[error("{kind} declaration with an empty name in descriptor of {root}")]
    EmptyName { kind: ComponentKind, root: String },

    #[error("{kind} mapping for `{name}` has no url-pattern or servlet-name in descriptor of {root}")]
    EmptyMapping {
        kind: ComponentKind,
        name: String,
        root: String,
    },
}

/// Load `<root>/WEB-INF/web.xml`.
pub fn load_descriptor(root: &Path) -> Result<AppDescriptor, DescriptorError> {
    let path = root.join(DESCRIPTOR_PATH);
    let content = fs::read_to_string(&path).map_err(|source| DescriptorError::Io {
        path: path.clone(),
        source,
    })?;
    parse_descriptor(&content, &root.display().to_string())
}

/// Parse descriptor text. `root` is only used to identify the application in errors.
pub fn parse_descriptor(content: &str, root: &str) -> Result<AppDescriptor, DescriptorError> {
    let document = roxmltree::Document::parse(content).map_err(|source| DescriptorError::Parse {
        root: root.to_string(),
        source,
    })?;
    let raw = RawDescriptor::from_root(document.root_element()).map_err(|e| match e {
        ShapeError::Missing { parent, child } => DescriptorError::MissingElement {
            parent,
            child,
            root: root.to_string(),
        },
        ShapeError::Invalid { element, value } => DescriptorError::InvalidValue {
            element,
            value,
            root: root.to_string(),
        },
    })?;
    for element in &raw.unknown {
        tracing::warn!(root = %root, element = %element, "Ignoring unknown descriptor element");
    }

    build(raw, root)
}

fn build(raw: RawDescriptor, root: &str) -> Result<AppDescriptor, DescriptorError> {
    let servlets = raw
        .servlet
        .into_iter()
        .map(|s| component(s.servlet_name, s.servlet_class, s.init_param))
        .collect::<Vec<_>>();
    check_declarations(ComponentKind::Servlet, &servlets, root)?;

    let filters = raw
        .filter
        .into_iter()
        .map(|f| component(f.filter_name, f.filter_class, f.init_param))
        .collect::<Vec<_>>();
    check_declarations(ComponentKind::Filter, &filters, root)?;

    let servlet_names: HashSet<&str> = servlets.iter().map(|s| s.name.as_str()).collect();
    let filter_names: HashSet<&str> = filters.iter().map(|f| f.name.as_str()).collect();
    let undeclared = |kind, name: &str| DescriptorError::UndeclaredComponent {
        kind,
        name: name.to_string(),
        root: root.to_string(),
    };

    let mut servlet_mappings = Vec::new();
    for mapping in raw.servlet_mapping {
        let name = mapping.servlet_name.trim();
        if !servlet_names.contains(name) {
            return Err(undeclared(ComponentKind::Servlet, name));
        }
        if mapping.url_pattern.is_empty() {
            return Err(DescriptorError::EmptyMapping {
                kind: ComponentKind::Servlet,
                name: name.to_string(),
                root: root.to_string(),
            });
        }
        for pattern in mapping.url_pattern {
            servlet_mappings.push(PatternMapping {
                pattern: pattern.trim().to_string(),
                component: name.to_string(),
            });
        }
    }

    let mut filter_mappings = Vec::new();
    let mut servlet_filter_mappings = Vec::new();
    for mapping in raw.filter_mapping {
        let name = mapping.filter_name.trim();
        if !filter_names.contains(name) {
            return Err(undeclared(ComponentKind::Filter, name));
        }
        if mapping.url_pattern.is_empty() && mapping.servlet_name.is_empty() {
            return Err(DescriptorError::EmptyMapping {
                kind: ComponentKind::Filter,
                name: name.to_string(),
                root: root.to_string(),
            });
        }
        for pattern in mapping.url_pattern {
            filter_mappings.push(PatternMapping {
                pattern: pattern.trim().to_string(),
                component: name.to_string(),
            });
        }
        for servlet in &mapping.servlet_name {
            let servlet = servlet.trim();
            if !servlet_names.contains(servlet) {
                return Err(undeclared(ComponentKind::Servlet, servlet));
            }
            servlet_filter_mappings.push(ServletFilterMapping {
                servlet: servlet.to_string(),
                filter: name.to_string(),
            });
        }
    }

    let descriptor = AppDescriptor {
        id: raw
            .id
            .unwrap_or_else(|| format!("WebApp_ID{}", uuid::Uuid::new_v4())),
        version: raw.version.unwrap_or_else(|| DEFAULT_VERSION.to_string()),
        display_name: raw.display_name.map(|s| s.trim().to_string()).unwrap_or_default(),
        description: raw.description.map(|s| s.trim().to_string()).unwrap_or_default(),
        context_params: params(raw.context_param),
        listeners: raw
            .listener
            .into_iter()
            .map(|l| l.listener_class.trim().to_string())
            .collect(),
        error_pages: raw
            .error_page
            .into_iter()
            .map(|p| ErrorPage {
                error_code: p.error_code,
                exception_type: p.exception_type,
                location: p.location.trim().to_string(),
            })
            .collect(),
        welcome_files: raw
            .welcome_file_list
            .map(|list| list.welcome_file)
            .unwrap_or_default(),
        session_timeout: raw.session_timeout,
        servlets,
        filters,
        servlet_mappings,
        filter_mappings,
        servlet_filter_mappings,
    };

    tracing::debug!(
        root = %root,
        id = %descriptor.id,
        servlets = descriptor.servlets.len(),
        filters = descriptor.filters.len(),
        listeners = descriptor.listeners.len(),
        "Descriptor loaded"
    );
    Ok(descriptor)
}

fn component(name: String, class: String, init: Vec<RawParam>) -> ComponentDecl {
    ComponentDecl {
        name: name.trim().to_string(),
        class: class.trim().to_string(),
        init_params: params(init),
    }
}

fn params(raw: Vec<RawParam>) -> Vec<(String, String)> {
    raw.into_iter()
        .map(|p| (p.param_name.trim().to_string(), p.param_value))
        .collect()
}

fn check_declarations(kind: ComponentKind, decls: &[ComponentDecl], root: &str) -> Result<(), DescriptorError> {
    let mut seen = HashSet::new();
    for decl in decls {
        if decl.name.is_empty() {
            return Err(DescriptorError::EmptyName {
                kind,
                root: root.to_string(),
            });
        }
        if !seen.insert(decl.name.as_str()) {
            return Err(DescriptorError::DuplicateComponent {
                kind,
                name: decl.name.clone(),
                root: root.to_string(),
            });
        }
    }
    Ok(())
}
