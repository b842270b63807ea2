//! An installed web application.
//!
//! # Responsibilities
//! - Build an `AppContext` from a validated descriptor
//! - Derive the context path from the root directory name
//! - Route an application-relative path to a servlet, its filters, and
//!   configured error pages
//!
//! # Data Flow
//! ```text
//! Request (path under the context path)
//!     → strip context path
//!     → PatternRouter::resolve_servlet (welcome files for `.../`)
//!     → matching filters → FilterChain → servlet
//!     → error page forward when the status (or error kind) has one
//! ```

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use serde_json::{json, Value};

use crate::component::{ComponentError, ComponentRegistry, FilterChain};
use crate::context::{AppContext, ContextError, Registration, SESSION_COOKIE};
use crate::descriptor::{load_descriptor, AppDescriptor, ComponentKind, DescriptorError};
use crate::http::{Cookie, Request, Response};

/// Root directory names that map to the `/` context path.
pub const ROOT_APP_NAMES: &[&str] = &["root", "ROOT"];

#[derive(Debug, thiserror::Error)]
pub enum InstallError {
    #[error(transparent)]
    Descriptor(#[from] DescriptorError),

    #[error("failed to set up application context: {0}")]
    Context(#[from] ContextError),

    #[error("application at {} is already installed", .0.display())]
    DuplicateRoot(PathBuf),

    #[error("no application installed at {}", .0.display())]
    NotInstalled(PathBuf),
}

#[derive(Debug, Default)]
struct Admission {
    in_flight: usize,
    retired: bool,
}

pub struct WebApp {
    root: PathBuf,
    descriptor: AppDescriptor,
    context: Arc<AppContext>,
    admission: Mutex<Admission>,
    idle: Condvar,
}

/// Held while a request runs inside an application.
#[must_use]
pub struct InFlight<'a>(&'a WebApp);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut admission = self.0.admission.lock();
        admission.in_flight -= 1;
        if admission.in_flight == 0 {
            self.0.idle.notify_all();
        }
    }
}

impl WebApp {
    /// Read `<root>/WEB-INF/web.xml` and build the application.
    pub fn load(
        root: &Path,
        server_name: &str,
        registry: Arc<ComponentRegistry>,
    ) -> Result<Self, InstallError> {
        let root = normalize_root(root);
        let descriptor = load_descriptor(&root)?;
        Self::from_descriptor(root, descriptor, server_name, registry)
    }

    pub fn from_descriptor(
        root: impl AsRef<Path>,
        descriptor: AppDescriptor,
        server_name: &str,
        registry: Arc<ComponentRegistry>,
    ) -> Result<Self, InstallError> {
        let root = normalize_root(root.as_ref());
        let context = AppContext::new(server_name, context_path_for_root(&root), registry).with_root(&root);
        let timeout = descriptor
            .session_timeout
            .filter(|minutes| *minutes > 0)
            .map(|minutes| Duration::from_secs(u64::from(minutes) * 60));
        context.sessions().set_default_timeout(timeout);

        for (name, value) in &descriptor.context_params {
            if !context.set_init_parameter(name.as_str(), value.as_str())? {
                tracing::warn!(root = %root.display(), param = %name, "Duplicate context-param ignored");
            }
        }
        for decl in &descriptor.servlets {
            context.declare(Registration::from_decl(ComponentKind::Servlet, decl))?;
        }
        for decl in &descriptor.filters {
            context.declare(Registration::from_decl(ComponentKind::Filter, decl))?;
        }
        for mapping in &descriptor.servlet_mappings {
            context.router().add_servlet_mapping(&mapping.pattern, &mapping.component);
            context.record_mapping(ComponentKind::Servlet, &mapping.component, &mapping.pattern)?;
        }
        for mapping in &descriptor.filter_mappings {
            context.router().add_filter_mapping(&mapping.pattern, &mapping.component);
            context.record_mapping(ComponentKind::Filter, &mapping.component, &mapping.pattern)?;
        }
        for mapping in &descriptor.servlet_filter_mappings {
            context.add_filter_servlet_mapping(&mapping.filter, &mapping.servlet)?;
        }
        for class in &descriptor.listeners {
            context.add_listener(class)?;
        }

        tracing::debug!(
            root = %root.display(),
            context_path = %context.context_path(),
            app = %context.id(),
            "Application built"
        );
        Ok(Self {
            root,
            descriptor,
            context: Arc::new(context),
            admission: Mutex::new(Admission::default()),
            idle: Condvar::new(),
        })
    }

    /// Normalized root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn context_path(&self) -> &str {
        self.context.context_path()
    }

    pub fn is_root_app(&self) -> bool {
        self.context.context_path() == "/"
    }

    pub fn descriptor(&self) -> &AppDescriptor {
        &self.descriptor
    }

    pub fn context(&self) -> &AppContext {
        &self.context
    }

    /// Admit one request. `None` once the application has been retired.
    pub fn enter(&self) -> Option<InFlight<'_>> {
        let mut admission = self.admission.lock();
        if admission.retired {
            return None;
        }
        admission.in_flight += 1;
        Some(InFlight(self))
    }

    /// Refuse further requests and wait for admitted ones to finish.
    ///
    /// Must not be called from a request running inside this application.
    pub fn retire(&self) {
        let mut admission = self.admission.lock();
        admission.retired = true;
        while admission.in_flight > 0 {
            self.idle.wait(&mut admission);
        }
    }

    pub fn in_flight(&self) -> usize {
        self.admission.lock().in_flight
    }

    /// Handle a request addressed to this application.
    ///
    /// Returns `Ok(false)` when no servlet claims the path, leaving the
    /// response untouched.
    pub fn handle(&self, request: &Request, response: &mut Response) -> Result<bool, ComponentError> {
        let Some(path) = self.relative_path(request.path()) else {
            return Ok(false);
        };
        let Some((servlet_name, resolved_path)) = self.resolve(path) else {
            return Ok(false);
        };
        let Some(servlet) = self.context.servlet(&servlet_name) else {
            return Ok(false);
        };

        let filter_names = self
            .context
            .router()
            .matching_filters(&resolved_path, Some(servlet_name.as_str()));
        let filters = self.context.filters(&filter_names);

        tracing::debug!(
            app = %self.context.id(),
            path = %resolved_path,
            servlet = %servlet_name,
            filters = filters.len(),
            "Dispatching to servlet"
        );

        request.bind_context(Arc::clone(&self.context));
        let outcome = match FilterChain::new(&filters, Some(servlet.as_ref())).proceed(request, response) {
            Ok(()) => {
                if response.is_error() {
                    if let Some(location) = self.descriptor.error_page_for(response.status()) {
                        self.forward(location, request, response);
                    }
                }
                Ok(true)
            }
            Err(e) => match self.exception_page(&e) {
                Some(location) => {
                    tracing::warn!(app = %self.context.id(), error = %e, location = %location, "Handler failed, forwarding to error page");
                    response.send_error(500);
                    self.forward(location, request, response);
                    Ok(true)
                }
                None => Err(e),
            },
        };
        if let Some(id) = request.take_new_session() {
            response.add_cookie(
                Cookie::new(SESSION_COOKIE, id)
                    .with_path(self.context.context_path())
                    .http_only(true),
            );
        }
        outcome
    }

    /// Path relative to this application's context path, if it lies under it.
    pub fn relative_path<'a>(&self, path: &'a str) -> Option<&'a str> {
        let context_path = self.context.context_path();
        if context_path == "/" {
            return Some(path);
        }
        let rest = path.strip_prefix(context_path)?;
        if rest.is_empty() {
            Some("/")
        } else if rest.starts_with('/') {
            Some(rest)
        } else {
            None
        }
    }

    /// Servlet for `path` and the path it was resolved with.
    fn resolve(&self, path: &str) -> Option<(String, String)> {
        let router = self.context.router();
        if let Some(servlet) = router.resolve_servlet(path) {
            return Some((servlet, path.to_string()));
        }
        if !path.ends_with('/') {
            return None;
        }
        self.descriptor.welcome_files.iter().find_map(|file| {
            let candidate = format!("{path}{file}");
            router.resolve_servlet(&candidate).map(|servlet| (servlet, candidate))
        })
    }

    fn exception_page(&self, error: &ComponentError) -> Option<&str> {
        self.descriptor
            .error_pages
            .iter()
            .find(|page| page.exception_type.as_deref() == Some(error.kind()))
            .map(|page| page.location.as_str())
    }

    /// Re-run the servlet mapped at `location`, keeping the current status.
    fn forward(&self, location: &str, request: &Request, response: &mut Response) {
        let servlet = self
            .context
            .router()
            .resolve_servlet(location)
            .and_then(|name| self.context.servlet(&name));
        let Some(servlet) = servlet else {
            tracing::warn!(app = %self.context.id(), location = %location, "Error page location has no servlet");
            return;
        };

        let status = response.status();
        response.send_error(status);
        if let Err(e) = servlet.service(request, response) {
            tracing::error!(app = %self.context.id(), location = %location, error = %e, "Error page failed");
            response.send_error(status);
        }
        response.set_status(status);
    }

    /// Structured summary of the application.
    pub fn describe(&self) -> Value {
        let d = &self.descriptor;
        let component = |kind: ComponentKind| -> Vec<Value> {
            self.context
                .registrations(kind)
                .iter()
                .map(|r| {
                    json!({
                        "name": r.name(),
                        "class": r.class(),
                        "init_params": r.init_parameters(),
                        "mappings": r.mappings(),
                        "state": r.state(),
                    })
                })
                .collect()
        };
        json!({
            "id": d.id,
            "name": d.display_name,
            "version": d.version,
            "description": d.description,
            "root": self.root.display().to_string(),
            "context_path": self.context.context_path(),
            "state": self.context.state(),
            "context_params": self.context.init_parameters(),
            "servlets": component(ComponentKind::Servlet),
            "filters": component(ComponentKind::Filter),
            "servlet_filter_mappings": self.context.router().servlet_filter_mappings(),
            "listeners": self.context.listener_classes(),
            "error_pages": d.error_pages,
            "welcome_files": d.welcome_files,
        })
    }
}

impl std::fmt::Debug for WebApp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebApp")
            .field("root", &self.root)
            .field("context", &self.context)
            .finish()
    }
}

/// Context path for an application root: `/<dir name>`, or `/` for a root
/// directory named `root` or `ROOT`.
pub fn context_path_for_root(root: &Path) -> String {
    match root.file_name().and_then(|name| name.to_str()) {
        None => "/".to_string(),
        Some(name) if ROOT_APP_NAMES.contains(&name) => "/".to_string(),
        Some(name) => format!("/{name}"),
    }
}

/// Lexically normalize a root path: drop `.` and fold `..` into its parent.
pub fn normalize_root(root: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in root.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let folded = matches!(
                    normalized.components().next_back(),
                    Some(Component::Normal(_))
                );
                if folded {
                    normalized.pop();
                } else if !matches!(
                    normalized.components().next_back(),
                    Some(Component::RootDir | Component::Prefix(_))
                ) {
                    normalized.push("..");
                }
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    if normalized.as_os_str().is_empty() {
        normalized.push(".");
    }
    normalized
}
