//! Per-application context: registrations, listeners, attributes, instances.
//!
//! # Responsibilities
//! - Hold the component registrations and the application's pattern router
//! - Instantiate and `init` components when the context is initialized
//! - Fan out lifecycle events to context listeners
//! - Own the application's sessions and resolve paths under its root
//! - Tear everything down in reverse declaration order
//!
//! # Lifecycle
//! ```text
//! Configuring ──initialize──▶ Initialized ──destroy──▶ Destroyed
//!                                  ▲                       │
//!                                  └──────initialize───────┘
//! ```

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::Value;

use crate::component::{ComponentConfig, ComponentError, ComponentRegistry, Filter, RegistryError, Servlet};
use crate::context::attributes::{AttributeChange, AttributeScope};
use crate::context::listener::{ContextListener, Listener};
use crate::context::registration::{Registration, RegistrationError};
use crate::context::session::SessionStore;
use crate::descriptor::ComponentKind;
use crate::routing::PatternRouter;
use crate::webapp::{normalize_root, WebApp};

static APP_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Identifier of an installed application, unique within the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct AppId(u64);

impl AppId {
    pub fn new() -> Self {
        Self(APP_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for AppId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AppId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "app-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextState {
    Configuring,
    Initialized,
    Destroyed,
}

#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    #[error("context {context_path} is no longer configurable")]
    AlreadyInitialized { context_path: String },

    #[error(transparent)]
    Registration(#[from] RegistrationError),

    #[error("{kind} `{name}` is not declared")]
    UnknownComponent { kind: ComponentKind, name: String },

    #[error("{kind} `{name}` is already declared")]
    DuplicateComponent { kind: ComponentKind, name: String },

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("{kind} `{name}` failed to initialize: {source}")]
    ComponentInit {
        kind: ComponentKind,
        name: String,
        #[source]
        source: ComponentError,
    },
}

type Instances<T> = Vec<(String, Arc<T>)>;

/// Finds the installed application serving a URI. Implemented by the
/// server's application set.
pub trait ContextDirectory: Send + Sync {
    fn app_for_uri(&self, uri: &str) -> Option<Arc<WebApp>>;
}

pub struct AppContext {
    id: AppId,
    server_name: String,
    context_path: String,
    root: Option<PathBuf>,
    registry: Arc<ComponentRegistry>,
    router: PatternRouter,
    sessions: SessionStore,
    directory: RwLock<Option<Weak<dyn ContextDirectory>>>,
    state: RwLock<ContextState>,
    lifecycle: Mutex<()>,
    init_params: RwLock<Vec<(String, String)>>,
    attributes: AttributeScope,
    listener_classes: RwLock<Vec<String>>,
    context_listeners: RwLock<Vec<Arc<dyn ContextListener>>>,
    servlet_registrations: RwLock<Vec<Registration>>,
    filter_registrations: RwLock<Vec<Registration>>,
    servlets: RwLock<Instances<dyn Servlet>>,
    filters: RwLock<Instances<dyn Filter>>,
}

impl AppContext {
    pub fn new(
        server_name: impl Into<String>,
        context_path: impl Into<String>,
        registry: Arc<ComponentRegistry>,
    ) -> Self {
        Self {
            id: AppId::new(),
            server_name: server_name.into(),
            context_path: context_path.into(),
            root: None,
            registry,
            router: PatternRouter::new(),
            sessions: SessionStore::new(),
            directory: RwLock::new(None),
            state: RwLock::new(ContextState::Configuring),
            lifecycle: Mutex::new(()),
            init_params: RwLock::new(Vec::new()),
            attributes: AttributeScope::new(),
            listener_classes: RwLock::new(Vec::new()),
            context_listeners: RwLock::new(Vec::new()),
            servlet_registrations: RwLock::new(Vec::new()),
            filter_registrations: RwLock::new(Vec::new()),
            servlets: RwLock::new(Vec::new()),
            filters: RwLock::new(Vec::new()),
        }
    }

    pub fn id(&self) -> AppId {
        self.id
    }

    /// Name of the server the application is installed in.
    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    pub fn context_path(&self) -> &str {
        &self.context_path
    }

    /// Set the directory that real paths resolve under.
    pub fn with_root(mut self, root: impl AsRef<Path>) -> Self {
        self.root = Some(normalize_root(root.as_ref()));
        self
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    pub fn router(&self) -> &PatternRouter {
        &self.router
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    // Resources

    /// Filesystem path of `path` under the application root.
    ///
    /// `None` without a root, or when `..` segments climb out of it.
    pub fn real_path(&self, path: &str) -> Option<PathBuf> {
        let root = self.root.as_ref()?;
        let resolved = normalize_root(&root.join(path.trim_start_matches('/')));
        resolved.starts_with(root).then_some(resolved)
    }

    /// MIME type guessed from the extension of `file`.
    pub fn mime_type(&self, file: &str) -> Option<String> {
        mime_guess::from_path(file).first().map(|mime| mime.essence_str().to_string())
    }

    // Sibling applications

    /// Point the context at the set of installed applications.
    pub fn attach_directory(&self, directory: Weak<dyn ContextDirectory>) {
        *self.directory.write() = Some(directory);
    }

    /// The installed application that would serve `uri`, this one included.
    pub fn get_context(&self, uri: &str) -> Option<Arc<WebApp>> {
        let directory = self.directory.read().as_ref()?.upgrade()?;
        directory.app_for_uri(uri)
    }

    pub fn state(&self) -> ContextState {
        *self.state.read()
    }

    // Init parameters

    pub fn init_parameter(&self, name: &str) -> Option<String> {
        self.init_params
            .read()
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.clone())
    }

    pub fn init_parameters(&self) -> Vec<(String, String)> {
        self.init_params.read().clone()
    }

    /// Returns `Ok(false)` without overwriting when `name` is already set.
    pub fn set_init_parameter(
        &self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<bool, ContextError> {
        self.ensure_configuring()?;
        let name = name.into();
        let mut params = self.init_params.write();
        if params.iter().any(|(key, _)| *key == name) {
            return Ok(false);
        }
        params.push((name, value.into()));
        Ok(true)
    }

    // Attributes

    pub fn attributes(&self) -> &AttributeScope {
        &self.attributes
    }

    pub fn attribute(&self, name: &str) -> Option<Value> {
        self.attributes.get(name)
    }

    pub fn set_attribute(&self, name: &str, value: Value) -> AttributeChange {
        self.attributes.set(name, value)
    }

    pub fn remove_attribute(&self, name: &str) -> AttributeChange {
        self.attributes.remove(name)
    }

    // Registration

    pub fn add_servlet(&self, name: &str, class: &str) -> Result<(), ContextError> {
        self.declare(Registration::new(ComponentKind::Servlet, name, class))
    }

    pub fn add_filter(&self, name: &str, class: &str) -> Result<(), ContextError> {
        self.declare(Registration::new(ComponentKind::Filter, name, class))
    }

    /// Add a fully built registration. Fails once the context is initialized.
    pub fn declare(&self, registration: Registration) -> Result<(), ContextError> {
        self.ensure_configuring()?;
        let kind = registration.kind();
        let mut registrations = self.registrations_for(kind).write();
        if registrations.iter().any(|r| r.name() == registration.name()) {
            return Err(ContextError::DuplicateComponent {
                kind,
                name: registration.name().to_string(),
            });
        }
        registrations.push(registration);
        Ok(())
    }

    pub fn registration(&self, kind: ComponentKind, name: &str) -> Option<Registration> {
        self.registrations_for(kind)
            .read()
            .iter()
            .find(|r| r.name() == name)
            .cloned()
    }

    pub fn registrations(&self, kind: ComponentKind) -> Vec<Registration> {
        self.registrations_for(kind).read().clone()
    }

    /// Run `f` against the named registration.
    pub fn with_registration<R>(
        &self,
        kind: ComponentKind,
        name: &str,
        f: impl FnOnce(&mut Registration) -> R,
    ) -> Result<R, ContextError> {
        let mut registrations = self.registrations_for(kind).write();
        let registration = registrations
            .iter_mut()
            .find(|r| r.name() == name)
            .ok_or_else(|| unknown(kind, name))?;
        Ok(f(registration))
    }

    /// Bind URL patterns to a declared component.
    ///
    /// Servlet patterns already bound to a different servlet are left alone
    /// and returned as conflicts.
    pub fn add_mapping(
        &self,
        kind: ComponentKind,
        name: &str,
        patterns: &[&str],
    ) -> Result<Vec<String>, ContextError> {
        let mut registrations = self.registrations_for(kind).write();
        let registration = registrations
            .iter_mut()
            .find(|r| r.name() == name)
            .ok_or_else(|| unknown(kind, name))?;

        let existing = match kind {
            ComponentKind::Servlet => self.router.servlet_mappings(),
            ComponentKind::Filter => Vec::new(),
        };
        let mut conflicts = Vec::new();
        for pattern in patterns {
            let taken = existing.iter().any(|(p, servlet)| p == pattern && servlet != name);
            if taken {
                conflicts.push(pattern.to_string());
                continue;
            }
            registration.add_mapping(*pattern)?;
            match kind {
                ComponentKind::Servlet => {
                    self.router.add_servlet_mapping(pattern, name);
                }
                ComponentKind::Filter => self.router.add_filter_mapping(pattern, name),
            }
        }
        Ok(conflicts)
    }

    /// Apply a filter to every request resolved to `servlet`.
    pub fn add_filter_servlet_mapping(&self, filter: &str, servlet: &str) -> Result<(), ContextError> {
        self.ensure_configuring()?;
        if self.registration(ComponentKind::Filter, filter).is_none() {
            return Err(unknown(ComponentKind::Filter, filter));
        }
        if self.registration(ComponentKind::Servlet, servlet).is_none() {
            return Err(unknown(ComponentKind::Servlet, servlet));
        }
        self.router.add_filter_servlet_mapping(servlet, filter);
        Ok(())
    }

    pub(crate) fn record_mapping(&self, kind: ComponentKind, name: &str, pattern: &str) -> Result<(), ContextError> {
        self.with_registration(kind, name, |r| r.record_mapping(pattern))
    }

    pub fn add_listener(&self, class: &str) -> Result<(), ContextError> {
        self.ensure_configuring()?;
        self.listener_classes.write().push(class.to_string());
        Ok(())
    }

    pub fn listener_classes(&self) -> Vec<String> {
        self.listener_classes.read().clone()
    }

    // Instances

    pub fn servlet(&self, name: &str) -> Option<Arc<dyn Servlet>> {
        self.servlets
            .read()
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, servlet)| servlet.clone())
    }

    /// Filter instances for `names`, in the order given. Unknown names are skipped.
    pub fn filters(&self, names: &[String]) -> Vec<Arc<dyn Filter>> {
        let filters = self.filters.read();
        names
            .iter()
            .filter_map(|name| filters.iter().find(|(n, _)| n == name).map(|(_, f)| f.clone()))
            .collect()
    }

    // Lifecycle

    /// Freeze registrations, create and `init` every component, then notify
    /// context listeners in declaration order.
    pub fn initialize(&self) -> Result<(), ContextError> {
        let _lifecycle = self.lifecycle.lock();
        if self.state() == ContextState::Initialized {
            return Err(self.already_initialized());
        }

        for registration in self.servlet_registrations.write().iter_mut() {
            registration.freeze();
        }
        for registration in self.filter_registrations.write().iter_mut() {
            registration.freeze();
        }

        let mut context_listeners = Vec::new();
        let mut attribute_listeners = Vec::new();
        for class in self.listener_classes.read().iter() {
            match self.registry.create_listener(class)? {
                Listener::Context(listener) => context_listeners.push(listener),
                Listener::Attribute(listener) => attribute_listeners.push(listener),
            }
        }

        let servlets = self.instantiate::<dyn Servlet>(
            ComponentKind::Servlet,
            &self.registrations(ComponentKind::Servlet),
            |class| self.registry.create_servlet(class),
            |servlet, config| servlet.init(config),
            |servlet| servlet.destroy(),
        )?;
        let filters = match self.instantiate::<dyn Filter>(
            ComponentKind::Filter,
            &self.registrations(ComponentKind::Filter),
            |class| self.registry.create_filter(class),
            |filter, config| filter.init(config),
            |filter| filter.destroy(),
        ) {
            Ok(filters) => filters,
            Err(e) => {
                for (_, servlet) in servlets.iter().rev() {
                    servlet.destroy();
                }
                return Err(e);
            }
        };

        *self.servlets.write() = servlets;
        *self.filters.write() = filters;
        self.attributes.clear_listeners();
        for listener in attribute_listeners {
            self.attributes.add_listener(listener);
        }
        *self.context_listeners.write() = context_listeners.clone();
        *self.state.write() = ContextState::Initialized;

        for listener in &context_listeners {
            listener.context_initialized(self);
        }

        tracing::info!(
            app = %self.id,
            context_path = %self.context_path,
            servlets = self.servlets.read().len(),
            filters = self.filters.read().len(),
            "Application context initialized"
        );
        Ok(())
    }

    /// Notify listeners and destroy components in reverse declaration order.
    ///
    /// Returns `false` when the context was not initialized.
    pub fn destroy(&self) -> bool {
        let _lifecycle = self.lifecycle.lock();
        if self.state() != ContextState::Initialized {
            return false;
        }

        let listeners = std::mem::take(&mut *self.context_listeners.write());
        for listener in listeners.iter().rev() {
            listener.context_destroyed(self);
        }

        let filters = std::mem::take(&mut *self.filters.write());
        for (_, filter) in filters.iter().rev() {
            filter.destroy();
        }
        let servlets = std::mem::take(&mut *self.servlets.write());
        for (_, servlet) in servlets.iter().rev() {
            servlet.destroy();
        }

        self.attributes.clear_listeners();
        self.router.clear_cache();
        self.sessions.clear();
        *self.state.write() = ContextState::Destroyed;

        tracing::info!(app = %self.id, context_path = %self.context_path, "Application context destroyed");
        true
    }

    fn instantiate<T: ?Sized>(
        &self,
        kind: ComponentKind,
        registrations: &[Registration],
        create: impl Fn(&str) -> Result<Box<T>, RegistryError>,
        init: impl Fn(&mut T, &ComponentConfig) -> Result<(), ComponentError>,
        destroy: impl Fn(&T),
    ) -> Result<Instances<T>, ContextError> {
        let mut created: Instances<T> = Vec::with_capacity(registrations.len());
        for registration in registrations {
            let config = ComponentConfig::new(registration.name(), registration.init_parameters().to_vec());
            let result = create(registration.class())
                .map_err(ContextError::from)
                .and_then(|mut instance| {
                    init(&mut *instance, &config).map_err(|source| ContextError::ComponentInit {
                        kind,
                        name: registration.name().to_string(),
                        source,
                    })?;
                    Ok(instance)
                });
            match result {
                Ok(instance) => created.push((registration.name().to_string(), Arc::from(instance))),
                Err(e) => {
                    for (_, instance) in created.iter().rev() {
                        destroy(&**instance);
                    }
                    return Err(e);
                }
            }
        }
        Ok(created)
    }

    fn registrations_for(&self, kind: ComponentKind) -> &RwLock<Vec<Registration>> {
        match kind {
            ComponentKind::Servlet => &self.servlet_registrations,
            ComponentKind::Filter => &self.filter_registrations,
        }
    }

    fn ensure_configuring(&self) -> Result<(), ContextError> {
        match self.state() {
            ContextState::Configuring => Ok(()),
            _ => Err(self.already_initialized()),
        }
    }

    fn already_initialized(&self) -> ContextError {
        ContextError::AlreadyInitialized {
            context_path: self.context_path.clone(),
        }
    }
}

impl std::fmt::Debug for AppContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppContext")
            .field("id", &self.id)
            .field("context_path", &self.context_path)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

fn unknown(kind: ComponentKind, name: &str) -> ContextError {
    ContextError::UnknownComponent {
        kind,
        name: name.to_string(),
    }
}
