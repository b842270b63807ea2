//! The server: installed applications, request dispatch, lifecycle.
//!
//! # Responsibilities
//! - Install, uninstall and reload applications keyed by normalized root
//! - Resolve each request to an application through a content-path cache
//! - Fall back to the root application, then to the default handler
//! - Drive the connector through the Stopped/Started state machine
//!
//! # Design Decisions
//! - The installed set is an immutable snapshot behind `ArcSwap`; every
//!   change publishes a new snapshot whose cache starts empty
//! - Only successful lookups are cached, so the cache is bounded by the
//!   number of installed applications
//! - `start` blocks the calling thread until the connector is closed

use std::net::SocketAddr;
use std::path::Path;
use std::sync::{Arc, Weak};
use std::time::Instant;

use arc_swap::ArcSwap;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{json, Value};

use crate::component::ComponentRegistry;
use crate::config::ServerConfig;
use crate::context::{ContextDirectory, ContextError, ContextState};
use crate::http::{Request, Response};
use crate::net::{build_connector, Connector, ConnectorError};
use crate::observability::metrics;
use crate::server::content_path::content_path;
use crate::server::dispatcher::{DefaultHandler, HttpDispatcher, NotFoundHandler};
use crate::webapp::{normalize_root, InstallError, WebApp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerState {
    Stopped,
    Started,
}

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("server already started")]
    AlreadyStarted,

    #[error("server already stopped")]
    NotStarted,

    #[error(transparent)]
    Connector(#[from] ConnectorError),

    #[error(transparent)]
    Install(#[from] InstallError),

    #[error("failed to initialize application {context_path}: {source}")]
    Initialize {
        context_path: String,
        #[source]
        source: ContextError,
    },
}

/// Installed applications plus the content-path cache built against them.
#[derive(Default)]
struct AppSet {
    apps: Vec<Arc<WebApp>>,
    cache: DashMap<String, usize>,
}

impl AppSet {
    fn with_apps(apps: Vec<Arc<WebApp>>) -> Self {
        Self {
            apps,
            cache: DashMap::new(),
        }
    }

    fn position(&self, root: &Path) -> Option<usize> {
        self.apps.iter().position(|app| app.root() == root)
    }

    fn lookup(&self, content_path: &str) -> Option<&Arc<WebApp>> {
        if let Some(index) = self.cache.get(content_path) {
            metrics::record_cache_lookup("server", true);
            return self.apps.get(*index);
        }
        metrics::record_cache_lookup("server", false);

        let index = self
            .apps
            .iter()
            .position(|app| app.context_path() == content_path)?;
        self.cache.insert(content_path.to_string(), index);
        self.apps.get(index)
    }

    fn root_app(&self) -> Option<&Arc<WebApp>> {
        self.apps.iter().find(|app| app.is_root_app())
    }
}

/// Cross-application lookup for `AppContext::get_context`, always against
/// the current snapshot.
impl ContextDirectory for ArcSwap<AppSet> {
    fn app_for_uri(&self, uri: &str) -> Option<Arc<WebApp>> {
        let set = self.load();
        set.lookup(&content_path(uri))
            .or_else(|| set.root_app())
            .cloned()
    }
}

pub struct Server {
    name: String,
    host: String,
    port: u16,
    connector: Arc<dyn Connector>,
    registry: Arc<ComponentRegistry>,
    apps: Arc<ArcSwap<AppSet>>,
    writer: Mutex<()>,
    /// Serializes start and stop.
    lifecycle: Mutex<()>,
    state: Mutex<ServerState>,
    default_handler: Arc<dyn DefaultHandler>,
}

impl Server {
    pub fn new(
        name: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        connector: Arc<dyn Connector>,
        registry: Arc<ComponentRegistry>,
    ) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            port,
            connector,
            registry,
            apps: Arc::new(ArcSwap::from_pointee(AppSet::default())),
            writer: Mutex::new(()),
            lifecycle: Mutex::new(()),
            state: Mutex::new(ServerState::Stopped),
            default_handler: Arc::new(NotFoundHandler),
        }
    }

    /// Build the server and its connector from configuration. Applications
    /// are not installed here.
    pub fn from_config(config: &ServerConfig, registry: Arc<ComponentRegistry>) -> Self {
        Self::new(
            config.server.name.as_str(),
            config.server.host.as_str(),
            config.server.port,
            build_connector(&config.connector),
            registry,
        )
    }

    pub fn with_default_handler(mut self, handler: Arc<dyn DefaultHandler>) -> Self {
        self.default_handler = handler;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn registry(&self) -> &Arc<ComponentRegistry> {
        &self.registry
    }

    // Applications

    /// Load the application at `root` and install it.
    pub fn add_app(&self, root: impl AsRef<Path>) -> Result<Arc<WebApp>, InstallError> {
        let root = normalize_root(root.as_ref());
        if self.apps.load().position(&root).is_some() {
            return Err(InstallError::DuplicateRoot(root));
        }
        let app = WebApp::load(&root, &self.name, self.registry.clone())?;
        self.install(app)
    }

    /// Initialize `app` and add it to the installed set.
    ///
    /// A root that is already installed is rejected and the set is left
    /// unchanged.
    pub fn install(&self, app: WebApp) -> Result<Arc<WebApp>, InstallError> {
        let _writer = self.writer.lock();
        let current = self.apps.load();
        if current.position(app.root()).is_some() {
            return Err(InstallError::DuplicateRoot(app.root().to_path_buf()));
        }
        if let Some(other) = current.apps.iter().find(|a| a.context_path() == app.context_path()) {
            tracing::warn!(
                context_path = %app.context_path(),
                installed = %other.root().display(),
                root = %app.root().display(),
                "Context path already served by another application"
            );
        }

        app.context().attach_directory(self.directory());
        app.context().initialize()?;
        let app = Arc::new(app);
        let mut apps = current.apps.clone();
        apps.push(app.clone());
        self.apps.store(Arc::new(AppSet::with_apps(apps)));

        tracing::info!(
            server = %self.name,
            root = %app.root().display(),
            context_path = %app.context_path(),
            app = %app.context().id(),
            "Application installed"
        );
        Ok(app)
    }

    /// Uninstall the application at `root` and destroy its context once its
    /// in-flight requests have finished.
    pub fn remove_app(&self, root: impl AsRef<Path>) -> Result<Arc<WebApp>, InstallError> {
        let root = normalize_root(root.as_ref());
        let removed = {
            let _writer = self.writer.lock();
            let current = self.apps.load();
            let index = current
                .position(&root)
                .ok_or_else(|| InstallError::NotInstalled(root.clone()))?;
            let mut apps = current.apps.clone();
            let removed = apps.remove(index);
            self.apps.store(Arc::new(AppSet::with_apps(apps)));
            removed
        };
        removed.retire();
        removed.context().destroy();
        tracing::info!(root = %root.display(), "Application uninstalled");
        Ok(removed)
    }

    /// Re-read the descriptor at `root` and replace the installed application.
    ///
    /// The previous application keeps serving if the new one fails to load
    /// or initialize. Otherwise it is destroyed after its in-flight requests
    /// finish; new requests already go to the replacement.
    pub fn reload_app(&self, root: impl AsRef<Path>) -> Result<Arc<WebApp>, InstallError> {
        let root = normalize_root(root.as_ref());
        if self.apps.load().position(&root).is_none() {
            return Err(InstallError::NotInstalled(root));
        }
        let fresh = WebApp::load(&root, &self.name, self.registry.clone())?;

        let (fresh, previous) = {
            let _writer = self.writer.lock();
            let current = self.apps.load();
            let index = current
                .position(&root)
                .ok_or_else(|| InstallError::NotInstalled(root.clone()))?;
            fresh.context().attach_directory(self.directory());
            fresh.context().initialize()?;
            let fresh = Arc::new(fresh);
            let mut apps = current.apps.clone();
            let previous = std::mem::replace(&mut apps[index], fresh.clone());
            self.apps.store(Arc::new(AppSet::with_apps(apps)));
            (fresh, previous)
        };
        previous.retire();
        previous.context().destroy();

        tracing::info!(
            root = %root.display(),
            app = %fresh.context().id(),
            "Application reloaded"
        );
        Ok(fresh)
    }

    pub fn get_app(&self, root: impl AsRef<Path>) -> Option<Arc<WebApp>> {
        let root = normalize_root(root.as_ref());
        let set = self.apps.load();
        set.position(&root).map(|index| set.apps[index].clone())
    }

    pub fn app_for_context(&self, context_path: &str) -> Option<Arc<WebApp>> {
        self.apps
            .load()
            .apps
            .iter()
            .find(|app| app.context_path() == context_path)
            .cloned()
    }

    /// Installed applications in installation order.
    pub fn apps(&self) -> Vec<Arc<WebApp>> {
        self.apps.load().apps.clone()
    }

    /// Content paths currently held in the resolution cache.
    pub fn cached_content_paths(&self) -> usize {
        self.apps.load().cache.len()
    }

    // Lifecycle

    pub fn state(&self) -> ServerState {
        *self.state.lock()
    }

    pub fn is_started(&self) -> bool {
        self.state() == ServerState::Started
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.connector.local_addr()
    }

    /// Bind the connector and serve until [`stop`](Self::stop) is called.
    ///
    /// Applications destroyed by a previous `stop` are initialized again
    /// first. On a bind failure the server returns to Stopped.
    pub fn start(self: &Arc<Self>) -> Result<(), ServerError> {
        {
            let _lifecycle = self.lifecycle.lock();
            if self.state() == ServerState::Started {
                return Err(ServerError::AlreadyStarted);
            }
            for app in self.apps.load().apps.iter() {
                if app.context().state() == ContextState::Destroyed {
                    app.context()
                        .initialize()
                        .map_err(|source| ServerError::Initialize {
                            context_path: app.context_path().to_string(),
                            source,
                        })?;
                }
            }
            self.connector.reset();
            *self.state.lock() = ServerState::Started;
        }

        tracing::info!(
            server = %self.name,
            host = %self.host,
            port = self.port,
            connector = self.connector.name(),
            applications = self.apps.load().apps.len(),
            "Server starting"
        );

        let dispatcher: Arc<dyn HttpDispatcher> = self.clone();
        match self.connector.bind(&self.host, self.port, dispatcher) {
            Ok(()) => {
                tracing::info!(server = %self.name, "Connector closed");
                Ok(())
            }
            Err(e) => {
                *self.state.lock() = ServerState::Stopped;
                tracing::error!(server = %self.name, error = %e, "Connector failed");
                Err(e.into())
            }
        }
    }

    /// Close the connector, wait for in-flight requests to finish, then
    /// destroy every application.
    ///
    /// Blocks for the connector's drain. Must not be called from a request
    /// handler.
    pub fn stop(&self) -> Result<(), ServerError> {
        let _lifecycle = self.lifecycle.lock();
        if self.state() != ServerState::Started {
            return Err(ServerError::NotStarted);
        }

        self.connector.close();
        let set = self.apps.load();
        for app in set.apps.iter().rev() {
            app.context().destroy();
        }
        set.cache.clear();
        *self.state.lock() = ServerState::Stopped;

        tracing::info!(server = %self.name, "Server stopped");
        Ok(())
    }

    /// Stop, then start again. Blocks like [`start`](Self::start); the new
    /// bind begins only after the previous one has drained.
    pub fn restart(self: &Arc<Self>) -> Result<(), ServerError> {
        self.stop()?;
        self.start()
    }

    /// Structured summary of the server and its applications.
    pub fn describe(&self) -> Value {
        let set = self.apps.load();
        json!({
            "name": self.name,
            "host": self.host,
            "port": self.port,
            "state": self.state(),
            "connector": self.connector.name(),
            "local_addr": self.local_addr().map(|addr| addr.to_string()),
            "applications": set.apps.iter().map(|app| app.describe()).collect::<Vec<_>>(),
        })
    }

    /// Run `app`; component errors become a `500`.
    fn try_app(&self, app: &WebApp, request: &Request, response: &mut Response) -> Attempt {
        let Some(_in_flight) = app.enter() else {
            return Attempt::Retired;
        };
        match app.handle(request, response) {
            Ok(true) => Attempt::Served,
            Ok(false) => Attempt::Declined,
            Err(e) => {
                tracing::error!(
                    app = %app.context().id(),
                    context_path = %app.context_path(),
                    method = %request.method(),
                    path = %request.path(),
                    error = %e,
                    "Handler failed"
                );
                metrics::record_handler_failure(app.context_path());
                response.send_error(500);
                Attempt::Served
            }
        }
    }

    fn directory(&self) -> Weak<dyn ContextDirectory> {
        let apps: Weak<ArcSwap<AppSet>> = Arc::downgrade(&self.apps);
        apps
    }

    /// Offer the request to the claiming application, then to the root
    /// application. `None` when one of them was retired after `set` was
    /// loaded; nothing has been written to `response` in that case.
    fn route(
        &self,
        set: &AppSet,
        content_path: &str,
        request: &Request,
        response: &mut Response,
    ) -> Option<Option<Arc<WebApp>>> {
        let claimed = set.lookup(content_path);
        if let Some(app) = claimed {
            match self.try_app(app, request, response) {
                Attempt::Served => return Some(Some(app.clone())),
                Attempt::Retired => return None,
                Attempt::Declined => {}
            }
        }

        let Some(root) = set
            .root_app()
            .filter(|root| !claimed.is_some_and(|app| Arc::ptr_eq(app, root)))
        else {
            return Some(None);
        };
        match self.try_app(root, request, response) {
            Attempt::Served => Some(Some(root.clone())),
            Attempt::Retired => None,
            Attempt::Declined => Some(None),
        }
    }
}

/// Outcome of offering a request to one application.
enum Attempt {
    Served,
    Declined,
    Retired,
}

impl HttpDispatcher for Server {
    fn handle_http(&self, request: &Request, response: &mut Response) {
        let start = Instant::now();
        let content_path = content_path(request.path());

        let served_by = loop {
            let set = self.apps.load();
            if let Some(served_by) = self.route(&set, &content_path, request, response) {
                break served_by;
            }
            tracing::trace!(content_path = %content_path, "Application replaced during dispatch, retrying");
        };

        let label = match &served_by {
            Some(app) => app.context_path(),
            None => {
                self.default_handler.handle(request, response);
                "-"
            }
        };

        tracing::debug!(
            method = %request.method(),
            path = %request.path(),
            content_path = %content_path,
            app = %label,
            status = response.status(),
            "Request dispatched"
        );
        metrics::record_request(request.method(), response.status(), label, start);
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("name", &self.name)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("state", &self.state())
            .field("applications", &self.apps.load().apps.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{ComponentError, Servlet};
    use crate::context::{AppContext, ContextListener};
    use crate::descriptor::parse_descriptor;
    use parking_lot::Mutex as PlMutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Connector that returns from `bind` immediately.
    #[derive(Debug, Default)]
    struct NullConnector {
        binds: AtomicUsize,
        closes: AtomicUsize,
        fail: bool,
        journal: Arc<PlMutex<Vec<&'static str>>>,
    }

    impl Connector for NullConnector {
        fn bind(&self, _host: &str, _port: u16, _dispatcher: Arc<dyn HttpDispatcher>) -> Result<(), ConnectorError> {
            self.binds.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ConnectorError::Bind {
                    address: "test:0".into(),
                    source: std::io::Error::new(std::io::ErrorKind::AddrInUse, "taken"),
                });
            }
            Ok(())
        }

        fn close(&self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
            self.journal.lock().push("connector drained");
        }

        fn reset(&self) {}

        fn local_addr(&self) -> Option<SocketAddr> {
            None
        }

        fn name(&self) -> &'static str {
            "null"
        }
    }

    struct Broken;

    impl Servlet for Broken {
        fn service(&self, _request: &Request, _response: &mut Response) -> Result<(), ComponentError> {
            Err(ComponentError::failed("broken"))
        }
    }

    fn server_with(connector: Arc<NullConnector>) -> Arc<Server> {
        let mut registry = ComponentRegistry::with_builtins();
        registry.register_servlet("test.Broken", || Box::new(Broken));
        Arc::new(Server::new("test", "127.0.0.1", 0, connector, Arc::new(registry)))
    }

    fn text_app(root: &str, pattern: &str, body: &str) -> WebApp {
        let text = format!(
            r#"<web-app>
  <servlet>
    <servlet-name>main</servlet-name>
    <servlet-class>builtin.TextServlet</servlet-class>
    <init-param><param-name>body</param-name><param-value>{body}</param-value></init-param>
  </servlet>
  <servlet-mapping><servlet-name>main</servlet-name><url-pattern>{pattern}</url-pattern></servlet-mapping>
</web-app>"#
        );
        let descriptor = parse_descriptor(&text, root).unwrap();
        let registry = Arc::new(ComponentRegistry::with_builtins());
        WebApp::from_descriptor(root, descriptor, "test", registry).unwrap()
    }

    fn get(server: &Server, path: &str) -> Response {
        let request = Request::from_bytes(format!("GET {path} HTTP/1.1\r\n\r\n").as_bytes()).unwrap();
        let mut response = Response::new();
        server.handle_http(&request, &mut response);
        response
    }

    #[test]
    fn double_start_is_rejected() {
        let connector = Arc::new(NullConnector::default());
        let server = server_with(connector.clone());
        server.start().unwrap();
        assert!(matches!(server.start(), Err(ServerError::AlreadyStarted)));
        assert_eq!(connector.binds.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn stop_before_start_is_rejected() {
        let connector = Arc::new(NullConnector::default());
        let server = server_with(connector.clone());
        assert!(matches!(server.stop(), Err(ServerError::NotStarted)));
        assert_eq!(connector.closes.load(Ordering::SeqCst), 0);

        server.start().unwrap();
        server.stop().unwrap();
        assert!(matches!(server.stop(), Err(ServerError::NotStarted)));
        assert_eq!(connector.closes.load(Ordering::SeqCst), 1);
    }

    struct JournalListener(Arc<PlMutex<Vec<&'static str>>>);

    impl ContextListener for JournalListener {
        fn context_destroyed(&self, _context: &AppContext) {
            self.0.lock().push("context destroyed");
        }
    }

    #[test]
    fn stop_destroys_applications_after_the_connector_drains() {
        let connector = Arc::new(NullConnector::default());
        let server = server_with(connector.clone());

        let journal = connector.journal.clone();
        let mut registry = ComponentRegistry::with_builtins();
        registry.register_context_listener("test.Journal", move || Arc::new(JournalListener(journal.clone())));
        let text = "<web-app><listener><listener-class>test.Journal</listener-class></listener></web-app>";
        let app = WebApp::from_descriptor(
            "/srv/shop",
            parse_descriptor(text, "/srv/shop").unwrap(),
            "test",
            Arc::new(registry),
        )
        .unwrap();
        server.install(app).unwrap();

        server.start().unwrap();
        server.stop().unwrap();
        assert_eq!(*connector.journal.lock(), vec!["connector drained", "context destroyed"]);
    }

    #[test]
    fn bind_failure_reverts_to_stopped() {
        let connector = Arc::new(NullConnector {
            fail: true,
            ..Default::default()
        });
        let server = server_with(connector);
        assert!(matches!(server.start(), Err(ServerError::Connector(_))));
        assert_eq!(server.state(), ServerState::Stopped);
    }

    #[test]
    fn restart_reinitializes_applications() {
        let connector = Arc::new(NullConnector::default());
        let server = server_with(connector.clone());
        let app = server.install(text_app("/srv/shop", "/*", "shop")).unwrap();
        server.start().unwrap();
        server.restart().unwrap();
        assert_eq!(app.context().state(), ContextState::Initialized);
        assert_eq!(connector.binds.load(Ordering::SeqCst), 2);
        assert!(server.is_started());
    }

    #[test]
    fn duplicate_root_leaves_set_unchanged() {
        let server = server_with(Arc::new(NullConnector::default()));
        let first = server.install(text_app("/srv/shop", "/*", "one")).unwrap();
        let err = server.install(text_app("/srv/./shop", "/*", "two")).unwrap_err();
        assert!(matches!(err, InstallError::DuplicateRoot(_)));
        assert_eq!(server.apps().len(), 1);
        assert!(Arc::ptr_eq(&server.get_app("/srv/shop").unwrap(), &first));
        assert_eq!(get(&server, "/shop/x").body(), b"one");
    }

    #[test]
    fn get_context_sees_sibling_applications() {
        let server = server_with(Arc::new(NullConnector::default()));
        let shop = server.install(text_app("/srv/shop", "/*", "shop")).unwrap();
        let root = server.install(text_app("/srv/ROOT", "/", "root")).unwrap();

        let found = shop.context().get_context("/shop/cart").unwrap();
        assert!(Arc::ptr_eq(&found, &shop));
        let found = shop.context().get_context("/blog/post").unwrap();
        assert!(Arc::ptr_eq(&found, &root));
        let found = root.context().get_context("/shop").unwrap();
        assert!(Arc::ptr_eq(&found, &shop));

        drop(server);
        assert!(shop.context().get_context("/shop").is_none());
    }

    struct Counter;

    impl Servlet for Counter {
        fn service(&self, request: &Request, response: &mut Response) -> Result<(), ComponentError> {
            let session = request
                .session(true)
                .ok_or_else(|| ComponentError::failed("no session"))?;
            let count = session.attribute("count").and_then(|v| v.as_u64()).unwrap_or(0) + 1;
            session.set_attribute("count", Value::from(count));
            response.write(count.to_string());
            Ok(())
        }
    }

    #[test]
    fn session_survives_between_requests() {
        let server = server_with(Arc::new(NullConnector::default()));
        let mut registry = ComponentRegistry::with_builtins();
        registry.register_servlet("test.Counter", || Box::new(Counter));
        let text = r#"<web-app>
  <servlet><servlet-name>count</servlet-name><servlet-class>test.Counter</servlet-class></servlet>
  <servlet-mapping><servlet-name>count</servlet-name><url-pattern>/*</url-pattern></servlet-mapping>
  <session-config><session-timeout>30</session-timeout></session-config>
</web-app>"#;
        let app = WebApp::from_descriptor(
            "/srv/shop",
            parse_descriptor(text, "/srv/shop").unwrap(),
            "test",
            Arc::new(registry),
        )
        .unwrap();
        let app = server.install(app).unwrap();

        let first = get(&server, "/shop/visit");
        assert_eq!(first.body(), b"1");
        let cookie = &first.cookies()[0];
        assert_eq!(cookie.name(), "JSESSIONID");
        assert_eq!(cookie.path(), Some("/shop"));
        assert!(cookie.is_http_only());
        let session = app.context().sessions().find(cookie.value()).unwrap();
        assert_eq!(session.max_inactive_interval(), Some(std::time::Duration::from_secs(30 * 60)));

        let raw = format!("GET /shop/visit HTTP/1.1\r\nCookie: JSESSIONID={}\r\n\r\n", cookie.value());
        let request = Request::from_bytes(raw.as_bytes()).unwrap();
        let mut second = Response::new();
        server.handle_http(&request, &mut second);
        assert_eq!(second.body(), b"2");
        assert!(second.cookies().is_empty());

        assert_eq!(get(&server, "/shop/visit").body(), b"1");
        assert_eq!(app.context().sessions().len(), 2);
    }

    #[test]
    fn install_invalidates_cache() {
        let server = server_with(Arc::new(NullConnector::default()));
        server.install(text_app("/srv/ROOT", "/", "root")).unwrap();

        assert_eq!(get(&server, "/blog/post").body(), b"root");
        assert_eq!(get(&server, "/").body(), b"root");
        assert_eq!(server.cached_content_paths(), 1);

        server.install(text_app("/srv/blog", "/*", "blog")).unwrap();
        assert_eq!(server.cached_content_paths(), 0);
        assert_eq!(get(&server, "/blog/post").body(), b"blog");
    }

    #[test]
    fn falls_back_to_root_then_default_handler() {
        let server = server_with(Arc::new(NullConnector::default()));
        server.install(text_app("/srv/shop", "/cart", "cart")).unwrap();
        assert_eq!(get(&server, "/shop/cart").body(), b"cart");
        assert_eq!(get(&server, "/shop/other").status(), 404);

        server.install(text_app("/srv/ROOT", "/", "root")).unwrap();
        assert_eq!(get(&server, "/shop/other").body(), b"root");
        assert_eq!(get(&server, "/favicon.ico").body(), b"root");
    }

    #[test]
    fn handler_error_becomes_500() {
        let server = server_with(Arc::new(NullConnector::default()));
        let text = r#"<web-app>
  <servlet><servlet-name>broken</servlet-name><servlet-class>test.Broken</servlet-class></servlet>
  <servlet-mapping><servlet-name>broken</servlet-name><url-pattern>/*</url-pattern></servlet-mapping>
</web-app>"#;
        server
            .install(
                WebApp::from_descriptor(
                    "/srv/api",
                    parse_descriptor(text, "/srv/api").unwrap(),
                    "test",
                    server.registry().clone(),
                )
                .unwrap(),
            )
            .unwrap();
        let response = get(&server, "/api/x");
        assert_eq!(response.status(), 500);
        assert!(response.body().is_empty());
    }

    #[test]
    fn custom_default_handler() {
        struct Teapot(PlMutex<usize>);
        impl DefaultHandler for Teapot {
            fn handle(&self, _request: &Request, response: &mut Response) {
                *self.0.lock() += 1;
                response.set_status(418);
            }
        }

        let connector: Arc<dyn Connector> = Arc::new(NullConnector::default());
        let teapot = Arc::new(Teapot(PlMutex::new(0)));
        let server = Server::new("t", "127.0.0.1", 0, connector, Arc::new(ComponentRegistry::new()))
            .with_default_handler(teapot.clone());
        assert_eq!(get(&server, "/anything").status(), 418);
        assert_eq!(*teapot.0.lock(), 1);
    }

    #[test]
    fn remove_and_describe() {
        let connector = Arc::new(NullConnector::default());
        let server = server_with(connector);
        let app = server.install(text_app("/srv/shop", "/*", "shop")).unwrap();
        let summary = server.describe();
        assert_eq!(summary["state"], "stopped");
        assert_eq!(summary["applications"][0]["context_path"], "/shop");

        server.remove_app("/srv/shop").unwrap();
        assert_eq!(app.context().state(), ContextState::Destroyed);
        assert!(server.apps().is_empty());
        assert!(matches!(server.remove_app("/srv/shop"), Err(InstallError::NotInstalled(_))));
        assert_eq!(get(&server, "/shop/x").status(), 404);
    }
}
