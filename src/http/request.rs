//! Parsed HTTP request.
//!
//! # Responsibilities
//! - Hold the request line, headers, query parameters and cookies
//! - Expose routing-relevant information (path, host, port)
//! - Report body bytes the wire codec left on the stream
//! - Carry request attributes and the serving application's session
//!
//! # Design Decisions
//! - The parsed head is write-once: the codec fills it and nothing sets it
//!   afterwards
//! - Request attributes and the session binding live in a separate scope
//!   behind locks, so components reach them through `&Request`
//! - `Cookie` never appears in the header map

use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

use crate::context::{AppContext, AttributeChange, AttributeScope, Session, SESSION_COOKIE};
use crate::http::cookie::Cookie;
use crate::http::headers::MultiMap;

/// Mutable state attached to a request while it is dispatched.
#[derive(Default)]
struct RequestScope {
    attributes: AttributeScope,
    context: Mutex<Option<Arc<AppContext>>>,
    session: Mutex<Option<Arc<Session>>>,
    new_session: Mutex<Option<String>>,
}

/// A fully parsed request head plus its dispatch scope.
#[derive(Debug)]
pub struct Request {
    method: String,
    path: String,
    query: Option<String>,
    protocol: String,
    headers: MultiMap,
    parameters: MultiMap,
    cookies: Vec<Cookie>,
    local_addr: SocketAddr,
    remote_addr: SocketAddr,
    scope: RequestScope,
}

impl std::fmt::Debug for RequestScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestScope")
            .field("attributes", &self.attributes.len())
            .field("session", &self.session.lock().as_ref().map(|s| s.id().to_string()))
            .finish()
    }
}

/// Everything the codec gathers before freezing a [`Request`].
#[derive(Debug)]
pub(crate) struct RequestHead {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub protocol: String,
    pub headers: MultiMap,
    pub parameters: MultiMap,
    pub cookies: Vec<Cookie>,
}

impl Request {
    pub(crate) fn from_head(head: RequestHead, local_addr: SocketAddr, remote_addr: SocketAddr) -> Self {
        Self {
            method: head.method,
            path: head.path,
            query: head.query,
            protocol: head.protocol,
            headers: head.headers,
            parameters: head.parameters,
            cookies: head.cookies,
            local_addr,
            remote_addr,
            scope: RequestScope::default(),
        }
    }

    /// Parse a complete request head from memory with unspecified socket addresses.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, crate::http::ProtocolError> {
        let unspecified = SocketAddr::from(([0, 0, 0, 0], 0));
        let mut reader = bytes;
        crate::http::codec::parse_request(&mut reader, unspecified, unspecified)
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    /// Request path, without the query string.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Raw query string (text after the first `?`), if the target had one.
    pub fn query_string(&self) -> Option<&str> {
        self.query.as_deref()
    }

    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    pub fn is_secure(&self) -> bool {
        self.protocol.starts_with("HTTPS")
    }

    /// First value of a header. Names match ignoring ASCII case.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get_ignore_case(name)
    }

    /// Every value of a header, in arrival order.
    pub fn headers(&self, name: &str) -> &[String] {
        self.headers.get_all_ignore_case(name)
    }

    pub fn header_names(&self) -> impl Iterator<Item = &str> {
        self.headers.names()
    }

    pub fn header_map(&self) -> &MultiMap {
        &self.headers
    }

    /// Header parsed as an integer, `None` when absent or not numeric.
    pub fn int_header(&self, name: &str) -> Option<i64> {
        self.header(name).and_then(|v| v.trim().parse().ok())
    }

    /// First value of a query parameter.
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters.get(name)
    }

    pub fn parameter_values(&self, name: &str) -> &[String] {
        self.parameters.get_all(name)
    }

    pub fn parameter_map(&self) -> &MultiMap {
        &self.parameters
    }

    pub fn cookies(&self) -> &[Cookie] {
        &self.cookies
    }

    pub fn cookie(&self, name: &str) -> Option<&Cookie> {
        self.cookies.iter().find(|c| c.name() == name)
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    /// Host name from the `Host` header, falling back to the local address.
    pub fn server_name(&self) -> String {
        match self.header("Host") {
            Some(host) => split_host(host).0.to_string(),
            None => self.local_addr.ip().to_string(),
        }
    }

    /// Port from the `Host` header (`host:port`), falling back to the local port.
    pub fn server_port(&self) -> u16 {
        self.header("Host")
            .and_then(|host| split_host(host).1)
            .unwrap_or_else(|| self.local_addr.port())
    }

    /// Declared `Content-Length`, if any.
    pub fn content_length(&self) -> Option<u64> {
        self.header("Content-Length").and_then(|v| v.trim().parse().ok())
    }

    /// True when the client sent a body the codec did not read.
    pub fn has_unconsumed_body(&self) -> bool {
        self.content_length().is_some_and(|len| len > 0) || self.header("Transfer-Encoding").is_some()
    }

    /// Language tags from `Accept-Language`, in the order the client sent them.
    pub fn locales(&self) -> Vec<String> {
        self.headers("Accept-Language")
            .iter()
            .flat_map(|value| value.split(','))
            .filter_map(|tag| {
                let tag = tag.split(';').next().unwrap_or("").trim();
                (!tag.is_empty()).then(|| tag.to_string())
            })
            .collect()
    }

    // Request attributes

    pub fn attribute(&self, name: &str) -> Option<Value> {
        self.scope.attributes.get(name)
    }

    pub fn set_attribute(&self, name: &str, value: Value) -> AttributeChange {
        self.scope.attributes.set(name, value)
    }

    pub fn remove_attribute(&self, name: &str) -> AttributeChange {
        self.scope.attributes.remove(name)
    }

    pub fn attribute_names(&self) -> Vec<String> {
        self.scope.attributes.names()
    }

    // Application and session

    /// Context of the application currently serving the request.
    pub fn context(&self) -> Option<Arc<AppContext>> {
        self.scope.context.lock().clone()
    }

    /// Context path of the serving application.
    pub fn context_path(&self) -> Option<String> {
        self.scope.context.lock().as_ref().map(|c| c.context_path().to_string())
    }

    /// Session id sent by the client in the session cookie.
    pub fn requested_session_id(&self) -> Option<&str> {
        self.cookie(SESSION_COOKIE).map(Cookie::value)
    }

    /// Whether the requested session id names a live session.
    pub fn is_requested_session_id_valid(&self) -> bool {
        let (Some(id), Some(context)) = (self.requested_session_id(), self.context()) else {
            return false;
        };
        context.sessions().find(id).is_some()
    }

    /// The session of this request in the serving application.
    ///
    /// With `create`, a missing or expired session is replaced by a new one
    /// and the response carries its cookie. `None` outside an application.
    pub fn session(&self, create: bool) -> Option<Arc<Session>> {
        let context = self.context()?;
        let mut current = self.scope.session.lock();
        if let Some(session) = current.as_ref() {
            return Some(Arc::clone(session));
        }
        let found = self
            .requested_session_id()
            .and_then(|id| context.sessions().find(id));
        let session = match found {
            Some(session) => session,
            None if create => {
                let session = context.sessions().create();
                *self.scope.new_session.lock() = Some(session.id().to_string());
                session
            }
            None => return None,
        };
        *current = Some(Arc::clone(&session));
        Some(session)
    }

    /// Attach the request to the application about to serve it.
    pub(crate) fn bind_context(&self, context: Arc<AppContext>) {
        let mut bound = self.scope.context.lock();
        let same = bound.as_ref().is_some_and(|current| Arc::ptr_eq(current, &context));
        if !same {
            *self.scope.session.lock() = None;
            *self.scope.new_session.lock() = None;
            *bound = Some(context);
        }
    }

    /// Id of a session created while serving, once.
    pub(crate) fn take_new_session(&self) -> Option<String> {
        self.scope.new_session.lock().take()
    }
}

/// Split `host[:port]`, leaving bracketed IPv6 literals intact.
fn split_host(host: &str) -> (&str, Option<u16>) {
    let host = host.trim();
    match host.rsplit_once(':') {
        Some((name, port)) if !name.is_empty() && (!name.contains(':') || name.ends_with(']')) => {
            (name, port.parse().ok())
        }
        _ => (host, None),
    }
}
