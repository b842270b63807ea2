//! Connection lifecycle tracking and per-request dispatch.
//!
//! # Responsibilities
//! - Generate unique connection IDs for tracing
//! - Count open connections and publish the gauge
//! - Run the dispatcher with panic isolation
//! - Turn a response into the bytes written to the socket

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::http::codec::render_response;
use crate::http::{Request, Response};
use crate::observability::metrics;
use crate::server::HttpDispatcher;

/// Global atomic counter for connection IDs.
/// Using relaxed ordering is sufficient since we only need uniqueness, not synchronization.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Counts open connections for one connector.
#[derive(Debug, Clone, Default)]
pub struct ConnectionTracker {
    active_count: Arc<AtomicU64>,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new active connection. Returns a guard that decrements on drop.
    pub fn track(&self) -> ConnectionGuard {
        let count = self.active_count.fetch_add(1, Ordering::SeqCst) + 1;
        metrics::set_active_connections(count);
        let id = ConnectionId::new();
        tracing::trace!(connection_id = %id, active = count, "Connection opened");
        ConnectionGuard {
            active_count: Arc::clone(&self.active_count),
            id,
        }
    }

    pub fn active_count(&self) -> u64 {
        self.active_count.load(Ordering::SeqCst)
    }
}

/// Guard that tracks a connection's lifetime.
/// Decrements active count when dropped.
#[derive(Debug)]
pub struct ConnectionGuard {
    active_count: Arc<AtomicU64>,
    id: ConnectionId,
}

impl ConnectionGuard {
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        let count = self.active_count.fetch_sub(1, Ordering::SeqCst) - 1;
        metrics::set_active_connections(count);
        tracing::trace!(connection_id = %self.id, "Connection closed");
    }
}

/// Run the dispatcher for one request. A panic becomes a `500`.
pub fn dispatch(dispatcher: &dyn HttpDispatcher, request: &Request) -> Response {
    let mut response = Response::new();
    let outcome = catch_unwind(AssertUnwindSafe(|| dispatcher.handle_http(request, &mut response)));
    if outcome.is_err() {
        tracing::error!(method = %request.method(), path = %request.path(), "Dispatcher panicked");
        metrics::record_handler_failure("-");
        response.send_error(500);
    }
    response
}

/// An empty response with `status`.
pub fn error_response(status: u16) -> Response {
    Response::with_status(status)
}

/// Status line, headers, blank line, then the body.
pub fn response_bytes(response: &Response) -> Vec<u8> {
    let mut bytes = render_response(response);
    bytes.extend_from_slice(response.body());
    bytes
}

/// Address to connect to in order to reach a listener bound to `addr`.
pub(crate) fn wake_address(addr: SocketAddr) -> SocketAddr {
    let ip = match addr.ip() {
        IpAddr::V4(ip) if ip.is_unspecified() => IpAddr::V4(Ipv4Addr::LOCALHOST),
        IpAddr::V6(ip) if ip.is_unspecified() => IpAddr::V6(Ipv6Addr::LOCALHOST),
        ip => ip,
    };
    SocketAddr::new(ip, addr.port())
}

/// How much of a request body to read and throw away before responding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BodyPolicy {
    None,
    Discard(u64),
    /// Too large or not length-delimited; left unread.
    Abandon,
}

pub(crate) fn body_policy(request: &Request, max_discard: u64) -> BodyPolicy {
    if request.header("Transfer-Encoding").is_some() {
        return BodyPolicy::Abandon;
    }
    match request.content_length() {
        None | Some(0) => BodyPolicy::None,
        Some(length) if length <= max_discard => BodyPolicy::Discard(length),
        Some(_) => BodyPolicy::Abandon,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Exploding;

    impl HttpDispatcher for Exploding {
        fn handle_http(&self, _request: &Request, response: &mut Response) {
            response.write("partial");
            panic!("handler bug");
        }
    }

    #[test]
    fn connection_id_unique() {
        let id1 = ConnectionId::new();
        let id2 = ConnectionId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn connection_tracker_counts() {
        let tracker = ConnectionTracker::new();
        assert_eq!(tracker.active_count(), 0);

        let guard1 = tracker.track();
        assert_eq!(tracker.active_count(), 1);

        let guard2 = tracker.track();
        assert_eq!(tracker.active_count(), 2);

        drop(guard1);
        assert_eq!(tracker.active_count(), 1);

        drop(guard2);
        assert_eq!(tracker.active_count(), 0);
    }

    #[test]
    fn panic_becomes_500() {
        let request = Request::from_bytes(b"GET / HTTP/1.1\r\n\r\n").unwrap();
        let response = dispatch(&Exploding, &request);
        assert_eq!(response.status(), 500);
        assert!(response.body().is_empty());
    }

    #[test]
    fn response_bytes_appends_body() {
        let mut response = Response::new();
        response.write("hello");
        let bytes = response_bytes(&response);
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains("Content-Length: 5\r\n"));
        assert!(text.ends_with("\r\n\r\nhello"));
    }

    #[test]
    fn wake_address_uses_loopback_for_wildcard() {
        let addr: SocketAddr = "0.0.0.0:8080".parse().unwrap();
        assert_eq!(wake_address(addr), "127.0.0.1:8080".parse().unwrap());
        let addr: SocketAddr = "[::]:81".parse().unwrap();
        assert_eq!(wake_address(addr), "[::1]:81".parse().unwrap());
        let addr: SocketAddr = "10.0.0.5:90".parse().unwrap();
        assert_eq!(wake_address(addr), addr);
    }

    #[test]
    fn body_policy_by_length() {
        let request = |head: &str| Request::from_bytes(head.as_bytes()).unwrap();
        assert_eq!(body_policy(&request("GET / HTTP/1.1\r\n\r\n"), 10), BodyPolicy::None);
        assert_eq!(
            body_policy(&request("POST / HTTP/1.1\r\nContent-Length: 4\r\n\r\n"), 10),
            BodyPolicy::Discard(4)
        );
        assert_eq!(
            body_policy(&request("POST / HTTP/1.1\r\nContent-Length: 40\r\n\r\n"), 10),
            BodyPolicy::Abandon
        );
        assert_eq!(
            body_policy(&request("POST / HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n"), 10),
            BodyPolicy::Abandon
        );
    }
}
