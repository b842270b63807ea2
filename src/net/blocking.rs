//! Thread-per-request connector.
//!
//! # Data Flow
//! ```text
//! TcpListener::accept (calling thread)
//!     → WorkerPool::execute (blocks when the queue is full)
//!     → worker: parse one head → discard body → dispatch
//!     → write response → shutdown(Write)
//! ```
//!
//! # Design Decisions
//! - One request per connection; no keep-alive
//! - `close` cancels the bind session and wakes `accept` with a loopback
//!   connection
//! - The session ends only after the pool is joined, so queued connections
//!   are still answered before `close` returns

use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::time::Duration;

use crate::config::ConnectorConfig;
use crate::http::codec::parse_request;
use crate::http::ProtocolError;
use crate::net::connection::{
    body_policy, dispatch, error_response, response_bytes, wake_address, BodyPolicy, ConnectionGuard,
    ConnectionTracker,
};
use crate::net::gate::BindGate;
use crate::net::pool::WorkerPool;
use crate::net::{Connector, ConnectorError};
use crate::observability::metrics;
use crate::server::HttpDispatcher;

/// Socket read timeout for a worker waiting on a slow client.
const READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Pause after a failed `accept` before trying again.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

#[derive(Debug)]
pub struct BlockingConnector {
    worker_threads: usize,
    queue_depth: usize,
    max_discard_body_bytes: u64,
    gate: BindGate,
    tracker: ConnectionTracker,
}

impl BlockingConnector {
    pub fn new(config: &ConnectorConfig) -> Self {
        Self {
            worker_threads: config.worker_threads,
            queue_depth: config.queue_depth,
            max_discard_body_bytes: config.max_discard_body_bytes,
            gate: BindGate::new(),
            tracker: ConnectionTracker::new(),
        }
    }

    pub fn active_connections(&self) -> u64 {
        self.tracker.active_count()
    }
}

impl Connector for BlockingConnector {
    fn bind(&self, host: &str, port: u16, dispatcher: Arc<dyn HttpDispatcher>) -> Result<(), ConnectorError> {
        let Some(session) = self.gate.begin() else {
            return Ok(());
        };

        let address = format!("{host}:{port}");
        let listener = TcpListener::bind((host, port)).map_err(|source| ConnectorError::Bind {
            address: address.clone(),
            source,
        })?;
        let bound = listener.local_addr().map_err(|source| ConnectorError::Bind { address, source })?;
        session.set_local_addr(bound);

        let pool = WorkerPool::new("blocking-worker", self.worker_threads, self.queue_depth)
            .map_err(ConnectorError::Runtime)?;
        tracing::info!(address = %bound, workers = pool.size(), "Blocking connector listening");

        while !session.is_cancelled() {
            match listener.accept() {
                Ok((stream, remote)) => {
                    if session.is_cancelled() {
                        break;
                    }
                    let guard = self.tracker.track();
                    let dispatcher = Arc::clone(&dispatcher);
                    let max_discard = self.max_discard_body_bytes;
                    let job = move || serve_connection(stream, remote, dispatcher.as_ref(), guard, max_discard);
                    if pool.execute(job).is_err() {
                        break;
                    }
                }
                Err(e) if session.is_cancelled() => {
                    tracing::debug!(error = %e, "Accept interrupted by close");
                    break;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to accept connection");
                    std::thread::sleep(ACCEPT_BACKOFF);
                }
            }
        }

        drop(listener);
        tracing::info!(address = %bound, in_flight = self.tracker.active_count(), "Blocking connector draining");
        pool.shutdown();
        tracing::info!(address = %bound, "Blocking connector closed");
        Ok(())
    }

    fn close(&self) {
        self.gate.close(|session| {
            if let Some(addr) = session.local_addr() {
                // Unblock the pending accept; the loop observes the token.
                if let Err(e) = TcpStream::connect_timeout(&wake_address(addr), Duration::from_secs(1)) {
                    tracing::debug!(address = %addr, error = %e, "Wake-up connect failed");
                }
            }
        });
    }

    fn reset(&self) {
        self.gate.reset();
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.gate.local_addr()
    }

    fn name(&self) -> &'static str {
        "blocking"
    }
}

fn serve_connection(
    stream: TcpStream,
    remote: SocketAddr,
    dispatcher: &dyn HttpDispatcher,
    guard: ConnectionGuard,
    max_discard: u64,
) {
    let connection_id = guard.id();
    if let Err(e) = stream.set_read_timeout(Some(READ_TIMEOUT)) {
        tracing::debug!(connection_id = %connection_id, error = %e, "Failed to set read timeout");
    }
    let local = stream
        .local_addr()
        .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], 0)));

    let mut reader = BufReader::new(&stream);
    match reader.fill_buf() {
        Ok([]) => {
            tracing::trace!(connection_id = %connection_id, "Connection closed without a request");
            return;
        }
        Ok(_) => {}
        Err(e) => {
            tracing::debug!(connection_id = %connection_id, error = %e, "Read failed");
            return;
        }
    }

    let response = match parse_request(&mut reader, local, remote) {
        Ok(request) => {
            tracing::debug!(
                connection_id = %connection_id,
                method = %request.method(),
                path = %request.path(),
                "Request received"
            );
            match body_policy(&request, max_discard) {
                BodyPolicy::Discard(length) => {
                    if let Err(e) = io::copy(&mut (&mut reader).take(length), &mut io::sink()) {
                        tracing::debug!(connection_id = %connection_id, error = %e, "Failed to drain request body");
                    }
                }
                BodyPolicy::Abandon => {
                    tracing::debug!(connection_id = %connection_id, "Request body left unread");
                }
                BodyPolicy::None => {}
            }
            dispatch(dispatcher, &request)
        }
        Err(ProtocolError::Io(e)) => {
            tracing::debug!(connection_id = %connection_id, error = %e, "Read failed");
            return;
        }
        Err(e) => {
            tracing::warn!(connection_id = %connection_id, remote = %remote, error = %e, "Rejected malformed request");
            metrics::record_protocol_error();
            error_response(400)
        }
    };

    let mut writer = &stream;
    let written = writer
        .write_all(&response_bytes(&response))
        .and_then(|()| writer.flush());
    if let Err(e) = written {
        tracing::debug!(connection_id = %connection_id, error = %e, "Failed to write response");
    }
    let _ = stream.shutdown(Shutdown::Write);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{Request, Response};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Instant;

    #[derive(Default)]
    struct Slow {
        started: AtomicUsize,
        finished: AtomicUsize,
    }

    impl HttpDispatcher for Slow {
        fn handle_http(&self, _request: &Request, response: &mut Response) {
            self.started.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(150));
            response.write("slow");
            self.finished.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn single_worker() -> ConnectorConfig {
        ConnectorConfig {
            worker_threads: 1,
            queue_depth: 4,
            ..ConnectorConfig::default()
        }
    }

    fn wait_for_addr(connector: &BlockingConnector) -> SocketAddr {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            if let Some(addr) = connector.local_addr() {
                return addr;
            }
            assert!(Instant::now() < deadline, "connector never bound");
            thread::sleep(Duration::from_millis(10));
        }
    }

    fn request(addr: SocketAddr, path: &str) -> TcpStream {
        let mut stream = TcpStream::connect(addr).unwrap();
        stream
            .write_all(format!("GET {path} HTTP/1.1\r\n\r\n").as_bytes())
            .unwrap();
        stream
    }

    fn read_reply(mut stream: TcpStream) -> String {
        stream.set_read_timeout(Some(Duration::from_secs(10))).unwrap();
        let mut reply = String::new();
        stream.read_to_string(&mut reply).unwrap();
        reply
    }

    #[test]
    fn closed_connector_returns_without_binding() {
        let connector = BlockingConnector::new(&single_worker());
        connector.close();
        connector.bind("127.0.0.1", 0, Arc::new(Slow::default())).unwrap();
        assert!(connector.local_addr().is_none());
    }

    #[test]
    fn close_answers_in_flight_and_queued_connections() {
        let connector = Arc::new(BlockingConnector::new(&single_worker()));
        let slow = Arc::new(Slow::default());
        let runner = Arc::clone(&connector);
        let dispatcher = slow.clone();
        let handle = thread::spawn(move || runner.bind("127.0.0.1", 0, dispatcher));
        let addr = wait_for_addr(&connector);

        let in_flight = request(addr, "/first");
        let deadline = Instant::now() + Duration::from_secs(5);
        while slow.started.load(Ordering::SeqCst) < 1 {
            assert!(Instant::now() < deadline, "first request never dispatched");
            thread::sleep(Duration::from_millis(5));
        }
        // The only worker is busy, so this one waits in the queue.
        let queued = request(addr, "/second");
        while connector.active_connections() < 2 {
            assert!(Instant::now() < deadline, "second connection never accepted");
            thread::sleep(Duration::from_millis(5));
        }

        connector.close();
        assert_eq!(slow.finished.load(Ordering::SeqCst), 2);
        assert!(connector.local_addr().is_none());
        assert!(read_reply(in_flight).ends_with("slow"));
        assert!(read_reply(queued).ends_with("slow"));
        handle.join().unwrap().unwrap();
    }

    #[test]
    fn rebind_keeps_its_own_address() {
        let connector = Arc::new(BlockingConnector::new(&single_worker()));
        let slow = Arc::new(Slow::default());

        let runner = Arc::clone(&connector);
        let dispatcher = slow.clone();
        let first = thread::spawn(move || runner.bind("127.0.0.1", 0, dispatcher));
        wait_for_addr(&connector);
        connector.close();
        connector.reset();

        let runner = Arc::clone(&connector);
        let dispatcher = slow.clone();
        let second = thread::spawn(move || runner.bind("127.0.0.1", 0, dispatcher));
        first.join().unwrap().unwrap();
        let addr = wait_for_addr(&connector);
        assert!(read_reply(request(addr, "/again")).ends_with("slow"));
        assert_eq!(connector.local_addr(), Some(addr));

        connector.close();
        second.join().unwrap().unwrap();
        assert!(connector.local_addr().is_none());
    }
}
