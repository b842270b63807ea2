//! Event-driven connector on a dedicated tokio runtime.
//!
//! # Data Flow
//! ```text
//! acceptor task (select: accept | cancelled)
//!     → one task per connection, tracked in a JoinSet
//!     → read into a buffer until find_head_end
//!     → parse head → discard body
//!     → spawn_blocking(dispatch)
//!     → write response → shutdown
//! ```
//!
//! # Design Decisions
//! - The connector owns its runtime; `bind` must not be called from inside
//!   another tokio runtime
//! - Dispatch never runs on reactor threads
//! - `close` cancels the bind session; open connections get the drain
//!   timeout, then the rest are aborted and the runtime is shut down
//!   before `close` returns
//! - A connection that already sent bytes is served; only idle ones are
//!   dropped on close

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::config::ConnectorConfig;
use crate::http::codec::{find_head_end, parse_request, MAX_HEAD_BYTES};
use crate::net::connection::{
    body_policy, dispatch, error_response, response_bytes, BodyPolicy, ConnectionGuard, ConnectionTracker,
};
use crate::net::gate::{BindGate, BindSession};
use crate::net::{Connector, ConnectorError};
use crate::observability::metrics;
use crate::server::HttpDispatcher;

const READ_TIMEOUT: Duration = Duration::from_secs(30);
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);
const READ_CHUNK: usize = 4096;

#[derive(Debug)]
pub struct ReactorConnector {
    worker_threads: usize,
    max_discard_body_bytes: u64,
    drain_timeout: Duration,
    gate: BindGate,
    tracker: ConnectionTracker,
}

impl ReactorConnector {
    pub fn new(config: &ConnectorConfig) -> Self {
        Self {
            worker_threads: config.worker_threads.max(1),
            max_discard_body_bytes: config.max_discard_body_bytes,
            drain_timeout: config.drain_timeout(),
            gate: BindGate::new(),
            tracker: ConnectionTracker::new(),
        }
    }

    pub fn active_connections(&self) -> u64 {
        self.tracker.active_count()
    }

    async fn serve(
        &self,
        host: &str,
        port: u16,
        dispatcher: Arc<dyn HttpDispatcher>,
        session: &BindSession,
    ) -> Result<(), ConnectorError> {
        let token = session.token();
        let address = format!("{host}:{port}");
        let listener = TcpListener::bind((host, port))
            .await
            .map_err(|source| ConnectorError::Bind {
                address: address.clone(),
                source,
            })?;
        let bound = listener
            .local_addr()
            .map_err(|source| ConnectorError::Bind { address, source })?;
        session.set_local_addr(bound);
        tracing::info!(address = %bound, workers = self.worker_threads, "Reactor connector listening");

        let mut connections = JoinSet::new();
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, remote)) => {
                        let guard = self.tracker.track();
                        connections.spawn(serve_connection(
                            stream,
                            remote,
                            Arc::clone(&dispatcher),
                            guard,
                            self.max_discard_body_bytes,
                            token.clone(),
                        ));
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to accept connection");
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                },
                Some(finished) = connections.join_next(), if !connections.is_empty() => {
                    log_task_exit(finished);
                }
            }
        }

        drop(listener);
        tracing::info!(address = %bound, in_flight = connections.len(), "Reactor connector draining");

        let drain = async {
            while let Some(finished) = connections.join_next().await {
                log_task_exit(finished);
            }
        };
        let drained = tokio::time::timeout(self.drain_timeout, drain).await;
        if drained.is_err() {
            tracing::warn!(remaining = connections.len(), "Drain timeout elapsed, aborting connections");
            connections.abort_all();
        }

        tracing::info!(address = %bound, "Reactor connector closed");
        Ok(())
    }
}

impl Connector for ReactorConnector {
    fn bind(&self, host: &str, port: u16, dispatcher: Arc<dyn HttpDispatcher>) -> Result<(), ConnectorError> {
        let Some(session) = self.gate.begin() else {
            return Ok(());
        };

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(self.worker_threads)
            .thread_name("reactor-worker")
            .enable_all()
            .build()
            .map_err(ConnectorError::Runtime)?;

        let result = runtime.block_on(self.serve(host, port, dispatcher, &session));
        runtime.shutdown_timeout(self.drain_timeout);
        drop(session);
        result
    }

    fn close(&self) {
        // Cancellation alone wakes the acceptor.
        self.gate.close(|_| {});
    }

    fn reset(&self) {
        self.gate.reset();
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.gate.local_addr()
    }

    fn name(&self) -> &'static str {
        "reactor"
    }
}

fn log_task_exit(finished: Result<(), tokio::task::JoinError>) {
    if let Err(e) = finished {
        if e.is_panic() {
            tracing::error!(error = %e, "Connection task panicked");
        }
    }
}

async fn serve_connection(
    mut stream: TcpStream,
    remote: SocketAddr,
    dispatcher: Arc<dyn HttpDispatcher>,
    guard: ConnectionGuard,
    max_discard: u64,
    token: CancellationToken,
) {
    let connection_id = guard.id();
    let local = stream
        .local_addr()
        .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], 0)));

    let mut buf: Vec<u8> = Vec::with_capacity(READ_CHUNK);
    let mut chunk = [0u8; READ_CHUNK];
    let head_end = loop {
        if let Some(end) = find_head_end(&buf) {
            break end;
        }
        if buf.len() > MAX_HEAD_BYTES {
            break buf.len();
        }
        let read = tokio::select! {
            biased;
            read = tokio::time::timeout(READ_TIMEOUT, stream.read(&mut chunk)) => read,
            _ = token.cancelled(), if buf.is_empty() => {
                tracing::trace!(connection_id = %connection_id, "Idle connection dropped on close");
                return;
            }
        };
        match read {
            Ok(Ok(0)) if buf.is_empty() => {
                tracing::trace!(connection_id = %connection_id, "Connection closed without a request");
                return;
            }
            // Let the parser report what is missing.
            Ok(Ok(0)) => break buf.len(),
            Ok(Ok(n)) => buf.extend_from_slice(&chunk[..n]),
            Ok(Err(e)) => {
                tracing::debug!(connection_id = %connection_id, error = %e, "Read failed");
                return;
            }
            Err(_) => {
                tracing::debug!(connection_id = %connection_id, "Timed out waiting for request head");
                return;
            }
        }
    };

    let response = match parse_request(&mut &buf[..head_end], local, remote) {
        Ok(request) => {
            tracing::debug!(
                connection_id = %connection_id,
                method = %request.method(),
                path = %request.path(),
                "Request received"
            );
            if let BodyPolicy::Discard(length) = body_policy(&request, max_discard) {
                let buffered = (buf.len() - head_end) as u64;
                let remaining = length.saturating_sub(buffered);
                if remaining > 0 {
                    let drained = tokio::time::timeout(
                        READ_TIMEOUT,
                        tokio::io::copy(&mut (&mut stream).take(remaining), &mut tokio::io::sink()),
                    )
                    .await;
                    if !matches!(drained, Ok(Ok(_))) {
                        tracing::debug!(connection_id = %connection_id, "Failed to drain request body");
                    }
                }
            }
            match tokio::task::spawn_blocking(move || dispatch(dispatcher.as_ref(), &request)).await {
                Ok(response) => response,
                Err(e) => {
                    tracing::error!(connection_id = %connection_id, error = %e, "Dispatch task failed");
                    error_response(500)
                }
            }
        }
        Err(e) => {
            tracing::warn!(connection_id = %connection_id, remote = %remote, error = %e, "Rejected malformed request");
            metrics::record_protocol_error();
            error_response(400)
        }
    };

    if let Err(e) = stream.write_all(&response_bytes(&response)).await {
        tracing::debug!(connection_id = %connection_id, error = %e, "Failed to write response");
    }
    let _ = stream.shutdown().await;
    drop(guard);
}
