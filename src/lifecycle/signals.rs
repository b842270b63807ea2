//! OS signal handling.
//!
//! # Responsibilities
//! - Wait for SIGINT (and SIGTERM on unix)
//! - Stop the server on the first signal
//! - Exit the process on the second

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::server::Server;

/// Exit status used when a second signal forces the process down.
const FORCED_EXIT_CODE: i32 = 130;

/// Spawn the thread that turns termination signals into [`Server::stop`].
pub fn spawn_signal_handler(server: Arc<Server>) -> io::Result<JoinHandle<()>> {
    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
    thread::Builder::new()
        .name("signal-handler".to_string())
        .spawn(move || {
            runtime.block_on(async move {
                wait_for_signal().await;
                tracing::info!(server = %server.name(), "Shutdown signal received, stopping");
                if let Err(e) = server.stop() {
                    tracing::warn!(error = %e, "Stop on signal failed");
                }

                wait_for_signal().await;
                tracing::warn!("Second shutdown signal received, forcing exit");
                std::process::exit(FORCED_EXIT_CODE);
            })
        })
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(stream) => stream,
        Err(e) => {
            tracing::warn!(error = %e, "SIGTERM handler unavailable");
            ctrl_c().await;
            return;
        }
    };
    tokio::select! {
        _ = ctrl_c() => {}
        _ = terminate.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    ctrl_c().await;
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}
