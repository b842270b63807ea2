//! app-router server binary.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client ──▶ net (blocking | reactor connector)
//!                   │  http::codec parses one request head
//!                   ▼
//!                server ──▶ content path ──▶ WebApp
//!                   │                         │  routing: servlet + filters
//!                   │                         ▼
//!                   │                      component chain ──▶ Response
//!                   ▼
//!                root application / default handler (404)
//!
//!     config ── descriptor watcher ──▶ Server::reload_app
//!     lifecycle ── SIGINT/SIGTERM ──▶ Server::stop
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use clap::Parser;

use app_router::component::ComponentRegistry;
use app_router::config::{load_config, ApplicationConfig, ConnectorKind, DescriptorWatcher, ServerConfig};
use app_router::lifecycle::spawn_signal_handler;
use app_router::observability::{logging, metrics};
use app_router::server::Server;

#[derive(Debug, Parser)]
#[command(name = "app-router", version, about = "Serve web applications from their descriptors")]
struct Args {
    /// Server configuration file (TOML).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Application root to install; may be repeated.
    #[arg(short, long = "app")]
    apps: Vec<PathBuf>,

    /// Override the configured connector.
    #[arg(long, value_enum)]
    connector: Option<ConnectorKind>,

    /// Override the configured port.
    #[arg(short, long)]
    port: Option<u16>,

    /// Reload applications when their descriptor changes.
    #[arg(long)]
    watch: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => ServerConfig::default(),
    };
    if let Some(kind) = args.connector {
        config.connector.kind = kind;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    config
        .applications
        .extend(args.apps.iter().cloned().map(|root| ApplicationConfig { root }));

    logging::init_logging(&config.observability)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "app-router starting");
    tracing::info!(
        host = %config.server.host,
        port = config.server.port,
        connector = %config.connector.kind,
        workers = config.connector.worker_threads,
        applications = config.applications.len(),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics exporter");
                }
            }
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let registry = Arc::new(ComponentRegistry::with_builtins());
    let server = Arc::new(Server::from_config(&config, registry));

    for application in &config.applications {
        if let Err(e) = server.add_app(&application.root) {
            tracing::error!(root = %application.root.display(), error = %e, "Failed to install application");
        }
    }

    let _watcher = if args.watch {
        let roots: Vec<PathBuf> = server.apps().iter().map(|app| app.root().to_path_buf()).collect();
        let (watcher, mut reloads) = DescriptorWatcher::new(&roots);
        let watcher = watcher.run()?;
        let reloader = Arc::clone(&server);
        thread::Builder::new()
            .name("descriptor-reload".to_string())
            .spawn(move || {
                while let Some(root) = reloads.blocking_recv() {
                    if let Err(e) = reloader.reload_app(&root) {
                        tracing::error!(root = %root.display(), error = %e, "Reload failed, keeping previous application");
                    }
                }
            })?;
        Some(watcher)
    } else {
        None
    };

    spawn_signal_handler(Arc::clone(&server))?;
    server.start()?;

    tracing::info!("Shutdown complete");
    Ok(())
}
