//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (main.rs):
//!     Load config → Validate → Install applications → Server::start (blocks)
//!
//! Signals (signals.rs):
//!     SIGINT/SIGTERM → Server::stop → connector closes → start returns
//! ```
//!
//! # Design Decisions
//! - Signals are awaited on a small dedicated runtime thread, so the
//!   blocking connector never needs a tokio runtime
//! - A second signal after stop has begun forces the process to exit

pub mod signals;

pub use signals::spawn_signal_handler;
