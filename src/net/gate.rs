//! Bind sessions shared by both connectors.
//!
//! # Data Flow
//! ```text
//! bind  → BindGate::begin → SessionGuard (token + bound address)
//!       → serve until the token is cancelled
//!       → drain → guard dropped → waiting close() returns
//!
//! close → mark closed → cancel running token → wake → wait for guard drop
//! ```
//!
//! # Design Decisions
//! - Every `bind` gets its own session, so a bind that is still winding
//!   down never touches the address or token of the next one
//! - `begin` waits for the previous session to finish before starting
//! - `close` returns only once the running bind has drained

use std::net::SocketAddr;
use std::ops::Deref;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};
use tokio_util::sync::CancellationToken;

/// State of one `bind` call.
#[derive(Debug, Default)]
pub struct BindSession {
    token: CancellationToken,
    local_addr: Mutex<Option<SocketAddr>>,
}

impl BindSession {
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn set_local_addr(&self, addr: SocketAddr) {
        *self.local_addr.lock() = Some(addr);
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock()
    }
}

#[derive(Debug, Default)]
struct GateState {
    closed: bool,
    running: Option<Arc<BindSession>>,
}

#[derive(Debug, Default)]
pub struct BindGate {
    state: Mutex<GateState>,
    finished: Condvar,
}

impl BindGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a session, waiting for a running one to finish first.
    ///
    /// Returns `None` once the gate is closed.
    pub fn begin(&self) -> Option<SessionGuard<'_>> {
        let mut state = self.state.lock();
        while state.running.is_some() && !state.closed {
            self.finished.wait(&mut state);
        }
        if state.closed {
            return None;
        }
        let session = Arc::new(BindSession::default());
        state.running = Some(Arc::clone(&session));
        Some(SessionGuard { gate: self, session })
    }

    /// Close the gate and cancel the running session, then block until it
    /// ends. `wake` runs once, outside the lock, for the cancelled session.
    pub fn close(&self, wake: impl FnOnce(&BindSession)) {
        let running = {
            let mut state = self.state.lock();
            state.closed = true;
            state.running.clone()
        };
        let Some(session) = running else {
            return;
        };

        session.token.cancel();
        wake(&session);

        let mut state = self.state.lock();
        while state
            .running
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, &session))
        {
            self.finished.wait(&mut state);
        }
    }

    /// Re-open a closed gate.
    pub fn reset(&self) {
        self.state.lock().closed = false;
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Address of the running session, once it has bound.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.state.lock().running.as_ref().and_then(|session| session.local_addr())
    }
}

/// Marks a session as running until dropped.
#[derive(Debug)]
pub struct SessionGuard<'a> {
    gate: &'a BindGate,
    session: Arc<BindSession>,
}

impl Deref for SessionGuard<'_> {
    type Target = BindSession;

    fn deref(&self) -> &BindSession {
        &self.session
    }
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.gate.state.lock();
        if state
            .running
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, &self.session))
        {
            state.running = None;
        }
        drop(state);
        self.gate.finished.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn closed_gate_refuses_sessions() {
        let gate = BindGate::new();
        gate.close(|_| panic!("nothing to wake"));
        assert!(gate.is_closed());
        assert!(gate.begin().is_none());
        gate.reset();
        assert!(gate.begin().is_some());
    }

    #[test]
    fn address_belongs_to_the_running_session() {
        let gate = BindGate::new();
        let session = gate.begin().unwrap();
        assert_eq!(gate.local_addr(), None);
        let addr: SocketAddr = "127.0.0.1:8080".parse().unwrap();
        session.set_local_addr(addr);
        assert_eq!(gate.local_addr(), Some(addr));
        drop(session);
        assert_eq!(gate.local_addr(), None);
    }

    #[test]
    fn close_waits_for_the_session_to_end() {
        let gate = Arc::new(BindGate::new());
        let ended = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = std::sync::mpsc::channel();

        let worker = {
            let gate = Arc::clone(&gate);
            let ended = Arc::clone(&ended);
            thread::spawn(move || {
                let session = gate.begin().unwrap();
                ready_tx.send(()).unwrap();
                while !session.is_cancelled() {
                    thread::sleep(Duration::from_millis(5));
                }
                // Still draining after cancellation.
                thread::sleep(Duration::from_millis(100));
                ended.store(true, Ordering::SeqCst);
            })
        };

        ready_rx.recv().unwrap();
        let mut woken = false;
        gate.close(|session| {
            assert!(session.is_cancelled());
            woken = true;
        });
        assert!(woken);
        assert!(ended.load(Ordering::SeqCst));
        worker.join().unwrap();
    }

    #[test]
    fn next_session_waits_for_the_previous_one() {
        let gate = Arc::new(BindGate::new());
        let first = gate.begin().unwrap();
        let first_addr: SocketAddr = "127.0.0.1:1".parse().unwrap();
        first.set_local_addr(first_addr);
        let released = Arc::new(AtomicBool::new(false));

        let second = {
            let gate = Arc::clone(&gate);
            let released = Arc::clone(&released);
            thread::spawn(move || {
                let session = gate.begin().unwrap();
                assert!(released.load(Ordering::SeqCst));
                assert!(!session.is_cancelled());
            })
        };

        thread::sleep(Duration::from_millis(50));
        assert_eq!(gate.local_addr(), Some(first_addr));
        released.store(true, Ordering::SeqCst);
        drop(first);
        second.join().unwrap();
    }
}
