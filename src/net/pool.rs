//! Fixed-size worker pool with a bounded queue.
//!
//! # Design Decisions
//! - `execute` blocks while the queue is full; nothing is dropped
//! - A panicking job is logged and the worker keeps running
//! - `shutdown` lets workers finish every queued job, then joins them

use std::io;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Returned by [`WorkerPool::execute`] once the pool no longer accepts work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("worker pool is shut down")]
pub struct PoolClosed;

pub struct WorkerPool {
    sender: Option<SyncSender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `size` workers sharing a queue of `queue_depth` jobs.
    pub fn new(name: &str, size: usize, queue_depth: usize) -> io::Result<Self> {
        let (sender, receiver) = mpsc::sync_channel::<Job>(queue_depth);
        let receiver = Arc::new(Mutex::new(receiver));

        let mut workers = Vec::with_capacity(size);
        for index in 0..size.max(1) {
            let receiver = Arc::clone(&receiver);
            let handle = thread::Builder::new()
                .name(format!("{name}-{index}"))
                .spawn(move || worker_loop(receiver))?;
            workers.push(handle);
        }

        Ok(Self {
            sender: Some(sender),
            workers,
        })
    }

    pub fn execute<F>(&self, job: F) -> Result<(), PoolClosed>
    where
        F: FnOnce() + Send + 'static,
    {
        let sender = self.sender.as_ref().ok_or(PoolClosed)?;
        sender.send(Box::new(job)).map_err(|_| PoolClosed)
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Stop accepting jobs, drain the queue and join every worker.
    pub fn shutdown(mut self) {
        self.join_all();
    }

    fn join_all(&mut self) {
        drop(self.sender.take());
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                tracing::error!("Worker thread terminated abnormally");
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.join_all();
    }
}

fn worker_loop(receiver: Arc<Mutex<Receiver<Job>>>) {
    loop {
        // Hold the lock only while waiting, not while running the job.
        let job = receiver.lock().recv();
        match job {
            Ok(job) => {
                if catch_unwind(AssertUnwindSafe(job)).is_err() {
                    tracing::error!(worker = ?thread::current().name(), "Job panicked");
                }
            }
            Err(_) => break,
        }
    }
}
