//! Fixed-size thread pool with an unbounded queue.
//!
//! Submitting never blocks and the pool never grows past its worker count.
//! Idle workers park on the channel; there is no reaping. Worker threads are
//! never joined on drop, so a pool that is forgotten does not keep the process
//! alive.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{self as channel, Receiver, Sender};
use eyre::{Context, Result};
use parking_lot::Mutex;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Interval between liveness checks while draining.
pub const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

struct Counters {
    queued: AtomicUsize,
    active: AtomicUsize,
    discard: AtomicBool,
}

pub struct WorkerPool {
    name: String,
    sender: Mutex<Option<Sender<Job>>>,
    counters: Arc<Counters>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    pub fn new(name: &str, workers: usize) -> Result<Self> {
        let workers = workers.max(1);
        let (tx, rx) = channel::unbounded::<Job>();
        let counters = Arc::new(Counters {
            queued: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            discard: AtomicBool::new(false),
        });

        let mut handles = Vec::with_capacity(workers);
        for idx in 0..workers {
            let rx = rx.clone();
            let counters = Arc::clone(&counters);
            let handle = thread::Builder::new()
                .name(format!("{name}-{idx}"))
                .spawn(move || worker_loop(rx, counters))
                .with_context(|| format!("spawn {name} worker {idx}"))?;
            handles.push(handle);
        }
        log::debug!("{name} pool started with {workers} workers");

        Ok(Self {
            name: name.to_string(),
            sender: Mutex::new(Some(tx)),
            counters,
            handles: Mutex::new(handles),
        })
    }

    /// Queue a job. Returns false (and logs a warning) once the pool has been
    /// shut down.
    pub fn submit<F>(&self, job: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        let guard = self.sender.lock();
        let Some(tx) = guard.as_ref() else {
            log::warn!("{} pool rejected a task after shutdown", self.name);
            return false;
        };
        self.counters.queued.fetch_add(1, Ordering::SeqCst);
        if tx.send(Box::new(job)).is_err() {
            self.counters.queued.fetch_sub(1, Ordering::SeqCst);
            log::warn!("{} pool rejected a task: workers are gone", self.name);
            return false;
        }
        true
    }

    /// Jobs queued plus jobs currently running.
    pub fn pending_count(&self) -> usize {
        self.counters.queued.load(Ordering::SeqCst) + self.counters.active.load(Ordering::SeqCst)
    }

    pub fn is_shutdown(&self) -> bool {
        self.sender.lock().is_none()
    }

    /// Stop accepting work, then wait for everything already queued to run.
    pub fn shutdown_and_await_completion(&self) {
        self.sender.lock().take();
        let handles = std::mem::take(&mut *self.handles.lock());

        while !handles.iter().all(JoinHandle::is_finished) {
            log::trace!("{} pool draining, {} pending", self.name, self.pending_count());
            thread::sleep(DRAIN_POLL_INTERVAL);
        }
        for handle in handles {
            if handle.join().is_err() {
                log::error!("{} worker terminated abnormally", self.name);
            }
        }
        log::debug!("{} pool drained", self.name);
    }

    /// Stop accepting work and drop whatever is still queued. Running jobs
    /// finish on their own; nothing waits for them.
    pub fn force_shutdown(&self) {
        self.counters.discard.store(true, Ordering::SeqCst);
        self.sender.lock().take();
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.sender.lock().take();
    }
}

fn worker_loop(rx: Receiver<Job>, counters: Arc<Counters>) {
    while let Ok(job) = rx.recv() {
        if counters.discard.load(Ordering::SeqCst) {
            counters.queued.fetch_sub(1, Ordering::SeqCst);
            continue;
        }
        counters.active.fetch_add(1, Ordering::SeqCst);
        counters.queued.fetch_sub(1, Ordering::SeqCst);
        if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
            log::error!(
                "task panicked on {}",
                thread::current().name().unwrap_or("worker")
            );
        }
        counters.active.fetch_sub(1, Ordering::SeqCst);
    }
}
