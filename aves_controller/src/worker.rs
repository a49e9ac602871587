//! Stoppable worker threads.
//!
//! Each controller task runs on one of these: a named OS thread that
//! polls a shared stop flag. Shutdown stops workers in reverse
//! construction order, so downstream consumers outlive their producers.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;

use tracing::{debug, info, warn};

/// A named thread owning a stop flag.
pub struct Worker {
    name: String,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    /// Spawn a worker. The closure must return promptly once the flag
    /// it receives reads `true`.
    pub fn spawn<F>(name: &str, body: F) -> Self
    where
        F: FnOnce(Arc<AtomicBool>) + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);
        let thread_name = name.to_string();
        let handle = std::thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || {
                debug!("worker {thread_name} running");
                body(thread_stop);
                debug!("worker {thread_name} stopped");
            })
            .expect("thread spawn");
        Self {
            name: name.to_string(),
            stop,
            handle: Some(handle),
        }
    }

    /// Worker name, as shown in thread listings.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Ask the worker to finish its current iteration and exit.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    /// Request stop and wait for the thread to exit.
    pub fn join(mut self) {
        self.request_stop();
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            warn!("worker {} panicked", self.name);
        }
    }
}

/// Workers in construction order, stopped in reverse.
#[derive(Default)]
pub struct WorkerSet {
    workers: Vec<Worker>,
}

impl WorkerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, worker: Worker) {
        self.workers.push(worker);
    }

    /// Stop everything, newest first.
    pub fn shutdown(mut self) {
        // Raise every flag before joining anything so producers and
        // consumers wind down together instead of serially timing out.
        for w in &self.workers {
            w.request_stop();
        }
        while let Some(w) = self.workers.pop() {
            info!("stopping worker: {}", w.name());
            w.join();
        }
    }
}
