//! Fixed-size worker pool: exactly `size` OS threads pulling jobs FIFO.

use anyhow::{Context, Result};
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

pub(crate) type Job = Box<dyn FnOnce() + Send + 'static>;

/// Owns the worker threads. Dropping the last job sender lets them exit;
/// [`WorkerPool::join`] then waits for them.
pub(crate) struct WorkerPool {
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawns `size` workers and returns the pool plus the job sender.
    pub(crate) fn spawn(size: usize) -> Result<(Self, mpsc::Sender<Job>)> {
        let (tx, rx) = mpsc::channel::<Job>();
        let rx = Arc::new(Mutex::new(rx));
        let mut workers = Vec::with_capacity(size);
        for index in 0..size.max(1) {
            let rx = Arc::clone(&rx);
            let handle = thread::Builder::new()
                .name(format!("romget-worker-{index}"))
                .spawn(move || worker_loop(&rx))
                .context("spawn download worker")?;
            workers.push(handle);
        }
        Ok((Self { workers }, tx))
    }

    pub(crate) fn size(&self) -> usize {
        self.workers.len()
    }

    /// Waits for every worker to exit. Call after all senders are gone.
    pub(crate) fn join(&mut self) {
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                tracing::warn!("download worker exited by panic");
            }
        }
    }
}

fn worker_loop(rx: &Mutex<mpsc::Receiver<Job>>) {
    loop {
        let job = {
            let rx = rx.lock().unwrap_or_else(PoisonError::into_inner);
            rx.recv()
        };
        let Ok(job) = job else {
            break;
        };
        if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
            tracing::warn!("download job panicked; worker keeps running");
        }
    }
}
