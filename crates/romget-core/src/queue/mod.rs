//! Download queue manager: bounded-parallelism scheduling over download tasks.
//!
//! Admission is a single serialized decision routine: the pending queue and the
//! active set are only inspected and changed while holding one lock, so two
//! admissions can never both see the same free slot. The lock is never held
//! while bytes stream; workers run transfers unlocked and re-enter the routine
//! when they finish, which immediately reuses the freed slot.

mod pool;
mod state;

use anyhow::Result;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::thread;
use std::time::Duration;

use tokio::sync::broadcast;

use crate::catalog::CatalogEntry;
use crate::config::QueueConfig;
use crate::control::TransferHandle;
use crate::events::{EventBus, TaskEvent};
use crate::task::{DownloadTask, TaskId, TaskSnapshot};
use crate::transfer::{self, TransferOptions};

use self::pool::{Job, WorkerPool};
use self::state::{QueueState, Withdrawn};

/// Result of [`QueueManager::add_to_queue`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddOutcome {
    /// New task queued for download.
    Queued(TaskId),
    /// Destination already holds a non-empty file; a finished task was recorded.
    AlreadyExists(TaskId),
    /// A task with this filename is still queued or downloading; nothing changed.
    Duplicate(TaskId),
    /// The name has no component that can be placed inside the destination folder.
    InvalidName(TaskId),
}

impl AddOutcome {
    pub fn task_id(&self) -> &TaskId {
        match self {
            AddOutcome::Queued(id)
            | AddOutcome::AlreadyExists(id)
            | AddOutcome::Duplicate(id)
            | AddOutcome::InvalidName(id) => id,
        }
    }
}

struct Inner {
    cfg: QueueConfig,
    opts: TransferOptions,
    state: Mutex<QueueState>,
    jobs: Mutex<Option<mpsc::Sender<Job>>>,
    bus: EventBus,
}

/// Owns the worker pool and the queue state.
///
/// Dropping the manager cancels everything still queued or running and joins
/// the workers.
pub struct QueueManager {
    inner: Arc<Inner>,
    pool: WorkerPool,
}

impl QueueManager {
    /// Starts a manager with `cfg.max_parallel` workers.
    pub fn new(cfg: QueueConfig) -> Result<Self> {
        let cfg = QueueConfig {
            max_parallel: cfg.max_parallel.max(1),
            ..cfg
        };
        let (pool, jobs) = WorkerPool::spawn(cfg.max_parallel)?;
        let inner = Arc::new(Inner {
            opts: TransferOptions::from(&cfg),
            bus: EventBus::new(cfg.event_capacity),
            state: Mutex::new(QueueState::default()),
            jobs: Mutex::new(Some(jobs)),
            cfg,
        });
        tracing::debug!(workers = pool.size(), "download queue started");
        Ok(Self { inner, pool })
    }

    pub fn config(&self) -> &QueueConfig {
        &self.inner.cfg
    }

    /// Receives every task change from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.inner.bus.subscribe()
    }

    /// Snapshots of the visible task list, in insertion order.
    pub fn tasks(&self) -> Vec<TaskSnapshot> {
        self.inner.lock().visible().iter().map(|t| t.snapshot()).collect()
    }

    pub fn task(&self, id: &TaskId) -> Option<TaskSnapshot> {
        self.inner
            .lock()
            .visible()
            .iter()
            .rev()
            .find(|t| t.id() == id)
            .map(|t| t.snapshot())
    }

    /// Number of tasks currently holding a worker slot.
    pub fn active_count(&self) -> usize {
        self.inner.lock().active_len()
    }

    /// Number of tasks waiting for a worker slot.
    pub fn pending_count(&self) -> usize {
        self.inner.lock().pending_len()
    }

    /// True while anything is queued or downloading.
    pub fn is_busy(&self) -> bool {
        let state = self.inner.lock();
        state.active_len() > 0 || state.pending_len() > 0
    }

    /// Queues `entry` for download into `destination_folder/<display name>`.
    pub fn add_to_queue(&self, entry: &CatalogEntry, destination_folder: &Path) -> AddOutcome {
        self.inner.add_to_queue(entry, destination_folder)
    }

    /// Cancels a queued or running task. Returns false if no unfinished task has this id.
    pub fn cancel_task(&self, id: &TaskId) -> bool {
        self.inner.cancel_task(id)
    }

    /// Cancels every task that is queued or downloading right now.
    pub fn cancel_all_tasks(&self) -> usize {
        self.inner.cancel_all_tasks()
    }

    /// Removes every finished task from the visible list. Returns how many.
    pub fn clear_completed_tasks(&self) -> usize {
        let cleared = self.inner.lock().clear_finished();
        for task in &cleared {
            self.inner.bus.emit(TaskEvent::Removed {
                id: task.id().clone(),
            });
        }
        cleared.len()
    }

    /// True if at least one visible task is finished.
    pub fn can_clear_tasks(&self) -> bool {
        self.inner.lock().any_finished()
    }
}

impl Drop for QueueManager {
    fn drop(&mut self) {
        self.inner.cancel_all_tasks();
        self.inner
            .jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.pool.join();
        tracing::debug!("download queue stopped");
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn add_to_queue(self: &Arc<Self>, entry: &CatalogEntry, destination_folder: &Path) -> AddOutcome {
        let filename = entry.display_name();
        let id = TaskId::from_filename(filename);
        let Some(destination) = destination_path(destination_folder, filename) else {
            tracing::warn!(task = %id, "entry name has no usable path component; not queued");
            return AddOutcome::InvalidName(id);
        };
        let already_there = is_non_empty_file(&destination);

        {
            let mut state = self.lock();
            if state.find_unfinished(&id).is_some() {
                tracing::debug!(task = %id, "already tracked; ignoring add");
                return AddOutcome::Duplicate(id);
            }
            for old in state.evict_finished(&id) {
                self.bus.emit(TaskEvent::Removed {
                    id: old.id().clone(),
                });
            }

            if already_there {
                let task = Arc::new(DownloadTask::already_exists(
                    filename,
                    entry.source_url(),
                    destination,
                ));
                state.track(Arc::clone(&task));
                self.bus.emit(TaskEvent::Added {
                    task: task.snapshot(),
                });
                drop(state);
                tracing::info!(task = %id, "destination already exists; skipping download");
                self.remove_later(task, self.cfg.already_exists_linger());
                return AddOutcome::AlreadyExists(id);
            }

            let task = Arc::new(DownloadTask::queued(filename, entry.source_url(), destination));
            state.track(Arc::clone(&task));
            self.bus.emit(TaskEvent::Added {
                task: task.snapshot(),
            });
            tracing::debug!(task = %id, pending = state.pending_len(), "queued");
        }

        self.process_queue();
        AddOutcome::Queued(id)
    }

    /// The admission routine: fill free slots from the head of the pending queue.
    fn process_queue(self: &Arc<Self>) {
        let mut state = self.lock();
        while let Some((task, handle)) = state.admit_next(self.cfg.max_parallel) {
            tracing::debug!(
                task = %task.id(),
                active = state.active_len(),
                pending = state.pending_len(),
                "admitted"
            );
            self.bus.emit(TaskEvent::StatusChanged {
                task: task.snapshot(),
            });
            let job = self.transfer_job(Arc::clone(&task), handle.clone());
            if !self.submit(job) {
                state.release(task.id(), &handle);
                if task.fail("download queue is shut down") {
                    self.bus.emit(TaskEvent::StatusChanged {
                        task: task.snapshot(),
                    });
                }
            }
        }
    }

    fn submit(&self, job: Job) -> bool {
        let jobs = self.jobs.lock().unwrap_or_else(PoisonError::into_inner);
        match jobs.as_ref() {
            Some(tx) => tx.send(job).is_ok(),
            None => false,
        }
    }

    fn transfer_job(self: &Arc<Self>, task: Arc<DownloadTask>, handle: TransferHandle) -> Job {
        let weak: Weak<Inner> = Arc::downgrade(self);
        let opts = self.opts;
        let bus = self.bus.clone();
        Box::new(move || {
            if !handle.token().is_cancelled() {
                transfer::run(&task, &opts, handle.token(), &bus);
            }
            handle.mark_done();
            if let Some(inner) = weak.upgrade() {
                inner.finish(&task, &handle);
            }
        })
    }

    /// Worker callback: free the slot and admit the next task.
    fn finish(self: &Arc<Self>, task: &Arc<DownloadTask>, handle: &TransferHandle) {
        let released = self.lock().release(task.id(), handle);
        if released {
            tracing::debug!(task = %task.id(), status = %task.status(), "slot released");
        }
        self.process_queue();
    }

    fn cancel_task(self: &Arc<Self>, id: &TaskId) -> bool {
        let (task, withdrawn) = {
            let mut state = self.lock();
            let Some(task) = state.find_unfinished(id) else {
                return false;
            };
            let withdrawn = state.withdraw(&task);
            (task, withdrawn)
        };

        if let Withdrawn::Active(handle) = &withdrawn {
            handle.cancel();
            if !handle.wait_done(self.cfg.cancel_wait()) {
                tracing::warn!(task = %id, "transfer did not stop in time; cleaning up anyway");
            }
        }

        if task.cancel() {
            transfer::remove_partial(task.destination());
            tracing::info!(task = %id, "cancelled");
            self.bus.emit(TaskEvent::StatusChanged {
                task: task.snapshot(),
            });
            self.remove_later(task, self.cfg.cancel_linger());
        }

        self.process_queue();
        true
    }

    fn cancel_all_tasks(self: &Arc<Self>) -> usize {
        let targets = self.lock().unfinished();
        let mut cancelled = 0;
        for task in targets {
            if self.cancel_task(task.id()) {
                cancelled += 1;
            }
        }
        cancelled
    }

    /// Drops `task` from the visible list after `delay`, so observers can show
    /// its final state first.
    fn remove_later(self: &Arc<Self>, task: Arc<DownloadTask>, delay: Duration) {
        let weak = Arc::downgrade(self);
        let spawned = thread::Builder::new()
            .name("romget-linger".to_string())
            .spawn(move || {
                thread::sleep(delay);
                if let Some(inner) = weak.upgrade() {
                    inner.remove_now(&task);
                }
            });
        if let Err(e) = spawned {
            tracing::warn!("could not schedule task removal: {}", e);
        }
    }

    fn remove_now(&self, task: &Arc<DownloadTask>) {
        if self.lock().remove_visible(task) {
            self.bus.emit(TaskEvent::Removed {
                id: task.id().clone(),
            });
        }
    }
}

/// Joins `name` under `folder`, keeping only plain components. Root, prefix
/// and `..` segments are dropped so the result never leaves `folder`.
fn destination_path(folder: &Path, name: &str) -> Option<PathBuf> {
    let relative: PathBuf = Path::new(name)
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part),
            _ => None,
        })
        .collect();
    if relative.as_os_str().is_empty() {
        return None;
    }
    Some(folder.join(relative))
}

fn is_non_empty_file(path: &Path) -> bool {
    fs::metadata(path)
        .map(|m| m.is_file() && m.len() > 0)
        .unwrap_or(false)
}
