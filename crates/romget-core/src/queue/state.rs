//! Queue bookkeeping guarded by the manager's admission lock.
//!
//! Every method here runs with the lock held; none of them block or do I/O.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use crate::control::TransferHandle;
use crate::task::{DownloadTask, TaskId};

/// Where a withdrawn task was scheduled.
#[derive(Debug)]
pub(crate) enum Withdrawn {
    /// Still waiting in the pending queue; never ran.
    Pending,
    /// Occupied a worker slot; the handle stops its transfer.
    Active(TransferHandle),
    /// Neither pending nor active (e.g. admitted slot already released).
    Unscheduled,
}

#[derive(Debug, Default)]
pub(crate) struct QueueState {
    /// Tasks awaiting a worker slot, FIFO.
    pending: VecDeque<Arc<DownloadTask>>,
    /// Tasks occupying a worker slot, with their cancellable handles.
    active: HashMap<TaskId, (Arc<DownloadTask>, TransferHandle)>,
    /// Externally visible list, in insertion order.
    visible: Vec<Arc<DownloadTask>>,
}

impl QueueState {
    pub(crate) fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub(crate) fn active_len(&self) -> usize {
        self.active.len()
    }

    pub(crate) fn visible(&self) -> &[Arc<DownloadTask>] {
        &self.visible
    }

    /// Visible task with this id that has not reached a terminal status.
    pub(crate) fn find_unfinished(&self, id: &TaskId) -> Option<Arc<DownloadTask>> {
        self.visible
            .iter()
            .find(|t| t.id() == id && !t.is_terminal())
            .cloned()
    }

    /// Drops finished tasks with this id so a fresh one can take the name.
    pub(crate) fn evict_finished(&mut self, id: &TaskId) -> Vec<Arc<DownloadTask>> {
        let (evicted, kept) = std::mem::take(&mut self.visible)
            .into_iter()
            .partition(|t| t.id() == id && t.is_terminal());
        self.visible = kept;
        evicted
    }

    /// Adds a task to the visible list, and to the pending queue if it is queued.
    pub(crate) fn track(&mut self, task: Arc<DownloadTask>) {
        if !task.is_terminal() {
            self.pending.push_back(Arc::clone(&task));
        }
        self.visible.push(task);
    }

    /// Admits the head of the pending queue if a slot is free: marks it
    /// downloading and records a fresh handle for it.
    pub(crate) fn admit_next(&mut self, max_parallel: usize) -> Option<(Arc<DownloadTask>, TransferHandle)> {
        while self.active.len() < max_parallel {
            let task = self.pending.pop_front()?;
            if !task.start() {
                // Finished while waiting; it no longer needs a slot.
                continue;
            }
            let handle = TransferHandle::new();
            self.active
                .insert(task.id().clone(), (Arc::clone(&task), handle.clone()));
            return Some((task, handle));
        }
        None
    }

    /// Frees the slot held by this admission. A stale handle (the task was
    /// withdrawn and its name reused) leaves the newer admission alone.
    pub(crate) fn release(&mut self, id: &TaskId, handle: &TransferHandle) -> bool {
        match self.active.get(id) {
            Some((_, h)) if h.same_as(handle) => {
                self.active.remove(id);
                true
            }
            _ => false,
        }
    }

    /// Takes a task out of scheduling, wherever it is.
    pub(crate) fn withdraw(&mut self, task: &Arc<DownloadTask>) -> Withdrawn {
        if let Some(pos) = self.pending.iter().position(|t| Arc::ptr_eq(t, task)) {
            self.pending.remove(pos);
            return Withdrawn::Pending;
        }
        let occupies_slot = matches!(self.active.get(task.id()), Some((t, _)) if Arc::ptr_eq(t, task));
        if occupies_slot {
            if let Some((_, handle)) = self.active.remove(task.id()) {
                return Withdrawn::Active(handle);
            }
        }
        Withdrawn::Unscheduled
    }

    /// Removes exactly this task object from the visible list.
    pub(crate) fn remove_visible(&mut self, task: &Arc<DownloadTask>) -> bool {
        let before = self.visible.len();
        self.visible.retain(|t| !Arc::ptr_eq(t, task));
        self.visible.len() != before
    }

    /// Removes every terminal task from the visible list.
    pub(crate) fn clear_finished(&mut self) -> Vec<Arc<DownloadTask>> {
        let (cleared, kept) = std::mem::take(&mut self.visible)
            .into_iter()
            .partition(|t| t.is_terminal());
        self.visible = kept;
        cleared
    }

    pub(crate) fn any_finished(&self) -> bool {
        self.visible.iter().any(|t| t.is_terminal())
    }

    /// Queued tasks first (pending order), then in-flight ones.
    pub(crate) fn unfinished(&self) -> Vec<Arc<DownloadTask>> {
        let mut tasks: Vec<Arc<DownloadTask>> = self.pending.iter().cloned().collect();
        let in_flight: Vec<Arc<DownloadTask>> = self
            .visible
            .iter()
            .filter(|t| !t.is_terminal() && !tasks.iter().any(|p| Arc::ptr_eq(p, t)))
            .cloned()
            .collect();
        tasks.extend(in_flight);
        tasks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::Status;
    use std::path::PathBuf;

    fn queued(name: &str) -> Arc<DownloadTask> {
        Arc::new(DownloadTask::queued(name, "http://h/x", PathBuf::from(name)))
    }

    #[test]
    fn admission_respects_capacity_and_fifo() {
        let mut state = QueueState::default();
        for name in ["a", "b", "c"] {
            state.track(queued(name));
        }
        let (first, _) = state.admit_next(2).unwrap();
        let (second, _) = state.admit_next(2).unwrap();
        assert!(state.admit_next(2).is_none());
        assert_eq!(first.id().as_str(), "a");
        assert_eq!(second.id().as_str(), "b");
        assert_eq!(state.active_len(), 2);
        assert_eq!(state.pending_len(), 1);
        assert!(matches!(first.status(), Status::Downloading { .. }));
        assert_eq!(state.visible()[2].status(), Status::Queued);
    }

    #[test]
    fn release_frees_slot_for_next() {
        let mut state = QueueState::default();
        state.track(queued("a"));
        state.track(queued("b"));
        let (a, handle) = state.admit_next(1).unwrap();
        assert!(state.admit_next(1).is_none());
        assert!(state.release(a.id(), &handle));
        assert!(!state.release(a.id(), &handle));
        let (b, _) = state.admit_next(1).unwrap();
        assert_eq!(b.id().as_str(), "b");
    }

    #[test]
    fn stale_handle_does_not_release_newer_admission() {
        let mut state = QueueState::default();
        let old = queued("a");
        state.track(Arc::clone(&old));
        let (_, old_handle) = state.admit_next(1).unwrap();
        assert!(matches!(state.withdraw(&old), Withdrawn::Active(_)));
        old.cancel();
        state.evict_finished(old.id());
        state.track(queued("a"));
        let (_, new_handle) = state.admit_next(1).unwrap();
        assert!(!state.release(&TaskId::from_filename("a"), &old_handle));
        assert_eq!(state.active_len(), 1);
        assert!(state.release(&TaskId::from_filename("a"), &new_handle));
    }

    #[test]
    fn withdraw_pending_task_never_runs() {
        let mut state = QueueState::default();
        let a = queued("a");
        let b = queued("b");
        state.track(Arc::clone(&a));
        state.track(Arc::clone(&b));
        state.admit_next(1).unwrap();
        assert!(matches!(state.withdraw(&b), Withdrawn::Pending));
        assert_eq!(state.pending_len(), 0);
        assert!(matches!(state.withdraw(&b), Withdrawn::Unscheduled));
    }

    #[test]
    fn cancelled_while_pending_is_skipped_on_admission() {
        let mut state = QueueState::default();
        let a = queued("a");
        state.track(Arc::clone(&a));
        state.track(queued("b"));
        a.cancel();
        let (next, _) = state.admit_next(1).unwrap();
        assert_eq!(next.id().as_str(), "b");
    }

    #[test]
    fn clear_finished_keeps_unfinished() {
        let mut state = QueueState::default();
        let done = queued("done");
        let running = queued("running");
        let failed = queued("failed");
        for t in [&done, &running, &failed] {
            state.track(Arc::clone(t));
        }
        for _ in 0..3 {
            state.admit_next(3);
        }
        done.complete(Some(1));
        failed.fail("HTTP 500");
        assert!(state.any_finished());
        let cleared = state.clear_finished();
        assert_eq!(cleared.len(), 2);
        assert_eq!(state.visible().len(), 1);
        assert_eq!(state.visible()[0].id().as_str(), "running");
        assert!(!state.any_finished());
    }

    #[test]
    fn unfinished_lists_pending_first() {
        let mut state = QueueState::default();
        for name in ["a", "b", "c"] {
            state.track(queued(name));
        }
        state.admit_next(1);
        let ids: Vec<_> = state
            .unfinished()
            .iter()
            .map(|t| t.id().as_str().to_string())
            .collect();
        assert_eq!(ids, vec!["b", "c", "a"]);
    }
}
