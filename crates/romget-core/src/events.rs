//! Task change notifications.
//!
//! The queue manager and transfer workers publish [`TaskEvent`]s on a broadcast
//! channel. Subscribers decide which thread handles them; publishing never
//! blocks and silently drops events when nobody listens.

use serde::Serialize;
use tokio::sync::broadcast;

use crate::task::{TaskId, TaskSnapshot};

/// A change to a tracked task.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TaskEvent {
    /// Task entered the visible list.
    Added { task: TaskSnapshot },
    /// Status moved to a new state.
    StatusChanged { task: TaskSnapshot },
    /// Throttled progress/rate update while downloading.
    Progress { task: TaskSnapshot },
    /// Task left the visible list.
    Removed { id: TaskId },
}

impl TaskEvent {
    pub fn task_id(&self) -> &TaskId {
        match self {
            TaskEvent::Added { task }
            | TaskEvent::StatusChanged { task }
            | TaskEvent::Progress { task } => &task.id,
            TaskEvent::Removed { id } => id,
        }
    }
}

/// Cloneable publisher side of the event channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<TaskEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: TaskEvent) {
        // Err only means there are no subscribers right now.
        let _ = self.tx.send(event);
    }
}
