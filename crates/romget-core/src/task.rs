//! Download task record: identity, status state machine, and progress.
//!
//! A task is shared between the queue manager, the worker running its transfer,
//! and observers. All mutation goes through the guarded transition methods,
//! which enforce the lifecycle rules:
//!
//! - `Queued → Downloading → {Complete, Cancelled, Error}`; `AlreadyExists` is
//!   assigned at creation and is terminal immediately.
//! - Once terminal, every further transition is a no-op.
//! - While downloading, a fractional progress never decreases; it becomes
//!   exactly 1.0 only together with `Complete`.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;

use serde::Serialize;

use crate::transfer::{format_bytes, format_rate};

/// Identifier of a task, derived from its filename.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn from_filename(filename: &str) -> Self {
        Self(filename.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Displayed progress of a task.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum Progress {
    /// Fraction in `[0, 1]`.
    Fraction(f64),
    /// Content length unknown; only a byte count is available.
    Indeterminate,
}

impl Progress {
    pub fn fraction(&self) -> Option<f64> {
        match self {
            Progress::Fraction(f) => Some(*f),
            Progress::Indeterminate => None,
        }
    }
}

/// Lifecycle status of a task.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum Status {
    Queued,
    Downloading {
        /// Rate over the last full speed window; `None` until one has elapsed.
        bytes_per_sec: Option<f64>,
        bytes_done: u64,
        /// `None` when the server sent no usable Content-Length.
        total_bytes: Option<u64>,
    },
    Complete {
        final_size: Option<u64>,
    },
    Cancelled,
    Error {
        message: String,
    },
    /// Destination already present and non-empty; nothing was transferred.
    AlreadyExists,
}

impl Status {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Status::Queued | Status::Downloading { .. })
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Queued => write!(f, "Queued"),
            Status::Downloading {
                bytes_per_sec,
                bytes_done,
                total_bytes,
            } => match (bytes_per_sec, total_bytes) {
                (Some(rate), Some(_)) => write!(f, "Downloading: {}", format_rate(*rate)),
                (Some(rate), None) => write!(
                    f,
                    "Downloading: {} ({})",
                    format_bytes(*bytes_done),
                    format_rate(*rate)
                ),
                (None, None) if *bytes_done > 0 => {
                    write!(f, "Downloading: {}", format_bytes(*bytes_done))
                }
                (None, _) => write!(f, "Downloading"),
            },
            Status::Complete { final_size: Some(n) } => write!(f, "Complete ({})", format_bytes(*n)),
            Status::Complete { final_size: None } => write!(f, "Complete"),
            Status::Cancelled => write!(f, "Cancelled"),
            Status::Error { message } => write!(f, "Error: {}", message),
            Status::AlreadyExists => write!(f, "Already exists"),
        }
    }
}

#[derive(Debug)]
struct TaskState {
    progress: Progress,
    status: Status,
}

/// One tracked transfer.
#[derive(Debug)]
pub struct DownloadTask {
    id: TaskId,
    filename: String,
    source_url: String,
    destination: PathBuf,
    created_at: SystemTime,
    state: Mutex<TaskState>,
}

/// Point-in-time copy of a task, handed to observers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskSnapshot {
    pub id: TaskId,
    pub filename: String,
    pub source_url: String,
    pub destination: PathBuf,
    pub progress: Progress,
    pub status: Status,
    pub status_text: String,
    pub created_at: SystemTime,
}

impl DownloadTask {
    /// A new task waiting for a worker slot.
    pub fn queued(filename: &str, source_url: &str, destination: PathBuf) -> Self {
        Self::with_state(filename, source_url, destination, Progress::Fraction(0.0), Status::Queued)
    }

    /// A task whose destination already holds the file.
    pub fn already_exists(filename: &str, source_url: &str, destination: PathBuf) -> Self {
        Self::with_state(
            filename,
            source_url,
            destination,
            Progress::Fraction(1.0),
            Status::AlreadyExists,
        )
    }

    fn with_state(
        filename: &str,
        source_url: &str,
        destination: PathBuf,
        progress: Progress,
        status: Status,
    ) -> Self {
        Self {
            id: TaskId::from_filename(filename),
            filename: filename.to_string(),
            source_url: source_url.to_string(),
            destination,
            created_at: SystemTime::now(),
            state: Mutex::new(TaskState { progress, status }),
        }
    }

    pub fn id(&self) -> &TaskId {
        &self.id
    }

    pub fn source_url(&self) -> &str {
        &self.source_url
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    pub fn status(&self) -> Status {
        self.lock().status.clone()
    }

    pub fn progress(&self) -> Progress {
        self.lock().progress
    }

    pub fn is_terminal(&self) -> bool {
        self.lock().status.is_terminal()
    }

    pub fn snapshot(&self) -> TaskSnapshot {
        let state = self.lock();
        TaskSnapshot {
            id: self.id.clone(),
            filename: self.filename.clone(),
            source_url: self.source_url.clone(),
            destination: self.destination.clone(),
            progress: state.progress,
            status: state.status.clone(),
            status_text: state.status.to_string(),
            created_at: self.created_at,
        }
    }

    /// `Queued → Downloading`. Returns false if the task was not queued.
    pub(crate) fn start(&self) -> bool {
        let mut state = self.lock();
        if state.status != Status::Queued {
            return false;
        }
        state.status = Status::Downloading {
            bytes_per_sec: None,
            bytes_done: 0,
            total_bytes: None,
        };
        true
    }

    /// Updates a downloading task's progress and rate. Fractions that would move
    /// progress backwards or reach 1.0 are held back; returns false when the task
    /// is not downloading.
    pub(crate) fn report_progress(
        &self,
        progress: Progress,
        bytes_done: u64,
        total_bytes: Option<u64>,
        bytes_per_sec: Option<f64>,
    ) -> bool {
        let mut state = self.lock();
        if !matches!(state.status, Status::Downloading { .. }) {
            return false;
        }
        state.progress = match (state.progress, progress) {
            (Progress::Fraction(old), Progress::Fraction(new)) => {
                Progress::Fraction(old.max(new.clamp(0.0, MAX_STREAMING_FRACTION)))
            }
            (_, p) => p,
        };
        state.status = Status::Downloading {
            bytes_per_sec,
            bytes_done,
            total_bytes,
        };
        true
    }

    /// `Downloading → Complete`, snapping progress to exactly 1.0.
    pub(crate) fn complete(&self, final_size: Option<u64>) -> bool {
        let mut state = self.lock();
        if !matches!(state.status, Status::Downloading { .. }) {
            return false;
        }
        state.progress = Progress::Fraction(1.0);
        state.status = Status::Complete { final_size };
        true
    }

    /// Moves any non-terminal task to `Cancelled`.
    pub(crate) fn cancel(&self) -> bool {
        self.finish(Status::Cancelled)
    }

    /// Moves any non-terminal task to `Error`.
    pub(crate) fn fail(&self, message: impl Into<String>) -> bool {
        self.finish(Status::Error {
            message: message.into(),
        })
    }

    fn finish(&self, status: Status) -> bool {
        let mut state = self.lock();
        if state.status.is_terminal() {
            return false;
        }
        state.status = status;
        true
    }

    fn lock(&self) -> MutexGuard<'_, TaskState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Highest fraction shown while bytes are still streaming.
pub const MAX_STREAMING_FRACTION: f64 = 0.99;

#[cfg(test)]
mod tests {
    use super::*;

    fn task() -> DownloadTask {
        DownloadTask::queued("a.zip", "http://h/a.zip", PathBuf::from("/tmp/a.zip"))
    }

    #[test]
    fn lifecycle_to_complete() {
        let t = task();
        assert_eq!(t.status(), Status::Queued);
        assert!(t.start());
        assert!(!t.start());
        assert!(t.report_progress(Progress::Fraction(0.5), 50, Some(100), None));
        assert!(t.complete(Some(100)));
        assert_eq!(t.progress(), Progress::Fraction(1.0));
        assert_eq!(t.status().to_string(), "Complete (100 B)");
    }

    #[test]
    fn terminal_status_is_sticky() {
        let t = task();
        t.start();
        assert!(t.fail("HTTP 404"));
        assert!(!t.cancel());
        assert!(!t.complete(None));
        assert!(!t.report_progress(Progress::Fraction(0.2), 1, None, None));
        assert_eq!(t.status().to_string(), "Error: HTTP 404");
    }

    #[test]
    fn progress_never_decreases_and_stays_below_one() {
        let t = task();
        t.start();
        t.report_progress(Progress::Fraction(0.6), 60, Some(100), None);
        t.report_progress(Progress::Fraction(0.4), 40, Some(100), None);
        assert_eq!(t.progress(), Progress::Fraction(0.6));
        t.report_progress(Progress::Fraction(1.0), 100, Some(100), None);
        assert_eq!(t.progress(), Progress::Fraction(MAX_STREAMING_FRACTION));
    }

    #[test]
    fn queued_task_can_be_cancelled_without_running() {
        let t = task();
        assert!(t.cancel());
        assert!(!t.start());
        assert!(t.is_terminal());
    }

    #[test]
    fn already_exists_is_terminal_at_creation() {
        let t = DownloadTask::already_exists("a.zip", "u", PathBuf::from("a.zip"));
        assert!(t.is_terminal());
        assert!(!t.start());
        assert_eq!(t.snapshot().status_text, "Already exists");
    }

    #[test]
    fn downloading_display_variants() {
        let s = Status::Downloading {
            bytes_per_sec: Some(3.2 * 1024.0 * 1024.0),
            bytes_done: 10,
            total_bytes: Some(100),
        };
        assert_eq!(s.to_string(), "Downloading: 3.2 MB/s");
        let s = Status::Downloading {
            bytes_per_sec: None,
            bytes_done: 2048,
            total_bytes: None,
        };
        assert_eq!(s.to_string(), "Downloading: 2.0 KB");
        let s = Status::Downloading {
            bytes_per_sec: None,
            bytes_done: 0,
            total_bytes: Some(5),
        };
        assert_eq!(s.to_string(), "Downloading");
    }
}
