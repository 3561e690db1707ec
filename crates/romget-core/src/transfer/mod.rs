//! Transfer executor: one HTTP GET streamed into the task's destination file.
//!
//! Uses a blocking libcurl Easy handle on the calling worker thread. The
//! cancellation token is polled from both the write and progress callbacks, so
//! a cancel is noticed within one chunk read even when the server stalls.
//! Partial files are removed on every failure or abort.

mod error;
mod format;
mod meter;

pub use error::TransferError;
pub use format::{format_bytes, format_rate};
pub use meter::{ProgressMeter, ProgressUpdate};

use std::cell::{Cell, RefCell};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::str;
use std::time::{Duration, Instant};

use crate::config::QueueConfig;
use crate::control::CancelToken;
use crate::events::{EventBus, TaskEvent};
use crate::task::DownloadTask;

/// Knobs for a single transfer, taken from [`QueueConfig`].
#[derive(Debug, Clone, Copy)]
pub struct TransferOptions {
    pub buffer_size: usize,
    pub connect_timeout: Duration,
    /// Abort when throughput stays below `low_speed_limit` bytes/s for `low_speed_time`.
    pub low_speed_limit: u32,
    pub low_speed_time: Duration,
    pub progress_interval: Duration,
    pub speed_window: Duration,
}

impl From<&QueueConfig> for TransferOptions {
    fn from(cfg: &QueueConfig) -> Self {
        Self {
            buffer_size: cfg.buffer_size,
            connect_timeout: cfg.connect_timeout(),
            low_speed_limit: cfg.low_speed_limit,
            low_speed_time: cfg.low_speed_time(),
            progress_interval: cfg.progress_interval(),
            speed_window: cfg.speed_window(),
        }
    }
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self::from(&QueueConfig::default())
    }
}

/// Runs the transfer for an admitted task and records the outcome on it.
///
/// Success marks the task complete; failures mark it errored. An abort leaves
/// the status alone: whoever cancelled owns the `Cancelled` transition.
pub fn run(task: &DownloadTask, opts: &TransferOptions, cancel: &CancelToken, bus: &EventBus) {
    match execute(task, opts, cancel, bus) {
        Ok(bytes) => {
            if task.complete(Some(bytes)) {
                tracing::info!(task = %task.id(), bytes, "download complete");
                bus.emit(TaskEvent::StatusChanged {
                    task: task.snapshot(),
                });
            }
        }
        Err(TransferError::Aborted) => {
            tracing::debug!(task = %task.id(), "transfer stopped on cancel");
        }
        Err(e) => {
            tracing::warn!(task = %task.id(), url = task.source_url(), "download failed: {}", e);
            if task.fail(e.to_string()) {
                bus.emit(TaskEvent::StatusChanged {
                    task: task.snapshot(),
                });
            }
        }
    }
}

/// Downloads `task.source_url()` into `task.destination()`.
///
/// Returns the number of bytes written. Never retries.
pub fn execute(
    task: &DownloadTask,
    opts: &TransferOptions,
    cancel: &CancelToken,
    bus: &EventBus,
) -> Result<u64, TransferError> {
    let dest = task.destination();
    if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| TransferError::DirectoryCreation {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    if cancel.is_cancelled() {
        return Err(TransferError::Aborted);
    }

    let file = File::create(dest)?;
    let result = stream_into(task, opts, cancel, bus, file);
    if result.is_err() {
        remove_partial(dest);
    }
    result
}

fn stream_into(
    task: &DownloadTask,
    opts: &TransferOptions,
    cancel: &CancelToken,
    bus: &EventBus,
    file: File,
) -> Result<u64, TransferError> {
    let mut writer = BufWriter::with_capacity(opts.buffer_size.max(1), file);
    let mut meter = ProgressMeter::new(opts.progress_interval, opts.speed_window, Instant::now());
    let content_length: Cell<Option<u64>> = Cell::new(None);
    let write_error: RefCell<Option<std::io::Error>> = RefCell::new(None);

    let mut easy = curl::easy::Easy::new();
    easy.url(task.source_url())?;
    easy.get(true)?;
    easy.follow_location(true)?;
    easy.max_redirections(10)?;
    easy.fail_on_error(true)?;
    easy.connect_timeout(opts.connect_timeout)?;
    easy.low_speed_limit(opts.low_speed_limit)?;
    easy.low_speed_time(opts.low_speed_time)?;
    easy.buffer_size(opts.buffer_size)?;
    easy.progress(true)?;

    let performed = {
        let mut transfer = easy.transfer();
        transfer.header_function(|data| {
            if let Ok(line) = str::from_utf8(data) {
                observe_header(line, &content_length);
            }
            true
        })?;
        transfer.write_function(|data| {
            if cancel.is_cancelled() {
                return Ok(0);
            }
            if let Err(e) = writer.write_all(data) {
                write_error.borrow_mut().replace(e);
                return Ok(0);
            }
            if let Some(update) = meter.record(data.len() as u64, content_length.get(), Instant::now()) {
                publish(task, bus, update);
            }
            Ok(data.len())
        })?;
        transfer.progress_function(|_, _, _, _| !cancel.is_cancelled())?;
        transfer.perform()
    };

    if let Err(e) = performed {
        if cancel.is_cancelled() {
            return Err(TransferError::Aborted);
        }
        if let Some(io_err) = write_error.borrow_mut().take() {
            return Err(TransferError::Io(io_err));
        }
        if e.is_http_returned_error() {
            return Err(TransferError::Http(easy.response_code()?));
        }
        return Err(TransferError::Curl(e));
    }

    let code = easy.response_code()?;
    if !(200..300).contains(&code) {
        return Err(TransferError::Http(code));
    }

    writer.flush()?;
    let file = writer.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()?;
    drop(file);

    Ok(meter.bytes_done())
}

/// Tracks `Content-Length` of the final response; a new status line (after a
/// redirect) resets it.
fn observe_header(line: &str, content_length: &Cell<Option<u64>>) {
    let line = line.trim();
    if line.starts_with("HTTP/") {
        content_length.set(None);
        return;
    }
    if let Some((name, value)) = line.split_once(':') {
        if name.trim().eq_ignore_ascii_case("content-length") {
            content_length.set(value.trim().parse::<u64>().ok());
        }
    }
}

fn publish(task: &DownloadTask, bus: &EventBus, update: ProgressUpdate) {
    if task.report_progress(
        update.progress,
        update.bytes_done,
        update.total_bytes,
        update.bytes_per_sec,
    ) {
        bus.emit(TaskEvent::Progress {
            task: task.snapshot(),
        });
    }
}

/// Deletes a partially written destination. Missing files are fine.
pub(crate) fn remove_partial(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => tracing::debug!(path = %path.display(), "removed partial file"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), "could not remove partial file: {}", e),
    }
}
