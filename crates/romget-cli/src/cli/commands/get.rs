//! `romget get` – resolve titles, queue the unambiguous ones and follow them to completion.

use anyhow::{bail, Context, Result};
use romget_core::batch::{parse_batch_input, plan};
use romget_core::catalog::{Catalog, CatalogEntry};
use romget_core::config::QueueConfig;
use romget_core::task::{Progress, Status, TaskSnapshot};
use romget_core::{AddOutcome, QueueManager, TaskEvent, TaskId};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::broadcast::Receiver;

const PROGRESS_PRINT_INTERVAL: Duration = Duration::from_millis(500);
const IDLE_POLL: Duration = Duration::from_millis(200);

pub async fn run_get(
    catalog: &Catalog,
    titles: &str,
    region: Option<&str>,
    dest: &Path,
    queue_cfg: QueueConfig,
    json: bool,
) -> Result<()> {
    let titles = parse_batch_input(titles);
    if titles.is_empty() {
        bail!("no titles given");
    }
    let report = plan(catalog, &titles, region);
    for title in report.unmatched() {
        eprintln!("No match for {title:?}.");
    }
    for (title, entries) in report.ambiguous() {
        eprintln!("{title:?} matches {} entries; search and pick one:", entries.len());
        for entry in entries {
            eprintln!("  {}", entry.display_name());
        }
    }
    let singles: Vec<CatalogEntry> = report.singles().cloned().collect();
    if singles.is_empty() {
        println!("Nothing to download.");
        return Ok(());
    }

    std::fs::create_dir_all(dest)
        .with_context(|| format!("creating destination {}", dest.display()))?;
    let queue = Arc::new(QueueManager::new(queue_cfg)?);
    tracing::debug!(jobs = queue.config().max_parallel, dest = %dest.display(), "download queue ready");
    let mut events = queue.subscribe();
    let mut view = ProgressView::new(json);

    for entry in &singles {
        match queue.add_to_queue(entry, dest) {
            AddOutcome::Queued(id) => tracing::debug!(task = %id, "queued from batch"),
            AddOutcome::AlreadyExists(id) => tracing::info!(task = %id, "skipped, already present"),
            AddOutcome::Duplicate(id) => tracing::debug!(task = %id, "listed twice in batch"),
            AddOutcome::InvalidName(id) => eprintln!("Skipping {id}: not a usable file name."),
        }
    }

    let interrupted = follow(&queue, &mut events, &mut view).await?;
    drain(&mut events, &mut view)?;

    for task in queue.tasks() {
        view.record(&task);
    }
    // Dropping the manager cancels leftovers and joins the workers; keep that off the runtime.
    tokio::task::spawn_blocking(move || drop(queue)).await?;
    let summary = Summary::from_statuses(view.finished.values());
    if !json {
        println!("{summary}");
    }
    if interrupted {
        bail!("interrupted; unfinished downloads were cancelled");
    }
    if summary.failed > 0 {
        bail!("{} download(s) failed", summary.failed);
    }
    Ok(())
}

/// Renders events until the queue is idle. Returns true if Ctrl-C cancelled the run.
async fn follow(
    queue: &Arc<QueueManager>,
    events: &mut Receiver<TaskEvent>,
    view: &mut ProgressView,
) -> Result<bool> {
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut interrupted = false;
    let mut idle = tokio::time::interval(IDLE_POLL);

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => view.render(&event)?,
                Err(RecvError::Lagged(n)) => tracing::warn!("progress display skipped {} events", n),
                Err(RecvError::Closed) => break,
            },
            _ = &mut ctrl_c, if !interrupted => {
                interrupted = true;
                eprintln!("Cancelling downloads...");
                let queue = Arc::clone(queue);
                let cancelled = tokio::task::spawn_blocking(move || queue.cancel_all_tasks()).await?;
                tracing::info!(cancelled, "cancelled on interrupt");
            }
            _ = idle.tick() => {
                if !queue.is_busy() {
                    break;
                }
            }
        }
    }
    Ok(interrupted)
}

fn drain(events: &mut Receiver<TaskEvent>, view: &mut ProgressView) -> Result<()> {
    loop {
        match events.try_recv() {
            Ok(event) => view.render(&event)?,
            Err(TryRecvError::Lagged(_)) => continue,
            Err(TryRecvError::Empty | TryRecvError::Closed) => return Ok(()),
        }
    }
}

struct ProgressView {
    json: bool,
    last_print: HashMap<TaskId, Instant>,
    /// Final status per task; survives the task leaving the queue's list.
    finished: HashMap<TaskId, Status>,
}

impl ProgressView {
    fn new(json: bool) -> Self {
        Self {
            json,
            last_print: HashMap::new(),
            finished: HashMap::new(),
        }
    }

    fn record(&mut self, task: &TaskSnapshot) {
        if task.status.is_terminal() {
            self.finished.insert(task.id.clone(), task.status.clone());
        }
    }

    fn render(&mut self, event: &TaskEvent) -> Result<()> {
        if let TaskEvent::Added { task } | TaskEvent::StatusChanged { task } = event {
            self.record(task);
        }
        if self.json {
            println!("{}", serde_json::to_string(event)?);
            return Ok(());
        }
        match event {
            TaskEvent::Added { task } | TaskEvent::StatusChanged { task } => print_line(task),
            TaskEvent::Progress { task } => {
                let now = Instant::now();
                let due = self
                    .last_print
                    .get(&task.id)
                    .map_or(true, |t| now.duration_since(*t) >= PROGRESS_PRINT_INTERVAL);
                if due {
                    self.last_print.insert(task.id.clone(), now);
                    print_line(task);
                }
            }
            TaskEvent::Removed { id } => {
                self.last_print.remove(id);
            }
        }
        Ok(())
    }
}

fn print_line(task: &TaskSnapshot) {
    let pct = match task.progress {
        Progress::Fraction(f) => format!("{:5.1}%", f * 100.0),
        Progress::Indeterminate => "    ?".to_string(),
    };
    println!("  {}  {}  {}", pct, task.filename, task.status_text);
}

#[derive(Debug, Default, PartialEq)]
struct Summary {
    complete: usize,
    existing: usize,
    failed: usize,
    cancelled: usize,
}

impl Summary {
    fn from_statuses<'a>(statuses: impl IntoIterator<Item = &'a Status>) -> Self {
        let mut summary = Summary::default();
        for status in statuses {
            match status {
                Status::Complete { .. } => summary.complete += 1,
                Status::AlreadyExists => summary.existing += 1,
                Status::Error { .. } => summary.failed += 1,
                Status::Cancelled => summary.cancelled += 1,
                Status::Queued | Status::Downloading { .. } => {}
            }
        }
        summary
    }
}

impl std::fmt::Display for Summary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Done: {} downloaded, {} already present, {} failed, {} cancelled.",
            self.complete, self.existing, self.failed, self.cancelled
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_counts_finished_statuses() {
        let statuses = [
            Status::Complete { final_size: Some(1) },
            Status::Complete { final_size: None },
            Status::AlreadyExists,
            Status::Error {
                message: "HTTP 404".to_string(),
            },
            Status::Queued,
        ];
        let summary = Summary::from_statuses(statuses.iter());
        assert_eq!(
            summary,
            Summary {
                complete: 2,
                existing: 1,
                failed: 1,
                cancelled: 0,
            }
        );
        assert_eq!(
            summary.to_string(),
            "Done: 2 downloaded, 1 already present, 1 failed, 0 cancelled."
        );
    }
}
