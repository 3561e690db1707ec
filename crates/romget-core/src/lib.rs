pub mod config;
pub mod logging;

pub mod batch;
pub mod catalog;
pub mod control;
pub mod events;
pub mod queue;
pub mod search;
pub mod task;
pub mod transfer;

pub use catalog::{Catalog, CatalogEntry};
pub use events::TaskEvent;
pub use queue::{AddOutcome, QueueManager};
pub use search::search;
pub use task::{DownloadTask, Progress, Status, TaskId, TaskSnapshot};
