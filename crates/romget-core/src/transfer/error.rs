//! Per-transfer error taxonomy.

use std::path::PathBuf;

use thiserror::Error;

/// Why a transfer did not complete. Rendered into the task's error status;
/// never propagated past the queue manager.
#[derive(Debug, Error)]
pub enum TransferError {
    /// Destination parent could not be created; no request was made.
    #[error("Cannot create directory {}: {source}", path.display())]
    DirectoryCreation {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Server answered with a non-2xx status.
    #[error("HTTP {0}")]
    Http(u32),
    /// Connect, read, or timeout failure reported by libcurl.
    #[error("{0}")]
    Curl(#[from] curl::Error),
    /// Local file write failure.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// Stopped because cancellation was requested. Not an error for the user.
    #[error("transfer cancelled")]
    Aborted,
}

impl TransferError {
    pub fn is_aborted(&self) -> bool {
        matches!(self, TransferError::Aborted)
    }
}
