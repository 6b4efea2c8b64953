//! Error types for cityfeeds-sync.

use std::path::PathBuf;

use thiserror::Error;

use cityfeeds_core::RecordError;

/// Errors that abort the sync of one city.
///
/// Per-feed problems that only skip a feed are not errors; they are reported
/// as [`crate::pipeline::FeedOutcome::Skipped`].
#[derive(Debug, Error)]
pub enum SyncError {
    /// The city has no record file.
    #[error("record file missing: {path}")]
    ConfigMissing { path: PathBuf },

    /// An error from the record store.
    #[error("record error: {0}")]
    Record(#[from] RecordError),

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Network-level failure talking to `url`.
    #[error("transport error for {url}: {message}")]
    Transport { url: String, message: String },

    /// An external command could not be started.
    #[error("failed to run `{command}`: {source}")]
    CommandSpawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// An external command ran but did not succeed.
    #[error("`{command}` failed: {reason}")]
    CommandFailed { command: String, reason: String },

    /// The batch runner could not run or join a city task.
    #[error("worker error: {0}")]
    Worker(String),
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}
