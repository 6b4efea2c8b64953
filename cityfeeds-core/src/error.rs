//! Error types for cityfeeds-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from record operations.
#[derive(Debug, Error)]
pub enum RecordError {
    /// Underlying I/O failure, with the path that was being touched.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML serialization error (write path).
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// YAML parse error on load — includes file path and line context from serde_yaml.
    #[error("failed to parse record at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// The document does not contain a `---` delimited front-matter block.
    #[error("malformed record at {path}: {reason}")]
    Malformed { path: PathBuf, reason: String },

    /// The record file did not exist at the expected path.
    #[error("record not found at {path}")]
    RecordNotFound { path: PathBuf },

    /// `create_at` refuses to clobber an existing record.
    #[error("record already exists at {path}")]
    AlreadyExists { path: PathBuf },

    /// A city directory whose name cannot serve as a city id.
    #[error("invalid city directory {path}")]
    InvalidCityDir { path: PathBuf },
}

/// Convenience constructor for [`RecordError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> RecordError {
    RecordError::Io {
        path: path.into(),
        source,
    }
}
