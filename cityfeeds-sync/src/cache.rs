//! Freshness of cached bundles.
//!
//! The bundle's mtime is the only cache metadata: a bundle younger than the
//! freshness window is used as-is and its feed is not fetched again.

use std::io::ErrorKind;
use std::path::Path;
use std::time::{Duration, SystemTime};

use crate::error::{io_err, SyncError};

/// Cache state of one bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Missing,
    Fresh { age: Duration },
    Stale { age: Duration },
}

impl Freshness {
    pub fn is_fresh(&self) -> bool {
        matches!(self, Freshness::Fresh { .. })
    }

    pub fn age(&self) -> Option<Duration> {
        match self {
            Freshness::Missing => None,
            Freshness::Fresh { age } | Freshness::Stale { age } => Some(*age),
        }
    }
}

/// Classify the bundle at `path` relative to `now`.
///
/// An mtime in the future counts as age zero.
pub fn check(path: &Path, now: SystemTime, window: Duration) -> Result<Freshness, SyncError> {
    let meta = match std::fs::metadata(path) {
        Ok(meta) => meta,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Freshness::Missing),
        Err(err) => return Err(io_err(path, err)),
    };
    let modified = meta.modified().map_err(|e| io_err(path, e))?;
    let age = now.duration_since(modified).unwrap_or_default();
    if age < window {
        Ok(Freshness::Fresh { age })
    } else {
        Ok(Freshness::Stale { age })
    }
}

/// Compact age, e.g. `42s`, `5m`, `3h`, `8d`.
pub fn format_age(age: Duration) -> String {
    let seconds = age.as_secs();
    if seconds < 60 {
        return format!("{seconds}s");
    }
    if seconds < 60 * 60 {
        return format!("{}m", seconds / 60);
    }
    if seconds < 60 * 60 * 24 {
        return format!("{}h", seconds / (60 * 60));
    }
    format!("{}d", seconds / (60 * 60 * 24))
}
