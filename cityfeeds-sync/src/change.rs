//! Content-addressed change detection for feed bundles.
//!
//! ## `persist_if_changed`
//!
//! 1. SHA-256 the payload.
//! 2. Compare with the entry's stored `sha256`.
//! 3. Skip if identical **and** the bundle still exists.
//! 4. Write to `<bundle>.tmp`, rename over the bundle.
//! 5. Store the new hash on the entry.
//!
//! The stored hash is only updated after the bundle is in place, so the two
//! never disagree.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use cityfeeds_core::FeedEntry;

use crate::error::{io_err, SyncError};

/// Outcome of offering a payload to the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    /// Bundle (re)written; the entry now carries this hash.
    Written { sha256: String },
    /// Same content as the stored hash and the bundle is present.
    Unchanged,
}

/// Lowercase hex SHA-256.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Persist `payload` as `bundle` unless it is already cached.
pub fn persist_if_changed(
    bundle: &Path,
    entry: &mut FeedEntry,
    payload: &[u8],
) -> Result<Change, SyncError> {
    let digest = sha256_hex(payload);
    if entry.sha256.as_deref() == Some(digest.as_str()) && bundle.exists() {
        tracing::debug!("unchanged: {}", bundle.display());
        return Ok(Change::Unchanged);
    }

    write_atomic(bundle, payload)?;
    entry.sha256 = Some(digest.clone());
    tracing::info!("saved {} ({digest})", bundle.display());
    Ok(Change::Written { sha256: digest })
}

fn write_atomic(path: &Path, payload: &[u8]) -> Result<(), SyncError> {
    let tmp = PathBuf::from(format!("{}.tmp", path.display()));
    write_atomic_with_tmp(path, payload, &tmp)
}

fn write_atomic_with_tmp(path: &Path, payload: &[u8], tmp: &Path) -> Result<(), SyncError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }
    std::fs::write(tmp, payload).map_err(|e| io_err(tmp, e))?;
    if let Err(e) = std::fs::rename(tmp, path) {
        let _ = std::fs::remove_file(tmp);
        return Err(io_err(path, e));
    }
    Ok(())
}

/// Agreement between an entry's stored hash and its bundle on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HashCheck {
    Match,
    Mismatch { actual: String },
    /// The entry has no stored hash.
    Untracked,
    /// The entry has a hash but the bundle is gone.
    MissingBundle,
}

/// Re-hash `bundle` and compare it with `entry.sha256`.
pub fn verify(bundle: &Path, entry: &FeedEntry) -> Result<HashCheck, SyncError> {
    let Some(expected) = entry.sha256.as_deref() else {
        return Ok(HashCheck::Untracked);
    };
    let payload = match std::fs::read(bundle) {
        Ok(payload) => payload,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(HashCheck::MissingBundle),
        Err(err) => return Err(io_err(bundle, err)),
    };
    let actual = sha256_hex(&payload);
    if actual == expected {
        Ok(HashCheck::Match)
    } else {
        Ok(HashCheck::Mismatch { actual })
    }
}
