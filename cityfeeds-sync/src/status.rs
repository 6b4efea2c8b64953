//! Offline health report for a city: cache age and hash agreement per feed.

use std::path::Path;
use std::time::{Duration, SystemTime};

use chrono::NaiveDateTime;

use cityfeeds_core::{record, CityId, CityPaths, FeedKey, RecordError};

use crate::cache::{self, Freshness};
use crate::change::{self, HashCheck};
use crate::error::SyncError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedStatus {
    pub key: FeedKey,
    /// Directive that a sync would use, if any.
    pub directive: Option<&'static str>,
    pub freshness: Freshness,
    pub hash: HashCheck,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CityStatus {
    pub city: CityId,
    pub version: Option<u64>,
    pub changed: Option<NaiveDateTime>,
    pub feeds: Vec<FeedStatus>,
    pub artifact_present: bool,
}

impl CityStatus {
    /// Feeds whose bundle disagrees with the stored hash.
    pub fn integrity_failures(&self) -> usize {
        self.feeds
            .iter()
            .filter(|f| matches!(f.hash, HashCheck::Mismatch { .. } | HashCheck::MissingBundle))
            .count()
    }
}

/// Inspect `city_dir` without touching the network.
pub fn check(city_dir: &Path, now: SystemTime, window: Duration) -> Result<CityStatus, SyncError> {
    let paths = CityPaths::new(city_dir)?;
    let stored = match record::load_at(&paths) {
        Err(RecordError::RecordNotFound { path }) => return Err(SyncError::ConfigMissing { path }),
        other => other?,
    };

    let mut feeds = Vec::new();
    for (key, entry) in stored.record.gtfs.iter().flatten() {
        let bundle = paths.bundle(key);
        feeds.push(FeedStatus {
            key: key.clone(),
            directive: entry.directive().map(|d| d.label()),
            freshness: cache::check(&bundle, now, window)?,
            hash: change::verify(&bundle, entry)?,
        });
    }

    Ok(CityStatus {
        city: paths.id.clone(),
        version: stored.record.version,
        changed: stored.record.changed,
        feeds,
        artifact_present: paths.artifact().exists(),
    })
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;
    use crate::change::sha256_hex;
    use crate::config::FRESHNESS_WINDOW;

    #[test]
    fn reports_hash_agreement_per_feed() {
        let root = TempDir::new().unwrap();
        let dir = root.path().join("ulm");
        fs::create_dir_all(dir.join("data")).unwrap();
        fs::write(dir.join("data/good.bundle"), b"G").unwrap();
        fs::write(dir.join("data/bad.bundle"), b"tampered").unwrap();
        fs::write(
            dir.join("ulm.md"),
            format!(
                "---\nversion: 3\ngtfs:\n  bad:\n    url: http://a\n    sha256: {}\n  good:\n    url: http://b\n    sha256: {}\n  new: http://c\n---\n",
                sha256_hex(b"B"),
                sha256_hex(b"G"),
            ),
        )
        .unwrap();

        let status = check(&dir, SystemTime::now(), FRESHNESS_WINDOW).unwrap();
        assert_eq!(status.version, Some(3));
        assert!(!status.artifact_present);
        assert_eq!(status.feeds.len(), 3);
        assert!(matches!(status.feeds[0].hash, HashCheck::Mismatch { .. }));
        assert_eq!(status.feeds[1].hash, HashCheck::Match);
        assert!(status.feeds[1].freshness.is_fresh());
        assert_eq!(status.feeds[2].hash, HashCheck::Untracked);
        assert_eq!(status.feeds[2].freshness, Freshness::Missing);
        assert_eq!(status.feeds[2].directive, Some("url"));
        assert_eq!(status.integrity_failures(), 1);
    }

    #[test]
    fn missing_record_is_config_missing() {
        let root = TempDir::new().unwrap();
        let err = check(&root.path().join("ghost"), SystemTime::now(), FRESHNESS_WINDOW).unwrap_err();
        assert!(matches!(err, SyncError::ConfigMissing { .. }));
    }
}
