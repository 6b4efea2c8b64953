//! Per-city record store.
//!
//! # Storage layout
//!
//! ```text
//! <cities_dir>/
//!   <cityid>/
//!     <cityid>.md          (front matter + free-form attribution text)
//!     <cityid>.bin         (generated artifact)
//!     data/
//!       <feed-key>.bundle  (cached feed payloads)
//! ```
//!
//! Reads parse only the front matter. Writes replace only the front matter
//! and go through a `.tmp` sibling + rename.

use std::path::{Path, PathBuf};

use crate::document::FrontMatterDocument;
use crate::error::{io_err, RecordError};
use crate::types::{CityId, CityRecord, FeedKey};
use crate::yaml;

/// Attribution placeholder written below the front matter of new records.
pub const DEFAULT_BODY: &str = "\n(c) [Name](http://)";

// ---------------------------------------------------------------------------
// 1. Path helpers
// ---------------------------------------------------------------------------

/// Every path belonging to one city, derived from its directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CityPaths {
    pub id: CityId,
    pub dir: PathBuf,
}

impl CityPaths {
    /// The city id is the directory name. `.`-style paths are canonicalized
    /// first so they still yield a name.
    pub fn new(city_dir: &Path) -> Result<Self, RecordError> {
        let dir = if city_dir.file_name().is_some() {
            city_dir.to_path_buf()
        } else {
            city_dir
                .canonicalize()
                .map_err(|e| io_err(city_dir, e))?
        };
        let id = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| RecordError::InvalidCityDir { path: dir.clone() })?;
        Ok(Self {
            id: CityId::from(id),
            dir,
        })
    }

    /// `<cities_dir>/<cityid>/` — pure, no I/O.
    pub fn in_cities_dir(cities_dir: &Path, id: &CityId) -> Self {
        Self {
            id: id.clone(),
            dir: cities_dir.join(&id.0),
        }
    }

    /// `<dir>/<cityid>.md`
    pub fn record(&self) -> PathBuf {
        self.dir.join(format!("{}.md", self.id.0))
    }

    /// `<dir>/data/`
    pub fn data_dir(&self) -> PathBuf {
        self.dir.join("data")
    }

    /// `<dir>/data/<key>.bundle`
    pub fn bundle(&self, key: &FeedKey) -> PathBuf {
        self.data_dir().join(format!("{}.bundle", key.0))
    }

    /// `<dir>/<cityid>.bin`
    pub fn artifact(&self) -> PathBuf {
        self.dir.join(format!("{}.bin", self.id.0))
    }
}

/// `mkdir -p`; succeeds when the directory already exists.
pub fn ensure_dir(path: &Path) -> Result<(), RecordError> {
    std::fs::create_dir_all(path).map_err(|e| io_err(path, e))
}

/// Directories under `cities_dir` that contain a `<name>/<name>.md` record,
/// sorted by name.
pub fn list_city_dirs_at(cities_dir: &Path) -> Result<Vec<PathBuf>, RecordError> {
    let entries = std::fs::read_dir(cities_dir).map_err(|e| io_err(cities_dir, e))?;
    let mut dirs = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| io_err(cities_dir, e))?;
        let path = entry.path();
        let file_type = entry.file_type().map_err(|e| io_err(&path, e))?;
        if !file_type.is_dir() {
            continue;
        }
        let paths = CityPaths::new(&path)?;
        if paths.record().is_file() {
            dirs.push(path);
        }
    }
    dirs.sort();
    Ok(dirs)
}

// ---------------------------------------------------------------------------
// 2. Load
// ---------------------------------------------------------------------------

/// A record together with the document it was read from.
#[derive(Debug, Clone)]
pub struct StoredRecord {
    pub path: PathBuf,
    pub document: FrontMatterDocument,
    pub record: CityRecord,
}

/// Load `<dir>/<cityid>.md`.
///
/// Returns `RecordError::RecordNotFound` if absent, `RecordError::Malformed`
/// if the front matter is not delimited, and `RecordError::Parse` (with path
/// + line context) if the YAML is invalid.
pub fn load_at(paths: &CityPaths) -> Result<StoredRecord, RecordError> {
    let path = paths.record();
    if !path.exists() {
        return Err(RecordError::RecordNotFound { path });
    }
    let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
    let document = FrontMatterDocument::parse(&contents).ok_or_else(|| RecordError::Malformed {
        path: path.clone(),
        reason: "expected a front-matter block delimited by two `---` lines".to_string(),
    })?;
    let record = if document.header().trim().is_empty() {
        CityRecord::default()
    } else {
        serde_yaml::from_str(document.header())
            .map_err(|e| RecordError::Parse { path: path.clone(), source: e })?
    };
    Ok(StoredRecord {
        path,
        document,
        record,
    })
}

// ---------------------------------------------------------------------------
// 3. Save (atomic)
// ---------------------------------------------------------------------------

impl StoredRecord {
    /// Splice the current record back into the document and write it.
    ///
    /// Write flow: dump → splice → `<name>.md.tmp` sibling → `rename`.
    pub fn save(&mut self) -> Result<(), RecordError> {
        self.document.set_header(yaml::dump(&self.record)?);
        write_atomic(&self.path, &self.document.render())
    }
}

fn write_atomic(path: &Path, contents: &str) -> Result<(), RecordError> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!("{file_name}.tmp"));
    std::fs::write(&tmp, contents).map_err(|e| io_err(&tmp, e))?;
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(io_err(path, e));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// 4. Create
// ---------------------------------------------------------------------------

/// Write a new record under `<cities_dir>/<cityid>/`.
///
/// The city id is taken from `record.cityid`. Refuses to overwrite an
/// existing record.
pub fn create_at(cities_dir: &Path, record: &CityRecord) -> Result<CityPaths, RecordError> {
    let id = record.cityid.clone().ok_or_else(|| RecordError::InvalidCityDir {
        path: cities_dir.to_path_buf(),
    })?;
    let paths = CityPaths::in_cities_dir(cities_dir, &id);
    let path = paths.record();
    if path.exists() {
        return Err(RecordError::AlreadyExists { path });
    }
    ensure_dir(&paths.dir)?;
    let document = FrontMatterDocument::new(yaml::dump(record)?, DEFAULT_BODY);
    write_atomic(&path, &document.render())?;
    Ok(paths)
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Coordinates, FeedEntry, LocationId};
    use tempfile::TempDir;

    fn berlin() -> CityRecord {
        CityRecord {
            cityid: Some(CityId::from("berlin")),
            cityname: Some("Berlin".into()),
            coordinates: Some(Coordinates { lng: 13.4, lat: 52.5 }),
            zoom: Some(12),
            tf_location_ids: Some(vec![LocationId::Named("31".into())]),
            ..CityRecord::default()
        }
    }

    #[test]
    fn city_paths_layout() {
        let paths = CityPaths::new(Path::new("/cities/berlin")).unwrap();
        assert_eq!(paths.id, CityId::from("berlin"));
        assert!(paths.record().ends_with("berlin/berlin.md"));
        assert!(paths.bundle(&FeedKey::from("vbb")).ends_with("berlin/data/vbb.bundle"));
        assert!(paths.artifact().ends_with("berlin/berlin.bin"));
    }

    #[test]
    fn create_then_load_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let paths = create_at(tmp.path(), &berlin()).expect("create");
        let stored = load_at(&paths).expect("load");
        assert_eq!(stored.record, berlin());
        assert_eq!(stored.document.body(), DEFAULT_BODY);
    }

    #[test]
    fn create_refuses_to_overwrite() {
        let tmp = TempDir::new().unwrap();
        create_at(tmp.path(), &berlin()).expect("create");
        let err = create_at(tmp.path(), &berlin()).unwrap_err();
        assert!(matches!(err, RecordError::AlreadyExists { .. }));
    }

    #[test]
    fn save_preserves_body_and_cleans_tmp() {
        let tmp = TempDir::new().unwrap();
        let paths = CityPaths::in_cities_dir(tmp.path(), &CityId::from("berlin"));
        ensure_dir(&paths.dir).unwrap();
        let original = "---\ncityname: Berlin\n---\n\n(c) [VBB](https://vbb.de) ---\n\nMore.\n";
        std::fs::write(paths.record(), original).unwrap();

        let mut stored = load_at(&paths).unwrap();
        stored
            .record
            .insert_feed_if_absent(FeedKey::from("vbb"), FeedEntry::from_url("https://x"));
        stored.save().unwrap();

        let written = std::fs::read_to_string(paths.record()).unwrap();
        assert!(written.ends_with("---\n\n(c) [VBB](https://vbb.de) ---\n\nMore.\n"));
        assert!(written.contains("vbb:\n    url: https://x\n"));
        assert!(!paths.dir.join("berlin.md.tmp").exists());
    }

    #[test]
    fn load_missing_record_returns_not_found() {
        let tmp = TempDir::new().unwrap();
        let paths = CityPaths::in_cities_dir(tmp.path(), &CityId::from("nowhere"));
        let err = load_at(&paths).unwrap_err();
        assert!(matches!(err, RecordError::RecordNotFound { .. }));
    }

    #[test]
    fn load_without_sentinels_is_malformed() {
        let tmp = TempDir::new().unwrap();
        let paths = CityPaths::in_cities_dir(tmp.path(), &CityId::from("berlin"));
        ensure_dir(&paths.dir).unwrap();
        std::fs::write(paths.record(), "cityname: Berlin\n").unwrap();
        let err = load_at(&paths).unwrap_err();
        assert!(matches!(err, RecordError::Malformed { .. }));
    }

    #[test]
    fn list_city_dirs_skips_dirs_without_record() {
        let tmp = TempDir::new().unwrap();
        create_at(tmp.path(), &berlin()).unwrap();
        ensure_dir(&tmp.path().join("scratch")).unwrap();
        let dirs = list_city_dirs_at(tmp.path()).unwrap();
        assert_eq!(dirs, vec![tmp.path().join("berlin")]);
    }

    #[test]
    fn list_city_dirs_ignores_plain_files() {
        let tmp = TempDir::new().unwrap();
        create_at(tmp.path(), &berlin()).unwrap();
        std::fs::write(tmp.path().join("README.md"), "cities\n").unwrap();
        let dirs = list_city_dirs_at(tmp.path()).unwrap();
        assert_eq!(dirs, vec![tmp.path().join("berlin")]);
    }

    #[test]
    fn list_city_dirs_reports_unreadable_cities_dir() {
        let tmp = TempDir::new().unwrap();
        let err = list_city_dirs_at(&tmp.path().join("missing")).unwrap_err();
        assert!(matches!(err, RecordError::Io { .. }));
    }
}
