//! Record store integration tests: legacy files, rewrite discipline, errors.

use assert_fs::prelude::*;
use chrono::NaiveDate;
use cityfeeds_core::{
    record::{self, CityPaths},
    CityId, Coordinates, FeedKey, RecordError,
};
use std::fs;

const LEGACY: &str = "---
active: true
cityid: berlin
cityname: Berlin
gtfs:
  vbb: https://www.vbb.de/media/download/2029
  bvg:
    sha256: deadbeef
    tf_feed_id: bvg/1
hidden: false
lat: 52.52
lng: 13.40
northwest:
  lat: 52.7
  lng: 13.0
southeast:
  lat: 52.3
  lng: 13.8
zoom: 11
---

(c) [VBB](https://www.vbb.de) --- data license CC-BY
";

fn city(home: &assert_fs::TempDir) -> CityPaths {
    CityPaths::in_cities_dir(home.path(), &CityId::from("berlin"))
}

fn write_legacy(home: &assert_fs::TempDir) -> CityPaths {
    home.child("berlin/berlin.md").write_str(LEGACY).expect("write");
    city(home)
}

// ---------------------------------------------------------------------------
// 1. Legacy records
// ---------------------------------------------------------------------------

#[test]
fn legacy_record_parses_and_normalizes_bare_urls() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let paths = write_legacy(&home);
    let stored = record::load_at(&paths).expect("load");

    let feeds = stored.record.gtfs.as_ref().expect("gtfs");
    assert_eq!(
        feeds[&FeedKey::from("vbb")].url.as_deref(),
        Some("https://www.vbb.de/media/download/2029")
    );
    assert_eq!(feeds[&FeedKey::from("bvg")].sha256.as_deref(), Some("deadbeef"));
    assert!(stored.record.has_legacy_geometry());
}

#[test]
fn migrated_rewrite_drops_deprecated_fields_and_keeps_body() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let paths = write_legacy(&home);
    let mut stored = record::load_at(&paths).expect("load");

    stored.record.migrate_legacy();
    let now = NaiveDate::from_ymd_opt(2024, 5, 1)
        .unwrap()
        .and_hms_opt(10, 0, 0)
        .unwrap();
    stored.record.stamp_rewrite(now);
    stored.save().expect("save");

    let written = fs::read_to_string(paths.record()).expect("read");
    assert!(written.ends_with("---\n\n(c) [VBB](https://www.vbb.de) --- data license CC-BY\n"));
    assert!(!written.contains("northwest"));
    assert!(!written.contains("hidden"));
    assert!(!written.contains("active"));
    assert!(written.contains("version: 1\n"));
    assert!(written.contains("2024-05-01T10:00:00.000000"));
    assert!(written.contains("vbb:\n    url: https://www.vbb.de/media/download/2029"));

    let reloaded = record::load_at(&paths).expect("reload");
    assert_eq!(
        reloaded.record.coordinates,
        Some(Coordinates { lng: 13.40, lat: 52.52 })
    );
    assert!(!reloaded.record.has_legacy_geometry());
}

#[test]
fn repeated_saves_are_byte_identical() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let paths = write_legacy(&home);

    let mut stored = record::load_at(&paths).expect("load");
    stored.save().expect("first save");
    let first = fs::read_to_string(paths.record()).unwrap();

    let mut stored = record::load_at(&paths).expect("reload");
    stored.save().expect("second save");
    let second = fs::read_to_string(paths.record()).unwrap();

    assert_eq!(first, second);
}

#[test]
fn version_grows_by_one_per_rewrite() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let paths = write_legacy(&home);
    let now = NaiveDate::from_ymd_opt(2024, 5, 1)
        .unwrap()
        .and_hms_opt(10, 0, 0)
        .unwrap();

    for expected in 1..=3u64 {
        let mut stored = record::load_at(&paths).expect("load");
        stored.record.stamp_rewrite(now);
        stored.save().expect("save");
        let reloaded = record::load_at(&paths).expect("reload");
        assert_eq!(reloaded.record.version, Some(expected));
    }
}

// ---------------------------------------------------------------------------
// 2. Errors
// ---------------------------------------------------------------------------

#[test]
fn corrupt_yaml_returns_parse_error_with_path() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    home.child("berlin/berlin.md")
        .write_str("---\n: : corrupt : yaml : !!!\n  - broken: [unclosed\n---\n")
        .expect("write");

    let err = record::load_at(&city(&home)).unwrap_err();
    assert!(matches!(err, RecordError::Parse { .. }), "got: {err}");
    assert!(err.to_string().contains("berlin.md"));
}

#[test]
fn missing_record_names_the_path() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let err = record::load_at(&city(&home)).unwrap_err();
    assert!(matches!(err, RecordError::RecordNotFound { .. }), "got: {err}");
    assert!(err.to_string().contains("berlin.md"));
}

#[test]
fn empty_front_matter_loads_as_default_record() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    home.child("berlin/berlin.md").write_str("---\n---\nbody\n").expect("write");
    let stored = record::load_at(&city(&home)).expect("load");
    assert!(stored.record.gtfs.is_none());
    assert_eq!(stored.document.body(), "body\n");
}
