//! Domain types for city records.
//!
//! A [`CityRecord`] is the structured front matter of `<cityid>/<cityid>.md`.
//! Keys the record does not know about are carried through `extra` so a
//! rewrite never drops operator-added data.

use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer, Serialize};
use serde_yaml::Value;

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Slug-safe identifier of a city; also the name of its directory.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CityId(pub String);

impl fmt::Display for CityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for CityId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for CityId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Slug-safe identifier of one feed bundle within a city.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeedKey(pub String);

impl FeedKey {
    /// Derive a key from an external feed id (`"sfmta/60"` → `"sfmta-60"`).
    pub fn from_feed_id(feed_id: &str) -> Self {
        Self(crate::slug::slugify(feed_id))
    }
}

impl fmt::Display for FeedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for FeedKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for FeedKey {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// External location identifier used for feed discovery.
///
/// Record files written by hand use bare integers, generated ones use
/// strings; both are kept in their original form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LocationId {
    Numeric(u64),
    Named(String),
}

impl fmt::Display for LocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocationId::Numeric(n) => n.fmt(f),
            LocationId::Named(s) => s.fmt(f),
        }
    }
}

/// `[longitude, latitude]` pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct Coordinates {
    pub lng: f64,
    pub lat: f64,
}

impl From<[f64; 2]> for Coordinates {
    fn from([lng, lat]: [f64; 2]) -> Self {
        Self { lng, lat }
    }
}

impl From<Coordinates> for [f64; 2] {
    fn from(c: Coordinates) -> Self {
        [c.lng, c.lat]
    }
}

// ---------------------------------------------------------------------------
// Feed entries
// ---------------------------------------------------------------------------

/// How the bytes of one feed are obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive<'a> {
    /// Shell command whose last stdout line names the produced file.
    Script(&'a str),
    /// Latest version of a feed on the remote feed service.
    RemoteFeed(&'a str),
    /// Plain download.
    DirectUrl(&'a str),
    /// The cached bundle already on disk.
    LocalFile,
}

impl Directive<'_> {
    pub fn label(&self) -> &'static str {
        match self {
            Directive::Script(_) => "script",
            Directive::RemoteFeed(_) => "tf_feed_id",
            Directive::DirectUrl(_) => "url",
            Directive::LocalFile => "file",
        }
    }
}

/// One entry of a record's `gtfs` map.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FeedEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tf_feed_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<Value>,
    /// Hex SHA-256 of the cached bundle.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl FeedEntry {
    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::default()
        }
    }

    pub fn from_feed_id(feed_id: impl Into<String>) -> Self {
        Self {
            tf_feed_id: Some(feed_id.into()),
            ..Self::default()
        }
    }

    /// Resolve the acquisition directive.
    ///
    /// Priority is fixed: script, remote feed id, url, local file. A recorded
    /// permalink `url` next to a `tf_feed_id` is therefore never used for
    /// fetching.
    pub fn directive(&self) -> Option<Directive<'_>> {
        if let Some(script) = self.script.as_deref() {
            return Some(Directive::Script(script));
        }
        if let Some(feed_id) = self.tf_feed_id.as_deref() {
            return Some(Directive::RemoteFeed(feed_id));
        }
        if let Some(url) = self.url.as_deref().filter(|u| !u.is_empty()) {
            return Some(Directive::DirectUrl(url));
        }
        if self.file.as_ref().is_some_and(is_truthy) {
            return Some(Directive::LocalFile);
        }
        None
    }

    /// Number of directives set on this entry, regardless of priority.
    pub fn directive_count(&self) -> usize {
        [
            self.script.is_some(),
            self.tf_feed_id.is_some(),
            self.url.as_deref().is_some_and(|u| !u.is_empty()),
            self.file.as_ref().is_some_and(is_truthy),
        ]
        .into_iter()
        .filter(|set| *set)
        .count()
    }
}

/// On-disk shape of a `gtfs` value: a bare string means `{url: <string>}`.
#[derive(Deserialize)]
#[serde(untagged)]
enum FeedEntryRepr {
    Url(String),
    Entry(FeedEntry),
}

impl From<FeedEntryRepr> for FeedEntry {
    fn from(repr: FeedEntryRepr) -> Self {
        match repr {
            FeedEntryRepr::Url(url) => FeedEntry::from_url(url),
            FeedEntryRepr::Entry(entry) => entry,
        }
    }
}

fn deserialize_feeds<'de, D>(deserializer: D) -> Result<Option<Feeds>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<BTreeMap<FeedKey, FeedEntryRepr>>::deserialize(deserializer)?;
    Ok(raw.map(|feeds| feeds.into_iter().map(|(k, v)| (k, v.into())).collect()))
}

/// Feed entries keyed by feed-key.
pub type Feeds = BTreeMap<FeedKey, FeedEntry>;

// ---------------------------------------------------------------------------
// City record
// ---------------------------------------------------------------------------

/// The structured block of a city's record file.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CityRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cityid: Option<CityId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cityname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<Coordinates>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zoom: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tf_location_ids: Option<Vec<LocationId>>,
    #[serde(
        default,
        deserialize_with = "deserialize_feeds",
        skip_serializing_if = "Option::is_none"
    )]
    pub gtfs: Option<Feeds>,
    #[serde(default, with = "iso_timestamp", skip_serializing_if = "Option::is_none")]
    pub added: Option<NaiveDateTime>,
    #[serde(default, with = "iso_timestamp", skip_serializing_if = "Option::is_none")]
    pub changed: Option<NaiveDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
    /// Post-download hook, run in the city directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script: Option<String>,

    // Deprecated fields, removed by `migrate_legacy`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub northwest: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub southeast: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lng: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hidden: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl CityRecord {
    /// Whether any deprecated geographic field is still present.
    pub fn has_legacy_geometry(&self) -> bool {
        self.northwest.is_some() || self.southeast.is_some() || self.lat.is_some() || self.lng.is_some()
    }

    /// Collapse deprecated fields into the current schema.
    ///
    /// Returns the names of fields that could not be folded and were dropped.
    pub fn migrate_legacy(&mut self) -> Vec<&'static str> {
        let mut dropped = Vec::new();
        self.northwest = None;
        self.southeast = None;
        match (self.lng.take(), self.lat.take()) {
            (Some(lng), Some(lat)) => self.coordinates = Some(Coordinates { lng, lat }),
            (Some(_), None) => dropped.push("lng"),
            (None, Some(_)) => dropped.push("lat"),
            (None, None) => {}
        }
        if self.hidden == Some(false) {
            self.hidden = None;
        }
        if self.active == Some(true) {
            self.active = None;
        }
        dropped
    }

    /// Stamp the bookkeeping fields for a rewrite happening at `now`.
    pub fn stamp_rewrite(&mut self, now: NaiveDateTime) {
        if self.added.is_none() {
            self.added = Some(now);
        }
        self.changed = Some(now);
        self.version = Some(self.version.unwrap_or(0) + 1);
    }

    /// Insert a feed unless the key is already taken. Returns `true` on insert.
    pub fn insert_feed_if_absent(&mut self, key: FeedKey, entry: FeedEntry) -> bool {
        let feeds = self.gtfs.get_or_insert_with(BTreeMap::new);
        if feeds.contains_key(&key) {
            return false;
        }
        feeds.insert(key, entry);
        true
    }
}

/// YAML truthiness, as used by the `file` directive.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Sequence(seq) => !seq.is_empty(),
        Value::Mapping(map) => !map.is_empty(),
        Value::Tagged(tagged) => is_truthy(&tagged.value),
    }
}

/// ISO-8601 timestamps without offset, e.g. `2017-03-04T12:00:00.123456`.
/// A space separator is accepted on read.
mod iso_timestamp {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    const WRITE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";
    const READ_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

    pub fn serialize<S>(value: &Option<NaiveDateTime>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(ts) => serializer.serialize_str(&ts.format(WRITE_FORMAT).to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<NaiveDateTime>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let Some(raw) = Option::<String>::deserialize(deserializer)? else {
            return Ok(None);
        };
        READ_FORMATS
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(raw.trim(), fmt).ok())
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp '{raw}'")))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
