//! cityfeeds core library — city record types, front-matter persistence, errors.
//!
//! - [`types`] — newtypes, [`CityRecord`], [`FeedEntry`], [`Directive`]
//! - [`document`] — `---` delimited front-matter documents
//! - [`record`] — per-city paths, load / save / create
//! - [`yaml`] — deterministic YAML dump
//! - [`slug`] — feed-key slugification

pub mod document;
pub mod error;
pub mod record;
pub mod slug;
pub mod types;
pub mod yaml;

pub use error::RecordError;
pub use record::{CityPaths, StoredRecord};
pub use types::{
    CityId, CityRecord, Coordinates, Directive, FeedEntry, FeedKey, Feeds, LocationId,
};
