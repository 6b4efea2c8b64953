//! # cityfeeds-sync
//!
//! Fetch, cache, hash and rebuild per-city transit feeds.
//!
//! Call [`SyncPipeline::sync_city`] for a single city directory, or
//! [`batch::run`] to process many cities with bounded concurrency.
//! [`status::check`] reports cache age and hash agreement without touching
//! the network.

pub mod acquire;
pub mod batch;
pub mod cache;
pub mod change;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod resolver;
pub mod status;
pub mod transitfeeds;
pub mod transport;
pub mod trigger;

pub use batch::{CityRun, SyncScope};
pub use config::SyncConfig;
pub use error::SyncError;
pub use pipeline::{CityOutcome, FeedOutcome, FeedReport, SkipReason, SyncPipeline, SyncReport};
pub use transport::{HttpResponse, Transport};
