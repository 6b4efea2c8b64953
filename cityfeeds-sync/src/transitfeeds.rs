//! Client for the remote lookup and feed services.
//!
//! - `getFeeds` lists the GTFS feeds of a location (first page only).
//! - `getLatestFeedVersion` returns the newest payload of one feed, or a
//!   JSON error body.
//!
//! Every call waits on a [`RateLimiter`] shared by all cities of a run.

use std::sync::Arc;

use serde::Deserialize;

use cityfeeds_core::LocationId;

use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::transport::{HttpResponse, RateLimiter, Transport};

/// Feeds requested per location. Only one page is ever read.
pub const PAGE_SIZE: u32 = 50;

#[derive(Debug, Deserialize)]
struct FeedsEnvelope {
    results: FeedsResults,
}

#[derive(Debug, Deserialize)]
struct FeedsResults {
    #[serde(default)]
    feeds: Vec<FeedSummary>,
}

#[derive(Debug, Deserialize)]
struct FeedSummary {
    id: String,
}

/// Outcome of asking the feed service for a payload.
#[derive(Debug)]
pub enum FeedVersion {
    Payload(HttpResponse),
    /// The service answered with an error instead of a payload.
    ServiceError(String),
}

pub struct TransitFeeds {
    transport: Arc<dyn Transport>,
    limiter: Arc<RateLimiter>,
    feeds_url: String,
    latest_url: String,
    api_key: Option<String>,
}

impl TransitFeeds {
    pub fn new(config: &SyncConfig, transport: Arc<dyn Transport>, limiter: Arc<RateLimiter>) -> Self {
        Self {
            transport,
            limiter,
            feeds_url: config.endpoint("getFeeds"),
            latest_url: config.endpoint("getLatestFeedVersion"),
            api_key: config.api_key.clone(),
        }
    }

    /// Feed ids of one location.
    ///
    /// Any failure is logged and yields an empty list; resolution is best
    /// effort and callers must cope with fewer feeds than expected.
    pub fn lookup_location(&self, location: &LocationId) -> Vec<String> {
        match self.try_lookup_location(location) {
            Ok(ids) => {
                tracing::info!("location {location}: {} feed(s)", ids.len());
                ids
            }
            Err(reason) => {
                tracing::warn!("location {location}: lookup failed ({reason}), no feeds resolved");
                Vec::new()
            }
        }
    }

    fn try_lookup_location(&self, location: &LocationId) -> Result<Vec<String>, String> {
        let location = location.to_string();
        let page = 1.to_string();
        let limit = PAGE_SIZE.to_string();
        let mut query = vec![
            ("location", location.as_str()),
            ("descendants", "1"),
            ("page", page.as_str()),
            ("limit", limit.as_str()),
            ("type", "gtfs"),
        ];
        if let Some(key) = self.api_key.as_deref() {
            query.insert(0, ("key", key));
        }

        self.limiter.wait();
        let response = self
            .transport
            .get(&self.feeds_url, &query)
            .map_err(|e| e.to_string())?;
        if !response.is_success() {
            return Err(format!("HTTP {}", response.status));
        }
        let envelope: FeedsEnvelope = response
            .into_json()
            .map_err(|e| format!("malformed response: {e}"))?;
        Ok(envelope.results.feeds.into_iter().map(|f| f.id).collect())
    }

    /// Lazily resolve feed ids for `locations`, one lookup per location as
    /// the iterator advances.
    pub fn resolve<'a>(&'a self, locations: &'a [LocationId]) -> impl Iterator<Item = String> + 'a {
        locations.iter().flat_map(move |location| self.lookup_location(location))
    }

    /// Request the latest payload of `feed_id`.
    ///
    /// A JSON body or an HTTP error status is a [`FeedVersion::ServiceError`];
    /// network failures are errors.
    pub fn latest_feed_version(&self, feed_id: &str) -> Result<FeedVersion, SyncError> {
        let mut query = vec![("feed", feed_id)];
        if let Some(key) = self.api_key.as_deref() {
            query.insert(0, ("key", key));
        }

        self.limiter.wait();
        let response = self.transport.get(&self.latest_url, &query)?;
        if response.is_json() {
            let status = response.status;
            let message = response
                .into_json::<serde_json::Value>()
                .ok()
                .and_then(|body| error_message(&body))
                .unwrap_or_else(|| "API error".to_string());
            return Ok(FeedVersion::ServiceError(format!("HTTP {status}: {message}")));
        }
        if !response.is_success() {
            return Ok(FeedVersion::ServiceError(format!("HTTP {}", response.status)));
        }
        Ok(FeedVersion::Payload(response))
    }
}

fn error_message(body: &serde_json::Value) -> Option<String> {
    ["msg", "message", "status"]
        .iter()
        .find_map(|field| body.get(field).and_then(|v| v.as_str()))
        .map(str::to_owned)
}
