//! Expand a record's `tf_location_ids` into `gtfs` entries.

use cityfeeds_core::{CityRecord, FeedEntry, FeedKey};

use crate::transitfeeds::TransitFeeds;

/// Add a `{tf_feed_id}` entry for every feed discovered under the record's
/// locations. Existing keys are left alone, so re-running is a no-op for
/// feeds already known.
///
/// Returns the keys that were inserted.
pub fn resolve_locations(feeds: &TransitFeeds, record: &mut CityRecord) -> Vec<FeedKey> {
    let Some(locations) = record.tf_location_ids.clone() else {
        return Vec::new();
    };
    let mut inserted = Vec::new();
    for feed_id in feeds.resolve(&locations) {
        let key = FeedKey::from_feed_id(&feed_id);
        if record.insert_feed_if_absent(key.clone(), FeedEntry::from_feed_id(feed_id)) {
            tracing::info!("discovered feed {key}");
            inserted.push(key);
        }
    }
    inserted
}
