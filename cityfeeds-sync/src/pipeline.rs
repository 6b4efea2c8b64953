//! Per-city sync pipeline.
//!
//! ```text
//! load record → resolve locations → for each feed {
//!     check freshness → acquire → hash + persist
//! } → rewrite record → post script → build artifact
//! ```
//!
//! One city is processed sequentially. Feed-level problems skip the feed;
//! anything returned as `Err` aborts the city.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use chrono::Utc;

use cityfeeds_core::{
    record::{self, ensure_dir, StoredRecord},
    CityId, CityPaths, FeedEntry, FeedKey, RecordError,
};

use crate::acquire::{Acquisition, FeedAcquirer};
use crate::cache::{self, format_age, Freshness};
use crate::change::{self, Change};
use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::resolver::resolve_locations;
use crate::transitfeeds::TransitFeeds;
use crate::transport::{RateLimiter, Transport, UreqTransport};
use crate::trigger::{self, BuildOutcome, HookOutcome};

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The entry sets none of `script`, `tf_feed_id`, `url`, `file`.
    NoDirective,
    /// The strategy ran but produced nothing to persist.
    Unavailable(String),
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::NoDirective => f.write_str("no acquisition directive"),
            SkipReason::Unavailable(reason) => f.write_str(reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedOutcome {
    /// Cached bundle is within the freshness window; nothing was fetched.
    Fresh { age: Duration },
    /// New content was written to the bundle.
    Saved { sha256: String },
    /// Fetched content matched the stored hash.
    Unchanged,
    Skipped { reason: SkipReason },
}

impl FeedOutcome {
    pub fn is_change(&self) -> bool {
        matches!(self, FeedOutcome::Saved { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedReport {
    pub key: FeedKey,
    pub outcome: FeedOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub city: CityId,
    /// Keys added from `tf_location_ids` during this run.
    pub resolved: Vec<FeedKey>,
    pub feeds: Vec<FeedReport>,
    /// New record version, when the record was rewritten.
    pub rewritten_version: Option<u64>,
    pub hook: HookOutcome,
    pub build: BuildOutcome,
}

impl SyncReport {
    pub fn any_changed(&self) -> bool {
        self.feeds.iter().any(|f| f.outcome.is_change())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CityOutcome {
    /// The record has no feeds, even after location resolution.
    NoFeeds { city: CityId },
    Synced(SyncReport),
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Syncs cities with one configuration, transport and rate limiter.
///
/// Shareable across threads; every city of a batch goes through the same
/// instance.
pub struct SyncPipeline {
    config: SyncConfig,
    transport: Arc<dyn Transport>,
    feeds: TransitFeeds,
}

impl SyncPipeline {
    pub fn new(config: SyncConfig) -> Self {
        let transport = Arc::new(UreqTransport::new(config.timeout));
        Self::with_transport(config, transport)
    }

    pub fn with_transport(config: SyncConfig, transport: Arc<dyn Transport>) -> Self {
        let limiter = Arc::new(RateLimiter::new(config.min_request_interval));
        let feeds = TransitFeeds::new(&config, transport.clone(), limiter);
        Self {
            config,
            transport,
            feeds,
        }
    }

    /// Run the full pipeline for the city in `city_dir`.
    pub fn sync_city(&self, city_dir: &Path) -> Result<CityOutcome, SyncError> {
        let paths = CityPaths::new(city_dir)?;
        let mut stored = match record::load_at(&paths) {
            Err(RecordError::RecordNotFound { path }) => {
                return Err(SyncError::ConfigMissing { path })
            }
            other => other?,
        };
        let city = paths.id.clone();
        tracing::info!("{city}: checking");

        let resolved = resolve_locations(&self.feeds, &mut stored.record);
        if stored.record.gtfs.as_ref().map_or(true, |feeds| feeds.is_empty()) {
            tracing::info!("{city}: no feeds");
            return Ok(CityOutcome::NoFeeds { city });
        }

        ensure_dir(&paths.data_dir())?;
        let acquirer = FeedAcquirer {
            feeds: &self.feeds,
            transport: self.transport.as_ref(),
            city_dir: &paths.dir,
        };
        let now = SystemTime::now();
        let mut feeds = Vec::new();
        let mut failure = None;
        for (key, entry) in stored.record.gtfs.iter_mut().flatten() {
            match self.sync_feed(&acquirer, &paths, key, entry, now) {
                Ok(outcome) => feeds.push(FeedReport {
                    key: key.clone(),
                    outcome,
                }),
                Err(err) => {
                    failure = Some(err);
                    break;
                }
            }
        }

        let any_changed = feeds.iter().any(|f| f.outcome.is_change());
        if let Some(err) = failure {
            // Bundles written before the failure are already on disk; their
            // hashes must reach the record and the artifact.
            if any_changed {
                tracing::warn!("{city}: recording feeds saved before the failure");
                self.rewrite(&city, &mut stored)?;
                if let Err(build_err) = self.build(&city, &paths, true) {
                    tracing::error!("{city}: {build_err}");
                }
            }
            return Err(err);
        }

        let rewritten_version = if any_changed || stored.record.has_legacy_geometry() {
            self.rewrite(&city, &mut stored)?
        } else {
            None
        };

        let hook = trigger::run_post_script(stored.record.script.as_deref(), &paths.dir);
        let build = self.build(&city, &paths, any_changed)?;

        Ok(CityOutcome::Synced(SyncReport {
            city,
            resolved,
            feeds,
            rewritten_version,
            hook,
            build,
        }))
    }

    /// Migrate legacy fields, stamp and save the record. Returns the new
    /// version.
    fn rewrite(&self, city: &CityId, stored: &mut StoredRecord) -> Result<Option<u64>, SyncError> {
        for field in stored.record.migrate_legacy() {
            tracing::warn!("{city}: dropped `{field}` without its counterpart");
        }
        stored.record.stamp_rewrite(Utc::now().naive_utc());
        stored.save()?;
        tracing::info!(
            "{city}: rewrote {} (version {})",
            stored.path.display(),
            stored.record.version.unwrap_or_default()
        );
        Ok(stored.record.version)
    }

    fn build(&self, city: &CityId, paths: &CityPaths, any_changed: bool) -> Result<BuildOutcome, SyncError> {
        let artifact = paths.artifact();
        if !self.config.build {
            Ok(BuildOutcome::Disabled)
        } else if trigger::should_build(any_changed, &artifact) {
            trigger::run_generator(&self.config.generator, &paths.data_dir(), &artifact)?;
            Ok(BuildOutcome::Built)
        } else {
            tracing::debug!("{city}: artifact up to date");
            Ok(BuildOutcome::UpToDate)
        }
    }

    fn sync_feed(
        &self,
        acquirer: &FeedAcquirer<'_>,
        paths: &CityPaths,
        key: &FeedKey,
        entry: &mut FeedEntry,
        now: SystemTime,
    ) -> Result<FeedOutcome, SyncError> {
        let bundle = paths.bundle(key);
        if let Freshness::Fresh { age } = cache::check(&bundle, now, self.config.freshness)? {
            tracing::info!("{key}: cached {} ago, skipping", format_age(age));
            return Ok(FeedOutcome::Fresh { age });
        }

        let Some(directive) = entry.directive() else {
            tracing::warn!("{key}: no acquisition directive, skipping");
            return Ok(FeedOutcome::Skipped {
                reason: SkipReason::NoDirective,
            });
        };
        if entry.directive_count() > 1 {
            tracing::debug!("{key}: several directives set, using {}", directive.label());
        }

        let acquired = match acquirer.acquire(key, directive, &bundle)? {
            Acquisition::Acquired(acquired) => acquired,
            Acquisition::Unavailable(reason) => {
                return Ok(FeedOutcome::Skipped {
                    reason: SkipReason::Unavailable(reason),
                })
            }
        };

        if let Some(final_url) = acquired.final_url {
            if entry.url.as_deref().map_or(true, str::is_empty) {
                tracing::info!("{key}: recording permalink {final_url}");
                entry.url = Some(final_url);
            }
        }

        Ok(match change::persist_if_changed(&bundle, entry, &acquired.payload)? {
            Change::Written { sha256 } => FeedOutcome::Saved { sha256 },
            Change::Unchanged => FeedOutcome::Unchanged,
        })
    }
}
