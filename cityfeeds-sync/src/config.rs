//! Run configuration shared by every city in a sync.

use std::path::PathBuf;
use std::time::Duration;

/// Remote lookup / feed service.
pub const DEFAULT_API_BASE: &str = "https://api.transitfeeds.com/v1/";

/// Environment variable holding the feed service API key.
pub const API_KEY_ENV: &str = "TRANSITFEED_API_KEY";

/// Cached bundles younger than this are not re-fetched.
pub const FRESHNESS_WINDOW: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Settings for a sync run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Base URL of the lookup / feed service, with trailing slash.
    pub api_base: String,
    /// Callers resolve the key themselves; the CLI reads [`API_KEY_ENV`].
    pub api_key: Option<String>,
    pub freshness: Duration,
    /// Connect and read timeout for every network call.
    pub timeout: Duration,
    /// Minimum spacing between two calls to the feed service.
    pub min_request_interval: Duration,
    /// Artifact generator, invoked as `<generator> -d <data> -o <artifact> -v`.
    pub generator: PathBuf,
    /// When false, the generator is never invoked.
    pub build: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            api_key: None,
            freshness: FRESHNESS_WINDOW,
            timeout: Duration::from_secs(60),
            min_request_interval: Duration::from_millis(250),
            generator: PathBuf::from("./mapnificent_generator"),
            build: true,
        }
    }
}

impl SyncConfig {
    /// `<api_base><endpoint>`
    pub fn endpoint(&self, endpoint: &str) -> String {
        if self.api_base.ends_with('/') {
            format!("{}{endpoint}", self.api_base)
        } else {
            format!("{}/{endpoint}", self.api_base)
        }
    }
}
