//! Run the pipeline over many cities with bounded concurrency.
//!
//! Each city runs as one blocking task on a multi-thread tokio runtime; a
//! semaphore caps how many run at once. A city that fails (or panics) is
//! reported in its own [`CityRun`] and never affects the others.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Semaphore;

use cityfeeds_core::record::list_city_dirs_at;

use crate::error::SyncError;
use crate::pipeline::{CityOutcome, SyncPipeline};

pub const DEFAULT_JOBS: usize = 4;

/// Which cities a run covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncScope {
    /// Every directory under `cities_dir` that holds a record.
    All { cities_dir: PathBuf },
    Cities(Vec<PathBuf>),
}

impl SyncScope {
    pub fn city_dirs(&self) -> Result<Vec<PathBuf>, SyncError> {
        match self {
            SyncScope::All { cities_dir } => Ok(list_city_dirs_at(cities_dir)?),
            SyncScope::Cities(dirs) => Ok(dirs.clone()),
        }
    }
}

#[derive(Debug)]
pub struct CityRun {
    pub city_dir: PathBuf,
    pub result: Result<CityOutcome, SyncError>,
}

/// Sync every city in `scope`, at most `jobs` at a time.
///
/// Results come back in scope order. Only failing to enumerate the scope or
/// to start the runtime is an `Err`.
pub fn run(pipeline: Arc<SyncPipeline>, scope: SyncScope, jobs: usize) -> Result<Vec<CityRun>, SyncError> {
    let dirs = scope.city_dirs()?;
    if dirs.is_empty() {
        return Ok(Vec::new());
    }
    let jobs = jobs.max(1);
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(jobs.min(dirs.len()))
        .thread_name("cityfeeds-worker")
        .build()
        .map_err(|e| SyncError::Worker(format!("failed to start runtime: {e}")))?;

    runtime.block_on(async move {
        let semaphore = Arc::new(Semaphore::new(jobs));
        let mut handles = Vec::with_capacity(dirs.len());
        for city_dir in dirs {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| SyncError::Worker(e.to_string()))?;
            let pipeline = pipeline.clone();
            let dir = city_dir.clone();
            let handle = tokio::task::spawn_blocking(move || {
                let _permit = permit;
                pipeline.sync_city(&dir)
            });
            handles.push((city_dir, handle));
        }

        let mut runs = Vec::with_capacity(handles.len());
        for (city_dir, handle) in handles {
            let result = handle
                .await
                .unwrap_or_else(|e| Err(SyncError::Worker(format!("city task failed: {e}"))));
            if let Err(err) = &result {
                tracing::error!("{}: {err}", city_dir.display());
            }
            runs.push(CityRun { city_dir, result });
        }
        Ok::<_, SyncError>(runs)
    })
}
