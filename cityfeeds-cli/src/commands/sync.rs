//! `cityfeeds sync` — run the sync pipeline for one or many cities.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;

use cityfeeds_sync::{
    batch::{self, CityRun, SyncScope, DEFAULT_JOBS},
    cache::format_age,
    config::{API_KEY_ENV, DEFAULT_API_BASE},
    trigger::{BuildOutcome, HookOutcome},
    CityOutcome, FeedOutcome, SyncConfig, SyncPipeline, SyncReport,
};

/// Arguments for `cityfeeds sync`.
#[derive(Args, Debug)]
pub struct SyncArgs {
    /// City directories (each holding `<cityid>.md`).
    #[arg(required_unless_present = "all")]
    pub cities: Vec<PathBuf>,

    /// Sync every city under `--cities-dir`.
    #[arg(long, conflicts_with = "cities", requires = "cities_dir")]
    pub all: bool,

    /// Directory holding one sub-directory per city.
    #[arg(long, value_name = "DIR")]
    pub cities_dir: Option<PathBuf>,

    /// Cities synced concurrently.
    #[arg(long, short = 'j', default_value_t = DEFAULT_JOBS)]
    pub jobs: usize,

    /// Feed service API key.
    #[arg(long, env = API_KEY_ENV, hide_env_values = true)]
    pub api_key: Option<String>,

    /// Base URL of the feed lookup service.
    #[arg(long, default_value = DEFAULT_API_BASE)]
    pub api_base: String,

    /// Artifact generator executable.
    #[arg(long, env = "CITYFEEDS_GENERATOR")]
    pub generator: Option<PathBuf>,

    /// Never invoke the artifact generator.
    #[arg(long)]
    pub no_build: bool,
}

impl SyncArgs {
    pub fn run(self) -> Result<()> {
        let mut config = SyncConfig {
            api_base: self.api_base,
            api_key: self.api_key.filter(|key| !key.is_empty()),
            build: !self.no_build,
            ..SyncConfig::default()
        };
        if let Some(generator) = self.generator {
            config.generator = generator;
        }

        let scope = if self.all {
            let cities_dir = self
                .cities_dir
                .context("--all needs --cities-dir")?;
            SyncScope::All { cities_dir }
        } else {
            SyncScope::Cities(self.cities)
        };

        let pipeline = Arc::new(SyncPipeline::new(config));
        let runs = batch::run(pipeline, scope, self.jobs).context("sync failed")?;
        if runs.is_empty() {
            println!("No cities found.");
            return Ok(());
        }

        let failed = runs.iter().filter(|r| r.result.is_err()).count();
        for run in &runs {
            print_run(run);
        }
        if failed > 0 {
            bail!("{failed} of {} cities failed", runs.len());
        }
        Ok(())
    }
}

fn print_run(run: &CityRun) {
    match &run.result {
        Err(err) => println!("{} '{}' — {err}", "✗".red().bold(), run.city_dir.display()),
        Ok(CityOutcome::NoFeeds { city }) => println!("· '{city}' — no feeds"),
        Ok(CityOutcome::Synced(report)) => print_report(report),
    }
}

fn print_report(report: &SyncReport) {
    let saved = report.feeds.iter().filter(|f| f.outcome.is_change()).count();
    let mut summary = format!(
        "{} '{}' synced ({} feeds, {saved} saved)",
        "✓".green().bold(),
        report.city,
        report.feeds.len()
    );
    if let Some(version) = report.rewritten_version {
        summary.push_str(&format!(", record v{version}"));
    }
    match report.build {
        BuildOutcome::Built => summary.push_str(", artifact rebuilt"),
        BuildOutcome::UpToDate | BuildOutcome::Disabled => {}
    }
    println!("{summary}");

    for key in &report.resolved {
        println!("  +  {key} (discovered)");
    }
    for feed in &report.feeds {
        match &feed.outcome {
            FeedOutcome::Fresh { age } => println!("  ·  {} cached {} ago", feed.key, format_age(*age)),
            FeedOutcome::Saved { sha256 } => {
                println!("  ✎  {} {}", feed.key, sha256.get(..12).unwrap_or(sha256))
            }
            FeedOutcome::Unchanged => println!("  =  {} unchanged", feed.key),
            FeedOutcome::Skipped { reason } => {
                println!("  {}  {} skipped: {reason}", "!".yellow().bold(), feed.key)
            }
        }
    }
    if let HookOutcome::Failed(reason) = &report.hook {
        println!("  {}  post script failed: {reason}", "!".yellow().bold());
    }
}
