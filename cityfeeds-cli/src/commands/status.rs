//! `cityfeeds status` — cache age and hash agreement, offline.

use std::path::PathBuf;
use std::time::SystemTime;

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use cityfeeds_sync::{
    cache::{format_age, Freshness},
    change::HashCheck,
    config::FRESHNESS_WINDOW,
    status::{self, CityStatus, FeedStatus},
};

/// Arguments for `cityfeeds status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// City directories (each holding `<cityid>.md`).
    #[arg(required = true)]
    pub cities: Vec<PathBuf>,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl StatusArgs {
    pub fn run(self) -> Result<()> {
        let now = SystemTime::now();
        let mut report = Vec::with_capacity(self.cities.len());
        for dir in &self.cities {
            let city = status::check(dir, now, FRESHNESS_WINDOW)
                .with_context(|| format!("status check failed for '{}'", dir.display()))?;
            report.push(city);
        }

        let failures: usize = report.iter().map(CityStatus::integrity_failures).sum();
        if self.json {
            print_json(&report)?;
        } else {
            print_table(&report);
        }
        if failures > 0 {
            bail!("{failures} feed(s) disagree with their stored hash");
        }
        Ok(())
    }
}

#[derive(Serialize)]
struct CityStatusJson {
    city: String,
    version: Option<u64>,
    changed: Option<String>,
    artifact: bool,
    feeds: Vec<FeedStatusJson>,
}

#[derive(Serialize)]
struct FeedStatusJson {
    key: String,
    directive: Option<&'static str>,
    cache: &'static str,
    age_seconds: Option<u64>,
    hash: &'static str,
}

#[derive(Tabled)]
struct FeedTableRow {
    #[tabled(rename = "feed")]
    key: String,
    #[tabled(rename = "source")]
    directive: String,
    #[tabled(rename = "cache")]
    cache: String,
    #[tabled(rename = "hash")]
    hash: String,
}

fn print_json(report: &[CityStatus]) -> Result<()> {
    let payload: Vec<CityStatusJson> = report
        .iter()
        .map(|city| CityStatusJson {
            city: city.city.to_string(),
            version: city.version,
            changed: city.changed.map(|t| t.to_string()),
            artifact: city.artifact_present,
            feeds: city
                .feeds
                .iter()
                .map(|feed| FeedStatusJson {
                    key: feed.key.to_string(),
                    directive: feed.directive,
                    cache: freshness_key(&feed.freshness),
                    age_seconds: feed.freshness.age().map(|a| a.as_secs()),
                    hash: hash_key(&feed.hash),
                })
                .collect(),
        })
        .collect();
    println!(
        "{}",
        serde_json::to_string_pretty(&payload).context("failed to serialize status JSON")?
    );
    Ok(())
}

fn print_table(report: &[CityStatus]) {
    let separator = "■".repeat(48).bright_black().to_string();
    for city in report {
        let version = city
            .version
            .map(|v| format!("v{v}"))
            .unwrap_or_else(|| "never synced".to_string());
        let artifact = if city.artifact_present {
            "artifact present".green().to_string()
        } else {
            "artifact missing".yellow().to_string()
        };
        println!("{} | {version} | {artifact}", city.city.to_string().to_uppercase().bold());

        if city.feeds.is_empty() {
            println!("No feeds.");
        } else {
            let rows: Vec<FeedTableRow> = city.feeds.iter().map(table_row).collect();
            let mut table = Table::new(rows);
            table.with(Style::rounded());
            println!("{table}");
        }
        println!("{separator}");
    }
}

fn table_row(feed: &FeedStatus) -> FeedTableRow {
    let cache = match feed.freshness {
        Freshness::Missing => "missing".bright_black().to_string(),
        Freshness::Fresh { age } => format!("fresh ({})", format_age(age)).green().to_string(),
        Freshness::Stale { age } => format!("stale ({})", format_age(age)).yellow().to_string(),
    };
    let hash = match &feed.hash {
        HashCheck::Match => "ok".green().to_string(),
        HashCheck::Mismatch { .. } => "MISMATCH".red().bold().to_string(),
        HashCheck::MissingBundle => "bundle missing".red().to_string(),
        HashCheck::Untracked => "-".to_string(),
    };
    FeedTableRow {
        key: feed.key.to_string(),
        directive: feed.directive.unwrap_or("none").to_string(),
        cache,
        hash,
    }
}

fn freshness_key(freshness: &Freshness) -> &'static str {
    match freshness {
        Freshness::Missing => "missing",
        Freshness::Fresh { .. } => "fresh",
        Freshness::Stale { .. } => "stale",
    }
}

fn hash_key(hash: &HashCheck) -> &'static str {
    match hash {
        HashCheck::Match => "match",
        HashCheck::Mismatch { .. } => "mismatch",
        HashCheck::MissingBundle => "missing_bundle",
        HashCheck::Untracked => "untracked",
    }
}
