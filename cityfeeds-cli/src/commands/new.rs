//! `cityfeeds new <cityid> --name <name> --lng <lng> --lat <lat> [--location <id>] --cities-dir <dir>`

use std::path::PathBuf;

use anyhow::{ensure, Context, Result};
use clap::Args;

use cityfeeds_core::{record, slug::slugify, CityId, CityRecord, Coordinates, LocationId};

/// Zoom level of newly created cities.
const DEFAULT_ZOOM: u32 = 12;

/// Create a new city record.
#[derive(Args, Debug)]
pub struct NewArgs {
    /// City id; becomes the directory and record file name.
    pub cityid: String,

    /// Display name of the city.
    #[arg(long)]
    pub name: String,

    #[arg(long, allow_hyphen_values = true)]
    pub lng: f64,

    #[arg(long, allow_hyphen_values = true)]
    pub lat: f64,

    /// Feed-service location id used to discover feeds on first sync.
    #[arg(long)]
    pub location: Option<String>,

    #[arg(long, default_value_t = DEFAULT_ZOOM)]
    pub zoom: u32,

    /// Directory holding one sub-directory per city.
    #[arg(long, value_name = "DIR", default_value = ".")]
    pub cities_dir: PathBuf,
}

impl NewArgs {
    pub fn run(self) -> Result<()> {
        ensure!(
            !self.cityid.is_empty() && slugify(&self.cityid) == self.cityid,
            "city id '{}' may only contain letters, digits, '_' and '-'",
            self.cityid
        );

        let record = CityRecord {
            cityid: Some(CityId::from(self.cityid.clone())),
            cityname: Some(self.name),
            coordinates: Some(Coordinates {
                lng: self.lng,
                lat: self.lat,
            }),
            zoom: Some(self.zoom),
            tf_location_ids: self
                .location
                .filter(|l| !l.is_empty())
                .map(|l| vec![LocationId::Named(l)]),
            ..CityRecord::default()
        };

        let paths = record::create_at(&self.cities_dir, &record)
            .with_context(|| format!("failed to create city '{}'", self.cityid))?;
        println!("✓ Created '{}'", paths.id);
        println!("  Saved to: {}", paths.record().display());
        Ok(())
    }
}
