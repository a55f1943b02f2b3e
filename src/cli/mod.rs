//! Command line interface.

pub mod command;

use std::{path::PathBuf, time::Duration};

use chrono::NaiveDate;
use clap::{command, Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::Level;

use crate::{
    asset::{Catalog, DEFAULT_BASE_URL},
    config::{default_save_directory, Config},
    download::RetryPolicy,
    period::{Cadence, PeriodEnumerator},
    projection::Crs,
    region::BoundingBox,
};

#[derive(Parser)]
#[command(version, about, long_about = None)]
/// Contains the commands
pub struct Cli {
    /// Log level: trace, debug, info, warn or error
    #[arg(long, global = true, default_value_t = Level::INFO)]
    pub log_level: Level,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Clip monthly rasters for a range of years
    Monthly {
        /// First year, inclusive
        #[arg(long)]
        start_year: i32,
        /// Last year, inclusive
        #[arg(long)]
        end_year: i32,
        #[command(flatten)]
        options: RunArgs,
    },
    /// Clip daily rasters for a range of dates
    Daily {
        /// First date (YYYY-MM-DD), inclusive
        #[arg(long)]
        start_date: NaiveDate,
        /// Last date (YYYY-MM-DD), inclusive
        #[arg(long)]
        end_date: NaiveDate,
        #[command(flatten)]
        options: RunArgs,
    },
}

/// Options shared by every cadence.
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Directory for clipped rasters [default: ~/chirps-clipped]
    #[arg(long)]
    pub save_dir: Option<PathBuf>,

    /// Region as lon_min,lon_max,lat_min,lat_max
    #[arg(long, default_value_t = BoundingBox::TARIJA, allow_hyphen_values = true)]
    pub bbox: BoundingBox,

    /// CRS of the bounding box
    #[arg(long, default_value = "EPSG:4326")]
    pub crs: Crs,

    /// Root of the CHIRPS product tree
    #[arg(long, default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    /// Product path below the base URL, overriding the cadence's default
    #[arg(long)]
    pub product_path: Option<String>,

    /// Replace clipped rasters that already exist
    #[arg(long)]
    pub overwrite: bool,

    /// Retries for server errors and broken transfers
    #[arg(long, default_value = "3")]
    pub max_retries: u32,

    /// Per-request timeout in seconds
    #[arg(long, default_value = "300")]
    pub timeout_secs: u64,
}

impl RunArgs {
    pub fn into_config(self, periods: PeriodEnumerator) -> Config {
        let mut catalog = Catalog {
            base_url: self.base_url.trim_end_matches('/').to_string(),
            ..Catalog::default()
        };
        if let Some(path) = self.product_path {
            let path = path.trim_matches('/').to_string();
            match periods.cadence() {
                Cadence::Monthly => catalog.monthly_path = path,
                Cadence::Daily => catalog.daily_path = path,
            }
        }

        Config {
            periods,
            save_directory: self.save_dir.unwrap_or_else(default_save_directory),
            bounding_box: self.bbox,
            crs: self.crs,
            catalog,
            overwrite: self.overwrite,
            retry: RetryPolicy {
                max_retries: self.max_retries,
                ..RetryPolicy::default()
            },
            request_timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}

/// Creates a spinner.
pub fn create_spinner(message: String) -> ProgressBar {
    let bar = ProgressBar::new_spinner().with_message(message);
    bar.enable_steady_tick(Duration::from_millis(100));

    bar
}

/// Creates a progress bar.
pub fn create_progress_bar(size: u64, message: String) -> ProgressBar {
    ProgressBar::new(size).with_message(message).with_style(
        ProgressStyle::with_template("[{eta_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("##-"),
    )
}

// -- Tests -------------------------------------------------------------------
