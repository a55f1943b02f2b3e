//! Run configuration assembled from the command line.

use std::{path::PathBuf, time::Duration};

use tracing::debug;

use crate::{
    asset::Catalog,
    download::RetryPolicy,
    error::Result,
    period::PeriodEnumerator,
    projection::Crs,
    region::{BoundingBox, Region},
};

/// Everything a run needs. Nothing in the pipeline reads defaults of its
/// own; they all come through here.
#[derive(Debug, Clone)]
pub struct Config {
    pub periods: PeriodEnumerator,
    pub save_directory: PathBuf,
    pub bounding_box: BoundingBox,
    /// CRS the bounding box is expressed in.
    pub crs: Crs,
    pub catalog: Catalog,
    pub overwrite: bool,
    pub retry: RetryPolicy,
    pub request_timeout: Duration,
}

impl Config {
    /// The canonical region every raster is clipped to.
    pub fn region(&self) -> Result<Region> {
        Region::from_bbox(self.bounding_box, self.crs)
    }

    /// Creates the save directory when missing.
    pub fn prepare_save_directory(&self) -> Result<()> {
        std::fs::create_dir_all(&self.save_directory)?;
        debug!(path = %self.save_directory.display(), "Save directory ready");
        Ok(())
    }
}

/// `~/chirps-clipped`, or a relative `chirps-clipped` without a home.
pub fn default_save_directory() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join("chirps-clipped"))
        .unwrap_or_else(|| PathBuf::from("chirps-clipped"))
}

// -- Tests -------------------------------------------------------------------
