//! Maps periods onto CHIRPS download URLs and local file names.

use crate::period::{Cadence, Period};

pub const DEFAULT_BASE_URL: &str = "https://data.chc.ucsb.edu/products/CHIRPS-2.0";
pub const DEFAULT_MONTHLY_PATH: &str = "global_2-monthly/tifs";
pub const DEFAULT_DAILY_PATH: &str = "global_daily/tifs/p05";

const COMPRESSION_SUFFIX: &str = ".gz";

/// Where the products live on the remote server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catalog {
    pub base_url: String,
    pub monthly_path: String,
    pub daily_path: String,
}

impl Default for Catalog {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            monthly_path: DEFAULT_MONTHLY_PATH.to_string(),
            daily_path: DEFAULT_DAILY_PATH.to_string(),
        }
    }
}

/// One period's remote file and the local names derived from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteAsset {
    pub period: Period,
    pub url: String,
    pub file_name: String,
}

impl RemoteAsset {
    pub fn for_period(period: Period, catalog: &Catalog) -> Self {
        let file_name = format!("chirps-v2.0.{}.tif{}", period, COMPRESSION_SUFFIX);
        let base = catalog.base_url.trim_end_matches('/');

        // Daily products are sharded by year.
        let url = match period.cadence() {
            Cadence::Monthly => {
                format!("{}/{}/{}", base, catalog.monthly_path.trim_matches('/'), file_name)
            }
            Cadence::Daily => format!(
                "{}/{}/{}/{}",
                base,
                catalog.daily_path.trim_matches('/'),
                period.year(),
                file_name
            ),
        };

        Self {
            period,
            url,
            file_name,
        }
    }

    /// Name of the downloaded file once the compression suffix is removed.
    pub fn decompressed_name(&self) -> &str {
        strip_compression_suffix(&self.file_name).unwrap_or(&self.file_name)
    }

    /// Name of the clipped file kept in the save directory.
    pub fn clipped_name(&self) -> String {
        match self.period {
            Period::Month { year, month } => format!("clipped_{}_{:02}.tif", year, month),
            Period::Day(date) => format!("clipped_{}.tif", date.format("%Y%m%d")),
        }
    }
}

/// Returns the name without its `.gz` suffix, or `None` if it has none.
pub fn strip_compression_suffix(name: &str) -> Option<&str> {
    name.strip_suffix(COMPRESSION_SUFFIX)
        .filter(|stem| !stem.is_empty())
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn should_build_monthly_url_and_names() {
        let asset = RemoteAsset::for_period(
            Period::Month { year: 2001, month: 3 },
            &Catalog::default(),
        );

        assert_eq!(asset.file_name, "chirps-v2.0.2001.03.tif.gz");
        assert_eq!(
            asset.url,
            "https://data.chc.ucsb.edu/products/CHIRPS-2.0/global_2-monthly/tifs/chirps-v2.0.2001.03.tif.gz"
        );
        assert_eq!(asset.decompressed_name(), "chirps-v2.0.2001.03.tif");
        assert_eq!(asset.clipped_name(), "clipped_2001_03.tif");
    }

    #[test]
    fn should_embed_year_segment_in_daily_url() {
        let day = NaiveDate::from_ymd_opt(2021, 5, 5).unwrap();
        let asset = RemoteAsset::for_period(Period::Day(day), &Catalog::default());

        assert_eq!(asset.file_name, "chirps-v2.0.2021.05.05.tif.gz");
        assert_eq!(
            asset.url,
            "https://data.chc.ucsb.edu/products/CHIRPS-2.0/global_daily/tifs/p05/2021/chirps-v2.0.2021.05.05.tif.gz"
        );
        assert_eq!(asset.decompressed_name(), "chirps-v2.0.2021.05.05.tif");
        assert_eq!(asset.clipped_name(), "clipped_20210505.tif");
    }

    #[test]
    fn should_tolerate_slashes_in_catalog() {
        let catalog = Catalog {
            base_url: "http://localhost:8080/".to_string(),
            monthly_path: "/global_monthly/tifs/".to_string(),
            ..Catalog::default()
        };
        let asset = RemoteAsset::for_period(Period::Month { year: 1999, month: 12 }, &catalog);

        assert_eq!(
            asset.url,
            "http://localhost:8080/global_monthly/tifs/chirps-v2.0.1999.12.tif.gz"
        );
    }

    #[test]
    fn should_only_strip_gz_suffix() {
        assert_eq!(strip_compression_suffix("a.tif.gz"), Some("a.tif"));
        assert_eq!(strip_compression_suffix("a.tif"), None);
        assert_eq!(strip_compression_suffix(".gz"), None);
    }
}
