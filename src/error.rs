//! Error types for downloading, extracting and clipping rasters.

use thiserror::Error;

/// Errors that can occur while processing periods.
///
/// Per-period errors are downgraded to a skip by the pipeline. Fatal errors
/// (see [`Error::is_fatal`]) abort the run.
#[derive(Debug, Error)]
pub enum Error {
    /// The server answered with something other than 200.
    #[error("asset unavailable (HTTP {status})")]
    FetchFailure {
        /// HTTP status code returned by the server.
        status: u16,
    },

    /// The connection failed or the body stream broke off.
    #[error("transfer failed: {0}")]
    Transfer(String),

    /// The compressed file could not be decoded.
    #[error("corrupt archive: {0}")]
    CorruptArchive(String),

    /// The decompressed file is not a usable GeoTIFF.
    #[error("unreadable raster: {0}")]
    UnreadableRaster(String),

    /// The region does not overlap a single pixel of the raster.
    #[error("region does not intersect the raster extent")]
    GeometryDisjoint,

    /// A CRS could not be resolved or transformed into.
    #[error("invalid CRS: {0}")]
    InvalidCrs(String),

    /// The region ring is empty, degenerate or self-intersecting.
    #[error("invalid region: {0}")]
    InvalidRegion(String),

    /// I/O error on the save directory.
    #[error("filesystem error: {0}")]
    Filesystem(#[from] std::io::Error),
}

impl Error {
    /// Configuration-level errors that should stop the whole run.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::InvalidCrs(_) | Error::InvalidRegion(_) | Error::Filesystem(_)
        )
    }
}

impl From<tiff::TiffError> for Error {
    fn from(e: tiff::TiffError) -> Self {
        Error::UnreadableRaster(e.to_string())
    }
}

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, Error>;

// -- Tests -------------------------------------------------------------------
