//! Coordinate reference systems and point transforms (pure Rust, proj4rs).

use std::{fmt, str::FromStr};

use proj4rs::{proj::Proj, transform::transform};

use crate::error::{Error, Result};

pub const EPSG_WGS84: u32 = 4326;
pub const EPSG_WEB_MERCATOR: u32 = 3857;

/// A coordinate reference system identified by its EPSG code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Crs(u32);

impl Crs {
    pub const WGS84: Crs = Crs(EPSG_WGS84);

    /// Fails with `InvalidCrs` for codes without a known definition.
    pub fn from_epsg(code: u32) -> Result<Self> {
        if proj_string(code).is_none() {
            return Err(Error::InvalidCrs(format!("EPSG:{} not supported", code)));
        }
        Ok(Crs(code))
    }

    pub fn epsg(&self) -> u32 {
        self.0
    }

    /// Geographic CRS use degrees; proj4rs expects radians for them.
    pub fn is_geographic(&self) -> bool {
        matches!(self.0, 4326 | 4269 | 4258 | 4283)
    }
}

impl Default for Crs {
    fn default() -> Self {
        Crs::WGS84
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.0)
    }
}

impl FromStr for Crs {
    type Err = Error;

    /// Accepts `EPSG:4326`, `epsg:4326` or a bare `4326`.
    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let code = match trimmed.split_once(':') {
            Some((authority, code)) if authority.eq_ignore_ascii_case("epsg") => code,
            Some(_) => return Err(Error::InvalidCrs(format!("unknown authority in `{}`", s))),
            None => trimmed,
        };
        let code = code
            .trim()
            .parse::<u32>()
            .map_err(|_| Error::InvalidCrs(format!("cannot parse `{}`", s)))?;

        Crs::from_epsg(code)
    }
}

/// Returns the proj definition of an EPSG code, if known.
pub fn proj_string(code: u32) -> Option<String> {
    let definition = match code {
        EPSG_WGS84 => "+proj=longlat +datum=WGS84 +no_defs".to_string(),
        // NAD83, ETRS89 and GDA94 are treated as coincident with WGS84.
        4269 | 4258 | 4283 => "+proj=longlat +ellps=GRS80 +towgs84=0,0,0,0,0,0,0 +no_defs".to_string(),
        EPSG_WEB_MERCATOR => "+proj=merc +a=6378137 +b=6378137 +lat_ts=0 +lon_0=0 +x_0=0 +y_0=0 +k=1 +units=m +no_defs"
            .to_string(),
        32601..=32660 => format!(
            "+proj=utm +zone={} +datum=WGS84 +units=m +no_defs",
            code - 32600
        ),
        32701..=32760 => format!(
            "+proj=utm +zone={} +south +datum=WGS84 +units=m +no_defs",
            code - 32700
        ),
        _ => return None,
    };
    Some(definition)
}

/// Reusable transform between two CRS.
pub struct CoordTransformer {
    source: Crs,
    target: Crs,
    source_proj: Proj,
    target_proj: Proj,
}

impl fmt::Debug for CoordTransformer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoordTransformer")
            .field("source", &self.source)
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

impl CoordTransformer {
    pub fn new(source: Crs, target: Crs) -> Result<Self> {
        Ok(Self {
            source,
            target,
            source_proj: build_proj(source)?,
            target_proj: build_proj(target)?,
        })
    }

    pub fn transform(&self, x: f64, y: f64) -> Result<(f64, f64)> {
        let mut point = if self.source.is_geographic() {
            (x.to_radians(), y.to_radians(), 0.0)
        } else {
            (x, y, 0.0)
        };

        transform(&self.source_proj, &self.target_proj, &mut point).map_err(|e| {
            Error::InvalidCrs(format!(
                "cannot transform ({}, {}) from {} to {}: {:?}",
                x, y, self.source, self.target, e
            ))
        })?;

        let (out_x, out_y) = if self.target.is_geographic() {
            (point.0.to_degrees(), point.1.to_degrees())
        } else {
            (point.0, point.1)
        };

        if !out_x.is_finite() || !out_y.is_finite() {
            return Err(Error::InvalidCrs(format!(
                "({}, {}) has no finite image from {} in {}",
                x, y, self.source, self.target
            )));
        }

        Ok((out_x, out_y))
    }
}

fn build_proj(crs: Crs) -> Result<Proj> {
    let definition = proj_string(crs.epsg())
        .ok_or_else(|| Error::InvalidCrs(format!("{} not supported", crs)))?;
    Proj::from_proj_string(&definition)
        .map_err(|e| Error::InvalidCrs(format!("invalid projection {}: {:?}", crs, e)))
}

// -- Tests -------------------------------------------------------------------
