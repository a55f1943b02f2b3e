//! The region of interest: a closed polygon ring tagged with its CRS.

use std::fmt;

use geo::{
    algorithm::line_intersection::{line_intersection, LineIntersection},
    Area, Coord, Line, LineString, MapCoords, Polygon,
};

use crate::{
    error::{Error, Result},
    projection::{CoordTransformer, Crs},
};

/// Axis-aligned box in the order the command line takes it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub lon_min: f64,
    pub lon_max: f64,
    pub lat_min: f64,
    pub lat_max: f64,
}

impl BoundingBox {
    /// Tarija, Bolivia.
    pub const TARIJA: BoundingBox = BoundingBox {
        lon_min: -64.5,
        lon_max: -63.0,
        lat_min: -22.0,
        lat_max: -20.5,
    };
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{},{}",
            self.lon_min, self.lon_max, self.lat_min, self.lat_max
        )
    }
}

impl std::str::FromStr for BoundingBox {
    type Err = String;

    /// Parses `lon_min,lon_max,lat_min,lat_max`.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let values = s
            .split(',')
            .map(|v| v.trim().parse::<f64>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| format!("invalid bounding box `{}`: {}", s, e))?;

        match values[..] {
            [lon_min, lon_max, lat_min, lat_max] => Ok(BoundingBox {
                lon_min,
                lon_max,
                lat_min,
                lat_max,
            }),
            _ => Err(format!(
                "bounding box needs 4 values (lon_min,lon_max,lat_min,lat_max), got {}",
                values.len()
            )),
        }
    }
}

/// An immutable polygon. Reprojection always yields a new value.
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    polygon: Polygon<f64>,
    crs: Crs,
}

impl Region {
    /// Validates the ring and closes it when the last vertex differs from
    /// the first.
    pub fn new(ring: Vec<(f64, f64)>, crs: Crs) -> Result<Self> {
        if ring.iter().any(|(x, y)| !x.is_finite() || !y.is_finite()) {
            return Err(Error::InvalidRegion("ring has non-finite coordinates".into()));
        }

        let polygon = Polygon::new(LineString::from(ring), vec![]);
        let vertices = polygon.exterior().0.len();
        if vertices < 4 {
            return Err(Error::InvalidRegion(format!(
                "ring needs at least 3 distinct vertices, got {}",
                vertices.saturating_sub(1)
            )));
        }
        if polygon.unsigned_area() <= f64::EPSILON {
            return Err(Error::InvalidRegion("ring has zero area".into()));
        }
        if is_self_intersecting(polygon.exterior()) {
            return Err(Error::InvalidRegion("ring is self-intersecting".into()));
        }

        Ok(Self { polygon, crs })
    }

    pub fn from_bbox(bbox: BoundingBox, crs: Crs) -> Result<Self> {
        if !(bbox.lon_min < bbox.lon_max && bbox.lat_min < bbox.lat_max) {
            return Err(Error::InvalidRegion(format!(
                "bounding box {:?} must have min < max on both axes",
                bbox
            )));
        }

        Region::new(
            vec![
                (bbox.lon_min, bbox.lat_min),
                (bbox.lon_max, bbox.lat_min),
                (bbox.lon_max, bbox.lat_max),
                (bbox.lon_min, bbox.lat_max),
            ],
            crs,
        )
    }

    pub fn crs(&self) -> Crs {
        self.crs
    }

    /// Closed polygon without holes.
    pub fn polygon(&self) -> &Polygon<f64> {
        &self.polygon
    }

    /// Returns a copy of this region expressed in `target`.
    pub fn reproject(&self, target: Crs) -> Result<Region> {
        if target == self.crs {
            return Ok(self.clone());
        }

        let transformer = CoordTransformer::new(self.crs, target)?;
        let polygon = self.polygon.try_map_coords(|c| {
            transformer
                .transform(c.x, c.y)
                .map(|(x, y)| Coord { x, y })
        })?;

        Ok(Region {
            polygon,
            crs: target,
        })
    }
}

/// True when two non-neighbouring edges touch, or neighbouring edges fold
/// back over each other.
fn is_self_intersecting(ring: &LineString<f64>) -> bool {
    let edges: Vec<Line<f64>> = ring.lines().collect();
    let n = edges.len();

    for i in 0..n {
        for j in (i + 1)..n {
            let adjacent = j == i + 1 || (i == 0 && j == n - 1);
            match line_intersection(edges[i], edges[j]) {
                None => {}
                Some(LineIntersection::SinglePoint { .. }) if adjacent => {}
                Some(_) => return true,
            }
        }
    }
    false
}

// -- Tests -------------------------------------------------------------------
