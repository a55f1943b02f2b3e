//! Masking and cropping a raster to a region.

use geo::{AffineOps, AffineTransform, BoundingRect, Contains, Point, Polygon};
use tracing::debug;

use super::{window_transform, Raster, Samples};
use crate::{
    error::{Error, Result},
    region::Region,
};

// Absorbs float noise when a region edge lies exactly on a pixel edge.
const EDGE_EPSILON: f64 = 1e-9;

/// Clipped pixels with the geometry of the clip window.
#[derive(Debug, Clone, PartialEq)]
pub struct ClipResult {
    pub samples: Samples,
    pub transform: AffineTransform<f64>,
    pub width: u32,
    pub height: u32,
}

/// Pixel window in raster coordinates, end exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Window {
    col_off: usize,
    row_off: usize,
    width: usize,
    height: usize,
}

/// Crops `raster` to the bounding window of `region` and masks every pixel
/// whose center lies outside the polygon.
///
/// The region is reprojected into the raster's CRS first. A region that
/// covers no pixel center yields `GeometryDisjoint`.
pub fn clip(raster: &Raster, region: &Region) -> Result<ClipResult> {
    let meta = &raster.meta;
    let local = region.reproject(meta.crs)?;

    let inverse = meta
        .transform
        .inverse()
        .ok_or_else(|| Error::UnreadableRaster("transform is not invertible".to_string()))?;
    // Polygon in (col, row) space; pixel (c, r) has its center at (c + 0.5, r + 0.5).
    let footprint = local.polygon().affine_transform(&inverse);

    let window = window_for(&footprint, meta.width, meta.height)?;
    debug!(
        from = %region.crs(),
        to = %meta.crs,
        col_off = window.col_off,
        row_off = window.row_off,
        width = window.width,
        height = window.height,
        "Clip window"
    );

    let mut inside = 0usize;
    let keep: Vec<bool> = (0..window.height)
        .flat_map(|r| (0..window.width).map(move |c| (c, r)))
        .map(|(c, r)| {
            let center = Point::new(
                (window.col_off + c) as f64 + 0.5,
                (window.row_off + r) as f64 + 0.5,
            );
            let hit = footprint.contains(&center);
            inside += hit as usize;
            hit
        })
        .collect();

    if inside == 0 {
        return Err(Error::GeometryDisjoint);
    }

    let fill = meta.nodata_value().unwrap_or(0.0);
    let samples = crop_samples(
        &raster.samples,
        meta.width as usize,
        meta.bands as usize,
        window,
        &keep,
        fill,
    );

    Ok(ClipResult {
        samples,
        transform: window_transform(
            &meta.transform,
            window.col_off as f64,
            window.row_off as f64,
        ),
        width: window.width as u32,
        height: window.height as u32,
    })
}

fn window_for(footprint: &Polygon<f64>, width: u32, height: u32) -> Result<Window> {
    let rect = footprint.bounding_rect().ok_or(Error::GeometryDisjoint)?;
    let (min, max) = (rect.min(), rect.max());

    let col_start = (min.x + EDGE_EPSILON).floor().max(0.0);
    let row_start = (min.y + EDGE_EPSILON).floor().max(0.0);
    let col_end = (max.x - EDGE_EPSILON).ceil().min(width as f64);
    let row_end = (max.y - EDGE_EPSILON).ceil().min(height as f64);

    if col_end <= col_start || row_end <= row_start {
        return Err(Error::GeometryDisjoint);
    }

    Ok(Window {
        col_off: col_start as usize,
        row_off: row_start as usize,
        width: (col_end - col_start) as usize,
        height: (row_end - row_start) as usize,
    })
}

fn crop<T: Copy>(
    data: &[T],
    src_width: usize,
    bands: usize,
    window: Window,
    keep: &[bool],
    fill: T,
) -> Vec<T> {
    let mut out = Vec::with_capacity(window.width * window.height * bands);
    for r in 0..window.height {
        let row_start = ((window.row_off + r) * src_width + window.col_off) * bands;
        let row = &data[row_start..row_start + window.width * bands];
        for (c, pixel) in row.chunks_exact(bands).enumerate() {
            if keep[r * window.width + c] {
                out.extend_from_slice(pixel);
            } else {
                out.extend(std::iter::repeat(fill).take(bands));
            }
        }
    }
    out
}

fn crop_samples(
    samples: &Samples,
    src_width: usize,
    bands: usize,
    window: Window,
    keep: &[bool],
    fill: f64,
) -> Samples {
    match samples {
        Samples::U8(v) => Samples::U8(crop(v, src_width, bands, window, keep, fill as u8)),
        Samples::I8(v) => Samples::I8(crop(v, src_width, bands, window, keep, fill as i8)),
        Samples::U16(v) => Samples::U16(crop(v, src_width, bands, window, keep, fill as u16)),
        Samples::I16(v) => Samples::I16(crop(v, src_width, bands, window, keep, fill as i16)),
        Samples::U32(v) => Samples::U32(crop(v, src_width, bands, window, keep, fill as u32)),
        Samples::I32(v) => Samples::I32(crop(v, src_width, bands, window, keep, fill as i32)),
        Samples::U64(v) => Samples::U64(crop(v, src_width, bands, window, keep, fill as u64)),
        Samples::I64(v) => Samples::I64(crop(v, src_width, bands, window, keep, fill as i64)),
        Samples::F32(v) => Samples::F32(crop(v, src_width, bands, window, keep, fill as f32)),
        Samples::F64(v) => Samples::F64(crop(v, src_width, bands, window, keep, fill)),
    }
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        projection::Crs,
        raster::{north_up, tests::sample_raster, RasterMeta, SampleType},
        region::BoundingBox,
    };
    use approx::assert_abs_diff_eq;
    use geo::BoundingRect;

    fn values(result: &ClipResult) -> &[f32] {
        match &result.samples {
            Samples::F32(v) => v,
            other => panic!("unexpected samples {:?}", other.sample_type()),
        }
    }

    #[test]
    fn should_crop_to_bounding_box_window() {
        let raster = sample_raster();
        let region = Region::from_bbox(BoundingBox::TARIJA, Crs::WGS84).unwrap();

        let result = clip(&raster, &region).unwrap();

        assert_eq!((result.width, result.height), (30, 30));
        assert_abs_diff_eq!(result.transform.xoff(), -64.5, epsilon = 1e-9);
        assert_abs_diff_eq!(result.transform.yoff(), -20.5, epsilon = 1e-9);
        assert_eq!(result.transform.a(), raster.meta.transform.a());
        assert_eq!(result.transform.e(), raster.meta.transform.e());

        // Upper-left pixel of the window is source pixel (110, 110).
        let data = values(&result);
        assert_eq!(data.len(), 900);
        assert_eq!(data[0], (110 * 200 + 110) as f32);
        assert_eq!(data[899], (139 * 200 + 139) as f32);
    }

    #[test]
    fn should_be_a_no_op_when_region_covers_raster() {
        let raster = sample_raster();
        let everything = Region::from_bbox(
            BoundingBox {
                lon_min: -80.0,
                lon_max: -50.0,
                lat_min: -40.0,
                lat_max: 0.0,
            },
            Crs::WGS84,
        )
        .unwrap();

        let result = clip(&raster, &everything).unwrap();

        assert_eq!(result.width, raster.meta.width);
        assert_eq!(result.height, raster.meta.height);
        assert_eq!(result.transform, raster.meta.transform);
        assert_eq!(result.samples, raster.samples);
    }

    #[test]
    fn should_report_disjoint_region() {
        let raster = sample_raster();
        let elsewhere = Region::from_bbox(
            BoundingBox {
                lon_min: 10.0,
                lon_max: 11.0,
                lat_min: 45.0,
                lat_max: 46.0,
            },
            Crs::WGS84,
        )
        .unwrap();

        assert!(matches!(
            clip(&raster, &elsewhere),
            Err(Error::GeometryDisjoint)
        ));
    }

    #[test]
    fn should_report_region_missing_every_pixel_center() {
        let raster = sample_raster();
        // Sliver inside one pixel, away from its center.
        let sliver = Region::from_bbox(
            BoundingBox {
                lon_min: -69.999,
                lon_max: -69.998,
                lat_min: -15.002,
                lat_max: -15.001,
            },
            Crs::WGS84,
        )
        .unwrap();

        assert!(matches!(clip(&raster, &sliver), Err(Error::GeometryDisjoint)));
    }

    #[test]
    fn should_fill_pixels_outside_polygon_with_nodata() {
        let raster = sample_raster();
        // Right triangle over the upper-left 10 x 10 pixels.
        let triangle = Region::new(
            vec![(-70.0, -15.0), (-69.5, -15.0), (-70.0, -15.5)],
            Crs::WGS84,
        )
        .unwrap();

        let result = clip(&raster, &triangle).unwrap();
        let data = values(&result);

        assert_eq!((result.width, result.height), (10, 10));
        // Pixel (c, r) is inside when c + r < 9.
        assert_eq!(data[0], 0.0);
        assert_eq!(data[8 * 10], (8 * 200) as f32);
        assert_eq!(data[10 + 7], (200 + 7) as f32);
        assert_eq!(data[9 * 10 + 1], -9999.0);
        assert_eq!(data[9 * 10 + 9], -9999.0);
    }

    #[test]
    fn should_reproject_region_into_raster_crs() {
        let utm = Crs::from_epsg(32720).unwrap();
        let region = Region::from_bbox(BoundingBox::TARIJA, Crs::WGS84).unwrap();
        let rect = region.reproject(utm).unwrap().polygon().bounding_rect().unwrap();
        let (min_x, min_y, max_x, max_y) = (rect.min().x, rect.min().y, rect.max().x, rect.max().y);

        // 1 km UTM grid with a margin around the region.
        let origin_x = (min_x / 1000.0).floor() * 1000.0 - 5000.0;
        let origin_y = (max_y / 1000.0).ceil() * 1000.0 + 5000.0;
        let width = ((max_x - origin_x) / 1000.0).ceil() as u32 + 5;
        let height = ((origin_y - min_y) / 1000.0).ceil() as u32 + 5;
        let raster = Raster {
            meta: RasterMeta::new(
                width,
                height,
                1,
                SampleType::U16,
                north_up(origin_x, origin_y, 1000.0, 1000.0),
                utm,
            ),
            samples: Samples::U16(vec![7; (width * height) as usize]),
        };

        let result = clip(&raster, &region).unwrap();

        assert!(result.width < width && result.width > 100);
        assert!(result.height < height && result.height > 100);
        assert!(result.transform.xoff() >= origin_x);
        assert!(result.transform.yoff() <= origin_y);
        match result.samples {
            // No nodata declared, so masked pixels become zero.
            Samples::U16(v) => assert!(v.iter().all(|&s| s == 7 || s == 0)),
            other => panic!("unexpected samples {:?}", other.sample_type()),
        }
    }

    #[test]
    fn should_crop_interleaved_bands() {
        let meta = RasterMeta::new(
            4,
            2,
            3,
            SampleType::U8,
            north_up(0.0, 2.0, 1.0, 1.0),
            Crs::WGS84,
        );
        let raster = Raster {
            meta,
            samples: Samples::U8((0..24).collect()),
        };
        // Covers columns 1..3 of both rows.
        let region = Region::from_bbox(
            BoundingBox {
                lon_min: 1.0,
                lon_max: 3.0,
                lat_min: 0.0,
                lat_max: 2.0,
            },
            Crs::WGS84,
        )
        .unwrap();

        let result = clip(&raster, &region).unwrap();

        assert_eq!((result.width, result.height), (2, 2));
        assert_eq!(
            result.samples,
            Samples::U8(vec![3, 4, 5, 6, 7, 8, 15, 16, 17, 18, 19, 20])
        );
    }
}
