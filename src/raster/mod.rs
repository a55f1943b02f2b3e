//! GeoTIFF rasters: reading, clipping to a region and writing the clip.

pub mod clip;
pub mod write;

pub use clip::{clip, ClipResult};
pub use write::write;

use std::{fs::File, io::BufReader, path::Path};

use geo::{AffineTransform, Coord};
use tiff::{
    decoder::{Decoder, DecodingResult, Limits},
    tags::Tag,
};

use crate::{
    error::{Error, Result},
    projection::Crs,
};

pub(crate) const MODEL_PIXEL_SCALE: u16 = 33550;
pub(crate) const MODEL_TIEPOINT: u16 = 33922;
pub(crate) const MODEL_TRANSFORMATION: u16 = 34264;
pub(crate) const GEO_KEY_DIRECTORY: u16 = 34735;
pub(crate) const GEO_DOUBLE_PARAMS: u16 = 34736;
pub(crate) const GEO_ASCII_PARAMS: u16 = 34737;
pub(crate) const GDAL_NODATA: u16 = 42113;

pub(crate) const GT_MODEL_TYPE_KEY: u16 = 1024;
pub(crate) const GT_RASTER_TYPE_KEY: u16 = 1025;
pub(crate) const GEOGRAPHIC_TYPE_KEY: u16 = 2048;
pub(crate) const PROJECTED_CS_TYPE_KEY: u16 = 3072;

const MODEL_TYPE_PROJECTED: u16 = 1;
const MODEL_TYPE_GEOGRAPHIC: u16 = 2;
pub(crate) const RASTER_PIXEL_IS_AREA: u16 = 1;
const RASTER_PIXEL_IS_POINT: u16 = 2;

/// Upper-left corner and pixel size to a pixel (col, row) → world (x, y)
/// transform.
pub fn north_up(
    origin_x: f64,
    origin_y: f64,
    pixel_width: f64,
    pixel_height: f64,
) -> AffineTransform<f64> {
    AffineTransform::new(pixel_width, 0.0, origin_x, 0.0, -pixel_height, origin_y)
}

/// Transform of the window whose upper-left pixel is (col, row).
pub fn window_transform(t: &AffineTransform<f64>, col: f64, row: f64) -> AffineTransform<f64> {
    let origin = t.apply(Coord { x: col, y: row });
    AffineTransform::new(t.a(), t.b(), origin.x, t.d(), t.e(), origin.y)
}

pub(crate) fn is_north_up(t: &AffineTransform<f64>) -> bool {
    t.b() == 0.0 && t.d() == 0.0
}

/// Numeric type of a raster's samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleType {
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    U64,
    I64,
    F32,
    F64,
}

/// Band-interleaved pixel values.
#[derive(Debug, Clone, PartialEq)]
pub enum Samples {
    U8(Vec<u8>),
    I8(Vec<i8>),
    U16(Vec<u16>),
    I16(Vec<i16>),
    U32(Vec<u32>),
    I32(Vec<i32>),
    U64(Vec<u64>),
    I64(Vec<i64>),
    F32(Vec<f32>),
    F64(Vec<f64>),
}

impl Samples {
    pub fn sample_type(&self) -> SampleType {
        match self {
            Samples::U8(_) => SampleType::U8,
            Samples::I8(_) => SampleType::I8,
            Samples::U16(_) => SampleType::U16,
            Samples::I16(_) => SampleType::I16,
            Samples::U32(_) => SampleType::U32,
            Samples::I32(_) => SampleType::I32,
            Samples::U64(_) => SampleType::U64,
            Samples::I64(_) => SampleType::I64,
            Samples::F32(_) => SampleType::F32,
            Samples::F64(_) => SampleType::F64,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Samples::U8(v) => v.len(),
            Samples::I8(v) => v.len(),
            Samples::U16(v) => v.len(),
            Samples::I16(v) => v.len(),
            Samples::U32(v) => v.len(),
            Samples::I32(v) => v.len(),
            Samples::U64(v) => v.len(),
            Samples::I64(v) => v.len(),
            Samples::F32(v) => v.len(),
            Samples::F64(v) => v.len(),
        }
    }
}

impl From<DecodingResult> for Samples {
    fn from(result: DecodingResult) -> Self {
        match result {
            DecodingResult::U8(v) => Samples::U8(v),
            DecodingResult::I8(v) => Samples::I8(v),
            DecodingResult::U16(v) => Samples::U16(v),
            DecodingResult::I16(v) => Samples::I16(v),
            DecodingResult::U32(v) => Samples::U32(v),
            DecodingResult::I32(v) => Samples::I32(v),
            DecodingResult::U64(v) => Samples::U64(v),
            DecodingResult::I64(v) => Samples::I64(v),
            DecodingResult::F32(v) => Samples::F32(v),
            DecodingResult::F64(v) => Samples::F64(v),
        }
    }
}

/// Everything needed to write a sibling GeoTIFF of the same kind.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterMeta {
    pub width: u32,
    pub height: u32,
    pub bands: u16,
    pub sample_type: SampleType,
    pub transform: AffineTransform<f64>,
    pub crs: Crs,
    /// GDAL_NODATA value as stored in the file.
    pub nodata: Option<String>,
    pub geo_keys: Vec<u16>,
    pub geo_doubles: Option<Vec<f64>>,
    pub geo_ascii: Option<String>,
}

impl RasterMeta {
    /// Metadata for a new raster; the geo key directory is derived from `crs`.
    #[cfg(test)]
    pub fn new(
        width: u32,
        height: u32,
        bands: u16,
        sample_type: SampleType,
        transform: AffineTransform<f64>,
        crs: Crs,
    ) -> Self {
        Self {
            width,
            height,
            bands,
            sample_type,
            transform,
            crs,
            nodata: None,
            geo_keys: geo_keys_for(crs),
            geo_doubles: None,
            geo_ascii: None,
        }
    }

    #[cfg(test)]
    pub fn with_nodata(mut self, nodata: f64) -> Self {
        self.nodata = Some(nodata.to_string());
        self
    }

    pub fn nodata_value(&self) -> Option<f64> {
        self.nodata.as_deref().and_then(|v| v.parse().ok())
    }
}

/// A decoded GeoTIFF held in memory.
#[derive(Debug, Clone, PartialEq)]
pub struct Raster {
    pub meta: RasterMeta,
    pub samples: Samples,
}

impl Raster {
    /// Read a GeoTIFF. Anything that is not a georeferenced TIFF is
    /// `UnreadableRaster`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| Error::UnreadableRaster(format!("{}: {}", path.display(), e)))?;
        let mut decoder = Decoder::new(BufReader::new(file))?;

        // CHIRPS global grids are 7200 x 2000 f32, above the default limits.
        let mut limits = Limits::default();
        limits.decoding_buffer_size = 1024 * 1024 * 1024;
        limits.intermediate_buffer_size = 1024 * 1024 * 1024;
        limits.ifd_value_size = 1024 * 1024 * 1024;
        decoder = decoder.with_limits(limits);

        let (width, height) = decoder.dimensions()?;
        let bands = match decoder.find_tag(Tag::SamplesPerPixel)? {
            Some(value) => value.into_u16()?,
            None => 1,
        };

        let geo_keys = decoder
            .get_tag_u16_vec(Tag::Unknown(GEO_KEY_DIRECTORY))
            .map_err(|_| {
                Error::UnreadableRaster(format!("{}: missing GeoKeyDirectory", path.display()))
            })?;
        let crs = crs_from_geo_keys(&geo_keys)?;
        let transform = read_transform(&mut decoder, &geo_keys)
            .ok_or_else(|| Error::UnreadableRaster(format!("{}: missing georeferencing", path.display())))?;

        let geo_doubles = decoder.get_tag_f64_vec(Tag::Unknown(GEO_DOUBLE_PARAMS)).ok();
        let geo_ascii = decoder.get_tag_ascii_string(Tag::Unknown(GEO_ASCII_PARAMS)).ok();
        let nodata = decoder
            .get_tag_ascii_string(Tag::Unknown(GDAL_NODATA))
            .ok()
            .map(|v| v.trim_matches(|c: char| c == '\0' || c.is_whitespace()).to_string())
            .filter(|v| !v.is_empty());

        let samples = Samples::from(decoder.read_image()?);
        let expected = width as usize * height as usize * bands as usize;
        if samples.len() != expected {
            return Err(Error::UnreadableRaster(format!(
                "{}: expected {} samples, decoded {}",
                path.display(),
                expected,
                samples.len()
            )));
        }

        let meta = RasterMeta {
            width,
            height,
            bands,
            sample_type: samples.sample_type(),
            transform,
            crs,
            nodata,
            geo_keys,
            geo_doubles,
            geo_ascii,
        };
        write::check_layout(&meta)?;

        Ok(Self { meta, samples })
    }
}

fn read_transform<R: std::io::Read + std::io::Seek>(
    decoder: &mut Decoder<R>,
    geo_keys: &[u16],
) -> Option<AffineTransform<f64>> {
    let transform = if let Ok(m) = decoder.get_tag_f64_vec(Tag::Unknown(MODEL_TRANSFORMATION)) {
        if m.len() < 16 {
            return None;
        }
        AffineTransform::new(m[0], m[1], m[3], m[4], m[5], m[7])
    } else {
        let tiepoint = decoder.get_tag_f64_vec(Tag::Unknown(MODEL_TIEPOINT)).ok()?;
        let scale = decoder.get_tag_f64_vec(Tag::Unknown(MODEL_PIXEL_SCALE)).ok()?;
        if tiepoint.len() < 6 || scale.len() < 2 {
            return None;
        }
        // Tiepoint: [i, j, k, x, y, z], raster (i, j) sits at model (x, y).
        let (i, j, x, y) = (tiepoint[0], tiepoint[1], tiepoint[3], tiepoint[4]);
        north_up(x - i * scale[0], y + j * scale[1], scale[0], scale[1])
    };

    // Point rasters anchor coordinates at pixel centers.
    if geo_key(geo_keys, GT_RASTER_TYPE_KEY) == Some(RASTER_PIXEL_IS_POINT) {
        return Some(window_transform(&transform, -0.5, -0.5));
    }
    Some(transform)
}

/// Inline value of a key in a GeoKeyDirectory.
pub(crate) fn geo_key(keys: &[u16], id: u16) -> Option<u16> {
    let count = *keys.get(3)? as usize;
    keys.get(4..)?
        .chunks_exact(4)
        .take(count)
        .find(|entry| entry[0] == id && entry[1] == 0)
        .map(|entry| entry[3])
}

fn crs_from_geo_keys(keys: &[u16]) -> Result<Crs> {
    let projected = geo_key(keys, PROJECTED_CS_TYPE_KEY);
    let geographic = geo_key(keys, GEOGRAPHIC_TYPE_KEY);

    let code = match geo_key(keys, GT_MODEL_TYPE_KEY) {
        Some(MODEL_TYPE_GEOGRAPHIC) => geographic,
        Some(MODEL_TYPE_PROJECTED) => projected,
        _ => projected.or(geographic),
    };

    match code {
        Some(code) => Crs::from_epsg(code as u32),
        None => Err(Error::UnreadableRaster(
            "GeoKeyDirectory has no EPSG code".to_string(),
        )),
    }
}

/// Minimal GeoKeyDirectory naming `crs` by EPSG code.
#[cfg(test)]
#[rustfmt::skip]
pub(crate) fn geo_keys_for(crs: Crs) -> Vec<u16> {
    let (model_type, crs_key) = if crs.is_geographic() {
        (MODEL_TYPE_GEOGRAPHIC, GEOGRAPHIC_TYPE_KEY)
    } else {
        (MODEL_TYPE_PROJECTED, PROJECTED_CS_TYPE_KEY)
    };

    vec![
        1, 1, 0, 3,
        GT_MODEL_TYPE_KEY, 0, 1, model_type,
        GT_RASTER_TYPE_KEY, 0, 1, RASTER_PIXEL_IS_AREA,
        crs_key, 0, 1, crs.epsg() as u16,
    ]
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use tempfile::TempDir;

    /// 0.05 degree grid from (-70, -15) to (-60, -25) with values 0..n.
    pub(crate) fn sample_raster() -> Raster {
        let (width, height) = (200, 200);
        let meta = RasterMeta::new(
            width,
            height,
            1,
            SampleType::F32,
            north_up(-70.0, -15.0, 0.05, 0.05),
            Crs::WGS84,
        )
        .with_nodata(-9999.0);
        let samples = Samples::F32((0..width * height).map(|v| v as f32).collect());

        Raster { meta, samples }
    }

    /// Writes `raster` as a full-size GeoTIFF at `path`.
    pub(crate) fn write_raster(path: &Path, raster: &Raster) {
        let full = ClipResult {
            samples: raster.samples.clone(),
            transform: raster.meta.transform,
            width: raster.meta.width,
            height: raster.meta.height,
        };
        write(path, &full, &raster.meta).unwrap();
    }

    #[test]
    fn should_invert_affine() {
        let t = north_up(-70.0, -15.0, 0.05, 0.05);
        let inv = t.inverse().unwrap();

        let world = t.apply(Coord { x: 110.0, y: 140.0 });
        assert_abs_diff_eq!(world.x, -64.5, epsilon = 1e-9);
        assert_abs_diff_eq!(world.y, -22.0, epsilon = 1e-9);
        let pixel = inv.apply(world);
        assert_abs_diff_eq!(pixel.x, 110.0, epsilon = 1e-9);
        assert_abs_diff_eq!(pixel.y, 140.0, epsilon = 1e-9);

        assert!(north_up(0.0, 0.0, 0.0, 1.0).inverse().is_none());
    }

    #[test]
    fn should_read_back_written_geotiff() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("full.tif");
        let raster = sample_raster();

        write_raster(&path, &raster);
        let read = Raster::open(&path).unwrap();

        assert_eq!(read.meta.width, 200);
        assert_eq!(read.meta.height, 200);
        assert_eq!(read.meta.bands, 1);
        assert_eq!(read.meta.sample_type, SampleType::F32);
        assert_eq!(read.meta.crs, Crs::WGS84);
        assert_eq!(read.meta.nodata_value(), Some(-9999.0));
        assert_abs_diff_eq!(read.meta.transform.xoff(), -70.0, epsilon = 1e-12);
        assert_abs_diff_eq!(read.meta.transform.e(), -0.05, epsilon = 1e-12);
        assert_eq!(read.samples, raster.samples);
    }

    #[test]
    fn should_reject_non_tiff_files() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("noise.tif");
        std::fs::write(&path, b"definitely not a tiff").unwrap();

        assert!(matches!(Raster::open(&path), Err(Error::UnreadableRaster(_))));
        assert!(matches!(
            Raster::open(dir.path().join("missing.tif")),
            Err(Error::UnreadableRaster(_))
        ));
    }

    #[test]
    fn should_shift_window_origin_only() {
        let t = north_up(-70.0, -15.0, 0.05, 0.05);

        let w = window_transform(&t, 110.0, 30.0);

        assert_abs_diff_eq!(w.xoff(), -64.5, epsilon = 1e-9);
        assert_abs_diff_eq!(w.yoff(), -16.5, epsilon = 1e-9);
        assert_eq!((w.a(), w.e()), (t.a(), t.e()));
        assert!(is_north_up(&w));
    }

    #[test]
    fn should_not_mix_model_and_crs_keys() {
        // Projected model that only names a geographic CRS.
        let keys = [1, 1, 0, 2, GT_MODEL_TYPE_KEY, 0, 1, MODEL_TYPE_PROJECTED, GEOGRAPHIC_TYPE_KEY, 0, 1, 4326];

        assert!(matches!(crs_from_geo_keys(&keys), Err(Error::UnreadableRaster(_))));
    }

    #[test]
    fn should_prefer_projected_key_for_projected_models() {
        let utm = Crs::from_epsg(32720).unwrap();
        assert_eq!(crs_from_geo_keys(&geo_keys_for(utm)).unwrap(), utm);
        assert_eq!(crs_from_geo_keys(&geo_keys_for(Crs::WGS84)).unwrap(), Crs::WGS84);

        assert!(matches!(
            crs_from_geo_keys(&[1, 1, 0, 0]),
            Err(Error::UnreadableRaster(_))
        ));
    }
}
