//! Writes clipped rasters as GeoTIFF.

use std::{
    io::{BufWriter, Seek, Write},
    path::Path,
};

use tiff::{
    encoder::{colortype, TiffEncoder},
    tags::Tag,
    TiffError,
};
use tracing::debug;

use super::{
    is_north_up, ClipResult, RasterMeta, SampleType, Samples, GDAL_NODATA, GEO_ASCII_PARAMS,
    GEO_DOUBLE_PARAMS, GEO_KEY_DIRECTORY, GT_RASTER_TYPE_KEY, MODEL_PIXEL_SCALE, MODEL_TIEPOINT,
    MODEL_TRANSFORMATION, RASTER_PIXEL_IS_AREA,
};
use crate::error::{Error, Result};

/// Band/type combinations the encoder can write.
pub(crate) fn check_layout(meta: &RasterMeta) -> Result<()> {
    let supported = match meta.bands {
        1 => true,
        3 | 4 => matches!(meta.sample_type, SampleType::U8 | SampleType::U16),
        _ => false,
    };
    if !supported {
        return Err(Error::UnreadableRaster(format!(
            "unsupported layout: {} band(s) of {:?}",
            meta.bands, meta.sample_type
        )));
    }
    Ok(())
}

/// Persists `clip` at `path` with the band count, sample type, geo keys and
/// nodata of `template`; size and transform come from the clip.
///
/// The file is encoded next to `path` and renamed into place, so `path`
/// never holds a partial GeoTIFF.
pub fn write(path: &Path, clip: &ClipResult, template: &RasterMeta) -> Result<()> {
    check_layout(template)?;

    let expected = clip.width as usize * clip.height as usize * template.bands as usize;
    if clip.samples.sample_type() != template.sample_type || clip.samples.len() != expected {
        return Err(Error::UnreadableRaster(format!(
            "clip holds {} {:?} samples, template expects {} {:?}",
            clip.samples.len(),
            clip.samples.sample_type(),
            expected,
            template.sample_type
        )));
    }

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let mut tmp = tempfile::Builder::new()
        .prefix(&format!(".{}.", file_name))
        .suffix(".part")
        .tempfile_in(dir)?;

    {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        encode(&mut writer, clip, template)?;
        writer.flush()?;
    }

    tmp.persist(path).map_err(|e| e.error)?;
    debug!(path = %path.display(), width = clip.width, height = clip.height, "Wrote GeoTIFF");

    Ok(())
}

fn encode<W: Write + Seek>(writer: W, clip: &ClipResult, template: &RasterMeta) -> Result<()> {
    let mut encoder = TiffEncoder::new(writer).map_err(encode_error)?;
    let (width, height) = (clip.width, clip.height);

    let t = clip.transform;
    let geo_keys = area_geo_keys(&template.geo_keys);

    macro_rules! write_image {
        ($color:ty, $data:expr) => {{
            let mut image = encoder
                .new_image::<$color>(width, height)
                .map_err(encode_error)?;
            let dir = image.encoder();
            if is_north_up(&t) {
                dir.write_tag(Tag::Unknown(MODEL_PIXEL_SCALE), &[t.a(), -t.e(), 0.0][..])
                    .map_err(encode_error)?;
                dir.write_tag(
                    Tag::Unknown(MODEL_TIEPOINT),
                    &[0.0, 0.0, 0.0, t.xoff(), t.yoff(), 0.0][..],
                )
                .map_err(encode_error)?;
            } else {
                #[rustfmt::skip]
                let matrix = [
                    t.a(), t.b(), 0.0, t.xoff(),
                    t.d(), t.e(), 0.0, t.yoff(),
                    0.0, 0.0, 0.0, 0.0,
                    0.0, 0.0, 0.0, 1.0,
                ];
                dir.write_tag(Tag::Unknown(MODEL_TRANSFORMATION), &matrix[..])
                    .map_err(encode_error)?;
            }
            dir.write_tag(Tag::Unknown(GEO_KEY_DIRECTORY), &geo_keys[..])
                .map_err(encode_error)?;
            if let Some(doubles) = &template.geo_doubles {
                dir.write_tag(Tag::Unknown(GEO_DOUBLE_PARAMS), &doubles[..])
                    .map_err(encode_error)?;
            }
            if let Some(ascii) = &template.geo_ascii {
                dir.write_tag(Tag::Unknown(GEO_ASCII_PARAMS), ascii.as_str())
                    .map_err(encode_error)?;
            }
            if let Some(nodata) = &template.nodata {
                dir.write_tag(Tag::Unknown(GDAL_NODATA), nodata.as_str())
                    .map_err(encode_error)?;
            }
            image.write_data($data).map_err(encode_error)
        }};
    }

    match (&clip.samples, template.bands) {
        (Samples::U8(v), 1) => write_image!(colortype::Gray8, v),
        (Samples::I8(v), 1) => write_image!(colortype::GrayI8, v),
        (Samples::U16(v), 1) => write_image!(colortype::Gray16, v),
        (Samples::I16(v), 1) => write_image!(colortype::GrayI16, v),
        (Samples::U32(v), 1) => write_image!(colortype::Gray32, v),
        (Samples::I32(v), 1) => write_image!(colortype::GrayI32, v),
        (Samples::U64(v), 1) => write_image!(colortype::Gray64, v),
        (Samples::I64(v), 1) => write_image!(colortype::GrayI64, v),
        (Samples::F32(v), 1) => write_image!(colortype::Gray32Float, v),
        (Samples::F64(v), 1) => write_image!(colortype::Gray64Float, v),
        (Samples::U8(v), 3) => write_image!(colortype::RGB8, v),
        (Samples::U16(v), 3) => write_image!(colortype::RGB16, v),
        (Samples::U8(v), 4) => write_image!(colortype::RGBA8, v),
        (Samples::U16(v), 4) => write_image!(colortype::RGBA16, v),
        (samples, bands) => Err(Error::UnreadableRaster(format!(
            "cannot encode {} band(s) of {:?}",
            bands,
            samples.sample_type()
        ))),
    }
}

/// The written transform always addresses pixel corners.
fn area_geo_keys(keys: &[u16]) -> Vec<u16> {
    let mut keys = keys.to_vec();
    let count = keys.get(3).copied().unwrap_or(0) as usize;
    if let Some(entries) = keys.get_mut(4..) {
        for entry in entries.chunks_exact_mut(4).take(count) {
            if entry[0] == GT_RASTER_TYPE_KEY && entry[1] == 0 {
                entry[3] = RASTER_PIXEL_IS_AREA;
            }
        }
    }
    keys
}

fn encode_error(e: TiffError) -> Error {
    match e {
        TiffError::IoError(io) => Error::Filesystem(io),
        other => Error::UnreadableRaster(format!("cannot encode GeoTIFF: {}", other)),
    }
}

// -- Tests -------------------------------------------------------------------
