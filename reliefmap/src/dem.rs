//! Digital elevation model reading.
//!
//! The engine writes the surface model as a single-band float GeoTIFF with
//! its no-data value in the GDAL ASCII tag. Only the first band is read;
//! cells equal to the no-data value or non-finite are masked out.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tiff::decoder::{Decoder, DecodingResult};
use tiff::tags::Tag;
use tiff::ColorType;
use tracing::info;

use crate::relief::{RasterBuffer, RenderError};

/// GDAL no-data tag (ASCII).
pub const GDAL_NODATA_TAG: u16 = 42113;

/// Errors raised while reading a DEM.
#[derive(Debug, Error)]
pub enum DemError {
    #[error("failed to open DEM {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to decode DEM: {0}")]
    Tiff(#[from] tiff::TiffError),

    #[error("unsupported DEM layout: {0}")]
    Unsupported(String),

    #[error("DEM contains no valid data")]
    NoValidData,

    #[error(transparent)]
    Raster(#[from] RenderError),
}

/// A decoded DEM.
#[derive(Clone, Debug)]
pub struct Dem {
    pub raster: RasterBuffer,
    pub nodata: Option<f64>,
}

fn samples_per_pixel(color: ColorType) -> Result<usize, DemError> {
    match color {
        ColorType::Gray(_) => Ok(1),
        ColorType::GrayA(_) => Ok(2),
        ColorType::RGB(_) => Ok(3),
        ColorType::RGBA(_) => Ok(4),
        other => Err(DemError::Unsupported(format!("color type {:?}", other))),
    }
}

fn first_band(result: DecodingResult, stride: usize) -> Result<Vec<f32>, DemError> {
    fn take<T: Copy>(data: Vec<T>, stride: usize, f: impl Fn(T) -> f32) -> Vec<f32> {
        data.into_iter().step_by(stride).map(f).collect()
    }

    Ok(match result {
        DecodingResult::F32(d) => take(d, stride, |v| v),
        DecodingResult::F64(d) => take(d, stride, |v| v as f32),
        DecodingResult::U8(d) => take(d, stride, f32::from),
        DecodingResult::U16(d) => take(d, stride, f32::from),
        DecodingResult::U32(d) => take(d, stride, |v| v as f32),
        DecodingResult::I8(d) => take(d, stride, f32::from),
        DecodingResult::I16(d) => take(d, stride, f32::from),
        DecodingResult::I32(d) => take(d, stride, |v| v as f32),
        #[allow(unreachable_patterns)]
        _ => return Err(DemError::Unsupported("sample format".to_string())),
    })
}

/// Parses a GDAL no-data string (`"-9999"`, `"nan"`).
pub fn parse_nodata(raw: &str) -> Option<f64> {
    raw.trim_matches(|c: char| c == '\0' || c.is_whitespace())
        .parse::<f64>()
        .ok()
}

/// Reads the first band of a GeoTIFF DEM with its no-data mask.
pub fn read_dem(path: &Path) -> Result<Dem, DemError> {
    let file = File::open(path).map_err(|source| DemError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut decoder = Decoder::new(BufReader::new(file))?;

    let (width, height) = decoder.dimensions()?;
    let stride = samples_per_pixel(decoder.colortype()?)?;
    let nodata = match decoder.find_tag(Tag::from_u16_exhaustive(GDAL_NODATA_TAG))? {
        Some(value) => value.into_string().ok().as_deref().and_then(parse_nodata),
        None => None,
    };

    let values = first_band(decoder.read_image()?, stride)?;
    let mask: Vec<bool> = values
        .iter()
        .map(|&v| v.is_finite() && nodata.map_or(true, |nd| v != nd as f32))
        .collect();

    let raster = RasterBuffer::with_mask(width, height, values, mask)?;
    if raster.valid_count() == 0 {
        return Err(DemError::NoValidData);
    }

    info!(
        path = %path.display(),
        width,
        height,
        bands = stride,
        nodata = ?nodata,
        valid = raster.valid_count(),
        "Read DEM"
    );
    Ok(Dem { raster, nodata })
}
