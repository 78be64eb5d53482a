//! Single-plane image I/O for tiled microscopy acquisitions.
//!
//! Each Z-plane of a tile is stored as its own single channel TIFF. This
//! module decodes planes into `Array2<f32>` counts (whole or a lateral
//! region), reads plane dimensions from the header alone, and writes 16-bit
//! planes. File format is determined from the extension.
//!
//! Region reads go through the `tiff` decoder directly so a chunk only
//! decompresses the strips it overlaps.

use crate::image_proc::image::{array2_to_gray16_image, dynamic_image_to_array2};
use ndarray::{s, Array2};
use std::fs::File;
use std::io::BufReader;
use std::ops::Range;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tiff::decoder::{ChunkType, Decoder, DecodingResult};
use tiff::{ColorType, TiffError};

/// Errors that can occur while reading or writing a plane
#[derive(Error, Debug)]
pub enum PlaneIoError {
    #[error("failed to decode plane {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("failed to encode plane {path}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("failed to decode TIFF strips of {path}: {source}")]
    Tiff {
        path: PathBuf,
        #[source]
        source: TiffError,
    },
    #[error("region rows {rows:?} cols {cols:?} outside plane {path} of size {height}x{width}")]
    RegionOutOfBounds {
        path: PathBuf,
        rows: Range<usize>,
        cols: Range<usize>,
        height: usize,
        width: usize,
    },
}

/// Read the (height, width) of a plane from its header without decoding pixels.
pub fn plane_dimensions<P: AsRef<Path>>(path: P) -> Result<(usize, usize), PlaneIoError> {
    let path = path.as_ref();
    let (width, height) = image::image_dimensions(path).map_err(|source| PlaneIoError::Decode {
        path: path.to_path_buf(),
        source,
    })?;
    Ok((height as usize, width as usize))
}

/// Decode a whole plane into raw counts.
pub fn read_plane<P: AsRef<Path>>(path: P) -> Result<Array2<f32>, PlaneIoError> {
    let path = path.as_ref();
    let img = image::open(path).map_err(|source| PlaneIoError::Decode {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(dynamic_image_to_array2(img))
}

/// Decode a plane and return only the lateral region `rows` × `cols`.
///
/// Strip-organized grayscale TIFFs are decoded strip by strip, touching only
/// the strips that overlap `rows`. Other encodings fall back to decoding the
/// whole plane and slicing it.
pub fn read_plane_region<P: AsRef<Path>>(
    path: P,
    rows: Range<usize>,
    cols: Range<usize>,
) -> Result<Array2<f32>, PlaneIoError> {
    let path = path.as_ref();
    let (height, width) = plane_dimensions(path)?;

    if rows.start > rows.end || cols.start > cols.end || rows.end > height || cols.end > width {
        return Err(PlaneIoError::RegionOutOfBounds {
            path: path.to_path_buf(),
            rows,
            cols,
            height,
            width,
        });
    }

    if is_tiff(path) {
        let strips = read_tiff_strips(path, &rows, &cols).map_err(|source| PlaneIoError::Tiff {
            path: path.to_path_buf(),
            source,
        })?;
        if let Some(region) = strips {
            return Ok(region);
        }
    }

    let plane = read_plane(path)?;
    Ok(plane.slice(s![rows, cols]).to_owned())
}

fn is_tiff(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("tif") || e.eq_ignore_ascii_case("tiff"))
}

/// Copy `rows` × `cols` out of the strips that cover `rows`.
///
/// Returns `None` for tiled or multi-sample images and sample types without
/// a lossless f32 conversion.
fn read_tiff_strips(
    path: &Path,
    rows: &Range<usize>,
    cols: &Range<usize>,
) -> Result<Option<Array2<f32>>, TiffError> {
    let mut decoder = Decoder::new(BufReader::new(File::open(path)?))?;
    if decoder.get_chunk_type() != ChunkType::Strip
        || !matches!(decoder.colortype()?, ColorType::Gray(_))
    {
        return Ok(None);
    }

    let (width, _) = decoder.dimensions()?;
    let width = width as usize;
    let rows_per_strip = decoder.chunk_dimensions().1.max(1) as usize;
    let strip_count = decoder.strip_count()? as usize;

    let mut region = Array2::<f32>::zeros((rows.len(), cols.len()));
    if rows.is_empty() || cols.is_empty() {
        return Ok(Some(region));
    }

    let first = rows.start / rows_per_strip;
    let last = ((rows.end - 1) / rows_per_strip).min(strip_count.saturating_sub(1));
    for strip in first..=last {
        let values: Vec<f32> = match decoder.read_chunk(strip as u32)? {
            DecodingResult::U8(v) => v.into_iter().map(f32::from).collect(),
            DecodingResult::U16(v) => v.into_iter().map(f32::from).collect(),
            DecodingResult::F32(v) => v,
            _ => return Ok(None),
        };

        let strip_start = strip * rows_per_strip;
        for (r, line) in values.chunks_exact(width).enumerate() {
            let y = strip_start + r;
            if !rows.contains(&y) {
                continue;
            }
            region
                .row_mut(y - rows.start)
                .iter_mut()
                .zip(&line[cols.clone()])
                .for_each(|(dst, &src)| *dst = src);
        }
    }

    Ok(Some(region))
}

/// Save an `Array2<f32>` of counts as a 16-bit grayscale plane.
pub fn save_u16_plane<P: AsRef<Path>>(plane: &Array2<f32>, path: P) -> Result<(), PlaneIoError> {
    let path = path.as_ref();
    array2_to_gray16_image(plane)
        .save(path)
        .map_err(|source| PlaneIoError::Encode {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn ramp(height: usize, width: usize) -> Array2<f32> {
        Array2::from_shape_fn((height, width), |(y, x)| (y * width + x) as f32)
    }

    #[test]
    fn test_tiff_plane_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("1_00001_Z001_CH1.tif");
        let plane = ramp(6, 9);

        save_u16_plane(&plane, &path).unwrap();

        assert_eq!(plane_dimensions(&path).unwrap(), (6, 9));
        assert_eq!(read_plane(&path).unwrap(), plane);
    }

    #[test]
    fn test_read_region() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("plane.tif");
        let plane = ramp(8, 8);
        save_u16_plane(&plane, &path).unwrap();

        let region = read_plane_region(&path, 2..5, 3..7).unwrap();
        assert_eq!(region.dim(), (3, 4));
        assert_eq!(region[[0, 0]], plane[[2, 3]]);
        assert_eq!(region[[2, 3]], plane[[4, 6]]);
    }

    #[test]
    fn test_multi_strip_region_matches_full_plane() {
        use tiff::encoder::{colortype, TiffEncoder};

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("strips.tif");
        let (height, width) = (30, 20);
        let data: Vec<u16> = (0..height * width).map(|v| v as u16).collect();
        {
            let mut encoder = TiffEncoder::new(File::create(&path).unwrap()).unwrap();
            let mut image = encoder
                .new_image::<colortype::Gray16>(width as u32, height as u32)
                .unwrap();
            image.rows_per_strip(4).unwrap();
            image.write_data(&data).unwrap();
        }

        let plane = read_plane(&path).unwrap();
        assert_eq!(plane, ramp(height, width));
        for (rows, cols) in [(5..19, 3..17), (0..30, 0..20), (29..30, 15..20), (8..12, 0..1)] {
            let region = read_plane_region(&path, rows.clone(), cols.clone()).unwrap();
            assert_eq!(region, plane.slice(s![rows, cols]).to_owned());
        }
        let empty = read_plane_region(&path, 10..10, 0..5).unwrap();
        assert_eq!(empty.dim(), (0, 5));
    }

    #[test]
    fn test_read_region_out_of_bounds() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("plane.tif");
        save_u16_plane(&ramp(4, 4), &path).unwrap();

        let err = read_plane_region(&path, 0..5, 0..4).unwrap_err();
        assert!(matches!(err, PlaneIoError::RegionOutOfBounds { height: 4, .. }));
    }

    #[test]
    fn test_missing_file_is_decode_error() {
        let err = read_plane("/nonexistent/plane.tif").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/plane.tif"));
    }
}
