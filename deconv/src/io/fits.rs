//! FITS storage for restored volumes and exported PSFs.
//!
//! Restored volumes are streamed into a single float32 image extension
//! named [`DATA_HDU`], one chunk interior at a time, so the full volume is
//! never held in memory. Dimensions are given in row-major order (slowest
//! axis first), which places the image width on NAXIS1.
//!
//! A writer targets a `.partial` sibling of the final path and renames it
//! into place on [`FitsVolumeWriter::finish`]. An interrupted run therefore
//! never leaves a truncated file under the final name, and a re-run replaces
//! the previous result in one step.

use crate::psf::PsfBank;
use fitsio::hdu::{FitsHdu, HduInfo};
use fitsio::images::{ImageDescription, ImageType};
use fitsio::FitsFile;
use log::{debug, warn};
use ndarray::{ArrayD, ArrayView3, IxDyn};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Extension name of the restored volume
pub const DATA_HDU: &str = "DATA";

/// Errors that can occur during FITS file operations
#[derive(Error, Debug)]
pub enum FitsError {
    #[error("FITS I/O error: {0}")]
    FitsIo(#[from] fitsio::errors::Error),
    #[error("HDU not found: {0}")]
    HduNotFound(String),
    #[error("Invalid data type in HDU: {0}")]
    InvalidDataType(String),
    #[error("block out of bounds: {0}")]
    OutOfBounds(String),
    #[error("failed to move {from} to {to}: {source}")]
    Rename {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Path of the in-progress file for `path`
pub fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".partial");
    path.with_file_name(name)
}

/// Streaming writer for one float32 volume of shape (z, h, w) or (tiles, z, h, w)
pub struct FitsVolumeWriter {
    fptr: FitsFile,
    hdu: FitsHdu,
    shape: Vec<usize>,
    partial: PathBuf,
    target: PathBuf,
    row: Vec<f32>,
}

impl FitsVolumeWriter {
    /// Create the `.partial` file and allocate the `DATA` extension.
    ///
    /// The pixel data starts zero-filled; every voxel is expected to be
    /// covered by [`write_block`](Self::write_block) before finishing.
    pub fn create(path: &Path, shape: &[usize]) -> Result<Self, FitsError> {
        if !(shape.len() == 3 || shape.len() == 4) || shape.contains(&0) {
            return Err(FitsError::InvalidDataType(format!(
                "volume shape must be 3D or 4D and non-empty, got {shape:?}"
            )));
        }
        let partial = partial_path(path);
        let mut fptr = FitsFile::create(&partial).overwrite().open()?;
        let description = ImageDescription {
            data_type: ImageType::Float,
            dimensions: shape,
        };
        let hdu = match fptr.create_image(DATA_HDU.to_string(), &description) {
            Ok(hdu) => hdu,
            Err(e) => {
                drop(fptr);
                remove_partial(&partial);
                return Err(e.into());
            }
        };
        debug!("Opened {} for a {:?} volume", partial.display(), shape);

        let width = shape[shape.len() - 1];
        Ok(Self {
            fptr,
            hdu,
            shape: shape.to_vec(),
            partial,
            target: path.to_path_buf(),
            row: Vec::with_capacity(width),
        })
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Write a full-depth block with its top-left corner at `(y, x)` of tile `tile`.
    pub fn write_block(
        &mut self,
        tile: usize,
        origin: (usize, usize),
        block: ArrayView3<f32>,
    ) -> Result<(), FitsError> {
        let (tiles, nz, height, width) = self.dims4();
        let (bz, bh, bw) = block.dim();
        let (y0, x0) = origin;
        if tile >= tiles || bz != nz || y0 + bh > height || x0 + bw > width {
            return Err(FitsError::OutOfBounds(format!(
                "tile {tile} block {:?} at {:?} in volume {:?}",
                block.dim(),
                origin,
                self.shape
            )));
        }

        for (z, plane) in block.outer_iter().enumerate() {
            for (dy, line) in plane.outer_iter().enumerate() {
                let start = ((tile * nz + z) * height + y0 + dy) * width + x0;
                self.row.clear();
                self.row.extend(line.iter().copied());
                self.hdu
                    .write_section(&mut self.fptr, start, start + bw, &self.row)?;
            }
        }
        Ok(())
    }

    /// Close the file and move it over the final path.
    ///
    /// On failure the `.partial` file is removed and the final path is left
    /// as it was.
    pub fn finish(self) -> Result<PathBuf, FitsError> {
        let Self {
            fptr,
            partial,
            target,
            ..
        } = self;
        drop(fptr);

        match replace_file(&partial, &target) {
            Ok(()) => Ok(target),
            Err(source) => {
                remove_partial(&partial);
                Err(FitsError::Rename {
                    from: partial,
                    to: target,
                    source,
                })
            }
        }
    }

    fn dims4(&self) -> (usize, usize, usize, usize) {
        match self.shape.as_slice() {
            [t, z, h, w] => (*t, *z, *h, *w),
            [z, h, w] => (1, *z, *h, *w),
            _ => (0, 0, 0, 0),
        }
    }
}

/// Rename `from` over `to`, removing an existing file at `to` if the
/// platform refuses to rename over it.
fn replace_file(from: &Path, to: &Path) -> std::io::Result<()> {
    match std::fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(_) if to.is_file() => {
            std::fs::remove_file(to)?;
            std::fs::rename(from, to)
        }
        Err(e) => Err(e),
    }
}

/// Delete an in-progress file, logging instead of failing.
pub(crate) fn remove_partial(partial: &Path) {
    if partial.exists() {
        if let Err(e) = std::fs::remove_file(partial) {
            warn!("Could not remove {}: {}", partial.display(), e);
        }
    }
}

/// Read a float32 image extension into an array in row-major order.
pub fn read_fits_volume<P: AsRef<Path>>(path: P, hdu_name: &str) -> Result<ArrayD<f32>, FitsError> {
    let mut fptr = FitsFile::open(path.as_ref())?;
    let hdu = fptr
        .hdu(hdu_name)
        .map_err(|_| FitsError::HduNotFound(hdu_name.to_string()))?;

    let shape = match &hdu.info {
        HduInfo::ImageInfo { shape, .. } => shape.clone(),
        _ => {
            return Err(FitsError::InvalidDataType(format!(
                "HDU '{hdu_name}' is not an image"
            )))
        }
    };

    let data = hdu.read_image::<Vec<f32>>(&mut fptr)?;
    ArrayD::from_shape_vec(IxDyn(&shape), data).map_err(|_| {
        FitsError::InvalidDataType(format!(
            "Cannot reshape image data for HDU '{hdu_name}' to {shape:?}"
        ))
    })
}

/// Export every PSF of a bank as its own extension, named by channel id.
///
/// Each extension carries the emission wavelength in microns as `WAVELEN`.
pub fn write_psf_bank<P: AsRef<Path>>(bank: &PsfBank, path: P) -> Result<(), FitsError> {
    let mut fptr = FitsFile::create(path.as_ref()).overwrite().open()?;

    for entry in bank.iter() {
        let (nz, ny, nx) = entry.psf.shape();
        let description = ImageDescription {
            data_type: ImageType::Float,
            dimensions: &[nz, ny, nx],
        };
        let hdu = fptr.create_image(entry.id.clone(), &description)?;
        let flat: Vec<f32> = entry.psf.data().iter().copied().collect();
        hdu.write_image(&mut fptr, &flat)?;
        hdu.write_key(&mut fptr, "WAVELEN", entry.wavelength_um)?;
    }

    Ok(())
}
