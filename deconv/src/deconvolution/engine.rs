//! Out-of-core deconvolution of one (cycle, channel) pair.
//!
//! The engine walks the lateral chunks of every tile, restores each padded
//! chunk with Richardson–Lucy against a PSF cropped to the chunk, and
//! streams the chunk interiors into a FITS dataset. Chunks of a batch are
//! restored concurrently; writes happen on the calling thread in chunk order.

use super::chunking::{Chunk, ChunkGrid};
use super::richardson_lucy::{richardson_lucy_with, TransferFunction};
use crate::config::DeconvolutionConfig;
use crate::error::{PipelineError, ValidationError};
use crate::io::fits::{partial_path, remove_partial, FitsVolumeWriter};
use crate::psf::PsfVolume;
use crate::stack::{interior_view, TiledStack, VolumeChunk};
use log::{debug, info};
use ndarray::Array3;
use shared::algo::process_in_parallel_batches;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// A restored chunk awaiting its write
type Restored = (Chunk, Array3<f32>);

/// What one successful call wrote
#[derive(Debug, Clone, PartialEq)]
pub struct DeconvolutionSummary {
    pub path: PathBuf,
    pub shape: Vec<usize>,
    pub chunks: usize,
    pub elapsed: Duration,
}

/// Chunked Richardson–Lucy restoration writing FITS output
#[derive(Debug, Clone)]
pub struct DeconvolutionEngine {
    config: DeconvolutionConfig,
}

impl DeconvolutionEngine {
    pub fn new(config: DeconvolutionConfig) -> Result<Self, ValidationError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &DeconvolutionConfig {
        &self.config
    }

    /// Restore `stack` against `psf` and write the result to `output`.
    ///
    /// Preconditions are checked before anything is created on disk: each
    /// tile must hold exactly `num_z` planes, the PSF must match the tile
    /// shape and `iterations` must be at least 1. Missing parent directories
    /// of `output` are created and an existing file is replaced.
    pub fn deconvolve(
        &self,
        stack: &TiledStack,
        psf: &PsfVolume,
        num_z: usize,
        iterations: usize,
        output: &Path,
    ) -> Result<DeconvolutionSummary, PipelineError> {
        if iterations == 0 {
            return Err(ValidationError::Zero {
                field: "iterations",
            }
            .into());
        }
        let tile_shape = stack.tile_shape();
        if tile_shape.0 != num_z {
            return Err(PipelineError::mismatch("plane count", num_z, tile_shape.0));
        }
        if psf.shape() != tile_shape {
            return Err(PipelineError::mismatch("PSF shape", tile_shape, psf.shape()));
        }

        let (nz, height, width) = tile_shape;
        let grid = ChunkGrid::new(height, width, self.config.chunk_size, self.config.overlap)?;
        let transfers = transfer_functions(&grid, nz, psf)?;

        if let Some(parent) = output.parent() {
            std::fs::create_dir_all(parent).map_err(|e| PipelineError::io(parent, e))?;
        }

        let start = Instant::now();
        info!(
            "Deconvolving {} tile(s) of {:?} into {} ({} chunks per tile, {} iterations)",
            stack.num_tiles(),
            tile_shape,
            output.display(),
            grid.len(),
            iterations
        );

        let shape = stack.output_shape();
        let mut writer = FitsVolumeWriter::create(output, &shape)?;
        if let Err(e) = self.restore_tiles(stack, &grid, &transfers, iterations, &mut writer) {
            drop(writer);
            remove_partial(&partial_path(output));
            return Err(e);
        }
        let path = writer.finish()?;

        let elapsed = start.elapsed();
        info!("Wrote {} in {:.2?}", path.display(), elapsed);
        Ok(DeconvolutionSummary {
            path,
            shape,
            chunks: grid.len() * stack.num_tiles(),
            elapsed,
        })
    }

    fn restore_tiles(
        &self,
        stack: &TiledStack,
        grid: &ChunkGrid,
        transfers: &HashMap<(usize, usize, usize), TransferFunction>,
        iterations: usize,
        writer: &mut FitsVolumeWriter,
    ) -> Result<(), PipelineError> {
        let epsilon = self.config.epsilon;

        let restore = |item: Result<VolumeChunk, PipelineError>| -> Result<Restored, PipelineError> {
            let chunk = item?;
            let transfer = transfers.get(&chunk.data.dim()).ok_or_else(|| {
                PipelineError::mismatch("chunk shape", "a planned chunk", chunk.data.dim())
            })?;
            let restored = richardson_lucy_with(&chunk.data, transfer, iterations, epsilon);
            Ok((chunk.chunk, restored))
        };

        for (tile, tile_stack) in stack.tiles().iter().enumerate() {
            process_in_parallel_batches(
                tile_stack.chunks(grid),
                self.config.parallel,
                &restore,
                |(chunk, restored): Restored| -> Result<(), PipelineError> {
                    debug!("tile {} chunk {}/{} restored", tile, chunk.index + 1, grid.len());
                    let origin = (chunk.interior.y, chunk.interior.x);
                    writer.write_block(tile, origin, interior_view(&chunk, &restored))?;
                    Ok(())
                },
            )?;
        }
        Ok(())
    }
}

/// One transfer function per distinct padded chunk shape
fn transfer_functions(
    grid: &ChunkGrid,
    nz: usize,
    psf: &PsfVolume,
) -> Result<HashMap<(usize, usize, usize), TransferFunction>, PipelineError> {
    let mut transfers = HashMap::new();
    for chunk in grid.chunks() {
        let shape = (nz, chunk.padded.height, chunk.padded.width);
        if transfers.contains_key(&shape) {
            continue;
        }
        let kernel = psf
            .center_crop(shape)
            .ok_or_else(|| PipelineError::mismatch("PSF crop", shape, psf.shape()))?;
        transfers.insert(shape, TransferFunction::from_kernel(&kernel)?);
    }
    Ok(transfers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::fits::{read_fits_volume, DATA_HDU};
    use ndarray::Ix3;
    use shared::image_proc::save_u16_plane;
    use tempfile::TempDir;

    fn write_tile(dir: &Path, tile: usize, volume: &Array3<f32>) -> Vec<PathBuf> {
        volume
            .outer_iter()
            .enumerate()
            .map(|(z, plane)| {
                let path = dir.join(format!("1_{:05}_Z{:03}_CH1.tif", tile + 1, z + 1));
                save_u16_plane(&plane.to_owned(), &path).unwrap();
                path
            })
            .collect()
    }

    fn phantom(shape: (usize, usize, usize)) -> Array3<f32> {
        Array3::from_shape_fn(shape, |(z, y, x)| (10 + (z * 31 + y * 7 + x * 3) % 50) as f32)
    }

    fn delta_psf(shape: (usize, usize, usize)) -> PsfVolume {
        let mut data = Array3::zeros(shape);
        data[[shape.0 / 2, shape.1 / 2, shape.2 / 2]] = 1.0;
        PsfVolume::new(data)
    }

    fn engine(chunk_size: usize, overlap: usize, parallel: bool) -> DeconvolutionEngine {
        DeconvolutionEngine::new(DeconvolutionConfig {
            chunk_size,
            overlap,
            parallel,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_delta_psf_reproduces_input_across_chunks() {
        let dir = TempDir::new().unwrap();
        let volume = phantom((3, 14, 18));
        let stack = TiledStack::from_paths(write_tile(dir.path(), 0, &volume), 1, 3).unwrap();
        let output = dir.path().join("out/deconvolution/result.fits");

        let summary = engine(8, 2, true)
            .deconvolve(&stack, &delta_psf((3, 14, 18)), 3, 4, &output)
            .unwrap();

        assert_eq!(summary.shape, vec![3, 14, 18]);
        assert_eq!(summary.chunks, 2 * 3);
        let restored = read_fits_volume(&output, DATA_HDU)
            .unwrap()
            .into_dimensionality::<Ix3>()
            .unwrap();
        for (r, v) in restored.iter().zip(volume.iter()) {
            assert!((r - v).abs() < 1e-2, "{r} vs {v}");
        }
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let dir = TempDir::new().unwrap();
        let volume = phantom((3, 16, 16));
        let stack = TiledStack::from_paths(write_tile(dir.path(), 0, &volume), 1, 3).unwrap();
        let mut psf = Array3::<f32>::zeros((3, 16, 16));
        for ((z, y, x), v) in psf.indexed_iter_mut() {
            let r2 = (y as f32 - 8.0).powi(2) + (x as f32 - 8.0).powi(2);
            *v = (-r2 / 4.0 - (z as f32 - 1.0).powi(2)).exp();
        }
        let psf = PsfVolume::new(psf);

        let seq = dir.path().join("seq.fits");
        let par = dir.path().join("par.fits");
        engine(8, 3, false).deconvolve(&stack, &psf, 3, 5, &seq).unwrap();
        engine(8, 3, true).deconvolve(&stack, &psf, 3, 5, &par).unwrap();

        assert_eq!(
            read_fits_volume(&seq, DATA_HDU).unwrap(),
            read_fits_volume(&par, DATA_HDU).unwrap()
        );
    }

    #[test]
    fn test_tiled_output_is_4d() {
        let dir = TempDir::new().unwrap();
        let mut paths = write_tile(dir.path(), 0, &phantom((2, 6, 6)));
        paths.extend(write_tile(dir.path(), 1, &phantom((2, 6, 6)).mapv(|v| v * 2.0)));
        let stack = TiledStack::from_paths(paths, 2, 2).unwrap();
        let output = dir.path().join("tiled.fits");

        engine(512, 32, true)
            .deconvolve(&stack, &delta_psf((2, 6, 6)), 2, 2, &output)
            .unwrap();

        let restored = read_fits_volume(&output, DATA_HDU).unwrap();
        assert_eq!(restored.shape(), &[2, 2, 6, 6]);
        assert!(restored[[1, 0, 0, 0]] > restored[[0, 0, 0, 0]]);
    }

    #[test]
    fn test_psf_shape_mismatch_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let stack =
            TiledStack::from_paths(write_tile(dir.path(), 0, &phantom((3, 8, 8))), 1, 3).unwrap();
        let output = dir.path().join("nested/out.fits");

        let err = engine(512, 32, true)
            .deconvolve(&stack, &delta_psf((3, 8, 6)), 3, 1, &output)
            .unwrap_err();

        assert!(matches!(err, PipelineError::DimensionMismatch { what: "PSF shape", .. }));
        assert!(err.is_pair_scoped());
        assert!(!output.exists());
        assert!(!partial_path(&output).exists());
        assert!(!dir.path().join("nested").exists());
    }

    #[test]
    fn test_plane_count_must_match_expected() {
        let dir = TempDir::new().unwrap();
        let stack =
            TiledStack::from_paths(write_tile(dir.path(), 0, &phantom((3, 8, 8))), 1, 3).unwrap();
        let err = engine(512, 32, true)
            .deconvolve(&stack, &delta_psf((3, 8, 8)), 4, 1, &dir.path().join("x.fits"))
            .unwrap_err();
        assert!(matches!(err, PipelineError::DimensionMismatch { what: "plane count", .. }));
    }

    #[test]
    fn test_zero_iterations_rejected() {
        let dir = TempDir::new().unwrap();
        let stack =
            TiledStack::from_paths(write_tile(dir.path(), 0, &phantom((1, 4, 4))), 1, 1).unwrap();
        let err = engine(512, 32, true)
            .deconvolve(&stack, &delta_psf((1, 4, 4)), 1, 0, &dir.path().join("x.fits"))
            .unwrap_err();
        assert!(matches!(err, PipelineError::Validation(_)));
    }

    #[test]
    fn test_rerun_overwrites_output() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("again.fits");
        let first = phantom((2, 6, 6));
        let stack = TiledStack::from_paths(write_tile(dir.path(), 0, &first), 1, 2).unwrap();
        engine(512, 32, true)
            .deconvolve(&stack, &delta_psf((2, 6, 6)), 2, 1, &output)
            .unwrap();

        let second = Array3::from_elem((2, 6, 6), 5.0_f32);
        let stack = TiledStack::from_paths(write_tile(dir.path(), 0, &second), 1, 2).unwrap();
        engine(512, 32, true)
            .deconvolve(&stack, &delta_psf((2, 6, 6)), 2, 1, &output)
            .unwrap();

        let restored = read_fits_volume(&output, DATA_HDU).unwrap();
        assert!(restored.iter().all(|v| (v - 5.0).abs() < 1e-3));
    }
}
