//! Lazily materialized image stacks backed by single-plane TIFF files.
//!
//! Opening a stack reads image headers only. Pixels are decoded per chunk:
//! each [`VolumeChunk`] holds the padded lateral region of every plane and
//! nothing else, so a volume larger than memory can be walked chunk by chunk.

use crate::deconvolution::chunking::{Chunk, ChunkGrid, Region};
use crate::error::{PipelineError, ValidationError};
use ndarray::{s, Array3, ArrayView3};
use shared::image_proc::{plane_dimensions, read_plane_region};
use std::path::PathBuf;

/// Ordered Z-planes of one tile
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageStack {
    paths: Vec<PathBuf>,
    height: usize,
    width: usize,
}

impl ImageStack {
    /// Open a stack from plane files in Z order.
    ///
    /// Every plane must share the dimensions of the first one.
    pub fn open(paths: Vec<PathBuf>) -> Result<Self, PipelineError> {
        let first = paths
            .first()
            .ok_or_else(|| PipelineError::mismatch("plane count", "at least 1", 0))?;
        let (height, width) = plane_dimensions(first)?;

        for path in &paths[1..] {
            let dims = plane_dimensions(path)?;
            if dims != (height, width) {
                return Err(PipelineError::mismatch(
                    "plane dimensions",
                    (height, width),
                    dims,
                ));
            }
        }

        Ok(Self {
            paths,
            height,
            width,
        })
    }

    /// Volume shape (z, height, width)
    pub fn shape(&self) -> (usize, usize, usize) {
        (self.paths.len(), self.height, self.width)
    }

    pub fn plane_count(&self) -> usize {
        self.paths.len()
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Decode one lateral region across all planes.
    pub fn read_region(&self, region: &Region) -> Result<Array3<f32>, PipelineError> {
        let mut volume = Array3::zeros((self.paths.len(), region.height, region.width));
        for (z, path) in self.paths.iter().enumerate() {
            let plane = read_plane_region(path, region.rows(), region.cols())?;
            volume.slice_mut(s![z, .., ..]).assign(&plane);
        }
        Ok(volume)
    }

    /// Decode the whole volume.
    pub fn read_volume(&self) -> Result<Array3<f32>, PipelineError> {
        self.read_region(&Region::new(0, 0, self.height, self.width))
    }

    /// Lazy sequence of chunks over `grid`, decoded on demand.
    ///
    /// The sequence is finite and each call starts again from the first chunk.
    pub fn chunks<'a>(
        &'a self,
        grid: &'a ChunkGrid,
    ) -> impl Iterator<Item = Result<VolumeChunk, PipelineError>> + 'a {
        grid.chunks().iter().map(move |chunk| {
            let data = self.read_region(&chunk.padded)?;
            Ok(VolumeChunk {
                chunk: *chunk,
                data,
            })
        })
    }
}

/// Decoded padded region of a stack
#[derive(Debug, Clone)]
pub struct VolumeChunk {
    pub chunk: Chunk,
    pub data: Array3<f32>,
}

impl VolumeChunk {
    /// View of the interior, excluding the halo
    pub fn interior(&self) -> ArrayView3<'_, f32> {
        interior_view(&self.chunk, &self.data)
    }
}

/// Interior of a chunk-shaped array
pub(crate) fn interior_view<'a>(chunk: &Chunk, data: &'a Array3<f32>) -> ArrayView3<'a, f32> {
    let (dy, dx) = chunk.interior_offset();
    data.slice(s![
        ..,
        dy..dy + chunk.interior.height,
        dx..dx + chunk.interior.width
    ])
}

/// All tiles of one (cycle, channel) pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TiledStack {
    tiles: Vec<ImageStack>,
}

impl TiledStack {
    /// Split sorted plane files into `num_tiles` consecutive stacks of `num_z` planes.
    pub fn from_paths(
        paths: Vec<PathBuf>,
        num_tiles: usize,
        num_z: usize,
    ) -> Result<Self, PipelineError> {
        if num_tiles == 0 {
            return Err(ValidationError::Zero { field: "numTiles" }.into());
        }
        if num_z == 0 {
            return Err(ValidationError::Zero {
                field: "numZPlanes",
            }
            .into());
        }
        let expected = num_tiles * num_z;
        if paths.len() != expected {
            return Err(PipelineError::mismatch(
                "plane count",
                expected,
                paths.len(),
            ));
        }

        let tiles = paths
            .chunks(num_z)
            .map(|group| ImageStack::open(group.to_vec()))
            .collect::<Result<Vec<_>, _>>()?;

        let shape = tiles[0].shape();
        if let Some(other) = tiles.iter().find(|t| t.shape() != shape) {
            return Err(PipelineError::mismatch("tile shape", shape, other.shape()));
        }

        Ok(Self { tiles })
    }

    pub fn tiles(&self) -> &[ImageStack] {
        &self.tiles
    }

    pub fn num_tiles(&self) -> usize {
        self.tiles.len()
    }

    /// Shape (z, height, width) shared by every tile
    pub fn tile_shape(&self) -> (usize, usize, usize) {
        self.tiles[0].shape()
    }

    /// Shape of the restored dataset: (z, h, w) for one tile, (tiles, z, h, w) otherwise
    pub fn output_shape(&self) -> Vec<usize> {
        let (nz, ny, nx) = self.tile_shape();
        if self.tiles.len() == 1 {
            vec![nz, ny, nx]
        } else {
            vec![self.tiles.len(), nz, ny, nx]
        }
    }
}
