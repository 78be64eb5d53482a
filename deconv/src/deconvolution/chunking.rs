//! Lateral chunk layout for out-of-core processing.
//!
//! A volume is cut into square lateral blocks that span the full depth.
//! Each block is grown by an overlap halo (clipped at the volume borders)
//! so a chunk can be restored independently; only the interior is kept.

use crate::error::ValidationError;
use std::ops::Range;

/// Axis-aligned lateral rectangle in pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub y: usize,
    pub x: usize,
    pub height: usize,
    pub width: usize,
}

impl Region {
    pub fn new(y: usize, x: usize, height: usize, width: usize) -> Self {
        Self {
            y,
            x,
            height,
            width,
        }
    }

    pub fn rows(&self) -> Range<usize> {
        self.y..self.y + self.height
    }

    pub fn cols(&self) -> Range<usize> {
        self.x..self.x + self.width
    }

    pub fn area(&self) -> usize {
        self.height * self.width
    }

    pub fn contains(&self, other: &Region) -> bool {
        other.y >= self.y
            && other.x >= self.x
            && other.y + other.height <= self.y + self.height
            && other.x + other.width <= self.x + self.width
    }
}

/// One unit of work: the region read from disk and the part written back
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    pub index: usize,
    pub padded: Region,
    pub interior: Region,
}

impl Chunk {
    /// Offset of the interior inside the padded region, as (rows, cols)
    pub fn interior_offset(&self) -> (usize, usize) {
        (
            self.interior.y - self.padded.y,
            self.interior.x - self.padded.x,
        )
    }
}

/// Row-major grid of chunks covering a (height, width) plane
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkGrid {
    height: usize,
    width: usize,
    chunk_size: usize,
    overlap: usize,
    chunks: Vec<Chunk>,
}

impl ChunkGrid {
    pub fn new(
        height: usize,
        width: usize,
        chunk_size: usize,
        overlap: usize,
    ) -> Result<Self, ValidationError> {
        if chunk_size == 0 {
            return Err(ValidationError::Zero {
                field: "deconvolution.chunk_size",
            });
        }

        let mut chunks = Vec::new();
        for y0 in (0..height).step_by(chunk_size) {
            let y1 = (y0 + chunk_size).min(height);
            let py0 = y0.saturating_sub(overlap);
            let py1 = (y1 + overlap).min(height);
            for x0 in (0..width).step_by(chunk_size) {
                let x1 = (x0 + chunk_size).min(width);
                let px0 = x0.saturating_sub(overlap);
                let px1 = (x1 + overlap).min(width);
                chunks.push(Chunk {
                    index: chunks.len(),
                    padded: Region::new(py0, px0, py1 - py0, px1 - px0),
                    interior: Region::new(y0, x0, y1 - y0, x1 - x0),
                });
            }
        }

        Ok(Self {
            height,
            width,
            chunk_size,
            overlap,
            chunks,
        })
    }

    pub fn plane_shape(&self) -> (usize, usize) {
        (self.height, self.width)
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    /// Largest padded region, which bounds the memory of one chunk
    pub fn max_padded_area(&self) -> usize {
        self.chunks
            .iter()
            .map(|c| c.padded.area())
            .max()
            .unwrap_or(0)
    }
}
