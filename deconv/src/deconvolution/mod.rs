//! Richardson–Lucy deconvolution of image stacks too large for memory.
//!
//! - **fft**: 3D transform from per-axis rustfft plans
//! - **richardson_lucy**: the iterative restoration on one in-memory chunk
//! - **chunking**: lateral chunk layout with overlap halos
//! - **engine**: precondition checks, chunk scheduling and FITS output

pub mod chunking;
pub mod engine;
pub mod fft;
pub mod richardson_lucy;

pub use chunking::{Chunk, ChunkGrid, Region};
pub use engine::{DeconvolutionEngine, DeconvolutionSummary};
pub use richardson_lucy::{richardson_lucy, TransferFunction};
