//! Shared components and utilities for the deconvolution workspace.
//!
//! This crate contains the array/image conversions, plane I/O and parallel
//! helpers used by both the processing crate and the test fixtures, so the
//! two agree on how a tile plane is decoded and encoded.

pub mod algo;
pub mod image_proc;
