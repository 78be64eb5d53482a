//! Test pattern generation utilities for pipeline validation
//!
//! Provides bead volumes with known structure, used to validate plane I/O,
//! chunking and the deconvolution engine.

use ndarray::Array3;

/// A point emitter in a synthetic volume, in (z, y, x) voxel coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bead {
    pub z: usize,
    pub y: usize,
    pub x: usize,
    pub brightness: f32,
}

/// Generate a volume of Gaussian-blurred point emitters over a flat background
///
/// Each bead is spread with an anisotropic Gaussian (`sigma_z` axially,
/// `sigma_xy` laterally), approximating a widefield observation of
/// sub-resolution beads.
///
/// # Arguments
/// * `shape` - Volume shape (z, height, width)
/// * `beads` - Emitters to place
/// * `sigma_z` - Axial blur in planes
/// * `sigma_xy` - Lateral blur in pixels
/// * `background` - Constant offset added to every voxel
pub fn generate_bead_volume(
    shape: (usize, usize, usize),
    beads: &[Bead],
    sigma_z: f32,
    sigma_xy: f32,
    background: f32,
) -> Array3<f32> {
    let two_sz = 2.0 * sigma_z * sigma_z;
    let two_sxy = 2.0 * sigma_xy * sigma_xy;

    Array3::from_shape_fn(shape, |(z, y, x)| {
        let signal: f32 = beads
            .iter()
            .map(|bead| {
                let dz = z as f32 - bead.z as f32;
                let dy = y as f32 - bead.y as f32;
                let dx = x as f32 - bead.x as f32;
                bead.brightness * (-(dz * dz) / two_sz - (dx * dx + dy * dy) / two_sxy).exp()
            })
            .sum();
        background + signal
    })
}
