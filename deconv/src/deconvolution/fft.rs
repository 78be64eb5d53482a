//! Three-dimensional FFT assembled from one-dimensional rustfft plans.
//!
//! A separable transform is applied along each axis in turn. Lanes along an
//! axis are independent and are processed in parallel.

use ndarray::{Array3, Axis, Zip};
use rustfft::num_complex::Complex32;
use rustfft::{Fft, FftPlanner, Length};
use std::sync::Arc;

/// Forward and inverse 3D transforms for one fixed shape
pub struct Fft3 {
    shape: (usize, usize, usize),
    forward: [Arc<dyn Fft<f32>>; 3],
    inverse: [Arc<dyn Fft<f32>>; 3],
}

impl Fft3 {
    pub fn new(shape: (usize, usize, usize)) -> Self {
        let mut planner = FftPlanner::new();
        let (nz, ny, nx) = shape;
        let forward = [
            planner.plan_fft_forward(nz),
            planner.plan_fft_forward(ny),
            planner.plan_fft_forward(nx),
        ];
        let inverse = [
            planner.plan_fft_inverse(nz),
            planner.plan_fft_inverse(ny),
            planner.plan_fft_inverse(nx),
        ];
        Self {
            shape,
            forward,
            inverse,
        }
    }

    pub fn shape(&self) -> (usize, usize, usize) {
        self.shape
    }

    /// In-place forward transform (unnormalized)
    pub fn forward(&self, data: &mut Array3<Complex32>) {
        self.transform(data, &self.forward);
    }

    /// In-place inverse transform, scaled by 1/N so it inverts [`forward`](Self::forward)
    pub fn inverse(&self, data: &mut Array3<Complex32>) {
        self.transform(data, &self.inverse);
        let scale = 1.0 / data.len() as f32;
        data.par_mapv_inplace(|v| v * scale);
    }

    fn transform(&self, data: &mut Array3<Complex32>, plans: &[Arc<dyn Fft<f32>>; 3]) {
        debug_assert_eq!(data.dim(), self.shape);
        for (axis, plan) in plans.iter().enumerate() {
            if plan.len() <= 1 {
                continue;
            }
            Zip::from(data.lanes_mut(Axis(axis))).par_for_each(|mut lane| {
                if let Some(slice) = lane.as_slice_mut() {
                    plan.process(slice);
                } else {
                    let mut buffer: Vec<Complex32> = lane.iter().copied().collect();
                    plan.process(&mut buffer);
                    lane.iter_mut()
                        .zip(buffer)
                        .for_each(|(dst, src)| *dst = src);
                }
            });
        }
    }
}

/// Roll a centered kernel so its center index moves to the origin.
pub fn ifftshift(kernel: &Array3<f32>) -> Array3<f32> {
    let (nz, ny, nx) = kernel.dim();
    Array3::from_shape_fn((nz, ny, nx), |(z, y, x)| {
        kernel[[(z + nz / 2) % nz, (y + ny / 2) % ny, (x + nx / 2) % nx]]
    })
}

/// Promote a real volume to complex
pub fn to_complex(data: &Array3<f32>) -> Array3<Complex32> {
    data.mapv(|v| Complex32::new(v, 0.0))
}
