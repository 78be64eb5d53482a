//! Richardson–Lucy deconvolution of one in-memory volume.
//!
//! Convolutions are evaluated in the Fourier domain with periodic
//! boundaries; chunk halos absorb the wrap-around at the edges. The update
//!
//! ```text
//! estimate ← estimate · ( (observed / max(estimate ⊛ psf, ε)) ⋆ psf )
//! ```
//!
//! starts from the observed data and is clamped at zero after each step.

use super::fft::{ifftshift, to_complex, Fft3};
use crate::error::PipelineError;
use ndarray::{Array3, Zip};
use rustfft::num_complex::Complex32;

/// Optical transfer function of a kernel on a fixed grid
pub struct TransferFunction {
    fft: Fft3,
    otf: Array3<Complex32>,
}

impl TransferFunction {
    /// Normalize a centered kernel to unit sum and transform it.
    ///
    /// The kernel center is taken at index (z/2, y/2, x/2) of its own shape.
    pub fn from_kernel(kernel: &Array3<f32>) -> Result<Self, PipelineError> {
        let total: f64 = kernel.iter().map(|&v| v as f64).sum();
        if !(total.is_finite() && total > 0.0) {
            return Err(PipelineError::Psf(format!(
                "kernel sum must be positive, got {total}"
            )));
        }
        let normalized = kernel.mapv(|v| (v as f64 / total) as f32);
        let fft = Fft3::new(kernel.dim());
        let mut otf = to_complex(&ifftshift(&normalized));
        fft.forward(&mut otf);
        Ok(Self { fft, otf })
    }

    pub fn shape(&self) -> (usize, usize, usize) {
        self.fft.shape()
    }

    /// Circular convolution with the kernel
    pub fn convolve(&self, data: &mut Array3<Complex32>) {
        self.apply(data, false);
    }

    /// Circular correlation with the kernel (convolution with its mirror)
    pub fn correlate(&self, data: &mut Array3<Complex32>) {
        self.apply(data, true);
    }

    fn apply(&self, data: &mut Array3<Complex32>, mirrored: bool) {
        self.fft.forward(data);
        Zip::from(&mut *data).and(&self.otf).par_for_each(|v, h| {
            *v *= if mirrored { h.conj() } else { *h };
        });
        self.fft.inverse(data);
    }
}

/// Restore `observed` against a kernel of the same shape.
pub fn richardson_lucy(
    observed: &Array3<f32>,
    kernel: &Array3<f32>,
    iterations: usize,
    epsilon: f32,
) -> Result<Array3<f32>, PipelineError> {
    if observed.dim() != kernel.dim() {
        return Err(PipelineError::mismatch(
            "kernel shape",
            observed.dim(),
            kernel.dim(),
        ));
    }
    let transfer = TransferFunction::from_kernel(kernel)?;
    Ok(richardson_lucy_with(observed, &transfer, iterations, epsilon))
}

/// Richardson–Lucy iterations against a precomputed transfer function
pub fn richardson_lucy_with(
    observed: &Array3<f32>,
    transfer: &TransferFunction,
    iterations: usize,
    epsilon: f32,
) -> Array3<f32> {
    let mut estimate = observed.mapv(|v| v.max(0.0));
    let mut work = Array3::<Complex32>::zeros(observed.dim());

    for _ in 0..iterations {
        Zip::from(&mut work)
            .and(&estimate)
            .par_for_each(|w, &e| *w = Complex32::new(e, 0.0));
        transfer.convolve(&mut work);

        Zip::from(&mut work)
            .and(observed)
            .par_for_each(|w, &o| *w = Complex32::new(o.max(0.0) / w.re.max(epsilon), 0.0));
        transfer.correlate(&mut work);

        Zip::from(&mut estimate)
            .and(&work)
            .par_for_each(|e, w| *e = (*e * w.re).max(0.0));
    }

    estimate
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use shared::image_proc::test_patterns::{generate_bead_volume, Bead};

    fn delta(shape: (usize, usize, usize)) -> Array3<f32> {
        let mut k = Array3::zeros(shape);
        k[[shape.0 / 2, shape.1 / 2, shape.2 / 2]] = 1.0;
        k
    }

    fn gaussian_kernel(shape: (usize, usize, usize), sigma_z: f32, sigma_xy: f32) -> Array3<f32> {
        let beads = [Bead {
            z: shape.0 / 2,
            y: shape.1 / 2,
            x: shape.2 / 2,
            brightness: 1.0,
        }];
        generate_bead_volume(shape, &beads, sigma_z, sigma_xy, 0.0)
    }

    fn blur(volume: &Array3<f32>, kernel: &Array3<f32>) -> Array3<f32> {
        let transfer = TransferFunction::from_kernel(kernel).unwrap();
        let mut work = to_complex(volume);
        transfer.convolve(&mut work);
        work.mapv(|v| v.re.max(0.0))
    }

    #[test]
    fn test_delta_kernel_is_identity() {
        let shape = (3, 8, 8);
        let observed = Array3::from_shape_fn(shape, |(z, y, x)| 1.0 + (z + y * x) as f32);
        let restored = richardson_lucy(&observed, &delta(shape), 5, 1e-6).unwrap();
        for (r, o) in restored.iter().zip(observed.iter()) {
            assert_relative_eq!(*r, *o, epsilon = 1e-3);
        }
    }

    #[test]
    fn test_conserves_flux_and_stays_non_negative() {
        let shape = (5, 16, 16);
        let kernel = gaussian_kernel(shape, 1.0, 1.5);
        let truth = generate_bead_volume(
            shape,
            &[
                Bead {
                    z: 2,
                    y: 5,
                    x: 5,
                    brightness: 100.0,
                },
                Bead {
                    z: 2,
                    y: 10,
                    x: 11,
                    brightness: 60.0,
                },
            ],
            0.5,
            0.5,
            1.0,
        );
        let observed = blur(&truth, &kernel);
        let restored = richardson_lucy(&observed, &kernel, 10, 1e-6).unwrap();

        assert!(restored.iter().all(|&v| v >= 0.0));
        assert_relative_eq!(restored.sum(), observed.sum(), max_relative = 1e-3);
    }

    #[test]
    fn test_sharpens_blurred_point() {
        let shape = (3, 16, 16);
        let kernel = gaussian_kernel(shape, 0.8, 1.5);
        let mut truth = Array3::from_elem(shape, 0.1_f32);
        truth[[1, 8, 8]] = 100.0;
        let observed = blur(&truth, &kernel);

        let restored = richardson_lucy(&observed, &kernel, 20, 1e-6).unwrap();
        assert!(restored[[1, 8, 8]] > observed[[1, 8, 8]] * 1.5);
    }

    #[test]
    fn test_shape_mismatch() {
        let err = richardson_lucy(&delta((3, 8, 8)), &delta((3, 8, 6)), 1, 1e-6).unwrap_err();
        assert!(matches!(err, PipelineError::DimensionMismatch { .. }));
    }

    #[test]
    fn test_zero_kernel_rejected() {
        let err = richardson_lucy(&delta((1, 4, 4)), &Array3::zeros((1, 4, 4)), 1, 1e-6)
            .unwrap_err();
        assert!(matches!(err, PipelineError::Psf(_)));
    }
}
