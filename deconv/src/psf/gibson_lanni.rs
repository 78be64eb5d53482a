//! Gibson–Lanni point spread function for a widefield fluorescence objective.
//!
//! The Gibson–Lanni model describes the defocus and spherical aberration
//! introduced when the specimen, coverslip and immersion medium deviate from
//! the objective's design conditions. Evaluating the Kirchhoff integral
//! directly is expensive, so this module uses the fast approximation of
//! Li, Xue & Blu (2017): the pupil phase is expanded in a Fourier–Bessel
//! basis, after which the radial integral has a closed form per basis term.
//!
//! # Model
//!
//! For a normalized pupil radius ρ and defocus z the optical path difference is
//!
//! ```text
//! OPD(ρ, z) = k · ( pz·√(ns² − NA²ρ²)
//!                 + ti·√(ni² − NA²ρ²) − ti0·√(ni0² − NA²ρ²)
//!                 + tg·√(ng² − NA²ρ²) − tg0·√(ng0² − NA²ρ²) )
//! ```
//!
//! with `ti = z + ti0` and `k = 2π/λ`. The phase `exp(i·OPD)` is fitted by
//! least squares to `Σ_j C_j(z)·J0(σ_j ρ)`, and the radial field becomes
//!
//! ```text
//! U(r, z) = Σ_j R_j(r)·C_j(z)
//! R_j(r)  = ∫₀^ρmax J0(σ_j ρ)·J0(b ρ)·ρ dρ,    b = k·a·r·M / zd0
//! ```
//!
//! The intensity `|U|²` is computed on an oversampled radial grid and
//! interpolated onto the pixel grid of each plane.
//!
//! # Units
//!
//! All lengths are microns. The tube length `zd0` is therefore 200 000 for a
//! 200 mm tube.

use super::bessel::{j0, j1};
use super::PsfVolume;
use crate::config::{require_positive, PsfModelConfig};
use crate::error::{PipelineError, ValidationError};
use crate::metadata::OpticalParameters;
use log::debug;
use nalgebra::DMatrix;
use ndarray::{Array2, Array3, Axis};
use rayon::prelude::*;
use std::f64::consts::PI;

/// Fully resolved parameters of one Gibson–Lanni evaluation
#[derive(Debug, Clone, PartialEq)]
pub struct GibsonLanniParams {
    /// Output shape (z, height, width)
    pub shape: (usize, usize, usize),
    /// Lateral pixel pitch in the specimen plane
    pub res_lateral: f64,
    /// Axial step between planes
    pub res_axial: f64,
    /// Emission wavelength
    pub wavelength: f64,
    pub numerical_aperture: f64,
    pub magnification: f64,
    /// Immersion refractive index, design and actual
    pub ni0: f64,
    pub ni: f64,
    /// Specimen refractive index
    pub ns: f64,
    /// Coverslip refractive index, design and actual
    pub ng0: f64,
    pub ng: f64,
    /// Immersion thickness (design)
    pub ti0: f64,
    /// Coverslip thickness, design and actual
    pub tg0: f64,
    pub tg: f64,
    /// Tube length
    pub zd0: f64,
    /// Particle depth below the coverslip
    pub pz: f64,
    pub num_basis: usize,
    pub num_samples: usize,
    pub oversampling: usize,
    pub min_wavelength: f64,
}

impl GibsonLanniParams {
    /// Combine the experiment optics, one channel wavelength and the model constants.
    pub fn new(optics: &OpticalParameters, wavelength_um: f64, model: &PsfModelConfig) -> Self {
        Self {
            shape: optics.volume_shape(),
            res_lateral: optics.res_lateral_um(),
            res_axial: optics.res_axial_um(),
            wavelength: wavelength_um,
            numerical_aperture: optics.aperture,
            magnification: optics.magnification,
            ni0: optics.immersion_index,
            ni: model.ni.unwrap_or(optics.immersion_index),
            ns: model.ns,
            ng0: model.ng0,
            ng: model.ng,
            ti0: model.ti0,
            tg0: model.tg0,
            tg: model.tg,
            zd0: model.zd0,
            pz: optics.particle_offset_um,
            num_basis: model.num_basis,
            num_samples: model.num_samples,
            oversampling: model.oversampling,
            min_wavelength: model.min_wavelength,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        let (nz, ny, nx) = self.shape;
        for (field, value) in [("numZPlanes", nz), ("tileHeight", ny), ("tileWidth", nx)] {
            if value == 0 {
                return Err(ValidationError::Zero { field });
            }
        }
        let positive = [
            ("xyResolution", self.res_lateral),
            ("zPitch", self.res_axial),
            ("wavelength", self.wavelength),
            ("aperture", self.numerical_aperture),
            ("magnification", self.magnification),
            ("psf.ni0", self.ni0),
            ("psf.ni", self.ni),
            ("psf.ns", self.ns),
            ("psf.ng0", self.ng0),
            ("psf.ng", self.ng),
            ("psf.ti0", self.ti0),
            ("psf.tg0", self.tg0),
            ("psf.tg", self.tg),
            ("psf.zd0", self.zd0),
            ("psf.min_wavelength", self.min_wavelength),
        ];
        for (field, value) in positive {
            require_positive(field, value)?;
        }
        if !(self.pz.is_finite() && self.pz >= 0.0) {
            return Err(ValidationError::Negative {
                field: "particle offset",
                value: self.pz,
            });
        }
        for (field, value) in [
            ("psf.num_basis", self.num_basis),
            ("psf.num_samples", self.num_samples),
            ("psf.oversampling", self.oversampling),
        ] {
            if value == 0 {
                return Err(ValidationError::Zero { field });
            }
        }
        Ok(())
    }

    /// Largest normalized pupil radius that stays below every critical angle
    pub fn max_rho(&self) -> f64 {
        [self.ng0, self.ng, self.ni0, self.ni, self.ns]
            .into_iter()
            .fold(self.numerical_aperture, f64::min)
            / self.numerical_aperture
    }

    /// Radial sample spacing
    pub fn radial_step(&self) -> f64 {
        self.res_lateral / self.oversampling as f64
    }

    /// Axial offset of plane `i` from the focal plane
    pub fn plane_offset(&self, i: usize) -> f64 {
        let center = (self.shape.0 / 2) as f64;
        self.res_axial * (i as f64 - center)
    }
}

/// Gibson–Lanni PSF generator
#[derive(Debug, Clone)]
pub struct GibsonLanni {
    params: GibsonLanniParams,
}

impl GibsonLanni {
    pub fn new(params: GibsonLanniParams) -> Result<Self, ValidationError> {
        params.validate()?;
        Ok(Self { params })
    }

    pub fn params(&self) -> &GibsonLanniParams {
        &self.params
    }

    /// Radii at which the radial profile is evaluated.
    ///
    /// Starts on the optical axis and reaches one pixel past the half
    /// diagonal so interpolation never reads past the last sample.
    pub fn radial_samples(&self) -> Vec<f64> {
        let p = &self.params;
        let (_, ny, nx) = p.shape;
        let half_x = (nx - nx / 2) as f64;
        let half_y = (ny - ny / 2) as f64;
        let max_radius = p.res_lateral * ((half_x * half_x + half_y * half_y).sqrt() + 1.0);
        let dr = p.radial_step();
        let count = (max_radius / dr).ceil() as usize + 2;
        (0..count).map(|i| i as f64 * dr).collect()
    }

    /// Unnormalized intensity on the (z, r) grid of [`radial_samples`](Self::radial_samples).
    pub fn radial_profile(&self) -> Result<Array2<f64>, PipelineError> {
        let p = &self.params;
        let nz = p.shape.0;
        let nb = p.num_basis;
        let ns = p.num_samples;
        let na = p.numerical_aperture;
        let k = 2.0 * PI / p.wavelength;
        let max_rho = p.max_rho();

        let scaling: Vec<f64> = (1..=nb)
            .map(|j| na * (3 * j - 2) as f64 * p.min_wavelength / p.wavelength)
            .collect();
        let rho: Vec<f64> = if ns == 1 {
            vec![0.0]
        } else {
            (0..ns)
                .map(|i| max_rho * i as f64 / (ns - 1) as f64)
                .collect()
        };

        let basis = DMatrix::from_fn(ns, nb, |i, j| j0(scaling[j] * rho[i]));

        // Pupil phase, real parts in the first nz columns, imaginary in the rest
        let phase = DMatrix::from_fn(ns, 2 * nz, |i, col| {
            let z = p.plane_offset(col % nz);
            let opd = k * self.optical_path_difference(rho[i], z);
            if col < nz {
                opd.cos()
            } else {
                opd.sin()
            }
        });

        let svd = basis.svd(true, true);
        let eps = svd.singular_values.max() * f64::EPSILON * ns.max(nb) as f64;
        let coefficients = svd
            .solve(&phase, eps)
            .map_err(|e| PipelineError::Psf(format!("pupil fit failed: {e}")))?;

        let rv = self.radial_samples();
        let a = na * p.zd0 / (p.magnification * p.magnification + na * na).sqrt();
        let radial = DMatrix::from_fn(rv.len(), nb, |i, j| {
            let b = k * a * rv[i] * p.magnification / p.zd0;
            basis_integral(scaling[j], b, max_rho)
        });

        let field = radial * coefficients;
        let profile = Array2::from_shape_fn((nz, rv.len()), |(z, r)| {
            let re = field[(r, z)];
            let im = field[(r, z + nz)];
            re * re + im * im
        });

        debug!(
            "Gibson-Lanni radial profile: λ={:.3}µm, {} planes × {} radii, ρmax={:.3}",
            p.wavelength,
            nz,
            rv.len(),
            max_rho
        );
        Ok(profile)
    }

    /// Generate the PSF volume, normalized to a peak of 1.
    pub fn generate(&self) -> Result<PsfVolume, PipelineError> {
        let p = &self.params;
        let (nz, ny, nx) = p.shape;
        let profile = self.radial_profile()?;

        let peak = profile.iter().copied().fold(0.0_f64, f64::max);
        if !(peak.is_finite() && peak > 0.0) {
            return Err(PipelineError::Psf(format!(
                "degenerate intensity profile for λ={}µm (peak {peak})",
                p.wavelength
            )));
        }

        let last = profile.ncols() - 1;
        let cx = (nx / 2) as f64;
        let cy = (ny / 2) as f64;
        let pixels_per_sample = p.oversampling as f64;

        let mut volume = Array3::<f32>::zeros((nz, ny, nx));
        volume
            .axis_iter_mut(Axis(0))
            .into_par_iter()
            .enumerate()
            .for_each(|(z, mut plane)| {
                let radial = profile.row(z);
                for ((y, x), value) in plane.indexed_iter_mut() {
                    let dx = x as f64 - cx;
                    let dy = y as f64 - cy;
                    let pos = (dx * dx + dy * dy).sqrt() * pixels_per_sample;
                    let i0 = (pos.floor() as usize).min(last);
                    let i1 = (i0 + 1).min(last);
                    let t = pos - i0 as f64;
                    let v = radial[i0] * (1.0 - t) + radial[i1] * t;
                    *value = (v / peak) as f32;
                }
            });

        Ok(PsfVolume::new(volume))
    }

    fn optical_path_difference(&self, rho: f64, z: f64) -> f64 {
        let p = &self.params;
        let na_rho2 = (p.numerical_aperture * rho).powi(2);
        let term = |n: f64| (n * n - na_rho2).max(0.0).sqrt();
        let ti = z + p.ti0;
        p.pz * term(p.ns) + ti * term(p.ni) - p.ti0 * term(p.ni0) + p.tg * term(p.ng)
            - p.tg0 * term(p.ng0)
    }
}

/// ∫₀^ρm J0(σρ)·J0(bρ)·ρ dρ
fn basis_integral(sigma: f64, b: f64, max_rho: f64) -> f64 {
    let denom = sigma * sigma - b * b;
    if denom.abs() < 1e-9 * sigma.max(1.0).powi(2) {
        let x = sigma * max_rho;
        let (j0x, j1x) = (j0(x), j1(x));
        return max_rho * max_rho * 0.5 * (j0x * j0x + j1x * j1x);
    }
    let s = sigma * max_rho;
    let t = b * max_rho;
    (sigma * j1(s) * j0(t) * max_rho - b * j0(s) * j1(t) * max_rho) / denom
}
