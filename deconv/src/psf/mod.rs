//! Theoretical point spread functions for widefield fluorescence optics.
//!
//! A PSF is synthesized per imaging channel from the shared optical
//! parameters and the channel's emission wavelength using the Gibson–Lanni
//! model (see [`gibson_lanni`]). With the particle placed at the coverslip
//! (`pz = 0`) and matched immersion media the model reduces to the Born &
//! Wolf kernel of an aberration-free objective.

pub mod bessel;
pub mod gibson_lanni;
pub mod synthesizer;

pub use gibson_lanni::{GibsonLanni, GibsonLanniParams};
pub use synthesizer::PsfSynthesizer;

use ndarray::{s, Array3};

/// Dense PSF volume of shape (z, height, width), normalized to a peak of 1
///
/// The optical axis sits at pixel (height / 2, width / 2) and the focal
/// plane at index z / 2.
#[derive(Debug, Clone, PartialEq)]
pub struct PsfVolume(Array3<f32>);

impl PsfVolume {
    pub fn new(data: Array3<f32>) -> Self {
        Self(data)
    }

    pub fn shape(&self) -> (usize, usize, usize) {
        self.0.dim()
    }

    pub fn data(&self) -> &Array3<f32> {
        &self.0
    }

    pub fn into_inner(self) -> Array3<f32> {
        self.0
    }

    /// Center crop to (z, height, width), keeping the optical axis at the
    /// center index of the crop.
    ///
    /// # Returns
    /// `None` if the requested shape exceeds the volume on any axis.
    pub fn center_crop(&self, shape: (usize, usize, usize)) -> Option<Array3<f32>> {
        let (nz, ny, nx) = self.0.dim();
        let (cz, cy, cx) = shape;
        if cz > nz || cy > ny || cx > nx {
            return None;
        }
        let z0 = nz / 2 - cz / 2;
        let y0 = ny / 2 - cy / 2;
        let x0 = nx / 2 - cx / 2;
        Some(
            self.0
                .slice(s![z0..z0 + cz, y0..y0 + cy, x0..x0 + cx])
                .to_owned(),
        )
    }
}

/// PSF of one channel together with the wavelength it was generated for
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelPsf {
    pub id: String,
    pub wavelength_um: f64,
    pub psf: PsfVolume,
}

/// Channel id → PSF mapping, in channel order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PsfBank {
    entries: Vec<ChannelPsf>,
}

impl PsfBank {
    pub(crate) fn from_entries(entries: Vec<ChannelPsf>) -> Self {
        Self { entries }
    }

    pub fn get(&self, id: &str) -> Option<&ChannelPsf> {
        self.entries.iter().find(|entry| entry.id == id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChannelPsf> {
        self.entries.iter()
    }

    pub fn channel_ids(&self) -> Vec<&str> {
        self.entries.iter().map(|entry| entry.id.as_str()).collect()
    }
}
