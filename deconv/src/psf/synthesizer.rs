//! Per-channel PSF synthesis for an experiment.

use super::gibson_lanni::{GibsonLanni, GibsonLanniParams};
use super::{ChannelPsf, PsfBank};
use crate::config::PsfModelConfig;
use crate::error::PipelineError;
use crate::metadata::{validate_channels, ChannelSpec, OpticalParameters};
use crate::progress::Progress;
use log::info;
use std::time::Instant;

/// Builds one Gibson–Lanni PSF per channel
#[derive(Debug, Clone, Default)]
pub struct PsfSynthesizer {
    model: PsfModelConfig,
}

impl PsfSynthesizer {
    pub fn new(model: PsfModelConfig) -> Self {
        Self { model }
    }

    pub fn model(&self) -> &PsfModelConfig {
        &self.model
    }

    /// Synthesize PSFs for `channels` in list order.
    ///
    /// Every parameter is validated before the first PSF is computed, so a
    /// bad channel late in the list fails without any work or progress. A
    /// [`Progress`] value is emitted after each channel completes; the bank
    /// is returned only once all channels have succeeded.
    pub fn synthesize(
        &self,
        optics: &OpticalParameters,
        channels: &[ChannelSpec],
        mut progress: impl FnMut(Progress),
    ) -> Result<PsfBank, PipelineError> {
        optics.validate()?;
        self.model.validate()?;
        validate_channels(channels)?;

        let generators = channels
            .iter()
            .map(|channel| {
                let params = GibsonLanniParams::new(optics, channel.wavelength_um(), &self.model);
                GibsonLanni::new(params)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let (nz, ny, nx) = optics.volume_shape();
        info!(
            "Synthesizing {} PSFs of {}×{}×{} (NA {}, {}x)",
            channels.len(),
            nz,
            ny,
            nx,
            optics.aperture,
            optics.magnification
        );

        let total = channels.len();
        let mut entries = Vec::with_capacity(total);
        for (n, (channel, generator)) in channels.iter().zip(generators).enumerate() {
            let start = Instant::now();
            let psf = generator.generate()?;
            info!(
                "PSF for {} ({} nm) generated in {:.2?}",
                channel.id,
                channel.wavelength_nm,
                start.elapsed()
            );
            entries.push(ChannelPsf {
                id: channel.id.clone(),
                wavelength_um: channel.wavelength_um(),
                psf,
            });
            progress(Progress::psf(n + 1, total));
        }

        Ok(PsfBank::from_entries(entries))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationError;
    use crate::progress::Stage;

    fn optics() -> OpticalParameters {
        OpticalParameters {
            tile_width: 12,
            tile_height: 10,
            num_z_planes: 3,
            magnification: 20.0,
            aperture: 0.75,
            z_pitch_nm: 1500.0,
            xy_resolution_nm: 325.0,
            ..OpticalParameters::default()
        }
    }

    fn channels() -> Vec<ChannelSpec> {
        vec![ChannelSpec::new("CH1", 488.0), ChannelSpec::new("CH2", 561.0)]
    }

    #[test]
    fn test_two_channels_emit_half_and_full() {
        let mut seen = Vec::new();
        let bank = PsfSynthesizer::default()
            .synthesize(&optics(), &channels(), |p| seen.push(p))
            .unwrap();

        assert_eq!(bank.channel_ids(), vec!["CH1", "CH2"]);
        assert_eq!(
            seen.iter().map(|p| p.percent).collect::<Vec<_>>(),
            vec![50.0, 100.0]
        );
        assert!(seen.iter().all(|p| p.stage == Stage::Psf && p.cycle.is_none()));
        for entry in bank.iter() {
            assert_eq!(entry.psf.shape(), (3, 10, 12));
        }
    }

    #[test]
    fn test_invalid_wavelength_fails_before_any_progress() {
        let mut chans = channels();
        chans.push(ChannelSpec::new("CH3", -1.0));
        let mut calls = 0;
        let err = PsfSynthesizer::default()
            .synthesize(&optics(), &chans, |_| calls += 1)
            .unwrap_err();

        assert!(matches!(
            err,
            PipelineError::Validation(ValidationError::Wavelength { .. })
        ));
        assert_eq!(calls, 0);
    }

    #[test]
    fn test_empty_channel_list_rejected() {
        let err = PsfSynthesizer::default()
            .synthesize(&optics(), &[], |_| {})
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Validation(ValidationError::NoChannels)
        ));
    }

    #[test]
    fn test_zero_aperture_rejected() {
        let mut bad = optics();
        bad.aperture = 0.0;
        let err = PsfSynthesizer::default()
            .synthesize(&bad, &channels(), |_| {})
            .unwrap_err();
        assert!(!err.is_pair_scoped());
    }
}
