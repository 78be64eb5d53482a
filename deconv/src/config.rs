//! Pipeline configuration.
//!
//! Operational parameters that the experiment metadata does not carry: the
//! Gibson–Lanni model constants and the deconvolution engine settings. Every
//! field has a default so a partial JSON file only overrides what it names.

use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Gibson–Lanni model constants
///
/// Lengths are in microns. The immersion index of the design (`ni0`) comes
/// from the experiment's optical parameters; `ni` is the actual immersion
/// index and defaults to the design value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PsfModelConfig {
    /// Actual immersion refractive index. `None` uses the design index.
    pub ni: Option<f64>,
    /// Sample refractive index
    pub ns: f64,
    /// Coverslip refractive index (design)
    pub ng0: f64,
    /// Coverslip refractive index (actual)
    pub ng: f64,
    /// Immersion medium thickness (design)
    pub ti0: f64,
    /// Coverslip thickness (design)
    pub tg0: f64,
    /// Coverslip thickness (actual)
    pub tg: f64,
    /// Microscope tube length
    pub zd0: f64,
    /// Number of Bessel basis functions in the pupil expansion
    pub num_basis: usize,
    /// Number of pupil radius samples used for the fit
    pub num_samples: usize,
    /// Radial oversampling relative to the lateral pixel pitch
    pub oversampling: usize,
    /// Shortest wavelength the basis scaling is designed for
    pub min_wavelength: f64,
}

impl Default for PsfModelConfig {
    fn default() -> Self {
        Self {
            ni: None,
            ns: 1.33,
            ng0: 1.5,
            ng: 1.5,
            ti0: 150.0,
            tg0: 170.0,
            tg: 170.0,
            zd0: 200.0 * 1.0e3,
            num_basis: 100,
            num_samples: 1000,
            oversampling: 2,
            min_wavelength: 0.436,
        }
    }
}

impl PsfModelConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let positive = [
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
        if let Some(ni) = self.ni {
            require_positive("psf.ni", ni)?;
        }
        if self.num_basis == 0 {
            return Err(ValidationError::Zero {
                field: "psf.num_basis",
            });
        }
        if self.num_samples == 0 {
            return Err(ValidationError::Zero {
                field: "psf.num_samples",
            });
        }
        if self.oversampling == 0 {
            return Err(ValidationError::Zero {
                field: "psf.oversampling",
            });
        }
        Ok(())
    }
}

/// Deconvolution engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeconvolutionConfig {
    /// Richardson–Lucy iterations per chunk
    pub iterations: usize,
    /// Lateral chunk edge in pixels (interior, before the overlap halo)
    pub chunk_size: usize,
    /// Halo added on each lateral side of a chunk and discarded after restoration
    pub overlap: usize,
    /// Floor applied to the re-blurred estimate before division
    pub epsilon: f32,
    /// Restore chunks of a batch concurrently
    pub parallel: bool,
}

impl Default for DeconvolutionConfig {
    fn default() -> Self {
        Self {
            iterations: 30,
            chunk_size: 512,
            overlap: 32,
            epsilon: 1e-6,
            parallel: true,
        }
    }
}

impl DeconvolutionConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.iterations == 0 {
            return Err(ValidationError::Zero {
                field: "deconvolution.iterations",
            });
        }
        if self.chunk_size == 0 {
            return Err(ValidationError::Zero {
                field: "deconvolution.chunk_size",
            });
        }
        require_positive("deconvolution.epsilon", self.epsilon as f64)
    }
}

/// Complete pipeline configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub psf: PsfModelConfig,
    pub deconvolution: DeconvolutionConfig,
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.psf.validate()?;
        self.deconvolution.validate()
    }

    /// Load from JSON file
    pub fn load_from_file(path: &Path) -> Result<Self, std::io::Error> {
        let json = std::fs::read_to_string(path)?;
        serde_json::from_str(&json)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    /// Save to JSON file
    pub fn save_to_file(&self, path: &Path) -> Result<(), std::io::Error> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, json)
    }
}

pub(crate) fn require_positive(field: &'static str, value: f64) -> Result<(), ValidationError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ValidationError::NotPositive { field, value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_are_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.deconvolution.iterations, 30);
        assert_eq!(config.psf.num_basis, 100);
    }

    #[test]
    fn test_partial_json_overrides_only_named_fields() {
        let config: PipelineConfig =
            serde_json::from_str(r#"{"deconvolution": {"iterations": 5}}"#).unwrap();
        assert_eq!(config.deconvolution.iterations, 5);
        assert_eq!(config.deconvolution.chunk_size, 512);
        assert_eq!(config.psf, PsfModelConfig::default());
    }

    #[test]
    fn test_zero_iterations_rejected() {
        let config = DeconvolutionConfig {
            iterations: 0,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ValidationError::Zero {
                field: "deconvolution.iterations"
            })
        );
    }

    #[test]
    fn test_negative_index_rejected() {
        let config = PsfModelConfig {
            ni: Some(-1.0),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ValidationError::NotPositive { field: "psf.ni", .. })
        ));
    }

    #[test]
    fn test_file_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pipeline.json");
        let mut config = PipelineConfig::default();
        config.deconvolution.overlap = 8;
        config.psf.ns = 1.4;

        config.save_to_file(&path).unwrap();
        assert_eq!(PipelineConfig::load_from_file(&path).unwrap(), config);
    }
}
