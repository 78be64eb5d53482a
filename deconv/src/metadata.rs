//! Experiment metadata and the optical parameters derived from it.
//!
//! The acquisition writes a JSON sidecar describing the tiling geometry,
//! the objective and the channel list. Only the fields the pipeline needs
//! are required; the rest are kept for the audit report.

use crate::config::require_positive;
use crate::error::{MetadataError, ValidationError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Experiment metadata sidecar as written by the acquisition software
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExperimentMetadata {
    #[serde(default)]
    pub name: Option<String>,
    pub num_cycles: usize,
    pub num_channels: usize,
    pub num_z_planes: usize,
    pub num_tiles: usize,
    pub tile_width: usize,
    pub tile_height: usize,
    #[serde(default)]
    pub region_width: Option<usize>,
    #[serde(default)]
    pub region_height: Option<usize>,
    pub magnification: f64,
    pub aperture: f64,
    /// Axial pixel pitch in nm
    pub z_pitch: f64,
    /// Lateral pixel pitch in nm
    pub xy_resolution: f64,
    /// Emission wavelengths in nm, one per channel
    pub wavelengths: Vec<f64>,
    #[serde(rename = "channel_names")]
    pub channel_names: Vec<String>,
}

impl ExperimentMetadata {
    /// Load and validate a metadata sidecar.
    pub fn load_from_file(path: &Path) -> Result<Self, MetadataError> {
        let json = std::fs::read_to_string(path).map_err(|source| MetadataError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let metadata: Self = serde_json::from_str(&json).map_err(|source| MetadataError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        metadata.validate()?;
        Ok(metadata)
    }

    /// Check the fields the pipeline depends on.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let counts = [
            ("numCycles", self.num_cycles),
            ("numChannels", self.num_channels),
            ("numTiles", self.num_tiles),
        ];
        for (field, value) in counts {
            if value == 0 {
                return Err(ValidationError::Zero { field });
            }
        }
        if self.wavelengths.len() != self.num_channels {
            return Err(ValidationError::ListLength {
                field: "wavelengths",
                expected: self.num_channels,
                actual: self.wavelengths.len(),
            });
        }
        if self.channel_names.len() != self.num_channels {
            return Err(ValidationError::ListLength {
                field: "channel_names",
                expected: self.num_channels,
                actual: self.channel_names.len(),
            });
        }
        self.optical_parameters().validate()?;
        validate_channels(&self.channels())
    }

    /// Optical constants shared by every channel
    pub fn optical_parameters(&self) -> OpticalParameters {
        OpticalParameters {
            tile_width: self.tile_width,
            tile_height: self.tile_height,
            num_z_planes: self.num_z_planes,
            magnification: self.magnification,
            aperture: self.aperture,
            z_pitch_nm: self.z_pitch,
            xy_resolution_nm: self.xy_resolution,
            ..OpticalParameters::default()
        }
    }

    /// Channels in metadata order, identified by their channel name
    pub fn channels(&self) -> Vec<ChannelSpec> {
        self.channel_names
            .iter()
            .zip(&self.wavelengths)
            .map(|(id, &wavelength_nm)| ChannelSpec::new(id.clone(), wavelength_nm))
            .collect()
    }

    /// Number of plane files expected per cycle folder
    pub fn files_per_cycle(&self) -> usize {
        self.num_channels * self.num_z_planes * self.num_tiles
    }
}

/// Per-experiment optical constants
///
/// Pitches are stored in nm as acquired; the model consumes microns through
/// [`res_axial_um`](Self::res_axial_um) and [`res_lateral_um`](Self::res_lateral_um).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OpticalParameters {
    pub tile_width: usize,
    pub tile_height: usize,
    pub num_z_planes: usize,
    pub magnification: f64,
    pub aperture: f64,
    pub z_pitch_nm: f64,
    pub xy_resolution_nm: f64,
    /// Design immersion refractive index
    pub immersion_index: f64,
    /// Axial particle position in microns; 0 yields a Born & Wolf kernel
    pub particle_offset_um: f64,
}

impl Default for OpticalParameters {
    fn default() -> Self {
        Self {
            tile_width: 0,
            tile_height: 0,
            num_z_planes: 0,
            magnification: 0.0,
            aperture: 0.0,
            z_pitch_nm: 0.0,
            xy_resolution_nm: 0.0,
            immersion_index: 1.0,
            particle_offset_um: 0.0,
        }
    }
}

impl OpticalParameters {
    pub fn res_axial_um(&self) -> f64 {
        self.z_pitch_nm / 1000.0
    }

    pub fn res_lateral_um(&self) -> f64 {
        self.xy_resolution_nm / 1000.0
    }

    /// PSF and volume shape (z, height, width)
    pub fn volume_shape(&self) -> (usize, usize, usize) {
        (self.num_z_planes, self.tile_height, self.tile_width)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        let sizes = [
            ("tileWidth", self.tile_width),
            ("tileHeight", self.tile_height),
            ("numZPlanes", self.num_z_planes),
        ];
        for (field, value) in sizes {
            if value == 0 {
                return Err(ValidationError::Zero { field });
            }
        }
        require_positive("magnification", self.magnification)?;
        require_positive("aperture", self.aperture)?;
        require_positive("zPitch", self.z_pitch_nm)?;
        require_positive("xyResolution", self.xy_resolution_nm)?;
        require_positive("immersion index", self.immersion_index)?;
        if !(self.particle_offset_um.is_finite() && self.particle_offset_um >= 0.0) {
            return Err(ValidationError::Negative {
                field: "particle offset",
                value: self.particle_offset_um,
            });
        }
        Ok(())
    }
}

/// An imaging channel and its emission wavelength
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelSpec {
    pub id: String,
    pub wavelength_nm: f64,
}

impl ChannelSpec {
    pub fn new(id: impl Into<String>, wavelength_nm: f64) -> Self {
        Self {
            id: id.into(),
            wavelength_nm,
        }
    }

    pub fn wavelength_um(&self) -> f64 {
        self.wavelength_nm / 1000.0
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.wavelength_nm.is_finite() && self.wavelength_nm > 0.0 {
            Ok(())
        } else {
            Err(ValidationError::Wavelength {
                id: self.id.clone(),
                value: self.wavelength_nm,
            })
        }
    }
}

/// Check a channel list is non-empty, has valid wavelengths and unique ids.
pub fn validate_channels(channels: &[ChannelSpec]) -> Result<(), ValidationError> {
    if channels.is_empty() {
        return Err(ValidationError::NoChannels);
    }
    let mut seen = HashSet::new();
    for channel in channels {
        channel.validate()?;
        if !seen.insert(channel.id.as_str()) {
            return Err(ValidationError::DuplicateChannel(channel.id.clone()));
        }
    }
    Ok(())
}
