//! Synthetic multi-cycle experiment fixtures.
//!
//! Writes a metadata sidecar plus one 16-bit TIFF per (cycle, tile, Z-plane,
//! channel) using the acquisition naming scheme
//! `cyc<NNN>_reg001/1_<tile:05>_Z<z:03>_<channel>.tif`.

use crate::TestHelperError;
use ndarray::Array3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;
use shared::image_proc::io::save_u16_plane;
use shared::image_proc::test_patterns::{generate_bead_volume, Bead};
use std::fs;
use std::path::{Path, PathBuf};

/// Name of the metadata sidecar written at the experiment root
pub const METADATA_FILE: &str = "experiment.json";

/// Description of a small synthetic acquisition
#[derive(Debug, Clone)]
pub struct SyntheticExperiment {
    pub name: String,
    pub num_cycles: usize,
    pub channel_names: Vec<String>,
    pub wavelengths_nm: Vec<f64>,
    pub num_z_planes: usize,
    pub num_tiles: usize,
    pub tile_width: usize,
    pub tile_height: usize,
    pub magnification: f64,
    pub aperture: f64,
    pub z_pitch_nm: f64,
    pub xy_resolution_nm: f64,
    /// (cycle, channel) pairs whose plane files are not written
    pub omitted: Vec<(usize, String)>,
    /// Seed for the additive read noise
    pub seed: u64,
}

impl Default for SyntheticExperiment {
    fn default() -> Self {
        Self {
            name: "synthetic".to_string(),
            num_cycles: 1,
            channel_names: vec!["CH1".to_string(), "CH2".to_string()],
            wavelengths_nm: vec![488.0, 561.0],
            num_z_planes: 5,
            num_tiles: 1,
            tile_width: 40,
            tile_height: 32,
            magnification: 20.0,
            aperture: 0.75,
            z_pitch_nm: 1500.0,
            xy_resolution_nm: 325.0,
            omitted: Vec::new(),
            seed: 7,
        }
    }
}

impl SyntheticExperiment {
    /// Skip writing planes for one (cycle, channel) pair.
    pub fn omit(mut self, cycle: usize, channel: &str) -> Self {
        self.omitted.push((cycle, channel.to_string()));
        self
    }

    /// Metadata sidecar contents in the acquisition JSON layout
    pub fn metadata_json(&self) -> serde_json::Value {
        json!({
            "name": self.name,
            "numCycles": self.num_cycles,
            "numChannels": self.channel_names.len(),
            "numZPlanes": self.num_z_planes,
            "numTiles": self.num_tiles,
            "tileWidth": self.tile_width,
            "tileHeight": self.tile_height,
            "regionWidth": self.num_tiles,
            "regionHeight": 1,
            "magnification": self.magnification,
            "aperture": self.aperture,
            "zPitch": self.z_pitch_nm,
            "xyResolution": self.xy_resolution_nm,
            "wavelengths": self.wavelengths_nm,
            "channel_names": self.channel_names,
        })
    }

    /// Cycle folder name for a 1-based cycle index
    pub fn cycle_dir_name(cycle: usize) -> String {
        format!("cyc{cycle:03}_reg001")
    }

    /// Plane file name for 0-based tile and Z indices
    pub fn plane_file_name(tile: usize, z: usize, channel: &str) -> String {
        format!("1_{:05}_Z{:03}_{}.tif", tile + 1, z + 1, channel)
    }

    /// The phantom volume written for one (cycle, tile, channel)
    pub fn phantom(&self, cycle: usize, tile: usize, channel_index: usize) -> Array3<f32> {
        let shape = (self.num_z_planes, self.tile_height, self.tile_width);
        let beads = [
            Bead {
                z: self.num_z_planes / 2,
                y: self.tile_height / 3,
                x: self.tile_width / 3,
                brightness: 4000.0 + 250.0 * channel_index as f32,
            },
            Bead {
                z: self.num_z_planes / 2,
                y: (2 * self.tile_height) / 3,
                x: (2 * self.tile_width) / 3 + tile,
                brightness: 2500.0 + 100.0 * cycle as f32,
            },
        ];
        let mut volume = generate_bead_volume(shape, &beads, 1.2, 1.8, 100.0);

        let mut rng = StdRng::seed_from_u64(
            self.seed ^ ((cycle as u64) << 32) ^ ((tile as u64) << 16) ^ channel_index as u64,
        );
        volume.mapv_inplace(|v| v + rng.gen_range(0.0..10.0));
        volume
    }

    /// Write the metadata sidecar and all plane files under `root`.
    ///
    /// # Returns
    /// Path to the metadata sidecar
    pub fn write(&self, root: &Path) -> Result<PathBuf, TestHelperError> {
        fs::create_dir_all(root).map_err(|source| TestHelperError::Io {
            path: root.to_path_buf(),
            source,
        })?;

        let metadata_path = root.join(METADATA_FILE);
        let contents = serde_json::to_string_pretty(&self.metadata_json())?;
        fs::write(&metadata_path, contents).map_err(|source| TestHelperError::Io {
            path: metadata_path.clone(),
            source,
        })?;

        for cycle in 1..=self.num_cycles {
            let cycle_dir = root.join(Self::cycle_dir_name(cycle));
            fs::create_dir_all(&cycle_dir).map_err(|source| TestHelperError::Io {
                path: cycle_dir.clone(),
                source,
            })?;

            for (channel_index, channel) in self.channel_names.iter().enumerate() {
                if self
                    .omitted
                    .iter()
                    .any(|(c, name)| *c == cycle && name == channel)
                {
                    continue;
                }

                for tile in 0..self.num_tiles {
                    let volume = self.phantom(cycle, tile, channel_index);
                    for (z, plane) in volume.outer_iter().enumerate() {
                        let path = cycle_dir.join(Self::plane_file_name(tile, z, channel));
                        save_u16_plane(&plane.to_owned(), &path)?;
                    }
                }
            }
        }

        Ok(metadata_path)
    }
}
