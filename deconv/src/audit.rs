//! File layout audit of an experiment folder.
//!
//! Compares the number of cycle folders and plane files on disk against the
//! counts implied by the metadata. The report is advisory; the pipeline runs
//! whatever it finds and reports missing pairs on its own.

use crate::error::PipelineError;
use crate::layout::glob_files;
use crate::metadata::ExperimentMetadata;
use glob::Pattern;
use serde::Serialize;
use std::path::Path;

/// Expected vs. found count
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CountCheck {
    pub theoretical: usize,
    pub real: usize,
    pub pass: bool,
}

impl CountCheck {
    fn new(theoretical: usize, real: usize) -> Self {
        Self {
            theoretical,
            real,
            pass: theoretical == real,
        }
    }
}

/// Plane file count of one cycle folder
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CycleAudit {
    pub folder: String,
    pub files: CountCheck,
}

/// Summary of the experiment layout alongside the geometry it was checked against
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditReport {
    pub experiment_name: Option<String>,
    pub number_of_cycles: usize,
    pub number_of_channels: usize,
    pub number_of_z_planes: usize,
    pub number_of_tiles: usize,
    pub region_width: Option<usize>,
    pub region_height: Option<usize>,
    pub tile_width: usize,
    pub tile_height: usize,
    pub cycle_folders: CountCheck,
    pub files_per_cycle: Vec<CycleAudit>,
}

impl AuditReport {
    /// Whether every count matched
    pub fn passed(&self) -> bool {
        self.cycle_folders.pass && self.files_per_cycle.iter().all(|c| c.files.pass)
    }
}

/// Count `cyc*` folders under `root` and `*CH*` files inside each.
pub fn audit_experiment(
    root: &Path,
    metadata: &ExperimentMetadata,
) -> Result<AuditReport, PipelineError> {
    let base = Pattern::escape(&root.to_string_lossy());
    let mut cycle_dirs: Vec<_> = glob_files(&format!("{base}/cyc*"))?
        .into_iter()
        .filter(|p| p.is_dir())
        .collect();
    cycle_dirs.sort();

    let expected_files = metadata.files_per_cycle();
    let mut files_per_cycle = Vec::with_capacity(cycle_dirs.len());
    for dir in &cycle_dirs {
        let pattern = format!("{}/*CH*", Pattern::escape(&dir.to_string_lossy()));
        let found = glob_files(&pattern)?.len();
        files_per_cycle.push(CycleAudit {
            folder: dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            files: CountCheck::new(expected_files, found),
        });
    }

    Ok(AuditReport {
        experiment_name: metadata.name.clone(),
        number_of_cycles: metadata.num_cycles,
        number_of_channels: metadata.num_channels,
        number_of_z_planes: metadata.num_z_planes,
        number_of_tiles: metadata.num_tiles,
        region_width: metadata.region_width,
        region_height: metadata.region_height,
        tile_width: metadata.tile_width,
        tile_height: metadata.tile_height,
        cycle_folders: CountCheck::new(metadata.num_cycles, cycle_dirs.len()),
        files_per_cycle,
    })
}
