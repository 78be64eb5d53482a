//! Experiment directory layout: input plane discovery and output naming.
//!
//! Inputs live in per-cycle folders `cyc<NNN>_…` next to the metadata file,
//! one TIFF per tile and Z-plane whose name ends in the channel name.
//! Outputs go to `processed_<MM>_<DD>_<YYYY>/deconvolution/` under the same
//! root, one dataset per (cycle, channel).

use crate::error::PipelineError;
use chrono::NaiveDate;
use glob::Pattern;
use std::path::{Path, PathBuf};

/// Subfolder of the processed folder holding restored volumes
pub const DECONVOLUTION_DIR: &str = "deconvolution";

/// Extension of restored datasets
pub const OUTPUT_EXTENSION: &str = "fits";

/// `cyc<NNN>` label of a 1-based cycle index
pub fn cycle_label(cycle: usize) -> String {
    format!("cyc{cycle:03}")
}

/// Glob selecting the planes of one (cycle, channel) pair
pub fn channel_glob(root: &Path, cycle: usize, channel: &str) -> String {
    let root = Pattern::escape(&root.to_string_lossy());
    format!(
        "{}/{}*/*{}.tif",
        root,
        cycle_label(cycle),
        Pattern::escape(channel)
    )
}

/// Planes of one (cycle, channel) pair in lexicographic order.
///
/// # Returns
/// `MissingInput` when the glob matches nothing.
pub fn find_channel_planes(
    root: &Path,
    cycle: usize,
    channel: &str,
) -> Result<Vec<PathBuf>, PipelineError> {
    let pattern = channel_glob(root, cycle, channel);
    let mut paths = glob_files(&pattern)?;
    if paths.is_empty() {
        return Err(PipelineError::MissingInput {
            cycle,
            channel: channel.to_string(),
            pattern,
        });
    }
    paths.sort();
    Ok(paths)
}

pub(crate) fn glob_files(pattern: &str) -> Result<Vec<PathBuf>, PipelineError> {
    let entries = glob::glob(pattern).map_err(|source| PipelineError::Pattern {
        pattern: pattern.to_string(),
        source,
    })?;
    entries
        .map(|entry| entry.map_err(|e| PipelineError::io(e.path().to_path_buf(), e.into_error())))
        .collect()
}

/// `processed_<MM>_<DD>_<YYYY>`
pub fn processed_dir_name(date: NaiveDate) -> String {
    date.format("processed_%m_%d_%Y").to_string()
}

/// Folder receiving the restored volumes of a processing date
pub fn output_dir(root: &Path, date: NaiveDate) -> PathBuf {
    root.join(processed_dir_name(date)).join(DECONVOLUTION_DIR)
}

/// `deconvolution_cyc<NNN>_<channel>.fits`
pub fn output_file_name(cycle: usize, channel: &str) -> String {
    format!(
        "deconvolution_{}_{}.{}",
        cycle_label(cycle),
        channel,
        OUTPUT_EXTENSION
    )
}

pub fn output_path(root: &Path, date: NaiveDate, cycle: usize, channel: &str) -> PathBuf {
    output_dir(root, date).join(output_file_name(cycle, channel))
}

/// Create the processed folder tree for `date`, returning the deconvolution folder.
pub fn create_folder_structure(root: &Path, date: NaiveDate) -> Result<PathBuf, PipelineError> {
    let dir = output_dir(root, date);
    std::fs::create_dir_all(&dir).map_err(|e| PipelineError::io(&dir, e))?;
    Ok(dir)
}
