//! Test helpers for the deconvolution workspace
//!
//! Provides a writer for small synthetic experiments laid out like a real
//! acquisition, so integration tests can run the pipeline end to end.

mod experiment;

pub use experiment::SyntheticExperiment;

use std::path::PathBuf;

/// Error type for test helper operations
#[derive(thiserror::Error, Debug)]
pub enum TestHelperError {
    #[error("Failed to write fixture {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to write fixture plane: {0}")]
    Plane(#[from] shared::image_proc::PlaneIoError),
    #[error("Failed to serialize fixture metadata: {0}")]
    Json(#[from] serde_json::Error),
}
