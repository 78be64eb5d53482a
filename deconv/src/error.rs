//! Error taxonomy for the processing pipeline.
//!
//! [`ValidationError`] and [`MetadataError`] abort a run because every later
//! step depends on the shared parameters. [`PipelineError`] variants other
//! than validation are scoped to a single (cycle, channel) pair.

use crate::io::fits::FitsError;
use shared::image_proc::PlaneIoError;
use std::path::PathBuf;
use thiserror::Error;

/// Malformed, missing or out-of-range parameters, raised before computation
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("{field} must be a finite positive number, got {value}")]
    NotPositive { field: &'static str, value: f64 },
    #[error("{field} must be finite and non-negative, got {value}")]
    Negative { field: &'static str, value: f64 },
    #[error("{field} must be at least 1")]
    Zero { field: &'static str },
    #[error("channel list is empty")]
    NoChannels,
    #[error("channel {id} has invalid wavelength {value} nm")]
    Wavelength { id: String, value: f64 },
    #[error("duplicate channel id {0}")]
    DuplicateChannel(String),
    #[error("{field} has {actual} entries but numChannels is {expected}")]
    ListLength {
        field: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("no PSF available for channel {0}")]
    MissingPsf(String),
    #[error("{0} is not part of the experiment")]
    NotInExperiment(String),
}

/// Failure to load the experiment metadata sidecar
#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("failed to read metadata {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed metadata {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid metadata: {0}")]
    Validation(#[from] ValidationError),
}

/// Errors raised while synthesizing PSFs or deconvolving a (cycle, channel) pair
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),
    #[error("no input planes for cycle {cycle} channel {channel} (pattern {pattern})")]
    MissingInput {
        cycle: usize,
        channel: String,
        pattern: String,
    },
    #[error("{what} mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        what: &'static str,
        expected: String,
        actual: String,
    },
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid file pattern {pattern}: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },
    #[error("plane I/O error: {0}")]
    Plane(#[from] PlaneIoError),
    #[error("FITS error: {0}")]
    Fits(#[from] FitsError),
    #[error("PSF model failed: {0}")]
    Psf(String),
}

impl PipelineError {
    /// Whether the error only invalidates the current (cycle, channel) pair.
    pub fn is_pair_scoped(&self) -> bool {
        !matches!(self, PipelineError::Validation(_) | PipelineError::Psf(_))
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PipelineError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn mismatch(
        what: &'static str,
        expected: impl std::fmt::Debug,
        actual: impl std::fmt::Debug,
    ) -> Self {
        PipelineError::DimensionMismatch {
            what,
            expected: format!("{expected:?}"),
            actual: format!("{actual:?}"),
        }
    }
}
