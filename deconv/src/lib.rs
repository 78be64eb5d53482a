//! PSF synthesis and out-of-core deconvolution for tiled multi-cycle microscopy.
//!
//! An experiment is described by a JSON metadata sidecar and a folder of
//! single-plane TIFFs, one per (cycle, tile, Z-plane, channel). Processing
//! runs in two stages:
//!
//! 1. **PSF synthesis** ([`psf`]): one Gibson–Lanni PSF per channel from the
//!    shared optics and the channel's emission wavelength.
//! 2. **Deconvolution** ([`deconvolution`]): each (cycle, channel) stack is
//!    restored chunk by chunk with Richardson–Lucy and streamed into a FITS
//!    dataset under `processed_<date>/deconvolution/`.
//!
//! [`pipeline::Session`] ties the stages together and reports per-pair
//! outcomes so a run with missing inputs can be completed later.
//!
//! ```no_run
//! use deconv::config::PipelineConfig;
//! use deconv::pipeline::{Selection, Session};
//! use std::path::Path;
//!
//! let mut session =
//!     Session::from_metadata_file(Path::new("experiment.json"), PipelineConfig::default())?;
//! session.create_folder_structure()?;
//! session.synthesize_psfs(|p| println!("psf {:.0}%", p.percent))?;
//! let report = session.deconvolve_all(&Selection::all(), |p| {
//!     println!("cycle {:?}: {:.0}%", p.cycle, p.percent)
//! })?;
//! println!("{} pairs failed", report.failed().count());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod audit;
pub mod config;
pub mod deconvolution;
pub mod error;
pub mod io;
pub mod layout;
pub mod metadata;
pub mod pipeline;
pub mod progress;
pub mod psf;
pub mod stack;

pub use config::{DeconvolutionConfig, PipelineConfig, PsfModelConfig};
pub use error::{MetadataError, PipelineError, ValidationError};
pub use metadata::{ChannelSpec, ExperimentMetadata, OpticalParameters};
pub use pipeline::{PairOutcome, RunReport, Selection, Session};
pub use progress::{Progress, Stage};
pub use psf::{PsfBank, PsfVolume};
