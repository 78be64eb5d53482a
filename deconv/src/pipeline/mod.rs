//! Session-scoped orchestration of PSF synthesis and deconvolution.
//!
//! A [`Session`] owns an immutable snapshot of the experiment metadata, the
//! derived optics and channel list, and the PSF bank once it is built. The
//! deconvolution loop runs cycles then channels in order; failures of one
//! pair are recorded in the [`RunReport`] and the loop moves on.

mod report;

pub use report::{PairOutcome, PairReport, RunReport};

use crate::audit::{audit_experiment, AuditReport};
use crate::config::PipelineConfig;
use crate::deconvolution::{DeconvolutionEngine, DeconvolutionSummary};
use crate::error::{MetadataError, PipelineError, ValidationError};
use crate::layout;
use crate::metadata::{ChannelSpec, ExperimentMetadata, OpticalParameters};
use crate::progress::Progress;
use crate::psf::{PsfBank, PsfSynthesizer};
use crate::stack::TiledStack;
use chrono::{Local, NaiveDate};
use log::{info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Subset of (cycle, channel) pairs to process; empty fields select everything
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    pub cycles: Vec<usize>,
    pub channels: Vec<String>,
}

impl Selection {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with_cycles(mut self, cycles: impl IntoIterator<Item = usize>) -> Self {
        self.cycles.extend(cycles);
        self
    }

    pub fn with_channels<S: Into<String>>(mut self, channels: impl IntoIterator<Item = S>) -> Self {
        self.channels.extend(channels.into_iter().map(Into::into));
        self
    }

    pub fn includes_cycle(&self, cycle: usize) -> bool {
        self.cycles.is_empty() || self.cycles.contains(&cycle)
    }

    pub fn includes_channel(&self, channel: &str) -> bool {
        self.channels.is_empty() || self.channels.iter().any(|c| c == channel)
    }

    /// Reject cycles and channels the experiment does not have.
    pub fn validate(&self, num_cycles: usize, channels: &[ChannelSpec]) -> Result<(), ValidationError> {
        if let Some(cycle) = self.cycles.iter().find(|&&c| c == 0 || c > num_cycles) {
            return Err(ValidationError::NotInExperiment(format!("cycle {cycle}")));
        }
        if let Some(name) = self
            .channels
            .iter()
            .find(|name| !channels.iter().any(|c| &c.id == *name))
        {
            return Err(ValidationError::NotInExperiment(format!("channel {name}")));
        }
        Ok(())
    }
}

/// Processing context for one experiment
#[derive(Debug, Clone)]
pub struct Session {
    root: PathBuf,
    metadata: Arc<ExperimentMetadata>,
    optics: OpticalParameters,
    channels: Vec<ChannelSpec>,
    config: PipelineConfig,
    date: NaiveDate,
    psfs: Option<Arc<PsfBank>>,
}

impl Session {
    /// Load the metadata sidecar; the experiment root is the folder containing it.
    pub fn from_metadata_file(path: &Path, config: PipelineConfig) -> Result<Self, MetadataError> {
        let metadata = ExperimentMetadata::load_from_file(path)?;
        let root = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Self::new(root, metadata, config)
    }

    /// Build a session dated today.
    pub fn new(
        root: impl Into<PathBuf>,
        metadata: ExperimentMetadata,
        config: PipelineConfig,
    ) -> Result<Self, MetadataError> {
        metadata.validate()?;
        config.validate()?;
        let optics = metadata.optical_parameters();
        let channels = metadata.channels();
        Ok(Self {
            root: root.into(),
            metadata: Arc::new(metadata),
            optics,
            channels,
            config,
            date: Local::now().date_naive(),
            psfs: None,
        })
    }

    /// Override the processing date used for the output folder.
    pub fn with_date(mut self, date: NaiveDate) -> Self {
        self.date = date;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn metadata(&self) -> &Arc<ExperimentMetadata> {
        &self.metadata
    }

    pub fn optics(&self) -> &OpticalParameters {
        &self.optics
    }

    pub fn channels(&self) -> &[ChannelSpec] {
        &self.channels
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut PipelineConfig {
        &mut self.config
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn psf_bank(&self) -> Option<&Arc<PsfBank>> {
        self.psfs.as_ref()
    }

    pub fn output_dir(&self) -> PathBuf {
        layout::output_dir(&self.root, self.date)
    }

    pub fn output_path(&self, cycle: usize, channel: &str) -> PathBuf {
        layout::output_path(&self.root, self.date, cycle, channel)
    }

    pub fn create_folder_structure(&self) -> Result<PathBuf, PipelineError> {
        layout::create_folder_structure(&self.root, self.date)
    }

    pub fn audit(&self) -> Result<AuditReport, PipelineError> {
        audit_experiment(&self.root, &self.metadata)
    }

    /// Synthesize one PSF per channel, replacing any previous bank.
    pub fn synthesize_psfs(
        &mut self,
        progress: impl FnMut(Progress),
    ) -> Result<Arc<PsfBank>, PipelineError> {
        let synthesizer = PsfSynthesizer::new(self.config.psf.clone());
        let bank = Arc::new(synthesizer.synthesize(&self.optics, &self.channels, progress)?);
        self.psfs = Some(Arc::clone(&bank));
        Ok(bank)
    }

    /// Deconvolve every selected (cycle, channel) pair.
    ///
    /// Progress is emitted after each channel and restarts for every cycle.
    /// Only an invalid selection or engine configuration aborts the run;
    /// per-pair problems end up in the report.
    pub fn deconvolve_all(
        &self,
        selection: &Selection,
        mut progress: impl FnMut(Progress),
    ) -> Result<RunReport, PipelineError> {
        selection.validate(self.metadata.num_cycles, &self.channels)?;
        let engine = DeconvolutionEngine::new(self.config.deconvolution.clone())?;

        let channels: Vec<&ChannelSpec> = self
            .channels
            .iter()
            .filter(|c| selection.includes_channel(&c.id))
            .collect();
        let mut report = RunReport::default();

        for cycle in (1..=self.metadata.num_cycles).filter(|&c| selection.includes_cycle(c)) {
            info!("Deconvolving {}", layout::cycle_label(cycle));
            for (n, channel) in channels.iter().enumerate() {
                let outcome = match self.deconvolve_pair(&engine, cycle, &channel.id) {
                    Ok(summary) => PairOutcome::Succeeded {
                        path: summary.path,
                        shape: summary.shape,
                    },
                    Err(e @ PipelineError::MissingInput { .. }) => {
                        warn!("Skipping {} {}: {}", layout::cycle_label(cycle), channel.id, e);
                        PairOutcome::Skipped {
                            reason: e.to_string(),
                        }
                    }
                    Err(e) => {
                        warn!("Failed {} {}: {}", layout::cycle_label(cycle), channel.id, e);
                        PairOutcome::Failed {
                            error: e.to_string(),
                        }
                    }
                };
                report.push(cycle, &channel.id, outcome);
                progress(Progress::deconvolution(cycle, n + 1, channels.len()));
            }
        }

        info!(
            "Run finished: {} succeeded, {} skipped, {} failed",
            report.succeeded().count(),
            report.skipped().count(),
            report.failed().count()
        );
        Ok(report)
    }

    /// Deconvolve one pair with the session's PSF for `channel`.
    pub fn deconvolve_pair(
        &self,
        engine: &DeconvolutionEngine,
        cycle: usize,
        channel: &str,
    ) -> Result<DeconvolutionSummary, PipelineError> {
        let psf = self
            .psfs
            .as_ref()
            .and_then(|bank| bank.get(channel))
            .ok_or_else(|| ValidationError::MissingPsf(channel.to_string()))?;

        let paths = layout::find_channel_planes(&self.root, cycle, channel)?;
        let stack =
            TiledStack::from_paths(paths, self.metadata.num_tiles, self.metadata.num_z_planes)?;
        engine.deconvolve(
            &stack,
            &psf.psf,
            self.metadata.num_z_planes,
            self.config.deconvolution.iterations,
            &self.output_path(cycle, channel),
        )
    }
}
