//! Per-pair outcome of a deconvolution run.

use serde::Serialize;
use std::path::PathBuf;

/// What happened to one (cycle, channel) pair
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PairOutcome {
    Succeeded { path: PathBuf, shape: Vec<usize> },
    /// No input planes; re-run the pair once they exist
    Skipped { reason: String },
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PairReport {
    pub cycle: usize,
    pub channel: String,
    #[serde(flatten)]
    pub outcome: PairOutcome,
}

/// Outcomes of a run in processing order
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunReport {
    pub pairs: Vec<PairReport>,
}

impl RunReport {
    pub(crate) fn push(&mut self, cycle: usize, channel: &str, outcome: PairOutcome) {
        self.pairs.push(PairReport {
            cycle,
            channel: channel.to_string(),
            outcome,
        });
    }

    pub fn get(&self, cycle: usize, channel: &str) -> Option<&PairOutcome> {
        self.pairs
            .iter()
            .find(|p| p.cycle == cycle && p.channel == channel)
            .map(|p| &p.outcome)
    }

    pub fn succeeded(&self) -> impl Iterator<Item = &PairReport> {
        self.pairs
            .iter()
            .filter(|p| matches!(p.outcome, PairOutcome::Succeeded { .. }))
    }

    pub fn skipped(&self) -> impl Iterator<Item = &PairReport> {
        self.pairs
            .iter()
            .filter(|p| matches!(p.outcome, PairOutcome::Skipped { .. }))
    }

    pub fn failed(&self) -> impl Iterator<Item = &PairReport> {
        self.pairs
            .iter()
            .filter(|p| matches!(p.outcome, PairOutcome::Failed { .. }))
    }

    pub fn has_failures(&self) -> bool {
        self.failed().next().is_some()
    }
}
