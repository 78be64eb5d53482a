//! Progress signal emitted after each unit of work.

use serde::Serialize;

/// Pipeline stage a progress value belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Stage {
    Psf,
    Deconvolution,
}

/// One progress update
///
/// `percent` is the within-stage fraction in [0, 100]. For deconvolution it
/// covers the channels of the current cycle only and restarts at 0 for each
/// cycle; `cycle` carries the 1-based cycle index so a caller can render
/// whole-run progress as (cycle, percent).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Progress {
    pub stage: Stage,
    pub cycle: Option<usize>,
    pub percent: f64,
}

impl Progress {
    pub(crate) fn psf(done: usize, total: usize) -> Self {
        Self {
            stage: Stage::Psf,
            cycle: None,
            percent: fraction(done, total),
        }
    }

    pub(crate) fn deconvolution(cycle: usize, done: usize, total: usize) -> Self {
        Self {
            stage: Stage::Deconvolution,
            cycle: Some(cycle),
            percent: fraction(done, total),
        }
    }
}

fn fraction(done: usize, total: usize) -> f64 {
    if total == 0 {
        100.0
    } else {
        (done as f64 * 100.0 / total as f64).clamp(0.0, 100.0)
    }
}
