//! Command line front end for PSF synthesis and deconvolution
//!
//! - `check`: audit the experiment folder against its metadata
//! - `run`: synthesize PSFs and deconvolve every selected (cycle, channel) pair
//! - `psf`: synthesize PSFs and export them to FITS for inspection

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use deconv::io::write_psf_bank;
use deconv::pipeline::{PairOutcome, Selection, Session};
use deconv::{PipelineConfig, Progress};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use log::info;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(
    name = "deconvolve",
    about = "Gibson-Lanni PSF synthesis and Richardson-Lucy deconvolution of tiled microscopy stacks",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compare folder and file counts against the experiment metadata
    Check {
        /// Experiment metadata JSON
        metadata: PathBuf,
    },
    /// Synthesize PSFs and deconvolve the selected pairs
    Run {
        #[command(flatten)]
        common: CommonArgs,

        /// Only process these cycles (1-based, repeatable)
        #[arg(long = "cycle")]
        cycles: Vec<usize>,

        /// Only process these channels (repeatable)
        #[arg(long = "channel")]
        channels: Vec<String>,

        /// Override the Richardson-Lucy iteration count
        #[arg(long)]
        iterations: Option<usize>,

        /// Restore chunks one at a time
        #[arg(long, default_value_t = false)]
        serial: bool,
    },
    /// Synthesize PSFs and write them to a FITS file
    Psf {
        #[command(flatten)]
        common: CommonArgs,

        /// Output FITS file
        #[arg(long, short)]
        output: PathBuf,
    },
}

#[derive(Args, Debug)]
struct CommonArgs {
    /// Experiment metadata JSON
    metadata: PathBuf,

    /// Pipeline configuration JSON (PSF model and engine settings)
    #[arg(long)]
    config: Option<PathBuf>,
}

impl CommonArgs {
    fn load_config(&self) -> Result<PipelineConfig> {
        match &self.config {
            Some(path) => PipelineConfig::load_from_file(path)
                .with_context(|| format!("reading config {}", path.display())),
            None => Ok(PipelineConfig::default()),
        }
    }
}

fn percent_bar(multi: &MultiProgress, message: &str) -> Result<ProgressBar> {
    let style = ProgressStyle::default_bar()
        .template("{msg:>14} [{bar:40.cyan/blue}] {pos:>3}% ({elapsed})")?
        .progress_chars("█▉▊▋▌▍▎▏ ");
    let bar = multi.add(ProgressBar::new(100));
    bar.set_style(style);
    bar.set_message(message.to_string());
    Ok(bar)
}

fn open_session(metadata: &Path, config: PipelineConfig) -> Result<Session> {
    Session::from_metadata_file(metadata, config)
        .with_context(|| format!("loading experiment {}", metadata.display()))
}

fn synthesize(session: &mut Session, multi: &MultiProgress) -> Result<()> {
    let bar = percent_bar(multi, "PSF")?;
    session
        .synthesize_psfs(|p: Progress| bar.set_position(p.percent.round() as u64))
        .context("synthesizing PSFs")?;
    bar.finish();
    Ok(())
}

fn check(metadata: &Path) -> Result<()> {
    let session = open_session(metadata, PipelineConfig::default())?;
    let report = session.audit().context("auditing experiment folder")?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    if !report.passed() {
        log::warn!("File counts do not match the metadata");
    }
    Ok(())
}

fn run(
    common: &CommonArgs,
    selection: Selection,
    iterations: Option<usize>,
    serial: bool,
) -> Result<()> {
    let mut config = common.load_config()?;
    if let Some(iterations) = iterations {
        config.deconvolution.iterations = iterations;
    }
    if serial {
        config.deconvolution.parallel = false;
    }

    let mut session = open_session(&common.metadata, config)?;
    let out_dir = session
        .create_folder_structure()
        .context("creating output folders")?;
    info!("Writing results to {}", out_dir.display());

    let multi = MultiProgress::new();
    synthesize(&mut session, &multi)?;

    let cycle_bar = percent_bar(&multi, "cycle")?;
    let mut current_cycle = None;
    let report = session
        .deconvolve_all(&selection, |p: Progress| {
            if p.cycle != current_cycle {
                current_cycle = p.cycle;
                if let Some(cycle) = p.cycle {
                    cycle_bar.set_message(format!("cycle {cycle:03}"));
                }
                cycle_bar.reset();
            }
            cycle_bar.set_position(p.percent.round() as u64);
        })
        .context("deconvolving")?;
    cycle_bar.finish();

    for pair in &report.pairs {
        match &pair.outcome {
            PairOutcome::Succeeded { path, shape } => {
                println!("ok      cyc{:03} {}: {:?} -> {}", pair.cycle, pair.channel, shape, path.display())
            }
            PairOutcome::Skipped { reason } => {
                println!("skipped cyc{:03} {}: {}", pair.cycle, pair.channel, reason)
            }
            PairOutcome::Failed { error } => {
                println!("FAILED  cyc{:03} {}: {}", pair.cycle, pair.channel, error)
            }
        }
    }

    let failed = report.failed().count();
    if failed > 0 {
        bail!("{failed} pair(s) failed");
    }
    Ok(())
}

fn export_psfs(common: &CommonArgs, output: &Path) -> Result<()> {
    let mut session = open_session(&common.metadata, common.load_config()?)?;
    let multi = MultiProgress::new();
    synthesize(&mut session, &multi)?;
    let bank = session
        .psf_bank()
        .context("PSF bank missing after synthesis")?;
    write_psf_bank(bank, output).with_context(|| format!("writing {}", output.display()))?;
    println!("Wrote {} PSFs to {}", bank.len(), output.display());
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Command::Check { metadata } => check(&metadata),
        Command::Run {
            common,
            cycles,
            channels,
            iterations,
            serial,
        } => {
            let selection = Selection::all().with_cycles(cycles).with_channels(channels);
            run(&common, selection, iterations, serial)
        }
        Command::Psf { common, output } => export_psfs(&common, &output),
    }
}
