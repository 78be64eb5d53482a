//! End-to-end runs on synthetic experiments.

use chrono::NaiveDate;
use deconv::config::{DeconvolutionConfig, PipelineConfig};
use deconv::deconvolution::ChunkGrid;
use deconv::io::fits::partial_path;
use deconv::io::{read_fits_volume, write_psf_bank, DATA_HDU};
use deconv::layout;
use deconv::pipeline::{PairOutcome, Selection, Session};
use deconv::{ExperimentMetadata, Progress, Stage};
use std::path::Path;
use tempfile::TempDir;
use test_helpers::SyntheticExperiment;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 5, 14).unwrap()
}

fn fast_config() -> PipelineConfig {
    PipelineConfig {
        deconvolution: DeconvolutionConfig {
            iterations: 3,
            chunk_size: 16,
            overlap: 4,
            ..Default::default()
        },
        ..Default::default()
    }
}

fn open(root: &Path, experiment: &SyntheticExperiment) -> Session {
    let metadata_path = experiment.write(root).unwrap();
    Session::from_metadata_file(&metadata_path, fast_config())
        .unwrap()
        .with_date(date())
}

#[test]
fn test_missing_pair_is_skipped_and_others_complete() {
    init_logging();
    let dir = TempDir::new().unwrap();
    let experiment = SyntheticExperiment {
        num_cycles: 2,
        ..Default::default()
    }
    .omit(2, "CH2");
    let mut session = open(dir.path(), &experiment);

    let mut psf_progress = Vec::new();
    session.synthesize_psfs(|p| psf_progress.push(p)).unwrap();
    assert_eq!(
        psf_progress.iter().map(|p| p.percent).collect::<Vec<_>>(),
        vec![50.0, 100.0]
    );

    let mut progress: Vec<Progress> = Vec::new();
    let report = session
        .deconvolve_all(&Selection::all(), |p| progress.push(p))
        .unwrap();

    assert_eq!(report.succeeded().count(), 3);
    assert_eq!(report.skipped().count(), 1);
    assert!(!report.has_failures());
    assert!(matches!(
        report.get(2, "CH2"),
        Some(PairOutcome::Skipped { .. })
    ));

    // progress restarts for each cycle and carries the cycle index
    assert!(progress.iter().all(|p| p.stage == Stage::Deconvolution));
    assert_eq!(
        progress
            .iter()
            .map(|p| (p.cycle.unwrap(), p.percent))
            .collect::<Vec<_>>(),
        vec![(1, 50.0), (1, 100.0), (2, 50.0), (2, 100.0)]
    );

    for (cycle, channel) in [(1, "CH1"), (1, "CH2"), (2, "CH1")] {
        let path = session.output_path(cycle, channel);
        let volume = read_fits_volume(&path, DATA_HDU).unwrap();
        assert_eq!(volume.shape(), &[5, 32, 40]);
        assert!(volume.iter().all(|v| v.is_finite() && *v >= 0.0));
    }
    assert!(!session.output_path(2, "CH2").exists());
}

#[test]
fn test_output_file_name_and_location() {
    init_logging();
    let dir = TempDir::new().unwrap();
    let experiment = SyntheticExperiment {
        channel_names: vec!["CH1".to_string()],
        wavelengths_nm: vec![488.0],
        ..Default::default()
    };
    let mut session = open(dir.path(), &experiment);
    session.create_folder_structure().unwrap();
    session.synthesize_psfs(|_| {}).unwrap();

    let report = session.deconvolve_all(&Selection::all(), |_| {}).unwrap();
    let expected = dir
        .path()
        .join("processed_05_14_2024")
        .join("deconvolution")
        .join("deconvolution_cyc001_CH1.fits");
    assert_eq!(
        report.get(1, "CH1"),
        Some(&PairOutcome::Succeeded {
            path: expected.clone(),
            shape: vec![5, 32, 40],
        })
    );
    assert!(expected.is_file());
}

#[test]
fn test_dimension_mismatch_fails_without_output() {
    init_logging();
    let dir = TempDir::new().unwrap();
    let experiment = SyntheticExperiment::default();
    let metadata_path = experiment.write(dir.path()).unwrap();

    // metadata claims wider tiles than the planes on disk
    let mut metadata = ExperimentMetadata::load_from_file(&metadata_path).unwrap();
    metadata.tile_width = 48;
    let mut session = Session::new(dir.path(), metadata, fast_config())
        .unwrap()
        .with_date(date());
    session.synthesize_psfs(|_| {}).unwrap();

    let report = session.deconvolve_all(&Selection::all(), |_| {}).unwrap();
    assert_eq!(report.failed().count(), 2);
    match report.get(1, "CH1") {
        Some(PairOutcome::Failed { error }) => assert!(error.contains("PSF shape"), "{error}"),
        other => panic!("expected failure, got {other:?}"),
    }
    assert!(!session.output_path(1, "CH1").exists());
    assert!(!session.output_path(1, "CH2").exists());
}

#[test]
fn test_write_failure_is_scoped_to_its_pair() {
    init_logging();
    let dir = TempDir::new().unwrap();
    let mut session = open(dir.path(), &SyntheticExperiment::default());
    session.synthesize_psfs(|_| {}).unwrap();

    // a directory squatting on the output name makes the final rename fail
    let blocked = session.output_path(1, "CH1");
    std::fs::create_dir_all(&blocked).unwrap();

    let report = session.deconvolve_all(&Selection::all(), |_| {}).unwrap();
    match report.get(1, "CH1") {
        Some(PairOutcome::Failed { error }) => assert!(error.contains("failed to move"), "{error}"),
        other => panic!("expected failure, got {other:?}"),
    }
    assert!(matches!(
        report.get(1, "CH2"),
        Some(PairOutcome::Succeeded { .. })
    ));
    assert!(blocked.is_dir());
    assert!(!partial_path(&blocked).exists());
    assert!(session.output_path(1, "CH2").is_file());
}

#[test]
fn test_rerun_overwrites_with_equivalent_content() {
    init_logging();
    let dir = TempDir::new().unwrap();
    let mut session = open(dir.path(), &SyntheticExperiment::default());
    session.synthesize_psfs(|_| {}).unwrap();
    let selection = Selection::all().with_channels(["CH1"]);

    session.deconvolve_all(&selection, |_| {}).unwrap();
    let path = session.output_path(1, "CH1");
    let first = read_fits_volume(&path, DATA_HDU).unwrap();

    session.deconvolve_all(&selection, |_| {}).unwrap();
    let second = read_fits_volume(&path, DATA_HDU).unwrap();
    assert_eq!(first, second);

    let entries: Vec<_> = std::fs::read_dir(session.output_dir())
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    assert_eq!(entries, vec![std::ffi::OsString::from("deconvolution_cyc001_CH1.fits")]);
}

#[test]
fn test_selection_limits_run_to_requested_pairs() {
    init_logging();
    let dir = TempDir::new().unwrap();
    let experiment = SyntheticExperiment {
        num_cycles: 2,
        ..Default::default()
    };
    let mut session = open(dir.path(), &experiment);
    session.synthesize_psfs(|_| {}).unwrap();

    let selection = Selection::all().with_cycles([2]).with_channels(["CH2"]);
    let mut progress = Vec::new();
    let report = session
        .deconvolve_all(&selection, |p| progress.push(p.percent))
        .unwrap();

    assert_eq!(report.pairs.len(), 1);
    assert_eq!(report.pairs[0].cycle, 2);
    assert_eq!(report.pairs[0].channel, "CH2");
    assert_eq!(progress, vec![100.0]);
    assert!(!session.output_path(1, "CH1").exists());
}

#[test]
fn test_without_psfs_every_pair_fails() {
    init_logging();
    let dir = TempDir::new().unwrap();
    let session = open(dir.path(), &SyntheticExperiment::default());

    let report = session.deconvolve_all(&Selection::all(), |_| {}).unwrap();
    assert_eq!(report.failed().count(), 2);
    match report.get(1, "CH2") {
        Some(PairOutcome::Failed { error }) => assert!(error.contains("no PSF"), "{error}"),
        other => panic!("expected failure, got {other:?}"),
    }
}

#[test]
fn test_tiled_experiment_writes_one_dataset_per_pair() {
    init_logging();
    let dir = TempDir::new().unwrap();
    let experiment = SyntheticExperiment {
        num_tiles: 2,
        num_z_planes: 3,
        tile_width: 24,
        tile_height: 20,
        channel_names: vec!["CH1".to_string()],
        wavelengths_nm: vec![488.0],
        ..Default::default()
    };
    let mut session = open(dir.path(), &experiment);
    session.synthesize_psfs(|_| {}).unwrap();

    let report = session.deconvolve_all(&Selection::all(), |_| {}).unwrap();
    assert_eq!(report.succeeded().count(), 1);
    let volume = read_fits_volume(session.output_path(1, "CH1"), DATA_HDU).unwrap();
    assert_eq!(volume.shape(), &[2, 3, 20, 24]);
}

#[test]
fn test_exported_psfs_match_tile_shape() {
    init_logging();
    let dir = TempDir::new().unwrap();
    let mut session = open(dir.path(), &SyntheticExperiment::default());
    let bank = session.synthesize_psfs(|_| {}).unwrap();

    let path = dir.path().join("psf_bank.fits");
    write_psf_bank(&bank, &path).unwrap();
    for id in ["CH1", "CH2"] {
        let psf = read_fits_volume(&path, id).unwrap();
        assert_eq!(psf.shape(), &[5, 32, 40]);
        let peak = psf.iter().cloned().fold(f32::MIN, f32::max);
        assert!((peak - 1.0).abs() < 1e-5);
        assert_eq!(psf[[2, 16, 20]], peak);
    }
}

#[test]
fn test_audit_reports_missing_files() {
    init_logging();
    let dir = TempDir::new().unwrap();
    let experiment = SyntheticExperiment {
        num_cycles: 2,
        ..Default::default()
    }
    .omit(1, "CH1");
    let session = open(dir.path(), &experiment);

    let report = session.audit().unwrap();
    assert_eq!(report.cycle_folders.real, 2);
    assert!(!report.passed());
    assert_eq!(report.files_per_cycle[0].files.real, 5);
    assert_eq!(report.files_per_cycle[1].files.real, 10);
    assert!(report.files_per_cycle[1].files.pass);
}

#[test]
fn test_full_size_scenario_geometry() {
    // 2048² tiles with 21 planes: shapes and names only, no computation
    let json = serde_json::json!({
        "numCycles": 1,
        "numChannels": 2,
        "numZPlanes": 21,
        "numTiles": 1,
        "tileWidth": 2048,
        "tileHeight": 2048,
        "magnification": 20,
        "aperture": 0.75,
        "zPitch": 500,
        "xyResolution": 325,
        "wavelengths": [488, 561],
        "channel_names": ["CH1", "CH2"]
    });
    let metadata: ExperimentMetadata = serde_json::from_value(json).unwrap();
    metadata.validate().unwrap();

    let optics = metadata.optical_parameters();
    assert_eq!(optics.volume_shape(), (21, 2048, 2048));
    assert_eq!(optics.immersion_index, 1.0);
    assert_eq!(optics.particle_offset_um, 0.0);

    let channels = metadata.channels();
    assert_eq!(channels.len(), 2);
    assert_eq!(channels[0].id, "CH1");

    let grid = ChunkGrid::new(2048, 2048, 512, 32).unwrap();
    assert_eq!(grid.len(), 16);
    assert_eq!(layout::output_file_name(1, "CH1"), "deconvolution_cyc001_CH1.fits");
}
