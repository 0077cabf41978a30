//! End-to-end focus sweeps on synthetic guide frames
//!
//! Each sweep renders star fields whose blur grows quadratically with the
//! distance of M2 from a known best focus, then runs the full pipeline through
//! the in-memory loader and the built-in threshold detector.

use approx::assert_relative_eq;
use focus::aggregate::{AggregateError, CatalogAggregator};
use focus::catalog::Detection;
use focus::config::FocusConfig;
use focus::exposure::{Exposure, ExposureHeader, InMemoryLoader};
use focus::extraction::SourceExtractor;
use focus::fwhm::{FwhmMethod, GAUSSIAN_FWHM_PER_SIGMA};
use focus::pipeline::{FocusPipeline, PipelineError};
use shared::image_proc::detection::ThresholdDetector;
use shared::image_proc::synthetic::{render_star_field, SyntheticStar};

const TRUE_BEST_FOCUS: f64 = 30.0;
const BEST_FWHM_ARCSEC: f64 = 1.2;
const CURVATURE: f64 = 2.5e-5;
const PIXEL_SCALE: f64 = 0.146;
const POSITIONS: [f64; 7] = [-150.0, -100.0, -50.0, 0.0, 50.0, 100.0, 150.0];

fn true_fwhm(m2: f64) -> f64 {
    BEST_FWHM_ARCSEC + CURVATURE * (m2 - TRUE_BEST_FOCUS).powi(2)
}

fn render_exposure(m2: f64, seed: u64) -> Exposure {
    let sigma = true_fwhm(m2) / (GAUSSIAN_FWHM_PER_SIGMA * PIXEL_SCALE);
    let stars: Vec<SyntheticStar> = [(64.3, 63.8), (191.6, 64.4), (63.9, 192.2), (192.1, 191.7)]
        .iter()
        .map(|&(x, y)| SyntheticStar::round(x, y, 8000.0, sigma))
        .collect();

    Exposure::new(
        render_star_field((256, 256), &stars, 1000.0, 5.0, seed).unwrap(),
        ExposureHeader {
            camera: None,
            m2_piston: Some(m2),
            sjd: Some(59800),
        },
    )
}

fn name(camera: u8, seq_no: u32) -> String {
    format!("/data/gcam/59800/gimg-gfa{camera}s-{seq_no:04}.fits")
}

/// Two cameras per position, one sequence number per position
fn sweep() -> (InMemoryLoader, Vec<String>) {
    let mut loader = InMemoryLoader::new();
    let mut identifiers = Vec::new();

    for (i, &m2) in POSITIONS.iter().enumerate() {
        let seq_no = 100 + i as u32;
        for camera in [1u8, 2] {
            let mut exposure = render_exposure(m2, seq_no as u64 * 10 + camera as u64);
            exposure.header.camera = Some(format!("gfa{camera}"));
            loader.insert(name(camera, seq_no), exposure);
            identifiers.push(name(camera, seq_no));
        }
    }

    (loader, identifiers)
}

fn config() -> FocusConfig {
    let mut config = FocusConfig::default();
    config.extraction.background_tile = 128;
    config
}

fn sorted_rows(rows: &[Detection]) -> Vec<Detection> {
    let mut rows = rows.to_vec();
    rows.sort_by(|a, b| {
        a.seq_no
            .cmp(&b.seq_no)
            .then_with(|| a.camera.cmp(&b.camera))
            .then_with(|| a.source.x.total_cmp(&b.source.x))
            .then_with(|| a.source.y.total_cmp(&b.source.y))
    });
    rows
}

#[test]
fn test_axis_ratio_sweep_recovers_best_focus() {
    let (loader, identifiers) = sweep();
    let config = config();
    let detector = ThresholdDetector::new(config.extraction.detector_config()).unwrap();

    let report = FocusPipeline::new(config, &detector, &loader)
        .run(&identifiers)
        .unwrap();

    assert!(report.failures.is_empty());
    assert_eq!(report.exposures_attempted, 14);
    assert_eq!(report.detections_total, 56);
    assert_eq!(report.detections_accepted, 56);
    assert_eq!(report.groups.len(), POSITIONS.len());
    assert_eq!(report.fit.n_groups, POSITIONS.len());

    assert!(report.fit.a > 0.0);
    assert!(
        (report.fit.best_focus - TRUE_BEST_FOCUS).abs() < 5.0,
        "best focus {}",
        report.fit.best_focus
    );
    assert_relative_eq!(report.fit.min_fwhm(), BEST_FWHM_ARCSEC, max_relative = 0.1);
}

#[test]
fn test_weighted_std_sweep_recovers_best_focus() {
    let (loader, identifiers) = sweep();
    let config = FocusConfig {
        fwhm_method: FwhmMethod::WeightedStd,
        ..config()
    };
    let detector = ThresholdDetector::new(config.extraction.detector_config()).unwrap();

    let report = FocusPipeline::new(config, &detector, &loader)
        .run(&identifiers)
        .unwrap();

    assert_eq!(report.fwhm_method, FwhmMethod::WeightedStd);
    assert!(
        (report.fit.best_focus - TRUE_BEST_FOCUS).abs() < 5.0,
        "best focus {}",
        report.fit.best_focus
    );
    assert_relative_eq!(report.fit.min_fwhm(), BEST_FWHM_ARCSEC, max_relative = 0.1);
}

#[test]
fn test_offset_shifts_reported_focus() {
    let (loader, identifiers) = sweep();
    let base_config = config();
    let detector = ThresholdDetector::new(base_config.extraction.detector_config()).unwrap();

    let base = FocusPipeline::new(base_config.clone(), &detector, &loader)
        .run(&identifiers)
        .unwrap();
    let shifted = FocusPipeline::new(
        FocusConfig {
            offset: 20.0,
            ..base_config
        },
        &detector,
        &loader,
    )
    .run(&identifiers)
    .unwrap();

    assert_relative_eq!(
        shifted.fit.best_focus,
        base.fit.best_focus + 20.0,
        epsilon = 1e-9
    );
}

#[test]
fn test_sweep_survives_failed_exposures() {
    let (loader, mut identifiers) = sweep();
    identifiers.push(name(3, 100));
    identifiers.push("/data/gcam/59800/guider-log.fits".to_string());
    let config = config();
    let detector = ThresholdDetector::new(config.extraction.detector_config()).unwrap();

    let report = FocusPipeline::new(config, &detector, &loader)
        .run(&identifiers)
        .unwrap();

    assert_eq!(report.failures.len(), 2);
    assert_eq!(report.exposures_attempted, 16);
    assert!((report.fit.best_focus - TRUE_BEST_FOCUS).abs() < 5.0);
}

#[test]
fn test_seqno_range_limits_sweep() {
    let (loader, identifiers) = sweep();
    let config = FocusConfig {
        min_seqno: Some(101),
        max_seqno: Some(104),
        ..config()
    };
    let detector = ThresholdDetector::new(config.extraction.detector_config()).unwrap();

    let report = FocusPipeline::new(config, &detector, &loader)
        .run(&identifiers)
        .unwrap();

    assert_eq!(report.exposures_attempted, 8);
    let positions: Vec<f64> = report.groups.iter().map(|g| g.position).collect();
    assert_eq!(positions, vec![-100.0, -50.0, 0.0, 50.0]);
}

#[test]
fn test_all_exposures_failing_is_empty_catalog() {
    let loader = InMemoryLoader::new();
    let identifiers: Vec<String> = (1..=5).map(|seq| name(1, seq)).collect();
    let config = config();
    let detector = ThresholdDetector::new(config.extraction.detector_config()).unwrap();

    let result = FocusPipeline::new(config, &detector, &loader).run(&identifiers);

    assert!(matches!(
        result,
        Err(PipelineError::Aggregate(AggregateError::EmptyCatalog {
            attempted: 5,
            failed: 5
        }))
    ));
}

#[test]
fn test_two_of_five_failing_still_aggregates() {
    let mut loader = InMemoryLoader::new();
    for seq_no in [1, 3, 5] {
        loader.insert(name(1, seq_no), render_exposure(0.0, seq_no as u64));
    }
    let identifiers: Vec<String> = (1..=5).map(|seq| name(1, seq)).collect();
    let detector = ThresholdDetector::new(config().extraction.detector_config()).unwrap();

    let aggregation = CatalogAggregator::new(SourceExtractor::new(&detector, 1000), &loader)
        .aggregate(&identifiers, 4)
        .unwrap();

    assert_eq!(aggregation.failures.len(), 2);
    assert_eq!(aggregation.catalog.len(), 12);
    assert!(aggregation.catalog.iter().all(|d| d.camera == "NA"));
}

#[test]
fn test_aggregation_is_repeatable() {
    let (loader, identifiers) = sweep();
    let detector = ThresholdDetector::new(config().extraction.detector_config()).unwrap();
    let aggregator = CatalogAggregator::new(SourceExtractor::new(&detector, 1000), &loader);

    let first = aggregator.aggregate(&identifiers, 3).unwrap();
    let second = aggregator.aggregate(&identifiers, 3).unwrap();

    assert_eq!(
        sorted_rows(first.catalog.rows()),
        sorted_rows(second.catalog.rows())
    );
}

#[test]
fn test_report_round_trips_through_json() {
    let (loader, identifiers) = sweep();
    let config = config();
    let detector = ThresholdDetector::new(config.extraction.detector_config()).unwrap();
    let report = FocusPipeline::new(config, &detector, &loader)
        .run(&identifiers)
        .unwrap();

    let temp_dir = tempfile::TempDir::new().unwrap();
    let path = temp_dir.path().join("report.json");
    report.save_to_file(&path).unwrap();
    let loaded = focus::FocusReport::load_from_file(&path).unwrap();

    assert_eq!(loaded.fit, report.fit);
    assert_eq!(loaded.groups, report.groups);
    assert!(report.to_string().contains("best focus"));
}
