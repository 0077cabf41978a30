//! End-to-end focus analysis
//!
//! [`FocusPipeline`] chains the stages of a focus sweep analysis:
//! aggregation → quality filter → FWHM derivation → robust grouping → parabola
//! fit, and returns a [`FocusReport`] describing every stage's outcome.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::aggregate::{AggregateError, CatalogAggregator};
use crate::config::{ConfigError, FocusConfig};
use crate::exposure::{ExposureLoader, SeqnoRange};
use crate::extraction::{ExtractionFailure, SourceDetector, SourceExtractor};
use crate::fit::{FitError, FocusCurveFit, ParabolaFitter};
use crate::fwhm::{FwhmEstimator, FwhmMethod};
use crate::grouping::{FocusGroup, RobustGrouper};
use crate::quality::QualityFilter;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Aggregate(#[from] AggregateError),
    #[error(transparent)]
    Fit(#[from] FitError),
}

/// Outcome of a focus sweep analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FocusReport {
    pub fit: FocusCurveFit,
    /// Per-position statistics, including positions excluded from the fit
    pub groups: Vec<FocusGroup>,
    pub fwhm_method: FwhmMethod,
    /// Exposures dispatched for extraction
    pub exposures_attempted: usize,
    pub failures: Vec<ExtractionFailure>,
    /// Detections before the quality filter
    pub detections_total: usize,
    /// Detections passing the quality filter
    pub detections_accepted: usize,
}

impl FocusReport {
    /// Save to JSON file
    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load from JSON file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

impl fmt::Display for FocusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:>10}  {:>10}  {:>10}  {:>6}  {:>6}",
            "M2", "FWHM", "sigma", "kept", "total"
        )?;
        for g in &self.groups {
            writeln!(
                f,
                "{:>10.2}  {:>10.3}  {:>10.3}  {:>6}  {:>6}",
                g.position, g.median, g.dispersion, g.count_after, g.count_before
            )?;
        }
        writeln!(f)?;
        writeln!(
            f,
            "fwhm = {:.6e}·m2² + {:.6e}·m2 + {:.6}",
            self.fit.a, self.fit.b, self.fit.c
        )?;
        writeln!(
            f,
            "best focus: {:.2} (offset {:.2}), FWHM there {:.3}\"",
            self.fit.best_focus,
            self.fit.offset,
            self.fit.min_fwhm()
        )?;
        write!(
            f,
            "{} of {} detections used from {} exposures ({} failed)",
            self.detections_accepted,
            self.detections_total,
            self.exposures_attempted,
            self.failures.len()
        )
    }
}

/// Focus sweep analysis with a fixed configuration, detector and loader
pub struct FocusPipeline<'a> {
    config: FocusConfig,
    detector: &'a dyn SourceDetector,
    loader: &'a dyn ExposureLoader,
}

impl<'a> FocusPipeline<'a> {
    pub fn new(
        config: FocusConfig,
        detector: &'a dyn SourceDetector,
        loader: &'a dyn ExposureLoader,
    ) -> Self {
        Self {
            config,
            detector,
            loader,
        }
    }

    pub fn config(&self) -> &FocusConfig {
        &self.config
    }

    /// Analyse a focus sweep.
    ///
    /// # Arguments
    /// * `identifiers` - Exposure identifiers of the sweep
    ///
    /// # Returns
    /// The report, or the first fatal error: no detections at all, too few
    /// usable focus positions, or a curve without a minimum.
    pub fn run<S: AsRef<str>>(&self, identifiers: &[S]) -> Result<FocusReport, PipelineError> {
        let config = &self.config;

        let extractor = SourceExtractor::new(self.detector, config.extraction.max_detections);
        let aggregation = CatalogAggregator::new(extractor, self.loader)
            .with_range(SeqnoRange::from_bounds(config.min_seqno, config.max_seqno))
            .aggregate(identifiers, config.workers)?;

        let detections_total = aggregation.catalog.len();
        let filtered =
            QualityFilter::new(config.quality, config.instrument).filter(aggregation.catalog);
        let detections_accepted = filtered.len();

        let derived = FwhmEstimator::new(config.fwhm_method, config.instrument.pixel_scale)
            .derive_fwhm(filtered);
        let groups = RobustGrouper::new(config.clip).group_and_clip(&derived);
        let fit = ParabolaFitter::new(config.offset, config.min_dispersion).fit(&groups)?;

        Ok(FocusReport {
            fit,
            groups: groups.as_slice().to_vec(),
            fwhm_method: config.fwhm_method,
            exposures_attempted: aggregation.attempted,
            failures: aggregation.failures,
            detections_total,
            detections_accepted,
        })
    }
}
