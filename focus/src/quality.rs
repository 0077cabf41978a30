//! Detection quality filtering
//!
//! Rejects detections that cannot give a trustworthy seeing measurement:
//! implausibly small or large spots, saturated stars, elongated shapes
//! (trails, blends, cosmic rays) and sources whose profile fits failed.

use serde::{Deserialize, Serialize};

use crate::catalog::{Catalog, Detection};
use crate::config::InstrumentConfig;

/// Acceptance limits for a detection
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityCriteria {
    /// Exclusive lower bound on the semi-major axis, arcseconds
    pub min_semi_major_arcsec: f64,
    /// Exclusive upper bound on the semi-major axis, arcseconds
    pub max_semi_major_arcsec: f64,
    /// Exclusive upper bound on the eccentricity
    pub max_eccentricity: f64,
    /// Require both marginal profile fits to be valid
    pub require_fit_valid: bool,
}

impl Default for QualityCriteria {
    fn default() -> Self {
        Self {
            min_semi_major_arcsec: 0.4,
            max_semi_major_arcsec: 5.0,
            max_eccentricity: 0.7,
            require_fit_valid: true,
        }
    }
}

/// Filters a catalog down to detections meeting [`QualityCriteria`].
#[derive(Debug, Clone, Copy)]
pub struct QualityFilter {
    criteria: QualityCriteria,
    instrument: InstrumentConfig,
}

impl QualityFilter {
    pub fn new(criteria: QualityCriteria, instrument: InstrumentConfig) -> Self {
        Self {
            criteria,
            instrument,
        }
    }

    /// Whether a single detection passes every criterion.
    ///
    /// NaN shape parameters fail every comparison and are rejected.
    pub fn accepts(&self, detection: &Detection) -> bool {
        let semi_major = detection.semi_major_arcsec(self.instrument.pixel_scale);
        let size_ok = semi_major > self.criteria.min_semi_major_arcsec
            && semi_major < self.criteria.max_semi_major_arcsec;
        let unsaturated = detection.source.peak < self.instrument.saturation_level;
        let round = detection.eccentricity() < self.criteria.max_eccentricity;
        let fits_ok = !self.criteria.require_fit_valid
            || (detection.source.xfitvalid && detection.source.yfitvalid);

        size_ok && unsaturated && round && fits_ok
    }

    /// Keep only accepted detections. Rows are moved, not modified.
    pub fn filter(&self, catalog: Catalog) -> Catalog {
        let before = catalog.len();
        let kept: Catalog = catalog.into_iter().filter(|d| self.accepts(d)).collect();
        log::info!(
            "quality filter kept {} of {} detections",
            kept.len(),
            before
        );
        kept
    }
}
