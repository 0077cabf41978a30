//! Focus analysis configuration
//!
//! Every tunable of the pipeline lives in [`FocusConfig`]: instrument constants,
//! detection and quality parameters, clipping and fitting options. Defaults
//! match the guide cameras of the focus sweeps this tool was written for, and a
//! config can be saved to and loaded from pretty-printed JSON.

use std::path::Path;

use serde::{Deserialize, Serialize};
use shared::algo::stats::SigmaClip;
use shared::image_proc::detection::DetectorConfig;
use thiserror::Error;

use crate::fwhm::FwhmMethod;
use crate::quality::QualityCriteria;

/// Errors reading or writing a configuration file
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config file I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Fixed properties of the guide cameras
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstrumentConfig {
    /// Plate scale in arcseconds per pixel
    pub pixel_scale: f64,
    /// Raw pixel value at and above which a source counts as saturated
    pub saturation_level: f64,
}

impl Default for InstrumentConfig {
    fn default() -> Self {
        Self {
            pixel_scale: 0.146,
            saturation_level: 60000.0,
        }
    }
}

/// Source extraction parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Threshold above background, in units of the background RMS
    pub detection_sigma: f64,
    /// Per-exposure cap on the number of detections kept
    pub max_detections: usize,
    /// Background estimation tile size in pixels
    pub background_tile: usize,
    /// Smallest connected pixel group accepted as a source
    pub min_pixels: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            detection_sigma: 5.0,
            max_detections: 1000,
            background_tile: 64,
            min_pixels: 5,
        }
    }
}

impl ExtractionConfig {
    /// Parameters for the built-in threshold detector
    pub fn detector_config(&self) -> DetectorConfig {
        DetectorConfig {
            detection_sigma: self.detection_sigma,
            background_tile: self.background_tile,
            min_pixels: self.min_pixels,
            ..DetectorConfig::default()
        }
    }
}

/// Complete focus analysis configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FocusConfig {
    pub instrument: InstrumentConfig,
    pub quality: QualityCriteria,
    pub extraction: ExtractionConfig,
    /// Size of the extraction worker pool
    pub workers: usize,
    /// Lowest sequence number to analyse (used only together with `max_seqno`)
    pub min_seqno: Option<u32>,
    /// Highest sequence number to analyse (used only together with `min_seqno`)
    pub max_seqno: Option<u32>,
    pub fwhm_method: FwhmMethod,
    /// Outlier clipping applied within each focus position
    pub clip: SigmaClip,
    /// Offset added to the fitted vertex, in actuator units
    pub offset: f64,
    /// Floor applied to group dispersions before weighting the fit
    pub min_dispersion: f64,
}

impl Default for FocusConfig {
    fn default() -> Self {
        Self {
            instrument: InstrumentConfig::default(),
            quality: QualityCriteria::default(),
            extraction: ExtractionConfig::default(),
            workers: 4,
            min_seqno: None,
            max_seqno: None,
            fwhm_method: FwhmMethod::default(),
            clip: SigmaClip::default(),
            offset: 0.0,
            min_dispersion: 1e-6,
        }
    }
}

impl FocusConfig {
    /// Save to JSON file
    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load from JSON file. Missing fields take their default values.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}
