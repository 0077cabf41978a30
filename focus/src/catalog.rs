//! Detection catalogs
//!
//! A [`Detection`] is one measured source tagged with the exposure it came
//! from; a [`Catalog`] is the working table passed between pipeline stages.
//! Row order carries no meaning.

use serde::{Deserialize, Serialize};
use shared::image_proc::detection::SourceMeasurement;

/// One source measured in one exposure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Position, shape and flux as measured by the detector
    #[serde(flatten)]
    pub source: SourceMeasurement,
    /// Frame sequence number of the exposure
    pub seq_no: u32,
    /// Guide camera number from the exposure file name
    #[serde(default)]
    pub camera_number: u8,
    /// Camera name from the exposure header
    pub camera: String,
    /// Secondary mirror piston, NaN when the header lacks it
    pub m2: f64,
    /// Derived FWHM in arcseconds
    pub fwhm: Option<f64>,
    /// Derived Gaussian sigma in pixels ([`crate::fwhm::FwhmMethod::WeightedStd`] only)
    pub std: Option<f64>,
    /// Derived combined profile-fit RMS ([`crate::fwhm::FwhmMethod::WeightedStd`] only)
    pub rms: Option<f64>,
}

impl Detection {
    pub fn new(
        source: SourceMeasurement,
        seq_no: u32,
        camera_number: u8,
        camera: String,
        m2: f64,
    ) -> Self {
        Self {
            source,
            seq_no,
            camera_number,
            camera,
            m2,
            fwhm: None,
            std: None,
            rms: None,
        }
    }

    pub fn eccentricity(&self) -> f64 {
        self.source.eccentricity()
    }

    /// Semi-major axis converted to arcseconds
    pub fn semi_major_arcsec(&self, pixel_scale: f64) -> f64 {
        self.source.a * pixel_scale
    }
}

/// Table of detections
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    rows: Vec<Detection>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[Detection] {
        &self.rows
    }

    pub fn rows_mut(&mut self) -> &mut [Detection] {
        &mut self.rows
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Detection> {
        self.rows.iter()
    }

    pub fn push(&mut self, detection: Detection) {
        self.rows.push(detection);
    }

    /// Append all rows of another catalog
    pub fn append(&mut self, mut other: Catalog) {
        self.rows.append(&mut other.rows);
    }

    pub fn into_rows(self) -> Vec<Detection> {
        self.rows
    }
}

impl From<Vec<Detection>> for Catalog {
    fn from(rows: Vec<Detection>) -> Self {
        Self { rows }
    }
}

impl FromIterator<Detection> for Catalog {
    fn from_iter<I: IntoIterator<Item = Detection>>(iter: I) -> Self {
        Self {
            rows: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Catalog {
    type Item = Detection;
    type IntoIter = std::vec::IntoIter<Detection>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

impl<'a> IntoIterator for &'a Catalog {
    type Item = &'a Detection;
    type IntoIter = std::slice::Iter<'a, Detection>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}
