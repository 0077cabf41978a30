//! Per-exposure source extraction
//!
//! [`SourceExtractor`] runs a [`SourceDetector`] over one exposure and tags
//! every detection with the exposure's sequence number, camera and secondary
//! mirror position. Finding nothing is a normal, empty result.

use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};
use shared::image_proc::detection::{DetectionError, SourceMeasurement, ThresholdDetector};
use thiserror::Error;

use crate::catalog::{Catalog, Detection};
use crate::exposure::{Exposure, ExposureId, ExposureLoader, LoadError, ParseError};

/// Camera name recorded when the header has none
pub const UNKNOWN_CAMERA: &str = "NA";

/// Capability that finds and measures sources in an image.
pub trait SourceDetector: Send + Sync {
    fn detect(
        &self,
        image: ArrayView2<f64>,
        max_detections: usize,
    ) -> Result<Vec<SourceMeasurement>, DetectionError>;
}

impl SourceDetector for ThresholdDetector {
    fn detect(
        &self,
        image: ArrayView2<f64>,
        max_detections: usize,
    ) -> Result<Vec<SourceMeasurement>, DetectionError> {
        ThresholdDetector::detect(self, image, max_detections)
    }
}

/// Why a single exposure could not be extracted
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExtractionError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error("source detection failed: {0}")]
    Detection(#[from] DetectionError),
    #[error("extraction panicked: {0}")]
    Panicked(String),
}

/// Record of an exposure skipped because extraction failed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionFailure {
    pub identifier: String,
    pub reason: String,
}

impl ExtractionFailure {
    pub fn new(identifier: &str, error: &ExtractionError) -> Self {
        Self {
            identifier: identifier.to_string(),
            reason: error.to_string(),
        }
    }
}

/// Applies a detector to exposures with a fixed detection cap.
#[derive(Clone, Copy)]
pub struct SourceExtractor<'a> {
    detector: &'a dyn SourceDetector,
    max_detections: usize,
}

impl<'a> SourceExtractor<'a> {
    pub fn new(detector: &'a dyn SourceDetector, max_detections: usize) -> Self {
        Self {
            detector,
            max_detections,
        }
    }

    pub fn max_detections(&self) -> usize {
        self.max_detections
    }

    /// Extract sources from an already loaded exposure.
    ///
    /// # Arguments
    /// * `id` - Parsed identifier supplying the sequence number
    /// * `exposure` - Pixel data and header
    ///
    /// # Returns
    /// A catalog of at most `max_detections` tagged detections, empty when
    /// nothing was found
    pub fn extract(
        &self,
        id: &ExposureId,
        exposure: &Exposure,
    ) -> Result<Catalog, ExtractionError> {
        let sources = self
            .detector
            .detect(exposure.data.view(), self.max_detections)?;

        let camera = exposure
            .header
            .camera
            .clone()
            .unwrap_or_else(|| UNKNOWN_CAMERA.to_string());
        let m2 = exposure.header.m2_piston.unwrap_or(f64::NAN);

        log::debug!(
            "{}: {} detections (seq_no {}, camera {}, m2 {})",
            id,
            sources.len(),
            id.seq_no(),
            camera,
            m2
        );

        Ok(sources
            .into_iter()
            .take(self.max_detections)
            .map(|source| {
                Detection::new(source, id.seq_no(), id.camera_number(), camera.clone(), m2)
            })
            .collect())
    }

    /// Parse an identifier, load it and extract its sources.
    pub fn extract_from(
        &self,
        identifier: &str,
        loader: &dyn ExposureLoader,
    ) -> Result<Catalog, ExtractionError> {
        let id = ExposureId::parse(identifier)?;
        let exposure = loader.load(&id)?;
        self.extract(&id, &exposure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::test_support::measurement;
    use crate::exposure::{ExposureHeader, InMemoryLoader};
    use ndarray::Array2;

    /// Returns a fixed list of sources regardless of the image
    struct FixedDetector(Vec<SourceMeasurement>);

    impl SourceDetector for FixedDetector {
        fn detect(
            &self,
            _image: ArrayView2<f64>,
            max_detections: usize,
        ) -> Result<Vec<SourceMeasurement>, DetectionError> {
            Ok(self.0.iter().take(max_detections).cloned().collect())
        }
    }

    fn exposure(camera: Option<&str>, m2: Option<f64>) -> Exposure {
        Exposure::new(
            Array2::zeros((8, 8)),
            ExposureHeader {
                camera: camera.map(str::to_string),
                m2_piston: m2,
                sjd: Some(59800),
            },
        )
    }

    #[test]
    fn test_extract_tags_rows() {
        let detector = FixedDetector(vec![measurement(5.0, 4.0), measurement(6.0, 5.0)]);
        let extractor = SourceExtractor::new(&detector, 10);
        let id = ExposureId::parse("gimg-gfa2s-0017.fits").unwrap();

        let catalog = extractor
            .extract(&id, &exposure(Some("gfa2"), Some(-40.0)))
            .unwrap();

        assert_eq!(catalog.len(), 2);
        for row in &catalog {
            assert_eq!(row.seq_no, 17);
            assert_eq!(row.camera_number, 2);
            assert_eq!(row.camera, "gfa2");
            assert_eq!(row.m2, -40.0);
            assert!(row.fwhm.is_none());
        }
    }

    #[test]
    fn test_missing_header_values_use_sentinels() {
        let detector = FixedDetector(vec![measurement(5.0, 4.0)]);
        let extractor = SourceExtractor::new(&detector, 10);
        let id = ExposureId::parse("gimg-gfa2s-0017.fits").unwrap();

        let catalog = extractor.extract(&id, &exposure(None, None)).unwrap();

        assert_eq!(catalog.rows()[0].camera, UNKNOWN_CAMERA);
        assert!(catalog.rows()[0].m2.is_nan());
    }

    #[test]
    fn test_zero_detections_is_empty_not_error() {
        let detector = FixedDetector(Vec::new());
        let extractor = SourceExtractor::new(&detector, 10);
        let id = ExposureId::parse("gimg-gfa1s-0001.fits").unwrap();

        let catalog = extractor
            .extract(&id, &exposure(Some("gfa1"), Some(0.0)))
            .unwrap();
        assert!(catalog.is_empty());
    }

    /// Returns every source it holds, whatever cap it is given
    struct UncappedDetector(Vec<SourceMeasurement>);

    impl SourceDetector for UncappedDetector {
        fn detect(
            &self,
            _image: ArrayView2<f64>,
            _max_detections: usize,
        ) -> Result<Vec<SourceMeasurement>, DetectionError> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn test_detection_cap_applied_by_extractor() {
        let detector = UncappedDetector(vec![measurement(5.0, 4.0); 20]);
        let extractor = SourceExtractor::new(&detector, 3);
        let id = ExposureId::parse("gimg-gfa1s-0001.fits").unwrap();

        let catalog = extractor
            .extract(&id, &exposure(Some("gfa1"), Some(0.0)))
            .unwrap();
        assert_eq!(catalog.len(), 3);
    }

    #[test]
    fn test_extract_from_reports_parse_and_load_errors() {
        let detector = FixedDetector(vec![measurement(5.0, 4.0)]);
        let extractor = SourceExtractor::new(&detector, 10);
        let loader = InMemoryLoader::new();

        let bad_name = extractor.extract_from("frame-0001.fits", &loader);
        assert!(matches!(bad_name, Err(ExtractionError::Parse(_))));

        let missing = extractor.extract_from("gimg-gfa1s-0001.fits", &loader);
        assert!(matches!(
            missing,
            Err(ExtractionError::Load(LoadError::NotFound(_)))
        ));
    }

    #[test]
    fn test_threshold_detector_on_empty_image_fails() {
        let detector = ThresholdDetector::new(Default::default()).unwrap();
        let extractor = SourceExtractor::new(&detector, 10);
        let id = ExposureId::parse("gimg-gfa1s-0001.fits").unwrap();
        let empty = Exposure::new(Array2::zeros((0, 0)), ExposureHeader::default());

        assert!(matches!(
            extractor.extract(&id, &empty),
            Err(ExtractionError::Detection(DetectionError::EmptyImage { .. }))
        ));
    }
}
