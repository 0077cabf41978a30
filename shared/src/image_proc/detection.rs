//! Threshold source detection
//!
//! Finds point sources in a single frame and measures them:
//!
//! 1. Estimate and subtract a tiled background ([`estimate_background`])
//! 2. Mark pixels brighter than `detection_sigma` times the local background RMS
//! 3. Group marked pixels into 8-connected components
//! 4. Drop components smaller than `min_pixels`
//! 5. Measure each component's moments and fit Gaussians to its marginal profiles
//!
//! Results are sorted by flux, brightest first, and truncated to the requested
//! number of detections.

use ndarray::{s, Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::background::estimate_background;
use super::centroid::compute_moments;
use super::profile::fit_gaussian_profile;
use crate::algo::stats::SigmaClip;

/// Extra pixels around a component's bounding box used for profile fits
const PROFILE_MARGIN: usize = 3;

/// 8-connectivity neighbour offsets
const NEIGHBORS: [(isize, isize); 8] = [
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, -1),
    (0, 1),
    (1, -1),
    (1, 0),
    (1, 1),
];

/// Errors from running the detector on a frame
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DetectionError {
    #[error("image has no pixels ({rows}x{cols})")]
    EmptyImage { rows: usize, cols: usize },
    #[error("invalid detector configuration: {0}")]
    InvalidConfig(String),
}

/// Detector tuning parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Detection threshold in units of the local background RMS
    pub detection_sigma: f64,
    /// Side of the background estimation tiles in pixels
    pub background_tile: usize,
    /// Minimum number of connected pixels for a detection
    pub min_pixels: usize,
    /// Sigma clipping used for the background tiles
    pub background_clip: SigmaClip,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            detection_sigma: 5.0,
            background_tile: 64,
            min_pixels: 5,
            background_clip: SigmaClip::default(),
        }
    }
}

impl DetectorConfig {
    /// Check that the parameters describe a usable detector
    pub fn validate(&self) -> Result<(), DetectionError> {
        if !(self.detection_sigma.is_finite() && self.detection_sigma > 0.0) {
            return Err(DetectionError::InvalidConfig(format!(
                "detection_sigma must be positive, got {}",
                self.detection_sigma
            )));
        }
        if self.background_tile == 0 {
            return Err(DetectionError::InvalidConfig(
                "background_tile must be at least 1".to_string(),
            ));
        }
        if self.min_pixels == 0 {
            return Err(DetectionError::InvalidConfig(
                "min_pixels must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Measured properties of one detected source.
///
/// Positions are in pixel coordinates (x = column, y = row). `a`, `b` and the
/// profile widths are in pixels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceMeasurement {
    pub x: f64,
    pub y: f64,
    /// Semi-major axis from second moments
    pub a: f64,
    /// Semi-minor axis from second moments
    pub b: f64,
    /// Major axis position angle in radians
    pub theta: f64,
    /// Background-subtracted flux over the member pixels
    pub flux: f64,
    /// Highest raw pixel value among the member pixels
    pub peak: f64,
    /// Local background level at the centroid
    pub background: f64,
    /// Number of member pixels
    pub npix: usize,
    /// Gaussian width of the x marginal profile
    pub xstd: f64,
    /// Gaussian width of the y marginal profile
    pub ystd: f64,
    /// Relative residual RMS of the x profile fit
    pub xrms: f64,
    /// Relative residual RMS of the y profile fit
    pub yrms: f64,
    pub xfitvalid: bool,
    pub yfitvalid: bool,
}

impl SourceMeasurement {
    /// Eccentricity of the moment ellipse
    pub fn eccentricity(&self) -> f64 {
        super::centroid::eccentricity(self.a, self.b)
    }
}

/// Background-relative threshold detector
#[derive(Debug, Clone)]
pub struct ThresholdDetector {
    config: DetectorConfig,
}

impl ThresholdDetector {
    /// Create a detector, rejecting unusable configurations
    pub fn new(config: DetectorConfig) -> Result<Self, DetectionError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Detect and measure sources in `image`.
    ///
    /// # Arguments
    /// * `image` - Raw frame (rows × columns)
    /// * `max_detections` - Keep at most this many sources, brightest first
    ///
    /// # Returns
    /// The measured sources, possibly empty. Fails only for an image with no pixels.
    pub fn detect(
        &self,
        image: ArrayView2<f64>,
        max_detections: usize,
    ) -> Result<Vec<SourceMeasurement>, DetectionError> {
        let (rows, cols) = image.dim();
        if rows == 0 || cols == 0 {
            return Err(DetectionError::EmptyImage { rows, cols });
        }

        let background = estimate_background(
            image,
            self.config.background_tile,
            &self.config.background_clip,
        );
        let residual = background.subtract(&image);

        let mask = Array2::from_shape_fn((rows, cols), |(r, c)| {
            residual[[r, c]] > self.config.detection_sigma * background.rms[[r, c]]
        });

        let mut components: Vec<(f64, Vec<(usize, usize)>)> = connected_components(mask.view())
            .into_iter()
            .filter(|component| component.len() >= self.config.min_pixels)
            .map(|component| (component_flux(&component, residual.view()), component))
            .collect();
        components.sort_by(|a, b| b.0.total_cmp(&a.0));

        // Only the brightest components that can be measured get profile fits
        let sources: Vec<SourceMeasurement> = components
            .iter()
            .filter_map(|(_, component)| {
                measure_component(component, image, residual.view(), &background.background)
            })
            .take(max_detections)
            .collect();

        log::trace!(
            "measured {} of {} components above {} sigma in {}x{} frame",
            sources.len(),
            components.len(),
            self.config.detection_sigma,
            rows,
            cols
        );

        Ok(sources)
    }
}

/// Group the set pixels of a mask into 8-connected components.
///
/// Each component is returned as its list of `(row, col)` pixels.
pub fn connected_components(mask: ArrayView2<bool>) -> Vec<Vec<(usize, usize)>> {
    let (rows, cols) = mask.dim();
    let mut visited = Array2::from_elem((rows, cols), false);
    let mut components = Vec::new();

    for i in 0..rows {
        for j in 0..cols {
            if !mask[[i, j]] || visited[[i, j]] {
                continue;
            }

            let mut pixels = Vec::new();
            let mut stack = vec![(i, j)];
            visited[[i, j]] = true;

            while let Some((y, x)) = stack.pop() {
                pixels.push((y, x));

                for &(dy, dx) in &NEIGHBORS {
                    let ny = y as isize + dy;
                    let nx = x as isize + dx;
                    if ny < 0 || ny >= rows as isize || nx < 0 || nx >= cols as isize {
                        continue;
                    }
                    let (ny, nx) = (ny as usize, nx as usize);
                    if mask[[ny, nx]] && !visited[[ny, nx]] {
                        visited[[ny, nx]] = true;
                        stack.push((ny, nx));
                    }
                }
            }

            components.push(pixels);
        }
    }

    components
}

/// Background-subtracted flux of a component, the same total its moments use
fn component_flux(pixels: &[(usize, usize)], residual: ArrayView2<f64>) -> f64 {
    pixels.iter().map(|&(r, c)| residual[[r, c]]).sum()
}

fn measure_component(
    pixels: &[(usize, usize)],
    raw: ArrayView2<f64>,
    residual: ArrayView2<f64>,
    background: &Array2<f64>,
) -> Option<SourceMeasurement> {
    let weighted: Vec<(usize, usize, f64)> = pixels
        .iter()
        .map(|&(r, c)| (r, c, residual[[r, c]]))
        .collect();
    let moments = compute_moments(&weighted)?;

    let peak = pixels
        .iter()
        .map(|&(r, c)| raw[[r, c]])
        .fold(f64::NEG_INFINITY, f64::max);

    // Bounding box plus margin, clamped to the frame
    let (rows, cols) = residual.dim();
    let row_min = pixels.iter().map(|p| p.0).min()?.saturating_sub(PROFILE_MARGIN);
    let row_max = (pixels.iter().map(|p| p.0).max()? + PROFILE_MARGIN).min(rows - 1);
    let col_min = pixels.iter().map(|p| p.1).min()?.saturating_sub(PROFILE_MARGIN);
    let col_max = (pixels.iter().map(|p| p.1).max()? + PROFILE_MARGIN).min(cols - 1);

    let cutout = residual.slice(s![row_min..=row_max, col_min..=col_max]);
    let x_profile = cutout.sum_axis(Axis(0));
    let y_profile = cutout.sum_axis(Axis(1));
    let x_fit = fit_gaussian_profile(&x_profile.to_vec(), col_min as f64);
    let y_fit = fit_gaussian_profile(&y_profile.to_vec(), row_min as f64);

    let center_row = (moments.y.round() as usize).min(rows - 1);
    let center_col = (moments.x.round() as usize).min(cols - 1);

    Some(SourceMeasurement {
        x: moments.x,
        y: moments.y,
        a: moments.a,
        b: moments.b,
        theta: moments.theta,
        flux: moments.flux,
        peak,
        background: background[[center_row, center_col]],
        npix: moments.npix,
        xstd: x_fit.std,
        ystd: y_fit.std,
        xrms: x_fit.rms,
        yrms: y_fit.rms,
        xfitvalid: x_fit.valid,
        yfitvalid: y_fit.valid,
    })
}
