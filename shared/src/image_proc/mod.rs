//! Image processing for guide-camera frames
//!
//! This module provides the pieces needed to turn a raw intensity array into a
//! list of measured point sources: tiled background estimation, intensity
//! moments, marginal-profile Gaussian fits and a threshold detector tying them
//! together. [`synthetic`] renders reproducible star fields for tests.

pub mod background;
pub mod centroid;
pub mod detection;
pub mod profile;
pub mod synthetic;

pub use background::{estimate_background, BackgroundMap};
pub use centroid::{compute_moments, SourceMoments};
pub use detection::{DetectionError, DetectorConfig, SourceMeasurement, ThresholdDetector};
pub use profile::{fit_gaussian_profile, GaussianProfileFit};
