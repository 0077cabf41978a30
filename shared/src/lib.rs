//! Shared numerical and image processing components for guide-camera focus analysis.
//!
//! The focus pipeline in the `focus` crate is built from the pieces here:
//!
//! - [`algo`]: robust statistics, sigma clipping and weighted polynomial fits
//! - [`image_proc`]: background estimation, source moments, profile fits,
//!   threshold source detection and synthetic star fields for testing

pub mod algo;
pub mod image_proc;
