//! Secondary mirror focus analysis for guide-camera focus sweeps
//!
//! During a focus sweep the secondary mirror (M2) is stepped through a range of
//! piston positions while the guide cameras keep exposing. This crate measures
//! the seeing-limited FWHM of the stars in every frame and fits the FWHM
//! against M2 position to find the best focus:
//!
//! 1. [`extraction`]: detect and measure sources in each exposure
//! 2. [`aggregate`]: run extraction over a sweep on a fixed worker pool
//! 3. [`quality`]: drop saturated, elongated, implausible or badly fit sources
//! 4. [`fwhm`]: derive FWHM in arcseconds
//! 5. [`grouping`]: sigma-clipped FWHM statistics per M2 position
//! 6. [`fit`]: weighted parabola fit and best-focus vertex
//!
//! [`pipeline::FocusPipeline`] runs all stages from one [`config::FocusConfig`].
//!
//! # Example
//!
//! ```no_run
//! use focus::config::FocusConfig;
//! use focus::exposure::InMemoryLoader;
//! use focus::pipeline::FocusPipeline;
//! use shared::image_proc::detection::ThresholdDetector;
//!
//! let config = FocusConfig::default();
//! let detector = ThresholdDetector::new(config.extraction.detector_config()).unwrap();
//! let loader = InMemoryLoader::new();
//!
//! let pipeline = FocusPipeline::new(config, &detector, &loader);
//! let report = pipeline.run(&["gimg-gfa1s-0001.fits"]).unwrap();
//! println!("best focus: {}", report.fit.best_focus);
//! ```

pub mod aggregate;
pub mod catalog;
pub mod config;
pub mod discovery;
pub mod exposure;
pub mod extraction;
#[cfg(feature = "fits")]
pub mod fits_loader;
pub mod fit;
pub mod fwhm;
pub mod grouping;
pub mod pipeline;
pub mod quality;

pub use catalog::{Catalog, Detection};
pub use config::FocusConfig;
pub use fit::{FitError, FocusCurveFit, ParabolaFitter};
pub use pipeline::{FocusPipeline, FocusReport, PipelineError};
