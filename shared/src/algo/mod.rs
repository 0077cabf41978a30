//! Numerical algorithms used across the focus analysis pipeline.
//!
//! - **Statistics**: NaN-aware mean, median, standard deviation and weighted averages
//! - **Sigma clipping**: iterative outlier rejection with an iteration cap
//! - **Polynomial fitting**: weighted least squares solved by SVD

pub mod polyfit;
pub mod stats;

pub use polyfit::{polyval, weighted_polyfit, PolyFit, PolyFitError};
pub use stats::{mean, median, std_dev, weighted_average, ClippedSample, SigmaClip};
