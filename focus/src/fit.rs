//! Focus curve fitting
//!
//! Fits `fwhm = a·m2² + b·m2 + c` to the per-position medians, weighting each
//! position by the inverse of its dispersion, and reports the vertex as the
//! best focus. A curve that does not open upward has no minimum and is an
//! error rather than a result.

use serde::{Deserialize, Serialize};
use shared::algo::polyfit::{polyval, weighted_polyfit, PolyFitError};
use thiserror::Error;

use crate::grouping::FocusGroups;

/// Minimum number of valid focus positions for a parabola
pub const MIN_FIT_GROUPS: usize = 3;

/// Curvature across the sampled positions, relative to the largest median,
/// below which the curve counts as flat
const FLAT_CURVATURE_TOLERANCE: f64 = 1e-9;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FitError {
    #[error("insufficient data: {valid_groups} valid focus positions, {required} required")]
    InsufficientData { valid_groups: usize, required: usize },
    #[error("focus curve has no minimum (a = {a:e}, b = {b:e}, c = {c:e})")]
    DegenerateFit { a: f64, b: f64, c: f64 },
    #[error("least squares fit failed: {0}")]
    Singular(#[from] PolyFitError),
}

/// Fitted focus curve and its vertex
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FocusCurveFit {
    /// Quadratic coefficient
    pub a: f64,
    /// Linear coefficient
    pub b: f64,
    /// Constant term
    pub c: f64,
    /// Vertex `-b / 2a` plus `offset`
    pub best_focus: f64,
    /// Offset added to the vertex
    pub offset: f64,
    /// Number of focus positions used in the fit
    pub n_groups: usize,
    /// Unweighted RMS of the medians about the curve, arcseconds
    pub residual_rms: f64,
}

impl FocusCurveFit {
    /// Fitted FWHM at mirror position `m2`
    pub fn evaluate(&self, m2: f64) -> f64 {
        polyval(&[self.a, self.b, self.c], m2)
    }

    /// Fitted FWHM at the vertex
    pub fn min_fwhm(&self) -> f64 {
        self.evaluate(self.best_focus - self.offset)
    }
}

/// Weighted parabola fit over focus groups
#[derive(Debug, Clone, Copy)]
pub struct ParabolaFitter {
    offset: f64,
    min_dispersion: f64,
}

impl Default for ParabolaFitter {
    fn default() -> Self {
        Self {
            offset: 0.0,
            min_dispersion: 1e-6,
        }
    }
}

impl ParabolaFitter {
    /// # Arguments
    /// * `offset` - Added verbatim to the fitted vertex
    /// * `min_dispersion` - Floor on group dispersions before they become weights
    pub fn new(offset: f64, min_dispersion: f64) -> Self {
        Self {
            offset,
            min_dispersion,
        }
    }

    /// Fit the focus curve.
    ///
    /// # Returns
    /// * `Ok(FocusCurveFit)` - Upward-opening parabola and its vertex
    /// * `Err(FitError::InsufficientData)` - Fewer than three valid groups
    /// * `Err(FitError::DegenerateFit)` - Fitted `a ≤ 0`, or a curvature too small
    ///   to distinguish from a flat line over the sampled positions
    pub fn fit(&self, groups: &FocusGroups) -> Result<FocusCurveFit, FitError> {
        let valid: Vec<_> = groups.valid().collect();
        if valid.len() < MIN_FIT_GROUPS {
            return Err(FitError::InsufficientData {
                valid_groups: valid.len(),
                required: MIN_FIT_GROUPS,
            });
        }

        let x: Vec<f64> = valid.iter().map(|g| g.position).collect();
        let y: Vec<f64> = valid.iter().map(|g| g.median).collect();
        let w: Vec<f64> = valid
            .iter()
            .map(|g| 1.0 / g.dispersion.max(self.min_dispersion))
            .collect();

        let poly = weighted_polyfit(&x, &y, Some(&w), 2)?;
        let (a, b, c) = (poly.coefficients[0], poly.coefficients[1], poly.coefficients[2]);

        let span = x.iter().copied().fold(f64::NEG_INFINITY, f64::max)
            - x.iter().copied().fold(f64::INFINITY, f64::min);
        let y_scale = y.iter().fold(0.0_f64, |m, v| m.max(v.abs()));
        if a <= 0.0 || a * span * span <= FLAT_CURVATURE_TOLERANCE * y_scale {
            return Err(FitError::DegenerateFit { a, b, c });
        }

        let fit = FocusCurveFit {
            a,
            b,
            c,
            best_focus: -b / (2.0 * a) + self.offset,
            offset: self.offset,
            n_groups: valid.len(),
            residual_rms: poly.residual_rms,
        };

        log::info!(
            "focus curve: a = {:.4e}, b = {:.4e}, c = {:.4}; best focus {:.2} ({} positions)",
            fit.a,
            fit.b,
            fit.c,
            fit.best_focus,
            fit.n_groups
        );
        Ok(fit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grouping::FocusGroup;
    use approx::assert_relative_eq;

    fn group(position: f64, median: f64, dispersion: f64) -> FocusGroup {
        FocusGroup {
            position,
            median,
            dispersion,
            count_before: 10,
            count_after: 10,
        }
    }

    fn groups(points: &[(f64, f64, f64)]) -> FocusGroups {
        points
            .iter()
            .map(|&(p, m, d)| group(p, m, d))
            .collect::<Vec<_>>()
            .into()
    }

    #[test]
    fn test_symmetric_three_point_curve() {
        let g = groups(&[(-100.0, 2.0, 0.1), (0.0, 1.0, 0.1), (100.0, 2.0, 0.1)]);

        let fit = ParabolaFitter::default().fit(&g).unwrap();

        assert_relative_eq!(fit.a, 1e-4, epsilon = 1e-12);
        assert!(fit.b.abs() < 1e-12);
        assert_relative_eq!(fit.c, 1.0, epsilon = 1e-10);
        assert!(fit.best_focus.abs() < 1e-6);
        assert_eq!(fit.n_groups, 3);
    }

    #[test]
    fn test_offset_added_to_vertex() {
        let g = groups(&[(-100.0, 2.0, 0.1), (0.0, 1.0, 0.1), (100.0, 2.0, 0.1)]);

        let fit = ParabolaFitter::new(20.0, 1e-6).fit(&g).unwrap();

        assert_relative_eq!(fit.best_focus, 20.0, epsilon = 1e-6);
        assert_relative_eq!(fit.offset, 20.0);
        assert_relative_eq!(fit.min_fwhm(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_recovers_known_parabola() {
        let (a, b, c) = (3.0e-5, -6.0e-3, 1.1);
        let points: Vec<(f64, f64, f64)> = [-150.0, -80.0, -20.0, 40.0, 90.0, 200.0]
            .iter()
            .enumerate()
            .map(|(i, &x)| (x, a * x * x + b * x + c, 0.05 + 0.02 * i as f64))
            .collect();

        let fit = ParabolaFitter::default().fit(&groups(&points)).unwrap();

        assert_relative_eq!(fit.a, a, max_relative = 1e-8);
        assert_relative_eq!(fit.b, b, max_relative = 1e-8);
        assert_relative_eq!(fit.c, c, max_relative = 1e-8);
        assert_relative_eq!(fit.best_focus, -b / (2.0 * a), max_relative = 1e-8);
        assert_relative_eq!(fit.evaluate(40.0), a * 1600.0 + b * 40.0 + c, epsilon = 1e-9);
    }

    #[test]
    fn test_tight_groups_dominate() {
        // The noisy outer point pulls the vertex far less than the tight ones
        let g = groups(&[
            (-100.0, 2.0, 0.05),
            (-50.0, 1.25, 0.05),
            (0.0, 1.0, 0.05),
            (50.0, 1.25, 0.05),
            (100.0, 3.0, 5.0),
        ]);

        let fit = ParabolaFitter::default().fit(&g).unwrap();
        assert!(fit.best_focus.abs() < 1.0, "best focus {}", fit.best_focus);
    }

    #[test]
    fn test_two_valid_groups_is_insufficient() {
        let g = groups(&[(-100.0, 2.0, 0.1), (0.0, 1.0, 0.1), (100.0, f64::NAN, f64::NAN)]);

        assert_eq!(
            ParabolaFitter::default().fit(&g),
            Err(FitError::InsufficientData {
                valid_groups: 2,
                required: 3
            })
        );
    }

    #[test]
    fn test_nan_dispersion_groups_excluded() {
        let g = groups(&[
            (-100.0, 2.0, 0.1),
            (-50.0, 9.0, f64::NAN),
            (0.0, 1.0, 0.1),
            (100.0, 2.0, 0.1),
        ]);

        let fit = ParabolaFitter::default().fit(&g).unwrap();
        assert_eq!(fit.n_groups, 3);
        assert!(fit.best_focus.abs() < 1e-6);
    }

    #[test]
    fn test_concave_curve_is_degenerate() {
        let g = groups(&[(-100.0, 1.0, 0.1), (0.0, 2.0, 0.1), (100.0, 1.0, 0.1)]);

        match ParabolaFitter::default().fit(&g) {
            Err(FitError::DegenerateFit { a, .. }) => assert!(a < 0.0),
            other => panic!("expected DegenerateFit, got {other:?}"),
        }
    }

    #[test]
    fn test_flat_curve_is_degenerate() {
        let g = groups(&[(-100.0, 1.0, 0.1), (0.0, 1.0, 0.1), (100.0, 1.0, 0.1)]);
        assert!(matches!(
            ParabolaFitter::default().fit(&g),
            Err(FitError::DegenerateFit { .. })
        ));
    }

    #[test]
    fn test_zero_dispersion_is_floored() {
        let g = groups(&[(-100.0, 2.0, 0.0), (0.0, 1.0, 0.0), (100.0, 2.0, 0.0)]);

        let fit = ParabolaFitter::default().fit(&g).unwrap();
        assert_relative_eq!(fit.a, 1e-4, epsilon = 1e-12);
    }

    #[test]
    fn test_fit_is_deterministic() {
        let g = groups(&[
            (-120.0, 2.3, 0.2),
            (-40.0, 1.4, 0.1),
            (30.0, 1.2, 0.15),
            (110.0, 2.1, 0.3),
        ]);
        let fitter = ParabolaFitter::new(5.0, 1e-6);

        assert_eq!(fitter.fit(&g).unwrap(), fitter.fit(&g).unwrap());
    }
}
