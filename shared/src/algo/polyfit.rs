//! Weighted polynomial least squares
//!
//! Fits `y = c₀·xⁿ + c₁·xⁿ⁻¹ + … + cₙ` by minimising `Σ (wᵢ·(yᵢ − p(xᵢ)))²`.
//! Weights multiply the residuals (not their squares), so for Gaussian errors
//! the natural choice is `wᵢ = 1/σᵢ`.
//!
//! The weighted Vandermonde matrix has its columns scaled to unit norm before
//! being solved by SVD, which keeps the fit well conditioned when `x` spans
//! hundreds of units and `x²` tens of thousands.

use nalgebra::{DMatrix, DVector};
use thiserror::Error;

/// Errors that can occur during polynomial fitting
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PolyFitError {
    #[error("insufficient data: degree {degree} fit needs at least {required} points, got {got}")]
    InsufficientData {
        degree: usize,
        required: usize,
        got: usize,
    },
    #[error("length mismatch: x has {x_len} points, y has {y_len}, weights have {w_len}")]
    LengthMismatch {
        x_len: usize,
        y_len: usize,
        w_len: usize,
    },
    #[error("non-finite value in fit input at index {0}")]
    NonFinite(usize),
    #[error("design matrix is rank deficient (rank {rank} < {required})")]
    RankDeficient { rank: usize, required: usize },
    #[error("SVD solve failed: {0}")]
    Solve(String),
}

/// Result of a polynomial fit
#[derive(Debug, Clone, PartialEq)]
pub struct PolyFit {
    /// Coefficients, highest degree first
    pub coefficients: Vec<f64>,
    /// Unweighted RMS of `y − p(x)` over the fitted points
    pub residual_rms: f64,
}

impl PolyFit {
    /// Polynomial degree
    pub fn degree(&self) -> usize {
        self.coefficients.len().saturating_sub(1)
    }

    /// Evaluate the fitted polynomial at `x`
    pub fn evaluate(&self, x: f64) -> f64 {
        polyval(&self.coefficients, x)
    }
}

/// Evaluate a polynomial (highest degree coefficient first) with Horner's rule.
pub fn polyval(coefficients: &[f64], x: f64) -> f64 {
    coefficients.iter().fold(0.0, |acc, &c| acc * x + c)
}

/// Weighted least-squares polynomial fit.
///
/// # Arguments
/// * `x` - Sample abscissae
/// * `y` - Sample values
/// * `weights` - Optional per-sample residual weights (`None` = all ones)
/// * `degree` - Polynomial degree
///
/// # Returns
/// * `Ok(PolyFit)` - Coefficients, highest degree first
/// * `Err(PolyFitError)` - Too few points, mismatched inputs, non-finite values,
///   or a rank deficient design (e.g. fewer distinct `x` than `degree + 1`)
pub fn weighted_polyfit(
    x: &[f64],
    y: &[f64],
    weights: Option<&[f64]>,
    degree: usize,
) -> Result<PolyFit, PolyFitError> {
    let n = x.len();
    let m = degree + 1;
    let w_len = weights.map_or(n, |w| w.len());

    if y.len() != n || w_len != n {
        return Err(PolyFitError::LengthMismatch {
            x_len: n,
            y_len: y.len(),
            w_len,
        });
    }

    if n < m {
        return Err(PolyFitError::InsufficientData {
            degree,
            required: m,
            got: n,
        });
    }

    let weight = |i: usize| weights.map_or(1.0, |w| w[i]);

    for i in 0..n {
        if !x[i].is_finite() || !y[i].is_finite() || !weight(i).is_finite() {
            return Err(PolyFitError::NonFinite(i));
        }
    }

    // Weighted Vandermonde matrix, highest power in column 0
    let mut design = DMatrix::from_fn(n, m, |i, j| weight(i) * x[i].powi((degree - j) as i32));
    let rhs = DVector::from_fn(n, |i, _| weight(i) * y[i]);

    let mut scales = vec![1.0; m];
    for (j, scale) in scales.iter_mut().enumerate() {
        let norm = design.column(j).norm();
        if norm > 0.0 {
            *scale = norm;
            design.column_mut(j).unscale_mut(norm);
        }
    }

    let svd = design.svd(true, true);
    let max_singular = svd.singular_values.max();
    let tolerance = max_singular * n as f64 * f64::EPSILON;
    let rank = svd.rank(tolerance);
    if rank < m {
        return Err(PolyFitError::RankDeficient { rank, required: m });
    }

    let scaled = svd
        .solve(&rhs, tolerance)
        .map_err(|e| PolyFitError::Solve(e.to_string()))?;

    let coefficients: Vec<f64> = scaled
        .iter()
        .zip(&scales)
        .map(|(c, scale)| c / scale)
        .collect();

    let sum_sq: f64 = x
        .iter()
        .zip(y)
        .map(|(&xi, &yi)| (yi - polyval(&coefficients, xi)).powi(2))
        .sum();

    Ok(PolyFit {
        coefficients,
        residual_rms: (sum_sq / n as f64).sqrt(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_polyval_horner() {
        // 2x² - 3x + 1
        let c = [2.0, -3.0, 1.0];
        assert_eq!(polyval(&c, 0.0), 1.0);
        assert_eq!(polyval(&c, 2.0), 3.0);
        assert_eq!(polyval(&[], 5.0), 0.0);
    }

    #[test]
    fn test_exact_parabola_recovered() {
        let xs = [-150.0, -75.0, 0.0, 60.0, 140.0];
        let ys: Vec<f64> = xs.iter().map(|x| 2.0e-4 * x * x - 0.01 * x + 1.3).collect();

        let fit = weighted_polyfit(&xs, &ys, None, 2).unwrap();

        assert_eq!(fit.degree(), 2);
        assert_relative_eq!(fit.coefficients[0], 2.0e-4, epsilon = 1e-12);
        assert_relative_eq!(fit.coefficients[1], -0.01, epsilon = 1e-10);
        assert_relative_eq!(fit.coefficients[2], 1.3, epsilon = 1e-9);
        assert!(fit.residual_rms < 1e-9);
    }

    #[test]
    fn test_line_fit() {
        let xs = [0.0, 1.0, 2.0, 3.0];
        let ys = [1.0, 3.0, 5.0, 7.0];

        let fit = weighted_polyfit(&xs, &ys, None, 1).unwrap();

        assert_relative_eq!(fit.coefficients[0], 2.0, epsilon = 1e-12);
        assert_relative_eq!(fit.coefficients[1], 1.0, epsilon = 1e-12);
        assert_relative_eq!(fit.evaluate(10.0), 21.0, epsilon = 1e-10);
    }

    #[test]
    fn test_weights_pull_fit_toward_trusted_points() {
        // Constant fit: weighted mean with squared weights
        let xs = [0.0, 1.0];
        let ys = [0.0, 10.0];

        let even = weighted_polyfit(&xs, &ys, Some(&[1.0, 1.0]), 0).unwrap();
        assert_relative_eq!(even.coefficients[0], 5.0, epsilon = 1e-12);

        // w = [1, 3] -> effective weights [1, 9] -> (0*1 + 10*9) / 10
        let skewed = weighted_polyfit(&xs, &ys, Some(&[1.0, 3.0]), 0).unwrap();
        assert_relative_eq!(skewed.coefficients[0], 9.0, epsilon = 1e-12);
    }

    #[test]
    fn test_insufficient_data() {
        let result = weighted_polyfit(&[0.0, 1.0], &[1.0, 2.0], None, 2);
        assert!(matches!(
            result,
            Err(PolyFitError::InsufficientData {
                degree: 2,
                required: 3,
                got: 2
            })
        ));
    }

    #[test]
    fn test_length_mismatch() {
        let result = weighted_polyfit(&[0.0, 1.0, 2.0], &[1.0, 2.0], None, 1);
        assert!(matches!(result, Err(PolyFitError::LengthMismatch { .. })));

        let result = weighted_polyfit(&[0.0, 1.0], &[1.0, 2.0], Some(&[1.0]), 1);
        assert!(matches!(result, Err(PolyFitError::LengthMismatch { .. })));
    }

    #[test]
    fn test_repeated_abscissa_is_rank_deficient() {
        let result = weighted_polyfit(&[1.0, 1.0, 2.0, 2.0], &[1.0, 1.1, 2.0, 2.1], None, 2);
        assert!(matches!(
            result,
            Err(PolyFitError::RankDeficient { required: 3, .. })
        ));
    }

    #[test]
    fn test_non_finite_rejected() {
        let result = weighted_polyfit(&[0.0, 1.0, f64::NAN], &[1.0, 2.0, 3.0], None, 1);
        assert!(matches!(result, Err(PolyFitError::NonFinite(2))));

        let result = weighted_polyfit(
            &[0.0, 1.0, 2.0],
            &[1.0, 2.0, 3.0],
            Some(&[1.0, f64::INFINITY, 1.0]),
            1,
        );
        assert!(matches!(result, Err(PolyFitError::NonFinite(1))));
    }
}
