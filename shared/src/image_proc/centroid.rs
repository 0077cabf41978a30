//! Intensity-weighted moments of detected sources
//!
//! Computes the centroid and second central moments of a source from its
//! member pixels, and derives the elliptical shape parameters used for
//! quality filtering and FWHM estimation.

use serde::{Deserialize, Serialize};

/// Centroid and shape of a source derived from its second moments.
///
/// The semi-axes are the square roots of the eigenvalues of the moment
/// matrix, so `a ≥ b ≥ 0`. For a Gaussian spot `a` and `b` are the standard
/// deviations along the major and minor axes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceMoments {
    /// Centroid column coordinate
    pub x: f64,
    /// Centroid row coordinate
    pub y: f64,
    /// Total flux (sum of pixel intensities)
    pub flux: f64,
    /// Second central moment μ₂₀ (variance in x-direction)
    pub m_xx: f64,
    /// Second central moment μ₀₂ (variance in y-direction)
    pub m_yy: f64,
    /// Second central moment μ₁₁ (covariance between x and y)
    pub m_xy: f64,
    /// Semi-major axis in pixels
    pub a: f64,
    /// Semi-minor axis in pixels
    pub b: f64,
    /// Position angle of the major axis, radians counter-clockwise from +x
    pub theta: f64,
    /// Number of member pixels
    pub npix: usize,
}

impl SourceMoments {
    /// Eccentricity `sqrt(a² − b²) / a`, in `[0, 1)`.
    pub fn eccentricity(&self) -> f64 {
        eccentricity(self.a, self.b)
    }
}

/// Eccentricity of an ellipse with semi-axes `a ≥ b`.
///
/// Returns NaN for a degenerate ellipse (`a ≤ 0`).
pub fn eccentricity(a: f64, b: f64) -> f64 {
    if a <= 0.0 {
        return f64::NAN;
    }
    (a * a - b * b).max(0.0).sqrt() / a
}

/// Calculate centroid and shape moments from a source's member pixels.
///
/// # Arguments
///
/// * `pixels` - `(row, col, intensity)` for each member pixel, background subtracted
///
/// # Returns
///
/// `None` when the pixels carry no positive flux.
pub fn compute_moments(pixels: &[(usize, usize, f64)]) -> Option<SourceMoments> {
    let flux: f64 = pixels.iter().map(|&(_, _, v)| v).sum();
    if flux < f64::EPSILON {
        return None;
    }

    let x = pixels.iter().map(|&(_, c, v)| c as f64 * v).sum::<f64>() / flux;
    let y = pixels.iter().map(|&(r, _, v)| r as f64 * v).sum::<f64>() / flux;

    // Central moments about the centroid
    let mut mu20 = 0.0;
    let mut mu02 = 0.0;
    let mut mu11 = 0.0;
    for &(row, col, intensity) in pixels {
        let dx = col as f64 - x;
        let dy = row as f64 - y;
        mu20 += dx * dx * intensity;
        mu02 += dy * dy * intensity;
        mu11 += dx * dy * intensity;
    }
    mu20 /= flux;
    mu02 /= flux;
    mu11 /= flux;

    // Eigenvalues of the covariance matrix
    let sum = mu20 + mu02;
    let diff = mu20 - mu02;
    let discriminant = (4.0 * mu11.powi(2) + diff.powi(2)).sqrt();

    let lambda1 = ((sum + discriminant) / 2.0).max(0.0);
    let lambda2 = ((sum - discriminant) / 2.0).max(0.0);

    Some(SourceMoments {
        x,
        y,
        flux,
        m_xx: mu20,
        m_yy: mu02,
        m_xy: mu11,
        a: lambda1.sqrt(),
        b: lambda2.sqrt(),
        theta: 0.5 * (2.0 * mu11).atan2(diff),
        npix: pixels.len(),
    })
}
