//! One-dimensional Gaussian fits to marginal source profiles
//!
//! A Gaussian is a parabola in log space, so `ln y = c₀x² + c₁x + c₂` is fit
//! by weighted least squares with weights `y` (Caruana's method). Only samples
//! above a fraction of the peak take part, since the wings are dominated by
//! noise once logged.

use crate::algo::polyfit::weighted_polyfit;

/// Fraction of the profile peak a sample must exceed to enter the fit
const FIT_FLOOR_FRACTION: f64 = 0.05;

/// Result of fitting a Gaussian to a 1D profile.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GaussianProfileFit {
    /// Fitted centre, in the coordinates given by `origin`
    pub center: f64,
    /// Fitted standard deviation in pixels
    pub std: f64,
    /// Fitted peak height
    pub amplitude: f64,
    /// RMS of the fit residuals over the fitted samples, relative to the amplitude
    pub rms: f64,
    /// Whether the fit converged to a plausible Gaussian
    pub valid: bool,
}

impl GaussianProfileFit {
    fn invalid() -> Self {
        Self {
            center: f64::NAN,
            std: f64::NAN,
            amplitude: f64::NAN,
            rms: f64::NAN,
            valid: false,
        }
    }
}

/// Fit a Gaussian to a sampled profile.
///
/// # Arguments
/// * `profile` - Background-subtracted samples at unit spacing
/// * `origin` - Coordinate of `profile[0]`
///
/// # Returns
/// The fit. `valid` is false (and the parameters NaN) when fewer than three
/// samples lie above the floor, the log-parabola opens upward, or the width
/// is not smaller than the profile itself.
pub fn fit_gaussian_profile(profile: &[f64], origin: f64) -> GaussianProfileFit {
    let peak = profile.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !peak.is_finite() || peak <= 0.0 {
        return GaussianProfileFit::invalid();
    }

    let floor = peak * FIT_FLOOR_FRACTION;
    let mut xs = Vec::new();
    let mut log_ys = Vec::new();
    let mut ys = Vec::new();
    for (i, &v) in profile.iter().enumerate() {
        if v > floor {
            xs.push(origin + i as f64);
            log_ys.push(v.ln());
            ys.push(v);
        }
    }

    if xs.len() < 3 {
        return GaussianProfileFit::invalid();
    }

    let fit = match weighted_polyfit(&xs, &log_ys, Some(&ys), 2) {
        Ok(fit) => fit,
        Err(_) => return GaussianProfileFit::invalid(),
    };
    let (c2, c1, c0) = (fit.coefficients[0], fit.coefficients[1], fit.coefficients[2]);

    if c2 >= 0.0 {
        return GaussianProfileFit::invalid();
    }

    let std = (-1.0 / (2.0 * c2)).sqrt();
    let center = -c1 / (2.0 * c2);
    let amplitude = (c0 - c1 * c1 / (4.0 * c2)).exp();

    if !std.is_finite() || std <= 0.0 || std >= profile.len() as f64 || !amplitude.is_finite() {
        return GaussianProfileFit::invalid();
    }

    let sum_sq: f64 = xs
        .iter()
        .zip(&ys)
        .map(|(&x, &y)| {
            let model = amplitude * (-(x - center).powi(2) / (2.0 * std * std)).exp();
            (y - model).powi(2)
        })
        .sum();

    GaussianProfileFit {
        center,
        std,
        amplitude,
        rms: (sum_sq / xs.len() as f64).sqrt() / amplitude,
        valid: true,
    }
}
