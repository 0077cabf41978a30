//! Statistical functions for robust sample summaries
//!
//! All functions ignore NaN entries. Empty inputs produce NaN (or an error for
//! [`median`]) rather than panicking, so callers can propagate "no data" as a
//! value.

use serde::{Deserialize, Serialize};

/// Collect the non-NaN values of a slice.
fn non_nan(values: &[f64]) -> Vec<f64> {
    values.iter().filter(|v| !v.is_nan()).copied().collect()
}

/// Arithmetic mean of the non-NaN values, or NaN when there are none.
pub fn mean(values: &[f64]) -> f64 {
    let valid = non_nan(values);
    if valid.is_empty() {
        return f64::NAN;
    }
    valid.iter().sum::<f64>() / valid.len() as f64
}

/// Calculate median of a slice of f64 values
///
/// This function computes the median while filtering out NaN values but including
/// infinite values (±inf). For even-length data, returns the average of the two
/// middle values.
///
/// # Arguments
///
/// * `values` - Slice of f64 values to compute median from
///
/// # Returns
///
/// * `Ok(median)` - The median value
/// * `Err(message)` - If no valid values remain after filtering NaN
pub fn median(values: &[f64]) -> Result<f64, String> {
    let mut valid_values = non_nan(values);

    if valid_values.is_empty() {
        return Err(format!(
            "Insufficient data points to compute median: {} total values, 0 valid (all NaN)",
            values.len()
        ));
    }

    valid_values.sort_by(|a, b| a.total_cmp(b));

    let mid = valid_values.len() / 2;
    let median_value = if valid_values.len() % 2 == 0 {
        (valid_values[mid - 1] + valid_values[mid]) / 2.0
    } else {
        valid_values[mid]
    };

    Ok(median_value)
}

/// Standard deviation with `ddof` delta degrees of freedom.
///
/// `ddof = 0` gives the population standard deviation, `ddof = 1` the sample
/// standard deviation. Returns NaN when fewer than `ddof + 1` valid values exist.
pub fn std_dev(values: &[f64], ddof: usize) -> f64 {
    let valid = non_nan(values);
    if valid.len() <= ddof {
        return f64::NAN;
    }

    let n = valid.len() as f64;
    let mu = valid.iter().sum::<f64>() / n;
    let sum_sq: f64 = valid.iter().map(|v| (v - mu).powi(2)).sum();
    (sum_sq / (n - ddof as f64)).sqrt()
}

/// Weighted average `Σ wᵢxᵢ / Σ wᵢ`.
///
/// Pairs where either the value or the weight is NaN are skipped. Returns `None`
/// when the slices differ in length or the remaining weights sum to zero.
pub fn weighted_average(values: &[f64], weights: &[f64]) -> Option<f64> {
    if values.len() != weights.len() {
        return None;
    }

    let (sum, weight_sum) = values
        .iter()
        .zip(weights)
        .filter(|(v, w)| !v.is_nan() && !w.is_nan())
        .fold((0.0, 0.0), |(s, ws), (v, w)| (s + v * w, ws + w));

    if weight_sum == 0.0 || !weight_sum.is_finite() {
        return None;
    }

    Some(sum / weight_sum)
}

/// Iterative sigma-clipping parameters.
///
/// Each round computes the median and population standard deviation of the
/// surviving values and rejects every value farther than `sigma` standard
/// deviations from the median. Iteration stops when a round rejects nothing
/// or after `max_iterations` rounds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SigmaClip {
    /// Rejection threshold in standard deviations
    pub sigma: f64,
    /// Maximum number of rejection rounds
    pub max_iterations: usize,
}

impl Default for SigmaClip {
    fn default() -> Self {
        Self {
            sigma: 3.0,
            max_iterations: 5,
        }
    }
}

/// Values surviving a sigma clip, plus bookkeeping.
#[derive(Debug, Clone, PartialEq)]
pub struct ClippedSample {
    /// Surviving values in their original relative order
    pub values: Vec<f64>,
    /// Number of non-NaN input values
    pub input_count: usize,
    /// Number of rejection rounds actually performed
    pub iterations: usize,
}

impl ClippedSample {
    /// Number of values rejected by clipping
    pub fn rejected(&self) -> usize {
        self.input_count - self.values.len()
    }

    /// Median of the survivors, NaN if none survived
    pub fn median(&self) -> f64 {
        median(&self.values).unwrap_or(f64::NAN)
    }

    /// Sample standard deviation (ddof = 1) of the survivors
    pub fn std_dev(&self) -> f64 {
        std_dev(&self.values, 1)
    }
}

impl SigmaClip {
    /// Create a clip with the given threshold and iteration cap
    pub fn new(sigma: f64, max_iterations: usize) -> Self {
        Self {
            sigma,
            max_iterations,
        }
    }

    /// Clip a sample. NaN inputs are always discarded.
    pub fn clip(&self, values: &[f64]) -> ClippedSample {
        let mut working = non_nan(values);
        let input_count = working.len();
        let mut iterations = 0;

        while iterations < self.max_iterations && !working.is_empty() {
            let center = match median(&working) {
                Ok(m) => m,
                Err(_) => break,
            };
            let spread = std_dev(&working, 0);
            let threshold = self.sigma * spread;

            iterations += 1;
            let kept: Vec<f64> = working
                .iter()
                .copied()
                .filter(|v| (v - center).abs() <= threshold)
                .collect();

            if kept.len() == working.len() {
                break;
            }
            working = kept;
        }

        ClippedSample {
            values: working,
            input_count,
            iterations,
        }
    }
}
