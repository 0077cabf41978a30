//! Reproducible synthetic frames
//!
//! Seeded Gaussian noise and elliptical Gaussian stars, used to exercise the
//! detector and the focus pipeline without real camera data.

use ndarray::Array2;
use rand::{rngs::StdRng, SeedableRng};
use rand_distr::{Distribution, Normal, NormalError};

/// Generate a 2D array filled with normally distributed values.
///
/// # Arguments
/// * `size` - Array dimensions as (rows, columns)
/// * `mean` - Mean of the normal distribution
/// * `std_dev` - Standard deviation of the normal distribution
/// * `seed` - Random seed, so the same arguments always give the same array
///
/// # Example
/// ```
/// use shared::image_proc::synthetic::simple_normal_array;
///
/// let noise = simple_normal_array((10, 10), 100.0, 10.0, 42).unwrap();
/// assert_eq!(noise.dim(), (10, 10));
/// ```
pub fn simple_normal_array(
    size: (usize, usize),
    mean: f64,
    std_dev: f64,
    seed: u64,
) -> Result<Array2<f64>, NormalError> {
    let mut rng = StdRng::seed_from_u64(seed);
    let normal_dist = Normal::new(mean, std_dev)?;
    Ok(Array2::from_shape_fn(size, |_| normal_dist.sample(&mut rng)))
}

/// An axis-aligned elliptical Gaussian star.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyntheticStar {
    /// Centre column
    pub x: f64,
    /// Centre row
    pub y: f64,
    /// Peak height above background
    pub amplitude: f64,
    pub sigma_x: f64,
    pub sigma_y: f64,
}

impl SyntheticStar {
    /// A circular star with the same sigma on both axes
    pub fn round(x: f64, y: f64, amplitude: f64, sigma: f64) -> Self {
        Self {
            x,
            y,
            amplitude,
            sigma_x: sigma,
            sigma_y: sigma,
        }
    }
}

/// Add a star to `image`, evaluated within five sigma of its centre.
pub fn add_gaussian_star(image: &mut Array2<f64>, star: &SyntheticStar) {
    let (height, width) = image.dim();
    if height == 0 || width == 0 {
        return;
    }

    let reach_x = 5.0 * star.sigma_x;
    let reach_y = 5.0 * star.sigma_y;
    let col_start = (star.x - reach_x).floor().max(0.0) as usize;
    let col_end = ((star.x + reach_x).ceil().max(0.0) as usize).min(width - 1);
    let row_start = (star.y - reach_y).floor().max(0.0) as usize;
    let row_end = ((star.y + reach_y).ceil().max(0.0) as usize).min(height - 1);

    for row in row_start..=row_end {
        for col in col_start..=col_end {
            let dx = (col as f64 - star.x) / star.sigma_x;
            let dy = (row as f64 - star.y) / star.sigma_y;
            image[[row, col]] += star.amplitude * (-0.5 * (dx * dx + dy * dy)).exp();
        }
    }
}

/// Render a star field on a noisy flat background.
///
/// A `noise_std` of zero produces a noiseless frame.
pub fn render_star_field(
    size: (usize, usize),
    stars: &[SyntheticStar],
    background: f64,
    noise_std: f64,
    seed: u64,
) -> Result<Array2<f64>, NormalError> {
    let mut image = if noise_std > 0.0 {
        simple_normal_array(size, background, noise_std, seed)?
    } else {
        Array2::from_elem(size, background)
    };

    for star in stars {
        add_gaussian_star(&mut image, star);
    }

    Ok(image)
}
