//! Sky background estimation for guide-camera frames.
//!
//! Estimates the sky level and its noise on a grid of square tiles using
//! sigma-clipped statistics (so stars inside a tile do not bias it), then
//! bilinearly interpolates between tile centres to get per-pixel maps.

use ndarray::{s, Array2, ArrayView2};

use crate::algo::stats::{std_dev, SigmaClip};

/// Per-pixel background level and noise estimate.
#[derive(Debug, Clone)]
pub struct BackgroundMap {
    /// Interpolated background level
    pub background: Array2<f64>,
    /// Interpolated background RMS (noise sigma)
    pub rms: Array2<f64>,
    /// Sigma-clipped median of the whole frame
    pub global_background: f64,
    /// Sigma-clipped population std of the whole frame
    pub global_rms: f64,
}

impl BackgroundMap {
    /// Background-subtracted copy of `image`.
    pub fn subtract(&self, image: &ArrayView2<f64>) -> Array2<f64> {
        image - &self.background
    }
}

/// Clipped (median, rms) of a set of pixel values, NaN if nothing survives.
fn clipped_level(values: &[f64], clip: &SigmaClip) -> (f64, f64) {
    let clipped = clip.clip(values);
    (clipped.median(), std_dev(&clipped.values, 0))
}

/// Tile centre coordinates along one axis.
fn tile_centers(len: usize, tile: usize) -> Vec<f64> {
    (0..len)
        .step_by(tile)
        .map(|start| {
            let end = (start + tile).min(len);
            (start + end - 1) as f64 / 2.0
        })
        .collect()
}

/// Find the two tile centres bracketing `coord` and the interpolation weight
/// of the upper one. Coordinates outside the outermost centres are clamped.
fn bracket(centers: &[f64], coord: f64) -> (usize, usize, f64) {
    let last = centers.len() - 1;
    if coord <= centers[0] {
        return (0, 0, 0.0);
    }
    if coord >= centers[last] {
        return (last, last, 0.0);
    }

    let upper = centers.partition_point(|&c| c <= coord);
    let lower = upper - 1;
    let t = (coord - centers[lower]) / (centers[upper] - centers[lower]);
    (lower, upper, t)
}

fn interpolate(
    grid: &Array2<f64>,
    rows: &[(usize, usize, f64)],
    cols: &[(usize, usize, f64)],
) -> Array2<f64> {
    Array2::from_shape_fn((rows.len(), cols.len()), |(r, c)| {
        let (r0, r1, tr) = rows[r];
        let (c0, c1, tc) = cols[c];
        let top = grid[[r0, c0]] * (1.0 - tc) + grid[[r0, c1]] * tc;
        let bottom = grid[[r1, c0]] * (1.0 - tc) + grid[[r1, c1]] * tc;
        top * (1.0 - tr) + bottom * tr
    })
}

/// Estimate the sky background of an image.
///
/// # Arguments
/// * `image` - Raw intensity array (rows × columns)
/// * `tile_size` - Side of the square statistics tiles in pixels (edge tiles may be smaller)
/// * `clip` - Sigma clipping applied within each tile
///
/// # Returns
/// A [`BackgroundMap`] with the same shape as `image`. Tiles with no usable
/// pixels fall back to the whole-frame estimate.
pub fn estimate_background(
    image: ArrayView2<f64>,
    tile_size: usize,
    clip: &SigmaClip,
) -> BackgroundMap {
    let (height, width) = image.dim();
    if height == 0 || width == 0 {
        return BackgroundMap {
            background: Array2::zeros((height, width)),
            rms: Array2::zeros((height, width)),
            global_background: f64::NAN,
            global_rms: f64::NAN,
        };
    }

    let tile = tile_size.max(1);
    let all_pixels: Vec<f64> = image.iter().copied().collect();
    let (global_background, global_rms) = clipped_level(&all_pixels, clip);

    let centers_y = tile_centers(height, tile);
    let centers_x = tile_centers(width, tile);
    let mut tile_bg = Array2::zeros((centers_y.len(), centers_x.len()));
    let mut tile_rms = Array2::zeros((centers_y.len(), centers_x.len()));

    for (ty, y0) in (0..height).step_by(tile).enumerate() {
        for (tx, x0) in (0..width).step_by(tile).enumerate() {
            let y1 = (y0 + tile).min(height);
            let x1 = (x0 + tile).min(width);
            let values: Vec<f64> = image.slice(s![y0..y1, x0..x1]).iter().copied().collect();
            let (level, rms) = clipped_level(&values, clip);

            tile_bg[[ty, tx]] = if level.is_nan() {
                global_background
            } else {
                level
            };
            tile_rms[[ty, tx]] = if rms.is_nan() { global_rms } else { rms };
        }
    }

    let rows: Vec<_> = (0..height).map(|r| bracket(&centers_y, r as f64)).collect();
    let cols: Vec<_> = (0..width).map(|c| bracket(&centers_x, c as f64)).collect();

    BackgroundMap {
        background: interpolate(&tile_bg, &rows, &cols),
        rms: interpolate(&tile_rms, &rows, &cols),
        global_background,
        global_rms,
    }
}
