//! Robust per-position FWHM statistics
//!
//! Detections are grouped by secondary mirror position. Within each group the
//! FWHM values are sigma clipped and summarised by the median and sample
//! standard deviation of the survivors. Groups that cannot be summarised keep
//! NaN statistics rather than disappearing, so the fitter can see and skip them.

use serde::{Deserialize, Serialize};
use shared::algo::stats::SigmaClip;

use crate::catalog::Catalog;

/// Clipped FWHM statistics at one mirror position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FocusGroup {
    /// Secondary mirror position
    pub position: f64,
    /// Median FWHM of the surviving samples, arcseconds
    #[serde(with = "nan_as_null")]
    pub median: f64,
    /// Sample standard deviation of the surviving samples, NaN below two
    #[serde(with = "nan_as_null")]
    pub dispersion: f64,
    /// Detections at this position before clipping
    pub count_before: usize,
    /// Samples surviving the clip
    pub count_after: usize,
}

impl FocusGroup {
    /// Whether both statistics are defined, i.e. the group can enter a fit
    pub fn is_valid(&self) -> bool {
        !self.median.is_nan() && !self.dispersion.is_nan()
    }
}

/// JSON has no NaN; undefined statistics are written as `null` and read back as NaN.
mod nan_as_null {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(value: &f64, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let value = if value.is_nan() { None } else { Some(*value) };
        value.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<f64, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
    }
}

/// Focus groups ordered by increasing position
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FocusGroups(Vec<FocusGroup>);

impl FocusGroups {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FocusGroup> {
        self.0.iter()
    }

    /// Group at exactly `position`
    pub fn get(&self, position: f64) -> Option<&FocusGroup> {
        self.0.iter().find(|g| g.position == position)
    }

    /// Groups with defined median and dispersion
    pub fn valid(&self) -> impl Iterator<Item = &FocusGroup> {
        self.0.iter().filter(|g| g.is_valid())
    }

    pub fn as_slice(&self) -> &[FocusGroup] {
        &self.0
    }
}

impl From<Vec<FocusGroup>> for FocusGroups {
    fn from(mut groups: Vec<FocusGroup>) -> Self {
        groups.sort_by(|a, b| a.position.total_cmp(&b.position));
        Self(groups)
    }
}

/// Groups detections by mirror position and clips outliers within each group.
#[derive(Debug, Clone, Copy)]
pub struct RobustGrouper {
    clip: SigmaClip,
}

impl RobustGrouper {
    pub fn new(clip: SigmaClip) -> Self {
        Self { clip }
    }

    /// Summarise the `fwhm` column per mirror position.
    ///
    /// Rows without a mirror position cannot be placed on the focus curve and
    /// are left out. Rows without a FWHM count towards `count_before` but never
    /// survive clipping.
    pub fn group_and_clip(&self, catalog: &Catalog) -> FocusGroups {
        let mut samples: Vec<(f64, f64)> = Vec::with_capacity(catalog.len());
        let mut unplaced = 0;
        for row in catalog {
            if row.m2.is_nan() {
                unplaced += 1;
                continue;
            }
            samples.push((row.m2, row.fwhm.unwrap_or(f64::NAN)));
        }
        if unplaced > 0 {
            log::warn!("{unplaced} detections have no M2 position and were not grouped");
        }

        samples.sort_by(|a, b| a.0.total_cmp(&b.0));

        let groups: Vec<FocusGroup> = samples
            .chunk_by(|a, b| a.0 == b.0)
            .map(|chunk| {
                let fwhm: Vec<f64> = chunk.iter().map(|&(_, f)| f).collect();
                let clipped = self.clip.clip(&fwhm);
                let group = FocusGroup {
                    position: chunk[0].0,
                    median: clipped.median(),
                    dispersion: clipped.std_dev(),
                    count_before: chunk.len(),
                    count_after: clipped.values.len(),
                };

                if group.is_valid() {
                    log::debug!(
                        "m2 {}: median {:.3} ± {:.3} ({} of {} kept)",
                        group.position,
                        group.median,
                        group.dispersion,
                        group.count_after,
                        group.count_before
                    );
                } else {
                    log::warn!(
                        "m2 {}: too few samples for statistics ({} of {} kept)",
                        group.position,
                        group.count_after,
                        group.count_before
                    );
                }
                group
            })
            .collect();

        FocusGroups::from(groups)
    }
}
