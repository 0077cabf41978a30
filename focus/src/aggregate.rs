//! Parallel catalog aggregation
//!
//! Runs extraction for every exposure of a focus sweep on a fixed-size rayon
//! pool and concatenates the per-exposure catalogs. A failing exposure
//! (unparseable name, unreadable file, detector error or panic) is logged,
//! recorded and skipped; only a sweep with no detections at all is an error.

use std::panic::{catch_unwind, AssertUnwindSafe};

use rayon::prelude::*;
use thiserror::Error;

use crate::catalog::Catalog;
use crate::exposure::{ExposureId, ExposureLoader, SeqnoRange};
use crate::extraction::{ExtractionError, ExtractionFailure, SourceExtractor};

#[derive(Error, Debug)]
pub enum AggregateError {
    #[error("no detections in any of {attempted} exposures ({failed} failed)")]
    EmptyCatalog { attempted: usize, failed: usize },
    #[error("failed to build extraction worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Combined catalog of a sweep plus the exposures that had to be skipped
#[derive(Debug, Clone)]
pub struct Aggregation {
    pub catalog: Catalog,
    pub failures: Vec<ExtractionFailure>,
    /// Exposures dispatched for extraction (after sequence number filtering)
    pub attempted: usize,
    /// Exposures that extracted cleanly but had no detections
    pub empty: usize,
}

/// Collects detections from many exposures in parallel.
pub struct CatalogAggregator<'a> {
    extractor: SourceExtractor<'a>,
    loader: &'a dyn ExposureLoader,
    range: Option<SeqnoRange>,
}

impl<'a> CatalogAggregator<'a> {
    pub fn new(extractor: SourceExtractor<'a>, loader: &'a dyn ExposureLoader) -> Self {
        Self {
            extractor,
            loader,
            range: None,
        }
    }

    /// Restrict aggregation to exposures whose sequence number is in `range`
    pub fn with_range(mut self, range: Option<SeqnoRange>) -> Self {
        self.range = range;
        self
    }

    /// Keep identifiers inside the sequence number range.
    ///
    /// Identifiers that do not parse are kept so that extraction records them
    /// as failures instead of dropping them silently.
    fn select<'b, S: AsRef<str>>(&self, identifiers: &'b [S]) -> Vec<&'b str> {
        identifiers
            .iter()
            .map(AsRef::as_ref)
            .filter(|identifier| match (&self.range, ExposureId::parse(identifier)) {
                (Some(range), Ok(id)) => range.contains(id.seq_no()),
                _ => true,
            })
            .collect()
    }

    /// Extract every exposure on a pool of `worker_count` threads.
    ///
    /// # Arguments
    /// * `identifiers` - Exposure identifiers, usually file paths
    /// * `worker_count` - Number of extraction threads (at least one is used)
    ///
    /// # Returns
    /// The concatenated catalog and per-exposure failures, or
    /// [`AggregateError::EmptyCatalog`] when no exposure produced a detection.
    pub fn aggregate<S: AsRef<str>>(
        &self,
        identifiers: &[S],
        worker_count: usize,
    ) -> Result<Aggregation, AggregateError> {
        let selected = self.select(identifiers);
        let attempted = selected.len();
        log::info!(
            "extracting {} of {} exposures on {} workers",
            attempted,
            identifiers.len(),
            worker_count.max(1)
        );

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(worker_count.max(1))
            .build()?;

        let results: Vec<(&str, Result<Catalog, ExtractionError>)> = pool.install(|| {
            selected
                .par_iter()
                .map(|&identifier| (identifier, self.extract_guarded(identifier)))
                .collect()
        });

        let mut catalog = Catalog::new();
        let mut failures = Vec::new();
        let mut empty = 0;
        for (identifier, result) in results {
            match result {
                Ok(part) if part.is_empty() => {
                    log::debug!("{identifier}: no detections");
                    empty += 1;
                }
                Ok(part) => catalog.append(part),
                Err(e) => {
                    log::warn!("skipping {identifier}: {e}");
                    failures.push(ExtractionFailure::new(identifier, &e));
                }
            }
        }

        if catalog.is_empty() {
            return Err(AggregateError::EmptyCatalog {
                attempted,
                failed: failures.len(),
            });
        }

        log::info!(
            "aggregated {} detections from {} exposures ({} empty, {} failed)",
            catalog.len(),
            attempted - empty - failures.len(),
            empty,
            failures.len()
        );

        Ok(Aggregation {
            catalog,
            failures,
            attempted,
            empty,
        })
    }

    /// Extract one exposure, converting a panic into an error
    fn extract_guarded(&self, identifier: &str) -> Result<Catalog, ExtractionError> {
        catch_unwind(AssertUnwindSafe(|| {
            self.extractor.extract_from(identifier, self.loader)
        }))
        .unwrap_or_else(|payload| {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(ExtractionError::Panicked(message))
        })
    }
}
