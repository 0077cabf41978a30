//! Locating the guide frames of an observing night
//!
//! Guide frames are stored as `<root>/<mjd>/gimg-gfa<N>s-<seqno>.fits`.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Default root of the guide camera archive
pub const DEFAULT_GCAM_ROOT: &str = "/data/gcam";

#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("invalid glob pattern: {0}")]
    Pattern(#[from] glob::PatternError),
    #[error("error reading directory entry: {0}")]
    Glob(#[from] glob::GlobError),
}

/// List the guide frames of one night, sorted by path.
pub fn discover_exposures(root: &Path, mjd: u32) -> Result<Vec<PathBuf>, DiscoveryError> {
    let pattern = root.join(mjd.to_string()).join("gimg-gfa[1-6]s-[0-9]*.fits");
    let mut paths = glob::glob(&pattern.to_string_lossy())?.collect::<Result<Vec<_>, _>>()?;
    paths.sort();

    log::debug!("found {} exposures under {}", paths.len(), pattern.display());
    Ok(paths)
}
