//! Guide-camera exposure identifiers and loading
//!
//! Guide frames are named `gimg-gfa<N>s-<seqno>.fits`, where `N` (1–6) is the
//! guide camera and `seqno` the frame sequence number shared by all cameras
//! exposed together. An [`ExposureLoader`] turns an identifier into pixel data
//! plus the few header keywords the focus analysis needs.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use ndarray::Array2;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

static EXPOSURE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"gimg-gfa([1-6])s-([0-9]+)\.fits").expect("exposure name pattern is valid")
});

/// Failure to recognise an exposure identifier
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("'{0}' does not match gimg-gfa[1-6]s-<seqno>.fits")]
    NoMatch(String),
    #[error("sequence number in '{0}' is out of range")]
    SeqnoOverflow(String),
}

/// A guide-camera exposure, identified by its file name or path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExposureId {
    identifier: String,
    camera_number: u8,
    seq_no: u32,
}

impl ExposureId {
    /// Parse an identifier. The naming pattern may appear anywhere in it, so
    /// full paths are accepted.
    pub fn parse(identifier: &str) -> Result<Self, ParseError> {
        let captures = EXPOSURE_PATTERN
            .captures(identifier)
            .ok_or_else(|| ParseError::NoMatch(identifier.to_string()))?;

        let camera_number = captures[1]
            .parse()
            .map_err(|_| ParseError::NoMatch(identifier.to_string()))?;
        let seq_no = captures[2]
            .parse()
            .map_err(|_| ParseError::SeqnoOverflow(identifier.to_string()))?;

        Ok(Self {
            identifier: identifier.to_string(),
            camera_number,
            seq_no,
        })
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn path(&self) -> &Path {
        Path::new(&self.identifier)
    }

    /// Frame sequence number
    pub fn seq_no(&self) -> u32 {
        self.seq_no
    }

    /// Guide camera number (1–6) from the file name
    pub fn camera_number(&self) -> u8 {
        self.camera_number
    }
}

impl FromStr for ExposureId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ExposureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.identifier)
    }
}

/// Closed range of sequence numbers `[min, max]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeqnoRange {
    pub min: u32,
    pub max: u32,
}

impl SeqnoRange {
    pub fn new(min: u32, max: u32) -> Self {
        Self { min, max }
    }

    /// Range from optional bounds; a range only exists when both are given.
    pub fn from_bounds(min: Option<u32>, max: Option<u32>) -> Option<Self> {
        match (min, max) {
            (Some(min), Some(max)) => Some(Self { min, max }),
            _ => None,
        }
    }

    pub fn contains(&self, seq_no: u32) -> bool {
        (self.min..=self.max).contains(&seq_no)
    }
}

/// Header keywords used by the focus analysis
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExposureHeader {
    /// `CAMNAME`
    pub camera: Option<String>,
    /// `M2PISTON`, secondary mirror piston in microns
    pub m2_piston: Option<f64>,
    /// `SJD`, the observing night
    pub sjd: Option<u32>,
}

/// Pixel data and header of one exposure
#[derive(Debug, Clone, PartialEq)]
pub struct Exposure {
    pub data: Array2<f64>,
    pub header: ExposureHeader,
}

impl Exposure {
    pub fn new(data: Array2<f64>, header: ExposureHeader) -> Self {
        Self { data, header }
    }
}

/// Failure to load an exposure
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LoadError {
    #[error("exposure {0} not found")]
    NotFound(String),
    #[error("failed to read {identifier}: {reason}")]
    Read { identifier: String, reason: String },
    #[error("{identifier} does not hold a 2D image (shape {shape:?})")]
    NotAnImage {
        identifier: String,
        shape: Vec<usize>,
    },
}

/// Source of exposure data, shared across extraction workers.
pub trait ExposureLoader: Send + Sync {
    fn load(&self, id: &ExposureId) -> Result<Exposure, LoadError>;
}

/// Loader serving exposures held in memory, keyed by identifier.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLoader {
    exposures: HashMap<String, Exposure>,
}

impl InMemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, identifier: impl Into<String>, exposure: Exposure) {
        self.exposures.insert(identifier.into(), exposure);
    }

    pub fn len(&self) -> usize {
        self.exposures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exposures.is_empty()
    }
}

impl ExposureLoader for InMemoryLoader {
    fn load(&self, id: &ExposureId) -> Result<Exposure, LoadError> {
        self.exposures
            .get(id.identifier())
            .cloned()
            .ok_or_else(|| LoadError::NotFound(id.identifier().to_string()))
    }
}
