//! FITS exposure loading
//!
//! Guide frames are tile-compressed, so the image and its header live in
//! extension HDU 1 rather than the primary HDU.

use std::path::Path;

use fitsio::hdu::{FitsHdu, HduInfo};
use fitsio::headers::ReadsKey;
use fitsio::FitsFile;
use ndarray::Array2;

use crate::exposure::{Exposure, ExposureHeader, ExposureId, ExposureLoader, LoadError};

/// HDU holding a compressed guide frame
pub const DEFAULT_IMAGE_HDU: usize = 1;

/// Loads exposures from FITS files named by their identifier.
#[derive(Debug, Clone)]
pub struct FitsExposureLoader {
    hdu: usize,
}

impl Default for FitsExposureLoader {
    fn default() -> Self {
        Self {
            hdu: DEFAULT_IMAGE_HDU,
        }
    }
}

impl FitsExposureLoader {
    pub fn new(hdu: usize) -> Self {
        Self { hdu }
    }

    fn read(&self, path: &Path) -> Result<Exposure, LoadError> {
        let identifier = path.display().to_string();
        let read_error = |e: fitsio::errors::Error| LoadError::Read {
            identifier: identifier.clone(),
            reason: e.to_string(),
        };

        let mut fptr = FitsFile::open(path).map_err(read_error)?;
        let hdu = fptr.hdu(self.hdu).map_err(read_error)?;

        let shape = match &hdu.info {
            HduInfo::ImageInfo { shape, .. } => shape.clone(),
            _ => {
                return Err(LoadError::NotAnImage {
                    identifier,
                    shape: Vec::new(),
                })
            }
        };
        if shape.len() != 2 {
            return Err(LoadError::NotAnImage { identifier, shape });
        }

        let pixels: Vec<f64> = hdu.read_image(&mut fptr).map_err(read_error)?;
        // fitsio reports shape slowest axis first, i.e. (rows, columns)
        let data = Array2::from_shape_vec((shape[0], shape[1]), pixels).map_err(|e| {
            LoadError::Read {
                identifier: identifier.clone(),
                reason: e.to_string(),
            }
        })?;

        let header = ExposureHeader {
            camera: read_key_optional(&hdu, &mut fptr, "CAMNAME"),
            m2_piston: read_key_optional(&hdu, &mut fptr, "M2PISTON"),
            sjd: read_key_optional::<i64>(&hdu, &mut fptr, "SJD")
                .and_then(|v| u32::try_from(v).ok()),
        };

        Ok(Exposure::new(data, header))
    }
}

fn read_key_optional<T: ReadsKey>(hdu: &FitsHdu, fptr: &mut FitsFile, key: &str) -> Option<T> {
    hdu.read_key(fptr, key).ok()
}

impl ExposureLoader for FitsExposureLoader {
    fn load(&self, id: &ExposureId) -> Result<Exposure, LoadError> {
        let path = id.path();
        if !path.exists() {
            return Err(LoadError::NotFound(id.identifier().to_string()));
        }
        self.read(path)
    }
}
