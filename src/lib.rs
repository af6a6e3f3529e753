//! Library to extract radiometric data from FLIR R-JPEGs.
//!
//! An R-JPEG is a regular JPEG carrying FLIR "FFF" metadata
//! in its APP1 segments: a raw 16-bit thermal image, the
//! camera's radiometric calibration and, optionally, an
//! embedded visible-light image. This crate:
//!
//! 1. [Locates](scan) the FFF records in the container.
//!
//! 2. [Decodes](calibration) the Planck constants and the
//! atmospheric / emissivity parameters using a declarative
//! field table.
//!
//! 3. [Extracts](extract) the raw sensor counts and the
//! visible image.
//!
//! 4. [Converts](radiance) raw counts to radiance, either
//! with the manufacturer calibration (a port of the
//! [Thermimage R library]) or with an externally supplied
//! per-pixel gain/bias.
//!
//! # Usage
//!
//! ```rust
//! # fn test_compile() -> anyhow::Result<()> {
//! let bytes = std::fs::read("image.jpg")?;
//! let file = rjpeg::load(&bytes)?;
//!
//! let (height, width) = file.dim();
//! let radiance = file.radiance(None)?;
//! assert_eq!(radiance.dim(), (height, width));
//! # Ok(())
//! # }
//! ```
//!
//! A per-pixel linear calibration replaces the built-in
//! formula:
//!
//! ```rust
//! # fn test_compile(file: &rjpeg::LoadedFile) -> anyhow::Result<()> {
//! use ndarray::Array2;
//! use rjpeg::GainBiasOverride;
//!
//! let gain = Array2::from_elem(file.dim(), 0.01);
//! let bias = Array2::zeros(file.dim());
//! let radiance = file.radiance(Some(&GainBiasOverride::new(gain, bias)))?;
//! # Ok(())
//! # }
//! ```
//!
//! The crate can also read the JSON output of `exiftool -j
//! -b`; see [`exiftool`].
//!
//! [Thermimage R library]: //github.com/gtatters/Thermimage/blob/master/R/raw2temp.R

#[macro_use]
mod parse;

pub mod calibration;
pub mod error;
pub mod exiftool;
pub mod extract;
pub mod file;
pub mod radiance;
pub mod scan;

#[cfg(feature = "cli")]
pub mod cli;
#[cfg(feature = "cli")]
pub mod logger;

pub use crate::calibration::{CalibrationLayout, CalibrationParameters, CameraInfo, FFF_CAMERA_INFO};
pub use crate::error::{Error, ErrorKind, Result};
pub use crate::exiftool::ExiftoolJson;
pub use crate::extract::{RawCountImage, VisibleImage};
pub use crate::file::LoadedFile;
pub use crate::radiance::{GainBiasOverride, RadianceImage};

/// Load a FLIR R-JPEG from its complete byte buffer.
pub fn load(bytes: &[u8]) -> Result<LoadedFile> {
    LoadedFile::from_bytes(bytes, &FFF_CAMERA_INFO)
}

/// Load with a calibration layout for other firmware.
pub fn load_with_layout(bytes: &[u8], layout: &CalibrationLayout) -> Result<LoadedFile> {
    LoadedFile::from_bytes(bytes, layout)
}
