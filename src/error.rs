//! Errors returned while loading R-JPEGs and computing
//! radiance.
use thiserror::Error;

/// Errors raised by this crate.
///
/// Structural errors (`NotRJpeg`, `MissingThermalData`,
/// `CorruptMetadata`, `CorruptImage`) abort a load.
/// `DimensionMismatch` and `NumericDomain` only abort the
/// radiance computation that raised them.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// The buffer is not a JPEG, or carries no FLIR FFF data.
    #[error("not a FLIR R-JPEG: {0}")]
    NotRJpeg(String),

    /// The FFF directory has no raw thermal record.
    #[error("missing raw thermal data")]
    MissingThermalData,

    /// FLIR segments, FFF directory or camera parameters are
    /// truncated or inconsistent.
    #[error("truncated or corrupt metadata: {0}")]
    CorruptMetadata(String),

    /// An embedded image could not be decoded.
    #[error("corrupt embedded image: {reason}")]
    CorruptImage {
        reason: String,
        #[source]
        source: Option<image::ImageError>,
    },

    /// Gain/bias grids do not match the raw count grid.
    #[error(
        "gain/bias dimensions do not match raw counts: raw: {raw:?}, gain: {gain:?}, bias: {bias:?}"
    )]
    DimensionMismatch {
        raw: (usize, usize),
        gain: (usize, usize),
        bias: (usize, usize),
    },

    /// The Planck inversion left its mathematical domain.
    #[error("numeric domain error: {0}")]
    NumericDomain(String),
}

/// Coarse classification of [`Error`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Unsupported input; report and move on.
    Format,
    Metadata,
    ImageData,
    CalibrationMismatch,
    NumericDomain,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotRJpeg(_) => ErrorKind::Format,
            Error::CorruptMetadata(_) => ErrorKind::Metadata,
            Error::MissingThermalData | Error::CorruptImage { .. } => ErrorKind::ImageData,
            Error::DimensionMismatch { .. } => ErrorKind::CalibrationMismatch,
            Error::NumericDomain(_) => ErrorKind::NumericDomain,
        }
    }

    pub(crate) fn corrupt_image<S: Into<String>>(reason: S) -> Self {
        Error::CorruptImage {
            reason: reason.into(),
            source: None,
        }
    }

    pub(crate) fn codec(reason: &str, source: image::ImageError) -> Self {
        Error::CorruptImage {
            reason: format!("{}: {}", reason, source),
            source: Some(source),
        }
    }

    /// Flatten an `anyhow` context chain from the binary
    /// parsers into a metadata error.
    pub(crate) fn metadata(err: anyhow::Error) -> Self {
        Error::CorruptMetadata(format!("{:#}", err))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
