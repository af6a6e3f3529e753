use std::borrow::Cow;
use std::path::Path;

use ndarray::Array2;
use tracing::{debug, info_span};

use crate::calibration::{CalibrationLayout, CalibrationParameters, CameraInfo};
use crate::error::{Error, Result};
use crate::extract::{optional_visible, raw_counts_from_record, RawCountImage, VisibleImage};
use crate::radiance::{
    radiance_from_calibration, temperature_from_radiance, GainBiasOverride, RadianceImage,
};
use crate::scan::{FffBlock, RecordKind};

/// Everything extracted from one radiometric image.
///
/// All parts are immutable once loaded. Radiance from the
/// built-in calibration is computed at load time; radiance
/// for an override is computed on each request.
#[derive(Debug, Clone)]
pub struct LoadedFile {
    calibration: CalibrationParameters,
    camera: CameraInfo,
    raw_counts: RawCountImage,
    visible: Option<VisibleImage>,
    radiance: Option<RadianceImage>,
}

impl LoadedFile {
    /// Parse a complete R-JPEG buffer with the given
    /// calibration layout.
    pub fn from_bytes(bytes: &[u8], layout: &CalibrationLayout) -> Result<Self> {
        let _span = info_span!("load", len = bytes.len()).entered();

        let block = FffBlock::scan(bytes)?;
        let camera_record = block.first(RecordKind::CameraInfo).ok_or_else(|| {
            Error::CorruptMetadata("no camera parameters record found".into())
        })?;
        let calibration = CalibrationParameters::decode(camera_record, layout)?;
        let camera = CameraInfo::decode(camera_record);

        let raw = block
            .locate(RecordKind::RawData)
            .ok_or(Error::MissingThermalData)?;
        let raw_counts = raw_counts_from_record(block.record(raw), raw.sub_type)?;
        let visible = optional_visible(block.first(RecordKind::EmbeddedImage));

        Ok(Self::from_parts(calibration, camera, raw_counts, visible))
    }

    pub fn from_path<P: AsRef<Path>>(path: P, layout: &CalibrationLayout) -> anyhow::Result<Self> {
        let bytes = std::fs::read(path)?;
        Ok(Self::from_bytes(&bytes, layout)?)
    }

    pub(crate) fn from_parts(
        calibration: CalibrationParameters,
        camera: CameraInfo,
        raw_counts: RawCountImage,
        visible: Option<VisibleImage>,
    ) -> Self {
        let radiance = match radiance_from_calibration(&raw_counts, &calibration) {
            Ok(radiance) => Some(radiance),
            Err(e) => {
                debug!("built-in radiance unavailable: {}", e);
                None
            }
        };
        LoadedFile {
            calibration,
            camera,
            raw_counts,
            visible,
            radiance,
        }
    }

    pub fn calibration(&self) -> &CalibrationParameters {
        &self.calibration
    }

    pub fn camera(&self) -> &CameraInfo {
        &self.camera
    }

    pub fn raw_counts(&self) -> &RawCountImage {
        &self.raw_counts
    }

    pub fn visible(&self) -> Option<&VisibleImage> {
        self.visible.as_ref()
    }

    /// `(height, width)` of the thermal image.
    pub fn dim(&self) -> (usize, usize) {
        self.raw_counts.dim()
    }

    /// Radiance image.
    ///
    /// Without an override this borrows the radiance
    /// computed at load time. With an override, radiance is
    /// `gain * raw + bias` per pixel.
    pub fn radiance(&self, gain_bias: Option<&GainBiasOverride>) -> Result<Cow<'_, RadianceImage>> {
        match (gain_bias, &self.radiance) {
            (Some(gb), _) => gb.apply(&self.raw_counts).map(Cow::Owned),
            (None, Some(radiance)) => Ok(Cow::Borrowed(radiance)),
            // reproduces the load-time failure
            (None, None) => radiance_from_calibration(&self.raw_counts, &self.calibration)
                .map(Cow::Owned),
        }
    }

    /// Radiance using different calibration parameters, eg.
    /// with a measured object distance.
    pub fn radiance_with_calibration(
        &self,
        calibration: &CalibrationParameters,
    ) -> Result<RadianceImage> {
        radiance_from_calibration(&self.raw_counts, calibration)
    }

    /// Temperature in Celsius from the built-in radiance.
    pub fn temperature(&self) -> Result<Array2<f64>> {
        let radiance = self.radiance(None)?;
        temperature_from_radiance(&radiance, &self.calibration)
    }
}
