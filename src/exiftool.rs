//! Load thermal data from [ExifTool] JSON output.
//!
//! `exiftool -j -b image.jpg` emits FLIR parameters with
//! units (`"22.0 C"`, `"50.0 %"`) and the embedded images as
//! `base64:` strings; `exiftool -j -n -b` emits plain
//! numbers. Both are accepted.
//!
//! ```rust
//! # fn test_compile() -> anyhow::Result<()> {
//! use std::{fs::File, io::BufReader};
//! use rjpeg::{ExiftoolJson, LoadedFile};
//!
//! let mut json: Vec<ExiftoolJson> = serde_json::from_reader(
//!     BufReader::new(File::open("metadata.json")?)
//! )?;
//! let file = LoadedFile::from_exiftool(json.remove(0))?;
//! # Ok(())
//! # }
//! ```
//!
//! [ExifTool]: //exiftool.org
use std::convert::TryFrom;

use serde_derive::*;

use crate::calibration::{CalibrationParameters, CameraInfo, Conversion};
use crate::error::{Error, Result};
use crate::extract::{raw_counts_from_codec, visible_from_bytes, RawCountImage, RawEncoding};
use crate::file::LoadedFile;

/// Calibration keys as named by ExifTool.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "PascalCase")]
pub struct ExiftoolCalibration {
    #[serde(deserialize_with = "serde_helpers::number")]
    planck_r1: f64,
    #[serde(deserialize_with = "serde_helpers::number")]
    planck_r2: f64,
    #[serde(deserialize_with = "serde_helpers::number")]
    planck_b: f64,
    #[serde(deserialize_with = "serde_helpers::number")]
    planck_f: f64,
    #[serde(deserialize_with = "serde_helpers::number")]
    planck_o: f64,

    #[serde(deserialize_with = "serde_helpers::number")]
    emissivity: f64,
    #[serde(deserialize_with = "serde_helpers::number")]
    object_distance: f64,
    #[serde(deserialize_with = "serde_helpers::number")]
    reflected_apparent_temperature: f64,
    #[serde(deserialize_with = "serde_helpers::number")]
    atmospheric_temperature: f64,
    #[serde(deserialize_with = "serde_helpers::humidity")]
    relative_humidity: f64,
    #[serde(
        rename = "IRWindowTemperature",
        deserialize_with = "serde_helpers::number"
    )]
    ir_window_temperature: f64,
    #[serde(
        rename = "IRWindowTransmission",
        deserialize_with = "serde_helpers::number"
    )]
    ir_window_transmission: f64,

    #[serde(
        rename = "AtmosphericTransAlpha1",
        deserialize_with = "serde_helpers::number"
    )]
    atmospheric_trans_alpha1: f64,
    #[serde(
        rename = "AtmosphericTransAlpha2",
        deserialize_with = "serde_helpers::number"
    )]
    atmospheric_trans_alpha2: f64,
    #[serde(
        rename = "AtmosphericTransBeta1",
        deserialize_with = "serde_helpers::number"
    )]
    atmospheric_trans_beta1: f64,
    #[serde(
        rename = "AtmosphericTransBeta2",
        deserialize_with = "serde_helpers::number"
    )]
    atmospheric_trans_beta2: f64,
    #[serde(
        rename = "AtmosphericTransX",
        deserialize_with = "serde_helpers::number"
    )]
    atmospheric_trans_x: f64,

    #[serde(default, deserialize_with = "serde_helpers::optional_number")]
    raw_value_range_min: Option<f64>,
    #[serde(default, deserialize_with = "serde_helpers::optional_number")]
    raw_value_range_max: Option<f64>,
}

impl TryFrom<ExiftoolCalibration> for CalibrationParameters {
    type Error = Error;

    fn try_from(e: ExiftoolCalibration) -> Result<Self> {
        let params = CalibrationParameters {
            planck_r1: e.planck_r1,
            planck_r2: e.planck_r2,
            planck_b: e.planck_b,
            planck_f: e.planck_f,
            planck_o: e.planck_o,
            emissivity: e.emissivity,
            object_distance: e.object_distance,
            reflected_apparent_temperature: e.reflected_apparent_temperature,
            atmospheric_temperature: e.atmospheric_temperature,
            relative_humidity: e.relative_humidity,
            ir_window_temperature: e.ir_window_temperature,
            ir_window_transmission: e.ir_window_transmission,
            atmospheric_trans_alpha1: e.atmospheric_trans_alpha1,
            atmospheric_trans_alpha2: e.atmospheric_trans_alpha2,
            atmospheric_trans_beta1: e.atmospheric_trans_beta1,
            atmospheric_trans_beta2: e.atmospheric_trans_beta2,
            atmospheric_trans_x: e.atmospheric_trans_x,
            raw_value_range_min: e.raw_value_range_min.unwrap_or(0.),
            raw_value_range_max: e.raw_value_range_max.unwrap_or(u16::MAX as f64),
        };
        let values = [
            params.planck_r1,
            params.planck_r2,
            params.planck_b,
            params.planck_f,
            params.planck_o,
            params.emissivity,
            params.object_distance,
            params.reflected_apparent_temperature,
            params.atmospheric_temperature,
            params.relative_humidity,
            params.ir_window_temperature,
            params.ir_window_transmission,
            params.atmospheric_trans_alpha1,
            params.atmospheric_trans_alpha2,
            params.atmospheric_trans_beta1,
            params.atmospheric_trans_beta2,
            params.atmospheric_trans_x,
        ];
        if values.iter().any(|v| !v.is_finite()) {
            return Err(Error::CorruptMetadata(
                "non-finite calibration value in ExifTool JSON".into(),
            ));
        }
        Ok(params)
    }
}

/// One object of ExifTool's JSON array.
#[derive(Serialize, Deserialize, Debug)]
pub struct ExiftoolJson {
    #[serde(flatten)]
    pub calibration: ExiftoolCalibration,

    #[serde(rename = "Model", default)]
    pub model: Option<String>,

    #[serde(rename = "RawThermalImageType", default)]
    pub raw_type: Option<String>,

    #[serde(
        rename = "RawThermalImage",
        default,
        deserialize_with = "serde_helpers::base64_bytes"
    )]
    pub raw_bytes: Option<Vec<u8>>,

    #[serde(
        rename = "EmbeddedImage",
        default,
        deserialize_with = "serde_helpers::base64_bytes"
    )]
    pub embedded_bytes: Option<Vec<u8>>,
}

impl ExiftoolJson {
    pub fn raw_counts(&self) -> Result<RawCountImage> {
        let bytes = self
            .raw_bytes
            .as_deref()
            .ok_or(Error::MissingThermalData)?;
        let encoding = match self.raw_type.as_deref() {
            Some("PNG") => RawEncoding::Png,
            Some("TIFF") => RawEncoding::Tiff,
            Some("JPG") | Some("JPEG") => RawEncoding::Jpeg,
            other => {
                return Err(Error::corrupt_image(format!(
                    "unsupported raw thermal image type: {:?}",
                    other
                )))
            }
        };
        raw_counts_from_codec(bytes, encoding)
    }
}

impl LoadedFile {
    pub fn from_exiftool(json: ExiftoolJson) -> Result<Self> {
        let raw_counts = json.raw_counts()?;
        let visible = json.embedded_bytes.as_deref().and_then(|bytes| {
            visible_from_bytes(bytes)
                .map_err(|e| tracing::warn!("ignoring embedded visible image: {}", e))
                .ok()
        });
        let camera = CameraInfo {
            model: json.model,
            ..CameraInfo::default()
        };
        let calibration = CalibrationParameters::try_from(json.calibration)?;
        Ok(LoadedFile::from_parts(calibration, camera, raw_counts, visible))
    }
}

impl TryFrom<ExiftoolJson> for LoadedFile {
    type Error = Error;

    fn try_from(json: ExiftoolJson) -> Result<Self> {
        LoadedFile::from_exiftool(json)
    }
}

mod serde_helpers {
    use lazy_static::lazy_static;
    use regex::Regex;
    use serde::*;
    use serde_derive::Deserialize;

    use super::Conversion;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Value {
        Number(f64),
        Text(String),
    }

    /// Leading number of a value and whether it is a
    /// percentage.
    fn leading_float<'de, D>(de: D) -> Result<(f64, bool), D::Error>
    where
        D: Deserializer<'de>,
    {
        lazy_static! {
            static ref RE: Regex =
                Regex::new(r"^\s*([-+]?\d*\.?\d+(?:[eE][-+]?\d+)?)\s*(%?)").unwrap();
        }

        use serde::de::Error;
        match Value::deserialize(de)? {
            Value::Number(val) => Ok((val, false)),
            Value::Text(text) => {
                let caps = RE
                    .captures(&text)
                    .ok_or_else(|| Error::custom("unexpected format: must begin with float"))?;
                let val = caps[1].parse().map_err(Error::custom)?;
                Ok((val, !caps[2].is_empty()))
            }
        }
    }

    pub fn number<'de, D>(de: D) -> Result<f64, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(leading_float(de)?.0)
    }

    pub fn optional_number<'de, D>(de: D) -> Result<Option<f64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        number(de).map(Some)
    }

    pub fn humidity<'de, D>(de: D) -> Result<f64, D::Error>
    where
        D: Deserializer<'de>,
    {
        let (val, percent) = leading_float(de)?;
        Ok(if percent {
            val / 100.
        } else {
            Conversion::Humidity.apply(val)
        })
    }

    pub fn base64_bytes<'de, D>(de: D) -> Result<Option<Vec<u8>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        use serde::de::Error;
        let str_rep = <String as Deserialize>::deserialize(de)?;
        let slice = str_rep
            .strip_prefix("base64:")
            .ok_or_else(|| Error::custom("unexpected format: must begin with `base64:`"))?;

        let bytes = base64::decode(slice).map_err(Error::custom)?;
        Ok(Some(bytes))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use image::{DynamicImage, ImageBuffer, ImageOutputFormat, Luma};
    use serde_json::json;

    use super::*;

    fn png_counts(values: &[u16], width: u32, height: u32) -> Vec<u8> {
        let stored = values.iter().map(|v| v.swap_bytes()).collect();
        let img: ImageBuffer<Luma<u16>, Vec<u16>> =
            ImageBuffer::from_raw(width, height, stored).expect("buffer");
        let mut png = Cursor::new(Vec::new());
        DynamicImage::ImageLuma16(img)
            .write_to(&mut png, ImageOutputFormat::Png)
            .expect("encode png");
        png.into_inner()
    }

    fn json_with(calibration: serde_json::Value, raw: &[u8]) -> serde_json::Value {
        let mut obj = calibration;
        obj["SourceFile"] = json!("IR_0001.jpg");
        obj["Model"] = json!("FLIR E8");
        obj["RawThermalImageType"] = json!("PNG");
        obj["RawThermalImage"] = json!(format!("base64:{}", base64::encode(raw)));
        obj
    }

    fn printed() -> serde_json::Value {
        json!({
            "PlanckR1": 17096.654,
            "PlanckR2": 0.046,
            "PlanckB": 1428,
            "PlanckF": 1,
            "PlanckO": -7340,
            "Emissivity": 0.95,
            "ObjectDistance": "1.00 m",
            "ReflectedApparentTemperature": "20.0 C",
            "AtmosphericTemperature": "22.0 C",
            "RelativeHumidity": "50.0 %",
            "IRWindowTemperature": "20.0 C",
            "IRWindowTransmission": 1,
            "AtmosphericTransAlpha1": 0.006569,
            "AtmosphericTransAlpha2": 0.01262,
            "AtmosphericTransBeta1": -0.002276,
            "AtmosphericTransBeta2": -0.00667,
            "AtmosphericTransX": 1.9,
        })
    }

    #[test]
    fn printed_values() -> anyhow::Result<()> {
        let raw = png_counts(&[12000, 13000, 14000, 15000, 16000, 17000], 3, 2);
        let json: ExiftoolJson = serde_json::from_value(json_with(printed(), &raw))?;
        let file = LoadedFile::from_exiftool(json)?;

        let params = file.calibration();
        assert_eq!(params.atmospheric_temperature, 22.);
        assert_eq!(params.relative_humidity, 0.5);
        assert_eq!(params.object_distance, 1.);
        assert_eq!(file.dim(), (2, 3));
        assert_eq!(file.raw_counts()[(1, 2)], 17000);
        assert_eq!(file.camera().model.as_deref(), Some("FLIR E8"));
        assert!(file.visible().is_none());
        assert_eq!(file.radiance(None)?.dim(), (2, 3));
        Ok(())
    }

    #[test]
    fn numeric_values() -> anyhow::Result<()> {
        let mut cal = printed();
        cal["ObjectDistance"] = json!(2.5);
        cal["RelativeHumidity"] = json!(0.4);
        cal["AtmosphericTemperature"] = json!(-5.5);
        let json: ExiftoolJson =
            serde_json::from_value(json_with(cal, &png_counts(&[1, 2], 2, 1)))?;
        let params = CalibrationParameters::try_from(json.calibration)?;
        assert_eq!(params.object_distance, 2.5);
        assert_eq!(params.relative_humidity, 0.4);
        assert_eq!(params.atmospheric_temperature, -5.5);
        Ok(())
    }

    #[test]
    fn tiff_raw_image() -> anyhow::Result<()> {
        let values: Vec<u16> = vec![12000, 13000, 14000, 65535];
        let mut tiff = Cursor::new(Vec::new());
        tiff::encoder::TiffEncoder::new(&mut tiff)?
            .write_image::<tiff::encoder::colortype::Gray16>(2, 2, &values)?;

        let mut obj = json_with(printed(), tiff.get_ref());
        obj["RawThermalImageType"] = json!("TIFF");
        let file = LoadedFile::from_exiftool(serde_json::from_value(obj)?)?;
        assert_eq!(file.raw_counts().iter().copied().collect::<Vec<_>>(), values);
        Ok(())
    }

    #[test]
    fn missing_raw_image() -> anyhow::Result<()> {
        let json: ExiftoolJson = serde_json::from_value(printed())?;
        assert!(matches!(
            LoadedFile::from_exiftool(json),
            Err(Error::MissingThermalData)
        ));
        Ok(())
    }

    #[test]
    fn rejects_unprefixed_base64() {
        let mut obj = json_with(printed(), &[]);
        obj["RawThermalImage"] = json!("AAAA");
        assert!(serde_json::from_value::<ExiftoolJson>(obj).is_err());
    }
}
