//! Decode radiometric calibration parameters from the FFF
//! camera-info record.
//!
//! Fields are described by a [`CalibrationLayout`]: a table of
//! `(field, offset, encoding, conversion)` entries. The
//! default [`FFF_CAMERA_INFO`] table matches the record
//! written by current FLIR firmware (see ExifTool's
//! `FLIR::CameraInfo`); other firmware can be supported by
//! passing a different table to
//! [`load_with_layout`][crate::load_with_layout].
use byteordered::Endianness;
use serde_derive::*;
use tracing::debug;

use crate::error::{Error, Result};
use crate::parse::{fixed_str, marker_endianness, parse_at};

const KELVIN_OFFSET: f64 = 273.15;

/// A calibration value decoded by a [`CalibrationLayout`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Field {
    Emissivity,
    ObjectDistance,
    ReflectedApparentTemperature,
    AtmosphericTemperature,
    IrWindowTemperature,
    IrWindowTransmission,
    RelativeHumidity,
    PlanckR1,
    PlanckB,
    PlanckF,
    PlanckO,
    PlanckR2,
    AtmosphericTransAlpha1,
    AtmosphericTransAlpha2,
    AtmosphericTransBeta1,
    AtmosphericTransBeta2,
    AtmosphericTransX,
    RawValueRangeMin,
    RawValueRangeMax,
}

impl Field {
    const COUNT: usize = Field::RawValueRangeMax as usize + 1;

    fn index(self) -> usize {
        self as usize
    }
}

/// Storage format of a field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Encoding {
    F32,
    I32,
    U16,
}

impl Encoding {
    pub fn width(self) -> usize {
        match self {
            Encoding::F32 | Encoding::I32 => 4,
            Encoding::U16 => 2,
        }
    }

    fn read(self, record: &[u8], offset: usize, endian: Endianness) -> anyhow::Result<f64> {
        Ok(match self {
            Encoding::F32 => parse_at::<f32>(record, offset, endian)? as f64,
            Encoding::I32 => parse_at::<i32>(record, offset, endian)? as f64,
            Encoding::U16 => parse_at::<u16>(record, offset, endian)? as f64,
        })
    }
}

/// Conversion from the stored value to the physical value.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Conversion {
    /// `value * scale + offset`
    Linear { scale: f64, offset: f64 },
    /// Relative humidity as a fraction; stored values above 2
    /// are percentages.
    Humidity,
}

impl Conversion {
    pub const IDENTITY: Conversion = Conversion::Linear {
        scale: 1.,
        offset: 0.,
    };
    pub const KELVIN_TO_CELSIUS: Conversion = Conversion::Linear {
        scale: 1.,
        offset: -KELVIN_OFFSET,
    };

    pub fn apply(self, val: f64) -> f64 {
        match self {
            Conversion::Linear { scale, offset } => val * scale + offset,
            Conversion::Humidity if val > 2. => val / 100.,
            Conversion::Humidity => val,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FieldSpec {
    pub field: Field,
    pub offset: usize,
    pub encoding: Encoding,
    pub conversion: Conversion,
}

const fn spec(
    field: Field,
    offset: usize,
    encoding: Encoding,
    conversion: Conversion,
) -> FieldSpec {
    FieldSpec {
        field,
        offset,
        encoding,
        conversion,
    }
}

/// Declarative layout of the calibration fields in a
/// camera-info record.
#[derive(Clone, Copy, Debug)]
pub struct CalibrationLayout {
    pub name: &'static str,
    pub fields: &'static [FieldSpec],
}

/// Layout of the FFF `CameraInfo` record (type 0x20).
pub const FFF_CAMERA_INFO: CalibrationLayout = {
    use Conversion as C;
    use Encoding::*;
    use Field::*;
    CalibrationLayout {
        name: "FFF CameraInfo",
        fields: &[
            spec(Emissivity, 0x20, F32, C::IDENTITY),
            spec(ObjectDistance, 0x24, F32, C::IDENTITY),
            spec(ReflectedApparentTemperature, 0x28, F32, C::KELVIN_TO_CELSIUS),
            spec(AtmosphericTemperature, 0x2c, F32, C::KELVIN_TO_CELSIUS),
            spec(IrWindowTemperature, 0x30, F32, C::KELVIN_TO_CELSIUS),
            spec(IrWindowTransmission, 0x34, F32, C::IDENTITY),
            spec(RelativeHumidity, 0x3c, F32, C::Humidity),
            spec(PlanckR1, 0x58, F32, C::IDENTITY),
            spec(PlanckB, 0x5c, F32, C::IDENTITY),
            spec(PlanckF, 0x60, F32, C::IDENTITY),
            spec(AtmosphericTransAlpha1, 0x70, F32, C::IDENTITY),
            spec(AtmosphericTransAlpha2, 0x74, F32, C::IDENTITY),
            spec(AtmosphericTransBeta1, 0x78, F32, C::IDENTITY),
            spec(AtmosphericTransBeta2, 0x7c, F32, C::IDENTITY),
            spec(AtmosphericTransX, 0x80, F32, C::IDENTITY),
            spec(PlanckO, 0x308, I32, C::IDENTITY),
            spec(PlanckR2, 0x30c, F32, C::IDENTITY),
            spec(RawValueRangeMin, 0x310, U16, C::IDENTITY),
            spec(RawValueRangeMax, 0x312, U16, C::IDENTITY),
        ],
    }
};

/// Parameters to compute radiance and temperature from raw
/// sensor values.
///
/// Temperatures are in degrees Celsius, distance in meters,
/// relative humidity as a fraction in `[0, 1]`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalibrationParameters {
    pub planck_r1: f64,
    pub planck_r2: f64,
    pub planck_b: f64,
    pub planck_f: f64,
    pub planck_o: f64,

    pub emissivity: f64,
    pub object_distance: f64,
    pub reflected_apparent_temperature: f64,
    pub atmospheric_temperature: f64,
    pub relative_humidity: f64,
    pub ir_window_temperature: f64,
    pub ir_window_transmission: f64,

    pub atmospheric_trans_alpha1: f64,
    pub atmospheric_trans_alpha2: f64,
    pub atmospheric_trans_beta1: f64,
    pub atmospheric_trans_beta2: f64,
    pub atmospheric_trans_x: f64,

    pub raw_value_range_min: f64,
    pub raw_value_range_max: f64,
}

impl CalibrationParameters {
    /// Decode from a camera-info record.
    ///
    /// Every field of the layout must lie inside `record` and
    /// decode to a finite value. Decoding is all or nothing.
    pub fn decode(record: &[u8], layout: &CalibrationLayout) -> Result<Self> {
        let endian = marker_endianness(record).map_err(Error::metadata)?;

        let mut values = [None; Field::COUNT];
        for spec in layout.fields {
            let end = spec.offset.checked_add(spec.encoding.width());
            if end.map_or(true, |end| end > record.len()) {
                return Err(Error::CorruptMetadata(format!(
                    "field `{:?}` at {:#x} lies outside {} record of {} bytes",
                    spec.field,
                    spec.offset,
                    layout.name,
                    record.len()
                )));
            }

            let val = spec
                .encoding
                .read(record, spec.offset, endian)
                .map_err(|e| Error::metadata(e.context(format!("field `{:?}`", spec.field))))?;
            let val = spec.conversion.apply(val);
            if !val.is_finite() {
                return Err(Error::CorruptMetadata(format!(
                    "field `{:?}` is not finite: {}",
                    spec.field, val
                )));
            }
            values[spec.field.index()] = Some(val);
        }

        let get = |field: Field| {
            values[field.index()].ok_or_else(|| {
                Error::CorruptMetadata(format!(
                    "{} layout does not define `{:?}`",
                    layout.name, field
                ))
            })
        };

        let params = CalibrationParameters {
            planck_r1: get(Field::PlanckR1)?,
            planck_r2: get(Field::PlanckR2)?,
            planck_b: get(Field::PlanckB)?,
            planck_f: get(Field::PlanckF)?,
            planck_o: get(Field::PlanckO)?,
            emissivity: get(Field::Emissivity)?,
            object_distance: get(Field::ObjectDistance)?,
            reflected_apparent_temperature: get(Field::ReflectedApparentTemperature)?,
            atmospheric_temperature: get(Field::AtmosphericTemperature)?,
            relative_humidity: get(Field::RelativeHumidity)?,
            ir_window_temperature: get(Field::IrWindowTemperature)?,
            ir_window_transmission: get(Field::IrWindowTransmission)?,
            atmospheric_trans_alpha1: get(Field::AtmosphericTransAlpha1)?,
            atmospheric_trans_alpha2: get(Field::AtmosphericTransAlpha2)?,
            atmospheric_trans_beta1: get(Field::AtmosphericTransBeta1)?,
            atmospheric_trans_beta2: get(Field::AtmosphericTransBeta2)?,
            atmospheric_trans_x: get(Field::AtmosphericTransX)?,
            raw_value_range_min: get(Field::RawValueRangeMin)?,
            raw_value_range_max: get(Field::RawValueRangeMax)?,
        };
        debug!(layout = layout.name, ?params, "decoded calibration");
        Ok(params)
    }

    /// Same parameters with a different object distance.
    pub fn with_object_distance(&self, distance: f64) -> Self {
        CalibrationParameters {
            object_distance: distance,
            ..self.clone()
        }
    }
}

declare_parseable_structs! {
    struct CameraIdent {
        model => [u8; 32],
        part_number => [u8; 16],
        serial_number => [u8; 16],
        software => [u8; 16],
    }

    struct LensIdent {
        model => [u8; 32],
        part_number => [u8; 16],
        serial_number => [u8; 16],
    }
}

/// Camera identification strings from the camera-info
/// record. Missing when the record is too short.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CameraInfo {
    pub model: Option<String>,
    pub part_number: Option<String>,
    pub serial_number: Option<String>,
    pub software: Option<String>,
    pub lens_model: Option<String>,
}

impl CameraInfo {
    pub fn decode(record: &[u8]) -> Self {
        let endian = match marker_endianness(record) {
            Ok(endian) => endian,
            Err(_) => return CameraInfo::default(),
        };
        let non_empty = |bytes: &[u8]| Some(fixed_str(bytes)).filter(|s| !s.is_empty());

        let mut info = CameraInfo::default();
        if let Ok(camera) = parse_at::<CameraIdent>(record, 0xd4, endian) {
            info.model = non_empty(&camera.model);
            info.part_number = non_empty(&camera.part_number);
            info.serial_number = non_empty(&camera.serial_number);
            info.software = non_empty(&camera.software);
        }
        if let Ok(lens) = parse_at::<LensIdent>(record, 0x170, endian) {
            info.lens_model = non_empty(&lens.model);
        }
        info
    }
}
