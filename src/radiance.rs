//! Convert raw sensor values to radiance and temperature.
//!
//! The built-in conversion is a port of the `raw2temp`
//! routine of the [Thermimage R library] (also used by
//! [read_thermal.py]). The sensed signal is modelled as the
//! object's own emission plus reflected, atmospheric and
//! IR-window emission, each attenuated by emissivity and
//! transmission. Removing those terms is linear in the raw
//! value, and yields the object's blackbody signal
//!
//! ```text
//! L = R1 / (R2 * (exp(B / T) - F))
//! ```
//!
//! which this crate reports as radiance, in the units fixed
//! by the camera's Planck constants. Temperature follows by
//! inverting the same relation.
//!
//! Alternatively a per-pixel linear calibration (see
//! [`GainBiasOverride`]) replaces the whole model.
//!
//! [read_thermal.py]: //github.com/Nervengift/read_thermal.py/blob/master/flir_image_extractor.py
//! [Thermimage R library]: //github.com/gtatters/Thermimage/blob/master/R/raw2temp.R
use ndarray::{Array2, Zip};

use crate::calibration::CalibrationParameters;
use crate::error::{Error, Result};
use crate::extract::RawCountImage;

/// Radiance per pixel, same shape as the raw counts.
pub type RadianceImage = Array2<f64>;

const CELSIUS_OFFSET: f64 = 273.15;

/// Externally derived linear calibration:
/// `radiance = gain * raw + bias` per pixel.
#[derive(Clone, Debug, PartialEq)]
pub struct GainBiasOverride {
    gain: Array2<f64>,
    bias: Array2<f64>,
}

impl GainBiasOverride {
    pub fn new(gain: Array2<f64>, bias: Array2<f64>) -> Self {
        GainBiasOverride { gain, bias }
    }

    pub fn gain(&self) -> &Array2<f64> {
        &self.gain
    }

    pub fn bias(&self) -> &Array2<f64> {
        &self.bias
    }

    /// Apply to a raw count grid. Both grids must have exactly
    /// the raw grid's shape.
    pub fn apply(&self, raw: &RawCountImage) -> Result<RadianceImage> {
        if self.gain.dim() != raw.dim() || self.bias.dim() != raw.dim() {
            return Err(Error::DimensionMismatch {
                raw: raw.dim(),
                gain: self.gain.dim(),
                bias: self.bias.dim(),
            });
        }
        Ok(Zip::from(raw)
            .and(&self.gain)
            .and(&self.bias)
            .map_collect(|&s, &g, &b| g * f64::from(s) + b))
    }
}

/// Linear map from raw counts to object radiance, derived
/// from the calibration parameters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RadianceTransform {
    coeffs: [f64; 2],
}

impl RadianceTransform {
    /// Build the transform, checking every intermediate term.
    pub fn new(params: &CalibrationParameters) -> Result<Self> {
        let p = params;
        check_fraction("emissivity", p.emissivity)?;
        check_fraction("IR window transmission", p.ir_window_transmission)?;
        let tau = atmospheric_transmission(p);
        if !(tau > 0. && tau.is_finite()) {
            return Err(Error::NumericDomain(format!(
                "atmospheric transmission not positive: {}",
                tau
            )));
        }

        let emiss = p.emissivity;
        let irt = p.ir_window_transmission;
        //   emiss.wind<-1-IRT
        //   refl.wind<-0 # anti-reflective coating on window
        let emiss_wind = 1. - irt;
        let refl_wind = 0.;

        //   raw.refl1.attn<-(1-E)/E*raw.refl1
        let refl = planck_temp_to_raw(p, "reflected", p.reflected_apparent_temperature)?;
        let refl1_attn = (1. - emiss) / emiss * refl;

        //   raw.atm1.attn<-(1-tau1)/E/tau1*raw.atm1
        let atm = planck_temp_to_raw(p, "atmospheric", p.atmospheric_temperature)?;
        let atm1_attn = (1. - tau) / emiss / tau * atm;

        //   raw.wind.attn<-emiss.wind/E/tau1/IRT*raw.wind
        let wind = planck_temp_to_raw(p, "IR window", p.ir_window_temperature)?;
        let wind_attn = emiss_wind / emiss / tau / irt * wind;

        //   raw.refl2.attn<-refl.wind/E/tau1/IRT*raw.refl2
        let refl2_attn = refl_wind / emiss / tau / irt * refl;

        //   raw.atm2.attn<-(1-tau2)/E/tau1/IRT/tau2*raw.atm2
        let atm2_attn = (1. - tau) / emiss / tau / irt / tau * atm;

        // L = raw.obj + O
        let coeffs = [
            p.planck_o - atm1_attn - atm2_attn - wind_attn - refl1_attn - refl2_attn,
            1. / emiss / tau / irt / tau,
        ];
        if !coeffs.iter().all(|c| c.is_finite()) {
            return Err(Error::NumericDomain(format!(
                "radiance coefficients not finite: {:?}",
                coeffs
            )));
        }
        Ok(RadianceTransform { coeffs })
    }

    /// `(offset, slope)` of the transform.
    pub fn coefficients(&self) -> [f64; 2] {
        self.coeffs
    }

    #[inline]
    pub fn radiance(&self, raw: f64) -> f64 {
        power_series_at(&self.coeffs, raw)
    }

    pub fn apply(&self, raw: &RawCountImage) -> Result<RadianceImage> {
        let radiance = raw.mapv(|s| self.radiance(f64::from(s)));
        if let Some(((row, col), val)) = radiance.indexed_iter().find(|(_, v)| !v.is_finite()) {
            return Err(Error::NumericDomain(format!(
                "radiance at ({}, {}) is not finite: {}",
                row, col, val
            )));
        }
        Ok(radiance)
    }
}

fn check_fraction(name: &str, val: f64) -> Result<()> {
    if val > 0. && val <= 1. {
        Ok(())
    } else {
        Err(Error::NumericDomain(format!(
            "{} out of (0, 1]: {}",
            name, val
        )))
    }
}

// raw = PR1/(PR2*(exp(PB/(temp+273.15))-PF))-PO
fn planck_temp_to_raw(p: &CalibrationParameters, name: &str, temp: f64) -> Result<f64> {
    let kelvin = temp + CELSIUS_OFFSET;
    let raw = p.planck_r1 / (p.planck_r2 * ((p.planck_b / kelvin).exp() - p.planck_f)) - p.planck_o;
    if kelvin > 0. && raw.is_finite() {
        Ok(raw)
    } else {
        Err(Error::NumericDomain(format!(
            "Planck response undefined for {} temperature {} C",
            name, temp
        )))
    }
}

/// Transmission through the air between object and camera.
///
/// The thermal window is assumed at the mid-point (OD/2)
/// between the source and the sensor; equations from Minkina
/// and Dudzik's Infrared Thermography book.
pub fn atmospheric_transmission(p: &CalibrationParameters) -> f64 {
    //   h2o<-(RH/100)*exp(1.5587+0.06939*(ATemp)-0.00027816*(ATemp)^2+0.00000068455*(ATemp)^3)
    const ATMOSPHERIC_SERIES: [f64; 4] = [1.5587, 0.06939, -0.00027816, 0.00000068455];
    let h2o = p.relative_humidity
        * power_series_at(&ATMOSPHERIC_SERIES, p.atmospheric_temperature).exp();
    let h2o_sqrt = h2o.sqrt();

    //   tau1<-ATX*exp(-sqrt(OD/2)*(ATA1+ATB1*sqrt(h2o)))+(1-ATX)*exp(-sqrt(OD/2)*(ATA2+ATB2*sqrt(h2o)))
    let dist_factor = (p.object_distance / 2.).sqrt();
    let x = p.atmospheric_trans_x;
    x * (-dist_factor * (p.atmospheric_trans_alpha1 + p.atmospheric_trans_beta1 * h2o_sqrt)).exp()
        + (1. - x)
            * (-dist_factor * (p.atmospheric_trans_alpha2 + p.atmospheric_trans_beta2 * h2o_sqrt))
                .exp()
}

/// Radiance from the manufacturer calibration.
pub fn radiance_from_calibration(
    raw: &RawCountImage,
    params: &CalibrationParameters,
) -> Result<RadianceImage> {
    RadianceTransform::new(params)?.apply(raw)
}

/// Temperature (Celsius) of a blackbody with the given
/// radiance: `B / ln(R1 / (R2 * L) + F) - 273.15`.
pub fn radiance_to_temperature(params: &CalibrationParameters, radiance: f64) -> Option<f64> {
    if !(radiance > 0.) {
        return None;
    }
    let arg = params.planck_r1 / (params.planck_r2 * radiance) + params.planck_f;
    if !(arg > 1.) {
        return None;
    }
    let temp = params.planck_b / arg.ln() - CELSIUS_OFFSET;
    Some(temp).filter(|t| t.is_finite())
}

/// Per-pixel temperature from a radiance grid.
pub fn temperature_from_radiance(
    radiance: &RadianceImage,
    params: &CalibrationParameters,
) -> Result<Array2<f64>> {
    let mut out = Array2::zeros(radiance.dim());
    for ((row, col), &val) in radiance.indexed_iter() {
        out[(row, col)] = radiance_to_temperature(params, val).ok_or_else(|| {
            Error::NumericDomain(format!(
                "no temperature for radiance {} at ({}, {})",
                val, row, col
            ))
        })?;
    }
    Ok(out)
}

#[inline]
fn power_series_at(coeffs: &[f64], x: f64) -> f64 {
    let mut pow = 1.;
    let mut sum = 0.;
    for coeff in coeffs.iter() {
        sum += pow * coeff;
        pow *= x;
    }
    sum
}

#[cfg(test)]
pub(crate) mod tests {
    use ndarray::array;

    use super::*;

    pub(crate) fn typical_params() -> CalibrationParameters {
        CalibrationParameters {
            planck_r1: 17096.654,
            planck_r2: 0.046,
            planck_b: 1428.,
            planck_f: 1.,
            planck_o: -7340.,
            emissivity: 0.95,
            object_distance: 1.,
            reflected_apparent_temperature: 20.,
            atmospheric_temperature: 20.,
            relative_humidity: 0.5,
            ir_window_temperature: 20.,
            ir_window_transmission: 1.,
            atmospheric_trans_alpha1: 0.006569,
            atmospheric_trans_alpha2: 0.01262,
            atmospheric_trans_beta1: -0.002276,
            atmospheric_trans_beta2: -0.00667,
            atmospheric_trans_x: 1.9,
            raw_value_range_min: 0.,
            raw_value_range_max: 65535.,
        }
    }

    // raw value a blackbody at `temp` produces with unit
    // emissivity and transmission
    fn blackbody_raw(p: &CalibrationParameters, temp: f64) -> f64 {
        planck_temp_to_raw(p, "test", temp).unwrap()
    }

    #[test]
    fn blackbody_round_trip() -> Result<()> {
        let mut p = typical_params();
        p.emissivity = 1.;
        p.object_distance = 0.;
        let raw = blackbody_raw(&p, 35.);

        let t = RadianceTransform::new(&p)?;
        let temp = radiance_to_temperature(&p, t.radiance(raw)).unwrap();
        assert!((temp - 35.).abs() < 1e-6, "{}", temp);
        Ok(())
    }

    #[test]
    fn emissivity_correction_raises_temperature() -> Result<()> {
        let p = typical_params();
        let raw = blackbody_raw(&p, 40.);
        let t = RadianceTransform::new(&p)?;
        let temp = radiance_to_temperature(&p, t.radiance(raw)).unwrap();
        assert!(temp > 40. && temp < 45., "{}", temp);
        Ok(())
    }

    #[test]
    fn extremes_are_finite() -> Result<()> {
        let raw = array![[0u16, 65535], [1, 65534]];
        let radiance = radiance_from_calibration(&raw, &typical_params())?;
        assert_eq!(radiance.dim(), (2, 2));
        assert!(radiance.iter().all(|v| v.is_finite()));
        Ok(())
    }

    #[test]
    fn out_of_domain_parameters() {
        let raw = array![[1000u16]];
        let mut p = typical_params();
        p.emissivity = 0.;
        assert!(matches!(
            radiance_from_calibration(&raw, &p),
            Err(Error::NumericDomain(_))
        ));

        let mut p = typical_params();
        p.ir_window_transmission = 0.;
        assert!(matches!(
            radiance_from_calibration(&raw, &p),
            Err(Error::NumericDomain(_))
        ));

        let mut p = typical_params();
        p.object_distance = 1e12;
        assert!(matches!(
            radiance_from_calibration(&raw, &p),
            Err(Error::NumericDomain(_))
        ));

        let mut p = typical_params();
        p.planck_r2 = 0.;
        assert!(matches!(
            radiance_from_calibration(&raw, &p),
            Err(Error::NumericDomain(_))
        ));
    }

    #[test]
    fn gain_bias_is_exact() -> Result<()> {
        let raw = array![[0u16, 10], [65535, 3]];
        let gain = array![[0.5, 1.25], [1e-3, -2.]];
        let bias = array![[1., -0.75], [0., 100.]];
        let radiance = GainBiasOverride::new(gain.clone(), bias.clone()).apply(&raw)?;
        for ((i, j), &val) in radiance.indexed_iter() {
            assert_eq!(val, gain[(i, j)] * f64::from(raw[(i, j)]) + bias[(i, j)]);
        }
        Ok(())
    }

    #[test]
    fn gain_bias_shape_mismatch() {
        let raw = array![[0u16, 10], [20, 30]];
        let short = GainBiasOverride::new(array![[1., 1.]], array![[0., 0.], [0., 0.]]);
        assert!(matches!(
            short.apply(&raw),
            Err(Error::DimensionMismatch {
                raw: (2, 2),
                gain: (1, 2),
                bias: (2, 2)
            })
        ));
    }

    #[test]
    fn temperature_domain() {
        let p = typical_params();
        assert!(radiance_to_temperature(&p, -1.).is_none());
        assert!(radiance_to_temperature(&p, 0.).is_none());
        let grid = array![[blackbody_raw(&p, 25.) + p.planck_o, -5.]];
        assert!(matches!(
            temperature_from_radiance(&grid, &p),
            Err(Error::NumericDomain(_))
        ));
    }
}
