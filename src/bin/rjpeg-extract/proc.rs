use std::{
    borrow::Cow,
    fs::File,
    io::BufWriter,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use rjpeg::{cli::InputFile, CalibrationParameters, CameraInfo, GainBiasOverride};
use serde_derive::*;
use tiff::encoder::{colortype, TiffEncoder};
use tracing::debug;

use crate::args::{Args, Outputs};

pub struct ExtractArgs {
    pub output: PathBuf,
    pub distance: Option<f64>,
    pub gain_bias: Option<GainBiasOverride>,
    pub outputs: Outputs,
}

impl ExtractArgs {
    pub fn from_args(args: &Args) -> Result<Self> {
        let gain_bias = args
            .gain_bias
            .as_ref()
            .map(|(gain, bias)| rjpeg::cli::read_gain_bias(gain, bias))
            .transpose()?;
        Ok(ExtractArgs {
            output: args.output.clone(),
            distance: args.distance,
            gain_bias,
            outputs: args.outputs,
        })
    }

    fn output_path(&self, source: &str, suffix: &str) -> PathBuf {
        let stem = Path::new(source)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image".into());
        self.output.join(format!("{}_{}.tif", stem, suffix))
    }
}

/// Per-file entry of the JSON summary.
#[derive(Serialize, Debug)]
pub struct FileSummary {
    path: String,
    width: usize,
    height: usize,
    has_visible: bool,
    camera: CameraInfo,
    calibration: CalibrationParameters,
    written: Vec<PathBuf>,
}

pub fn extract(input: &InputFile, args: &ExtractArgs) -> Result<FileSummary> {
    let file = &input.file;
    let (height, width) = file.dim();
    let calibration = match args.distance {
        Some(d) => file.calibration().with_object_distance(d),
        None => file.calibration().clone(),
    };
    let mut written = vec![];

    if args.outputs.raw {
        let path = args.output_path(&input.filename, "raw");
        let values: Vec<u16> = file.raw_counts().iter().copied().collect();
        write_tiff::<colortype::Gray16>(&path, width, height, &values)?;
        written.push(path);
    }

    if args.outputs.radiance || args.outputs.temperature {
        let radiance = match (&args.gain_bias, args.distance) {
            (Some(_), _) | (None, None) => file.radiance(args.gain_bias.as_ref())?,
            (None, Some(_)) => Cow::Owned(file.radiance_with_calibration(&calibration)?),
        };

        if args.outputs.radiance {
            let path = args.output_path(&input.filename, "radiance");
            let values: Vec<f32> = radiance.iter().map(|&v| v as f32).collect();
            write_tiff::<colortype::Gray32Float>(&path, width, height, &values)?;
            written.push(path);
        }

        if args.outputs.temperature {
            let temps = rjpeg::radiance::temperature_from_radiance(&radiance, &calibration)
                .with_context(|| format!("temperature of {}", input.filename))?;
            let path = args.output_path(&input.filename, "temperature");
            let values: Vec<f32> = temps.iter().map(|&v| v as f32).collect();
            write_tiff::<colortype::Gray32Float>(&path, width, height, &values)?;
            written.push(path);
        }
    }

    if args.outputs.rgb {
        match file.visible() {
            Some(rgb) => {
                let path = args.output_path(&input.filename, "rgb");
                let (w, h) = rgb.dimensions();
                write_tiff::<colortype::RGB8>(&path, w as usize, h as usize, rgb.as_raw())?;
                written.push(path);
            }
            None => tracing::warn!("{} contains no visible image, skipping", input.filename),
        }
    }

    debug!(file = %input.filename, outputs = written.len(), "extracted");
    Ok(FileSummary {
        path: input.filename.clone(),
        width,
        height,
        has_visible: file.visible().is_some(),
        camera: file.camera().clone(),
        calibration,
        written,
    })
}

fn write_tiff<C>(path: &Path, width: usize, height: usize, data: &[C::Inner]) -> Result<()>
where
    C: colortype::ColorType,
    [C::Inner]: tiff::encoder::TiffValue,
{
    let writer = BufWriter::new(
        File::create(path).with_context(|| format!("creating {}", path.display()))?,
    );
    TiffEncoder::new(writer)?.write_image::<C>(width as u32, height as u32, data)?;
    Ok(())
}
