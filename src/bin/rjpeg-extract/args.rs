use std::path::PathBuf;

use anyhow::Result;
use clap::value_t_or_exit;
use rjpeg::{arg, args_parser, opt};

pub struct Args {
    pub paths: Vec<String>,
    pub is_json: bool,
    pub output: PathBuf,
    pub distance: Option<f64>,
    pub gain_bias: Option<(PathBuf, PathBuf)>,
    pub outputs: Outputs,
}

/// Which images to write for every input.
#[derive(Clone, Copy, Debug, Default)]
pub struct Outputs {
    pub raw: bool,
    pub radiance: bool,
    pub temperature: bool,
    pub rgb: bool,
}

impl Args {
    pub fn from_cmd_line() -> Result<Args> {
        let matches = args_parser!("rjpeg-extract")
            .about("Extract raw counts, radiance and visible images from FLIR R-JPEGs.")
            .arg(
                opt!("json")
                    .short("j")
                    .takes_value(false)
                    .help("Paths are `exiftool -j -b` jsons (default: paths are rjpegs)"),
            )
            .arg(
                opt!("output")
                    .short("o")
                    .required(true)
                    .help("Directory to write TIFF outputs to"),
            )
            .arg(
                opt!("distance")
                    .short("d")
                    .help("Object distance in meters (default: value stored in the image)"),
            )
            .arg(
                opt!("gain")
                    .requires("bias")
                    .help("Float TIFF of per-pixel gain; replaces the built-in calibration"),
            )
            .arg(
                opt!("bias")
                    .requires("gain")
                    .help("Float TIFF of per-pixel bias"),
            )
            .arg(opt!("raw").takes_value(false).help("Write raw counts (uint16)"))
            .arg(
                opt!("radiance")
                    .takes_value(false)
                    .help("Write radiance (float32)"),
            )
            .arg(
                opt!("temperature")
                    .takes_value(false)
                    .help("Write temperature in Celsius (float32)"),
            )
            .arg(opt!("rgb").takes_value(false).help("Write the embedded visible image (uint8)"))
            .arg(
                arg!("paths")
                    .required(true)
                    .multiple(true)
                    .help("Image / json paths"),
            )
            .get_matches();

        let paths = matches
            .values_of("paths")
            .map(|vals| vals.map(|f| f.into()).collect())
            .unwrap_or_default();
        let output = value_t_or_exit!(matches, "output", PathBuf);
        let distance = matches
            .is_present("distance")
            .then(|| value_t_or_exit!(matches.value_of("distance"), f64));
        let gain_bias = match (matches.value_of("gain"), matches.value_of("bias")) {
            (Some(gain), Some(bias)) => Some((gain.into(), bias.into())),
            _ => None,
        };

        let outputs = Outputs {
            raw: matches.is_present("raw"),
            radiance: matches.is_present("radiance"),
            temperature: matches.is_present("temperature"),
            rgb: matches.is_present("rgb"),
        };

        Ok(Args {
            paths,
            is_json: matches.is_present("json"),
            output,
            distance,
            gain_bias,
            outputs,
        })
    }
}
