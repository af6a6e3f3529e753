//! Helpers to parse CLI arguments and read inputs in the
//! accompanying binaries.
//!
//! APIs here shouldn't be considered stable / used as a
//! library.

use std::{
    fs::File,
    io::{BufReader, Read},
    path::Path,
};

use anyhow::{Context, Result};
pub use clap::{App, Arg};
use indicatif::{ProgressBar, ProgressStyle};
pub use inflector::Inflector;
use ndarray::Array2;
use rayon::iter::{once, Either, IntoParallelIterator, ParallelIterator};
use serde_derive::*;
use tiff::decoder::{Decoder, DecodingResult};

use crate::{ExiftoolJson, GainBiasOverride, LoadedFile, FFF_CAMERA_INFO};

#[macro_export]
macro_rules! args_parser {
    ($name:expr) => {{
        $crate::cli::App::new($name)
            .version(clap::crate_version!())
            .author(clap::crate_authors!())
    }};
}

#[macro_export]
macro_rules! arg {
    ($name:expr) => {{
        use $crate::cli::Inflector;
        $crate::cli::Arg::with_name($name).value_name(&$name.to_screaming_snake_case())
    }};
}

#[macro_export]
macro_rules! opt {
    ($name:expr) => {{
        use $crate::cli::Inflector;
        $crate::cli::Arg::with_name($name)
            .long(&$name.to_kebab_case())
            .value_name(&$name.to_screaming_snake_case())
    }};
}

/// A loaded input and the name it was read from.
pub struct InputFile {
    pub filename: String,
    pub file: LoadedFile,
}

impl InputFile {
    fn try_from_image_path(filename: String) -> Result<Self> {
        let file = LoadedFile::from_path(&filename, &FFF_CAMERA_INFO)
            .with_context(|| format!("could not parse R-JPEG {}", filename))?;
        Ok(InputFile { filename, file })
    }

    fn try_from_exiftool_json<R: Read>(rdr: R) -> Result<Vec<Result<Self>>> {
        Ok(serde_json::from_reader::<R, Vec<JsonFormat>>(rdr)?
            .into_iter()
            .map(InputFile::try_from_json)
            .collect())
    }

    fn try_from_json(j: JsonFormat) -> Result<Self> {
        let file = LoadedFile::from_exiftool(j.image)
            .with_context(|| format!("could not load {}", j.filename))?;
        Ok(InputFile {
            filename: j.filename,
            file,
        })
    }
}

#[derive(Deserialize)]
struct JsonFormat {
    #[serde(rename = "SourceFile")]
    pub filename: String,

    #[serde(flatten)]
    pub image: ExiftoolJson,
}

/// Load R-JPEGs (or ExifTool JSON arrays when `is_json`) in
/// parallel, with a progress bar.
pub fn process_paths_par(
    paths: Vec<String>,
    is_json: bool,
) -> impl ParallelIterator<Item = Result<InputFile>> {
    let bar = ProgressBar::new(paths.len() as u64);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {wide_bar:cyan/blue} {pos:>7}/{len:7}"),
    );
    let bar_dup = bar.clone();

    paths
        .into_par_iter()
        .map(move |p| {
            if is_json {
                let vec = File::open(p)
                    .map_err(|e| e.into())
                    .and_then(|f| InputFile::try_from_exiftool_json(BufReader::new(f)));
                match vec {
                    Ok(vec) => {
                        if vec.len() > 1 {
                            bar.inc_length(vec.len() as u64 - 1);
                        }
                        Either::Left(vec.into_par_iter())
                    }
                    Err(e) => Either::Right(once(Err(e))),
                }
            } else {
                Either::Right(once(InputFile::try_from_image_path(p)))
            }
        })
        .flatten()
        .inspect(move |_| bar_dup.inc(1))
}

/// Read a single-band float TIFF into a grid.
pub fn read_float_tiff(path: &Path) -> Result<Array2<f64>> {
    let mut decoder = Decoder::new(BufReader::new(File::open(path)?))
        .with_context(|| format!("reading {}", path.display()))?;
    let (width, height) = decoder.dimensions()?;
    let values: Vec<f64> = match decoder.read_image()? {
        DecodingResult::F32(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::F64(v) => v,
        _ => anyhow::bail!("{}: expected a 32 or 64-bit float TIFF", path.display()),
    };
    Ok(Array2::from_shape_vec(
        (height as usize, width as usize),
        values,
    )?)
}

/// Load a gain/bias pair from float TIFFs.
pub fn read_gain_bias(gain: &Path, bias: &Path) -> Result<GainBiasOverride> {
    Ok(GainBiasOverride::new(
        read_float_tiff(gain)?,
        read_float_tiff(bias)?,
    ))
}
