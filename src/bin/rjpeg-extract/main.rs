mod args;
mod proc;

use anyhow::Result;
use rayon::iter::ParallelIterator;
use serde_derive::*;
use tracing::{error, info};

use rjpeg::cli::process_paths_par;

use crate::{
    args::Args,
    proc::{extract, ExtractArgs, FileSummary},
};

fn main() -> Result<()> {
    rjpeg::logger::init();
    let args = Args::from_cmd_line()?;
    let e_args = ExtractArgs::from_args(&args)?;
    std::fs::create_dir_all(&e_args.output)?;

    let results: Vec<Result<FileSummary>> = process_paths_par(args.paths.clone(), args.is_json)
        .map(|inp| extract(&inp?, &e_args))
        .collect();

    let mut files = vec![];
    let mut failed = 0usize;
    for res in results {
        match res {
            Ok(summary) => files.push(summary),
            Err(e) => {
                failed += 1;
                error!("{:#}", e);
            }
        }
    }
    info!("Processed {} images, {} failed", files.len(), failed);

    #[derive(Debug, Serialize)]
    struct OutputJson {
        files: Vec<FileSummary>,
        failed: usize,
    }

    serde_json::to_writer(std::io::stdout().lock(), &OutputJson { files, failed })?;

    Ok(())
}
