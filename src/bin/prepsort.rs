//! prepsort - copy the clips of matching events into one directory
//!
//! Scans `YYYYMMDD` directories under `--input`, matches each event's
//! metadata against the criteria in `--config`, and copies the matching
//! `.mp4` files to `--output`.

use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

use sighting_kernel::catalog::{clean_directory, sort_clips, Criteria};

#[derive(Parser, Debug)]
#[command(author, version, about = "Sort recorded clips by event metadata")]
struct Args {
    /// Root directory containing date directories of clips and metadata.
    #[arg(long)]
    input: PathBuf,

    /// Directory the matching clips are copied to.
    #[arg(long)]
    output: PathBuf,

    /// JSON object of filter criteria.
    #[arg(long, default_value = "prepsort-config.json")]
    config: PathBuf,

    #[arg(short, long)]
    verbose: bool,

    /// Remove files from the output directory before copying.
    #[arg(long)]
    clean: bool,
}

fn main() -> Result<ExitCode> {
    let args = Args::parse();
    let default_filter = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    if !args.input.is_dir() {
        return Err(anyhow!(
            "input directory does not exist: {}",
            args.input.display()
        ));
    }
    if args.clean {
        clean_directory(&args.output)?;
    }

    let criteria = Criteria::load(&args.config)?;
    log::info!(
        "loaded {} filter criteria from {}",
        criteria.len(),
        args.config.display()
    );

    let summary = sort_clips(&args.input, &args.output, &criteria)?;
    if summary.skipped > 0 {
        log::warn!("{} metadata files could not be parsed", summary.skipped);
    }
    if summary.copied.is_empty() {
        log::warn!("no matching files found");
        return Ok(ExitCode::FAILURE);
    }
    log::info!("sort completed: {} clips copied", summary.copied.len());
    Ok(ExitCode::SUCCESS)
}
