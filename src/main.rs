//! DFT Job Command-Line Interface
//!
//! Runs the job document given on the command line and prints the list of
//! produced files, one per line.

use clap::Parser;
use color_eyre::eyre::{Result, WrapErr};
use dftjob::config::Args;
use dftjob::io::setup_output;
use dftjob::JobApplication;
use tracing::info;

fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();
    setup_output(args.output.as_ref(), args.verbose);
    info!("Reading job from: {}", args.input.display());

    let input = args.input.display().to_string();
    let manifest = JobApplication::new(args)
        .run()
        .wrap_err_with(|| format!("Job {input} failed"))?;

    for file in &manifest {
        println!("{file}");
    }
    Ok(())
}
