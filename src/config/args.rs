//! Command-line argument parsing for job runs

use clap::Parser;
use std::path::PathBuf;

/// Run a plane-wave DFT job described by a JSON (or YAML) document
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the job document
    pub input: PathBuf,

    /// File to list first in the output manifest (repeatable)
    #[arg(long = "extra-output", value_name = "FILE")]
    pub extra_output: Vec<String>,

    /// Override output file: (default stderr)
    #[arg(short, long)]
    pub output: Option<String>,

    /// Directory receiving checkpoint, status and post-SCF artifacts
    #[arg(long, default_value = ".")]
    pub workdir: PathBuf,

    /// Number of cooperating ranks, run as threads of this process
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u16).range(1..))]
    pub ranks: u16,

    /// Log debug messages
    #[arg(short, long)]
    pub verbose: bool,
}
