//! The job pipeline: read, build, SCF, gate, post-SCF, timings.

mod basis;
mod geometry;
mod report;
mod runner;
mod tasks;
mod workspace;

pub use basis::build_basis;
pub use geometry::build_system;
pub use runner::{run_scf_stage, scf_converged, ScfRoutine, ScfSettings, ScfStatus, SCF_STATUS_FILE};
pub use tasks::{analysis_registry, artifact_name, run_postscf_stage, validate_postscf, Analysis};
pub use workspace::CalculationWorkspace;

use self::report::{report_banner, report_scf_summary, report_workspace};
use crate::config::{Args, JobConfig};
use crate::coordination::{read_config, run_local_group, Coordinator, SingleProcess};
use crate::error::Result;
use crate::io::{log_on_coordinator_only, publish_json, ArtifactStore, DirectoryStore};
use crate::timings::Timings;
use std::path::Path;
use tracing::{info, warn};

pub const TIMINGS_FILE: &str = "timings.json";

/// One rank's view of a job run.
pub struct Job<'a> {
    coordinator: &'a dyn Coordinator,
    store: &'a dyn ArtifactStore,
    extra_output_files: Vec<String>,
}

impl<'a> Job<'a> {
    pub fn new(coordinator: &'a dyn Coordinator, store: &'a dyn ArtifactStore) -> Self {
        Job {
            coordinator,
            store,
            extra_output_files: Vec::new(),
        }
    }

    /// Files listed first in the manifest, e.g. the log and the input itself.
    pub fn with_extra_output_files(mut self, files: Vec<String>) -> Self {
        self.extra_output_files = files;
        self
    }

    /// Reads the job file on the coordinator, shares it and runs it.
    pub fn run_file(&self, input: &Path) -> Result<Vec<String>> {
        log_on_coordinator_only(self.coordinator);
        let mut timings = Timings::new();
        let config = timings.time("read_config", || read_config(self.coordinator, input))?;
        self.execute(&config, timings)
    }

    pub fn run(&self, config: &JobConfig) -> Result<Vec<String>> {
        log_on_coordinator_only(self.coordinator);
        self.execute(config, Timings::new())
    }

    /// Returns the manifest: extra files, checkpoint, SCF status, post-SCF
    /// artifacts (only after a converged SCF) and `timings.json`.
    fn execute(&self, config: &JobConfig, mut timings: Timings) -> Result<Vec<String>> {
        let coordinator = self.coordinator;
        let store = self.store;
        let mut files = self.extra_output_files.clone();
        if coordinator.is_coordinator() {
            report_banner(coordinator);
        }

        let postscf = config.postscf()?;
        validate_postscf(&postscf)?;

        let workspace = timings.time("build", || CalculationWorkspace::build(config))?;
        if coordinator.is_coordinator() {
            report_workspace(&workspace);
        }

        let outcome = run_scf_stage(config, &workspace, coordinator, store, &mut timings)?;
        files.extend(outcome.files);
        if coordinator.is_coordinator() {
            report_scf_summary(&outcome.result);
        }

        if scf_converged(coordinator, store)? {
            let produced = run_postscf_stage(
                &postscf,
                &outcome.result,
                &workspace,
                coordinator,
                store,
                &mut timings,
            )?;
            files.extend(produced);
        } else if !postscf.is_empty() {
            warn!("SCF did not converge; skipping {} post-SCF entries", postscf.len());
        }

        if coordinator.is_coordinator() {
            info!("\nTimings:\n{}", timings.render_table());
        }
        publish_json(coordinator, store, TIMINGS_FILE, &timings.report())?;
        files.push(TIMINGS_FILE.to_string());
        Ok(files)
    }
}

pub struct JobApplication {
    args: Args,
}

impl JobApplication {
    pub fn new(args: Args) -> Self {
        Self { args }
    }

    /// Runs the job on `--ranks` cooperating ranks and returns the
    /// coordinator's manifest.
    pub fn run(self) -> Result<Vec<String>> {
        let store = DirectoryStore::new(&self.args.workdir);
        let ranks = usize::from(self.args.ranks);
        info!("Running {} on {} rank(s)", self.args.input.display(), ranks);

        if ranks == 1 {
            return Job::new(&SingleProcess, &store)
                .with_extra_output_files(self.args.extra_output.clone())
                .run_file(&self.args.input);
        }

        run_local_group(ranks, |rank| {
            Job::new(rank, &store)
                .with_extra_output_files(self.args.extra_output.clone())
                .run_file(&self.args.input)
        })
    }
}
