use crate::app::tasks::{analysis_registry, artifact_name};
use crate::app::workspace::CalculationWorkspace;
use crate::app::TIMINGS_FILE;
use crate::config::JobConfig;
use crate::coordination::{broadcast_with, Coordinator};
use crate::error::{JobError, Result};
use crate::io::{load_json, publish_json, store_json, ArtifactStore};
use crate::kwargs::{Directive, Interpolation};
use crate::pw::{guess_density, self_consistent_field, Energies, ScfCheckpoint, ScfOptions, ScfResult};
use crate::timings::{Deadline, Timings};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Instant;
use tracing::info;

pub const SCF_STATUS_FILE: &str = "self_consistent_field.json";

/// The allow-listed routines of the `scf` section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScfRoutine {
    SelfConsistentField,
    GeometryOptimisation,
}

impl ScfRoutine {
    pub fn from_directive(directive: &Directive) -> Result<Self> {
        match directive.function.as_str() {
            "self_consistent_field" => Ok(ScfRoutine::SelfConsistentField),
            "geometry_optimisation" => Ok(ScfRoutine::GeometryOptimisation),
            other => Err(JobError::unknown_function("scf", other)),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ScfRoutine::SelfConsistentField => "self_consistent_field",
            ScfRoutine::GeometryOptimisation => "geometry_optimisation",
        }
    }
}

/// Plain keys of the `scf` section, next to `$function` and `$kwargs`.
#[derive(Debug, Clone, PartialEq)]
pub struct ScfSettings {
    pub checkpointfile: String,
    pub maxtime: Option<u64>,
    pub save_orbitals: bool,
}

impl ScfSettings {
    pub fn from_directive(directive: &Directive) -> Result<Self> {
        let mut options = directive.resolve_options(&Interpolation::new())?;
        let checkpointfile: String = options.require("checkpointfile")?;
        if checkpointfile.is_empty() {
            return Err(JobError::config(
                options.key_path("checkpointfile"),
                "must not be empty",
            ));
        }
        if reserved_artifact_names().contains(&checkpointfile) {
            return Err(JobError::config(
                options.key_path("checkpointfile"),
                format!("'{checkpointfile}' is written by the job itself"),
            ));
        }
        let maxtime = options.take_as::<u64>("maxtime")?;
        let save_orbitals = options.take_or("save_ψ", false)?;
        options.finish()?;
        Ok(ScfSettings {
            checkpointfile,
            maxtime,
            save_orbitals,
        })
    }
}

/// Names the pipeline writes on its own: status, timings and post-SCF results.
fn reserved_artifact_names() -> Vec<String> {
    let mut names = vec![SCF_STATUS_FILE.to_string(), TIMINGS_FILE.to_string()];
    names.extend(analysis_registry().names().into_iter().map(artifact_name));
    names
}

/// Contents of `self_consistent_field.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScfStatus {
    pub function: String,
    pub converged: bool,
    pub timedout: bool,
    pub n_iter: usize,
    pub energies: Energies,
    pub fermi_level: f64,
    pub norm_delta: f64,
    pub runtime_seconds: f64,
    pub checkpointfile: String,
}

pub struct ScfOutcome {
    pub result: ScfResult,
    /// Artifact names in the order they were produced
    pub files: Vec<String>,
}

/// Runs the `scf` section: routine selection, solver, checkpoint and status.
///
/// The checkpoint is always written before the status file, so a reader that
/// finds `converged: true` also finds the state it refers to.
pub fn run_scf_stage(
    config: &JobConfig,
    workspace: &CalculationWorkspace,
    coordinator: &dyn Coordinator,
    store: &dyn ArtifactStore,
    timings: &mut Timings,
) -> Result<ScfOutcome> {
    let directive = config.scf()?;
    let routine = ScfRoutine::from_directive(&directive)?;
    if routine == ScfRoutine::GeometryOptimisation {
        return Err(JobError::NotImplemented(routine.name().to_string()));
    }
    let settings = ScfSettings::from_directive(&directive)?;

    let interpolation = workspace.interpolation();
    let kwargs = directive.resolve_kwargs(&interpolation)?;
    let basis = &workspace.basis;
    let options = ScfOptions::from_kwargs(kwargs, basis, &interpolation)?;
    let deadline = Deadline::from_seconds(settings.maxtime);

    let resumed = broadcast_with(coordinator, || {
        Ok(load_json::<ScfCheckpoint>(store, &settings.checkpointfile)?
            .and_then(|checkpoint| checkpoint.density_for(basis)))
    })?;
    let density = match resumed {
        Some(density) => {
            info!("Resuming from checkpoint {}", settings.checkpointfile);
            density
        }
        None => guess_density(basis),
    };

    info!("Starting {}...", routine.name());
    let start = Instant::now();
    // The coordinator's view of convergence and wall time steers every rank.
    let scfres = self_consistent_field(basis, density, &options, deadline, timings, |state| {
        broadcast_with(coordinator, || {
            store_json(
                coordinator,
                store,
                &settings.checkpointfile,
                &ScfCheckpoint::from_state(basis, state),
            )?;
            Ok(state.control())
        })
    })?;
    let runtime = start.elapsed();
    timings.record("scf", runtime);

    let checkpoint = ScfCheckpoint::from_result(&scfres, settings.save_orbitals);
    publish_json(coordinator, store, &settings.checkpointfile, &checkpoint)?;
    let status = ScfStatus {
        function: routine.name().to_string(),
        converged: scfres.converged,
        timedout: scfres.timedout,
        n_iter: scfres.n_iter,
        energies: scfres.energies,
        fermi_level: scfres.fermi_level,
        norm_delta: scfres.norm_delta,
        runtime_seconds: runtime.as_secs_f64(),
        checkpointfile: settings.checkpointfile.clone(),
    };
    publish_json(coordinator, store, SCF_STATUS_FILE, &status)?;

    Ok(ScfOutcome {
        result: scfres,
        files: vec![settings.checkpointfile, SCF_STATUS_FILE.to_string()],
    })
}

/// Reads the persisted status on the coordinator and shares its `converged` flag.
///
/// A missing file or field counts as not converged.
pub fn scf_converged(coordinator: &dyn Coordinator, store: &dyn ArtifactStore) -> Result<bool> {
    broadcast_with(coordinator, || {
        let status: Option<Value> = load_json(store, SCF_STATUS_FILE)?;
        Ok(status
            .as_ref()
            .and_then(|s| s.get("converged"))
            .and_then(Value::as_bool)
            .unwrap_or(false))
    })
}
