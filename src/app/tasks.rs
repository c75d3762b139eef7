use crate::app::workspace::CalculationWorkspace;
use crate::coordination::Coordinator;
use crate::dispatch::{KPath, Registry};
use crate::error::{JobError, Result};
use crate::io::{publish_json, ArtifactStore};
use crate::kwargs::{Directive, Kwargs};
use crate::pw::analysis::{self, BandStructure, DensityOfStates, DEFAULT_DOS_POINTS, DEFAULT_DOS_WIDTH};
use crate::pw::{Energies, ScfResult};
use crate::timings::Timings;
use serde::Serialize;
use std::time::Instant;
use tracing::info;

/// Result of one post-SCF call.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Analysis {
    Bands(BandStructure),
    Dos(DensityOfStates),
    Energies(Energies),
}

/// Contents of `<function>.json`.
#[derive(Serialize)]
struct AnalysisRecord<'a> {
    function: &'a str,
    result: &'a Analysis,
}

pub fn analysis_registry() -> Registry<ScfResult, Analysis> {
    Registry::new("postscf")
        .register("compute_bands", compute_bands)
        .register("compute_dos", compute_dos)
        .register("energy_decomposition", energy_decomposition)
}

fn compute_bands(scfres: &ScfResult, mut kwargs: Kwargs) -> Result<Analysis> {
    let kpath = KPath::take_from(&mut kwargs)?;
    let n_bands = kwargs.take_as::<usize>("n_bands")?;
    kwargs.finish()?;
    info!("Computing bands along {} k-points", kpath.len());
    analysis::compute_bands(scfres, kpath.points(), n_bands).map(Analysis::Bands)
}

fn compute_dos(scfres: &ScfResult, mut kwargs: Kwargs) -> Result<Analysis> {
    let n_points: usize = kwargs.take_or("n_points", DEFAULT_DOS_POINTS)?;
    let width: f64 = kwargs.take_or("width", DEFAULT_DOS_WIDTH)?;
    if n_points < 2 || !(width > 0.0) {
        return Err(JobError::config(
            kwargs.path(),
            "a DOS needs n_points >= 2 and a positive width",
        ));
    }
    let emin = kwargs.take_as::<f64>("emin")?;
    let emax = kwargs.take_as::<f64>("emax")?;
    kwargs.finish()?;
    analysis::compute_dos(scfres, n_points, width, emin, emax).map(Analysis::Dos)
}

fn energy_decomposition(scfres: &ScfResult, kwargs: Kwargs) -> Result<Analysis> {
    kwargs.finish()?;
    Ok(Analysis::Energies(analysis::energy_decomposition(scfres)))
}

pub fn artifact_name(function: &str) -> String {
    format!("{function}.json")
}

/// Fails on the first entry naming a function outside the registry.
///
/// Called before any solver work so an unknown name never leaves artifacts behind.
pub fn validate_postscf(entries: &[Directive]) -> Result<()> {
    let registry = analysis_registry();
    for entry in entries {
        registry.lookup(&entry.function)?;
    }
    Ok(())
}

/// Runs every post-SCF entry in order; the first failure aborts the rest.
pub fn run_postscf_stage(
    entries: &[Directive],
    scfres: &ScfResult,
    workspace: &CalculationWorkspace,
    coordinator: &dyn Coordinator,
    store: &dyn ArtifactStore,
    timings: &mut Timings,
) -> Result<Vec<String>> {
    validate_postscf(entries)?;
    let registry = analysis_registry();
    let interpolation = workspace.interpolation();
    let mut files = Vec::with_capacity(entries.len());

    for entry in entries {
        info!("Running post-SCF function {}", entry.function);
        let start = Instant::now();
        let result = registry.dispatch(scfres, entry, &interpolation)?;
        timings.record(&format!("postscf/{}", entry.function), start.elapsed());

        let name = artifact_name(&entry.function);
        let record = AnalysisRecord {
            function: &entry.function,
            result: &result,
        };
        publish_json(coordinator, store, &name, &record)?;
        files.push(name);
    }
    Ok(files)
}
