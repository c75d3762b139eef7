use super::basis::PlaneWaveBasis;
use super::grid::grid_points;
use super::hamiltonian::{
    compute_density, diagonalize, hamiltonian, hartree_energy, kinetic_energy, local_potential,
    potential_energy, xc_terms, EffectivePotential,
};
use super::mixing::{density_change, Convergence, Mixing};
use super::occupation::compute_occupation;
use crate::error::{JobError, Result};
use crate::kwargs::{Directive, Interpolation, Kwargs};
use crate::timings::{Deadline, Timings};
use nalgebra::{DMatrix, Vector3};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const DEFAULT_TOL: f64 = 1e-6;
pub const DEFAULT_MAXITER: usize = 100;
pub const DEFAULT_DAMPING: f64 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScfOptions {
    pub tol: f64,
    pub maxiter: usize,
    pub damping: f64,
    pub mixing: Mixing,
    pub criterion: Convergence,
    pub n_bands: Option<usize>,
}

impl Default for ScfOptions {
    fn default() -> Self {
        ScfOptions {
            tol: DEFAULT_TOL,
            maxiter: DEFAULT_MAXITER,
            damping: DEFAULT_DAMPING,
            mixing: Mixing::Simple,
            criterion: Convergence::Density { tol: DEFAULT_TOL },
            n_bands: None,
        }
    }
}

impl ScfOptions {
    /// Reads solver keyword arguments.
    ///
    /// `basis` is optional, but if present it has to be the basis the solver
    /// runs on (normally supplied through interpolation of the name `"basis"`).
    pub fn from_kwargs(
        mut kwargs: Kwargs,
        basis: &Arc<PlaneWaveBasis>,
        interpolation: &Interpolation,
    ) -> Result<Self> {
        if let Some(given) = kwargs.take_object::<PlaneWaveBasis>("basis")? {
            if !Arc::ptr_eq(&given, basis) {
                return Err(JobError::config(
                    kwargs.key_path("basis"),
                    "does not refer to the basis of this job",
                ));
            }
        }

        let tol: f64 = kwargs.take_or("tol", DEFAULT_TOL)?;
        if !(tol > 0.0) {
            return Err(JobError::config(kwargs.key_path("tol"), "must be positive"));
        }
        let maxiter: usize = kwargs.take_or("maxiter", DEFAULT_MAXITER)?;
        if maxiter == 0 {
            return Err(JobError::config(kwargs.key_path("maxiter"), "must be at least 1"));
        }
        let damping: f64 = kwargs.take_or("damping", DEFAULT_DAMPING)?;
        if !(damping > 0.0 && damping <= 1.0) {
            return Err(JobError::config(kwargs.key_path("damping"), "must lie in (0, 1]"));
        }
        let mixing = match kwargs.take_as::<Directive>("mixing")? {
            Some(directive) => Mixing::from_directive(&directive, interpolation)?,
            None => Mixing::default(),
        };
        let criterion = match kwargs.take_as::<Directive>("is_converged")? {
            Some(directive) => Convergence::from_directive(&directive, interpolation, tol)?,
            None => Convergence::Density { tol },
        };
        let n_bands = kwargs.take_as::<usize>("n_bands")?;
        if n_bands == Some(0) {
            return Err(JobError::config(kwargs.key_path("n_bands"), "must be at least 1"));
        }
        kwargs.finish()?;

        Ok(ScfOptions {
            tol,
            maxiter,
            damping,
            mixing,
            criterion,
            n_bands,
        })
    }
}

/// Energy terms in Hartree. The ion-ion interaction is not included.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Energies {
    pub kinetic: f64,
    pub local: f64,
    pub hartree: f64,
    pub xc: f64,
    pub entropy: f64,
    pub total: f64,
}

/// What the per-iteration callback sees.
///
/// `converged` and `timedout` are this process's own view; the callback's
/// returned [`ScfControl`] is what the loop acts on.
pub struct ScfState<'a> {
    pub iteration: usize,
    pub converged: bool,
    pub timedout: bool,
    pub norm_delta: f64,
    pub energies: &'a Energies,
    pub density: &'a [f64],
}

impl ScfState<'_> {
    pub fn control(&self) -> ScfControl {
        if self.converged {
            ScfControl::Converged
        } else if self.timedout {
            ScfControl::Timedout
        } else {
            ScfControl::Continue
        }
    }
}

/// How the loop proceeds after an iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScfControl {
    Continue,
    Converged,
    Timedout,
}

pub struct ScfResult {
    pub basis: Arc<PlaneWaveBasis>,
    pub density: Vec<f64>,
    /// Effective potential generated by `density`
    pub potential: Vec<f64>,
    pub eigenvalues: Vec<Vec<f64>>,
    pub orbitals: Vec<DMatrix<f64>>,
    pub occupation: Vec<Vec<f64>>,
    pub fermi_level: f64,
    pub energies: Energies,
    pub converged: bool,
    pub timedout: bool,
    pub n_iter: usize,
    pub norm_delta: f64,
    pub history: Vec<f64>,
}

impl ScfResult {
    pub fn n_bands(&self) -> usize {
        self.eigenvalues.first().map_or(0, Vec::len)
    }
}

struct Step {
    eigenvalues: Vec<Vec<f64>>,
    orbitals: Vec<DMatrix<f64>>,
    occupation: Vec<Vec<f64>>,
    fermi_level: f64,
    density: Vec<f64>,
    energies: Energies,
}

/// Runs the SCF loop from `density` until `options.criterion` holds, the
/// iteration budget is spent or `deadline` passes.
///
/// The deadline is checked after every iteration, so at least one iteration
/// always runs and the result always describes a real state. `callback` gets
/// every iteration's state and decides whether to go on; `ScfState::control`
/// is the plain local decision.
pub fn self_consistent_field<F>(
    basis: &Arc<PlaneWaveBasis>,
    mut density: Vec<f64>,
    options: &ScfOptions,
    deadline: Deadline,
    timings: &mut Timings,
    mut callback: F,
) -> Result<ScfResult>
where
    F: FnMut(&ScfState) -> Result<ScfControl>,
{
    let model = basis.model();
    let n_bands = options.n_bands.unwrap_or_else(|| model.default_n_bands());
    let points = grid_points(basis);
    let local = local_potential(basis);

    info!(
        "SCF: {} k-points, {} plane waves, {} bands, mixing {:?}, damping {}",
        basis.kpoints().len(),
        basis.n_plane_waves(),
        n_bands,
        options.mixing,
        options.damping
    );
    info!("{:>6} {:>20} {:>14}", "n", "Energy", "log10(Δρ)");

    let mut history = Vec::new();
    let mut previous_energy = None;
    let mut converged = false;
    let mut timedout = false;
    let mut n_iter = 0;
    let mut last = None;
    let mut norm_delta = f64::INFINITY;

    while n_iter < options.maxiter {
        n_iter += 1;
        let potential = timings.time("scf/potential", || {
            EffectivePotential::with_local(local.clone(), basis, &points, &density).total()
        });
        let step = step(basis, &points, &local, &potential, n_bands, timings)?;

        norm_delta = density_change(basis, &density, &step.density);
        history.push(norm_delta);
        info!("{:>6} {:>20.12} {:>14.2}", n_iter, step.energies.total, norm_delta.log10());

        let control = callback(&ScfState {
            iteration: n_iter,
            converged: options
                .criterion
                .is_converged(norm_delta, step.energies.total, previous_energy),
            timedout: deadline.expired(),
            norm_delta,
            energies: &step.energies,
            density: &step.density,
        })?;
        previous_energy = Some(step.energies.total);

        if control == ScfControl::Converged {
            converged = true;
            density = step.density.clone();
            last = Some(step);
            break;
        }
        density = options.mixing.mix(basis, options.damping, &density, &step.density);
        last = Some(step);

        if control == ScfControl::Timedout {
            timedout = true;
            warn!("SCF stopped after {n_iter} iterations: wall time exhausted");
            break;
        }
    }

    let step = last.ok_or_else(|| JobError::Solver("no SCF iteration was run".to_string()))?;
    if converged {
        info!("SCF converged after {n_iter} iterations");
    } else if !timedout {
        warn!("SCF not converged after {n_iter} iterations");
    }

    let potential = EffectivePotential::build(basis, &points, &density).total();
    Ok(ScfResult {
        basis: Arc::clone(basis),
        density,
        potential,
        eigenvalues: step.eigenvalues,
        orbitals: step.orbitals,
        occupation: step.occupation,
        fermi_level: step.fermi_level,
        energies: step.energies,
        converged,
        timedout,
        n_iter,
        norm_delta,
        history,
    })
}

/// Diagonalize in `potential`, occupy, and build the output density and energies.
fn step(
    basis: &PlaneWaveBasis,
    points: &[Vector3<f64>],
    local: &[f64],
    potential: &[f64],
    n_bands: usize,
    timings: &mut Timings,
) -> Result<Step> {
    let model = basis.model();
    let eigen = timings.time("scf/diagonalization", || {
        basis
            .kpoints()
            .par_iter()
            .map(|k| diagonalize(hamiltonian(basis, &k.coordinate, potential), n_bands))
            .collect::<Result<Vec<_>>>()
    })?;
    let (eigenvalues, orbitals): (Vec<_>, Vec<_>) = eigen.into_iter().unzip();

    let occupation = compute_occupation(model, basis.kpoints(), &eigenvalues)?;
    let density = timings.time("scf/density", || {
        compute_density(basis, &orbitals, &occupation.occupation)
    });

    let energies = timings.time("scf/energies", || {
        let kinetic = kinetic_energy(basis, &orbitals, &occupation.occupation);
        let local = potential_energy(basis, local, &density);
        let hartree = hartree_energy(basis, &density);
        let xc = xc_terms(basis, points, &density).energy;
        let entropy = occupation.entropy_term;
        Energies {
            kinetic,
            local,
            hartree,
            xc,
            entropy,
            total: kinetic + local + hartree + xc + entropy,
        }
    });
    debug!("Energies: {energies:?}");

    Ok(Step {
        eigenvalues,
        orbitals,
        occupation: occupation.occupation,
        fermi_level: occupation.fermi_level,
        density,
        energies,
    })
}
