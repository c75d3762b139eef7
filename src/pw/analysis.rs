//! Quantities derived from a converged SCF result.

use super::hamiltonian::{diagonalize, hamiltonian};
use super::scf::{Energies, ScfResult};
use crate::error::{JobError, Result};
use nalgebra::Vector3;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandStructure {
    /// Fractional k-point coordinates along the path
    pub kpath: Vec<[f64; 3]>,
    /// `eigenvalues[k][n]` in Hartree
    pub eigenvalues: Vec<Vec<f64>>,
    pub n_bands: usize,
    pub fermi_level: f64,
}

/// Non-self-consistent eigenvalues along `kpath` in the converged potential.
///
/// By default three more bands than the SCF used are computed, limited by the
/// basis size.
pub fn compute_bands(scfres: &ScfResult, kpath: &[Vector3<f64>], n_bands: Option<usize>) -> Result<BandStructure> {
    let basis = &scfres.basis;
    let n_bands = n_bands.unwrap_or_else(|| (scfres.n_bands() + 3).min(basis.n_plane_waves()));
    let eigenvalues = kpath
        .par_iter()
        .map(|k| diagonalize(hamiltonian(basis, k, &scfres.potential), n_bands).map(|(values, _)| values))
        .collect::<Result<Vec<_>>>()?;

    Ok(BandStructure {
        kpath: kpath.iter().map(|k| [k.x, k.y, k.z]).collect(),
        eigenvalues,
        n_bands,
        fermi_level: scfres.fermi_level,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DensityOfStates {
    pub energies: Vec<f64>,
    /// States per Hartree per cell, both spins
    pub dos: Vec<f64>,
    pub width: f64,
    pub fermi_level: f64,
}

pub const DEFAULT_DOS_POINTS: usize = 401;
pub const DEFAULT_DOS_WIDTH: f64 = 0.01;

/// Gaussian-broadened density of states of the SCF eigenvalues.
pub fn compute_dos(
    scfres: &ScfResult,
    n_points: usize,
    width: f64,
    emin: Option<f64>,
    emax: Option<f64>,
) -> Result<DensityOfStates> {
    if n_points < 2 {
        return Err(JobError::Solver("a DOS needs at least two energies".to_string()));
    }
    if !(width > 0.0) {
        return Err(JobError::Solver("the DOS broadening must be positive".to_string()));
    }
    let all = scfres.eigenvalues.iter().flatten().copied();
    let emin = emin.unwrap_or_else(|| all.clone().fold(f64::INFINITY, f64::min) - 5.0 * width);
    let emax = emax.unwrap_or_else(|| all.fold(f64::NEG_INFINITY, f64::max) + 5.0 * width);
    if !(emax > emin) {
        return Err(JobError::Solver(format!("empty DOS window [{emin}, {emax}]")));
    }

    let step = (emax - emin) / (n_points - 1) as f64;
    let energies: Vec<f64> = (0..n_points).map(|i| emin + i as f64 * step).collect();
    let norm = 1.0 / (width * (2.0 * PI).sqrt());
    let kpoints = scfres.basis.kpoints();
    let dos = energies
        .iter()
        .map(|e| {
            kpoints
                .iter()
                .zip(&scfres.eigenvalues)
                .map(|(k, values)| {
                    k.weight
                        * values
                            .iter()
                            .map(|eps| {
                                let x = (e - eps) / width;
                                2.0 * norm * (-0.5 * x * x).exp()
                            })
                            .sum::<f64>()
                })
                .sum()
        })
        .collect();

    Ok(DensityOfStates {
        energies,
        dos,
        width,
        fermi_level: scfres.fermi_level,
    })
}

pub fn energy_decomposition(scfres: &ScfResult) -> Energies {
    scfres.energies
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pw::scf::tests::converged_helium;

    #[test]
    fn bands_at_gamma_reproduce_the_scf_eigenvalue() {
        let scfres = converged_helium();
        let bands = compute_bands(&scfres, &[Vector3::zeros(), Vector3::new(0.5, 0.0, 0.0)], None).unwrap();
        assert_eq!(bands.n_bands, 4);
        assert_eq!(bands.eigenvalues.len(), 2);
        assert!((bands.eigenvalues[0][0] - scfres.eigenvalues[0][0]).abs() < 1e-4);
        assert!(bands.eigenvalues.iter().all(|v| v.windows(2).all(|w| w[0] <= w[1])));
    }

    #[test]
    fn dos_integrates_to_the_band_count() {
        let scfres = converged_helium();
        let dos = compute_dos(&scfres, 2001, 0.02, None, None).unwrap();
        let step = dos.energies[1] - dos.energies[0];
        let integral: f64 = dos.dos.iter().sum::<f64>() * step;
        assert!((integral - 2.0 * scfres.n_bands() as f64).abs() < 1e-3);
    }

    #[test]
    fn dos_rejects_a_single_point() {
        let scfres = converged_helium();
        assert!(compute_dos(&scfres, 1, 0.01, None, None).is_err());
    }
}
