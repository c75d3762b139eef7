use super::basis::{Miller, PlaneWaveBasis};
use super::scf::{Energies, ScfResult, ScfState};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Orbitals of one k-point, coefficients stored column by column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrbitalBlock {
    pub kpoint: [f64; 3],
    pub eigenvalues: Vec<f64>,
    pub occupation: Vec<f64>,
    pub n_plane_waves: usize,
    pub coefficients: Vec<f64>,
}

/// Solver state persisted between runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScfCheckpoint {
    pub n_iter: usize,
    pub converged: bool,
    pub norm_delta: f64,
    pub energies: Energies,
    pub ecut: f64,
    pub kgrid: [usize; 3],
    pub density_gvectors: Vec<Miller>,
    pub density: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orbitals: Option<Vec<OrbitalBlock>>,
}

impl ScfCheckpoint {
    pub fn from_state(basis: &PlaneWaveBasis, state: &ScfState) -> Self {
        ScfCheckpoint {
            n_iter: state.iteration,
            converged: state.converged,
            norm_delta: state.norm_delta,
            energies: *state.energies,
            ecut: basis.ecut(),
            kgrid: basis.kgrid(),
            density_gvectors: basis.density_gvectors().to_vec(),
            density: state.density.to_vec(),
            orbitals: None,
        }
    }

    pub fn from_result(scfres: &ScfResult, save_orbitals: bool) -> Self {
        let basis = &scfres.basis;
        let orbitals = save_orbitals.then(|| {
            basis
                .kpoints()
                .iter()
                .zip(&scfres.orbitals)
                .zip(scfres.eigenvalues.iter().zip(&scfres.occupation))
                .map(|((k, psi), (eigenvalues, occupation))| OrbitalBlock {
                    kpoint: [k.coordinate.x, k.coordinate.y, k.coordinate.z],
                    eigenvalues: eigenvalues.clone(),
                    occupation: occupation.clone(),
                    n_plane_waves: psi.nrows(),
                    coefficients: psi.as_slice().to_vec(),
                })
                .collect()
        });
        ScfCheckpoint {
            n_iter: scfres.n_iter,
            converged: scfres.converged,
            norm_delta: scfres.norm_delta,
            energies: scfres.energies,
            ecut: basis.ecut(),
            kgrid: basis.kgrid(),
            density_gvectors: basis.density_gvectors().to_vec(),
            density: scfres.density.clone(),
            orbitals,
        }
    }

    /// The stored density if it was expanded in the same G vectors as `basis`.
    pub fn density_for(&self, basis: &PlaneWaveBasis) -> Option<Vec<f64>> {
        if self.density_gvectors.as_slice() == basis.density_gvectors()
            && self.density.len() == self.density_gvectors.len()
        {
            Some(self.density.clone())
        } else {
            warn!(
                "Checkpoint density uses {} G vectors, the basis {}; starting from the guess",
                self.density_gvectors.len(),
                basis.density_gvectors().len()
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pw::basis::tests::helium_basis;
    use crate::pw::scf::tests::converged_helium;

    #[test]
    fn density_is_reused_only_for_the_same_basis() {
        let scfres = converged_helium();
        let checkpoint = ScfCheckpoint::from_result(&scfres, false);
        assert!(checkpoint.orbitals.is_none());
        assert_eq!(checkpoint.density_for(&scfres.basis), Some(scfres.density.clone()));
        assert_eq!(checkpoint.density_for(&helium_basis(2.0)), None);
    }

    #[test]
    fn orbitals_are_saved_on_request() {
        let scfres = converged_helium();
        let checkpoint = ScfCheckpoint::from_result(&scfres, true);
        let blocks = checkpoint.orbitals.as_ref().unwrap();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].coefficients.len(), blocks[0].n_plane_waves * scfres.n_bands());

        let text = serde_json::to_string(&checkpoint).unwrap();
        let back: ScfCheckpoint = serde_json::from_str(&text).unwrap();
        assert_eq!(back.converged, checkpoint.converged);
        assert_eq!(back.density_gvectors, checkpoint.density_gvectors);
    }
}
