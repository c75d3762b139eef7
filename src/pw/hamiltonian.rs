use super::basis::{miller_vector, PlaneWaveBasis};
use super::grid::{to_fourier, to_real_space};
use crate::error::{JobError, Result};
use nalgebra::{DMatrix, SymmetricEigen, Vector3};
use std::cmp::Ordering;
use std::f64::consts::PI;

/// Potentials on the density G vectors.
#[derive(Debug, Clone)]
pub struct EffectivePotential {
    pub local: Vec<f64>,
    pub hartree: Vec<f64>,
    pub xc: Vec<f64>,
}

impl EffectivePotential {
    pub fn build(basis: &PlaneWaveBasis, points: &[Vector3<f64>], density: &[f64]) -> Self {
        Self::with_local(local_potential(basis), basis, points, density)
    }

    pub fn with_local(
        local: Vec<f64>,
        basis: &PlaneWaveBasis,
        points: &[Vector3<f64>],
        density: &[f64],
    ) -> Self {
        let hartree = hartree_potential(basis, density);
        let xc = xc_terms(basis, points, density).potential;
        EffectivePotential { local, hartree, xc }
    }

    pub fn total(&self) -> Vec<f64> {
        self.local
            .iter()
            .zip(&self.hartree)
            .zip(&self.xc)
            .map(|((l, h), x)| l + h + x)
            .collect()
    }
}

/// Sum of the atomic local pseudopotentials, V(G) = Σ_a v_a(|G|) cos(G·τ_a) / Ω.
pub fn local_potential(basis: &PlaneWaveBasis) -> Vec<f64> {
    let system = &basis.model().system;
    let volume = system.volume();
    let positions: Vec<Vector3<f64>> = system
        .atoms()
        .iter()
        .map(|atom| system.fractional(&atom.position.0))
        .collect();

    basis
        .density_gvectors()
        .iter()
        .map(|m| {
            let q = basis.gvector(m).norm();
            let m = miller_vector(m);
            system
                .atoms()
                .iter()
                .zip(&positions)
                .map(|(atom, tau)| atom.pseudopotential.local_fourier(q) * (2.0 * PI * m.dot(tau)).cos())
                .sum::<f64>()
                / volume
        })
        .collect()
}

pub fn hartree_potential(basis: &PlaneWaveBasis, density: &[f64]) -> Vec<f64> {
    basis
        .density_gvectors()
        .iter()
        .zip(density)
        .map(|(m, rho)| {
            let g2 = basis.gvector(m).norm_squared();
            if g2 < 1e-12 {
                0.0
            } else {
                4.0 * PI * rho / g2
            }
        })
        .collect()
}

pub struct XcTerms {
    pub energy: f64,
    pub potential: Vec<f64>,
}

pub fn xc_terms(basis: &PlaneWaveBasis, points: &[Vector3<f64>], density: &[f64]) -> XcTerms {
    let xc = &basis.model().xc;
    if xc.is_empty() {
        return XcTerms {
            energy: 0.0,
            potential: vec![0.0; density.len()],
        };
    }
    let rho = to_real_space(basis, points, density);
    let (energy_density, potential): (Vec<f64>, Vec<f64>) = rho.iter().map(|&r| xc.evaluate(r)).unzip();
    let volume = basis.model().system.volume();
    XcTerms {
        energy: volume * energy_density.iter().sum::<f64>() / points.len() as f64,
        potential: to_fourier(basis, points, &potential),
    }
}

/// Dense Hamiltonian at fractional k-point `k` in the orbital plane waves.
pub fn hamiltonian(basis: &PlaneWaveBasis, k: &Vector3<f64>, potential: &[f64]) -> DMatrix<f64> {
    let gvectors = basis.orbital_gvectors();
    let k = basis.cartesian(k);
    DMatrix::from_fn(gvectors.len(), gvectors.len(), |i, j| {
        let mut h = basis
            .difference_index(i, j)
            .map(|index| potential[index])
            .unwrap_or(0.0);
        if i == j {
            h += 0.5 * (k + basis.gvector(&gvectors[i])).norm_squared();
        }
        h
    })
}

/// Fixes the sign of each eigenvector so that its largest component is positive.
pub fn align_eigenvectors(mut eigvecs: DMatrix<f64>) -> DMatrix<f64> {
    for j in 0..eigvecs.ncols() {
        let max_val = eigvecs
            .column(j)
            .iter()
            .copied()
            .max_by(|a, b| a.abs().partial_cmp(&b.abs()).unwrap_or(Ordering::Less))
            .unwrap_or(0.0);
        if max_val < 0.0 {
            for i in 0..eigvecs.nrows() {
                eigvecs[(i, j)] = -eigvecs[(i, j)];
            }
        }
    }
    eigvecs
}

/// The `n_bands` lowest eigenpairs, eigenvalues ascending.
pub fn diagonalize(hamiltonian: DMatrix<f64>, n_bands: usize) -> Result<(Vec<f64>, DMatrix<f64>)> {
    let n = hamiltonian.nrows();
    if n_bands > n {
        return Err(JobError::Solver(format!(
            "{n_bands} bands requested but the basis has only {n} plane waves; increase Ecut"
        )));
    }
    let eigen = SymmetricEigen::new(hamiltonian);
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| eigen.eigenvalues[a].total_cmp(&eigen.eigenvalues[b]));
    order.truncate(n_bands);

    let values = order.iter().map(|&i| eigen.eigenvalues[i]).collect();
    let vectors = DMatrix::from_fn(n, n_bands, |i, j| eigen.eigenvectors[(i, order[j])]);
    Ok((values, align_eigenvectors(vectors)))
}

/// ρ(G) = Σ_k w_k Σ_n f_nk Σ_G' c(G') c(G'+G) / Ω
pub fn compute_density(basis: &PlaneWaveBasis, orbitals: &[DMatrix<f64>], occupation: &[Vec<f64>]) -> Vec<f64> {
    let volume = basis.model().system.volume();
    let n_pw = basis.n_plane_waves();
    let mut density = vec![0.0; basis.density_gvectors().len()];

    for ((kpoint, psi), occ) in basis.kpoints().iter().zip(orbitals).zip(occupation) {
        for (band, &f) in occ.iter().enumerate() {
            if f < 1e-14 {
                continue;
            }
            let weight = kpoint.weight * f / volume;
            let c = psi.column(band);
            for j in 0..n_pw {
                for i in 0..n_pw {
                    if let Some(index) = basis.difference_index(i, j) {
                        density[index] += weight * c[i] * c[j];
                    }
                }
            }
        }
    }
    density
}

/// Σ_k w_k Σ_n f_nk Σ_G ½|k+G|² c²
pub fn kinetic_energy(basis: &PlaneWaveBasis, orbitals: &[DMatrix<f64>], occupation: &[Vec<f64>]) -> f64 {
    let gvectors = basis.orbital_gvectors();
    basis
        .kpoints()
        .iter()
        .zip(orbitals)
        .zip(occupation)
        .map(|((kpoint, psi), occ)| {
            let k = basis.cartesian(&kpoint.coordinate);
            let kinetic: Vec<f64> = gvectors
                .iter()
                .map(|m| 0.5 * (k + basis.gvector(m)).norm_squared())
                .collect();
            let per_band: f64 = occ
                .iter()
                .enumerate()
                .map(|(band, f)| {
                    f * psi
                        .column(band)
                        .iter()
                        .zip(&kinetic)
                        .map(|(c, t)| c * c * t)
                        .sum::<f64>()
                })
                .sum();
            kpoint.weight * per_band
        })
        .sum()
}

/// Ω Σ_G V(G) ρ(G)
pub fn potential_energy(basis: &PlaneWaveBasis, potential: &[f64], density: &[f64]) -> f64 {
    basis.model().system.volume() * potential.iter().zip(density).map(|(v, r)| v * r).sum::<f64>()
}

pub fn hartree_energy(basis: &PlaneWaveBasis, density: &[f64]) -> f64 {
    0.5 * potential_energy(basis, &hartree_potential(basis, density), density)
}

/// Superposition of atomic Gaussians, scaled to the model's electron count.
pub fn guess_density(basis: &PlaneWaveBasis) -> Vec<f64> {
    let model = basis.model();
    let system = &model.system;
    let volume = system.volume();
    let atomic_charge = system.n_valence_electrons();
    let positions: Vec<Vector3<f64>> = system
        .atoms()
        .iter()
        .map(|atom| system.fractional(&atom.position.0))
        .collect();

    basis
        .density_gvectors()
        .iter()
        .map(|m| {
            if atomic_charge <= 0.0 {
                return if *m == [0, 0, 0] { model.n_electrons / volume } else { 0.0 };
            }
            let q = basis.gvector(m).norm();
            let m = miller_vector(m);
            let rho: f64 = system
                .atoms()
                .iter()
                .zip(&positions)
                .map(|(atom, tau)| {
                    atom.pseudopotential.guess_density_fourier(q) * (2.0 * PI * m.dot(tau)).cos()
                })
                .sum();
            rho * model.n_electrons / atomic_charge / volume
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pw::basis::tests::helium_basis;

    #[test]
    fn hamiltonian_is_symmetric() {
        let basis = helium_basis(2.0);
        let density = guess_density(&basis);
        let points = crate::pw::grid::grid_points(&basis);
        let potential = EffectivePotential::build(&basis, &points, &density).total();
        let h = hamiltonian(&basis, &Vector3::new(0.1, 0.0, -0.2), &potential);
        assert!((&h - h.transpose()).norm() < 1e-12);
    }

    #[test]
    fn eigenvalues_come_out_sorted_and_vectors_normalized() {
        let basis = helium_basis(2.0);
        let potential = local_potential(&basis);
        let h = hamiltonian(&basis, &Vector3::zeros(), &potential);
        let (values, vectors) = diagonalize(h, 4).unwrap();
        assert!(values.windows(2).all(|w| w[0] <= w[1]));
        for j in 0..4 {
            assert!((vectors.column(j).norm() - 1.0).abs() < 1e-10);
        }
    }

    #[test]
    fn too_many_bands_is_a_solver_error() {
        let basis = helium_basis(1.0);
        let h = hamiltonian(&basis, &Vector3::zeros(), &local_potential(&basis));
        let err = diagonalize(h, basis.n_plane_waves() + 1).unwrap_err();
        assert!(matches!(err, JobError::Solver(_)));
    }

    #[test]
    fn densities_integrate_to_the_electron_count() {
        let basis = helium_basis(2.0);
        let volume = basis.model().system.volume();
        let guess = guess_density(&basis);
        assert!((guess[0] * volume - 2.0).abs() < 1e-12);

        let h = hamiltonian(&basis, &Vector3::zeros(), &local_potential(&basis));
        let (_, vectors) = diagonalize(h, 1).unwrap();
        let density = compute_density(&basis, &[vectors], &[vec![2.0]]);
        assert!((density[0] * volume - 2.0).abs() < 1e-10);
    }

    #[test]
    fn eigenvector_signs_are_fixed() {
        let m = DMatrix::from_row_slice(2, 2, &[-0.8, 0.6, 0.6, 0.8]);
        let aligned = align_eigenvectors(m);
        assert_eq!(aligned[(0, 0)], 0.8);
        assert_eq!(aligned[(1, 1)], 0.8);
    }
}
