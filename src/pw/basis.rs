use super::model::Model;
use crate::error::{JobError, Result};
use crate::kwargs::Kwargs;
use nalgebra::{Matrix3, Vector3};
use std::collections::HashMap;
use std::f64::consts::PI;
use std::sync::Arc;
use tracing::debug;

/// Default maximal spacing between k-points, in bohr⁻¹.
pub const DEFAULT_KSPACING: f64 = 2.0 * PI * 0.022;

/// Integer coordinates of a reciprocal lattice vector.
pub type Miller = [i32; 3];

#[derive(Debug, Clone, PartialEq)]
pub struct Kpoint {
    /// Fractional coordinates in the reciprocal lattice
    pub coordinate: Vector3<f64>,
    pub weight: f64,
}

/// Plane waves below a kinetic energy cutoff on a Monkhorst–Pack k-grid.
///
/// Orbitals are expanded in the G vectors with ½|G|² ≤ Ecut; densities and
/// potentials in those with ½|G|² ≤ 4 Ecut, which contains every difference of
/// two orbital G vectors.
pub struct PlaneWaveBasis {
    model: Arc<Model>,
    ecut: f64,
    kgrid: [usize; 3],
    kshift: [f64; 3],
    kpoints: Vec<Kpoint>,
    reciprocal: Matrix3<f64>,
    orbital_gvectors: Vec<Miller>,
    density_gvectors: Vec<Miller>,
    density_lookup: HashMap<Miller, usize>,
    /// `difference[i * n + j]` is the density index of G_i - G_j
    difference: Vec<Option<usize>>,
    grid_size: [usize; 3],
}

impl PlaneWaveBasis {
    pub fn new(model: Arc<Model>, mut kwargs: Kwargs) -> Result<Self> {
        let ecut: f64 = kwargs.require("Ecut")?;
        if !(ecut > 0.0) {
            return Err(JobError::config(kwargs.key_path("Ecut"), "must be positive"));
        }

        let reciprocal = model.system.reciprocal_lattice();
        let kgrid = match kwargs.take_as::<[usize; 3]>("kgrid")? {
            Some(kgrid) if kgrid.iter().any(|&n| n == 0) => {
                return Err(JobError::config(
                    kwargs.key_path("kgrid"),
                    "every direction needs at least one k-point",
                ))
            }
            Some(kgrid) => kgrid,
            None => kgrid_from_maximal_spacing(&reciprocal, DEFAULT_KSPACING),
        };
        let kshift: [f64; 3] = kwargs.take_or("kshift", [0.0; 3])?;
        if kshift.iter().any(|s| !(0.0..1.0).contains(s)) {
            return Err(JobError::config(
                kwargs.key_path("kshift"),
                "shifts must lie in [0, 1)",
            ));
        }
        kwargs.finish()?;

        let lattice = *model.system.lattice();
        let orbital_gvectors = enumerate_gvectors(&lattice, &reciprocal, ecut);
        let density_gvectors = enumerate_gvectors(&lattice, &reciprocal, 4.0 * ecut);
        let density_lookup: HashMap<Miller, usize> = density_gvectors
            .iter()
            .enumerate()
            .map(|(i, m)| (*m, i))
            .collect();
        let difference = orbital_gvectors
            .iter()
            .flat_map(|gi| {
                orbital_gvectors
                    .iter()
                    .map(|gj| density_lookup.get(&sub(gi, gj)).copied())
                    .collect::<Vec<_>>()
            })
            .collect();

        let mut grid_size = [1; 3];
        for (axis, size) in grid_size.iter_mut().enumerate() {
            let extent = density_gvectors
                .iter()
                .map(|m| m[axis].unsigned_abs() as usize)
                .max()
                .unwrap_or(0);
            *size = 2 * extent + 1;
        }

        let kpoints = monkhorst_pack(kgrid, kshift);
        debug!(
            "Plane-wave basis: Ecut = {ecut}, {} orbital / {} density G vectors, {} k-points, grid {:?}",
            orbital_gvectors.len(),
            density_gvectors.len(),
            kpoints.len(),
            grid_size
        );

        Ok(PlaneWaveBasis {
            model,
            ecut,
            kgrid,
            kshift,
            kpoints,
            reciprocal,
            orbital_gvectors,
            density_gvectors,
            density_lookup,
            difference,
            grid_size,
        })
    }

    pub fn model(&self) -> &Arc<Model> {
        &self.model
    }

    pub fn ecut(&self) -> f64 {
        self.ecut
    }

    pub fn kgrid(&self) -> [usize; 3] {
        self.kgrid
    }

    pub fn kshift(&self) -> [f64; 3] {
        self.kshift
    }

    pub fn kpoints(&self) -> &[Kpoint] {
        &self.kpoints
    }

    pub fn orbital_gvectors(&self) -> &[Miller] {
        &self.orbital_gvectors
    }

    pub fn density_gvectors(&self) -> &[Miller] {
        &self.density_gvectors
    }

    pub fn n_plane_waves(&self) -> usize {
        self.orbital_gvectors.len()
    }

    pub fn grid_size(&self) -> [usize; 3] {
        self.grid_size
    }

    pub fn density_index(&self, m: &Miller) -> Option<usize> {
        self.density_lookup.get(m).copied()
    }

    /// Density index of G_i - G_j for two orbital G vectors.
    pub fn difference_index(&self, i: usize, j: usize) -> Option<usize> {
        self.difference[i * self.orbital_gvectors.len() + j]
    }

    pub fn cartesian(&self, fractional: &Vector3<f64>) -> Vector3<f64> {
        self.reciprocal * fractional
    }

    pub fn gvector(&self, m: &Miller) -> Vector3<f64> {
        self.reciprocal * miller_vector(m)
    }
}

pub(crate) fn miller_vector(m: &Miller) -> Vector3<f64> {
    Vector3::new(f64::from(m[0]), f64::from(m[1]), f64::from(m[2]))
}

fn sub(a: &Miller, b: &Miller) -> Miller {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

/// All G = B m with ½|G|² ≤ ecut, sorted by length.
fn enumerate_gvectors(lattice: &Matrix3<f64>, reciprocal: &Matrix3<f64>, ecut: f64) -> Vec<Miller> {
    let gmax = (2.0 * ecut).sqrt();
    // |m_i| = |G·a_i| / 2π ≤ gmax |a_i| / 2π
    let bounds: Vec<i32> = (0..3)
        .map(|i| (gmax * lattice.column(i).norm() / (2.0 * PI)).ceil() as i32)
        .collect();

    let mut gvectors = Vec::new();
    for m0 in -bounds[0]..=bounds[0] {
        for m1 in -bounds[1]..=bounds[1] {
            for m2 in -bounds[2]..=bounds[2] {
                let m = [m0, m1, m2];
                let g = reciprocal * miller_vector(&m);
                if 0.5 * g.norm_squared() <= ecut {
                    gvectors.push((g.norm_squared(), m));
                }
            }
        }
    }
    gvectors.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
    gvectors.into_iter().map(|(_, m)| m).collect()
}

pub fn kgrid_from_maximal_spacing(reciprocal: &Matrix3<f64>, spacing: f64) -> [usize; 3] {
    let mut kgrid = [1; 3];
    for (i, n) in kgrid.iter_mut().enumerate() {
        *n = ((reciprocal.column(i).norm() / spacing).ceil() as usize).max(1);
    }
    kgrid
}

fn monkhorst_pack(kgrid: [usize; 3], kshift: [f64; 3]) -> Vec<Kpoint> {
    let total = kgrid.iter().product::<usize>();
    let weight = 1.0 / total as f64;
    let fold = |j: usize, axis: usize| {
        let c = (j as f64 + kshift[axis]) / kgrid[axis] as f64;
        if c > 0.5 {
            c - 1.0
        } else {
            c
        }
    };

    let mut kpoints = Vec::with_capacity(total);
    for i in 0..kgrid[0] {
        for j in 0..kgrid[1] {
            for k in 0..kgrid[2] {
                kpoints.push(Kpoint {
                    coordinate: Vector3::new(fold(i, 0), fold(j, 1), fold(k, 2)),
                    weight,
                });
            }
        }
    }
    kpoints
}
