use super::pseudo::Pseudopotential;
use super::xc::Xc;
use crate::error::{JobError, Result};
use crate::kwargs::Kwargs;
use crate::units::Bohr;
use nalgebra::{Matrix3, Vector3};
use periodic_table_on_an_enum::Element;
use std::sync::Arc;
use tracing::warn;

#[derive(Clone)]
pub struct Atom {
    pub element: Element,
    pub position: Bohr<Vector3<f64>>,
    pub pseudopotential: Pseudopotential,
    pub magnetic_moment: f64,
}

impl Atom {
    pub fn symbol(&self) -> &str {
        self.element.get_symbol()
    }
}

/// Atoms in a periodic cell. Lattice vectors are the columns of `lattice`.
#[derive(Clone)]
pub struct PeriodicSystem {
    lattice: Matrix3<f64>,
    inverse_lattice: Matrix3<f64>,
    atoms: Vec<Atom>,
}

impl PeriodicSystem {
    pub fn new(bounding_box: [Bohr<Vector3<f64>>; 3], atoms: Vec<Atom>) -> Result<Self> {
        let [a, b, c] = bounding_box.map(Bohr::into_inner);
        let lattice = Matrix3::from_columns(&[a, b, c]);
        let inverse_lattice = lattice
            .try_inverse()
            .filter(|_| lattice.determinant().abs() > 1e-8)
            .ok_or_else(|| {
                JobError::config(
                    "periodic_system.bounding_box",
                    "lattice vectors are linearly dependent",
                )
            })?;
        Ok(PeriodicSystem {
            lattice,
            inverse_lattice,
            atoms,
        })
    }

    pub fn lattice(&self) -> &Matrix3<f64> {
        &self.lattice
    }

    /// Reciprocal lattice vectors as columns, including the 2π.
    pub fn reciprocal_lattice(&self) -> Matrix3<f64> {
        2.0 * std::f64::consts::PI * self.inverse_lattice.transpose()
    }

    pub fn volume(&self) -> f64 {
        self.lattice.determinant().abs()
    }

    pub fn atoms(&self) -> &[Atom] {
        &self.atoms
    }

    pub fn fractional(&self, position: &Vector3<f64>) -> Vector3<f64> {
        self.inverse_lattice * position
    }

    pub fn n_valence_electrons(&self) -> f64 {
        self.atoms.iter().map(|a| a.pseudopotential.valence).sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Smearing {
    None,
    FermiDirac,
    Gaussian,
}

impl Smearing {
    fn from_name(path: &str, name: &str) -> Result<Self> {
        match name {
            "none" | "None" => Ok(Smearing::None),
            "fermi_dirac" | "FermiDirac" => Ok(Smearing::FermiDirac),
            "gaussian" | "Gaussian" => Ok(Smearing::Gaussian),
            other => Err(JobError::config(path, format!("unknown smearing '{other}'"))),
        }
    }
}

/// Physical model: the system, the functional and how states are occupied.
#[derive(Clone)]
pub struct Model {
    pub system: Arc<PeriodicSystem>,
    pub xc: Xc,
    pub temperature: f64,
    pub smearing: Smearing,
    pub n_electrons: f64,
}

impl Model {
    pub fn new(system: Arc<PeriodicSystem>, xc: Xc, mut kwargs: Kwargs) -> Result<Self> {
        let temperature: f64 = kwargs.take_or("temperature", 0.0)?;
        if !(temperature >= 0.0) {
            return Err(JobError::config(
                kwargs.key_path("temperature"),
                "must not be negative",
            ));
        }

        let smearing_path = kwargs.key_path("smearing");
        let smearing = match kwargs.take_as::<String>("smearing")? {
            Some(name) => Smearing::from_name(&smearing_path, &name)?,
            None if temperature > 0.0 => Smearing::FermiDirac,
            None => Smearing::None,
        };
        if temperature > 0.0 && smearing == Smearing::None {
            return Err(JobError::config(
                smearing_path,
                "a positive temperature needs a smearing function",
            ));
        }

        let n_electrons = match kwargs.take_as::<f64>("n_electrons")? {
            Some(n) => n,
            None => system.n_valence_electrons(),
        };
        if !(n_electrons > 0.0) {
            return Err(JobError::config(
                kwargs.key_path("n_electrons"),
                "the model holds no electrons",
            ));
        }

        match kwargs.take_as::<String>("spin_polarization")?.as_deref() {
            None | Some("none") => {}
            Some(other) => {
                return Err(JobError::NotImplemented(format!(
                    "spin polarization '{other}'"
                )))
            }
        }
        let path = kwargs.path().to_string();
        kwargs.finish()?;

        if temperature == 0.0 && (n_electrons / 2.0).fract() != 0.0 {
            return Err(JobError::config(
                path,
                "an odd or fractional electron count needs a positive temperature",
            ));
        }
        if system.atoms().iter().any(|a| a.magnetic_moment != 0.0) {
            warn!("Magnetic moments are ignored: the model is spin-unpolarized");
        }

        Ok(Model {
            system,
            xc,
            temperature,
            smearing,
            n_electrons,
        })
    }

    /// Bands that hold electrons at zero temperature.
    pub fn n_occupied_bands(&self) -> usize {
        (self.n_electrons / 2.0).ceil() as usize
    }

    /// Bands diagonalized per k-point unless the caller asks otherwise.
    pub fn default_n_bands(&self) -> usize {
        let n_occupied = self.n_occupied_bands().max(1);
        if self.temperature > 0.0 {
            n_occupied + (n_occupied / 5).max(2)
        } else {
            n_occupied
        }
    }
}
