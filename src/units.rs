use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// A length (or vector of lengths) in atomic units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bohr<T>(pub T);

impl<T> Bohr<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl Bohr<Vector3<f64>> {
    pub fn zeros() -> Self {
        Bohr(Vector3::zeros())
    }
}

pub const HARTREE_TO_EV: f64 = 27.211_386_245_988;
