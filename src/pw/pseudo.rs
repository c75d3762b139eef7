use crate::error::{JobError, Result};
use crate::kwargs::Kwargs;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

pub const DEFAULT_RLOC: f64 = 0.5;

/// Width of the atomic Gaussians used for the initial density guess, in bohr.
const GUESS_WIDTH: f64 = 1.0;

/// A local Gaussian-screened Coulomb pseudopotential.
///
/// The identifier is kept as given; only its `-q<N>` suffix is interpreted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pseudopotential {
    pub identifier: String,
    pub valence: f64,
    pub rloc: f64,
}

impl Pseudopotential {
    pub fn new(identifier: &str, atomic_number: u32, mut kwargs: Kwargs) -> Result<Self> {
        let rloc = kwargs.take_or("rloc", DEFAULT_RLOC)?;
        if !(rloc > 0.0) {
            return Err(JobError::config(kwargs.key_path("rloc"), "must be positive"));
        }
        kwargs.finish()?;

        let valence = valence_from_identifier(identifier).unwrap_or(f64::from(atomic_number));
        Ok(Pseudopotential {
            identifier: identifier.to_string(),
            valence,
            rloc,
        })
    }

    /// Fourier transform of the local potential (without the 1/Ω factor).
    ///
    /// v(q) = -4πZ/q² exp(-q² rloc²/2); the divergent part of the q → 0 limit
    /// is dropped, which leaves 2πZ rloc².
    pub fn local_fourier(&self, q: f64) -> f64 {
        let z = self.valence;
        if q < 1e-10 {
            2.0 * PI * z * self.rloc * self.rloc
        } else {
            -4.0 * PI * z / (q * q) * (-0.5 * q * q * self.rloc * self.rloc).exp()
        }
    }

    /// Fourier transform of a Gaussian holding `valence` electrons.
    pub fn guess_density_fourier(&self, q: f64) -> f64 {
        self.valence * (-0.5 * q * q * GUESS_WIDTH * GUESS_WIDTH).exp()
    }
}

/// `hgh/lda/si-q4` -> 4
fn valence_from_identifier(identifier: &str) -> Option<f64> {
    let name = identifier.rsplit('/').next().unwrap_or(identifier);
    let name = name.split('.').next().unwrap_or(name);
    let (_, suffix) = name.rsplit_once("-q")?;
    suffix.parse::<u32>().ok().map(f64::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kwargs::{resolve, Interpolation};
    use serde_json::json;

    fn kwargs(value: serde_json::Value) -> Kwargs {
        resolve(
            "pseudopotential_kwargs",
            value.as_object().unwrap(),
            &Interpolation::new(),
        )
        .unwrap()
    }

    #[test]
    fn valence_comes_from_the_suffix() {
        let pseudo = Pseudopotential::new("hgh/lda/si-q4", 14, kwargs(json!({}))).unwrap();
        assert_eq!(pseudo.valence, 4.0);
        assert_eq!(pseudo.rloc, DEFAULT_RLOC);

        let pseudo = Pseudopotential::new("hgh/pbe/c-q4.hgh", 6, kwargs(json!({}))).unwrap();
        assert_eq!(pseudo.valence, 4.0);
    }

    #[test]
    fn valence_defaults_to_atomic_number() {
        let pseudo = Pseudopotential::new("he.upf", 2, kwargs(json!({"rloc": 0.3}))).unwrap();
        assert_eq!(pseudo.valence, 2.0);
        assert_eq!(pseudo.rloc, 0.3);
    }

    #[test]
    fn unknown_kwargs_are_rejected() {
        let err = Pseudopotential::new("he-q2", 2, kwargs(json!({"rcut": 1.0}))).unwrap_err();
        assert!(matches!(err, JobError::Config { ref key, .. } if key == "pseudopotential_kwargs.rcut"));
    }

    #[test]
    fn local_potential_is_attractive_away_from_zero() {
        let pseudo = Pseudopotential::new("he-q2", 2, kwargs(json!({}))).unwrap();
        assert!(pseudo.local_fourier(1.0) < 0.0);
        assert!(pseudo.local_fourier(0.0) > 0.0);
        assert_eq!(pseudo.guess_density_fourier(0.0), 2.0);
    }
}
