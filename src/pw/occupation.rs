use super::basis::Kpoint;
use super::model::{Model, Smearing};
use crate::error::{JobError, Result};
use std::f64::consts::PI;

/// Occupation numbers (0..=2 per band), the Fermi level and the -TS term.
#[derive(Debug, Clone)]
pub struct Occupation {
    pub occupation: Vec<Vec<f64>>,
    pub fermi_level: f64,
    pub entropy_term: f64,
}

impl Smearing {
    /// Occupation of a single spin orbital at x = (ε - εF) / T.
    fn occupation(&self, x: f64) -> f64 {
        match self {
            Smearing::None => {
                if x <= 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            Smearing::FermiDirac => 1.0 / (1.0 + x.exp()),
            Smearing::Gaussian => 0.5 * libm::erfc(x),
        }
    }

    fn entropy(&self, x: f64) -> f64 {
        match self {
            Smearing::None => 0.0,
            Smearing::FermiDirac => {
                let f = self.occupation(x);
                if f <= 0.0 || f >= 1.0 {
                    0.0
                } else {
                    -(f * f.ln() + (1.0 - f) * (1.0 - f).ln())
                }
            }
            Smearing::Gaussian => (-x * x).exp() / (2.0 * PI.sqrt()),
        }
    }
}

pub fn compute_occupation(model: &Model, kpoints: &[Kpoint], eigenvalues: &[Vec<f64>]) -> Result<Occupation> {
    if model.temperature > 0.0 {
        smeared(model, kpoints, eigenvalues)
    } else {
        aufbau(model, eigenvalues)
    }
}

fn aufbau(model: &Model, eigenvalues: &[Vec<f64>]) -> Result<Occupation> {
    let n_occupied = model.n_occupied_bands();
    let mut fermi_level = f64::NEG_INFINITY;
    let mut occupation = Vec::with_capacity(eigenvalues.len());
    for values in eigenvalues {
        if values.len() < n_occupied {
            return Err(JobError::Solver(format!(
                "{} bands cannot hold {} electrons",
                values.len(),
                model.n_electrons
            )));
        }
        fermi_level = fermi_level.max(values[n_occupied - 1]);
        occupation.push((0..values.len()).map(|n| if n < n_occupied { 2.0 } else { 0.0 }).collect());
    }
    Ok(Occupation {
        occupation,
        fermi_level,
        entropy_term: 0.0,
    })
}

fn smeared(model: &Model, kpoints: &[Kpoint], eigenvalues: &[Vec<f64>]) -> Result<Occupation> {
    let temperature = model.temperature;
    let smearing = model.smearing;
    let electrons_at = |mu: f64| -> f64 {
        kpoints
            .iter()
            .zip(eigenvalues)
            .map(|(k, values)| {
                k.weight
                    * values
                        .iter()
                        .map(|e| 2.0 * smearing.occupation((e - mu) / temperature))
                        .sum::<f64>()
            })
            .sum()
    };

    let all = eigenvalues.iter().flatten().copied();
    let lowest = all.clone().fold(f64::INFINITY, f64::min);
    let highest = all.fold(f64::NEG_INFINITY, f64::max);
    let mut lo = lowest - 20.0 * temperature - 1.0;
    let mut hi = highest + 20.0 * temperature + 1.0;
    if electrons_at(hi) < model.n_electrons - 1e-8 {
        return Err(JobError::Solver(format!(
            "not enough bands to hold {} electrons",
            model.n_electrons
        )));
    }
    for _ in 0..200 {
        let mid = 0.5 * (lo + hi);
        if electrons_at(mid) < model.n_electrons {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    let fermi_level = 0.5 * (lo + hi);

    let occupation = eigenvalues
        .iter()
        .map(|values| {
            values
                .iter()
                .map(|e| 2.0 * smearing.occupation((e - fermi_level) / temperature))
                .collect()
        })
        .collect();
    let entropy: f64 = kpoints
        .iter()
        .zip(eigenvalues)
        .map(|(k, values)| {
            k.weight
                * values
                    .iter()
                    .map(|e| 2.0 * smearing.entropy((e - fermi_level) / temperature))
                    .sum::<f64>()
        })
        .sum();

    Ok(Occupation {
        occupation,
        fermi_level,
        entropy_term: -temperature * entropy,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pw::model::tests::{helium_system, kwargs};
    use crate::pw::xc::Xc;
    use nalgebra::Vector3;
    use serde_json::json;

    fn model(extra: serde_json::Value) -> Model {
        Model::new(helium_system(6.0), Xc::default(), kwargs("model_kwargs", extra)).unwrap()
    }

    fn gamma() -> Vec<Kpoint> {
        vec![Kpoint {
            coordinate: Vector3::zeros(),
            weight: 1.0,
        }]
    }

    #[test]
    fn aufbau_fills_the_lowest_bands() {
        let occ = compute_occupation(&model(json!({})), &gamma(), &[vec![-1.0, 0.5, 0.7]]).unwrap();
        assert_eq!(occ.occupation, vec![vec![2.0, 0.0, 0.0]]);
        assert_eq!(occ.fermi_level, -1.0);
        assert_eq!(occ.entropy_term, 0.0);
    }

    #[test]
    fn smeared_occupations_hold_the_electron_count() {
        for smearing in ["fermi_dirac", "gaussian"] {
            let model = model(json!({"temperature": 0.05, "smearing": smearing}));
            let occ = compute_occupation(&model, &gamma(), &[vec![-1.0, -0.98, 0.3, 0.4]]).unwrap();
            let total: f64 = occ.occupation[0].iter().sum();
            assert!((total - 2.0).abs() < 1e-8, "{smearing}: {total}");
            assert!(occ.fermi_level > -1.0 && occ.fermi_level < 0.3);
            assert!(occ.entropy_term <= 0.0);
        }
    }

    #[test]
    fn too_few_bands_is_a_solver_error() {
        let model = model(json!({"n_electrons": 6}));
        let err = compute_occupation(&model, &gamma(), &[vec![-1.0, 0.0]]).unwrap_err();
        assert!(matches!(err, JobError::Solver(_)));
    }
}
