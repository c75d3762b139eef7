//! Density mixing and convergence criteria, both selected by `$function` name.

use super::basis::PlaneWaveBasis;
use crate::error::{JobError, Result};
use crate::kwargs::{Directive, Interpolation};

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub enum Mixing {
    #[default]
    Simple,
    /// Damps long-wavelength charge sloshing by G² / (G² + kTF²).
    Kerker { k_tf: f64 },
}

impl Mixing {
    pub fn from_directive(directive: &Directive, interpolation: &Interpolation) -> Result<Self> {
        directive.ensure_no_options()?;
        let mut kwargs = directive.resolve_kwargs(interpolation)?;
        let mixing = match directive.function.as_str() {
            "SimpleMixing" => Mixing::Simple,
            "KerkerMixing" => {
                let k_tf: f64 = kwargs.take_or("kTF", 0.8)?;
                if !(k_tf > 0.0) {
                    return Err(JobError::config(kwargs.key_path("kTF"), "must be positive"));
                }
                Mixing::Kerker { k_tf }
            }
            other => return Err(JobError::unknown_function("mixing", other)),
        };
        kwargs.finish()?;
        Ok(mixing)
    }

    /// ρ_next = ρ_in + damping · P(ρ_out - ρ_in)
    pub fn mix(&self, basis: &PlaneWaveBasis, damping: f64, rho_in: &[f64], rho_out: &[f64]) -> Vec<f64> {
        basis
            .density_gvectors()
            .iter()
            .zip(rho_in.iter().zip(rho_out))
            .map(|(m, (i, o))| {
                let factor = match self {
                    Mixing::Simple => 1.0,
                    Mixing::Kerker { k_tf } => {
                        let g2 = basis.gvector(m).norm_squared();
                        if g2 < 1e-12 {
                            1.0
                        } else {
                            g2 / (g2 + k_tf * k_tf)
                        }
                    }
                };
                i + damping * factor * (o - i)
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Convergence {
    /// ‖ρ_out - ρ_in‖ below `tol`
    Density { tol: f64 },
    /// Total energy change between iterations below `tol`
    Energy { tol: f64 },
}

impl Convergence {
    /// `default_tol` applies when the criterion is given without its own `tol`.
    pub fn from_directive(directive: &Directive, interpolation: &Interpolation, default_tol: f64) -> Result<Self> {
        directive.ensure_no_options()?;
        let mut kwargs = directive.resolve_kwargs(interpolation)?;
        let tol: f64 = kwargs.take_or("tol", default_tol)?;
        if !(tol > 0.0) {
            return Err(JobError::config(kwargs.key_path("tol"), "must be positive"));
        }
        let criterion = match directive.function.as_str() {
            "ScfConvergenceDensity" => Convergence::Density { tol },
            "ScfConvergenceEnergy" => Convergence::Energy { tol },
            other => return Err(JobError::unknown_function("convergence criterion", other)),
        };
        kwargs.finish()?;
        Ok(criterion)
    }

    pub fn is_converged(&self, norm_delta: f64, energy: f64, previous_energy: Option<f64>) -> bool {
        match self {
            Convergence::Density { tol } => norm_delta < *tol,
            Convergence::Energy { tol } => previous_energy.is_some_and(|e| (energy - e).abs() < *tol),
        }
    }
}

/// L² norm of a density difference, ‖Δρ‖ = (Ω Σ_G Δρ(G)²)^½.
pub fn density_change(basis: &PlaneWaveBasis, rho_in: &[f64], rho_out: &[f64]) -> f64 {
    let volume = basis.model().system.volume();
    let sum: f64 = rho_in.iter().zip(rho_out).map(|(i, o)| (o - i) * (o - i)).sum();
    (volume * sum).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pw::basis::tests::helium_basis;
    use serde_json::json;

    fn directive(value: serde_json::Value) -> Directive {
        Directive::parse("scf.$kwargs.mixing", &value).unwrap()
    }

    #[test]
    fn mixing_is_chosen_by_name() {
        let interp = Interpolation::new();
        let simple = Mixing::from_directive(&directive(json!({"$function": "SimpleMixing"})), &interp);
        assert_eq!(simple.unwrap(), Mixing::Simple);

        let kerker = Mixing::from_directive(
            &directive(json!({"$function": "KerkerMixing", "$kwargs": {"kTF": 1.5}})),
            &interp,
        );
        assert_eq!(kerker.unwrap(), Mixing::Kerker { k_tf: 1.5 });

        let err = Mixing::from_directive(&directive(json!({"$function": "AndersonMixing"})), &interp)
            .unwrap_err();
        assert!(matches!(err, JobError::UnknownFunction { ref name, .. } if name == "AndersonMixing"));
    }

    #[test]
    fn kerker_keeps_the_charge() {
        let basis = helium_basis(1.0);
        let n = basis.density_gvectors().len();
        let rho_in = vec![0.01; n];
        let rho_out = vec![0.02; n];
        let mixed = Mixing::Kerker { k_tf: 1.0 }.mix(&basis, 0.5, &rho_in, &rho_out);
        assert!((mixed[0] - 0.015).abs() < 1e-15);
        // Long wavelengths move less than the undamped half step
        assert!(mixed[1] < 0.015);

        let simple = Mixing::Simple.mix(&basis, 0.5, &rho_in, &rho_out);
        assert!(simple.iter().all(|x| (x - 0.015).abs() < 1e-15));
    }

    #[test]
    fn energy_criterion_needs_two_iterations() {
        let criterion = Convergence::from_directive(
            &directive(json!({"$function": "ScfConvergenceEnergy", "$kwargs": {"tol": 1e-6}})),
            &Interpolation::new(),
            1e-3,
        )
        .unwrap();
        assert_eq!(criterion, Convergence::Energy { tol: 1e-6 });
        assert!(!criterion.is_converged(0.0, -2.0, None));
        assert!(criterion.is_converged(1.0, -2.0, Some(-2.0 + 1e-7)));
    }

    #[test]
    fn density_criterion_uses_the_default_tolerance() {
        let criterion = Convergence::from_directive(
            &directive(json!({"$function": "ScfConvergenceDensity"})),
            &Interpolation::new(),
            1e-4,
        )
        .unwrap();
        assert!(criterion.is_converged(5e-5, 0.0, None));
        assert!(!criterion.is_converged(5e-4, 0.0, None));
    }
}
