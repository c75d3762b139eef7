//! Local-density exchange-correlation functionals, unpolarized.
//!
//! - `lda_x`: Slater exchange
//! - `lda_c_pw`: Perdew–Wang 1992 correlation

use crate::error::{JobError, Result};
use crate::kwargs::{ArgValue, FromArg};
use std::f64::consts::PI;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum XcFunctional {
    /// Local-density approximation exchange only (Slater exchange)
    LdaX,
    /// Perdew–Wang parametrisation of the LDA correlation
    LdaCPw,
}

impl XcFunctional {
    pub fn from_name(path: &str, name: &str) -> Result<Self> {
        match name {
            "lda_x" => Ok(XcFunctional::LdaX),
            "lda_c_pw" => Ok(XcFunctional::LdaCPw),
            other
                if other.starts_with("gga_")
                    || other.starts_with("mgga_")
                    || other.starts_with("hyb_") =>
            {
                Err(JobError::NotImplemented(format!(
                    "exchange-correlation functional '{other}'"
                )))
            }
            other => Err(JobError::config(
                path,
                format!("unknown exchange-correlation functional '{other}'"),
            )),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            XcFunctional::LdaX => "lda_x",
            XcFunctional::LdaCPw => "lda_c_pw",
        }
    }

    /// Energy density per volume and potential at density `rho`.
    pub fn evaluate(&self, rho: f64) -> (f64, f64) {
        match self {
            XcFunctional::LdaX => (lda_x_energy_density(rho), lda_x_potential(rho)),
            XcFunctional::LdaCPw => lda_c_pw(rho),
        }
    }
}

/// The functionals a model sums up. Empty means no exchange-correlation at all.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Xc {
    pub functionals: Vec<XcFunctional>,
}

impl Xc {
    pub fn new(functionals: Vec<XcFunctional>) -> Self {
        Xc { functionals }
    }

    pub fn is_empty(&self) -> bool {
        self.functionals.is_empty()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.functionals.iter().map(XcFunctional::name).collect()
    }

    /// Sum of energy densities and of potentials of all functionals.
    pub fn evaluate(&self, rho: f64) -> (f64, f64) {
        self.functionals
            .iter()
            .map(|f| f.evaluate(rho))
            .fold((0.0, 0.0), |(e, v), (de, dv)| (e + de, v + dv))
    }
}

/// Accepts a single name or a list of names.
impl FromArg for Xc {
    fn from_arg(path: &str, value: ArgValue) -> Result<Self> {
        let names: Vec<String> = match value {
            ArgValue::Str(name) => vec![name],
            other => Vec::from_arg(path, other)?,
        };
        let functionals = names
            .iter()
            .map(|name| XcFunctional::from_name(path, name))
            .collect::<Result<_>>()?;
        Ok(Xc { functionals })
    }
}

/// Exchange-only LDA (Slater exchange), unpolarized.
///
/// Energy density:  e_x(ρ) = c_x ρ^(4/3),  c_x = -(3/4) (3/π)^(1/3)
/// Potential:       v_x(ρ) = d/dρ [ρ ε_x(ρ)] = -(3/π)^(1/3) ρ^(1/3)
pub(crate) fn lda_x_energy_density(rho: f64) -> f64 {
    if rho <= 0.0 {
        return 0.0;
    }
    let cx = -0.75 * (3.0 / PI).powf(1.0 / 3.0);
    cx * rho.powf(4.0 / 3.0)
}

pub(crate) fn lda_x_potential(rho: f64) -> f64 {
    if rho <= 0.0 {
        return 0.0;
    }
    -(3.0 / PI).powf(1.0 / 3.0) * rho.powf(1.0 / 3.0)
}

// Unpolarized PW92 parameters
const PW_A: f64 = 0.031_091;
const PW_ALPHA1: f64 = 0.213_70;
const PW_BETA: [f64; 4] = [7.5957, 3.5876, 1.6382, 0.49294];

/// PW92 correlation: (energy density per volume, potential).
///
/// ε_c(rs) = -2A(1 + α₁rs) ln(1 + 1/Q₁),  Q₁ = 2A(β₁√rs + β₂rs + β₃rs^(3/2) + β₄rs²)
/// v_c = ε_c - (rs/3) dε_c/drs
pub(crate) fn lda_c_pw(rho: f64) -> (f64, f64) {
    if rho <= 1e-30 {
        return (0.0, 0.0);
    }
    let rs = (3.0 / (4.0 * PI * rho)).powf(1.0 / 3.0);
    let sqrt_rs = rs.sqrt();
    let [b1, b2, b3, b4] = PW_BETA;

    let q0 = -2.0 * PW_A * (1.0 + PW_ALPHA1 * rs);
    let q1 = 2.0 * PW_A * (b1 * sqrt_rs + b2 * rs + b3 * rs * sqrt_rs + b4 * rs * rs);
    let dq1 = PW_A * (b1 / sqrt_rs + 2.0 * b2 + 3.0 * b3 * sqrt_rs + 4.0 * b4 * rs);
    let log = (1.0 + 1.0 / q1).ln();

    let eps = q0 * log;
    let deps_drs = -2.0 * PW_A * PW_ALPHA1 * log - q0 * dq1 / (q1 * q1 + q1);
    (rho * eps, eps - rs / 3.0 * deps_drs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_parse_from_string_or_list() {
        let xc = Xc::from_arg("model_kwargs.xc", ArgValue::Str("lda_x".into())).unwrap();
        assert_eq!(xc.names(), vec!["lda_x"]);

        let list = ArgValue::List(vec![
            ArgValue::Str("lda_x".into()),
            ArgValue::Str("lda_c_pw".into()),
        ]);
        let xc = Xc::from_arg("model_kwargs.xc", list).unwrap();
        assert_eq!(xc.functionals, vec![XcFunctional::LdaX, XcFunctional::LdaCPw]);
    }

    #[test]
    fn gga_is_not_implemented_and_garbage_is_a_config_error() {
        let err = Xc::from_arg("xc", ArgValue::Str("gga_x_pbe".into())).unwrap_err();
        assert!(matches!(err, JobError::NotImplemented(_)));
        let err = Xc::from_arg("xc", ArgValue::Str("lda_q".into())).unwrap_err();
        assert!(matches!(err, JobError::Config { .. }));
    }

    #[test]
    fn exchange_potential_is_the_density_derivative() {
        let rho = 0.3;
        let h = 1e-6;
        let numeric = (lda_x_energy_density(rho + h) - lda_x_energy_density(rho - h)) / (2.0 * h);
        assert!((numeric - lda_x_potential(rho)).abs() < 1e-6);
    }

    #[test]
    fn correlation_potential_is_the_density_derivative() {
        for rho in [1e-3, 0.05, 0.7] {
            let h = rho * 1e-5;
            let numeric = (lda_c_pw(rho + h).0 - lda_c_pw(rho - h).0) / (2.0 * h);
            let (_, v) = lda_c_pw(rho);
            assert!((numeric - v).abs() < 1e-6, "rho = {rho}: {numeric} vs {v}");
        }
    }

    #[test]
    fn correlation_energy_matches_the_electron_gas_value_at_rs_2() {
        // ε_c(rs = 2) ≈ -0.0448 Ha for the unpolarized gas
        let rho = 3.0 / (4.0 * PI * 8.0);
        let (e, _) = lda_c_pw(rho);
        assert!((e / rho + 0.0448).abs() < 5e-4);
    }

    #[test]
    fn empty_density_contributes_nothing() {
        let xc = Xc::new(vec![XcFunctional::LdaX, XcFunctional::LdaCPw]);
        assert_eq!(xc.evaluate(0.0), (0.0, 0.0));
        assert_eq!(xc.evaluate(-1e-4), (0.0, 0.0));
    }
}
