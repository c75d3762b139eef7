use super::basis::build_basis;
use super::geometry::build_system;
use crate::config::JobConfig;
use crate::error::Result;
use crate::kwargs::Interpolation;
use crate::pw::{Model, PeriodicSystem, PlaneWaveBasis};
use std::sync::Arc;

/// In-memory representation of everything needed to run the SCF stage.
#[derive(Clone)]
pub struct CalculationWorkspace {
    pub system: Arc<PeriodicSystem>,
    pub basis: Arc<PlaneWaveBasis>,
}

impl CalculationWorkspace {
    pub fn build(config: &JobConfig) -> Result<Self> {
        let system = Arc::new(build_system(config)?);
        let basis = build_basis(config, Arc::clone(&system))?;
        Ok(Self { system, basis })
    }

    pub fn model(&self) -> &Arc<Model> {
        self.basis.model()
    }

    /// Names a job document may use for live objects: `"basis"` and `"model"`.
    pub fn interpolation(&self) -> Interpolation {
        Interpolation::new()
            .with("basis", Arc::clone(&self.basis))
            .with("model", Arc::clone(self.model()))
    }
}
