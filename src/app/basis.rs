use crate::config::JobConfig;
use crate::error::Result;
use crate::kwargs::{resolve, Interpolation};
use crate::pw::{Model, PeriodicSystem, PlaneWaveBasis, Xc};
use std::sync::Arc;
use tracing::info;

/// Build the model from `model_kwargs` and discretize it with `basis_kwargs`.
///
/// `xc` is taken out of the model arguments first; everything left over goes
/// to the model, which rejects what it does not know.
pub fn build_basis(config: &JobConfig, system: Arc<PeriodicSystem>) -> Result<Arc<PlaneWaveBasis>> {
    info!("Preparing model and plane-wave basis...");
    let mut model_kwargs = resolve("model_kwargs", config.model_kwargs(), &Interpolation::new())?;
    let xc: Xc = model_kwargs.require("xc")?;
    let model = Arc::new(Model::new(system, xc, model_kwargs)?);

    let basis_kwargs = resolve("basis_kwargs", config.basis_kwargs(), &Interpolation::new())?;
    Ok(Arc::new(PlaneWaveBasis::new(model, basis_kwargs)?))
}
