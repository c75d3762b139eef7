use crate::config::JobConfig;
use crate::error::{JobError, Result};
use crate::kwargs::{resolve, Interpolation, Kwargs};
use crate::pw::{Atom, PeriodicSystem, Pseudopotential};
use crate::units::Bohr;
use nalgebra::Vector3;
use periodic_table_on_an_enum::Element;
use tracing::info;

/// Build the periodic system described in the `periodic_system` section.
pub fn build_system(config: &JobConfig) -> Result<PeriodicSystem> {
    info!("Preparing periodic system...");
    let mut section = resolve("periodic_system", config.periodic_system(), &Interpolation::new())?;
    let atoms: Vec<Kwargs> = section.require("atoms")?;
    let bounding_box: [Bohr<Vector3<f64>>; 3] = section.require("bounding_box")?;
    section.finish()?;

    let atoms = atoms.into_iter().map(build_atom).collect::<Result<Vec<_>>>()?;
    PeriodicSystem::new(bounding_box, atoms)
}

fn build_atom(mut atom: Kwargs) -> Result<Atom> {
    let symbol: String = atom.require("symbol")?;
    let element = Element::from_symbol(&symbol).ok_or_else(|| {
        JobError::config(atom.key_path("symbol"), format!("invalid element symbol: {symbol}"))
    })?;
    let position: Bohr<Vector3<f64>> = atom.require("position")?;
    let identifier: String = atom.require("pseudopotential")?;
    let pseudo_kwargs = match atom.take_as::<Kwargs>("pseudopotential_kwargs")? {
        Some(kwargs) => kwargs,
        None => Kwargs::empty(atom.key_path("pseudopotential_kwargs")),
    };
    let magnetic_moment: f64 = atom.take_or("magnetic_moment", 0.0)?;
    atom.finish()?;

    let pseudopotential = Pseudopotential::new(&identifier, element.get_atomic_number() as u32, pseudo_kwargs)?;
    Ok(Atom {
        element,
        position,
        pseudopotential,
        magnetic_moment,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn config(periodic_system: Value) -> JobConfig {
        JobConfig::from_value(json!({
            "periodic_system": periodic_system,
            "model_kwargs": {"xc": "lda_x"},
            "basis_kwargs": {"Ecut": 2},
            "scf": {"$function": "self_consistent_field", "checkpointfile": "scf.json"}
        }))
        .unwrap()
    }

    #[test]
    fn silicon_cell_is_built() {
        let a = 10.26;
        let system = build_system(&config(json!({
            "atoms": [
                {"symbol": "Si", "position": [0, 0, 0], "pseudopotential": "hgh/lda/si-q4"},
                {"symbol": "Si", "position": [a / 4.0, a / 4.0, a / 4.0],
                 "pseudopotential": "hgh/lda/si-q4", "pseudopotential_kwargs": {"rloc": 0.44}}
            ],
            "bounding_box": [[0, a / 2.0, a / 2.0], [a / 2.0, 0, a / 2.0], [a / 2.0, a / 2.0, 0]]
        })))
        .unwrap();

        assert_eq!(system.atoms().len(), 2);
        assert_eq!(system.atoms()[0].symbol(), "Si");
        assert_eq!(system.n_valence_electrons(), 8.0);
        assert_eq!(system.atoms()[1].pseudopotential.rloc, 0.44);
        assert!((system.volume() - a * a * a / 4.0).abs() < 1e-9);
    }

    #[test]
    fn invalid_symbol_names_the_field() {
        let err = build_system(&config(json!({
            "atoms": [{"symbol": "Xx", "position": [0, 0, 0], "pseudopotential": "x"}],
            "bounding_box": [[5, 0, 0], [0, 5, 0], [0, 0, 5]]
        })))
        .err()
        .unwrap();
        assert!(matches!(err, JobError::Config { ref key, .. } if key == "periodic_system.atoms[0].symbol"));
    }

    #[test]
    fn position_must_have_three_components() {
        let err = build_system(&config(json!({
            "atoms": [{"symbol": "He", "position": [0, 0], "pseudopotential": "he-q2"}],
            "bounding_box": [[5, 0, 0], [0, 5, 0], [0, 0, 5]]
        })))
        .err()
        .unwrap();
        assert!(matches!(err, JobError::Config { ref key, .. } if key == "periodic_system.atoms[0].position"));
    }

    #[test]
    fn bounding_box_is_required() {
        let err = build_system(&config(json!({"atoms": []}))).err().unwrap();
        assert!(matches!(err, JobError::Config { ref key, .. } if key == "periodic_system.bounding_box"));
    }
}
