//! A small plane-wave Kohn–Sham DFT library.
//!
//! Real-symmetric Hamiltonians (local pseudopotentials only, cosine structure
//! factors), LDA exchange-correlation on a real-space grid, and a damped
//! density-mixing SCF loop with checkpoint and deadline hooks.

pub mod analysis;
mod basis;
mod checkpoint;
mod grid;
mod hamiltonian;
pub mod mixing;
mod model;
mod occupation;
mod pseudo;
mod scf;
pub mod xc;

pub use basis::{Kpoint, Miller, PlaneWaveBasis};
pub use checkpoint::{OrbitalBlock, ScfCheckpoint};
pub use hamiltonian::guess_density;
pub use model::{Atom, Model, PeriodicSystem, Smearing};
pub use pseudo::Pseudopotential;
pub use scf::{self_consistent_field, Energies, ScfControl, ScfOptions, ScfResult, ScfState};
pub use xc::Xc;
