use crate::app::workspace::CalculationWorkspace;
use crate::coordination::Coordinator;
use crate::pw::ScfResult;
use crate::units::HARTREE_TO_EV;
use tracing::info;

pub fn report_banner(coordinator: &dyn Coordinator) {
    info!("===========================================");
    info!("  {} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
    info!("===========================================");
    info!("  Ranks: {}", coordinator.size());
    info!("  Threads per rank: {}", rayon::current_num_threads());
}

pub fn report_workspace(workspace: &CalculationWorkspace) {
    let system = &workspace.system;
    let model = workspace.model();
    let basis = &workspace.basis;

    info!("\nPeriodic system:");
    for (i, column) in system.lattice().column_iter().enumerate() {
        info!("  a{}: [{:>10.5}, {:>10.5}, {:>10.5}] bohr", i + 1, column[0], column[1], column[2]);
    }
    info!("  Cell volume: {:.5} bohr^3", system.volume());
    for (idx, atom) in system.atoms().iter().enumerate() {
        let r = &atom.position.0;
        info!(
            "  Atom {:>2} {:>2}: [{:+.6}, {:+.6}, {:+.6}]  {} (Z = {})",
            idx + 1,
            atom.symbol(),
            r.x,
            r.y,
            r.z,
            atom.pseudopotential.identifier,
            atom.pseudopotential.valence
        );
    }

    info!("\nModel:");
    info!("  xc: {}", model.xc.names().join(", "));
    info!("  Electrons: {}", model.n_electrons);
    info!("  Temperature: {} Ha ({:?} smearing)", model.temperature, model.smearing);

    info!("\nBasis:");
    info!("  Ecut: {} Ha", basis.ecut());
    info!("  k-grid: {:?} shifted by {:?}", basis.kgrid(), basis.kshift());
    info!("  Plane waves per k-point: {}", basis.n_plane_waves());
    info!("  Real-space grid: {:?}", basis.grid_size());
}

pub fn report_scf_summary(scfres: &ScfResult) {
    info!("\nSCF calculation finished.");
    info!("  Converged: {} after {} iterations", scfres.converged, scfres.n_iter);
    if scfres.timedout {
        info!("  Stopped by the wall-time limit");
    }

    info!("\nEnergy terms:");
    let e = &scfres.energies;
    for (label, value) in [
        ("Kinetic", e.kinetic),
        ("Local", e.local),
        ("Hartree", e.hartree),
        ("Xc", e.xc),
        ("Entropy", e.entropy),
    ] {
        info!("  {:<10} {:>18.10} au", label, value);
    }
    info!("  {:<10} {:>18.10} au ({:.6} eV)", "Total", e.total, e.total * HARTREE_TO_EV);
    info!("  Fermi level: {:.8} au", scfres.fermi_level);

    if let Some(values) = scfres.eigenvalues.first() {
        info!("\nEigenvalues at the first k-point:");
        for (i, energy) in values.iter().enumerate() {
            info!("  Band {}: {:.8} au", i + 1, energy);
        }
    }
}
