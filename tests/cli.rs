//! The binary keeps stdout for the manifest.

use std::path::PathBuf;
use std::process::Command;

#[test]
fn stdout_carries_only_the_manifest() {
    let input = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("demos").join("helium.json");
    let workdir = tempfile::tempdir().unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_dftjob"))
        .arg(&input)
        .arg("--workdir")
        .arg(workdir.path())
        .arg("--ranks")
        .arg("2")
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let stdout = String::from_utf8(output.stdout).unwrap();
    let manifest: Vec<&str> = stdout.lines().collect();
    assert_eq!(
        manifest,
        vec![
            "scfres.json",
            "self_consistent_field.json",
            "compute_bands.json",
            "compute_dos.json",
            "energy_decomposition.json",
            "timings.json",
        ]
    );

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("SCF converged"));
    assert_eq!(stderr.matches("Starting self_consistent_field").count(), 1);
}
