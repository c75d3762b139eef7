//! End-to-end runs of the job pipeline on a small helium cell.

use dftjob::config::JobConfig;
use dftjob::coordination::{Coordinator, LocalRank, SingleProcess};
use dftjob::io::{DirectoryStore, MemoryStore};
use dftjob::{Job, JobError};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::thread;

fn helium_job(scf_kwargs: Value, scf_options: Value, postscf: Value) -> JobConfig {
    let mut kwargs = json!({"basis": "basis", "tol": 1e-5, "damping": 0.5, "maxiter": 60});
    for (key, value) in scf_kwargs.as_object().unwrap() {
        kwargs[key] = value.clone();
    }
    let mut scf = json!({
        "$function": "self_consistent_field",
        "$kwargs": kwargs,
        "checkpointfile": "scfres.json"
    });
    for (key, value) in scf_options.as_object().unwrap() {
        scf[key] = value.clone();
    }
    JobConfig::from_value(json!({
        "periodic_system": {
            "atoms": [{"symbol": "He", "position": [0, 0, 0], "pseudopotential": "hgh/lda/he-q2"}],
            "bounding_box": [[6, 0, 0], [0, 6, 0], [0, 0, 6]]
        },
        "model_kwargs": {"xc": ["lda_x", "lda_c_pw"]},
        "basis_kwargs": {"Ecut": 3, "kgrid": [1, 1, 1]},
        "scf": scf,
        "postscf": postscf
    }))
    .unwrap()
}

fn bands_and_energies() -> Value {
    json!([
        {"$function": "compute_bands", "$kwargs": {"kpath": [[0, 0, 0], [0.5, 0, 0]]}},
        {"$function": "energy_decomposition"}
    ])
}

#[test]
fn manifest_lists_files_in_production_order() {
    let store = MemoryStore::new();
    let config = helium_job(json!({}), json!({}), bands_and_energies());
    let files = Job::new(&SingleProcess, &store)
        .with_extra_output_files(vec!["run.log".to_string()])
        .run(&config)
        .unwrap();

    assert_eq!(
        files,
        vec![
            "run.log",
            "scfres.json",
            "self_consistent_field.json",
            "compute_bands.json",
            "energy_decomposition.json",
            "timings.json"
        ]
    );

    let writes = store.writes();
    assert_eq!(
        writes[writes.len() - 5..],
        [
            "scfres.json",
            "self_consistent_field.json",
            "compute_bands.json",
            "energy_decomposition.json",
            "timings.json"
        ]
    );

    let status = store.json("self_consistent_field.json").unwrap();
    assert_eq!(status["converged"], json!(true));
    assert_eq!(status["timedout"], json!(false));

    let bands = store.json("compute_bands.json").unwrap();
    assert_eq!(bands["function"], json!("compute_bands"));
    assert_eq!(bands["result"]["kpath"], json!([[0.0, 0.0, 0.0], [0.5, 0.0, 0.0]]));
    assert_eq!(bands["result"]["eigenvalues"].as_array().unwrap().len(), 2);

    let timings = store.json("timings.json").unwrap();
    let labels: Vec<&str> = timings["sections"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["label"].as_str().unwrap())
        .collect();
    assert!(labels.contains(&"scf"));
    assert!(labels.contains(&"postscf/compute_bands"));
}

#[test]
fn unconverged_scf_skips_postscf() {
    let store = MemoryStore::new();
    let config = helium_job(json!({"maxiter": 1}), json!({}), bands_and_energies());
    let files = Job::new(&SingleProcess, &store).run(&config).unwrap();

    assert_eq!(files, vec!["scfres.json", "self_consistent_field.json", "timings.json"]);
    assert_eq!(store.json("self_consistent_field.json").unwrap()["converged"], json!(false));
    assert!(store.json("compute_bands.json").is_none());
}

#[test]
fn exhausted_wall_time_is_reported_and_gates_postscf() {
    let store = MemoryStore::new();
    let config = helium_job(json!({}), json!({"maxtime": 0}), bands_and_energies());
    let files = Job::new(&SingleProcess, &store).run(&config).unwrap();

    let status = store.json("self_consistent_field.json").unwrap();
    assert_eq!(status["timedout"], json!(true));
    assert_eq!(status["n_iter"], json!(1));
    assert!(!files.contains(&"energy_decomposition.json".to_string()));
}

#[test]
fn geometry_optimisation_fails_before_any_work() {
    let store = MemoryStore::new();
    let config = helium_job(json!({}), json!({"$function": "geometry_optimisation"}), json!([]));

    let err = Job::new(&SingleProcess, &store).run(&config).unwrap_err();
    assert!(matches!(err, JobError::NotImplemented(_)));
    assert!(store.writes().is_empty());
}

#[test]
fn unknown_scf_function_is_rejected() {
    let store = MemoryStore::new();
    let config = helium_job(json!({}), json!({"$function": "molecular_dynamics"}), json!([]));

    let err = Job::new(&SingleProcess, &store).run(&config).unwrap_err();
    assert!(matches!(err, JobError::UnknownFunction { ref context, .. } if context == "scf"));
    assert!(store.writes().is_empty());
}

#[test]
fn unknown_postscf_function_writes_nothing() {
    let store = MemoryStore::new();
    let config = helium_job(
        json!({}),
        json!({}),
        json!([{"$function": "energy_decomposition"}, {"$function": "compute_phonons"}]),
    );
    let err = Job::new(&SingleProcess, &store).run(&config).unwrap_err();
    assert!(matches!(err, JobError::UnknownFunction { ref name, .. } if name == "compute_phonons"));
    assert!(store.writes().is_empty());
}

#[test]
fn compute_bands_without_kpath_fails() {
    let store = MemoryStore::new();
    let config = helium_job(json!({}), json!({}), json!([{"$function": "compute_bands"}]));
    let err = Job::new(&SingleProcess, &store).run(&config).unwrap_err();

    match err {
        JobError::Config { key, message } => {
            assert_eq!(key, "postscf[0].$kwargs.kpath");
            assert_eq!(message, "kpath is not provided");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(store.json("self_consistent_field.json").is_some());
    assert!(store.json("compute_bands.json").is_none());
}

#[test]
fn rerun_resumes_from_the_checkpoint() {
    let store = MemoryStore::new();
    let config = helium_job(json!({}), json!({"save_ψ": true}), json!([]));
    Job::new(&SingleProcess, &store).run(&config).unwrap();
    let first = store.json("self_consistent_field.json").unwrap();
    assert!(store.json("scfres.json").unwrap()["orbitals"].is_array());

    Job::new(&SingleProcess, &store).run(&config).unwrap();
    let second = store.json("self_consistent_field.json").unwrap();

    assert_eq!(first["converged"], second["converged"]);
    assert!(second["n_iter"].as_u64().unwrap() <= first["n_iter"].as_u64().unwrap());
    let (e1, e2) = (
        first["energies"]["total"].as_f64().unwrap(),
        second["energies"]["total"].as_f64().unwrap(),
    );
    assert!((e1 - e2).abs() < 1e-6);
}

#[test]
fn only_the_coordinator_writes_in_a_rank_group() {
    let config = helium_job(json!({}), json!({}), bands_and_energies());
    let handles: Vec<_> = LocalRank::group(3)
        .into_iter()
        .map(|rank| {
            let config = config.clone();
            thread::spawn(move || {
                let store = MemoryStore::new();
                let files = Job::new(&rank, &store).run(&config).unwrap();
                (rank.rank(), files, store.writes().len())
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    for (rank, files, writes) in &results {
        assert_eq!(files, &results[0].1);
        if *rank == 0 {
            assert!(*writes >= 5);
        } else {
            assert_eq!(*writes, 0);
        }
    }
}

#[test]
fn rank_group_agrees_on_the_wall_time_cutoff() {
    let config = helium_job(
        json!({"tol": 1e-300, "maxiter": 100000}),
        json!({"maxtime": 1}),
        bands_and_energies(),
    );
    for _ in 0..3 {
        let store = MemoryStore::new();
        let group = LocalRank::group(6);
        let results: Vec<_> = thread::scope(|scope| {
            let handles: Vec<_> = group
                .iter()
                .map(|rank| {
                    let (store, config) = (&store, &config);
                    scope.spawn(move || Job::new(rank, store).run(config))
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let manifests: Vec<Vec<String>> = results.into_iter().map(Result::unwrap).collect();
        assert!(manifests.iter().all(|files| files == &manifests[0]));
        let status = store.json("self_consistent_field.json").unwrap();
        assert!(status["timedout"] == json!(true) || status["converged"] == json!(true));
        assert!(status["n_iter"].as_u64().unwrap() >= 1);
    }
}

#[test]
fn demo_job_runs_into_a_directory() {
    let input = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("demos").join("helium.json");
    let workdir = tempfile::tempdir().unwrap();
    let store = DirectoryStore::new(workdir.path());

    let files = Job::new(&SingleProcess, &store)
        .with_extra_output_files(vec!["helium.json".to_string()])
        .run_file(&input)
        .unwrap();

    assert_eq!(files.len(), 7);
    for name in &files[1..] {
        assert!(workdir.path().join(name).exists(), "{name} missing");
    }
    let dos: Value =
        serde_json::from_slice(&std::fs::read(workdir.path().join("compute_dos.json")).unwrap())
            .unwrap();
    assert_eq!(dos["result"]["energies"].as_array().unwrap().len(), 401);
}
