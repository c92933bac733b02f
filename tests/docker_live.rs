//! Integration tests against a real Docker daemon.
//!
//! These require a running Docker daemon and are marked `#[ignore]`.
//! Run with: `cargo test -- --ignored`

use recon_exec::config::{Config, Framework, OwnershipMode, RegistryConfig};
use recon_exec::engine::{self, DEFAULT_ENVIRONMENT, run_container};
use recon_exec::volume::VolumeSet;

fn busybox_config() -> Config {
    Config {
        container_registry: RegistryConfig {
            base_url: "docker.io".into(),
            owner: "library".into(),
        },
        docker_ownership: OwnershipMode::Repair,
        ..Config::default()
    }
}

#[test]
#[ignore]
fn writes_through_virtualized_mount() {
    let cfg = busybox_config();
    engine::ensure_available(&cfg, Framework::Docker).expect("docker daemon");

    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("nodes.txt");
    std::fs::write(&input, "A\nB\n").unwrap();

    let mut volumes = VolumeSet::new();
    let container_input = volumes.add_path(&input, "/spras", cfg.hash_length).unwrap();
    let container_output = volumes
        .add_path(dir.path().join("copy.txt"), "/spras", cfg.hash_length)
        .unwrap();

    let command = vec![
        "cp".to_string(),
        container_input,
        container_output,
    ];
    run_container(
        &cfg,
        "docker",
        "busybox:1.36",
        &command,
        &volumes,
        "/spras",
        DEFAULT_ENVIRONMENT,
    )
    .expect("container run");

    assert_eq!(std::fs::read_to_string(dir.path().join("copy.txt")).unwrap(), "A\nB\n");
}

#[cfg(unix)]
#[test]
#[ignore]
fn new_outputs_are_owned_by_invoking_user() {
    use std::os::unix::fs::MetadataExt;

    let cfg = busybox_config();
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out");
    std::fs::create_dir(&out).unwrap();

    let mut volumes = VolumeSet::new();
    let container_out = volumes.add_path(&out, "/spras", cfg.hash_length).unwrap();
    let command = vec![
        "touch".to_string(),
        format!("{container_out}/pathway.txt"),
    ];
    run_container(
        &cfg,
        "docker",
        "busybox:1.36",
        &command,
        &volumes,
        "/spras",
        DEFAULT_ENVIRONMENT,
    )
    .expect("container run");

    let meta = std::fs::metadata(out.join("pathway.txt")).unwrap();
    let me = std::fs::metadata(dir.path()).unwrap();
    assert_eq!(meta.uid(), me.uid());
    assert_eq!(meta.gid(), me.gid());
}

#[test]
#[ignore]
fn failing_command_reports_stderr() {
    let cfg = busybox_config();
    let command = vec!["sh".to_string(), "-c".to_string(), "echo nope >&2; exit 7".to_string()];
    let err = run_container(
        &cfg,
        "docker",
        "busybox:1.36",
        &command,
        &VolumeSet::new(),
        "/",
        DEFAULT_ENVIRONMENT,
    )
    .unwrap_err();
    assert!(err.to_string().contains("nope"));
    assert!(err.to_string().contains("exit code 7"));
}
