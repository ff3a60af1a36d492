//! End-to-end tests against a real engine
//! Run with: cargo test --test e2e -- --ignored (requires a reachable docker daemon)

use std::fs;

use launcher::{ContainerState, DockerCli, Engine, Launcher, LauncherConfig, RuntimeOptions};
use tempfile::TempDir;

#[test]
#[ignore] // Run manually: cargo test --test e2e -- --ignored
fn test_engine_ping() {
    let engine = DockerCli::new("docker");
    engine.ping().expect("docker daemon not reachable");
}

#[test]
#[ignore]
fn test_unknown_container_is_absent() {
    let engine = DockerCli::new("docker");
    let state = engine
        .state(&format!("launcher-e2e-{}", uuid::Uuid::new_v4().simple()))
        .unwrap();
    assert_eq!(state, ContainerState::Absent);
}

#[test]
#[ignore]
fn test_disposable_run() {
    let temp = TempDir::new().unwrap();
    fs::create_dir_all(temp.path().join("containers")).unwrap();
    fs::write(
        temp.path().join("containers/e2e.yml"),
        "env:\n  GREETING: hello\n",
    )
    .unwrap();

    let config = LauncherConfig::builder().root(temp.path()).build();
    let options = RuntimeOptions {
        run_image: Some("debian:stable-slim".into()),
        ..Default::default()
    };
    let launcher = Launcher::new(config, options).unwrap();
    launcher.check_engine().unwrap();

    assert_eq!(launcher.run("e2e", "test \"$GREETING\" = hello").unwrap(), 0);
    assert_eq!(launcher.run("e2e", "exit 3").unwrap(), 3);
    assert_eq!(launcher.state("e2e").unwrap(), ContainerState::Absent);
}
