//! Resolving, merging and rendering configurations from documents on disk

use std::fs;
use std::path::Path;

use launcher::args::mac_address_for;
use launcher::{
    ArgumentBuilder, ConfigMerger, DocumentStore, Error, LauncherConfig, PortDirective,
    RuntimeOptions, TemplateResolver,
};
use tempfile::TempDir;

fn write(root: &Path, id: &str, text: &str) {
    let path = root.join(id);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, text).unwrap();
}

fn setup() -> TempDir {
    let temp = TempDir::new().unwrap();
    let root = temp.path();

    write(
        root,
        "templates/web.template.yml",
        r#"
expose:
  - "80:80"
  - "443"
env:
  ROLE: web
  SHARED: web
labels:
  instance: "{{config}}"
"#,
    );
    write(
        root,
        "templates/db.template.yml",
        r#"
env:
  ROLE: db
  DB_POOL: 8
volumes:
  - volume:
      host: /var/shared
      guest: /shared
"#,
    );
    write(
        root,
        "containers/app.yml",
        r#"
templates:
  - templates/web.template.yml
  - templates/db.template.yml
env:
  SHARED: app
  HOST_TAG: "{{config}}-host"
docker_args: --cpus 2
"#,
    );
    temp
}

fn compose(root: &Path, name: &str) -> launcher::Result<launcher::MergedConfig> {
    let store = DocumentStore::new(root);
    let documents = TemplateResolver::new(&store).resolve(&DocumentStore::config_id(name))?;
    Ok(ConfigMerger::new(name).merge(&documents))
}

#[test]
fn test_layering_priorities() {
    let temp = setup();
    let merged = compose(temp.path(), "app").unwrap();

    // later template beats earlier, named configuration beats both
    assert_eq!(merged.env["ROLE"], "db");
    assert_eq!(merged.env["SHARED"], "app");
    assert_eq!(merged.env["DB_POOL"], "8");
    assert_eq!(merged.env["LANG"], "en_US.UTF-8");

    assert_eq!(merged.env["HOST_TAG"], "app-host");
    assert_eq!(merged.labels["instance"], "app");
}

#[test]
fn test_container_arguments() {
    let temp = setup();
    let merged = compose(temp.path(), "app").unwrap();

    assert_eq!(
        merged.ports,
        vec![
            PortDirective::Publish("80:80".into()),
            PortDirective::Expose("443".into())
        ]
    );

    let config = LauncherConfig::builder()
        .root(temp.path())
        .host_shortname("box")
        .build();
    let options = RuntimeOptions {
        docker_args: Some("--memory 1g".into()),
        ..Default::default()
    };
    let args = ArgumentBuilder::new(&config, &options).container(&merged).to_args();

    let pos = |needle: &str| args.iter().position(|a| a == needle).unwrap();
    assert_eq!(args[pos("-p") + 1], "80:80");
    assert_eq!(args[pos("--expose") + 1], "443");
    assert_eq!(args[pos("-v") + 1], "/var/shared:/shared");
    assert_eq!(args[pos("-h") + 1], "box-app");
    assert_eq!(args[pos("--mac-address") + 1], mac_address_for("box-app"));
    assert!(pos("--cpus") < pos("--memory"));
    assert!(pos("--memory") < pos("local_discourse/app"));
    assert_eq!(args.last().unwrap(), "/sbin/boot");
}

#[test]
fn test_arguments_are_stable() {
    let temp = setup();
    let config = LauncherConfig::builder()
        .root(temp.path())
        .host_shortname("box")
        .build();
    let options = RuntimeOptions::default();

    let first = ArgumentBuilder::new(&config, &options)
        .container(&compose(temp.path(), "app").unwrap())
        .to_args();
    let second = ArgumentBuilder::new(&config, &options)
        .container(&compose(temp.path(), "app").unwrap())
        .to_args();
    assert_eq!(first, second);
}

#[test]
fn test_cycle_is_reported() {
    let temp = TempDir::new().unwrap();
    write(
        temp.path(),
        "templates/a.template.yml",
        "templates:\n  - templates/b.template.yml\n",
    );
    write(
        temp.path(),
        "templates/b.template.yml",
        "templates:\n  - templates/a.template.yml\n",
    );
    write(
        temp.path(),
        "containers/loop.yml",
        "templates:\n  - templates/a.template.yml\n",
    );

    let err = compose(temp.path(), "loop").unwrap_err();
    assert!(matches!(err, Error::CyclicTemplate { .. }));
}

#[test]
fn test_missing_and_malformed_documents() {
    let temp = setup();
    let err = compose(temp.path(), "absent").unwrap_err();
    assert!(matches!(err, Error::ConfigNotFound(_)));

    write(
        temp.path(),
        "templates/db.template.yml",
        "env: [unclosed\n",
    );
    let err = compose(temp.path(), "app").unwrap_err();
    match err {
        Error::ConfigSyntax { path, .. } => assert_eq!(path, "templates/db.template.yml"),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_merge_sources_is_all_or_nothing() {
    let merger = ConfigMerger::new("app");
    let err = merger
        .merge_sources(&[("good.yml", "env:\n  A: 1\n"), ("bad.yml", "env: [\n")])
        .unwrap_err();
    assert!(matches!(err, Error::ConfigSyntax { .. }));

    let merged = merger
        .merge_sources(&[("one.yml", "env:\n  A: 1\n"), ("two.yml", "env:\n  A: 2\n")])
        .unwrap();
    assert_eq!(merged.env["A"], "2");
}
