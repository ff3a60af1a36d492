//! Launcher settings with builder pattern

use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

/// Default image provisioning starts from
pub const DEFAULT_BASE_IMAGE: &str = "discourse/base:2.0.20250226-0128";

/// Namespace for images produced by bootstrap
pub const DEFAULT_LOCAL_NAMESPACE: &str = "local_discourse";

/// Directory under the root holding named configurations
pub const CONTAINERS_DIR: &str = "containers";

#[derive(Debug, Clone)]
pub struct LauncherConfig {
    pub root: PathBuf,
    pub cids_dir: PathBuf,
    pub docker_path: String,
    pub local_namespace: String,
    pub base_image: String,
    pub stop_grace: Duration,
    pub supervised: bool,
    pub debug: bool,
    pub bootstrap_attempts: u32,
    pub host_shortname: String,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            cids_dir: PathBuf::from("cids"),
            docker_path: "docker".to_string(),
            local_namespace: DEFAULT_LOCAL_NAMESPACE.to_string(),
            base_image: DEFAULT_BASE_IMAGE.to_string(),
            stop_grace: Duration::from_secs(600),
            supervised: false,
            debug: false,
            bootstrap_attempts: 3,
            host_shortname: "localhost".to_string(),
        }
    }
}

impl LauncherConfig {
    pub fn builder() -> LauncherConfigBuilder {
        LauncherConfigBuilder::default()
    }

    /// Settings for `root`, with overrides from the process environment
    pub fn from_env(root: impl Into<PathBuf>) -> Self {
        let mut builder = Self::builder()
            .root(root)
            .host_shortname(detect_host_shortname());

        if let Ok(value) = std::env::var("SUPERVISED") {
            builder = builder.supervised(value.eq_ignore_ascii_case("true"));
        }
        if let Ok(path) = std::env::var("DOCKER_PATH") {
            builder = builder.docker_path(path);
        }
        if let Ok(ns) = std::env::var("LAUNCHER_NAMESPACE") {
            builder = builder.local_namespace(ns);
        }

        builder.build()
    }

    pub fn validate(&self) -> crate::Result<()> {
        if self.docker_path.is_empty() {
            return Err(crate::Error::Config("docker_path cannot be empty".into()));
        }
        if self.local_namespace.is_empty() {
            return Err(crate::Error::Config("local_namespace cannot be empty".into()));
        }
        if self.bootstrap_attempts < 1 {
            return Err(crate::Error::Config(
                "bootstrap_attempts must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Path of the bootstrap handle for a named configuration
    pub fn cid_path(&self, name: &str) -> PathBuf {
        self.cids_dir.join(format!("{}_bootstrap.cid", name))
    }

    /// Image bootstrap produces for a configuration
    pub fn local_image(&self, name: &str) -> String {
        format!("{}/{}", self.local_namespace, name)
    }

    /// Image a failed bootstrap is kept as when debugging
    pub fn debug_image(&self, name: &str) -> String {
        format!("{}/{}-debug", self.local_namespace, name)
    }
}

/// Check a configuration name is usable as a file stem and container name
pub fn validate_name(name: &str) -> crate::Result<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphanumeric())
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));

    if valid {
        Ok(())
    } else {
        Err(crate::Error::Config(format!(
            "invalid configuration name '{}': use letters, digits, '_', '-' or '.'",
            name
        )))
    }
}

fn detect_host_shortname() -> String {
    let from_command = Command::new("hostname")
        .arg("-s")
        .output()
        .ok()
        .filter(|o| o.status.success())
        .map(|o| String::from_utf8_lossy(&o.stdout).trim().to_string())
        .filter(|s| !s.is_empty());

    from_command
        .or_else(|| {
            std::env::var("HOSTNAME")
                .ok()
                .and_then(|h| h.split('.').next().map(str::to_string))
                .filter(|s| !s.is_empty())
        })
        .unwrap_or_else(|| "localhost".to_string())
}

#[derive(Default)]
pub struct LauncherConfigBuilder {
    config: LauncherConfig,
    cids_dir: Option<PathBuf>,
}

impl LauncherConfigBuilder {
    pub fn root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config.root = root.into();
        self
    }

    pub fn cids_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cids_dir = Some(dir.into());
        self
    }

    pub fn docker_path(mut self, path: impl Into<String>) -> Self {
        self.config.docker_path = path.into();
        self
    }

    pub fn local_namespace(mut self, ns: impl Into<String>) -> Self {
        self.config.local_namespace = ns.into();
        self
    }

    pub fn base_image(mut self, image: impl Into<String>) -> Self {
        self.config.base_image = image.into();
        self
    }

    pub fn stop_grace(mut self, grace: Duration) -> Self {
        self.config.stop_grace = grace;
        self
    }

    pub fn supervised(mut self, supervised: bool) -> Self {
        self.config.supervised = supervised;
        self
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.config.debug = debug;
        self
    }

    pub fn bootstrap_attempts(mut self, attempts: u32) -> Self {
        self.config.bootstrap_attempts = attempts;
        self
    }

    pub fn host_shortname(mut self, name: impl Into<String>) -> Self {
        self.config.host_shortname = name.into();
        self
    }

    pub fn build(self) -> LauncherConfig {
        let mut config = self.config;
        config.cids_dir = self
            .cids_dir
            .unwrap_or_else(|| default_cids_dir(&config.root));
        config
    }
}

fn default_cids_dir(root: &Path) -> PathBuf {
    root.join("cids")
}
