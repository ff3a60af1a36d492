//! Bootstrap handle and outcome
//!
//! The handle is a small file naming the transient provisioning container.
//! It is written before that container is created and removed once the
//! container is gone, so a handle found later means an earlier bootstrap
//! died mid-flight. It marks a crash; it does not lock anything.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::{Error, Result};

/// Directory provisioning tooling lives in inside the base image
pub const PUPS_DIR: &str = "/pups";

#[derive(Debug)]
pub struct BootstrapHandle {
    path: PathBuf,
    container: String,
}

impl BootstrapHandle {
    /// Record `container` at `path`; fails with `StaleBootstrap` if a
    /// handle is already there
    pub fn create(path: impl Into<PathBuf>, container: impl Into<String>) -> Result<Self> {
        let path = path.into();
        let container = container.into();

        if let Some(stale) = Self::read(&path)? {
            return Err(Error::StaleBootstrap {
                path,
                container: stale,
            });
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                let stale = Self::read(&path)?.unwrap_or_default();
                return Err(Error::StaleBootstrap {
                    path,
                    container: stale,
                });
            }
            Err(e) => return Err(e.into()),
        };
        file.write_all(container.as_bytes())?;

        tracing::debug!(path = ?path, container = %container, "Bootstrap handle created");
        Ok(Self { path, container })
    }

    /// Container recorded in an existing handle, if any
    pub fn read(path: &Path) -> Result<Option<String>> {
        match std::fs::read_to_string(path) {
            Ok(content) => Ok(Some(content.trim().to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn container(&self) -> &str {
        &self.container
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the handle once its container is gone
    pub fn release(self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Result of one provisioning pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootstrapOutcome {
    /// Runtime image committed
    Success { image: String },
    /// Provisioning failed; `debug_image` is set if the container was kept
    Failure {
        exit_code: i32,
        debug_image: Option<String>,
    },
    /// Provisioning asked to be run again
    RetryRequested,
}

impl BootstrapOutcome {
    /// Map failures and retry requests onto errors for `config`
    pub fn into_result(self, config: &str) -> Result<String> {
        match self {
            BootstrapOutcome::Success { image } => Ok(image),
            BootstrapOutcome::Failure {
                exit_code,
                debug_image,
            } => Err(Error::BootstrapFailed {
                config: config.to_string(),
                exit_code,
                debug_image,
            }),
            BootstrapOutcome::RetryRequested => Err(Error::RetryRequested(config.to_string())),
        }
    }
}

/// Command the provisioning container runs; it reads the merged
/// configuration from stdin
pub fn provisioning_command(update_pups: bool) -> Vec<String> {
    let script = if update_pups {
        format!("cd {dir} && git pull && {dir}/bin/pups --stdin", dir = PUPS_DIR)
    } else {
        format!("{}/bin/pups --stdin", PUPS_DIR)
    };
    vec!["/bin/bash".to_string(), "-c".to_string(), script]
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_handle_lifecycle() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("cids/app_bootstrap.cid");

        let handle = BootstrapHandle::create(&path, "app-bootstrap-1").unwrap();
        assert_eq!(handle.container(), "app-bootstrap-1");
        assert_eq!(BootstrapHandle::read(&path).unwrap().as_deref(), Some("app-bootstrap-1"));

        handle.release().unwrap();
        assert!(!path.exists());
        assert_eq!(BootstrapHandle::read(&path).unwrap(), None);
    }

    #[test]
    fn test_stale_handle_is_refused() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("app_bootstrap.cid");
        std::fs::write(&path, "old-container\n").unwrap();

        let err = BootstrapHandle::create(&path, "new").unwrap_err();
        match err {
            Error::StaleBootstrap { container, .. } => assert_eq!(container, "old-container"),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "old-container\n");
    }

    #[test]
    fn test_outcome_into_result() {
        let ok = BootstrapOutcome::Success { image: "ns/app".into() };
        assert_eq!(ok.into_result("app").unwrap(), "ns/app");

        let retry = BootstrapOutcome::RetryRequested.into_result("app").unwrap_err();
        assert!(retry.is_retry());
        assert_eq!(retry.exit_code(), 77);

        let failed = BootstrapOutcome::Failure {
            exit_code: 2,
            debug_image: Some("ns/app-debug".into()),
        }
        .into_result("app")
        .unwrap_err();
        assert!(matches!(failed, Error::BootstrapFailed { exit_code: 2, .. }));
    }

    #[test]
    fn test_provisioning_command() {
        assert_eq!(
            provisioning_command(true)[2],
            "cd /pups && git pull && /pups/bin/pups --stdin"
        );
        assert_eq!(provisioning_command(false)[2], "/pups/bin/pups --stdin");
    }
}
