//! Error types for the launcher

use std::path::PathBuf;
use thiserror::Error;

/// Exit status a provisioning run uses to ask for another attempt.
pub const RETRY_EXIT_CODE: i32 = 77;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Syntax error in {path}: {message}")]
    ConfigSyntax { path: String, message: String },

    #[error("Configuration not found: {0}")]
    ConfigNotFound(String),

    #[error("Template cycle detected: {}", chain.join(" -> "))]
    CyclicTemplate { chain: Vec<String> },

    #[error("Container engine unavailable: {0}")]
    EngineUnavailable(String),

    #[error("Engine operation '{operation}' failed: {message}")]
    Engine { operation: String, message: String },

    #[error("Bootstrap of '{config}' failed with exit code {exit_code}, scroll up the log output for the cause")]
    BootstrapFailed {
        config: String,
        exit_code: i32,
        debug_image: Option<String>,
    },

    #[error("Provisioning of '{0}' requested a retry")]
    RetryRequested(String),

    #[error("Container '{0}' is not started")]
    NotStarted(String),

    #[error("Stale bootstrap handle {path:?} for container '{container}', remove that container and the file before bootstrapping again")]
    StaleBootstrap { path: PathBuf, container: String },

    #[error("Host command failed ({code:?}): {command}")]
    HostCommand { command: String, code: Option<i32> },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Process exit status for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::RetryRequested(_) => RETRY_EXIT_CODE,
            _ => 1,
        }
    }

    /// Check if this is the provisioning retry signal rather than a failure
    pub fn is_retry(&self) -> bool {
        matches!(self, Error::RetryRequested(_))
    }

    pub(crate) fn engine(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Engine {
            operation: operation.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(Error::RetryRequested("app".into()).exit_code(), 77);
        assert_eq!(Error::NotStarted("app".into()).exit_code(), 1);
        assert_eq!(
            Error::BootstrapFailed {
                config: "app".into(),
                exit_code: 3,
                debug_image: None
            }
            .exit_code(),
            1
        );
    }

    #[test]
    fn test_cycle_message() {
        let err = Error::CyclicTemplate {
            chain: vec!["a.yml".into(), "b.yml".into(), "a.yml".into()],
        };
        assert_eq!(err.to_string(), "Template cycle detected: a.yml -> b.yml -> a.yml");
    }
}
