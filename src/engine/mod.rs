//! Narrow interface to the external container engine
//!
//! The launcher never holds container state of its own: every decision is
//! made from what [`Engine::state`] reports at that moment.

pub mod docker;

use std::time::Duration;

use crate::Result;

pub use docker::DockerCli;

/// Container state as observed through the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerState {
    Absent,
    Stopped,
    Running,
}

#[cfg_attr(test, mockall::automock)]
pub trait Engine {
    /// Fails with `EngineUnavailable` if the engine cannot be reached
    fn ping(&self) -> Result<()>;

    fn state(&self, name: &str) -> Result<ContainerState>;

    /// `run` with the given arguments; returns the exit status
    fn run(&self, args: &[String]) -> Result<i32>;

    /// `run` with `input` written to the container's stdin
    fn run_with_input(&self, args: &[String], input: &str) -> Result<i32>;

    fn start(&self, name: &str) -> Result<()>;

    fn stop(&self, name: &str, grace: Duration) -> Result<()>;

    /// Succeeds if the container does not exist
    fn remove(&self, name: &str) -> Result<()>;

    fn commit(&self, container: &str, image: &str, changes: &[String]) -> Result<()>;

    fn pull(&self, image: &str) -> Result<()>;

    fn image_exists(&self, image: &str) -> Result<bool>;

    /// Remove stopped containers and dangling images
    fn prune(&self) -> Result<()>;

    /// Stream container logs to stdout; returns the exit status
    fn logs(&self, name: &str) -> Result<i32>;

    /// Interactive login shell in a running container
    fn exec_shell(&self, name: &str) -> Result<i32>;

    /// The full command line `run` would execute
    fn run_command_line(&self, args: &[String]) -> Vec<String>;
}
