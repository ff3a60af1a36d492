//! `docker` command line wrappers

use std::io::Write;
use std::process::{Command, Output, Stdio};
use std::time::Duration;

use serde::Deserialize;

use super::{ContainerState, Engine};
use crate::{Error, Result};

/// `.State` of `docker container inspect`
#[derive(Debug, Clone, Deserialize)]
struct InspectState {
    #[serde(rename = "Status", default)]
    status: String,
    #[serde(rename = "Running", default)]
    running: bool,
}

/// Engine client shelling out to the docker CLI
pub struct DockerCli {
    path: String,
}

impl DockerCli {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    fn command(&self) -> Command {
        Command::new(&self.path)
    }

    /// Run to completion, capturing output
    fn capture(&self, args: &[&str]) -> Result<Output> {
        tracing::debug!(docker = %self.path, ?args, "Invoking engine");
        self.command()
            .args(args)
            .output()
            .map_err(|e| self.spawn_error(e))
    }

    /// Run to completion, failing on a non-zero exit
    fn checked(&self, operation: &str, args: &[&str]) -> Result<String> {
        let output = self.capture(args)?;
        if !output.status.success() {
            return Err(classify_failure(
                operation,
                &String::from_utf8_lossy(&output.stderr),
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    /// Run with stdout/stderr inherited, returning the exit status
    fn passthrough(&self, operation: &str, args: &[String]) -> Result<i32> {
        tracing::debug!(docker = %self.path, ?args, "Invoking engine");
        let status = self
            .command()
            .args(args)
            .status()
            .map_err(|e| self.spawn_error(e))?;
        exit_code(operation, status)
    }

    fn spawn_error(&self, e: std::io::Error) -> Error {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::EngineUnavailable(format!("'{}' not found on PATH", self.path))
        } else {
            Error::Io(e)
        }
    }
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new("docker")
    }
}

impl Engine for DockerCli {
    fn ping(&self) -> Result<()> {
        let output = self.capture(&["version", "--format", "{{.Server.Version}}"])?;
        if !output.status.success() {
            return Err(Error::EngineUnavailable(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        tracing::debug!(
            version = %String::from_utf8_lossy(&output.stdout).trim(),
            "Engine reachable"
        );
        Ok(())
    }

    fn state(&self, name: &str) -> Result<ContainerState> {
        let output = self.capture(&["container", "inspect", "--format", "{{json .State}}", name])?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if is_missing(&stderr) {
                return Ok(ContainerState::Absent);
            }
            return Err(classify_failure("inspect", &stderr));
        }
        parse_state(&String::from_utf8_lossy(&output.stdout))
    }

    fn run(&self, args: &[String]) -> Result<i32> {
        let mut full = vec!["run".to_string()];
        full.extend(args.iter().cloned());
        self.passthrough("run", &full)
    }

    fn run_with_input(&self, args: &[String], input: &str) -> Result<i32> {
        tracing::debug!(
            docker = %self.path,
            ?args,
            bytes = input.len(),
            "Invoking engine with input"
        );
        let mut child = self
            .command()
            .arg("run")
            .args(args)
            .stdin(Stdio::piped())
            .spawn()
            .map_err(|e| self.spawn_error(e))?;

        if let Some(mut stdin) = child.stdin.take() {
            if let Err(e) = stdin.write_all(input.as_bytes()) {
                // The container may exit before reading everything
                if e.kind() != std::io::ErrorKind::BrokenPipe {
                    drop(stdin);
                    if let Err(kill) = child.kill() {
                        tracing::warn!(error = %kill, "Could not kill engine process");
                    }
                    child.wait()?;
                    return Err(e.into());
                }
                tracing::warn!("Container closed stdin early");
            }
        }

        let status = child.wait()?;
        exit_code("run", status)
    }

    fn start(&self, name: &str) -> Result<()> {
        self.checked("start", &["start", name])?;
        Ok(())
    }

    fn stop(&self, name: &str, grace: Duration) -> Result<()> {
        let secs = grace.as_secs().to_string();
        self.checked("stop", &["stop", "-t", &secs, name])?;
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<()> {
        let output = self.capture(&["rm", name])?;
        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        if is_missing(&stderr) {
            tracing::debug!(container = %name, "Nothing to remove");
            return Ok(());
        }
        Err(classify_failure("rm", &stderr))
    }

    fn commit(&self, container: &str, image: &str, changes: &[String]) -> Result<()> {
        let mut args = vec!["commit"];
        for change in changes {
            args.push("--change");
            args.push(change);
        }
        args.push(container);
        args.push(image);
        self.checked("commit", &args)?;
        Ok(())
    }

    fn pull(&self, image: &str) -> Result<()> {
        let status = self
            .command()
            .args(["pull", image])
            .status()
            .map_err(|e| self.spawn_error(e))?;
        if !status.success() {
            return Err(Error::engine("pull", format!("could not pull {}", image)));
        }
        Ok(())
    }

    fn image_exists(&self, image: &str) -> Result<bool> {
        let output = self.capture(&["image", "inspect", "--format", "{{.Id}}", image])?;
        if output.status.success() {
            return Ok(true);
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        if is_missing(&stderr) {
            Ok(false)
        } else {
            Err(classify_failure("image inspect", &stderr))
        }
    }

    fn prune(&self) -> Result<()> {
        let containers = self.checked("container prune", &["container", "prune", "--force"])?;
        let images = self.checked("image prune", &["image", "prune", "--force"])?;
        for line in containers.lines().chain(images.lines()) {
            if line.starts_with("Total reclaimed space") {
                tracing::info!("{}", line);
            }
        }
        Ok(())
    }

    fn logs(&self, name: &str) -> Result<i32> {
        self.passthrough("logs", &["logs".to_string(), name.to_string()])
    }

    fn exec_shell(&self, name: &str) -> Result<i32> {
        let args = ["exec", "-it", name, "/bin/bash", "--login"].map(String::from);
        self.passthrough("exec", &args)
    }

    fn run_command_line(&self, args: &[String]) -> Vec<String> {
        let mut line = vec![self.path.clone(), "run".to_string()];
        line.extend(args.iter().cloned());
        line
    }
}

fn exit_code(operation: &str, status: std::process::ExitStatus) -> Result<i32> {
    status
        .code()
        .ok_or_else(|| Error::engine(operation, "terminated by signal"))
}

fn is_missing(stderr: &str) -> bool {
    stderr.contains("No such container")
        || stderr.contains("No such object")
        || stderr.contains("No such image")
}

fn classify_failure(operation: &str, stderr: &str) -> Error {
    let stderr = stderr.trim();
    if stderr.contains("Cannot connect to the Docker daemon")
        || stderr.contains("Is the docker daemon running")
    {
        Error::EngineUnavailable(stderr.to_string())
    } else {
        Error::engine(operation, stderr)
    }
}

fn parse_state(json: &str) -> Result<ContainerState> {
    let state: InspectState = serde_json::from_str(json.trim())?;
    if state.running || state.status == "running" {
        Ok(ContainerState::Running)
    } else {
        Ok(ContainerState::Stopped)
    }
}
