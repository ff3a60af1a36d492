//! Lifecycle commands for a named configuration
//!
//! Each command re-reads the configuration documents and re-queries the
//! engine; nothing is cached between invocations.

use crate::args::{ArgumentBuilder, RuntimeOptions};
use crate::bootstrap::{provisioning_command, BootstrapHandle, BootstrapOutcome};
use crate::config::{validate_name, LauncherConfig};
use crate::document::DocumentStore;
use crate::engine::{ContainerState, DockerCli, Engine};
use crate::host::{run_hooks, HostShell, SystemShell};
use crate::merge::{ConfigMerger, MergedConfig};
use crate::template::TemplateResolver;
use crate::{Error, Result, RETRY_EXIT_CODE};

/// What `start` ended up doing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    AlreadyRunning,
    /// Existing stopped container started again
    Resumed,
    /// New container created from `image`
    Created { image: String },
}

pub struct Launcher<E: Engine = DockerCli, H: HostShell = SystemShell> {
    config: LauncherConfig,
    options: RuntimeOptions,
    store: DocumentStore,
    engine: E,
    host: H,
}

impl Launcher {
    /// Launcher driving the docker CLI named in `config`
    pub fn new(config: LauncherConfig, options: RuntimeOptions) -> Result<Self> {
        let engine = DockerCli::new(config.docker_path.clone());
        Self::with_parts(config, options, engine, SystemShell)
    }
}

impl<E: Engine, H: HostShell> Launcher<E, H> {
    pub fn with_parts(
        config: LauncherConfig,
        options: RuntimeOptions,
        engine: E,
        host: H,
    ) -> Result<Self> {
        config.validate()?;
        let store = DocumentStore::new(config.root.clone());

        Ok(Self {
            config,
            options,
            store,
            engine,
            host,
        })
    }

    pub fn config(&self) -> &LauncherConfig {
        &self.config
    }

    /// Host prerequisite: the engine must answer
    pub fn check_engine(&self) -> Result<()> {
        self.engine.ping()
    }

    pub fn state(&self, name: &str) -> Result<ContainerState> {
        validate_name(name)?;
        self.engine.state(name)
    }

    /// Resolve templates and merge them into one configuration
    pub fn compose(&self, name: &str) -> Result<MergedConfig> {
        validate_name(name)?;
        let documents =
            TemplateResolver::new(&self.store).resolve(&DocumentStore::config_id(name))?;
        Ok(ConfigMerger::new(name).merge(&documents))
    }

    pub fn start(&self, name: &str) -> Result<StartOutcome> {
        match self.state(name)? {
            ContainerState::Running => {
                tracing::info!(config = %name, "Nothing to do, container is already running");
                Ok(StartOutcome::AlreadyRunning)
            }
            ContainerState::Stopped => {
                tracing::info!(config = %name, "Starting existing container");
                self.engine.start(name)?;
                Ok(StartOutcome::Resumed)
            }
            ContainerState::Absent => self.create_container(name),
        }
    }

    fn create_container(&self, name: &str) -> Result<StartOutcome> {
        let merged = self.compose(name)?;
        run_hooks(&self.host, &merged.host_commands())?;

        let spec = ArgumentBuilder::new(&self.config, &self.options).container(&merged);
        tracing::info!(
            config = %name,
            image = %spec.image,
            hostname = ?spec.hostname,
            "Creating container"
        );

        let code = self.engine.run(&spec.to_args())?;
        if code != 0 {
            return Err(Error::engine("run", format!("exited with status {}", code)));
        }
        Ok(StartOutcome::Created { image: spec.image })
    }

    /// The engine command line `start` would run for a new container
    pub fn start_command(&self, name: &str) -> Result<Vec<String>> {
        let merged = self.compose(name)?;
        let spec = ArgumentBuilder::new(&self.config, &self.options).container(&merged);
        Ok(self.engine.run_command_line(&spec.to_args()))
    }

    pub fn stop(&self, name: &str) -> Result<()> {
        match self.state(name)? {
            ContainerState::Running => {
                let grace = self.config.stop_grace;
                tracing::info!(config = %name, ?grace, "Stopping container");
                self.engine.stop(name, self.config.stop_grace)
            }
            _ => Err(Error::NotStarted(name.to_string())),
        }
    }

    pub fn restart(&self, name: &str) -> Result<StartOutcome> {
        self.stop(name)?;
        self.start(name)
    }

    /// Stop if needed and remove; a missing container is not an error
    pub fn destroy(&self, name: &str) -> Result<()> {
        match self.state(name)? {
            ContainerState::Absent => {
                tracing::info!(config = %name, "No container to destroy");
                Ok(())
            }
            ContainerState::Running => {
                if let Err(e) = self.engine.stop(name, self.config.stop_grace) {
                    tracing::warn!(config = %name, error = %e, "Stop before removal failed");
                }
                self.remove(name)
            }
            ContainerState::Stopped => self.remove(name),
        }
    }

    fn remove(&self, name: &str) -> Result<()> {
        tracing::info!(config = %name, "Removing container");
        self.engine.remove(name)
    }

    /// One provisioning pass producing `<namespace>/<name>`
    pub fn bootstrap(&self, name: &str) -> Result<BootstrapOutcome> {
        let merged = self.compose(name)?;

        let cid_path = self.config.cid_path(name);
        if let Some(container) = BootstrapHandle::read(&cid_path)? {
            return Err(Error::StaleBootstrap {
                path: cid_path,
                container,
            });
        }

        run_hooks(&self.host, &merged.host_commands())?;

        let base_image = merged
            .base_image
            .clone()
            .unwrap_or_else(|| self.config.base_image.clone());
        if !self.engine.image_exists(&base_image)? {
            tracing::info!(image = %base_image, "Pulling base image");
            self.engine.pull(&base_image)?;
        }

        let input = merged.provisioning_yaml()?;
        let transient = format!(
            "{}-bootstrap-{}",
            name,
            &uuid::Uuid::new_v4().simple().to_string()[..8]
        );
        let spec = ArgumentBuilder::new(&self.config, &self.options).bootstrap(
            &merged,
            &transient,
            &base_image,
            provisioning_command(merged.update_pups),
        );

        let handle = BootstrapHandle::create(cid_path, &transient)?;
        tracing::info!(
            config = %name,
            container = %transient,
            image = %base_image,
            "Bootstrapping"
        );

        let code = match self.engine.run_with_input(&spec.to_args(), &input) {
            Ok(code) => code,
            Err(e) => {
                if let Err(cleanup) = self.discard_transient(handle) {
                    tracing::warn!(error = %cleanup, "Cleanup after failed run also failed");
                }
                return Err(e);
            }
        };

        let outcome = match code {
            0 => {
                let image = self.config.local_image(name);
                let changes = self.commit_changes(&merged);
                if let Err(e) = self.engine.commit(handle.container(), &image, &changes) {
                    if let Err(cleanup) = self.discard_transient(handle) {
                        tracing::warn!(error = %cleanup, "Cleanup after failed commit also failed");
                    }
                    return Err(e);
                }
                tracing::info!(config = %name, image = %image, "Bootstrap committed");
                BootstrapOutcome::Success { image }
            }
            RETRY_EXIT_CODE => {
                tracing::warn!(config = %name, "Provisioning requested a retry");
                BootstrapOutcome::RetryRequested
            }
            exit_code => {
                let debug_image = if self.config.debug {
                    self.keep_for_debugging(name, handle.container())
                } else {
                    None
                };
                tracing::error!(
                    config = %name,
                    exit_code,
                    "Bootstrap failed, scroll up the log output for the cause"
                );
                BootstrapOutcome::Failure {
                    exit_code,
                    debug_image,
                }
            }
        };

        self.discard_transient(handle)?;
        Ok(outcome)
    }

    fn commit_changes(&self, merged: &MergedConfig) -> Vec<String> {
        let created = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
        let mut changes = vec![format!("LABEL org.opencontainers.image.created=\"{}\"", created)];

        let boot = ArgumentBuilder::new(&self.config, &self.options).boot_command(merged);
        // JSON form, so the engine doesn't wrap it in a shell
        if !boot.is_empty() {
            if let Ok(json) = serde_json::to_string(&boot) {
                changes.push(format!("CMD {}", json));
            }
        }
        changes
    }

    fn keep_for_debugging(&self, name: &str, container: &str) -> Option<String> {
        let image = self.config.debug_image(name);
        match self.engine.commit(container, &image, &[]) {
            Ok(()) => {
                tracing::warn!(config = %name, %image, "Failed bootstrap kept for debugging");
                Some(image)
            }
            Err(e) => {
                tracing::error!(config = %name, error = %e, "Could not keep failed bootstrap");
                None
            }
        }
    }

    /// Remove the transient container, then its handle. A container the
    /// engine never created counts as removed. The handle stays if the
    /// container could not be removed.
    fn discard_transient(&self, handle: BootstrapHandle) -> Result<()> {
        if let Err(e) = self.engine.remove(handle.container()) {
            tracing::error!(
                container = %handle.container(),
                handle = ?handle.path(),
                error = %e,
                "Transient container left behind"
            );
            return Err(e);
        }
        handle.release()
    }

    /// Replace the container with one built from a fresh bootstrap
    pub fn rebuild(&self, name: &str) -> Result<StartOutcome> {
        match self.state(name)? {
            ContainerState::Running => {
                self.stop(name)?;
                self.remove(name)?;
            }
            ContainerState::Stopped => self.remove(name)?,
            ContainerState::Absent => {}
        }

        let attempts = self.config.bootstrap_attempts;
        for attempt in 1..=attempts {
            match self.bootstrap(name)? {
                BootstrapOutcome::RetryRequested if attempt < attempts => {
                    tracing::info!(config = %name, attempt, attempts, "Retrying bootstrap");
                }
                outcome => {
                    outcome.into_result(name)?;
                    break;
                }
            }
        }

        self.start(name)
    }

    /// Run `command` in a throwaway container and return its exit status
    pub fn run(&self, name: &str, command: &str) -> Result<i32> {
        let merged = self.compose(name)?;
        let spec = ArgumentBuilder::new(&self.config, &self.options).disposable(&merged, command);
        tracing::info!(config = %name, image = %spec.image, "Running command");
        self.engine.run(&spec.to_args())
    }

    pub fn cleanup(&self) -> Result<()> {
        tracing::info!("Pruning stopped containers and dangling images");
        self.engine.prune()
    }

    pub fn logs(&self, name: &str) -> Result<i32> {
        validate_name(name)?;
        self.engine.logs(name)
    }

    pub fn enter(&self, name: &str) -> Result<i32> {
        match self.state(name)? {
            ContainerState::Running => self.engine.exec_shell(name),
            _ => Err(Error::NotStarted(name.to_string())),
        }
    }
}
