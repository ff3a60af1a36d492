//! Container Launcher
//!
//! Drives the lifecycle of a single long-lived application container built
//! from layered YAML configuration templates. Building and running images is
//! delegated to an external container engine (the docker CLI).
//!
//! # Pipeline
//!
//! Every command recomputes its inputs from the documents on disk:
//!
//! ```text
//! DocumentStore → TemplateResolver → ConfigMerger → ArgumentBuilder → Launcher → Engine
//! ```
//!
//! - **Templates** are expanded depth-first; the named configuration always
//!   comes last so it has the final say.
//! - **Bootstrap** provisions a transient container from a base image and
//!   commits it as `<namespace>/<name>`. A provisioning exit status of 77
//!   asks for another attempt instead of failing.
//!
//! # Example
//!
//! ```no_run
//! use launcher::{Launcher, LauncherConfig, RuntimeOptions};
//!
//! let config = LauncherConfig::from_env("/var/discourse");
//! let launcher = Launcher::new(config, RuntimeOptions::default())?;
//!
//! launcher.bootstrap("app")?.into_result("app")?;
//! launcher.start("app")?;
//! # Ok::<(), launcher::Error>(())
//! ```

pub mod args;
pub mod bootstrap;
pub mod config;
pub mod document;
pub mod engine;
pub mod error;
pub mod host;
pub mod launcher;
pub mod merge;
pub mod template;

pub use args::{ArgumentBuilder, ContainerSpec, RuntimeOptions};
pub use bootstrap::{BootstrapHandle, BootstrapOutcome};
pub use config::LauncherConfig;
pub use document::{ConfigDocument, DocumentSource, DocumentStore};
pub use engine::{ContainerState, DockerCli, Engine};
pub use error::{Error, Result, RETRY_EXIT_CODE};
pub use launcher::{Launcher, StartOutcome};
pub use merge::{ConfigMerger, MergedConfig, PortDirective};
pub use template::TemplateResolver;
