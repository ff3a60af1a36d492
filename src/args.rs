//! Turning a merged configuration into container creation arguments
//!
//! Everything here is pure: the output is a [`ContainerSpec`] describing a
//! `run` invocation. Issuing it is the launcher's job.

use std::collections::BTreeMap;

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::config::LauncherConfig;
use crate::document::{LinkBinding, VolumeBinding};
use crate::merge::{MergedConfig, PortDirective};

/// Init command the long-lived container boots with
pub const DEFAULT_BOOT_COMMAND: &str = "/sbin/boot";

/// Env flag asking for `HOSTNAME_ENV` to be used verbatim as hostname
pub const USE_HOSTNAME_ENV: &str = "DOCKER_USE_HOSTNAME";
pub const HOSTNAME_ENV: &str = "DOCKER_HOSTNAME";

/// Per-invocation options from the command line
#[derive(Debug, Clone, Default)]
pub struct RuntimeOptions {
    /// Extra engine arguments appended after the configuration's own
    pub docker_args: Option<String>,
    /// Run image override
    pub run_image: Option<String>,
    pub skip_mac_address: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RestartPolicy {
    Always,
    No,
}

impl RestartPolicy {
    fn as_arg(&self) -> &'static str {
        match self {
            RestartPolicy::Always => "--restart=always",
            RestartPolicy::No => "--restart=no",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AttachMode {
    /// Daemonized
    Detached,
    /// Attached to stdout/stderr, blocking until the container exits
    Foreground,
    /// Attached to stdin/stdout/stderr, stdin kept open
    Interactive,
}

/// A fully specified `run` invocation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContainerSpec {
    pub name: Option<String>,
    pub hostname: Option<String>,
    pub mac_address: Option<String>,
    pub restart: Option<RestartPolicy>,
    pub attach: AttachMode,
    pub remove_on_exit: bool,
    pub tty: bool,
    pub env: BTreeMap<String, String>,
    pub labels: BTreeMap<String, String>,
    pub ports: Vec<PortDirective>,
    pub volumes: Vec<VolumeBinding>,
    pub links: Vec<LinkBinding>,
    pub extra_args: Vec<String>,
    pub image: String,
    pub command: Vec<String>,
}

impl ContainerSpec {
    /// Arguments following `run` on the engine command line
    pub fn to_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        if let Some(ref name) = self.name {
            args.push("--name".to_string());
            args.push(name.clone());
        }
        if self.remove_on_exit {
            args.push("--rm".to_string());
        }
        if let Some(restart) = self.restart {
            args.push(restart.as_arg().to_string());
        }
        match self.attach {
            AttachMode::Detached => args.push("-d".to_string()),
            AttachMode::Foreground => {
                args.extend(["-a", "stdout", "-a", "stderr"].map(String::from));
            }
            AttachMode::Interactive => {
                let flags = ["-i", "-a", "stdin", "-a", "stdout", "-a", "stderr"];
                args.extend(flags.map(String::from));
            }
        }
        if self.tty {
            args.push("-t".to_string());
        }
        for (key, value) in &self.env {
            args.push("-e".to_string());
            args.push(format!("{}={}", key, value));
        }
        for (key, value) in &self.labels {
            args.push("-l".to_string());
            args.push(format!("{}={}", key, value));
        }
        if let Some(ref hostname) = self.hostname {
            args.push("-h".to_string());
            args.push(hostname.clone());
        }
        for port in &self.ports {
            match port {
                PortDirective::Expose(p) => {
                    args.push("--expose".to_string());
                    args.push(p.clone());
                }
                PortDirective::Publish(p) => {
                    args.push("-p".to_string());
                    args.push(p.clone());
                }
            }
        }
        for volume in &self.volumes {
            args.push("-v".to_string());
            args.push(format!("{}:{}", volume.host, volume.guest));
        }
        for link in &self.links {
            args.push("--link".to_string());
            args.push(format!("{}:{}", link.name, link.alias));
        }
        if let Some(ref mac) = self.mac_address {
            args.push("--mac-address".to_string());
            args.push(mac.clone());
        }
        args.extend(self.extra_args.iter().cloned());
        args.push(self.image.clone());
        args.extend(self.command.iter().cloned());
        args
    }
}

pub struct ArgumentBuilder<'a> {
    config: &'a LauncherConfig,
    options: &'a RuntimeOptions,
}

impl<'a> ArgumentBuilder<'a> {
    pub fn new(config: &'a LauncherConfig, options: &'a RuntimeOptions) -> Self {
        Self { config, options }
    }

    /// The long-lived application container
    pub fn container(&self, merged: &MergedConfig) -> ContainerSpec {
        let hostname = self.hostname(merged);
        let mac_address = if self.options.skip_mac_address {
            None
        } else {
            Some(mac_address_for(&hostname))
        };

        let (restart, attach) = if self.config.supervised {
            (RestartPolicy::No, AttachMode::Foreground)
        } else {
            (RestartPolicy::Always, AttachMode::Detached)
        };

        ContainerSpec {
            name: Some(merged.name.clone()),
            hostname: Some(hostname),
            mac_address,
            restart: Some(restart),
            attach,
            remove_on_exit: false,
            tty: true,
            env: merged.env.clone(),
            labels: merged.labels.clone(),
            ports: merged.ports.clone(),
            volumes: merged.volumes.clone(),
            links: merged.links.clone(),
            extra_args: self.extra_args(merged),
            image: self.run_image(merged),
            command: self.boot_command(merged),
        }
    }

    /// Transient provisioning container: no ports, hostname or restart
    /// policy, stdin open for the provisioning document
    pub fn bootstrap(
        &self,
        merged: &MergedConfig,
        name: &str,
        image: &str,
        command: Vec<String>,
    ) -> ContainerSpec {
        ContainerSpec {
            name: Some(name.to_string()),
            hostname: None,
            mac_address: None,
            restart: None,
            attach: AttachMode::Interactive,
            remove_on_exit: false,
            tty: false,
            env: merged.env.clone(),
            labels: merged.labels.clone(),
            ports: Vec::new(),
            volumes: merged.volumes.clone(),
            links: merged.links.clone(),
            extra_args: self.extra_args(merged),
            image: image.to_string(),
            command,
        }
    }

    /// Throwaway container running `command` in a shell on the run image
    pub fn disposable(&self, merged: &MergedConfig, command: &str) -> ContainerSpec {
        ContainerSpec {
            name: None,
            hostname: None,
            mac_address: None,
            restart: None,
            attach: AttachMode::Interactive,
            remove_on_exit: true,
            tty: false,
            env: merged.env.clone(),
            labels: merged.labels.clone(),
            ports: Vec::new(),
            volumes: merged.volumes.clone(),
            links: merged.links.clone(),
            extra_args: self.extra_args(merged),
            image: self.run_image(merged),
            command: vec!["/bin/bash".to_string(), "-c".to_string(), command.to_string()],
        }
    }

    /// Override, then configuration, then `<namespace>/<name>`
    pub fn run_image(&self, merged: &MergedConfig) -> String {
        self.options
            .run_image
            .clone()
            .filter(|i| !i.is_empty())
            .or_else(|| merged.run_image.clone())
            .unwrap_or_else(|| self.config.local_image(&merged.name))
    }

    /// Boot command split into argv words; empty when booting is disabled
    pub fn boot_command(&self, merged: &MergedConfig) -> Vec<String> {
        let command = match merged.boot_command {
            Some(ref cmd) => cmd.as_str(),
            None if merged.no_boot_command => return Vec::new(),
            None => DEFAULT_BOOT_COMMAND,
        };
        command.split_whitespace().map(str::to_string).collect()
    }

    pub fn hostname(&self, merged: &MergedConfig) -> String {
        let custom = merged
            .env
            .get(USE_HOSTNAME_ENV)
            .filter(|flag| flag.eq_ignore_ascii_case("true"))
            .and_then(|_| merged.env.get(HOSTNAME_ENV))
            .filter(|h| !h.is_empty());

        let hostname = match custom {
            Some(h) => h.clone(),
            None => format!("{}-{}", self.config.host_shortname, merged.name),
        };
        normalize_hostname(&hostname)
    }

    fn extra_args(&self, merged: &MergedConfig) -> Vec<String> {
        merged
            .docker_args
            .iter()
            .chain(self.options.docker_args.iter())
            .flat_map(|a| a.split_whitespace().map(str::to_string))
            .collect()
    }
}

/// Engines reject underscores in hostnames
pub fn normalize_hostname(hostname: &str) -> String {
    hostname.replace('_', "-")
}

/// Locally administered unicast MAC derived from the hostname
pub fn mac_address_for(hostname: &str) -> String {
    let digest = Sha256::digest(normalize_hostname(hostname).as_bytes());
    let tail = hex::encode(&digest[..5]);
    let octets: Vec<&str> = (0..5).map(|i| &tail[i * 2..i * 2 + 2]).collect();
    format!("02:{}", octets.join(":"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge::ConfigMerger;

    fn merged(yaml: &str) -> MergedConfig {
        ConfigMerger::new("app")
            .merge_sources(&[("containers/app.yml", yaml)])
            .unwrap()
    }

    fn config() -> LauncherConfig {
        LauncherConfig::builder().host_shortname("web_01").build()
    }

    #[test]
    fn test_mac_is_deterministic() {
        let a = mac_address_for("host-app");
        assert_eq!(a, mac_address_for("host-app"));
        assert_ne!(a, mac_address_for("host-apq"));
        assert!(a.starts_with("02:"));
        assert_eq!(a.len(), 17);
        assert_eq!(a.split(':').count(), 6);
    }

    #[test]
    fn test_mac_uses_normalized_hostname() {
        assert_eq!(mac_address_for("web_app"), mac_address_for("web-app"));
    }

    #[test]
    fn test_default_hostname_is_normalized() {
        let config = config();
        let options = RuntimeOptions::default();
        let builder = ArgumentBuilder::new(&config, &options);

        assert_eq!(builder.hostname(&merged("")), "web-01-app");
    }

    #[test]
    fn test_custom_hostname() {
        let config = config();
        let options = RuntimeOptions::default();
        let builder = ArgumentBuilder::new(&config, &options);

        let m = merged("env: {DOCKER_USE_HOSTNAME: true, DOCKER_HOSTNAME: forum_example}");
        assert_eq!(builder.hostname(&m), "forum-example");

        let m = merged("env: {DOCKER_HOSTNAME: forum.example.com}");
        assert_eq!(builder.hostname(&m), "web-01-app");
    }

    #[test]
    fn test_run_image_resolution() {
        let config = config();
        let none = RuntimeOptions::default();
        let overridden = RuntimeOptions {
            run_image: Some("custom/image:2".into()),
            ..Default::default()
        };

        let m = merged("");
        assert_eq!(ArgumentBuilder::new(&config, &none).run_image(&m), "local_discourse/app");

        let m = merged("run_image: registry/app:1");
        assert_eq!(ArgumentBuilder::new(&config, &none).run_image(&m), "registry/app:1");
        assert_eq!(ArgumentBuilder::new(&config, &overridden).run_image(&m), "custom/image:2");
    }

    #[test]
    fn test_boot_command_resolution() {
        let config = config();
        let options = RuntimeOptions::default();
        let builder = ArgumentBuilder::new(&config, &options);

        assert_eq!(builder.boot_command(&merged("")), vec!["/sbin/boot"]);
        assert!(builder.boot_command(&merged("no_boot_command: true")).is_empty());
        assert_eq!(
            builder.boot_command(&merged("boot_command: /init\nno_boot_command: true")),
            vec!["/init"]
        );
    }

    #[test]
    fn test_multi_word_boot_command_is_split() {
        let config = config();
        let options = RuntimeOptions::default();
        let m = merged("boot_command: /sbin/boot  --verbose");

        let args = ArgumentBuilder::new(&config, &options).container(&m).to_args();
        assert_eq!(
            &args[args.len() - 3..],
            &["local_discourse/app", "/sbin/boot", "--verbose"]
        );
    }

    #[test]
    fn test_container_args_unsupervised() {
        let config = config();
        let options = RuntimeOptions {
            docker_args: Some("--shm-size=512m".into()),
            ..Default::default()
        };
        let m = merged(
            "expose: [\"80\", \"443:443\"]\nvolumes: [{host: /srv, guest: /shared}]\nlinks: [{name: db, alias: data}]\ndocker_args: --cpus 2",
        );

        let spec = ArgumentBuilder::new(&config, &options).container(&m);
        assert_eq!(spec.restart, Some(RestartPolicy::Always));
        assert_eq!(spec.attach, AttachMode::Detached);

        let args = spec.to_args();
        let joined = args.join(" ");
        assert!(joined.starts_with("--name app --restart=always -d -t"));
        assert!(joined.contains("-e LANG=en_US.UTF-8"));
        assert!(joined.contains("-h web-01-app"));
        assert!(joined.contains("--expose 80 -p 443:443"));
        assert!(joined.contains("-v /srv:/shared"));
        assert!(joined.contains("--link db:data"));
        assert!(joined.contains("--mac-address 02:"));
        assert!(joined.ends_with("--cpus 2 --shm-size=512m local_discourse/app /sbin/boot"));
    }

    #[test]
    fn test_container_args_supervised_without_mac() {
        let config = LauncherConfig::builder()
            .host_shortname("h")
            .supervised(true)
            .build();
        let options = RuntimeOptions {
            skip_mac_address: true,
            ..Default::default()
        };

        let spec = ArgumentBuilder::new(&config, &options).container(&merged(""));
        assert_eq!(spec.restart, Some(RestartPolicy::No));
        assert_eq!(spec.attach, AttachMode::Foreground);
        assert_eq!(spec.mac_address, None);

        let args = spec.to_args();
        assert!(args.contains(&"--restart=no".to_string()));
        assert!(!args.contains(&"-d".to_string()));
        assert!(!args.contains(&"--mac-address".to_string()));
    }

    #[test]
    fn test_bootstrap_spec_omits_runtime_settings() {
        let config = config();
        let options = RuntimeOptions::default();
        let m = merged("expose: [\"80:80\"]\nenv: {A: b}");

        let spec = ArgumentBuilder::new(&config, &options).bootstrap(
            &m,
            "app-bootstrap-1",
            "base:1",
            vec!["/bin/bash".into(), "-c".into(), "true".into()],
        );

        assert!(spec.ports.is_empty());
        assert_eq!(spec.hostname, None);
        assert_eq!(spec.restart, None);
        let args = spec.to_args();
        assert_eq!(&args[..2], &["--name", "app-bootstrap-1"]);
        assert!(args.contains(&"A=b".to_string()));
        assert_eq!(&args[args.len() - 4..], &["base:1", "/bin/bash", "-c", "true"]);
    }

    #[test]
    fn test_disposable_spec() {
        let config = config();
        let options = RuntimeOptions::default();
        let spec =
            ArgumentBuilder::new(&config, &options).disposable(&merged(""), "rake db:migrate");

        let args = spec.to_args();
        assert_eq!(args[0], "--rm");
        assert_eq!(
            &args[args.len() - 4..],
            &["local_discourse/app", "/bin/bash", "-c", "rake db:migrate"]
        );
    }
}
