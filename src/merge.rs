//! Folding an ordered document list into one configuration

use std::collections::BTreeMap;

use serde::Serialize;
use serde_yaml::{Mapping, Value};

use crate::document::{ConfigDocument, LinkBinding, VolumeBinding};
use crate::Result;

/// Placeholder replaced with the configuration name in env and label values
pub const CONFIG_PLACEHOLDER: &str = "{{config}}";

/// Lowest-priority environment entry, applied before any document
pub const DEFAULT_ENV: (&str, &str) = ("LANG", "en_US.UTF-8");

/// How a container port is made reachable
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum PortDirective {
    /// Bare port, reachable from linked containers only
    Expose(String),
    /// `host:container` mapping
    Publish(String),
}

impl PortDirective {
    pub fn parse(spec: &str) -> Self {
        if spec.contains(':') {
            PortDirective::Publish(spec.to_string())
        } else {
            PortDirective::Expose(spec.to_string())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergedConfig {
    pub name: String,
    pub env: BTreeMap<String, String>,
    pub labels: BTreeMap<String, String>,
    pub params: BTreeMap<String, String>,
    pub ports: Vec<PortDirective>,
    pub volumes: Vec<VolumeBinding>,
    pub links: Vec<LinkBinding>,
    pub run_image: Option<String>,
    pub boot_command: Option<String>,
    pub no_boot_command: bool,
    pub base_image: Option<String>,
    pub docker_args: Option<String>,
    pub update_pups: bool,
    pub host_run: Vec<String>,
    /// Deep merge of every document, fed to provisioning
    #[serde(skip)]
    pub provisioning: Value,
}

impl MergedConfig {
    fn empty(name: &str) -> Self {
        let mut env = BTreeMap::new();
        env.insert(DEFAULT_ENV.0.to_string(), DEFAULT_ENV.1.to_string());

        Self {
            name: name.to_string(),
            env,
            labels: BTreeMap::new(),
            params: BTreeMap::new(),
            ports: Vec::new(),
            volumes: Vec::new(),
            links: Vec::new(),
            run_image: None,
            boot_command: None,
            no_boot_command: false,
            base_image: None,
            docker_args: None,
            update_pups: true,
            host_run: Vec::new(),
            provisioning: Value::Mapping(Mapping::new()),
        }
    }

    /// `host_run` commands with `$param` placeholders filled in
    pub fn host_commands(&self) -> Vec<String> {
        self.host_run
            .iter()
            .map(|cmd| substitute_params(cmd, &self.params))
            .collect()
    }

    /// Provisioning document as YAML text
    pub fn provisioning_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(&self.provisioning)?)
    }
}

pub struct ConfigMerger {
    name: String,
}

impl ConfigMerger {
    /// Merger for the configuration called `name`
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// Fold already-parsed documents, later documents overriding earlier ones
    pub fn merge(&self, documents: &[ConfigDocument]) -> MergedConfig {
        let mut merged = MergedConfig::empty(&self.name);

        for doc in documents {
            let c = &doc.content;

            merged.env.extend(c.env.clone());
            merged.labels.extend(c.labels.clone());
            merged.params.extend(c.params.clone());

            merged.ports.extend(c.expose.iter().map(|p| PortDirective::parse(p)));
            merged.volumes.extend(c.volumes.iter().cloned());
            merged.links.extend(c.links.iter().cloned());
            merged.host_run.extend(c.host_run.iter().cloned());

            replace_scalar(&mut merged.run_image, &c.run_image);
            replace_scalar(&mut merged.boot_command, &c.boot_command);
            replace_scalar(&mut merged.base_image, &c.base_image);
            replace_scalar(&mut merged.docker_args, &c.docker_args);
            if let Some(no_boot) = c.no_boot_command {
                merged.no_boot_command = no_boot;
            }
            if let Some(update) = c.update_pups {
                merged.update_pups = update;
            }

            deep_merge(&mut merged.provisioning, &doc.raw);
        }

        for value in merged.env.values_mut().chain(merged.labels.values_mut()) {
            if value.contains(CONFIG_PLACEHOLDER) {
                *value = value.replace(CONFIG_PLACEHOLDER, &self.name);
            }
        }

        self.finish_provisioning(&mut merged);

        tracing::debug!(
            config = %self.name,
            documents = documents.len(),
            env = merged.env.len(),
            ports = merged.ports.len(),
            "Merged configuration"
        );
        merged
    }

    /// Parse every `(id, text)` source, then merge. Nothing is merged
    /// unless all of them parse.
    pub fn merge_sources(&self, sources: &[(&str, &str)]) -> Result<MergedConfig> {
        let documents = sources
            .iter()
            .map(|(id, text)| ConfigDocument::parse(*id, text))
            .collect::<Result<Vec<_>>>()?;
        Ok(self.merge(&documents))
    }

    fn finish_provisioning(&self, merged: &mut MergedConfig) {
        if let Value::Mapping(map) = &mut merged.provisioning {
            map.remove("templates");
            map.insert(Value::from("env"), string_mapping(&merged.env));
            if !merged.labels.is_empty() {
                map.insert(Value::from("labels"), string_mapping(&merged.labels));
            }
        }
    }
}

fn replace_scalar(current: &mut Option<String>, incoming: &Option<String>) {
    if let Some(value) = incoming.as_ref().filter(|v| !v.is_empty()) {
        *current = Some(value.clone());
    }
}

fn string_mapping(map: &BTreeMap<String, String>) -> Value {
    Value::Mapping(
        map.iter()
            .map(|(k, v)| (Value::from(k.as_str()), Value::from(v.as_str())))
            .collect(),
    )
}

/// Mappings merge per key, sequences concatenate, anything else is replaced
pub fn deep_merge(into: &mut Value, from: &Value) {
    match (into, from) {
        (Value::Mapping(target), Value::Mapping(source)) => {
            for (key, value) in source {
                match target.get_mut(key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        target.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (Value::Sequence(target), Value::Sequence(source)) => {
            target.extend(source.iter().cloned());
        }
        (_, Value::Null) => {}
        (target, source) => *target = source.clone(),
    }
}

/// Replace `$name` with `params[name]`; unknown names are left as written
pub fn substitute_params(template: &str, params: &BTreeMap<String, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }

        let mut name = String::new();
        while let Some(&next) = chars.peek() {
            if next.is_ascii_alphanumeric() || next == '_' {
                name.push(next);
                chars.next();
            } else {
                break;
            }
        }

        match params.get(&name) {
            Some(value) if !name.is_empty() => out.push_str(value),
            _ => {
                out.push('$');
                out.push_str(&name);
            }
        }
    }
    out
}
