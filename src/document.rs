//! Configuration documents and where they are loaded from

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Deserializer, Serialize};
use serde_yaml::{Mapping, Value};

use crate::config::CONTAINERS_DIR;
use crate::{Error, Result};

/// Host/guest path pair mounted into the container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeBinding {
    pub host: String,
    pub guest: String,
}

/// Link to another container under an alias
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkBinding {
    pub name: String,
    pub alias: String,
}

/// The fields of a document the launcher itself acts on
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct DocumentContent {
    #[serde(deserialize_with = "string_list")]
    pub templates: Vec<String>,
    #[serde(deserialize_with = "scalar_map")]
    pub env: BTreeMap<String, String>,
    #[serde(deserialize_with = "scalar_map")]
    pub labels: BTreeMap<String, String>,
    #[serde(deserialize_with = "scalar_map")]
    pub params: BTreeMap<String, String>,
    #[serde(deserialize_with = "string_list")]
    pub expose: Vec<String>,
    #[serde(deserialize_with = "volume_list")]
    pub volumes: Vec<VolumeBinding>,
    #[serde(deserialize_with = "link_list")]
    pub links: Vec<LinkBinding>,
    pub run_image: Option<String>,
    pub boot_command: Option<String>,
    pub no_boot_command: Option<bool>,
    pub base_image: Option<String>,
    pub docker_args: Option<String>,
    pub update_pups: Option<bool>,
    #[serde(deserialize_with = "string_list")]
    pub host_run: Vec<String>,
}

/// One parsed configuration or template document
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigDocument {
    pub id: String,
    pub content: DocumentContent,
    /// Full document as written, including keys only provisioning reads
    pub raw: Value,
}

impl ConfigDocument {
    /// Parse document text; `id` is used in diagnostics
    pub fn parse(id: impl Into<String>, text: &str) -> Result<Self> {
        let id = id.into();
        let syntax = |message: String| Error::ConfigSyntax {
            path: id.clone(),
            message,
        };

        let raw: Value = serde_yaml::from_str(text).map_err(|e| syntax(e.to_string()))?;
        let raw = match raw {
            Value::Null => Value::Mapping(Mapping::new()),
            Value::Mapping(_) => raw,
            _ => return Err(syntax("top level must be a mapping".into())),
        };

        let content: DocumentContent =
            serde_yaml::from_value(raw.clone()).map_err(|e| syntax(e.to_string()))?;

        Ok(Self { id, content, raw })
    }
}

/// Anything documents can be read from by identifier
pub trait DocumentSource {
    /// Raw text of a document
    fn read(&self, id: &str) -> Result<String>;

    fn load(&self, id: &str) -> Result<ConfigDocument> {
        let text = self.read(id)?;
        ConfigDocument::parse(id, &text)
    }
}

/// Documents on disk; identifiers are paths relative to the root
pub struct DocumentStore {
    root: PathBuf,
}

impl DocumentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Identifier of a named configuration
    pub fn config_id(name: &str) -> String {
        format!("{}/{}.yml", CONTAINERS_DIR, name)
    }
}

impl DocumentSource for DocumentStore {
    fn read(&self, id: &str) -> Result<String> {
        let path = self.root.join(id);
        tracing::debug!(document = %id, path = ?path, "Reading document");

        match std::fs::read_to_string(&path) {
            Ok(text) => Ok(text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::ConfigNotFound(id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl DocumentSource for BTreeMap<String, String> {
    fn read(&self, id: &str) -> Result<String> {
        self.get(id)
            .cloned()
            .ok_or_else(|| Error::ConfigNotFound(id.to_string()))
    }
}

fn scalar_to_string<E: serde::de::Error>(value: Value) -> std::result::Result<String, E> {
    match value {
        Value::String(s) => Ok(s),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Null => Ok(String::new()),
        other => Err(E::custom(format!("expected a scalar, found {:?}", other))),
    }
}

fn scalar_map<'de, D>(deserializer: D) -> std::result::Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let map = Option::<BTreeMap<String, Value>>::deserialize(deserializer)?.unwrap_or_default();
    map.into_iter()
        .map(|(k, v)| Ok((k, scalar_to_string(v)?)))
        .collect()
}

fn string_list<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let list = Option::<Vec<Value>>::deserialize(deserializer)?.unwrap_or_default();
    list.into_iter().map(scalar_to_string).collect()
}

#[derive(Deserialize)]
#[serde(untagged)]
enum VolumeEntry {
    Wrapped { volume: VolumeBinding },
    Plain(VolumeBinding),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LinkEntry {
    Wrapped { link: LinkBinding },
    Plain(LinkBinding),
}

fn volume_list<'de, D>(deserializer: D) -> std::result::Result<Vec<VolumeBinding>, D::Error>
where
    D: Deserializer<'de>,
{
    let list = Option::<Vec<VolumeEntry>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(list
        .into_iter()
        .map(|entry| match entry {
            VolumeEntry::Wrapped { volume } => volume,
            VolumeEntry::Plain(volume) => volume,
        })
        .collect())
}

fn link_list<'de, D>(deserializer: D) -> std::result::Result<Vec<LinkBinding>, D::Error>
where
    D: Deserializer<'de>,
{
    let list = Option::<Vec<LinkEntry>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(list
        .into_iter()
        .map(|entry| match entry {
            LinkEntry::Wrapped { link } => link,
            LinkEntry::Plain(link) => link,
        })
        .collect())
}
