use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::codec::Params;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("failed to read template registry {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid template registry: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateKind {
    Block,
    Inline,
}

/// Shape and default of one template parameter. An absent `default` means
/// "no default"; an explicit `null` is a declared default of `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeSpec {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(
        default,
        deserialize_with = "declared_value",
        skip_serializing_if = "Option::is_none"
    )]
    pub default: Option<Value>,
    #[serde(default)]
    pub description: String,
}

/// Only runs when the key is present, so `null` stays `Some(Value::Null)`.
fn declared_value<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateDefinition {
    #[serde(rename = "displayName")]
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type")]
    pub kind: TemplateKind,
    #[serde(default)]
    pub attributes: BTreeMap<String, AttributeSpec>,
    #[serde(rename = "template", default)]
    pub body: String,
}

impl TemplateDefinition {
    /// Every declared default, keyed by attribute name.
    pub fn defaults(&self) -> Params {
        self.attributes
            .iter()
            .filter_map(|(name, spec)| Some((name.clone(), spec.default.clone()?)))
            .collect()
    }
}

/// Read-only catalog of insertable templates keyed by template id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TemplateRegistry {
    templates: BTreeMap<String, TemplateDefinition>,
}

impl TemplateRegistry {
    pub fn new(templates: impl IntoIterator<Item = (String, TemplateDefinition)>) -> Self {
        Self {
            templates: templates.into_iter().collect(),
        }
    }

    pub fn from_json_str(s: &str) -> Result<Self, RegistryError> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, RegistryError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| RegistryError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let registry = Self::from_json_str(&raw)?;
        log::debug!(
            "loaded {} template(s) from {}",
            registry.len(),
            path.display()
        );
        Ok(registry)
    }

    pub fn get(&self, id: &str) -> Option<&TemplateDefinition> {
        self.templates.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.templates.contains_key(id)
    }

    pub fn defaults(&self, id: &str) -> Option<Params> {
        self.get(id).map(TemplateDefinition::defaults)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &TemplateDefinition)> {
        self.templates.iter().map(|(id, def)| (id.as_str(), def))
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}
