use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::registry::{RegistryError, TemplateRegistry};

pub const DEFAULT_TRIGGER: char = '/';
pub const DEFAULT_MAX_RESULTS: usize = 10;
pub const DEFAULT_UPLOAD_ENDPOINT: &str = "/api/images";
pub const DEFAULT_UPLOAD_FIELD: &str = "file";
pub const DEFAULT_URL_FIELD: &str = "url";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Behaviour of the slash palette.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaletteConfig {
    pub trigger: char,
    /// Whether the query may contain whitespace. When false, typing a space
    /// closes the palette.
    pub allow_spaces: bool,
    /// Only open when the trigger is the first character of a text block.
    pub start_of_line: bool,
    pub max_results: usize,
}

impl Default for PaletteConfig {
    fn default() -> Self {
        Self {
            trigger: DEFAULT_TRIGGER,
            allow_spaces: false,
            start_of_line: true,
            max_results: DEFAULT_MAX_RESULTS,
        }
    }
}

impl PaletteConfig {
    pub fn with_defaults(mut self) -> Self {
        if self.max_results == 0 {
            self.max_results = DEFAULT_MAX_RESULTS;
        }
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    pub endpoint: String,
    pub field_name: String,
    /// JSON field of a successful response that carries the image URL.
    pub url_field: String,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_UPLOAD_ENDPOINT.to_string(),
            field_name: DEFAULT_UPLOAD_FIELD.to_string(),
            url_field: DEFAULT_URL_FIELD.to_string(),
        }
    }
}

impl UploadConfig {
    pub fn with_defaults(mut self) -> Self {
        if self.endpoint.trim().is_empty() {
            self.endpoint = DEFAULT_UPLOAD_ENDPOINT.to_string();
        }
        if self.field_name.trim().is_empty() {
            self.field_name = DEFAULT_UPLOAD_FIELD.to_string();
        }
        if self.url_field.trim().is_empty() {
            self.url_field = DEFAULT_URL_FIELD.to_string();
        }
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JinjaConfig {
    /// Template registry JSON. Relative paths resolve against the config file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registry_path: Option<PathBuf>,
    pub palette: PaletteConfig,
    pub upload: UploadConfig,
}

impl JinjaConfig {
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(s)?;
        Ok(config.with_defaults())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_json_str(&raw)?;
        if let (Some(registry_path), Some(base)) = (config.registry_path.as_mut(), path.parent()) {
            if registry_path.is_relative() {
                *registry_path = base.join(&*registry_path);
            }
        }
        Ok(config)
    }

    pub fn with_defaults(mut self) -> Self {
        self.palette = self.palette.with_defaults();
        self.upload = self.upload.with_defaults();
        self
    }

    /// Loads the configured registry, or an empty one when no path is set.
    pub fn load_registry(&self) -> Result<TemplateRegistry, RegistryError> {
        match &self.registry_path {
            Some(path) => TemplateRegistry::load(path),
            None => Ok(TemplateRegistry::default()),
        }
    }
}
