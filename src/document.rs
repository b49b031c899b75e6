use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Serialize, de::DeserializeOwned};

use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Yaml,
    Json,
}

impl DocumentFormat {
    pub const EXTENSIONS: [&'static str; 3] = ["yaml", "yml", "json"];

    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "yaml" | "yml" => Some(DocumentFormat::Yaml),
            "json" => Some(DocumentFormat::Json),
            _ => None,
        }
    }

    pub fn parse<T: DeserializeOwned>(self, input: &str) -> Result<T, String> {
        match self {
            DocumentFormat::Yaml => serde_yaml::from_str(input).map_err(|err| err.to_string()),
            DocumentFormat::Json => serde_json::from_str(input).map_err(|err| err.to_string()),
        }
    }

    pub fn render<T: Serialize>(self, value: &T) -> Result<String, String> {
        match self {
            DocumentFormat::Yaml => serde_yaml::to_string(value).map_err(|err| err.to_string()),
            DocumentFormat::Json => {
                serde_json::to_string_pretty(value).map_err(|err| err.to_string())
            }
        }
    }
}

pub fn candidates(root: &Path, stem: &str) -> Vec<PathBuf> {
    DocumentFormat::EXTENSIONS
        .iter()
        .map(|ext| root.join(format!("{stem}.{ext}")))
        .collect()
}

pub fn load_from_path<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let format = DocumentFormat::from_path(path).ok_or_else(|| ConfigError::Malformed {
        path: path.to_path_buf(),
        message: "expected a .yaml, .yml, or .json extension".to_string(),
    })?;
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    format.parse(&raw).map_err(|message| ConfigError::Malformed {
        path: path.to_path_buf(),
        message,
    })
}

pub fn save_to_path<T: Serialize>(path: &Path, value: &T) -> Result<(), ConfigError> {
    let format = DocumentFormat::from_path(path).unwrap_or(DocumentFormat::Yaml);
    let rendered = format.render(value).map_err(|message| ConfigError::Malformed {
        path: path.to_path_buf(),
        message,
    })?;
    fs::write(path, rendered).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}
