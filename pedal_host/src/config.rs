use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },
}

/// Ordered switch ids for one preset. An empty id marks a pedal slot that
/// drives nothing.
#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
pub struct SwitchSet {
    #[serde(default)]
    pub switches: Vec<String>,
}

/// External bank -> preset -> switches table, with a fallback set for
/// unmapped banks or presets. Loaded once at startup, read-only afterwards.
#[derive(Deserialize, Debug, Clone)]
pub struct PresetTable {
    #[serde(default)]
    pub banks: HashMap<String, HashMap<String, SwitchSet>>,
    #[serde(default)]
    pub default: SwitchSet,
}

impl PresetTable {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        read_json(path)
    }
}

/// Raw parameter id -> human label, for the controller display.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct DisplayNames(HashMap<String, String>);

impl DisplayNames {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        read_json(path)
    }

    /// Unmapped ids pass through unchanged.
    pub fn resolve<'a>(&'a self, raw: &'a str) -> &'a str {
        self.0.get(raw).map(String::as_str).unwrap_or(raw)
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })
}
