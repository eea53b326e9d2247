//! Project configuration stored in `.squeeze/config.yml`.
//!
//! Values are addressed by dotted paths into nested YAML mappings, e.g.
//! `similarity.rename`.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_yaml::Value;
use std::fs;
use std::path::Path;
use tracing::{debug, instrument};

use crate::error::{Error, Result};
use crate::repo::{RepoKind, Similarity};
use crate::types::ChangeKind;

#[derive(Debug, Clone, Default)]
pub struct Config {
    data: Value,
}

impl Config {
    /// Reads and parses a YAML config file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid YAML.
    #[instrument]
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        debug!(bytes = contents.len(), "Config file read");
        Self::parse(&contents)
    }

    /// # Errors
    ///
    /// Returns an error if `contents` is not valid YAML.
    pub fn parse(contents: &str) -> Result<Self> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(Self {
            data: serde_yaml::from_str(contents)?,
        })
    }

    /// Looks up a dotted key path. Returns `None` if any segment is missing.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        key.split('.')
            .try_fold(&self.data, |node, segment| node.as_mapping()?.get(segment))
    }

    /// Looks up a dotted key path and deserializes the value found there.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] if the value has the wrong shape.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        self.get(key)
            .map(|value| {
                serde_yaml::from_value(value.clone())
                    .map_err(|e| Error::ConfigError(format!("{key}: {e}")))
            })
            .transpose()
    }
}

/// A shell command to run for matching changes.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HookConfig {
    pub changes: Vec<ChangeKind>,
    pub run: String,
}

/// Settings the runner understands, with defaults applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub repo: RepoKind,
    pub similarity: Similarity,
    pub hooks: Vec<HookConfig>,
}

impl Settings {
    /// # Errors
    ///
    /// Returns an error for an unsupported `repo`, a similarity outside
    /// 0 to 100, or a malformed `hooks` list.
    pub fn from_config(config: &Config) -> Result<Self> {
        let repo = config
            .get_as::<String>("repo")?
            .map_or(Ok(RepoKind::default()), |name| name.parse::<RepoKind>())?;

        let percentage = |key: &str| -> Result<u8> {
            let value = config.get_as::<i64>(key)?.unwrap_or(100);
            u8::try_from(value)
                .map_err(|_| Error::ConfigError(format!("{key} must be between 0 and 100, got {value}")))
        };
        let similarity = Similarity::new(
            percentage("similarity.rename")?,
            percentage("similarity.copy")?,
        )?;

        let hooks = config.get_as::<Vec<HookConfig>>("hooks")?.unwrap_or_default();

        Ok(Self {
            repo,
            similarity,
            hooks,
        })
    }
}
