use std::error::Error;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::alerts::CURRENT_SCHEMA_VERSION;

pub const CONFIG_FILE_NAME: &str = "alertsync.toml";

/// Settings the reconciliation engine receives at construction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub debug_logging: bool,
    pub schema_version: u32,
    /// Orphaned workflow entries untouched for this many days are dropped on
    /// the next write. `None` keeps them forever.
    pub orphan_retention_days: Option<u32>,
    pub backup_corrupt_documents: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            debug_logging: false,
            schema_version: CURRENT_SCHEMA_VERSION,
            orphan_retention_days: None,
            backup_corrupt_documents: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub alerts_file: String,
    pub workflow_file: String,
    pub cases_file: String,
    pub engine: EngineConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("."),
            alerts_file: "alerts.csv".to_string(),
            workflow_file: "alerts-workflow.json".to_string(),
            cases_file: "cases.json".to_string(),
            engine: EngineConfig::default(),
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, source: std::io::Error },
    Toml(toml::de::Error),
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io { path, source } => {
                write!(f, "failed to read config {}: {}", path.display(), source)
            }
            ConfigError::Toml(err) => write!(f, "invalid config TOML: {}", err),
            ConfigError::Invalid(message) => write!(f, "invalid config: {}", message),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            ConfigError::Toml(err) => Some(err),
            ConfigError::Invalid(_) => None,
        }
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(value: toml::de::Error) -> Self {
        ConfigError::Toml(value)
    }
}

impl AppConfig {
    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads `explicit` when given, else `<data_dir>/alertsync.toml` if it
    /// exists, else defaults. `data_dir` from the caller overrides the file.
    pub fn load(explicit: Option<&Path>, data_dir: Option<&Path>) -> Result<Self, ConfigError> {
        let candidate = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => {
                let implicit = data_dir
                    .unwrap_or_else(|| Path::new("."))
                    .join(CONFIG_FILE_NAME);
                implicit.exists().then_some(implicit)
            }
        };

        let mut config = match candidate {
            Some(path) => {
                let raw = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
                    path: path.clone(),
                    source,
                })?;
                Self::from_toml(&raw)?
            }
            None => Self::default(),
        };
        if let Some(dir) = data_dir {
            config.data_dir = dir.to_path_buf();
        }
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("alerts_file", &self.alerts_file),
            ("workflow_file", &self.workflow_file),
            ("cases_file", &self.cases_file),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("{} must not be empty", field)));
            }
        }
        if self.engine.schema_version == 0 {
            return Err(ConfigError::Invalid(
                "engine.schema_version must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
