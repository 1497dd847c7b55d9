//! Host settings from `consequences.yaml`

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use tracing::info;

use crate::error::{ConfigError, ConfigResult};
use crate::loader::load_yaml;

pub const CONFIG_FILE: &str = "consequences.yaml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomationConfig {
    /// Limit for a single condition or action call, unbounded when absent
    #[serde(default)]
    pub call_timeout_secs: Option<f64>,

    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            call_timeout_secs: None,
            max_depth: default_max_depth(),
        }
    }
}

impl AutomationConfig {
    pub fn call_timeout(&self) -> Option<Duration> {
        self.call_timeout_secs
            .filter(|secs| *secs > 0.0)
            .map(Duration::from_secs_f64)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AddonsConfig {
    /// Module names that are never loaded
    #[serde(default)]
    pub disabled: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsequencesConfig {
    /// Directory holding `.storage/`; relative paths are taken from the config directory
    #[serde(default)]
    pub storage_dir: Option<PathBuf>,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub automation: AutomationConfig,

    #[serde(default)]
    pub addons: AddonsConfig,

    /// Set by [`ConsequencesConfig::load`], never read from the file
    #[serde(skip)]
    pub config_dir: PathBuf,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_depth() -> usize {
    32
}

impl Default for ConsequencesConfig {
    fn default() -> Self {
        Self {
            storage_dir: None,
            log_level: default_log_level(),
            automation: AutomationConfig::default(),
            addons: AddonsConfig::default(),
            config_dir: PathBuf::from("."),
        }
    }
}

impl ConsequencesConfig {
    /// Load `consequences.yaml` from `config_dir`
    ///
    /// A missing file gives the defaults.
    pub fn load(config_dir: impl AsRef<Path>) -> ConfigResult<Self> {
        let config_dir = config_dir.as_ref();
        let path = config_dir.join(CONFIG_FILE);

        let mut config = if path.exists() {
            Self::from_yaml(&load_yaml(&path)?)?
        } else {
            info!("No {} in {:?}, using defaults", CONFIG_FILE, config_dir);
            Self::default()
        };
        config.config_dir = config_dir.to_path_buf();
        Ok(config)
    }

    pub fn from_yaml(yaml: &Value) -> ConfigResult<Self> {
        // An empty file parses as null
        if yaml.is_null() {
            return Ok(Self::default());
        }
        if !yaml.is_mapping() {
            return Err(ConfigError::InvalidValue {
                key: "root".to_string(),
                reason: "configuration must be a mapping".to_string(),
            });
        }

        let config: Self =
            serde_yaml::from_value(yaml.clone()).map_err(|e| ConfigError::InvalidValue {
                key: CONFIG_FILE.to_string(),
                reason: e.to_string(),
            })?;

        if config.automation.max_depth == 0 {
            return Err(ConfigError::InvalidValue {
                key: "automation.max_depth".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(config)
    }

    /// Where `.storage/` lives
    pub fn storage_dir(&self) -> PathBuf {
        match &self.storage_dir {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => self.config_dir.join(dir),
            None => self.config_dir.clone(),
        }
    }
}
