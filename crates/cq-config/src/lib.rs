//! Configuration for the Consequences host
//!
//! Settings live in `consequences.yaml` inside the config directory. Values
//! can be taken from the environment with `!env_var NAME [default]`.
//!
//! ```ignore
//! use cq_config::ConsequencesConfig;
//!
//! let config = ConsequencesConfig::load("/etc/consequences")?;
//! println!("storing data in {:?}", config.storage_dir());
//! ```

mod config;
mod error;
mod loader;

pub use config::{AddonsConfig, AutomationConfig, ConsequencesConfig, CONFIG_FILE};
pub use error::{ConfigError, ConfigResult};
pub use loader::{load_yaml, load_yaml_string};

pub use serde_yaml::Value;
