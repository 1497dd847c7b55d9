//! YAML loading with `!env_var` substitution

use std::fs;
use std::path::Path;

use serde_yaml::value::TaggedValue;
use serde_yaml::Value;
use tracing::{debug, trace};

use crate::error::{ConfigError, ConfigResult};

/// Read and parse a YAML file, substituting tags
pub fn load_yaml(path: impl AsRef<Path>) -> ConfigResult<Value> {
    let path = path.as_ref();
    debug!("Loading YAML file: {:?}", path);

    let content = fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;
    load_yaml_string(&content, path)
}

/// Parse YAML from a string, substituting tags
pub fn load_yaml_string(content: &str, source_path: &Path) -> ConfigResult<Value> {
    let value: Value = serde_yaml::from_str(content).map_err(|e| ConfigError::ParseYaml {
        path: source_path.to_path_buf(),
        source: e,
    })?;
    process_value(value)
}

fn process_value(value: Value) -> ConfigResult<Value> {
    match value {
        Value::Tagged(tagged) => process_tagged(*tagged),
        Value::Mapping(map) => {
            let mut result = serde_yaml::Mapping::new();
            for (k, v) in map {
                result.insert(process_value(k)?, process_value(v)?);
            }
            Ok(Value::Mapping(result))
        }
        Value::Sequence(seq) => Ok(Value::Sequence(
            seq.into_iter()
                .map(process_value)
                .collect::<ConfigResult<Vec<Value>>>()?,
        )),
        _ => Ok(value),
    }
}

fn process_tagged(tagged: TaggedValue) -> ConfigResult<Value> {
    let tag = tagged.tag.to_string();
    trace!("Processing tag '{}' with value {:?}", tag, tagged.value);

    match tag.as_str() {
        "!env_var" => process_env_var(tagged.value),
        _ => Ok(Value::Tagged(Box::new(TaggedValue {
            tag: tagged.tag,
            value: process_value(tagged.value)?,
        }))),
    }
}

/// `!env_var NAME` or `!env_var NAME default`
fn process_env_var(value: Value) -> ConfigResult<Value> {
    let Value::String(raw) = value else {
        return Err(ConfigError::InvalidValue {
            key: "!env_var".to_string(),
            reason: "environment variable name must be a string".to_string(),
        });
    };

    let raw = raw.trim();
    let (name, default) = match raw.split_once(char::is_whitespace) {
        Some((name, default)) => (name, Some(default.trim())),
        None => (raw, None),
    };

    let text = match (std::env::var(name), default) {
        (Ok(value), _) => {
            debug!("Substituted env var: {}", name);
            value
        }
        (Err(_), Some(default)) => {
            debug!("Env var {} not set, using default", name);
            default.to_string()
        }
        (Err(_), None) => {
            return Err(ConfigError::EnvVarNotFound {
                var: name.to_string(),
            })
        }
    };

    Ok(scalar(text))
}

/// Read substituted text as a YAML scalar so numbers and booleans keep their type
fn scalar(text: String) -> Value {
    match serde_yaml::from_str::<Value>(&text) {
        Ok(value @ (Value::Bool(_) | Value::Number(_))) => value,
        _ => Value::String(text),
    }
}
