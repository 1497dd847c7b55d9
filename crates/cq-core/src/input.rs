//! User inputs
//!
//! Conditions, actions, event constructors and addon initialisers declare the
//! inputs they accept as [`UserInput`]s. Users answer with [`UserInputValue`]s,
//! matched against the schema by `unique_id`.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// The kind of data an input asks the user for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputKind {
    /// A reference to a variable offered by an addon instance
    Variable,
    Boolean,
    String,
    /// A string that parses as an absolute URL
    Url,
    Number,
}

impl InputKind {
    /// Check that a single JSON value has the shape this kind expects
    pub fn check(&self, value: &Value) -> Result<(), String> {
        match self {
            InputKind::Boolean if value.is_boolean() => Ok(()),
            InputKind::Boolean => Err(format!("expected a boolean, got {}", value)),
            InputKind::String if value.is_string() => Ok(()),
            InputKind::String => Err(format!("expected a string, got {}", value)),
            InputKind::Number if value.is_number() => Ok(()),
            InputKind::Number => Err(format!("expected a number, got {}", value)),
            InputKind::Url => match value.as_str() {
                Some(raw) => url::Url::parse(raw)
                    .map(|_| ())
                    .map_err(|e| format!("invalid URL '{}': {}", raw, e)),
                None => Err(format!("expected a URL string, got {}", value)),
            },
            InputKind::Variable => VariableRef::from_value(value)
                .map(|_| ())
                .ok_or_else(|| format!("expected a variable reference, got {}", value)),
        }
    }
}

/// Addon-supplied check that can reject a user's value
#[async_trait]
pub trait InputValidator: Send + Sync {
    /// Returns the message to show the user, or `None` if the value is accepted
    async fn validate(&self, value: &Value) -> Option<String>;
}

/// Addon-supplied filter over the options offered for an input
#[async_trait]
pub trait InputFilter: Send + Sync {
    async fn filter(&self, options: Vec<Value>) -> Vec<Value>;
}

/// An input to present to the user when configuring a capability
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInput {
    /// Identifier, unique within the owning capability and stable across restarts
    pub unique_id: String,

    /// Whether a value must be supplied
    #[serde(default)]
    pub required: bool,

    /// Whether the value may be an array of several values
    #[serde(default)]
    pub allows_multiple: bool,

    pub kind: InputKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,

    /// User-facing label
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// User-facing hint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,

    #[serde(skip)]
    pub validator: Option<Arc<dyn InputValidator>>,

    #[serde(skip)]
    pub filter: Option<Arc<dyn InputFilter>>,
}

impl UserInput {
    /// Create an optional, single-valued input
    pub fn new(unique_id: impl Into<String>, kind: InputKind) -> Self {
        Self {
            unique_id: unique_id.into(),
            required: false,
            allows_multiple: false,
            kind,
            default_value: None,
            name: None,
            hint: None,
            validator: None,
            filter: None,
        }
    }

    /// Mark the input as required
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Allow an array of values
    pub fn multiple(mut self) -> Self {
        self.allows_multiple = true;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default_value = Some(value);
        self
    }

    pub fn with_validator(mut self, validator: Arc<dyn InputValidator>) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn with_filter(mut self, filter: Arc<dyn InputFilter>) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Name used in user-facing messages (falls back to the unique id)
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.unique_id)
    }

    /// Check a supplied value against the declared kind and multiplicity
    pub fn check_value(&self, value: &Value) -> Result<(), String> {
        match value {
            Value::Array(items) => {
                if !self.allows_multiple {
                    return Err("does not accept multiple values".to_string());
                }
                items.iter().try_for_each(|item| self.kind.check(item))
            }
            _ => self.kind.check(value),
        }
    }
}

impl fmt::Debug for UserInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserInput")
            .field("unique_id", &self.unique_id)
            .field("required", &self.required)
            .field("allows_multiple", &self.allows_multiple)
            .field("kind", &self.kind)
            .field("default_value", &self.default_value)
            .field("name", &self.name)
            .field("has_validator", &self.validator.is_some())
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

/// A value provided by the user for a [`UserInput`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInputValue {
    pub unique_id: String,
    pub value: Value,
}

impl UserInputValue {
    pub fn new(unique_id: impl Into<String>, value: Value) -> Self {
        Self {
            unique_id: unique_id.into(),
            value,
        }
    }
}

/// Find the value supplied for an input
pub fn find_input<'a>(values: &'a [UserInputValue], unique_id: &str) -> Option<&'a Value> {
    values
        .iter()
        .find(|v| v.unique_id == unique_id)
        .map(|v| &v.value)
}

/// Fill in declared defaults for inputs the user left out
pub fn apply_defaults(schema: &[UserInput], values: &[UserInputValue]) -> Vec<UserInputValue> {
    let mut resolved = values.to_vec();
    for input in schema {
        if let Some(default) = &input.default_value {
            if find_input(values, &input.unique_id).is_none() {
                resolved.push(UserInputValue::new(input.unique_id.clone(), default.clone()));
            }
        }
    }
    resolved
}

/// Reference to a variable, used as the value of a `variable` input
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableRef {
    /// Module name of the owning addon
    pub module: String,

    /// Instance of the module, required when the module has several
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<String>,

    pub variable_id: String,
}

impl VariableRef {
    pub fn new(module: impl Into<String>, variable_id: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            instance_id: None,
            variable_id: variable_id.into(),
        }
    }

    pub fn with_instance(mut self, instance_id: impl Into<String>) -> Self {
        self.instance_id = Some(instance_id.into());
        self
    }

    pub fn from_value(value: &Value) -> Option<Self> {
        serde_json::from_value(value.clone()).ok()
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// A single reason an input set was rejected
///
/// `unique_id` identifies the schema input; `input` is its display name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputProblem {
    /// A required input has no value
    Missing { unique_id: String, input: String },
    /// A value was supplied but rejected
    Rejected {
        unique_id: String,
        input: String,
        reason: String,
    },
}

impl InputProblem {
    fn missing(schema: &UserInput) -> Self {
        InputProblem::Missing {
            unique_id: schema.unique_id.clone(),
            input: schema.display_name().to_string(),
        }
    }

    fn rejected(schema: &UserInput, reason: String) -> Self {
        InputProblem::Rejected {
            unique_id: schema.unique_id.clone(),
            input: schema.display_name().to_string(),
            reason,
        }
    }

    pub fn unique_id(&self) -> &str {
        match self {
            InputProblem::Missing { unique_id, .. } | InputProblem::Rejected { unique_id, .. } => {
                unique_id
            }
        }
    }

    /// Display name of the input
    pub fn input(&self) -> &str {
        match self {
            InputProblem::Missing { input, .. } | InputProblem::Rejected { input, .. } => input,
        }
    }
}

/// Inputs failed validation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}", self.describe())]
pub struct ValidationError {
    pub problems: Vec<InputProblem>,
}

impl ValidationError {
    /// Names of required inputs that were not supplied
    pub fn missing_inputs(&self) -> Vec<&str> {
        self.problems
            .iter()
            .filter_map(|p| match p {
                InputProblem::Missing { input, .. } => Some(input.as_str()),
                InputProblem::Rejected { .. } => None,
            })
            .collect()
    }

    /// Names of every offending input
    pub fn offending_inputs(&self) -> Vec<&str> {
        self.problems.iter().map(InputProblem::input).collect()
    }

    /// Ids of every offending input, in schema order
    pub fn offending_ids(&self) -> Vec<&str> {
        self.problems.iter().map(InputProblem::unique_id).collect()
    }

    fn describe(&self) -> String {
        let missing = self.missing_inputs();
        let rejected: Vec<String> = self
            .problems
            .iter()
            .filter_map(|p| match p {
                InputProblem::Rejected { input, reason, .. } => {
                    Some(format!("{} ({})", input, reason))
                }
                InputProblem::Missing { .. } => None,
            })
            .collect();

        let mut parts = Vec::new();
        if !missing.is_empty() {
            parts.push(format!("required inputs are missing: {}", missing.join(", ")));
        }
        if !rejected.is_empty() {
            parts.push(format!("invalid inputs: {}", rejected.join(", ")));
        }
        parts.join("; ")
    }
}

/// Validate supplied values against a schema
///
/// Values for inputs the schema does not declare are ignored.
pub async fn validate_inputs(
    schema: &[UserInput],
    values: &[UserInputValue],
) -> Result<(), ValidationError> {
    let mut problems = Vec::new();

    for input in schema {
        let supplied: Vec<&Value> = values
            .iter()
            .filter(|v| v.unique_id == input.unique_id)
            .map(|v| &v.value)
            .collect();

        if supplied.is_empty() {
            if input.required {
                problems.push(InputProblem::missing(input));
            }
            continue;
        }

        for value in supplied {
            if let Err(reason) = input.check_value(value) {
                problems.push(InputProblem::rejected(input, reason));
                continue;
            }

            if let Some(validator) = &input.validator {
                if let Some(reason) = validator.validate(value).await {
                    problems.push(InputProblem::rejected(input, reason));
                }
            }
        }
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(ValidationError { problems })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct RejectNegative;

    #[async_trait]
    impl InputValidator for RejectNegative {
        async fn validate(&self, value: &Value) -> Option<String> {
            match value.as_f64() {
                Some(n) if n < 0.0 => Some("must not be negative".to_string()),
                _ => None,
            }
        }
    }

    fn enabled_schema() -> Vec<UserInput> {
        vec![UserInput::new("enabled", InputKind::Boolean).required()]
    }

    #[tokio::test]
    async fn test_missing_required_input_is_named() {
        let err = validate_inputs(&enabled_schema(), &[]).await.unwrap_err();
        assert_eq!(err.missing_inputs(), vec!["enabled"]);
        assert!(err.to_string().contains("enabled"));
    }

    #[tokio::test]
    async fn test_missing_input_uses_display_name() {
        let schema = vec![UserInput::new("host", InputKind::String)
            .required()
            .with_name("Host name")];
        let err = validate_inputs(&schema, &[]).await.unwrap_err();
        assert_eq!(err.missing_inputs(), vec!["Host name"]);
        assert_eq!(err.offending_ids(), vec!["host"]);
        assert_eq!(err.problems[0].unique_id(), "host");
        assert_eq!(err.to_string(), "required inputs are missing: Host name");
    }

    #[tokio::test]
    async fn test_extra_inputs_are_ignored() {
        let values = vec![
            UserInputValue::new("enabled", json!(true)),
            UserInputValue::new("unrelated", json!("anything")),
        ];
        assert!(validate_inputs(&enabled_schema(), &values).await.is_ok());
    }

    #[tokio::test]
    async fn test_optional_inputs_may_be_omitted() {
        let schema = vec![
            UserInput::new("enabled", InputKind::Boolean).required(),
            UserInput::new("label", InputKind::String),
        ];
        let values = vec![UserInputValue::new("enabled", json!(false))];
        assert!(validate_inputs(&schema, &values).await.is_ok());
    }

    #[tokio::test]
    async fn test_kind_mismatch_rejected() {
        let values = vec![UserInputValue::new("enabled", json!("yes"))];
        let err = validate_inputs(&enabled_schema(), &values)
            .await
            .unwrap_err();
        assert!(err.missing_inputs().is_empty());
        assert_eq!(err.offending_inputs(), vec!["enabled"]);
    }

    #[tokio::test]
    async fn test_validator_rejection() {
        let schema = vec![UserInput::new("threshold", InputKind::Number)
            .with_validator(Arc::new(RejectNegative))];

        let ok = vec![UserInputValue::new("threshold", json!(3))];
        assert!(validate_inputs(&schema, &ok).await.is_ok());

        let bad = vec![UserInputValue::new("threshold", json!(-3))];
        let err = validate_inputs(&schema, &bad).await.unwrap_err();
        assert!(err.to_string().contains("must not be negative"));
    }

    #[tokio::test]
    async fn test_multiple_values() {
        let single = UserInput::new("tags", InputKind::String);
        assert!(single.check_value(&json!(["a", "b"])).is_err());

        let multi = UserInput::new("tags", InputKind::String).multiple();
        assert!(multi.check_value(&json!(["a", "b"])).is_ok());
        assert!(multi.check_value(&json!(["a", 1])).is_err());
    }

    #[test]
    fn test_url_kind() {
        assert!(InputKind::Url.check(&json!("https://example.com/hook")).is_ok());
        assert!(InputKind::Url.check(&json!("not a url")).is_err());
        assert!(InputKind::Url.check(&json!(42)).is_err());
    }

    #[test]
    fn test_variable_ref_value() {
        let reference = VariableRef::new("thermostat", "temp").with_instance("abc");
        let value = reference.to_value();
        assert_eq!(value["variableId"], "temp");
        assert_eq!(VariableRef::from_value(&value), Some(reference));
        assert!(InputKind::Variable.check(&value).is_ok());
        assert!(InputKind::Variable.check(&json!("temp")).is_err());
    }

    #[test]
    fn test_apply_defaults() {
        let schema = vec![
            UserInput::new("initial", InputKind::Boolean).with_default(json!(false)),
            UserInput::new("name", InputKind::String),
        ];
        let values = vec![UserInputValue::new("name", json!("Porch"))];
        let resolved = apply_defaults(&schema, &values);
        assert_eq!(find_input(&resolved, "initial"), Some(&json!(false)));
        assert_eq!(find_input(&resolved, "name"), Some(&json!("Porch")));
    }
}
