//! Conditions available to every automation

use std::sync::Arc;

use async_trait::async_trait;
use cq_core::{
    find_input, CapabilityResult, Condition, InputKind, UserInput, UserInputValue, Variable,
};
use serde_json::Value;
use tracing::trace;

const LHS_INPUT: &str = "lhs_input";
const RHS_INPUT: &str = "rhs_input";

/// `boolean_true` / `boolean_false`
pub struct BooleanCondition {
    expected: bool,
    inputs: Vec<UserInput>,
}

impl BooleanCondition {
    pub fn is_true() -> Self {
        Self::new(true)
    }

    pub fn is_false() -> Self {
        Self::new(false)
    }

    fn new(expected: bool) -> Self {
        Self {
            expected,
            inputs: vec![UserInput::new(LHS_INPUT, InputKind::Boolean).with_name("Value")],
        }
    }
}

#[async_trait]
impl Condition for BooleanCondition {
    fn unique_id(&self) -> &str {
        if self.expected {
            "boolean_true"
        } else {
            "boolean_false"
        }
    }

    fn name(&self) -> &str {
        if self.expected {
            "is true"
        } else {
            "is false"
        }
    }

    fn inputs(&self) -> &[UserInput] {
        &self.inputs
    }

    async fn evaluate(&self, inputs: &[UserInputValue]) -> CapabilityResult<bool> {
        let passed = match find_input(inputs, LHS_INPUT).and_then(Value::as_bool) {
            Some(value) => value == self.expected,
            None => false,
        };
        trace!(condition_id = self.unique_id(), passed, "Boolean condition evaluated");
        Ok(passed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericComparison {
    Eq,
    NotEq,
    Lt,
    Gt,
    Lte,
    Gte,
}

impl NumericComparison {
    pub const ALL: [NumericComparison; 6] = [
        NumericComparison::Eq,
        NumericComparison::NotEq,
        NumericComparison::Lt,
        NumericComparison::Gt,
        NumericComparison::Lte,
        NumericComparison::Gte,
    ];

    pub fn unique_id(&self) -> &'static str {
        match self {
            NumericComparison::Eq => "numeric_eq",
            NumericComparison::NotEq => "numeric_not_eq",
            NumericComparison::Lt => "numeric_lt",
            NumericComparison::Gt => "numeric_gt",
            NumericComparison::Lte => "numeric_lte",
            NumericComparison::Gte => "numeric_gte",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            NumericComparison::Eq => "is equal to",
            NumericComparison::NotEq => "is not equal to",
            NumericComparison::Lt => "is less than",
            NumericComparison::Gt => "is greater than",
            NumericComparison::Lte => "is less than or equal to",
            NumericComparison::Gte => "is greater than or equal to",
        }
    }

    pub fn compare(&self, lhs: f64, rhs: f64) -> bool {
        match self {
            NumericComparison::Eq => lhs == rhs,
            NumericComparison::NotEq => lhs != rhs,
            NumericComparison::Lt => lhs < rhs,
            NumericComparison::Gt => lhs > rhs,
            NumericComparison::Lte => lhs <= rhs,
            NumericComparison::Gte => lhs >= rhs,
        }
    }
}

/// Compares `lhs_input` against `rhs_input`
pub struct NumericCondition {
    comparison: NumericComparison,
    inputs: Vec<UserInput>,
}

impl NumericCondition {
    pub fn new(comparison: NumericComparison) -> Self {
        Self {
            comparison,
            inputs: vec![
                UserInput::new(LHS_INPUT, InputKind::Number).with_name("Value"),
                UserInput::new(RHS_INPUT, InputKind::Number)
                    .required()
                    .with_name("Compared to"),
            ],
        }
    }

    pub fn comparison(&self) -> NumericComparison {
        self.comparison
    }
}

/// Numbers, and strings that parse as numbers
fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[async_trait]
impl Condition for NumericCondition {
    fn unique_id(&self) -> &str {
        self.comparison.unique_id()
    }

    fn name(&self) -> &str {
        self.comparison.name()
    }

    fn inputs(&self) -> &[UserInput] {
        &self.inputs
    }

    async fn evaluate(&self, inputs: &[UserInputValue]) -> CapabilityResult<bool> {
        let lhs = find_input(inputs, LHS_INPUT).and_then(as_number);
        let rhs = find_input(inputs, RHS_INPUT).and_then(as_number);

        let passed = match (lhs, rhs) {
            (Some(lhs), Some(rhs)) => self.comparison.compare(lhs, rhs),
            _ => false,
        };
        trace!(
            condition_id = self.unique_id(),
            ?lhs,
            ?rhs,
            passed,
            "Numeric condition evaluated"
        );
        Ok(passed)
    }
}

/// Every built-in condition
pub fn builtin_conditions() -> Vec<Arc<dyn Condition>> {
    let mut conditions: Vec<Arc<dyn Condition>> = vec![
        Arc::new(BooleanCondition::is_true()),
        Arc::new(BooleanCondition::is_false()),
    ];
    conditions.extend(
        NumericComparison::ALL
            .iter()
            .map(|comparison| Arc::new(NumericCondition::new(*comparison)) as Arc<dyn Condition>),
    );
    conditions
}

/// A built-in condition whose `lhs_input` defaults to a variable's value
///
/// The value is read at evaluation time, so the condition sees the value the
/// variable holds when the pass reaches it.
pub struct VariableBoundCondition {
    variable: Arc<dyn Variable>,
    inner: Arc<dyn Condition>,
}

impl VariableBoundCondition {
    pub fn new(variable: Arc<dyn Variable>, inner: Arc<dyn Condition>) -> Self {
        Self { variable, inner }
    }
}

#[async_trait]
impl Condition for VariableBoundCondition {
    fn unique_id(&self) -> &str {
        self.inner.unique_id()
    }

    fn name(&self) -> &str {
        self.inner.name()
    }

    fn inputs(&self) -> &[UserInput] {
        self.inner.inputs()
    }

    async fn evaluate(&self, inputs: &[UserInputValue]) -> CapabilityResult<bool> {
        if find_input(inputs, LHS_INPUT).is_some() {
            return self.inner.evaluate(inputs).await;
        }

        let current = self.variable.retrieve_value().await?;
        let mut bound = inputs.to_vec();
        bound.push(UserInputValue::new(LHS_INPUT, current));
        self.inner.evaluate(&bound).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cq_core::WritableVariable;
    use cq_variables::ReadWriteVariable;
    use serde_json::json;

    fn lhs_rhs(lhs: Value, rhs: Value) -> Vec<UserInputValue> {
        vec![
            UserInputValue::new(LHS_INPUT, lhs),
            UserInputValue::new(RHS_INPUT, rhs),
        ]
    }

    #[tokio::test]
    async fn test_boolean_conditions() {
        let on = vec![UserInputValue::new(LHS_INPUT, json!(true))];
        assert!(BooleanCondition::is_true().evaluate(&on).await.unwrap());
        assert!(!BooleanCondition::is_false().evaluate(&on).await.unwrap());

        // Missing or mistyped is false for both
        assert!(!BooleanCondition::is_true().evaluate(&[]).await.unwrap());
        let text = vec![UserInputValue::new(LHS_INPUT, json!("true"))];
        assert!(!BooleanCondition::is_false().evaluate(&text).await.unwrap());
    }

    #[tokio::test]
    async fn test_numeric_comparisons() {
        let cases = [
            (NumericComparison::Eq, 5.0, 5.0, true),
            (NumericComparison::NotEq, 5.0, 5.0, false),
            (NumericComparison::Lt, 4.0, 5.0, true),
            (NumericComparison::Gt, 4.0, 5.0, false),
            (NumericComparison::Lte, 5.0, 5.0, true),
            (NumericComparison::Gte, 6.5, 5.0, true),
        ];

        for (comparison, lhs, rhs, expected) in cases {
            let condition = NumericCondition::new(comparison);
            let passed = condition
                .evaluate(&lhs_rhs(json!(lhs), json!(rhs)))
                .await
                .unwrap();
            assert_eq!(passed, expected, "{} {} {}", lhs, comparison.name(), rhs);
        }
    }

    #[tokio::test]
    async fn test_numeric_strings_and_garbage() {
        let gt = NumericCondition::new(NumericComparison::Gt);
        assert!(gt.evaluate(&lhs_rhs(json!("25"), json!(22))).await.unwrap());
        assert!(!gt.evaluate(&lhs_rhs(json!("warm"), json!(22))).await.unwrap());
        assert!(!gt.evaluate(&[UserInputValue::new(RHS_INPUT, json!(22))]).await.unwrap());
    }

    #[test]
    fn test_missing_rhs_is_false() {
        let condition = NumericCondition::new(NumericComparison::Eq);
        let only_lhs = vec![UserInputValue::new(LHS_INPUT, json!(1))];
        let passed = tokio_test::block_on(condition.evaluate(&only_lhs));
        assert!(!tokio_test::assert_ok!(passed));
    }

    #[test]
    fn test_builtin_ids_unique() {
        let conditions = builtin_conditions();
        let mut ids: Vec<&str> = conditions.iter().map(|c| c.unique_id()).collect();
        assert_eq!(ids.len(), 8);
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 8);
    }

    #[tokio::test]
    async fn test_variable_bound_reads_current_value() {
        let temperature = Arc::new(ReadWriteVariable::new("temp", "Temperature", json!(20)));
        let bound = VariableBoundCondition::new(
            temperature.clone(),
            Arc::new(NumericCondition::new(NumericComparison::Gt)),
        );
        let rhs = vec![UserInputValue::new(RHS_INPUT, json!(22))];

        assert!(!bound.evaluate(&rhs).await.unwrap());
        temperature.update_value(json!(25)).await.unwrap();
        assert!(bound.evaluate(&rhs).await.unwrap());

        // An explicit lhs wins over the variable
        assert!(!bound.evaluate(&lhs_rhs(json!(10), json!(22))).await.unwrap());
        assert_eq!(bound.unique_id(), "numeric_gt");
    }
}
