//! Input state: typed parameter values keyed by input name
//!
//! One `InputState` exists per classified document. The host UI is its only
//! writer; the expression resolver and the runtime component only read it.
//! A multi-threaded host must wrap it in its own lock.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::classifier::Component;
use crate::parser::node::number_to_json;
use crate::registry::{Registry, ValueType};

/// Parameter name → current value, in deterministic (sorted) order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InputState {
    values: BTreeMap<String, Value>,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Set a value, returning the previous one
    pub fn set(&mut self, name: impl Into<String>, value: Value) -> Option<Value> {
        self.values.insert(name.into(), value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Truthiness used by `if` blocks: false, null, 0, "" and missing are false
    pub fn is_truthy(&self, name: &str) -> bool {
        match self.values.get(name) {
            None | Some(Value::Null) => false,
            Some(Value::Bool(b)) => *b,
            Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
            Some(Value::String(s)) => !s.is_empty(),
            Some(Value::Array(_)) | Some(Value::Object(_)) => true,
        }
    }
}

impl FromIterator<(String, Value)> for InputState {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        InputState {
            values: iter.into_iter().collect(),
        }
    }
}

/// Build the initial state from classified input components
///
/// Components missing either `name` or `value` are skipped. Values are
/// coerced to the type the registry says the component generates; a later
/// component with the same name overwrites an earlier one.
pub fn initialize<'a>(
    components: impl IntoIterator<Item = &'a Component>,
    registry: &Registry,
) -> InputState {
    let mut state = InputState::new();
    for component in components {
        let Some(spec) = registry.input(&component.component_type) else {
            continue;
        };
        let (Some(name), Some(value)) = (
            component.attributes.get("name").and_then(Value::as_str),
            component.attributes.get("value"),
        ) else {
            continue;
        };
        state.set(name, coerce(value, spec.generates));
    }
    tracing::debug!(inputs = state.len(), "initialized input state");
    state
}

/// Coerce an attribute value to a generated parameter type
pub fn coerce(value: &Value, generates: ValueType) -> Value {
    match generates {
        ValueType::Boolean => {
            Value::Bool(matches!(value, Value::Bool(true)) || value.as_str() == Some("true"))
        }
        ValueType::Number => {
            let n = match value {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => s.trim().parse::<f64>().ok(),
                _ => None,
            };
            n.filter(|f| f.is_finite())
                .map(number_to_json)
                .unwrap_or_else(|| Value::from(0))
        }
        ValueType::Object => match value {
            Value::String(s) => serde_json::from_str(s)
                .unwrap_or_else(|_| Value::Object(serde_json::Map::new())),
            other => other.clone(),
        },
        ValueType::String => match value {
            Value::String(s) => Value::String(s.clone()),
            Value::Null => Value::String(String::new()),
            other => Value::String(other.to_string()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_boolean_coercion() {
        assert_eq!(coerce(&json!("true"), ValueType::Boolean), json!(true));
        assert_eq!(coerce(&json!("false"), ValueType::Boolean), json!(false));
        assert_eq!(coerce(&json!("yes"), ValueType::Boolean), json!(false));
        assert_eq!(coerce(&json!(true), ValueType::Boolean), json!(true));
    }

    #[test]
    fn test_number_coercion_defaults_to_zero() {
        assert_eq!(coerce(&json!("100"), ValueType::Number), json!(100));
        assert_eq!(coerce(&json!(" 2.5 "), ValueType::Number), json!(2.5));
        assert_eq!(coerce(&json!("abc"), ValueType::Number), json!(0));
        assert_eq!(coerce(&json!(7), ValueType::Number), json!(7));
    }

    #[test]
    fn test_object_coercion() {
        assert_eq!(
            coerce(&json!(r#"{"start":"2024-01-01"}"#), ValueType::Object),
            json!({"start": "2024-01-01"})
        );
        assert_eq!(coerce(&json!("not json"), ValueType::Object), json!({}));
        assert_eq!(coerce(&json!([1, 2]), ValueType::Object), json!([1, 2]));
    }

    #[test]
    fn test_string_coercion() {
        assert_eq!(coerce(&json!("North"), ValueType::String), json!("North"));
        assert_eq!(coerce(&json!(3), ValueType::String), json!("3"));
    }

    #[test]
    fn test_truthiness() {
        let state: InputState = [
            ("on".to_string(), json!(true)),
            ("zero".to_string(), json!(0)),
            ("empty".to_string(), json!("")),
            ("text".to_string(), json!("x")),
            ("obj".to_string(), json!({})),
        ]
        .into_iter()
        .collect();
        assert!(state.is_truthy("on"));
        assert!(!state.is_truthy("zero"));
        assert!(!state.is_truthy("empty"));
        assert!(state.is_truthy("text"));
        assert!(state.is_truthy("obj"));
        assert!(!state.is_truthy("missing"));
    }

    #[test]
    fn test_serializes_as_plain_map() {
        let mut state = InputState::new();
        state.set("showFilters", json!(true));
        assert_eq!(serde_json::to_string(&state).unwrap(), r#"{"showFilters":true}"#);
    }
}
