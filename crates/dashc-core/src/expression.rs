//! Placeholder expressions: validation and render-time resolution
//!
//! The only dynamic form an author may write inside a component attribute is
//! `{inputs.<identifier>}`. Validation enforces that grammar on raw attribute
//! text; resolution substitutes current input values into it.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde::Serialize;
use serde_json::Value;

use crate::state::InputState;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{inputs\.([A-Za-z_][A-Za-z0-9_]*)\}").expect("placeholder pattern is valid")
});

static EXACT_PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\{inputs\.[A-Za-z_][A-Za-z0-9_]*\}$").expect("placeholder pattern is valid")
});

static DANGEROUS_KEYWORDS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    ["eval", "fetch", "document", "window", "process"]
        .into_iter()
        .map(|word| {
            let pattern = format!(r"(?i)\{{[^}}]*\b{}\b[^}}]*\}}", word);
            (word, Regex::new(&pattern).expect("keyword pattern is valid"))
        })
        .collect()
});

/// One `{inputs.name}` occurrence in an attribute string
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceholderReference {
    pub full_match: String,
    pub param_name: String,
}

/// Every well-formed placeholder in `value`, in order of appearance
pub fn parse_references(value: &str) -> Vec<PlaceholderReference> {
    PLACEHOLDER
        .captures_iter(value)
        .map(|caps| PlaceholderReference {
            full_match: caps[0].to_string(),
            param_name: caps[1].to_string(),
        })
        .collect()
}

/// Validate an attribute value against the placeholder grammar
///
/// A value with no braces is always valid. Otherwise every violation found
/// is returned: dangerous keywords, unbalanced or nested braces, segments
/// that are not a bare placeholder, and values where the placeholder is not
/// the entire value.
pub fn validate(value: &str) -> Vec<String> {
    let mut violations = Vec::new();
    if !value.contains(['{', '}']) {
        return violations;
    }

    // `{inputs.window}` names an input, not the host global
    for (word, pattern) in DANGEROUS_KEYWORDS.iter() {
        let found = pattern
            .find_iter(value)
            .find(|m| !EXACT_PLACEHOLDER.is_match(m.as_str()));
        if let Some(found) = found {
            violations.push(format!(
                "Dangerous expression pattern detected ({}): {}",
                word,
                found.as_str()
            ));
        }
    }

    let segments = brace_segments(value, &mut violations);
    let mut grammar_ok = true;
    for segment in &segments {
        if !EXACT_PLACEHOLDER.is_match(segment) {
            grammar_ok = false;
            violations.push(format!(
                "Invalid expression: {}. Only {{inputs.paramName}} allowed.",
                segment
            ));
        }
    }

    if grammar_ok && violations.is_empty() && !EXACT_PLACEHOLDER.is_match(value) {
        violations.push(format!(
            "Invalid attribute value: '{}'. A placeholder must be the entire value.",
            value
        ));
    }
    violations
}

/// Validate the bare text of a `{...}` tag or `{#if ...}` condition
pub fn validate_reference_expression(expression: &str) -> Vec<String> {
    validate(&format!("{{{}}}", expression.trim()))
}

/// Top-level `{...}` substrings; reports unbalanced and nested braces
fn brace_segments(value: &str, violations: &mut Vec<String>) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current: Option<String> = None;
    let mut depth = 0usize;
    let mut nested = false;

    for ch in value.chars() {
        match ch {
            '{' => {
                depth += 1;
                if depth > 1 {
                    nested = true;
                }
                current.get_or_insert_with(String::new).push(ch);
            }
            '}' if depth == 0 => {
                violations.push(format!("Unbalanced '}}' in '{}'", value));
            }
            '}' => {
                depth -= 1;
                if let Some(segment) = current.as_mut() {
                    segment.push(ch);
                }
                if depth == 0 {
                    if let Some(segment) = current.take() {
                        if nested {
                            violations.push(format!("Nested braces not allowed: {}", segment));
                        } else {
                            segments.push(segment);
                        }
                    }
                    nested = false;
                }
            }
            _ => {
                if let Some(segment) = current.as_mut() {
                    segment.push(ch);
                }
            }
        }
    }
    if let Some(segment) = current {
        violations.push(format!("Unclosed '{{' in '{}'", segment));
    }
    segments
}

// ── Resolution ────────────────────────────────────────────

/// Substitute every placeholder in `value` with its current input value
///
/// Booleans render as `true`/`false`, objects and arrays as JSON, strings
/// verbatim, numbers in their shortest form. Missing and null inputs render
/// as the empty string. Brace-free values come back unchanged.
pub fn resolve(value: &str, state: &InputState) -> String {
    if !value.contains('{') {
        return value.to_string();
    }
    PLACEHOLDER
        .replace_all(value, |caps: &Captures| stringify(state.get(&caps[1])))
        .into_owned()
}

fn stringify(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(other @ (Value::Array(_) | Value::Object(_))) => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_plain_values_pass_through() {
        assert!(validate("sales").is_empty());
        assert!(validate("").is_empty());
        assert!(validate("Sales by Region").is_empty());
    }

    #[test]
    fn test_single_placeholder_is_valid() {
        assert!(validate("{inputs.showFilters}").is_empty());
        assert!(validate("{inputs._x9}").is_empty());
    }

    #[test]
    fn test_placeholder_must_be_entire_value() {
        let violations = validate("{inputs.region} AND 1=1");
        assert_eq!(violations.len(), 1);
        assert!(violations[0].contains("entire value"));
    }

    #[test]
    fn test_invalid_grammar_reports_segment() {
        let violations = validate("{inputs.a + 1}");
        assert_eq!(
            violations,
            vec!["Invalid expression: {inputs.a + 1}. Only {inputs.paramName} allowed."]
        );
        assert!(!validate("{input.region}").is_empty());
        assert!(!validate("{inputs.9lives}").is_empty());
    }

    #[test]
    fn test_dangerous_keywords_and_grammar_both_reported() {
        let violations = validate("{eval(userCode)}");
        assert!(violations[0].starts_with("Dangerous expression pattern detected (eval)"));
        assert!(violations.iter().any(|v| v.starts_with("Invalid expression")));
    }

    #[test]
    fn test_inputs_named_like_host_globals() {
        for name in ["window", "process", "document", "fetch", "eval"] {
            let value = format!("{{inputs.{}}}", name);
            assert!(validate(&value).is_empty(), "{}", value);
        }
        assert!(validate_reference_expression("inputs.window").is_empty());
        assert!(validate("{inputs.window.location}")[0].starts_with("Dangerous expression pattern detected (window)"));
        assert!(!validate("{window}").is_empty());
    }

    #[test]
    fn test_unbalanced_and_nested_braces() {
        assert!(validate("{inputs.a").iter().any(|v| v.contains("Unclosed")));
        assert!(validate("inputs.a}").iter().any(|v| v.contains("Unbalanced")));
        assert!(validate("{{inputs.a}}").iter().any(|v| v.contains("Nested")));
    }

    #[test]
    fn test_reference_expression() {
        assert!(validate_reference_expression("inputs.showFilters").is_empty());
        assert!(validate_reference_expression(" inputs.showFilters ").is_empty());
        assert!(!validate_reference_expression("window.location").is_empty());
    }

    #[test]
    fn test_parse_references() {
        let refs = parse_references("a={inputs.x} b={inputs.y_2} c={other}");
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].full_match, "{inputs.x}");
        assert_eq!(refs[1].param_name, "y_2");
    }

    #[test]
    fn test_resolve_stringification() {
        let mut state = InputState::new();
        state.set("flag", json!(true));
        state.set("region", json!("North"));
        state.set("threshold", json!(100));
        state.set("range", json!({"start": "2024-01-01"}));
        state.set("nothing", Value::Null);

        assert_eq!(resolve("{inputs.flag}", &state), "true");
        assert_eq!(resolve("{inputs.region}", &state), "North");
        assert_eq!(resolve("{inputs.threshold}", &state), "100");
        assert_eq!(resolve("{inputs.range}", &state), r#"{"start":"2024-01-01"}"#);
        assert_eq!(resolve("{inputs.nothing}", &state), "");
        assert_eq!(resolve("{inputs.missing}", &state), "");
        assert_eq!(resolve("x={inputs.region}, y={inputs.region}", &state), "x=North, y=North");
    }

    #[test]
    fn test_resolve_is_idempotent_on_resolved_text() {
        let mut state = InputState::new();
        state.set("flag", json!(false));
        let once = resolve("{inputs.flag}", &state);
        assert_eq!(once, "false");
        assert_eq!(resolve(&once, &state), once);
    }

    #[test]
    fn test_resolve_does_not_rescan_substituted_text() {
        let mut state = InputState::new();
        state.set("a", json!("{inputs.b}"));
        state.set("b", json!("leak"));
        assert_eq!(resolve("{inputs.a}", &state), "{inputs.b}");
    }
}
