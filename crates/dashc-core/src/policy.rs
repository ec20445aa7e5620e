//! Script policy enforcer: decides what a `<script>` region may contain
//!
//! Two interchangeable policies, chosen once per deployment:
//!
//! - **Strict**: any script region is a violation. Authors express state
//!   only through input components.
//! - **Permissive**: declarations are allowed when the name follows one of
//!   the known naming conventions and the initializer reduces to a bounded
//!   literal. Function declarations, imports and calls outside a small
//!   allowlist of pure math helpers are rejected.
//!
//! Both policies accumulate every violation instead of stopping at the first.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::parser::script::property_key;
use crate::parser::{parse_script_region, Node, Scalar};
use crate::{Result, ValidationResult};

pub const MAX_ARRAY_ELEMENTS: usize = 100;
pub const MAX_OBJECT_PROPERTIES: usize = 20;
pub const MAX_STRING_CHARS: usize = 100;
pub const MAX_NUMBER_MAGNITUDE: f64 = 1_000_000.0;

/// Calls a permissive script may make
pub const ALLOWED_CALLS: &[&str] = &["Math.round", "Math.floor", "Math.ceil", "Math.max", "Math.min"];

static ALLOWED_NAME_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        // boolean flags
        r"^(?:show|hide|visible|enabled|disabled|active|inactive)[A-Z][a-zA-Z]*$",
        // chart data arrays
        r"^[a-zA-Z]+Data$",
        // configuration objects
        r"^[a-zA-Z]+Config$",
        // titles and labels
        r"^[a-zA-Z]+Title$|^[a-zA-Z]+Label$",
        // counts and values
        r"^[a-zA-Z]+Count$|^[a-zA-Z]+Value$",
    ]
    .into_iter()
    .map(|p| Regex::new(p).expect("variable name pattern is valid"))
    .collect()
});

/// Script policy selected per deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptPolicy {
    #[default]
    Strict,
    Permissive,
}

impl std::fmt::Display for ScriptPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            ScriptPolicy::Strict => write!(f, "strict"),
            ScriptPolicy::Permissive => write!(f, "permissive"),
        }
    }
}

/// Verdict on a script region plus the literal variables it declares
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PolicyOutcome {
    pub result: ValidationResult,
    pub variables: BTreeMap<String, Value>,
}

impl ScriptPolicy {
    /// Check the document's script region (the `Script` node, if any)
    ///
    /// Strict never looks inside the region, so any script body is reported
    /// as "Script not allowed" however malformed it is.
    ///
    /// # Errors
    /// Permissive parses the body and returns `Error::Parse` when it is not
    /// valid script.
    pub fn enforce(&self, script: Option<&Node>) -> Result<PolicyOutcome> {
        let Some(script) = script else {
            return Ok(PolicyOutcome::default());
        };
        match self {
            ScriptPolicy::Strict => {
                let mut result = ValidationResult::new();
                result.add(
                    "Script not allowed: use input components for parameters".to_string(),
                );
                Ok(PolicyOutcome {
                    result,
                    variables: BTreeMap::new(),
                })
            }
            ScriptPolicy::Permissive => {
                let program = parse_script_region(script)?;
                let mut walker = PermissiveWalker::default();
                program.walk(&mut |node| walker.visit(node));
                tracing::debug!(
                    violations = walker.result.violations.len(),
                    variables = walker.variables.len(),
                    "permissive script check"
                );
                Ok(PolicyOutcome {
                    result: walker.result,
                    variables: walker.variables,
                })
            }
        }
    }
}

/// Whether a variable name follows an allowed naming convention
pub fn is_allowed_variable_name(name: &str) -> bool {
    ALLOWED_NAME_PATTERNS.iter().any(|re| re.is_match(name))
}

// ── Permissive walk ───────────────────────────────────────

#[derive(Default)]
struct PermissiveWalker {
    result: ValidationResult,
    variables: BTreeMap<String, Value>,
    import_reported: bool,
}

impl PermissiveWalker {
    fn visit(&mut self, node: &Node) {
        match node.kind.as_str() {
            "VariableDeclaration" => {
                for declarator in node.list("declarations") {
                    self.check_declarator(declarator);
                }
            }
            "FunctionDeclaration" => {
                self.result.add("Function declarations not allowed".to_string());
            }
            "CallExpression" => {
                let name = node.node("callee").map(callee_name).unwrap_or_default();
                if !ALLOWED_CALLS.contains(&name.as_str()) {
                    self.result.add(format!("Function call '{}' not allowed", name));
                }
            }
            "ImportDeclaration" if !self.import_reported => {
                self.import_reported = true;
                self.result.add("Imports not allowed in dashboard code".to_string());
            }
            _ => {}
        }
    }

    fn check_declarator(&mut self, declarator: &Node) {
        let Some(name) = declarator.node("id").and_then(|id| id.str_value("name")) else {
            return;
        };
        let Some(init) = declarator.node("init") else {
            return;
        };
        if !is_allowed_variable_name(name) {
            self.result.add(format!(
                "Variable name '{}' doesn't match allowed patterns",
                name
            ));
            return;
        }
        if let Some(value) = self.safe_value(init) {
            self.variables.insert(name.to_string(), value);
        }
    }

    /// Reduce an initializer to a bounded literal, recording why it can't be
    fn safe_value(&mut self, node: &Node) -> Option<Value> {
        match node.kind.as_str() {
            "Literal" => match node.value("value") {
                Some(Scalar::Str(s)) if s.chars().count() > MAX_STRING_CHARS => {
                    self.result.add(format!(
                        "String values must be at most {} characters",
                        MAX_STRING_CHARS
                    ));
                    None
                }
                Some(Scalar::Number(n)) if n.abs() > MAX_NUMBER_MAGNITUDE => {
                    self.result
                        .add("Number values must be reasonable (-1M to 1M)".to_string());
                    None
                }
                Some(scalar) => Some(scalar.to_json()),
                None => Some(Value::Null),
            },
            "Identifier" => match node.str_value("name") {
                Some("true") => Some(Value::Bool(true)),
                Some("false") => Some(Value::Bool(false)),
                _ => self.disallowed(node),
            },
            "ArrayExpression" => {
                let elements = node.list("elements");
                if elements.len() > MAX_ARRAY_ELEMENTS {
                    self.result.add(format!(
                        "Arrays must have at most {} elements",
                        MAX_ARRAY_ELEMENTS
                    ));
                    return None;
                }
                let mut values = Vec::with_capacity(elements.len());
                for element in elements {
                    match self.safe_value(element) {
                        Some(v) => values.push(v),
                        None => {
                            self.result.add("Array contains non-literal values".to_string());
                            return None;
                        }
                    }
                }
                Some(Value::Array(values))
            }
            "ObjectExpression" => {
                let properties = node.list("properties");
                if properties.len() > MAX_OBJECT_PROPERTIES {
                    self.result.add(format!(
                        "Objects must have at most {} properties",
                        MAX_OBJECT_PROPERTIES
                    ));
                    return None;
                }
                let mut object = serde_json::Map::new();
                for property in properties {
                    let key = property.node("key").and_then(property_key);
                    let value_node = property.node("value");
                    let (true, Some(key), Some(value_node)) = (property.is("Property"), key, value_node)
                    else {
                        self.result
                            .add("Complex object structures not allowed".to_string());
                        return None;
                    };
                    match self.safe_value(value_node) {
                        Some(v) => {
                            object.insert(key, v);
                        }
                        None => {
                            self.result.add("Object contains non-literal values".to_string());
                            return None;
                        }
                    }
                }
                Some(Value::Object(object))
            }
            _ => self.disallowed(node),
        }
    }

    fn disallowed(&mut self, node: &Node) -> Option<Value> {
        self.result.add(format!(
            "Variable initialization type '{}' not allowed",
            node.kind
        ));
        None
    }
}

/// `name` for identifiers, `object.property` for simple member callees
fn callee_name(callee: &Node) -> String {
    match callee.kind.as_str() {
        "Identifier" => callee.str_value("name").unwrap_or("unknown").to_string(),
        "MemberExpression" => {
            let object = callee
                .node("object")
                .filter(|o| o.is("Identifier"))
                .and_then(|o| o.str_value("name"))
                .unwrap_or("unknown");
            let property = callee
                .node("property")
                .filter(|_| callee.value("computed") != Some(&Scalar::Bool(true)))
                .and_then(|p| p.str_value("name"))
                .unwrap_or("unknown");
            format!("{}.{}", object, property)
        }
        _ => "unknown".to_string(),
    }
}
