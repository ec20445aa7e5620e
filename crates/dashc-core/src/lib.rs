//! dashc Core - security-validated dashboard markup compiler
//!
//! Authors write `.dash` documents: markup that declares input controls
//! (toggles, dropdowns, ranges) and display widgets (charts, grids,
//! filters). This crate proves a document uses only the allowed vocabulary
//! and compiles it into a module that can only mount whitelisted widgets.
//!
//! # Architecture
//!
//! ```text
//! Source → Pre-Filter → Parser → Script Policy ─┐
//!                                  Classifier ──┴→ gate (all violations)
//!                                                     ↓
//!                      Preprocess (inject imports) → Codegen → Sandbox.load
//!                                                                 ↓
//!                           InputState ──→ RuntimeComponent.render → RenderNode tree
//! ```
//!
//! # Guarantees
//!
//! - **Deterministic**: same source always produces identical code and warnings
//! - **Collect-all**: one compile reports every violation found
//! - **Confined**: a loaded module can only name the registry's display widgets
//! - **Total**: `compile` never panics or returns `Err` on author input

pub mod auth;
pub mod classifier;
pub mod codegen;
pub mod compiler;
pub mod config;
pub mod datasource;
pub mod error;
pub mod expression;
pub mod parser;
pub mod policy;
pub mod prefilter;
pub mod registry;
pub mod sandbox;
pub mod state;
pub mod store;

pub use classifier::{analyze, Analysis, Component, ComponentId};
pub use compiler::{CompiledArtifact, Compiler};
pub use config::Config;
pub use error::{Error, Result};
pub use expression::resolve;
pub use policy::ScriptPolicy;
pub use registry::Registry;
pub use sandbox::{RenderNode, RuntimeComponent};
pub use state::InputState;

/// Version of the core library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Accumulated verdict of a validation pass
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub violations: Vec<String>,
}

impl Default for ValidationResult {
    fn default() -> Self {
        ValidationResult {
            valid: true,
            violations: Vec::new(),
        }
    }
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, violation: String) {
        self.valid = false;
        self.violations.push(violation);
    }

    pub fn extend(&mut self, violations: impl IntoIterator<Item = String>) {
        for violation in violations {
            self.add(violation);
        }
    }

    pub fn merge(&mut self, other: ValidationResult) {
        self.extend(other.violations);
    }
}

/// Compile a document with the default configuration (strict policy)
pub fn compile(source: &str, filename: &str) -> CompiledArtifact {
    Compiler::default().compile(source, filename)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_validation_result_accumulates() {
        let mut result = ValidationResult::new();
        assert!(result.valid);
        result.extend(Vec::<String>::new());
        assert!(result.valid);
        result.add("first".into());
        let mut other = ValidationResult::new();
        other.add("second".into());
        result.merge(other);
        assert!(!result.valid);
        assert_eq!(result.violations, vec!["first", "second"]);
    }

    #[test]
    fn test_scenario_a_toggle_controls_chart() {
        let source = r#"<Toggle name="showFilters" value="true" /><Grid><Chart source="sales" visible="{inputs.showFilters}" /></Grid>"#;
        let analysis = analyze(source);
        assert!(analysis.errors.is_empty(), "{:?}", analysis.errors);

        let inputs: Vec<&str> = analysis
            .input_components
            .iter()
            .map(|c| c.component_type.as_str())
            .collect();
        assert_eq!(inputs, vec!["Toggle"]);

        let displays = &analysis.display_components;
        assert_eq!(displays.len(), 2);
        assert_eq!(displays[0].component_type, "Grid");
        assert!(displays[0].is_container);
        assert_eq!(displays[1].component_type, "Chart");
        assert!(displays[1].inside_grid);

        assert_eq!(analysis.input_state.get("showFilters"), Some(&json!(true)));
        let visible = displays[1].attributes["visible"].as_str().unwrap();
        assert_eq!(resolve(visible, &analysis.input_state), "true");

        assert!(compile(source, "Dashboard.dash").success);
    }

    #[test]
    fn test_scenario_b_script_fetch_rejected() {
        let artifact = compile("<script>fetch('/x')</script>", "Dashboard.dash");
        assert!(!artifact.success);
        let error = artifact.error.unwrap();
        assert!(error.contains("network access"), "{}", error);
        assert!(artifact.code.is_none());
    }

    #[test]
    fn test_scenario_c_compound_placeholder_rejected() {
        let source = r#"<Chart filter="{inputs.region} AND 1=1" />"#;
        let artifact = compile(source, "Dashboard.dash");
        assert!(!artifact.success);
        assert!(!analyze(source).errors.is_empty());
    }

    #[test]
    fn test_scenario_d_unknown_component() {
        let analysis = analyze("<Foo/>");
        assert!(analysis.errors.iter().any(|e| e.contains("Unknown component: Foo")));
        assert!(analysis.input_components.is_empty());
        assert!(analysis.display_components.is_empty());
    }

    #[test]
    fn test_strict_script_yields_empty_lists() {
        let analysis = analyze("<script>let showX = true;</script>\n<Toggle name=\"a\" value=\"true\" />");
        assert!(analysis.errors.iter().any(|e| e.contains("Script not allowed")));
        assert!(analysis.input_components.is_empty());
        assert!(analysis.display_components.is_empty());
    }

    #[test]
    fn test_boolean_initial_values() {
        for (value, expected) in [("true", true), ("false", false), ("yes", false)] {
            let source = format!(r#"<Toggle name="flag" value="{}" />"#, value);
            let analysis = analyze(&source);
            assert_eq!(analysis.input_state.get("flag"), Some(&json!(expected)));
        }
    }

    #[test]
    fn test_determinism() {
        let source = r#"<Dropdown name="region" options="North,South" value="North" />
<Grid cols={2}>
  <Chart source="sales" filter="{inputs.region}" />
  <Filter title="Filters" />
</Grid>"#;
        let first = compile(source, "Dashboard.dash");
        assert!(first.success, "{:?}", first.error);
        for _ in 0..100 {
            let again = compile(source, "Dashboard.dash");
            assert_eq!(first.code, again.code);
            assert_eq!(first.warnings, again.warnings);
        }
    }
}
