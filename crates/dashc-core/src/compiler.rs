//! Compile entrypoint: gate, inject, generate, load
//!
//! `compile` never returns `Err` and never panics on author input: every
//! failure becomes a `CompiledArtifact` with `success == false`.

use std::sync::Arc;

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::classifier;
use crate::codegen;
use crate::config::Config;
use crate::parser;
use crate::policy::ScriptPolicy;
use crate::prefilter;
use crate::registry::{self, Registry};
use crate::sandbox::{Capabilities, RuntimeComponent, Sandbox, SandboxLimits};
use crate::{Error, ValidationResult};

/// Result of one compile call
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompiledArtifact {
    pub success: bool,
    pub code: Option<String>,
    pub warnings: Vec<String>,
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_category: Option<String>,
    /// Loaded module, present on success
    #[serde(skip)]
    pub component: Option<Arc<RuntimeComponent>>,
}

impl CompiledArtifact {
    fn failed(error: &Error, warnings: Vec<String>) -> Self {
        CompiledArtifact {
            success: false,
            code: None,
            warnings,
            error: Some(error.author_message()),
            error_category: Some(error.category().to_string()),
            component: None,
        }
    }

    /// SHA-256 of the generated code, lowercase hex
    pub fn digest(&self) -> Option<String> {
        let code = self.code.as_ref()?;
        let mut hasher = Sha256::new();
        hasher.update(code.as_bytes());
        let result = hasher.finalize();
        Some(format!("{:x}", result))
    }

    /// The failure as a typed error, if the compile failed
    pub fn into_result(self) -> crate::Result<CompiledArtifact> {
        if self.success {
            return Ok(self);
        }
        let message = self.error.clone().unwrap_or_default();
        Err(match self.error_category.as_deref() {
            Some("ParseError") => Error::Parse(message),
            Some("CompileError") => Error::Compile(message),
            Some("RuntimeLoadError") => Error::RuntimeLoad(message),
            _ => Error::Security(message.lines().map(str::to_string).collect()),
        })
    }
}

/// Compiler bound to a registry, a script policy and sandbox limits
#[derive(Debug, Clone)]
pub struct Compiler {
    registry: Arc<Registry>,
    policy: ScriptPolicy,
    sandbox: Sandbox,
}

impl Default for Compiler {
    fn default() -> Self {
        Compiler::new(registry::global(), ScriptPolicy::Strict, SandboxLimits::default())
    }
}

impl Compiler {
    /// The sandbox capability set is exactly the registry's display widgets
    pub fn new(registry: Arc<Registry>, policy: ScriptPolicy, limits: SandboxLimits) -> Self {
        let sandbox = Sandbox::new(Capabilities::from_registry(&registry), limits);
        Compiler {
            registry,
            policy,
            sandbox,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Compiler::new(registry::global(), config.compiler.policy, config.sandbox)
    }

    pub fn policy(&self) -> ScriptPolicy {
        self.policy
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Run the full pipeline on one document
    pub fn compile(&self, source: &str, filename: &str) -> CompiledArtifact {
        let mut gate = prefilter::scan(source);
        let mut security = !gate.valid;
        let mut warnings = Vec::new();

        match parser::parse(source) {
            Ok(document) => {
                // A script body the permissive policy cannot parse is a parse error, not a violation
                let script_error = match self.policy.enforce(document.script.as_ref()) {
                    Ok(outcome) => {
                        gate.merge(outcome.result);
                        None
                    }
                    Err(e) => Some(e),
                };
                let classification = classifier::classify(&document.html, &self.registry);
                gate.extend(classification.errors);
                warnings = classification.warnings;
                security |= !gate.valid;
                if let Some(e) = script_error {
                    gate.add(e.author_message());
                }
            }
            Err(e) => gate.add(e.author_message()),
        }

        if !gate.valid {
            let error = if security {
                Error::Security(gate.violations)
            } else {
                Error::Parse(gate.violations.join("\n"))
            };
            tracing::info!(filename, category = error.category(), "compile rejected");
            return CompiledArtifact::failed(&error, warnings);
        }

        match self.build(source, filename) {
            Ok((module, component)) => {
                warnings.extend(module.warnings);
                tracing::info!(filename, warnings = warnings.len(), "compiled");
                CompiledArtifact {
                    success: true,
                    code: Some(module.code),
                    warnings,
                    error: None,
                    error_category: None,
                    component: Some(Arc::new(component)),
                }
            }
            Err(e) => {
                tracing::warn!(filename, error = %e, "compile failed after validation");
                CompiledArtifact::failed(&e, warnings)
            }
        }
    }

    fn build(
        &self,
        source: &str,
        filename: &str,
    ) -> crate::Result<(codegen::GeneratedModule, RuntimeComponent)> {
        let processed = codegen::preprocess(source, &self.registry)?;
        let module = codegen::generate(&processed, filename, &self.registry)?;
        let component = self.sandbox.load(&module.code)?;
        Ok((module, component))
    }

    /// Compile and report only the violations
    ///
    /// Runs the whole pipeline, so code generation and sandbox load
    /// failures are reported too.
    pub fn check(&self, source: &str) -> ValidationResult {
        let artifact = self.compile(source, "check.dash");
        let mut result = ValidationResult::new();
        if let Some(error) = artifact.error {
            result.extend(error.lines().map(str::to_string));
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::InputState;
    use serde_json::json;

    const SCENARIO_A: &str = r#"<Toggle name="showFilters" value="true" /><Grid><Chart source="sales" visible="{inputs.showFilters}" /></Grid>"#;

    #[test]
    fn test_compile_success() {
        let artifact = Compiler::default().compile(SCENARIO_A, "Dashboard.dash");
        assert!(artifact.success, "{:?}", artifact.error);
        assert!(artifact.error.is_none());
        let code = artifact.code.as_deref().unwrap();
        assert!(code.contains("module \"Dashboard.dash\""));
        assert!(code.contains("import Chart from \"Chart\""));
        assert!(code.contains("param Toggle boolean"));

        let component = artifact.component.as_ref().unwrap();
        let state = component.initial_state();
        assert_eq!(state.get("showFilters"), Some(&json!(true)));
        assert_eq!(component.render(&state).len(), 1);
    }

    #[test]
    fn test_strict_rejects_script() {
        let artifact = Compiler::default().compile("<script>let x = 1;</script>\n<Chart />", "a.dash");
        assert!(!artifact.success);
        assert!(artifact.code.is_none());
        assert_eq!(artifact.error_category.as_deref(), Some("SecurityViolation"));
        assert!(artifact.error.unwrap().contains("Script not allowed"));
    }

    #[test]
    fn test_strict_rejects_script_it_cannot_parse() {
        for source in ["<script>for (;;) {}</script><Chart />", "<script>class A {}</script><Chart />"] {
            let artifact = Compiler::default().compile(source, "a.dash");
            assert!(!artifact.success);
            assert_eq!(artifact.error_category.as_deref(), Some("SecurityViolation"));
            assert!(artifact.error.unwrap().starts_with("Script not allowed"));
        }
    }

    #[test]
    fn test_permissive_unparseable_script_is_parse_error() {
        let compiler = Compiler::new(
            registry::global(),
            ScriptPolicy::Permissive,
            SandboxLimits::default(),
        );
        let artifact = compiler.compile("<script>for (;;) {}</script><Chart />", "a.dash");
        assert!(!artifact.success);
        assert_eq!(artifact.error_category.as_deref(), Some("ParseError"));
        assert!(artifact.error.unwrap().contains("Unsupported syntax 'for' at 1:9"));
    }

    #[test]
    fn test_deep_nesting_fails_without_crashing() {
        let depth = 20_000;
        let markup = format!("{}{}", "<Grid>".repeat(depth), "</Grid>".repeat(depth));
        let artifact = Compiler::default().compile(&markup, "a.dash");
        assert!(!artifact.success);
        assert_eq!(artifact.error_category.as_deref(), Some("ParseError"));

        let expression = format!("<Chart data={{{}1{}}} />", "[".repeat(depth), "]".repeat(depth));
        let artifact = Compiler::default().compile(&expression, "a.dash");
        assert_eq!(artifact.error_category.as_deref(), Some("ParseError"));
        assert!(artifact.error.unwrap().contains("Nesting exceeds limit"));
    }

    #[test]
    fn test_unsupported_attribute_expression_warns_once() {
        let artifact = Compiler::default().compile("<Chart data={a ? 1 : 2} />", "a.dash");
        assert!(artifact.success, "{:?}", artifact.error);
        assert_eq!(artifact.warnings.len(), 1);
        assert!(artifact.warnings[0].contains("'ConditionalExpression'"));
    }

    #[test]
    fn test_violations_accumulate() {
        let source = "<script>fetch('/x'); eval('1')</script>\n<Foo />";
        let artifact = Compiler::default().compile(source, "a.dash");
        let error = artifact.error.unwrap();
        let lines: Vec<&str> = error.lines().collect();
        assert!(lines[0].contains("network access"));
        assert!(lines[1].contains("dynamic code"));
        assert!(lines.iter().any(|l| l.contains("Script not allowed")));
        assert!(lines.iter().any(|l| l.contains("Unknown component: Foo")));
    }

    #[test]
    fn test_parse_error_category() {
        let artifact = Compiler::default().compile("<Grid><Chart />", "a.dash");
        assert!(!artifact.success);
        assert_eq!(artifact.error_category.as_deref(), Some("ParseError"));
        assert!(artifact.error.unwrap().contains("1:1"));
    }

    #[test]
    fn test_undefined_identifier_is_compile_error() {
        let artifact = Compiler::default().compile("<Chart data={rows} />", "a.dash");
        assert!(!artifact.success);
        assert_eq!(artifact.error_category.as_deref(), Some("CompileError"));
        assert!(artifact.error.unwrap().contains("'rows' is not defined"));
    }

    #[test]
    fn test_permissive_inlines_constants() {
        let compiler = Compiler::new(
            registry::global(),
            ScriptPolicy::Permissive,
            SandboxLimits::default(),
        );
        let source = "<script>\nlet salesTitle = \"Monthly Sales\";\n</script>\n<Chart title={salesTitle} />";
        let artifact = compiler.compile(source, "a.dash");
        assert!(artifact.success, "{:?}", artifact.error);
        let nodes = artifact.component.unwrap().render(&InputState::new());
        let rendered = serde_json::to_value(&nodes).unwrap();
        assert_eq!(rendered[0]["props"]["title"], json!("Monthly Sales"));
    }

    #[test]
    fn test_permissive_still_rejects_imports() {
        let compiler = Compiler::new(
            registry::global(),
            ScriptPolicy::Permissive,
            SandboxLimits::default(),
        );
        let artifact = compiler.compile("<script>import x from 'y';</script>", "a.dash");
        assert!(!artifact.success);
        assert_eq!(artifact.error_category.as_deref(), Some("SecurityViolation"));
    }

    #[test]
    fn test_sandbox_limits_surface_as_runtime_load_error() {
        let limits = SandboxLimits {
            max_instructions: 3,
            max_depth: 64,
        };
        let compiler = Compiler::new(registry::global(), ScriptPolicy::Strict, limits);
        let artifact = compiler.compile(SCENARIO_A, "a.dash");
        assert!(!artifact.success);
        assert_eq!(artifact.error_category.as_deref(), Some("RuntimeLoadError"));
    }

    #[test]
    fn test_artifact_serialization() {
        let ok = Compiler::default().compile("<Chart />", "a.dash");
        let value = serde_json::to_value(&ok).unwrap();
        assert_eq!(value["success"], json!(true));
        assert_eq!(value["error"], json!(null));
        assert!(value.get("errorCategory").is_none());
        assert!(value.get("component").is_none());

        let failed = Compiler::default().compile("<Foo />", "a.dash");
        let value = serde_json::to_value(&failed).unwrap();
        assert_eq!(value["code"], json!(null));
        assert_eq!(value["errorCategory"], json!("SecurityViolation"));
    }

    #[test]
    fn test_digest_is_sha256_hex() {
        let artifact = Compiler::default().compile("<Chart />", "a.dash");
        let digest = artifact.digest().unwrap();
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
        assert!(Compiler::default().compile("<Foo />", "a.dash").digest().is_none());
    }

    #[test]
    fn test_into_result_maps_category() {
        let err = Compiler::default()
            .compile("<Foo />", "a.dash")
            .into_result()
            .unwrap_err();
        assert!(matches!(err, Error::Security(ref v) if v.len() == 1));
    }

    #[test]
    fn test_check_reports_violations() {
        let result = Compiler::default().check(r#"<Chart filter="{inputs.region} AND 1=1" />"#);
        assert!(!result.valid);
        assert!(Compiler::default().check("<Chart />").valid);
    }

    #[test]
    fn test_compile_determinism() {
        let compiler = Compiler::default();
        let first = compiler.compile(SCENARIO_A, "Dashboard.dash");
        for _ in 0..100 {
            let again = compiler.compile(SCENARIO_A, "Dashboard.dash");
            assert_eq!(first.code, again.code);
            assert_eq!(first.warnings, again.warnings);
            assert_eq!(first.digest(), again.digest());
        }
    }
}
