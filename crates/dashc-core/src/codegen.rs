//! Code generator: lowers a validated document to a dashc module
//!
//! `preprocess` injects the whitelisted component imports into the script
//! region; `generate` then compiles the whole document into the
//! line-oriented module text that `sandbox::Sandbox::load` understands.
//!
//! # Lowering
//!
//! - input components become `param` declarations (they are rendered by the
//!   host, not mounted);
//! - display components become `mount` (no children) or `open` ... `close`;
//!   chart aliases mount `Chart` with an implied `type`;
//! - `{#if inputs.x}` becomes `if` / `else` / `end`;
//! - text becomes `text`, `{inputs.x}` in markup becomes `expr`;
//! - literal script declarations become `let`, and attribute references to
//!   them are inlined.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;

use crate::classifier::input_member;
use crate::parser::{self, script::literal_value, Node, Scalar};
use crate::registry::{Lookup, Registry};
use crate::{Error, Result};

/// Module text plus non-fatal diagnostics
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedModule {
    pub code: String,
    pub warnings: Vec<String>,
}

/// Inject `import X from "X";` for every display component in the registry
///
/// The imports go at the top of the existing script region, or into a new
/// one placed before the markup.
pub fn preprocess(source: &str, registry: &Registry) -> Result<String> {
    let imports: Vec<String> = registry
        .display_names()
        .iter()
        .map(|name| format!("import {} from \"{}\";", name, name))
        .collect();
    let imports = imports.join("\n");

    let document = parser::parse(source)?;
    let processed = match document.script_content_start() {
        Some(start) => {
            let byte = source
                .char_indices()
                .nth(start)
                .map(|(b, _)| b)
                .unwrap_or(source.len());
            format!("{}\n{}\n{}", &source[..byte], imports, &source[byte..])
        }
        None => format!("<script>\n{}\n</script>\n{}", imports, source),
    };
    Ok(processed)
}

/// Compile a document into module text
///
/// # Errors
/// `Error::Parse` for malformed input and `Error::Compile` when the
/// document uses a construct the module language cannot express: an
/// undefined component or identifier, a duplicate attribute, a script
/// binding that redeclares an import or another binding, or a
/// non-literal initializer.
pub fn generate(source: &str, filename: &str, registry: &Registry) -> Result<GeneratedModule> {
    let document = parser::parse(source)?;
    let mut generator = Generator {
        registry,
        imports: Vec::new(),
        bindings: BTreeSet::new(),
        constants: BTreeMap::new(),
        params: Vec::new(),
        body: Vec::new(),
        warnings: Vec::new(),
        depth: 0,
    };

    if let Some(program) = document.script_program()? {
        generator.script(&program)?;
    }
    generator.fragment(&document.html)?;

    let mut lines = vec![
        "// dashc module".to_string(),
        format!("module {}", Value::String(filename.to_string())),
    ];
    for (binding, source) in &generator.imports {
        lines.push(format!("import {} from {}", binding, Value::String(source.clone())));
    }
    lines.extend(generator.params);
    for (name, value) in &generator.constants {
        lines.push(format!("let {} {}", name, value));
    }
    lines.extend(generator.body);

    let mut code = lines.join("\n");
    code.push('\n');
    tracing::debug!(filename, lines = lines.len(), "generated module");
    Ok(GeneratedModule {
        code,
        warnings: generator.warnings,
    })
}

struct Generator<'r> {
    registry: &'r Registry,
    /// (binding, module source) in declaration order
    imports: Vec<(String, String)>,
    bindings: BTreeSet<String>,
    constants: BTreeMap<String, Value>,
    params: Vec<String>,
    body: Vec<String>,
    warnings: Vec<String>,
    depth: usize,
}

impl Generator<'_> {
    // ── Script ─────────────────────────────────────────────

    fn script(&mut self, program: &Node) -> Result<()> {
        for statement in program.list("body") {
            match statement.kind.as_str() {
                "ImportDeclaration" => self.import(statement)?,
                "VariableDeclaration" => {
                    for declarator in statement.list("declarations") {
                        self.declare(declarator)?;
                    }
                }
                "ExpressionStatement" => self.warnings.push(format!(
                    "Statement at {} has no effect in a dashboard and was skipped",
                    statement.span
                )),
                "EmptyStatement" => {}
                other => {
                    return Err(Error::Compile(format!(
                        "Unsupported statement '{}' at {}",
                        other, statement.span
                    )));
                }
            }
        }
        Ok(())
    }

    fn import(&mut self, declaration: &Node) -> Result<()> {
        let source = declaration
            .node("source")
            .and_then(|s| s.str_value("value"))
            .unwrap_or_default()
            .to_string();
        for specifier in declaration.list("specifiers") {
            if !specifier.is("ImportDefaultSpecifier") {
                return Err(Error::Compile(format!(
                    "Only default imports are supported at {}",
                    specifier.span
                )));
            }
            let local = specifier
                .node("local")
                .and_then(|l| l.str_value("name"))
                .unwrap_or_default()
                .to_string();
            self.bind(&local, specifier.span)?;
            self.imports.push((local, source.clone()));
        }
        Ok(())
    }

    fn declare(&mut self, declarator: &Node) -> Result<()> {
        let Some(name) = declarator.node("id").and_then(|id| id.str_value("name")) else {
            return Ok(());
        };
        self.bind(name, declarator.span)?;
        let value = match declarator.node("init") {
            None => Value::Null,
            Some(init) => literal_value(init).ok_or_else(|| {
                Error::Compile(format!(
                    "Initializer for '{}' must be a literal at {}",
                    name, init.span
                ))
            })?,
        };
        self.constants.insert(name.to_string(), value);
        Ok(())
    }

    fn bind(&mut self, name: &str, span: parser::Span) -> Result<()> {
        if !self.bindings.insert(name.to_string()) {
            return Err(Error::Compile(format!(
                "Identifier '{}' has already been declared at {}",
                name, span
            )));
        }
        Ok(())
    }

    fn imported(&self, name: &str) -> bool {
        self.imports.iter().any(|(binding, _)| binding == name)
    }

    // ── Markup ─────────────────────────────────────────────

    fn emit(&mut self, line: String) {
        self.body.push(format!("{}{}", "  ".repeat(self.depth), line));
    }

    fn fragment(&mut self, node: &Node) -> Result<()> {
        for child in node.list("children") {
            self.markup(child)?;
        }
        Ok(())
    }

    fn markup(&mut self, node: &Node) -> Result<()> {
        match node.kind.as_str() {
            "InlineComponent" => self.component(node),
            "Element" => Err(Error::Compile(format!(
                "HTML element <{}> is not supported at {}",
                node.str_value("name").unwrap_or_default(),
                node.span
            ))),
            "Text" => {
                let text = collapse_whitespace(node.str_value("data").unwrap_or_default());
                if !text.is_empty() {
                    self.emit(format!("text {}", Value::String(text)));
                }
                Ok(())
            }
            "MustacheTag" => {
                let expr = node.node("expression");
                if let Some(name) = expr.and_then(input_member) {
                    self.emit(format!("expr inputs.{}", name));
                    return Ok(());
                }
                if let Some(Value::String(text)) = expr.and_then(literal_value) {
                    self.emit(format!("text {}", Value::String(text)));
                    return Ok(());
                }
                Err(Error::Compile(format!(
                    "Only {{inputs.name}} may appear in markup at {}",
                    node.span
                )))
            }
            "IfBlock" => {
                let Some(name) = node.node("expression").and_then(input_member) else {
                    return Err(Error::Compile(format!(
                        "{{#if}} conditions must be an input reference at {}",
                        node.span
                    )));
                };
                self.emit(format!("if inputs.{}", name));
                self.depth += 1;
                self.fragment(node)?;
                self.depth -= 1;
                if let Some(else_block) = node.node("else") {
                    self.emit("else".to_string());
                    self.depth += 1;
                    self.fragment(else_block)?;
                    self.depth -= 1;
                }
                self.emit("end".to_string());
                Ok(())
            }
            "Comment" => Ok(()),
            "Style" => Err(Error::Compile(format!(
                "Style blocks are not supported at {}",
                node.span
            ))),
            other => Err(Error::Compile(format!(
                "Unsupported markup '{}' at {}",
                other, node.span
            ))),
        }
    }

    fn component(&mut self, node: &Node) -> Result<()> {
        let tag = node.str_value("name").unwrap_or_default();
        let mut props = self.props(node, tag)?;

        let binding = match self.registry.lookup(tag) {
            Lookup::Input(spec) => {
                let props = Value::Object(props.into_iter().collect());
                self.params
                    .push(format!("param {} {} {}", spec.name, spec.generates, props));
                if !node.list("children").is_empty() {
                    self.warnings
                        .push(format!("Children of <{}> at {} were ignored", tag, node.span));
                }
                return Ok(());
            }
            Lookup::Display {
                spec,
                implied_type: Some(chart_type),
            } => {
                props
                    .entry("type".to_string())
                    .or_insert_with(|| Value::String(chart_type.to_string()));
                spec.name
            }
            Lookup::Display { .. } | Lookup::Unknown => tag,
        };

        if !self.imported(binding) {
            return Err(Error::Compile(format!(
                "<{}> is not defined at {}",
                tag, node.span
            )));
        }

        let props = Value::Object(props.into_iter().collect());
        let children = node.list("children");
        if children.iter().all(is_blank) {
            self.emit(format!("mount {} {}", binding, props));
            return Ok(());
        }
        self.emit(format!("open {} {}", binding, props));
        self.depth += 1;
        self.fragment(node)?;
        self.depth -= 1;
        self.emit("close".to_string());
        Ok(())
    }

    fn props(&mut self, node: &Node, tag: &str) -> Result<BTreeMap<String, Value>> {
        let mut props = BTreeMap::new();
        for attribute in node.list("attributes") {
            let name = attribute.str_value("name").unwrap_or_default();
            if name.contains(':') {
                return Err(Error::Compile(format!(
                    "Directive '{}' is not supported at {}",
                    name, attribute.span
                )));
            }
            let value = self.attribute_value(attribute)?;
            if props.insert(name.to_string(), value).is_some() {
                return Err(Error::Compile(format!(
                    "Attributes need to be unique ('{}' on <{}>) at {}",
                    name, tag, attribute.span
                )));
            }
        }
        Ok(props)
    }

    /// Unsupported expressions become null; the classifier reports them
    fn attribute_value(&self, attribute: &Node) -> Result<Value> {
        if let Some(Scalar::Bool(b)) = attribute.value("value") {
            return Ok(Value::Bool(*b));
        }
        let Some(part) = attribute.list("value").first() else {
            return Ok(Value::String(String::new()));
        };
        if part.is("Text") {
            return Ok(Value::String(
                part.str_value("data").unwrap_or_default().to_string(),
            ));
        }
        let Some(expr) = part.node("expression") else {
            return Ok(Value::Null);
        };
        if let Some(value) = literal_value(expr) {
            return Ok(value);
        }
        if let Some(param) = input_member(expr) {
            return Ok(Value::String(format!("{{inputs.{}}}", param)));
        }
        if expr.is("Identifier") {
            let ident = expr.str_value("name").unwrap_or_default();
            return self.constants.get(ident).cloned().ok_or_else(|| {
                Error::Compile(format!("'{}' is not defined at {}", ident, expr.span))
            });
        }
        Ok(Value::Null)
    }
}

fn is_blank(node: &Node) -> bool {
    node.is("Comment") || (node.is("Text") && node.str_value("data").unwrap_or_default().trim().is_empty())
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> Registry {
        Registry::standard()
    }

    fn compile(source: &str) -> Result<GeneratedModule> {
        let registry = registry();
        let processed = preprocess(source, &registry)?;
        generate(&processed, "Dashboard.dash", &registry)
    }

    #[test]
    fn test_preprocess_creates_script_region() {
        let out = preprocess("<Chart />", &registry()).unwrap();
        assert_eq!(
            out,
            "<script>\nimport Chart from \"Chart\";\nimport Filter from \"Filter\";\nimport Grid from \"Grid\";\n</script>\n<Chart />"
        );
    }

    #[test]
    fn test_preprocess_injects_into_existing_script() {
        let out = preprocess("<script>let salesTitle = 'S';</script><Chart />", &registry()).unwrap();
        assert!(out.starts_with("<script>\nimport Chart from \"Chart\";"));
        assert!(out.contains("import Grid from \"Grid\";\nlet salesTitle = 'S';</script>"));
    }

    #[test]
    fn test_preprocess_ignores_script_text_in_comments() {
        let out = preprocess("<!-- <script> --><Chart />", &registry()).unwrap();
        assert!(out.starts_with("<script>\nimport Chart"));
    }

    #[test]
    fn test_generate_lowers_components() {
        let module = compile(
            r#"<Toggle name="showFilters" value="true" />
<Grid cols="2">
  <BarChart source="sales" visible="{inputs.showFilters}" />
</Grid>
{#if inputs.showFilters}
  Filters are on
{:else}
  {inputs.showFilters}
{/if}"#,
        )
        .unwrap();
        let expected = r#"// dashc module
module "Dashboard.dash"
import Chart from "Chart"
import Filter from "Filter"
import Grid from "Grid"
param Toggle boolean {"name":"showFilters","value":"true"}
open Grid {"cols":"2"}
  mount Chart {"source":"sales","type":"bar","visible":"{inputs.showFilters}"}
close
if inputs.showFilters
  text "Filters are on"
else
  expr inputs.showFilters
end
"#;
        assert_eq!(module.code, expected);
        assert!(module.warnings.is_empty());
    }

    #[test]
    fn test_constants_inline_into_props() {
        let module = compile(
            "<script>let chartData = [1, 2]; let salesTitle = 'Sales';</script><Chart data={chartData} title={salesTitle} />",
        )
        .unwrap();
        assert!(module.code.contains("let chartData [1,2]"));
        assert!(module
            .code
            .contains(r#"mount Chart {"data":[1,2],"title":"Sales"}"#));
    }

    #[test]
    fn test_undefined_identifier_is_compile_error() {
        let err = compile("<Chart data={missing} />").unwrap_err();
        assert_eq!(err.category(), "CompileError");
        assert!(err.to_string().contains("'missing' is not defined"));
    }

    #[test]
    fn test_unimported_component_is_compile_error() {
        let err = generate("<Chart />", "x.dash", &registry()).unwrap_err();
        assert!(err.to_string().contains("<Chart> is not defined"));
    }

    #[test]
    fn test_duplicate_attribute() {
        let err = compile(r#"<Chart title="a" title="b" />"#).unwrap_err();
        assert!(err.to_string().contains("Attributes need to be unique"));
    }

    #[test]
    fn test_shadowing_import_is_compile_error() {
        let err = compile("<script>let Chart = 1;</script><Chart />").unwrap_err();
        assert!(err.to_string().contains("Identifier 'Chart' has already been declared"));
    }

    #[test]
    fn test_non_literal_initializer() {
        let err = compile("<script>let maxCount = Math.max(1, 2);</script>").unwrap_err();
        assert!(err.to_string().contains("Initializer for 'maxCount' must be a literal"));
    }

    #[test]
    fn test_expression_statement_skipped_with_warning() {
        let module = compile("<script>1 + 1;</script><Filter />").unwrap();
        assert_eq!(module.warnings.len(), 1);
        assert!(module.code.contains("mount Filter {}"));
    }

    #[test]
    fn test_unsupported_attribute_expression_becomes_null() {
        let module = compile("<Chart data={a ? 1 : 2} />").unwrap();
        assert!(module.code.contains(r#"mount Chart {"data":null}"#));
        assert!(module.warnings.is_empty());
    }

    #[test]
    fn test_generate_determinism_100_iterations() {
        let source = r#"<Toggle name="a" value="true" /><Grid><Chart source="s" /></Grid>"#;
        let first = compile(source).unwrap();
        for i in 0..100 {
            assert_eq!(compile(source).unwrap(), first, "Determinism failure at iteration {}", i);
        }
    }
}
