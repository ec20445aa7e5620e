//! Component classifier: resolves markup tags against the capability registry
//!
//! Walks the markup tree and turns every component-shaped node into a
//! `Component`, split into input and display lists. Components live in an
//! arena (`Classification::components`) and refer to each other by
//! `ComponentId`, so the parent link never forms an ownership cycle.
//!
//! # Rules
//!
//! - Input registry first, then display registry, then chart aliases.
//!   Anything else (including lower-case HTML elements) is an
//!   `Unknown component` error and is left out of both lists; its children
//!   are still classified.
//! - `Grid` is a container: its direct children are marked `insideGrid`.
//! - Every string attribute, every `{...}` tag and every `{#if}` condition
//!   is checked against the placeholder grammar. Violations are errors.
//! - Expression attributes are reduced to JSON values; unrecognized shapes
//!   become `null` with a warning.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use serde_json::Value;

use crate::expression;
use crate::parser::{self, Node, Scalar};
use crate::parser::script::property_key;
use crate::policy::ScriptPolicy;
use crate::prefilter;
use crate::registry::{self, Lookup, Registry};
use crate::state::{self, InputState};

/// Index of a component in `Classification::components`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ComponentId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentRole {
    Input,
    Display,
}

/// A classified component
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Component {
    pub id: ComponentId,
    /// Tag as written (`BarChart` stays `BarChart`)
    #[serde(rename = "type")]
    pub component_type: String,
    pub role: ComponentRole,
    pub attributes: BTreeMap<String, Value>,
    pub parent: Option<ComponentId>,
    pub children: Vec<ComponentId>,
    pub is_container: bool,
    pub inside_grid: bool,
}

/// Output of `classify`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Classification {
    pub components: Vec<Component>,
    pub input_components: Vec<ComponentId>,
    pub display_components: Vec<ComponentId>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl Classification {
    pub fn get(&self, id: ComponentId) -> Option<&Component> {
        self.components.get(id.0)
    }

    pub fn inputs(&self) -> impl Iterator<Item = &Component> {
        self.input_components.iter().filter_map(|id| self.get(*id))
    }

    pub fn displays(&self) -> impl Iterator<Item = &Component> {
        self.display_components.iter().filter_map(|id| self.get(*id))
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Classify every component in a markup tree
pub fn classify(markup: &Node, registry: &Registry) -> Classification {
    let mut classifier = Classifier {
        registry,
        out: Classification::default(),
        input_names: BTreeSet::new(),
    };
    classifier.visit(markup, None, false);
    tracing::debug!(
        inputs = classifier.out.input_components.len(),
        displays = classifier.out.display_components.len(),
        errors = classifier.out.errors.len(),
        "classified markup"
    );
    classifier.out
}

struct Classifier<'r> {
    registry: &'r Registry,
    out: Classification,
    input_names: BTreeSet<String>,
}

impl Classifier<'_> {
    fn visit(&mut self, node: &Node, parent: Option<ComponentId>, inside_grid: bool) {
        match node.kind.as_str() {
            "InlineComponent" | "Element" => self.visit_component(node, parent, inside_grid),
            "IfBlock" => {
                if let Some(raw) = node.str_value("raw") {
                    self.out
                        .errors
                        .extend(expression::validate_reference_expression(raw));
                }
                self.visit_children(node, parent, inside_grid);
                if let Some(else_block) = node.node("else") {
                    self.visit(else_block, parent, inside_grid);
                }
            }
            "MustacheTag" => {
                if let Some(raw) = node.str_value("raw") {
                    self.out
                        .errors
                        .extend(expression::validate_reference_expression(raw));
                }
            }
            "Style" => self.out.errors.push("Style blocks not allowed".to_string()),
            "Text" | "Comment" => {}
            _ => self.visit_children(node, parent, inside_grid),
        }
    }

    fn visit_children(&mut self, node: &Node, parent: Option<ComponentId>, inside_grid: bool) {
        for child in node.list("children") {
            self.visit(child, parent, inside_grid);
        }
    }

    fn visit_component(&mut self, node: &Node, parent: Option<ComponentId>, inside_grid: bool) {
        let name = node.str_value("name").unwrap_or_default().to_string();
        let mut attributes = self.attributes(node, &name);

        let (role, is_container) = match self.registry.lookup(&name) {
            Lookup::Unknown => {
                self.out.errors.push(format!("Unknown component: {}", name));
                self.visit_children(node, parent, inside_grid);
                return;
            }
            Lookup::Input(_) => {
                if let Some(input_name) = attributes.get("name").and_then(Value::as_str) {
                    if !self.input_names.insert(input_name.to_string()) {
                        self.out
                            .warnings
                            .push(format!("Duplicate input name '{}'", input_name));
                    }
                }
                (ComponentRole::Input, false)
            }
            Lookup::Display { spec, implied_type } => {
                if let Some(chart_type) = implied_type {
                    attributes
                        .entry("type".to_string())
                        .or_insert_with(|| Value::String(chart_type.to_string()));
                }
                (ComponentRole::Display, spec.container)
            }
        };

        let id = ComponentId(self.out.components.len());
        self.out.components.push(Component {
            id,
            component_type: name,
            role,
            attributes,
            parent,
            children: Vec::new(),
            is_container,
            inside_grid,
        });
        if let Some(parent_component) = parent.and_then(|p| self.out.components.get_mut(p.0)) {
            parent_component.children.push(id);
        }
        match role {
            ComponentRole::Input => self.out.input_components.push(id),
            ComponentRole::Display => self.out.display_components.push(id),
        }

        self.visit_children(node, Some(id), is_container);
    }

    /// Attribute map for one node, validating every string value
    fn attributes(&mut self, node: &Node, tag: &str) -> BTreeMap<String, Value> {
        let mut attributes = BTreeMap::new();
        for attribute in node.list("attributes") {
            let Some(name) = attribute.str_value("name") else {
                continue;
            };
            if name.contains(':') {
                self.out
                    .errors
                    .push(format!("Directive '{}' not allowed on <{}>", name, tag));
                continue;
            }

            let value = if let Some(Scalar::Bool(b)) = attribute.value("value") {
                Value::Bool(*b)
            } else {
                match attribute.list("value").first() {
                    Some(part) if part.is("Text") => {
                        Value::String(part.str_value("data").unwrap_or_default().to_string())
                    }
                    Some(part) if part.is("MustacheTag") => match part.node("expression") {
                        Some(expr) => self.expression_value(expr, tag, name),
                        None => Value::Null,
                    },
                    _ => Value::String(String::new()),
                }
            };

            self.validate_strings(&value);
            attributes.insert(name.to_string(), value);
        }
        attributes
    }

    fn validate_strings(&mut self, value: &Value) {
        match value {
            Value::String(s) => self.out.errors.extend(expression::validate(s)),
            Value::Array(items) => items.iter().for_each(|v| self.validate_strings(v)),
            Value::Object(map) => map.values().for_each(|v| self.validate_strings(v)),
            _ => {}
        }
    }

    fn expression_value(&mut self, expr: &Node, tag: &str, attribute: &str) -> Value {
        match expression_to_value(expr) {
            Some(value) => value,
            None => {
                tracing::warn!(tag, attribute, kind = %expr.kind, "unrecognized attribute expression");
                self.out.warnings.push(format!(
                    "Unsupported expression '{}' in attribute '{}' of <{}>; value set to null",
                    expr.kind, attribute, tag
                ));
                Value::Null
            }
        }
    }
}

/// Reduce an attribute expression to a JSON value
///
/// Literals, identifiers (as their name), `inputs.name` (as the placeholder
/// `{inputs.name}`), and arrays/objects of those. Nested unrecognized
/// elements become `null`; an unrecognized top-level shape yields `None`.
pub fn expression_to_value(expr: &Node) -> Option<Value> {
    match expr.kind.as_str() {
        "Literal" => Some(expr.value("value").map(Scalar::to_json).unwrap_or(Value::Null)),
        "Identifier" => expr.str_value("name").map(|n| Value::String(n.to_string())),
        "MemberExpression" => input_member(expr).map(|name| Value::String(format!("{{inputs.{}}}", name))),
        "ArrayExpression" => Some(Value::Array(
            expr.list("elements")
                .iter()
                .map(|e| expression_to_value(e).unwrap_or(Value::Null))
                .collect(),
        )),
        "ObjectExpression" => {
            let mut object = serde_json::Map::new();
            for property in expr.list("properties") {
                if !property.is("Property") {
                    continue;
                }
                let Some(key) = property.node("key").and_then(property_key) else {
                    continue;
                };
                let value = property
                    .node("value")
                    .and_then(expression_to_value)
                    .unwrap_or(Value::Null);
                object.insert(key, value);
            }
            Some(Value::Object(object))
        }
        _ => None,
    }
}

/// `inputs.<name>` with a non-computed property, returning `<name>`
pub(crate) fn input_member(expr: &Node) -> Option<&str> {
    if expr.value("computed") == Some(&Scalar::Bool(true)) {
        return None;
    }
    let object = expr.node("object")?;
    if !object.is("Identifier") || object.str_value("name") != Some("inputs") {
        return None;
    }
    expr.node("property")?.str_value("name")
}

// ── Host-UI analysis ──────────────────────────────────────

/// Component structure as shown by the authoring UI
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Analysis {
    pub input_components: Vec<Component>,
    pub display_components: Vec<Component>,
    pub input_state: InputState,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// Analyze a document for the authoring UI with the standard registry
pub fn analyze(source: &str) -> Analysis {
    analyze_with(source, &registry::global())
}

/// Pre-filter, parse, reject scripts, classify and initialize input state
///
/// Never fails: parse errors and violations land in `errors`, and a document
/// with a script region yields empty component lists.
pub fn analyze_with(source: &str, registry: &Registry) -> Analysis {
    let mut analysis = Analysis {
        errors: prefilter::scan(source).violations,
        ..Analysis::default()
    };

    let document = match parser::parse(source) {
        Ok(document) => document,
        Err(e) => {
            analysis.errors.push(e.to_string());
            return analysis;
        }
    };

    match ScriptPolicy::Strict.enforce(document.script.as_ref()) {
        Ok(outcome) if outcome.result.valid => {}
        Ok(outcome) => {
            analysis.errors.extend(outcome.result.violations);
            return analysis;
        }
        Err(e) => {
            analysis.errors.push(e.to_string());
            return analysis;
        }
    }

    let classification = classify(&document.html, registry);
    analysis.input_state = state::initialize(classification.inputs(), registry);
    analysis.input_components = classification.inputs().cloned().collect();
    analysis.display_components = classification.displays().cloned().collect();
    analysis.errors.extend(classification.errors);
    analysis.warnings = classification.warnings;
    analysis
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn classify_text(text: &str) -> Classification {
        let document = parser::parse(text).unwrap();
        classify(&document.html, &Registry::standard())
    }

    #[test]
    fn test_inputs_and_displays_split() {
        let c = classify_text(
            r#"<Toggle name="showFilters" value="true" />
<Dropdown name="region" options="North,South" value="North" />
<Chart source="sales" />"#,
        );
        assert!(c.is_valid(), "{:?}", c.errors);
        let inputs: Vec<&str> = c.inputs().map(|x| x.component_type.as_str()).collect();
        assert_eq!(inputs, vec!["Toggle", "Dropdown"]);
        let displays: Vec<&str> = c.displays().map(|x| x.component_type.as_str()).collect();
        assert_eq!(displays, vec!["Chart"]);
    }

    #[test]
    fn test_grid_marks_direct_children() {
        let c = classify_text(
            r#"<Grid cols="2"><Chart source="a" /><Chart source="b"><Filter /></Chart></Grid>"#,
        );
        let grid = c.displays().next().unwrap();
        assert!(grid.is_container);
        assert!(!grid.inside_grid);
        assert_eq!(grid.children.len(), 2);

        let charts: Vec<&Component> = c.displays().filter(|x| x.component_type == "Chart").collect();
        assert!(charts.iter().all(|x| x.inside_grid && x.parent == Some(grid.id)));

        let filter = c.displays().find(|x| x.component_type == "Filter").unwrap();
        assert!(!filter.inside_grid);
        assert_eq!(filter.parent, Some(charts[1].id));
    }

    #[test]
    fn test_if_block_children_keep_grid_parent() {
        let c = classify_text("<Grid>{#if inputs.show}<Chart />{/if}</Grid>");
        assert!(c.is_valid(), "{:?}", c.errors);
        let chart = c.displays().find(|x| x.component_type == "Chart").unwrap();
        assert!(chart.inside_grid);
    }

    #[test]
    fn test_unknown_component_omitted_children_kept() {
        let c = classify_text("<Foo><Chart /></Foo><div></div>");
        assert_eq!(c.errors, vec!["Unknown component: Foo", "Unknown component: div"]);
        assert_eq!(c.display_components.len(), 1);
        assert_eq!(c.displays().next().unwrap().parent, None);
    }

    #[test]
    fn test_chart_alias_implies_type() {
        let c = classify_text(r#"<BarChart source="s" /><LineChart type="area" />"#);
        let displays: Vec<&Component> = c.displays().collect();
        assert_eq!(displays[0].component_type, "BarChart");
        assert_eq!(displays[0].attributes["type"], json!("bar"));
        assert_eq!(displays[1].attributes["type"], json!("area"));
    }

    #[test]
    fn test_expression_attributes() {
        let c = classify_text(
            r#"<Chart data={[{month: "Jan", sales: 100}]} cols={3} visible={inputs.show} title={label} flag />"#,
        );
        assert!(c.is_valid(), "{:?}", c.errors);
        let attrs = &c.displays().next().unwrap().attributes;
        assert_eq!(attrs["data"], json!([{"month": "Jan", "sales": 100}]));
        assert_eq!(attrs["cols"], json!(3));
        assert_eq!(attrs["visible"], json!("{inputs.show}"));
        assert_eq!(attrs["title"], json!("label"));
        assert_eq!(attrs["flag"], json!(true));
    }

    #[test]
    fn test_unrecognized_expression_is_null_with_warning() {
        let c = classify_text("<Chart data={a ? b : c} />");
        assert!(c.is_valid());
        assert_eq!(c.displays().next().unwrap().attributes["data"], Value::Null);
        assert_eq!(c.warnings.len(), 1);
        assert!(c.warnings[0].contains("ConditionalExpression"));
    }

    #[test]
    fn test_attribute_violations_collected() {
        let c = classify_text(
            r#"<Chart visible="{eval(userCode)}" filter="{inputs.region} AND 1=1" on:click={x} />"#,
        );
        assert!(c.errors.iter().any(|e| e.contains("Dangerous expression")));
        assert!(c.errors.iter().any(|e| e.contains("entire value")));
        assert!(c.errors.iter().any(|e| e.contains("Directive 'on:click'")));
    }

    #[test]
    fn test_body_mustache_and_condition_checked() {
        let c = classify_text("{#if window.x}<Chart />{/if}{inputs.ok}{secret}");
        // window.x trips both the keyword check and the grammar check
        assert_eq!(c.errors.len(), 3);
    }

    #[test]
    fn test_duplicate_input_name_warns() {
        let c = classify_text(
            r#"<Toggle name="a" value="true" /><Toggle name="a" value="false" />"#,
        );
        assert_eq!(c.warnings, vec!["Duplicate input name 'a'"]);
        assert_eq!(c.input_components.len(), 2);
    }

    #[test]
    fn test_style_rejected() {
        let c = classify_text("<style>.x { background: url(http://a) }</style>");
        assert_eq!(c.errors, vec!["Style blocks not allowed"]);
    }

    #[test]
    fn test_analyze_rejects_script_with_empty_lists() {
        let analysis = analyze("<script>let showX = true;</script><Chart />");
        assert!(analysis.input_components.is_empty());
        assert!(analysis.display_components.is_empty());
        assert!(analysis.errors[0].to_lowercase().contains("script not allowed"));
    }

    #[test]
    fn test_analyze_rejects_unparseable_script_as_script() {
        for body in ["for (;;) {}", "class A {}"] {
            let analysis = analyze(&format!("<script>{}</script><Chart />", body));
            assert_eq!(analysis.errors.len(), 1, "{:?}", analysis.errors);
            assert!(analysis.errors[0].starts_with("Script not allowed"));
            assert!(analysis.display_components.is_empty());
        }
    }

    #[test]
    fn test_analyze_reports_parse_error() {
        let analysis = analyze("<Grid>");
        assert_eq!(analysis.errors.len(), 1);
        assert!(analysis.errors[0].starts_with("Parse error:"));
    }

    #[test]
    fn test_analyze_serializes_camel_case() {
        let analysis = analyze(r#"<Grid><Chart /></Grid>"#);
        let json = serde_json::to_value(&analysis).unwrap();
        assert_eq!(json["displayComponents"][0]["isContainer"], json!(true));
        assert_eq!(json["displayComponents"][1]["insideGrid"], json!(true));
        assert_eq!(json["displayComponents"][1]["type"], json!("Chart"));
        assert_eq!(json["displayComponents"][1]["parent"], json!(0));
    }
}
