//! Sandboxed loader: instantiates generated dashc modules
//!
//! A dashc module is line-oriented text produced by `codegen`. The loader
//! reads it into an instruction tree bound against an explicit
//! `Capabilities` map. The module language has no instruction that reaches
//! the network, storage, the host process or the clock; the only things a
//! module can name are the widgets in that map. An import or mount that is
//! not in the map fails the load with `Error::RuntimeLoad`.
//!
//! # Module instructions
//!
//! ```text
//! module "Dashboard.dash"
//! import Chart from "Chart"
//! param Toggle boolean {"name":"showFilters","value":"true"}
//! let salesTitle "Monthly Sales"
//! open Grid {"cols":"2"}
//! mount Chart {"source":"sales","visible":"{inputs.showFilters}"}
//! close
//! if inputs.showFilters
//! text "Filters are on"
//! else
//! expr inputs.region
//! end
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::expression;
use crate::registry::{DisplayComponentSpec, Registry, ValueType};
use crate::state::{self, InputState};
use crate::{Error, Result};

// ── Capabilities ──────────────────────────────────────────

/// A widget a module may mount
pub trait Widget: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &str;

    /// Render with placeholder-resolved props; `None` hides the widget
    fn render(&self, props: BTreeMap<String, Value>, children: Vec<RenderNode>) -> Option<RenderNode> {
        Some(RenderNode::Widget {
            name: self.name().to_string(),
            props,
            children,
        })
    }
}

/// Registry-described widget that honors the `visible` prop
#[derive(Debug, Clone)]
pub struct StandardWidget {
    name: String,
    props: Vec<String>,
}

impl StandardWidget {
    pub fn from_spec(spec: &DisplayComponentSpec) -> Self {
        StandardWidget {
            name: spec.name.to_string(),
            props: spec.props.iter().map(|p| p.to_string()).collect(),
        }
    }

    pub fn props(&self) -> &[String] {
        &self.props
    }
}

impl Widget for StandardWidget {
    fn name(&self) -> &str {
        &self.name
    }

    fn render(&self, props: BTreeMap<String, Value>, children: Vec<RenderNode>) -> Option<RenderNode> {
        let hidden = match props.get("visible") {
            Some(Value::Bool(b)) => !b,
            Some(Value::String(s)) => s == "false",
            _ => false,
        };
        if hidden {
            return None;
        }
        Some(RenderNode::Widget {
            name: self.name.clone(),
            props,
            children,
        })
    }
}

/// Named widgets resolvable from inside a module
#[derive(Debug, Clone, Default)]
pub struct Capabilities {
    widgets: BTreeMap<String, Arc<dyn Widget>>,
}

impl Capabilities {
    pub fn new() -> Self {
        Self::default()
    }

    /// One `StandardWidget` per display component in the registry
    pub fn from_registry(registry: &Registry) -> Self {
        registry
            .displays()
            .fold(Capabilities::new(), |caps, spec| {
                caps.with(Arc::new(StandardWidget::from_spec(spec)))
            })
    }

    pub fn with(mut self, widget: Arc<dyn Widget>) -> Self {
        self.widgets.insert(widget.name().to_string(), widget);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Widget>> {
        self.widgets.get(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.widgets.keys().map(String::as_str).collect()
    }
}

/// Bounds on the size of a loadable module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct SandboxLimits {
    pub max_instructions: usize,
    pub max_depth: usize,
}

impl Default for SandboxLimits {
    fn default() -> Self {
        SandboxLimits {
            max_instructions: 10_000,
            max_depth: 64,
        }
    }
}

// ── Render output ─────────────────────────────────────────

/// Rendered widget tree handed to the host
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum RenderNode {
    Widget {
        name: String,
        props: BTreeMap<String, Value>,
        children: Vec<RenderNode>,
    },
    Text {
        text: String,
    },
}

// ── Loaded module ─────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Instruction {
    Mount {
        binding: String,
        props: BTreeMap<String, Value>,
        children: Vec<Instruction>,
    },
    If {
        param: String,
        then: Vec<Instruction>,
        otherwise: Vec<Instruction>,
    },
    Text(String),
    Expr(String),
}

/// Input parameter declared by a module
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParamDecl {
    pub component: String,
    pub value_type: ValueType,
    pub props: BTreeMap<String, Value>,
}

impl ParamDecl {
    pub fn name(&self) -> Option<&str> {
        self.props.get("name").and_then(Value::as_str)
    }
}

/// An instantiated module, bound to its widgets
#[derive(Debug)]
pub struct RuntimeComponent {
    filename: String,
    imports: BTreeMap<String, Arc<dyn Widget>>,
    params: Vec<ParamDecl>,
    constants: BTreeMap<String, Value>,
    body: Vec<Instruction>,
}

impl RuntimeComponent {
    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn params(&self) -> &[ParamDecl] {
        &self.params
    }

    pub fn constants(&self) -> &BTreeMap<String, Value> {
        &self.constants
    }

    pub fn imports(&self) -> Vec<&str> {
        self.imports.keys().map(String::as_str).collect()
    }

    /// Initial input state from the declared parameters
    pub fn initial_state(&self) -> InputState {
        let mut state = InputState::new();
        for param in &self.params {
            if let (Some(name), Some(value)) = (param.name(), param.props.get("value")) {
                state.set(name, state::coerce(value, param.value_type));
            }
        }
        state
    }

    /// Render against the given input state
    pub fn render(&self, inputs: &InputState) -> Vec<RenderNode> {
        self.render_block(&self.body, inputs)
    }

    fn render_block(&self, block: &[Instruction], inputs: &InputState) -> Vec<RenderNode> {
        let mut out = Vec::new();
        for instruction in block {
            match instruction {
                Instruction::Mount {
                    binding,
                    props,
                    children,
                } => {
                    // bindings were checked at load time
                    let Some(widget) = self.imports.get(binding) else {
                        continue;
                    };
                    let resolved = props
                        .iter()
                        .map(|(k, v)| (k.clone(), resolve_value(v, inputs)))
                        .collect();
                    let children = self.render_block(children, inputs);
                    out.extend(widget.render(resolved, children));
                }
                Instruction::If {
                    param,
                    then,
                    otherwise,
                } => {
                    let branch = if inputs.is_truthy(param) { then } else { otherwise };
                    out.extend(self.render_block(branch, inputs));
                }
                Instruction::Text(text) => out.push(RenderNode::Text { text: text.clone() }),
                Instruction::Expr(param) => out.push(RenderNode::Text {
                    text: expression::resolve(&format!("{{inputs.{}}}", param), inputs),
                }),
            }
        }
        out
    }
}

fn resolve_value(value: &Value, inputs: &InputState) -> Value {
    match value {
        Value::String(s) => Value::String(expression::resolve(s, inputs)),
        Value::Array(items) => Value::Array(items.iter().map(|v| resolve_value(v, inputs)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), resolve_value(v, inputs)))
                .collect(),
        ),
        other => other.clone(),
    }
}

// ── Loader ────────────────────────────────────────────────

/// Isolated loader for generated modules
#[derive(Debug, Clone)]
pub struct Sandbox {
    capabilities: Capabilities,
    limits: SandboxLimits,
}

impl Sandbox {
    pub fn new(capabilities: Capabilities, limits: SandboxLimits) -> Self {
        Sandbox {
            capabilities,
            limits,
        }
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    pub fn limits(&self) -> SandboxLimits {
        self.limits
    }

    /// Instantiate module text
    ///
    /// # Errors
    /// `Error::RuntimeLoad` for unknown modules, undefined bindings,
    /// malformed instructions, unbalanced blocks, or modules over the limits.
    pub fn load(&self, code: &str) -> Result<RuntimeComponent> {
        let mut loader = Loader {
            sandbox: self,
            filename: String::new(),
            imports: BTreeMap::new(),
            params: Vec::new(),
            constants: BTreeMap::new(),
            stack: vec![Frame::Root(Vec::new())],
            instructions: 0,
        };
        for (index, line) in code.lines().enumerate() {
            loader.line(index + 1, line.trim())?;
        }
        let component = loader.finish()?;
        tracing::debug!(
            filename = %component.filename,
            imports = component.imports.len(),
            params = component.params.len(),
            "loaded module"
        );
        Ok(component)
    }
}

enum Frame {
    Root(Vec<Instruction>),
    Mount {
        binding: String,
        props: BTreeMap<String, Value>,
        children: Vec<Instruction>,
    },
    If {
        param: String,
        then: Vec<Instruction>,
        otherwise: Option<Vec<Instruction>>,
    },
}

impl Frame {
    fn current(&mut self) -> &mut Vec<Instruction> {
        match self {
            Frame::Root(body) => body,
            Frame::Mount { children, .. } => children,
            Frame::If {
                then,
                otherwise: None,
                ..
            } => then,
            Frame::If {
                otherwise: Some(otherwise),
                ..
            } => otherwise,
        }
    }
}

struct Loader<'s> {
    sandbox: &'s Sandbox,
    filename: String,
    imports: BTreeMap<String, Arc<dyn Widget>>,
    params: Vec<ParamDecl>,
    constants: BTreeMap<String, Value>,
    stack: Vec<Frame>,
    instructions: usize,
}

impl Loader<'_> {
    fn line(&mut self, number: usize, line: &str) -> Result<()> {
        if line.is_empty() || line.starts_with("//") {
            return Ok(());
        }
        self.instructions += 1;
        if self.instructions > self.sandbox.limits.max_instructions {
            return Err(Error::RuntimeLoad(format!(
                "Module exceeds the limit of {} instructions",
                self.sandbox.limits.max_instructions
            )));
        }

        let (op, rest) = line.split_once(' ').unwrap_or((line, ""));
        let rest = rest.trim();
        match op {
            "module" => self.filename = json_string(rest, number)?,
            "import" => {
                let (binding, source) = rest
                    .split_once(" from ")
                    .ok_or_else(|| malformed(number, line))?;
                let source = json_string(source.trim(), number)?;
                let widget = self
                    .sandbox
                    .capabilities
                    .get(&source)
                    .ok_or_else(|| Error::RuntimeLoad(format!("Module not found: {}", source)))?;
                self.imports.insert(binding.trim().to_string(), Arc::clone(widget));
            }
            "param" => {
                let mut parts = rest.splitn(3, ' ');
                let (Some(component), Some(value_type), Some(props)) =
                    (parts.next(), parts.next(), parts.next())
                else {
                    return Err(malformed(number, line));
                };
                self.params.push(ParamDecl {
                    component: component.to_string(),
                    value_type: parse_value_type(value_type).ok_or_else(|| malformed(number, line))?,
                    props: json_props(props, number)?,
                });
            }
            "let" => {
                let (name, value) = rest.split_once(' ').ok_or_else(|| malformed(number, line))?;
                let value = serde_json::from_str(value.trim())
                    .map_err(|e| Error::RuntimeLoad(format!("Invalid value at line {}: {}", number, e)))?;
                self.constants.insert(name.to_string(), value);
            }
            "mount" | "open" => {
                let (binding, props) = rest.split_once(' ').unwrap_or((rest, "{}"));
                if !self.imports.contains_key(binding) {
                    return Err(Error::RuntimeLoad(format!("{} is not defined", binding)));
                }
                let props = json_props(props, number)?;
                if op == "mount" {
                    self.push(Instruction::Mount {
                        binding: binding.to_string(),
                        props,
                        children: Vec::new(),
                    });
                } else {
                    self.enter(Frame::Mount {
                        binding: binding.to_string(),
                        props,
                        children: Vec::new(),
                    })?;
                }
            }
            "close" => match self.stack.pop() {
                Some(Frame::Mount {
                    binding,
                    props,
                    children,
                }) => self.push(Instruction::Mount {
                    binding,
                    props,
                    children,
                }),
                _ => return Err(unbalanced(number, "close")),
            },
            "if" => {
                let param = input_param(rest).ok_or_else(|| malformed(number, line))?;
                self.enter(Frame::If {
                    param,
                    then: Vec::new(),
                    otherwise: None,
                })?;
            }
            "else" => match self.stack.last_mut() {
                Some(Frame::If { otherwise, .. }) if otherwise.is_none() => {
                    *otherwise = Some(Vec::new());
                }
                _ => return Err(unbalanced(number, "else")),
            },
            "end" => match self.stack.pop() {
                Some(Frame::If {
                    param,
                    then,
                    otherwise,
                }) => self.push(Instruction::If {
                    param,
                    then,
                    otherwise: otherwise.unwrap_or_default(),
                }),
                _ => return Err(unbalanced(number, "end")),
            },
            "text" => {
                let text = json_string(rest, number)?;
                self.push(Instruction::Text(text));
            }
            "expr" => {
                let param = input_param(rest).ok_or_else(|| malformed(number, line))?;
                self.push(Instruction::Expr(param));
            }
            other => {
                return Err(Error::RuntimeLoad(format!(
                    "Unknown instruction '{}' at line {}",
                    other, number
                )));
            }
        }
        Ok(())
    }

    fn push(&mut self, instruction: Instruction) {
        if let Some(frame) = self.stack.last_mut() {
            frame.current().push(instruction);
        }
    }

    fn enter(&mut self, frame: Frame) -> Result<()> {
        // the root frame does not count towards depth
        if self.stack.len() > self.sandbox.limits.max_depth {
            return Err(Error::RuntimeLoad(format!(
                "Module nesting exceeds the limit of {}",
                self.sandbox.limits.max_depth
            )));
        }
        self.stack.push(frame);
        Ok(())
    }

    fn finish(mut self) -> Result<RuntimeComponent> {
        let body = match (self.stack.pop(), self.stack.is_empty()) {
            (Some(Frame::Root(body)), true) => body,
            _ => {
                return Err(Error::RuntimeLoad(
                    "Module ended inside an unclosed block".to_string(),
                ))
            }
        };
        Ok(RuntimeComponent {
            filename: self.filename,
            imports: self.imports,
            params: self.params,
            constants: self.constants,
            body,
        })
    }
}

fn malformed(number: usize, line: &str) -> Error {
    Error::RuntimeLoad(format!("Malformed instruction at line {}: {}", number, line))
}

fn unbalanced(number: usize, op: &str) -> Error {
    Error::RuntimeLoad(format!("Unbalanced '{}' at line {}", op, number))
}

fn json_string(text: &str, number: usize) -> Result<String> {
    serde_json::from_str::<String>(text)
        .map_err(|e| Error::RuntimeLoad(format!("Invalid string at line {}: {}", number, e)))
}

fn json_props(text: &str, number: usize) -> Result<BTreeMap<String, Value>> {
    serde_json::from_str(text.trim())
        .map_err(|e| Error::RuntimeLoad(format!("Invalid props at line {}: {}", number, e)))
}

fn input_param(text: &str) -> Option<String> {
    let name = text.strip_prefix("inputs.")?;
    let mut chars = name.chars();
    let first = chars.next()?;
    if (first.is_ascii_alphabetic() || first == '_') && chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Some(name.to_string())
    } else {
        None
    }
}

fn parse_value_type(text: &str) -> Option<ValueType> {
    match text {
        "boolean" => Some(ValueType::Boolean),
        "number" => Some(ValueType::Number),
        "string" => Some(ValueType::String),
        "object" => Some(ValueType::Object),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sandbox() -> Sandbox {
        Sandbox::new(
            Capabilities::from_registry(&Registry::standard()),
            SandboxLimits::default(),
        )
    }

    const MODULE: &str = r#"// dashc module
module "Dashboard.dash"
import Chart from "Chart"
import Grid from "Grid"
param Toggle boolean {"name":"showFilters","value":"true"}
param Dropdown string {"name":"region","value":"North"}
let salesTitle "Monthly Sales"
open Grid {"cols":"2"}
mount Chart {"source":"sales","visible":"{inputs.showFilters}"}
close
if inputs.showFilters
text "Filters on"
else
expr inputs.region
end
"#;

    #[test]
    fn test_load_and_initial_state() {
        let component = sandbox().load(MODULE).unwrap();
        assert_eq!(component.filename(), "Dashboard.dash");
        assert_eq!(component.imports(), vec!["Chart", "Grid"]);
        assert_eq!(component.constants()["salesTitle"], json!("Monthly Sales"));
        let state = component.initial_state();
        assert_eq!(state.get("showFilters"), Some(&json!(true)));
        assert_eq!(state.get("region"), Some(&json!("North")));
    }

    #[test]
    fn test_render_resolves_and_branches() {
        let component = sandbox().load(MODULE).unwrap();
        let mut state = component.initial_state();
        let nodes = component.render(&state);
        assert_eq!(nodes.len(), 2);
        match &nodes[0] {
            RenderNode::Widget { name, children, .. } => {
                assert_eq!(name, "Grid");
                match &children[0] {
                    RenderNode::Widget { props, .. } => assert_eq!(props["visible"], json!("true")),
                    other => panic!("unexpected {:?}", other),
                }
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(nodes[1], RenderNode::Text { text: "Filters on".into() });

        state.set("showFilters", json!(false));
        let nodes = component.render(&state);
        // the hidden chart drops out of the grid, the else branch renders
        match &nodes[0] {
            RenderNode::Widget { children, .. } => assert!(children.is_empty()),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(nodes[1], RenderNode::Text { text: "North".into() });
    }

    #[test]
    fn test_unknown_module_is_runtime_load_error() {
        let err = sandbox().load("import Fetcher from \"net\"").unwrap_err();
        assert_eq!(err.category(), "RuntimeLoadError");
        assert_eq!(err.author_message(), "Module not found: net");
    }

    #[test]
    fn test_unimported_mount_is_undefined() {
        let err = sandbox().load("mount Chart {}").unwrap_err();
        assert_eq!(err.author_message(), "Chart is not defined");
    }

    #[test]
    fn test_empty_capabilities_resolve_nothing() {
        let sandbox = Sandbox::new(Capabilities::new(), SandboxLimits::default());
        assert!(sandbox.load("import Chart from \"Chart\"").is_err());
        assert!(sandbox.load("module \"x\"\ntext \"hi\"").is_ok());
    }

    #[test]
    fn test_unbalanced_blocks() {
        let s = sandbox();
        assert!(s.load("close").is_err());
        assert!(s.load("if inputs.a").is_err());
        assert!(s.load("if inputs.a\nelse\nelse\nend").is_err());
        assert!(s.load("import Grid from \"Grid\"\nopen Grid {}").is_err());
    }

    #[test]
    fn test_unknown_instruction() {
        let err = sandbox().load("exec rm -rf").unwrap_err();
        assert!(err.author_message().contains("Unknown instruction 'exec'"));
    }

    #[test]
    fn test_limits_enforced() {
        let limits = SandboxLimits {
            max_instructions: 2,
            max_depth: 1,
        };
        let s = Sandbox::new(Capabilities::from_registry(&Registry::standard()), limits);
        assert!(s.load("text \"a\"\ntext \"b\"\ntext \"c\"").is_err());
        assert!(s.load("if inputs.a\nif inputs.b").is_err());
        assert!(s.load("if inputs.a\nend").is_ok());
    }

    #[test]
    fn test_render_node_serialization() {
        let node = RenderNode::Text { text: "x".into() };
        assert_eq!(serde_json::to_value(&node).unwrap(), json!({"kind": "text", "text": "x"}));
    }
}
