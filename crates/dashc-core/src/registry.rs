//! Capability registry: the fixed vocabulary of components an author may use
//!
//! Input components each declare one typed parameter; display components
//! render content and may consume `{inputs.*}` placeholders. The registry is
//! built once per process and only ever read afterwards, so any number of
//! concurrent compiles can share it without synchronization.

use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock};

use serde::Serialize;

/// Type of the parameter an input component generates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Boolean,
    Number,
    String,
    Object,
}

impl std::fmt::Display for ValueType {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            ValueType::Boolean => write!(f, "boolean"),
            ValueType::Number => write!(f, "number"),
            ValueType::String => write!(f, "string"),
            ValueType::Object => write!(f, "object"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InputComponentSpec {
    pub name: &'static str,
    pub props: &'static [&'static str],
    pub generates: ValueType,
    pub example: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisplayComponentSpec {
    pub name: &'static str,
    pub props: &'static [&'static str],
    pub consumes: &'static [&'static str],
    pub example: &'static str,
    /// Groups children for layout
    pub container: bool,
}

/// Chart subtype aliases and the `type` they imply
pub const CHART_ALIASES: &[(&str, &str)] = &[
    ("BarChart", "bar"),
    ("LineChart", "line"),
    ("PieChart", "pie"),
];

/// Result of looking a tag up in the registry
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Lookup<'a> {
    Input(&'a InputComponentSpec),
    /// Display component; `implied_type` is set when the tag was a chart alias
    Display {
        spec: &'a DisplayComponentSpec,
        implied_type: Option<&'static str>,
    },
    Unknown,
}

/// Immutable set of whitelisted components
#[derive(Debug, Clone, Serialize)]
pub struct Registry {
    inputs: BTreeMap<&'static str, InputComponentSpec>,
    displays: BTreeMap<&'static str, DisplayComponentSpec>,
}

static STANDARD: LazyLock<Arc<Registry>> = LazyLock::new(|| Arc::new(Registry::standard()));

/// The process-wide registry
pub fn global() -> Arc<Registry> {
    Arc::clone(&STANDARD)
}

impl Registry {
    /// The standard component set: six inputs and three displays
    pub fn standard() -> Self {
        let inputs = [
            InputComponentSpec {
                name: "Toggle",
                props: &["name", "label", "value"],
                generates: ValueType::Boolean,
                example: r#"<Toggle name="showFilters" label="Show Filters" value="true" />"#,
            },
            InputComponentSpec {
                name: "Dropdown",
                props: &["name", "label", "options", "value"],
                generates: ValueType::String,
                example: r#"<Dropdown name="region" options="North,South,East,West" value="North" />"#,
            },
            InputComponentSpec {
                name: "DateRange",
                props: &["name", "label", "start", "end"],
                generates: ValueType::Object,
                example: r#"<DateRange name="dateRange" start="2024-01-01" end="2024-12-31" />"#,
            },
            InputComponentSpec {
                name: "TextInput",
                props: &["name", "label", "value", "placeholder"],
                generates: ValueType::String,
                example: r#"<TextInput name="searchTerm" label="Search" placeholder="Enter keywords" />"#,
            },
            InputComponentSpec {
                name: "NumberInput",
                props: &["name", "label", "value", "min", "max"],
                generates: ValueType::Number,
                example: r#"<NumberInput name="threshold" label="Threshold" value="100" min="0" max="1000" />"#,
            },
            InputComponentSpec {
                name: "RadioGroup",
                props: &["name", "label", "options", "value"],
                generates: ValueType::String,
                example: r#"<RadioGroup name="chartType" options="bar,line,pie" value="bar" />"#,
            },
        ];
        let displays = [
            DisplayComponentSpec {
                name: "Chart",
                props: &["type", "title", "source", "visible", "filter", "data"],
                consumes: &["inputs.*"],
                example: r#"<Chart type="bar" source="sales" visible="{inputs.showCharts}" />"#,
                container: false,
            },
            DisplayComponentSpec {
                name: "Grid",
                props: &["cols", "rows", "visible"],
                consumes: &["inputs.*"],
                example: r#"<Grid cols="3" visible="{inputs.showFilters}">...</Grid>"#,
                container: true,
            },
            DisplayComponentSpec {
                name: "Filter",
                props: &["title", "visible"],
                consumes: &["inputs.*"],
                example: r#"<Filter title="Filters" visible="{inputs.showFilters}" />"#,
                container: false,
            },
        ];
        Registry {
            inputs: inputs.into_iter().map(|s| (s.name, s)).collect(),
            displays: displays.into_iter().map(|s| (s.name, s)).collect(),
        }
    }

    /// Inputs first, then displays, then chart aliases
    pub fn lookup(&self, tag: &str) -> Lookup<'_> {
        if let Some(spec) = self.inputs.get(tag) {
            return Lookup::Input(spec);
        }
        if let Some(spec) = self.displays.get(tag) {
            return Lookup::Display {
                spec,
                implied_type: None,
            };
        }
        if let Some((_, implied)) = CHART_ALIASES.iter().find(|(alias, _)| *alias == tag) {
            if let Some(spec) = self.displays.get("Chart") {
                return Lookup::Display {
                    spec,
                    implied_type: Some(implied),
                };
            }
        }
        Lookup::Unknown
    }

    pub fn input(&self, name: &str) -> Option<&InputComponentSpec> {
        self.inputs.get(name)
    }

    pub fn display(&self, name: &str) -> Option<&DisplayComponentSpec> {
        self.displays.get(name)
    }

    pub fn inputs(&self) -> impl Iterator<Item = &InputComponentSpec> {
        self.inputs.values()
    }

    pub fn displays(&self) -> impl Iterator<Item = &DisplayComponentSpec> {
        self.displays.values()
    }

    /// Names injected as imports into every compiled document
    pub fn display_names(&self) -> Vec<&'static str> {
        self.displays.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_vocabulary() {
        let registry = Registry::standard();
        assert_eq!(registry.inputs().count(), 6);
        assert_eq!(registry.display_names(), vec!["Chart", "Filter", "Grid"]);
        assert_eq!(registry.input("Toggle").unwrap().generates, ValueType::Boolean);
        assert!(registry.display("Grid").unwrap().container);
    }

    #[test]
    fn test_lookup_order_and_aliases() {
        let registry = Registry::standard();
        assert!(matches!(registry.lookup("Dropdown"), Lookup::Input(_)));
        assert!(matches!(
            registry.lookup("Chart"),
            Lookup::Display { implied_type: None, .. }
        ));
        match registry.lookup("PieChart") {
            Lookup::Display { spec, implied_type } => {
                assert_eq!(spec.name, "Chart");
                assert_eq!(implied_type, Some("pie"));
            }
            other => panic!("unexpected lookup {:?}", other),
        }
        assert_eq!(registry.lookup("Foo"), Lookup::Unknown);
        assert_eq!(registry.lookup("div"), Lookup::Unknown);
    }

    #[test]
    fn test_global_is_shared() {
        let a = global();
        let b = global();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
