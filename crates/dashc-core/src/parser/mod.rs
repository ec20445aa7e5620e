//! dashc Parser: tokenizer, generic node tree, script and markup parsers
//!
//! Converts author document text into a `Document`: the optional script
//! region plus the markup tree. Both halves share the same heterogeneous
//! `Node` representation so later passes traverse them generically.

pub mod markup;
pub mod node;
pub mod script;
pub mod tokenizer;

pub use node::{Field, Node, Scalar};
pub use tokenizer::Span;

use crate::Result;

/// Deepest nesting of elements, blocks or script expressions a document may use
pub const MAX_NESTING: usize = 64;

/// Parsed author document
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// The `<script>` region, kind `Script`, with its program under `content`
    pub script: Option<Node>,
    /// Markup tree, kind `Fragment`
    pub html: Node,
}

impl Document {
    /// Character offset where the script body begins, if there is a script
    pub fn script_content_start(&self) -> Option<usize> {
        self.script.as_ref().map(|s| content_origin(s).offset)
    }

    /// The script body parsed into a `Program`, if there is a script
    ///
    /// The body is lifted raw by `parse`; only callers that accept scripts
    /// pay for (and can fail on) parsing it.
    pub fn script_program(&self) -> Result<Option<Node>> {
        self.script.as_ref().map(parse_script_region).transpose()
    }
}

/// Parse the raw body of a lifted `Script` node
///
/// # Errors
/// Returns `Error::Parse` with positions in the enclosing document.
pub fn parse_script_region(script: &Node) -> Result<Node> {
    let raw = script.str_value("raw").unwrap_or_default();
    script::parse_script(raw, content_origin(script))
}

fn content_origin(script: &Node) -> Span {
    let number = |field: &str| match script.value(field) {
        Some(Scalar::Number(n)) => *n as usize,
        _ => 0,
    };
    Span {
        line: number("content_line").max(1),
        column: number("content_column").max(1),
        offset: number("content_start"),
    }
}

/// Parse document text into its script region and markup tree
///
/// # Guarantees
/// - Deterministic: same input always produces the same tree
/// - At most one script region; it never appears inside the markup tree
///
/// # Errors
/// Returns `Error::Parse` with `line:column` for malformed markup or script.
pub fn parse(text: &str) -> Result<Document> {
    let (script, html) = markup::MarkupParser::new(text).parse()?;
    tracing::debug!(nodes = html.count(), has_script = script.is_some(), "parsed document");
    Ok(Document { script, html })
}
