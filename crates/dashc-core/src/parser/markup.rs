//! Markup parser: turns author document text into a `Fragment` tree
//!
//! Recognizes elements and components, attributes, text, `{expression}`
//! tags, `<!-- comments -->`, `{#if}` / `{:else}` / `{/if}` blocks and the
//! raw-text `<script>` and `<style>` regions. Node kinds follow the component
//! markup vocabulary (`InlineComponent`, `Element`, `Attribute`, `Text`,
//! `MustacheTag`, `IfBlock`, `ElseBlock`, `Comment`, `Script`, `Style`).

use super::node::{Node, Scalar};
use super::script::parse_expression;
use super::tokenizer::Span;
use super::MAX_NESTING;
use crate::{Error, Result};

/// What stopped a run of children
enum Terminator {
    Eof,
    CloseTag(String, Span),
    Else(Span),
    ElseIf(String, Span),
    EndIf(Span),
}

pub(crate) struct MarkupParser {
    input: Vec<char>,
    position: usize,
    line: usize,
    column: usize,
    /// Open elements, for the top-level check on raw regions
    depth: usize,
    /// Open elements and blocks
    nesting: usize,
    script: Option<Node>,
}

impl MarkupParser {
    pub(crate) fn new(text: &str) -> Self {
        MarkupParser {
            input: text.chars().collect(),
            position: 0,
            line: 1,
            column: 1,
            depth: 0,
            nesting: 0,
            script: None,
        }
    }

    /// Parse the whole document; returns the script region (if any) and the
    /// markup fragment
    pub(crate) fn parse(mut self) -> Result<(Option<Node>, Node)> {
        let start = self.current_span();
        let (children, terminator) = self.parse_children()?;
        match terminator {
            Terminator::Eof => {}
            Terminator::CloseTag(name, span) => {
                return Err(Error::Parse(format!(
                    "</{}> attempted to close an element that was not open at {}",
                    name, span
                )));
            }
            Terminator::Else(span) | Terminator::ElseIf(_, span) => {
                return Err(Error::Parse(format!(
                    "{{:else}} outside of an {{#if}} block at {}",
                    span
                )));
            }
            Terminator::EndIf(span) => {
                return Err(Error::Parse(format!(
                    "{{/if}} without a matching {{#if}} at {}",
                    span
                )));
            }
        }
        let html = Node::new("Fragment", start).with_list("children", children);
        Ok((self.script, html))
    }

    // ── Character helpers ──────────────────────────────────

    fn is_at_end(&self) -> bool {
        self.position >= self.input.len()
    }

    fn peek(&self) -> Option<char> {
        self.input.get(self.position).copied()
    }

    fn peek_ahead(&self, offset: usize) -> Option<char> {
        self.input.get(self.position + offset).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.input.get(self.position).copied();
        if let Some(c) = ch {
            self.position += 1;
            if c == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
        ch
    }

    fn advance_by(&mut self, n: usize) {
        for _ in 0..n {
            self.advance();
        }
    }

    fn current_span(&self) -> Span {
        Span {
            line: self.line,
            column: self.column,
            offset: self.position,
        }
    }

    fn starts_with(&self, text: &str) -> bool {
        text.chars()
            .enumerate()
            .all(|(i, c)| self.peek_ahead(i) == Some(c))
    }

    fn starts_with_ignore_case(&self, text: &str) -> bool {
        text.chars()
            .enumerate()
            .all(|(i, c)| self.peek_ahead(i).is_some_and(|p| p.eq_ignore_ascii_case(&c)))
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.advance();
        }
    }

    fn expect_char(&mut self, expected: char) -> Result<()> {
        match self.peek() {
            Some(c) if c == expected => {
                self.advance();
                Ok(())
            }
            Some(c) => Err(Error::Parse(format!(
                "Expected '{}' but found '{}' at {}",
                expected,
                c,
                self.current_span()
            ))),
            None => Err(Error::Parse(format!(
                "Expected '{}' but found end of input at {}",
                expected,
                self.current_span()
            ))),
        }
    }

    fn enter(&mut self, span: Span) -> Result<()> {
        if self.nesting >= MAX_NESTING {
            return Err(Error::Parse(format!(
                "Nesting exceeds limit of {} at {}",
                MAX_NESTING, span
            )));
        }
        self.nesting += 1;
        Ok(())
    }

    fn read_name(&mut self, what: &str) -> Result<String> {
        let start = self.position;
        while self
            .peek()
            .is_some_and(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | ':'))
        {
            self.advance();
        }
        if start == self.position {
            return Err(Error::Parse(format!(
                "Expected {} at {}",
                what,
                self.current_span()
            )));
        }
        Ok(self.input[start..self.position].iter().collect())
    }

    // ── Children ───────────────────────────────────────────

    fn parse_children(&mut self) -> Result<(Vec<Node>, Terminator)> {
        let mut children = Vec::new();
        loop {
            if self.is_at_end() {
                return Ok((children, Terminator::Eof));
            }
            let span = self.current_span();

            if self.starts_with("<!--") {
                children.push(self.read_comment()?);
            } else if self.starts_with("</") {
                self.advance_by(2);
                let name = self.read_name("closing tag name")?;
                self.skip_whitespace();
                self.expect_char('>')?;
                return Ok((children, Terminator::CloseTag(name, span)));
            } else if self.peek() == Some('<')
                && self.peek_ahead(1).is_some_and(|c| c.is_ascii_alphabetic())
            {
                if let Some(element) = self.parse_element()? {
                    children.push(element);
                }
            } else if self.peek() == Some('{') {
                match self.peek_ahead(1) {
                    Some('#') => children.push(self.parse_block()?),
                    Some(':') => {
                        let (content, _) = self.read_braced()?;
                        let rest = content[1..].trim();
                        if rest == "else" {
                            return Ok((children, Terminator::Else(span)));
                        }
                        if let Some(cond) = rest.strip_prefix("else if ") {
                            return Ok((children, Terminator::ElseIf(cond.trim().to_string(), span)));
                        }
                        return Err(Error::Parse(format!(
                            "Unsupported block continuation '{{{}}}' at {}",
                            content, span
                        )));
                    }
                    Some('/') => {
                        let (content, _) = self.read_braced()?;
                        if content[1..].trim() == "if" {
                            return Ok((children, Terminator::EndIf(span)));
                        }
                        return Err(Error::Parse(format!(
                            "Unexpected block closing '{{{}}}' at {}",
                            content, span
                        )));
                    }
                    Some('@') => {
                        return Err(Error::Parse(format!(
                            "Special tags like '{{@...}}' are not supported at {}",
                            span
                        )));
                    }
                    _ => children.push(self.parse_mustache()?),
                }
            } else {
                children.push(self.read_text());
            }
        }
    }

    fn read_text(&mut self) -> Node {
        let span = self.current_span();
        let mut data = String::new();
        while let Some(ch) = self.peek() {
            if ch == '{' {
                break;
            }
            if ch == '<'
                && self
                    .peek_ahead(1)
                    .is_some_and(|c| c.is_ascii_alphabetic() || c == '/' || c == '!')
            {
                break;
            }
            data.push(ch);
            self.advance();
        }
        Node::new("Text", span).with_str("data", data)
    }

    fn read_comment(&mut self) -> Result<Node> {
        let span = self.current_span();
        self.advance_by(4);
        let mut data = String::new();
        loop {
            if self.is_at_end() {
                return Err(Error::Parse(format!(
                    "Unterminated comment starting at {}",
                    span
                )));
            }
            if self.starts_with("-->") {
                self.advance_by(3);
                break;
            }
            if let Some(c) = self.advance() {
                data.push(c);
            }
        }
        Ok(Node::new("Comment", span).with_str("data", data))
    }

    /// Read `{ ... }` honoring nested braces and quoted strings; returns the
    /// inner text and the span where it starts
    fn read_braced(&mut self) -> Result<(String, Span)> {
        let open = self.current_span();
        self.advance(); // {
        let content_span = self.current_span();
        let mut content = String::new();
        let mut depth = 1usize;
        let mut quote: Option<char> = None;

        loop {
            let Some(ch) = self.advance() else {
                return Err(Error::Parse(format!(
                    "Unterminated '{{' starting at {}",
                    open
                )));
            };
            match quote {
                Some(q) => {
                    if ch == '\\' {
                        content.push(ch);
                        if let Some(next) = self.advance() {
                            content.push(next);
                        }
                        continue;
                    }
                    if ch == q {
                        quote = None;
                    }
                }
                None => match ch {
                    '"' | '\'' | '`' => quote = Some(ch),
                    '{' => depth += 1,
                    '}' => {
                        depth -= 1;
                        if depth == 0 {
                            return Ok((content, content_span));
                        }
                    }
                    _ => {}
                },
            }
            content.push(ch);
        }
    }

    fn parse_mustache(&mut self) -> Result<Node> {
        let span = self.current_span();
        let (content, content_span) = self.read_braced()?;
        if content.trim().is_empty() {
            return Err(Error::Parse(format!("Empty expression at {}", span)));
        }
        let expression = parse_expression(&content, content_span)?;
        Ok(Node::new("MustacheTag", span)
            .with_node("expression", expression)
            .with_str("raw", content.trim()))
    }

    // ── Blocks ─────────────────────────────────────────────

    fn parse_block(&mut self) -> Result<Node> {
        let span = self.current_span();
        let (content, _) = self.read_braced()?;
        let header = content[1..].trim_start();
        let keyword: String = header
            .chars()
            .take_while(|c| c.is_ascii_alphabetic())
            .collect();
        if keyword != "if" {
            return Err(Error::Parse(format!(
                "Unsupported block '{{#{}}}' at {}",
                keyword, span
            )));
        }
        let condition = header[keyword.len()..].trim().to_string();
        self.parse_if_body(condition, span)
    }

    fn parse_if_body(&mut self, condition: String, span: Span) -> Result<Node> {
        self.enter(span)?;
        let node = self.parse_if_branches(condition, span);
        self.nesting -= 1;
        node
    }

    fn parse_if_branches(&mut self, condition: String, span: Span) -> Result<Node> {
        if condition.is_empty() {
            return Err(Error::Parse(format!(
                "{{#if}} block requires a condition at {}",
                span
            )));
        }
        let expression = parse_expression(&condition, span)?;
        let (children, terminator) = self.parse_children()?;
        let node = Node::new("IfBlock", span)
            .with_node("expression", expression)
            .with_str("raw", condition)
            .with_list("children", children);

        match terminator {
            Terminator::EndIf(_) => Ok(node),
            Terminator::Else(else_span) => {
                let (else_children, end) = self.parse_children()?;
                match end {
                    Terminator::EndIf(_) => Ok(node.with_node(
                        "else",
                        Node::new("ElseBlock", else_span).with_list("children", else_children),
                    )),
                    other => Err(self.misplaced(other, span)),
                }
            }
            Terminator::ElseIf(next, else_span) => {
                let nested = self.parse_if_body(next, else_span)?;
                Ok(node.with_node(
                    "else",
                    Node::new("ElseBlock", else_span)
                        .with_list("children", vec![nested])
                        .with_value("elseif", Scalar::Bool(true)),
                ))
            }
            other => Err(self.misplaced(other, span)),
        }
    }

    fn misplaced(&self, terminator: Terminator, if_span: Span) -> Error {
        match terminator {
            Terminator::Eof => Error::Parse(format!(
                "Unclosed {{#if}} block opened at {}",
                if_span
            )),
            Terminator::CloseTag(name, span) => Error::Parse(format!(
                "Unexpected </{}> inside {{#if}} block at {}",
                name, span
            )),
            Terminator::Else(span) | Terminator::ElseIf(_, span) => Error::Parse(format!(
                "Unexpected {{:else}} at {}",
                span
            )),
            Terminator::EndIf(span) => Error::Parse(format!("Unexpected {{/if}} at {}", span)),
        }
    }

    // ── Elements ───────────────────────────────────────────

    /// Returns `None` for the script region, which is lifted out of the tree
    fn parse_element(&mut self) -> Result<Option<Node>> {
        let span = self.current_span();
        self.advance(); // <
        let name = self.read_name("tag name")?;

        let lowered = name.to_ascii_lowercase();
        if lowered == "script" || lowered == "style" {
            return self.parse_raw_region(&lowered, span);
        }

        let (attributes, self_closing) = self.parse_attributes()?;
        let kind = if name.chars().next().is_some_and(|c| c.is_uppercase()) {
            "InlineComponent"
        } else {
            "Element"
        };

        let mut children = Vec::new();
        if !self_closing {
            self.enter(span)?;
            self.depth += 1;
            let (inner, terminator) = self.parse_children()?;
            self.depth -= 1;
            self.nesting -= 1;
            match terminator {
                Terminator::CloseTag(closing, _) if closing == name => children = inner,
                Terminator::CloseTag(closing, close_span) => {
                    return Err(Error::Parse(format!(
                        "</{}> attempted to close <{}> at {}",
                        closing, name, close_span
                    )));
                }
                Terminator::Eof => {
                    return Err(Error::Parse(format!(
                        "<{}> opened at {} was not closed",
                        name, span
                    )));
                }
                Terminator::Else(s) | Terminator::ElseIf(_, s) | Terminator::EndIf(s) => {
                    return Err(Error::Parse(format!(
                        "Block tag inside <{}> closes a block opened outside it at {}",
                        name, s
                    )));
                }
            }
        }

        Ok(Some(
            Node::new(kind, span)
                .with_str("name", name)
                .with_list("attributes", attributes)
                .with_list("children", children),
        ))
    }

    fn parse_attributes(&mut self) -> Result<(Vec<Node>, bool)> {
        let mut attributes = Vec::new();
        loop {
            self.skip_whitespace();
            match self.peek() {
                None => {
                    return Err(Error::Parse(format!(
                        "Unexpected end of input inside tag at {}",
                        self.current_span()
                    )));
                }
                Some('>') => {
                    self.advance();
                    return Ok((attributes, false));
                }
                Some('/') => {
                    self.advance();
                    self.expect_char('>')?;
                    return Ok((attributes, true));
                }
                Some('{') => {
                    return Err(Error::Parse(format!(
                        "Shorthand and spread attributes are not supported at {}",
                        self.current_span()
                    )));
                }
                Some(_) => attributes.push(self.parse_attribute()?),
            }
        }
    }

    fn parse_attribute(&mut self) -> Result<Node> {
        let span = self.current_span();
        let name = self.read_name("attribute name")?;
        let node = Node::new("Attribute", span).with_str("name", name);

        self.skip_whitespace();
        if self.peek() != Some('=') {
            return Ok(node.with_value("value", Scalar::Bool(true)));
        }
        self.advance();
        self.skip_whitespace();

        let value_span = self.current_span();
        let parts = match self.peek() {
            Some(q @ ('"' | '\'')) => {
                self.advance();
                let mut data = String::new();
                loop {
                    match self.advance() {
                        None => {
                            return Err(Error::Parse(format!(
                                "Unterminated attribute value starting at {}",
                                value_span
                            )));
                        }
                        Some(c) if c == q => break,
                        Some(c) => data.push(c),
                    }
                }
                vec![Node::new("Text", value_span).with_str("data", data)]
            }
            Some('{') => vec![self.parse_mustache()?],
            _ => {
                let mut data = String::new();
                while let Some(c) = self.peek() {
                    if c.is_whitespace() || c == '>' || (c == '/' && self.peek_ahead(1) == Some('>')) {
                        break;
                    }
                    data.push(c);
                    self.advance();
                }
                if data.is_empty() {
                    return Err(Error::Parse(format!(
                        "Expected attribute value at {}",
                        value_span
                    )));
                }
                vec![Node::new("Text", value_span).with_str("data", data)]
            }
        };
        Ok(node.with_list("value", parts))
    }

    /// `<script>` / `<style>`: attributes, then raw text up to the closing tag
    ///
    /// The script body is kept as text; `parse_script_region` parses it
    /// for the callers that accept scripts.
    fn parse_raw_region(&mut self, tag: &str, span: Span) -> Result<Option<Node>> {
        if self.depth > 0 {
            return Err(Error::Parse(format!(
                "<{}> must be at the top level of the document at {}",
                tag, span
            )));
        }
        let (attributes, self_closing) = self.parse_attributes()?;
        let content_span = self.current_span();
        let mut raw = String::new();
        if !self_closing {
            let closing = format!("</{}", tag);
            loop {
                if self.is_at_end() {
                    return Err(Error::Parse(format!(
                        "<{}> opened at {} was not closed",
                        tag, span
                    )));
                }
                if self.starts_with_ignore_case(&closing) {
                    self.advance_by(closing.chars().count());
                    self.skip_whitespace();
                    self.expect_char('>')?;
                    break;
                }
                if let Some(c) = self.advance() {
                    raw.push(c);
                }
            }
        }

        if tag == "style" {
            return Ok(Some(
                Node::new("Style", span)
                    .with_list("attributes", attributes)
                    .with_str("raw", raw),
            ));
        }

        if self.script.is_some() {
            return Err(Error::Parse(format!(
                "A document can only have one <script> element, second one at {}",
                span
            )));
        }
        let script = Node::new("Script", span)
            .with_list("attributes", attributes)
            .with_value("content_start", Scalar::Number(content_span.offset as f64))
            .with_value("content_line", Scalar::Number(content_span.line as f64))
            .with_value("content_column", Scalar::Number(content_span.column as f64))
            .with_str("raw", raw);
        self.script = Some(script);
        Ok(None)
    }
}
