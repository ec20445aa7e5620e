//! Recursive descent parser for the script region
//!
//! Produces ESTree-shaped `Node`s (`Program`, `VariableDeclaration`,
//! `CallExpression`, ...) for the subset of ECMAScript an author document may
//! contain. The parser accepts more than the script policy allows: it is the
//! policy's job to reject, the parser only has to describe faithfully.

use super::node::{Node, Scalar};
use super::tokenizer::{Span, SpannedToken, Token, Tokenizer};
use super::MAX_NESTING;
use crate::{Error, Result};

/// Parse script text located at `origin` inside the enclosing document
pub fn parse_script(text: &str, origin: Span) -> Result<Node> {
    let tokens = Tokenizer::with_origin(text, origin).tokenize()?;
    let mut parser = ScriptParser { tokens, pos: 0, depth: 0 };
    parser.parse_program(origin)
}

/// Parse a single expression (attribute values, mustache tags)
pub fn parse_expression(text: &str, origin: Span) -> Result<Node> {
    let tokens = Tokenizer::with_origin(text, origin).tokenize()?;
    let mut parser = ScriptParser { tokens, pos: 0, depth: 0 };
    let expr = parser.parse_expression()?;
    parser.expect_eof()?;
    Ok(expr)
}

struct ScriptParser {
    tokens: Vec<SpannedToken>,
    pos: usize,
    depth: usize,
}

/// Binary operator precedence; higher binds tighter
fn binary_precedence(op: &str) -> Option<u8> {
    let prec = match op {
        "??" => 1,
        "||" => 2,
        "&&" => 3,
        "|" => 4,
        "^" => 5,
        "&" => 6,
        "==" | "!=" | "===" | "!==" => 7,
        "<" | ">" | "<=" | ">=" => 8,
        "+" | "-" => 9,
        "*" | "/" | "%" => 10,
        "**" => 11,
        _ => return None,
    };
    Some(prec)
}

fn is_assignment_op(op: &str) -> bool {
    matches!(op, "=" | "+=" | "-=" | "*=" | "/=")
}

impl ScriptParser {
    // ── Token helpers ──────────────────────────────────────

    fn peek(&self) -> &Token {
        self.tokens
            .get(self.pos)
            .map(|t| &t.token)
            .unwrap_or(&Token::Eof)
    }

    fn peek_at(&self, offset: usize) -> &Token {
        self.tokens
            .get(self.pos + offset)
            .map(|t| &t.token)
            .unwrap_or(&Token::Eof)
    }

    fn span(&self) -> Span {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|t| t.span)
            .unwrap_or_default()
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn check(&self, token: &Token) -> bool {
        self.peek() == token
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.check(token) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &Token, what: &str) -> Result<()> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(self.unexpected(what))
        }
    }

    fn expect_eof(&mut self) -> Result<()> {
        if self.check(&Token::Eof) {
            Ok(())
        } else {
            Err(self.unexpected("end of expression"))
        }
    }

    fn unexpected(&self, expected: &str) -> Error {
        let found = match self.peek() {
            Token::Reserved(word) => {
                return Error::Parse(format!(
                    "Unsupported syntax '{}' at {}",
                    word,
                    self.span()
                ))
            }
            Token::Eof => "end of input".to_string(),
            other => format!("{:?}", other),
        };
        Error::Parse(format!(
            "Expected {} but found {} at {}",
            expected,
            found,
            self.span()
        ))
    }

    fn eat_semicolons(&mut self) {
        while self.eat(&Token::Semicolon) {}
    }

    /// Run a recursive production one level deeper
    fn nested<T>(&mut self, parse: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        if self.depth >= MAX_NESTING {
            return Err(Error::Parse(format!(
                "Nesting exceeds limit of {} at {}",
                MAX_NESTING,
                self.span()
            )));
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    /// Left-nested chains (`a.b.c`, `a + b + c`) deepen the tree without recursing
    fn check_chain(&self, links: usize) -> Result<()> {
        if self.depth + links > MAX_NESTING {
            return Err(Error::Parse(format!(
                "Nesting exceeds limit of {} at {}",
                MAX_NESTING,
                self.span()
            )));
        }
        Ok(())
    }

    fn identifier(&mut self) -> Result<Node> {
        let span = self.span();
        match self.peek().clone() {
            Token::Identifier(name) => {
                self.advance();
                Ok(Node::new("Identifier", span).with_str("name", name))
            }
            _ => Err(self.unexpected("identifier")),
        }
    }

    /// Consume a contextual keyword such as `as` or `from`
    fn expect_word(&mut self, word: &str) -> Result<()> {
        if matches!(self.peek(), Token::Identifier(w) if w == word) {
            self.advance();
            Ok(())
        } else {
            Err(self.unexpected(&format!("'{}'", word)))
        }
    }

    /// Property names may be any identifier-like token, keywords included
    fn property_name(&mut self) -> Result<String> {
        let name = match self.peek().clone() {
            Token::Identifier(name) | Token::Reserved(name) => name,
            Token::Let => "let".into(),
            Token::Const => "const".into(),
            Token::Var => "var".into(),
            Token::Function => "function".into(),
            Token::Import => "import".into(),
            Token::Export => "export".into(),
            Token::Return => "return".into(),
            Token::If => "if".into(),
            Token::Else => "else".into(),
            Token::New => "new".into(),
            Token::Typeof => "typeof".into(),
            Token::BooleanLiteral(b) => b.to_string(),
            Token::NullLiteral => "null".into(),
            _ => return Err(self.unexpected("property name")),
        };
        self.advance();
        Ok(name)
    }

    // ── Statements ─────────────────────────────────────────

    fn parse_program(&mut self, origin: Span) -> Result<Node> {
        let mut body = Vec::new();
        self.eat_semicolons();
        while !self.check(&Token::Eof) {
            body.push(self.parse_statement()?);
            self.eat_semicolons();
        }
        Ok(Node::new("Program", origin).with_list("body", body))
    }

    fn parse_statement(&mut self) -> Result<Node> {
        self.nested(Self::statement)
    }

    fn statement(&mut self) -> Result<Node> {
        let span = self.span();
        match self.peek() {
            Token::Let | Token::Const | Token::Var => self.parse_variable_declaration(),
            Token::Function => self.parse_function(true),
            Token::Import => self.parse_import(),
            Token::Export => {
                self.advance();
                let declaration = match self.peek() {
                    Token::Let | Token::Const | Token::Var => self.parse_variable_declaration()?,
                    Token::Function => self.parse_function(true)?,
                    _ => return Err(self.unexpected("declaration after 'export'")),
                };
                Ok(Node::new("ExportNamedDeclaration", span).with_node("declaration", declaration))
            }
            Token::Return => {
                self.advance();
                let mut node = Node::new("ReturnStatement", span);
                if !matches!(self.peek(), Token::Semicolon | Token::RBrace | Token::Eof) {
                    node = node.with_node("argument", self.parse_expression()?);
                }
                Ok(node)
            }
            Token::If => {
                self.advance();
                self.expect(&Token::LParen, "'('")?;
                let test = self.parse_expression()?;
                self.expect(&Token::RParen, "')'")?;
                let consequent = self.parse_statement()?;
                let mut node = Node::new("IfStatement", span)
                    .with_node("test", test)
                    .with_node("consequent", consequent);
                self.eat_semicolons();
                if self.eat(&Token::Else) {
                    node = node.with_node("alternate", self.parse_statement()?);
                }
                Ok(node)
            }
            Token::LBrace => self.parse_block(),
            Token::Semicolon => {
                self.advance();
                Ok(Node::new("EmptyStatement", span))
            }
            Token::Reserved(_) => Err(self.unexpected("statement")),
            _ => {
                let expression = self.parse_expression()?;
                Ok(Node::new("ExpressionStatement", span).with_node("expression", expression))
            }
        }
    }

    fn parse_block(&mut self) -> Result<Node> {
        let span = self.span();
        self.expect(&Token::LBrace, "'{'")?;
        let mut body = Vec::new();
        self.eat_semicolons();
        while !self.check(&Token::RBrace) {
            if self.check(&Token::Eof) {
                return Err(self.unexpected("'}'"));
            }
            body.push(self.parse_statement()?);
            self.eat_semicolons();
        }
        self.advance();
        Ok(Node::new("BlockStatement", span).with_list("body", body))
    }

    fn parse_variable_declaration(&mut self) -> Result<Node> {
        let span = self.span();
        let kind = match self.advance() {
            Token::Let => "let",
            Token::Const => "const",
            _ => "var",
        };
        let mut declarations = Vec::new();
        loop {
            let decl_span = self.span();
            let id = self.identifier()?;
            let mut declarator = Node::new("VariableDeclarator", decl_span).with_node("id", id);
            if self.eat(&Token::Op("=")) {
                declarator = declarator.with_node("init", self.parse_assignment()?);
            }
            declarations.push(declarator);
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        Ok(Node::new("VariableDeclaration", span)
            .with_str("kind", kind)
            .with_list("declarations", declarations))
    }

    fn parse_function(&mut self, declaration: bool) -> Result<Node> {
        let span = self.span();
        self.expect(&Token::Function, "'function'")?;
        let id = if matches!(self.peek(), Token::Identifier(_)) {
            Some(self.identifier()?)
        } else if declaration {
            return Err(self.unexpected("function name"));
        } else {
            None
        };
        let params = self.parse_params()?;
        let body = self.parse_block()?;
        let kind = if declaration {
            "FunctionDeclaration"
        } else {
            "FunctionExpression"
        };
        let mut node = Node::new(kind, span)
            .with_list("params", params)
            .with_node("body", body);
        if let Some(id) = id {
            node = node.with_node("id", id);
        }
        Ok(node)
    }

    fn parse_params(&mut self) -> Result<Vec<Node>> {
        self.expect(&Token::LParen, "'('")?;
        let mut params = Vec::new();
        while !self.check(&Token::RParen) {
            params.push(self.identifier()?);
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.expect(&Token::RParen, "')'")?;
        Ok(params)
    }

    fn parse_import(&mut self) -> Result<Node> {
        let span = self.span();
        self.expect(&Token::Import, "'import'")?;
        let mut specifiers = Vec::new();

        if let Token::StringLiteral(_) = self.peek() {
            // side-effect import: import 'module';
        } else {
            if let Token::Identifier(_) = self.peek() {
                let spec_span = self.span();
                let local = self.identifier()?;
                specifiers.push(
                    Node::new("ImportDefaultSpecifier", spec_span).with_node("local", local),
                );
                self.eat(&Token::Comma);
            }
            if self.eat(&Token::Op("*")) {
                let spec_span = self.span();
                self.expect_word("as")?;
                let local = self.identifier()?;
                specifiers.push(
                    Node::new("ImportNamespaceSpecifier", spec_span).with_node("local", local),
                );
            } else if self.eat(&Token::LBrace) {
                while !self.check(&Token::RBrace) {
                    let spec_span = self.span();
                    let imported = self.identifier()?;
                    let local = if matches!(self.peek(), Token::Identifier(w) if w == "as") {
                        self.advance();
                        self.identifier()?
                    } else {
                        imported.clone()
                    };
                    specifiers.push(
                        Node::new("ImportSpecifier", spec_span)
                            .with_node("imported", imported)
                            .with_node("local", local),
                    );
                    if !self.eat(&Token::Comma) {
                        break;
                    }
                }
                self.expect(&Token::RBrace, "'}'")?;
            }
            self.expect_word("from")?;
        }

        let source_span = self.span();
        let source = match self.peek().clone() {
            Token::StringLiteral(s) => {
                self.advance();
                s
            }
            _ => return Err(self.unexpected("module specifier")),
        };
        Ok(Node::new("ImportDeclaration", span)
            .with_list("specifiers", specifiers)
            .with_node(
                "source",
                Node::new("Literal", source_span).with_value("value", Scalar::Str(source)),
            ))
    }

    // ── Expressions ────────────────────────────────────────

    fn parse_expression(&mut self) -> Result<Node> {
        self.parse_assignment()
    }

    fn parse_assignment(&mut self) -> Result<Node> {
        self.nested(Self::assignment)
    }

    fn assignment(&mut self) -> Result<Node> {
        if self.arrow_ahead() {
            return self.parse_arrow();
        }
        let span = self.span();
        let left = self.parse_conditional()?;
        if let Token::Op(op) = *self.peek() {
            if is_assignment_op(op) {
                self.advance();
                let right = self.parse_assignment()?;
                return Ok(Node::new("AssignmentExpression", span)
                    .with_str("operator", op)
                    .with_node("left", left)
                    .with_node("right", right));
            }
        }
        Ok(left)
    }

    /// `x => ...` or `(a, b) => ...`
    fn arrow_ahead(&self) -> bool {
        match self.peek() {
            Token::Identifier(_) => self.peek_at(1) == &Token::Arrow,
            Token::LParen => {
                let mut i = 1;
                loop {
                    match self.peek_at(i) {
                        Token::RParen => return self.peek_at(i + 1) == &Token::Arrow,
                        Token::Identifier(_) | Token::Comma => i += 1,
                        _ => return false,
                    }
                }
            }
            _ => false,
        }
    }

    fn parse_arrow(&mut self) -> Result<Node> {
        let span = self.span();
        let params = if matches!(self.peek(), Token::Identifier(_)) {
            vec![self.identifier()?]
        } else {
            self.parse_params()?
        };
        self.expect(&Token::Arrow, "'=>'")?;
        let body = if self.check(&Token::LBrace) {
            self.parse_block()?
        } else {
            self.parse_assignment()?
        };
        Ok(Node::new("ArrowFunctionExpression", span)
            .with_list("params", params)
            .with_node("body", body))
    }

    fn parse_conditional(&mut self) -> Result<Node> {
        let span = self.span();
        let test = self.parse_binary(1)?;
        if self.eat(&Token::Question) {
            let consequent = self.parse_assignment()?;
            self.expect(&Token::Colon, "':'")?;
            let alternate = self.parse_assignment()?;
            return Ok(Node::new("ConditionalExpression", span)
                .with_node("test", test)
                .with_node("consequent", consequent)
                .with_node("alternate", alternate));
        }
        Ok(test)
    }

    fn parse_binary(&mut self, min_prec: u8) -> Result<Node> {
        let span = self.span();
        let mut left = self.parse_unary()?;
        let mut links = 0;
        loop {
            let Token::Op(op) = *self.peek() else { break };
            let Some(prec) = binary_precedence(op) else { break };
            if prec < min_prec {
                break;
            }
            links += 1;
            self.check_chain(links)?;
            self.advance();
            // `**` is right-associative
            let next_min = if op == "**" { prec } else { prec + 1 };
            let right = self.nested(|p| p.parse_binary(next_min))?;
            let kind = if matches!(op, "&&" | "||" | "??") {
                "LogicalExpression"
            } else {
                "BinaryExpression"
            };
            left = Node::new(kind, span)
                .with_str("operator", op)
                .with_node("left", left)
                .with_node("right", right);
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Node> {
        let span = self.span();
        match self.peek().clone() {
            Token::Op(op @ ("!" | "-" | "+" | "~")) => {
                self.advance();
                // Fold a negated number into a single literal
                if op == "-" {
                    if let Token::NumberLiteral(n) = *self.peek() {
                        self.advance();
                        let literal =
                            Node::new("Literal", span).with_value("value", Scalar::Number(-n));
                        return self.parse_postfix(literal);
                    }
                }
                let argument = self.nested(Self::parse_unary)?;
                Ok(Node::new("UnaryExpression", span)
                    .with_str("operator", op)
                    .with_node("argument", argument))
            }
            Token::Typeof => {
                self.advance();
                let argument = self.nested(Self::parse_unary)?;
                Ok(Node::new("UnaryExpression", span)
                    .with_str("operator", "typeof")
                    .with_node("argument", argument))
            }
            Token::Op(op @ ("++" | "--")) => {
                self.advance();
                let argument = self.nested(Self::parse_unary)?;
                Ok(Node::new("UpdateExpression", span)
                    .with_str("operator", op)
                    .with_value("prefix", Scalar::Bool(true))
                    .with_node("argument", argument))
            }
            _ => {
                let primary = self.parse_primary()?;
                self.parse_postfix(primary)
            }
        }
    }

    fn parse_postfix(&mut self, mut expr: Node) -> Result<Node> {
        let mut links = 0;
        loop {
            let span = expr.span;
            if matches!(self.peek(), Token::Dot | Token::LBracket | Token::LParen | Token::Op("++" | "--")) {
                links += 1;
                self.check_chain(links)?;
            }
            match self.peek() {
                Token::Dot => {
                    self.advance();
                    let prop_span = self.span();
                    let name = self.property_name()?;
                    expr = Node::new("MemberExpression", span)
                        .with_node("object", expr)
                        .with_node(
                            "property",
                            Node::new("Identifier", prop_span).with_str("name", name),
                        )
                        .with_value("computed", Scalar::Bool(false));
                }
                Token::LBracket => {
                    self.advance();
                    let property = self.parse_expression()?;
                    self.expect(&Token::RBracket, "']'")?;
                    expr = Node::new("MemberExpression", span)
                        .with_node("object", expr)
                        .with_node("property", property)
                        .with_value("computed", Scalar::Bool(true));
                }
                Token::LParen => {
                    let arguments = self.parse_arguments()?;
                    expr = Node::new("CallExpression", span)
                        .with_node("callee", expr)
                        .with_list("arguments", arguments);
                }
                Token::Op(op @ ("++" | "--")) => {
                    let op = *op;
                    self.advance();
                    expr = Node::new("UpdateExpression", span)
                        .with_str("operator", op)
                        .with_value("prefix", Scalar::Bool(false))
                        .with_node("argument", expr);
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_arguments(&mut self) -> Result<Vec<Node>> {
        self.expect(&Token::LParen, "'('")?;
        let mut args = Vec::new();
        while !self.check(&Token::RParen) {
            args.push(self.parse_spread_or_assignment()?);
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.expect(&Token::RParen, "')'")?;
        Ok(args)
    }

    fn parse_spread_or_assignment(&mut self) -> Result<Node> {
        let span = self.span();
        if self.eat(&Token::Op("...")) {
            let argument = self.parse_assignment()?;
            return Ok(Node::new("SpreadElement", span).with_node("argument", argument));
        }
        self.parse_assignment()
    }

    fn parse_primary(&mut self) -> Result<Node> {
        let span = self.span();
        match self.peek().clone() {
            Token::NumberLiteral(n) => {
                self.advance();
                Ok(Node::new("Literal", span).with_value("value", Scalar::Number(n)))
            }
            Token::StringLiteral(s) => {
                self.advance();
                Ok(Node::new("Literal", span).with_value("value", Scalar::Str(s)))
            }
            Token::BooleanLiteral(b) => {
                self.advance();
                Ok(Node::new("Literal", span).with_value("value", Scalar::Bool(b)))
            }
            Token::NullLiteral => {
                self.advance();
                Ok(Node::new("Literal", span).with_value("value", Scalar::Null))
            }
            Token::TemplateLiteral(raw) => {
                self.advance();
                Ok(Node::new("TemplateLiteral", span).with_str("raw", raw))
            }
            Token::Identifier(_) => self.identifier(),
            Token::LParen => {
                self.advance();
                let expr = self.parse_expression()?;
                self.expect(&Token::RParen, "')'")?;
                Ok(expr)
            }
            Token::LBracket => self.parse_array(),
            Token::LBrace => self.parse_object(),
            Token::Function => self.parse_function(false),
            Token::New => {
                self.advance();
                let callee_primary = self.nested(Self::parse_primary)?;
                let mut callee = callee_primary;
                let mut links = 0;
                while self.eat(&Token::Dot) {
                    links += 1;
                    self.check_chain(links)?;
                    let prop_span = self.span();
                    let name = self.property_name()?;
                    callee = Node::new("MemberExpression", span)
                        .with_node("object", callee)
                        .with_node(
                            "property",
                            Node::new("Identifier", prop_span).with_str("name", name),
                        )
                        .with_value("computed", Scalar::Bool(false));
                }
                let arguments = if self.check(&Token::LParen) {
                    self.parse_arguments()?
                } else {
                    Vec::new()
                };
                Ok(Node::new("NewExpression", span)
                    .with_node("callee", callee)
                    .with_list("arguments", arguments))
            }
            _ => Err(self.unexpected("expression")),
        }
    }

    fn parse_array(&mut self) -> Result<Node> {
        let span = self.span();
        self.expect(&Token::LBracket, "'['")?;
        let mut elements = Vec::new();
        while !self.check(&Token::RBracket) {
            if self.check(&Token::Comma) {
                return Err(Error::Parse(format!(
                    "Array holes are not supported at {}",
                    self.span()
                )));
            }
            elements.push(self.parse_spread_or_assignment()?);
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.expect(&Token::RBracket, "']'")?;
        Ok(Node::new("ArrayExpression", span).with_list("elements", elements))
    }

    fn parse_object(&mut self) -> Result<Node> {
        let span = self.span();
        self.expect(&Token::LBrace, "'{'")?;
        let mut properties = Vec::new();
        while !self.check(&Token::RBrace) {
            let prop_span = self.span();
            if self.eat(&Token::Op("...")) {
                let argument = self.parse_assignment()?;
                properties.push(Node::new("SpreadElement", prop_span).with_node("argument", argument));
            } else {
                let (key, shorthand_ok) = match self.peek().clone() {
                    Token::StringLiteral(s) => {
                        self.advance();
                        (Node::new("Literal", prop_span).with_value("value", Scalar::Str(s)), false)
                    }
                    Token::NumberLiteral(n) => {
                        self.advance();
                        (Node::new("Literal", prop_span).with_value("value", Scalar::Number(n)), false)
                    }
                    Token::LBracket => {
                        return Err(Error::Parse(format!(
                            "Computed property keys are not supported at {}",
                            prop_span
                        )));
                    }
                    token => {
                        let shorthand_ok = matches!(token, Token::Identifier(_));
                        let name = self.property_name()?;
                        (Node::new("Identifier", prop_span).with_str("name", name), shorthand_ok)
                    }
                };
                let property = if self.eat(&Token::Colon) {
                    let value = self.parse_assignment()?;
                    Node::new("Property", prop_span)
                        .with_node("key", key)
                        .with_node("value", value)
                        .with_value("shorthand", Scalar::Bool(false))
                } else if shorthand_ok {
                    Node::new("Property", prop_span)
                        .with_node("key", key.clone())
                        .with_node("value", key)
                        .with_value("shorthand", Scalar::Bool(true))
                } else {
                    return Err(self.unexpected("':'"));
                };
                properties.push(property);
            }
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.expect(&Token::RBrace, "'}'")?;
        Ok(Node::new("ObjectExpression", span).with_list("properties", properties))
    }
}

// ── Literal reduction ─────────────────────────────────────

/// Reduce a node to a JSON value when it is built only from literals
///
/// Accepts literals, arrays of literals and objects whose keys are names or
/// literals. Anything else (identifiers, calls, spreads) yields `None`.
pub fn literal_value(node: &Node) -> Option<serde_json::Value> {
    match node.kind.as_str() {
        "Literal" => Some(
            node.value("value")
                .map(Scalar::to_json)
                .unwrap_or(serde_json::Value::Null),
        ),
        "ArrayExpression" => node
            .list("elements")
            .iter()
            .map(literal_value)
            .collect::<Option<Vec<_>>>()
            .map(serde_json::Value::Array),
        "ObjectExpression" => {
            let mut object = serde_json::Map::new();
            for property in node.list("properties") {
                if !property.is("Property") {
                    return None;
                }
                let key = property_key(property.node("key")?)?;
                object.insert(key, literal_value(property.node("value")?)?);
            }
            Some(serde_json::Value::Object(object))
        }
        _ => None,
    }
}

/// Object keys: identifier names or literal strings and numbers
pub(crate) fn property_key(key: &Node) -> Option<String> {
    match key.kind.as_str() {
        "Identifier" => key.str_value("name").map(str::to_string),
        "Literal" => match key.value("value") {
            Some(Scalar::Str(s)) => Some(s.clone()),
            Some(Scalar::Number(n)) => Some(super::node::number_to_json(*n).to_string()),
            _ => None,
        },
        _ => None,
    }
}
