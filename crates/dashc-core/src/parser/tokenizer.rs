//! Script tokenizer: converts script-region text into a token stream
//!
//! Handles: keywords, identifiers, string/number/template literals,
//! punctuation and operators. Comments (`//` and `/* */`) are discarded.
//!
//! Guarantees:
//! - Deterministic: same input always produces same token stream
//! - Every error carries line:column

use crate::{Error, Result};

/// Token types for the script subset
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Keywords
    Let,
    Const,
    Var,
    Function,
    Import,
    Export,
    Return,
    If,
    Else,
    New,
    Typeof,

    /// Reserved words the script subset does not support (`for`, `class`, ...)
    Reserved(String),

    // Literals
    StringLiteral(String),
    NumberLiteral(f64),
    TemplateLiteral(String),
    BooleanLiteral(bool),
    NullLiteral,

    // Symbols
    LBrace,    // {
    RBrace,    // }
    LParen,    // (
    RParen,    // )
    LBracket,  // [
    RBracket,  // ]
    Semicolon, // ;
    Comma,     // ,
    Dot,       // .
    Colon,     // :
    Question,  // ?
    Arrow,     // =>

    /// Arithmetic, comparison, logical and assignment operators
    Op(&'static str),

    // Other
    Identifier(String),
    Eof,
}

/// Position in source text for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub line: usize,
    pub column: usize,
    pub offset: usize,
}

impl std::fmt::Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Token with source position
#[derive(Debug, Clone, PartialEq)]
pub struct SpannedToken {
    pub token: Token,
    pub span: Span,
}

/// Operators, longest first so greedy matching picks `===` over `==`
const OPERATORS: &[&str] = &[
    "===", "!==", "...", "**", "==", "!=", "<=", ">=", "&&", "||", "??", "+=", "-=", "*=", "/=",
    "++", "--", "+", "-", "*", "/", "%", "<", ">", "!", "=", "&", "|", "^", "~",
];

/// Tokenizer for script source text
pub struct Tokenizer {
    input: Vec<char>,
    position: usize,
    line: usize,
    column: usize,
    base_offset: usize,
}

impl Tokenizer {
    /// Create a new tokenizer for the given input text
    pub fn new(text: &str) -> Self {
        Self::with_origin(text, Span { line: 1, column: 1, offset: 0 })
    }

    /// Tokenize text embedded in a larger document starting at `origin`,
    /// so spans point into the enclosing document
    pub fn with_origin(text: &str, origin: Span) -> Self {
        Tokenizer {
            input: text.chars().collect(),
            position: 0,
            line: origin.line,
            column: origin.column,
            base_offset: origin.offset,
        }
    }

    /// Tokenize the entire input into a stream of spanned tokens
    pub fn tokenize(&mut self) -> Result<Vec<SpannedToken>> {
        let mut tokens = Vec::new();

        loop {
            self.skip_whitespace_and_comments()?;

            if self.is_at_end() {
                tokens.push(SpannedToken {
                    token: Token::Eof,
                    span: self.current_span(),
                });
                break;
            }

            let token = self.next_token()?;
            tokens.push(token);
        }

        Ok(tokens)
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

    fn current_span(&self) -> Span {
        Span {
            line: self.line,
            column: self.column,
            offset: self.base_offset + self.position,
        }
    }

    fn starts_with(&self, text: &str) -> bool {
        text.chars()
            .enumerate()
            .all(|(i, c)| self.peek_ahead(i) == Some(c))
    }

    // ── Whitespace & Comments ──────────────────────────────

    fn skip_whitespace_and_comments(&mut self) -> Result<()> {
        loop {
            while let Some(ch) = self.peek() {
                if ch.is_whitespace() {
                    self.advance();
                } else {
                    break;
                }
            }

            if self.starts_with("//") {
                while let Some(ch) = self.peek() {
                    if ch == '\n' {
                        break;
                    }
                    self.advance();
                }
                continue;
            }

            if self.starts_with("/*") {
                let span = self.current_span();
                self.advance();
                self.advance();
                loop {
                    if self.is_at_end() {
                        return Err(Error::Parse(format!(
                            "Unterminated comment starting at {}",
                            span
                        )));
                    }
                    if self.starts_with("*/") {
                        self.advance();
                        self.advance();
                        break;
                    }
                    self.advance();
                }
                continue;
            }

            break;
        }
        Ok(())
    }

    // ── Main dispatch ──────────────────────────────────────

    fn next_token(&mut self) -> Result<SpannedToken> {
        let span = self.current_span();
        let Some(ch) = self.peek() else {
            return Ok(SpannedToken { token: Token::Eof, span });
        };

        let single = match ch {
            '{' => Some(Token::LBrace),
            '}' => Some(Token::RBrace),
            '(' => Some(Token::LParen),
            ')' => Some(Token::RParen),
            '[' => Some(Token::LBracket),
            ']' => Some(Token::RBracket),
            ';' => Some(Token::Semicolon),
            ',' => Some(Token::Comma),
            ':' => Some(Token::Colon),
            _ => None,
        };
        if let Some(token) = single {
            self.advance();
            return Ok(SpannedToken { token, span });
        }

        match ch {
            '"' | '\'' => self.read_string(span, ch),
            '`' => self.read_template(span),
            '.' if self.peek_ahead(1).is_some_and(|c| c.is_ascii_digit()) => {
                self.read_number(span)
            }
            c if c.is_ascii_digit() => self.read_number(span),
            c if c.is_alphabetic() || c == '_' || c == '$' => {
                Ok(self.read_identifier_or_keyword(span))
            }
            _ => self.read_punctuation(span),
        }
    }

    fn read_punctuation(&mut self, span: Span) -> Result<SpannedToken> {
        if self.starts_with("=>") {
            self.advance();
            self.advance();
            return Ok(SpannedToken { token: Token::Arrow, span });
        }
        if self.starts_with("?.") {
            return Err(Error::Parse(format!(
                "Optional chaining is not supported at {}",
                span
            )));
        }
        if self.starts_with("...") || !self.starts_with(".") {
            if let Some(op) = OPERATORS.iter().find(|op| self.starts_with(op)) {
                for _ in 0..op.chars().count() {
                    self.advance();
                }
                return Ok(SpannedToken { token: Token::Op(op), span });
            }
        }
        match self.peek() {
            Some('.') => {
                self.advance();
                Ok(SpannedToken { token: Token::Dot, span })
            }
            Some('?') if self.peek_ahead(1) != Some('?') => {
                self.advance();
                Ok(SpannedToken { token: Token::Question, span })
            }
            Some(c) => Err(Error::Parse(format!(
                "Unexpected character '{}' at {}",
                c, span
            ))),
            None => Ok(SpannedToken { token: Token::Eof, span }),
        }
    }

    // ── String literals ────────────────────────────────────

    fn read_string(&mut self, span: Span, quote: char) -> Result<SpannedToken> {
        self.advance(); // consume opening quote
        let mut value = String::new();

        loop {
            match self.advance() {
                None | Some('\n') => {
                    return Err(Error::Parse(format!(
                        "Unterminated string starting at {}",
                        span
                    )));
                }
                Some(c) if c == quote => break,
                Some('\\') => match self.advance() {
                    Some('n') => value.push('\n'),
                    Some('t') => value.push('\t'),
                    Some('r') => value.push('\r'),
                    Some('0') => value.push('\0'),
                    Some('u') => value.push(self.read_unicode_escape()?),
                    Some('\n') => {}
                    Some(c) => value.push(c),
                    None => {
                        return Err(Error::Parse(format!(
                            "Unterminated escape sequence at {}",
                            self.current_span()
                        )));
                    }
                },
                Some(c) => value.push(c),
            }
        }

        Ok(SpannedToken {
            token: Token::StringLiteral(value),
            span,
        })
    }

    fn read_unicode_escape(&mut self) -> Result<char> {
        let span = self.current_span();
        let mut hex = String::new();
        for _ in 0..4 {
            match self.advance() {
                Some(c) if c.is_ascii_hexdigit() => hex.push(c),
                _ => {
                    return Err(Error::Parse(format!(
                        "Invalid unicode escape at {}",
                        span
                    )))
                }
            }
        }
        u32::from_str_radix(&hex, 16)
            .ok()
            .and_then(char::from_u32)
            .ok_or_else(|| Error::Parse(format!("Invalid unicode escape at {}", span)))
    }

    /// Template literals are kept raw; interpolation is never evaluated
    fn read_template(&mut self, span: Span) -> Result<SpannedToken> {
        self.advance(); // consume opening `
        let mut raw = String::new();
        loop {
            match self.advance() {
                None => {
                    return Err(Error::Parse(format!(
                        "Unterminated template literal starting at {}",
                        span
                    )));
                }
                Some('`') => break,
                Some('\\') => {
                    raw.push('\\');
                    if let Some(c) = self.advance() {
                        raw.push(c);
                    }
                }
                Some(c) => raw.push(c),
            }
        }
        Ok(SpannedToken {
            token: Token::TemplateLiteral(raw),
            span,
        })
    }

    // ── Numbers ────────────────────────────────────────────

    fn read_number(&mut self, span: Span) -> Result<SpannedToken> {
        let start = self.position;

        if self.peek() == Some('0') && matches!(self.peek_ahead(1), Some('x' | 'X')) {
            self.advance();
            self.advance();
            let digits_start = self.position;
            while self.peek().is_some_and(|c| c.is_ascii_hexdigit()) {
                self.advance();
            }
            let text: String = self.input[digits_start..self.position].iter().collect();
            let val = i64::from_str_radix(&text, 16).map_err(|_| {
                Error::Parse(format!("Invalid hex literal at {}", span))
            })?;
            return Ok(SpannedToken {
                token: Token::NumberLiteral(val as f64),
                span,
            });
        }

        while let Some(ch) = self.peek() {
            if ch.is_ascii_digit() || ch == '.' || ch == '_' {
                self.advance();
            } else if (ch == 'e' || ch == 'E')
                && self
                    .peek_ahead(1)
                    .is_some_and(|c| c.is_ascii_digit() || c == '-' || c == '+')
            {
                self.advance();
                self.advance();
            } else {
                break;
            }
        }

        let text: String = self.input[start..self.position]
            .iter()
            .filter(|c| **c != '_')
            .collect();
        let val: f64 = text
            .parse()
            .map_err(|_| Error::Parse(format!("Invalid number '{}' at {}", text, span)))?;

        if self.peek().is_some_and(|c| c.is_alphabetic() || c == '_') {
            return Err(Error::Parse(format!(
                "Identifier directly after number at {}",
                self.current_span()
            )));
        }

        Ok(SpannedToken {
            token: Token::NumberLiteral(val),
            span,
        })
    }

    // ── Identifiers & Keywords ─────────────────────────────

    fn read_identifier_or_keyword(&mut self, span: Span) -> SpannedToken {
        let start = self.position;

        while let Some(ch) = self.peek() {
            if ch.is_alphanumeric() || ch == '_' || ch == '$' {
                self.advance();
            } else {
                break;
            }
        }

        let text: String = self.input[start..self.position].iter().collect();

        let token = match text.as_str() {
            "let" => Token::Let,
            "const" => Token::Const,
            "var" => Token::Var,
            "function" => Token::Function,
            "import" => Token::Import,
            "export" => Token::Export,
            "return" => Token::Return,
            "if" => Token::If,
            "else" => Token::Else,
            "new" => Token::New,
            "typeof" => Token::Typeof,

            "true" => Token::BooleanLiteral(true),
            "false" => Token::BooleanLiteral(false),
            "null" => Token::NullLiteral,

            "for" | "while" | "do" | "class" | "try" | "catch" | "finally" | "throw"
            | "switch" | "case" | "with" | "async" | "await" | "yield" | "delete" | "this"
            | "super" | "debugger" | "break" | "continue" | "instanceof" | "in" | "void" => {
                Token::Reserved(text)
            }

            _ => Token::Identifier(text),
        };

        SpannedToken { token, span }
    }
}
