//! Token types and tokenization for QUEL parsing
//!
//! This module defines all QUEL token kinds and the lexer that turns a
//! query string into tokens. The lexer is a streaming scanner: it keeps a
//! persistent current/lookahead token pair so the parser never needs more
//! than two tokens of lookahead and never backtracks.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// All possible token kinds in QUEL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TokenKind {
    // Keywords
    Range,
    Of,
    Is,
    In,
    Via,
    Retrieve,
    Unique,
    Where,
    Sort,
    By,
    And,
    Or,
    Not,
    Asc,
    Desc,

    // Literals
    Number,
    String,
    /// Backtick-delimited regular expression literal
    RegExp,
    True,
    False,
    Null,

    /// Named parameter: `:name`
    Parameter,
    Identifier,

    // Operators
    Equals,             // =
    Equal,              // ==
    Unequal,            // != or <>
    LargerThan,         // >
    LargerThanOrEqual,  // >=
    SmallerThan,        // <
    SmallerThanOrEqual, // <=
    ShiftLeft,          // <<
    ShiftRight,         // >>
    Arrow,              // ->
    Plus,
    Minus,
    Star,
    Slash,
    Backslash,
    Percent,
    Hash,
    Ampersand,
    Caret,
    Exclamation,
    Question,

    // Punctuation
    Dot,
    Comma,
    Colon,
    Semicolon,
    ParenOpen,
    ParenClose,

    Eof,
    /// A character the lexer does not recognize. Not an immediate error:
    /// it surfaces when the parser expects a specific kind and finds this.
    Unknown,
}

/// A token in the QUEL token stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    /// The kind of token
    pub kind: TokenKind,
    /// The payload: raw lexeme for numbers (emitted verbatim by the
    /// generator), content for strings/regexes/parameters/identifiers
    pub text: String,
    /// Source line number (1-based)
    pub line: usize,
    /// The quote character that delimited a string literal
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quote: Option<char>,
}

impl Token {
    /// Create a new token
    pub fn new(kind: TokenKind, text: impl Into<String>, line: usize) -> Self {
        Self {
            kind,
            text: text.into(),
            line,
            quote: None,
        }
    }

    fn quoted(kind: TokenKind, text: impl Into<String>, line: usize, quote: char) -> Self {
        Self {
            kind,
            text: text.into(),
            line,
            quote: Some(quote),
        }
    }

    fn eof(line: usize) -> Self {
        Self::new(TokenKind::Eof, "", line)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self.kind, self.text)
    }
}

/// Classify a keyword lexeme, case-insensitively.
fn keyword(lower: &str) -> Option<TokenKind> {
    let kind = match lower {
        "retrieve" => TokenKind::Retrieve,
        "where" => TokenKind::Where,
        "and" => TokenKind::And,
        "or" => TokenKind::Or,
        "range" => TokenKind::Range,
        "of" => TokenKind::Of,
        "is" => TokenKind::Is,
        "in" => TokenKind::In,
        "via" => TokenKind::Via,
        "unique" => TokenKind::Unique,
        "sort" => TokenKind::Sort,
        "by" => TokenKind::By,
        "not" => TokenKind::Not,
        "asc" => TokenKind::Asc,
        "desc" => TokenKind::Desc,
        _ => return None,
    };
    Some(kind)
}

/// Two-character operators take priority over single-character ones.
fn two_char_token(a: char, b: char) -> Option<TokenKind> {
    let kind = match (a, b) {
        ('=', '=') => TokenKind::Equal,
        ('!', '=') => TokenKind::Unequal,
        ('<', '>') => TokenKind::Unequal,
        ('>', '=') => TokenKind::LargerThanOrEqual,
        ('<', '=') => TokenKind::SmallerThanOrEqual,
        ('<', '<') => TokenKind::ShiftLeft,
        ('>', '>') => TokenKind::ShiftRight,
        ('-', '>') => TokenKind::Arrow,
        _ => return None,
    };
    Some(kind)
}

fn single_char_token(c: char) -> Option<TokenKind> {
    let kind = match c {
        '.' => TokenKind::Dot,
        ',' => TokenKind::Comma,
        '=' => TokenKind::Equals,
        '>' => TokenKind::LargerThan,
        '<' => TokenKind::SmallerThan,
        '(' => TokenKind::ParenOpen,
        ')' => TokenKind::ParenClose,
        '+' => TokenKind::Plus,
        '-' => TokenKind::Minus,
        '*' => TokenKind::Star,
        ':' => TokenKind::Colon,
        ';' => TokenKind::Semicolon,
        '/' => TokenKind::Slash,
        '\\' => TokenKind::Backslash,
        '%' => TokenKind::Percent,
        '#' => TokenKind::Hash,
        '&' => TokenKind::Ampersand,
        '^' => TokenKind::Caret,
        '!' => TokenKind::Exclamation,
        '?' => TokenKind::Question,
        _ => return None,
    };
    Some(kind)
}

/// Streaming lexer over one QUEL source string.
///
/// Holds the current token and one token of lookahead. `consume` advances
/// on a kind match or fails; `consume_if` advances only when the kind
/// matches and reports whether it did. Offsets recorded via [`Lexer::offset`]
/// can be turned back into raw source text with [`Lexer::slice`], which the
/// parser uses to synthesize default alias names from the exact text of an
/// unaliased expression.
pub struct Lexer {
    chars: Vec<char>,
    size: usize,
    pos: usize,
    prev_pos: usize,
    prev_prev_pos: usize,
    line: usize,
    current: Token,
    lookahead: Token,
}

impl Lexer {
    /// Create a lexer and prefetch the current/lookahead pair.
    pub fn new(source: &str) -> Result<Self> {
        let chars: Vec<char> = source.chars().collect();
        let size = chars.len();
        let mut lexer = Self {
            chars,
            size,
            pos: 0,
            prev_pos: 0,
            prev_prev_pos: 0,
            line: 1,
            current: Token::eof(1),
            lookahead: Token::eof(1),
        };
        lexer.current = lexer.next_token()?;
        lexer.lookahead = lexer.next_token()?;
        Ok(lexer)
    }

    /// The token the parser is looking at.
    pub fn current(&self) -> &Token {
        &self.current
    }

    /// Kind of the current token.
    pub fn current_kind(&self) -> TokenKind {
        self.current.kind
    }

    /// Kind of the token after the current one.
    pub fn lookahead_kind(&self) -> TokenKind {
        self.lookahead.kind
    }

    /// Source line of the current token.
    pub fn line(&self) -> usize {
        self.current.line
    }

    /// Consume the current token if it has the expected kind, or fail.
    pub fn consume(&mut self, kind: TokenKind) -> Result<Token> {
        if self.current.kind != kind {
            return Err(Error::syntax(
                format!(
                    "expected {:?}, found {:?} '{}'",
                    kind, self.current.kind, self.current.text
                ),
                self.current.line,
            ));
        }

        let next = self.next_token()?;
        let consumed = std::mem::replace(
            &mut self.current,
            std::mem::replace(&mut self.lookahead, next),
        );
        Ok(consumed)
    }

    /// Consume the current token only when it has the given kind.
    pub fn consume_if(&mut self, kind: TokenKind) -> Result<Option<Token>> {
        if self.current.kind == kind {
            return self.consume(kind).map(Some);
        }
        Ok(None)
    }

    /// Source position immediately after the most recently consumed token.
    ///
    /// Because two tokens are prefetched, this is the scan position from two
    /// refills ago: the offset just past the token preceding `current`,
    /// before any whitespace that separates the two.
    pub fn offset(&self) -> usize {
        self.prev_prev_pos
    }

    /// Raw source text between two recorded offsets.
    pub fn slice(&self, start: usize, end: usize) -> String {
        self.chars[start.min(self.size)..end.min(self.size)]
            .iter()
            .collect()
    }

    fn is_at_end(&self) -> bool {
        self.pos >= self.size
    }

    fn peek(&self) -> char {
        if self.is_at_end() {
            '\0'
        } else {
            self.chars[self.pos]
        }
    }

    fn peek_next(&self) -> char {
        if self.pos + 1 >= self.size {
            '\0'
        } else {
            self.chars[self.pos + 1]
        }
    }

    fn skip_whitespace(&mut self) {
        while !self.is_at_end() {
            match self.peek() {
                '\n' => {
                    self.line += 1;
                    self.pos += 1;
                }
                ' ' | '\t' | '\r' => {
                    self.pos += 1;
                }
                _ => break,
            }
        }
    }

    fn next_token(&mut self) -> Result<Token> {
        // Record where the previous token ended so offset()/slice() can
        // reconstruct the exact source text of what the parser consumed.
        self.prev_prev_pos = self.prev_pos;
        self.prev_pos = self.pos;

        self.skip_whitespace();

        if self.is_at_end() {
            return Ok(Token::eof(self.line));
        }

        let c = self.peek();

        if c.is_ascii_digit() {
            return self.scan_number(false);
        }

        // Negative numeric literal
        if c == '-' && self.peek_next().is_ascii_digit() {
            self.pos += 1;
            return self.scan_number(true);
        }

        if c == '"' || c == '\'' {
            return self.scan_string(c);
        }

        // Backtick string is a regular expression literal
        if c == '`' {
            return self.scan_regexp();
        }

        if c == ':' && (self.peek_next().is_alphanumeric() || self.peek_next() == '_') {
            return self.scan_parameter();
        }

        if c.is_alphabetic() {
            return Ok(self.scan_identifier_or_keyword());
        }

        if self.pos + 1 < self.size {
            if let Some(kind) = two_char_token(c, self.chars[self.pos + 1]) {
                let text: String = self.chars[self.pos..self.pos + 2].iter().collect();
                self.pos += 2;
                return Ok(Token::new(kind, text, self.line));
            }
        }

        if let Some(kind) = single_char_token(c) {
            self.pos += 1;
            return Ok(Token::new(kind, c, self.line));
        }

        // Unidentified character: defer the error to the parser
        self.pos += 1;
        Ok(Token::new(TokenKind::Unknown, c, self.line))
    }

    /// Scan an integer or float. A second decimal point is a lexical error.
    fn scan_number(&mut self, negative: bool) -> Result<Token> {
        let start = self.pos;
        let mut decimal_found = false;

        while !self.is_at_end() {
            let c = self.peek();

            if !c.is_ascii_digit() && c != '.' {
                break;
            }

            if c == '.' {
                if decimal_found {
                    return Err(Error::lex("malformed floating point number", self.line));
                }
                decimal_found = true;
            }

            self.pos += 1;
        }

        let digits: String = self.chars[start..self.pos].iter().collect();
        let text = if negative {
            format!("-{digits}")
        } else {
            digits
        };
        Ok(Token::new(TokenKind::Number, text, self.line))
    }

    /// Scan a quoted string. The closing quote must match the opening one
    /// and must appear before end-of-input and before the next newline.
    fn scan_string(&mut self, quote: char) -> Result<Token> {
        let content = self.scan_delimited(quote)?;
        Ok(Token::quoted(TokenKind::String, content, self.line, quote))
    }

    fn scan_regexp(&mut self) -> Result<Token> {
        let content = self.scan_delimited('`')?;
        Ok(Token::new(TokenKind::RegExp, content, self.line))
    }

    fn scan_delimited(&mut self, delimiter: char) -> Result<String> {
        self.pos += 1; // opening delimiter
        let start = self.pos;

        while !self.is_at_end() && self.peek() != delimiter {
            if self.peek() == '\n' {
                return Err(Error::lex("unterminated string", self.line));
            }
            self.pos += 1;
        }

        if self.is_at_end() {
            return Err(Error::lex("unexpected end of data", self.line));
        }

        let content: String = self.chars[start..self.pos].iter().collect();
        self.pos += 1; // closing delimiter
        Ok(content)
    }

    fn scan_parameter(&mut self) -> Result<Token> {
        self.pos += 1; // ':'
        let start = self.pos;

        while !self.is_at_end() && (self.peek().is_alphanumeric() || self.peek() == '_') {
            self.pos += 1;
        }

        let name: String = self.chars[start..self.pos].iter().collect();
        Ok(Token::new(TokenKind::Parameter, name, self.line))
    }

    fn scan_identifier_or_keyword(&mut self) -> Token {
        let start = self.pos;

        while !self.is_at_end() && (self.peek().is_alphanumeric() || self.peek() == '_') {
            self.pos += 1;
        }

        let text: String = self.chars[start..self.pos].iter().collect();
        let lower = text.to_lowercase();

        let kind = match lower.as_str() {
            "true" => TokenKind::True,
            "false" => TokenKind::False,
            "null" => TokenKind::Null,
            _ => keyword(&lower).unwrap_or(TokenKind::Identifier),
        };

        Token::new(kind, text, self.line)
    }
}
