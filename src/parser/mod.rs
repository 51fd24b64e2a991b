//! Recursive-descent parser for QUEL
//!
//! One [`Parser`] instance parses one query: `range` declarations followed
//! by a `retrieve` statement. The rule families live in sibling files as
//! further `impl Parser` blocks: the retrieve rule (value list, `where`,
//! `sort by`) in `retrieve.rs` and the expression precedence cascade in
//! `expression.rs`. The grammar needs one token of lookahead beyond the
//! current token and never backtracks.

mod expression;
mod retrieve;

use crate::ast::{Arena, Node, NodeId, Query};
use crate::error::{Error, Result};
use crate::tokens::{Lexer, TokenKind};

/// Parser state shared by all rules: the lexer, the arena being filled,
/// the ranges declared so far, and the retrieve node under construction
/// (present while its value list, conditions and sort entries parse).
pub struct Parser {
    lexer: Lexer,
    arena: Arena,
    ranges: Vec<NodeId>,
    retrieve: Option<NodeId>,
}

impl Parser {
    /// Create a parser over one query source string.
    pub fn new(source: &str) -> Result<Self> {
        Ok(Self {
            lexer: Lexer::new(source)?,
            arena: Arena::new(),
            ranges: Vec::new(),
            retrieve: None,
        })
    }

    /// Parse a complete query.
    pub fn parse(source: &str) -> Result<Query> {
        Self::new(source)?.parse_query()
    }

    /// Parse range declarations followed by the retrieve statement, then
    /// require end of input.
    pub fn parse_query(mut self) -> Result<Query> {
        while self.lexer.current_kind() == TokenKind::Range {
            self.parse_range()?;
        }

        let root = self.parse_retrieve()?;
        self.lexer.consume(TokenKind::Eof)?;
        Ok(Query::new(self.arena, root))
    }

    /// `range of <alias> is <entity> [via <condition>] ;`
    ///
    /// The range is registered before its `via` condition parses so the
    /// condition can reference the range being declared.
    fn parse_range(&mut self) -> Result<()> {
        self.lexer.consume(TokenKind::Range)?;
        self.lexer.consume(TokenKind::Of)?;
        let alias = self.lexer.consume(TokenKind::Identifier)?;

        if self.range_named(&alias.text).is_some() {
            return Err(Error::syntax(
                format!("duplicate range alias: '{}'", alias.text),
                alias.line,
            ));
        }

        self.lexer.consume(TokenKind::Is)?;
        let entity = self.lexer.consume(TokenKind::Identifier)?;

        let range_id = self.arena.alloc_range(alias.text, entity.text);
        self.ranges.push(range_id);

        if self.lexer.consume_if(TokenKind::Via)?.is_some() {
            let condition = self.parse_or()?;
            if let Node::Range(range) = self.arena.node_mut(range_id) {
                range.join_condition = Some(condition);
            }
        }

        self.lexer.consume(TokenKind::Semicolon)?;
        Ok(())
    }

    /// Look up a declared range by alias.
    pub(crate) fn range_named(&self, name: &str) -> Option<NodeId> {
        self.ranges.iter().copied().find(|&id| {
            matches!(self.arena.node(id), Node::Range(range) if range.name == name)
        })
    }

    /// Look up a macro registered on the retrieve node under construction.
    pub(crate) fn macro_named(&self, name: &str) -> Option<NodeId> {
        let retrieve_id = self.retrieve?;
        match self.arena.node(retrieve_id) {
            Node::Retrieve(retrieve) => retrieve.macro_named(name),
            _ => None,
        }
    }
}
