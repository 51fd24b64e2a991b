//! Expression rule family: a precedence cascade from logical `or` down to
//! primary forms. A binary node is only allocated when its operator is
//! actually present; a lone operand passes through unchanged.

use crate::ast::{
    Comparison, CompareOp, Concat, Count, Factor, FactorOp, Identifier, In, Logical, Node,
    NodeId, Search, SearchTerms, Term, TermOp,
};
use crate::error::{Error, Result};
use crate::tokens::TokenKind;

use super::Parser;

impl Parser {
    /// Logical `or` tier.
    pub(crate) fn parse_or(&mut self) -> Result<NodeId> {
        let mut left = self.parse_and()?;

        while self.lexer.consume_if(TokenKind::Or)?.is_some() {
            let right = self.parse_and()?;
            left = self.arena.alloc(Node::Or(Logical { left, right }));
        }

        Ok(left)
    }

    /// Logical `and` tier.
    fn parse_and(&mut self) -> Result<NodeId> {
        let mut left = self.parse_condition()?;

        while self.lexer.consume_if(TokenKind::And)?.is_some() {
            let right = self.parse_condition()?;
            left = self.arena.alloc(Node::And(Logical { left, right }));
        }

        Ok(left)
    }

    /// Comparison tier, including the postfix forms `in (..)`, `is null`
    /// and `is not null`, and the prefix `not`.
    fn parse_condition(&mut self) -> Result<NodeId> {
        if self.lexer.consume_if(TokenKind::Not)?.is_some() {
            let operand = self.parse_condition()?;
            return Ok(self.arena.alloc(Node::Not { operand }));
        }

        let left = self.parse_additive()?;

        if self.lexer.consume_if(TokenKind::Is)?.is_some() {
            let negated = self.lexer.consume_if(TokenKind::Not)?.is_some();
            self.lexer.consume(TokenKind::Null)?;
            let node = if negated {
                Node::CheckNotNull { expr: left }
            } else {
                Node::CheckNull { expr: left }
            };
            return Ok(self.arena.alloc(node));
        }

        if self.lexer.consume_if(TokenKind::In)?.is_some() {
            self.lexer.consume(TokenKind::ParenOpen)?;
            let mut values = vec![self.parse_primary()?];
            while self.lexer.consume_if(TokenKind::Comma)?.is_some() {
                values.push(self.parse_primary()?);
            }
            self.lexer.consume(TokenKind::ParenClose)?;
            return Ok(self.arena.alloc(Node::In(In {
                identifier: left,
                values,
            })));
        }

        if let Some(op) = self.consume_compare_op()? {
            let right = self.parse_additive()?;
            return Ok(self
                .arena
                .alloc(Node::Expression(Comparison { op, left, right })));
        }

        Ok(left)
    }

    fn consume_compare_op(&mut self) -> Result<Option<CompareOp>> {
        let op = match self.lexer.current_kind() {
            TokenKind::Equals | TokenKind::Equal => CompareOp::Eq,
            TokenKind::Unequal => CompareOp::Neq,
            TokenKind::LargerThan => CompareOp::Gt,
            TokenKind::LargerThanOrEqual => CompareOp::Gte,
            TokenKind::SmallerThan => CompareOp::Lt,
            TokenKind::SmallerThanOrEqual => CompareOp::Lte,
            _ => return Ok(None),
        };

        let kind = self.lexer.current_kind();
        self.lexer.consume(kind)?;
        Ok(Some(op))
    }

    /// Additive tier.
    pub(crate) fn parse_additive(&mut self) -> Result<NodeId> {
        let mut left = self.parse_multiplicative()?;

        loop {
            let op = match self.lexer.current_kind() {
                TokenKind::Plus => TermOp::Add,
                TokenKind::Minus => TermOp::Sub,
                _ => break,
            };
            let kind = self.lexer.current_kind();
            self.lexer.consume(kind)?;

            let right = self.parse_multiplicative()?;
            left = self.arena.alloc(Node::Term(Term { op, left, right }));
        }

        Ok(left)
    }

    /// Multiplicative tier.
    fn parse_multiplicative(&mut self) -> Result<NodeId> {
        let mut left = self.parse_primary()?;

        loop {
            let op = match self.lexer.current_kind() {
                TokenKind::Star => FactorOp::Mul,
                TokenKind::Slash => FactorOp::Div,
                _ => break,
            };
            let kind = self.lexer.current_kind();
            self.lexer.consume(kind)?;

            let right = self.parse_primary()?;
            left = self.arena.alloc(Node::Factor(Factor { op, left, right }));
        }

        Ok(left)
    }

    /// Primary forms: literals, parameters, parenthesized sub-expressions,
    /// identifier chains, and the function-like constructs.
    pub(crate) fn parse_primary(&mut self) -> Result<NodeId> {
        match self.lexer.current_kind() {
            TokenKind::Number => {
                let token = self.lexer.consume(TokenKind::Number)?;
                Ok(self.arena.alloc(Node::Number(token.text)))
            }
            TokenKind::String => {
                let token = self.lexer.consume(TokenKind::String)?;
                Ok(self.arena.alloc(Node::Str(token.text)))
            }
            TokenKind::RegExp => {
                let token = self.lexer.consume(TokenKind::RegExp)?;
                Ok(self.arena.alloc(Node::RegExp(token.text)))
            }
            TokenKind::True => {
                self.lexer.consume(TokenKind::True)?;
                Ok(self.arena.alloc(Node::Bool(true)))
            }
            TokenKind::False => {
                self.lexer.consume(TokenKind::False)?;
                Ok(self.arena.alloc(Node::Bool(false)))
            }
            TokenKind::Null => {
                self.lexer.consume(TokenKind::Null)?;
                Ok(self.arena.alloc(Node::Null))
            }
            TokenKind::Parameter => {
                let token = self.lexer.consume(TokenKind::Parameter)?;
                Ok(self.arena.alloc(Node::Parameter(token.text)))
            }
            TokenKind::ParenOpen => {
                self.lexer.consume(TokenKind::ParenOpen)?;
                let inner = self.parse_or()?;
                self.lexer.consume(TokenKind::ParenClose)?;
                Ok(inner)
            }
            TokenKind::Identifier => self.parse_identifier_like(),
            _ => {
                let token = self.lexer.current();
                Err(Error::syntax(
                    format!("unexpected token {:?} '{}'", token.kind, token.text),
                    token.line,
                ))
            }
        }
    }

    /// An identifier in expression position: a function-like form, a range
    /// alias (denoting its entity), a dotted property chain, or a macro
    /// reference.
    fn parse_identifier_like(&mut self) -> Result<NodeId> {
        if self.lexer.lookahead_kind() == TokenKind::ParenOpen {
            let name = self.lexer.current().text.to_lowercase();
            return match name.as_str() {
                "count" => self.parse_count(false),
                "ucount" => self.parse_count(true),
                "is_empty" => self.parse_unary_function(|value| Node::IsEmpty { value }),
                "is_numeric" => self.parse_unary_function(|value| Node::IsNumeric { value }),
                "concat" => self.parse_concat(),
                "search" => self.parse_search(),
                _ => Err(Error::syntax(
                    format!("unknown function: '{}'", self.lexer.current().text),
                    self.lexer.line(),
                )),
            };
        }

        let token = self.lexer.consume(TokenKind::Identifier)?;
        let range = self.range_named(&token.text);

        if self.lexer.current_kind() == TokenKind::Dot {
            let Some(range_id) = range else {
                return Err(Error::syntax(
                    format!("unknown range: '{}'", token.text),
                    token.line,
                ));
            };
            return self.parse_property_chain(range_id);
        }

        // A bare range alias denotes the range's entity (all columns)
        if let Some(range_id) = range {
            return Ok(self.entity_of(range_id));
        }

        if let Some(macro_node) = self.macro_named(&token.text) {
            return Ok(macro_node);
        }

        Err(Error::syntax(
            format!("unknown identifier: '{}'", token.text),
            token.line,
        ))
    }

    /// `.prop(.prop)*` after a range alias. Each link's parent is the
    /// range's entity or the previous identifier in the chain.
    fn parse_property_chain(&mut self, range_id: NodeId) -> Result<NodeId> {
        let mut parent = self.entity_of(range_id);

        loop {
            self.lexer.consume(TokenKind::Dot)?;
            let property = self.lexer.consume(TokenKind::Identifier)?;
            parent = self.arena.alloc(Node::Identifier(Identifier {
                name: property.text,
                parent,
            }));

            if self.lexer.current_kind() != TokenKind::Dot {
                return Ok(parent);
            }
        }
    }

    fn entity_of(&self, range_id: NodeId) -> NodeId {
        match self.arena.node(range_id) {
            Node::Range(range) => range.entity,
            _ => unreachable!("range ids always point at range nodes"),
        }
    }

    /// `count( target )` / `ucount( target )` where the target is a range
    /// alias (count entities) or a property chain (count a column).
    fn parse_count(&mut self, distinct: bool) -> Result<NodeId> {
        self.lexer.consume(TokenKind::Identifier)?;
        self.lexer.consume(TokenKind::ParenOpen)?;

        let token = self.lexer.consume(TokenKind::Identifier)?;
        let Some(range_id) = self.range_named(&token.text) else {
            return Err(Error::syntax(
                format!("unknown range: '{}'", token.text),
                token.line,
            ));
        };

        let target = if self.lexer.current_kind() == TokenKind::Dot {
            self.parse_property_chain(range_id)?
        } else {
            self.entity_of(range_id)
        };

        self.lexer.consume(TokenKind::ParenClose)?;

        let count = Count { target };
        let node = if distinct {
            Node::UCount(count)
        } else {
            Node::Count(count)
        };
        Ok(self.arena.alloc(node))
    }

    fn parse_unary_function(&mut self, make: impl FnOnce(NodeId) -> Node) -> Result<NodeId> {
        self.lexer.consume(TokenKind::Identifier)?;
        self.lexer.consume(TokenKind::ParenOpen)?;
        let value = self.parse_primary()?;
        self.lexer.consume(TokenKind::ParenClose)?;
        Ok(self.arena.alloc(make(value)))
    }

    fn parse_concat(&mut self) -> Result<NodeId> {
        self.lexer.consume(TokenKind::Identifier)?;
        self.lexer.consume(TokenKind::ParenOpen)?;

        let mut arguments = vec![self.parse_additive()?];
        while self.lexer.consume_if(TokenKind::Comma)?.is_some() {
            arguments.push(self.parse_additive()?);
        }

        self.lexer.consume(TokenKind::ParenClose)?;
        Ok(self.arena.alloc(Node::Concat(Concat { arguments })))
    }

    /// `search( identifier, .., "raw terms" )`: one or more property
    /// chains followed by the raw search string as the last argument.
    fn parse_search(&mut self) -> Result<NodeId> {
        self.lexer.consume(TokenKind::Identifier)?;
        self.lexer.consume(TokenKind::ParenOpen)?;

        let mut identifiers = Vec::new();
        let terms;

        loop {
            if self.lexer.current_kind() == TokenKind::String {
                let token = self.lexer.consume(TokenKind::String)?;
                terms = SearchTerms::parse(&token.text);
                break;
            }

            let token = self.lexer.consume(TokenKind::Identifier)?;
            let Some(range_id) = self.range_named(&token.text) else {
                return Err(Error::syntax(
                    format!("unknown range: '{}'", token.text),
                    token.line,
                ));
            };
            identifiers.push(self.parse_property_chain(range_id)?);
            self.lexer.consume(TokenKind::Comma)?;
        }

        if identifiers.is_empty() {
            return Err(Error::syntax(
                "search needs at least one identifier before the term string",
                self.lexer.line(),
            ));
        }

        self.lexer.consume(TokenKind::ParenClose)?;
        Ok(self.arena.alloc(Node::Search(Search { identifiers, terms })))
    }
}
