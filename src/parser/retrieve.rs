//! The retrieve rule: value list, `where` clause, and `sort by` list.

use crate::ast::{Alias, Node, NodeId, Retrieve, SortDirection, SortEntry};
use crate::error::{Error, Result};
use crate::tokens::TokenKind;

use super::Parser;

impl Parser {
    /// `retrieve [unique] ( <values> ) [where <condition>] [sort by <list>] [;]`
    pub(crate) fn parse_retrieve(&mut self) -> Result<NodeId> {
        self.lexer.consume(TokenKind::Retrieve)?;
        let unique = self.lexer.consume_if(TokenKind::Unique)?.is_some();

        // The retrieve node exists before its value list parses so macro
        // registration and lookup can run against it.
        let retrieve_id = self
            .arena
            .alloc(Node::Retrieve(Retrieve::new(self.ranges.clone(), unique)));
        self.retrieve = Some(retrieve_id);

        self.lexer.consume(TokenKind::ParenOpen)?;
        self.parse_values(retrieve_id)?;
        self.lexer.consume(TokenKind::ParenClose)?;

        if self.lexer.consume_if(TokenKind::Where)?.is_some() {
            let conditions = self.parse_or()?;
            if let Node::Retrieve(retrieve) = self.arena.node_mut(retrieve_id) {
                retrieve.conditions = Some(conditions);
            }
        }

        if self.lexer.consume_if(TokenKind::Sort)?.is_some() {
            self.lexer.consume(TokenKind::By)?;
            let sort = self.parse_sort_entries()?;
            if let Node::Retrieve(retrieve) = self.arena.node_mut(retrieve_id) {
                retrieve.sort = sort;
            }
        }

        self.lexer.consume_if(TokenKind::Semicolon)?;
        Ok(retrieve_id)
    }

    /// Parse the comma-separated value list.
    ///
    /// Each entry yields a named [`Alias`], whether the name came from an
    /// explicit `name =` prefix or from the trimmed source text of the
    /// expression itself. An explicit name also registers the expression
    /// as a macro; re-using an already-registered name is an error.
    fn parse_values(&mut self, retrieve_id: NodeId) -> Result<()> {
        loop {
            let start = self.lexer.offset();

            // `identifier =` prefix means an explicit alias
            let alias_token = if self.lexer.current_kind() == TokenKind::Identifier
                && self.lexer.lookahead_kind() == TokenKind::Equals
            {
                let token = self.lexer.consume(TokenKind::Identifier)?;
                self.lexer.consume(TokenKind::Equals)?;
                Some(token)
            } else {
                None
            };

            let expression = self.parse_additive()?;

            // Regular expressions are predicate-only constructs
            if matches!(self.arena.node(expression), Node::RegExp(_)) {
                return Err(Error::syntax(
                    "regular expressions are not allowed in the value list",
                    self.lexer.line(),
                ));
            }

            let name = match alias_token {
                Some(token) => {
                    if self.macro_named(&token.text).is_some() {
                        return Err(Error::syntax(
                            format!("duplicate variable name: '{}'", token.text),
                            token.line,
                        ));
                    }
                    if let Node::Retrieve(retrieve) = self.arena.node_mut(retrieve_id) {
                        retrieve.macros.push((token.text.clone(), expression));
                    }
                    token.text
                }
                None => {
                    // Reconstruct the alias from the exact source span the
                    // expression occupied
                    let end = self.lexer.offset();
                    self.lexer.slice(start, end).trim().to_string()
                }
            };

            let alias = self.arena.alloc(Node::Alias(Alias { name, expression }));
            if let Node::Retrieve(retrieve) = self.arena.node_mut(retrieve_id) {
                retrieve.values.push(alias);
            }

            if self.lexer.consume_if(TokenKind::Comma)?.is_none() {
                break;
            }
        }

        Ok(())
    }

    /// Each sort entry is one expression plus an optional direction.
    fn parse_sort_entries(&mut self) -> Result<Vec<SortEntry>> {
        let mut entries = Vec::new();

        loop {
            let expr = self.parse_additive()?;

            let direction = if self.lexer.consume_if(TokenKind::Asc)?.is_some() {
                SortDirection::Asc
            } else if self.lexer.consume_if(TokenKind::Desc)?.is_some() {
                SortDirection::Desc
            } else {
                SortDirection::Unspecified
            };

            entries.push(SortEntry { expr, direction });

            if self.lexer.consume_if(TokenKind::Comma)?.is_none() {
                break;
            }
        }

        Ok(entries)
    }
}
