//! quel-sql - QUEL parsing and SQL generation library
//!
//! This library compiles statements written in the QUEL query language
//! (`range`, `retrieve`, `where`, `sort by`, joins via `via`) into
//! parameterized SQL plus a bound-parameter table.
//!
//! # Architecture
//!
//! The library follows a pipeline architecture:
//! 1. **Lexer** - Converts the QUEL string to a token stream, two tokens
//!    of lookahead, pulled on demand
//! 2. **Parser** - Builds the AST (an arena of nodes) from tokens
//! 3. **Generator** - Walks the AST once and renders the SQL statement,
//!    filling the parameter table
//!
//! Table and column names come from a [`Schema`] collaborator; the
//! library itself never executes SQL and holds no connection state. Each
//! compilation uses a fresh lexer/parser/generator set, so sequential
//! reuse is free and the output is deterministic: the same source always
//! yields byte-identical SQL and an equal parameter mapping.

pub mod ast;
pub mod error;
pub mod generator;
pub mod parser;
pub mod schema;
pub mod tokens;

pub use ast::{Arena, Node, NodeId, Query, SearchTerms, SortDirection, SortEntry};
pub use error::{Error, Result};
pub use generator::{CompiledQuery, Generator, Parameters, QueryPart, SqlGenerator};
pub use parser::Parser;
pub use schema::{ColumnDef, MappingSchema, Schema, SchemaError, SchemaResult};
pub use tokens::{Lexer, Token, TokenKind};

/// Compile a QUEL query into SQL text plus its bound parameters.
///
/// # Arguments
/// * `source` - The QUEL query string
/// * `schema` - The entity-to-table mapping collaborator
///
/// # Example
/// ```
/// use quel_sql::{compile, ColumnDef, MappingSchema};
///
/// let schema = MappingSchema::new().with_entity(
///     "Product",
///     "products",
///     vec![
///         ColumnDef::new("id", "product_id").numeric().identifier(),
///         ColumnDef::new("name", "name"),
///     ],
/// );
///
/// let compiled = compile(
///     "range of p is Product; retrieve (p.name) where p.id = 1",
///     &schema,
/// )
/// .unwrap();
///
/// assert_eq!(
///     compiled.sql,
///     "SELECT p.name FROM products AS p WHERE p.product_id = 1"
/// );
/// ```
pub fn compile(source: &str, schema: &dyn Schema) -> Result<CompiledQuery> {
    let query = Parser::parse(source)?;
    Generator::new(schema).generate(&query)
}

/// Parse a QUEL query into its AST without generating SQL.
///
/// # Arguments
/// * `source` - The QUEL query string
pub fn parse(source: &str) -> Result<Query> {
    Parser::parse(source)
}

/// Generate SQL from an already-parsed query.
///
/// # Arguments
/// * `query` - The parsed query
/// * `schema` - The entity-to-table mapping collaborator
pub fn generate(query: &Query, schema: &dyn Schema) -> Result<CompiledQuery> {
    Generator::new(schema).generate(query)
}
