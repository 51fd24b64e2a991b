//! SQL generation from a parsed QUEL query
//!
//! Generation runs in two layers. [`SqlGenerator`] is the tree-walking
//! visitor: one instance renders one part of the statement (value list,
//! join condition, where clause, sort list), dispatching on node kind with
//! an exhaustive match and memoizing visited node ids, so a node reachable
//! from multiple parents renders at most once per part and shared
//! references cannot recurse forever. [`Generator`] drives one visitor per
//! part and assembles the full `SELECT` statement.
//!
//! All generators of one compilation share the parameter table and the
//! counter that names generated search parameters, which keeps the output
//! reproducible: compiling the same source twice yields identical SQL and
//! an equal parameter mapping.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::ast::{
    Arena, Comparison, CompareOp, Count, Node, NodeId, Query, Search, SortDirection,
};
use crate::error::{Error, Result};
use crate::schema::{ColumnDef, Schema};

/// Bound-parameter table: generated parameter name to value
pub type Parameters = HashMap<String, String>;

/// The compiler's output: SQL text plus its bound parameters, ready for a
/// prepared-statement execution layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledQuery {
    pub sql: String,
    pub parameters: Parameters,
}

/// Which part of the statement a visitor is rendering. Identifier
/// rendering differs in the sort part, where nullable columns need a
/// NULL-coalescing wrapper to sort consistently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryPart {
    Values,
    Join,
    Where,
    Sort,
}

/// Tree-walking visitor rendering one query part into SQL fragments.
pub struct SqlGenerator<'a> {
    arena: &'a Arena,
    schema: &'a dyn Schema,
    parameters: &'a mut Parameters,
    part: QueryPart,
    visited: HashSet<NodeId>,
    sql: String,
    search_seq: &'a mut usize,
}

impl<'a> SqlGenerator<'a> {
    pub fn new(
        arena: &'a Arena,
        schema: &'a dyn Schema,
        parameters: &'a mut Parameters,
        part: QueryPart,
        search_seq: &'a mut usize,
    ) -> Self {
        Self {
            arena,
            schema,
            parameters,
            part,
            visited: HashSet::new(),
            sql: String::new(),
            search_seq,
        }
    }

    /// Render a node. A node id already visited by this instance is
    /// skipped, which keeps shared references safe within one part.
    pub fn visit(&mut self, id: NodeId) -> Result<()> {
        if !self.visited.insert(id) {
            return Ok(());
        }

        match self.arena.node(id).clone() {
            Node::Retrieve(_) | Node::Range(_) => Err(Error::generate(
                "structural node is not valid in expression position",
            )),

            Node::Alias(alias) => self.visit(alias.expression),

            Node::Entity(_) => self.emit_entity(id),
            Node::Identifier(_) => self.emit_identifier(id),

            Node::And(logical) => self.emit_binary(logical.left, "AND", logical.right),
            Node::Or(logical) => self.emit_binary(logical.left, "OR", logical.right),
            Node::Expression(cmp) => self.emit_comparison(cmp),
            Node::Term(term) => self.emit_binary(term.left, term.op.sql(), term.right),
            Node::Factor(factor) => self.emit_binary(factor.left, factor.op.sql(), factor.right),

            Node::Not { operand } => {
                self.sql.push_str("NOT ");
                self.visit(operand)
            }

            Node::Null => {
                self.sql.push_str("null");
                Ok(())
            }
            Node::Bool(value) => {
                self.sql.push_str(if value { "true" } else { "false" });
                Ok(())
            }
            Node::Number(text) => {
                self.sql.push_str(&text);
                Ok(())
            }
            Node::Str(value) => {
                self.sql.push_str(&format!("\"{value}\""));
                Ok(())
            }
            Node::RegExp(_) => Err(Error::generate(
                "regular expression literal is only valid against = or <>",
            )),
            Node::Parameter(name) => {
                self.sql.push(':');
                self.sql.push_str(&name);
                Ok(())
            }

            Node::Count(count) => self.emit_count(count, false),
            Node::UCount(count) => self.emit_count(count, true),
            Node::IsEmpty { value } => self.emit_is_empty(value),
            Node::IsNumeric { value } => self.emit_is_numeric(value),

            Node::CheckNull { expr } => {
                self.visit(expr)?;
                self.sql.push_str(" IS NULL");
                Ok(())
            }
            Node::CheckNotNull { expr } => {
                self.visit(expr)?;
                self.sql.push_str(" IS NOT NULL");
                Ok(())
            }

            Node::In(in_node) => {
                self.visit(in_node.identifier)?;
                self.sql.push_str(" IN(");
                for (index, &value) in in_node.values.iter().enumerate() {
                    if index > 0 {
                        self.sql.push(',');
                    }
                    self.visit(value)?;
                }
                self.sql.push(')');
                Ok(())
            }

            Node::Concat(concat) => {
                self.sql.push_str("CONCAT(");
                for (index, &argument) in concat.arguments.iter().enumerate() {
                    if index > 0 {
                        self.sql.push(',');
                    }
                    self.visit(argument)?;
                }
                self.sql.push(')');
                Ok(())
            }

            Node::Search(search) => self.emit_search(search),
        }
    }

    /// The fragments rendered since the last call, leaving the buffer
    /// empty. The visited set is kept: the caller is still inside the same
    /// part.
    pub fn take(&mut self) -> String {
        std::mem::take(&mut self.sql)
    }

    /// Consume the generator and return everything it rendered.
    pub fn into_sql(self) -> String {
        self.sql
    }

    /// Resolve an identifier to its range alias and column metadata by
    /// walking the parent link to the owning entity.
    fn resolve(&self, id: NodeId) -> Result<(String, ColumnDef)> {
        let Node::Identifier(ident) = self.arena.node(id) else {
            return Err(Error::generate("expected a property identifier"));
        };

        match self.arena.node(ident.parent) {
            Node::Entity(entity) => {
                let range_name = self.range_name_of(ident.parent)?;
                let def = self.schema.column(&entity.name, &ident.name)?;
                Ok((range_name, def.clone()))
            }
            Node::Identifier(parent) => Err(Error::generate(format!(
                "cannot resolve '{}.{}': relation traversal is not bound to a range",
                parent.name, ident.name
            ))),
            _ => Err(Error::generate(format!(
                "identifier '{}' does not resolve to a range",
                ident.name
            ))),
        }
    }

    /// `alias.column` for a property identifier.
    fn column_ref(&self, id: NodeId) -> Result<String> {
        let (range_name, def) = self.resolve(id)?;
        Ok(format!("{range_name}.{}", def.column))
    }

    /// The alias of the range owning an entity node.
    fn range_name_of(&self, entity_id: NodeId) -> Result<String> {
        let Node::Entity(entity) = self.arena.node(entity_id) else {
            return Err(Error::generate("expected an entity node"));
        };
        let range_id = entity
            .range
            .ok_or_else(|| Error::generate(format!("entity {} belongs to no range", entity.name)))?;
        match self.arena.node(range_id) {
            Node::Range(range) => Ok(range.name.clone()),
            _ => Err(Error::generate(format!(
                "entity {} has a dangling range link",
                entity.name
            ))),
        }
    }

    fn emit_identifier(&mut self, id: NodeId) -> Result<()> {
        let (range_name, def) = self.resolve(id)?;
        let reference = format!("{range_name}.{}", def.column);

        if self.part != QueryPart::Sort || !def.nullable {
            self.sql.push_str(&reference);
            return Ok(());
        }

        // NULL-producing sort keys order inconsistently across engines, so
        // nullable columns coalesce to a type-appropriate default.
        if def.numeric {
            self.sql.push_str(&format!("COALESCE({reference}, 0)"));
        } else {
            self.sql.push_str(&format!("COALESCE({reference}, '')"));
        }
        Ok(())
    }

    /// A whole entity as a retrieved value: one labeled column expression
    /// per mapped column, so result rows can be re-grouped into instances.
    fn emit_entity(&mut self, id: NodeId) -> Result<()> {
        let Node::Entity(entity) = self.arena.node(id) else {
            return Err(Error::generate("expected an entity node"));
        };
        let entity_name = entity.name.clone();
        let range_name = self.range_name_of(id)?;

        let columns: Vec<String> = self
            .schema
            .column_map(&entity_name)?
            .iter()
            .map(|def| {
                format!(
                    "{range_name}.{} as `{range_name}.{}`",
                    def.column, def.property
                )
            })
            .collect();

        self.sql.push_str(&columns.join(","));
        Ok(())
    }

    fn emit_binary(&mut self, left: NodeId, op: &str, right: NodeId) -> Result<()> {
        self.visit(left)?;
        self.sql.push_str(&format!(" {op} "));
        self.visit(right)
    }

    /// Equality and inequality get rewritten when the right-hand side is a
    /// wildcard string or a regex literal; everything else renders as a
    /// plain binary comparison.
    fn emit_comparison(&mut self, cmp: Comparison) -> Result<()> {
        if matches!(cmp.op, CompareOp::Eq | CompareOp::Neq) {
            match self.arena.node(cmp.right).clone() {
                Node::Str(value) if value.contains('*') || value.contains('?') => {
                    self.visited.insert(cmp.right);
                    self.visit(cmp.left)?;

                    // Escape literal pattern characters first, then turn
                    // the query wildcards into their SQL forms.
                    let pattern = value
                        .replace('%', "\\%")
                        .replace('_', "\\_")
                        .replace('*', "%")
                        .replace('?', "_");
                    let op = if cmp.op == CompareOp::Eq {
                        " LIKE "
                    } else {
                        " NOT LIKE "
                    };
                    self.sql.push_str(&format!("{op}\"{pattern}\""));
                    return Ok(());
                }
                Node::RegExp(pattern) => {
                    self.visited.insert(cmp.right);
                    self.visit(cmp.left)?;

                    let op = if cmp.op == CompareOp::Eq {
                        " REGEXP "
                    } else {
                        " NOT REGEXP "
                    };
                    self.sql.push_str(&format!("{op}\"{pattern}\""));
                    return Ok(());
                }
                _ => {}
            }
        }

        self.emit_binary(cmp.left, cmp.op.sql(), cmp.right)
    }

    /// `count(..)` / `ucount(..)`: counting an entity counts its first
    /// identifier column; counting a property counts that column.
    fn emit_count(&mut self, count: Count, distinct: bool) -> Result<()> {
        self.visited.insert(count.target);

        let reference = match self.arena.node(count.target) {
            Node::Entity(entity) => {
                let entity_name = entity.name.clone();
                let range_name = self.range_name_of(count.target)?;
                let id_columns = self.schema.identifier_columns(&entity_name)?;
                let column = id_columns.first().ok_or_else(|| {
                    Error::generate(format!("entity {entity_name} has no identifier column"))
                })?;
                format!("{range_name}.{column}")
            }
            Node::Identifier(_) => self.column_ref(count.target)?,
            _ => {
                return Err(Error::generate(
                    "count target must be an entity or a property identifier",
                ))
            }
        };

        if distinct {
            self.sql.push_str(&format!("COUNT(DISTINCT {reference})"));
        } else {
            self.sql.push_str(&format!("COUNT({reference})"));
        }
        Ok(())
    }

    /// `is_empty(..)`: constant-folds literals, otherwise a compound
    /// null-or-empty-or-zero predicate against the resolved column.
    fn emit_is_empty(&mut self, value: NodeId) -> Result<()> {
        self.visited.insert(value);

        match self.arena.node(value).clone() {
            Node::Number(text) => {
                let is_zero = text.parse::<f64>().map(|v| v == 0.0).unwrap_or(false);
                self.sql.push_str(if is_zero { "1" } else { "0" });
                Ok(())
            }
            Node::Str(value) => {
                self.sql.push_str(if value.is_empty() { "1" } else { "0" });
                Ok(())
            }
            Node::Identifier(_) => {
                let column = self.column_ref(value)?;
                self.sql.push_str(&format!(
                    "({column} IS NULL OR {column} = '' OR {column} = 0)"
                ));
                Ok(())
            }
            _ => Err(Error::generate(
                "is_empty expects a literal or a property identifier",
            )),
        }
    }

    /// `is_numeric(..)`: a literal number is trivially numeric; otherwise
    /// a regex predicate against the column or the escaped literal.
    fn emit_is_numeric(&mut self, value: NodeId) -> Result<()> {
        self.visited.insert(value);

        let subject = match self.arena.node(value).clone() {
            Node::Number(_) => {
                self.sql.push('1');
                return Ok(());
            }
            Node::Identifier(_) => self.column_ref(value)?,
            Node::Str(text) => {
                let escaped = text.replace('\\', "\\\\").replace('\'', "\\'");
                format!("'{escaped}'")
            }
            _ => {
                return Err(Error::generate(
                    "is_numeric expects a literal or a property identifier",
                ))
            }
        };

        self.sql
            .push_str(&format!("{subject} REGEXP '^-?[0-9]*\\.?[0-9]+$'"));
        Ok(())
    }

    /// One clause per non-empty term group per identifier; groups combine
    /// with AND per identifier, identifiers with OR. Parameter names come
    /// from the shared per-compilation counter, so they are deterministic
    /// and collision-free across terms, identifiers and search calls.
    fn emit_search(&mut self, search: Search) -> Result<()> {
        let seq = *self.search_seq;
        *self.search_seq += 1;

        let groups = [
            ("or_terms", &search.terms.or_terms, "OR", "LIKE"),
            ("and_terms", &search.terms.and_terms, "AND", "LIKE"),
            ("not_terms", &search.terms.not_terms, "AND", "NOT LIKE"),
        ];

        let mut conditions = Vec::new();

        for (ident_index, &ident) in search.identifiers.iter().enumerate() {
            self.visited.insert(ident);
            let column = self.column_ref(ident)?;

            let mut field_conditions = Vec::new();

            for (prefix, terms, connective, comparison) in &groups {
                let mut term_conditions = Vec::new();

                for (term_index, term) in terms.iter().enumerate() {
                    let name = format!("{prefix}{seq}_{ident_index}_{term_index}");
                    term_conditions.push(format!("{column} {comparison} :{name}"));
                    self.parameters.insert(name, format!("%{term}%"));
                }

                if !term_conditions.is_empty() {
                    field_conditions
                        .push(format!("({})", term_conditions.join(&format!(" {connective} "))));
                }
            }

            if !field_conditions.is_empty() {
                conditions.push(format!("({})", field_conditions.join(" AND ")));
            }
        }

        self.sql.push_str(&format!("({})", conditions.join(" OR ")));
        Ok(())
    }
}

/// Assembles a complete `SELECT` statement from a parsed query, driving
/// one [`SqlGenerator`] per part.
pub struct Generator<'a> {
    schema: &'a dyn Schema,
}

impl<'a> Generator<'a> {
    pub fn new(schema: &'a dyn Schema) -> Self {
        Self { schema }
    }

    /// Compile a parsed query into SQL text and its parameter table.
    pub fn generate(&self, query: &Query) -> Result<CompiledQuery> {
        let arena = query.arena();
        let retrieve = query.retrieve();
        let mut parameters = Parameters::new();
        let mut search_seq = 0usize;

        let mut sql = String::from("SELECT ");
        if retrieve.unique {
            sql.push_str("DISTINCT ");
        }

        // Value list: one visitor for the whole part, fragments joined in
        // declaration order.
        {
            let mut generator = SqlGenerator::new(
                arena,
                self.schema,
                &mut parameters,
                QueryPart::Values,
                &mut search_seq,
            );
            let mut columns = Vec::new();
            for &value in &retrieve.values {
                generator.visit(value)?;
                let fragment = generator.take();
                if !fragment.is_empty() {
                    columns.push(fragment);
                }
            }
            if columns.is_empty() {
                return Err(Error::generate("query retrieves no values"));
            }
            sql.push_str(&columns.join(", "));
        }

        // FROM and joins: the first range without a join condition is the
        // base table; further condition-less ranges cross join; ranges
        // bound via a condition join LEFT or INNER per their required flag.
        let mut base: Option<String> = None;
        let mut joins = Vec::new();

        for &range_id in &retrieve.ranges {
            let Node::Range(range) = arena.node(range_id) else {
                continue;
            };
            let Node::Entity(entity) = arena.node(range.entity) else {
                continue;
            };
            let table = self.schema.table_name(&entity.name)?;
            let binding = format!("{table} AS {}", range.name);

            match range.join_condition {
                None => {
                    if base.is_none() {
                        base = Some(binding);
                    } else {
                        joins.push(format!("CROSS JOIN {binding}"));
                    }
                }
                Some(condition) => {
                    let mut generator = SqlGenerator::new(
                        arena,
                        self.schema,
                        &mut parameters,
                        QueryPart::Join,
                        &mut search_seq,
                    );
                    generator.visit(condition)?;
                    let join_kind = if range.required {
                        "INNER JOIN"
                    } else {
                        "LEFT JOIN"
                    };
                    joins.push(format!(
                        "{join_kind} {binding} ON {}",
                        generator.into_sql()
                    ));
                }
            }
        }

        let base = base.ok_or_else(|| {
            Error::generate("no base range: every range declares a join condition")
        })?;
        sql.push_str(" FROM ");
        sql.push_str(&base);
        for join in joins {
            sql.push(' ');
            sql.push_str(&join);
        }

        if let Some(conditions) = retrieve.conditions {
            let mut generator = SqlGenerator::new(
                arena,
                self.schema,
                &mut parameters,
                QueryPart::Where,
                &mut search_seq,
            );
            generator.visit(conditions)?;
            sql.push_str(" WHERE ");
            sql.push_str(&generator.into_sql());
        }

        if !retrieve.sort.is_empty() {
            let mut generator = SqlGenerator::new(
                arena,
                self.schema,
                &mut parameters,
                QueryPart::Sort,
                &mut search_seq,
            );
            let mut entries = Vec::new();
            for entry in &retrieve.sort {
                generator.visit(entry.expr)?;
                let mut fragment = generator.take();
                if fragment.is_empty() {
                    continue;
                }
                match entry.direction {
                    SortDirection::Asc => fragment.push_str(" ASC"),
                    SortDirection::Desc => fragment.push_str(" DESC"),
                    SortDirection::Unspecified => {}
                }
                entries.push(fragment);
            }
            if !entries.is_empty() {
                sql.push_str(" ORDER BY ");
                sql.push_str(&entries.join(", "));
            }
        }

        Ok(CompiledQuery { sql, parameters })
    }
}
