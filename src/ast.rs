//! QUEL abstract syntax tree
//!
//! The AST is stored as an arena of nodes addressed by [`NodeId`]. Child
//! links are plain indices, which makes two things cheap that a boxed tree
//! makes awkward: the same node instance can be referenced from more than
//! one parent (a macro used both as a value and inside a condition), and
//! the generator can memoize visited nodes by id instead of by object
//! identity. The [`Query`] produced by the parser owns the arena together
//! with the root `Retrieve` node.
//!
//! [`Node`] is a closed enum with one variant per node kind; the generator
//! dispatches with an exhaustive `match`, so adding a kind without adding
//! its handler fails to compile.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Stable index of a node inside its arena, assigned at construction.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct NodeId(u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Sort direction of one `sort by` entry.
///
/// `Unspecified` entries emit no direction keyword and rely on SQL's
/// ascending default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Unspecified,
    Asc,
    Desc,
}

/// One entry of the `sort by` clause
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SortEntry {
    pub expr: NodeId,
    pub direction: SortDirection,
}

/// Comparison operators. `=`/`==` normalize to `Eq`, `!=`/`<>` to `Neq`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
}

impl CompareOp {
    pub fn sql(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Neq => "<>",
            CompareOp::Lt => "<",
            CompareOp::Lte => "<=",
            CompareOp::Gt => ">",
            CompareOp::Gte => ">=",
        }
    }
}

/// Additive operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TermOp {
    Add,
    Sub,
}

impl TermOp {
    pub fn sql(self) -> &'static str {
        match self {
            TermOp::Add => "+",
            TermOp::Sub => "-",
        }
    }
}

/// Multiplicative operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactorOp {
    Mul,
    Div,
}

impl FactorOp {
    pub fn sql(self) -> &'static str {
        match self {
            FactorOp::Mul => "*",
            FactorOp::Div => "/",
        }
    }
}

/// The root of one compiled query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Retrieve {
    /// Ranges bound before the `retrieve` keyword, in declaration order
    pub ranges: Vec<NodeId>,
    /// Retrieved values; order determines output column order
    pub values: Vec<NodeId>,
    /// Optional `where` condition
    pub conditions: Option<NodeId>,
    /// `sort by` entries in source order
    pub sort: Vec<SortEntry>,
    /// Named sub-expressions introduced by `name = expr`, insertion order
    pub macros: Vec<(String, NodeId)>,
    /// True when the query carries the `unique` flag (SQL DISTINCT)
    pub unique: bool,
}

impl Retrieve {
    pub fn new(ranges: Vec<NodeId>, unique: bool) -> Self {
        Self {
            ranges,
            values: Vec::new(),
            conditions: None,
            sort: Vec::new(),
            macros: Vec::new(),
            unique,
        }
    }

    /// Look up a macro by name.
    pub fn macro_named(&self, name: &str) -> Option<NodeId> {
        self.macros
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, id)| *id)
    }
}

/// A named binding of an alias to an entity.
///
/// `required=true` means an inner join, `false` a left join. The range
/// exclusively owns its entity node; allocate both through
/// [`Arena::alloc_range`] so the entity's back-link is wired correctly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Range {
    pub name: String,
    pub entity: NodeId,
    pub join_condition: Option<NodeId>,
    pub required: bool,
}

/// Names a retrieved expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alias {
    pub name: String,
    pub expression: NodeId,
}

/// References a mapped table. Holds a non-owning back-link to the range
/// that owns it, used during generation to recover the range alias.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub name: String,
    pub range: Option<NodeId>,
}

/// A property reference. `parent` is the owning [`Entity`] or, for dotted
/// chains, another identifier; resolution walks parent links to a range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identifier {
    pub name: String,
    pub parent: NodeId,
}

/// Left/right pair of a logical connective
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Logical {
    pub left: NodeId,
    pub right: NodeId,
}

/// Comparison node (the `Expression` precedence tier)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    pub op: CompareOp,
    pub left: NodeId,
    pub right: NodeId,
}

/// Additive node
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Term {
    pub op: TermOp,
    pub left: NodeId,
    pub right: NodeId,
}

/// Multiplicative node
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Factor {
    pub op: FactorOp,
    pub left: NodeId,
    pub right: NodeId,
}

/// `count(..)` / `ucount(..)` target: an entity or a property identifier
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Count {
    pub target: NodeId,
}

/// `in (..)` containment check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct In {
    pub identifier: NodeId,
    pub values: Vec<NodeId>,
}

/// `concat(..)` argument list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Concat {
    pub arguments: Vec<NodeId>,
}

/// Fuzzy search over one or more identifiers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Search {
    pub identifiers: Vec<NodeId>,
    pub terms: SearchTerms,
}

/// A raw search string split into its three term groups.
///
/// `+term` lands in the AND group, `-term` in the NOT group, bare terms in
/// the OR group. Double-quoted phrases keep embedded whitespace.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchTerms {
    pub or_terms: Vec<String>,
    pub and_terms: Vec<String>,
    pub not_terms: Vec<String>,
}

impl SearchTerms {
    /// Split a raw search string into term groups.
    pub fn parse(raw: &str) -> Self {
        let mut terms = SearchTerms::default();
        let chars: Vec<char> = raw.chars().collect();
        let mut pos = 0;

        while pos < chars.len() {
            while pos < chars.len() && chars[pos].is_whitespace() {
                pos += 1;
            }
            if pos >= chars.len() {
                break;
            }

            let group = match chars[pos] {
                '+' => {
                    pos += 1;
                    &mut terms.and_terms
                }
                '-' => {
                    pos += 1;
                    &mut terms.not_terms
                }
                _ => &mut terms.or_terms,
            };

            let term = if pos < chars.len() && chars[pos] == '"' {
                pos += 1;
                let start = pos;
                while pos < chars.len() && chars[pos] != '"' {
                    pos += 1;
                }
                let phrase: String = chars[start..pos].iter().collect();
                if pos < chars.len() {
                    pos += 1; // closing quote
                }
                phrase
            } else {
                let start = pos;
                while pos < chars.len() && !chars[pos].is_whitespace() {
                    pos += 1;
                }
                chars[start..pos].iter().collect()
            };

            if !term.is_empty() {
                group.push(term);
            }
        }

        terms
    }
}

/// One QUEL AST node.
///
/// The tree is not strictly a tree: macros make the same node instance
/// reachable from more than one parent, which is why children are ids
/// rather than owned boxes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Node {
    Retrieve(Retrieve),
    Range(Range),
    Alias(Alias),
    Entity(Entity),
    Identifier(Identifier),

    And(Logical),
    Or(Logical),
    Expression(Comparison),
    Term(Term),
    Factor(Factor),
    Not { operand: NodeId },

    Null,
    Bool(bool),
    /// Raw numeric lexeme, emitted verbatim
    Number(String),
    Str(String),
    RegExp(String),
    Parameter(String),

    Count(Count),
    UCount(Count),
    IsEmpty { value: NodeId },
    IsNumeric { value: NodeId },
    CheckNull { expr: NodeId },
    CheckNotNull { expr: NodeId },
    In(In),
    Concat(Concat),
    Search(Search),
}

/// Flat node storage. Ids are assigned in allocation order and never move.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Arena {
    nodes: Vec<Node>,
}

impl Arena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    /// Allocate a range and its entity together, wiring the entity's
    /// back-link. The entity is never constructed apart from its range.
    pub fn alloc_range(
        &mut self,
        name: impl Into<String>,
        entity_name: impl Into<String>,
    ) -> NodeId {
        let entity = self.alloc(Node::Entity(Entity {
            name: entity_name.into(),
            range: None,
        }));
        let range = self.alloc(Node::Range(Range {
            name: name.into(),
            entity,
            join_condition: None,
            required: false,
        }));
        if let Node::Entity(e) = self.node_mut(entity) {
            e.range = Some(range);
        }
        range
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.index()]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// A parsed query: the arena plus the root `Retrieve` node.
///
/// Built once by the parser, walked once by the generator, then discarded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    arena: Arena,
    root: NodeId,
}

impl Query {
    pub(crate) fn new(arena: Arena, root: NodeId) -> Self {
        Self { arena, root }
    }

    pub fn arena(&self) -> &Arena {
        &self.arena
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// The root retrieve node.
    pub fn retrieve(&self) -> &Retrieve {
        match self.arena.node(self.root) {
            Node::Retrieve(r) => r,
            _ => unreachable!("query root is always a retrieve node"),
        }
    }

    /// Promote a range to a required (inner) join. Join promotion is a
    /// planner concern; the grammar itself never sets the flag.
    pub fn set_range_required(&mut self, range_alias: &str, required: bool) -> Result<()> {
        let ranges = self.retrieve().ranges.clone();
        for id in ranges {
            let found =
                matches!(self.arena.node(id), Node::Range(range) if range.name == range_alias);
            if found {
                if let Node::Range(range) = self.arena.node_mut(id) {
                    range.required = required;
                }
                return Ok(());
            }
        }
        Err(Error::generate(format!("unknown range: {range_alias}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arena_ids_are_stable() {
        let mut arena = Arena::new();
        let a = arena.alloc(Node::Number("1".into()));
        let b = arena.alloc(Node::Str("x".into()));
        assert_eq!(a.index(), 0);
        assert_eq!(b.index(), 1);
        assert_eq!(arena.node(a), &Node::Number("1".into()));
    }

    #[test]
    fn test_alloc_range_wires_back_link() {
        let mut arena = Arena::new();
        let range_id = arena.alloc_range("p", "Product");

        let range = match arena.node(range_id) {
            Node::Range(r) => r,
            other => panic!("expected range, got {other:?}"),
        };
        assert_eq!(range.name, "p");
        assert!(!range.required);

        match arena.node(range.entity) {
            Node::Entity(e) => {
                assert_eq!(e.name, "Product");
                assert_eq!(e.range, Some(range_id));
            }
            other => panic!("expected entity, got {other:?}"),
        }
    }

    #[test]
    fn test_macro_lookup_keeps_first_definition() {
        let mut retrieve = Retrieve::new(Vec::new(), false);
        let mut arena = Arena::new();
        let one = arena.alloc(Node::Number("1".into()));
        retrieve.macros.push(("total".into(), one));

        assert_eq!(retrieve.macro_named("total"), Some(one));
        assert_eq!(retrieve.macro_named("missing"), None);
    }

    #[test]
    fn test_search_terms_groups() {
        let terms = SearchTerms::parse("apple +banana -cherry");
        assert_eq!(terms.or_terms, vec!["apple"]);
        assert_eq!(terms.and_terms, vec!["banana"]);
        assert_eq!(terms.not_terms, vec!["cherry"]);
    }

    #[test]
    fn test_search_terms_quoted_phrase() {
        let terms = SearchTerms::parse("+\"red apple\" pear -\"rotten core\"");
        assert_eq!(terms.and_terms, vec!["red apple"]);
        assert_eq!(terms.or_terms, vec!["pear"]);
        assert_eq!(terms.not_terms, vec!["rotten core"]);
    }

    #[test]
    fn test_search_terms_empty_input() {
        let terms = SearchTerms::parse("   ");
        assert!(terms.or_terms.is_empty());
        assert!(terms.and_terms.is_empty());
        assert!(terms.not_terms.is_empty());
    }
}
