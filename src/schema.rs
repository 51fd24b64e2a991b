//! Entity schema collaborator
//!
//! The generator never touches a database: it asks a [`Schema`] to map
//! entity and property names to table and column names, and for the little
//! per-column metadata the NULL-safe sort rule needs. [`MappingSchema`] is
//! the in-memory implementation used by tests and by callers that describe
//! their entities directly.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Errors that can occur during schema lookups
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SchemaError {
    #[error("unknown entity: {0}")]
    UnknownEntity(String),

    #[error("unknown property: {property} on entity {entity}")]
    UnknownProperty { entity: String, property: String },

    #[error("entity {0} has no identifier column")]
    NoIdentifier(String),
}

/// Result type for schema operations
pub type SchemaResult<T> = Result<T, SchemaError>;

/// One mapped column of an entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDef {
    /// Property name on the entity side
    pub property: String,
    /// Column name on the table side
    pub column: String,
    /// Whether the column admits NULL
    pub nullable: bool,
    /// Whether the column's SQL type is numeric
    pub numeric: bool,
    /// Whether the column is part of the entity's primary identifier
    pub identifier: bool,
}

impl ColumnDef {
    /// A non-nullable, non-numeric, non-identifier column.
    pub fn new(property: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            column: column.into(),
            nullable: false,
            numeric: false,
            identifier: false,
        }
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn numeric(mut self) -> Self {
        self.numeric = true;
        self
    }

    pub fn identifier(mut self) -> Self {
        self.identifier = true;
        self
    }
}

/// Abstract trait mapping entities to tables and properties to columns
pub trait Schema {
    /// The table an entity is stored in
    fn table_name(&self, entity: &str) -> SchemaResult<&str>;

    /// The entity's ordered property-to-column mapping
    fn column_map(&self, entity: &str) -> SchemaResult<&[ColumnDef]>;

    /// The entity's primary-identifier column name(s)
    fn identifier_columns(&self, entity: &str) -> SchemaResult<Vec<&str>>;

    /// Metadata for a single property
    fn column(&self, entity: &str, property: &str) -> SchemaResult<&ColumnDef>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct EntityMapping {
    table: String,
    columns: Vec<ColumnDef>,
}

/// A mapping-based schema implementation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MappingSchema {
    entities: HashMap<String, EntityMapping>,
}

impl MappingSchema {
    /// Create a new empty schema
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an entity mapping. Column order is preserved: it
    /// determines the emission order when a whole entity is retrieved.
    pub fn add_entity(
        &mut self,
        entity: impl Into<String>,
        table: impl Into<String>,
        columns: Vec<ColumnDef>,
    ) {
        self.entities.insert(
            entity.into(),
            EntityMapping {
                table: table.into(),
                columns,
            },
        );
    }

    /// Builder-style variant of [`MappingSchema::add_entity`].
    pub fn with_entity(
        mut self,
        entity: impl Into<String>,
        table: impl Into<String>,
        columns: Vec<ColumnDef>,
    ) -> Self {
        self.add_entity(entity, table, columns);
        self
    }

    fn mapping(&self, entity: &str) -> SchemaResult<&EntityMapping> {
        self.entities
            .get(entity)
            .ok_or_else(|| SchemaError::UnknownEntity(entity.to_string()))
    }
}

impl Schema for MappingSchema {
    fn table_name(&self, entity: &str) -> SchemaResult<&str> {
        Ok(&self.mapping(entity)?.table)
    }

    fn column_map(&self, entity: &str) -> SchemaResult<&[ColumnDef]> {
        Ok(&self.mapping(entity)?.columns)
    }

    fn identifier_columns(&self, entity: &str) -> SchemaResult<Vec<&str>> {
        let columns: Vec<&str> = self
            .mapping(entity)?
            .columns
            .iter()
            .filter(|c| c.identifier)
            .map(|c| c.column.as_str())
            .collect();

        if columns.is_empty() {
            return Err(SchemaError::NoIdentifier(entity.to_string()));
        }
        Ok(columns)
    }

    fn column(&self, entity: &str, property: &str) -> SchemaResult<&ColumnDef> {
        self.mapping(entity)?
            .columns
            .iter()
            .find(|c| c.property == property)
            .ok_or_else(|| SchemaError::UnknownProperty {
                entity: entity.to_string(),
                property: property.to_string(),
            })
    }
}
