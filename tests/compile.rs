//! End-to-End Compilation Tests
//!
//! Compiles QUEL source through the full pipeline (lexer, parser,
//! generator) against an in-memory schema and checks the produced SQL and
//! parameter tables.

use once_cell::sync::Lazy;
use quel_sql::{compile, ColumnDef, CompiledQuery, Error, MappingSchema};

static SCHEMA: Lazy<MappingSchema> = Lazy::new(|| {
    MappingSchema::new()
        .with_entity(
            "Product",
            "products",
            vec![
                ColumnDef::new("id", "product_id").numeric().identifier(),
                ColumnDef::new("name", "name"),
                ColumnDef::new("description", "description").nullable(),
                ColumnDef::new("price", "unit_price").numeric().nullable(),
                ColumnDef::new("stock", "stock").numeric(),
            ],
        )
        .with_entity(
            "OrderLine",
            "order_lines",
            vec![
                ColumnDef::new("id", "line_id").numeric().identifier(),
                ColumnDef::new("productId", "product_id").numeric(),
                ColumnDef::new("quantity", "quantity").numeric(),
            ],
        )
});

fn ok(source: &str) -> CompiledQuery {
    compile(source, &*SCHEMA).unwrap_or_else(|e| panic!("compile failed for {source:?}: {e}"))
}

// ============================================================================
// Determinism
// ============================================================================

mod determinism {
    use super::*;

    #[test]
    fn test_same_source_compiles_identically() {
        let source = "range of x is Product; \
                      retrieve (x.id, x.name) \
                      where search(x.name, x.description, \"apple +fresh -rotten\") \
                      sort by x.price desc";
        let first = ok(source);
        let second = ok(source);

        assert_eq!(first.sql, second.sql);
        assert_eq!(first.parameters, second.parameters);
    }

    #[test]
    fn test_sequential_reuse_of_schema() {
        // A fresh lexer/parser/generator set per compilation; the schema
        // collaborator is reused across them
        let a = ok("range of x is Product; retrieve (x.id)");
        let b = ok("range of x is Product; retrieve (x.name)");
        assert_ne!(a.sql, b.sql);
    }
}

// ============================================================================
// Basic retrieval
// ============================================================================

mod retrieval {
    use super::*;

    #[test]
    fn test_round_trip_identifier_and_literal() {
        let compiled = ok("range of x is Product; retrieve (x.id) where x.id = 1537");
        assert_eq!(
            compiled.sql,
            "SELECT x.product_id FROM products AS x WHERE x.product_id = 1537"
        );
        assert!(compiled.parameters.is_empty());
    }

    #[test]
    fn test_value_order_is_output_column_order() {
        let compiled = ok("range of x is Product; retrieve (x.name, x.id, x.stock)");
        assert_eq!(
            compiled.sql,
            "SELECT x.name, x.product_id, x.stock FROM products AS x"
        );
    }

    #[test]
    fn test_entity_value_emits_labeled_columns() {
        let compiled = ok("range of x is Product; retrieve (x)");
        assert_eq!(
            compiled.sql,
            "SELECT x.product_id as `x.id`,x.name as `x.name`,\
             x.description as `x.description`,x.unit_price as `x.price`,\
             x.stock as `x.stock` FROM products AS x"
        );
    }

    #[test]
    fn test_unique_emits_distinct() {
        let compiled = ok("range of x is Product; retrieve unique (x.name)");
        assert_eq!(compiled.sql, "SELECT DISTINCT x.name FROM products AS x");
    }

    #[test]
    fn test_bound_parameter_passes_through() {
        let compiled =
            ok("range of x is Product; retrieve (x.id) where x.price > :min_price");
        assert_eq!(
            compiled.sql,
            "SELECT x.product_id FROM products AS x WHERE x.unit_price > :min_price"
        );
        // Caller-bound parameters are not registered by the compiler
        assert!(compiled.parameters.is_empty());
    }

    #[test]
    fn test_arithmetic_precedence() {
        let compiled =
            ok("range of x is Product; retrieve (x.id) where x.price * 2 + 1 < 10");
        assert_eq!(
            compiled.sql,
            "SELECT x.product_id FROM products AS x WHERE x.unit_price * 2 + 1 < 10"
        );
    }

    #[test]
    fn test_float_literal_is_emitted_verbatim() {
        let compiled = ok("range of x is Product; retrieve (x.id) where x.price = 3.25");
        assert!(compiled.sql.ends_with("WHERE x.unit_price = 3.25"));
    }
}

// ============================================================================
// Joins
// ============================================================================

mod joins {
    use super::*;
    use quel_sql::{generate, parse};

    const JOINED: &str = "range of p is Product; \
                          range of o is OrderLine via o.productId = p.id; \
                          retrieve (p.id, o.quantity)";

    #[test]
    fn test_via_range_left_joins_by_default() {
        let compiled = ok(JOINED);
        assert_eq!(
            compiled.sql,
            "SELECT p.product_id, o.quantity FROM products AS p \
             LEFT JOIN order_lines AS o ON o.product_id = p.product_id"
        );
    }

    #[test]
    fn test_required_range_inner_joins() {
        let mut query = parse(JOINED).unwrap();
        query.set_range_required("o", true).unwrap();
        let compiled = generate(&query, &*SCHEMA).unwrap();
        assert!(compiled.sql.contains("INNER JOIN order_lines AS o ON"));
    }

    #[test]
    fn test_condition_less_ranges_cross_join() {
        let compiled = ok("range of p is Product; range of o is OrderLine; \
                           retrieve (p.id, o.id)");
        assert_eq!(
            compiled.sql,
            "SELECT p.product_id, o.line_id FROM products AS p \
             CROSS JOIN order_lines AS o"
        );
    }
}

// ============================================================================
// Pattern rewrites
// ============================================================================

mod patterns {
    use super::*;

    #[test]
    fn test_wildcard_string_rewrites_to_like() {
        let compiled = ok("range of x is Product; retrieve (x.id) where x.name = \"Jo*n\"");
        assert_eq!(
            compiled.sql,
            "SELECT x.product_id FROM products AS x WHERE x.name LIKE \"Jo%n\""
        );
    }

    #[test]
    fn test_question_mark_becomes_single_char_wildcard() {
        let compiled = ok("range of x is Product; retrieve (x.id) where x.name != \"Jo?n\"");
        assert!(compiled.sql.ends_with("WHERE x.name NOT LIKE \"Jo_n\""));
    }

    #[test]
    fn test_literal_pattern_characters_are_escaped() {
        let compiled =
            ok("range of x is Product; retrieve (x.id) where x.name = \"50%_off*\"");
        assert!(compiled.sql.ends_with("WHERE x.name LIKE \"50\\%\\_off%\""));
    }

    #[test]
    fn test_plain_string_equality_is_untouched() {
        let compiled = ok("range of x is Product; retrieve (x.id) where x.name = \"John\"");
        assert!(compiled.sql.ends_with("WHERE x.name = \"John\""));
    }

    #[test]
    fn test_regex_literal_rewrites_to_regexp() {
        let compiled = ok("range of x is Product; retrieve (x.id) where x.name = `^Jo.*n$`");
        assert!(compiled.sql.ends_with("WHERE x.name REGEXP \"^Jo.*n$\""));

        let compiled =
            ok("range of x is Product; retrieve (x.id) where x.name != `^Jo.*n$`");
        assert!(compiled.sql.ends_with("WHERE x.name NOT REGEXP \"^Jo.*n$\""));
    }
}

// ============================================================================
// Sorting
// ============================================================================

mod sorting {
    use super::*;

    #[test]
    fn test_nullable_numeric_sort_coalesces_to_zero() {
        let compiled = ok("range of x is Product; retrieve (x.id) sort by x.price");
        assert!(compiled.sql.ends_with("ORDER BY COALESCE(x.unit_price, 0)"));
    }

    #[test]
    fn test_nullable_text_sort_coalesces_to_empty_string() {
        let compiled = ok("range of x is Product; retrieve (x.id) sort by x.description");
        assert!(compiled
            .sql
            .ends_with("ORDER BY COALESCE(x.description, '')"));
    }

    #[test]
    fn test_non_nullable_sort_is_bare_column() {
        let compiled = ok("range of x is Product; retrieve (x.id) sort by x.name");
        assert!(compiled.sql.ends_with("ORDER BY x.name"));
    }

    #[test]
    fn test_directions() {
        let compiled = ok("range of x is Product; \
                           retrieve (x.id) sort by x.name asc, x.stock desc, x.id");
        assert!(compiled
            .sql
            .ends_with("ORDER BY x.name ASC, x.stock DESC, x.product_id"));
    }

    #[test]
    fn test_nullable_coalesce_only_applies_to_sort() {
        // The same identifier in the where clause stays bare
        let compiled = ok("range of x is Product; \
                           retrieve (x.id) where x.price > 1 sort by x.price");
        assert!(compiled.sql.contains("WHERE x.unit_price > 1"));
        assert!(compiled.sql.ends_with("ORDER BY COALESCE(x.unit_price, 0)"));
    }
}

// ============================================================================
// Macros and shared nodes
// ============================================================================

mod macros {
    use super::*;

    #[test]
    fn test_duplicate_macro_name_is_an_error() {
        let result = compile(
            "range of x is Product; retrieve (a = x.id, a = x.name)",
            &*SCHEMA,
        );
        assert!(matches!(result, Err(Error::Syntax { .. })));
    }

    #[test]
    fn test_macro_shared_between_values_and_condition() {
        // The identical node instance is referenced from the value list and
        // the condition; each part renders it once
        let compiled =
            ok("range of x is Product; retrieve (total = x.price) where total > 10");
        assert_eq!(
            compiled.sql,
            "SELECT x.unit_price FROM products AS x WHERE x.unit_price > 10"
        );
        assert!(compiled.parameters.is_empty());
    }

    #[test]
    fn test_macro_shared_in_sort() {
        let compiled =
            ok("range of x is Product; retrieve (total = x.price) sort by total desc");
        assert!(compiled
            .sql
            .ends_with("ORDER BY COALESCE(x.unit_price, 0) DESC"));
    }
}

// ============================================================================
// Counting
// ============================================================================

mod counting {
    use super::*;

    #[test]
    fn test_count_entity_uses_identifier_column() {
        let compiled = ok("range of x is Product; retrieve (count(x))");
        assert_eq!(
            compiled.sql,
            "SELECT COUNT(x.product_id) FROM products AS x"
        );
    }

    #[test]
    fn test_ucount_differs_only_by_distinct() {
        let count = ok("range of x is Product; retrieve (count(x))");
        let ucount = ok("range of x is Product; retrieve (ucount(x))");
        assert_eq!(
            ucount.sql,
            count.sql.replace("COUNT(", "COUNT(DISTINCT ")
        );
    }

    #[test]
    fn test_count_property() {
        let compiled = ok("range of x is Product; retrieve (ucount(x.name))");
        assert_eq!(
            compiled.sql,
            "SELECT COUNT(DISTINCT x.name) FROM products AS x"
        );
    }
}

// ============================================================================
// Predicates
// ============================================================================

mod predicates {
    use super::*;

    #[test]
    fn test_in_list() {
        let compiled =
            ok("range of x is Product; retrieve (x.id) where x.id in (1, 2, :three)");
        assert!(compiled.sql.ends_with("WHERE x.product_id IN(1,2,:three)"));
    }

    #[test]
    fn test_null_checks() {
        let compiled =
            ok("range of x is Product; retrieve (x.id) where x.description is null");
        assert!(compiled.sql.ends_with("WHERE x.description IS NULL"));

        let compiled =
            ok("range of x is Product; retrieve (x.id) where x.description is not null");
        assert!(compiled.sql.ends_with("WHERE x.description IS NOT NULL"));
    }

    #[test]
    fn test_is_empty_on_identifier() {
        let compiled =
            ok("range of x is Product; retrieve (x.id) where is_empty(x.description)");
        assert!(compiled.sql.ends_with(
            "WHERE (x.description IS NULL OR x.description = '' OR x.description = 0)"
        ));
    }

    #[test]
    fn test_is_empty_constant_folds_literals() {
        let zero = ok("range of x is Product; retrieve (x.id) where is_empty(0)");
        assert!(zero.sql.ends_with("WHERE 1"));

        let blank = ok("range of x is Product; retrieve (x.id) where is_empty(\"\")");
        assert!(blank.sql.ends_with("WHERE 1"));

        let nonzero = ok("range of x is Product; retrieve (x.id) where is_empty(5)");
        assert!(nonzero.sql.ends_with("WHERE 0"));
    }

    #[test]
    fn test_is_numeric_on_identifier() {
        let compiled =
            ok("range of x is Product; retrieve (x.id) where is_numeric(x.name)");
        assert!(compiled
            .sql
            .ends_with("WHERE x.name REGEXP '^-?[0-9]*\\.?[0-9]+$'"));
    }

    #[test]
    fn test_is_numeric_constant_folds_numbers() {
        let compiled = ok("range of x is Product; retrieve (x.id) where is_numeric(42)");
        assert!(compiled.sql.ends_with("WHERE 1"));
    }

    #[test]
    fn test_logical_connectives_and_not() {
        let compiled = ok("range of x is Product; \
                           retrieve (x.id) where not x.stock = 0 and x.price > 1 or x.id = 7");
        assert!(compiled.sql.ends_with(
            "WHERE NOT x.stock = 0 AND x.unit_price > 1 OR x.product_id = 7"
        ));
    }

    #[test]
    fn test_concat() {
        let compiled =
            ok("range of x is Product; retrieve (concat(x.name, \" \", x.description))");
        assert_eq!(
            compiled.sql,
            "SELECT CONCAT(x.name,\" \",x.description) FROM products AS x"
        );
    }
}

// ============================================================================
// Search
// ============================================================================

mod search {
    use super::*;

    #[test]
    fn test_search_builds_grouped_clauses() {
        let compiled = ok("range of x is Product; retrieve (x.id) \
                           where search(x.name, x.description, \"apple +fresh -rotten\")");
        assert!(compiled.sql.ends_with(
            "WHERE (\
             ((x.name LIKE :or_terms0_0_0) AND (x.name LIKE :and_terms0_0_0) \
             AND (x.name NOT LIKE :not_terms0_0_0)) \
             OR \
             ((x.description LIKE :or_terms0_1_0) AND (x.description LIKE :and_terms0_1_0) \
             AND (x.description NOT LIKE :not_terms0_1_0))\
             )"
        ));

        assert_eq!(compiled.parameters.len(), 6);
        assert_eq!(compiled.parameters["or_terms0_0_0"], "%apple%");
        assert_eq!(compiled.parameters["and_terms0_1_0"], "%fresh%");
        assert_eq!(compiled.parameters["not_terms0_1_0"], "%rotten%");
    }

    #[test]
    fn test_search_skips_empty_groups() {
        let compiled = ok("range of x is Product; retrieve (x.id) \
                           where search(x.name, \"apple pear\")");
        assert!(compiled.sql.ends_with(
            "WHERE (((x.name LIKE :or_terms0_0_0 OR x.name LIKE :or_terms0_0_1)))"
        ));
        assert_eq!(compiled.parameters.len(), 2);
    }

    #[test]
    fn test_two_searches_get_distinct_parameter_names() {
        let compiled = ok("range of x is Product; retrieve (x.id) \
                           where search(x.name, \"apple\") or search(x.description, \"pear\")");
        assert_eq!(compiled.parameters.len(), 2);
        assert_eq!(compiled.parameters["or_terms0_0_0"], "%apple%");
        assert_eq!(compiled.parameters["or_terms1_0_0"], "%pear%");
    }
}

// ============================================================================
// Errors
// ============================================================================

mod errors {
    use super::*;
    use quel_sql::parse;

    #[test]
    fn test_malformed_number_is_a_lexical_error() {
        // Fails in the lexer, before any AST exists
        let result = parse("range of x is Product; retrieve (x.id) where x.id = 3.14.15");
        assert!(matches!(result, Err(Error::Lex { .. })));
    }

    #[test]
    fn test_unterminated_string_is_a_lexical_error() {
        let result = parse("range of x is Product; retrieve (x.id) where x.name = \"abc");
        assert!(matches!(result, Err(Error::Lex { .. })));
    }

    #[test]
    fn test_regex_in_value_list_is_a_syntax_error() {
        let result = compile("range of x is Product; retrieve (`^a.*`)", &*SCHEMA);
        assert!(matches!(result, Err(Error::Syntax { .. })));
    }

    #[test]
    fn test_unknown_range_is_a_syntax_error() {
        let result = compile("range of x is Product; retrieve (y.id)", &*SCHEMA);
        assert!(matches!(result, Err(Error::Syntax { .. })));
    }

    #[test]
    fn test_unknown_entity_is_a_generation_error() {
        let result = compile("range of x is Thing; retrieve (x.id)", &*SCHEMA);
        assert!(matches!(result, Err(Error::Generate(_))));
    }

    #[test]
    fn test_unknown_property_is_a_generation_error() {
        let result = compile("range of x is Product; retrieve (x.weight)", &*SCHEMA);
        assert!(matches!(result, Err(Error::Generate(_))));
    }

    #[test]
    fn test_errors_carry_the_source_line() {
        let result = compile(
            "range of x is Product;\nretrieve (x.id) where x.id = @",
            &*SCHEMA,
        );
        match result {
            Err(Error::Syntax { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected syntax error with line, got {other:?}"),
        }
    }

    #[test]
    fn test_no_partial_output_on_error() {
        // A failing compile yields only the error; nothing of the statement
        let result = compile(
            "range of x is Product; retrieve (x.id) where x.weight = 1",
            &*SCHEMA,
        );
        assert!(result.is_err());
    }
}
