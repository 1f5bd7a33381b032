//! Computed-column trigger emission.
//!
//! Targets PostgreSQL 11, which has no generated columns: each `computed`
//! field gets a trigger function assigning the expression to `NEW.<col>`
//! before insert and update, plus the trigger wiring it to the table.

use crate::ident::{IdentifierService, quote};
use crate::ir::{Field, Table};
use crate::postgres::grammar::clamp_identifier;

/// A computed-column pair: the trigger function and its trigger.
#[derive(Debug, Clone, PartialEq)]
pub struct ComputedColumn {
    /// Bare function name, for GRANT EXECUTE.
    pub function_name: String,
    pub function_sql: String,
    pub drop_trigger_sql: String,
    pub create_trigger_sql: String,
    /// UID of the computed field, for evidence records.
    pub field_uid: String,
}

/// Expand all computed columns of a table, field order.
pub fn expand(table: &Table, ids: &IdentifierService) -> Vec<ComputedColumn> {
    let sql_table = ids.table(&table.name);
    let quoted_table = quote(&sql_table);
    let mut out = Vec::new();
    for field in table.columns() {
        let Some(expr) = field.computed_expr() else {
            continue;
        };
        out.push(expand_field(field, &sql_table, &quoted_table, expr, ids));
    }
    out
}

fn expand_field(
    field: &Field,
    sql_table: &str,
    quoted_table: &str,
    expr: &str,
    ids: &IdentifierService,
) -> ComputedColumn {
    let column = ids.column(&field.name);
    let function_name = clamp_identifier(&format!("{sql_table}_compute_{column}"));
    let function_ref = ids.quote_if_needed(&function_name);
    let trigger_name = clamp_identifier(&format!("trg_{sql_table}_{column}"));
    let trigger_q = quote(&trigger_name);
    let column_q = quote(&column);

    let function_sql = format!(
        "CREATE OR REPLACE FUNCTION {function_ref}() RETURNS trigger LANGUAGE plpgsql AS $$\nBEGIN\n  NEW.{column_q} := {expr};\n  RETURN NEW;\nEND;\n$$;"
    );
    let drop_trigger_sql = format!("DROP TRIGGER IF EXISTS {trigger_q} ON {quoted_table};");
    let create_trigger_sql = format!(
        "CREATE TRIGGER {trigger_q} BEFORE INSERT OR UPDATE ON {quoted_table} FOR EACH ROW EXECUTE FUNCTION {function_ref}();"
    );

    ComputedColumn {
        function_name,
        function_sql,
        drop_trigger_sql,
        create_trigger_sql,
        field_uid: field.uid.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ident::IdentifierStrategy;
    use crate::ir::build;
    use crate::parser::parse_document;

    #[test]
    fn computed_field_emits_function_and_trigger() {
        let out = build(
            &parse_document(
                r#"type User @table {
                     id: ID! @primaryKey
                     first: String!
                     display: String @computed(expr: "lower(NEW.first)")
                   }"#,
            )
            .unwrap(),
        )
        .unwrap();
        let ids = IdentifierService::new(IdentifierStrategy::Preserve);
        let computed = expand(&out.schema.tables[0], &ids);
        assert_eq!(computed.len(), 1);
        let c = &computed[0];
        assert_eq!(c.function_name, "Users_compute_display");
        assert!(c.function_sql.contains("NEW.\"display\" := lower(NEW.first);"));
        assert!(c.create_trigger_sql.contains("BEFORE INSERT OR UPDATE ON \"Users\""));
        assert!(c.drop_trigger_sql.starts_with("DROP TRIGGER IF EXISTS"));
    }

    #[test]
    fn plain_fields_emit_nothing() {
        let out = build(
            &parse_document("type User @table { id: ID! @primaryKey }").unwrap(),
        )
        .unwrap();
        let ids = IdentifierService::new(IdentifierStrategy::Preserve);
        assert!(expand(&out.schema.tables[0], &ids).is_empty());
    }
}
