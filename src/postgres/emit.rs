//! DDL emitter.
//!
//! Produces the full DDL program for a schema in a deterministic order:
//! per table, the CREATE TABLE with columns then constraints, comments
//! carrying UIDs, deduplicated indexes, the RLS block, and computed-column
//! triggers. Every fragment is recorded on the evidence map.

use crate::config::CompileConfig;
use crate::error::RlsError;
use crate::evidence::{ArtifactKind, EvidenceMap, EvidenceNote, EvidenceRecord, LineRange, sha256_hex};
use crate::ident::{IdentifierService, quote};
use crate::ir::annotations;
use crate::ir::{Field, IndexRequest, Schema, Table};
use crate::parser::Value;
use crate::postgres::dedup::{IndexDecision, IndexDeduplicator};
use crate::postgres::grammar::{clamp_identifier, column_sql_type, scalar_sql_type};
use crate::postgres::{rls, triggers};
use std::collections::HashSet;

/// Name of the bootstrap DDL artifact.
pub const DDL_FILE: &str = "schema.sql";

// =============================================================================
// Script Builder
// =============================================================================

/// An artifact under construction, tracking line numbers for evidence.
#[derive(Debug, Clone, Default)]
pub struct SqlScript {
    pub file_name: String,
    lines: Vec<String>,
}

impl SqlScript {
    pub fn new(file_name: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            lines: Vec::new(),
        }
    }

    /// Append a statement (possibly spanning lines); returns its line range.
    pub fn push_statement(&mut self, sql: &str) -> LineRange {
        let start = self.lines.len() + 1;
        for line in sql.split('\n') {
            self.lines.push(line.to_string());
        }
        LineRange {
            start,
            end: self.lines.len(),
        }
    }

    /// Append a `-- comment` line.
    pub fn push_comment(&mut self, text: &str) -> LineRange {
        self.push_statement(&format!("-- {text}"))
    }

    pub fn push_blank(&mut self) {
        self.lines.push(String::new());
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// The artifact text. Every statement ends with `;\n`.
    pub fn text(&self) -> String {
        if self.lines.is_empty() {
            return String::new();
        }
        let mut out = self.lines.join("\n");
        out.push('\n');
        out
    }
}

// =============================================================================
// Emitter
// =============================================================================

/// Emits the DDL program for a schema.
pub struct DdlEmitter<'a> {
    config: &'a CompileConfig,
    ids: IdentifierService,
}

impl<'a> DdlEmitter<'a> {
    pub fn new(config: &'a CompileConfig) -> Self {
        Self {
            config,
            ids: IdentifierService::new(config.identifier_strategy),
        }
    }

    pub fn identifiers(&self) -> &IdentifierService {
        &self.ids
    }

    /// Emit the whole DDL program, recording evidence per fragment.
    pub fn emit_schema(
        &self,
        schema: &Schema,
        evidence: &mut EvidenceMap,
    ) -> Result<SqlScript, RlsError> {
        let mut script = SqlScript::new(DDL_FILE);
        let mut emitted_helpers: HashSet<String> = HashSet::new();
        for (i, table) in schema.tables.iter().enumerate() {
            if i > 0 {
                script.push_blank();
            }
            self.emit_table(table, &mut script, evidence, &mut emitted_helpers)?;
        }
        Ok(script)
    }

    fn emit_table(
        &self,
        table: &Table,
        script: &mut SqlScript,
        evidence: &mut EvidenceMap,
        emitted_helpers: &mut HashSet<String>,
    ) -> Result<(), RlsError> {
        let sql_table = self.ids.table(&table.name);
        let quoted_table = quote(&sql_table);

        // 1. CREATE TABLE with columns then constraints.
        let create = self.create_table_sql(table, true);
        let range = script.push_statement(&create);
        record(evidence, &table.uid, script, range, &create);

        // 2. Table comment carrying the identity tag.
        let table_comment = format!(
            "COMMENT ON TABLE {quoted_table} IS '{}';",
            comment_text(&table.uid)
        );
        let range = script.push_statement(&table_comment);
        record(evidence, &table.uid, script, range, &table_comment);

        // 3. Column comments.
        for field in table.columns() {
            let column_comment = format!(
                "COMMENT ON COLUMN {quoted_table}.{} IS '{}';",
                quote(&self.ids.column(&field.name)),
                comment_text(&field.uid)
            );
            let range = script.push_statement(&column_comment);
            record(evidence, &field.uid, script, range, &column_comment);
        }

        // 4. Indexes, deduplicated.
        let mut dedup = IndexDeduplicator::for_table(table);
        for request in &table.indexes {
            self.emit_index(table, request, &mut dedup, false, script, evidence);
        }

        // 5. RLS block.
        if self.config.enable_rls {
            if let Some(expansion) = rls::expand(table, &self.ids)? {
                self.emit_rls(table, expansion, &mut dedup, script, evidence, emitted_helpers);
            }
        }

        // 6. Computed-column triggers.
        for computed in triggers::expand(table, &self.ids) {
            let range = script.push_statement(&computed.function_sql);
            record(evidence, &computed.field_uid, script, range, &computed.function_sql);
            self.emit_grants(table, &computed.function_name, "", script, evidence);
            let range = script.push_statement(&computed.drop_trigger_sql);
            record(evidence, &computed.field_uid, script, range, &computed.drop_trigger_sql);
            let range = script.push_statement(&computed.create_trigger_sql);
            record(evidence, &computed.field_uid, script, range, &computed.create_trigger_sql);
        }

        Ok(())
    }

    fn emit_rls(
        &self,
        table: &Table,
        expansion: rls::RlsExpansion,
        dedup: &mut IndexDeduplicator,
        script: &mut SqlScript,
        evidence: &mut EvidenceMap,
        emitted_helpers: &mut HashSet<String>,
    ) {
        for warning in &expansion.warnings {
            evidence.record_warning(
                &table.uid,
                EvidenceNote {
                    message: warning.clone(),
                    context: Some(table.name.clone()),
                },
            );
        }
        for helper in &expansion.helper_functions {
            // Helpers are shared per membership/hierarchy table; emit once.
            if !emitted_helpers.insert(helper.name.clone()) {
                continue;
            }
            let range = script.push_statement(&helper.sql);
            record(evidence, &table.uid, script, range, &helper.sql);
            self.emit_grants(table, &helper.name, helper.arg_signature, script, evidence);
        }
        for view in &expansion.views {
            if !emitted_helpers.insert(view.name.clone()) {
                continue;
            }
            let range = script.push_statement(&view.sql);
            record(evidence, &table.uid, script, range, &view.sql);
        }
        for sql in [&expansion.enable_sql, &expansion.force_sql] {
            let range = script.push_statement(sql);
            record(evidence, &table.uid, script, range, sql);
        }
        for policy in &expansion.policies {
            let range = script.push_statement(&policy.drop_sql);
            record(evidence, &table.uid, script, range, &policy.drop_sql);
            let range = script.push_statement(&policy.create_sql);
            record(evidence, &table.uid, script, range, &policy.create_sql);
        }
        for request in &expansion.index_requests {
            self.emit_index(table, request, dedup, false, script, evidence);
        }
    }

    /// Emit a GRANT EXECUTE for each role in the table's `grant` annotation.
    fn emit_grants(
        &self,
        table: &Table,
        function_name: &str,
        arg_signature: &str,
        script: &mut SqlScript,
        evidence: &mut EvidenceMap,
    ) {
        let Some(ann) = table.annotation(annotations::GRANT) else {
            return;
        };
        let roles = ann
            .str_list_arg("roles")
            .or_else(|| match ann.positional() {
                Some(Value::String(s)) | Some(Value::Enum(s)) => Some(vec![s.clone()]),
                _ => None,
            })
            .unwrap_or_default();
        if roles.is_empty() {
            return;
        }
        let role_list = roles
            .iter()
            .map(|r| self.ids.quote_if_needed(r))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "GRANT EXECUTE ON FUNCTION {}({arg_signature}) TO {role_list};",
            self.ids.quote_if_needed(function_name)
        );
        let range = script.push_statement(&sql);
        record(evidence, &table.uid, script, range, &sql);
    }

    fn emit_index(
        &self,
        table: &Table,
        request: &IndexRequest,
        dedup: &mut IndexDeduplicator,
        concurrently: bool,
        script: &mut SqlScript,
        evidence: &mut EvidenceMap,
    ) {
        match dedup.evaluate(request) {
            IndexDecision::Skip { reason } => {
                script.push_comment(&format!("Skipped redundant index: {reason}"));
            }
            IndexDecision::Emit => {
                let sql_table = self.ids.table(&table.name);
                let (name, sql) = self.index_sql(&sql_table, request, concurrently);
                let uid = index_uid(&table.name, request);
                let range = script.push_statement(&sql);
                record(evidence, &uid, script, range, &sql);

                let comment = format!(
                    "COMMENT ON INDEX {} IS '{}';",
                    quote(&name),
                    comment_text(&uid)
                );
                let range = script.push_statement(&comment);
                record(evidence, &uid, script, range, &comment);
            }
        }
    }

    /// Build the CREATE INDEX statement; returns `(name, sql)`.
    pub fn index_sql(
        &self,
        sql_table: &str,
        request: &IndexRequest,
        concurrently: bool,
    ) -> (String, String) {
        let sql_columns: Vec<String> = request
            .columns
            .iter()
            .map(|c| self.ids.column(c))
            .collect();
        let name = clamp_identifier(
            &request
                .name
                .clone()
                .unwrap_or_else(|| self.ids.index_name(sql_table, &sql_columns)),
        );
        let unique = if request.unique { "UNIQUE " } else { "" };
        let concurrent = if concurrently { "CONCURRENTLY " } else { "" };
        let using = match request.method.as_deref() {
            Some(method) => format!("USING {method} "),
            None => String::new(),
        };
        let columns = sql_columns
            .iter()
            .map(|c| quote(c))
            .collect::<Vec<_>>()
            .join(", ");
        let where_clause = match request.where_clause.as_deref() {
            Some(predicate) => format!(" WHERE {predicate}"),
            None => String::new(),
        };
        let sql = format!(
            "CREATE {unique}INDEX {concurrent}IF NOT EXISTS {} ON {} {using}({columns}){where_clause};",
            quote(&name),
            quote(sql_table),
        );
        (name, sql)
    }

    /// The CREATE TABLE statement: columns, then constraints, one line.
    ///
    /// `include_fks` is false when the planner routes foreign keys through
    /// the NOT VALID / VALIDATE pair instead of inline constraints.
    pub fn create_table_sql(&self, table: &Table, include_fks: bool) -> String {
        let sql_table = self.ids.table(&table.name);
        let mut items: Vec<String> = Vec::new();

        for field in table.columns() {
            items.push(self.column_def(field));
        }

        let pk: Vec<String> = table
            .primary_key_columns()
            .into_iter()
            .map(|c| quote(&self.ids.column(c)))
            .collect();
        if !pk.is_empty() {
            items.push(format!("PRIMARY KEY ({})", pk.join(", ")));
        }
        for group in table.unique_groups() {
            let cols = group
                .into_iter()
                .map(|c| quote(&self.ids.column(c)))
                .collect::<Vec<_>>()
                .join(", ");
            items.push(format!("UNIQUE ({cols})"));
        }
        if include_fks {
            for fk in &table.foreign_keys {
                items.push(format!(
                    "FOREIGN KEY ({}) REFERENCES {} ({}) ON DELETE NO ACTION",
                    quote(&self.ids.column(&fk.column)),
                    quote(&self.ids.table(&fk.ref_table)),
                    quote(&self.ids.column(&fk.ref_column)),
                ));
            }
        }
        for field in table.columns() {
            if field.list && field.item_non_null {
                let base = scalar_sql_type(&field.base_type).unwrap_or("text");
                items.push(format!(
                    "CHECK (NOT {} @> ARRAY[NULL]::{base}[])",
                    quote(&self.ids.column(&field.name))
                ));
            }
            if let Some(ann) = field.annotation(annotations::CHECK) {
                if let Some(expr) = ann
                    .str_arg("expr")
                    .or_else(|| ann.positional().and_then(Value::as_str))
                {
                    items.push(format!("CHECK ({expr})"));
                }
            }
        }

        format!(
            "CREATE TABLE IF NOT EXISTS {} ( {} );",
            quote(&sql_table),
            items.join(", ")
        )
    }

    /// One column declaration: name, type, NOT NULL, DEFAULT.
    pub fn column_def(&self, field: &Field) -> String {
        let sql_type = column_sql_type(&field.base_type, field.list)
            .unwrap_or_else(|| "text".to_string());
        let mut def = format!("{} {sql_type}", quote(&self.ids.column(&field.name)));
        if field.non_null {
            def.push_str(" NOT NULL");
        }
        if let Some(default) = field.default_expr() {
            def.push_str(&format!(" DEFAULT {default}"));
        }
        def
    }
}

/// Deterministic index identity tag, derived from source names.
pub fn index_uid(table_name: &str, request: &IndexRequest) -> String {
    format!(
        "idx_{}_{}",
        table_name.to_lowercase(),
        request
            .columns
            .iter()
            .map(|c| c.to_lowercase())
            .collect::<Vec<_>>()
            .join("_")
    )
}

fn comment_text(uid: &str) -> String {
    format!("uid: {}", uid.replace('\'', "''"))
}

fn record(
    evidence: &mut EvidenceMap,
    uid: &str,
    script: &SqlScript,
    range: LineRange,
    fragment: &str,
) {
    evidence.record(
        uid,
        ArtifactKind::Sql,
        EvidenceRecord {
            file: script.file_name.clone(),
            lines: range,
            sha: sha256_hex(fragment),
        },
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::build;
    use crate::parser::parse_document;

    fn emit(src: &str) -> (String, EvidenceMap) {
        let config = CompileConfig::default();
        let out = build(&parse_document(src).unwrap()).unwrap();
        let mut evidence = EvidenceMap::new();
        let script = DdlEmitter::new(&config)
            .emit_schema(&out.schema, &mut evidence)
            .unwrap();
        (script.text(), evidence)
    }

    #[test]
    fn bootstrap_single_table() {
        let (ddl, _) = emit(
            r#"type User @table {
                 id: ID! @primaryKey
                 email: String! @unique
               }"#,
        );
        assert!(ddl.starts_with(
            "CREATE TABLE IF NOT EXISTS \"Users\" ( \"id\" uuid NOT NULL, \"email\" text NOT NULL, PRIMARY KEY (\"id\"), UNIQUE (\"email\") );\n"
        ));
        assert!(ddl.contains("COMMENT ON TABLE \"Users\" IS 'uid: tbl_user';"));
        assert!(ddl.contains("COMMENT ON COLUMN \"Users\".\"id\" IS 'uid: fld_user_id';"));
        assert!(!ddl.contains("ROW LEVEL SECURITY"));
    }

    #[test]
    fn redundant_index_becomes_comment() {
        let (ddl, _) = emit(
            r#"type User @table {
                 id: ID! @primaryKey @index
               }"#,
        );
        assert!(ddl.contains(
            "-- Skipped redundant index: Index on id is covered by primary key on id"
        ));
        assert!(!ddl.contains("CREATE INDEX"));
    }

    #[test]
    fn partial_index_survives_and_is_commented() {
        let (ddl, evidence) = emit(
            r#"type User @table {
                 id: ID! @primaryKey @index(where: "id IS NOT NULL")
               }"#,
        );
        assert!(ddl.contains(
            "CREATE INDEX IF NOT EXISTS \"idx_Users_id\" ON \"Users\" (\"id\") WHERE id IS NOT NULL;"
        ));
        assert!(ddl.contains("COMMENT ON INDEX \"idx_Users_id\" IS 'uid: idx_user_id';"));
        assert!(evidence.get("idx_user_id").is_some());
    }

    #[test]
    fn list_item_non_null_adds_check() {
        let (ddl, _) = emit(
            r#"type Post @table {
                 id: ID! @primaryKey
                 tags: [String!]
               }"#,
        );
        assert!(ddl.contains("\"tags\" text[]"));
        assert!(ddl.contains("CHECK (NOT \"tags\" @> ARRAY[NULL]::text[])"));
    }

    #[test]
    fn virtual_and_skipped_fields_emit_no_columns() {
        let (ddl, _) = emit(
            r#"type Org @table {
                 id: ID! @primaryKey
                 users: [ID!] @hasMany
                 scratch: String @skip
               }"#,
        );
        assert!(!ddl.contains("users"));
        assert!(!ddl.contains("scratch"));
    }

    #[test]
    fn rls_block_is_ordered() {
        let (ddl, _) = emit(
            r#"type Doc @table @rls(preset: "owner") {
                 id: ID! @primaryKey
                 created_by: ID!
               }"#,
        );
        let enable = ddl.find("ENABLE ROW LEVEL SECURITY").unwrap();
        let force = ddl.find("FORCE ROW LEVEL SECURITY").unwrap();
        let policy = ddl.find("CREATE POLICY").unwrap();
        assert!(enable < force && force < policy);
        // The owner preset requests an index on the owner column.
        assert!(ddl.contains("CREATE INDEX IF NOT EXISTS \"idx_Docs_created_by\""));
    }

    #[test]
    fn enable_rls_false_suppresses_block() {
        let config = CompileConfig {
            enable_rls: false,
            ..CompileConfig::default()
        };
        let out = build(
            &parse_document(r#"type Doc @table @rls { id: ID! @primaryKey }"#).unwrap(),
        )
        .unwrap();
        let mut evidence = EvidenceMap::new();
        let script = DdlEmitter::new(&config)
            .emit_schema(&out.schema, &mut evidence)
            .unwrap();
        assert!(!script.text().contains("ROW LEVEL SECURITY"));
    }

    #[test]
    fn shared_helpers_emit_once() {
        let (ddl, _) = emit(
            r#"type A @table @rls(preset: "tenant", membership_table: "memberships") {
                 id: ID! @primaryKey
                 tenant_id: ID!
               }
               type B @table @rls(preset: "tenant", membership_table: "memberships") {
                 id: ID! @primaryKey
                 tenant_id: ID!
               }"#,
        );
        assert_eq!(ddl.matches("CREATE OR REPLACE FUNCTION rls_memberships_member").count(), 1);
    }

    #[test]
    fn grant_annotation_covers_helper_functions() {
        let (ddl, _) = emit(
            r#"type A @table @grant(roles: [app_user]) @rls(preset: "tenant", membership_table: "memberships") {
                 id: ID! @primaryKey
                 tenant_id: ID!
               }"#,
        );
        assert!(ddl.contains("GRANT EXECUTE ON FUNCTION rls_memberships_member(uuid) TO app_user;"));
    }

    #[test]
    fn emission_is_deterministic() {
        let src = r#"type User @table @rls(preset: "owner") {
                       id: ID! @primaryKey
                       created_by: ID!
                       email: String! @unique @index
                     }"#;
        assert_eq!(emit(src).0, emit(src).0);
    }
}
