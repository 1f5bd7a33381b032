//! Additive diff engine.
//!
//! Compares a persisted prior snapshot with the current one and produces
//! forward-only change steps: new tables, added columns, new indexes, new
//! foreign keys. Dropped objects, renames and type changes are reported as
//! diagnostics, never as steps.

use crate::error::DiffError;
use crate::ir::{ForeignKeyRef, IndexRequest};
use crate::postgres::dedup::{IndexDecision, IndexDeduplicator, IndexSignature};
use crate::snapshot::{FieldSnapshot, Snapshot, TableSnapshot};
use crate::version::is_supported_version;
use std::collections::HashSet;

/// One additive change, carrying the source-level definition it came from.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeStep {
    CreateTable {
        table: TableSnapshot,
    },
    AddColumn {
        table: String,
        field: FieldSnapshot,
    },
    CreateIndexConcurrently {
        table: String,
        request: IndexRequest,
    },
    AddFkNotValid {
        table: String,
        fk: ForeignKeyRef,
    },
    ValidateFk {
        table: String,
        column: String,
    },
}

/// The additive step set plus side-channel messages.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AdditiveDiff {
    pub steps: Vec<ChangeStep>,
    /// Index requests elided by redundancy analysis, with their rationale.
    pub notices: Vec<String>,
    /// Destructive or unsupported differences, reported but never planned.
    pub diagnostics: Vec<String>,
}

impl AdditiveDiff {
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Compute the additive change set from `prev` to `cur`.
pub fn diff(prev: &Snapshot, cur: &Snapshot) -> Result<AdditiveDiff, DiffError> {
    if !is_supported_version(&prev.ir_version) {
        return Err(DiffError::UnsupportedIrVersion(prev.ir_version.clone()));
    }

    let mut out = AdditiveDiff::default();

    for table in &cur.tables {
        match prev.table(&table.name) {
            None => diff_new_table(table, &mut out),
            Some(prev_table) => diff_existing_table(prev_table, table, &mut out),
        }
    }

    for prev_table in &prev.tables {
        if cur.table(&prev_table.name).is_none() {
            out.diagnostics.push(format!(
                "table '{}' was removed; drops are out of scope for the additive planner",
                prev_table.name
            ));
        }
    }

    Ok(out)
}

fn diff_new_table(table: &TableSnapshot, out: &mut AdditiveDiff) {
    out.steps.push(ChangeStep::CreateTable {
        table: table.clone(),
    });

    let ir_table = table.to_table();
    let mut dedup = IndexDeduplicator::for_table(&ir_table);
    for request in &table.indexes {
        push_index_step(&table.name, request, &mut dedup, out);
    }
    for fk in &table.foreign_keys {
        push_fk_steps(&table.name, fk, out);
    }
}

fn diff_existing_table(prev: &TableSnapshot, cur: &TableSnapshot, out: &mut AdditiveDiff) {
    // Added columns. Only fields that materialize as columns count.
    for field in &cur.fields {
        if !field.to_field().emits_column() {
            continue;
        }
        match prev.field(&field.name) {
            None => out.steps.push(ChangeStep::AddColumn {
                table: cur.name.clone(),
                field: field.clone(),
            }),
            Some(prev_field) => {
                if prev_field.base != field.base
                    || prev_field.list != field.list
                    || prev_field.non_null != field.non_null
                    || prev_field.item_non_null != field.item_non_null
                {
                    out.diagnostics.push(format!(
                        "column '{}.{}' changed shape; type changes are out of scope for the additive planner",
                        cur.name, field.name
                    ));
                }
            }
        }
    }
    for prev_field in &prev.fields {
        if prev_field.to_field().emits_column() && cur.field(&prev_field.name).is_none() {
            out.diagnostics.push(format!(
                "column '{}.{}' was removed; drops are out of scope for the additive planner",
                prev.name, prev_field.name
            ));
        }
    }

    // Added index signatures, run through redundancy analysis against the
    // current constraint inventory. Signatures already present in the prior
    // snapshot are seeded as seen so near-duplicates are skipped with a
    // recorded rationale.
    let prev_signatures: HashSet<IndexSignature> = prev
        .indexes
        .iter()
        .map(|r| IndexSignature::of(&prev.name, r))
        .collect();
    let ir_table = cur.to_table();
    let mut dedup = IndexDeduplicator::for_table(&ir_table);
    for request in &cur.indexes {
        if prev_signatures.contains(&IndexSignature::of(&cur.name, request)) {
            continue;
        }
        push_index_step(&cur.name, request, &mut dedup, out);
    }

    // Added foreign keys.
    for fk in &cur.foreign_keys {
        if !prev.foreign_keys.contains(fk) {
            push_fk_steps(&cur.name, fk, out);
        }
    }
    for prev_fk in &prev.foreign_keys {
        if !cur.foreign_keys.contains(prev_fk) {
            out.diagnostics.push(format!(
                "foreign key on '{}.{}' was removed; drops are out of scope for the additive planner",
                prev.name, prev_fk.column
            ));
        }
    }
}

fn push_index_step(
    table: &str,
    request: &IndexRequest,
    dedup: &mut IndexDeduplicator,
    out: &mut AdditiveDiff,
) {
    match dedup.evaluate(request) {
        IndexDecision::Emit => out.steps.push(ChangeStep::CreateIndexConcurrently {
            table: table.to_string(),
            request: request.clone(),
        }),
        IndexDecision::Skip { reason } => {
            out.notices.push(format!("Skipped redundant index: {reason}"));
        }
    }
}

fn push_fk_steps(table: &str, fk: &ForeignKeyRef, out: &mut AdditiveDiff) {
    out.steps.push(ChangeStep::AddFkNotValid {
        table: table.to_string(),
        fk: fk.clone(),
    });
    out.steps.push(ChangeStep::ValidateFk {
        table: table.to_string(),
        column: fk.column.clone(),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::build;
    use crate::parser::parse_document;

    fn snapshot(src: &str) -> Snapshot {
        Snapshot::from_schema(&build(&parse_document(src).unwrap()).unwrap().schema)
    }

    const BASE: &str = r#"type User @table {
        id: ID! @primaryKey
        email: String! @unique
    }"#;

    #[test]
    fn identical_snapshots_diff_empty() {
        let a = snapshot(BASE);
        let b = snapshot(BASE);
        let d = diff(&a, &b).unwrap();
        assert!(d.is_empty());
        assert!(d.diagnostics.is_empty());
    }

    #[test]
    fn added_column_is_one_step() {
        let prev = snapshot(BASE);
        let cur = snapshot(
            r#"type User @table {
                 id: ID! @primaryKey
                 email: String! @unique
                 created_at: DateTime! @default(expr: "now()")
               }"#,
        );
        let d = diff(&prev, &cur).unwrap();
        assert_eq!(d.steps.len(), 1);
        assert!(matches!(
            &d.steps[0],
            ChangeStep::AddColumn { table, field } if table == "User" && field.name == "created_at"
        ));
    }

    #[test]
    fn new_table_emits_table_then_indexes_then_fk_pairs() {
        let prev = snapshot(BASE);
        let cur = snapshot(&format!(
            "{BASE}\ntype Post @table {{
               id: ID! @primaryKey
               author_id: ID! @foreignKey(ref: \"User.id\")
               title: String! @index
             }}"
        ));
        let d = diff(&prev, &cur).unwrap();
        let kinds: Vec<&str> = d
            .steps
            .iter()
            .map(|s| match s {
                ChangeStep::CreateTable { .. } => "create_table",
                ChangeStep::AddColumn { .. } => "add_column",
                ChangeStep::CreateIndexConcurrently { .. } => "cic",
                ChangeStep::AddFkNotValid { .. } => "add_fk",
                ChangeStep::ValidateFk { .. } => "validate_fk",
            })
            .collect();
        assert_eq!(kinds, ["create_table", "cic", "add_fk", "validate_fk"]);
    }

    #[test]
    fn redundant_new_index_becomes_notice() {
        let prev = snapshot(BASE);
        let cur = snapshot(
            r#"type User @table {
                 id: ID! @primaryKey @index
                 email: String! @unique
               }"#,
        );
        let d = diff(&prev, &cur).unwrap();
        assert!(d.is_empty());
        assert_eq!(
            d.notices,
            vec!["Skipped redundant index: Index on id is covered by primary key on id"]
        );
    }

    #[test]
    fn destructive_changes_become_diagnostics_only() {
        let prev = snapshot(&format!(
            "{BASE}\ntype Post @table {{ id: ID! @primaryKey }}"
        ));
        let cur = snapshot(
            r#"type User @table {
                 id: ID! @primaryKey
                 email: Int!
               }"#,
        );
        let d = diff(&prev, &cur).unwrap();
        assert!(d.steps.is_empty());
        assert_eq!(d.diagnostics.len(), 2);
        assert!(d.diagnostics[0].contains("changed shape"));
        assert!(d.diagnostics[1].contains("removed"));
    }

    #[test]
    fn unsupported_prior_version_is_fatal() {
        let mut prev = snapshot(BASE);
        prev.ir_version = "0.0.1".to_string();
        let cur = snapshot(BASE);
        assert_eq!(
            diff(&prev, &cur).unwrap_err(),
            DiffError::UnsupportedIrVersion("0.0.1".to_string())
        );
    }
}
