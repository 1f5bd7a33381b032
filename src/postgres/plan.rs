//! Migration planner.
//!
//! Packages the additive step set into two ordered phases — *expand*
//! (non-blocking forward changes) and *validate* (constraint validation) —
//! labels every step with its PostgreSQL lock level and transactional
//! marker, and renders the per-phase SQL. The planner never reorders steps
//! and never enforces anything; labels are directives to the executor.

use crate::config::CompileConfig;
use crate::error::PlannerError;
use crate::evidence::{ArtifactKind, EvidenceMap, EvidenceRecord, sha256_hex};
use crate::ident::quote;
use crate::postgres::diff::{AdditiveDiff, ChangeStep};
use crate::postgres::emit::{DdlEmitter, SqlScript, index_uid};
use crate::postgres::grammar::{clamp_identifier, column_sql_type};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashSet;

/// File names of the phase artifacts.
pub const EXPAND_FILE: &str = "001_expand.sql";
pub const VALIDATE_FILE: &str = "002_validate.sql";

/// PostgreSQL lock levels, ordered by strength.
#[derive(Serialize, Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum LockLevel {
    AccessShare,
    RowShare,
    RowExclusive,
    ShareUpdateExclusive,
    Share,
    ShareRowExclusive,
    Exclusive,
    AccessExclusive,
}

impl LockLevel {
    pub const fn as_str(self) -> &'static str {
        match self {
            LockLevel::AccessShare => "ACCESS SHARE",
            LockLevel::RowShare => "ROW SHARE",
            LockLevel::RowExclusive => "ROW EXCLUSIVE",
            LockLevel::ShareUpdateExclusive => "SHARE UPDATE EXCLUSIVE",
            LockLevel::Share => "SHARE",
            LockLevel::ShareRowExclusive => "SHARE ROW EXCLUSIVE",
            LockLevel::Exclusive => "EXCLUSIVE",
            LockLevel::AccessExclusive => "ACCESS EXCLUSIVE",
        }
    }

    /// Whether this lock blocks concurrent writes.
    pub const fn blocks_writes(self) -> bool {
        matches!(
            self,
            LockLevel::ShareRowExclusive | LockLevel::Exclusive | LockLevel::AccessExclusive
        )
    }

    /// Whether this lock blocks concurrent reads.
    pub const fn blocks_reads(self) -> bool {
        matches!(self, LockLevel::AccessExclusive)
    }
}

/// Which migration file a step lands in.
#[derive(Serialize, Copy, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PlanPhase {
    Expand,
    Validate,
}

/// Whether the executor runs a step inside the batch transaction.
#[derive(Serialize, Copy, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TxnMarker {
    Transactional,
    NonTransactional,
}

/// Step kind discriminator.
#[derive(Serialize, Copy, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    CreateTable,
    AddColumn,
    CreateIndexConcurrently,
    AddFkNotValid,
    ValidateFk,
}

impl StepKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            StepKind::CreateTable => "create_table",
            StepKind::AddColumn => "add_column",
            StepKind::CreateIndexConcurrently => "create_index_concurrently",
            StepKind::AddFkNotValid => "add_fk_not_valid",
            StepKind::ValidateFk => "validate_fk",
        }
    }
}

/// A fully labeled migration step.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct PlannedStep {
    pub id: String,
    pub kind: StepKind,
    /// SQL table name.
    pub table: String,
    /// SQL column names touched by this step.
    pub columns: Vec<String>,
    pub phase: PlanPhase,
    pub txn: TxnMarker,
    pub lock: LockLevel,
    pub sql: String,
    /// SQL the executor must run after a failure of this step.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cleanup_sql: Option<String>,
    /// At most one concurrent index build per table.
    pub per_table_exclusivity: bool,
    /// Whether this step may coexist with steps on other tables.
    pub parallelizable: bool,
    /// UID of the source element, for evidence records.
    #[serde(skip)]
    pub uid: String,
}

/// The planned migration: ordered steps plus executor directives.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MigrationPlan {
    pub steps: Vec<PlannedStep>,
    /// Redundant-index notices, rendered as comments in the expand file.
    pub notices: Vec<String>,
    pub diagnostics: Vec<String>,
    /// Key for `pg_advisory_xact_lock`, a digest of the plan's statements.
    pub advisory_lock_key: i64,
    pub lock_timeout_ms: u64,
    pub statement_timeout_ms: u64,
}

impl MigrationPlan {
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    fn phase_steps(&self, phase: PlanPhase) -> impl Iterator<Item = &PlannedStep> {
        self.steps.iter().filter(move |s| s.phase == phase)
    }

    /// Render the expand phase, recording evidence per statement.
    pub fn render_expand(&self, evidence: &mut EvidenceMap) -> SqlScript {
        let mut script = SqlScript::new(EXPAND_FILE);
        for notice in &self.notices {
            script.push_comment(notice);
        }
        for step in self.phase_steps(PlanPhase::Expand) {
            let range = script.push_statement(&step.sql);
            evidence.record(
                &step.uid,
                ArtifactKind::Migration,
                EvidenceRecord {
                    file: EXPAND_FILE.to_string(),
                    lines: range,
                    sha: sha256_hex(&step.sql),
                },
            );
        }
        script
    }

    /// Render the validate phase, recording evidence per statement.
    pub fn render_validate(&self, evidence: &mut EvidenceMap) -> SqlScript {
        let mut script = SqlScript::new(VALIDATE_FILE);
        for step in self.phase_steps(PlanPhase::Validate) {
            let range = script.push_statement(&step.sql);
            evidence.record(
                &step.uid,
                ArtifactKind::Migration,
                EvidenceRecord {
                    file: VALIDATE_FILE.to_string(),
                    lines: range,
                    sha: sha256_hex(&step.sql),
                },
            );
        }
        script
    }

    /// Canonical JSON of the step taxonomy, for the operator boundary.
    pub fn report_json(&self) -> String {
        let mut out =
            serde_json::to_string_pretty(&self.steps).unwrap_or_else(|_| "[]".to_string());
        out.push('\n');
        out
    }
}

/// Turns an additive diff into a labeled, phased plan.
pub struct MigrationPlanner<'a> {
    config: &'a CompileConfig,
    emitter: DdlEmitter<'a>,
}

impl<'a> MigrationPlanner<'a> {
    pub fn new(config: &'a CompileConfig) -> Self {
        Self {
            config,
            emitter: DdlEmitter::new(config),
        }
    }

    pub fn plan(&self, diff: &AdditiveDiff) -> Result<MigrationPlan, PlannerError> {
        let mut steps = Vec::new();
        let mut pending_fks: HashSet<(String, String)> = HashSet::new();

        for (i, change) in diff.steps.iter().enumerate() {
            let id = format!("step_{:03}", i + 1);
            let step = match change {
                ChangeStep::CreateTable { table } => {
                    let ir_table = table.to_table();
                    let ids = self.emitter.identifiers();
                    PlannedStep {
                        id,
                        kind: StepKind::CreateTable,
                        table: ids.table(&table.name),
                        columns: Vec::new(),
                        phase: PlanPhase::Expand,
                        txn: TxnMarker::Transactional,
                        lock: LockLevel::AccessExclusive,
                        // FKs are routed through the NOT VALID pair.
                        sql: self.emitter.create_table_sql(&ir_table, false),
                        cleanup_sql: None,
                        per_table_exclusivity: false,
                        parallelizable: false,
                        uid: table.uid.clone(),
                    }
                }
                ChangeStep::AddColumn { table, field } => {
                    let ids = self.emitter.identifiers();
                    let sql_table = ids.table(table);
                    let column = ids.column(&field.name);
                    let ir_field = field.to_field();
                    let sql_type = column_sql_type(&field.base, field.list)
                        .unwrap_or_else(|| "text".to_string());
                    let default = ir_field.default_expr();
                    // Non-null with a default rides the metadata-only DEFAULT
                    // path (v11+) and lands nullable, tightened in a later
                    // run. Non-null without a default has to take the table
                    // rewrite lock.
                    let (tail_clause, lock) = match (&default, field.non_null) {
                        (Some(expr), true) => {
                            (format!(" DEFAULT {expr}"), LockLevel::ShareRowExclusive)
                        }
                        (None, true) => (" NOT NULL".to_string(), LockLevel::AccessExclusive),
                        (_, false) => (String::new(), LockLevel::ShareRowExclusive),
                    };
                    PlannedStep {
                        id,
                        kind: StepKind::AddColumn,
                        table: sql_table.clone(),
                        columns: vec![column.clone()],
                        phase: PlanPhase::Expand,
                        txn: TxnMarker::Transactional,
                        lock,
                        sql: format!(
                            "ALTER TABLE {} ADD COLUMN {} {sql_type}{tail_clause};",
                            quote(&sql_table),
                            quote(&column),
                        ),
                        cleanup_sql: None,
                        per_table_exclusivity: false,
                        parallelizable: false,
                        uid: field.uid.clone(),
                    }
                }
                ChangeStep::CreateIndexConcurrently { table, request } => {
                    let ids = self.emitter.identifiers();
                    let sql_table = ids.table(table);
                    let (name, sql) = self.emitter.index_sql(&sql_table, request, true);
                    PlannedStep {
                        id,
                        kind: StepKind::CreateIndexConcurrently,
                        table: sql_table,
                        columns: request.columns.iter().map(|c| ids.column(c)).collect(),
                        phase: PlanPhase::Expand,
                        txn: TxnMarker::NonTransactional,
                        lock: LockLevel::ShareUpdateExclusive,
                        sql,
                        cleanup_sql: Some(format!(
                            "DROP INDEX CONCURRENTLY IF EXISTS {};",
                            quote(&name)
                        )),
                        per_table_exclusivity: true,
                        parallelizable: true,
                        uid: index_uid(table, request),
                    }
                }
                ChangeStep::AddFkNotValid { table, fk } => {
                    let ids = self.emitter.identifiers();
                    let sql_table = ids.table(table);
                    let column = ids.column(&fk.column);
                    let constraint =
                        clamp_identifier(&ids.constraint_name(&sql_table, &column, "fk"));
                    pending_fks.insert((table.clone(), fk.column.clone()));
                    PlannedStep {
                        id,
                        kind: StepKind::AddFkNotValid,
                        table: sql_table.clone(),
                        columns: vec![column.clone()],
                        phase: PlanPhase::Expand,
                        txn: TxnMarker::Transactional,
                        lock: LockLevel::ShareRowExclusive,
                        sql: format!(
                            "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({}) NOT VALID;",
                            quote(&sql_table),
                            quote(&constraint),
                            quote(&column),
                            quote(&ids.table(&fk.ref_table)),
                            quote(&ids.column(&fk.ref_column)),
                        ),
                        cleanup_sql: None,
                        per_table_exclusivity: false,
                        parallelizable: false,
                        uid: fk_uid(table, &fk.column),
                    }
                }
                ChangeStep::ValidateFk { table, column } => {
                    if !pending_fks.contains(&(table.clone(), column.clone())) {
                        return Err(PlannerError::OrphanValidate {
                            table: table.clone(),
                            column: column.clone(),
                        });
                    }
                    let ids = self.emitter.identifiers();
                    let sql_table = ids.table(table);
                    let sql_column = ids.column(column);
                    let constraint =
                        clamp_identifier(&ids.constraint_name(&sql_table, &sql_column, "fk"));
                    PlannedStep {
                        id,
                        kind: StepKind::ValidateFk,
                        table: sql_table.clone(),
                        columns: vec![sql_column],
                        phase: PlanPhase::Validate,
                        txn: TxnMarker::Transactional,
                        lock: LockLevel::ShareRowExclusive,
                        sql: format!(
                            "ALTER TABLE {} VALIDATE CONSTRAINT {};",
                            quote(&sql_table),
                            quote(&constraint),
                        ),
                        cleanup_sql: None,
                        per_table_exclusivity: false,
                        parallelizable: false,
                        uid: fk_uid(table, column),
                    }
                }
            };
            steps.push(step);
        }

        let advisory_lock_key = advisory_key(&steps);
        Ok(MigrationPlan {
            steps,
            notices: diff.notices.clone(),
            diagnostics: diff.diagnostics.clone(),
            advisory_lock_key,
            lock_timeout_ms: self.config.lock_timeout_ms,
            statement_timeout_ms: self.config.statement_timeout_ms,
        })
    }
}

/// Deterministic identity tag for a foreign key, from source names.
fn fk_uid(table: &str, column: &str) -> String {
    format!("fk_{}_{}", table.to_lowercase(), column.to_lowercase())
}

/// Advisory-lock key: first eight bytes of the SHA-256 over the plan's
/// statements, interpreted big-endian.
fn advisory_key(steps: &[PlannedStep]) -> i64 {
    let mut hasher = Sha256::new();
    for step in steps {
        hasher.update(step.sql.as_bytes());
        hasher.update(b"\n");
    }
    let digest = hasher.finalize();
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    i64::from_be_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::build;
    use crate::parser::parse_document;
    use crate::postgres::diff::diff;
    use crate::snapshot::Snapshot;

    fn snapshot(src: &str) -> Snapshot {
        Snapshot::from_schema(&build(&parse_document(src).unwrap()).unwrap().schema)
    }

    fn plan_between(prev: &str, cur: &str) -> MigrationPlan {
        let config = CompileConfig::default();
        let d = diff(&snapshot(prev), &snapshot(cur)).unwrap();
        MigrationPlanner::new(&config).plan(&d).unwrap()
    }

    const BASE: &str = r#"type User @table {
        id: ID! @primaryKey
        email: String! @unique
    }"#;

    #[test]
    fn add_column_with_default_takes_share_row_exclusive() {
        let plan = plan_between(
            BASE,
            r#"type User @table {
                 id: ID! @primaryKey
                 email: String! @unique
                 created_at: DateTime! @default(expr: "now()")
               }"#,
        );
        assert_eq!(plan.steps.len(), 1);
        let step = &plan.steps[0];
        assert_eq!(
            step.sql,
            "ALTER TABLE \"Users\" ADD COLUMN \"created_at\" timestamptz DEFAULT now();"
        );
        assert_eq!(step.lock, LockLevel::ShareRowExclusive);
        assert!(step.lock.blocks_writes() && !step.lock.blocks_reads());
    }

    #[test]
    fn non_null_column_without_default_takes_access_exclusive() {
        let plan = plan_between(
            BASE,
            r#"type User @table {
                 id: ID! @primaryKey
                 email: String! @unique
                 tag: String!
               }"#,
        );
        assert_eq!(plan.steps[0].lock, LockLevel::AccessExclusive);
        assert!(plan.steps[0].lock.blocks_reads());
        assert_eq!(
            plan.steps[0].sql,
            "ALTER TABLE \"Users\" ADD COLUMN \"tag\" text NOT NULL;"
        );
    }

    #[test]
    fn fk_steps_split_across_phases() {
        let plan = plan_between(
            BASE,
            r#"type User @table {
                 id: ID! @primaryKey
                 email: String! @unique
                 org_id: ID! @foreignKey(ref: "Org.id")
               }"#,
        );
        let add = &plan.steps[1];
        assert_eq!(add.kind, StepKind::AddFkNotValid);
        assert_eq!(
            add.sql,
            "ALTER TABLE \"Users\" ADD CONSTRAINT \"fk_Users_org_id\" FOREIGN KEY (\"org_id\") REFERENCES \"Orgs\" (\"id\") NOT VALID;"
        );
        let validate = &plan.steps[2];
        assert_eq!(validate.phase, PlanPhase::Validate);
        assert_eq!(
            validate.sql,
            "ALTER TABLE \"Users\" VALIDATE CONSTRAINT \"fk_Users_org_id\";"
        );
    }

    #[test]
    fn cic_steps_are_non_transactional_with_cleanup() {
        let plan = plan_between(
            BASE,
            r#"type User @table {
                 id: ID! @primaryKey
                 email: String! @unique
                 handle: String @index
               }"#,
        );
        let cic = plan
            .steps
            .iter()
            .find(|s| s.kind == StepKind::CreateIndexConcurrently)
            .unwrap();
        assert_eq!(cic.txn, TxnMarker::NonTransactional);
        assert!(cic.per_table_exclusivity && cic.parallelizable);
        assert_eq!(
            cic.sql,
            "CREATE INDEX CONCURRENTLY IF NOT EXISTS \"idx_Users_handle\" ON \"Users\" (\"handle\");"
        );
        assert_eq!(
            cic.cleanup_sql.as_deref(),
            Some("DROP INDEX CONCURRENTLY IF EXISTS \"idx_Users_handle\";")
        );
    }

    #[test]
    fn every_step_has_exactly_one_lock_and_phase() {
        let plan = plan_between(
            BASE,
            r#"type User @table {
                 id: ID! @primaryKey
                 email: String! @unique
                 handle: String @index
                 org_id: ID @foreignKey(ref: "Org.id")
               }
               type Org @table {
                 id: ID! @primaryKey
               }"#,
        );
        for step in &plan.steps {
            // Labels are total; the lock table has no unknown escape hatch.
            assert!(!step.lock.as_str().is_empty());
            let in_validate = step.phase == PlanPhase::Validate;
            assert_eq!(in_validate, step.kind == StepKind::ValidateFk);
            assert_eq!(
                step.txn == TxnMarker::NonTransactional,
                step.kind == StepKind::CreateIndexConcurrently
            );
        }
    }

    #[test]
    fn advisory_key_is_deterministic() {
        let cur = r#"type User @table {
            id: ID! @primaryKey
            email: String! @unique
            handle: String @index
        }"#;
        let a = plan_between(BASE, cur);
        let b = plan_between(BASE, cur);
        assert_eq!(a.advisory_lock_key, b.advisory_lock_key);
        let empty = plan_between(BASE, BASE);
        assert_ne!(a.advisory_lock_key, empty.advisory_lock_key);
    }

    #[test]
    fn timeouts_come_from_config() {
        let plan = plan_between(BASE, BASE);
        assert_eq!(plan.lock_timeout_ms, 5_000);
        assert_eq!(plan.statement_timeout_ms, 30_000);
    }
}
