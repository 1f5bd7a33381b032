//! Compile drivers.
//!
//! [`compile`] is the bootstrap path: source text to DDL plus snapshot.
//! [`compile_with_prior`] is the migration path: source text diffed against a
//! persisted snapshot, yielding a phased plan. Both are pure functions of
//! (source, prior snapshot, configuration); a failed compile yields no
//! artifacts at all.

use crate::config::CompileConfig;
use crate::error::CompileError;
use crate::evidence::{EvidenceMap, EvidenceNote};
use crate::ir::{self, builder::BuildOutput};
use crate::parser::parse_document;
use crate::postgres::emit::DdlEmitter;
use crate::postgres::plan::{MigrationPlan, MigrationPlanner};
use crate::postgres::{diff, emit::SqlScript};
use crate::snapshot::Snapshot;

/// Result of a bootstrap compile.
#[derive(Debug, Clone)]
pub struct CompileOutput {
    /// The full DDL program.
    pub ddl: SqlScript,
    /// Canonical IR serialization, the diff input for future runs.
    pub snapshot: Snapshot,
    pub evidence: EvidenceMap,
}

/// Result of a migration compile against a prior snapshot.
#[derive(Debug, Clone)]
pub struct MigrationOutput {
    pub plan: MigrationPlan,
    pub expand: SqlScript,
    pub validate: SqlScript,
    /// Snapshot of the *current* IR, superseding the prior one on success.
    pub snapshot: Snapshot,
    pub evidence: EvidenceMap,
}

/// Compile a schema from scratch.
pub fn compile(source: &str, config: &CompileConfig) -> Result<CompileOutput, CompileError> {
    let (schema, mut evidence) = build_ir(source)?;
    let emitter = DdlEmitter::new(config);
    let ddl = emitter.emit_schema(&schema, &mut evidence)?;
    let mut snapshot = Snapshot::from_schema(&schema);
    snapshot.ir_version = config.ir_version.clone();
    Ok(CompileOutput {
        ddl,
        snapshot,
        evidence,
    })
}

/// Compile a schema against the prior snapshot, producing the phased plan.
pub fn compile_with_prior(
    source: &str,
    prior: &Snapshot,
    config: &CompileConfig,
) -> Result<MigrationOutput, CompileError> {
    let (schema, mut evidence) = build_ir(source)?;
    let mut snapshot = Snapshot::from_schema(&schema);
    snapshot.ir_version = config.ir_version.clone();

    let additive = diff::diff(prior, &snapshot)?;
    let plan = MigrationPlanner::new(config).plan(&additive)?;
    let expand = plan.render_expand(&mut evidence);
    let validate = plan.render_validate(&mut evidence);

    Ok(MigrationOutput {
        plan,
        expand,
        validate,
        snapshot,
        evidence,
    })
}

fn build_ir(source: &str) -> Result<(ir::Schema, EvidenceMap), CompileError> {
    let doc = parse_document(source)?;
    let BuildOutput { schema, warnings } =
        ir::build_collecting(&doc).map_err(CompileError::IrMany)?;
    let mut evidence = EvidenceMap::new();
    for warning in warnings {
        evidence.record_warning(
            &warning.uid,
            EvidenceNote {
                message: warning.message,
                context: None,
            },
        );
    }
    Ok((schema, evidence))
}
