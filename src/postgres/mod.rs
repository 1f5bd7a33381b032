//! PostgreSQL backend: DDL emission, redundancy analysis, RLS expansion,
//! additive diffing and migration planning.

pub mod dedup;
pub mod diff;
pub mod emit;
pub mod grammar;
pub mod plan;
pub mod rls;
pub mod triggers;

pub use dedup::{IndexDecision, IndexDeduplicator, IndexSignature};
pub use diff::{AdditiveDiff, ChangeStep, diff};
pub use emit::{DDL_FILE, DdlEmitter, SqlScript};
pub use plan::{
    EXPAND_FILE, LockLevel, MigrationPlan, MigrationPlanner, PlanPhase, PlannedStep, StepKind,
    TxnMarker, VALIDATE_FILE,
};
pub use rls::RlsExpansion;
