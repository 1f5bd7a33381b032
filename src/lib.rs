//! Accrete - additive PostgreSQL schema compiler and online migration planner
//!
//! This crate compiles a typed, annotated schema definition language into a
//! coherent bundle of database artifacts:
//! - PostgreSQL DDL for tables, indexes, constraints, comments and
//!   row-level-security policies
//! - a phased, lock-aware migration plan diffed against a persisted snapshot
//! - trigger and function definitions for computed columns
//! - evidence metadata tracing every emitted SQL fragment back to a source
//!   element
//!
//! Plans are additive by construction: no drops, no type changes, no data
//! transforms. Index builds are planned `CONCURRENTLY` and foreign keys go
//! through the `NOT VALID` / `VALIDATE` pair, so an executor honoring the
//! phase markers never takes a blocking lock longer than it must.
//!
//! # Bootstrap
//!
//! ```
//! use accrete::{CompileConfig, compile};
//!
//! let source = r#"
//!     type User @table {
//!       id: ID! @primaryKey
//!       email: String! @unique
//!     }
//! "#;
//! let output = compile(source, &CompileConfig::default()).unwrap();
//! assert!(output.ddl.text().starts_with("CREATE TABLE IF NOT EXISTS \"Users\""));
//! ```
//!
//! # Migration
//!
//! ```
//! use accrete::{CompileConfig, compile, compile_with_prior};
//!
//! let config = CompileConfig::default();
//! let v1 = "type User @table { id: ID! @primaryKey }";
//! let v2 = r#"type User @table {
//!     id: ID! @primaryKey
//!     email: String! @unique
//! }"#;
//!
//! let prior = compile(v1, &config).unwrap().snapshot;
//! let migration = compile_with_prior(v2, &prior, &config).unwrap();
//! assert_eq!(migration.plan.steps.len(), 1);
//! ```
//!
//! The core is single-threaded and deterministic: output is a pure function
//! of (source text, prior snapshot, configuration). Nothing is logged;
//! failures surface as structured error values and a failed compile writes
//! no artifacts.

pub mod compile;
pub mod config;
pub mod error;
pub mod evidence;
pub mod ident;
pub mod ir;
pub mod parser;
pub mod postgres;
pub mod snapshot;
pub mod version;
pub mod writer;

// Compile drivers
pub use compile::{CompileOutput, MigrationOutput, compile, compile_with_prior};

// Configuration
pub use config::{CompileConfig, ConfigError};

// Errors
pub use error::{CompileError, DiffError, IrError, ParseError, PlannerError, RlsError};

// Identifier service
pub use ident::{IdentifierService, IdentifierStrategy};

// Evidence side-channel
pub use evidence::{ArtifactKind, EvidenceMap, EvidenceNote, EvidenceRecord, LineRange};

// Snapshots
pub use snapshot::Snapshot;

// Planner surface
pub use postgres::{
    AdditiveDiff, LockLevel, MigrationPlan, MigrationPlanner, PlanPhase, PlannedStep, StepKind,
    TxnMarker,
};

// Artifact writer
pub use writer::{ArtifactWriter, WriteError};

// Version constants
pub use version::{IR_VERSION, is_supported_version};
