//! Structured error values surfaced by the compiler core.
//!
//! Nothing in this crate logs; every failure is carried to the caller as one
//! of the enums below. A failed compile produces no artifacts and no snapshot.

use thiserror::Error;

/// The SDL source is syntactically invalid.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ParseError {
    #[error("syntax error near '{context}'")]
    Syntax { context: String },

    #[error("unexpected trailing input near '{context}'")]
    TrailingInput { context: String },
}

/// The AST is well-formed but cannot be lowered to a valid IR.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum IrError {
    #[error("duplicate table name '{0}'")]
    DuplicateTable(String),

    #[error("unknown scalar type '{base}' on {table}.{field}")]
    UnknownScalar {
        table: String,
        field: String,
        base: String,
    },

    #[error("nested list type on {table}.{field} has no SQL mapping")]
    NestedList { table: String, field: String },

    #[error("malformed foreignKey ref '{value}' on {table}.{field}: expected 'Table.column'")]
    MalformedForeignKeyRef {
        table: String,
        field: String,
        value: String,
    },

    #[error("rls {op} expression on table '{table}' must be a string")]
    NonStringRlsExpression { table: String, op: String },

    #[error("invalid argument for @{annotation} on {element}: {reason}")]
    InvalidAnnotationArgument {
        annotation: String,
        element: String,
        reason: String,
    },
}

/// RLS preset resolution failed; the offending table is not emitted.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RlsError {
    #[error("unknown rls preset '{preset}' on table '{table}'")]
    UnknownPreset { table: String, preset: String },

    #[error("rls preset '{preset}' on table '{table}' requires parameter '{param}'")]
    MissingPresetParam {
        table: String,
        preset: String,
        param: String,
    },
}

/// The prior snapshot cannot be used as a diff input.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum DiffError {
    #[error("prior snapshot has unsupported ir_version '{0}'; drop it and re-bootstrap")]
    UnsupportedIrVersion(String),

    #[error("prior snapshot failed to deserialize: {0}")]
    SnapshotDecode(String),
}

/// The additive diff handed to the planner is internally inconsistent.
/// Always indicates a programmer error upstream, never bad user input.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PlannerError {
    #[error("step '{0}' is not one of the additive step kinds")]
    NonAdditiveStep(String),

    #[error("validate_fk for {table}.{column} has no matching add_fk_not_valid")]
    OrphanValidate { table: String, column: String },
}

/// Top-level error for a compile run.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Ir(#[from] IrError),

    /// Collect-mode builds report every offending element before aborting.
    #[error("{} schema errors (first: {})", .0.len(), .0.first().map(ToString::to_string).unwrap_or_default())]
    IrMany(Vec<IrError>),

    #[error(transparent)]
    Rls(#[from] RlsError),

    #[error(transparent)]
    Diff(#[from] DiffError),

    #[error(transparent)]
    Planner(#[from] PlannerError),
}
