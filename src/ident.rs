//! Identifier service: canonical source-name-to-SQL-identifier mapping.
//!
//! Pure and deterministic; the same input and strategy always yields the
//! same identifier. Used everywhere SQL text is emitted.

use heck::ToSnakeCase;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// How source names map to SQL identifiers.
#[derive(Serialize, Deserialize, Copy, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IdentifierStrategy {
    #[default]
    Preserve,
    SnakeCase,
    Lower,
    Upper,
}

/// Words that force quoting regardless of case.
const RESERVED_WORDS: &[&str] = &[
    "user", "order", "group", "table", "column", "select", "insert", "update", "delete", "where",
    "from", "join", "limit", "offset", "union", "all", "distinct", "having", "between", "like",
    "in", "exists", "case", "when", "then", "else", "end", "and", "or", "not", "null", "true",
    "false",
];

fn bare_ident_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z_][a-z0-9_]*$").expect("valid regex"))
}

/// Identifier mapper parameterized by strategy.
#[derive(Clone, Copy, Debug)]
pub struct IdentifierService {
    strategy: IdentifierStrategy,
}

impl IdentifierService {
    pub fn new(strategy: IdentifierStrategy) -> Self {
        Self { strategy }
    }

    /// Map a source column (or any non-table) name.
    pub fn column(&self, name: &str) -> String {
        match self.strategy {
            IdentifierStrategy::Preserve => name.to_string(),
            IdentifierStrategy::SnakeCase => name.to_snake_case(),
            IdentifierStrategy::Lower => name.to_lowercase(),
            IdentifierStrategy::Upper => name.to_uppercase(),
        }
    }

    /// Map a source type name to its table identifier: strategy transform,
    /// then naive pluralization (append `s` unless one is already there).
    pub fn table(&self, name: &str) -> String {
        let mapped = self.column(name);
        if mapped.ends_with('s') || mapped.ends_with('S') {
            mapped
        } else {
            format!("{mapped}s")
        }
    }

    /// Whether an identifier must be quoted: mixed case, reserved word, or
    /// characters outside `[a-z0-9_]`.
    pub fn needs_quoting(&self, ident: &str) -> bool {
        !bare_ident_re().is_match(ident) || RESERVED_WORDS.contains(&ident)
    }

    /// Quote only when the quoting policy requires it. Used for derived
    /// routine and role names; table/column identifiers in emitted DDL are
    /// always quoted via [`quote`].
    pub fn quote_if_needed(&self, ident: &str) -> String {
        if self.needs_quoting(ident) {
            quote(ident)
        } else {
            ident.to_string()
        }
    }

    /// Derived index name: `idx_<table>_<col1>_<col2>...`.
    pub fn index_name(&self, table: &str, columns: &[String]) -> String {
        format!("idx_{}_{}", table, columns.join("_"))
    }

    /// Derived constraint name: `<kind>_<table>_<column>`.
    pub fn constraint_name(&self, table: &str, column: &str, kind: &str) -> String {
        format!("{kind}_{table}_{column}")
    }

    /// Derived policy name: `policy_<table>_<op>_<uid>`.
    pub fn policy_name(&self, table: &str, op: &str, uid: &str) -> String {
        format!("policy_{table}_{op}_{uid}")
    }
}

/// Always double-quote, doubling embedded quotes.
pub fn quote(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}
