//! Index-redundancy analysis.
//!
//! Decides, per table, which requested indexes are redundant — covered by the
//! primary key, covered by a unique constraint, or already emitted — and
//! records the rationale for each skip. Partial indexes are only ever
//! redundant against an identical prior signature.

use crate::ir::{IndexRequest, Table};
use std::collections::HashSet;

/// Identity of an index for duplicate detection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IndexSignature {
    pub table: String,
    pub columns: Vec<String>,
    pub unique: bool,
    pub where_clause: Option<String>,
}

impl IndexSignature {
    pub fn of(table: &str, request: &IndexRequest) -> Self {
        Self {
            table: table.to_string(),
            columns: request.columns.clone(),
            unique: request.unique,
            where_clause: request.where_clause.clone(),
        }
    }
}

/// Outcome of evaluating one request.
#[derive(Debug, Clone, PartialEq)]
pub enum IndexDecision {
    Emit,
    Skip { reason: String },
}

/// Per-table redundancy state: PK columns, unique groups, and the signatures
/// already admitted.
#[derive(Debug, Clone)]
pub struct IndexDeduplicator {
    table: String,
    pk_columns: Vec<String>,
    unique_groups: Vec<Vec<String>>,
    seen: HashSet<IndexSignature>,
}

impl IndexDeduplicator {
    /// Build the dedup state from a table's constraint inventory. Column
    /// names are source names; callers map to SQL names after the decision.
    pub fn for_table(table: &Table) -> Self {
        Self {
            table: table.name.clone(),
            pk_columns: table
                .primary_key_columns()
                .into_iter()
                .map(str::to_string)
                .collect(),
            unique_groups: table
                .unique_groups()
                .into_iter()
                .map(|g| g.into_iter().map(str::to_string).collect())
                .collect(),
            seen: HashSet::new(),
        }
    }

    /// Build dedup state from raw inventories (diff-side entry point).
    pub fn from_inventory(
        table: impl Into<String>,
        pk_columns: Vec<String>,
        unique_groups: Vec<Vec<String>>,
    ) -> Self {
        Self {
            table: table.into(),
            pk_columns,
            unique_groups,
            seen: HashSet::new(),
        }
    }

    /// Evaluate a request, admitting it into the seen set when it survives.
    pub fn evaluate(&mut self, request: &IndexRequest) -> IndexDecision {
        let signature = IndexSignature::of(&self.table, request);
        if self.seen.contains(&signature) {
            return IndexDecision::Skip {
                reason: format!(
                    "Index on {} duplicates an already-declared index",
                    request.columns.join(", ")
                ),
            };
        }

        // Prefix coverage only applies to non-partial requests.
        if request.where_clause.is_none() {
            if is_prefix(&request.columns, &self.pk_columns) {
                self.seen.insert(signature);
                return IndexDecision::Skip {
                    reason: format!(
                        "Index on {} is covered by primary key on {}",
                        request.columns.join(", "),
                        self.pk_columns.join(", ")
                    ),
                };
            }
            if let Some(group) = self
                .unique_groups
                .iter()
                .find(|g| is_prefix(&request.columns, g))
            {
                self.seen.insert(signature);
                return IndexDecision::Skip {
                    reason: format!(
                        "Index on {} is covered by unique constraint on {}",
                        request.columns.join(", "),
                        group.join(", ")
                    ),
                };
            }
        }

        self.seen.insert(signature);
        IndexDecision::Emit
    }
}

fn is_prefix(candidate: &[String], covering: &[String]) -> bool {
    !covering.is_empty()
        && candidate.len() <= covering.len()
        && candidate.iter().zip(covering).all(|(a, b)| a == b)
}
