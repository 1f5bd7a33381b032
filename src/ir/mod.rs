//! Intermediate representation of a compiled schema.
//!
//! The IR is built once per compile run and immutable afterwards; emitters
//! consume it by reference. Tables and fields keep their source order, which
//! is the order every artifact is emitted in.

pub mod annotations;
pub mod builder;

pub use builder::{IrBuilder, build, build_collecting};

use crate::parser::Annotation;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// An ordered collection of tables plus the version tag stamped into
/// snapshots.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    pub ir_version: String,
    pub tables: Vec<Table>,
}

impl Schema {
    /// Look up a table by source name.
    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name == name)
    }
}

/// A relational table: a type definition carrying the `table` annotation.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    /// Source type name.
    pub name: String,
    /// Stable identity tag (`uid` annotation or `tbl_<lowercased-name>`).
    pub uid: String,
    /// Normalized type-level annotations, source order.
    pub annotations: Vec<Annotation>,
    /// Fields in source order, virtual ones included.
    pub fields: Vec<Field>,
    /// Row-level security configuration, present iff the type has `rls`.
    pub rls: Option<RlsConfig>,
    /// Index requests gathered from field annotations.
    pub indexes: Vec<IndexRequest>,
    /// Foreign keys gathered from field annotations.
    pub foreign_keys: Vec<ForeignKeyRef>,
}

impl Table {
    pub fn annotation(&self, name: &str) -> Option<&Annotation> {
        self.annotations.iter().find(|a| a.name == name)
    }

    /// Source names of primary-key columns, field order.
    pub fn primary_key_columns(&self) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|f| f.has_annotation(annotations::PRIMARY_KEY))
            .map(|f| f.name.as_str())
            .collect()
    }

    /// Column groups covered by unique constraints (one group per `unique`
    /// field), field order.
    pub fn unique_groups(&self) -> Vec<Vec<&str>> {
        self.fields
            .iter()
            .filter(|f| f.has_annotation(annotations::UNIQUE))
            .map(|f| vec![f.name.as_str()])
            .collect()
    }

    /// Fields that materialize as columns.
    pub fn columns(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter().filter(|f| f.emits_column())
    }
}

/// A single field of a table.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub base_type: String,
    pub non_null: bool,
    pub list: bool,
    pub item_non_null: bool,
    /// Stable identity tag (`uid` annotation or `fld_<table>_<name>`).
    pub uid: String,
    /// Normalized field-level annotations, source order.
    pub annotations: Vec<Annotation>,
}

impl Field {
    pub fn annotation(&self, name: &str) -> Option<&Annotation> {
        self.annotations.iter().find(|a| a.name == name)
    }

    pub fn has_annotation(&self, name: &str) -> bool {
        self.annotation(name).is_some()
    }

    /// Virtual fields (`hasOne` / `hasMany`) contribute no column.
    pub fn is_virtual(&self) -> bool {
        self.has_annotation(annotations::HAS_ONE) || self.has_annotation(annotations::HAS_MANY)
    }

    /// Whether this field materializes as a column (`skip` opts out).
    pub fn emits_column(&self) -> bool {
        !self.is_virtual() && !self.has_annotation(annotations::SKIP)
    }

    /// The default expression or literal, verbatim from the annotation.
    pub fn default_expr(&self) -> Option<String> {
        let ann = self.annotation(annotations::DEFAULT)?;
        ann.str_arg("expr")
            .map(str::to_string)
            .or_else(|| ann.arg("value").map(render_default))
            .or_else(|| ann.positional().map(render_default))
    }

    /// The computed-column expression, if any.
    pub fn computed_expr(&self) -> Option<&str> {
        let ann = self.annotation(annotations::COMPUTED)?;
        ann.str_arg("expr").or_else(|| {
            ann.positional().and_then(crate::parser::Value::as_str)
        })
    }
}

/// Render a default literal as SQL text.
fn render_default(value: &crate::parser::Value) -> String {
    use crate::parser::Value;
    match value {
        Value::String(s) => format!("'{}'", s.replace('\'', "''")),
        Value::Int(i) => i.to_string(),
        Value::Float(f) => f.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Enum(e) => e.clone(),
        Value::Null => "NULL".to_string(),
        Value::List(_) | Value::Object(_) => "NULL".to_string(),
    }
}

/// Row-level security configuration for one table.
///
/// Fields are declared in canonical (sorted) key order; the snapshot relies
/// on declaration order for its byte-stable serialization.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RlsConfig {
    pub delete: Option<String>,
    pub enabled: bool,
    pub insert: Option<String>,
    /// Per-operation role overrides (`select_roles: [...]` and friends).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub per_op_roles: BTreeMap<String, Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preset: Option<String>,
    /// Extra named string arguments, handed to the preset as parameters.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub preset_params: BTreeMap<String, String>,
    pub roles: Vec<String>,
    pub select: Option<String>,
    pub update: Option<String>,
}

impl Default for RlsConfig {
    fn default() -> Self {
        Self {
            delete: Some("false".to_string()),
            enabled: true,
            insert: Some("true".to_string()),
            per_op_roles: BTreeMap::new(),
            preset: None,
            preset_params: BTreeMap::new(),
            roles: vec!["authenticated".to_string()],
            select: Some("true".to_string()),
            update: Some("true".to_string()),
        }
    }
}

/// A requested index, before redundancy analysis.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct IndexRequest {
    /// Source column names.
    pub columns: Vec<String>,
    /// Index method; `None` means the B-tree default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub unique: bool,
    #[serde(default, rename = "where", skip_serializing_if = "Option::is_none")]
    pub where_clause: Option<String>,
}

/// A foreign key from one column to a referenced table/column.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ForeignKeyRef {
    pub column: String,
    /// Defaults to `id` when the ref omits it.
    pub ref_column: String,
    pub ref_table: String,
}
