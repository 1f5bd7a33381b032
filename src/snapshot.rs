//! Schema snapshots: the canonical IR serialization used as the diff input.
//!
//! The snapshot is the sole persistent state of the core. Keys serialize in
//! canonical sorted order (struct fields are declared sorted); arrays keep
//! source order. Reloading a snapshot yields a structurally equal IR, so a
//! run diffed against its own output is always empty.

use crate::error::DiffError;
use crate::ir::{Field, ForeignKeyRef, IndexRequest, RlsConfig, Schema, Table};
use crate::parser::Annotation;
use serde::{Deserialize, Serialize};

/// Default file name of the persisted snapshot.
pub const SNAPSHOT_FILE: &str = "snapshot.json";

/// Canonical serialization of one compile's IR.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Snapshot {
    pub ir_version: String,
    pub tables: Vec<TableSnapshot>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct TableSnapshot {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub annotations: Vec<Annotation>,
    pub fields: Vec<FieldSnapshot>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub foreign_keys: Vec<ForeignKeyRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub indexes: Vec<IndexRequest>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rls: Option<RlsConfig>,
    pub uid: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct FieldSnapshot {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub annotations: Vec<Annotation>,
    pub base: String,
    pub item_non_null: bool,
    pub list: bool,
    pub name: String,
    pub non_null: bool,
    pub uid: String,
}

impl Snapshot {
    /// Serialize the IR.
    pub fn from_schema(schema: &Schema) -> Self {
        Self {
            ir_version: schema.ir_version.clone(),
            tables: schema
                .tables
                .iter()
                .map(|table| TableSnapshot {
                    annotations: table.annotations.clone(),
                    fields: table
                        .fields
                        .iter()
                        .map(|field| FieldSnapshot {
                            annotations: field.annotations.clone(),
                            base: field.base_type.clone(),
                            item_non_null: field.item_non_null,
                            list: field.list,
                            name: field.name.clone(),
                            non_null: field.non_null,
                            uid: field.uid.clone(),
                        })
                        .collect(),
                    foreign_keys: table.foreign_keys.clone(),
                    indexes: table.indexes.clone(),
                    name: table.name.clone(),
                    rls: table.rls.clone(),
                    uid: table.uid.clone(),
                })
                .collect(),
        }
    }

    /// Rebuild the IR this snapshot was serialized from.
    pub fn to_schema(&self) -> Schema {
        Schema {
            ir_version: self.ir_version.clone(),
            tables: self.tables.iter().map(TableSnapshot::to_table).collect(),
        }
    }

    /// Canonical JSON text (pretty, trailing newline).
    pub fn to_json(&self) -> String {
        let mut out =
            serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string());
        out.push('\n');
        out
    }

    /// Parse a previously written snapshot.
    pub fn from_json(text: &str) -> Result<Self, DiffError> {
        serde_json::from_str(text).map_err(|e| DiffError::SnapshotDecode(e.to_string()))
    }

    pub fn table(&self, name: &str) -> Option<&TableSnapshot> {
        self.tables.iter().find(|t| t.name == name)
    }
}

impl TableSnapshot {
    pub fn to_table(&self) -> Table {
        Table {
            name: self.name.clone(),
            uid: self.uid.clone(),
            annotations: self.annotations.clone(),
            fields: self.fields.iter().map(FieldSnapshot::to_field).collect(),
            rls: self.rls.clone(),
            indexes: self.indexes.clone(),
            foreign_keys: self.foreign_keys.clone(),
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldSnapshot> {
        self.fields.iter().find(|f| f.name == name)
    }
}

impl FieldSnapshot {
    pub fn to_field(&self) -> Field {
        Field {
            name: self.name.clone(),
            base_type: self.base.clone(),
            non_null: self.non_null,
            list: self.list,
            item_non_null: self.item_non_null,
            uid: self.uid.clone(),
            annotations: self.annotations.clone(),
        }
    }
}
