//! AST to IR lowering.
//!
//! Resolves annotation aliases, validates argument shapes, extracts RLS
//! configuration and attaches stable UIDs. The builder runs short-circuit by
//! default; [`build_collecting`] gathers every offending element before
//! aborting.

use super::annotations::{self, Scope, normalize};
use super::{Field, ForeignKeyRef, IndexRequest, RlsConfig, Schema, Table};
use crate::error::IrError;
use crate::parser::{Annotation, Document, FieldDef, TypeDef, Value};
use crate::postgres::grammar;
use crate::version::IR_VERSION;
use std::collections::HashSet;

/// Result of a successful build: the schema plus non-fatal warnings, keyed by
/// the UID of the element they concern.
#[derive(Debug, Clone)]
pub struct BuildOutput {
    pub schema: Schema,
    pub warnings: Vec<Warning>,
}

/// A weakly ill-formed annotation that was given a sensible default.
#[derive(Debug, Clone, PartialEq)]
pub struct Warning {
    pub uid: String,
    pub message: String,
}

/// Build the IR, stopping at the first error.
pub fn build(doc: &Document) -> Result<BuildOutput, IrError> {
    IrBuilder::new().run(doc).map_err(|mut errs| errs.remove(0))
}

/// Build the IR, collecting every error before aborting.
pub fn build_collecting(doc: &Document) -> Result<BuildOutput, Vec<IrError>> {
    IrBuilder::collecting().run(doc)
}

/// AST lowering driver.
pub struct IrBuilder {
    collect: bool,
}

impl IrBuilder {
    pub fn new() -> Self {
        Self { collect: false }
    }

    pub fn collecting() -> Self {
        Self { collect: true }
    }

    fn run(&self, doc: &Document) -> Result<BuildOutput, Vec<IrError>> {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();
        let mut seen = HashSet::new();
        let mut tables = Vec::new();

        for def in &doc.types {
            let type_annotations: Vec<Annotation> = def
                .annotations
                .iter()
                .map(|a| normalize(a.clone(), Scope::Type))
                .collect();
            if !type_annotations.iter().any(|a| a.name == annotations::TABLE) {
                continue;
            }
            if !seen.insert(def.name.clone()) {
                errors.push(IrError::DuplicateTable(def.name.clone()));
                if !self.collect {
                    return Err(errors);
                }
                continue;
            }
            match self.lower_table(def, type_annotations, &mut errors, &mut warnings) {
                Some(table) => tables.push(table),
                None if !self.collect => return Err(errors),
                None => {}
            }
        }

        if errors.is_empty() {
            Ok(BuildOutput {
                schema: Schema {
                    ir_version: IR_VERSION.to_string(),
                    tables,
                },
                warnings,
            })
        } else {
            Err(errors)
        }
    }

    fn lower_table(
        &self,
        def: &TypeDef,
        type_annotations: Vec<Annotation>,
        errors: &mut Vec<IrError>,
        warnings: &mut Vec<Warning>,
    ) -> Option<Table> {
        let uid = identity_tag(&type_annotations)
            .unwrap_or_else(|| format!("tbl_{}", def.name.to_lowercase()));
        let before = errors.len();

        let mut fields = Vec::new();
        for field_def in &def.fields {
            match self.lower_field(def, field_def, errors, warnings) {
                Some(field) => fields.push(field),
                None if !self.collect => return None,
                None => {}
            }
        }

        let rls = match self.extract_rls(def, &type_annotations, errors) {
            Ok(rls) => rls,
            Err(()) if !self.collect => return None,
            Err(()) => None,
        };

        let indexes = collect_index_requests(&fields);
        let foreign_keys = match collect_foreign_keys(&def.name, &fields) {
            Ok(fks) => fks,
            Err(e) => {
                errors.push(e);
                if !self.collect {
                    return None;
                }
                Vec::new()
            }
        };

        if errors.len() > before {
            return None;
        }
        Some(Table {
            name: def.name.clone(),
            uid,
            annotations: type_annotations,
            fields,
            rls,
            indexes,
            foreign_keys,
        })
    }

    fn lower_field(
        &self,
        def: &TypeDef,
        field_def: &FieldDef,
        errors: &mut Vec<IrError>,
        warnings: &mut Vec<Warning>,
    ) -> Option<Field> {
        let field_annotations: Vec<Annotation> = field_def
            .annotations
            .iter()
            .map(|a| normalize(a.clone(), Scope::Field))
            .collect();
        let uid = identity_tag(&field_annotations).unwrap_or_else(|| {
            format!(
                "fld_{}_{}",
                def.name.to_lowercase(),
                field_def.name.to_lowercase()
            )
        });

        let Some(shape) = field_def.ty.shape() else {
            errors.push(IrError::NestedList {
                table: def.name.clone(),
                field: field_def.name.clone(),
            });
            return None;
        };

        let is_virtual = field_annotations
            .iter()
            .any(|a| a.name == annotations::HAS_ONE || a.name == annotations::HAS_MANY);
        if !is_virtual && grammar::scalar_sql_type(&shape.base).is_none() {
            errors.push(IrError::UnknownScalar {
                table: def.name.clone(),
                field: field_def.name.clone(),
                base: shape.base.clone(),
            });
            return None;
        }

        for ann in &field_annotations {
            if let Err(e) = validate_field_annotation(def, field_def, ann, &uid, warnings) {
                errors.push(e);
                return None;
            }
        }

        Some(Field {
            name: field_def.name.clone(),
            base_type: shape.base,
            non_null: shape.non_null,
            list: shape.list,
            item_non_null: shape.item_non_null,
            uid,
            annotations: field_annotations,
        })
    }

    /// Parse the `rls` annotation into an [`RlsConfig`] with defaults.
    /// `Err(())` marks errors already pushed onto `errors`.
    fn extract_rls(
        &self,
        def: &TypeDef,
        type_annotations: &[Annotation],
        errors: &mut Vec<IrError>,
    ) -> Result<Option<RlsConfig>, ()> {
        let Some(ann) = type_annotations.iter().find(|a| a.name == annotations::RLS) else {
            return Ok(None);
        };

        let preset = ann.str_arg("preset").map(str::to_string);
        let mut config = RlsConfig {
            preset: preset.clone(),
            ..RlsConfig::default()
        };
        if preset.is_some() {
            // The preset supplies operation expressions; explicit ones override.
            config.select = None;
            config.insert = None;
            config.update = None;
            config.delete = None;
        }
        config.enabled = ann.bool_arg("enabled").unwrap_or(true);
        if let Some(roles) = ann.str_list_arg("roles") {
            config.roles = roles;
        }

        let known = [
            "preset", "enabled", "roles", "select", "insert", "update", "delete",
        ];
        for op in ["select", "insert", "update", "delete"] {
            match ann.arg(op) {
                None => {}
                Some(Value::String(expr)) => {
                    let slot = match op {
                        "select" => &mut config.select,
                        "insert" => &mut config.insert,
                        "update" => &mut config.update,
                        _ => &mut config.delete,
                    };
                    *slot = Some(expr.clone());
                }
                Some(_) => {
                    errors.push(IrError::NonStringRlsExpression {
                        table: def.name.clone(),
                        op: op.to_string(),
                    });
                    return Err(());
                }
            }
        }
        for (key, _) in &ann.args {
            if let Some(op) = key.strip_suffix("_roles") {
                if let Some(roles) = ann.str_list_arg(key) {
                    config.per_op_roles.insert(op.to_string(), roles);
                }
            } else if !known.contains(&key.as_str()) {
                if let Some(value) = ann.str_arg(key) {
                    config
                        .preset_params
                        .insert(key.clone(), value.to_string());
                }
            }
        }
        Ok(Some(config))
    }
}

impl Default for IrBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// The identity tag from a normalized annotation list, if present.
fn identity_tag(anns: &[Annotation]) -> Option<String> {
    anns.iter()
        .find(|a| a.name == annotations::UID)
        .and_then(|a| a.positional().or_else(|| a.arg("value")))
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn validate_field_annotation(
    def: &TypeDef,
    field: &FieldDef,
    ann: &Annotation,
    uid: &str,
    warnings: &mut Vec<Warning>,
) -> Result<(), IrError> {
    let element = format!("{}.{}", def.name, field.name);
    match ann.name.as_str() {
        annotations::FOREIGN_KEY => {
            let reference = ann
                .str_arg("ref")
                .or_else(|| ann.positional().and_then(Value::as_str));
            match reference {
                Some(r) if parse_fk_ref(r).is_some() => Ok(()),
                Some(r) => Err(IrError::MalformedForeignKeyRef {
                    table: def.name.clone(),
                    field: field.name.clone(),
                    value: r.to_string(),
                }),
                None => Err(IrError::MalformedForeignKeyRef {
                    table: def.name.clone(),
                    field: field.name.clone(),
                    value: String::new(),
                }),
            }
        }
        annotations::INDEX => {
            if let Some(v) = ann.arg("where") {
                if v.as_str().is_none() {
                    return Err(IrError::InvalidAnnotationArgument {
                        annotation: annotations::INDEX.to_string(),
                        element,
                        reason: "'where' must be a string".to_string(),
                    });
                }
            }
            if let Some(v) = ann.arg("unique") {
                if !matches!(v, Value::Bool(_)) {
                    warnings.push(Warning {
                        uid: uid.to_string(),
                        message: format!(
                            "index 'unique' on {element} is not a boolean; assuming false"
                        ),
                    });
                }
            }
            Ok(())
        }
        annotations::DEFAULT => {
            if ann.arg("value").is_none()
                && ann.str_arg("expr").is_none()
                && ann.positional().is_none()
            {
                return Err(IrError::InvalidAnnotationArgument {
                    annotation: annotations::DEFAULT.to_string(),
                    element,
                    reason: "missing 'value' or 'expr'".to_string(),
                });
            }
            Ok(())
        }
        annotations::CHECK => match ann.str_arg("expr").or_else(|| ann.positional().and_then(Value::as_str)) {
            Some(_) => Ok(()),
            None => Err(IrError::InvalidAnnotationArgument {
                annotation: annotations::CHECK.to_string(),
                element,
                reason: "missing string 'expr'".to_string(),
            }),
        },
        "weight" => match ann.positional().or_else(|| ann.arg("v")) {
            Some(Value::Int(_)) | Some(Value::Float(_)) | None => Ok(()),
            Some(_) => Err(IrError::InvalidAnnotationArgument {
                annotation: "weight".to_string(),
                element,
                reason: "weight must be numeric".to_string(),
            }),
        },
        _ => Ok(()),
    }
}

/// Split `Table.column` (column defaults to `id`).
pub fn parse_fk_ref(reference: &str) -> Option<(String, String)> {
    let mut parts = reference.split('.');
    let table = parts.next().filter(|s| !s.is_empty())?;
    let column = match parts.next() {
        Some(c) if !c.is_empty() => c,
        Some(_) => return None,
        None => "id",
    };
    if parts.next().is_some() {
        return None;
    }
    Some((table.to_string(), column.to_string()))
}

fn collect_index_requests(fields: &[Field]) -> Vec<IndexRequest> {
    let mut requests = Vec::new();
    for field in fields {
        if !field.emits_column() {
            continue;
        }
        if let Some(ann) = field.annotation(annotations::INDEX) {
            requests.push(IndexRequest {
                columns: vec![field.name.clone()],
                unique: ann.bool_arg("unique").unwrap_or(false),
                where_clause: ann.str_arg("where").map(str::to_string),
                method: ann.str_arg("using").map(str::to_string),
                name: ann.str_arg("name").map(str::to_string),
            });
        }
    }
    requests
}

fn collect_foreign_keys(table: &str, fields: &[Field]) -> Result<Vec<ForeignKeyRef>, IrError> {
    let mut fks = Vec::new();
    for field in fields {
        if !field.emits_column() {
            continue;
        }
        if let Some(ann) = field.annotation(annotations::FOREIGN_KEY) {
            let reference = ann
                .str_arg("ref")
                .or_else(|| ann.positional().and_then(Value::as_str))
                .unwrap_or_default();
            let Some((ref_table, ref_column)) = parse_fk_ref(reference) else {
                return Err(IrError::MalformedForeignKeyRef {
                    table: table.to_string(),
                    field: field.name.clone(),
                    value: reference.to_string(),
                });
            };
            fks.push(ForeignKeyRef {
                column: field.name.clone(),
                ref_table,
                ref_column,
            });
        }
    }
    Ok(fks)
}
