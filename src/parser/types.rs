//! Parser types - the abstract syntax tree for the schema definition language

use serde::{Deserialize, Serialize};

// =============================================================================
// AST Types
// =============================================================================

/// A parsed SDL document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    /// Type definitions in source order.
    pub types: Vec<TypeDef>,
}

/// A `type Name @ann { ... }` definition.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TypeDef {
    /// Type name (PascalCase by convention, not enforced).
    pub name: String,
    /// Type-level annotations in source order.
    pub annotations: Vec<Annotation>,
    /// Fields in source order.
    pub fields: Vec<FieldDef>,
}

/// A single field of a type definition.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    pub name: String,
    pub ty: TypeRef,
    pub annotations: Vec<Annotation>,
}

/// Type reference with wrappers. The grammar admits exactly named, non-null
/// and list wrappers; anything else never parses.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeRef {
    Named(String),
    NonNull(Box<TypeRef>),
    List(Box<TypeRef>),
}

impl TypeRef {
    /// Unwrap to `(base, non_null, list, item_non_null)`.
    ///
    /// Returns `None` for shapes with no column mapping (list of list).
    pub fn shape(&self) -> Option<TypeShape> {
        let (inner, non_null) = match self {
            TypeRef::NonNull(t) => (t.as_ref(), true),
            t => (t, false),
        };
        match inner {
            TypeRef::Named(base) => Some(TypeShape {
                base: base.clone(),
                non_null,
                list: false,
                item_non_null: false,
            }),
            TypeRef::List(item) => {
                let (item_inner, item_non_null) = match item.as_ref() {
                    TypeRef::NonNull(t) => (t.as_ref(), true),
                    t => (t, false),
                };
                match item_inner {
                    TypeRef::Named(base) => Some(TypeShape {
                        base: base.clone(),
                        non_null,
                        list: true,
                        item_non_null,
                    }),
                    // List-of-list has no SQL column mapping.
                    TypeRef::List(_) => None,
                    TypeRef::NonNull(_) => None,
                }
            }
            TypeRef::NonNull(_) => None,
        }
    }
}

/// Flattened type shape of a field.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeShape {
    pub base: String,
    pub non_null: bool,
    pub list: bool,
    pub item_non_null: bool,
}

/// An `@name(arg: value, ...)` annotation.
///
/// A bare positional argument (`@uid("tbl_users")`) is stored under the
/// argument name `value`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Annotation {
    pub args: Vec<(String, Value)>,
    pub name: String,
}

impl Annotation {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
        }
    }

    /// Look up an argument by name.
    pub fn arg(&self, name: &str) -> Option<&Value> {
        self.args.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    /// Look up a string argument by name.
    pub fn str_arg(&self, name: &str) -> Option<&str> {
        match self.arg(name) {
            Some(Value::String(s)) => Some(s),
            _ => None,
        }
    }

    /// Look up a boolean argument by name.
    pub fn bool_arg(&self, name: &str) -> Option<bool> {
        match self.arg(name) {
            Some(Value::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    /// The positional argument, if the annotation was written `@name(value)`.
    pub fn positional(&self) -> Option<&Value> {
        self.arg("value")
    }

    /// String list argument: accepts both `["a", "b"]` and a single `"a"`.
    pub fn str_list_arg(&self, name: &str) -> Option<Vec<String>> {
        match self.arg(name) {
            Some(Value::List(items)) => Some(
                items
                    .iter()
                    .filter_map(|v| match v {
                        Value::String(s) => Some(s.clone()),
                        Value::Enum(s) => Some(s.clone()),
                        _ => None,
                    })
                    .collect(),
            ),
            Some(Value::String(s)) => Some(vec![s.clone()]),
            Some(Value::Enum(s)) => Some(vec![s.clone()]),
            _ => None,
        }
    }
}

/// Typed annotation argument value.
///
/// Serialized adjacently tagged so that `Enum("x")` and `String("x")` survive
/// a snapshot round-trip distinct from each other.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Value {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Enum(String),
    Null,
    List(Vec<Value>),
    Object(Vec<(String, Value)>),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }
}
