//! PostgreSQL type grammar and naming limits.
//!
//! Maps IDL scalar names onto their canonical SQL types and enforces the
//! 63-byte identifier ceiling on derived names.

/// Canonical SQL type for an IDL scalar, or `None` for unknown bases.
pub fn scalar_sql_type(base: &str) -> Option<&'static str> {
    match base {
        "ID" | "UUID" => Some("uuid"),
        "String" => Some("text"),
        "Int" => Some("integer"),
        "Float" => Some("double precision"),
        "Boolean" => Some("boolean"),
        "DateTime" => Some("timestamptz"),
        "Date" => Some("date"),
        "Time" => Some("time"),
        "Decimal" => Some("numeric"),
        "JSON" => Some("jsonb"),
        "Inet" => Some("inet"),
        "CIDR" => Some("cidr"),
        "MacAddr" => Some("macaddr"),
        _ => None,
    }
}

/// SQL column type for a field shape: scalar type plus `[]` for lists.
pub fn column_sql_type(base: &str, list: bool) -> Option<String> {
    let scalar = scalar_sql_type(base)?;
    Some(if list {
        format!("{scalar}[]")
    } else {
        scalar.to_string()
    })
}

/// PostgreSQL truncates identifiers at 63 bytes. Derived names beyond that
/// are shortened with a stable hash suffix so two long names cannot collide
/// after truncation.
pub fn clamp_identifier(name: &str) -> String {
    const MAX: usize = 63;
    if name.len() <= MAX {
        return name.to_string();
    }
    let hash = hash_string(name);
    let keep = MAX - hash.len() - 1;
    let mut prefix = &name[..keep];
    // Stay on a char boundary for non-ASCII source names.
    while !name.is_char_boundary(prefix.len()) {
        prefix = &prefix[..prefix.len() - 1];
    }
    format!("{prefix}_{hash}")
}

fn hash_string(s: &str) -> String {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let mut hasher = DefaultHasher::new();
    s.hash(&mut hasher);
    format!("{:x}", hasher.finish())[..12].to_string()
}
