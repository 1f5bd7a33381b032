//! Canonical annotation names and alias resolution.
//!
//! Annotation names arrive from the parser with the leading `@` already
//! stripped. A small alias table maps short forms onto canonical names; the
//! `uid` short form is context-sensitive (identity tag when it carries a
//! string value, `unique` marker otherwise).

use crate::parser::{Annotation, Value};

// Canonical annotation names.
pub const TABLE: &str = "table";
pub const PRIMARY_KEY: &str = "primaryKey";
pub const UNIQUE: &str = "unique";
pub const FOREIGN_KEY: &str = "foreignKey";
pub const INDEX: &str = "index";
pub const DEFAULT: &str = "default";
pub const CHECK: &str = "check";
pub const COMPUTED: &str = "computed";
pub const HAS_ONE: &str = "hasOne";
pub const HAS_MANY: &str = "hasMany";
pub const BELONGS_TO: &str = "belongsTo";
pub const RLS: &str = "rls";
pub const TENANT: &str = "tenant";
pub const OWNER: &str = "owner";
pub const GRANT: &str = "grant";
pub const SKIP: &str = "skip";
pub const UID: &str = "uid";

/// Annotation scope, for context-sensitive alias resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Type,
    Field,
}

/// Resolve a raw annotation name to its canonical form.
///
/// `uid` on a field with no string value marks uniqueness; with a string
/// value (or on a type) it is the stable identity tag.
pub fn canonical_name(ann: &Annotation, scope: Scope) -> String {
    let raw = ann.name.trim_start_matches('@');
    match raw {
        "pk" => PRIMARY_KEY.to_string(),
        "fk" => FOREIGN_KEY.to_string(),
        "idx" => INDEX.to_string(),
        "uid" => {
            let tagged = matches!(ann.positional(), Some(Value::String(_)));
            if scope == Scope::Field && !tagged {
                UNIQUE.to_string()
            } else {
                UID.to_string()
            }
        }
        other => other.to_string(),
    }
}

/// Normalize an annotation in place: canonical name, args sorted by key so
/// structural equality ignores argument order.
pub fn normalize(mut ann: Annotation, scope: Scope) -> Annotation {
    ann.name = canonical_name(&ann, scope);
    ann.args.sort_by(|(a, _), (b, _)| a.cmp(b));
    ann
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ann(name: &str) -> Annotation {
        Annotation::new(name)
    }

    #[test]
    fn resolves_short_forms() {
        assert_eq!(canonical_name(&ann("pk"), Scope::Field), PRIMARY_KEY);
        assert_eq!(canonical_name(&ann("fk"), Scope::Field), FOREIGN_KEY);
        assert_eq!(canonical_name(&ann("idx"), Scope::Field), INDEX);
    }

    #[test]
    fn bare_uid_on_field_means_unique() {
        assert_eq!(canonical_name(&ann("uid"), Scope::Field), UNIQUE);
    }

    #[test]
    fn uid_with_string_value_is_identity_tag() {
        let mut a = ann("uid");
        a.args
            .push(("value".into(), Value::String("tbl_users".into())));
        assert_eq!(canonical_name(&a, Scope::Field), UID);
        assert_eq!(canonical_name(&a, Scope::Type), UID);
    }

    #[test]
    fn unknown_names_pass_through() {
        assert_eq!(canonical_name(&ann("critical"), Scope::Field), "critical");
        assert_eq!(canonical_name(&ann("@weight"), Scope::Field), "weight");
    }

    #[test]
    fn normalize_sorts_args() {
        let mut a = ann("index");
        a.args.push(("where".into(), Value::String("x".into())));
        a.args.push(("name".into(), Value::String("n".into())));
        let a = normalize(a, Scope::Field);
        assert_eq!(a.args[0].0, "name");
        assert_eq!(a.args[1].0, "where");
    }
}
