//! Row-level security expansion.
//!
//! Turns a table's RLS configuration — user-authored expressions or a named
//! preset — into an ordered set of artifacts: helper functions, auxiliary
//! views, ENABLE/FORCE statements, per-operation policies, and preset index
//! requests. Policies always expand in the fixed order select, insert,
//! update, delete.

use crate::error::RlsError;
use crate::ident::{IdentifierService, quote};
use crate::ir::annotations;
use crate::ir::{IndexRequest, RlsConfig, Table};
use crate::parser::Value;
use crate::postgres::grammar::clamp_identifier;

/// Policy operations in emission order.
pub const OPS: [&str; 4] = ["select", "insert", "update", "delete"];

/// A preset helper routine.
#[derive(Debug, Clone, PartialEq)]
pub struct HelperFunction {
    pub name: String,
    /// Argument types, for GRANT EXECUTE signatures (empty for no-arg).
    pub arg_signature: &'static str,
    pub sql: String,
}

/// A preset auxiliary view.
#[derive(Debug, Clone, PartialEq)]
pub struct AuxiliaryView {
    pub name: String,
    pub sql: String,
}

/// One policy: the drop-if-exists of any prior version, then the create.
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyStatement {
    pub op: &'static str,
    pub drop_sql: String,
    pub create_sql: String,
}

/// Everything the expander produces for one table, in emission order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RlsExpansion {
    pub helper_functions: Vec<HelperFunction>,
    pub views: Vec<AuxiliaryView>,
    pub enable_sql: String,
    pub force_sql: String,
    pub policies: Vec<PolicyStatement>,
    pub index_requests: Vec<IndexRequest>,
    pub warnings: Vec<String>,
}

/// The preset catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Preset {
    Owner,
    Tenant,
    PublicRead,
    Authenticated,
    AdminOnly,
    SoftDelete,
    TimeWindow,
    Hierarchical,
}

impl Preset {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "owner" => Some(Self::Owner),
            "tenant" => Some(Self::Tenant),
            "public-read" => Some(Self::PublicRead),
            "authenticated" => Some(Self::Authenticated),
            "admin-only" => Some(Self::AdminOnly),
            "soft-delete" => Some(Self::SoftDelete),
            "time-window" => Some(Self::TimeWindow),
            "hierarchical" => Some(Self::Hierarchical),
            _ => None,
        }
    }

    fn required_params(self) -> &'static [&'static str] {
        match self {
            Self::Owner => &["owner_column"],
            Self::Tenant => &["tenant_column", "membership_table"],
            Self::PublicRead => &["owner_column"],
            Self::Authenticated => &[],
            Self::AdminOnly => &["membership_table"],
            Self::SoftDelete => &["deleted_at_column"],
            Self::TimeWindow => &["start_column", "end_column"],
            Self::Hierarchical => &["org_column", "org_hierarchy_table"],
        }
    }
}

/// Column-name candidates for auto-discovering a preset parameter.
fn discovery_candidates(param: &str) -> &'static [&'static str] {
    match param {
        "owner_column" => &["owner_id", "created_by", "user_id", "owner"],
        "tenant_column" => &["tenant_id", "org_id", "workspace_id"],
        "deleted_at_column" => &["deleted_at"],
        "start_column" => &["starts_at", "valid_from"],
        "end_column" => &["ends_at", "valid_to"],
        "org_column" => &["org_id", "organization_id"],
        _ => &[],
    }
}

/// Expand the RLS block for a table, or `None` when RLS is absent/disabled.
pub fn expand(table: &Table, ids: &IdentifierService) -> Result<Option<RlsExpansion>, RlsError> {
    let Some(config) = table.rls.as_ref() else {
        return Ok(None);
    };
    if !config.enabled {
        return Ok(None);
    }

    let sql_table = ids.table(&table.name);
    let quoted_table = quote(&sql_table);
    let mut expansion = RlsExpansion {
        enable_sql: format!("ALTER TABLE {quoted_table} ENABLE ROW LEVEL SECURITY;"),
        force_sql: format!("ALTER TABLE {quoted_table} FORCE ROW LEVEL SECURITY;"),
        ..RlsExpansion::default()
    };

    let mut expressions = PerOp::default();
    if let Some(preset_name) = config.preset.as_deref() {
        let preset = Preset::parse(preset_name).ok_or_else(|| RlsError::UnknownPreset {
            table: table.name.clone(),
            preset: preset_name.to_string(),
        })?;
        expand_preset(table, ids, config, preset, preset_name, &mut expansion, &mut expressions)?;
    }
    // Explicit per-operation expressions override whatever the preset set.
    for (op, slot) in [
        ("select", &config.select),
        ("insert", &config.insert),
        ("update", &config.update),
        ("delete", &config.delete),
    ] {
        if let Some(expr) = slot {
            expressions.set(op, expr.clone());
        }
    }

    for op in OPS {
        let Some(expr) = expressions.get(op) else {
            continue;
        };
        let roles = config
            .per_op_roles
            .get(op)
            .unwrap_or(&config.roles)
            .as_slice();
        let name = clamp_identifier(&ids.policy_name(&sql_table, op, &table.uid));
        let quoted_name = quote(&name);
        let to_clause = role_clause(roles, ids);
        let body = match op {
            "insert" => format!("WITH CHECK ({expr})"),
            "update" => format!("USING ({expr}) WITH CHECK ({expr})"),
            _ => format!("USING ({expr})"),
        };
        expansion.policies.push(PolicyStatement {
            op,
            drop_sql: format!("DROP POLICY IF EXISTS {quoted_name} ON {quoted_table};"),
            create_sql: format!(
                "CREATE POLICY {quoted_name} ON {quoted_table} FOR {} TO {to_clause} {body};",
                op.to_uppercase()
            ),
        });
    }

    Ok(Some(expansion))
}

/// Per-operation expression slots.
#[derive(Debug, Clone, Default)]
struct PerOp {
    select: Option<String>,
    insert: Option<String>,
    update: Option<String>,
    delete: Option<String>,
}

impl PerOp {
    fn set(&mut self, op: &str, expr: String) {
        match op {
            "select" => self.select = Some(expr),
            "insert" => self.insert = Some(expr),
            "update" => self.update = Some(expr),
            _ => self.delete = Some(expr),
        }
    }

    fn set_all(&mut self, expr: &str) {
        for op in OPS {
            self.set(op, expr.to_string());
        }
    }

    fn get(&self, op: &str) -> Option<&str> {
        match op {
            "select" => self.select.as_deref(),
            "insert" => self.insert.as_deref(),
            "update" => self.update.as_deref(),
            _ => self.delete.as_deref(),
        }
    }
}

fn expand_preset(
    table: &Table,
    ids: &IdentifierService,
    config: &RlsConfig,
    preset: Preset,
    preset_name: &str,
    expansion: &mut RlsExpansion,
    expressions: &mut PerOp,
) -> Result<(), RlsError> {
    let mut warnings = Vec::new();
    let mut params = std::collections::BTreeMap::new();
    for name in preset.required_params() {
        let value = resolve_param(table, config, preset_name, name, &mut warnings)?;
        params.insert(*name, value);
    }
    let param = |name: &str| params[name].clone();

    match preset {
        Preset::Owner => {
            let owner = param("owner_column");
            expressions.set_all(&format!("auth.uid() = {owner}"));
            expansion.index_requests.push(preset_index(&[&owner]));
        }
        Preset::PublicRead => {
            let owner = param("owner_column");
            let gated = format!("auth.uid() = {owner}");
            expressions.set("select", "true".to_string());
            expressions.set("insert", gated.clone());
            expressions.set("update", gated.clone());
            expressions.set("delete", gated);
            expansion.index_requests.push(preset_index(&[&owner]));
        }
        Preset::Authenticated => {
            expressions.set_all("auth.uid() IS NOT NULL");
        }
        Preset::Tenant => {
            let tenant_col = param("tenant_column");
            let membership = param("membership_table");
            let member_name = clamp_identifier(&format!("rls_{membership}_member"));
            let admin_name = clamp_identifier(&format!("rls_{membership}_admin"));
            let member_fn = ids.quote_if_needed(&member_name);
            let admin_fn = ids.quote_if_needed(&admin_name);
            let membership_q = quote(&membership);
            expansion.helper_functions.push(HelperFunction {
                name: member_name,
                arg_signature: "uuid",
                sql: format!(
                    "CREATE OR REPLACE FUNCTION {member_fn}(tenant uuid) RETURNS boolean LANGUAGE sql STABLE AS $$ SELECT EXISTS (SELECT 1 FROM {membership_q} m WHERE m.tenant_id = tenant AND m.user_id = auth.uid()) $$;"
                ),
            });
            expansion.helper_functions.push(HelperFunction {
                name: admin_name,
                arg_signature: "uuid",
                sql: format!(
                    "CREATE OR REPLACE FUNCTION {admin_fn}(tenant uuid) RETURNS boolean LANGUAGE sql STABLE AS $$ SELECT EXISTS (SELECT 1 FROM {membership_q} m WHERE m.tenant_id = tenant AND m.user_id = auth.uid() AND m.role IN ('owner', 'admin')) $$;"
                ),
            });
            let member = format!("{member_fn}({tenant_col})");
            expressions.set("select", member.clone());
            expressions.set("insert", member.clone());
            expressions.set("update", member);
            // DELETE needs the owner/admin role, not mere membership.
            expressions.set("delete", format!("{admin_fn}({tenant_col})"));
            expansion.index_requests.push(preset_index(&[&tenant_col]));
        }
        Preset::AdminOnly => {
            let membership = param("membership_table");
            let admin_name = clamp_identifier(&format!("rls_{membership}_is_admin"));
            let admin_fn = ids.quote_if_needed(&admin_name);
            let membership_q = quote(&membership);
            expansion.helper_functions.push(HelperFunction {
                name: admin_name,
                arg_signature: "",
                sql: format!(
                    "CREATE OR REPLACE FUNCTION {admin_fn}() RETURNS boolean LANGUAGE sql STABLE AS $$ SELECT EXISTS (SELECT 1 FROM {membership_q} m WHERE m.user_id = auth.uid() AND m.role = 'admin') $$;"
                ),
            });
            expressions.set_all(&format!("{admin_fn}()"));
        }
        Preset::SoftDelete => {
            let col = param("deleted_at_column");
            let live = format!("{col} IS NULL");
            expressions.set("select", live.clone());
            expressions.set("insert", "true".to_string());
            expressions.set("update", live);
            // Soft-deleted rows are never hard-deleted through RLS.
            expressions.set("delete", "false".to_string());
            expansion.index_requests.push(preset_index(&[&col]));
        }
        Preset::TimeWindow => {
            let start = param("start_column");
            let end = param("end_column");
            expressions.set_all(&format!("now() >= {start} AND now() < {end}"));
            expansion.index_requests.push(preset_index(&[&start, &end]));
        }
        Preset::Hierarchical => {
            let org_col = param("org_column");
            let hierarchy = param("org_hierarchy_table");
            let view_name = clamp_identifier(&format!("{hierarchy}_reachable"));
            let view_q = quote(&view_name);
            let hierarchy_q = quote(&hierarchy);
            let reaches_name = clamp_identifier(&format!("rls_{hierarchy}_reaches"));
            let reaches_fn = ids.quote_if_needed(&reaches_name);
            expansion.views.push(AuxiliaryView {
                name: view_name.clone(),
                sql: format!(
                    "CREATE OR REPLACE VIEW {view_q} AS WITH RECURSIVE reachable(org_id) AS (SELECT current_setting('app.current_org_id', true)::uuid UNION SELECT h.child_id FROM {hierarchy_q} h JOIN reachable r ON h.parent_id = r.org_id) SELECT org_id FROM reachable;"
                ),
            });
            expansion.helper_functions.push(HelperFunction {
                name: reaches_name,
                arg_signature: "uuid",
                sql: format!(
                    "CREATE OR REPLACE FUNCTION {reaches_fn}(target uuid) RETURNS boolean LANGUAGE sql STABLE AS $$ SELECT target IN (SELECT org_id FROM {view_q}) $$;"
                ),
            });
            expressions.set_all(&format!("{reaches_fn}({org_col})"));
            expansion.index_requests.push(preset_index(&[&org_col]));
        }
    }
    expansion.warnings.append(&mut warnings);
    Ok(())
}

fn preset_index(columns: &[&str]) -> IndexRequest {
    IndexRequest {
        columns: columns.iter().map(|c| c.to_string()).collect(),
        unique: false,
        where_clause: None,
        method: None,
        name: None,
    }
}

/// Resolve a preset parameter: explicit option, then tenancy/ownership
/// affinity annotations, then column-name discovery.
fn resolve_param(
    table: &Table,
    config: &RlsConfig,
    preset: &str,
    param: &str,
    warnings: &mut Vec<String>,
) -> Result<String, RlsError> {
    let affinity = affinity_hint(table, param);
    if let Some(explicit) = config.preset_params.get(param) {
        if let Some(hint) = affinity {
            if hint != *explicit {
                warnings.push(format!(
                    "preset option {param}=\"{explicit}\" overrides the table's affinity annotation (\"{hint}\")"
                ));
            }
        }
        return Ok(explicit.clone());
    }
    if let Some(hint) = affinity {
        return Ok(hint);
    }
    for candidate in discovery_candidates(param) {
        if table.fields.iter().any(|f| f.name == *candidate) {
            return Ok((*candidate).to_string());
        }
    }
    Err(RlsError::MissingPresetParam {
        table: table.name.clone(),
        preset: preset.to_string(),
        param: param.to_string(),
    })
}

/// `tenant(by)` / `owner(column)` hints for the matching parameter names.
fn affinity_hint(table: &Table, param: &str) -> Option<String> {
    let ann_name = match param {
        "owner_column" => annotations::OWNER,
        "tenant_column" | "org_column" => annotations::TENANT,
        _ => return None,
    };
    let ann = table.annotation(ann_name)?;
    let key = if ann_name == annotations::TENANT {
        "by"
    } else {
        "column"
    };
    ann.str_arg(key)
        .or_else(|| ann.positional().and_then(Value::as_str))
        .map(str::to_string)
}

/// Render the `TO` clause: `public` alone stays bare; role names are SQL
/// identifiers, quoted only when the quoting policy requires it.
fn role_clause(roles: &[String], ids: &IdentifierService) -> String {
    if roles.len() == 1 && roles[0] == "public" {
        return "public".to_string();
    }
    roles
        .iter()
        .map(|r| ids.quote_if_needed(r))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ident::IdentifierStrategy;
    use crate::ir::build;
    use crate::parser::parse_document;

    fn table_from(src: &str) -> Table {
        build(&parse_document(src).unwrap())
            .unwrap()
            .schema
            .tables
            .remove(0)
    }

    fn ids() -> IdentifierService {
        IdentifierService::new(IdentifierStrategy::Preserve)
    }

    #[test]
    fn owner_preset_discovers_created_by() {
        let table = table_from(
            r#"type Doc @table @rls(preset: "owner") {
                 id: ID! @primaryKey
                 created_by: ID!
               }"#,
        );
        let exp = expand(&table, &ids()).unwrap().unwrap();
        assert_eq!(exp.policies.len(), 4);
        assert!(
            exp.policies[0]
                .create_sql
                .contains("USING (auth.uid() = created_by)")
        );
        let ops: Vec<&str> = exp.policies.iter().map(|p| p.op).collect();
        assert_eq!(ops, ["select", "insert", "update", "delete"]);
    }

    #[test]
    fn missing_param_is_an_error() {
        let table = table_from(
            r#"type Doc @table @rls(preset: "tenant") {
                 id: ID! @primaryKey
                 tenant_id: ID!
               }"#,
        );
        assert_eq!(
            expand(&table, &ids()).unwrap_err(),
            RlsError::MissingPresetParam {
                table: "Doc".to_string(),
                preset: "tenant".to_string(),
                param: "membership_table".to_string(),
            }
        );
    }

    #[test]
    fn unknown_preset_is_an_error() {
        let table = table_from(r#"type Doc @table @rls(preset: "nope") { id: ID! }"#);
        assert!(matches!(
            expand(&table, &ids()),
            Err(RlsError::UnknownPreset { .. })
        ));
    }

    #[test]
    fn tenant_preset_emits_helpers_and_admin_gated_delete() {
        let table = table_from(
            r#"type Doc @table @rls(preset: "tenant", membership_table: "memberships") {
                 id: ID! @primaryKey
                 org_id: ID!
               }"#,
        );
        let exp = expand(&table, &ids()).unwrap().unwrap();
        assert_eq!(exp.helper_functions.len(), 2);
        assert!(exp.helper_functions[0].sql.contains("rls_memberships_member"));
        let delete = exp.policies.iter().find(|p| p.op == "delete").unwrap();
        assert!(delete.create_sql.contains("rls_memberships_admin(org_id)"));
    }

    #[test]
    fn explicit_param_overrides_affinity_with_warning() {
        let table = table_from(
            r#"type Doc @table @tenant(by: "workspace_id") @rls(preset: "tenant", tenant_column: "org_id", membership_table: "memberships") {
                 id: ID! @primaryKey
                 org_id: ID!
                 workspace_id: ID!
               }"#,
        );
        let exp = expand(&table, &ids()).unwrap().unwrap();
        assert_eq!(exp.warnings.len(), 1);
        let select = exp.policies.iter().find(|p| p.op == "select").unwrap();
        assert!(select.create_sql.contains("(org_id)"));
    }

    #[test]
    fn default_config_gates_delete() {
        let table = table_from("type Doc @table @rls { id: ID! }");
        let exp = expand(&table, &ids()).unwrap().unwrap();
        let delete = exp.policies.iter().find(|p| p.op == "delete").unwrap();
        assert!(delete.create_sql.contains("USING (false)"));
        assert!(delete.create_sql.contains("TO authenticated"));
    }

    #[test]
    fn public_roles_render_bare() {
        let table = table_from(r#"type Doc @table @rls(roles: ["public"]) { id: ID! }"#);
        let exp = expand(&table, &ids()).unwrap().unwrap();
        assert!(exp.policies[0].create_sql.contains("TO public "));
    }

    #[test]
    fn disabled_rls_expands_to_nothing() {
        let table = table_from("type Doc @table @rls(enabled: false) { id: ID! }");
        assert_eq!(expand(&table, &ids()).unwrap(), None);
    }

    #[test]
    fn soft_delete_preset_blocks_delete() {
        let table = table_from(
            r#"type Doc @table @rls(preset: "soft-delete") {
                 id: ID! @primaryKey
                 deleted_at: DateTime
               }"#,
        );
        let exp = expand(&table, &ids()).unwrap().unwrap();
        let select = exp.policies.iter().find(|p| p.op == "select").unwrap();
        assert!(select.create_sql.contains("deleted_at IS NULL"));
        let delete = exp.policies.iter().find(|p| p.op == "delete").unwrap();
        assert!(delete.create_sql.contains("USING (false)"));
    }
}
