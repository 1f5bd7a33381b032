//! Cross-cutting invariants of the compile pipeline: determinism,
//! idempotence, additivity, dedup soundness, identifier stability and
//! snapshot round-trips.

use accrete::postgres::{IndexDecision, IndexDeduplicator};
use accrete::{
    CompileConfig, IdentifierService, IdentifierStrategy, Snapshot, compile, compile_with_prior,
};
use accrete::ir::IndexRequest;
use pretty_assertions::assert_eq;

const SCHEMA: &str = r#"
    # Organizations own users and documents.
    type Org @table {
      id: ID! @primaryKey
      name: String! @unique
      domains: [String!]
    }

    type User @table @rls(preset: "owner") {
      id: ID! @primaryKey
      org_id: ID! @foreignKey(ref: "Org.id") @index
      created_by: ID!
      email: String! @unique
      settings: JSON @default(expr: "'{}'::jsonb")
    }
"#;

#[test]
fn compile_is_deterministic() {
    for strategy in [
        IdentifierStrategy::Preserve,
        IdentifierStrategy::SnakeCase,
        IdentifierStrategy::Lower,
        IdentifierStrategy::Upper,
    ] {
        let config = CompileConfig {
            identifier_strategy: strategy,
            ..CompileConfig::default()
        };
        let a = compile(SCHEMA, &config).unwrap();
        let b = compile(SCHEMA, &config).unwrap();
        assert_eq!(a.ddl.text(), b.ddl.text());
        assert_eq!(a.snapshot.to_json(), b.snapshot.to_json());
    }
}

#[test]
fn recompiling_against_own_snapshot_is_idempotent() {
    let config = CompileConfig::default();
    let bootstrap = compile(SCHEMA, &config).unwrap();
    // Persist and reload, as a real run would.
    let reloaded = Snapshot::from_json(&bootstrap.snapshot.to_json()).unwrap();
    let migration = compile_with_prior(SCHEMA, &reloaded, &config).unwrap();
    assert!(migration.plan.is_empty());
    assert!(migration.expand.is_empty());
    assert!(migration.validate.is_empty());
    // The superseding snapshot is byte-identical to the prior one.
    assert_eq!(migration.snapshot.to_json(), bootstrap.snapshot.to_json());
}

#[test]
fn diffs_are_additive_even_under_destruction() {
    let config = CompileConfig::default();
    let prior = compile(SCHEMA, &config).unwrap().snapshot;
    // Remove a table, a column, and change a type: nothing may be planned.
    let shrunk = r#"
        type Org @table {
          id: ID! @primaryKey
          name: Int!
        }
    "#;
    let migration = compile_with_prior(shrunk, &prior, &config).unwrap();
    assert!(migration.plan.is_empty());
    assert_eq!(migration.plan.diagnostics.len(), 3);
    for diagnostic in &migration.plan.diagnostics {
        assert!(diagnostic.contains("out of scope"));
    }
}

#[test]
fn composite_pk_prefix_dedup_is_sound() {
    fn request(columns: &[&str], partial: bool) -> IndexRequest {
        IndexRequest {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            method: None,
            name: None,
            unique: false,
            where_clause: partial.then(|| "a IS NOT NULL".to_string()),
        }
    }

    let mut dedup = IndexDeduplicator::from_inventory(
        "T",
        vec!["a".to_string(), "b".to_string()],
        Vec::new(),
    );
    assert!(matches!(
        dedup.evaluate(&request(&["a"], false)),
        IndexDecision::Skip { .. }
    ));
    assert!(matches!(
        dedup.evaluate(&request(&["a", "b"], false)),
        IndexDecision::Skip { .. }
    ));
    // Partial requests on the same columns are retained.
    assert_eq!(dedup.evaluate(&request(&["a"], true)), IndexDecision::Emit);
    assert_eq!(
        dedup.evaluate(&request(&["a", "b"], true)),
        IndexDecision::Emit
    );
    // Non-prefix column order is not covered.
    assert_eq!(dedup.evaluate(&request(&["b", "a"], false)), IndexDecision::Emit);
}

#[test]
fn identifier_mapping_is_stable() {
    let snake = IdentifierService::new(IdentifierStrategy::SnakeCase);
    for name in ["createdAt", "HTMLBody", "already_snake", "X"] {
        let once = snake.column(name);
        assert_eq!(snake.column(&once), once, "fixed point failed for {name}");
    }
    let preserve = IdentifierService::new(IdentifierStrategy::Preserve);
    for name in ["createdAt", "weird_Name", "id"] {
        assert_eq!(preserve.column(name), name);
    }
}

#[test]
fn snapshot_round_trip_preserves_structure() {
    let config = CompileConfig::default();
    let out = compile(SCHEMA, &config).unwrap();
    let json = out.snapshot.to_json();
    let reloaded = Snapshot::from_json(&json).unwrap();
    assert_eq!(reloaded, out.snapshot);
    assert_eq!(reloaded.to_schema(), out.snapshot.to_schema());
    // Serialization of the reloaded snapshot is byte-identical.
    assert_eq!(reloaded.to_json(), json);
}

#[test]
fn rls_enable_precedes_policies_for_every_table() {
    let config = CompileConfig::default();
    let out = compile(
        r#"
        type A @table @rls {
          id: ID! @primaryKey
        }
        type B @table @rls(preset: "authenticated") {
          id: ID! @primaryKey
        }
        "#,
        &config,
    )
    .unwrap();
    let text = out.ddl.text();
    for table in ["As", "Bs"] {
        let enable = text
            .find(&format!("ALTER TABLE \"{table}\" ENABLE ROW LEVEL SECURITY;"))
            .unwrap();
        let policy = text.find(&format!("CREATE POLICY \"policy_{table}_select")).unwrap();
        assert!(enable < policy);
    }
}

#[test]
fn failed_compile_produces_no_output() {
    let config = CompileConfig::default();
    // Unknown scalar in the second table; collect mode reports it, and the
    // caller gets no DDL, no snapshot, no evidence.
    let result = compile(
        r#"
        type A @table { id: ID! @primaryKey }
        type B @table { id: Mystery! }
        "#,
        &config,
    );
    assert!(result.is_err());
}
