//! Validation of whole VDBs loaded from their YAML descriptors.

use fedq_meta::validator::{Severity, SourceModelArtifacts};
use fedq_meta::{load_store, MetadataStore, MetadataValidator, ValidatorReport, VdbMetaData};

fn load(yaml: &str) -> (VdbMetaData, MetadataStore) {
    let vdb = VdbMetaData::from_yaml(yaml).expect("descriptor");
    let store = load_store(&vdb).expect("store");
    (vdb, store)
}

fn validate(yaml: &str) -> (ValidatorReport, MetadataStore) {
    let (vdb, mut store) = load(yaml);
    let report = fedq_meta::vdb::validate(&vdb, &mut store);
    (report, store)
}

#[test]
fn test_view_in_physical_model_is_reported() {
    let (vdb, mut store) = load(
        r#"
name: myVDB
models:
  - name: pm1
    type: physical
    ddl: |
      CREATE FOREIGN TABLE G1(e1 integer, e2 varchar(12));
      CREATE VIEW G2(e1 integer, e2 varchar(12)) AS select * from foo;
"#,
    );
    let report = MetadataValidator::with_rules(vec![Box::new(SourceModelArtifacts)])
        .validate(&vdb, &mut store);
    assert!(report.has_items());
    assert_eq!(report.items().len(), 1);
    assert_eq!(report.items()[0].status, Severity::Error);
    assert_eq!(report.items()[0].object.as_deref(), Some("pm1.G2"));
}

#[test]
fn test_artifacts_in_their_own_model_kinds_pass() {
    let (vdb, mut store) = load(
        r#"
name: myVDB
models:
  - name: pm1
    type: physical
    ddl: "CREATE FOREIGN TABLE G1(e1 integer, e2 varchar(12));"
  - name: vm1
    type: virtual
    ddl: "CREATE VIEW G2(e1 integer, e2 varchar(12)) AS select * from foo;"
"#,
    );
    let report = MetadataValidator::with_rules(vec![Box::new(SourceModelArtifacts)])
        .validate(&vdb, &mut store);
    assert!(!report.has_items(), "{}", report);
}

#[test]
fn test_two_column_foreign_key_binds_to_unique_key_across_models() {
    let (report, store) = validate(
        r#"
name: keys
models:
  - name: pm1
    type: physical
    ddl: "CREATE FOREIGN TABLE g1(a integer, b varchar CONSTRAINT UNIQUE (a, b));"
  - name: pm2
    type: physical
    ddl: "CREATE FOREIGN TABLE g2(x integer, y varchar CONSTRAINT FOREIGN KEY (x, y) REFERENCES pm1.g1(a, b));"
"#,
    );
    assert!(!report.has_errors(), "{}", report);
    let (_, g2) = store.find_table("pm2.g2").expect("g2");
    let bound = g2.foreign_keys[0].resolved.as_ref().expect("bound");
    assert_eq!(bound.schema, "pm1");
    assert_eq!(bound.columns, vec!["a".to_string(), "b".to_string()]);
}

#[test]
fn test_foreign_key_without_matching_arity_fails() {
    let (report, store) = validate(
        r#"
name: keys
models:
  - name: pm1
    type: physical
    ddl: "CREATE FOREIGN TABLE g1(a integer PRIMARY KEY, b varchar);"
  - name: pm2
    type: physical
    ddl: "CREATE FOREIGN TABLE g2(x integer, y varchar CONSTRAINT FOREIGN KEY (x, y) REFERENCES pm1.g1);"
"#,
    );
    assert!(report.has_errors());
    assert!(report.to_string().contains("2 column(s)"), "{}", report);
    let (_, g2) = store.find_table("pm2.g2").unwrap();
    assert!(!g2.foreign_keys[0].is_resolved());
}

#[test]
fn test_views_resolve_against_other_models() {
    let (report, _) = validate(
        r#"
name: layered
models:
  - name: pm1
    type: physical
    ddl: "CREATE FOREIGN TABLE g1(e1 integer, e2 varchar);"
  - name: vm1
    type: virtual
    ddl: |
      CREATE VIEW v1(a integer, b varchar) AS SELECT e1, e2 FROM pm1.g1;
      CREATE VIEW v2(a integer) AS SELECT a FROM vm1.v1 WHERE b = 'x';
"#,
    );
    assert!(!report.has_items(), "{}", report);
}

#[test]
fn test_unresolvable_view_columns_are_errors() {
    let (report, _) = validate(
        r#"
name: layered
models:
  - name: pm1
    type: physical
    ddl: "CREATE FOREIGN TABLE g1(e1 integer);"
  - name: vm1
    type: virtual
    ddl: "CREATE VIEW v1(a integer) AS SELECT nope FROM pm1.g1;"
"#,
    );
    assert!(report.has_errors());
    assert!(report
        .items()
        .iter()
        .any(|item| item.object.as_deref() == Some("vm1.v1")));
}

#[test]
fn test_empty_physical_model_only_warns() {
    let (report, _) = validate(
        r#"
name: sparse
models:
  - name: pm1
    type: physical
    ddl: ""
"#,
    );
    assert!(report.has_items());
    assert!(!report.has_errors());
    assert_eq!(report.items()[0].status, Severity::Warning);
}
