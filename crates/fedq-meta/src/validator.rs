//! Post-load validation of a merged metadata store.
//!
//! Each [`MetadataRule`] inspects (and where it binds references, updates)
//! the store and appends findings to a [`ValidatorReport`]. Findings are data,
//! not errors: callers decide whether a store with errors is usable.

use std::fmt;

use fedq_core::schema::Field;
use fedq_lang::{Command, QueryParser};
use serde::Serialize;
use tracing::{debug, warn};

use crate::factory::bind_foreign_key;
use crate::model::{Column, Datatype, ReferencedKey, TableRef};
use crate::resolver::{QueryResolver, ResolveContext};
use crate::store::MetadataStore;
use crate::vdb::VdbMetaData;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Severity {
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidatorFailure {
    pub status: Severity,
    pub message: String,
    /// Fully qualified name of the offending record, when there is one.
    pub object: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidatorReport {
    items: Vec<ValidatorFailure>,
}

impl ValidatorReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn error(&mut self, object: Option<String>, message: impl Into<String>) {
        self.push(Severity::Error, object, message.into());
    }

    pub fn warning(&mut self, object: Option<String>, message: impl Into<String>) {
        self.push(Severity::Warning, object, message.into());
    }

    fn push(&mut self, status: Severity, object: Option<String>, message: String) {
        self.items.push(ValidatorFailure {
            status,
            message,
            object,
        });
    }

    pub fn items(&self) -> &[ValidatorFailure] {
        &self.items
    }

    pub fn has_items(&self) -> bool {
        !self.items.is_empty()
    }

    pub fn has_errors(&self) -> bool {
        self.items.iter().any(|i| i.status == Severity::Error)
    }
}

impl fmt::Display for ValidatorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for item in &self.items {
            let level = match item.status {
                Severity::Warning => "WARNING",
                Severity::Error => "ERROR",
            };
            match &item.object {
                Some(o) => writeln!(f, "{} {}: {}", level, o, item.message)?,
                None => writeln!(f, "{} {}", level, item.message)?,
            }
        }
        Ok(())
    }
}

pub trait MetadataRule {
    fn name(&self) -> &'static str;
    fn execute(&self, vdb: &VdbMetaData, store: &mut MetadataStore, report: &mut ValidatorReport);
}

pub struct MetadataValidator {
    rules: Vec<Box<dyn MetadataRule>>,
}

impl Default for MetadataValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl MetadataValidator {
    /// The standard pipeline, in order.
    pub fn new() -> Self {
        Self {
            rules: vec![
                Box::new(SourceModelArtifacts),
                Box::new(CrossSchemaResolver),
                Box::new(ResolveQueryPlans),
                Box::new(MinimalMetadata),
            ],
        }
    }

    pub fn with_rules(rules: Vec<Box<dyn MetadataRule>>) -> Self {
        Self { rules }
    }

    pub fn validate(&self, vdb: &VdbMetaData, store: &mut MetadataStore) -> ValidatorReport {
        let mut report = ValidatorReport::new();
        for rule in &self.rules {
            let before = report.items().len();
            rule.execute(vdb, store, &mut report);
            debug!(rule = rule.name(), items = report.items().len() - before, "metadata rule executed");
        }
        if report.has_errors() {
            warn!(vdb = %vdb.name, version = vdb.version, "metadata validation reported errors");
        }
        report
    }
}

fn qualified(schema: &str, name: &str) -> Option<String> {
    Some(format!("{}.{}", schema, name))
}

/// Physical models hold only source artifacts, virtual models only views
/// and virtual procedures.
pub struct SourceModelArtifacts;

impl MetadataRule for SourceModelArtifacts {
    fn name(&self) -> &'static str {
        "SourceModelArtifacts"
    }

    fn execute(&self, vdb: &VdbMetaData, store: &mut MetadataStore, report: &mut ValidatorReport) {
        for model in &vdb.models {
            let Some(schema) = store.schema(&model.name) else {
                continue;
            };
            let physical = model.is_physical();
            for table in schema.tables.values() {
                if physical && table.is_virtual() {
                    report.error(
                        qualified(&schema.name, &table.name),
                        format!("view '{}' is defined in physical model '{}'", table.name, model.name),
                    );
                } else if !physical && table.is_physical() {
                    report.error(
                        qualified(&schema.name, &table.name),
                        format!("foreign table '{}' is defined in virtual model '{}'", table.name, model.name),
                    );
                }
            }
            for procedure in schema.procedures.values() {
                if physical && procedure.is_virtual {
                    report.error(
                        qualified(&schema.name, &procedure.name),
                        format!("virtual procedure '{}' is defined in physical model '{}'", procedure.name, model.name),
                    );
                } else if !physical && !procedure.is_virtual {
                    report.error(
                        qualified(&schema.name, &procedure.name),
                        format!("source procedure '{}' is defined in virtual model '{}'", procedure.name, model.name),
                    );
                }
            }
        }
    }
}

/// Binds foreign keys whose referenced table lives in another schema (or
/// could not be bound when its own schema was merged).
pub struct CrossSchemaResolver;

impl MetadataRule for CrossSchemaResolver {
    fn name(&self) -> &'static str {
        "CrossSchemaResolver"
    }

    fn execute(&self, _vdb: &VdbMetaData, store: &mut MetadataStore, report: &mut ValidatorReport) {
        let mut bindings: Vec<(String, String, usize, ReferencedKey)> = Vec::new();
        for schema in store.schemas() {
            for table in schema.tables.values() {
                for (i, fk) in table.foreign_keys.iter().enumerate() {
                    if fk.is_resolved() {
                        continue;
                    }
                    let object = qualified(&schema.name, &table.name);
                    let target = match fk.reference_table_name.split_once('.') {
                        Some((s, t)) => store.schema(s).and_then(|s| s.table(t).map(|t| (s, t))),
                        None => schema.table(&fk.reference_table_name).map(|t| (schema, t)),
                    };
                    let Some((target_schema, target_table)) = target else {
                        report.error(
                            object,
                            format!(
                                "foreign key '{}' references unknown table '{}'",
                                fk.key.name, fk.reference_table_name
                            ),
                        );
                        continue;
                    };
                    match bind_foreign_key(fk, &target_schema.name, target_table) {
                        Some(bound) => bindings.push((
                            schema.name.clone(),
                            table.name.clone(),
                            i,
                            bound,
                        )),
                        None => report.error(
                            object,
                            format!(
                                "foreign key '{}' matches no primary or unique key of '{}' with {} column(s)",
                                fk.key.name,
                                fk.reference_table_name,
                                fk.key.columns.len()
                            ),
                        ),
                    }
                }
            }
        }
        for (schema, table, i, bound) in bindings {
            if let Some(fk) = store
                .schema_mut(&schema)
                .and_then(|s| s.tables.get_mut(&table))
                .and_then(|t| t.foreign_keys.get_mut(i))
            {
                fk.resolved = Some(bound);
            }
        }
    }
}

/// Resolves view transformations, trigger plans and virtual procedure bodies
/// against the whole store.
pub struct ResolveQueryPlans;

enum PlanOwner {
    View { table: String },
    Trigger { table: String, event: &'static str },
    Procedure { procedure: String },
}

impl ResolveQueryPlans {
    fn resolve(
        store: &MetadataStore,
        schema: &str,
        owner: &PlanOwner,
    ) -> std::result::Result<Option<Vec<Field>>, String> {
        let Some(s) = store.schema(schema) else {
            return Ok(None);
        };
        let (text, mut ctx) = match owner {
            PlanOwner::View { table } => {
                let Some(t) = s.table(table) else { return Ok(None) };
                (t.select_transformation.clone(), ResolveContext::new())
            }
            PlanOwner::Trigger { table, event } => {
                let Some(t) = s.table(table) else { return Ok(None) };
                let plan = match *event {
                    "INSERT" => t.insert_plan.clone(),
                    "UPDATE" => t.update_plan.clone(),
                    _ => t.delete_plan.clone(),
                };
                (plan, ResolveContext::for_trigger(t))
            }
            PlanOwner::Procedure { procedure } => {
                let Some(p) = s.procedure(procedure) else { return Ok(None) };
                (p.query_plan.clone(), ResolveContext::for_procedure(p))
            }
        };
        let Some(text) = text else {
            return Ok(None);
        };
        let mut command = QueryParser::parse_command(&text).map_err(|e| e.to_string())?;
        if matches!(owner, PlanOwner::View { .. }) && !matches!(command, Command::Query(_)) {
            return Err("a view definition must be a query".into());
        }
        QueryResolver::new(store)
            .resolve_command(&mut command, &mut ctx)
            .map(Some)
            .map_err(|e| e.to_string())
    }
}

impl MetadataRule for ResolveQueryPlans {
    fn name(&self) -> &'static str {
        "ResolveQueryPlans"
    }

    fn execute(&self, _vdb: &VdbMetaData, store: &mut MetadataStore, report: &mut ValidatorReport) {
        let mut work: Vec<(String, PlanOwner)> = Vec::new();
        for schema in store.schemas() {
            for table in schema.tables.values() {
                if table.is_virtual() {
                    work.push((schema.name.clone(), PlanOwner::View { table: table.name.clone() }));
                }
                for (event, plan) in [
                    ("INSERT", &table.insert_plan),
                    ("UPDATE", &table.update_plan),
                    ("DELETE", &table.delete_plan),
                ] {
                    if plan.is_some() {
                        work.push((
                            schema.name.clone(),
                            PlanOwner::Trigger {
                                table: table.name.clone(),
                                event,
                            },
                        ));
                    }
                }
            }
            for procedure in schema.procedures.values() {
                if procedure.is_virtual {
                    work.push((
                        schema.name.clone(),
                        PlanOwner::Procedure {
                            procedure: procedure.name.clone(),
                        },
                    ));
                }
            }
        }

        // Views first, in declaration order, so later views can select from
        // views whose columns were just derived.
        work.sort_by_key(|(_, owner)| !matches!(owner, PlanOwner::View { .. }));

        for (schema, owner) in work {
            let (name, label) = match &owner {
                PlanOwner::View { table } => (table.clone(), "view"),
                PlanOwner::Trigger { table, .. } => (table.clone(), "trigger"),
                PlanOwner::Procedure { procedure } => (procedure.clone(), "procedure"),
            };
            match Self::resolve(store, &schema, &owner) {
                Ok(Some(fields)) => {
                    if let PlanOwner::View { table } = &owner {
                        apply_view_projection(store, &schema, table, &fields, report);
                    }
                }
                Ok(None) => {}
                Err(message) => report.error(
                    qualified(&schema, &name),
                    format!("{} '{}' failed to resolve: {}", label, name, message),
                ),
            }
        }

        bind_materialized_tables(store, report);
    }
}

fn apply_view_projection(
    store: &mut MetadataStore,
    schema: &str,
    table: &str,
    fields: &[Field],
    report: &mut ValidatorReport,
) {
    let Some(view) = store.schema_mut(schema).and_then(|s| s.tables.get_mut(table)) else {
        return;
    };
    if view.columns.is_empty() {
        for field in fields {
            let datatype = Datatype::new(field.data_type.name(), field.data_type);
            view.add_column(Column::new(
                field.name.clone(),
                datatype,
                fedq_core::id::generate_record_uuid(),
            ));
        }
    } else if view.columns.len() != fields.len() {
        report.error(
            qualified(schema, table),
            format!(
                "view '{}' declares {} columns but its query projects {}",
                table,
                view.columns.len(),
                fields.len()
            ),
        );
    }
}

fn bind_materialized_tables(store: &mut MetadataStore, report: &mut ValidatorReport) {
    let mut bindings = Vec::new();
    for schema in store.schemas() {
        for table in schema.tables.values() {
            let (true, Some(target)) = (table.materialized, &table.materialized_table_name) else {
                continue;
            };
            match store.find_table(target) {
                Ok((s, t)) => bindings.push((
                    schema.name.clone(),
                    table.name.clone(),
                    TableRef {
                        schema: s.to_string(),
                        name: t.name.clone(),
                    },
                )),
                Err(e) => report.error(
                    qualified(&schema.name, &table.name),
                    format!("materialized table '{}' cannot be used: {}", target, e),
                ),
            }
        }
    }
    for (schema, table, target) in bindings {
        if let Some(t) = store.schema_mut(&schema).and_then(|s| s.tables.get_mut(&table)) {
            t.materialized_table = Some(target);
        }
    }
}

/// Every table needs columns; a physical model should contain something.
pub struct MinimalMetadata;

impl MetadataRule for MinimalMetadata {
    fn name(&self) -> &'static str {
        "MinimalMetadata"
    }

    fn execute(&self, vdb: &VdbMetaData, store: &mut MetadataStore, report: &mut ValidatorReport) {
        for model in &vdb.models {
            let Some(schema) = store.schema(&model.name) else {
                continue;
            };
            if model.is_physical() && schema.is_empty() {
                report.warning(
                    Some(schema.name.clone()),
                    format!("model '{}' defines no tables, procedures or functions", model.name),
                );
            }
            for table in schema.tables.values() {
                if table.columns.is_empty() {
                    report.error(
                        qualified(&schema.name, &table.name),
                        format!("table '{}' has no columns", table.name),
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ddl::parse_ddl;
    use crate::factory::MetadataFactory;
    use crate::model::KeyType;
    use crate::vdb::ModelMetaData;

    struct Fixture {
        vdb: VdbMetaData,
        store: MetadataStore,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                vdb: VdbMetaData::new("myVDB", 1),
                store: MetadataStore::new(),
            }
        }

        fn model(&mut self, name: &str, physical: bool, ddl: &str) -> &mut Self {
            let model = if physical {
                ModelMetaData::physical(name, ddl)
            } else {
                ModelMetaData::virtual_model(name, ddl)
            };
            let mut f = MetadataFactory::new("myVDB", 1, name, physical);
            parse_ddl(&mut f, ddl).unwrap();
            f.merge_into(&mut self.store).unwrap();
            self.vdb.add_model(model);
            self
        }

        fn run(&mut self, rule: &dyn MetadataRule) -> ValidatorReport {
            let mut report = ValidatorReport::new();
            rule.execute(&self.vdb, &mut self.store, &mut report);
            report
        }
    }

    const G1_G2: &str = "create foreign table g1(e1 integer, e2 varchar(12)); \
                         create view g2(e1 integer, e2 varchar(12)) AS select * from foo;";

    #[test]
    fn view_in_physical_model_is_an_error() {
        let mut fx = Fixture::new();
        fx.model("pm1", true, G1_G2);
        let report = fx.run(&SourceModelArtifacts);
        assert!(report.has_items());
        assert_eq!(report.items()[0].object.as_deref(), Some("pm1.g2"));
    }

    #[test]
    fn foreign_table_in_virtual_model_is_an_error() {
        let mut fx = Fixture::new();
        fx.model("vm1", false, G1_G2);
        assert!(fx.run(&SourceModelArtifacts).has_errors());
    }

    #[test]
    fn well_placed_artifacts_pass() {
        let mut fx = Fixture::new();
        fx.model("vm1", false, "create view g2(e1 integer, e2 varchar(12)) AS select * from foo;")
            .model("pm1", true, "create foreign table g1(e1 integer, e2 varchar(12));");
        assert!(!fx.run(&SourceModelArtifacts).has_items());
    }

    #[test]
    fn table_without_columns_is_an_error() {
        let mut fx = Fixture::new();
        fx.model("pm1", true, "create foreign table g1;");
        assert!(fx.run(&MinimalMetadata).has_errors());
    }

    #[test]
    fn empty_physical_model_is_a_warning() {
        let mut fx = Fixture::new();
        fx.model("pm1", true, "");
        let report = fx.run(&MinimalMetadata);
        assert!(report.has_items());
        assert!(!report.has_errors());
    }

    #[test]
    fn unresolvable_plans_are_reported() {
        let mut fx = Fixture::new();
        fx.model("pm1", true, "create foreign table g1(e1 integer, e2 varchar(12));")
            .model(
                "vm1",
                false,
                "create view g1 (e1 integer, e2 varchar(12)) AS select * from pm1.g1; \
                 create view g2 AS select * from pm1.g1; \
                 create trigger on g1 INSTEAD OF UPDATE AS FOR EACH ROW BEGIN ATOMIC END; \
                 create virtual procedure proc1(IN e1 varchar) RETURNS (e1 integer, e2 varchar(12)) AS select * from foo; ",
            );
        let report = fx.run(&ResolveQueryPlans);
        assert_eq!(report.items().len(), 1, "{}", report);
        assert_eq!(report.items()[0].object.as_deref(), Some("vm1.proc1"));
        // g2 picked up its columns from the projection
        assert_eq!(fx.store.schema("vm1").unwrap().table("g2").unwrap().columns.len(), 2);
    }

    #[test]
    fn view_over_missing_model_is_reported() {
        let mut fx = Fixture::new();
        fx.model(
            "vm1",
            false,
            "create view g1 (e1 integer, e2 varchar(12)) AS select * from pm1.g1; \
             create view g2 AS select * from pm1.g1;",
        );
        assert_eq!(fx.run(&ResolveQueryPlans).items().len(), 2);
    }

    fn cross_schema(ddl1: &str, ddl2: &str) -> (Fixture, ValidatorReport) {
        let mut fx = Fixture::new();
        fx.model("pm1", true, ddl1).model("pm2", true, ddl2);
        let report = fx.run(&CrossSchemaResolver);
        (fx, report)
    }

    fn first_fk(fx: &Fixture) -> Option<ReferencedKey> {
        fx.store.schema("pm2").unwrap().table("G2").unwrap().foreign_keys[0]
            .resolved
            .clone()
    }

    #[test]
    fn cross_schema_fk_binds_primary_key() {
        let (fx, report) = cross_schema(
            "CREATE FOREIGN TABLE G1(g1e1 integer, g1e2 varchar CONSTRAINT PRIMARY KEY(g1e1, g1e2));",
            "CREATE FOREIGN TABLE G2( g2e1 integer, g2e2 varchar CONSTRAINT PRIMARY KEY(g2e1, g2e2), \
             FOREIGN KEY (g2e1, g2e2) REFERENCES pm1.G1(g1e1, g1e2))",
        );
        assert!(!report.has_items(), "{}", report);
        let key = first_fk(&fx).unwrap();
        assert_eq!(key.key_type, KeyType::Primary);
        assert_eq!(key.columns.len(), 2);
        assert_eq!(key.columns[0], "g1e1");
    }

    #[test]
    fn cross_schema_fk_binds_unique_key() {
        let (fx, report) = cross_schema(
            "CREATE FOREIGN TABLE G1(g1e1 integer, g1e2 varchar CONSTRAINT UNIQUE(g1e2));",
            "CREATE FOREIGN TABLE G2(g2e1 integer, g2e2 varchar CONSTRAINT FOREIGN KEY (g2e2) REFERENCES pm1.G1(g1e2))",
        );
        assert!(!report.has_items(), "{}", report);
        let key = first_fk(&fx).unwrap();
        assert_eq!(key.key_type, KeyType::Unique);
        assert_eq!(key.columns, vec!["g1e2".to_string()]);
    }

    #[test]
    fn optional_reference_columns_bind_primary_key() {
        let (fx, report) = cross_schema(
            "CREATE FOREIGN TABLE G1(g1e1 integer, g1e2 varchar CONSTRAINT PRIMARY KEY(g1e1, g1e2));",
            "CREATE FOREIGN TABLE G2( g2e1 integer, g2e2 varchar CONSTRAINT FOREIGN KEY (g2e1, g2e2) REFERENCES pm1.G1)",
        );
        assert!(!report.has_items(), "{}", report);
        assert_eq!(first_fk(&fx).unwrap().columns[0], "g1e1");
    }

    #[test]
    fn missing_primary_key_fails() {
        let (fx, report) = cross_schema(
            "CREATE FOREIGN TABLE G1(g1e1 integer, g1e2 varchar CONSTRAINT UNIQUE(g1e1, g1e2));",
            "CREATE FOREIGN TABLE G2( g2e1 integer, g2e2 varchar CONSTRAINT PRIMARY KEY(g2e1, g2e2), \
             FOREIGN KEY (g2e1, g2e2) REFERENCES pm1.G1)",
        );
        assert!(report.has_errors());
        assert!(first_fk(&fx).is_none());
    }

    #[test]
    fn key_arity_must_match() {
        let (_, report) = cross_schema(
            "CREATE FOREIGN TABLE G1(a integer, b integer, c integer CONSTRAINT PRIMARY KEY(a), UNIQUE(a, b));",
            "CREATE FOREIGN TABLE G2(x integer, y integer CONSTRAINT FOREIGN KEY (x, y) REFERENCES pm1.G1(a, b))",
        );
        assert!(!report.has_items(), "{}", report);

        let (_, report) = cross_schema(
            "CREATE FOREIGN TABLE G1(a integer, b integer CONSTRAINT PRIMARY KEY(a));",
            "CREATE FOREIGN TABLE G2(x integer, y integer CONSTRAINT FOREIGN KEY (x, y) REFERENCES pm1.G1)",
        );
        assert!(report.has_errors());
    }

    #[test]
    fn materialized_views() {
        let mut fx = Fixture::new();
        fx.model("pm1", true, "CREATE FOREIGN TABLE G1(e1 integer, e2 varchar);")
            .model(
                "vm1",
                false,
                "CREATE VIEW G2 OPTIONS (MATERIALIZED 'YES') AS SELECT * FROM pm1.G1",
            );
        assert!(!fx.run(&ResolveQueryPlans).has_items());

        let mut fx = Fixture::new();
        fx.model("pm1", true, "CREATE FOREIGN TABLE G1(e1 integer, e2 varchar);")
            .model(
                "vm1",
                false,
                "CREATE VIEW G2 OPTIONS (MATERIALIZED 'YES', MATERIALIZED_TABLE 'pm1.G1') AS SELECT * FROM pm1.G1",
            );
        let report = fx.run(&ResolveQueryPlans);
        assert!(!report.has_items(), "{}", report);
        let target = fx.store.schema("vm1").unwrap().table("G2").unwrap().materialized_table.clone();
        assert_eq!(target.unwrap().name, "G1");
    }

    #[test]
    fn full_pipeline_reports_in_order() {
        let mut fx = Fixture::new();
        fx.model("pm1", true, G1_G2);
        let report = MetadataValidator::new().validate(&fx.vdb, &mut fx.store);
        assert!(report.has_errors());
        assert!(report.items()[0].message.contains("physical model"));
    }
}
