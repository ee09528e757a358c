//! One VDB, ready to answer queries: metadata, connectors and the shared
//! buffer manager wired together.

use std::sync::Arc;
use std::task::Poll;

use fedq_buffer::BufferManager;
use fedq_core::config::EngineConfig;
use fedq_core::context::WorkContext;
use fedq_core::id::IdGenerator;
use fedq_core::schema::Field;
use fedq_core::types::Row;
use fedq_lang::{Command, Query, QueryParser};
use fedq_meta::{load_store, MetadataStore, QueryResolver, ValidatorReport, VdbMetaData};
use fedq_planner::{PlanResult, RelationalPlanner};
use tracing::{debug, info, warn};

use crate::connector::Connector;
use crate::context::{Bindings, CommandContext};
use crate::data_manager::DataManager;
use crate::error::{ExecError, Result};
use crate::executor::{RelationalPlanExecutor, ResultSetInfo};
use crate::memory::MemoryConnector;

pub struct Engine {
    config: EngineConfig,
    vdb: VdbMetaData,
    store: Arc<MetadataStore>,
    data: Arc<DataManager>,
    buffer: Arc<BufferManager>,
    ids: IdGenerator,
    report: ValidatorReport,
}

impl Engine {
    /// Load and validate a VDB. Physical models without a `source`, or with
    /// `source: memory`, are served by an in-memory connector seeded from
    /// their `rows`.
    pub fn from_vdb(vdb: VdbMetaData, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let mut store = load_store(&vdb)?;
        let report = fedq_meta::vdb::validate(&vdb, &mut store);
        if report.has_errors() {
            return Err(ExecError::Validation(report.to_string()));
        }
        for item in report.items() {
            warn!(vdb = %vdb.name, object = ?item.object, "{}", item.message);
        }

        let data = Arc::new(DataManager::new());
        for model in vdb.models.iter().filter(|m| m.is_physical()) {
            match model.source.as_deref() {
                None | Some("memory") => {
                    let connector = MemoryConnector::from_model(model, &store)?;
                    data.register(&model.name, Arc::new(connector));
                }
                Some(other) => {
                    return Err(ExecError::Unsupported(format!(
                        "model '{}' uses unknown source '{}'",
                        model.name, other
                    )))
                }
            }
        }

        info!(
            vdb = %vdb.name,
            version = vdb.version,
            models = vdb.models.len(),
            "vdb loaded"
        );
        Ok(Self {
            buffer: Arc::new(BufferManager::from_config(&config)),
            config,
            vdb,
            store: Arc::new(store),
            data,
            ids: IdGenerator::new(),
            report,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn vdb(&self) -> &VdbMetaData {
        &self.vdb
    }

    pub fn store(&self) -> &MetadataStore {
        &self.store
    }

    pub fn buffer(&self) -> &BufferManager {
        &self.buffer
    }

    /// Validation warnings raised while loading.
    pub fn report(&self) -> &ValidatorReport {
        &self.report
    }

    /// Replace the connector serving `model`.
    pub fn register_connector(&self, model: &str, connector: Arc<dyn Connector>) {
        self.data.register(model, connector);
    }

    /// A work context for this VDB.
    pub fn work_context(&self) -> WorkContext {
        WorkContext::new(self.vdb.name.clone(), self.vdb.version)
    }

    fn parse(&self, sql: &str) -> Result<Query> {
        match QueryParser::parse_command(sql)? {
            Command::Query(mut query) => {
                QueryResolver::new(&self.store).resolve_query(&mut query)?;
                Ok(query)
            }
            other => Err(ExecError::Unsupported(format!(
                "only queries can be executed, got a {}",
                other.kind()
            ))),
        }
    }

    pub fn plan(&self, sql: &str) -> Result<PlanResult> {
        let query = self.parse(sql)?;
        let planner = RelationalPlanner::new(&self.store, self.data.as_ref())
            .with_max_iterations(self.config.optimizer_max_iterations);
        Ok(planner.plan(&query)?)
    }

    /// The optimized plan tree followed by the physical program.
    pub fn explain(&self, sql: &str) -> Result<String> {
        let plan = self.plan(sql)?;
        Ok(format!(
            "{}\n{}",
            plan.tree.explain(),
            plan.program.explain()
        ))
    }

    /// Plan `sql` and return an executor that has not been started yet.
    pub fn prepare(&self, sql: &str, work: &WorkContext) -> Result<RelationalPlanExecutor> {
        let plan = self.plan(sql)?;
        let request_id = self.ids.next_request();
        let info = ResultSetInfo::new(
            format!("{}_{}", work.connection_id, request_id.get()),
            plan.program.references.clone(),
        )
        .with_config(&self.config);
        let fingerprint = plan.program.fingerprint()?;
        debug!(
            request = %request_id,
            user = %work.user_name,
            plan = %fingerprint.short(),
            sql,
            "prepared"
        );
        Ok(RelationalPlanExecutor::new(
            plan.program,
            info,
            CommandContext::new(work.clone(), request_id, self.config.processor_batch_size),
            self.data.clone(),
            self.store.clone(),
            self.buffer.clone(),
        ))
    }

    /// Run `sql` to completion, waiting out not-ready sources.
    pub fn execute_all(
        &self,
        sql: &str,
        work: &WorkContext,
        bindings: Bindings,
    ) -> Result<(Vec<Field>, Vec<Row>)> {
        let mut exec = self.prepare(sql, work)?;
        exec.execute(bindings)?;
        let mut rows = Vec::new();
        loop {
            match exec.next_row() {
                Poll::Pending => std::thread::yield_now(),
                Poll::Ready(Ok(Some(row))) => rows.push(row),
                Poll::Ready(Ok(None)) => break,
                Poll::Ready(Err(e)) => {
                    exec.close()?;
                    return Err(e);
                }
            }
        }
        let fields = exec.fields().to_vec();
        exec.close()?;
        Ok((fields, rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fedq_core::types::Scalar;

    const VDB: &str = r#"
name: enginevdb
version: 2
models:
  - name: pm1
    type: physical
    ddl: "CREATE FOREIGN TABLE g1(e1 string, e2 integer);"
    rows:
      g1:
        - ["a", 1]
        - ["b", 2]
        - ["c", 3]
  - name: pm2
    type: physical
    source: memory
    ddl: "CREATE FOREIGN TABLE g1(e1 string, e3 boolean);"
    rows:
      g1:
        - ["a", true]
        - ["c", false]
        - ["z", true]
  - name: vm1
    type: virtual
    ddl: "CREATE VIEW v1(a string, b integer) AS SELECT e1, e2 FROM pm1.g1 WHERE e2 >= 2;"
"#;

    fn engine() -> Engine {
        Engine::from_vdb(VdbMetaData::from_yaml(VDB).unwrap(), EngineConfig::default()).unwrap()
    }

    fn run(engine: &Engine, sql: &str) -> Vec<Row> {
        engine
            .execute_all(sql, &engine.work_context(), Bindings::new())
            .unwrap()
            .1
    }

    fn s(v: &str) -> Scalar {
        Scalar::Str(v.into())
    }

    #[test]
    fn left_outer_join_across_models() {
        let e = engine();
        let rows = run(
            &e,
            "SELECT x.e1, y.e3 FROM pm1.g1 AS x LEFT OUTER JOIN pm2.g1 AS y ON x.e1 = y.e1",
        );
        assert_eq!(
            rows,
            vec![
                vec![s("a"), Scalar::Bool(true)],
                vec![s("b"), Scalar::Null],
                vec![s("c"), Scalar::Bool(false)],
            ]
        );
    }

    #[test]
    fn where_on_null_producing_side_filters_after_join() {
        let e = engine();
        let rows = run(
            &e,
            "SELECT x.e1 FROM pm1.g1 AS x LEFT OUTER JOIN pm2.g1 AS y ON x.e1 = y.e1 WHERE y.e3 = TRUE",
        );
        assert_eq!(rows, vec![vec![s("a")]]);
    }

    #[test]
    fn views_are_expanded() {
        let e = engine();
        let (fields, rows) = e
            .execute_all(
                "SELECT a, b + 10 AS c FROM vm1.v1 WHERE b < 3",
                &e.work_context(),
                Bindings::new(),
            )
            .unwrap();
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[1].name, "c");
        assert_eq!(rows, vec![vec![s("b"), Scalar::I32(12)]]);
    }

    #[test]
    fn explain_shows_pushed_commands() {
        let e = engine();
        let text = e.explain("SELECT e1 FROM pm1.g1 WHERE e2 = 1").unwrap();
        assert!(text.contains("AccessNode pm1: SELECT"), "{}", text);
        assert!(text.contains("WHERE"), "{}", text);
    }

    #[test]
    fn buffer_is_empty_after_a_query() {
        let e = engine();
        run(&e, "SELECT e1 FROM pm1.g1");
        assert_eq!(e.buffer().active_sources(), 0);
    }

    #[test]
    fn non_queries_and_unknown_sources_are_rejected() {
        let e = engine();
        assert!(matches!(
            e.prepare("DELETE FROM pm1.g1", &e.work_context()),
            Err(ExecError::Unsupported(_))
        ));

        let mut vdb = VdbMetaData::from_yaml(VDB).unwrap();
        vdb.models[0].source = Some("oracle".into());
        assert!(matches!(
            Engine::from_vdb(vdb, EngineConfig::default()),
            Err(ExecError::Unsupported(_))
        ));
    }

    #[test]
    fn invalid_vdb_fails_validation() {
        let yaml = r#"
name: broken
models:
  - name: vm1
    type: virtual
    ddl: "CREATE VIEW v1(a string) AS SELECT e1 FROM nowhere.g1;"
"#;
        let err = Engine::from_vdb(VdbMetaData::from_yaml(yaml).unwrap(), EngineConfig::default())
            .err()
            .unwrap();
        assert!(matches!(err, ExecError::Validation(_)), "{}", err);
    }
}
