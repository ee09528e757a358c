//! Streams the rows of one planned query into a result tuple source.
//!
//! Rows flow processor -> buffer manager -> caller. The executor owns the
//! result tuple source for its lifetime and enforces the user row limit on
//! the way out.

use std::sync::Arc;
use std::task::{ready, Poll};

use fedq_buffer::BufferManager;
use fedq_core::config::EngineConfig;
use fedq_core::id::TupleSourceId;
use fedq_core::schema::Field;
use fedq_core::types::Row;
use fedq_lang::Reference;
use fedq_meta::MetadataStore;
use fedq_planner::PhysicalProgram;
use tracing::{debug, warn};

use crate::context::{Bindings, CommandContext};
use crate::data_manager::DataManager;
use crate::error::{ExecError, Result};
use crate::node::NodeContext;
use crate::processor::QueryProcessor;

/// How the result set is exposed to the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultSetInfo {
    pub name: String,
    /// References that must be bound before execution.
    pub references: Vec<Reference>,
    /// 0 means unlimited.
    pub user_row_limit: u64,
    pub exception_on_row_limit: bool,
}

impl ResultSetInfo {
    pub fn new(name: impl Into<String>, references: Vec<Reference>) -> Self {
        Self {
            name: name.into(),
            references,
            user_row_limit: 0,
            exception_on_row_limit: false,
        }
    }

    pub fn with_row_limit(mut self, limit: u64, exception: bool) -> Self {
        self.user_row_limit = limit;
        self.exception_on_row_limit = exception;
        self
    }

    pub fn with_config(self, config: &EngineConfig) -> Self {
        self.with_row_limit(config.user_row_limit, config.exception_on_row_limit)
    }
}

pub struct RelationalPlanExecutor {
    info: ResultSetInfo,
    fields: Vec<Field>,
    processor: QueryProcessor,
    context: CommandContext,
    data: Arc<DataManager>,
    store: Arc<MetadataStore>,
    buffer: Arc<BufferManager>,
    bindings: Bindings,
    tuple_source: Option<TupleSourceId>,
    processor_done: bool,
    at_end: bool,
    row_count: u64,
    current: Option<Row>,
    started: bool,
}

impl RelationalPlanExecutor {
    pub fn new(
        program: PhysicalProgram,
        info: ResultSetInfo,
        context: CommandContext,
        data: Arc<DataManager>,
        store: Arc<MetadataStore>,
        buffer: Arc<BufferManager>,
    ) -> Self {
        let processor = QueryProcessor::new(&program, context.batch_size);
        Self {
            info,
            fields: program.fields,
            processor,
            context,
            data,
            store,
            buffer,
            bindings: Bindings::new(),
            tuple_source: None,
            processor_done: false,
            at_end: false,
            row_count: 0,
            current: None,
            started: false,
        }
    }

    pub fn info(&self) -> &ResultSetInfo {
        &self.info
    }

    /// Result set columns.
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Rows handed out so far.
    pub fn row_count(&self) -> u64 {
        self.row_count
    }

    pub fn tuple_source(&self) -> Option<TupleSourceId> {
        self.tuple_source
    }

    /// Bind parameters and start processing. Fails before producing any row
    /// when a required reference has no value.
    pub fn execute(&mut self, bindings: Bindings) -> Result<()> {
        if let Some(missing) = self
            .info
            .references
            .iter()
            .find(|r| bindings.lookup(r).is_none())
        {
            return Err(ExecError::MissingBinding(match &missing.element {
                Some(e) => e.name(),
                None => format!("?{}", missing.index),
            }));
        }
        if self.tuple_source.is_some() {
            return Err(ExecError::Component {
                result_set: self.info.name.clone(),
                message: "already executing".into(),
            });
        }
        self.bindings = bindings;

        let ctx = NodeContext {
            data: &self.data,
            store: &self.store,
            bindings: &self.bindings,
            command: &self.context,
        };
        self.processor.open(&ctx)?;
        // Registered only once the sources are running, so a failed open
        // leaves nothing behind and execute can be retried.
        let id = self.buffer.create_tuple_source(self.info.name.clone());
        self.tuple_source = Some(id);
        debug!(
            result_set = %self.info.name,
            request = %self.context.request_id,
            tuple_source = %id,
            "execute"
        );
        Ok(())
    }

    /// The next row, `Ok(None)` at the end of the result set, or `Pending`
    /// when a source is not ready. A pending call changes nothing and can be
    /// retried.
    pub fn next_row(&mut self) -> Poll<Result<Option<Row>>> {
        if self.at_end {
            return Poll::Ready(Ok(None));
        }
        let Some(id) = self.tuple_source else {
            return Poll::Ready(Err(ExecError::TupleSourceNotFound(self.info.name.clone())));
        };
        loop {
            if let Some(row) = self.buffer.pop_row(id)? {
                return Poll::Ready(self.accept(row));
            }
            if self.processor_done {
                self.at_end = true;
                self.current = None;
                self.started = true;
                return Poll::Ready(Ok(None));
            }
            let ctx = NodeContext {
                data: &self.data,
                store: &self.store,
                bindings: &self.bindings,
                command: &self.context,
            };
            let batch = ready!(self.processor.process_batch(&ctx))?;
            if !batch.rows.is_empty() {
                self.buffer.append(id, batch.rows)?;
            }
            if batch.last {
                self.buffer.mark_finished(id)?;
                self.processor_done = true;
            }
        }
    }

    fn accept(&mut self, row: Row) -> Result<Option<Row>> {
        self.row_count += 1;
        self.started = true;
        let limit = self.info.user_row_limit;
        if limit > 0 && self.row_count > limit {
            self.at_end = true;
            self.current = None;
            warn!(
                result_set = %self.info.name,
                limit,
                exception = self.info.exception_on_row_limit,
                "row limit reached"
            );
            if self.info.exception_on_row_limit {
                return Err(ExecError::RowLimitExceeded {
                    limit,
                    result_set: self.info.name.clone(),
                });
            }
            return Ok(None);
        }
        self.current = Some(row.clone());
        Ok(Some(row))
    }

    /// The row last returned by `next_row`; advances to the first row when
    /// nothing has been read yet.
    pub fn current_row(&mut self) -> Poll<Result<Option<Row>>> {
        if !self.started {
            ready!(self.next_row())?;
        }
        Poll::Ready(Ok(self.current.clone()))
    }

    /// Release the result tuple source. Closing twice, or closing an executor
    /// that never ran, does nothing.
    pub fn close(&mut self) -> Result<()> {
        self.processor.close();
        let Some(id) = self.tuple_source.take() else {
            return Ok(());
        };
        self.at_end = true;
        self.current = None;
        self.buffer
            .remove_tuple_source(id)
            .map_err(|e| ExecError::Component {
                result_set: self.info.name.clone(),
                message: e.to_string(),
            })?;
        debug!(result_set = %self.info.name, rows = self.row_count, "close");
        Ok(())
    }
}

impl Drop for RelationalPlanExecutor {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(error = %e, "close on drop failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::Connector;
    use crate::memory::MemoryConnector;
    use fedq_core::context::WorkContext;
    use fedq_core::id::RequestId;
    use fedq_core::types::Scalar;
    use fedq_lang::QueryParser;
    use fedq_meta::{load_store, QueryResolver, VdbMetaData};
    use fedq_planner::RelationalPlanner;

    const VDB: &str = r#"
name: execvdb
models:
  - name: pm1
    type: physical
    ddl: "CREATE FOREIGN TABLE g1(e1 string, e2 integer);"
    rows:
      g1:
        - ["a", 1]
        - ["b", 2]
        - ["c", 3]
        - ["d", 4]
        - ["e", 5]
        - ["f", 6]
        - ["g", 7]
"#;

    struct Fixture {
        data: Arc<DataManager>,
        store: Arc<MetadataStore>,
        buffer: Arc<BufferManager>,
    }

    fn fixture(pending_every: usize) -> Fixture {
        let vdb = VdbMetaData::from_yaml(VDB).unwrap();
        let store = load_store(&vdb).unwrap();
        let conn = MemoryConnector::from_model(vdb.model("pm1").unwrap(), &store)
            .unwrap()
            .with_pending_every(pending_every);
        let data = Arc::new(DataManager::new());
        data.register("pm1", Arc::new(conn));
        Fixture {
            data,
            store: Arc::new(store),
            buffer: Arc::new(BufferManager::new(1 << 20)),
        }
    }

    fn executor(f: &Fixture, sql: &str, info: impl FnOnce(ResultSetInfo) -> ResultSetInfo) -> RelationalPlanExecutor {
        let mut q = QueryParser::parse_query(sql).unwrap();
        QueryResolver::new(&f.store).resolve_query(&mut q).unwrap();
        let plan = RelationalPlanner::new(&f.store, f.data.as_ref()).plan(&q).unwrap();
        let info = info(ResultSetInfo::new("rs1", plan.program.references.clone()));
        RelationalPlanExecutor::new(
            plan.program,
            info,
            CommandContext::new(WorkContext::new("execvdb", 1), RequestId::new(7), 2),
            f.data.clone(),
            f.store.clone(),
            f.buffer.clone(),
        )
    }

    /// Pull every row, counting not-ready signals along the way.
    fn drain(exec: &mut RelationalPlanExecutor) -> (Vec<Row>, usize) {
        let mut rows = Vec::new();
        let mut pending = 0;
        loop {
            match exec.next_row() {
                Poll::Pending => pending += 1,
                Poll::Ready(Ok(Some(r))) => rows.push(r),
                Poll::Ready(Ok(None)) => return (rows, pending),
                Poll::Ready(Err(e)) => panic!("{}", e),
            }
        }
    }

    #[test]
    fn suspension_is_retry_safe() {
        let steady = fixture(0);
        let mut a = executor(&steady, "SELECT e1, e2 FROM pm1.g1 WHERE e2 > 2", |i| i);
        a.execute(Bindings::new()).unwrap();
        let (expected, none) = drain(&mut a);
        assert_eq!(none, 0);
        assert_eq!(expected.len(), 5);

        let stalling = fixture(2);
        let mut b = executor(&stalling, "SELECT e1, e2 FROM pm1.g1 WHERE e2 > 2", |i| i);
        b.execute(Bindings::new()).unwrap();
        let (rows, pending) = drain(&mut b);
        assert!(pending > 0);
        assert_eq!(rows, expected);
        assert_eq!(b.row_count(), 5);
    }

    #[test]
    fn end_of_stream_is_latched() {
        let f = fixture(0);
        let mut exec = executor(&f, "SELECT e1 FROM pm1.g1 WHERE e2 = 1", |i| i);
        exec.execute(Bindings::new()).unwrap();
        assert!(matches!(exec.next_row(), Poll::Ready(Ok(Some(_)))));
        assert!(matches!(exec.next_row(), Poll::Ready(Ok(None))));
        assert!(matches!(exec.next_row(), Poll::Ready(Ok(None))));
        assert_eq!(exec.row_count(), 1);
    }

    #[test]
    fn row_limit_fails_on_the_row_past_it() {
        let f = fixture(0);
        let mut exec = executor(&f, "SELECT e1 FROM pm1.g1", |i| i.with_row_limit(5, true));
        exec.execute(Bindings::new()).unwrap();
        for _ in 0..5 {
            assert!(matches!(exec.next_row(), Poll::Ready(Ok(Some(_)))));
        }
        match exec.next_row() {
            Poll::Ready(Err(ExecError::RowLimitExceeded { limit, result_set })) => {
                assert_eq!(limit, 5);
                assert_eq!(result_set, "rs1");
            }
            other => panic!("expected row limit failure, got {:?}", other.map(|r| r.is_ok())),
        }
    }

    #[test]
    fn row_limit_truncates_without_exception() {
        let f = fixture(0);
        let mut exec = executor(&f, "SELECT e1 FROM pm1.g1", |i| i.with_row_limit(5, false));
        exec.execute(Bindings::new()).unwrap();
        let (rows, _) = drain(&mut exec);
        assert_eq!(rows.len(), 5);
    }

    #[test]
    fn exact_limit_is_not_an_error() {
        let f = fixture(0);
        let mut exec = executor(&f, "SELECT e1 FROM pm1.g1 WHERE e2 <= 5", |i| {
            i.with_row_limit(5, true)
        });
        exec.execute(Bindings::new()).unwrap();
        let (rows, _) = drain(&mut exec);
        assert_eq!(rows.len(), 5);
    }

    #[test]
    fn missing_binding_fails_before_any_row() {
        let f = fixture(0);
        let mut exec = executor(&f, "SELECT e1 FROM pm1.g1 WHERE e2 = ?", |i| i);
        let err = exec.execute(Bindings::new()).unwrap_err();
        assert!(matches!(err, ExecError::MissingBinding(ref n) if n == "?0"));
        assert!(exec.tuple_source().is_none());
        assert_eq!(f.buffer.active_sources(), 0);

        exec.execute(Bindings::positional(vec![Scalar::I32(3)])).unwrap();
        let (rows, _) = drain(&mut exec);
        assert_eq!(rows, vec![vec![Scalar::Str("c".into())]]);
    }

    #[test]
    fn current_row_advances_once() {
        let f = fixture(0);
        let mut exec = executor(&f, "SELECT e2 FROM pm1.g1 WHERE e2 < 3", |i| i);
        exec.execute(Bindings::new()).unwrap();
        let first = exec.current_row();
        assert!(matches!(first, Poll::Ready(Ok(Some(ref r))) if r == &vec![Scalar::I32(1)]));
        let again = exec.current_row();
        assert!(matches!(again, Poll::Ready(Ok(Some(ref r))) if r == &vec![Scalar::I32(1)]));
        assert!(matches!(exec.next_row(), Poll::Ready(Ok(Some(ref r))) if r == &vec![Scalar::I32(2)]));
    }

    #[test]
    fn close_is_idempotent() {
        let f = fixture(0);
        let mut never_run = executor(&f, "SELECT e1 FROM pm1.g1", |i| i);
        never_run.close().unwrap();

        let mut exec = executor(&f, "SELECT e1 FROM pm1.g1", |i| i);
        exec.execute(Bindings::new()).unwrap();
        assert_eq!(f.buffer.active_sources(), 1);
        exec.close().unwrap();
        assert_eq!(f.buffer.active_sources(), 0);
        exec.close().unwrap();
        assert!(matches!(exec.next_row(), Poll::Ready(Ok(None))));
    }

    #[test]
    fn close_reports_a_lost_tuple_source() {
        let f = fixture(0);
        let mut exec = executor(&f, "SELECT e1 FROM pm1.g1", |i| i);
        exec.execute(Bindings::new()).unwrap();
        let id = exec.tuple_source().unwrap();
        f.buffer.remove_tuple_source(id).unwrap();
        match exec.close() {
            Err(ExecError::Component { result_set, .. }) => assert_eq!(result_set, "rs1"),
            other => panic!("expected component error, got {:?}", other),
        }
        exec.close().unwrap();
    }

    /// Refuses the first request, then serves rows from the wrapped connector.
    struct RefuseFirst {
        inner: MemoryConnector,
        refused: std::sync::atomic::AtomicBool,
    }

    impl Connector for RefuseFirst {
        fn name(&self) -> &str {
            "refuse-first"
        }

        fn capabilities(&self) -> fedq_planner::SourceCapabilities {
            self.inner.capabilities()
        }

        fn execute(
            &self,
            command: &fedq_lang::Command,
            context: &crate::context::ExecutionContext,
            store: &MetadataStore,
        ) -> Result<Box<dyn crate::connector::SourceExecution>> {
            if !self.refused.swap(true, std::sync::atomic::Ordering::SeqCst) {
                return Err(ExecError::source_failure("pm1", "connection refused"));
            }
            self.inner.execute(command, context, store)
        }
    }

    #[test]
    fn failed_open_leaves_no_tuple_source_and_can_be_retried() {
        let f = fixture(0);
        let vdb = VdbMetaData::from_yaml(VDB).unwrap();
        let inner = MemoryConnector::from_model(vdb.model("pm1").unwrap(), &f.store).unwrap();
        f.data.register(
            "pm1",
            Arc::new(RefuseFirst {
                inner,
                refused: std::sync::atomic::AtomicBool::new(false),
            }),
        );
        let mut exec = executor(&f, "SELECT e1 FROM pm1.g1 WHERE e2 < 3", |i| i);

        assert!(matches!(exec.execute(Bindings::new()), Err(ExecError::Source { .. })));
        assert!(exec.tuple_source().is_none());
        assert_eq!(f.buffer.active_sources(), 0);

        exec.execute(Bindings::new()).unwrap();
        let (rows, _) = drain(&mut exec);
        assert_eq!(
            rows,
            vec![vec![Scalar::Str("a".into())], vec![Scalar::Str("b".into())]]
        );
    }

    #[test]
    fn dropping_releases_the_tuple_source() {
        let f = fixture(0);
        {
            let mut exec = executor(&f, "SELECT e1 FROM pm1.g1", |i| i);
            exec.execute(Bindings::new()).unwrap();
            assert!(matches!(exec.next_row(), Poll::Ready(Ok(Some(_)))));
        }
        assert_eq!(f.buffer.active_sources(), 0);
        assert_eq!(f.buffer.used_bytes(), 0);
    }
}
