//! In-memory connector: tables of seed rows, single-table queries.
//!
//! Used by tests and by the CLI for models whose VDB entry carries `rows`.
//! It evaluates WHERE, select expressions, DISTINCT and LIMIT itself and
//! can simulate a slow source that is periodically not ready.

use std::collections::{HashMap, HashSet, VecDeque};
use std::task::Poll;

use fedq_core::types::{row_digest, Row, Scalar};
use fedq_lang::{Command, ElementSymbol, FromClause, Query, SelectSymbol};
use fedq_meta::{MetaError, MetadataStore, ModelMetaData};
use fedq_planner::SourceCapabilities;
use parking_lot::RwLock;
use tracing::trace;

use crate::connector::{Connector, SourceExecution};
use crate::context::{Bindings, ExecutionContext};
use crate::error::{ExecError, Result};
use crate::eval::{evaluate, passes, RowView};

pub struct MemoryConnector {
    name: String,
    /// Keyed by lower-case `model.table`.
    tables: RwLock<HashMap<String, Vec<Row>>>,
    pending_every: usize,
}

impl MemoryConnector {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tables: RwLock::new(HashMap::new()),
            pending_every: 0,
        }
    }

    /// Seed every table of a physical model from its `rows` entry, coercing
    /// each JSON value to the column's runtime type.
    pub fn from_model(model: &ModelMetaData, store: &MetadataStore) -> Result<Self> {
        let connector = Self::new(format!("memory:{}", model.name));
        for (table_name, rows) in &model.rows {
            let full = format!("{}.{}", model.name, table_name);
            let (_, table) = store.find_table(&full)?;
            let mut converted = Vec::with_capacity(rows.len());
            for (i, raw) in rows.iter().enumerate() {
                if raw.len() != table.columns.len() {
                    return Err(ExecError::from(MetaError::Vdb(format!(
                        "{} row {}: {} values for {} columns",
                        full,
                        i + 1,
                        raw.len(),
                        table.columns.len()
                    ))));
                }
                let row = raw
                    .iter()
                    .zip(&table.columns)
                    .map(|(value, column)| {
                        let scalar = json_to_scalar(value);
                        scalar.coerce_to(column.runtime_type()).ok_or_else(|| {
                            ExecError::from(MetaError::Vdb(format!(
                                "{} row {}: value {} is not a valid {}",
                                full,
                                i + 1,
                                value,
                                column.runtime_type()
                            )))
                        })
                    })
                    .collect::<Result<Row>>()?;
                converted.push(row);
            }
            connector.insert_rows(&full, converted);
        }
        Ok(connector)
    }

    /// Every `n`th pull reports not-ready once before producing its row.
    pub fn with_pending_every(mut self, n: usize) -> Self {
        self.pending_every = n;
        self
    }

    pub fn insert_rows(&self, table: &str, rows: Vec<Row>) {
        self.tables
            .write()
            .entry(table.to_ascii_lowercase())
            .or_default()
            .extend(rows);
    }

    fn run(&self, query: &Query, store: &MetadataStore) -> Result<VecDeque<Row>> {
        let group = match query.from.as_ref().map(|f| f.clauses.as_slice()) {
            Some([FromClause::Unary(u)]) => &u.group,
            _ => {
                return Err(ExecError::Unsupported(format!(
                    "{} only runs single-table queries: {}",
                    self.name, query
                )))
            }
        };
        let full_name = group
            .binding
            .as_ref()
            .map(|b| b.full_name.clone())
            .unwrap_or_else(|| group.non_correlation_name().to_string());
        let (_, table) = store.find_table(&full_name)?;
        let elements: Vec<ElementSymbol> = table
            .columns
            .iter()
            .map(|c| ElementSymbol::qualified(group.name.clone(), c.name.clone()))
            .collect();

        let tables = self.tables.read();
        let rows = tables
            .get(&full_name.to_ascii_lowercase())
            .map(Vec::as_slice)
            .unwrap_or(&[]);

        let bindings = Bindings::new();
        let mut seen = HashSet::new();
        let mut out = VecDeque::new();
        let (offset, row_limit) = query
            .limit
            .as_ref()
            .map(|l| (l.offset, Some(l.row_limit)))
            .unwrap_or((0, None));
        let mut skipped = 0u64;

        for row in rows {
            let view = RowView::new(&elements, row);
            if let Some(criteria) = &query.criteria {
                if !passes(criteria, view, &bindings)? {
                    continue;
                }
            }
            let mut projected = Vec::new();
            for symbol in &query.select.symbols {
                match symbol {
                    SelectSymbol::All(_) => projected.extend(row.iter().cloned()),
                    SelectSymbol::Expression(s) => {
                        projected.push(evaluate(&s.expression, view, &bindings)?)
                    }
                }
            }
            if query.select.distinct && !seen.insert(row_digest(&projected)) {
                continue;
            }
            if skipped < offset {
                skipped += 1;
                continue;
            }
            if row_limit.is_some_and(|l| out.len() as u64 >= l) {
                break;
            }
            out.push_back(projected);
        }
        Ok(out)
    }
}

impl Connector for MemoryConnector {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> SourceCapabilities {
        SourceCapabilities {
            select_distinct: true,
            row_limit: true,
            ..SourceCapabilities::basic()
        }
    }

    fn execute(
        &self,
        command: &Command,
        context: &ExecutionContext,
        store: &MetadataStore,
    ) -> Result<Box<dyn SourceExecution>> {
        let query = command.as_query().ok_or_else(|| {
            ExecError::Unsupported(format!("{} cannot run a {}", self.name, command.kind()))
        })?;
        let rows = self.run(query, store)?;
        trace!(
            connector = %self.name,
            request = %context.request_id,
            part = context.part_identifier,
            rows = rows.len(),
            "memory request"
        );
        Ok(Box::new(MemoryExecution {
            rows,
            pending_every: self.pending_every,
            pulls: 0,
            pending_issued: false,
        }))
    }
}

struct MemoryExecution {
    rows: VecDeque<Row>,
    pending_every: usize,
    pulls: usize,
    pending_issued: bool,
}

impl SourceExecution for MemoryExecution {
    fn next(&mut self) -> Poll<Result<Option<Row>>> {
        if self.pending_every > 0 && (self.pulls + 1) % self.pending_every == 0 && !self.pending_issued
        {
            self.pending_issued = true;
            return Poll::Pending;
        }
        self.pending_issued = false;
        self.pulls += 1;
        Poll::Ready(Ok(self.rows.pop_front()))
    }

    fn close(&mut self) {
        self.rows.clear();
    }
}

fn json_to_scalar(value: &serde_json::Value) -> Scalar {
    match value {
        serde_json::Value::Null => Scalar::Null,
        serde_json::Value::Bool(b) => Scalar::Bool(*b),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(v) => Scalar::I64(v),
            None => n.as_f64().map(Scalar::F64).unwrap_or(Scalar::Null),
        },
        serde_json::Value::String(s) => Scalar::Str(s.clone()),
        other => Scalar::Str(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fedq_core::context::WorkContext;
    use fedq_core::id::RequestId;
    use fedq_lang::QueryParser;
    use fedq_meta::{load_store, QueryResolver, VdbMetaData};

    const VDB: &str = r#"
name: memvdb
models:
  - name: pm1
    type: physical
    ddl: "CREATE FOREIGN TABLE g1(e1 string, e2 integer);"
    rows:
      g1:
        - ["a", 1]
        - ["b", 2]
        - ["b", 2]
        - ["c", null]
"#;

    fn setup() -> (MemoryConnector, MetadataStore) {
        let vdb = VdbMetaData::from_yaml(VDB).unwrap();
        let store = load_store(&vdb).unwrap();
        let conn = MemoryConnector::from_model(vdb.model("pm1").unwrap(), &store).unwrap();
        (conn, store)
    }

    fn ctx() -> ExecutionContext {
        ExecutionContext {
            work: WorkContext::new("memvdb", 1),
            request_id: RequestId::new(1),
            model: "pm1".into(),
            part_identifier: 0,
        }
    }

    fn drain(exec: &mut dyn SourceExecution) -> (Vec<Row>, usize) {
        let mut rows = Vec::new();
        let mut pending = 0;
        loop {
            match exec.next() {
                Poll::Pending => pending += 1,
                Poll::Ready(Ok(Some(r))) => rows.push(r),
                Poll::Ready(Ok(None)) => return (rows, pending),
                Poll::Ready(Err(e)) => panic!("{}", e),
            }
        }
    }

    fn run(conn: &MemoryConnector, store: &MetadataStore, sql: &str) -> (Vec<Row>, usize) {
        let mut q = QueryParser::parse_query(sql).unwrap();
        QueryResolver::new(store).resolve_query(&mut q).unwrap();
        let mut exec = conn.execute(&Command::Query(q), &ctx(), store).unwrap();
        drain(exec.as_mut())
    }

    #[test]
    fn seed_rows_are_typed_by_column() {
        let (conn, store) = setup();
        let (rows, _) = run(&conn, &store, "SELECT e2 FROM pm1.g1 WHERE e1 = 'a'");
        assert_eq!(rows, vec![vec![Scalar::I32(1)]]);
    }

    #[test]
    fn distinct_and_limit() {
        let (conn, store) = setup();
        let (rows, _) = run(&conn, &store, "SELECT DISTINCT e1 FROM pm1.g1 LIMIT 1, 2");
        assert_eq!(
            rows,
            vec![vec![Scalar::Str("b".into())], vec![Scalar::Str("c".into())]]
        );
    }

    #[test]
    fn pending_is_reported_once_per_slot() {
        let (conn, store) = setup();
        let conn = conn.with_pending_every(2);
        let (rows, pending) = run(&conn, &store, "SELECT e1 FROM pm1.g1");
        assert_eq!(rows.len(), 4);
        assert!(pending >= 2);
    }

    #[test]
    fn joins_are_not_run() {
        let (conn, store) = setup();
        let mut q = QueryParser::parse_query("SELECT a.e1 FROM pm1.g1 AS a, pm1.g1 AS b").unwrap();
        QueryResolver::new(&store).resolve_query(&mut q).unwrap();
        assert!(matches!(
            conn.execute(&Command::Query(q), &ctx(), &store),
            Err(ExecError::Unsupported(_))
        ));
    }
}
