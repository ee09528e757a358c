//! Processing nodes: the pull-based operators a physical program becomes.
//!
//! Every `next` may return `Poll::Pending` when a source below is not ready.
//! A node that sees `Pending` returns it unchanged and keeps its state, so
//! the same call can be retried later without losing or repeating rows.

use std::collections::HashSet;
use std::task::{ready, Poll};

use fedq_core::hash::Hash256;
use fedq_core::types::{row_digest, Row, Scalar};
use fedq_lang::mutate::{for_each_criteria_expression_mut, for_each_expression_mut};
use fedq_lang::{
    Command, Criteria, ElementSymbol, Expression, ExpressionSymbol, FromClause, JoinType, Query,
    SelectSymbol,
};
use fedq_meta::MetadataStore;
use fedq_planner::PhysicalNode;
use tracing::trace;

use crate::connector::SourceExecution;
use crate::context::{Bindings, CommandContext};
use crate::data_manager::DataManager;
use crate::error::{ExecError, Result};
use crate::eval::{evaluate, passes, RowView};

/// What every node needs while running, borrowed for the duration of a call.
#[derive(Clone, Copy)]
pub struct NodeContext<'a> {
    pub data: &'a DataManager,
    pub store: &'a MetadataStore,
    pub bindings: &'a Bindings,
    pub command: &'a CommandContext,
}

pub trait ProcessingNode: Send {
    fn name(&self) -> &'static str;

    /// Elements of the rows this node produces, positionally.
    fn output(&self) -> &[ElementSymbol];

    fn open(&mut self, ctx: &NodeContext<'_>) -> Result<()>;

    fn next(&mut self, ctx: &NodeContext<'_>) -> Poll<Result<Option<Row>>>;

    fn close(&mut self);
}

/// Instantiate the node tree for a physical plan.
pub fn build(plan: &PhysicalNode) -> Box<dyn ProcessingNode> {
    let mut parts = 0;
    build_node(plan, &mut parts)
}

fn build_node(plan: &PhysicalNode, parts: &mut usize) -> Box<dyn ProcessingNode> {
    match plan {
        PhysicalNode::Access {
            model,
            command,
            output,
        } => {
            let part = *parts;
            *parts += 1;
            Box::new(AccessNode {
                model: model.clone(),
                command: command.clone(),
                output: output.clone(),
                part,
                execution: None,
                done: false,
            })
        }
        PhysicalNode::Select {
            criteria,
            input,
            output,
        } => Box::new(SelectNode {
            criteria: criteria.clone(),
            input: build_node(input, parts),
            output: output.clone(),
        }),
        PhysicalNode::Project {
            symbols,
            input,
            output,
        } => Box::new(ProjectNode {
            symbols: symbols.clone(),
            input: input.as_deref().map(|i| build_node(i, parts)),
            output: output.clone(),
            emitted: false,
        }),
        PhysicalNode::Join {
            join_type,
            criteria,
            left,
            right,
            output,
        } => {
            let left = build_node(left, parts);
            let right = build_node(right, parts);
            let combined = left
                .output()
                .iter()
                .chain(right.output())
                .cloned()
                .collect();
            Box::new(JoinNode {
                join_type: *join_type,
                criteria: criteria.clone(),
                left,
                right,
                combined,
                output: output.clone(),
                right_rows: Vec::new(),
                right_matched: Vec::new(),
                right_loaded: false,
                current_left: None,
                left_matched: false,
                right_pos: 0,
                left_done: false,
                unmatched_pos: 0,
            })
        }
        PhysicalNode::DupRemove { input, output } => Box::new(DupRemoveNode {
            input: build_node(input, parts),
            output: output.clone(),
            seen: HashSet::new(),
        }),
        PhysicalNode::Limit {
            offset,
            row_limit,
            input,
            output,
        } => Box::new(LimitNode {
            offset: *offset,
            row_limit: *row_limit,
            input: build_node(input, parts),
            output: output.clone(),
            skipped: 0,
            emitted: 0,
        }),
        PhysicalNode::Null { output } => Box::new(NullNode {
            output: output.clone(),
        }),
    }
}

/// Sends its command to the connector of `model` and streams the result.
pub struct AccessNode {
    model: String,
    command: Query,
    output: Vec<ElementSymbol>,
    part: usize,
    execution: Option<Box<dyn SourceExecution>>,
    done: bool,
}

impl ProcessingNode for AccessNode {
    fn name(&self) -> &'static str {
        "AccessNode"
    }

    fn output(&self) -> &[ElementSymbol] {
        &self.output
    }

    fn open(&mut self, ctx: &NodeContext<'_>) -> Result<()> {
        let mut command = self.command.clone();
        bind_query(&mut command, ctx.bindings)?;
        let connector = ctx.data.connector(&self.model)?;
        let exec_ctx = ctx.command.execution_context(&self.model, self.part);
        trace!(model = %self.model, part = self.part, command = %command, "access opened");
        self.execution = Some(connector.execute(&Command::Query(command), &exec_ctx, ctx.store)?);
        self.done = false;
        Ok(())
    }

    fn next(&mut self, _ctx: &NodeContext<'_>) -> Poll<Result<Option<Row>>> {
        if self.done {
            return Poll::Ready(Ok(None));
        }
        let Some(execution) = self.execution.as_mut() else {
            return Poll::Ready(Err(ExecError::source_failure(
                &self.model,
                "access node was not opened",
            )));
        };
        match ready!(execution.next())? {
            Some(row) if row.len() != self.output.len() => {
                Poll::Ready(Err(ExecError::source_failure(
                    &self.model,
                    format!("row has {} values, expected {}", row.len(), self.output.len()),
                )))
            }
            Some(row) => Poll::Ready(Ok(Some(row))),
            None => {
                self.done = true;
                self.close();
                Poll::Ready(Ok(None))
            }
        }
    }

    fn close(&mut self) {
        if let Some(mut execution) = self.execution.take() {
            execution.close();
        }
    }
}

/// Replace every reference in `query`, nested query bodies included, with
/// its bound value.
fn bind_query(query: &mut Query, bindings: &Bindings) -> Result<()> {
    let mut failure = None;
    for symbol in query.select.symbols.iter_mut() {
        if let SelectSymbol::Expression(s) = symbol {
            bind_expression(&mut s.expression, bindings, &mut failure);
        }
    }
    if let Some(from) = query.from.as_mut() {
        for clause in from.clauses.iter_mut() {
            bind_from(clause, bindings, &mut failure);
        }
    }
    if let Some(criteria) = query.criteria.as_mut() {
        bind_criteria(criteria, bindings, &mut failure);
    }
    match failure {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

fn bind_from(clause: &mut FromClause, bindings: &Bindings, failure: &mut Option<ExecError>) {
    match clause {
        FromClause::Unary(_) => {}
        FromClause::Join(j) => {
            bind_from(&mut j.left, bindings, failure);
            bind_from(&mut j.right, bindings, failure);
            for c in j.criteria.iter_mut() {
                bind_criteria(c, bindings, failure);
            }
        }
        FromClause::Subquery(s) => {
            if let Err(e) = bind_query(&mut s.command, bindings) {
                failure.get_or_insert(e);
            }
        }
    }
}

fn bind_criteria(criteria: &mut Criteria, bindings: &Bindings, failure: &mut Option<ExecError>) {
    match criteria {
        Criteria::Exists(e) => {
            if let Err(err) = bind_query(&mut e.query, bindings) {
                failure.get_or_insert(err);
            }
        }
        Criteria::Not(n) => bind_criteria(&mut n.criteria, bindings, failure),
        Criteria::Compound(c) => {
            for part in c.criteria.iter_mut() {
                bind_criteria(part, bindings, failure);
            }
        }
        other => for_each_criteria_expression_mut(other, &mut |e| {
            bind_one(e, bindings, failure)
        }),
    }
}

fn bind_expression(expr: &mut Expression, bindings: &Bindings, failure: &mut Option<ExecError>) {
    for_each_expression_mut(expr, &mut |e| bind_one(e, bindings, failure));
}

fn bind_one(expr: &mut Expression, bindings: &Bindings, failure: &mut Option<ExecError>) {
    match expr {
        Expression::Reference(r) => match bindings.lookup(r) {
            Some(value) => *expr = Expression::constant(value.clone()),
            None => {
                let name = match &r.element {
                    Some(e) => e.name(),
                    None => format!("?{}", r.index),
                };
                failure.get_or_insert(ExecError::MissingBinding(name));
            }
        },
        Expression::ScalarSubquery(s) => {
            if let Err(e) = bind_query(&mut s.query, bindings) {
                failure.get_or_insert(e);
            }
        }
        _ => {}
    }
}

pub struct SelectNode {
    criteria: Criteria,
    input: Box<dyn ProcessingNode>,
    output: Vec<ElementSymbol>,
}

impl ProcessingNode for SelectNode {
    fn name(&self) -> &'static str {
        "SelectNode"
    }

    fn output(&self) -> &[ElementSymbol] {
        &self.output
    }

    fn open(&mut self, ctx: &NodeContext<'_>) -> Result<()> {
        self.input.open(ctx)
    }

    fn next(&mut self, ctx: &NodeContext<'_>) -> Poll<Result<Option<Row>>> {
        loop {
            let Some(row) = ready!(self.input.next(ctx))? else {
                return Poll::Ready(Ok(None));
            };
            let view = RowView::new(self.input.output(), &row);
            if passes(&self.criteria, view, ctx.bindings)? {
                return Poll::Ready(Ok(Some(row)));
            }
        }
    }

    fn close(&mut self) {
        self.input.close();
    }
}

pub struct ProjectNode {
    symbols: Vec<ExpressionSymbol>,
    input: Option<Box<dyn ProcessingNode>>,
    output: Vec<ElementSymbol>,
    /// Only used without an input: the single row has been produced.
    emitted: bool,
}

impl ProcessingNode for ProjectNode {
    fn name(&self) -> &'static str {
        "ProjectNode"
    }

    fn output(&self) -> &[ElementSymbol] {
        &self.output
    }

    fn open(&mut self, ctx: &NodeContext<'_>) -> Result<()> {
        self.emitted = false;
        match self.input.as_mut() {
            Some(input) => input.open(ctx),
            None => Ok(()),
        }
    }

    fn next(&mut self, ctx: &NodeContext<'_>) -> Poll<Result<Option<Row>>> {
        let Some(input) = self.input.as_mut() else {
            if self.emitted {
                return Poll::Ready(Ok(None));
            }
            self.emitted = true;
            let row = self
                .symbols
                .iter()
                .map(|s| evaluate(&s.expression, RowView::empty(), ctx.bindings))
                .collect::<Result<Row>>()?;
            return Poll::Ready(Ok(Some(row)));
        };
        let Some(row) = ready!(input.next(ctx))? else {
            return Poll::Ready(Ok(None));
        };
        let view = RowView::new(input.output(), &row);
        let projected = self
            .symbols
            .iter()
            .map(|s| evaluate(&s.expression, view, ctx.bindings))
            .collect::<Result<Row>>()?;
        Poll::Ready(Ok(Some(projected)))
    }

    fn close(&mut self) {
        if let Some(input) = self.input.as_mut() {
            input.close();
        }
    }
}

/// Nested-loop join. The right side is read fully first, then each left row
/// is matched against it. Outer joins pad the missing side with nulls.
pub struct JoinNode {
    join_type: JoinType,
    criteria: Vec<Criteria>,
    left: Box<dyn ProcessingNode>,
    right: Box<dyn ProcessingNode>,
    combined: Vec<ElementSymbol>,
    output: Vec<ElementSymbol>,
    right_rows: Vec<Row>,
    right_matched: Vec<bool>,
    right_loaded: bool,
    current_left: Option<Row>,
    left_matched: bool,
    right_pos: usize,
    left_done: bool,
    unmatched_pos: usize,
}

impl JoinNode {
    fn matches(&self, candidate: &[Scalar], bindings: &Bindings) -> Result<bool> {
        let view = RowView::new(&self.combined, candidate);
        for c in &self.criteria {
            if !passes(c, view, bindings)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn pads_left(&self) -> bool {
        matches!(self.join_type, JoinType::LeftOuter | JoinType::FullOuter)
    }

    fn pads_right(&self) -> bool {
        matches!(self.join_type, JoinType::RightOuter | JoinType::FullOuter)
    }
}

impl ProcessingNode for JoinNode {
    fn name(&self) -> &'static str {
        "JoinNode"
    }

    fn output(&self) -> &[ElementSymbol] {
        &self.output
    }

    fn open(&mut self, ctx: &NodeContext<'_>) -> Result<()> {
        self.left.open(ctx)?;
        self.right.open(ctx)
    }

    fn next(&mut self, ctx: &NodeContext<'_>) -> Poll<Result<Option<Row>>> {
        while !self.right_loaded {
            match ready!(self.right.next(ctx))? {
                Some(row) => self.right_rows.push(row),
                None => {
                    self.right_loaded = true;
                    self.right_matched = vec![false; self.right_rows.len()];
                }
            }
        }

        loop {
            let Some(left) = self.current_left.as_ref() else {
                if !self.left_done {
                    match ready!(self.left.next(ctx))? {
                        Some(row) => {
                            self.current_left = Some(row);
                            self.left_matched = false;
                            self.right_pos = 0;
                        }
                        None => self.left_done = true,
                    }
                    continue;
                }
                // left exhausted: unmatched right rows for RIGHT and FULL joins
                if self.pads_right() {
                    while self.unmatched_pos < self.right_rows.len() {
                        let i = self.unmatched_pos;
                        self.unmatched_pos += 1;
                        if !self.right_matched[i] {
                            let mut row = vec![Scalar::Null; self.left.output().len()];
                            row.extend(self.right_rows[i].iter().cloned());
                            return Poll::Ready(Ok(Some(row)));
                        }
                    }
                }
                return Poll::Ready(Ok(None));
            };

            while self.right_pos < self.right_rows.len() {
                let i = self.right_pos;
                let candidate: Row = left
                    .iter()
                    .chain(self.right_rows[i].iter())
                    .cloned()
                    .collect();
                let matched = self.matches(&candidate, ctx.bindings)?;
                self.right_pos += 1;
                if matched {
                    self.left_matched = true;
                    self.right_matched[i] = true;
                    return Poll::Ready(Ok(Some(candidate)));
                }
            }

            let Some(left) = self.current_left.take() else {
                continue;
            };
            if !self.left_matched && self.pads_left() {
                let mut row = left;
                row.extend(std::iter::repeat(Scalar::Null).take(self.right.output().len()));
                return Poll::Ready(Ok(Some(row)));
            }
        }
    }

    fn close(&mut self) {
        self.left.close();
        self.right.close();
        self.right_rows.clear();
    }
}

pub struct DupRemoveNode {
    input: Box<dyn ProcessingNode>,
    output: Vec<ElementSymbol>,
    seen: HashSet<Hash256>,
}

impl ProcessingNode for DupRemoveNode {
    fn name(&self) -> &'static str {
        "DupRemoveNode"
    }

    fn output(&self) -> &[ElementSymbol] {
        &self.output
    }

    fn open(&mut self, ctx: &NodeContext<'_>) -> Result<()> {
        self.seen.clear();
        self.input.open(ctx)
    }

    fn next(&mut self, ctx: &NodeContext<'_>) -> Poll<Result<Option<Row>>> {
        loop {
            let Some(row) = ready!(self.input.next(ctx))? else {
                return Poll::Ready(Ok(None));
            };
            if self.seen.insert(row_digest(&row)) {
                return Poll::Ready(Ok(Some(row)));
            }
        }
    }

    fn close(&mut self) {
        self.input.close();
        self.seen.clear();
    }
}

pub struct LimitNode {
    offset: u64,
    row_limit: u64,
    input: Box<dyn ProcessingNode>,
    output: Vec<ElementSymbol>,
    skipped: u64,
    emitted: u64,
}

impl ProcessingNode for LimitNode {
    fn name(&self) -> &'static str {
        "LimitNode"
    }

    fn output(&self) -> &[ElementSymbol] {
        &self.output
    }

    fn open(&mut self, ctx: &NodeContext<'_>) -> Result<()> {
        self.skipped = 0;
        self.emitted = 0;
        self.input.open(ctx)
    }

    fn next(&mut self, ctx: &NodeContext<'_>) -> Poll<Result<Option<Row>>> {
        // stop pulling once the limit is reached
        if self.emitted >= self.row_limit {
            return Poll::Ready(Ok(None));
        }
        loop {
            let Some(row) = ready!(self.input.next(ctx))? else {
                return Poll::Ready(Ok(None));
            };
            if self.skipped < self.offset {
                self.skipped += 1;
                continue;
            }
            self.emitted += 1;
            return Poll::Ready(Ok(Some(row)));
        }
    }

    fn close(&mut self) {
        self.input.close();
    }
}

/// Produces nothing; stands in for criteria known to be false.
pub struct NullNode {
    output: Vec<ElementSymbol>,
}

impl ProcessingNode for NullNode {
    fn name(&self) -> &'static str {
        "NullNode"
    }

    fn output(&self) -> &[ElementSymbol] {
        &self.output
    }

    fn open(&mut self, _ctx: &NodeContext<'_>) -> Result<()> {
        Ok(())
    }

    fn next(&mut self, _ctx: &NodeContext<'_>) -> Poll<Result<Option<Row>>> {
        Poll::Ready(Ok(None))
    }

    fn close(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryConnector;
    use fedq_core::context::WorkContext;
    use fedq_core::id::RequestId;
    use fedq_lang::{Criteria, QueryParser};
    use std::sync::Arc;

    struct Harness {
        data: DataManager,
        store: MetadataStore,
        bindings: Bindings,
        command: CommandContext,
    }

    impl Harness {
        fn new(pending_every: usize) -> Self {
            let store = MetadataStore::new();
            let data = DataManager::new();
            let conn = MemoryConnector::new("mem").with_pending_every(pending_every);
            data.register("pm1", Arc::new(conn));
            Self {
                data,
                store,
                bindings: Bindings::new(),
                command: CommandContext::new(WorkContext::new("v", 1), RequestId::new(1), 10),
            }
        }

        fn ctx(&self) -> NodeContext<'_> {
            NodeContext {
                data: &self.data,
                store: &self.store,
                bindings: &self.bindings,
                command: &self.command,
            }
        }
    }

    /// Fixed rows, with `Pending` before every row when asked.
    struct Rows {
        rows: Vec<Row>,
        pos: usize,
        output: Vec<ElementSymbol>,
        stall: bool,
        stalled: bool,
    }

    impl Rows {
        fn boxed(group: &str, cols: &[&str], rows: Vec<Row>, stall: bool) -> Box<dyn ProcessingNode> {
            Box::new(Rows {
                rows,
                pos: 0,
                output: cols
                    .iter()
                    .map(|c| ElementSymbol::qualified(group, *c))
                    .collect(),
                stall,
                stalled: false,
            })
        }
    }

    impl ProcessingNode for Rows {
        fn name(&self) -> &'static str {
            "Rows"
        }
        fn output(&self) -> &[ElementSymbol] {
            &self.output
        }
        fn open(&mut self, _ctx: &NodeContext<'_>) -> Result<()> {
            Ok(())
        }
        fn next(&mut self, _ctx: &NodeContext<'_>) -> Poll<Result<Option<Row>>> {
            if self.stall && !self.stalled {
                self.stalled = true;
                return Poll::Pending;
            }
            self.stalled = false;
            let row = self.rows.get(self.pos).cloned();
            self.pos += 1;
            Poll::Ready(Ok(row))
        }
        fn close(&mut self) {}
    }

    fn ints(values: &[Option<i32>]) -> Row {
        values
            .iter()
            .map(|v| v.map(Scalar::I32).unwrap_or(Scalar::Null))
            .collect()
    }

    fn drain(node: &mut dyn ProcessingNode, ctx: &NodeContext<'_>) -> Vec<Row> {
        node.open(ctx).unwrap();
        let mut out = Vec::new();
        loop {
            match node.next(ctx) {
                Poll::Pending => continue,
                Poll::Ready(Ok(Some(r))) => out.push(r),
                Poll::Ready(Ok(None)) => return out,
                Poll::Ready(Err(e)) => panic!("{}", e),
            }
        }
    }

    fn join(join_type: JoinType, stall: bool) -> JoinNode {
        let left = Rows::boxed(
            "l",
            &["k"],
            vec![ints(&[Some(1)]), ints(&[Some(2)]), ints(&[None])],
            stall,
        );
        let right = Rows::boxed(
            "r",
            &["k"],
            vec![ints(&[Some(2)]), ints(&[Some(3)])],
            stall,
        );
        let combined: Vec<ElementSymbol> =
            left.output().iter().chain(right.output()).cloned().collect();
        JoinNode {
            join_type,
            criteria: vec![QueryParser::parse_criteria("l.k = r.k").unwrap()],
            left,
            right,
            output: combined.clone(),
            combined,
            right_rows: Vec::new(),
            right_matched: Vec::new(),
            right_loaded: false,
            current_left: None,
            left_matched: false,
            right_pos: 0,
            left_done: false,
            unmatched_pos: 0,
        }
    }

    #[test]
    fn inner_join_matches_only() {
        let h = Harness::new(0);
        let rows = drain(&mut join(JoinType::Inner, false), &h.ctx());
        assert_eq!(rows, vec![ints(&[Some(2), Some(2)])]);
    }

    #[test]
    fn outer_joins_pad_with_nulls() {
        let h = Harness::new(0);
        let left = drain(&mut join(JoinType::LeftOuter, false), &h.ctx());
        assert_eq!(
            left,
            vec![
                ints(&[Some(1), None]),
                ints(&[Some(2), Some(2)]),
                ints(&[None, None]),
            ]
        );
        let full = drain(&mut join(JoinType::FullOuter, false), &h.ctx());
        assert_eq!(full.len(), 4);
        assert_eq!(full[3], ints(&[None, Some(3)]));
        let right = drain(&mut join(JoinType::RightOuter, false), &h.ctx());
        assert_eq!(
            right,
            vec![ints(&[Some(2), Some(2)]), ints(&[None, Some(3)])]
        );
    }

    #[test]
    fn join_survives_pending_everywhere() {
        let h = Harness::new(0);
        let steady = drain(&mut join(JoinType::FullOuter, false), &h.ctx());
        let stalling = drain(&mut join(JoinType::FullOuter, true), &h.ctx());
        assert_eq!(steady, stalling);
    }

    #[test]
    fn limit_and_dup_remove() {
        let h = Harness::new(0);
        let input = Rows::boxed(
            "g",
            &["a"],
            vec![
                ints(&[Some(1)]),
                ints(&[Some(1)]),
                ints(&[Some(2)]),
                ints(&[Some(3)]),
            ],
            true,
        );
        let output = input.output().to_vec();
        let dedup = Box::new(DupRemoveNode {
            input,
            output: output.clone(),
            seen: HashSet::new(),
        });
        let mut limit = LimitNode {
            offset: 1,
            row_limit: 1,
            input: dedup,
            output,
            skipped: 0,
            emitted: 0,
        };
        assert_eq!(drain(&mut limit, &h.ctx()), vec![ints(&[Some(2)])]);
    }

    #[test]
    fn project_without_input_yields_one_row() {
        let h = Harness::new(0);
        let mut node = ProjectNode {
            symbols: vec![ExpressionSymbol::new(
                QueryParser::parse_expression("1 + 2").unwrap(),
            )],
            input: None,
            output: vec![ElementSymbol::new("expr1")],
            emitted: false,
        };
        assert_eq!(drain(&mut node, &h.ctx()), vec![vec![Scalar::I32(3)]]);
    }

    #[test]
    fn select_filters_with_three_valued_logic() {
        let h = Harness::new(0);
        let input = Rows::boxed(
            "g",
            &["a"],
            vec![ints(&[Some(1)]), ints(&[None]), ints(&[Some(5)])],
            false,
        );
        let mut node = SelectNode {
            criteria: Criteria::Not(fedq_lang::NotCriteria {
                criteria: Box::new(QueryParser::parse_criteria("g.a = 1").unwrap()),
            }),
            output: input.output().to_vec(),
            input,
        };
        assert_eq!(drain(&mut node, &h.ctx()), vec![ints(&[Some(5)])]);
    }

    #[test]
    fn access_requires_bound_references_and_a_connector() {
        let h = Harness::new(0);
        let mut q = QueryParser::parse_query("SELECT e1 FROM pm1.g1 WHERE e1 = ?").unwrap();
        bind_query(&mut q, &Bindings::positional(vec![Scalar::Str("x".into())])).unwrap();
        assert_eq!(q.criteria.unwrap().to_string(), "e1 = 'x'");
        let mut unbound = QueryParser::parse_query("SELECT e1 FROM pm1.g1 WHERE e1 = ?").unwrap();
        assert!(matches!(
            bind_query(&mut unbound, &Bindings::new()),
            Err(ExecError::MissingBinding(_))
        ));

        let mut node = build(&PhysicalNode::Access {
            model: "pm9".into(),
            command: QueryParser::parse_query("SELECT e1 FROM pm9.g1").unwrap(),
            output: vec![ElementSymbol::new("pm9.g1.e1")],
        });
        assert!(matches!(node.open(&h.ctx()), Err(ExecError::Source { .. })));
    }
}
