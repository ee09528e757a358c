//! Rewrite safety of the optimizer.
//!
//! Generated two-source join queries are planned and executed through the
//! engine; every operator must only reference elements its inputs produce,
//! and the rows must match a naive nested-loop evaluation of the same query.

use std::collections::HashSet;
use std::sync::Arc;

use fedq_core::config::EngineConfig;
use fedq_core::types::{Row, Scalar};
use fedq_exec::eval::{passes, RowView};
use fedq_exec::{Bindings, Connector, Engine, ExecError, ExecutionContext, MemoryConnector, SourceExecution};
use fedq_lang::{Command, ElementCollectorVisitor, ElementSymbol, JoinType, QueryParser};
use fedq_meta::{MetadataStore, VdbMetaData};
use fedq_planner::{elements_in_criteria, PhysicalNode, PlannerError, SourceCapabilities};
use proptest::prelude::*;

const VDB: &str = r#"
name: pushdown
models:
  - name: pm1
    type: physical
    ddl: "CREATE FOREIGN TABLE g1(e1 string, e2 integer);"
    rows:
      g1:
        - ["a", 1]
        - ["b", 2]
        - ["c", 3]
        - ["d", null]
        - [null, 5]
  - name: pm2
    type: physical
    ddl: "CREATE FOREIGN TABLE g1(e1 string, e3 integer);"
    rows:
      g1:
        - ["a", 10]
        - ["a", 11]
        - ["c", null]
        - ["e", 30]
        - [null, 40]
"#;

fn left_rows() -> Vec<Row> {
    vec![
        vec![s("a"), Scalar::I32(1)],
        vec![s("b"), Scalar::I32(2)],
        vec![s("c"), Scalar::I32(3)],
        vec![s("d"), Scalar::Null],
        vec![Scalar::Null, Scalar::I32(5)],
    ]
}

fn right_rows() -> Vec<Row> {
    vec![
        vec![s("a"), Scalar::I32(10)],
        vec![s("a"), Scalar::I32(11)],
        vec![s("c"), Scalar::Null],
        vec![s("e"), Scalar::I32(30)],
        vec![Scalar::Null, Scalar::I32(40)],
    ]
}

fn s(v: &str) -> Scalar {
    Scalar::Str(v.into())
}

fn engine() -> Engine {
    let vdb = VdbMetaData::from_yaml(VDB).expect("descriptor");
    Engine::from_vdb(vdb, EngineConfig::default()).expect("engine")
}

/// Delegates to a memory connector but accepts nothing beyond a scan.
struct ScanOnly(MemoryConnector);

impl Connector for ScanOnly {
    fn name(&self) -> &str {
        "scan-only"
    }

    fn capabilities(&self) -> SourceCapabilities {
        SourceCapabilities::none()
    }

    fn execute(
        &self,
        command: &Command,
        context: &ExecutionContext,
        store: &MetadataStore,
    ) -> fedq_exec::Result<Box<dyn SourceExecution>> {
        let query = command.as_query().expect("query");
        assert!(query.criteria.is_none(), "criteria pushed to a scan-only source: {}", query);
        self.0.execute(command, context, store)
    }
}

fn scan_only_engine() -> Engine {
    let vdb = VdbMetaData::from_yaml(VDB).expect("descriptor");
    let engine = Engine::from_vdb(vdb.clone(), EngineConfig::default()).expect("engine");
    for model in ["pm1", "pm2"] {
        let memory = MemoryConnector::from_model(vdb.model(model).expect("model"), engine.store())
            .expect("memory connector");
        engine.register_connector(model, Arc::new(ScanOnly(memory)));
    }
    engine
}

fn join_sql(join_type: JoinType) -> &'static str {
    match join_type {
        JoinType::Inner => "INNER JOIN",
        JoinType::LeftOuter => "LEFT OUTER JOIN",
        JoinType::RightOuter => "RIGHT OUTER JOIN",
        JoinType::FullOuter => "FULL OUTER JOIN",
        JoinType::Cross => "CROSS JOIN",
    }
}

fn query_sql(join_type: JoinType, predicate: &str) -> String {
    format!(
        "SELECT x.e1, x.e2, y.e1, y.e3 FROM pm1.g1 AS x {} pm2.g1 AS y ON x.e1 = y.e1 WHERE {}",
        join_sql(join_type),
        predicate
    )
}

/// Nested-loop join followed by the WHERE filter, with no rewriting at all.
fn naive(join_type: JoinType, predicate: &str) -> Vec<Row> {
    let elements: Vec<ElementSymbol> = ["x.e1", "x.e2", "y.e1", "y.e3"]
        .iter()
        .map(ElementSymbol::new)
        .collect();
    let on = QueryParser::parse_criteria("x.e1 = y.e1").expect("on");
    let filter = QueryParser::parse_criteria(predicate).expect("predicate");
    let bindings = Bindings::new();
    let (left, right) = (left_rows(), right_rows());

    let mut joined = Vec::new();
    let mut right_matched = vec![false; right.len()];
    for l in &left {
        let mut matched = false;
        for (i, r) in right.iter().enumerate() {
            let row: Row = l.iter().chain(r).cloned().collect();
            if passes(&on, RowView::new(&elements, &row), &bindings).expect("on") {
                matched = true;
                right_matched[i] = true;
                joined.push(row);
            }
        }
        if !matched && matches!(join_type, JoinType::LeftOuter | JoinType::FullOuter) {
            joined.push(l.iter().cloned().chain([Scalar::Null, Scalar::Null]).collect());
        }
    }
    if matches!(join_type, JoinType::RightOuter | JoinType::FullOuter) {
        for (i, r) in right.iter().enumerate() {
            if !right_matched[i] {
                joined.push([Scalar::Null, Scalar::Null].into_iter().chain(r.iter().cloned()).collect());
            }
        }
    }
    joined
        .into_iter()
        .filter(|row| passes(&filter, RowView::new(&elements, row), &bindings).expect("where"))
        .collect()
}

fn sorted(mut rows: Vec<Row>) -> Vec<Row> {
    rows.sort_by_key(|r| format!("{:?}", r));
    rows
}

fn elements_of(node: &PhysicalNode) -> HashSet<ElementSymbol> {
    node.output().iter().cloned().collect()
}

/// Every operator only references elements produced by its inputs.
fn assert_well_formed(node: &PhysicalNode) {
    match node {
        PhysicalNode::Select { criteria, input, .. } => {
            let available = elements_of(input);
            for element in elements_in_criteria(criteria) {
                assert!(
                    available.contains(&element),
                    "select references {} but its input produces {:?}",
                    element,
                    input.output()
                );
            }
        }
        PhysicalNode::Join {
            criteria,
            left,
            right,
            ..
        } => {
            let available: HashSet<ElementSymbol> =
                elements_of(left).union(&elements_of(right)).cloned().collect();
            for element in criteria.iter().flat_map(elements_in_criteria) {
                assert!(available.contains(&element), "join references {}", element);
            }
        }
        PhysicalNode::Project {
            symbols,
            input: Some(input),
            ..
        } => {
            let available = elements_of(input);
            for symbol in symbols {
                for element in ElementCollectorVisitor::get_elements(&symbol.expression, true) {
                    assert!(available.contains(&element), "project references {}", element);
                }
            }
        }
        _ => {}
    }
    for child in node.children() {
        assert_well_formed(child);
    }
}

fn predicate_strategy() -> impl Strategy<Value = String> {
    let atom = prop_oneof![
        (0..6i32).prop_map(|n| format!("x.e2 > {}", n)),
        (9..42i32).prop_map(|n| format!("y.e3 >= {}", n)),
        Just("y.e3 IS NULL".to_string()),
        Just("x.e2 IS NULL".to_string()),
        Just("y.e1 IS NOT NULL".to_string()),
        Just("x.e1 IN ('a', 'c', 'd')".to_string()),
        Just("y.e1 = 'e'".to_string()),
        (0..50i32).prop_map(|n| format!("x.e2 + y.e3 < {}", n)),
    ];
    prop_oneof![
        proptest::collection::vec(atom.clone(), 1..4).prop_map(|atoms| atoms.join(" AND ")),
        (atom.clone(), atom.clone(), atom)
            .prop_map(|(a, b, c)| format!("({} OR {}) AND {}", a, b, c)),
    ]
}

fn join_type_strategy() -> impl Strategy<Value = JoinType> {
    prop_oneof![
        Just(JoinType::Inner),
        Just(JoinType::LeftOuter),
        Just(JoinType::RightOuter),
        Just(JoinType::FullOuter),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn test_pushed_criteria_keep_results(
        join_type in join_type_strategy(),
        predicate in predicate_strategy(),
    ) {
        let sql = query_sql(join_type, &predicate);
        let engine = engine();
        let plan = engine.plan(&sql).expect("plan");
        assert_well_formed(&plan.program.root);

        let expected = sorted(naive(join_type, &predicate));
        let (_, rows) = engine
            .execute_all(&sql, &engine.work_context(), Bindings::new())
            .expect("execute");
        prop_assert_eq!(sorted(rows), expected.clone(), "{}", sql);

        let scan_only = scan_only_engine();
        assert_well_formed(&scan_only.plan(&sql).expect("plan").program.root);
        let (_, rows) = scan_only
            .execute_all(&sql, &scan_only.work_context(), Bindings::new())
            .expect("execute");
        prop_assert_eq!(sorted(rows), expected, "{}", sql);
    }
}

#[test]
fn test_criteria_reach_the_source_when_supported() {
    let engine = engine();
    let plan = engine
        .plan("SELECT x.e1 FROM pm1.g1 AS x INNER JOIN pm2.g1 AS y ON x.e1 = y.e1 WHERE x.e2 > 1 AND y.e3 IS NULL")
        .expect("plan");
    let commands: Vec<String> = plan
        .program
        .root
        .access_commands()
        .iter()
        .map(|(_, q)| q.to_string())
        .collect();
    assert_eq!(commands.len(), 2);
    assert!(commands.iter().any(|c| c.contains("x.e2 > 1")), "{:?}", commands);
    assert!(commands.iter().any(|c| c.contains("y.e3 IS NULL")), "{:?}", commands);
}

#[test]
fn test_null_side_criteria_stay_above_outer_join() {
    let engine = engine();
    let sql = "SELECT x.e1 FROM pm1.g1 AS x LEFT OUTER JOIN pm2.g1 AS y ON x.e1 = y.e1 WHERE y.e3 IS NULL";
    let plan = engine.plan(sql).expect("plan");
    let pm2 = plan
        .program
        .root
        .access_commands()
        .into_iter()
        .find(|(model, _)| model.eq_ignore_ascii_case("pm2"))
        .map(|(_, q)| q.to_string())
        .expect("pm2 access");
    assert!(!pm2.contains("IS NULL"), "{}", pm2);

    let (_, rows) = engine
        .execute_all(sql, &engine.work_context(), Bindings::new())
        .expect("execute");
    assert_eq!(
        sorted(rows),
        sorted(vec![vec![s("b")], vec![s("c")], vec![s("d")], vec![Scalar::Null]])
    );
}

#[test]
fn test_rule_ceiling_stops_planning() {
    let vdb = VdbMetaData::from_yaml(VDB).expect("descriptor");
    let config = EngineConfig {
        optimizer_max_iterations: 1,
        ..EngineConfig::default()
    };
    let engine = Engine::from_vdb(vdb, config).expect("engine");
    let err = engine
        .plan("SELECT x.e1 FROM pm1.g1 AS x, pm2.g1 AS y WHERE x.e1 = y.e1")
        .err()
        .expect("ceiling");
    assert!(
        matches!(err, ExecError::Planner(PlannerError::RuleCycle { iterations: 1, .. })),
        "{}",
        err
    );
}
