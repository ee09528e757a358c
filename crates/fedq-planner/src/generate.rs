//! Canonical plan generation from a resolved query.
//!
//! Shape, bottom up: the FROM clauses as a left-deep join tree (views and
//! inline views as `Source` nodes over their own plans), one `Select` per
//! WHERE conjunct, then `Project`, `DupRemove` and `Limit`.

use fedq_core::schema::DataType;
use fedq_lang::{
    Command, Criteria, ExpressionSymbol, FromClause, GroupKind, GroupSymbol, JoinType, Query,
    QueryParser, SelectSymbol,
};
use fedq_meta::{MetadataStore, QueryResolver};
use tracing::trace;

use crate::error::{PlannerError, Result};
use crate::plan::{NodeKind, PlanNodeId, PlanTree};

/// Nesting limit for view expansion; deeper means a view refers to itself.
const MAX_VIEW_DEPTH: usize = 32;

pub struct PlanGenerator<'a> {
    store: &'a MetadataStore,
}

impl<'a> PlanGenerator<'a> {
    pub fn new(store: &'a MetadataStore) -> Self {
        Self { store }
    }

    pub fn generate(&self, query: &Query) -> Result<PlanTree> {
        let mut tree = PlanTree::new();
        let root = self.query_plan(&mut tree, query, 0)?;
        tree.set_root(root);
        trace!(nodes = tree.len(), "canonical plan generated");
        Ok(tree)
    }

    fn query_plan(&self, tree: &mut PlanTree, query: &Query, depth: usize) -> Result<PlanNodeId> {
        if query.into.is_some() {
            return Err(PlannerError::Unsupported("SELECT ... INTO".into()));
        }

        let mut top = None;
        if let Some(from) = &query.from {
            for clause in &from.clauses {
                let node = self.clause_plan(tree, clause, depth)?;
                top = Some(match top {
                    None => node,
                    Some(left) => tree.add_with_children(
                        NodeKind::Join {
                            join_type: JoinType::Cross,
                            criteria: Vec::new(),
                        },
                        &[left, node],
                    ),
                });
            }
        }

        if let Some(criteria) = &query.criteria {
            let Some(below) = top else {
                return Err(PlannerError::Unsupported("WHERE without FROM".into()));
            };
            let mut cur = below;
            for conjunct in criteria.clone().separate_conjuncts() {
                cur = tree.add_with_children(NodeKind::Select { criteria: conjunct }, &[cur]);
            }
            top = Some(cur);
        }

        let mut symbols = Vec::with_capacity(query.select.symbols.len());
        for symbol in &query.select.symbols {
            match symbol {
                SelectSymbol::Expression(e) => symbols.push(e.clone()),
                SelectSymbol::All(_) => {
                    return Err(PlannerError::Resolve(
                        "select list still contains '*'; resolve the query first".into(),
                    ))
                }
            }
        }
        let project = tree.add(NodeKind::Project { symbols });
        if let Some(below) = top {
            tree.add_child(project, below);
        }
        let mut cur = project;

        if query.select.distinct {
            cur = tree.add_with_children(NodeKind::DupRemove, &[cur]);
        }
        if let Some(limit) = query.limit {
            cur = tree.add_with_children(
                NodeKind::Limit {
                    offset: limit.offset,
                    row_limit: limit.row_limit,
                },
                &[cur],
            );
        }
        Ok(cur)
    }

    fn clause_plan(&self, tree: &mut PlanTree, clause: &FromClause, depth: usize) -> Result<PlanNodeId> {
        match clause {
            FromClause::Unary(u) => self.group_plan(tree, &u.group, depth),
            FromClause::Subquery(s) => {
                let child = self.query_plan(tree, &s.command, depth + 1)?;
                let columns = projected_columns(&s.command);
                Ok(tree.add_with_children(
                    NodeKind::Source {
                        group: s.group.clone(),
                        columns,
                    },
                    &[child],
                ))
            }
            FromClause::Join(j) => {
                let left = self.clause_plan(tree, &j.left, depth)?;
                let right = self.clause_plan(tree, &j.right, depth)?;
                let criteria: Vec<Criteria> = j
                    .criteria
                    .iter()
                    .cloned()
                    .flat_map(Criteria::separate_conjuncts)
                    .collect();
                let join_type = if j.join_type == JoinType::Cross && !criteria.is_empty() {
                    JoinType::Inner
                } else {
                    j.join_type
                };
                Ok(tree.add_with_children(
                    NodeKind::Join {
                        join_type,
                        criteria,
                    },
                    &[left, right],
                ))
            }
        }
    }

    fn group_plan(&self, tree: &mut PlanTree, group: &GroupSymbol, depth: usize) -> Result<PlanNodeId> {
        let binding = group
            .binding
            .as_ref()
            .ok_or_else(|| PlannerError::Resolve(format!("group {} is not resolved", group.name)))?;
        let (_, table) = self.store.find_table(&binding.full_name)?;
        let columns: Vec<(String, DataType)> = table
            .columns
            .iter()
            .map(|c| (c.name.clone(), c.runtime_type()))
            .collect();
        match binding.kind {
            GroupKind::PhysicalTable => Ok(tree.add(NodeKind::Source {
                group: group.clone(),
                columns,
            })),
            GroupKind::View => {
                if depth >= MAX_VIEW_DEPTH {
                    return Err(PlannerError::Unsupported(format!(
                        "view {} nests deeper than {} levels",
                        binding.full_name, MAX_VIEW_DEPTH
                    )));
                }
                let text = table.select_transformation.as_deref().ok_or_else(|| {
                    PlannerError::Resolve(format!("view {} has no definition", binding.full_name))
                })?;
                let mut definition = match QueryParser::parse_command(text)
                    .map_err(|e| PlannerError::Resolve(e.to_string()))?
                {
                    Command::Query(q) => q,
                    other => {
                        return Err(PlannerError::Resolve(format!(
                            "view {} is defined by a {}",
                            binding.full_name,
                            other.kind()
                        )))
                    }
                };
                QueryResolver::new(self.store).resolve_query(&mut definition)?;
                if definition.select.symbols.len() != columns.len() {
                    return Err(PlannerError::Resolve(format!(
                        "view {} declares {} columns but its definition projects {}",
                        binding.full_name,
                        columns.len(),
                        definition.select.symbols.len()
                    )));
                }
                let child = self.query_plan(tree, &definition, depth + 1)?;
                Ok(tree.add_with_children(
                    NodeKind::Source {
                        group: group.clone(),
                        columns,
                    },
                    &[child],
                ))
            }
            other => Err(PlannerError::Unsupported(format!(
                "{:?} group {} in FROM",
                other, group.name
            ))),
        }
    }
}

/// Output names and types of a resolved query's select list.
pub fn projected_columns(query: &Query) -> Vec<(String, DataType)> {
    query
        .select
        .symbols
        .iter()
        .enumerate()
        .filter_map(|(i, s)| match s {
            SelectSymbol::Expression(e) => Some(column_of(e, i)),
            SelectSymbol::All(_) => None,
        })
        .collect()
}

fn column_of(symbol: &ExpressionSymbol, position: usize) -> (String, DataType) {
    (
        symbol.output_name(position),
        symbol.expression.data_type().unwrap_or(DataType::Object),
    )
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use fedq_meta::{parse_ddl, MetadataFactory};

    pub(crate) fn store() -> MetadataStore {
        let mut store = MetadataStore::new();
        for (model, physical, ddl) in [
            (
                "pm1",
                true,
                "CREATE FOREIGN TABLE g1(e1 string, e2 integer, e3 boolean) OPTIONS (CARDINALITY 1000); \
                 CREATE FOREIGN TABLE g2(e1 string, e2 integer, e3 boolean) OPTIONS (CARDINALITY 10);",
            ),
            (
                "pm2",
                true,
                "CREATE FOREIGN TABLE g1(e1 string, e2 integer, e3 boolean);",
            ),
            (
                "vm1",
                false,
                "CREATE VIEW v1(a string, b integer) AS SELECT e1, e2 FROM pm1.g1 WHERE e3 = TRUE; \
                 CREATE VIEW v2(a string) AS SELECT DISTINCT e1 FROM pm1.g2;",
            ),
        ] {
            let mut f = MetadataFactory::new("vdb", 1, model, physical);
            parse_ddl(&mut f, ddl).unwrap();
            f.merge_into(&mut store).unwrap();
        }
        store
    }

    pub(crate) fn resolved(store: &MetadataStore, sql: &str) -> Query {
        let mut q = QueryParser::parse_query(sql).unwrap();
        QueryResolver::new(store).resolve_query(&mut q).unwrap();
        q
    }

    #[test]
    fn canonical_shape() {
        let store = store();
        let q = resolved(
            &store,
            "SELECT DISTINCT a.e1 FROM pm1.g1 AS a, pm1.g2 WHERE a.e2 = pm1.g2.e2 AND a.e3 = TRUE LIMIT 5",
        );
        let tree = PlanGenerator::new(&store).generate(&q).unwrap();
        let plan = tree.explain();
        let expected = "Limit 0, 5\n  DupRemove\n    Project [a.e1]\n      Select [a.e3 = TRUE]\n        Select [a.e2 = pm1.g2.e2]\n          Join CROSS JOIN\n            Source pm1.g1 AS a\n            Source pm1.g2\n";
        assert_eq!(plan, expected);
    }

    #[test]
    fn views_expand_beneath_their_source() {
        let store = store();
        let q = resolved(&store, "SELECT a FROM vm1.v1 WHERE b > 1");
        let tree = PlanGenerator::new(&store).generate(&q).unwrap();
        let sources = tree.find(|k| matches!(k, NodeKind::Source { .. }));
        assert_eq!(sources.len(), 2);
        let view = sources[0];
        assert!(matches!(tree.kind(tree.child(view).unwrap()), NodeKind::Project { .. }));
        assert_eq!(tree.output_elements(view)[1].name(), "vm1.v1.b");
    }

    #[test]
    fn join_on_criteria_split_into_conjuncts() {
        let store = store();
        let q = resolved(
            &store,
            "SELECT x.e1 FROM pm1.g1 AS x LEFT OUTER JOIN pm1.g2 AS y ON x.e2 = y.e2 AND y.e3 = TRUE",
        );
        let tree = PlanGenerator::new(&store).generate(&q).unwrap();
        let join = tree.find(|k| matches!(k, NodeKind::Join { .. }))[0];
        match tree.kind(join) {
            NodeKind::Join { join_type, criteria } => {
                assert_eq!(*join_type, JoinType::LeftOuter);
                assert_eq!(criteria.len(), 2);
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn select_without_from_projects_one_row() {
        let store = store();
        let q = resolved(&store, "SELECT 1");
        let tree = PlanGenerator::new(&store).generate(&q).unwrap();
        assert_eq!(tree.explain(), "Project [1]\n");
    }
}
