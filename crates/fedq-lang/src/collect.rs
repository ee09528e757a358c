//! Collector visitors.

use std::collections::HashSet;

use crate::command::{IntoClause, StoredProcedure, SubqueryFromClause};
use crate::expr::Reference;
use crate::navigator::{DeepPreOrderNavigator, PreOrderNavigator};
use crate::symbol::{ElementSymbol, GroupSymbol};
use crate::visitor::{LanguageObject, LanguageVisitor};

/// Keep the first occurrence of each item, preserving order.
fn dedupe<T: Clone + Eq + std::hash::Hash>(items: Vec<T>) -> Vec<T> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.clone()))
        .collect()
}

/// Collects the groups a language object references.
///
/// Group references directly following an INTO marker are recorded only when
/// they are not temporary groups; the marker applies to that single reference.
/// Stored procedure calls record their procedure group.
///
/// When built with [`GroupCollectorVisitor::ignoring_inline_views`], groups
/// seen inside a subquery-from-clause body are kept apart from the outer
/// list, and the inline view names are subtracted from it. An outer group
/// that also appears inside an inline view stays in the result.
#[derive(Debug, Default)]
pub struct GroupCollectorVisitor {
    groups: Vec<GroupSymbol>,
    is_into_clause_group: bool,
    inline_view_groups: Option<Vec<GroupSymbol>>,
    inline_view_aliases: Vec<GroupSymbol>,
    inline_view_depth: usize,
}

impl GroupCollectorVisitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ignoring_inline_views() -> Self {
        Self {
            inline_view_groups: Some(Vec::new()),
            ..Self::default()
        }
    }

    pub fn groups(&self) -> &[GroupSymbol] {
        &self.groups
    }

    /// Groups seen inside inline view bodies, when they are being ignored.
    pub fn inline_view_groups(&self) -> &[GroupSymbol] {
        self.inline_view_groups.as_deref().unwrap_or_default()
    }

    /// Groups referenced by `obj` in its own scope, in pre-order.
    ///
    /// With `remove_duplicates` the result holds each group once (first
    /// occurrence order); otherwise every reference is listed.
    pub fn get_groups(obj: &dyn LanguageObject, remove_duplicates: bool) -> Vec<GroupSymbol> {
        let mut visitor = GroupCollectorVisitor::new();
        PreOrderNavigator::do_visit(obj, &mut visitor);
        visitor.into_result(remove_duplicates)
    }

    /// Groups referenced by `obj` and any nested command bodies, minus the
    /// groups introduced by inline views.
    pub fn get_groups_ignore_inline_views(
        obj: &dyn LanguageObject,
        remove_duplicates: bool,
    ) -> Vec<GroupSymbol> {
        let mut visitor = GroupCollectorVisitor::ignoring_inline_views();
        DeepPreOrderNavigator::do_visit(obj, &mut visitor);
        visitor.into_result(remove_duplicates)
    }

    pub fn into_result(self, remove_duplicates: bool) -> Vec<GroupSymbol> {
        let mut groups = self.groups;
        if self.inline_view_groups.is_some() {
            let aliases: HashSet<GroupSymbol> = self.inline_view_aliases.into_iter().collect();
            groups.retain(|g| !aliases.contains(g));
        }
        if remove_duplicates {
            dedupe(groups)
        } else {
            groups
        }
    }

    fn record(&mut self, obj: &GroupSymbol) {
        if self.inline_view_depth > 0 {
            if let Some(inline) = self.inline_view_groups.as_mut() {
                inline.push(obj.clone());
                return;
            }
        }
        self.groups.push(obj.clone());
    }
}

impl LanguageVisitor for GroupCollectorVisitor {
    fn visit_group_symbol(&mut self, obj: &GroupSymbol) {
        if self.is_into_clause_group {
            if !obj.is_temp() {
                self.record(obj);
            }
            self.is_into_clause_group = false;
        } else {
            self.record(obj);
        }
    }

    fn visit_stored_procedure(&mut self, obj: &StoredProcedure) {
        self.record(&obj.group);
    }

    fn visit_into(&mut self, _obj: &IntoClause) {
        self.is_into_clause_group = true;
    }

    fn visit_subquery_from_clause(&mut self, obj: &SubqueryFromClause) {
        if self.inline_view_groups.is_some() {
            self.inline_view_aliases.push(obj.group.clone());
            self.inline_view_depth += 1;
        }
    }

    fn end_subquery_from_clause(&mut self, _obj: &SubqueryFromClause) {
        if self.inline_view_groups.is_some() {
            self.inline_view_depth = self.inline_view_depth.saturating_sub(1);
        }
    }
}

/// Collects element symbols.
#[derive(Debug, Default)]
pub struct ElementCollectorVisitor {
    elements: Vec<ElementSymbol>,
}

impl ElementCollectorVisitor {
    /// Elements in `obj`'s own scope, not descending into subqueries.
    pub fn get_elements(obj: &dyn LanguageObject, remove_duplicates: bool) -> Vec<ElementSymbol> {
        let mut visitor = Self::default();
        PreOrderNavigator::do_visit(obj, &mut visitor);
        if remove_duplicates {
            dedupe(visitor.elements)
        } else {
            visitor.elements
        }
    }

    /// Elements including those of nested command bodies.
    pub fn get_elements_deep(obj: &dyn LanguageObject) -> Vec<ElementSymbol> {
        let mut visitor = Self::default();
        DeepPreOrderNavigator::do_visit(obj, &mut visitor);
        dedupe(visitor.elements)
    }
}

impl LanguageVisitor for ElementCollectorVisitor {
    fn visit_element_symbol(&mut self, obj: &ElementSymbol) {
        self.elements.push(obj.clone());
    }
}

/// Collects parameter references, including those inside subqueries.
#[derive(Debug, Default)]
pub struct ReferenceCollectorVisitor {
    references: Vec<Reference>,
}

impl ReferenceCollectorVisitor {
    pub fn get_references(obj: &dyn LanguageObject) -> Vec<Reference> {
        let mut visitor = Self::default();
        DeepPreOrderNavigator::do_visit(obj, &mut visitor);
        visitor.references
    }
}

impl LanguageVisitor for ReferenceCollectorVisitor {
    fn visit_reference(&mut self, obj: &Reference) {
        if !self.references.contains(obj) {
            self.references.push(obj.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::*;
    use crate::expr::*;
    use fedq_core::types::Scalar;

    fn select_star_from(groups: Vec<FromClause>) -> Query {
        Query {
            select: Select {
                distinct: false,
                symbols: vec![SelectSymbol::All(AllSymbol { group: None })],
            },
            from: Some(FromList { clauses: groups }),
            ..Default::default()
        }
    }

    fn names(groups: &[GroupSymbol]) -> Vec<String> {
        groups.iter().map(|g| g.name.clone()).collect()
    }

    #[test]
    fn list_policy_keeps_duplicates() {
        let q = select_star_from(vec![
            FromClause::unary(GroupSymbol::new("pm1.g1")),
            FromClause::unary(GroupSymbol::new("PM1.G1")),
        ]);
        assert_eq!(GroupCollectorVisitor::get_groups(&q, false).len(), 2);
        assert_eq!(GroupCollectorVisitor::get_groups(&q, true).len(), 1);
    }

    #[test]
    fn into_temp_group_is_skipped_but_only_once() {
        let mut q = select_star_from(vec![FromClause::unary(GroupSymbol::new("#other"))]);
        q.into = Some(IntoClause {
            group: GroupSymbol::new("#temp"),
        });
        // The FROM group is also temporary but follows the INTO target, so it is kept.
        assert_eq!(names(&GroupCollectorVisitor::get_groups(&q, false)), vec!["#other"]);
    }

    #[test]
    fn into_physical_group_is_recorded() {
        let mut q = select_star_from(vec![FromClause::unary(GroupSymbol::new("pm1.g1"))]);
        q.into = Some(IntoClause {
            group: GroupSymbol::new("pm1.g2"),
        });
        assert_eq!(
            names(&GroupCollectorVisitor::get_groups(&q, false)),
            vec!["pm1.g2", "pm1.g1"]
        );
    }

    #[test]
    fn inline_view_groups_are_excluded() {
        let inner = select_star_from(vec![FromClause::unary(GroupSymbol::new("pm1.g2"))]);
        let q = select_star_from(vec![
            FromClause::unary(GroupSymbol::new("pm1.g1")),
            FromClause::Subquery(SubqueryFromClause {
                group: GroupSymbol::new("x"),
                command: Box::new(inner),
            }),
        ]);
        assert_eq!(
            names(&GroupCollectorVisitor::get_groups_ignore_inline_views(&q, true)),
            vec!["pm1.g1"]
        );
        // Plain pre-order sees the inline view name but not its body.
        assert_eq!(
            names(&GroupCollectorVisitor::get_groups(&q, true)),
            vec!["pm1.g1", "x"]
        );
    }

    #[test]
    fn outer_group_also_used_inside_an_inline_view_is_kept() {
        let inner = select_star_from(vec![FromClause::unary(GroupSymbol::new("pm1.g1"))]);
        let q = select_star_from(vec![
            FromClause::unary(GroupSymbol::new("pm1.g1")),
            FromClause::Subquery(SubqueryFromClause {
                group: GroupSymbol::new("x"),
                command: Box::new(inner),
            }),
        ]);
        let mut visitor = GroupCollectorVisitor::ignoring_inline_views();
        DeepPreOrderNavigator::do_visit(&q, &mut visitor);
        assert_eq!(names(visitor.inline_view_groups()), vec!["pm1.g1", "x"]);
        assert_eq!(names(&visitor.into_result(false)), vec!["pm1.g1"]);
    }

    #[test]
    fn deep_traversal_enters_exists_subqueries() {
        let inner = select_star_from(vec![FromClause::unary(GroupSymbol::new("pm1.g3"))]);
        let mut q = select_star_from(vec![FromClause::unary(GroupSymbol::new("pm1.g1"))]);
        q.criteria = Some(Criteria::Exists(ExistsCriteria {
            query: Box::new(inner),
            negated: false,
        }));
        assert_eq!(
            names(&GroupCollectorVisitor::get_groups_ignore_inline_views(&q, true)),
            vec!["pm1.g1", "pm1.g3"]
        );
        assert_eq!(names(&GroupCollectorVisitor::get_groups(&q, true)), vec!["pm1.g1"]);
    }

    #[test]
    fn stored_procedure_records_its_group() {
        let proc = Command::StoredProcedure(StoredProcedure {
            group: GroupSymbol::new("pm1.sq1"),
            parameters: vec![Expression::constant(Scalar::I32(1))],
        });
        assert_eq!(names(&GroupCollectorVisitor::get_groups(&proc, false)), vec!["pm1.sq1"]);
    }

    #[test]
    fn references_are_collected_once() {
        let c = Criteria::Compound(CompoundCriteria {
            operator: LogicalOp::And,
            criteria: vec![
                Criteria::compare(
                    Expression::element("e1"),
                    CompareOp::Eq,
                    Expression::Reference(Reference::positional(0)),
                ),
                Criteria::compare(
                    Expression::element("e2"),
                    CompareOp::Eq,
                    Expression::Reference(Reference::positional(0)),
                ),
            ],
        });
        assert_eq!(ReferenceCollectorVisitor::get_references(&c).len(), 1);
        assert_eq!(ElementCollectorVisitor::get_elements(&c, true).len(), 2);
    }
}
