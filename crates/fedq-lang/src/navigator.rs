//! Pre-order navigation.
//!
//! A navigator offers a node to the visitor before its children, in a fixed
//! structural order (for a query: select, into, from, where, limit). The plain
//! pre-order navigator stays within the current command scope; the deep one
//! also enters nested command bodies (inline views, EXISTS, scalar
//! subqueries). Navigators are created fresh per call and hold no state
//! beyond the borrowed visitor.

use crate::command::*;
use crate::expr::*;
use crate::symbol::{ElementSymbol, GroupSymbol};
use crate::visitor::{LanguageObject, LanguageVisitor};

pub struct Navigator<'v> {
    visitor: &'v mut dyn LanguageVisitor,
    deep: bool,
}

impl<'v> Navigator<'v> {
    pub fn new(visitor: &'v mut dyn LanguageVisitor, deep: bool) -> Self {
        Self { visitor, deep }
    }

    pub fn visit_node(&mut self, obj: &dyn LanguageObject) {
        obj.navigate(self);
    }

    fn pre(&mut self, obj: &dyn LanguageObject) {
        obj.accept_visitor(&mut *self.visitor);
    }

    fn visit_all<T: LanguageObject>(&mut self, items: &[T]) {
        for item in items {
            self.visit_node(item);
        }
    }

    /// Enter a nested command body only when navigating deeply.
    fn nested(&mut self, obj: &dyn LanguageObject) {
        if self.deep {
            self.visit_node(obj);
        }
    }
}

pub struct PreOrderNavigator;

impl PreOrderNavigator {
    pub fn do_visit(obj: &dyn LanguageObject, visitor: &mut dyn LanguageVisitor) {
        Navigator::new(visitor, false).visit_node(obj);
    }
}

pub struct DeepPreOrderNavigator;

impl DeepPreOrderNavigator {
    pub fn do_visit(obj: &dyn LanguageObject, visitor: &mut dyn LanguageVisitor) {
        Navigator::new(visitor, true).visit_node(obj);
    }
}

// ----- symbols -----

impl LanguageObject for GroupSymbol {
    fn accept_visitor(&self, visitor: &mut dyn LanguageVisitor) {
        visitor.visit_group_symbol(self);
    }
    fn navigate(&self, nav: &mut Navigator<'_>) {
        nav.pre(self);
    }
}

impl LanguageObject for ElementSymbol {
    fn accept_visitor(&self, visitor: &mut dyn LanguageVisitor) {
        visitor.visit_element_symbol(self);
    }
    fn navigate(&self, nav: &mut Navigator<'_>) {
        nav.pre(self);
    }
}

// ----- expressions -----

impl LanguageObject for Expression {
    fn accept_visitor(&self, visitor: &mut dyn LanguageVisitor) {
        match self {
            Expression::Element(e) => e.accept_visitor(visitor),
            Expression::Constant(c) => c.accept_visitor(visitor),
            Expression::Reference(r) => r.accept_visitor(visitor),
            Expression::Function(f) => f.accept_visitor(visitor),
            Expression::SearchedCase(c) => c.accept_visitor(visitor),
            Expression::ScalarSubquery(s) => s.accept_visitor(visitor),
        }
    }
    fn navigate(&self, nav: &mut Navigator<'_>) {
        match self {
            Expression::Element(e) => e.navigate(nav),
            Expression::Constant(c) => c.navigate(nav),
            Expression::Reference(r) => r.navigate(nav),
            Expression::Function(f) => f.navigate(nav),
            Expression::SearchedCase(c) => c.navigate(nav),
            Expression::ScalarSubquery(s) => s.navigate(nav),
        }
    }
}

impl LanguageObject for Constant {
    fn accept_visitor(&self, visitor: &mut dyn LanguageVisitor) {
        visitor.visit_constant(self);
    }
    fn navigate(&self, nav: &mut Navigator<'_>) {
        nav.pre(self);
    }
}

impl LanguageObject for Reference {
    fn accept_visitor(&self, visitor: &mut dyn LanguageVisitor) {
        visitor.visit_reference(self);
    }
    fn navigate(&self, nav: &mut Navigator<'_>) {
        nav.pre(self);
    }
}

impl LanguageObject for Function {
    fn accept_visitor(&self, visitor: &mut dyn LanguageVisitor) {
        visitor.visit_function(self);
    }
    fn navigate(&self, nav: &mut Navigator<'_>) {
        nav.pre(self);
        nav.visit_all(&self.args);
    }
}

impl LanguageObject for SearchedCaseExpression {
    fn accept_visitor(&self, visitor: &mut dyn LanguageVisitor) {
        visitor.visit_searched_case(self);
    }
    fn navigate(&self, nav: &mut Navigator<'_>) {
        nav.pre(self);
        for (when, then) in self.when.iter().zip(self.then.iter()) {
            nav.visit_node(when);
            nav.visit_node(then);
        }
        if let Some(e) = &self.else_expression {
            nav.visit_node(&**e);
        }
    }
}

impl LanguageObject for ScalarSubquery {
    fn accept_visitor(&self, visitor: &mut dyn LanguageVisitor) {
        visitor.visit_scalar_subquery(self);
    }
    fn navigate(&self, nav: &mut Navigator<'_>) {
        nav.pre(self);
        nav.nested(&*self.query);
    }
}

// ----- criteria -----

impl LanguageObject for Criteria {
    fn accept_visitor(&self, visitor: &mut dyn LanguageVisitor) {
        match self {
            Criteria::Compare(c) => c.accept_visitor(visitor),
            Criteria::IsNull(c) => c.accept_visitor(visitor),
            Criteria::Not(c) => c.accept_visitor(visitor),
            Criteria::Compound(c) => c.accept_visitor(visitor),
            Criteria::Set(c) => c.accept_visitor(visitor),
            Criteria::Exists(c) => c.accept_visitor(visitor),
            Criteria::Literal(v) => visitor.visit_literal_criteria(*v),
        }
    }
    fn navigate(&self, nav: &mut Navigator<'_>) {
        match self {
            Criteria::Compare(c) => c.navigate(nav),
            Criteria::IsNull(c) => c.navigate(nav),
            Criteria::Not(c) => c.navigate(nav),
            Criteria::Compound(c) => c.navigate(nav),
            Criteria::Set(c) => c.navigate(nav),
            Criteria::Exists(c) => c.navigate(nav),
            Criteria::Literal(_) => nav.pre(self),
        }
    }
}

impl LanguageObject for CompareCriteria {
    fn accept_visitor(&self, visitor: &mut dyn LanguageVisitor) {
        visitor.visit_compare_criteria(self);
    }
    fn navigate(&self, nav: &mut Navigator<'_>) {
        nav.pre(self);
        nav.visit_node(&self.left);
        nav.visit_node(&self.right);
    }
}

impl LanguageObject for IsNullCriteria {
    fn accept_visitor(&self, visitor: &mut dyn LanguageVisitor) {
        visitor.visit_is_null_criteria(self);
    }
    fn navigate(&self, nav: &mut Navigator<'_>) {
        nav.pre(self);
        nav.visit_node(&self.expression);
    }
}

impl LanguageObject for NotCriteria {
    fn accept_visitor(&self, visitor: &mut dyn LanguageVisitor) {
        visitor.visit_not_criteria(self);
    }
    fn navigate(&self, nav: &mut Navigator<'_>) {
        nav.pre(self);
        nav.visit_node(&*self.criteria);
    }
}

impl LanguageObject for CompoundCriteria {
    fn accept_visitor(&self, visitor: &mut dyn LanguageVisitor) {
        visitor.visit_compound_criteria(self);
    }
    fn navigate(&self, nav: &mut Navigator<'_>) {
        nav.pre(self);
        nav.visit_all(&self.criteria);
    }
}

impl LanguageObject for SetCriteria {
    fn accept_visitor(&self, visitor: &mut dyn LanguageVisitor) {
        visitor.visit_set_criteria(self);
    }
    fn navigate(&self, nav: &mut Navigator<'_>) {
        nav.pre(self);
        nav.visit_node(&self.expression);
        nav.visit_all(&self.values);
    }
}

impl LanguageObject for ExistsCriteria {
    fn accept_visitor(&self, visitor: &mut dyn LanguageVisitor) {
        visitor.visit_exists_criteria(self);
    }
    fn navigate(&self, nav: &mut Navigator<'_>) {
        nav.pre(self);
        nav.nested(&*self.query);
    }
}

// ----- clauses -----

impl LanguageObject for Select {
    fn accept_visitor(&self, visitor: &mut dyn LanguageVisitor) {
        visitor.visit_select(self);
    }
    fn navigate(&self, nav: &mut Navigator<'_>) {
        nav.pre(self);
        nav.visit_all(&self.symbols);
    }
}

impl LanguageObject for SelectSymbol {
    fn accept_visitor(&self, visitor: &mut dyn LanguageVisitor) {
        match self {
            SelectSymbol::All(a) => a.accept_visitor(visitor),
            SelectSymbol::Expression(e) => e.accept_visitor(visitor),
        }
    }
    fn navigate(&self, nav: &mut Navigator<'_>) {
        match self {
            SelectSymbol::All(a) => a.navigate(nav),
            SelectSymbol::Expression(e) => e.navigate(nav),
        }
    }
}

impl LanguageObject for AllSymbol {
    fn accept_visitor(&self, visitor: &mut dyn LanguageVisitor) {
        visitor.visit_all_symbol(self);
    }
    fn navigate(&self, nav: &mut Navigator<'_>) {
        nav.pre(self);
    }
}

impl LanguageObject for ExpressionSymbol {
    fn accept_visitor(&self, visitor: &mut dyn LanguageVisitor) {
        visitor.visit_expression_symbol(self);
    }
    fn navigate(&self, nav: &mut Navigator<'_>) {
        nav.pre(self);
        nav.visit_node(&self.expression);
    }
}

impl LanguageObject for FromList {
    fn accept_visitor(&self, visitor: &mut dyn LanguageVisitor) {
        visitor.visit_from(self);
    }
    fn navigate(&self, nav: &mut Navigator<'_>) {
        nav.pre(self);
        nav.visit_all(&self.clauses);
    }
}

impl LanguageObject for FromClause {
    fn accept_visitor(&self, visitor: &mut dyn LanguageVisitor) {
        match self {
            FromClause::Unary(u) => u.accept_visitor(visitor),
            FromClause::Join(j) => j.accept_visitor(visitor),
            FromClause::Subquery(s) => s.accept_visitor(visitor),
        }
    }
    fn navigate(&self, nav: &mut Navigator<'_>) {
        match self {
            FromClause::Unary(u) => u.navigate(nav),
            FromClause::Join(j) => j.navigate(nav),
            FromClause::Subquery(s) => s.navigate(nav),
        }
    }
}

impl LanguageObject for UnaryFromClause {
    fn accept_visitor(&self, visitor: &mut dyn LanguageVisitor) {
        visitor.visit_unary_from_clause(self);
    }
    fn navigate(&self, nav: &mut Navigator<'_>) {
        nav.pre(self);
        nav.visit_node(&self.group);
    }
}

impl LanguageObject for JoinPredicate {
    fn accept_visitor(&self, visitor: &mut dyn LanguageVisitor) {
        visitor.visit_join_predicate(self);
    }
    fn navigate(&self, nav: &mut Navigator<'_>) {
        nav.pre(self);
        nav.visit_node(&*self.left);
        nav.visit_node(&*self.right);
        nav.visit_all(&self.criteria);
    }
}

impl LanguageObject for SubqueryFromClause {
    fn accept_visitor(&self, visitor: &mut dyn LanguageVisitor) {
        visitor.visit_subquery_from_clause(self);
    }
    fn navigate(&self, nav: &mut Navigator<'_>) {
        nav.pre(self);
        nav.nested(&*self.command);
        nav.visit_node(&self.group);
        nav.visitor.end_subquery_from_clause(self);
    }
}

impl LanguageObject for IntoClause {
    fn accept_visitor(&self, visitor: &mut dyn LanguageVisitor) {
        visitor.visit_into(self);
    }
    fn navigate(&self, nav: &mut Navigator<'_>) {
        nav.pre(self);
        nav.visit_node(&self.group);
    }
}

impl LanguageObject for Limit {
    fn accept_visitor(&self, visitor: &mut dyn LanguageVisitor) {
        visitor.visit_limit(self);
    }
    fn navigate(&self, nav: &mut Navigator<'_>) {
        nav.pre(self);
    }
}

impl LanguageObject for SetClause {
    fn accept_visitor(&self, visitor: &mut dyn LanguageVisitor) {
        visitor.visit_set_clause(self);
    }
    fn navigate(&self, nav: &mut Navigator<'_>) {
        nav.pre(self);
        nav.visit_node(&self.symbol);
        nav.visit_node(&self.value);
    }
}

// ----- commands -----

impl LanguageObject for Command {
    fn accept_visitor(&self, visitor: &mut dyn LanguageVisitor) {
        match self {
            Command::Query(c) => c.accept_visitor(visitor),
            Command::StoredProcedure(c) => c.accept_visitor(visitor),
            Command::Insert(c) => c.accept_visitor(visitor),
            Command::Update(c) => c.accept_visitor(visitor),
            Command::Delete(c) => c.accept_visitor(visitor),
            Command::Block(c) => c.accept_visitor(visitor),
            Command::CreateProcedure(c) => c.accept_visitor(visitor),
            Command::TriggerAction(c) => c.accept_visitor(visitor),
        }
    }
    fn navigate(&self, nav: &mut Navigator<'_>) {
        match self {
            Command::Query(c) => c.navigate(nav),
            Command::StoredProcedure(c) => c.navigate(nav),
            Command::Insert(c) => c.navigate(nav),
            Command::Update(c) => c.navigate(nav),
            Command::Delete(c) => c.navigate(nav),
            Command::Block(c) => c.navigate(nav),
            Command::CreateProcedure(c) => c.navigate(nav),
            Command::TriggerAction(c) => c.navigate(nav),
        }
    }
}

impl LanguageObject for Query {
    fn accept_visitor(&self, visitor: &mut dyn LanguageVisitor) {
        visitor.visit_query(self);
    }
    fn navigate(&self, nav: &mut Navigator<'_>) {
        nav.pre(self);
        nav.visit_node(&self.select);
        if let Some(into) = &self.into {
            nav.visit_node(into);
        }
        if let Some(from) = &self.from {
            nav.visit_node(from);
        }
        if let Some(criteria) = &self.criteria {
            nav.visit_node(criteria);
        }
        if let Some(limit) = &self.limit {
            nav.visit_node(limit);
        }
    }
}

impl LanguageObject for StoredProcedure {
    fn accept_visitor(&self, visitor: &mut dyn LanguageVisitor) {
        visitor.visit_stored_procedure(self);
    }
    fn navigate(&self, nav: &mut Navigator<'_>) {
        nav.pre(self);
        nav.visit_all(&self.parameters);
    }
}

impl LanguageObject for Insert {
    fn accept_visitor(&self, visitor: &mut dyn LanguageVisitor) {
        visitor.visit_insert(self);
    }
    fn navigate(&self, nav: &mut Navigator<'_>) {
        nav.pre(self);
        nav.visit_node(&self.group);
        nav.visit_all(&self.columns);
        nav.visit_all(&self.values);
    }
}

impl LanguageObject for Update {
    fn accept_visitor(&self, visitor: &mut dyn LanguageVisitor) {
        visitor.visit_update(self);
    }
    fn navigate(&self, nav: &mut Navigator<'_>) {
        nav.pre(self);
        nav.visit_node(&self.group);
        nav.visit_all(&self.changes);
        if let Some(criteria) = &self.criteria {
            nav.visit_node(criteria);
        }
    }
}

impl LanguageObject for Delete {
    fn accept_visitor(&self, visitor: &mut dyn LanguageVisitor) {
        visitor.visit_delete(self);
    }
    fn navigate(&self, nav: &mut Navigator<'_>) {
        nav.pre(self);
        nav.visit_node(&self.group);
        if let Some(criteria) = &self.criteria {
            nav.visit_node(criteria);
        }
    }
}

impl LanguageObject for Block {
    fn accept_visitor(&self, visitor: &mut dyn LanguageVisitor) {
        visitor.visit_block(self);
    }
    fn navigate(&self, nav: &mut Navigator<'_>) {
        nav.pre(self);
        nav.visit_all(&self.statements);
    }
}

impl LanguageObject for CreateProcedure {
    fn accept_visitor(&self, visitor: &mut dyn LanguageVisitor) {
        visitor.visit_create_procedure(self);
    }
    fn navigate(&self, nav: &mut Navigator<'_>) {
        nav.pre(self);
        nav.visit_node(&self.block);
    }
}

impl LanguageObject for TriggerAction {
    fn accept_visitor(&self, visitor: &mut dyn LanguageVisitor) {
        visitor.visit_trigger_action(self);
    }
    fn navigate(&self, nav: &mut Navigator<'_>) {
        nav.pre(self);
        nav.visit_node(&self.block);
    }
}
