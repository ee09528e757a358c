//! Visitor double dispatch over the closed set of language node kinds.
//!
//! Each concrete node calls exactly one `visit_*` method from
//! `accept_visitor`. All methods default to no-ops, so an analysis overrides
//! only the kinds it cares about. The order in which nodes are offered to a
//! visitor is decided by a navigator (see `navigator.rs`), never by the
//! visitor itself.

use crate::command::*;
use crate::expr::*;
use crate::navigator::Navigator;
use crate::symbol::{ElementSymbol, GroupSymbol};

#[allow(unused_variables)]
pub trait LanguageVisitor {
    // symbols
    fn visit_group_symbol(&mut self, obj: &GroupSymbol) {}
    fn visit_element_symbol(&mut self, obj: &ElementSymbol) {}

    // expressions
    fn visit_constant(&mut self, obj: &Constant) {}
    fn visit_reference(&mut self, obj: &Reference) {}
    fn visit_function(&mut self, obj: &Function) {}
    fn visit_searched_case(&mut self, obj: &SearchedCaseExpression) {}
    fn visit_scalar_subquery(&mut self, obj: &ScalarSubquery) {}

    // criteria
    fn visit_compare_criteria(&mut self, obj: &CompareCriteria) {}
    fn visit_is_null_criteria(&mut self, obj: &IsNullCriteria) {}
    fn visit_not_criteria(&mut self, obj: &NotCriteria) {}
    fn visit_compound_criteria(&mut self, obj: &CompoundCriteria) {}
    fn visit_set_criteria(&mut self, obj: &SetCriteria) {}
    fn visit_exists_criteria(&mut self, obj: &ExistsCriteria) {}
    fn visit_literal_criteria(&mut self, value: bool) {}

    // clauses
    fn visit_select(&mut self, obj: &Select) {}
    fn visit_all_symbol(&mut self, obj: &AllSymbol) {}
    fn visit_expression_symbol(&mut self, obj: &ExpressionSymbol) {}
    fn visit_from(&mut self, obj: &FromList) {}
    fn visit_unary_from_clause(&mut self, obj: &UnaryFromClause) {}
    fn visit_join_predicate(&mut self, obj: &JoinPredicate) {}
    fn visit_subquery_from_clause(&mut self, obj: &SubqueryFromClause) {}
    /// Called once the navigator has left a subquery-from-clause.
    fn end_subquery_from_clause(&mut self, obj: &SubqueryFromClause) {}
    fn visit_into(&mut self, obj: &IntoClause) {}
    fn visit_limit(&mut self, obj: &Limit) {}
    fn visit_set_clause(&mut self, obj: &SetClause) {}

    // commands
    fn visit_query(&mut self, obj: &Query) {}
    fn visit_stored_procedure(&mut self, obj: &StoredProcedure) {}
    fn visit_insert(&mut self, obj: &Insert) {}
    fn visit_update(&mut self, obj: &Update) {}
    fn visit_delete(&mut self, obj: &Delete) {}
    fn visit_block(&mut self, obj: &Block) {}
    fn visit_create_procedure(&mut self, obj: &CreateProcedure) {}
    fn visit_trigger_action(&mut self, obj: &TriggerAction) {}
}

/// A node of the language tree.
pub trait LanguageObject {
    /// Dispatch to the visitor method for this node's concrete kind.
    fn accept_visitor(&self, visitor: &mut dyn LanguageVisitor);

    /// Offer this node and its children to the navigator in structural order.
    fn navigate(&self, navigator: &mut Navigator<'_>);
}
