//! Commands and clauses.

use serde::{Deserialize, Serialize};

use crate::expr::{Criteria, Expression};
use crate::symbol::{ElementSymbol, GroupSymbol};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Command {
    Query(Query),
    StoredProcedure(StoredProcedure),
    Insert(Insert),
    Update(Update),
    Delete(Delete),
    Block(Block),
    CreateProcedure(CreateProcedure),
    TriggerAction(TriggerAction),
}

impl Command {
    pub fn as_query(&self) -> Option<&Query> {
        match self {
            Command::Query(q) => Some(q),
            _ => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Command::Query(_) => "query",
            Command::StoredProcedure(_) => "stored procedure",
            Command::Insert(_) => "insert",
            Command::Update(_) => "update",
            Command::Delete(_) => "delete",
            Command::Block(_) => "block",
            Command::CreateProcedure(_) => "create procedure",
            Command::TriggerAction(_) => "trigger action",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Query {
    pub select: Select,
    pub into: Option<IntoClause>,
    pub from: Option<FromList>,
    pub criteria: Option<Criteria>,
    pub limit: Option<Limit>,
}

impl Query {
    /// Every group named directly in the FROM clause, left to right.
    pub fn from_groups(&self) -> Vec<&GroupSymbol> {
        let mut out = Vec::new();
        if let Some(from) = &self.from {
            for clause in &from.clauses {
                clause.collect_groups(&mut out);
            }
        }
        out
    }

    /// Names of the projected columns, as a consumer of this query sees them.
    pub fn projected_names(&self) -> Vec<String> {
        self.select
            .symbols
            .iter()
            .enumerate()
            .map(|(i, s)| match s {
                SelectSymbol::Expression(e) => e.output_name(i),
                SelectSymbol::All(a) => a.group.clone().unwrap_or_else(|| "*".into()),
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Select {
    pub distinct: bool,
    pub symbols: Vec<SelectSymbol>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SelectSymbol {
    All(AllSymbol),
    Expression(ExpressionSymbol),
}

/// `*` or `group.*`; replaced by explicit symbols during resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllSymbol {
    pub group: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpressionSymbol {
    pub expression: Expression,
    pub alias: Option<String>,
}

impl ExpressionSymbol {
    pub fn new(expression: Expression) -> Self {
        Self {
            expression,
            alias: None,
        }
    }

    /// Output column name: alias, else the element's short name, else `exprN`.
    pub fn output_name(&self, position: usize) -> String {
        if let Some(alias) = &self.alias {
            return alias.clone();
        }
        match &self.expression {
            Expression::Element(e) => e.short_name.clone(),
            _ => format!("expr{}", position + 1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FromList {
    pub clauses: Vec<FromClause>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FromClause {
    Unary(UnaryFromClause),
    Join(JoinPredicate),
    Subquery(SubqueryFromClause),
}

impl FromClause {
    pub fn unary(group: GroupSymbol) -> Self {
        FromClause::Unary(UnaryFromClause { group })
    }

    fn collect_groups<'a>(&'a self, out: &mut Vec<&'a GroupSymbol>) {
        match self {
            FromClause::Unary(u) => out.push(&u.group),
            FromClause::Subquery(s) => out.push(&s.group),
            FromClause::Join(j) => {
                j.left.collect_groups(out);
                j.right.collect_groups(out);
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnaryFromClause {
    pub group: GroupSymbol,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JoinType {
    Inner,
    Cross,
    LeftOuter,
    RightOuter,
    FullOuter,
}

impl JoinType {
    pub fn is_outer(&self) -> bool {
        matches!(
            self,
            JoinType::LeftOuter | JoinType::RightOuter | JoinType::FullOuter
        )
    }

    pub fn sql(&self) -> &'static str {
        match self {
            JoinType::Inner => "INNER JOIN",
            JoinType::Cross => "CROSS JOIN",
            JoinType::LeftOuter => "LEFT OUTER JOIN",
            JoinType::RightOuter => "RIGHT OUTER JOIN",
            JoinType::FullOuter => "FULL OUTER JOIN",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinPredicate {
    pub left: Box<FromClause>,
    pub right: Box<FromClause>,
    pub join_type: JoinType,
    pub criteria: Vec<Criteria>,
}

/// Inline view: `(SELECT ...) AS name`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubqueryFromClause {
    pub group: GroupSymbol,
    pub command: Box<Query>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntoClause {
    pub group: GroupSymbol,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Limit {
    pub offset: u64,
    pub row_limit: u64,
}

/// `EXEC proc(args)`; the procedure is referenced as a group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredProcedure {
    pub group: GroupSymbol,
    pub parameters: Vec<Expression>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insert {
    pub group: GroupSymbol,
    pub columns: Vec<ElementSymbol>,
    pub values: Vec<Expression>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetClause {
    pub symbol: ElementSymbol,
    pub value: Expression,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Update {
    pub group: GroupSymbol,
    pub changes: Vec<SetClause>,
    pub criteria: Option<Criteria>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delete {
    pub group: GroupSymbol,
    pub criteria: Option<Criteria>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Block {
    pub atomic: bool,
    pub statements: Vec<Command>,
}

/// Body of a virtual procedure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateProcedure {
    pub block: Block,
}

/// Body of an INSTEAD OF trigger, run once per affected row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerAction {
    pub block: Block,
}
