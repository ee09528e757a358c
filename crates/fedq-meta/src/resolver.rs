//! Binds the groups and elements of a command against a `MetadataStore`.
//!
//! Resolution is scoped: a query sees its own FROM groups first, then the
//! groups of each enclosing query (correlated references are marked
//! `external`), then whatever the caller put in the [`ResolveContext`]
//! (procedure parameters, `NEW`/`OLD` in triggers, temp groups created by
//! earlier statements of the same block).

use fedq_core::schema::{DataType, Field};
use fedq_lang::{
    Block, Command, Criteria, ElementSymbol, Expression, ExpressionSymbol, FromClause,
    GroupBinding, GroupKind, GroupSymbol, Query, SelectSymbol,
};

use crate::error::{MetaError, Result};
use crate::model::{Procedure, Table};
use crate::store::MetadataStore;

/// A group visible during resolution, with its columns.
#[derive(Debug, Clone)]
pub struct ScopeGroup {
    /// Name elements use to qualify themselves.
    pub name: String,
    /// Unaliased object name, when the group has no alias.
    pub full_name: Option<String>,
    pub columns: Vec<(String, DataType)>,
}

impl ScopeGroup {
    pub fn new(name: impl Into<String>, columns: Vec<(String, DataType)>) -> Self {
        Self {
            name: name.into(),
            full_name: None,
            columns,
        }
    }

    fn from_table(name: &str, full_name: Option<String>, table: &Table) -> Self {
        Self {
            name: name.to_string(),
            full_name,
            columns: table
                .columns
                .iter()
                .map(|c| (c.name.clone(), c.runtime_type()))
                .collect(),
        }
    }

    fn from_fields(name: &str, fields: &[Field]) -> Self {
        Self::new(
            name,
            fields
                .iter()
                .map(|f| (f.name.clone(), f.data_type))
                .collect(),
        )
    }

    /// Does a qualifier written in a command denote this group?
    fn answers_to(&self, qualifier: &str) -> bool {
        if self.name.eq_ignore_ascii_case(qualifier) {
            return true;
        }
        // unaliased `pm1.g1` may be referenced as `g1`, and vice versa
        let full = self.full_name.as_deref().unwrap_or(&self.name);
        full.eq_ignore_ascii_case(qualifier)
            || last_segment(full).eq_ignore_ascii_case(qualifier)
                && self.full_name.is_some()
    }

    fn column(&self, name: &str) -> Option<&(String, DataType)> {
        self.columns
            .iter()
            .find(|(c, _)| c.eq_ignore_ascii_case(name))
    }
}

fn last_segment(name: &str) -> &str {
    name.rsplit_once('.').map(|(_, s)| s).unwrap_or(name)
}

/// Groups supplied by the caller, visible to every query of the command.
#[derive(Debug, Clone, Default)]
pub struct ResolveContext {
    groups: Vec<ScopeGroup>,
    temps: Vec<ScopeGroup>,
}

impl ResolveContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_group(mut self, group: ScopeGroup) -> Self {
        self.groups.push(group);
        self
    }

    /// Parameters of `procedure` as a group named after it, so bodies can use
    /// `param` or `proc.param`.
    pub fn for_procedure(procedure: &Procedure) -> Self {
        let columns = procedure
            .parameters
            .iter()
            .map(|p| (p.name.clone(), p.datatype.runtime_type))
            .collect();
        Self::new().with_group(ScopeGroup::new(procedure.name.clone(), columns))
    }

    /// `NEW` and `OLD` groups shaped like the view a trigger is defined on.
    pub fn for_trigger(view: &Table) -> Self {
        let columns: Vec<(String, DataType)> = view
            .columns
            .iter()
            .map(|c| (c.name.clone(), c.runtime_type()))
            .collect();
        Self::new()
            .with_group(ScopeGroup::new("NEW", columns.clone()))
            .with_group(ScopeGroup::new("OLD", columns))
    }

    fn temp(&self, name: &str) -> Option<&ScopeGroup> {
        self.temps.iter().find(|g| g.name.eq_ignore_ascii_case(name))
    }
}

pub struct QueryResolver<'a> {
    store: &'a MetadataStore,
}

impl<'a> QueryResolver<'a> {
    pub fn new(store: &'a MetadataStore) -> Self {
        Self { store }
    }

    /// Resolve a standalone query; returns its projected fields.
    pub fn resolve_query(&self, query: &mut Query) -> Result<Vec<Field>> {
        let mut ctx = ResolveContext::new();
        self.query(query, &[], &mut ctx)
    }

    /// Resolve any command. Returns the projection of the command when it is
    /// a query (or of the last query of a block), otherwise an empty list.
    pub fn resolve_command(
        &self,
        command: &mut Command,
        ctx: &mut ResolveContext,
    ) -> Result<Vec<Field>> {
        match command {
            Command::Query(q) => self.query(q, &[], ctx),
            Command::StoredProcedure(sp) => {
                let (schema, procedure) = self.store.find_procedure(sp.group.non_correlation_name())?;
                let max_args = procedure
                    .parameters
                    .iter()
                    .filter(|p| !matches!(p.param_type, crate::model::ParameterType::ReturnValue))
                    .count();
                if sp.parameters.len() > max_args {
                    return Err(MetaError::resolve(format!(
                        "procedure '{}' takes {} parameters but {} were given",
                        procedure.name,
                        max_args,
                        sp.parameters.len()
                    )));
                }
                sp.group.binding = Some(GroupBinding {
                    full_name: format!("{}.{}", schema, procedure.name),
                    model: schema.to_string(),
                    kind: GroupKind::Procedure,
                });
                let scopes = [ctx.groups.clone()];
                for p in &mut sp.parameters {
                    self.expression(p, &scopes, ctx)?;
                }
                Ok(procedure
                    .result_set
                    .iter()
                    .flatten()
                    .map(|c| Field::new(c.name.clone(), c.runtime_type(), true))
                    .collect())
            }
            Command::Insert(insert) => {
                let target = self.target_group(&mut insert.group)?;
                if insert.columns.is_empty() {
                    insert.columns = target
                        .columns
                        .iter()
                        .map(|(c, t)| ElementSymbol::qualified(target.name.clone(), c.clone()).with_type(*t))
                        .collect();
                } else {
                    let only = [vec![target.clone()]];
                    for col in &mut insert.columns {
                        bind_element(col, &only)?;
                    }
                }
                if insert.columns.len() != insert.values.len() {
                    return Err(MetaError::resolve(format!(
                        "INSERT into '{}' names {} columns but supplies {} values",
                        insert.group.name,
                        insert.columns.len(),
                        insert.values.len()
                    )));
                }
                let scopes = [ctx.groups.clone()];
                for v in &mut insert.values {
                    self.expression(v, &scopes, ctx)?;
                }
                Ok(Vec::new())
            }
            Command::Update(update) => {
                let target = self.target_group(&mut update.group)?;
                let scopes = [vec![target], ctx.groups.clone()];
                for change in &mut update.changes {
                    bind_element(&mut change.symbol, &scopes[..1])?;
                    self.expression(&mut change.value, &scopes, ctx)?;
                }
                if let Some(c) = &mut update.criteria {
                    self.criteria(c, &scopes, ctx)?;
                }
                Ok(Vec::new())
            }
            Command::Delete(delete) => {
                let target = self.target_group(&mut delete.group)?;
                let scopes = [vec![target], ctx.groups.clone()];
                if let Some(c) = &mut delete.criteria {
                    self.criteria(c, &scopes, ctx)?;
                }
                Ok(Vec::new())
            }
            Command::Block(block) => self.block(block, ctx),
            Command::CreateProcedure(p) => self.block(&mut p.block, ctx),
            Command::TriggerAction(t) => self.block(&mut t.block, ctx),
        }
    }

    fn block(&self, block: &mut Block, ctx: &mut ResolveContext) -> Result<Vec<Field>> {
        let mut last = Vec::new();
        for statement in &mut block.statements {
            let fields = self.resolve_command(statement, ctx)?;
            if matches!(statement, Command::Query(_)) {
                last = fields;
            }
        }
        Ok(last)
    }

    /// Bind a DML target, which must be a table or view (or a known temp group).
    fn target_group(&self, group: &mut GroupSymbol) -> Result<ScopeGroup> {
        self.bind_group(group, &ResolveContext::new())
    }

    fn bind_group(&self, group: &mut GroupSymbol, ctx: &ResolveContext) -> Result<ScopeGroup> {
        let object = group.non_correlation_name().to_string();
        let aliased = group.definition.is_some();
        if group.is_temp() {
            let temp = ctx
                .temp(&object)
                .ok_or_else(|| MetaError::resolve(format!("Group does not exist: {}", object)))?;
            group.binding = Some(GroupBinding {
                full_name: object.clone(),
                model: String::new(),
                kind: GroupKind::Temp,
            });
            let mut scope = temp.clone();
            scope.name = group.name.clone();
            return Ok(scope);
        }
        match self.store.find_table(&object) {
            Ok((schema, table)) => {
                let full_name = format!("{}.{}", schema, table.name);
                group.binding = Some(GroupBinding {
                    full_name: full_name.clone(),
                    model: schema.to_string(),
                    kind: if table.is_virtual() {
                        GroupKind::View
                    } else {
                        GroupKind::PhysicalTable
                    },
                });
                Ok(ScopeGroup::from_table(
                    &group.name,
                    (!aliased).then_some(full_name),
                    table,
                ))
            }
            Err(MetaError::NotFound(_)) => {
                // a procedure with a result set can be selected from
                let (schema, procedure) = self.store.find_procedure(&object).map_err(|e| match e {
                    MetaError::NotFound(_) => {
                        MetaError::resolve(format!("Group does not exist: {}", object))
                    }
                    other => other,
                })?;
                let columns = procedure
                    .result_set
                    .as_ref()
                    .ok_or_else(|| {
                        MetaError::resolve(format!(
                            "procedure '{}' has no result set to select from",
                            object
                        ))
                    })?
                    .iter()
                    .map(|c| (c.name.clone(), c.runtime_type()))
                    .collect();
                let full_name = format!("{}.{}", schema, procedure.name);
                group.binding = Some(GroupBinding {
                    full_name: full_name.clone(),
                    model: schema.to_string(),
                    kind: GroupKind::Procedure,
                });
                Ok(ScopeGroup {
                    name: group.name.clone(),
                    full_name: (!aliased).then_some(full_name),
                    columns,
                })
            }
            Err(e) => Err(e),
        }
    }

    fn query(
        &self,
        query: &mut Query,
        outer: &[Vec<ScopeGroup>],
        ctx: &mut ResolveContext,
    ) -> Result<Vec<Field>> {
        let mut local: Vec<ScopeGroup> = Vec::new();
        if let Some(from) = &mut query.from {
            for clause in &mut from.clauses {
                self.from_clause(clause, outer, ctx, &mut local)?;
            }
        }
        let mut scopes: Vec<Vec<ScopeGroup>> = Vec::with_capacity(outer.len() + 2);
        scopes.push(local.clone());
        scopes.extend(outer.iter().cloned());
        scopes.push(ctx.groups.clone());

        expand_all_symbols(query, &local)?;
        for symbol in &mut query.select.symbols {
            if let SelectSymbol::Expression(es) = symbol {
                self.expression(&mut es.expression, &scopes, ctx)?;
            }
        }
        if let Some(c) = &mut query.criteria {
            self.criteria(c, &scopes, ctx)?;
        }

        let fields: Vec<Field> = query
            .select
            .symbols
            .iter()
            .enumerate()
            .filter_map(|(i, s)| match s {
                SelectSymbol::Expression(es) => Some(Field::new(
                    es.output_name(i),
                    es.expression.data_type().unwrap_or(DataType::Object),
                    true,
                )),
                SelectSymbol::All(_) => None,
            })
            .collect();

        if let Some(into) = &mut query.into {
            if into.group.is_temp() {
                let name = into.group.name.clone();
                if ctx.temp(&name).is_none() {
                    ctx.temps.push(ScopeGroup::from_fields(&name, &fields));
                }
                into.group.binding = Some(GroupBinding {
                    full_name: name,
                    model: String::new(),
                    kind: GroupKind::Temp,
                });
            } else {
                let target = self.bind_group(&mut into.group, ctx)?;
                if target.columns.len() != fields.len() {
                    return Err(MetaError::resolve(format!(
                        "INTO '{}' expects {} columns but the query projects {}",
                        into.group.name,
                        target.columns.len(),
                        fields.len()
                    )));
                }
            }
        }
        Ok(fields)
    }

    fn from_clause(
        &self,
        clause: &mut FromClause,
        outer: &[Vec<ScopeGroup>],
        ctx: &mut ResolveContext,
        local: &mut Vec<ScopeGroup>,
    ) -> Result<()> {
        match clause {
            FromClause::Unary(u) => {
                let scope = self.bind_group(&mut u.group, ctx)?;
                push_unique(local, scope)
            }
            FromClause::Subquery(sub) => {
                let fields = self.query(&mut sub.command, outer, ctx)?;
                sub.group.binding = Some(GroupBinding {
                    full_name: sub.group.name.clone(),
                    model: String::new(),
                    kind: GroupKind::InlineView,
                });
                push_unique(local, ScopeGroup::from_fields(&sub.group.name, &fields))
            }
            FromClause::Join(join) => {
                let mut joined = Vec::new();
                self.from_clause(&mut join.left, outer, ctx, &mut joined)?;
                self.from_clause(&mut join.right, outer, ctx, &mut joined)?;
                let mut scopes = vec![joined.clone()];
                scopes.extend(outer.iter().cloned());
                scopes.push(ctx.groups.clone());
                for c in &mut join.criteria {
                    self.criteria(c, &scopes, ctx)?;
                }
                for g in joined {
                    push_unique(local, g)?;
                }
                Ok(())
            }
        }
    }

    fn criteria(
        &self,
        criteria: &mut Criteria,
        scopes: &[Vec<ScopeGroup>],
        ctx: &mut ResolveContext,
    ) -> Result<()> {
        match criteria {
            Criteria::Compare(c) => {
                self.expression(&mut c.left, scopes, ctx)?;
                self.expression(&mut c.right, scopes, ctx)
            }
            Criteria::IsNull(c) => self.expression(&mut c.expression, scopes, ctx),
            Criteria::Not(n) => self.criteria(&mut n.criteria, scopes, ctx),
            Criteria::Compound(c) => {
                for part in &mut c.criteria {
                    self.criteria(part, scopes, ctx)?;
                }
                Ok(())
            }
            Criteria::Set(s) => {
                self.expression(&mut s.expression, scopes, ctx)?;
                for v in &mut s.values {
                    self.expression(v, scopes, ctx)?;
                }
                Ok(())
            }
            Criteria::Exists(e) => self.query(&mut e.query, scopes, ctx).map(|_| ()),
            Criteria::Literal(_) => Ok(()),
        }
    }

    fn expression(
        &self,
        expr: &mut Expression,
        scopes: &[Vec<ScopeGroup>],
        ctx: &mut ResolveContext,
    ) -> Result<()> {
        match expr {
            Expression::Element(e) => bind_element(e, scopes),
            Expression::Constant(_) => Ok(()),
            Expression::Reference(r) => match &mut r.element {
                Some(e) => bind_element(e, scopes),
                None => Ok(()),
            },
            Expression::Function(f) => {
                for a in &mut f.args {
                    self.expression(a, scopes, ctx)?;
                }
                f.data_type = Some(function_type(&f.name, &f.args));
                Ok(())
            }
            Expression::SearchedCase(case) => {
                for w in &mut case.when {
                    self.criteria(w, scopes, ctx)?;
                }
                for t in &mut case.then {
                    self.expression(t, scopes, ctx)?;
                }
                if let Some(e) = &mut case.else_expression {
                    self.expression(e, scopes, ctx)?;
                }
                case.data_type = case
                    .then
                    .iter()
                    .chain(case.else_expression.as_deref())
                    .find_map(|e| e.data_type().filter(|t| *t != DataType::Null));
                Ok(())
            }
            Expression::ScalarSubquery(s) => {
                let fields = self.query(&mut s.query, scopes, ctx)?;
                if fields.len() != 1 {
                    return Err(MetaError::resolve(format!(
                        "scalar subquery must project exactly one column, found {}",
                        fields.len()
                    )));
                }
                Ok(())
            }
        }
    }
}

fn push_unique(local: &mut Vec<ScopeGroup>, group: ScopeGroup) -> Result<()> {
    if local.iter().any(|g| g.name.eq_ignore_ascii_case(&group.name)) {
        return Err(MetaError::resolve(format!(
            "group '{}' appears more than once in the FROM clause",
            group.name
        )));
    }
    local.push(group);
    Ok(())
}

/// Replace `*` and `g.*` with explicit, typed element symbols.
fn expand_all_symbols(query: &mut Query, local: &[ScopeGroup]) -> Result<()> {
    if !query
        .select
        .symbols
        .iter()
        .any(|s| matches!(s, SelectSymbol::All(_)))
    {
        return Ok(());
    }
    let mut expanded = Vec::with_capacity(query.select.symbols.len());
    for symbol in query.select.symbols.drain(..) {
        match symbol {
            SelectSymbol::All(all) => {
                let groups: Vec<&ScopeGroup> = match &all.group {
                    None => local.iter().collect(),
                    Some(g) => {
                        let found = local.iter().find(|s| s.answers_to(g)).ok_or_else(|| {
                            MetaError::resolve(format!("Group does not exist: {}", g))
                        })?;
                        vec![found]
                    }
                };
                if groups.is_empty() {
                    return Err(MetaError::resolve("SELECT * requires a FROM clause"));
                }
                for g in groups {
                    for (col, dt) in &g.columns {
                        expanded.push(SelectSymbol::Expression(ExpressionSymbol::new(
                            Expression::Element(
                                ElementSymbol::qualified(g.name.clone(), col.clone()).with_type(*dt),
                            ),
                        )));
                    }
                }
            }
            other => expanded.push(other),
        }
    }
    query.select.symbols = expanded;
    Ok(())
}

/// Bind an element against scopes ordered innermost first.
fn bind_element(element: &mut ElementSymbol, scopes: &[Vec<ScopeGroup>]) -> Result<()> {
    for (depth, level) in scopes.iter().enumerate() {
        let candidates: Vec<(&ScopeGroup, &(String, DataType))> = match &element.group {
            Some(q) => level
                .iter()
                .filter(|g| g.answers_to(q))
                .filter_map(|g| g.column(&element.short_name).map(|c| (g, c)))
                .collect(),
            None => level
                .iter()
                .filter_map(|g| g.column(&element.short_name).map(|c| (g, c)))
                .collect(),
        };
        match candidates.as_slice() {
            [] => continue,
            [(group, (column, dt))] => {
                element.group = Some(group.name.clone());
                element.short_name = column.clone();
                element.data_type = Some(*dt);
                element.external = depth > 0;
                return Ok(());
            }
            _ => {
                return Err(MetaError::resolve(format!(
                    "Element '{}' is ambiguous",
                    element
                )))
            }
        }
    }
    Err(MetaError::resolve(format!(
        "Element '{}' is not found",
        element
    )))
}

fn function_type(name: &str, args: &[Expression]) -> DataType {
    let arg_types: Vec<DataType> = args.iter().filter_map(|a| a.data_type()).collect();
    match name.to_ascii_lowercase().as_str() {
        "||" | "concat" | "upper" | "ucase" | "lower" | "lcase" | "substring" | "trim" => {
            DataType::String
        }
        "length" | "char_length" => DataType::Integer,
        "+" | "-" | "*" | "/" | "abs" => {
            if arg_types
                .iter()
                .any(|t| matches!(t, DataType::Double | DataType::Float))
            {
                DataType::Double
            } else if arg_types.contains(&DataType::BigDecimal) {
                DataType::BigDecimal
            } else if arg_types
                .iter()
                .any(|t| matches!(t, DataType::Long | DataType::BigInteger))
            {
                DataType::Long
            } else {
                DataType::Integer
            }
        }
        "coalesce" | "ifnull" | "nvl" => arg_types
            .into_iter()
            .find(|t| *t != DataType::Null)
            .unwrap_or(DataType::Null),
        _ => DataType::Object,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ddl::parse_ddl;
    use crate::factory::MetadataFactory;
    use fedq_lang::QueryParser;

    fn store() -> MetadataStore {
        let mut store = MetadataStore::new();
        let mut pm1 = MetadataFactory::new("vdb", 1, "pm1", true);
        parse_ddl(
            &mut pm1,
            "CREATE FOREIGN TABLE g1(e1 varchar, e2 integer, e3 boolean); \
             CREATE FOREIGN TABLE g2(e1 varchar, e2 integer);",
        )
        .unwrap();
        pm1.merge_into(&mut store).unwrap();
        store
    }

    fn resolve(sql: &str) -> Result<(Query, Vec<Field>)> {
        let store = store();
        let mut q = QueryParser::parse_query(sql).unwrap();
        let fields = QueryResolver::new(&store).resolve_query(&mut q)?;
        Ok((q, fields))
    }

    #[test]
    fn star_expands_to_typed_columns() {
        let (q, fields) = resolve("SELECT * FROM pm1.g1").unwrap();
        assert_eq!(fields.len(), 3);
        assert_eq!(fields[1].data_type, DataType::Integer);
        assert_eq!(q.to_string(), "SELECT pm1.g1.e1, pm1.g1.e2, pm1.g1.e3 FROM pm1.g1");
        let g = &q.from_groups()[0];
        assert_eq!(g.kind(), Some(GroupKind::PhysicalTable));
        assert_eq!(g.model(), Some("pm1"));
    }

    #[test]
    fn unqualified_ambiguous_element_fails() {
        let err = resolve("SELECT e1 FROM pm1.g1, pm1.g2").unwrap_err();
        assert!(err.to_string().contains("ambiguous"));
        assert!(resolve("SELECT e3 FROM pm1.g1, pm1.g2").is_ok());
    }

    #[test]
    fn aliases_and_simple_names() {
        let (q, _) = resolve("SELECT a.e1, g2.e2 FROM pm1.g1 AS a, pm1.g2 WHERE a.e2 = g2.e2").unwrap();
        assert_eq!(q.to_string(), "SELECT a.e1, pm1.g2.e2 FROM pm1.g1 AS a, pm1.g2 WHERE a.e2 = pm1.g2.e2");
    }

    #[test]
    fn inline_view_columns_come_from_projection() {
        let (_, fields) =
            resolve("SELECT v.x FROM (SELECT e2 AS x FROM pm1.g1) AS v WHERE v.x > 1").unwrap();
        assert_eq!(fields[0].name, "x");
        assert_eq!(fields[0].data_type, DataType::Integer);
    }

    #[test]
    fn correlated_reference_is_external() {
        let (q, _) = resolve(
            "SELECT e1 FROM pm1.g1 WHERE EXISTS (SELECT e1 FROM pm1.g2 WHERE pm1.g2.e2 = pm1.g1.e2)",
        )
        .unwrap();
        let exists = match q.criteria.as_ref().unwrap() {
            Criteria::Exists(e) => e,
            other => panic!("unexpected {:?}", other),
        };
        let inner = match exists.query.criteria.as_ref().unwrap() {
            Criteria::Compare(c) => c,
            other => panic!("unexpected {:?}", other),
        };
        assert!(!inner.left.as_element().unwrap().external);
        assert!(inner.right.as_element().unwrap().external);
    }

    #[test]
    fn unknown_group_fails() {
        let err = resolve("SELECT * FROM foo").unwrap_err();
        assert!(err.to_string().contains("Group does not exist"));
    }

    #[test]
    fn temp_groups_flow_through_a_block() {
        let store = store();
        let mut cmd = QueryParser::parse_command(
            "BEGIN SELECT e1, e2 INTO #t FROM pm1.g1; SELECT e2 FROM #t; END",
        )
        .unwrap();
        let fields = QueryResolver::new(&store)
            .resolve_command(&mut cmd, &mut ResolveContext::new())
            .unwrap();
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].data_type, DataType::Integer);
    }

    #[test]
    fn trigger_scope_has_new_and_old() {
        let store = store();
        let view = store.find_table("pm1.g2").unwrap().1.clone();
        let mut cmd = QueryParser::parse_command(
            "FOR EACH ROW BEGIN ATOMIC UPDATE pm1.g2 SET e1 = NEW.e1 WHERE e2 = OLD.e2; END",
        )
        .unwrap();
        QueryResolver::new(&store)
            .resolve_command(&mut cmd, &mut ResolveContext::for_trigger(&view))
            .unwrap();
    }
}
