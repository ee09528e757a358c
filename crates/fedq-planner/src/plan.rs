//! Arena-allocated relational plan tree.
//!
//! Nodes live in a `Vec` and refer to each other by `PlanNodeId`; rules
//! rewire parent/child links instead of moving subtrees. Detached nodes stay
//! in the arena and are simply unreachable from the root.

use std::collections::BTreeSet;
use std::fmt;

use fedq_core::id::NodeId;
use fedq_core::schema::DataType;
use fedq_lang::{Criteria, ElementSymbol, ExpressionSymbol, GroupSymbol, JoinType};

use crate::error::{PlannerError, Result};

pub type PlanNodeId = NodeId;

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Project {
        symbols: Vec<ExpressionSymbol>,
    },
    Select {
        criteria: Criteria,
    },
    Join {
        join_type: JoinType,
        criteria: Vec<Criteria>,
    },
    /// A group in FROM. Physical groups are leaves; views and inline views
    /// carry their definition's plan as the single child.
    Source {
        group: GroupSymbol,
        columns: Vec<(String, DataType)>,
    },
    /// Everything beneath is sent to the source of `model`.
    Access {
        model: String,
    },
    DupRemove,
    Limit {
        offset: u64,
        row_limit: u64,
    },
    /// Produces no rows; keeps its former subtree only for output shape.
    Null,
}

impl NodeKind {
    pub fn name(&self) -> &'static str {
        match self {
            NodeKind::Project { .. } => "Project",
            NodeKind::Select { .. } => "Select",
            NodeKind::Join { .. } => "Join",
            NodeKind::Source { .. } => "Source",
            NodeKind::Access { .. } => "Access",
            NodeKind::DupRemove => "DupRemove",
            NodeKind::Limit { .. } => "Limit",
            NodeKind::Null => "Null",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlanNode {
    pub kind: NodeKind,
    pub parent: Option<PlanNodeId>,
    pub children: Vec<PlanNodeId>,
}

#[derive(Debug, Clone, Default)]
pub struct PlanTree {
    nodes: Vec<PlanNode>,
    root: Option<PlanNodeId>,
}

fn idx(id: PlanNodeId) -> usize {
    id.get() as usize
}

impl PlanTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, kind: NodeKind) -> PlanNodeId {
        let id = NodeId::new(self.nodes.len() as u64);
        self.nodes.push(PlanNode {
            kind,
            parent: None,
            children: Vec::new(),
        });
        id
    }

    /// Add a node with `children` attached in order.
    pub fn add_with_children(&mut self, kind: NodeKind, children: &[PlanNodeId]) -> PlanNodeId {
        let id = self.add(kind);
        for &c in children {
            self.add_child(id, c);
        }
        id
    }

    pub fn root(&self) -> Result<PlanNodeId> {
        self.root
            .ok_or_else(|| PlannerError::Invariant("plan has no root".into()))
    }

    pub fn set_root(&mut self, id: PlanNodeId) {
        self.nodes[idx(id)].parent = None;
        self.root = Some(id);
    }

    pub fn node(&self, id: PlanNodeId) -> &PlanNode {
        &self.nodes[idx(id)]
    }

    pub fn node_mut(&mut self, id: PlanNodeId) -> &mut PlanNode {
        &mut self.nodes[idx(id)]
    }

    pub fn kind(&self, id: PlanNodeId) -> &NodeKind {
        &self.nodes[idx(id)].kind
    }

    pub fn children(&self, id: PlanNodeId) -> &[PlanNodeId] {
        &self.nodes[idx(id)].children
    }

    pub fn child(&self, id: PlanNodeId) -> Option<PlanNodeId> {
        self.nodes[idx(id)].children.first().copied()
    }

    pub fn parent(&self, id: PlanNodeId) -> Option<PlanNodeId> {
        self.nodes[idx(id)].parent
    }

    pub fn add_child(&mut self, parent: PlanNodeId, child: PlanNodeId) {
        self.nodes[idx(child)].parent = Some(parent);
        self.nodes[idx(parent)].children.push(child);
    }

    /// Point whatever referenced `old` (its parent, or the root) at `new`.
    fn replace_in_parent(&mut self, old: PlanNodeId, new: PlanNodeId) {
        match self.nodes[idx(old)].parent {
            Some(p) => {
                for c in self.nodes[idx(p)].children.iter_mut() {
                    if *c == old {
                        *c = new;
                    }
                }
                self.nodes[idx(new)].parent = Some(p);
            }
            None => {
                if self.root == Some(old) {
                    self.root = Some(new);
                }
                self.nodes[idx(new)].parent = None;
            }
        }
        self.nodes[idx(old)].parent = None;
    }

    /// Remove a unary node, linking its parent straight to its child.
    pub fn detach(&mut self, id: PlanNodeId) -> Result<()> {
        let child = match self.nodes[idx(id)].children.as_slice() {
            [c] => *c,
            _ => {
                return Err(PlannerError::Invariant(format!(
                    "cannot detach {} node with {} children",
                    self.kind(id).name(),
                    self.children(id).len()
                )))
            }
        };
        self.replace_in_parent(id, child);
        self.nodes[idx(id)].children.clear();
        Ok(())
    }

    /// Put the (childless) node `new` directly above `target`.
    pub fn insert_above(&mut self, target: PlanNodeId, new: PlanNodeId) {
        self.replace_in_parent(target, new);
        self.nodes[idx(new)].children = vec![target];
        self.nodes[idx(target)].parent = Some(new);
    }

    /// Replace the subtree at `old` with `new` in the parent's child list.
    pub fn replace(&mut self, old: PlanNodeId, new: PlanNodeId) {
        self.replace_in_parent(old, new);
    }

    /// Whether `id` is reachable from the root.
    pub fn is_attached(&self, id: PlanNodeId) -> bool {
        let mut cur = id;
        loop {
            if self.root == Some(cur) {
                return true;
            }
            match self.nodes[idx(cur)].parent {
                Some(p) => cur = p,
                None => return false,
            }
        }
    }

    /// Reachable nodes in pre-order.
    pub fn preorder(&self) -> Vec<PlanNodeId> {
        let mut out = Vec::new();
        if let Some(root) = self.root {
            let mut stack = vec![root];
            while let Some(id) = stack.pop() {
                out.push(id);
                for &c in self.children(id).iter().rev() {
                    stack.push(c);
                }
            }
        }
        out
    }

    /// Reachable nodes whose kind matches.
    pub fn find(&self, pred: impl Fn(&NodeKind) -> bool) -> Vec<PlanNodeId> {
        self.preorder()
            .into_iter()
            .filter(|&id| pred(self.kind(id)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.preorder().len()
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Lower-case names of the groups whose elements are visible at the
    /// output of `id`. Views hide the groups of their definition.
    pub fn groups(&self, id: PlanNodeId) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        self.collect_groups(id, &mut out);
        out
    }

    fn collect_groups(&self, id: PlanNodeId, out: &mut BTreeSet<String>) {
        match self.kind(id) {
            NodeKind::Source { group, .. } => {
                out.insert(group.canonical_name());
            }
            NodeKind::Project { .. } => {}
            _ => {
                for &c in self.children(id) {
                    self.collect_groups(c, out);
                }
            }
        }
    }

    /// The elements produced at the output of `id`, positionally.
    pub fn output_elements(&self, id: PlanNodeId) -> Vec<ElementSymbol> {
        match self.kind(id) {
            NodeKind::Source { group, columns } => columns
                .iter()
                .map(|(name, dt)| ElementSymbol::qualified(group.name.clone(), name.clone()).with_type(*dt))
                .collect(),
            NodeKind::Project { symbols } => symbols
                .iter()
                .enumerate()
                .map(|(i, s)| match (&s.expression, &s.alias) {
                    (fedq_lang::Expression::Element(e), None) => e.clone(),
                    (expr, _) => {
                        let e = ElementSymbol::new(s.output_name(i));
                        match expr.data_type() {
                            Some(dt) => e.with_type(dt),
                            None => e,
                        }
                    }
                })
                .collect(),
            NodeKind::Join { .. } => self
                .children(id)
                .iter()
                .flat_map(|&c| self.output_elements(c))
                .collect(),
            _ => self
                .child(id)
                .map(|c| self.output_elements(c))
                .unwrap_or_default(),
        }
    }

    /// Indented rendering, one node per line.
    pub fn explain(&self) -> String {
        let mut out = String::new();
        if let Some(root) = self.root {
            self.explain_node(root, 0, &mut out);
        }
        out
    }

    fn explain_node(&self, id: PlanNodeId, depth: usize, out: &mut String) {
        use std::fmt::Write;
        let _ = write!(out, "{}{}", "  ".repeat(depth), self.kind(id).name());
        match self.kind(id) {
            NodeKind::Project { symbols } => {
                let cols: Vec<String> = symbols
                    .iter()
                    .map(|s| match &s.alias {
                        Some(a) => format!("{} AS {}", s.expression, a),
                        None => s.expression.to_string(),
                    })
                    .collect();
                let _ = write!(out, " [{}]", cols.join(", "));
            }
            NodeKind::Select { criteria } => {
                let _ = write!(out, " [{}]", criteria);
            }
            NodeKind::Join {
                join_type,
                criteria,
            } => {
                let _ = write!(out, " {}", join_type.sql());
                if !criteria.is_empty() {
                    let parts: Vec<String> = criteria.iter().map(|c| c.to_string()).collect();
                    let _ = write!(out, " [{}]", parts.join(" AND "));
                }
            }
            NodeKind::Source { group, .. } => {
                let _ = write!(out, " {}", group);
            }
            NodeKind::Access { model } => {
                let _ = write!(out, " {}", model);
            }
            NodeKind::Limit { offset, row_limit } => {
                let _ = write!(out, " {}, {}", offset, row_limit);
            }
            NodeKind::DupRemove | NodeKind::Null => {}
        }
        out.push('\n');
        if matches!(self.kind(id), NodeKind::Null) {
            return;
        }
        for &c in self.children(id) {
            self.explain_node(c, depth + 1, out);
        }
    }
}

impl fmt::Display for PlanTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.explain())
    }
}
