//! Physical program: the processing tree the executor instantiates.
//!
//! Every node lists the elements of the rows it produces, positionally, so
//! the executor can bind expressions to row offsets without metadata.

use std::fmt::Write as _;

use fedq_core::hash::{hash_serde, Hash256};
use fedq_core::schema::Field;
use fedq_lang::{Criteria, ElementSymbol, ExpressionSymbol, JoinType, Query, Reference};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PhysicalNode {
    /// Rows produced by the source of `model` for `command`.
    Access {
        model: String,
        command: Query,
        output: Vec<ElementSymbol>,
    },
    Select {
        criteria: Criteria,
        input: Box<PhysicalNode>,
        output: Vec<ElementSymbol>,
    },
    /// Without an input, projects a single row of constants.
    Project {
        symbols: Vec<ExpressionSymbol>,
        input: Option<Box<PhysicalNode>>,
        output: Vec<ElementSymbol>,
    },
    Join {
        join_type: JoinType,
        criteria: Vec<Criteria>,
        left: Box<PhysicalNode>,
        right: Box<PhysicalNode>,
        output: Vec<ElementSymbol>,
    },
    DupRemove {
        input: Box<PhysicalNode>,
        output: Vec<ElementSymbol>,
    },
    Limit {
        offset: u64,
        row_limit: u64,
        input: Box<PhysicalNode>,
        output: Vec<ElementSymbol>,
    },
    Null {
        output: Vec<ElementSymbol>,
    },
}

impl PhysicalNode {
    pub fn name(&self) -> &'static str {
        match self {
            PhysicalNode::Access { .. } => "AccessNode",
            PhysicalNode::Select { .. } => "SelectNode",
            PhysicalNode::Project { .. } => "ProjectNode",
            PhysicalNode::Join { .. } => "JoinNode",
            PhysicalNode::DupRemove { .. } => "DupRemoveNode",
            PhysicalNode::Limit { .. } => "LimitNode",
            PhysicalNode::Null { .. } => "NullNode",
        }
    }

    pub fn output(&self) -> &[ElementSymbol] {
        match self {
            PhysicalNode::Access { output, .. }
            | PhysicalNode::Select { output, .. }
            | PhysicalNode::Project { output, .. }
            | PhysicalNode::Join { output, .. }
            | PhysicalNode::DupRemove { output, .. }
            | PhysicalNode::Limit { output, .. }
            | PhysicalNode::Null { output } => output,
        }
    }

    /// Same rows under different element names (a view's columns).
    pub fn with_output(mut self, elements: Vec<ElementSymbol>) -> Self {
        match &mut self {
            PhysicalNode::Access { output, .. }
            | PhysicalNode::Select { output, .. }
            | PhysicalNode::Project { output, .. }
            | PhysicalNode::Join { output, .. }
            | PhysicalNode::DupRemove { output, .. }
            | PhysicalNode::Limit { output, .. }
            | PhysicalNode::Null { output } => *output = elements,
        }
        self
    }

    pub fn children(&self) -> Vec<&PhysicalNode> {
        match self {
            PhysicalNode::Select { input, .. }
            | PhysicalNode::DupRemove { input, .. }
            | PhysicalNode::Limit { input, .. } => vec![input],
            PhysicalNode::Project { input, .. } => input.iter().map(|b| b.as_ref()).collect(),
            PhysicalNode::Join { left, right, .. } => vec![left, right],
            PhysicalNode::Access { .. } | PhysicalNode::Null { .. } => Vec::new(),
        }
    }

    /// Commands sent to sources, left to right.
    pub fn access_commands(&self) -> Vec<(&str, &Query)> {
        let mut out = Vec::new();
        self.collect_access(&mut out);
        out
    }

    fn collect_access<'a>(&'a self, out: &mut Vec<(&'a str, &'a Query)>) {
        if let PhysicalNode::Access { model, command, .. } = self {
            out.push((model, command));
        }
        for c in self.children() {
            c.collect_access(out);
        }
    }

    fn explain_into(&self, depth: usize, out: &mut String) {
        let _ = write!(out, "{}{}", "  ".repeat(depth), self.name());
        match self {
            PhysicalNode::Access { model, command, .. } => {
                let _ = write!(out, " {}: {}", model, command);
            }
            PhysicalNode::Select { criteria, .. } => {
                let _ = write!(out, " [{}]", criteria);
            }
            PhysicalNode::Join {
                join_type,
                criteria,
                ..
            } => {
                let _ = write!(out, " {}", join_type.sql());
                if !criteria.is_empty() {
                    let parts: Vec<String> = criteria.iter().map(|c| c.to_string()).collect();
                    let _ = write!(out, " [{}]", parts.join(" AND "));
                }
            }
            PhysicalNode::Limit {
                offset, row_limit, ..
            } => {
                let _ = write!(out, " {}, {}", offset, row_limit);
            }
            _ => {}
        }
        let names: Vec<String> = self.output().iter().map(|e| e.name()).collect();
        let _ = writeln!(out, " -> [{}]", names.join(", "));
        for c in self.children() {
            c.explain_into(depth + 1, out);
        }
    }
}

/// A planned query, ready to execute.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhysicalProgram {
    pub root: PhysicalNode,
    /// Result set columns.
    pub fields: Vec<Field>,
    /// Parameter references the caller must bind before execution.
    pub references: Vec<Reference>,
}

impl PhysicalProgram {
    /// Stable digest of the processing tree and its pushed commands.
    pub fn fingerprint(&self) -> fedq_core::error::Result<Hash256> {
        hash_serde(&self.root)
    }

    pub fn explain(&self) -> String {
        let mut out = String::new();
        self.root.explain_into(0, &mut out);
        out
    }
}
