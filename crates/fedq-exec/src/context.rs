//! Per-request values handed explicitly to planning and execution.

use std::collections::HashMap;

use fedq_core::context::WorkContext;
use fedq_core::id::RequestId;
use fedq_core::types::Scalar;
use fedq_lang::{ElementSymbol, Reference};

/// Carried through one query's processing.
#[derive(Debug, Clone)]
pub struct CommandContext {
    pub work: WorkContext,
    pub request_id: RequestId,
    /// Rows pulled through the plan per processing step.
    pub batch_size: usize,
}

impl CommandContext {
    pub fn new(work: WorkContext, request_id: RequestId, batch_size: usize) -> Self {
        Self {
            work,
            request_id,
            batch_size: batch_size.max(1),
        }
    }

    /// Context for one source request made on behalf of this command.
    pub fn execution_context(&self, model: &str, part: usize) -> ExecutionContext {
        ExecutionContext {
            work: self.work.clone(),
            request_id: self.request_id,
            model: model.to_string(),
            part_identifier: part,
        }
    }
}

/// What a connector learns about the request it serves.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub work: WorkContext,
    pub request_id: RequestId,
    pub model: String,
    /// Which access node of the plan issued the request.
    pub part_identifier: usize,
}

impl ExecutionContext {
    pub fn vdb_name(&self) -> &str {
        &self.work.vdb_name
    }

    pub fn vdb_version(&self) -> u32 {
        self.work.vdb_version
    }
}

/// Values for the parameter references of a command. Positional `?`
/// markers bind by index; keyed references bind by element.
#[derive(Debug, Clone, Default)]
pub struct Bindings {
    positional: Vec<Scalar>,
    named: HashMap<ElementSymbol, Scalar>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn positional(values: Vec<Scalar>) -> Self {
        Self {
            positional: values,
            named: HashMap::new(),
        }
    }

    pub fn bind(mut self, element: ElementSymbol, value: Scalar) -> Self {
        self.named.insert(element, value);
        self
    }

    pub fn lookup(&self, reference: &Reference) -> Option<&Scalar> {
        match &reference.element {
            Some(e) => self.named.get(e),
            None => self.positional.get(reference.index),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.named.is_empty()
    }
}
