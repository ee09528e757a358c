//! Drives a node tree in batches.

use std::task::Poll;

use fedq_core::types::Row;
use fedq_planner::PhysicalProgram;

use crate::error::Result;
use crate::node::{build, NodeContext, ProcessingNode};

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProcessorBatch {
    pub rows: Vec<Row>,
    /// No rows follow this batch.
    pub last: bool,
}

pub struct QueryProcessor {
    root: Box<dyn ProcessingNode>,
    batch_size: usize,
    opened: bool,
    done: bool,
}

impl QueryProcessor {
    pub fn new(program: &PhysicalProgram, batch_size: usize) -> Self {
        Self {
            root: build(&program.root),
            batch_size: batch_size.max(1),
            opened: false,
            done: false,
        }
    }

    /// Open the node tree. On failure the nodes that did open are closed
    /// again and the processor can be opened later.
    pub fn open(&mut self, ctx: &NodeContext<'_>) -> Result<()> {
        if let Err(e) = self.root.open(ctx) {
            self.root.close();
            return Err(e);
        }
        self.opened = true;
        self.done = false;
        Ok(())
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Pull up to one batch of rows. When a source is not ready after some
    /// rows were produced, the partial batch is returned; with no rows the
    /// call is `Pending`.
    pub fn process_batch(&mut self, ctx: &NodeContext<'_>) -> Poll<Result<ProcessorBatch>> {
        if self.done || !self.opened {
            return Poll::Ready(Ok(ProcessorBatch {
                rows: Vec::new(),
                last: true,
            }));
        }
        let mut rows = Vec::with_capacity(self.batch_size);
        while rows.len() < self.batch_size {
            match self.root.next(ctx) {
                Poll::Pending if rows.is_empty() => return Poll::Pending,
                Poll::Pending => break,
                Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                Poll::Ready(Ok(Some(row))) => rows.push(row),
                Poll::Ready(Ok(None)) => {
                    self.done = true;
                    return Poll::Ready(Ok(ProcessorBatch { rows, last: true }));
                }
            }
        }
        Poll::Ready(Ok(ProcessorBatch { rows, last: false }))
    }

    pub fn close(&mut self) {
        if self.opened {
            self.root.close();
            self.opened = false;
        }
    }
}
