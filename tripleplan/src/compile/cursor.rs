// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Attachment cursor
//!
//! Plans are assembled from the Result downwards. The cursor names the
//! operator and operand index the next compiled construct must feed.

use crate::error::CompileResult;
use crate::plan::{Operator, OperatorGraph, OperatorId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    pub target: OperatorId,
    pub operand: usize,
}

impl Cursor {
    pub fn new(target: OperatorId, operand: usize) -> Self {
        Self { target, operand }
    }

    /// Add `operator` feeding this cursor and return the cursor of its input
    pub fn attach(self, graph: &mut OperatorGraph, operator: Operator) -> CompileResult<Cursor> {
        let id = graph.add(operator);
        graph.connect(id, self.target, self.operand)?;
        Ok(Cursor::new(id, 0))
    }

    /// Add a source operator fed by the root and feeding this cursor
    pub fn attach_source(
        self,
        graph: &mut OperatorGraph,
        operator: Operator,
    ) -> CompileResult<OperatorId> {
        let id = graph.add(operator);
        let root = graph.root();
        graph.connect(root, id, 0)?;
        graph.connect(id, self.target, self.operand)?;
        Ok(id)
    }

    /// Connect an already built producer to this cursor
    pub fn feed(self, graph: &mut OperatorGraph, producer: OperatorId) -> CompileResult<()> {
        graph.connect(producer, self.target, self.operand)
    }

    /// Cursor on another operand of the same target
    pub fn at(self, operand: usize) -> Cursor {
        Cursor::new(self.target, operand)
    }
}
