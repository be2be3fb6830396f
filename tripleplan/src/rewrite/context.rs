// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Rewrite context
//!
//! Owns mutable access to the graph during rewriting. Every mutation helper
//! changes the graph and the start-node index in the same step, so rules
//! never touch either directly.

use crate::compile::IndexScanFactory;
use crate::error::{CompileError, CompileResult};
use crate::plan::{Edge, IndexScan, Input, Operator, OperatorGraph, OperatorId, OperatorKind};
use crate::rewrite::index::StartNodeIndex;

pub struct RewriteContext<'a> {
    graph: &'a mut OperatorGraph,
    index: StartNodeIndex,
    factory: Option<&'a dyn IndexScanFactory>,
}

impl<'a> RewriteContext<'a> {
    pub fn new(graph: &'a mut OperatorGraph, factory: Option<&'a dyn IndexScanFactory>) -> Self {
        let index = StartNodeIndex::build(graph);
        Self {
            graph,
            index,
            factory,
        }
    }

    pub fn graph(&self) -> &OperatorGraph {
        self.graph
    }

    pub fn index(&self) -> &StartNodeIndex {
        &self.index
    }

    pub fn operator(&self, id: OperatorId) -> CompileResult<&Operator> {
        self.graph.operator(id)
    }

    /// Ask the scan factory whether a scan is known to be empty
    pub fn probe_empty(&self, scan: &IndexScan) -> bool {
        self.factory.map(|f| f.probe_empty(scan)).unwrap_or(false)
    }

    pub fn add(&mut self, operator: Operator) -> OperatorId {
        let kind = operator.kind();
        let id = self.graph.add(operator);
        self.index.insert(kind, id);
        id
    }

    pub fn connect(&mut self, from: OperatorId, to: OperatorId, operand: usize) -> CompileResult<()> {
        self.graph.connect(from, to, operand)
    }

    pub fn connect_edge(
        &mut self,
        from: OperatorId,
        to: OperatorId,
        operand: usize,
        feedback: bool,
    ) -> CompileResult<()> {
        self.graph.connect_edge(from, to, operand, feedback)
    }

    pub fn disconnect(&mut self, from: OperatorId, to: OperatorId) -> CompileResult<()> {
        self.graph.disconnect(from, to)
    }

    /// Remove a single operator and its edges
    pub fn remove(&mut self, id: OperatorId) -> CompileResult<()> {
        let operator = self.graph.remove(id)?;
        self.index.remove(operator.kind(), id);
        Ok(())
    }

    /// Swap the operator stored at `id`, keeping its edges
    pub fn replace_operator(&mut self, id: OperatorId, operator: Operator) -> CompileResult<()> {
        let new_kind = operator.kind();
        let slot = self.graph.operator_mut(id)?;
        let old_kind = slot.kind();
        *slot = operator;
        self.index.remove(old_kind, id);
        self.index.insert(new_kind, id);
        Ok(())
    }

    /// Re-point every outgoing edge of `from` to originate at `to` instead
    pub fn redirect_outputs(&mut self, from: OperatorId, to: OperatorId) -> CompileResult<()> {
        let edges: Vec<Edge> = self.graph.succeeding(from).to_vec();
        for edge in edges {
            self.graph.disconnect(from, edge.target)?;
            self.graph
                .connect_edge(to, edge.target, edge.operand, edge.feedback)?;
        }
        Ok(())
    }

    /// Insert `operator` on the edge `input -> consumer`, keeping operand and flag
    pub fn insert_between(
        &mut self,
        input: Input,
        consumer: OperatorId,
        operator: Operator,
    ) -> CompileResult<OperatorId> {
        let id = self.add(operator);
        self.graph.disconnect(input.source, consumer)?;
        self.graph.connect(input.source, id, 0)?;
        self.graph
            .connect_edge(id, consumer, input.operand, input.feedback)?;
        Ok(id)
    }

    /// Remove `id` together with everything that no longer contributes:
    /// consumers left without a required operand and producers left without
    /// any consumer. Root and Result operators are never removed.
    pub fn remove_cascade(&mut self, id: OperatorId) -> CompileResult<usize> {
        let mut pending = vec![id];
        let mut removed = 0;
        while let Some(current) = pending.pop() {
            if !self.graph.contains(current) {
                continue;
            }
            let kind = self.graph.kind(current);
            if matches!(kind, Some(OperatorKind::Root) | Some(OperatorKind::Result)) {
                continue;
            }
            let producers: Vec<OperatorId> = self.graph.preceding(current).to_vec();
            let consumers: Vec<Edge> = self.graph.succeeding(current).to_vec();
            self.remove(current)?;
            removed += 1;

            for edge in consumers {
                if self.is_starved(edge.target, edge.operand)? {
                    pending.push(edge.target);
                }
            }
            for producer in producers {
                if self.graph.contains(producer) && self.graph.succeeding(producer).is_empty() {
                    pending.push(producer);
                }
            }
        }
        log::trace!("cascade from {} removed {} operators", id, removed);
        Ok(removed)
    }

    /// Whether `id` lost a required operand (or every input)
    fn is_starved(&self, id: OperatorId, operand: usize) -> CompileResult<bool> {
        if !self.graph.contains(id) {
            return Ok(false);
        }
        let operator = self.graph.operator(id)?;
        if matches!(operator, Operator::Root | Operator::Result(_)) {
            return Ok(false);
        }
        let inputs = self.graph.inputs(id);
        if inputs.is_empty() {
            return Ok(true);
        }
        let group_empty = !inputs.iter().any(|i| i.operand == operand);
        Ok(group_empty && operator.requires_operand(operand))
    }

    /// Recompute variable sets after a structural change
    pub fn refresh_variables(&mut self) -> CompileResult<()> {
        self.graph.update_variables()
    }

    /// Check graph edges and index consistency
    pub fn verify(&self) -> CompileResult<()> {
        self.graph.verify_edges()?;
        self.index.verify(self.graph)
    }

    pub(crate) fn fail<T>(&self, rule: &str, message: impl Into<String>) -> CompileResult<T> {
        Err(CompileError::internal(format!(
            "{}: {}",
            rule,
            message.into()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::ResultForm;

    #[test]
    fn test_cascade_removes_starved_join_and_orphans() {
        let mut graph = OperatorGraph::new();
        let root = graph.root();
        let a = graph.add(Operator::EmptyIndexScan { graph: None });
        let b = graph.add(Operator::EmptyIndexScan { graph: None });
        let c = graph.add(Operator::Distinct);
        let join = graph.add(Operator::Join);
        let result = graph.add(Operator::Result(ResultForm::Select(vec![])));
        graph.connect(root, a, 0).unwrap();
        graph.connect(root, b, 0).unwrap();
        graph.connect(b, c, 0).unwrap();
        graph.connect(a, join, 0).unwrap();
        graph.connect(c, join, 1).unwrap();
        graph.connect(join, result, 0).unwrap();

        let mut ctx = RewriteContext::new(&mut graph, None);
        let removed = ctx.remove_cascade(a).unwrap();
        assert_eq!(removed, 4);
        ctx.verify().unwrap();
        assert!(ctx.graph().contains(result));
        assert!(ctx.graph().contains(root));
        assert_eq!(ctx.index().candidates(OperatorKind::Join), vec![]);
    }

    #[test]
    fn test_replace_operator_moves_index_entry() {
        let mut graph = OperatorGraph::new();
        let d = graph.add(Operator::Distinct);
        let mut ctx = RewriteContext::new(&mut graph, None);
        ctx.replace_operator(d, Operator::IndexDistinct).unwrap();
        assert!(ctx.index().candidates(OperatorKind::Distinct).is_empty());
        assert_eq!(ctx.index().candidates(OperatorKind::IndexDistinct), vec![d]);
        ctx.verify().unwrap();
    }
}
