// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Operator graph
//!
//! Operators live in an arena addressed by [`OperatorId`]. Edges point from a
//! producer to its consumer and carry the consumer's operand index. Every
//! structural change goes through [`OperatorGraph::connect`],
//! [`OperatorGraph::disconnect`] or [`OperatorGraph::remove`], which update the
//! succeeding list of the producer and the preceding list of the consumer
//! together.
//!
//! Loop-closing edges are flagged as feedback edges. They are ignored by cycle
//! detection and by topological propagation, so only an unflagged cycle is a
//! structural fault.

use petgraph::algo::{tarjan_scc, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use crate::error::{CompileError, CompileResult};
use crate::plan::operators::{Operator, OperatorKind};
use crate::types::VarSet;

/// Stable identifier of an operator within one graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OperatorId(usize);

impl OperatorId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for OperatorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Outgoing edge: the consumer and the operand index it is read on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    pub target: OperatorId,
    pub operand: usize,
    pub feedback: bool,
}

/// Incoming edge seen from the consumer side
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Input {
    pub source: OperatorId,
    pub operand: usize,
    pub feedback: bool,
}

/// Arena slot
#[derive(Debug, Clone, PartialEq)]
pub struct OperatorNode {
    pub operator: Operator,
    preceding: Vec<OperatorId>,
    succeeding: Vec<Edge>,
    /// Variables bound on every path reaching this operator
    pub intersection: VarSet,
    /// Variables bound on at least one path reaching this operator
    pub union: VarSet,
}

impl OperatorNode {
    fn new(operator: Operator) -> Self {
        Self {
            operator,
            preceding: Vec::new(),
            succeeding: Vec::new(),
            intersection: VarSet::new(),
            union: VarSet::new(),
        }
    }
}

/// Dataflow graph of plan operators rooted at a single [`Operator::Root`]
#[derive(Debug, Clone, PartialEq)]
pub struct OperatorGraph {
    nodes: Vec<Option<OperatorNode>>,
    root: OperatorId,
}

impl Default for OperatorGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl OperatorGraph {
    /// Create a graph holding only the root operator
    pub fn new() -> Self {
        Self {
            nodes: vec![Some(OperatorNode::new(Operator::Root))],
            root: OperatorId(0),
        }
    }

    pub fn root(&self) -> OperatorId {
        self.root
    }

    /// Add a disconnected operator
    pub fn add(&mut self, operator: Operator) -> OperatorId {
        let id = OperatorId(self.nodes.len());
        self.nodes.push(Some(OperatorNode::new(operator)));
        id
    }

    pub fn contains(&self, id: OperatorId) -> bool {
        matches!(self.nodes.get(id.0), Some(Some(_)))
    }

    pub fn node(&self, id: OperatorId) -> CompileResult<&OperatorNode> {
        self.nodes
            .get(id.0)
            .and_then(Option::as_ref)
            .ok_or_else(|| CompileError::internal(format!("unknown operator {}", id)))
    }

    fn node_mut(&mut self, id: OperatorId) -> CompileResult<&mut OperatorNode> {
        self.nodes
            .get_mut(id.0)
            .and_then(Option::as_mut)
            .ok_or_else(|| CompileError::internal(format!("unknown operator {}", id)))
    }

    pub fn operator(&self, id: OperatorId) -> CompileResult<&Operator> {
        Ok(&self.node(id)?.operator)
    }

    pub fn operator_mut(&mut self, id: OperatorId) -> CompileResult<&mut Operator> {
        Ok(&mut self.node_mut(id)?.operator)
    }

    /// Kind of a live operator; `None` for a removed id
    pub fn kind(&self, id: OperatorId) -> Option<OperatorKind> {
        self.node(id).ok().map(|n| n.operator.kind())
    }

    /// Live operator ids in creation order
    pub fn ids(&self) -> impl Iterator<Item = OperatorId> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.is_some())
            .map(|(i, _)| OperatorId(i))
    }

    pub fn len(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Live operators of the given kind
    pub fn find(&self, kind: OperatorKind) -> Vec<OperatorId> {
        self.ids().filter(|id| self.kind(*id) == Some(kind)).collect()
    }

    pub fn count(&self, kind: OperatorKind) -> usize {
        self.find(kind).len()
    }

    pub fn preceding(&self, id: OperatorId) -> &[OperatorId] {
        self.node(id).map(|n| n.preceding.as_slice()).unwrap_or(&[])
    }

    pub fn succeeding(&self, id: OperatorId) -> &[Edge] {
        self.node(id).map(|n| n.succeeding.as_slice()).unwrap_or(&[])
    }

    /// Incoming edges of `id` ordered by operand index
    pub fn inputs(&self, id: OperatorId) -> Vec<Input> {
        let mut inputs = Vec::new();
        let mut seen = Vec::new();
        for pred in self.preceding(id) {
            if seen.contains(pred) {
                continue;
            }
            seen.push(*pred);
            for edge in self.succeeding(*pred) {
                if edge.target == id {
                    inputs.push(Input {
                        source: *pred,
                        operand: edge.operand,
                        feedback: edge.feedback,
                    });
                }
            }
        }
        inputs.sort_by_key(|i| i.operand);
        inputs
    }

    /// Inputs of `id` grouped by operand index
    pub fn operand_groups(&self, id: OperatorId) -> BTreeMap<usize, Vec<Input>> {
        let mut groups: BTreeMap<usize, Vec<Input>> = BTreeMap::new();
        for input in self.inputs(id) {
            groups.entry(input.operand).or_default().push(input);
        }
        groups
    }

    /// Producers feeding the given operand of `id`
    pub fn operand(&self, id: OperatorId, operand: usize) -> Vec<OperatorId> {
        self.inputs(id)
            .into_iter()
            .filter(|i| i.operand == operand)
            .map(|i| i.source)
            .collect()
    }

    /// Connect `from` to operand `operand` of `to`
    pub fn connect(&mut self, from: OperatorId, to: OperatorId, operand: usize) -> CompileResult<()> {
        self.connect_edge(from, to, operand, false)
    }

    /// Connect a loop-closing edge
    pub fn connect_feedback(
        &mut self,
        from: OperatorId,
        to: OperatorId,
        operand: usize,
    ) -> CompileResult<()> {
        self.connect_edge(from, to, operand, true)
    }

    pub fn connect_edge(
        &mut self,
        from: OperatorId,
        to: OperatorId,
        operand: usize,
        feedback: bool,
    ) -> CompileResult<()> {
        if !self.contains(to) {
            return Err(CompileError::internal(format!(
                "cannot connect {} to removed operator {}",
                from, to
            )));
        }
        let edge = Edge {
            target: to,
            operand,
            feedback,
        };
        let source = self.node_mut(from)?;
        if source.succeeding.contains(&edge) {
            return Ok(());
        }
        source.succeeding.push(edge);
        self.node_mut(to)?.preceding.push(from);
        Ok(())
    }

    /// Remove every edge from `from` to `to`
    pub fn disconnect(&mut self, from: OperatorId, to: OperatorId) -> CompileResult<()> {
        self.node_mut(from)?.succeeding.retain(|e| e.target != to);
        self.node_mut(to)?.preceding.retain(|p| *p != from);
        Ok(())
    }

    /// Disconnect an operator from all neighbours and free its slot
    pub fn remove(&mut self, id: OperatorId) -> CompileResult<Operator> {
        if id == self.root {
            return Err(CompileError::internal("the root operator cannot be removed"));
        }
        let node = self.node(id)?;
        let preds = node.preceding.clone();
        let succs: Vec<OperatorId> = node.succeeding.iter().map(|e| e.target).collect();
        for pred in preds {
            self.disconnect(pred, id)?;
        }
        for succ in succs {
            self.disconnect(id, succ)?;
        }
        self.nodes[id.0]
            .take()
            .map(|n| n.operator)
            .ok_or_else(|| CompileError::internal(format!("unknown operator {}", id)))
    }

    /// Rebuild preceding lists from the succeeding lists
    pub fn set_parents(&mut self) {
        let mut parents: HashMap<usize, Vec<OperatorId>> = HashMap::new();
        for (index, slot) in self.nodes.iter().enumerate() {
            if let Some(node) = slot {
                for edge in &node.succeeding {
                    parents.entry(edge.target.0).or_default().push(OperatorId(index));
                }
            }
        }
        for (index, slot) in self.nodes.iter_mut().enumerate() {
            if let Some(node) = slot {
                node.preceding = parents.remove(&index).unwrap_or_default();
            }
        }
    }

    /// Push a succeeding edge without touching the consumer's back-references;
    /// [`OperatorGraph::set_parents`] must be called before the graph is used
    pub fn push_succeeding(&mut self, from: OperatorId, edge: Edge) -> CompileResult<()> {
        self.node_mut(from)?.succeeding.push(edge);
        Ok(())
    }

    /// Check that every edge is recorded on both sides
    pub fn verify_edges(&self) -> CompileResult<()> {
        for id in self.ids() {
            for edge in self.succeeding(id) {
                let count_out = self
                    .succeeding(id)
                    .iter()
                    .filter(|e| e.target == edge.target)
                    .count();
                let count_in = self
                    .preceding(edge.target)
                    .iter()
                    .filter(|p| **p == id)
                    .count();
                if !self.contains(edge.target) || count_out != count_in {
                    return Err(CompileError::internal(format!(
                        "one-sided edge {} -> {}",
                        id, edge.target
                    )));
                }
            }
            for pred in self.preceding(id) {
                if !self.succeeding(*pred).iter().any(|e| e.target == id) {
                    return Err(CompileError::internal(format!(
                        "one-sided edge {} -> {}",
                        pred, id
                    )));
                }
            }
        }
        Ok(())
    }

    /// Topological order over unflagged edges, producers first
    pub fn topological_order(&self) -> CompileResult<Vec<OperatorId>> {
        let mut dag: DiGraph<OperatorId, ()> = DiGraph::new();
        let mut indices: HashMap<OperatorId, NodeIndex> = HashMap::new();
        for id in self.ids() {
            indices.insert(id, dag.add_node(id));
        }
        for id in self.ids() {
            for edge in self.succeeding(id) {
                if edge.feedback {
                    continue;
                }
                if let (Some(from), Some(to)) = (indices.get(&id), indices.get(&edge.target)) {
                    dag.add_edge(*from, *to, ());
                }
            }
        }
        toposort(&dag, None)
            .map(|order| order.into_iter().map(|index| dag[index]).collect())
            .map_err(|cycle| {
                CompileError::internal(format!(
                    "operator graph contains a cycle through {}",
                    dag[cycle.node_id()]
                ))
            })
    }

    /// Report a cycle along unflagged edges as a structural fault
    pub fn detect_cycles(&self) -> CompileResult<()> {
        self.topological_order().map(|_| ())
    }

    /// Operators that sit on a loop closed by a feedback edge
    pub fn loop_members(&self) -> BTreeSet<OperatorId> {
        let mut all: DiGraph<OperatorId, ()> = DiGraph::new();
        let mut indices: HashMap<OperatorId, NodeIndex> = HashMap::new();
        for id in self.ids() {
            indices.insert(id, all.add_node(id));
        }
        for id in self.ids() {
            for edge in self.succeeding(id) {
                if let (Some(from), Some(to)) = (indices.get(&id), indices.get(&edge.target)) {
                    all.add_edge(*from, *to, ());
                }
            }
        }
        let mut members = BTreeSet::new();
        for component in tarjan_scc(&all) {
            let looped = component.len() > 1
                || component
                    .first()
                    .is_some_and(|index| all.contains_edge(*index, *index));
            if looped {
                members.extend(component.into_iter().map(|index| all[index]));
            }
        }
        members
    }

    /// Operators reachable from the root along succeeding edges
    pub fn reachable(&self) -> Vec<OperatorId> {
        let mut visited = vec![false; self.nodes.len()];
        let mut stack = vec![self.root];
        let mut out = Vec::new();
        while let Some(id) = stack.pop() {
            if visited[id.0] || !self.contains(id) {
                continue;
            }
            visited[id.0] = true;
            out.push(id);
            for edge in self.succeeding(id).iter().rev() {
                stack.push(edge.target);
            }
        }
        out
    }

    pub fn results(&self) -> Vec<OperatorId> {
        self.find(OperatorKind::Result)
    }

    pub(crate) fn set_variables(
        &mut self,
        id: OperatorId,
        intersection: VarSet,
        union: VarSet,
    ) -> CompileResult<()> {
        let node = self.node_mut(id)?;
        node.intersection = intersection;
        node.union = union;
        Ok(())
    }
}
