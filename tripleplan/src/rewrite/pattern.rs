// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Structural matching helpers for rewrite rules
//!
//! A rule's `check` walks outward from a start operator with these
//! combinators and records the operators it needs under symbolic names.

use std::collections::BTreeMap;

use crate::plan::{Input, Operator, OperatorGraph, OperatorId, OperatorKind};

/// Direction of a structural walk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Towards the producers
    Up,
    /// Towards the consumers
    Down,
}

/// Operators captured by a successful match
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Matched {
    pub root: OperatorId,
    bindings: BTreeMap<&'static str, Vec<OperatorId>>,
}

impl Matched {
    pub fn new(root: OperatorId) -> Self {
        Self {
            root,
            bindings: BTreeMap::new(),
        }
    }

    pub fn bind(mut self, name: &'static str, id: OperatorId) -> Self {
        self.bindings.entry(name).or_default().push(id);
        self
    }

    pub fn bind_all(mut self, name: &'static str, ids: impl IntoIterator<Item = OperatorId>) -> Self {
        self.bindings.entry(name).or_default().extend(ids);
        self
    }

    /// First operator bound under `name`
    pub fn get(&self, name: &str) -> Option<OperatorId> {
        self.bindings.get(name).and_then(|ids| ids.first().copied())
    }

    pub fn all(&self, name: &str) -> &[OperatorId] {
        self.bindings.get(name).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// `id` is live and of the given kind
pub fn match_one(graph: &OperatorGraph, id: OperatorId, kind: OperatorKind) -> bool {
    graph.kind(id) == Some(kind)
}

/// The only input of `id`, if it has exactly one
pub fn single_input(graph: &OperatorGraph, id: OperatorId) -> Option<Input> {
    match graph.inputs(id).as_slice() {
        [input] => Some(*input),
        _ => None,
    }
}

/// The only consumer of `id`, if it has exactly one outgoing edge
pub fn single_successor(graph: &OperatorGraph, id: OperatorId) -> Option<OperatorId> {
    match graph.succeeding(id) {
        [edge] => Some(edge.target),
        _ => None,
    }
}

/// Number of edges on one side of `id` equals `count`
pub fn match_cardinality(graph: &OperatorGraph, id: OperatorId, direction: Direction, count: usize) -> bool {
    match direction {
        Direction::Up => graph.inputs(id).len() == count,
        Direction::Down => graph.succeeding(id).len() == count,
    }
}

/// Follow single edges from `start` while `accept` holds for the next
/// operator, returning the first operator that is not accepted.
///
/// The walk stops (returning `None`) at a fork, a dead end or an operator
/// already visited.
pub fn match_chain_while<F>(
    graph: &OperatorGraph,
    start: OperatorId,
    direction: Direction,
    mut accept: F,
) -> Option<(OperatorId, Vec<OperatorId>)>
where
    F: FnMut(&Operator) -> bool,
{
    let mut skipped = Vec::new();
    let mut current = start;
    loop {
        let next = match direction {
            Direction::Up => single_input(graph, current).map(|i| i.source)?,
            Direction::Down => single_successor(graph, current)?,
        };
        if next == start || skipped.contains(&next) {
            return None;
        }
        let operator = graph.operator(next).ok()?;
        if !accept(operator) {
            return Some((next, skipped));
        }
        skipped.push(next);
        current = next;
    }
}
