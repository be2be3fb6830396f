// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Start-node index: live operators by kind
//!
//! A materialized view of the graph. It is only ever changed together with
//! the graph, through [`crate::rewrite::RewriteContext`].

use std::collections::{BTreeSet, HashMap};

use crate::error::{CompileError, CompileResult};
use crate::plan::{OperatorGraph, OperatorId, OperatorKind};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StartNodeIndex {
    by_kind: HashMap<OperatorKind, BTreeSet<OperatorId>>,
}

impl StartNodeIndex {
    /// Index every live operator of `graph`
    pub fn build(graph: &OperatorGraph) -> Self {
        let mut index = Self::default();
        for id in graph.ids() {
            if let Some(kind) = graph.kind(id) {
                index.insert(kind, id);
            }
        }
        index
    }

    pub fn insert(&mut self, kind: OperatorKind, id: OperatorId) {
        self.by_kind.entry(kind).or_default().insert(id);
    }

    pub fn remove(&mut self, kind: OperatorKind, id: OperatorId) {
        if let Some(ids) = self.by_kind.get_mut(&kind) {
            ids.remove(&id);
            if ids.is_empty() {
                self.by_kind.remove(&kind);
            }
        }
    }

    /// Snapshot of the operators of one kind, in id order
    pub fn candidates(&self, kind: OperatorKind) -> Vec<OperatorId> {
        self.by_kind
            .get(&kind)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.by_kind.values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check the index against a fresh rebuild from the graph
    pub fn verify(&self, graph: &OperatorGraph) -> CompileResult<()> {
        let expected = Self::build(graph);
        if *self == expected {
            return Ok(());
        }
        for (kind, ids) in &expected.by_kind {
            let actual = self.by_kind.get(kind).cloned().unwrap_or_default();
            if actual != *ids {
                return Err(CompileError::internal(format!(
                    "start-node index out of date for {:?}: indexed {:?}, live {:?}",
                    kind, actual, ids
                )));
            }
        }
        Err(CompileError::internal(
            "start-node index holds operators that are no longer live",
        ))
    }
}
