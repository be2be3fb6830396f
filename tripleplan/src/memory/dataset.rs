// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Translator collaborators backed by a [`MemoryStore`]

use std::cell::Cell;
use std::collections::BTreeSet;

use crate::ast::{DatasetClause, Expression};
use crate::compile::{Dataset, DatasetDescription, Evaluator, IndexScanFactory};
use crate::error::{CompileError, CompileResult};
use crate::memory::store::MemoryStore;
use crate::plan::{FilterBinding, IndexScan, Operator, ScanSource};
use crate::types::{Item, Literal, TriplePattern, VarSet};

/// Named dataset over the graphs of a memory store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryDataset {
    name: String,
    description: DatasetDescription,
}

impl MemoryDataset {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: DatasetDescription::default(),
        }
    }

    pub fn with_description(name: impl Into<String>, description: DatasetDescription) -> Self {
        Self {
            name: name.into(),
            description,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &DatasetDescription {
        &self.description
    }
}

impl Dataset for MemoryDataset {
    fn default_graphs(&self) -> BTreeSet<Literal> {
        self.description.default_graphs.clone()
    }

    fn named_graphs(&self) -> BTreeSet<Literal> {
        self.description.named_graphs.clone()
    }

    fn fork(&self) -> Box<dyn Dataset> {
        Box::new(self.clone())
    }

    fn restrict(&self, clause: &DatasetClause) -> Box<dyn Dataset> {
        Box::new(MemoryDataset {
            name: self.name.clone(),
            description: DatasetDescription {
                default_graphs: clause.default_graphs.iter().cloned().collect(),
                named_graphs: clause.named_graphs.iter().cloned().collect(),
            },
        })
    }
}

/// Creates in-memory scans and answers emptiness probes from the store
#[derive(Debug, Clone, Copy)]
pub struct MemoryIndexScanFactory<'s> {
    dataset: &'s str,
    store: &'s MemoryStore,
}

impl<'s> MemoryIndexScanFactory<'s> {
    pub fn new(dataset: &'s str, store: &'s MemoryStore) -> Self {
        Self { dataset, store }
    }
}

impl IndexScanFactory for MemoryIndexScanFactory<'_> {
    fn create_index_scan(&self, patterns: Vec<TriplePattern>, graph: Option<Item>) -> Operator {
        Operator::IndexScan(IndexScan {
            patterns,
            graph,
            source: ScanSource {
                dataset: self.dataset.to_string(),
                in_memory: true,
            },
        })
    }

    /// A scan is empty when one of its patterns matches no quad in any graph
    fn probe_empty(&self, scan: &IndexScan) -> bool {
        if scan.source.dataset != self.dataset {
            return false;
        }
        scan.patterns.iter().any(|p| {
            !self.store.any_match(
                p.subject.as_literal(),
                p.predicate.as_literal(),
                p.object.as_literal(),
            )
        })
    }
}

/// Registers filter expressions by handing out consecutive slots
#[derive(Debug, Default)]
pub struct MemoryEvaluator {
    name: String,
    next_slot: Cell<usize>,
}

impl MemoryEvaluator {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            next_slot: Cell::new(0),
        }
    }

    /// Number of expressions bound so far
    pub fn bound(&self) -> usize {
        self.next_slot.get()
    }
}

impl Evaluator for MemoryEvaluator {
    fn bind_filter_expression(
        &self,
        expression: &Expression,
        scope: &VarSet,
    ) -> CompileResult<FilterBinding> {
        if expression.contains_aggregate() {
            return Err(CompileError::malformed(
                "aggregates cannot be evaluated inside a filter",
            ));
        }
        let slot = self.next_slot.get();
        self.next_slot.set(slot + 1);
        log::trace!(
            "bound filter expression to slot {} over {} variables",
            slot,
            scope.len()
        );
        Ok(FilterBinding {
            evaluator: self.name.clone(),
            slot,
        })
    }
}
