// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! External collaborators of the translator
//!
//! The translator never touches storage directly: index scans are created by
//! an [`IndexScanFactory`], graph identifiers come from a [`Dataset`] and filter
//! expressions are registered with an [`Evaluator`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::ast::{DatasetClause, Expression};
use crate::error::CompileResult;
use crate::plan::{FilterBinding, IndexScan, Operator};
use crate::types::{Item, Literal, TriplePattern, VarSet};

/// Turns triple patterns plus a graph constraint into scan operators
pub trait IndexScanFactory {
    /// Scan returning every solution of the basic graph pattern
    fn create_index_scan(&self, patterns: Vec<TriplePattern>, graph: Option<Item>) -> Operator;

    /// One-row probe
    fn create_empty_index_scan(&self, graph: Option<Item>) -> Operator {
        Operator::EmptyIndexScan { graph }
    }

    /// Cheap check whether a scan is known to return no rows
    fn probe_empty(&self, _scan: &IndexScan) -> bool {
        false
    }
}

/// Source of default and named graph identifiers
pub trait Dataset {
    /// Graphs merged into the default graph; empty means the store's own default graph
    fn default_graphs(&self) -> BTreeSet<Literal>;

    /// Graphs a `GRAPH ?g` pattern ranges over; empty means every named graph
    fn named_graphs(&self) -> BTreeSet<Literal>;

    /// Independent copy used for nested EXISTS plans
    fn fork(&self) -> Box<dyn Dataset>;

    /// Dataset restricted by FROM / FROM NAMED (or USING) clauses
    fn restrict(&self, clause: &DatasetClause) -> Box<dyn Dataset> {
        Box::new(DatasetDescription {
            default_graphs: clause.default_graphs.iter().cloned().collect(),
            named_graphs: clause.named_graphs.iter().cloned().collect(),
        })
    }
}

/// Registers filter expressions with the runtime evaluator
pub trait Evaluator {
    fn bind_filter_expression(
        &self,
        expression: &Expression,
        scope: &VarSet,
    ) -> CompileResult<FilterBinding>;
}

/// Snapshot of the graph identifiers a plan was compiled against
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetDescription {
    pub default_graphs: BTreeSet<Literal>,
    pub named_graphs: BTreeSet<Literal>,
}

impl DatasetDescription {
    pub fn of(dataset: &dyn Dataset) -> Self {
        Self {
            default_graphs: dataset.default_graphs(),
            named_graphs: dataset.named_graphs(),
        }
    }
}

impl Dataset for DatasetDescription {
    fn default_graphs(&self) -> BTreeSet<Literal> {
        self.default_graphs.clone()
    }

    fn named_graphs(&self) -> BTreeSet<Literal> {
        self.named_graphs.clone()
    }

    fn fork(&self) -> Box<dyn Dataset> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_restrict_replaces_graph_sets() {
        let base = DatasetDescription {
            default_graphs: BTreeSet::new(),
            named_graphs: [Literal::iri("http://ex/g1")].into_iter().collect(),
        };
        let clause = DatasetClause {
            default_graphs: vec![Literal::iri("http://ex/d")],
            named_graphs: vec![Literal::iri("http://ex/g2")],
        };
        let restricted = base.restrict(&clause);
        assert!(restricted.default_graphs().contains(&Literal::iri("http://ex/d")));
        assert_eq!(restricted.named_graphs().len(), 1);
        assert!(restricted.named_graphs().contains(&Literal::iri("http://ex/g2")));
    }
}
