// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! In-memory quad store
//!
//! Quads are kept in a single ordered set; named graphs are tracked separately
//! so that an empty graph created with `CREATE GRAPH` stays visible.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::ast::GraphTarget;
use crate::compile::DatasetDescription;
use crate::error::{CompileError, CompileResult};
use crate::memory::row::UpdateAction;
use crate::types::{Literal, Quad, Triple};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryStore {
    quads: BTreeSet<Quad>,
    graphs: BTreeSet<Literal>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a store from a JSON array of quads
    pub fn from_json(json: &str) -> CompileResult<Self> {
        let quads: Vec<Quad> = serde_json::from_str(json)
            .map_err(|e| CompileError::malformed(format!("invalid quad data: {}", e)))?;
        Ok(quads.into_iter().collect())
    }

    pub fn insert(&mut self, quad: Quad) -> bool {
        if let Some(graph) = &quad.graph {
            self.graphs.insert(graph.clone());
        }
        self.quads.insert(quad)
    }

    /// Insert a triple into the default graph
    pub fn insert_triple(&mut self, subject: Literal, predicate: Literal, object: Literal) -> bool {
        self.insert(Quad::new(None, Triple::new(subject, predicate, object)))
    }

    pub fn remove(&mut self, quad: &Quad) -> bool {
        self.quads.remove(quad)
    }

    pub fn contains(&self, quad: &Quad) -> bool {
        self.quads.contains(quad)
    }

    pub fn len(&self) -> usize {
        self.quads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quads.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Quad> {
        self.quads.iter()
    }

    /// Every named graph the store knows about, empty ones included
    pub fn named_graphs(&self) -> &BTreeSet<Literal> {
        &self.graphs
    }

    /// Triples of one graph; `None` is the store's own default graph
    pub fn triples_in<'s>(&'s self, graph: Option<&'s Literal>) -> impl Iterator<Item = &'s Triple> + 's {
        self.quads
            .iter()
            .filter(move |q| q.graph.as_ref() == graph)
            .map(|q| &q.triple)
    }

    /// Merged default graph of a dataset
    pub fn default_graph(&self, dataset: &DatasetDescription) -> BTreeSet<Triple> {
        if dataset.default_graphs.is_empty() {
            return self.triples_in(None).cloned().collect();
        }
        dataset
            .default_graphs
            .iter()
            .flat_map(|g| self.triples_in(Some(g)))
            .cloned()
            .collect()
    }

    /// Named graphs a dataset ranges over
    pub fn visible_graphs(&self, dataset: &DatasetDescription) -> BTreeSet<Literal> {
        if dataset.named_graphs.is_empty() {
            self.graphs.clone()
        } else {
            dataset.named_graphs.clone()
        }
    }

    /// Whether any stored quad, in any graph, agrees with the given positions
    pub fn any_match(
        &self,
        subject: Option<&Literal>,
        predicate: Option<&Literal>,
        object: Option<&Literal>,
    ) -> bool {
        self.quads.iter().any(|q| {
            subject.map_or(true, |s| *s == q.triple.subject)
                && predicate.map_or(true, |p| *p == q.triple.predicate)
                && object.map_or(true, |o| *o == q.triple.object)
        })
    }

    pub fn create_graph(&mut self, graph: Literal) -> bool {
        self.graphs.insert(graph)
    }

    /// Remove every quad of the targeted graphs; returns the number removed
    pub fn clear(&mut self, target: &GraphTarget) -> usize {
        let before = self.quads.len();
        self.quads.retain(|q| !targets(target, q.graph.as_ref()));
        before - self.quads.len()
    }

    /// Clear the targeted graphs and forget the named ones
    pub fn drop_graphs(&mut self, target: &GraphTarget) -> usize {
        let removed = self.clear(target);
        match target {
            GraphTarget::Named(g) => {
                self.graphs.remove(g);
            }
            GraphTarget::AllNamed | GraphTarget::All => self.graphs.clear(),
            GraphTarget::Default => {}
        }
        removed
    }

    /// Apply the actions of one update plan: deletions first, then insertions
    /// and graph management, in order
    pub fn apply(&mut self, actions: &[UpdateAction]) -> CompileResult<usize> {
        let mut changed = 0;
        for action in actions {
            if let UpdateAction::Delete(quad) = action {
                changed += usize::from(self.remove(quad));
            }
        }
        for action in actions {
            match action {
                UpdateAction::Delete(_) => {}
                UpdateAction::Insert(quad) => changed += usize::from(self.insert(quad.clone())),
                UpdateAction::Clear { target, .. } => changed += self.clear(target),
                UpdateAction::Drop { target, silent } => {
                    if let GraphTarget::Named(g) = target {
                        if !self.graphs.contains(g) && !silent {
                            return Err(CompileError::malformed(format!("graph {} does not exist", g)));
                        }
                    }
                    changed += self.drop_graphs(target);
                }
                UpdateAction::Create { graph, silent } => {
                    if !self.create_graph(graph.clone()) && !silent {
                        return Err(CompileError::malformed(format!("graph {} already exists", graph)));
                    }
                }
                UpdateAction::Load { source, silent, .. } => {
                    if !silent {
                        return Err(CompileError::unsupported(format!(
                            "the in-memory store cannot load {}",
                            source
                        )));
                    }
                    log::warn!("ignoring LOAD SILENT of {}", source);
                }
            }
        }
        log::debug!("applied {} update actions, {} changes", actions.len(), changed);
        Ok(changed)
    }
}

fn targets(target: &GraphTarget, graph: Option<&Literal>) -> bool {
    match (target, graph) {
        (GraphTarget::All, _) => true,
        (GraphTarget::Default, None) => true,
        (GraphTarget::AllNamed, Some(_)) => true,
        (GraphTarget::Named(t), Some(g)) => t == g,
        _ => false,
    }
}

impl FromIterator<Quad> for MemoryStore {
    fn from_iter<I: IntoIterator<Item = Quad>>(iter: I) -> Self {
        let mut store = MemoryStore::new();
        for quad in iter {
            store.insert(quad);
        }
        store
    }
}

impl Extend<Quad> for MemoryStore {
    fn extend<I: IntoIterator<Item = Quad>>(&mut self, iter: I) {
        for quad in iter {
            self.insert(quad);
        }
    }
}
