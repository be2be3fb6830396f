// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Translation of update operations
//!
//! Every operation gets its own plan ending in `Result[Update]`. Data-only
//! forms and graph management forms are fed by a one-row probe so they run
//! even when nothing matches.

use crate::ast::{
    GraphTarget, GroupElement, GroupGraphPattern, ModifyOperation, QuadPattern, Update,
    UpdateOperation,
};
use crate::compile::collaborators::DatasetDescription;
use crate::compile::cursor::Cursor;
use crate::compile::translator::{CompiledPlan, Translator};
use crate::error::{CompileError, CompileResult};
use crate::plan::{Operator, OperatorGraph, ResultForm};
use crate::types::{Item, Literal};

impl<'a> Translator<'a> {
    /// Translate every operation of an update request, in order
    pub fn translate_update(&mut self, update: &Update) -> CompileResult<Vec<CompiledPlan>> {
        update
            .operations
            .iter()
            .map(|operation| self.translate_operation(operation))
            .collect()
    }

    /// Translate a single update operation
    pub fn translate_operation(&mut self, operation: &UpdateOperation) -> CompileResult<CompiledPlan> {
        log::debug!("translating {} update", operation_name(operation));
        match operation {
            UpdateOperation::Modify(modify) => {
                let saved = self.enter_dataset(modify.using.as_ref())?;
                let outcome = self.build_modify(modify);
                if let Some(previous) = saved {
                    self.dataset = previous;
                }
                outcome
            }
            other => self.build_operation(other),
        }
    }

    fn build_operation(&mut self, operation: &UpdateOperation) -> CompileResult<CompiledPlan> {
        let description = DatasetDescription::of(self.dataset.as_ref());
        self.graph = OperatorGraph::new();
        let result = Cursor::new(self.graph.add(Operator::Result(ResultForm::Update)), 0);

        match operation {
            UpdateOperation::InsertData(quads) | UpdateOperation::DeleteData(quads) => {
                let insert = matches!(operation, UpdateOperation::InsertData(_));
                let form = if insert { "INSERT DATA" } else { "DELETE DATA" };
                for quad in quads {
                    if quad.has_variables() {
                        return Err(CompileError::malformed(format!(
                            "variables are not allowed in {}: {}",
                            form, quad.triple
                        )));
                    }
                    if quad.has_blank_nodes() {
                        return Err(CompileError::malformed(format!(
                            "blank nodes are not allowed in {}: {}",
                            form, quad.triple
                        )));
                    }
                }
                self.check_template_graphs(quads)?;
                let action = if insert { Operator::Insert } else { Operator::Delete };
                let cursor = result.attach(&mut self.graph, action)?;
                let cursor = cursor.attach(&mut self.graph, Operator::Construct(quads.clone()))?;
                self.attach_probe(cursor)?;
            }
            UpdateOperation::DeleteWhere(quads) => {
                check_delete_template(quads)?;
                self.check_template_graphs(quads)?;
                let cursor = result.attach(&mut self.graph, Operator::Delete)?;
                let cursor = cursor.attach(&mut self.graph, Operator::Construct(quads.clone()))?;
                let pattern = pattern_of(quads);
                self.compile_group(&pattern, cursor, &None)?;
            }
            UpdateOperation::Load {
                source,
                destination,
                silent,
            } => {
                if destination.is_some() {
                    self.require(self.config.capabilities.named_graphs, "LOAD INTO GRAPH")?;
                }
                let cursor = result.attach(
                    &mut self.graph,
                    Operator::Load {
                        source: source.clone(),
                        destination: destination.clone(),
                        silent: *silent,
                    },
                )?;
                self.attach_probe(cursor)?;
            }
            UpdateOperation::Clear { target, silent } => {
                self.check_target(target)?;
                let cursor = result.attach(
                    &mut self.graph,
                    Operator::Clear {
                        target: target.clone(),
                        silent: *silent,
                    },
                )?;
                self.attach_probe(cursor)?;
            }
            UpdateOperation::Create { graph, silent } => {
                self.require(self.config.capabilities.named_graphs, "CREATE GRAPH")?;
                let cursor = result.attach(
                    &mut self.graph,
                    Operator::Create {
                        graph: graph.clone(),
                        silent: *silent,
                    },
                )?;
                self.attach_probe(cursor)?;
            }
            UpdateOperation::Drop { target, silent } => {
                self.check_target(target)?;
                let cursor = result.attach(
                    &mut self.graph,
                    Operator::Drop {
                        target: target.clone(),
                        silent: *silent,
                    },
                )?;
                self.attach_probe(cursor)?;
            }
            UpdateOperation::Modify(modify) => return self.build_modify(modify),
        }

        self.finish(description)
    }

    /// `[WITH g] DELETE {..} INSERT {..} WHERE {..}`
    fn build_modify(&mut self, modify: &ModifyOperation) -> CompileResult<CompiledPlan> {
        check_delete_template(&modify.delete)?;
        if modify.with.is_some() {
            self.require(self.config.capabilities.named_graphs, "WITH")?;
        }
        let description = DatasetDescription::of(self.dataset.as_ref());
        self.graph = OperatorGraph::new();
        let result = Cursor::new(self.graph.add(Operator::Result(ResultForm::Update)), 0);

        let delete = with_default_graph(&modify.delete, modify.with.as_ref());
        let insert = with_default_graph(&modify.insert, modify.with.as_ref());
        self.check_template_graphs(&delete)?;
        self.check_template_graphs(&insert)?;

        let mut constructs = Vec::new();
        if !delete.is_empty() {
            let cursor = result.attach(&mut self.graph, Operator::Delete)?;
            constructs.push(cursor.attach(&mut self.graph, Operator::Construct(delete))?);
        }
        if !insert.is_empty() {
            let cursor = result.attach(&mut self.graph, Operator::Insert)?;
            constructs.push(cursor.attach(&mut self.graph, Operator::Construct(insert))?);
        }
        let Some((first, others)) = constructs.split_first() else {
            return Err(CompileError::malformed("DELETE/INSERT without any template"));
        };

        // USING replaces the WITH graph for the WHERE clause
        let graph_constraint = match (&modify.using, &modify.with) {
            (None, Some(with)) => Some(Item::Lit(with.clone())),
            _ => None,
        };
        self.compile_group(&modify.pattern, *first, &graph_constraint)?;

        // both templates read the same solutions
        let producers = self.graph.operand(first.target, 0);
        for other in others {
            for producer in &producers {
                other.feed(&mut self.graph, *producer)?;
            }
        }

        self.finish(description)
    }

    fn attach_probe(&mut self, cursor: Cursor) -> CompileResult<()> {
        let probe = self.factory.create_empty_index_scan(None);
        cursor.attach_source(&mut self.graph, probe)?;
        Ok(())
    }

    fn check_target(&self, target: &GraphTarget) -> CompileResult<()> {
        match target {
            GraphTarget::Named(_) | GraphTarget::AllNamed => {
                self.require(self.config.capabilities.named_graphs, "named graph targets")
            }
            GraphTarget::Default | GraphTarget::All => Ok(()),
        }
    }

    fn check_template_graphs(&self, quads: &[QuadPattern]) -> CompileResult<()> {
        if quads.iter().any(|q| q.graph.is_some()) {
            self.require(self.config.capabilities.named_graphs, "GRAPH templates")?;
        }
        Ok(())
    }
}

fn check_delete_template(quads: &[QuadPattern]) -> CompileResult<()> {
    match quads.iter().find(|q| q.has_blank_nodes()) {
        Some(quad) => Err(CompileError::malformed(format!(
            "blank nodes are not allowed in DELETE templates: {}",
            quad.triple
        ))),
        None => Ok(()),
    }
}

/// Template quads without a GRAPH wrapper target the WITH graph
fn with_default_graph(quads: &[QuadPattern], with: Option<&Literal>) -> Vec<QuadPattern> {
    quads
        .iter()
        .map(|quad| match (&quad.graph, with) {
            (None, Some(graph)) => QuadPattern::in_graph(Item::Lit(graph.clone()), quad.triple.clone()),
            _ => quad.clone(),
        })
        .collect()
}

/// WHERE pattern equivalent to a DELETE WHERE template
fn pattern_of(quads: &[QuadPattern]) -> GroupGraphPattern {
    let mut elements = Vec::new();
    for quad in quads {
        match &quad.graph {
            None => elements.push(GroupElement::Triple(quad.triple.clone())),
            Some(name) => elements.push(GroupElement::Graph {
                name: name.clone(),
                pattern: GroupGraphPattern::triples(vec![quad.triple.clone()]),
            }),
        }
    }
    GroupGraphPattern::new(elements)
}

fn operation_name(operation: &UpdateOperation) -> &'static str {
    match operation {
        UpdateOperation::InsertData(_) => "INSERT DATA",
        UpdateOperation::DeleteData(_) => "DELETE DATA",
        UpdateOperation::DeleteWhere(_) => "DELETE WHERE",
        UpdateOperation::Modify(_) => "DELETE/INSERT",
        UpdateOperation::Load { .. } => "LOAD",
        UpdateOperation::Clear { .. } => "CLEAR",
        UpdateOperation::Create { .. } => "CREATE",
        UpdateOperation::Drop { .. } => "DROP",
    }
}
