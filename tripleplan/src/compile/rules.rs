// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Translation of inference-rule programs
//!
//! Triple heads become `Generate`, predicate heads `ConstructPredicate`. A body
//! triple reads stored triples unioned with derived ones through a
//! `TriplePattern` matcher; every generator feeds every matcher over a
//! feedback edge, which closes the recursion.

use crate::ast::{RuleHead, RuleProgram};
use crate::compile::collaborators::DatasetDescription;
use crate::compile::cursor::Cursor;
use crate::compile::translator::{CompiledPlan, RuleWiring, Translator};
use crate::error::{CompileError, CompileResult};
use crate::plan::{Edge, Operator, OperatorGraph, OperatorId, ResultForm};

impl<'a> Translator<'a> {
    /// Translate a rule program into a single recursive plan
    pub fn translate_rules(&mut self, program: &RuleProgram) -> CompileResult<CompiledPlan> {
        log::debug!("translating rule program with {} rules", program.rules.len());
        let description = DatasetDescription::of(self.dataset.as_ref());
        self.graph = OperatorGraph::new();
        self.rules = Some(RuleWiring::default());

        let outcome = self.build_rules(program);
        let wiring = self.rules.take();
        outcome?;
        let wiring =
            wiring.ok_or_else(|| CompileError::internal("rule wiring lost during translation"))?;

        // forward links only; back-references are rebuilt afterwards
        link_all(&mut self.graph, &wiring.generates, &wiring.triple_matches)?;
        link_all(&mut self.graph, &wiring.predicate_heads, &wiring.predicate_patterns)?;
        self.graph.set_parents();

        self.finish(description)
    }

    fn build_rules(&mut self, program: &RuleProgram) -> CompileResult<()> {
        let result = self.graph.add(Operator::Result(ResultForm::Materialize {
            triples: program.output.triples,
            predicates: program.output.predicates,
        }));

        for rule in &program.rules {
            if rule.head.is_empty() {
                return Err(CompileError::malformed("inference rule without a head"));
            }
            let mut heads = Vec::with_capacity(rule.head.len());
            for head in &rule.head {
                let id = match head {
                    RuleHead::Triple(pattern) => {
                        let id = self.graph.add(Operator::Generate(pattern.clone()));
                        self.wiring()?.generates.push(id);
                        id
                    }
                    RuleHead::Predicate(atom) => {
                        let id = self.graph.add(Operator::ConstructPredicate(atom.clone()));
                        self.wiring()?.predicate_heads.push(id);
                        id
                    }
                };
                // derived facts always reach the result; unwanted ones are pruned by rewriting
                self.graph.connect(id, result, 0)?;
                heads.push(id);
            }

            let first = heads[0];
            self.compile_group(&rule.body, Cursor::new(first, 0), &None)?;
            let producers = self.graph.operand(first, 0);
            for head in &heads[1..] {
                for producer in &producers {
                    self.graph.connect(*producer, *head, 0)?;
                }
            }
        }
        Ok(())
    }

    fn wiring(&mut self) -> CompileResult<&mut RuleWiring> {
        self.rules
            .as_mut()
            .ok_or_else(|| CompileError::internal("rule wiring requested outside a rule program"))
    }
}

fn link_all(
    graph: &mut OperatorGraph,
    producers: &[OperatorId],
    consumers: &[OperatorId],
) -> CompileResult<()> {
    for producer in producers {
        for consumer in consumers {
            graph.push_succeeding(
                *producer,
                Edge {
                    target: *consumer,
                    operand: 0,
                    feedback: true,
                },
            )?;
        }
    }
    Ok(())
}
