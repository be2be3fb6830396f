// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Compiler entry point
//!
//! Ties translation and rewriting together: a document is translated into one
//! plan per query, update operation or rule program, and every plan (nested
//! EXISTS plans included) is rewritten to a fixpoint with the catalogue built
//! from the configuration.

use crate::ast::{Document, Query};
use crate::compile::{CompiledPlan, Dataset, Evaluator, IndexScanFactory, Translator};
use crate::config::CompilerConfig;
use crate::error::CompileResult;
use crate::plan::explain::format_plan;
use crate::plan::{Operator, OperatorGraph};
use crate::rewrite::{RewriteEngine, RewriteStats};

pub struct Compiler<'a> {
    factory: &'a dyn IndexScanFactory,
    evaluator: &'a dyn Evaluator,
    config: CompilerConfig,
    engine: RewriteEngine,
}

impl<'a> Compiler<'a> {
    pub fn new(
        factory: &'a dyn IndexScanFactory,
        evaluator: &'a dyn Evaluator,
        config: CompilerConfig,
    ) -> Self {
        let engine = RewriteEngine::from_config(&config.rewrite);
        log::debug!(
            "compiler created with {} rewrite rules",
            engine.catalogue().len()
        );
        Self {
            factory,
            evaluator,
            config,
            engine,
        }
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// Translate and rewrite every plan of a document
    pub fn compile(&self, document: &Document, dataset: Box<dyn Dataset>) -> CompileResult<Vec<CompiledPlan>> {
        let mut translator = Translator::new(self.factory, dataset, self.evaluator, &self.config);
        let mut plans = translator.translate(document)?;
        for plan in &mut plans {
            self.optimize(plan)?;
        }
        Ok(plans)
    }

    /// Translate and rewrite a single query
    pub fn compile_query(&self, query: &Query, dataset: Box<dyn Dataset>) -> CompileResult<CompiledPlan> {
        let mut translator = Translator::new(self.factory, dataset, self.evaluator, &self.config);
        let mut plan = translator.translate_query(query)?;
        self.optimize(&mut plan)?;
        Ok(plan)
    }

    /// Rewrite a translated plan in place
    pub fn optimize(&self, plan: &mut CompiledPlan) -> CompileResult<RewriteStats> {
        let stats = self.rewrite_graph(&mut plan.graph)?;
        log::debug!(
            "rewrote plan with {} rule applications in {} passes:\n{}",
            stats.total(),
            stats.passes,
            format_plan(&plan.graph)
        );
        Ok(stats)
    }

    fn rewrite_graph(&self, graph: &mut OperatorGraph) -> CompileResult<RewriteStats> {
        let mut stats = RewriteStats::default();
        let filters: Vec<_> = graph
            .ids()
            .filter(|id| matches!(graph.operator(*id), Ok(Operator::Filter(f)) if !f.exists.is_empty()))
            .collect();
        for id in filters {
            if let Operator::Filter(filter) = graph.operator_mut(id)? {
                for nested in filter.exists.values_mut() {
                    stats.absorb(self.rewrite_graph(nested)?);
                }
            }
        }

        stats.absorb(self.engine.run(graph, Some(self.factory))?);
        graph.detect_cycles()?;
        graph.update_variables()?;
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{GroupGraphPattern, QueryForm};
    use crate::compile::DatasetDescription;
    use crate::memory::{MemoryEvaluator, MemoryIndexScanFactory, MemoryStore};
    use crate::plan::OperatorKind;
    use crate::types::{Item, TriplePattern};

    #[test]
    fn test_disabled_rewrite_keeps_translation() {
        let store = MemoryStore::new();
        let factory = MemoryIndexScanFactory::new("mem", &store);
        let evaluator = MemoryEvaluator::new("mem");
        let pattern = GroupGraphPattern::triples(vec![
            TriplePattern::new(Item::var("a"), Item::iri("http://ex/p"), Item::var("b")),
            TriplePattern::new(Item::var("b"), Item::iri("http://ex/q"), Item::var("c")),
        ]);
        let query = Query::select_all(pattern);
        assert!(matches!(query.form, QueryForm::Select(_)));

        let compiler = Compiler::new(&factory, &evaluator, CompilerConfig::default().without_rewrite());
        let plan = compiler
            .compile_query(&query, Box::new(DatasetDescription::default()))
            .unwrap();
        assert_eq!(plan.graph.count(OperatorKind::IndexScan), 1);
        assert_eq!(plan.graph.count(OperatorKind::Join), 0);
    }
}
