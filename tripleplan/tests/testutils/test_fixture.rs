//! Test fixture for TriplePlan integration tests
//!
//! Compiles documents against an in-memory store through the public
//! `Compiler` API and evaluates the plans with the reference interpreter.

use std::collections::BTreeSet;

use tripleplan::ast::{Document, Query, Update};
use tripleplan::memory::{
    Evaluation, Interpreter, MemoryDataset, MemoryEvaluator, MemoryIndexScanFactory, MemoryStore,
};
use tripleplan::types::{Literal, Quad, Triple, Variable};
use tripleplan::{CompileError, CompileResult, CompiledPlan, Compiler, CompilerConfig};

pub const DATASET: &str = "test";

/// Enable log output for a test run; safe to call repeatedly
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub struct TestFixture {
    store: MemoryStore,
    config: CompilerConfig,
}

impl TestFixture {
    /// Empty store, default configuration
    pub fn empty() -> Self {
        init_logging();
        Self {
            store: MemoryStore::new(),
            config: CompilerConfig::default(),
        }
    }

    /// Store holding `triples` in its default graph
    pub fn with_triples(triples: impl IntoIterator<Item = Triple>) -> Self {
        let mut fixture = Self::empty();
        for triple in triples {
            fixture.store.insert(Quad::new(None, triple));
        }
        fixture
    }

    pub fn with_config(mut self, config: CompilerConfig) -> Self {
        self.config = config;
        self
    }

    /// Same data with rewriting switched off
    pub fn without_rewrite(&self) -> Self {
        Self {
            store: self.store.clone(),
            config: self.config.clone().without_rewrite(),
        }
    }

    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut MemoryStore {
        &mut self.store
    }

    pub fn compile(&self, document: &Document) -> CompileResult<Vec<CompiledPlan>> {
        let factory = MemoryIndexScanFactory::new(DATASET, &self.store);
        let evaluator = MemoryEvaluator::new(DATASET);
        let compiler = Compiler::new(&factory, &evaluator, self.config.clone());
        compiler.compile(document, Box::new(MemoryDataset::new(DATASET)))
    }

    pub fn compile_query(&self, query: &Query) -> CompileResult<CompiledPlan> {
        let factory = MemoryIndexScanFactory::new(DATASET, &self.store);
        let evaluator = MemoryEvaluator::new(DATASET);
        let compiler = Compiler::new(&factory, &evaluator, self.config.clone());
        compiler.compile_query(query, Box::new(MemoryDataset::new(DATASET)))
    }

    /// Compile a query and panic with the error if that fails
    pub fn assert_compiles(&self, query: &Query) -> CompiledPlan {
        match self.compile_query(query) {
            Ok(plan) => plan,
            Err(e) => panic!("query failed to compile: {}", e),
        }
    }

    /// Compile a document that must be rejected and hand out the error
    pub fn assert_compile_fails(&self, document: &Document) -> CompileError {
        match self.compile(document) {
            Ok(plans) => panic!("expected a compile error, got {} plans", plans.len()),
            Err(e) => e,
        }
    }

    pub fn run(&self, plan: &CompiledPlan) -> Evaluation {
        match Interpreter::for_plan(&self.store, plan).run(plan) {
            Ok(evaluation) => evaluation,
            Err(e) => panic!("plan evaluation failed: {}", e),
        }
    }

    /// Compile and run a query
    pub fn query(&self, query: &Query) -> Evaluation {
        let plan = self.assert_compiles(query);
        self.run(&plan)
    }

    /// Distinct `(subject, object)` values of a query's solutions
    pub fn pairs(&self, query: &Query, subject: &str, object: &str) -> BTreeSet<(Literal, Literal)> {
        let s = Variable::new(subject);
        let o = Variable::new(object);
        self.query(query)
            .solutions
            .into_iter()
            .filter_map(|row| Some((row.get(&s)?.clone(), row.get(&o)?.clone())))
            .collect()
    }

    /// Run an update request one operation at a time, applying each before
    /// the next is compiled; returns the number of changed quads
    pub fn update(&mut self, update: &Update) -> CompileResult<usize> {
        let mut changed = 0;
        for operation in &update.operations {
            let document = Document::Update(Update {
                operations: vec![operation.clone()],
            });
            for plan in self.compile(&document)? {
                let evaluation = Interpreter::for_plan(&self.store, &plan).run(&plan)?;
                changed += self.store.apply(&evaluation.actions)?;
            }
        }
        Ok(changed)
    }

    /// Update that must succeed
    pub fn assert_update_succeeds(&mut self, update: &Update) -> usize {
        match self.update(update) {
            Ok(changed) => changed,
            Err(e) => panic!("update failed: {}", e),
        }
    }
}
