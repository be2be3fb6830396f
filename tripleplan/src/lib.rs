// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! TriplePlan - logical-plan compiler for SPARQL-style graph queries
//!
//! TriplePlan turns the syntax tree of a query, an update request or an
//! inference-rule program into an operator graph and improves that graph with
//! a fixpoint rewrite engine.
//!
//! # Pipeline
//!
//! - **Translation** ([`compile`]): the [`Translator`] builds the graph top-down
//!   from the Result operator, ordering computed bindings by dependency and
//!   compiling property paths (including transitive closures) into loops.
//! - **Rewriting** ([`rewrite`]): rules from the [`RuleCatalogue`] are applied
//!   until no rule matches anywhere in the graph.
//! - **Evaluation** ([`memory`]): a reference interpreter over an in-memory quad
//!   store gives plans an observable meaning.
//!
//! # Usage
//!
//! ```no_run
//! use tripleplan::ast::{Document, GroupGraphPattern, Query};
//! use tripleplan::memory::{Interpreter, MemoryDataset, MemoryEvaluator, MemoryIndexScanFactory, MemoryStore};
//! use tripleplan::types::{Item, TriplePattern};
//! use tripleplan::{Compiler, CompilerConfig};
//!
//! let store = MemoryStore::new();
//! let factory = MemoryIndexScanFactory::new("mem", &store);
//! let evaluator = MemoryEvaluator::new("mem");
//! let compiler = Compiler::new(&factory, &evaluator, CompilerConfig::default());
//!
//! let query = Query::select_all(GroupGraphPattern::triples(vec![TriplePattern::new(
//!     Item::var("s"),
//!     Item::var("p"),
//!     Item::var("o"),
//! )]));
//! let plans = compiler
//!     .compile(&Document::Query(query), Box::new(MemoryDataset::new("mem")))
//!     .unwrap();
//! let rows = Interpreter::for_plan(&store, &plans[0]).run(&plans[0]).unwrap();
//! ```

pub mod ast;
pub mod compile;
pub mod compiler;
pub mod config;
pub mod error;
pub mod memory;
pub mod plan;
pub mod rewrite;
pub mod types;

pub use compile::{CompiledPlan, Translator};
pub use compiler::Compiler;
pub use config::{CompilerConfig, EvaluatorCapabilities, RewriteConfig};
pub use error::{CompileError, CompileResult};
pub use plan::{Operator, OperatorGraph, OperatorId, OperatorKind};
pub use rewrite::{RewriteEngine, RuleCatalogue};

/// TriplePlan version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// TriplePlan crate name
pub const CRATE_NAME: &str = env!("CARGO_PKG_NAME");
