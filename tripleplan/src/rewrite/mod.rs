// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Rule-based rewriting of operator graphs
//!
//! The [`RewriteEngine`] applies the rules of a [`RuleCatalogue`] until a full
//! pass changes nothing. Rules find candidates through the start-node index
//! and mutate the graph only through [`RewriteContext`], which keeps graph and
//! index in step.

pub mod catalogue;
pub mod context;
pub mod engine;
pub mod index;
pub mod pattern;
pub mod rule;
pub mod rules;

pub use catalogue::RuleCatalogue;
pub use context::RewriteContext;
pub use engine::{RewriteEngine, RewriteStats};
pub use index::StartNodeIndex;
pub use pattern::{Direction, Matched};
pub use rule::RewriteRule;
