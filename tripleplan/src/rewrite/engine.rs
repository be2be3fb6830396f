// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Fixpoint driver
//!
//! A pass tries every rule of the catalogue, in order, on a snapshot of the
//! live operators of the rule's start kind. The engine stops after the first
//! pass that changes nothing.

use std::collections::BTreeMap;

use crate::compile::IndexScanFactory;
use crate::config::RewriteConfig;
use crate::error::{CompileError, CompileResult};
use crate::plan::OperatorGraph;
use crate::rewrite::catalogue::RuleCatalogue;
use crate::rewrite::context::RewriteContext;

/// What a rewrite run did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RewriteStats {
    /// Passes run, including the final quiet one
    pub passes: usize,
    /// Applications per rule name
    pub applications: BTreeMap<&'static str, usize>,
}

impl RewriteStats {
    pub fn total(&self) -> usize {
        self.applications.values().sum()
    }

    pub fn count(&self, rule: &str) -> usize {
        self.applications.get(rule).copied().unwrap_or(0)
    }

    /// Add the counts of another run, e.g. over a nested graph
    pub fn absorb(&mut self, other: RewriteStats) {
        self.passes += other.passes;
        for (rule, count) in other.applications {
            *self.applications.entry(rule).or_insert(0) += count;
        }
    }
}

#[derive(Debug)]
pub struct RewriteEngine {
    catalogue: RuleCatalogue,
    max_passes: usize,
}

impl RewriteEngine {
    pub fn new(catalogue: RuleCatalogue, max_passes: usize) -> Self {
        Self {
            catalogue,
            max_passes,
        }
    }

    pub fn from_config(config: &RewriteConfig) -> Self {
        Self::new(RuleCatalogue::from_config(config), config.max_passes)
    }

    pub fn catalogue(&self) -> &RuleCatalogue {
        &self.catalogue
    }

    /// Rewrite `graph` in place until no rule applies
    pub fn run(
        &self,
        graph: &mut OperatorGraph,
        factory: Option<&dyn IndexScanFactory>,
    ) -> CompileResult<RewriteStats> {
        let mut stats = RewriteStats::default();
        if self.catalogue.is_empty() {
            return Ok(stats);
        }
        let mut ctx = RewriteContext::new(graph, factory);
        ctx.refresh_variables()?;

        for pass in 1..=self.max_passes {
            stats.passes = pass;
            let mut changed = 0;
            for rule in self.catalogue.iter() {
                let kind = rule.start_kind();
                for candidate in ctx.index().candidates(kind) {
                    // earlier replacements in this pass may have removed or retyped it
                    if ctx.graph().kind(candidate) != Some(kind) {
                        continue;
                    }
                    let Some(matched) = rule.check(&ctx, candidate) else {
                        continue;
                    };
                    log::debug!("{} applies at {}", rule.name(), candidate);
                    rule.replace(&mut ctx, matched)?;
                    ctx.refresh_variables()?;
                    if cfg!(debug_assertions) {
                        ctx.verify()?;
                    }
                    *stats.applications.entry(rule.name()).or_insert(0) += 1;
                    changed += 1;
                }
            }
            log::debug!("rewrite pass {}: {} applications", pass, changed);
            if changed == 0 {
                return Ok(stats);
            }
        }
        Err(CompileError::internal(format!(
            "rewriting did not reach a fixpoint within {} passes",
            self.max_passes
        )))
    }
}
