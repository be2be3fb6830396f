// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Rules that clone a shared operator once per consumer
//!
//! After splitting, every consumer owns its copy, which lets the
//! specialization rules rewrite each copy against a single downstream pattern.

use crate::error::CompileResult;
use crate::plan::{Edge, OperatorId, OperatorKind};
use crate::rewrite::context::RewriteContext;
use crate::rewrite::pattern::{match_one, Matched};
use crate::rewrite::rule::RewriteRule;

/// Distinct consumers of `id`, in edge order
fn consumers(ctx: &RewriteContext<'_>, id: OperatorId) -> Vec<OperatorId> {
    let mut targets: Vec<OperatorId> = Vec::new();
    for edge in ctx.graph().succeeding(id) {
        if !targets.contains(&edge.target) {
            targets.push(edge.target);
        }
    }
    targets
}

fn check_split(ctx: &RewriteContext<'_>, start: OperatorId, kind: OperatorKind) -> Option<Matched> {
    if !match_one(ctx.graph(), start, kind) {
        return None;
    }
    let targets = consumers(ctx, start);
    if targets.len() < 2 {
        return None;
    }
    Some(Matched::new(start).bind_all("moved", targets.into_iter().skip(1)))
}

/// Give every consumer but the first its own copy of the operator, fed by the
/// same inputs
fn split(ctx: &mut RewriteContext<'_>, matched: Matched) -> CompileResult<()> {
    let original = matched.root;
    let operator = ctx.operator(original)?.clone();
    let inputs = ctx.graph().inputs(original);
    for target in matched.all("moved") {
        let edges: Vec<Edge> = ctx
            .graph()
            .succeeding(original)
            .iter()
            .filter(|e| e.target == *target)
            .copied()
            .collect();
        let copy = ctx.add(operator.clone());
        for input in &inputs {
            ctx.connect_edge(input.source, copy, input.operand, input.feedback)?;
        }
        ctx.disconnect(original, *target)?;
        for edge in edges {
            ctx.connect_edge(copy, edge.target, edge.operand, edge.feedback)?;
        }
    }
    Ok(())
}

macro_rules! split_rule {
    ($(#[$doc:meta])* $rule:ident, $kind:ident) => {
        $(#[$doc])*
        #[derive(Debug, Default)]
        pub struct $rule;

        impl RewriteRule for $rule {
            fn name(&self) -> &'static str {
                stringify!($rule)
            }

            fn start_kind(&self) -> OperatorKind {
                OperatorKind::$kind
            }

            fn check(&self, ctx: &RewriteContext<'_>, start: OperatorId) -> Option<Matched> {
                check_split(ctx, start, OperatorKind::$kind)
            }

            fn replace(&self, ctx: &mut RewriteContext<'_>, matched: Matched) -> CompileResult<()> {
                split(ctx, matched)
            }
        }
    };
}

split_rule!(
    /// One Generate per consumer
    SplitGenerate,
    Generate
);
split_rule!(
    /// One predicate matcher per consumer
    SplitPredicatePattern,
    PredicatePattern
);
split_rule!(
    /// One predicate head per consumer
    SplitConstructPredicate,
    ConstructPredicate
);
