// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Specialization of rule heads against the body patterns they feed
//!
//! A head that feeds exactly one matcher is unified with the matcher's
//! pattern. The head's input is then routed straight to the matcher's
//! consumers through a short chain of cheap operators:
//!
//! ```text
//! inputs -> Projection[head vars] -> RuleFilter -> ReplaceVar
//!        -> Projection[body vars] -> Bind constants -> consumers
//! ```
//!
//! If the two shapes cannot unify the head is cut from the matcher instead.

use std::collections::BTreeMap;

use crate::ast::Expression;
use crate::error::CompileResult;
use crate::plan::{Operator, OperatorId, OperatorKind, Renaming, RuleFilter};
use crate::rewrite::context::RewriteContext;
use crate::rewrite::pattern::{match_one, single_successor, Matched};
use crate::rewrite::rule::RewriteRule;
use crate::types::{Item, Literal, VarSet, Variable};

/// Outcome of unifying a head with a body pattern
#[derive(Debug, Default, PartialEq)]
struct Specialization {
    /// Conditions on head variables
    equalities: Vec<(Item, Item)>,
    /// Body variable := head variable
    renaming: BTreeMap<Variable, Variable>,
    /// Body variable := head constant
    constants: Vec<(Variable, Literal)>,
}

impl Specialization {
    /// Unify head and body items position by position; `None` when some
    /// position can never match
    fn unify<'x>(pairs: impl Iterator<Item = (&'x Item, &'x Item)>) -> Option<Self> {
        let mut equalities = Vec::new();
        let mut assigned: BTreeMap<Variable, Item> = BTreeMap::new();
        for (head, body) in pairs {
            match body {
                Item::Lit(constant) => match head {
                    Item::Lit(value) if value != constant => return None,
                    Item::Lit(_) => {}
                    Item::Var(_) => equalities.push((head.clone(), body.clone())),
                },
                Item::Var(variable) => match assigned.get(variable) {
                    Some(Item::Lit(a)) if matches!(head, Item::Lit(b) if a != b) => return None,
                    Some(previous) if previous == head => {}
                    Some(previous) => equalities.push((previous.clone(), head.clone())),
                    None => {
                        assigned.insert(variable.clone(), head.clone());
                    }
                },
            }
        }

        let mut renaming = BTreeMap::new();
        let mut constants = Vec::new();
        for (variable, head) in assigned {
            match head {
                Item::Var(source) => {
                    renaming.insert(variable, source);
                }
                Item::Lit(value) => constants.push((variable, value)),
            }
        }
        Some(Self {
            equalities,
            renaming,
            constants,
        })
    }
}

/// Matcher `start` plus the single-consumer head feeding it, if any
fn check_head(
    ctx: &RewriteContext<'_>,
    start: OperatorId,
    matcher: OperatorKind,
    head: OperatorKind,
) -> Option<Matched> {
    let graph = ctx.graph();
    if !match_one(graph, start, matcher) {
        return None;
    }
    let inputs = graph.inputs(start);
    if inputs.is_empty() {
        // nothing can ever be derived for this matcher
        return Some(Matched::new(start));
    }
    inputs
        .iter()
        .find(|input| {
            match_one(graph, input.source, head) && single_successor(graph, input.source) == Some(start)
        })
        .map(|input| Matched::new(start).bind("head", input.source))
}

fn specialize(
    ctx: &mut RewriteContext<'_>,
    matched: &Matched,
    head_vars: VarSet,
    specialization: Option<Specialization>,
) -> CompileResult<()> {
    let matcher = matched.root;
    let Some(head) = matched.get("head") else {
        ctx.remove_cascade(matcher)?;
        return Ok(());
    };
    let link_feedback = ctx
        .graph()
        .succeeding(head)
        .iter()
        .any(|edge| edge.target == matcher && edge.feedback);

    if let Some(specialization) = specialization {
        let inputs = ctx.graph().inputs(head);
        let mut tail = ctx.add(Operator::Projection(head_vars));
        for input in &inputs {
            ctx.connect_edge(input.source, tail, 0, input.feedback)?;
        }
        if !specialization.equalities.is_empty() {
            tail = chain(
                ctx,
                tail,
                Operator::RuleFilter(RuleFilter {
                    equalities: specialization.equalities,
                }),
            )?;
        }
        let body_vars: VarSet = specialization.renaming.keys().cloned().collect();
        if specialization.renaming.iter().any(|(t, s)| t != s) {
            tail = chain(
                ctx,
                tail,
                Operator::ReplaceVar(Renaming::new(specialization.renaming)),
            )?;
        }
        tail = chain(ctx, tail, Operator::Projection(body_vars))?;
        for (variable, value) in specialization.constants {
            tail = chain(ctx, tail, Operator::bind(variable, Expression::constant(value)))?;
        }
        let outputs = ctx.graph().succeeding(matcher).to_vec();
        for output in outputs {
            ctx.connect_edge(tail, output.target, output.operand, output.feedback || link_feedback)?;
        }
    } else {
        log::trace!("head {} cannot match {}; pruned", head, matcher);
    }

    ctx.disconnect(head, matcher)?;
    ctx.remove_cascade(head)?;
    if ctx.graph().inputs(matcher).is_empty() {
        ctx.remove_cascade(matcher)?;
    }
    Ok(())
}

fn chain(ctx: &mut RewriteContext<'_>, tail: OperatorId, operator: Operator) -> CompileResult<OperatorId> {
    let next = ctx.add(operator);
    ctx.connect(tail, next, 0)?;
    Ok(next)
}

/// Specialize a Generate against the single triple matcher it feeds
#[derive(Debug, Default)]
pub struct ReplaceGeneratePat;

impl RewriteRule for ReplaceGeneratePat {
    fn name(&self) -> &'static str {
        "ReplaceGeneratePat"
    }

    fn start_kind(&self) -> OperatorKind {
        OperatorKind::TriplePatternMatch
    }

    fn check(&self, ctx: &RewriteContext<'_>, start: OperatorId) -> Option<Matched> {
        check_head(
            ctx,
            start,
            OperatorKind::TriplePatternMatch,
            OperatorKind::Generate,
        )
    }

    fn replace(&self, ctx: &mut RewriteContext<'_>, matched: Matched) -> CompileResult<()> {
        let Some(head) = matched.get("head") else {
            return specialize(ctx, &matched, VarSet::new(), None);
        };
        let (Operator::Generate(generated), Operator::TriplePatternMatch(pattern)) =
            (ctx.operator(head)?, ctx.operator(matched.root)?)
        else {
            return ctx.fail(self.name(), "expected a Generate feeding a triple matcher");
        };
        let head_vars = generated.variables();
        let specialization =
            Specialization::unify(generated.items().into_iter().zip(pattern.items()));
        specialize(ctx, &matched, head_vars, specialization)
    }
}

/// Specialize a ConstructPredicate against the single predicate matcher it feeds
#[derive(Debug, Default)]
pub struct GeneratePatConstructPredicate;

impl RewriteRule for GeneratePatConstructPredicate {
    fn name(&self) -> &'static str {
        "GeneratePatConstructPredicate"
    }

    fn start_kind(&self) -> OperatorKind {
        OperatorKind::PredicatePattern
    }

    fn check(&self, ctx: &RewriteContext<'_>, start: OperatorId) -> Option<Matched> {
        check_head(
            ctx,
            start,
            OperatorKind::PredicatePattern,
            OperatorKind::ConstructPredicate,
        )
    }

    fn replace(&self, ctx: &mut RewriteContext<'_>, matched: Matched) -> CompileResult<()> {
        let Some(head) = matched.get("head") else {
            return specialize(ctx, &matched, VarSet::new(), None);
        };
        let (Operator::ConstructPredicate(derived), Operator::PredicatePattern(atom)) =
            (ctx.operator(head)?, ctx.operator(matched.root)?)
        else {
            return ctx.fail(self.name(), "expected a ConstructPredicate feeding a predicate matcher");
        };
        let head_vars: VarSet = derived
            .arguments
            .iter()
            .filter_map(|a| a.as_var().cloned())
            .collect();
        let specialization = if derived.name == atom.name && derived.arguments.len() == atom.arguments.len() {
            Specialization::unify(derived.arguments.iter().zip(atom.arguments.iter()))
        } else {
            None
        };
        specialize(ctx, &matched, head_vars, specialization)
    }
}
