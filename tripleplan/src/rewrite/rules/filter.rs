// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Filter specialization and filter push-down

use crate::ast::{self, Expression};
use crate::error::CompileResult;
use crate::plan::{Input, Operator, OperatorGraph, OperatorId, OperatorKind, RuleFilter};
use crate::rewrite::context::RewriteContext;
use crate::rewrite::pattern::{match_one, single_input, single_successor, Matched};
use crate::rewrite::rule::RewriteRule;
use crate::types::{Item, VarSet};

/// Turn a filter made only of term equalities into a RuleFilter
#[derive(Debug, Default)]
pub struct ReplaceFilterWithRuleFilter;

impl ReplaceFilterWithRuleFilter {
    /// Equalities equivalent to `expression`, if it is a conjunction of
    /// `sameTerm` tests and `=` comparisons against an IRI
    fn equalities(expression: &Expression) -> Option<Vec<(Item, Item)>> {
        match expression {
            Expression::Binary(b) => match b.operator {
                ast::Operator::And => {
                    let mut left = Self::equalities(&b.left)?;
                    left.extend(Self::equalities(&b.right)?);
                    Some(left)
                }
                ast::Operator::SameTerm => Some(vec![(term(&b.left)?, term(&b.right)?)]),
                ast::Operator::Equal => {
                    let (left, right) = (term(&b.left)?, term(&b.right)?);
                    let is_iri = |item: &Item| item.as_literal().is_some_and(|l| l.is_iri());
                    if is_iri(&left) || is_iri(&right) {
                        Some(vec![(left, right)])
                    } else {
                        None
                    }
                }
                _ => None,
            },
            Expression::FunctionCall(call)
                if call.name.eq_ignore_ascii_case("sameTerm") && call.arguments.len() == 2 =>
            {
                Some(vec![(term(&call.arguments[0])?, term(&call.arguments[1])?)])
            }
            _ => None,
        }
    }
}

fn term(expression: &Expression) -> Option<Item> {
    match expression {
        Expression::Variable(v) => Some(Item::Var(v.clone())),
        Expression::Constant(l) => Some(Item::Lit(l.clone())),
        _ => None,
    }
}

impl RewriteRule for ReplaceFilterWithRuleFilter {
    fn name(&self) -> &'static str {
        "ReplaceFilterWithRuleFilter"
    }

    fn start_kind(&self) -> OperatorKind {
        OperatorKind::Filter
    }

    fn check(&self, ctx: &RewriteContext<'_>, start: OperatorId) -> Option<Matched> {
        let Operator::Filter(filter) = ctx.operator(start).ok()? else {
            return None;
        };
        if !filter.exists.is_empty() {
            return None;
        }
        Self::equalities(&filter.expression).map(|_| Matched::new(start))
    }

    fn replace(&self, ctx: &mut RewriteContext<'_>, matched: Matched) -> CompileResult<()> {
        let equalities = match ctx.operator(matched.root)? {
            Operator::Filter(filter) => Self::equalities(&filter.expression),
            _ => None,
        };
        let Some(equalities) = equalities else {
            return ctx.fail(self.name(), "filter is not a conjunction of equalities");
        };
        ctx.replace_operator(matched.root, Operator::RuleFilter(RuleFilter { equalities }))
    }
}

/// Where a filter above `below` can be moved to, if anywhere
fn push_targets(graph: &OperatorGraph, below: OperatorId, vars: &VarSet) -> Option<Vec<OperatorId>> {
    let inputs = graph.inputs(below);
    let mut sources: Vec<OperatorId> = inputs.iter().map(|i| i.source).collect();
    sources.sort();
    sources.dedup();
    if inputs.is_empty() || sources.len() != inputs.len() {
        return None;
    }
    let movable = |input: &Input| !input.feedback && single_successor(graph, input.source) == Some(below);

    let targets: Vec<OperatorId> = match graph.operator(below).ok()? {
        Operator::Join => graph
            .operand_groups(below)
            .into_values()
            .filter(|group| group.iter().all(movable))
            .filter(|group| {
                let mut members = group.iter().filter_map(|i| graph.node(i.source).ok());
                let Some(first) = members.next() else {
                    return false;
                };
                let bound = members.fold(first.intersection.clone(), |acc, n| {
                    acc.intersection(&n.intersection).cloned().collect()
                });
                vars.is_subset(&bound)
            })
            .flat_map(|group| group.into_iter().map(|i| i.source))
            .collect(),
        Operator::Union => {
            if !inputs.iter().all(movable) {
                return None;
            }
            sources
        }
        Operator::Optional => {
            let outer: Vec<&Input> = inputs.iter().filter(|i| i.operand == 0).collect();
            if outer.is_empty() || !outer.iter().all(|i| movable(*i)) {
                return None;
            }
            let mut members = outer.iter().filter_map(|i| graph.node(i.source).ok());
            let first = members.next()?;
            let certainly_bound: VarSet = members.fold(first.intersection.clone(), |acc, n| {
                acc.intersection(&n.intersection).cloned().collect()
            });
            if !vars.is_subset(&certainly_bound) {
                return None;
            }
            outer.iter().map(|i| i.source).collect()
        }
        _ => return None,
    };
    if targets.is_empty() {
        None
    } else {
        Some(targets)
    }
}

fn check_push(ctx: &RewriteContext<'_>, start: OperatorId, kind: OperatorKind) -> Option<Matched> {
    let graph = ctx.graph();
    if !match_one(graph, start, kind) {
        return None;
    }
    let operator = graph.operator(start).ok()?;
    if let Operator::Filter(filter) = operator {
        if !filter.exists.is_empty() {
            return None;
        }
    }
    if graph.inputs(start).len() > 1 {
        return check_distribute(graph, start);
    }
    let input = single_input(graph, start)?;
    if input.feedback || single_successor(graph, input.source) != Some(start) {
        return None;
    }
    let targets = push_targets(graph, input.source, &operator.referenced_variables())?;
    Some(
        Matched::new(start)
            .bind("below", input.source)
            .bind_all("target", targets),
    )
}

/// A filter reading an operand group (a spliced Union) as its only operand;
/// every member gets its own copy
fn check_distribute(graph: &OperatorGraph, start: OperatorId) -> Option<Matched> {
    let inputs = graph.inputs(start);
    if inputs.iter().any(|i| i.feedback || i.operand != 0) {
        return None;
    }
    let mut sources: Vec<OperatorId> = inputs.iter().map(|i| i.source).collect();
    sources.sort();
    sources.dedup();
    if sources.len() != inputs.len() {
        return None;
    }
    Some(Matched::new(start).bind_all("member", inputs.iter().map(|i| i.source)))
}

/// Replace the filter by one copy per group member, all feeding the
/// filter's consumers
fn distribute(ctx: &mut RewriteContext<'_>, matched: &Matched) -> CompileResult<()> {
    let filter = matched.root;
    let operator = ctx.operator(filter)?.clone();
    let outputs = ctx.graph().succeeding(filter).to_vec();
    ctx.remove(filter)?;
    for member in matched.all("member") {
        let copy = ctx.add(operator.clone());
        ctx.connect(*member, copy, 0)?;
        for output in &outputs {
            ctx.connect_edge(copy, output.target, output.operand, output.feedback)?;
        }
    }
    log::trace!(
        "distributed {} over {} union members",
        operator.label(),
        matched.all("member").len()
    );
    Ok(())
}

/// Copy the filter onto every target edge, then splice the original out
fn push(ctx: &mut RewriteContext<'_>, matched: Matched) -> CompileResult<()> {
    if !matched.all("member").is_empty() {
        return distribute(ctx, &matched);
    }
    let filter = matched.root;
    let Some(below) = matched.get("below") else {
        return ctx.fail("push", "match without the operator below the filter");
    };
    let operator = ctx.operator(filter)?.clone();
    let inputs: Vec<Input> = ctx
        .graph()
        .inputs(below)
        .into_iter()
        .filter(|i| matched.all("target").contains(&i.source))
        .collect();
    for input in inputs {
        ctx.insert_between(input, below, operator.clone())?;
    }
    let outputs = ctx.graph().succeeding(filter).to_vec();
    ctx.remove(filter)?;
    for output in outputs {
        ctx.connect_edge(below, output.target, output.operand, output.feedback)?;
    }
    log::trace!("pushed {} below {}", operator.label(), below);
    Ok(())
}

/// Move a general filter below a Join, Union or Optional, or split it over
/// the members of an operand group
#[derive(Debug, Default)]
pub struct PushFilter;

impl RewriteRule for PushFilter {
    fn name(&self) -> &'static str {
        "PushFilter"
    }

    fn start_kind(&self) -> OperatorKind {
        OperatorKind::Filter
    }

    fn check(&self, ctx: &RewriteContext<'_>, start: OperatorId) -> Option<Matched> {
        check_push(ctx, start, OperatorKind::Filter)
    }

    fn replace(&self, ctx: &mut RewriteContext<'_>, matched: Matched) -> CompileResult<()> {
        push(ctx, matched)
    }
}

/// Move a RuleFilter below a Join, Union or Optional, or split it over the
/// members of an operand group
#[derive(Debug, Default)]
pub struct PushRuleFilter;

impl RewriteRule for PushRuleFilter {
    fn name(&self) -> &'static str {
        "PushRuleFilter"
    }

    fn start_kind(&self) -> OperatorKind {
        OperatorKind::RuleFilter
    }

    fn check(&self, ctx: &RewriteContext<'_>, start: OperatorId) -> Option<Matched> {
        check_push(ctx, start, OperatorKind::RuleFilter)
    }

    fn replace(&self, ctx: &mut RewriteContext<'_>, matched: Matched) -> CompileResult<()> {
        push(ctx, matched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Literal, Variable};

    #[test]
    fn test_equalities_from_conjunction() {
        let expression = Expression::and(
            Expression::call("sameTerm", vec![Expression::var("a"), Expression::var("b")]),
            Expression::equal(
                Expression::var("c"),
                Expression::constant(Literal::iri("http://ex/c")),
            ),
        );
        let eqs = ReplaceFilterWithRuleFilter::equalities(&expression).unwrap();
        assert_eq!(eqs.len(), 2);
        assert_eq!(eqs[0], (Item::var("a"), Item::var("b")));
    }

    #[test]
    fn test_value_equality_is_not_a_term_equality() {
        let expression = Expression::equal(Expression::var("a"), Expression::var("b"));
        assert!(ReplaceFilterWithRuleFilter::equalities(&expression).is_none());
        let numeric = Expression::equal(Expression::var("a"), Expression::constant(Literal::integer(1)));
        assert!(ReplaceFilterWithRuleFilter::equalities(&numeric).is_none());
    }

    #[test]
    fn test_rule_filter_pushed_into_covering_join_operand() {
        let mut graph = OperatorGraph::new();
        let root = graph.root();
        let left = graph.add(Operator::Bind {
            variable: Variable::new("a"),
            expression: Expression::constant(Literal::iri("http://ex/a")),
        });
        let right = graph.add(Operator::Bind {
            variable: Variable::new("b"),
            expression: Expression::constant(Literal::iri("http://ex/b")),
        });
        let join = graph.add(Operator::Join);
        let filter = graph.add(Operator::rule_filter(Item::var("a"), Item::iri("http://ex/a")));
        let result = graph.add(Operator::Result(crate::plan::ResultForm::Select(vec![])));
        graph.connect(root, left, 0).unwrap();
        graph.connect(root, right, 0).unwrap();
        graph.connect(left, join, 0).unwrap();
        graph.connect(right, join, 1).unwrap();
        graph.connect(join, filter, 0).unwrap();
        graph.connect(filter, result, 0).unwrap();
        graph.update_variables().unwrap();

        let mut ctx = RewriteContext::new(&mut graph, None);
        let matched = PushRuleFilter.check(&ctx, filter).unwrap();
        assert_eq!(matched.all("target"), &[left]);
        PushRuleFilter.replace(&mut ctx, matched).unwrap();
        ctx.verify().unwrap();

        assert!(!graph.contains(filter));
        assert_eq!(graph.operand(result, 0), vec![join]);
        let pushed = graph.operand(join, 0);
        assert_eq!(pushed.len(), 1);
        assert_eq!(graph.kind(pushed[0]), Some(OperatorKind::RuleFilter));
        assert_eq!(graph.operand(pushed[0], 0), vec![left]);
    }

    #[test]
    fn test_rule_filter_split_over_operand_group() {
        let mut graph = OperatorGraph::new();
        let root = graph.root();
        let left = graph.add(Operator::bind(
            Variable::new("a"),
            Expression::constant(Literal::iri("http://ex/a")),
        ));
        let right = graph.add(Operator::bind(
            Variable::new("a"),
            Expression::constant(Literal::iri("http://ex/b")),
        ));
        let filter = graph.add(Operator::rule_filter(Item::var("a"), Item::iri("http://ex/a")));
        let result = graph.add(Operator::Result(crate::plan::ResultForm::Select(vec![])));
        graph.connect(root, left, 0).unwrap();
        graph.connect(root, right, 0).unwrap();
        graph.connect(left, filter, 0).unwrap();
        graph.connect(right, filter, 0).unwrap();
        graph.connect(filter, result, 0).unwrap();
        graph.update_variables().unwrap();

        let mut ctx = RewriteContext::new(&mut graph, None);
        let matched = PushRuleFilter.check(&ctx, filter).unwrap();
        assert_eq!(matched.all("member"), &[left, right]);
        PushRuleFilter.replace(&mut ctx, matched).unwrap();
        ctx.verify().unwrap();

        assert!(!graph.contains(filter));
        let copies = graph.operand(result, 0);
        assert_eq!(copies.len(), 2);
        for (copy, source) in copies.iter().zip([left, right]) {
            assert_eq!(graph.kind(*copy), Some(OperatorKind::RuleFilter));
            assert_eq!(graph.operand(*copy, 0), vec![source]);
        }
        assert_eq!(graph.count(OperatorKind::RuleFilter), 2);
    }
}
