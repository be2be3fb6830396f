// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Rules that delete operators contributing nothing to a result

use crate::error::CompileResult;
use crate::plan::{Input, Operator, OperatorId, OperatorKind, ResultForm};
use crate::rewrite::context::RewriteContext;
use crate::rewrite::pattern::{match_one, Matched};
use crate::rewrite::rule::RewriteRule;

/// Delete a scan the dataset proves empty, with everything it starves
#[derive(Debug, Default)]
pub struct RemoveEmptyIndex;

impl RewriteRule for RemoveEmptyIndex {
    fn name(&self) -> &'static str {
        "RemoveEmptyIndex"
    }

    fn start_kind(&self) -> OperatorKind {
        OperatorKind::IndexScan
    }

    fn check(&self, ctx: &RewriteContext<'_>, start: OperatorId) -> Option<Matched> {
        let scan = ctx.operator(start).ok()?.as_index_scan()?;
        if ctx.probe_empty(scan) {
            Some(Matched::new(start))
        } else {
            None
        }
    }

    fn replace(&self, ctx: &mut RewriteContext<'_>, matched: Matched) -> CompileResult<()> {
        ctx.remove_cascade(matched.root)?;
        Ok(())
    }
}

/// Drop a Construct with an empty template or without any consumer
#[derive(Debug, Default)]
pub struct RemoveUnnecessaryConstruct;

impl RewriteRule for RemoveUnnecessaryConstruct {
    fn name(&self) -> &'static str {
        "RemoveUnnecessaryConstruct"
    }

    fn start_kind(&self) -> OperatorKind {
        OperatorKind::Construct
    }

    fn check(&self, ctx: &RewriteContext<'_>, start: OperatorId) -> Option<Matched> {
        let Operator::Construct(template) = ctx.operator(start).ok()? else {
            return None;
        };
        if template.is_empty() || ctx.graph().succeeding(start).is_empty() {
            Some(Matched::new(start))
        } else {
            None
        }
    }

    fn replace(&self, ctx: &mut RewriteContext<'_>, matched: Matched) -> CompileResult<()> {
        ctx.remove_cascade(matched.root)?;
        Ok(())
    }
}

/// Which derived facts a Materialize result keeps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Derived {
    Triples,
    Predicates,
}

/// Result operators fed by `id` that discard what it derives
fn discarding_results(ctx: &RewriteContext<'_>, id: OperatorId, derived: Derived) -> Vec<OperatorId> {
    ctx.graph()
        .succeeding(id)
        .iter()
        .filter(|edge| {
            matches!(
                ctx.operator(edge.target),
                Ok(Operator::Result(ResultForm::Materialize { triples, predicates }))
                    if !match derived {
                        Derived::Triples => *triples,
                        Derived::Predicates => *predicates,
                    }
            )
        })
        .map(|edge| edge.target)
        .collect()
}

fn check_unnecessary(
    ctx: &RewriteContext<'_>,
    start: OperatorId,
    derived: Derived,
) -> Option<Matched> {
    let kind = match derived {
        Derived::Triples => OperatorKind::Generate,
        Derived::Predicates => OperatorKind::ConstructPredicate,
    };
    if !match_one(ctx.graph(), start, kind) {
        return None;
    }
    let discarding = discarding_results(ctx, start, derived);
    if discarding.is_empty() && !ctx.graph().succeeding(start).is_empty() {
        return None;
    }
    Some(Matched::new(start).bind_all("discarding", discarding))
}

fn replace_unnecessary(ctx: &mut RewriteContext<'_>, matched: Matched) -> CompileResult<()> {
    for result in matched.all("discarding") {
        ctx.disconnect(matched.root, *result)?;
    }
    if ctx.graph().succeeding(matched.root).is_empty() {
        ctx.remove_cascade(matched.root)?;
    }
    Ok(())
}

/// Cut a predicate head from a result that does not collect predicates
#[derive(Debug, Default)]
pub struct RemoveUnnecessaryPredicate;

impl RewriteRule for RemoveUnnecessaryPredicate {
    fn name(&self) -> &'static str {
        "RemoveUnnecessaryPredicate"
    }

    fn start_kind(&self) -> OperatorKind {
        OperatorKind::ConstructPredicate
    }

    fn check(&self, ctx: &RewriteContext<'_>, start: OperatorId) -> Option<Matched> {
        check_unnecessary(ctx, start, Derived::Predicates)
    }

    fn replace(&self, ctx: &mut RewriteContext<'_>, matched: Matched) -> CompileResult<()> {
        replace_unnecessary(ctx, matched)
    }
}

/// Cut a triple head from a result that does not collect triples
#[derive(Debug, Default)]
pub struct RemoveUnnecessaryGenerate;

impl RewriteRule for RemoveUnnecessaryGenerate {
    fn name(&self) -> &'static str {
        "RemoveUnnecessaryGenerate"
    }

    fn start_kind(&self) -> OperatorKind {
        OperatorKind::Generate
    }

    fn check(&self, ctx: &RewriteContext<'_>, start: OperatorId) -> Option<Matched> {
        check_unnecessary(ctx, start, Derived::Triples)
    }

    fn replace(&self, ctx: &mut RewriteContext<'_>, matched: Matched) -> CompileResult<()> {
        replace_unnecessary(ctx, matched)
    }
}

/// Splice out a Union by wiring its inputs straight to its consumers
///
/// Operand groups already read their members as a bag union, so every
/// consumer sees the same rows. An edge becomes a feedback edge when either
/// half of the spliced path was one.
#[derive(Debug, Default)]
pub struct RemoveUnion;

impl RewriteRule for RemoveUnion {
    fn name(&self) -> &'static str {
        "RemoveUnion"
    }

    fn start_kind(&self) -> OperatorKind {
        OperatorKind::Union
    }

    fn check(&self, ctx: &RewriteContext<'_>, start: OperatorId) -> Option<Matched> {
        let graph = ctx.graph();
        let inputs = graph.inputs(start);
        if inputs.is_empty() || graph.succeeding(start).is_empty() {
            return Some(Matched::new(start));
        }
        let mut sources: Vec<OperatorId> = inputs.iter().map(|i| i.source).collect();
        sources.sort();
        sources.dedup();
        if sources.len() != inputs.len() {
            return None;
        }
        let consumers_are_inputs = graph
            .succeeding(start)
            .iter()
            .any(|edge| sources.contains(&edge.target) || edge.target == start);
        if consumers_are_inputs {
            return None;
        }
        Some(Matched::new(start).bind_all("input", sources))
    }

    fn replace(&self, ctx: &mut RewriteContext<'_>, matched: Matched) -> CompileResult<()> {
        let union = matched.root;
        if matched.all("input").is_empty() {
            ctx.remove_cascade(union)?;
            return Ok(());
        }
        let inputs: Vec<Input> = ctx.graph().inputs(union);
        let outputs = ctx.graph().succeeding(union).to_vec();
        for input in &inputs {
            for output in &outputs {
                ctx.connect_edge(
                    input.source,
                    output.target,
                    output.operand,
                    input.feedback || output.feedback,
                )?;
            }
        }
        ctx.remove(union)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::OperatorGraph;
    use crate::types::Variable;

    #[test]
    fn test_remove_union_rewires_with_feedback_flag() {
        let mut graph = OperatorGraph::new();
        let root = graph.root();
        let base = graph.add(Operator::EmptyIndexScan { graph: None });
        let union = graph.add(Operator::Union);
        let distinct = graph.add(Operator::Distinct);
        let step = graph.add(Operator::projection(vec![Variable::new("s")]));
        graph.connect(root, base, 0).unwrap();
        graph.connect(base, union, 0).unwrap();
        graph.connect(union, distinct, 0).unwrap();
        graph.connect(distinct, step, 0).unwrap();
        graph.connect_feedback(step, union, 1).unwrap();

        let mut ctx = RewriteContext::new(&mut graph, None);
        let matched = RemoveUnion.check(&ctx, union).unwrap();
        RemoveUnion.replace(&mut ctx, matched).unwrap();
        ctx.verify().unwrap();

        assert!(!graph.contains(union));
        let inputs = graph.inputs(distinct);
        assert_eq!(inputs.len(), 2);
        assert!(inputs.iter().any(|i| i.source == base && !i.feedback));
        assert!(inputs.iter().any(|i| i.source == step && i.feedback));
        graph.detect_cycles().unwrap();
    }

    #[test]
    fn test_generate_cut_from_result_without_triples() {
        let mut graph = OperatorGraph::new();
        let result = graph.add(Operator::Result(ResultForm::Materialize {
            triples: false,
            predicates: true,
        }));
        let head = graph.add(Operator::Generate(crate::types::TriplePattern::new(
            crate::types::Item::var("s"),
            crate::types::Item::iri("http://ex/p"),
            crate::types::Item::var("o"),
        )));
        let root = graph.root();
        graph.connect(root, head, 0).unwrap();
        graph.connect(head, result, 0).unwrap();

        let mut ctx = RewriteContext::new(&mut graph, None);
        let matched = RemoveUnnecessaryGenerate.check(&ctx, head).unwrap();
        RemoveUnnecessaryGenerate.replace(&mut ctx, matched).unwrap();
        assert!(!ctx.graph().contains(head));
        assert!(ctx.graph().contains(result));
    }
}
