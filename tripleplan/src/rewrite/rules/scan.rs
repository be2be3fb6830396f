// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Rules that fold work into index scans

use std::collections::BTreeMap;

use crate::error::CompileResult;
use crate::plan::{IndexScan, Operator, OperatorId, OperatorKind};
use crate::rewrite::context::RewriteContext;
use crate::rewrite::pattern::{match_chain_while, single_input, single_successor, Direction, Matched};
use crate::rewrite::rule::RewriteRule;
use crate::types::{VarSet, Variable};

/// Replace a Join over in-memory scans of one dataset by a single scan
/// holding every pattern
#[derive(Debug, Default)]
pub struct MergeMemoryIndexes;

impl RewriteRule for MergeMemoryIndexes {
    fn name(&self) -> &'static str {
        "MergeMemoryIndexes"
    }

    fn start_kind(&self) -> OperatorKind {
        OperatorKind::Join
    }

    fn check(&self, ctx: &RewriteContext<'_>, start: OperatorId) -> Option<Matched> {
        let graph = ctx.graph();
        let groups = graph.operand_groups(start);
        if groups.len() < 2 || graph.succeeding(start).is_empty() {
            return None;
        }
        let mut first: Option<&IndexScan> = None;
        let mut scans = Vec::with_capacity(groups.len());
        for group in groups.values() {
            let [input] = group.as_slice() else {
                return None;
            };
            let scan = graph.operator(input.source).ok()?.as_index_scan()?;
            if input.feedback || !scan.source.in_memory {
                return None;
            }
            if single_successor(graph, input.source) != Some(start) {
                return None;
            }
            let fed_by_root = graph
                .inputs(input.source)
                .iter()
                .all(|i| i.source == graph.root() && !i.feedback);
            if !fed_by_root {
                return None;
            }
            match first {
                None => first = Some(scan),
                Some(f) if f.source != scan.source || f.graph != scan.graph => return None,
                Some(_) => {}
            }
            scans.push(input.source);
        }
        Some(Matched::new(start).bind_all("scan", scans))
    }

    fn replace(&self, ctx: &mut RewriteContext<'_>, matched: Matched) -> CompileResult<()> {
        let join = matched.root;
        let mut merged: Option<IndexScan> = None;
        for id in matched.all("scan") {
            let Some(scan) = ctx.operator(*id)?.as_index_scan() else {
                return ctx.fail(self.name(), format!("{} is not an index scan", id));
            };
            match merged.as_mut() {
                None => merged = Some(scan.clone()),
                Some(m) => m.patterns.extend(scan.patterns.iter().cloned()),
            }
        }
        let Some(merged) = merged else {
            return ctx.fail(self.name(), "join without operands");
        };
        log::trace!(
            "merging {} scans under {} into one {}-pattern scan",
            matched.all("scan").len(),
            join,
            merged.patterns.len()
        );

        let scan = ctx.add(Operator::IndexScan(merged));
        let root = ctx.graph().root();
        ctx.connect(root, scan, 0)?;
        ctx.redirect_outputs(join, scan)?;
        ctx.remove(join)?;
        for id in matched.all("scan") {
            ctx.remove(*id)?;
        }
        Ok(())
    }
}

/// Rename the variables of the scans under a ReplaceVar instead of renaming
/// their rows
#[derive(Debug, Default)]
pub struct ReplaceVarUnderIndex;

impl ReplaceVarUnderIndex {
    /// Source -> target map, if every source has exactly one target
    fn inverse(pairs: &BTreeMap<Variable, Variable>) -> Option<BTreeMap<Variable, Variable>> {
        let mut inverse = BTreeMap::new();
        for (target, source) in pairs {
            if inverse.insert(source.clone(), target.clone()).is_some() {
                return None;
            }
        }
        Some(inverse)
    }
}

impl RewriteRule for ReplaceVarUnderIndex {
    fn name(&self) -> &'static str {
        "ReplaceVarUnderIndex"
    }

    fn start_kind(&self) -> OperatorKind {
        OperatorKind::ReplaceVar
    }

    fn check(&self, ctx: &RewriteContext<'_>, start: OperatorId) -> Option<Matched> {
        let graph = ctx.graph();
        let Operator::ReplaceVar(renaming) = graph.operator(start).ok()? else {
            return None;
        };
        let inverse = Self::inverse(&renaming.pairs)?;
        let inputs = graph.inputs(start);
        if inputs.is_empty() || graph.succeeding(start).is_empty() {
            return None;
        }
        for input in &inputs {
            let scan = graph.operator(input.source).ok()?.as_index_scan()?;
            if input.feedback || single_successor(graph, input.source) != Some(start) {
                return None;
            }
            // a target already bound by the scan would be overwritten
            let untouched: VarSet = scan
                .variables()
                .into_iter()
                .filter(|v| !inverse.contains_key(v))
                .collect();
            if renaming.pairs.keys().any(|t| untouched.contains(t)) {
                return None;
            }
        }
        Some(Matched::new(start).bind_all("scan", inputs.iter().map(|i| i.source)))
    }

    fn replace(&self, ctx: &mut RewriteContext<'_>, matched: Matched) -> CompileResult<()> {
        let replace = matched.root;
        let pairs = match ctx.operator(replace)? {
            Operator::ReplaceVar(renaming) => renaming.pairs.clone(),
            _ => return ctx.fail(self.name(), format!("{} is not a ReplaceVar", replace)),
        };
        let Some(inverse) = Self::inverse(&pairs) else {
            return ctx.fail(self.name(), "renaming is not invertible");
        };
        let outputs = ctx.graph().succeeding(replace).to_vec();
        for id in matched.all("scan") {
            let renamed = match ctx.operator(*id)? {
                Operator::IndexScan(scan) => IndexScan {
                    patterns: scan.patterns.iter().map(|p| p.renamed(&inverse)).collect(),
                    graph: scan.graph.as_ref().map(|g| g.renamed(&inverse)),
                    source: scan.source.clone(),
                },
                _ => return ctx.fail(self.name(), format!("{} is not an index scan", id)),
            };
            ctx.replace_operator(*id, Operator::IndexScan(renamed))?;
            ctx.disconnect(*id, replace)?;
            for output in &outputs {
                ctx.connect_edge(*id, output.target, output.operand, output.feedback)?;
            }
        }
        ctx.remove(replace)
    }
}

/// Strength-reduce a Distinct over a single-scan subtree to an index-backed
/// incremental deduplication
#[derive(Debug, Default)]
pub struct IndexDistinct;

impl RewriteRule for IndexDistinct {
    fn name(&self) -> &'static str {
        "IndexDistinct"
    }

    fn start_kind(&self) -> OperatorKind {
        OperatorKind::Distinct
    }

    fn check(&self, ctx: &RewriteContext<'_>, start: OperatorId) -> Option<Matched> {
        let graph = ctx.graph();
        let input = single_input(graph, start)?;
        if input.feedback {
            return None;
        }
        let (found, skipped) = match_chain_while(graph, start, Direction::Up, |op| {
            matches!(
                op,
                Operator::Projection(_)
                    | Operator::Filter(_)
                    | Operator::RuleFilter(_)
                    | Operator::ReplaceVar(_)
            )
        })?;
        graph.operator(found).ok()?.as_index_scan()?;
        if single_successor(graph, found).is_none() {
            return None;
        }
        Some(Matched::new(start).bind("scan", found).bind_all("skipped", skipped))
    }

    fn replace(&self, ctx: &mut RewriteContext<'_>, matched: Matched) -> CompileResult<()> {
        ctx.replace_operator(matched.root, Operator::IndexDistinct)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{OperatorGraph, ScanSource};
    use crate::types::{Item, TriplePattern};

    fn scan(patterns: Vec<TriplePattern>) -> Operator {
        Operator::IndexScan(IndexScan {
            patterns,
            graph: None,
            source: ScanSource {
                dataset: "test".to_string(),
                in_memory: true,
            },
        })
    }

    fn pattern(s: &str, p: &str, o: &str) -> TriplePattern {
        TriplePattern::new(Item::var(s), Item::iri(p), Item::var(o))
    }

    #[test]
    fn test_replace_var_renames_scan_patterns() {
        let mut graph = OperatorGraph::new();
        let root = graph.root();
        let s = graph.add(scan(vec![pattern("a", "http://ex/p", "b")]));
        let r = graph.add(Operator::replace_var(Variable::new("z"), Variable::new("b")));
        let d = graph.add(Operator::Distinct);
        graph.connect(root, s, 0).unwrap();
        graph.connect(s, r, 0).unwrap();
        graph.connect(r, d, 0).unwrap();

        let mut ctx = RewriteContext::new(&mut graph, None);
        let matched = ReplaceVarUnderIndex.check(&ctx, r).unwrap();
        ReplaceVarUnderIndex.replace(&mut ctx, matched).unwrap();
        ctx.verify().unwrap();

        assert!(!graph.contains(r));
        assert_eq!(graph.operand(d, 0), vec![s]);
        let renamed = graph.operator(s).unwrap().as_index_scan().unwrap();
        assert_eq!(renamed.patterns[0], pattern("a", "http://ex/p", "z"));
    }

    #[test]
    fn test_replace_var_refuses_clashing_target() {
        let mut graph = OperatorGraph::new();
        let root = graph.root();
        let s = graph.add(scan(vec![pattern("a", "http://ex/p", "b")]));
        let r = graph.add(Operator::replace_var(Variable::new("a"), Variable::new("b")));
        let d = graph.add(Operator::Distinct);
        graph.connect(root, s, 0).unwrap();
        graph.connect(s, r, 0).unwrap();
        graph.connect(r, d, 0).unwrap();

        let ctx = RewriteContext::new(&mut graph, None);
        assert!(ReplaceVarUnderIndex.check(&ctx, r).is_none());
    }

    #[test]
    fn test_index_distinct_jumps_over_projection() {
        let mut graph = OperatorGraph::new();
        let root = graph.root();
        let s = graph.add(scan(vec![pattern("a", "http://ex/p", "b")]));
        let p = graph.add(Operator::projection(vec![Variable::new("a")]));
        let d = graph.add(Operator::Distinct);
        graph.connect(root, s, 0).unwrap();
        graph.connect(s, p, 0).unwrap();
        graph.connect(p, d, 0).unwrap();

        let mut ctx = RewriteContext::new(&mut graph, None);
        let matched = IndexDistinct.check(&ctx, d).unwrap();
        assert_eq!(matched.get("scan"), Some(s));
        IndexDistinct.replace(&mut ctx, matched).unwrap();
        assert_eq!(graph.kind(d), Some(OperatorKind::IndexDistinct));
    }
}
