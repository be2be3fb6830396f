// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Property path compilation
//!
//! A path expression between two endpoints compiles into a subgraph whose
//! output operator produces every `(subject, object)` binding that satisfies
//! the path. Sequences are stitched together with interim variables, closures
//! become a loop whose back edge is a feedback edge.

use crate::ast::{Expression, NegatedPredicate, PathExpression};
use crate::compile::collaborators::IndexScanFactory;
use crate::config::CompilerConfig;
use crate::error::{CompileError, CompileResult};
use crate::plan::{Operator, OperatorGraph, OperatorId, RuleFilter};
use crate::types::{Item, TriplePattern, VarSet, Variable};

/// Compiles path expressions into an operator graph under construction
pub struct PathCompiler<'a> {
    graph: &'a mut OperatorGraph,
    factory: &'a dyn IndexScanFactory,
    config: &'a CompilerConfig,
    next_var: &'a mut usize,
    graph_constraint: Option<Item>,
}

impl<'a> PathCompiler<'a> {
    pub fn new(
        graph: &'a mut OperatorGraph,
        factory: &'a dyn IndexScanFactory,
        config: &'a CompilerConfig,
        next_var: &'a mut usize,
        graph_constraint: Option<Item>,
    ) -> Self {
        Self {
            graph,
            factory,
            config,
            next_var,
            graph_constraint,
        }
    }

    /// Compile `subject path object` and return the operator producing its bindings
    pub fn compile(
        &mut self,
        path: &PathExpression,
        subject: &Item,
        object: &Item,
    ) -> CompileResult<OperatorId> {
        match path {
            PathExpression::Predicate(iri) => {
                self.scan(TriplePattern::new(subject.clone(), Item::Lit(iri.clone()), object.clone()))
            }
            PathExpression::Inverse(inner) => self.compile(inner, object, subject),
            PathExpression::Sequence(first, second) => {
                log::trace!("compiling path sequence {} .. {}", subject, object);
                let middle = Item::Var(self.fresh_var());
                let left = self.compile(first, subject, &middle)?;
                let right = self.compile(second, &middle, object)?;
                let join = self.graph.add(Operator::Join);
                self.graph.connect(left, join, 0)?;
                self.graph.connect(right, join, 1)?;
                self.project(join, subject, object)
            }
            PathExpression::Alternative(first, second) => {
                log::trace!("compiling path alternative {} .. {}", subject, object);
                let left = self.compile(first, subject, object)?;
                let right = self.compile(second, subject, object)?;
                let union = self.union(&[left, right])?;
                let projected = self.project(union, subject, object)?;
                self.distinct(projected)
            }
            PathExpression::NegatedSet(members) => self.negated_set(members, subject, object),
            PathExpression::Repeat { path, min, max } => match max {
                Some(max) => self.bounded(path, *min, *max, subject, object),
                None => self.unbounded(path, *min, subject, object),
            },
            PathExpression::OneOrMore(inner) => self.closure(inner, subject, object),
            PathExpression::ZeroOrMore(inner) => {
                let zero = self.zero_length(subject, object)?;
                let more = self.closure(inner, subject, object)?;
                let union = self.union(&[zero, more])?;
                self.distinct(union)
            }
            PathExpression::ZeroOrOne(inner) => {
                let zero = self.zero_length(subject, object)?;
                let one = self.compile(inner, subject, object)?;
                let union = self.union(&[zero, one])?;
                self.distinct(union)
            }
        }
    }

    /// `P{min,max}`
    fn bounded(
        &mut self,
        path: &PathExpression,
        min: u32,
        max: u32,
        subject: &Item,
        object: &Item,
    ) -> CompileResult<OperatorId> {
        if min > max {
            return Err(CompileError::malformed(format!(
                "path repetition {{{},{}}} has a lower bound above its upper bound",
                min, max
            )));
        }
        if max == 0 {
            return self.zero_length(subject, object);
        }
        if min == 0 {
            let zero = self.zero_length(subject, object)?;
            let positive = self.bounded(path, 1, max, subject, object)?;
            let union = self.union(&[zero, positive])?;
            return self.distinct(union);
        }

        log::trace!("compiling path repetition {{{},{}}}", min, max);
        let mut arities = Vec::new();
        for arity in min.max(1)..=max {
            arities.push(self.chain(path, arity, subject, object)?);
        }
        if arities.len() == 1 {
            return Ok(arities[0]);
        }
        let union = self.union(&arities)?;
        self.distinct(union)
    }

    /// `P{min,}`
    fn unbounded(
        &mut self,
        path: &PathExpression,
        min: u32,
        subject: &Item,
        object: &Item,
    ) -> CompileResult<OperatorId> {
        match min {
            0 => self.compile(&PathExpression::ZeroOrMore(Box::new(path.clone())), subject, object),
            1 => self.closure(path, subject, object),
            _ => {
                // min-1 fixed steps followed by one closure
                let join = self.graph.add(Operator::Join);
                let mut from = subject.clone();
                for step in 0..(min - 1) {
                    let to = Item::Var(self.fresh_var());
                    let copy = self.compile(path, &from, &to)?;
                    self.graph.connect(copy, join, step as usize)?;
                    from = to;
                }
                let tail = self.closure(path, &from, object)?;
                self.graph.connect(tail, join, (min - 1) as usize)?;
                let projected = self.project(join, subject, object)?;
                self.distinct(projected)
            }
        }
    }

    /// Exactly `arity` sequential copies of the path
    fn chain(
        &mut self,
        path: &PathExpression,
        arity: u32,
        subject: &Item,
        object: &Item,
    ) -> CompileResult<OperatorId> {
        if arity == 1 {
            return self.compile(path, subject, object);
        }
        let join = self.graph.add(Operator::Join);
        let mut from = subject.clone();
        for step in 0..arity {
            let to = if step + 1 == arity {
                object.clone()
            } else {
                Item::Var(self.fresh_var())
            };
            let copy = self.compile(path, &from, &to)?;
            self.graph.connect(copy, join, step as usize)?;
            from = to;
        }
        self.project(join, subject, object)
    }

    /// Transitive closure `P+`
    fn closure(
        &mut self,
        path: &PathExpression,
        subject: &Item,
        object: &Item,
    ) -> CompileResult<OperatorId> {
        let (Some(s), Some(o)) = (subject.as_var(), object.as_var()) else {
            return self.restricted_closure(path, subject, object);
        };
        if s == o {
            return self.restricted_closure(path, subject, object);
        }

        log::trace!("compiling path closure {} .. {}", subject, object);
        let base = self.compile(path, subject, object)?;
        let union = self.graph.add(Operator::Union);
        self.graph.connect(base, union, 0)?;

        // the loop keeps its duplicate elimination regardless of configuration
        let distinct = self.graph.add(Operator::Distinct);
        self.graph.connect(union, distinct, 0)?;

        let step = self.fresh_var();
        let rename = self.graph.add(Operator::replace_var(step.clone(), o.clone()));
        self.graph.connect(distinct, rename, 0)?;

        let not_equal = self.graph.add(Operator::filter(Expression::not_equal(
            Expression::Variable(s.clone()),
            Expression::Variable(step.clone()),
        )));
        self.graph.connect(rename, not_equal, 0)?;

        let join = self.graph.add(Operator::Join);
        self.graph.connect(not_equal, join, 0)?;
        let copy = self.compile(path, &Item::Var(step), object)?;
        self.graph.connect(copy, join, 1)?;

        let endpoints = self.endpoint_vars(subject, object);
        let projection = self.graph.add(Operator::Projection(endpoints));
        self.graph.connect(join, projection, 0)?;
        self.graph.connect_feedback(projection, union, 1)?;

        Ok(distinct)
    }

    /// Closure with a literal endpoint or identical endpoint variables:
    /// compute the closure over fresh variables and restrict afterwards
    fn restricted_closure(
        &mut self,
        path: &PathExpression,
        subject: &Item,
        object: &Item,
    ) -> CompileResult<OperatorId> {
        let s = match subject {
            Item::Var(v) => v.clone(),
            Item::Lit(_) => self.fresh_var(),
        };
        let o = match object {
            Item::Var(v) if subject.as_var() != Some(v) => v.clone(),
            _ => self.fresh_var(),
        };
        let core = self.closure(path, &Item::Var(s.clone()), &Item::Var(o.clone()))?;

        let mut equalities = Vec::new();
        if let Item::Lit(_) = subject {
            equalities.push((Item::Var(s.clone()), subject.clone()));
        }
        match object {
            Item::Lit(_) => equalities.push((Item::Var(o), object.clone())),
            Item::Var(v) if subject.as_var() == Some(v) => {
                equalities.push((Item::Var(o), Item::Var(s)))
            }
            Item::Var(_) => {}
        }
        let filter = self.graph.add(Operator::RuleFilter(RuleFilter { equalities }));
        self.graph.connect(core, filter, 0)?;
        self.project(filter, subject, object)
    }

    /// `!(p1|...|^q1|...)`
    fn negated_set(
        &mut self,
        members: &[NegatedPredicate],
        subject: &Item,
        object: &Item,
    ) -> CompileResult<OperatorId> {
        let forward: Vec<&NegatedPredicate> = members.iter().filter(|m| !m.inverse).collect();
        let backward: Vec<&NegatedPredicate> = members.iter().filter(|m| m.inverse).collect();

        let mut parts = Vec::new();
        if !forward.is_empty() || backward.is_empty() {
            parts.push(self.negated_part(&forward, subject, object)?);
        }
        if !backward.is_empty() {
            parts.push(self.negated_part(&backward, object, subject)?);
        }
        let output = if parts.len() == 1 {
            parts[0]
        } else {
            self.union(&parts)?
        };
        self.distinct(output)
    }

    /// Triples `from ?any to` whose predicate is none of `excluded`
    fn negated_part(
        &mut self,
        excluded: &[&NegatedPredicate],
        from: &Item,
        to: &Item,
    ) -> CompileResult<OperatorId> {
        let any = self.fresh_var();
        let base = self.scan(TriplePattern::new(from.clone(), Item::Var(any.clone()), to.clone()))?;
        if excluded.is_empty() {
            return self.project(base, from, to);
        }

        let mut removed = Vec::new();
        for member in excluded {
            let scan = self.scan(TriplePattern::new(
                from.clone(),
                Item::Lit(member.iri.clone()),
                to.clone(),
            ))?;
            let bind = self.graph.add(Operator::bind(
                any.clone(),
                Expression::constant(member.iri.clone()),
            ));
            self.graph.connect(scan, bind, 0)?;
            removed.push(bind);
        }
        let removed = if removed.len() == 1 {
            removed[0]
        } else {
            self.union(&removed)?
        };

        let minus = self.graph.add(Operator::Minus);
        self.graph.connect(base, minus, 0)?;
        self.graph.connect(removed, minus, 1)?;
        self.project(minus, from, to)
    }

    /// Zero-length path between the two endpoints
    pub fn zero_length(&mut self, subject: &Item, object: &Item) -> CompileResult<OperatorId> {
        match (subject, object) {
            (Item::Var(s), Item::Var(o)) => {
                // every term in subject or object position relates to itself
                let forward = self.node_scan(s, true)?;
                let backward = self.node_scan(s, false)?;
                let nodes = self.union(&[forward, backward])?;
                let nodes = self.distinct(nodes)?;
                if s == o {
                    return Ok(nodes);
                }
                let bind = self.graph.add(Operator::bind(
                    o.clone(),
                    Expression::Variable(s.clone()),
                ));
                self.graph.connect(nodes, bind, 0)?;
                Ok(bind)
            }
            (Item::Var(v), Item::Lit(l)) | (Item::Lit(l), Item::Var(v)) => {
                let probe = self.probe()?;
                let bind = self
                    .graph
                    .add(Operator::bind(v.clone(), Expression::constant(l.clone())));
                self.graph.connect(probe, bind, 0)?;
                Ok(bind)
            }
            (Item::Lit(_), Item::Lit(_)) => {
                let probe = self.probe()?;
                let check = self
                    .graph
                    .add(Operator::rule_filter(subject.clone(), object.clone()));
                self.graph.connect(probe, check, 0)?;
                Ok(check)
            }
        }
    }

    /// Every term appearing as subject (`forward`) or object, bound to `var`
    fn node_scan(&mut self, var: &Variable, forward: bool) -> CompileResult<OperatorId> {
        let predicate = Item::Var(self.fresh_var());
        let other = Item::Var(self.fresh_var());
        let pattern = if forward {
            TriplePattern::new(Item::Var(var.clone()), predicate, other)
        } else {
            TriplePattern::new(other, predicate, Item::Var(var.clone()))
        };
        let scan = self.scan(pattern)?;
        let endpoint = Item::Var(var.clone());
        self.project(scan, &endpoint, &endpoint)
    }

    fn scan(&mut self, pattern: TriplePattern) -> CompileResult<OperatorId> {
        let operator = self
            .factory
            .create_index_scan(vec![pattern], self.graph_constraint.clone());
        let id = self.graph.add(operator);
        let root = self.graph.root();
        self.graph.connect(root, id, 0)?;
        Ok(id)
    }

    fn probe(&mut self) -> CompileResult<OperatorId> {
        let operator = self
            .factory
            .create_empty_index_scan(self.graph_constraint.clone());
        let id = self.graph.add(operator);
        let root = self.graph.root();
        self.graph.connect(root, id, 0)?;
        Ok(id)
    }

    fn union(&mut self, inputs: &[OperatorId]) -> CompileResult<OperatorId> {
        let union = self.graph.add(Operator::Union);
        for (operand, input) in inputs.iter().enumerate() {
            self.graph.connect(*input, union, operand)?;
        }
        Ok(union)
    }

    fn distinct(&mut self, input: OperatorId) -> CompileResult<OperatorId> {
        if !self.config.distinct_paths {
            return Ok(input);
        }
        let distinct = self.graph.add(Operator::Distinct);
        self.graph.connect(input, distinct, 0)?;
        Ok(distinct)
    }

    fn project(&mut self, input: OperatorId, subject: &Item, object: &Item) -> CompileResult<OperatorId> {
        let endpoints = self.endpoint_vars(subject, object);
        let projection = self.graph.add(Operator::Projection(endpoints));
        self.graph.connect(input, projection, 0)?;
        Ok(projection)
    }

    /// Endpoint variables plus the graph variable, if any
    fn endpoint_vars(&self, subject: &Item, object: &Item) -> VarSet {
        [Some(subject), Some(object), self.graph_constraint.as_ref()]
            .into_iter()
            .flatten()
            .filter_map(|item| item.as_var().cloned())
            .collect()
    }

    fn fresh_var(&mut self) -> Variable {
        let var = Variable::interim(*self.next_var);
        *self.next_var += 1;
        var
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{IndexScan, OperatorKind, ScanSource};

    struct Scans;

    impl IndexScanFactory for Scans {
        fn create_index_scan(&self, patterns: Vec<TriplePattern>, graph: Option<Item>) -> Operator {
            Operator::IndexScan(IndexScan {
                patterns,
                graph,
                source: ScanSource {
                    dataset: "unit".to_string(),
                    in_memory: true,
                },
            })
        }
    }

    fn compile(path: &PathExpression, s: Item, o: Item) -> CompileResult<(OperatorGraph, OperatorId)> {
        let mut graph = OperatorGraph::new();
        let config = CompilerConfig::default();
        let mut next = 0;
        let out = PathCompiler::new(&mut graph, &Scans, &config, &mut next, None).compile(path, &s, &o)?;
        Ok((graph, out))
    }

    #[test]
    fn test_sequence_joins_on_interim_variable() {
        let path = PathExpression::iri("http://ex/a").then(PathExpression::iri("http://ex/b"));
        let (mut graph, out) = compile(&path, Item::var("s"), Item::var("o")).unwrap();
        assert_eq!(graph.count(OperatorKind::Join), 1);
        assert_eq!(graph.count(OperatorKind::IndexScan), 2);
        graph.update_variables().unwrap();
        let vars: Vec<_> = graph.node(out).unwrap().union.iter().cloned().collect();
        assert_eq!(vars, vec![Variable::new("o"), Variable::new("s")]);
    }

    #[test]
    fn test_closure_loop_uses_feedback_edge() {
        let path = PathExpression::iri("http://ex/knows").one_or_more();
        let (graph, out) = compile(&path, Item::var("a"), Item::var("b")).unwrap();
        assert_eq!(graph.kind(out), Some(OperatorKind::Distinct));
        let feedback = graph
            .ids()
            .flat_map(|id| graph.succeeding(id).to_vec())
            .filter(|e| e.feedback)
            .count();
        assert_eq!(feedback, 1);
        graph.detect_cycles().unwrap();
    }

    #[test]
    fn test_inverted_bounds_are_malformed() {
        let path = PathExpression::iri("http://ex/p").repeat(3, Some(2));
        let err = compile(&path, Item::var("s"), Item::var("o")).unwrap_err();
        assert!(matches!(err, CompileError::MalformedQuery(_)));
    }

    #[test]
    fn test_zero_length_between_literals_needs_no_scan() {
        let path = PathExpression::iri("http://ex/p").repeat(0, Some(0));
        let (graph, out) = compile(&path, Item::iri("http://ex/x"), Item::iri("http://ex/x")).unwrap();
        assert_eq!(graph.count(OperatorKind::IndexScan), 0);
        assert_eq!(graph.count(OperatorKind::EmptyIndexScan), 1);
        assert_eq!(graph.kind(out), Some(OperatorKind::RuleFilter));
    }
}
