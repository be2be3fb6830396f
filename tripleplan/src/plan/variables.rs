// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Propagation of per-operator computations in dependency order
//!
//! [`Propagation`] is evaluated for every operator after all of its
//! (non-feedback) producers. [`VariableScope`] uses it to compute the
//! intersection and union variable sets of each operator.

use std::collections::HashMap;

use crate::ast::Expression;
use crate::error::CompileResult;
use crate::plan::graph::{Input, OperatorGraph, OperatorId};
use crate::plan::operators::Operator;
use crate::types::{Item, VarSet};

/// A computation pushed through the graph producers first
pub trait Propagation {
    type Value: Clone;

    /// Compute the value of `id` from the values of its inputs.
    ///
    /// Values arriving over feedback edges are only present when the producer
    /// has already been visited; otherwise the input is skipped.
    fn compute(
        &self,
        graph: &OperatorGraph,
        id: OperatorId,
        inputs: &[(Input, &Self::Value)],
    ) -> Self::Value;
}

impl OperatorGraph {
    /// Run a propagation over the whole graph
    pub fn propagate<P: Propagation>(
        &self,
        propagation: &P,
    ) -> CompileResult<HashMap<OperatorId, P::Value>> {
        let order = self.topological_order()?;
        let mut values: HashMap<OperatorId, P::Value> = HashMap::with_capacity(order.len());
        for id in order {
            let inputs = self.inputs(id);
            let resolved: Vec<(Input, &P::Value)> = inputs
                .iter()
                .filter_map(|input| values.get(&input.source).map(|v| (*input, v)))
                .collect();
            let value = propagation.compute(self, id, &resolved);
            values.insert(id, value);
        }
        Ok(values)
    }

    /// Recompute and store the intersection/union variable sets of every operator
    pub fn update_variables(&mut self) -> CompileResult<()> {
        let values = self.propagate(&VariableScope)?;
        for (id, sets) in values {
            self.set_variables(id, sets.intersection, sets.union)?;
        }
        Ok(())
    }
}

/// Variables bound on every path (`intersection`) and on some path (`union`)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariableSets {
    pub intersection: VarSet,
    pub union: VarSet,
}

impl VariableSets {
    pub fn uniform(vars: VarSet) -> Self {
        Self {
            intersection: vars.clone(),
            union: vars,
        }
    }

    /// Sets of an operand group, read as a bag union of its members
    fn group(members: &[&VariableSets]) -> Self {
        let mut iter = members.iter();
        let Some(first) = iter.next() else {
            return Self::default();
        };
        let mut out = (*first).clone();
        for sets in iter {
            out.intersection = out.intersection.intersection(&sets.intersection).cloned().collect();
            out.union.extend(sets.union.iter().cloned());
        }
        out
    }
}

/// Variable-set contract of every operator kind
pub struct VariableScope;

impl Propagation for VariableScope {
    type Value = VariableSets;

    fn compute(
        &self,
        graph: &OperatorGraph,
        id: OperatorId,
        inputs: &[(Input, &VariableSets)],
    ) -> VariableSets {
        let Ok(operator) = graph.operator(id) else {
            return VariableSets::default();
        };

        // feedback inputs only count when nothing else feeds the operator
        let has_forward = inputs.iter().any(|(i, _)| !i.feedback);
        let inputs: Vec<&(Input, &VariableSets)> = inputs
            .iter()
            .filter(|(i, _)| !has_forward || !i.feedback)
            .collect();

        let mut groups: Vec<(usize, Vec<&VariableSets>)> = Vec::new();
        for &&(input, sets) in &inputs {
            match groups.iter_mut().find(|(op, _)| *op == input.operand) {
                Some((_, members)) => members.push(sets),
                None => groups.push((input.operand, vec![sets])),
            }
        }
        groups.sort_by_key(|(op, _)| *op);
        let group_sets: Vec<(usize, VariableSets)> = groups
            .iter()
            .map(|(op, members)| (*op, VariableSets::group(members)))
            .collect();
        let operand = |index: usize| -> VariableSets {
            group_sets
                .iter()
                .find(|(op, _)| *op == index)
                .map(|(_, s)| s.clone())
                .unwrap_or_default()
        };
        let all: Vec<&VariableSets> = group_sets.iter().map(|(_, s)| s).collect();
        let merged = VariableSets::group(&all);

        match operator {
            Operator::EmptyIndexScan { graph } => {
                VariableSets::uniform(graph.iter().filter_map(Item::as_var).cloned().collect())
            }
            Operator::Root
            | Operator::Construct(_)
            | Operator::Generate(_)
            | Operator::ConstructPredicate(_)
            | Operator::Insert
            | Operator::Delete
            | Operator::Load { .. }
            | Operator::Clear { .. }
            | Operator::Create { .. }
            | Operator::Drop { .. }
            | Operator::Describe(_) => VariableSets::default(),

            Operator::IndexScan(scan) => VariableSets::uniform(scan.variables()),
            Operator::TriplePatternMatch(pattern) => VariableSets::uniform(pattern.variables()),
            Operator::PredicatePattern(atom) => VariableSets::uniform(
                atom.arguments.iter().filter_map(Item::as_var).cloned().collect(),
            ),
            Operator::Service { endpoint, pattern, .. } => {
                let mut vars = pattern.in_scope_variables();
                vars.extend(endpoint.as_var().cloned());
                VariableSets::uniform(vars)
            }

            Operator::Join => {
                let mut out = VariableSets::default();
                for (_, sets) in &group_sets {
                    out.intersection.extend(sets.intersection.iter().cloned());
                    out.union.extend(sets.union.iter().cloned());
                }
                out
            }
            Operator::Optional => {
                let outer = operand(0);
                let inner = operand(1);
                let mut union = outer.union;
                union.extend(inner.union);
                VariableSets {
                    intersection: outer.intersection,
                    union,
                }
            }
            Operator::Minus => operand(0),
            Operator::Union | Operator::Result(_) => merged,

            Operator::Projection(vars) => VariableSets {
                intersection: merged.intersection.intersection(vars).cloned().collect(),
                union: merged.union.intersection(vars).cloned().collect(),
            },
            Operator::Bind { variable, expression } => {
                let mut out = merged;
                // an expression that errors leaves the target unbound
                let total = match expression {
                    Expression::Constant(_) | Expression::Bound(_) => true,
                    Expression::Variable(source) => out.intersection.contains(source),
                    _ => false,
                };
                if total {
                    out.intersection.insert(variable.clone());
                }
                out.union.insert(variable.clone());
                out
            }
            Operator::ReplaceVar(renaming) => VariableSets {
                intersection: renaming.apply_to(&merged.intersection),
                union: renaming.apply_to(&merged.union),
            },
            Operator::Group(group) => {
                // aggregates may evaluate to unbound, so only keys are certain
                let intersection: VarSet = group
                    .keys
                    .iter()
                    .filter(|k| merged.intersection.contains(*k))
                    .cloned()
                    .collect();
                VariableSets {
                    intersection,
                    union: group.output_variables(),
                }
            }

            Operator::Filter(_)
            | Operator::RuleFilter(_)
            | Operator::Sort(_)
            | Operator::Limit(_)
            | Operator::Offset(_)
            | Operator::Distinct
            | Operator::IndexDistinct
            | Operator::Window(_) => merged,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::operators::{IndexScan, ScanSource};
    use crate::types::{TriplePattern, Variable};

    fn scan(graph: &mut OperatorGraph, s: &str, o: &str) -> OperatorId {
        let id = graph.add(Operator::IndexScan(IndexScan {
            patterns: vec![TriplePattern::new(
                Item::var(s),
                Item::iri("http://ex/p"),
                Item::var(o),
            )],
            graph: None,
            source: ScanSource {
                dataset: "test".to_string(),
                in_memory: true,
            },
        }));
        let root = graph.root();
        graph.connect(root, id, 0).unwrap();
        id
    }

    fn vars(names: &[&str]) -> VarSet {
        names.iter().map(|n| Variable::new(*n)).collect()
    }

    #[test]
    fn test_optional_keeps_outer_intersection() {
        let mut graph = OperatorGraph::new();
        let outer = scan(&mut graph, "a", "b");
        let inner = scan(&mut graph, "b", "c");
        let optional = graph.add(Operator::Optional);
        graph.connect(outer, optional, 0).unwrap();
        graph.connect(inner, optional, 1).unwrap();
        graph.update_variables().unwrap();

        let node = graph.node(optional).unwrap();
        assert_eq!(node.intersection, vars(&["a", "b"]));
        assert_eq!(node.union, vars(&["a", "b", "c"]));
    }

    #[test]
    fn test_operand_group_behaves_like_union() {
        let mut graph = OperatorGraph::new();
        let left = scan(&mut graph, "a", "b");
        let right = scan(&mut graph, "a", "c");
        let other = scan(&mut graph, "d", "e");
        let join = graph.add(Operator::Join);
        graph.connect(left, join, 0).unwrap();
        graph.connect(right, join, 0).unwrap();
        graph.connect(other, join, 1).unwrap();
        graph.update_variables().unwrap();

        let node = graph.node(join).unwrap();
        assert_eq!(node.intersection, vars(&["a", "d", "e"]));
        assert_eq!(node.union, vars(&["a", "b", "c", "d", "e"]));
    }

    #[test]
    fn test_propagation_is_idempotent() {
        let mut graph = OperatorGraph::new();
        let s = scan(&mut graph, "a", "b");
        let projection = graph.add(Operator::projection(vec![Variable::new("a")]));
        graph.connect(s, projection, 0).unwrap();
        graph.update_variables().unwrap();
        let first = graph.clone();
        graph.update_variables().unwrap();
        assert_eq!(graph, first);
        assert_eq!(graph.node(projection).unwrap().union, vars(&["a"]));
    }

    #[test]
    fn test_bind_target_certain_only_for_total_expressions() {
        let mut graph = OperatorGraph::new();
        let outer = scan(&mut graph, "a", "b");
        let inner = scan(&mut graph, "b", "c");
        let optional = graph.add(Operator::Optional);
        graph.connect(outer, optional, 0).unwrap();
        graph.connect(inner, optional, 1).unwrap();

        let binds = [
            ("k", Expression::constant(crate::types::Literal::integer(1))),
            ("copy_a", Expression::var("a")),
            ("copy_c", Expression::var("c")),
            (
                "sum",
                Expression::binary(Expression::var("a"), crate::ast::Operator::Plus, Expression::var("b")),
            ),
        ];
        let mut ids = Vec::new();
        for (target, expression) in binds {
            let id = graph.add(Operator::bind(Variable::new(target), expression));
            graph.connect(optional, id, 0).unwrap();
            ids.push((target, id));
        }
        graph.update_variables().unwrap();

        for (target, id) in ids {
            let node = graph.node(id).unwrap();
            let var = Variable::new(target);
            assert!(node.union.contains(&var));
            let certain = matches!(target, "k" | "copy_a");
            assert_eq!(node.intersection.contains(&var), certain, "{}", target);
        }
    }

    #[test]
    fn test_aggregates_are_not_certainly_bound() {
        let mut graph = OperatorGraph::new();
        let s = scan(&mut graph, "a", "b");
        let group = graph.add(Operator::Group(crate::plan::operators::GroupOperator {
            keys: vec![Variable::new("a")],
            aggregates: vec![(
                Variable::new("total"),
                crate::ast::AggregateExpression {
                    function: crate::ast::AggregateFunction::Sum,
                    distinct: false,
                    argument: Some(Box::new(Expression::var("b"))),
                },
            )],
        }));
        graph.connect(s, group, 0).unwrap();
        graph.update_variables().unwrap();

        let node = graph.node(group).unwrap();
        assert_eq!(node.intersection, vars(&["a"]));
        assert_eq!(node.union, vars(&["a", "total"]));
    }
}
