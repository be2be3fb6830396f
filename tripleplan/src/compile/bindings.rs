// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Ordering of computed (`AS`) bindings
//!
//! A binding depends on another binding when its expression references the
//! other binding's target variable. Bindings are emitted in passes: every pass
//! emits the bindings whose dependencies are all resolved. A pass that emits
//! nothing while bindings remain means the dependencies form a cycle.

use std::collections::BTreeSet;

use crate::ast::Expression;
use crate::error::{CompileError, CompileResult};
use crate::types::Variable;

/// `(expression AS ?variable)`
#[derive(Debug, Clone, PartialEq)]
pub struct ComputedBinding {
    pub variable: Variable,
    pub expression: Expression,
}

impl ComputedBinding {
    pub fn new(variable: Variable, expression: Expression) -> Self {
        Self {
            variable,
            expression,
        }
    }
}

/// Order bindings so that every binding follows all bindings it depends on.
///
/// Independent bindings keep their input order. A cyclic dependency is a
/// malformed query and no partial order is returned.
pub fn sort_bindings(bindings: Vec<ComputedBinding>) -> CompileResult<Vec<ComputedBinding>> {
    let targets: BTreeSet<Variable> = bindings.iter().map(|b| b.variable.clone()).collect();
    let mut pending: Vec<(ComputedBinding, BTreeSet<Variable>)> = bindings
        .into_iter()
        .map(|b| {
            let deps = b
                .expression
                .variables()
                .into_iter()
                .filter(|v| targets.contains(v))
                .collect();
            (b, deps)
        })
        .collect();

    let mut resolved: BTreeSet<Variable> = BTreeSet::new();
    let mut ordered = Vec::with_capacity(pending.len());

    while !pending.is_empty() {
        let (ready, blocked): (Vec<_>, Vec<_>) = pending
            .into_iter()
            .partition(|(_, deps)| deps.iter().all(|d| resolved.contains(d)));

        if ready.is_empty() {
            let names: Vec<String> = blocked.iter().map(|(b, _)| b.variable.to_string()).collect();
            return Err(CompileError::cyclic_expression(&names));
        }

        for (binding, _) in ready {
            log::trace!("computed binding {} resolved", binding.variable);
            resolved.insert(binding.variable.clone());
            ordered.push(binding);
        }
        pending = blocked;
    }

    Ok(ordered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Operator;
    use crate::types::Literal;

    fn binding(target: &str, expression: Expression) -> ComputedBinding {
        ComputedBinding::new(Variable::new(target), expression)
    }

    fn plus(a: &str, b: &str) -> Expression {
        Expression::binary(Expression::var(a), Operator::Plus, Expression::var(b))
    }

    fn position(order: &[ComputedBinding], name: &str) -> usize {
        order
            .iter()
            .position(|b| b.variable.name() == name)
            .unwrap()
    }

    #[test]
    fn test_dependencies_come_first() {
        let order = sort_bindings(vec![
            binding("c", plus("a", "b")),
            binding("b", plus("a", "x")),
            binding("a", Expression::constant(Literal::integer(1))),
        ])
        .unwrap();
        assert!(position(&order, "a") < position(&order, "b"));
        assert!(position(&order, "b") < position(&order, "c"));
    }

    #[test]
    fn test_independent_bindings_keep_order() {
        let order = sort_bindings(vec![
            binding("y", Expression::var("s")),
            binding("x", Expression::var("o")),
        ])
        .unwrap();
        assert_eq!(order[0].variable.name(), "y");
        assert_eq!(order[1].variable.name(), "x");
    }

    #[test]
    fn test_cycle_is_rejected() {
        let err = sort_bindings(vec![
            binding("a", plus("b", "s")),
            binding("b", Expression::var("a")),
            binding("c", Expression::var("s")),
        ])
        .unwrap_err();
        match err {
            CompileError::MalformedQuery(msg) => {
                assert!(msg.contains("cyclic SELECT expression"));
                assert!(msg.contains("?a"));
                assert!(!msg.contains("?c"));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_self_reference_is_a_cycle() {
        assert!(sort_bindings(vec![binding("a", plus("a", "s"))]).is_err());
    }
}
