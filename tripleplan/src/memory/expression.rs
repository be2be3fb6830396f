// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Expression evaluation over a single solution
//!
//! Evaluation errors and unbound variables both yield `None`; a filter keeps a
//! row only when its expression has effective boolean value `true`.

use std::cmp::Ordering;
use std::ptr;

use crate::ast::{AggregateExpression, AggregateFunction, Expression, GroupGraphPattern, Operator};
use crate::memory::row::{compatible, Binding};
use crate::types::{Literal, XSD_INTEGER};

/// Solutions of the nested plans of one filter, matched to their EXISTS
/// patterns by identity
#[derive(Debug, Default)]
pub struct ExistsResults<'e> {
    entries: Vec<(&'e GroupGraphPattern, Vec<Binding>)>,
}

impl<'e> ExistsResults<'e> {
    pub fn push(&mut self, pattern: &'e GroupGraphPattern, solutions: Vec<Binding>) {
        self.entries.push((pattern, solutions));
    }

    fn lookup(&self, pattern: &GroupGraphPattern) -> Option<&[Binding]> {
        self.entries
            .iter()
            .find(|(p, _)| ptr::eq(*p, pattern))
            .map(|(_, s)| s.as_slice())
    }
}

pub fn evaluate(expression: &Expression, row: &Binding, exists: &ExistsResults<'_>) -> Option<Literal> {
    match expression {
        Expression::Variable(v) => row.get(v).cloned(),
        Expression::Constant(l) => Some(l.clone()),
        Expression::Bound(v) => Some(Literal::boolean(row.contains_key(v))),
        Expression::Exists(p) | Expression::NotExists(p) => {
            let found = exists.lookup(p)?.iter().any(|s| compatible(s, row));
            Some(Literal::boolean(found == matches!(expression, Expression::Exists(_))))
        }
        Expression::Unary(u) => {
            let value = evaluate(&u.expression, row, exists)?;
            match u.operator {
                Operator::Not => Some(Literal::boolean(!effective_boolean(&value)?)),
                Operator::Minus => numeric(-value.as_number()?, is_integer(&value)),
                Operator::Plus => value.as_number().map(|_| value),
                _ => None,
            }
        }
        Expression::Binary(b) => match b.operator {
            Operator::And => {
                let left = evaluate(&b.left, row, exists).and_then(|v| effective_boolean(&v));
                let right = evaluate(&b.right, row, exists).and_then(|v| effective_boolean(&v));
                match (left, right) {
                    (Some(false), _) | (_, Some(false)) => Some(Literal::boolean(false)),
                    (Some(true), Some(true)) => Some(Literal::boolean(true)),
                    _ => None,
                }
            }
            Operator::Or => {
                let left = evaluate(&b.left, row, exists).and_then(|v| effective_boolean(&v));
                let right = evaluate(&b.right, row, exists).and_then(|v| effective_boolean(&v));
                match (left, right) {
                    (Some(true), _) | (_, Some(true)) => Some(Literal::boolean(true)),
                    (Some(false), Some(false)) => Some(Literal::boolean(false)),
                    _ => None,
                }
            }
            operator => {
                let left = evaluate(&b.left, row, exists)?;
                let right = evaluate(&b.right, row, exists)?;
                binary(operator, &left, &right)
            }
        },
        Expression::FunctionCall(call) => {
            let args: Option<Vec<Literal>> = call
                .arguments
                .iter()
                .map(|a| evaluate(a, row, exists))
                .collect();
            function(&call.name, &args?)
        }
        Expression::Aggregate(_) => None,
    }
}

/// Effective boolean value
pub fn effective_boolean(value: &Literal) -> Option<bool> {
    if let Some(b) = value.as_bool() {
        return Some(b);
    }
    if let Some(n) = value.as_number() {
        return Some(n != 0.0 && !n.is_nan());
    }
    match value {
        Literal::Simple(s) => Some(!s.is_empty()),
        _ => None,
    }
}

/// Total order used by ORDER BY: unbound first, then numbers, then terms
pub fn order(left: Option<&Literal>, right: Option<&Literal>) -> Ordering {
    match (left, right) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(l), Some(r)) => match (l.as_number(), r.as_number()) {
            (Some(a), Some(b)) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => l.cmp(r),
        },
    }
}

fn is_integer(value: &Literal) -> bool {
    matches!(value, Literal::Typed { datatype, .. } if datatype == XSD_INTEGER)
}

fn numeric(value: f64, integer: bool) -> Option<Literal> {
    if integer && value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        Some(Literal::integer(value as i64))
    } else {
        Some(Literal::double(value))
    }
}

fn binary(operator: Operator, left: &Literal, right: &Literal) -> Option<Literal> {
    let numbers = left.as_number().zip(right.as_number());
    let integers = is_integer(left) && is_integer(right);
    match operator {
        Operator::Plus => numbers.and_then(|(a, b)| numeric(a + b, integers)),
        Operator::Minus => numbers.and_then(|(a, b)| numeric(a - b, integers)),
        Operator::Star => numbers.and_then(|(a, b)| numeric(a * b, integers)),
        Operator::Slash => match numbers {
            Some((_, b)) if b == 0.0 => None,
            Some((a, b)) => Some(Literal::double(a / b)),
            None => None,
        },
        Operator::SameTerm => Some(Literal::boolean(left == right)),
        Operator::Equal => Some(Literal::boolean(value_equal(left, right))),
        Operator::NotEqual => Some(Literal::boolean(!value_equal(left, right))),
        Operator::LessThan => compare(left, right).map(|o| Literal::boolean(o == Ordering::Less)),
        Operator::LessEqual => compare(left, right).map(|o| Literal::boolean(o != Ordering::Greater)),
        Operator::GreaterThan => compare(left, right).map(|o| Literal::boolean(o == Ordering::Greater)),
        Operator::GreaterEqual => compare(left, right).map(|o| Literal::boolean(o != Ordering::Less)),
        Operator::And | Operator::Or | Operator::Not => None,
    }
}

fn value_equal(left: &Literal, right: &Literal) -> bool {
    match (left.as_number(), right.as_number()) {
        (Some(a), Some(b)) => a == b,
        _ => left == right,
    }
}

fn compare(left: &Literal, right: &Literal) -> Option<Ordering> {
    match (left.as_number(), right.as_number()) {
        (Some(a), Some(b)) => a.partial_cmp(&b),
        (None, None) if !left.is_iri() && !left.is_blank() => match (left, right) {
            (Literal::Simple(a), Literal::Simple(b)) => Some(a.cmp(b)),
            _ => None,
        },
        _ => None,
    }
}

fn function(name: &str, args: &[Literal]) -> Option<Literal> {
    match (name.to_ascii_lowercase().as_str(), args) {
        ("sameterm", [a, b]) => Some(Literal::boolean(a == b)),
        ("str", [a]) => Some(Literal::simple(a.lexical())),
        ("isiri" | "isuri", [a]) => Some(Literal::boolean(a.is_iri())),
        ("isblank", [a]) => Some(Literal::boolean(a.is_blank())),
        ("isliteral", [a]) => Some(Literal::boolean(!a.is_iri() && !a.is_blank())),
        ("isnumeric", [a]) => Some(Literal::boolean(a.as_number().is_some())),
        ("strlen", [a]) => Some(Literal::integer(a.lexical().chars().count() as i64)),
        ("contains", [a, b]) => Some(Literal::boolean(a.lexical().contains(b.lexical()))),
        ("strstarts", [a, b]) => Some(Literal::boolean(a.lexical().starts_with(b.lexical()))),
        ("strends", [a, b]) => Some(Literal::boolean(a.lexical().ends_with(b.lexical()))),
        ("ucase", [a]) => Some(Literal::simple(a.lexical().to_uppercase())),
        ("lcase", [a]) => Some(Literal::simple(a.lexical().to_lowercase())),
        ("abs", [a]) => numeric(a.as_number()?.abs(), is_integer(a)),
        ("if", [c, a, b]) => Some(if effective_boolean(c)? { a.clone() } else { b.clone() }),
        _ => {
            log::debug!("unknown function {} with {} arguments", name, args.len());
            None
        }
    }
}

/// Value of one aggregate over the rows of a group
pub fn aggregate(aggregate: &AggregateExpression, rows: &[&Binding]) -> Option<Literal> {
    let empty = ExistsResults::default();
    let mut values: Vec<Literal> = match &aggregate.argument {
        None => {
            if matches!(aggregate.function, AggregateFunction::Count) && !aggregate.distinct {
                return Some(Literal::integer(rows.len() as i64));
            }
            // COUNT(DISTINCT *) counts distinct solutions
            let mut distinct: Vec<&Binding> = Vec::new();
            for row in rows {
                if !distinct.contains(row) {
                    distinct.push(*row);
                }
            }
            return Some(Literal::integer(distinct.len() as i64));
        }
        Some(argument) => rows
            .iter()
            .filter_map(|row| evaluate(argument, row, &empty))
            .collect(),
    };
    if aggregate.distinct {
        let mut seen = Vec::with_capacity(values.len());
        values.retain(|v| {
            if seen.contains(v) {
                false
            } else {
                seen.push(v.clone());
                true
            }
        });
    }

    match &aggregate.function {
        AggregateFunction::Count => Some(Literal::integer(values.len() as i64)),
        AggregateFunction::Sum => {
            let integers = values.iter().all(is_integer);
            let total = values.iter().map(|v| v.as_number()).sum::<Option<f64>>()?;
            numeric(total, integers)
        }
        AggregateFunction::Avg => {
            if values.is_empty() {
                return Some(Literal::integer(0));
            }
            let total = values.iter().map(|v| v.as_number()).sum::<Option<f64>>()?;
            Some(Literal::double(total / values.len() as f64))
        }
        AggregateFunction::Min => values.into_iter().min_by(|a, b| order(Some(a), Some(b))),
        AggregateFunction::Max => values.into_iter().max_by(|a, b| order(Some(a), Some(b))),
        AggregateFunction::Sample => values.into_iter().next(),
        AggregateFunction::GroupConcat { separator } => {
            let separator = separator.as_deref().unwrap_or(" ");
            let parts: Vec<&str> = values.iter().map(|v| v.lexical()).collect();
            Some(Literal::simple(parts.join(separator)))
        }
    }
}
