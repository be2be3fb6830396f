// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Values flowing between operators during in-memory evaluation

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::ast::GraphTarget;
use crate::types::{Item, Literal, Quad, Variable};

/// One solution: variables mapped to terms
pub type Binding = BTreeMap<Variable, Literal>;

/// Derived predicate fact `name(arguments...)`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Fact {
    pub name: Literal,
    pub arguments: Vec<Literal>,
}

/// Store change produced by an update plan
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum UpdateAction {
    Insert(Quad),
    Delete(Quad),
    Load {
        source: Literal,
        destination: Option<Literal>,
        silent: bool,
    },
    Clear {
        target: GraphTarget,
        silent: bool,
    },
    Create {
        graph: Literal,
        silent: bool,
    },
    Drop {
        target: GraphTarget,
        silent: bool,
    },
}

/// Output element of an operator
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Row {
    Solution(Binding),
    Quad(Quad),
    Fact(Fact),
    Action(UpdateAction),
}

/// Value of `item` under `binding`; `None` for an unbound variable
pub fn resolve(item: &Item, binding: &Binding) -> Option<Literal> {
    match item {
        Item::Var(v) => binding.get(v).cloned(),
        Item::Lit(l) => Some(l.clone()),
    }
}

/// Extend `binding` so that `item` denotes `value`, if consistent
pub fn unify(item: &Item, value: &Literal, binding: &mut Binding) -> bool {
    match item {
        Item::Lit(l) => l == value,
        Item::Var(v) => match binding.get(v) {
            Some(bound) => bound == value,
            None => {
                binding.insert(v.clone(), value.clone());
                true
            }
        },
    }
}

/// Whether two solutions agree on every shared variable
pub fn compatible(left: &Binding, right: &Binding) -> bool {
    left.iter()
        .all(|(var, value)| right.get(var).map_or(true, |other| other == value))
}

/// Union of two compatible solutions
pub fn merge(left: &Binding, right: &Binding) -> Binding {
    let mut out = left.clone();
    for (var, value) in right {
        out.entry(var.clone()).or_insert_with(|| value.clone());
    }
    out
}
