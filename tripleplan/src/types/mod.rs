// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Core data model shared by the syntax tree, the plan and the rewrite engine
//!
//! Items are either variables or concrete RDF terms; a triple pattern is exactly
//! three items.

pub mod term;

use std::collections::BTreeSet;

pub use self::term::{
    Item, Literal, Quad, Triple, TriplePattern, Variable, XSD_BOOLEAN, XSD_DECIMAL, XSD_DOUBLE,
    XSD_INTEGER,
};

/// Ordered variable set used for intersection/union bookkeeping
pub type VarSet = BTreeSet<Variable>;
