// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Logical plans for SPARQL-style queries
//!
//! A plan is an [`OperatorGraph`]: a dataflow graph of [`Operator`]s from the
//! single Root source to one or more Result operators. The translator in
//! [`crate::compile`] builds it and [`crate::rewrite`] improves it in place.

pub mod explain;
pub mod graph;
pub mod operators;
pub mod variables;

pub use graph::{Edge, Input, OperatorGraph, OperatorId, OperatorNode};
pub use operators::{
    FilterBinding, FilterOperator, GroupOperator, IndexScan, Operator, OperatorKind, Renaming,
    ResultForm, RuleFilter, ScanSource,
};
pub use variables::{Propagation, VariableScope, VariableSets};
