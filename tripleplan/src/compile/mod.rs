// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Translation of syntax trees into operator graphs
//!
//! The [`Translator`] drives the binding sorter and the property path compiler
//! and talks to its collaborators (index-scan factory, dataset, evaluator)
//! through the traits in [`collaborators`].

pub mod bindings;
pub mod collaborators;
pub mod cursor;
pub mod path;
mod rules;
pub mod translator;
mod update;

pub use bindings::{sort_bindings, ComputedBinding};
pub use collaborators::{Dataset, DatasetDescription, Evaluator, IndexScanFactory};
pub use cursor::Cursor;
pub use path::PathCompiler;
pub use translator::{CompiledPlan, Translator};
