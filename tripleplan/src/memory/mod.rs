// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! In-memory backend
//!
//! A quad store, translator collaborators over it, and a reference
//! [`Interpreter`] that evaluates operator graphs directly. The interpreter is
//! not meant to be fast; it gives compiled and rewritten plans an observable
//! meaning so the two can be compared.

pub mod dataset;
pub mod expression;
pub mod interpreter;
pub mod row;
pub mod store;

pub use dataset::{MemoryDataset, MemoryEvaluator, MemoryIndexScanFactory};
pub use interpreter::{Evaluation, Interpreter, DEFAULT_MAX_ITERATIONS};
pub use row::{Binding, Fact, Row, UpdateAction};
pub use store::MemoryStore;
