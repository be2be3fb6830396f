// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! AST subsystem: the immutable syntax tree handed over by the parser

#[allow(clippy::module_inception)]
mod ast;
pub use ast::*;
