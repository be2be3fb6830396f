// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Compilation error types

use thiserror::Error;

/// Errors raised while translating, compiling or rewriting a plan.
///
/// Every variant aborts the whole compilation; no partial plan is returned.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    /// The input tree violates a language rule (blank nodes in DATA templates,
    /// ungrouped projection variables, cyclic computed bindings, ...)
    #[error("Malformed query: {0}")]
    MalformedQuery(String),

    /// The construct is valid but the configured evaluator cannot run it
    #[error("Unsupported feature: {0}")]
    UnsupportedFeature(String),

    /// An internal invariant was violated; this is a defect, not a user error
    #[error("Internal build error: {0}")]
    InternalBuild(String),
}

impl CompileError {
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedQuery(msg.into())
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::UnsupportedFeature(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::InternalBuild(msg.into())
    }

    /// Error raised when computed `AS` bindings depend on each other in a cycle
    pub fn cyclic_expression(variables: &[String]) -> Self {
        Self::MalformedQuery(format!(
            "cyclic SELECT expression between {}",
            variables.join(", ")
        ))
    }
}

/// Result alias used throughout the compiler
pub type CompileResult<T> = std::result::Result<T, CompileError>;
