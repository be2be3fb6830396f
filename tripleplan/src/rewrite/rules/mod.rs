// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! The standard rewrite rules

pub mod filter;
pub mod remove;
pub mod scan;
pub mod specialize;
pub mod split;

pub use filter::{PushFilter, PushRuleFilter, ReplaceFilterWithRuleFilter};
pub use remove::{
    RemoveEmptyIndex, RemoveUnion, RemoveUnnecessaryConstruct, RemoveUnnecessaryGenerate,
    RemoveUnnecessaryPredicate,
};
pub use scan::{IndexDistinct, MergeMemoryIndexes, ReplaceVarUnderIndex};
pub use specialize::{GeneratePatConstructPredicate, ReplaceGeneratePat};
pub use split::{SplitConstructPredicate, SplitGenerate, SplitPredicatePattern};
