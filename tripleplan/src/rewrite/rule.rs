// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Rewrite rule trait

use crate::error::CompileResult;
use crate::plan::{OperatorId, OperatorKind};
use crate::rewrite::context::RewriteContext;
use crate::rewrite::pattern::Matched;

/// A local graph transformation
///
/// The engine calls `check` on every live operator of `start_kind`; when it
/// returns a match, `replace` performs the rewrite through the context.
/// `check` must not assume anything `replace` does not re-establish: the
/// engine re-checks liveness but never re-runs `check` between the two.
pub trait RewriteRule: std::fmt::Debug {
    /// Stable rule name, used by configuration and statistics
    fn name(&self) -> &'static str;

    /// Operator kind a match starts from
    fn start_kind(&self) -> OperatorKind;

    fn check(&self, ctx: &RewriteContext<'_>, start: OperatorId) -> Option<Matched>;

    fn replace(&self, ctx: &mut RewriteContext<'_>, matched: Matched) -> CompileResult<()>;
}
