// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Compiler configuration

use serde::{Deserialize, Serialize};

use crate::error::{CompileError, CompileResult};

/// Global compiler configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CompilerConfig {
    /// What the execution layer behind this compiler can run
    pub capabilities: EvaluatorCapabilities,

    /// Rewrite phase settings
    pub rewrite: RewriteConfig,

    /// Insert duplicate-elimination stages after path unions and loops
    pub distinct_paths: bool,
}

/// Feature switches of the evaluator the plan is compiled for
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EvaluatorCapabilities {
    /// GRAPH patterns, FROM NAMED and named update targets
    pub named_graphs: bool,

    /// Window constructs over streams
    pub streaming: bool,

    /// SERVICE calls to remote endpoints
    pub federation: bool,
}

/// Rewrite engine configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RewriteConfig {
    /// Run the rewrite phase at all
    pub enabled: bool,

    /// Upper bound on full passes over the catalogue before giving up
    pub max_passes: usize,

    /// Rule names left out of the catalogue
    pub disabled_rules: Vec<String>,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            capabilities: EvaluatorCapabilities::default(),
            rewrite: RewriteConfig::default(),
            distinct_paths: true,
        }
    }
}

impl Default for EvaluatorCapabilities {
    fn default() -> Self {
        Self {
            named_graphs: true,
            streaming: true,
            federation: true,
        }
    }
}

impl Default for RewriteConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_passes: 64,
            disabled_rules: Vec::new(),
        }
    }
}

impl EvaluatorCapabilities {
    /// Capabilities of a plain local evaluator (no named graphs, streams or federation)
    pub fn local_only() -> Self {
        Self {
            named_graphs: false,
            streaming: false,
            federation: false,
        }
    }
}

impl RewriteConfig {
    /// Whether the named rule takes part in rewriting
    pub fn is_rule_enabled(&self, name: &str) -> bool {
        self.enabled && !self.disabled_rules.iter().any(|r| r == name)
    }
}

impl CompilerConfig {
    /// Load a configuration from its JSON form; missing fields take defaults
    pub fn from_json(text: &str) -> CompileResult<Self> {
        serde_json::from_str(text)
            .map_err(|e| CompileError::internal(format!("invalid compiler configuration: {}", e)))
    }

    /// Serialize the configuration to pretty JSON
    pub fn to_json(&self) -> CompileResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| CompileError::internal(format!("cannot serialize configuration: {}", e)))
    }

    pub fn with_capabilities(mut self, capabilities: EvaluatorCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn without_rewrite(mut self) -> Self {
        self.rewrite.enabled = false;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_uses_defaults() {
        let config =
            CompilerConfig::from_json(r#"{ "capabilities": { "federation": false } }"#).unwrap();
        assert!(!config.capabilities.federation);
        assert!(config.capabilities.named_graphs);
        assert_eq!(config.rewrite.max_passes, 64);
        assert!(config.distinct_paths);
    }

    #[test]
    fn test_json_roundtrip_preserves_disabled_rules() {
        let mut config = CompilerConfig::default();
        config.rewrite.disabled_rules.push("RemoveUnion".to_string());
        let restored = CompilerConfig::from_json(&config.to_json().unwrap()).unwrap();
        assert_eq!(restored, config);
        assert!(!restored.rewrite.is_rule_enabled("RemoveUnion"));
        assert!(restored.rewrite.is_rule_enabled("MergeMemoryIndexes"));
    }

    #[test]
    fn test_invalid_json_is_reported() {
        let err = CompilerConfig::from_json("{ not json").unwrap_err();
        assert!(matches!(err, CompileError::InternalBuild(_)));
    }
}
