// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Ordered rule catalogue
//!
//! The catalogue is a plain value built once and handed to the engine; its
//! order is the order rules are tried within a pass.

use crate::config::RewriteConfig;
use crate::rewrite::rule::RewriteRule;
use crate::rewrite::rules::*;

#[derive(Debug, Default)]
pub struct RuleCatalogue {
    rules: Vec<Box<dyn RewriteRule>>,
}

impl RuleCatalogue {
    /// Every standard rule, in application order
    pub fn standard() -> Self {
        let rules: Vec<Box<dyn RewriteRule>> = vec![
            Box::new(RemoveEmptyIndex),
            Box::new(RemoveUnnecessaryConstruct),
            Box::new(RemoveUnnecessaryPredicate),
            Box::new(RemoveUnnecessaryGenerate),
            Box::new(SplitGenerate),
            Box::new(SplitPredicatePattern),
            Box::new(SplitConstructPredicate),
            Box::new(ReplaceGeneratePat),
            Box::new(GeneratePatConstructPredicate),
            Box::new(RemoveUnion),
            Box::new(MergeMemoryIndexes),
            Box::new(ReplaceFilterWithRuleFilter),
            Box::new(PushFilter),
            Box::new(PushRuleFilter),
            Box::new(ReplaceVarUnderIndex),
            Box::new(IndexDistinct),
        ];
        Self { rules }
    }

    /// Standard rules minus the ones the configuration disables; empty when
    /// rewriting is switched off
    pub fn from_config(config: &RewriteConfig) -> Self {
        let mut catalogue = Self::standard();
        catalogue.rules.retain(|rule| config.is_rule_enabled(rule.name()));
        for name in &config.disabled_rules {
            if !Self::standard().names().contains(&name.as_str()) {
                log::warn!("unknown rewrite rule '{}' in disabled_rules", name);
            }
        }
        catalogue
    }

    /// Catalogue over an explicit rule list
    pub fn with_rules(rules: Vec<Box<dyn RewriteRule>>) -> Self {
        Self { rules }
    }

    pub fn push(&mut self, rule: Box<dyn RewriteRule>) {
        self.rules.push(rule);
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn RewriteRule> {
        self.rules.iter().map(|r| r.as_ref())
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_order() {
        let names = RuleCatalogue::standard().names();
        assert_eq!(names.len(), 16);
        assert_eq!(names[0], "RemoveEmptyIndex");
        assert_eq!(names[9], "RemoveUnion");
        assert_eq!(names[15], "IndexDistinct");
    }

    #[test]
    fn test_disabled_rules_are_left_out() {
        let config = RewriteConfig {
            disabled_rules: vec!["RemoveUnion".to_string(), "IndexDistinct".to_string()],
            ..RewriteConfig::default()
        };
        let catalogue = RuleCatalogue::from_config(&config);
        assert_eq!(catalogue.len(), 14);
        assert!(!catalogue.names().contains(&"RemoveUnion"));

        let off = RewriteConfig {
            enabled: false,
            ..RewriteConfig::default()
        };
        assert!(RuleCatalogue::from_config(&off).is_empty());
    }
}
