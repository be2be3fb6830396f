// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! RDF terms, variables and triple patterns

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

pub const XSD_INTEGER: &str = "http://www.w3.org/2001/XMLSchema#integer";
pub const XSD_DECIMAL: &str = "http://www.w3.org/2001/XMLSchema#decimal";
pub const XSD_DOUBLE: &str = "http://www.w3.org/2001/XMLSchema#double";
pub const XSD_BOOLEAN: &str = "http://www.w3.org/2001/XMLSchema#boolean";

const INTERIM_PREFIX: &str = "#";

/// A query variable, written `?name` in surface syntax
///
/// Compiler-generated variables carry a `#` prefix that no parser can produce.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Variable(String);

impl Variable {
    pub fn new(name: impl Into<String>) -> Self {
        Variable(name.into())
    }

    /// Fresh interim variable with the given sequence number
    pub fn interim(id: usize) -> Self {
        Variable(format!("{}i{}", INTERIM_PREFIX, id))
    }

    pub fn name(&self) -> &str {
        &self.0
    }

    pub fn is_interim(&self) -> bool {
        self.0.starts_with(INTERIM_PREFIX)
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "?{}", self.0)
    }
}

/// A concrete RDF term
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Literal {
    Iri(String),
    Blank(String),
    Simple(String),
    LangTagged { lexical: String, lang: String },
    Typed { lexical: String, datatype: String },
}

impl Literal {
    pub fn iri(iri: impl Into<String>) -> Self {
        Literal::Iri(iri.into())
    }

    pub fn blank(label: impl Into<String>) -> Self {
        Literal::Blank(label.into())
    }

    pub fn simple(lexical: impl Into<String>) -> Self {
        Literal::Simple(lexical.into())
    }

    pub fn integer(value: i64) -> Self {
        Literal::Typed {
            lexical: value.to_string(),
            datatype: XSD_INTEGER.to_string(),
        }
    }

    pub fn double(value: f64) -> Self {
        Literal::Typed {
            lexical: value.to_string(),
            datatype: XSD_DOUBLE.to_string(),
        }
    }

    pub fn boolean(value: bool) -> Self {
        Literal::Typed {
            lexical: value.to_string(),
            datatype: XSD_BOOLEAN.to_string(),
        }
    }

    pub fn is_iri(&self) -> bool {
        matches!(self, Literal::Iri(_))
    }

    pub fn is_blank(&self) -> bool {
        matches!(self, Literal::Blank(_))
    }

    /// Lexical form (IRI text, blank label or literal value)
    pub fn lexical(&self) -> &str {
        match self {
            Literal::Iri(s) | Literal::Blank(s) | Literal::Simple(s) => s,
            Literal::LangTagged { lexical, .. } | Literal::Typed { lexical, .. } => lexical,
        }
    }

    /// Numeric value of a numeric typed literal
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Literal::Typed { lexical, datatype }
                if datatype == XSD_INTEGER || datatype == XSD_DECIMAL || datatype == XSD_DOUBLE =>
            {
                lexical.parse().ok()
            }
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Literal::Typed { lexical, datatype } if datatype == XSD_BOOLEAN => {
                match lexical.as_str() {
                    "true" | "1" => Some(true),
                    "false" | "0" => Some(false),
                    _ => None,
                }
            }
            _ => None,
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Iri(iri) => write!(f, "<{}>", iri),
            Literal::Blank(label) => write!(f, "_:{}", label),
            Literal::Simple(s) => write!(f, "\"{}\"", s),
            Literal::LangTagged { lexical, lang } => write!(f, "\"{}\"@{}", lexical, lang),
            Literal::Typed { lexical, datatype } => write!(f, "\"{}\"^^<{}>", lexical, datatype),
        }
    }
}

/// A position in a triple pattern: either a variable or a concrete term
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Item {
    Var(Variable),
    Lit(Literal),
}

impl Item {
    pub fn var(name: impl Into<String>) -> Self {
        Item::Var(Variable::new(name))
    }

    pub fn iri(iri: impl Into<String>) -> Self {
        Item::Lit(Literal::iri(iri))
    }

    pub fn is_var(&self) -> bool {
        matches!(self, Item::Var(_))
    }

    pub fn as_var(&self) -> Option<&Variable> {
        match self {
            Item::Var(v) => Some(v),
            Item::Lit(_) => None,
        }
    }

    pub fn as_literal(&self) -> Option<&Literal> {
        match self {
            Item::Lit(l) => Some(l),
            Item::Var(_) => None,
        }
    }

    /// Apply a variable renaming; unmapped variables and literals are kept
    pub fn renamed(&self, renaming: &BTreeMap<Variable, Variable>) -> Item {
        match self {
            Item::Var(v) => Item::Var(renaming.get(v).cloned().unwrap_or_else(|| v.clone())),
            Item::Lit(_) => self.clone(),
        }
    }
}

impl From<Variable> for Item {
    fn from(v: Variable) -> Self {
        Item::Var(v)
    }
}

impl From<Literal> for Item {
    fn from(l: Literal) -> Self {
        Item::Lit(l)
    }
}

impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Item::Var(v) => write!(f, "{}", v),
            Item::Lit(l) => write!(f, "{}", l),
        }
    }
}

/// Exactly three items: subject, predicate, object
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TriplePattern {
    pub subject: Item,
    pub predicate: Item,
    pub object: Item,
}

impl TriplePattern {
    pub fn new(subject: Item, predicate: Item, object: Item) -> Self {
        Self {
            subject,
            predicate,
            object,
        }
    }

    pub fn items(&self) -> [&Item; 3] {
        [&self.subject, &self.predicate, &self.object]
    }

    pub fn variables(&self) -> BTreeSet<Variable> {
        self.items()
            .iter()
            .filter_map(|item| item.as_var().cloned())
            .collect()
    }

    pub fn renamed(&self, renaming: &BTreeMap<Variable, Variable>) -> TriplePattern {
        TriplePattern::new(
            self.subject.renamed(renaming),
            self.predicate.renamed(renaming),
            self.object.renamed(renaming),
        )
    }

    pub fn has_variables(&self) -> bool {
        self.items().iter().any(|item| item.is_var())
    }

    pub fn has_blank_nodes(&self) -> bool {
        self.items()
            .iter()
            .any(|item| item.as_literal().map(Literal::is_blank).unwrap_or(false))
    }
}

impl fmt::Display for TriplePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({} {} {})", self.subject, self.predicate, self.object)
    }
}

/// A ground triple
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Triple {
    pub subject: Literal,
    pub predicate: Literal,
    pub object: Literal,
}

impl Triple {
    pub fn new(subject: Literal, predicate: Literal, object: Literal) -> Self {
        Self {
            subject,
            predicate,
            object,
        }
    }

    pub fn terms(&self) -> [&Literal; 3] {
        [&self.subject, &self.predicate, &self.object]
    }
}

/// A ground triple in a graph; `graph == None` is the default graph
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Quad {
    pub graph: Option<Literal>,
    pub triple: Triple,
}

impl Quad {
    pub fn new(graph: Option<Literal>, triple: Triple) -> Self {
        Self { graph, triple }
    }
}

impl fmt::Display for Quad {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let t = &self.triple;
        match &self.graph {
            Some(g) => write!(f, "{} {} {} {}", t.subject, t.predicate, t.object, g),
            None => write!(f, "{} {} {}", t.subject, t.predicate, t.object),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interim_variables_are_marked() {
        let v = Variable::interim(3);
        assert!(v.is_interim());
        assert!(!Variable::new("s").is_interim());
        assert_ne!(Variable::interim(1), Variable::interim(2));
    }

    #[test]
    fn test_pattern_rename_keeps_literals() {
        let pattern = TriplePattern::new(Item::var("s"), Item::iri("http://ex/p"), Item::var("o"));
        let mut renaming = BTreeMap::new();
        renaming.insert(Variable::new("o"), Variable::new("x"));

        let renamed = pattern.renamed(&renaming);
        assert_eq!(renamed.object, Item::var("x"));
        assert_eq!(renamed.predicate, Item::iri("http://ex/p"));
        assert_eq!(
            renamed.variables(),
            [Variable::new("s"), Variable::new("x")].into_iter().collect()
        );
    }

    #[test]
    fn test_numeric_literals() {
        assert_eq!(Literal::integer(42).as_number(), Some(42.0));
        assert_eq!(Literal::simple("42").as_number(), None);
        assert_eq!(Literal::boolean(true).as_bool(), Some(true));
    }
}
