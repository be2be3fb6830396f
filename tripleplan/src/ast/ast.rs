// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Abstract Syntax Tree (AST) structures for SPARQL-style queries, updates and
//! inference-rule programs
//!
//! The tree is produced by an external parser and is never mutated by the
//! compiler.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::types::{Item, Literal, TriplePattern, VarSet, Variable};

/// Top-level compilation unit
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Document {
    Query(Query),
    Update(Update),
    Rules(RuleProgram),
}

// ==================== Queries ====================

/// SELECT / CONSTRUCT / ASK / DESCRIBE query
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Query {
    pub form: QueryForm,
    pub dataset: Option<DatasetClause>,
    /// WHERE clause; DESCRIBE may omit it
    pub pattern: Option<GroupGraphPattern>,
    pub modifiers: SolutionModifiers,
}

/// Query result forms
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum QueryForm {
    Select(SelectClause),
    Construct(Vec<TriplePattern>),
    Ask,
    Describe(Vec<Item>),
}

/// SELECT [DISTINCT|REDUCED] (* | items)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SelectClause {
    pub distinct: DistinctQualifier,
    pub items: SelectItems,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DistinctQualifier {
    All,
    Distinct,
    Reduced,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum SelectItems {
    Wildcard,
    Explicit(Vec<SelectItem>),
}

/// Projected variable or `(expression AS ?alias)`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum SelectItem {
    Variable(Variable),
    Expression {
        expression: Expression,
        alias: Variable,
    },
}

/// FROM / FROM NAMED clauses
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DatasetClause {
    pub default_graphs: Vec<Literal>,
    pub named_graphs: Vec<Literal>,
}

/// GROUP BY, HAVING, ORDER BY, LIMIT, OFFSET
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SolutionModifiers {
    pub group_by: Vec<GroupCondition>,
    pub having: Vec<Expression>,
    pub order_by: Vec<OrderCondition>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

/// GROUP BY ?var | GROUP BY (expression [AS ?alias])
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum GroupCondition {
    Variable(Variable),
    Expression {
        expression: Expression,
        alias: Option<Variable>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderCondition {
    pub expression: Expression,
    pub direction: OrderDirection,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OrderDirection {
    Ascending,
    Descending,
}

// ==================== Graph patterns ====================

/// `{ ... }` group graph pattern
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GroupGraphPattern {
    pub elements: Vec<GroupElement>,
}

/// One element of a group graph pattern
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum GroupElement {
    Triple(TriplePattern),
    Path(PathPattern),
    Group(GroupGraphPattern),
    Union(Vec<GroupGraphPattern>),
    Optional(GroupGraphPattern),
    Minus(GroupGraphPattern),
    Graph {
        name: Item,
        pattern: GroupGraphPattern,
    },
    Filter(Expression),
    Bind {
        expression: Expression,
        variable: Variable,
    },
    SubSelect(Box<Query>),
    Service {
        endpoint: Item,
        pattern: GroupGraphPattern,
        silent: bool,
    },
    /// Stream window over the inner pattern
    Window {
        window: WindowSpec,
        pattern: GroupGraphPattern,
    },
    /// Predicate atom; only valid in inference-rule bodies
    Predicate(PredicateAtom),
}

/// `subject path object`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PathPattern {
    pub subject: Item,
    pub path: PathExpression,
    pub object: Item,
}

/// Property path algebra
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum PathExpression {
    Predicate(Literal),
    Inverse(Box<PathExpression>),
    Sequence(Box<PathExpression>, Box<PathExpression>),
    Alternative(Box<PathExpression>, Box<PathExpression>),
    NegatedSet(Vec<NegatedPredicate>),
    /// `P{min,max}`; `max == None` is unbounded
    Repeat {
        path: Box<PathExpression>,
        min: u32,
        max: Option<u32>,
    },
    ZeroOrMore(Box<PathExpression>),
    OneOrMore(Box<PathExpression>),
    ZeroOrOne(Box<PathExpression>),
}

/// Member of `!(...)`; `inverse` marks `^iri`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NegatedPredicate {
    pub iri: Literal,
    pub inverse: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WindowSpec {
    pub stream: Literal,
    pub kind: WindowKind,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum WindowKind {
    Duration { millis: u64 },
    Instances { count: u64 },
}

// ==================== Expressions ====================

/// Expression types
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Expression {
    Variable(Variable),
    Constant(Literal),
    Binary(BinaryExpression),
    Unary(UnaryExpression),
    FunctionCall(FunctionCall),
    Bound(Variable),
    Aggregate(AggregateExpression),
    Exists(GroupGraphPattern),
    NotExists(GroupGraphPattern),
}

/// Binary expression: left op right
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BinaryExpression {
    pub left: Box<Expression>,
    pub operator: Operator,
    pub right: Box<Expression>,
}

/// Unary expression: op expression
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UnaryExpression {
    pub operator: Operator,
    pub expression: Box<Expression>,
}

/// Call of a built-in or extension function; evaluated by the execution layer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: Vec<Expression>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Operator {
    // Arithmetic
    Plus,
    Minus,
    Star,
    Slash,

    // Comparison
    Equal,
    NotEqual,
    LessThan,
    LessEqual,
    GreaterThan,
    GreaterEqual,
    SameTerm,

    // Logical
    And,
    Or,
    Not,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AggregateExpression {
    pub function: AggregateFunction,
    pub distinct: bool,
    /// `None` for COUNT(*)
    pub argument: Option<Box<Expression>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum AggregateFunction {
    Count,
    Sum,
    Min,
    Max,
    Avg,
    Sample,
    GroupConcat { separator: Option<String> },
}

// ==================== Updates ====================

/// Sequence of update operations; each compiles to its own plan
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Update {
    pub operations: Vec<UpdateOperation>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum UpdateOperation {
    InsertData(Vec<QuadPattern>),
    DeleteData(Vec<QuadPattern>),
    DeleteWhere(Vec<QuadPattern>),
    Modify(ModifyOperation),
    Load {
        source: Literal,
        destination: Option<Literal>,
        silent: bool,
    },
    Clear {
        target: GraphTarget,
        silent: bool,
    },
    Create {
        graph: Literal,
        silent: bool,
    },
    Drop {
        target: GraphTarget,
        silent: bool,
    },
}

/// [WITH g] DELETE {..} INSERT {..} [USING ..] WHERE {..}
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModifyOperation {
    pub with: Option<Literal>,
    pub delete: Vec<QuadPattern>,
    pub insert: Vec<QuadPattern>,
    pub using: Option<DatasetClause>,
    pub pattern: GroupGraphPattern,
}

/// Triple template with an optional GRAPH wrapper
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuadPattern {
    pub graph: Option<Item>,
    pub triple: TriplePattern,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GraphTarget {
    Default,
    Named(Literal),
    AllNamed,
    All,
}

// ==================== Inference rules ====================

/// Set of recursive inference rules evaluated together
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RuleProgram {
    pub rules: Vec<InferenceRule>,
    pub output: RuleOutput,
}

/// Which derived facts the program result collects
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RuleOutput {
    pub triples: bool,
    pub predicates: bool,
}

/// `head :- body`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InferenceRule {
    pub head: Vec<RuleHead>,
    pub body: GroupGraphPattern,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum RuleHead {
    Triple(TriplePattern),
    Predicate(PredicateAtom),
}

/// `name(arg, ...)`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PredicateAtom {
    pub name: Literal,
    pub arguments: Vec<Item>,
}

// ==================== Construction helpers ====================

impl Query {
    /// `SELECT * WHERE pattern`
    pub fn select_all(pattern: GroupGraphPattern) -> Self {
        Self::select(SelectItems::Wildcard, pattern)
    }

    /// `SELECT ?v1 ?v2 ... WHERE pattern`
    pub fn select_vars(vars: &[&str], pattern: GroupGraphPattern) -> Self {
        let items = vars
            .iter()
            .map(|v| SelectItem::Variable(Variable::new(*v)))
            .collect();
        Self::select(SelectItems::Explicit(items), pattern)
    }

    pub fn select(items: SelectItems, pattern: GroupGraphPattern) -> Self {
        Self {
            form: QueryForm::Select(SelectClause {
                distinct: DistinctQualifier::All,
                items,
            }),
            dataset: None,
            pattern: Some(pattern),
            modifiers: SolutionModifiers::default(),
        }
    }

    pub fn ask(pattern: GroupGraphPattern) -> Self {
        Self {
            form: QueryForm::Ask,
            dataset: None,
            pattern: Some(pattern),
            modifiers: SolutionModifiers::default(),
        }
    }

    pub fn construct(template: Vec<TriplePattern>, pattern: GroupGraphPattern) -> Self {
        Self {
            form: QueryForm::Construct(template),
            dataset: None,
            pattern: Some(pattern),
            modifiers: SolutionModifiers::default(),
        }
    }

    pub fn with_distinct(mut self) -> Self {
        if let QueryForm::Select(ref mut clause) = self.form {
            clause.distinct = DistinctQualifier::Distinct;
        }
        self
    }

    pub fn with_modifiers(mut self, modifiers: SolutionModifiers) -> Self {
        self.modifiers = modifiers;
        self
    }

    pub fn with_dataset(mut self, dataset: DatasetClause) -> Self {
        self.dataset = Some(dataset);
        self
    }

    /// Variables visible to the enclosing pattern when used as a sub-select
    pub fn projected_variables(&self) -> VarSet {
        match &self.form {
            QueryForm::Select(clause) => match &clause.items {
                SelectItems::Wildcard => self
                    .pattern
                    .as_ref()
                    .map(GroupGraphPattern::in_scope_variables)
                    .unwrap_or_default(),
                SelectItems::Explicit(items) => items
                    .iter()
                    .map(|item| match item {
                        SelectItem::Variable(v) => v.clone(),
                        SelectItem::Expression { alias, .. } => alias.clone(),
                    })
                    .collect(),
            },
            _ => VarSet::new(),
        }
    }
}

impl GroupGraphPattern {
    pub fn new(elements: Vec<GroupElement>) -> Self {
        Self { elements }
    }

    /// Group made of plain triple patterns only
    pub fn triples(triples: Vec<TriplePattern>) -> Self {
        Self::new(triples.into_iter().map(GroupElement::Triple).collect())
    }

    /// Variables a solution of this pattern may bind
    pub fn in_scope_variables(&self) -> VarSet {
        let mut vars = VarSet::new();
        for element in &self.elements {
            element.collect_in_scope(&mut vars);
        }
        vars
    }
}

impl GroupElement {
    fn collect_in_scope(&self, vars: &mut VarSet) {
        match self {
            GroupElement::Triple(t) => vars.extend(t.variables()),
            GroupElement::Path(p) => {
                vars.extend(p.subject.as_var().cloned());
                vars.extend(p.object.as_var().cloned());
            }
            GroupElement::Group(g)
            | GroupElement::Optional(g)
            | GroupElement::Service { pattern: g, .. }
            | GroupElement::Window { pattern: g, .. } => vars.extend(g.in_scope_variables()),
            GroupElement::Union(branches) => {
                for branch in branches {
                    vars.extend(branch.in_scope_variables());
                }
            }
            GroupElement::Graph { name, pattern } => {
                vars.extend(name.as_var().cloned());
                vars.extend(pattern.in_scope_variables());
            }
            GroupElement::Bind { variable, .. } => {
                vars.insert(variable.clone());
            }
            GroupElement::SubSelect(query) => vars.extend(query.projected_variables()),
            GroupElement::Predicate(atom) => {
                vars.extend(atom.arguments.iter().filter_map(|a| a.as_var().cloned()));
            }
            GroupElement::Minus(_) | GroupElement::Filter(_) => {}
        }
    }
}

impl PathPattern {
    pub fn new(subject: Item, path: PathExpression, object: Item) -> Self {
        Self {
            subject,
            path,
            object,
        }
    }
}

impl PathExpression {
    pub fn iri(iri: impl Into<String>) -> Self {
        PathExpression::Predicate(Literal::iri(iri))
    }

    pub fn inverse(self) -> Self {
        PathExpression::Inverse(Box::new(self))
    }

    pub fn then(self, next: PathExpression) -> Self {
        PathExpression::Sequence(Box::new(self), Box::new(next))
    }

    pub fn or(self, other: PathExpression) -> Self {
        PathExpression::Alternative(Box::new(self), Box::new(other))
    }

    pub fn one_or_more(self) -> Self {
        PathExpression::OneOrMore(Box::new(self))
    }

    pub fn zero_or_more(self) -> Self {
        PathExpression::ZeroOrMore(Box::new(self))
    }

    pub fn zero_or_one(self) -> Self {
        PathExpression::ZeroOrOne(Box::new(self))
    }

    pub fn repeat(self, min: u32, max: Option<u32>) -> Self {
        PathExpression::Repeat {
            path: Box::new(self),
            min,
            max,
        }
    }

    /// Plain single predicate, i.e. an ordinary triple pattern
    pub fn as_predicate(&self) -> Option<&Literal> {
        match self {
            PathExpression::Predicate(iri) => Some(iri),
            _ => None,
        }
    }
}

impl Expression {
    pub fn var(name: impl Into<String>) -> Self {
        Expression::Variable(Variable::new(name))
    }

    pub fn constant(literal: Literal) -> Self {
        Expression::Constant(literal)
    }

    pub fn item(item: &Item) -> Self {
        match item {
            Item::Var(v) => Expression::Variable(v.clone()),
            Item::Lit(l) => Expression::Constant(l.clone()),
        }
    }

    pub fn binary(left: Expression, operator: Operator, right: Expression) -> Self {
        Expression::Binary(BinaryExpression {
            left: Box::new(left),
            operator,
            right: Box::new(right),
        })
    }

    pub fn equal(left: Expression, right: Expression) -> Self {
        Self::binary(left, Operator::Equal, right)
    }

    pub fn not_equal(left: Expression, right: Expression) -> Self {
        Self::binary(left, Operator::NotEqual, right)
    }

    pub fn and(left: Expression, right: Expression) -> Self {
        Self::binary(left, Operator::And, right)
    }

    pub fn not(expression: Expression) -> Self {
        Expression::Unary(UnaryExpression {
            operator: Operator::Not,
            expression: Box::new(expression),
        })
    }

    pub fn call(name: impl Into<String>, arguments: Vec<Expression>) -> Self {
        Expression::FunctionCall(FunctionCall {
            name: name.into(),
            arguments,
        })
    }

    pub fn aggregate(function: AggregateFunction, argument: Option<Expression>) -> Self {
        Expression::Aggregate(AggregateExpression {
            function,
            distinct: false,
            argument: argument.map(Box::new),
        })
    }

    /// Variables referenced anywhere in the expression, including EXISTS bodies
    pub fn variables(&self) -> VarSet {
        let mut vars = BTreeSet::new();
        self.collect_variables(&mut vars);
        vars
    }

    fn collect_variables(&self, vars: &mut VarSet) {
        match self {
            Expression::Variable(v) | Expression::Bound(v) => {
                vars.insert(v.clone());
            }
            Expression::Constant(_) => {}
            Expression::Binary(b) => {
                b.left.collect_variables(vars);
                b.right.collect_variables(vars);
            }
            Expression::Unary(u) => u.expression.collect_variables(vars),
            Expression::FunctionCall(f) => {
                for arg in &f.arguments {
                    arg.collect_variables(vars);
                }
            }
            Expression::Aggregate(a) => {
                if let Some(arg) = &a.argument {
                    arg.collect_variables(vars);
                }
            }
            Expression::Exists(p) | Expression::NotExists(p) => {
                vars.extend(p.in_scope_variables());
            }
        }
    }

    pub fn contains_aggregate(&self) -> bool {
        match self {
            Expression::Aggregate(_) => true,
            Expression::Binary(b) => b.left.contains_aggregate() || b.right.contains_aggregate(),
            Expression::Unary(u) => u.expression.contains_aggregate(),
            Expression::FunctionCall(f) => f.arguments.iter().any(Expression::contains_aggregate),
            _ => false,
        }
    }

    pub fn contains_exists(&self) -> bool {
        match self {
            Expression::Exists(_) | Expression::NotExists(_) => true,
            Expression::Binary(b) => b.left.contains_exists() || b.right.contains_exists(),
            Expression::Unary(u) => u.expression.contains_exists(),
            Expression::FunctionCall(f) => f.arguments.iter().any(Expression::contains_exists),
            _ => false,
        }
    }

    /// Rewrite every aggregate sub-expression with `replace`, innermost first
    pub fn map_aggregates<F>(&self, replace: &mut F) -> Expression
    where
        F: FnMut(&AggregateExpression) -> Expression,
    {
        match self {
            Expression::Aggregate(a) => replace(a),
            Expression::Binary(b) => Expression::Binary(BinaryExpression {
                left: Box::new(b.left.map_aggregates(replace)),
                operator: b.operator,
                right: Box::new(b.right.map_aggregates(replace)),
            }),
            Expression::Unary(u) => Expression::Unary(UnaryExpression {
                operator: u.operator,
                expression: Box::new(u.expression.map_aggregates(replace)),
            }),
            Expression::FunctionCall(f) => Expression::FunctionCall(FunctionCall {
                name: f.name.clone(),
                arguments: f.arguments.iter().map(|a| a.map_aggregates(replace)).collect(),
            }),
            other => other.clone(),
        }
    }

    /// EXISTS / NOT EXISTS patterns in pre-order; the position is the key
    /// under which the nested plan is attached to its filter
    pub fn exists_patterns(&self) -> Vec<&GroupGraphPattern> {
        let mut out = Vec::new();
        self.collect_exists(&mut out);
        out
    }

    fn collect_exists<'a>(&'a self, out: &mut Vec<&'a GroupGraphPattern>) {
        match self {
            Expression::Exists(p) | Expression::NotExists(p) => out.push(p),
            Expression::Binary(b) => {
                b.left.collect_exists(out);
                b.right.collect_exists(out);
            }
            Expression::Unary(u) => u.expression.collect_exists(out),
            Expression::FunctionCall(f) => {
                for arg in &f.arguments {
                    arg.collect_exists(out);
                }
            }
            _ => {}
        }
    }
}

impl QuadPattern {
    pub fn default_graph(triple: TriplePattern) -> Self {
        Self {
            graph: None,
            triple,
        }
    }

    pub fn in_graph(graph: Item, triple: TriplePattern) -> Self {
        Self {
            graph: Some(graph),
            triple,
        }
    }

    pub fn has_variables(&self) -> bool {
        self.triple.has_variables() || self.graph.as_ref().map(Item::is_var).unwrap_or(false)
    }

    pub fn has_blank_nodes(&self) -> bool {
        self.triple.has_blank_nodes()
            || self
                .graph
                .as_ref()
                .and_then(Item::as_literal)
                .map(Literal::is_blank)
                .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tp(s: &str, p: &str, o: &str) -> TriplePattern {
        TriplePattern::new(Item::var(s), Item::iri(p), Item::var(o))
    }

    #[test]
    fn test_in_scope_variables_skip_minus_and_filter() {
        let pattern = GroupGraphPattern::new(vec![
            GroupElement::Triple(tp("a", "http://ex/p", "b")),
            GroupElement::Minus(GroupGraphPattern::triples(vec![tp("x", "http://ex/q", "y")])),
            GroupElement::Filter(Expression::var("z")),
            GroupElement::Bind {
                expression: Expression::var("a"),
                variable: Variable::new("c"),
            },
        ]);
        let vars: Vec<_> = pattern
            .in_scope_variables()
            .into_iter()
            .map(|v| v.name().to_string())
            .collect();
        assert_eq!(vars, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_map_aggregates_replaces_nested_aggregate() {
        let expr = Expression::binary(
            Expression::aggregate(AggregateFunction::Count, None),
            Operator::Plus,
            Expression::constant(Literal::integer(1)),
        );
        assert!(expr.contains_aggregate());
        let replaced = expr.map_aggregates(&mut |_| Expression::var("agg"));
        assert!(!replaced.contains_aggregate());
        assert!(replaced.variables().contains(&Variable::new("agg")));
    }

    #[test]
    fn test_exists_patterns_in_preorder() {
        let first = GroupGraphPattern::triples(vec![tp("a", "http://ex/p", "b")]);
        let second = GroupGraphPattern::triples(vec![tp("a", "http://ex/q", "c")]);
        let expr = Expression::and(
            Expression::Exists(first.clone()),
            Expression::NotExists(second.clone()),
        );
        let found = expr.exists_patterns();
        assert_eq!(found, vec![&first, &second]);
    }
}
