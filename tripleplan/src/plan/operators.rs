// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Plan node library
//!
//! The closed set of operator kinds a compiled plan is made of. Each kind
//! documents its operand layout; the variable-set contract of every kind lives
//! in [`crate::plan::variables`].

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::ast::{
    AggregateExpression, Expression, GraphTarget, GroupGraphPattern, OrderCondition,
    PredicateAtom, QuadPattern, WindowSpec,
};
use crate::plan::graph::OperatorGraph;
use crate::types::{Item, Literal, TriplePattern, VarSet, Variable};

/// Plan operator
///
/// Multi-input kinds read their inputs by operand index; several inputs on the
/// same operand index form an operand group whose outputs are read as a bag
/// union.
#[derive(Debug, Clone, PartialEq)]
pub enum Operator {
    /// Source of every plan; emits a single empty row
    Root,

    /// Terminal operator handed to the execution layer
    Result(ResultForm),

    /// Scan of stored triples matching all patterns (a basic graph pattern)
    IndexScan(IndexScan),

    /// One-row probe; the identity element of joins
    EmptyIndexScan { graph: Option<Item> },

    /// n-ary natural join over operands 0..n
    Join,

    /// Left outer join; operand 0 is the outer side
    Optional,

    /// Operand 0 minus compatible rows of operand 1
    Minus,

    /// Bag union of all inputs
    Union,

    Filter(FilterOperator),

    /// Conjunction of term equalities (`sameTerm`), cheaper than a general filter
    RuleFilter(RuleFilter),

    Projection(VarSet),

    Bind {
        variable: Variable,
        expression: Expression,
    },

    /// Simultaneous renaming `target := source`
    ReplaceVar(Renaming),

    Sort(Vec<OrderCondition>),
    Limit(u64),
    Offset(u64),
    Distinct,

    /// Incremental index-backed deduplication over a single scan
    IndexDistinct,

    Group(GroupOperator),

    /// Instantiates quad templates for every input row
    Construct(Vec<QuadPattern>),

    /// Rule head: derives one triple per input row
    Generate(TriplePattern),

    /// Rule head: derives one predicate fact per input row
    ConstructPredicate(PredicateAtom),

    /// Matches derived triples against a body pattern
    TriplePatternMatch(TriplePattern),

    /// Matches derived predicate facts against a body atom
    PredicatePattern(PredicateAtom),

    /// Adds the quads produced by its input
    Insert,

    /// Removes the quads produced by its input
    Delete,

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

    /// Remote evaluation of a group pattern
    Service {
        endpoint: Item,
        pattern: GroupGraphPattern,
        silent: bool,
    },

    /// Restricts its input to a stream window
    Window(WindowSpec),

    /// Emits the description of the given resources
    Describe(Vec<Item>),
}

/// Fieldless operator tag, used to key the start-node index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OperatorKind {
    Root,
    Result,
    IndexScan,
    EmptyIndexScan,
    Join,
    Optional,
    Minus,
    Union,
    Filter,
    RuleFilter,
    Projection,
    Bind,
    ReplaceVar,
    Sort,
    Limit,
    Offset,
    Distinct,
    IndexDistinct,
    Group,
    Construct,
    Generate,
    ConstructPredicate,
    TriplePatternMatch,
    PredicatePattern,
    Insert,
    Delete,
    Load,
    Clear,
    Create,
    Drop,
    Service,
    Window,
    Describe,
}

/// What the Result operator hands to the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResultForm {
    /// Solution sequence over the listed variables, in order
    Select(Vec<Variable>),
    Construct,
    Ask,
    Describe,
    Update,
    /// Output of an inference-rule program
    Materialize { triples: bool, predicates: bool },
}

/// Where an index scan reads from
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScanSource {
    /// Name of the dataset the scan was created for
    pub dataset: String,
    /// Scans over the same in-memory dataset can be merged into one
    pub in_memory: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexScan {
    pub patterns: Vec<TriplePattern>,
    /// `None` reads the default graph(s); a variable ranges over named graphs
    pub graph: Option<Item>,
    pub source: ScanSource,
}

/// Handle returned by the evaluator for a bound filter expression
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterBinding {
    pub evaluator: String,
    pub slot: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterOperator {
    pub expression: Expression,
    /// Nested plans for EXISTS / NOT EXISTS, keyed by their pre-order position
    /// in the expression
    pub exists: BTreeMap<usize, OperatorGraph>,
    pub binding: Option<FilterBinding>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RuleFilter {
    pub equalities: Vec<(Item, Item)>,
}

/// Variable renaming carried by ReplaceVar, keyed by target variable
///
/// Inputs bound to a source are re-bound to its target(s); other variables
/// pass through unless they are themselves a source and not a target.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Renaming {
    pub pairs: BTreeMap<Variable, Variable>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupOperator {
    pub keys: Vec<Variable>,
    pub aggregates: Vec<(Variable, AggregateExpression)>,
}

impl Operator {
    pub fn kind(&self) -> OperatorKind {
        match self {
            Operator::Root => OperatorKind::Root,
            Operator::Result(_) => OperatorKind::Result,
            Operator::IndexScan(_) => OperatorKind::IndexScan,
            Operator::EmptyIndexScan { .. } => OperatorKind::EmptyIndexScan,
            Operator::Join => OperatorKind::Join,
            Operator::Optional => OperatorKind::Optional,
            Operator::Minus => OperatorKind::Minus,
            Operator::Union => OperatorKind::Union,
            Operator::Filter(_) => OperatorKind::Filter,
            Operator::RuleFilter(_) => OperatorKind::RuleFilter,
            Operator::Projection(_) => OperatorKind::Projection,
            Operator::Bind { .. } => OperatorKind::Bind,
            Operator::ReplaceVar(_) => OperatorKind::ReplaceVar,
            Operator::Sort(_) => OperatorKind::Sort,
            Operator::Limit(_) => OperatorKind::Limit,
            Operator::Offset(_) => OperatorKind::Offset,
            Operator::Distinct => OperatorKind::Distinct,
            Operator::IndexDistinct => OperatorKind::IndexDistinct,
            Operator::Group(_) => OperatorKind::Group,
            Operator::Construct(_) => OperatorKind::Construct,
            Operator::Generate(_) => OperatorKind::Generate,
            Operator::ConstructPredicate(_) => OperatorKind::ConstructPredicate,
            Operator::TriplePatternMatch(_) => OperatorKind::TriplePatternMatch,
            Operator::PredicatePattern(_) => OperatorKind::PredicatePattern,
            Operator::Insert => OperatorKind::Insert,
            Operator::Delete => OperatorKind::Delete,
            Operator::Load { .. } => OperatorKind::Load,
            Operator::Clear { .. } => OperatorKind::Clear,
            Operator::Create { .. } => OperatorKind::Create,
            Operator::Drop { .. } => OperatorKind::Drop,
            Operator::Service { .. } => OperatorKind::Service,
            Operator::Window(_) => OperatorKind::Window,
            Operator::Describe(_) => OperatorKind::Describe,
        }
    }

    pub fn projection<I>(vars: I) -> Self
    where
        I: IntoIterator<Item = Variable>,
    {
        Operator::Projection(vars.into_iter().collect())
    }

    pub fn filter(expression: Expression) -> Self {
        Operator::Filter(FilterOperator {
            expression,
            exists: BTreeMap::new(),
            binding: None,
        })
    }

    pub fn rule_filter(left: Item, right: Item) -> Self {
        Operator::RuleFilter(RuleFilter {
            equalities: vec![(left, right)],
        })
    }

    pub fn bind(variable: Variable, expression: Expression) -> Self {
        Operator::Bind {
            variable,
            expression,
        }
    }

    pub fn replace_var(target: Variable, source: Variable) -> Self {
        let mut pairs = BTreeMap::new();
        pairs.insert(target, source);
        Operator::ReplaceVar(Renaming { pairs })
    }

    pub fn as_index_scan(&self) -> Option<&IndexScan> {
        match self {
            Operator::IndexScan(scan) => Some(scan),
            _ => None,
        }
    }

    /// Whether the operator produces nothing once the given operand group is empty
    pub fn requires_operand(&self, operand: usize) -> bool {
        match self {
            Operator::Root | Operator::Result(_) | Operator::Union => false,
            Operator::Optional | Operator::Minus => operand == 0,
            _ => true,
        }
    }

    /// Variables the operator reads (not including what flows through it)
    pub fn referenced_variables(&self) -> VarSet {
        match self {
            Operator::Filter(f) => f.expression.variables(),
            Operator::RuleFilter(f) => f.variables(),
            Operator::Bind { expression, .. } => expression.variables(),
            Operator::ReplaceVar(r) => r.pairs.values().cloned().collect(),
            Operator::Projection(vars) => vars.clone(),
            Operator::Sort(conditions) => conditions
                .iter()
                .flat_map(|c| c.expression.variables())
                .collect(),
            _ => BTreeSet::new(),
        }
    }

    /// One-line description used by explain output and debug logs
    pub fn label(&self) -> String {
        match self {
            Operator::Root => "Root".to_string(),
            Operator::Result(form) => format!("Result[{:?}]", form),
            Operator::IndexScan(scan) => {
                let patterns: Vec<String> = scan.patterns.iter().map(|p| p.to_string()).collect();
                match &scan.graph {
                    Some(g) => format!("IndexScan[{}] graph={}", patterns.join(" "), g),
                    None => format!("IndexScan[{}]", patterns.join(" ")),
                }
            }
            Operator::EmptyIndexScan { graph } => match graph {
                Some(g) => format!("EmptyIndexScan graph={}", g),
                None => "EmptyIndexScan".to_string(),
            },
            Operator::Filter(f) => {
                if f.exists.is_empty() {
                    format!("Filter[{:?}]", f.expression)
                } else {
                    format!("Filter[{:?}] nested={}", f.expression, f.exists.len())
                }
            }
            Operator::RuleFilter(f) => {
                let eqs: Vec<String> = f
                    .equalities
                    .iter()
                    .map(|(l, r)| format!("{} == {}", l, r))
                    .collect();
                format!("RuleFilter[{}]", eqs.join(", "))
            }
            Operator::Projection(vars) => format!("Projection[{}]", join_vars(vars.iter())),
            Operator::Bind {
                variable,
                expression,
            } => format!("Bind[{} := {:?}]", variable, expression),
            Operator::ReplaceVar(r) => {
                let pairs: Vec<String> = r
                    .pairs
                    .iter()
                    .map(|(t, s)| format!("{} := {}", t, s))
                    .collect();
                format!("ReplaceVar[{}]", pairs.join(", "))
            }
            Operator::Sort(conditions) => format!("Sort[{} keys]", conditions.len()),
            Operator::Limit(n) => format!("Limit[{}]", n),
            Operator::Offset(n) => format!("Offset[{}]", n),
            Operator::Group(g) => {
                let aggs: Vec<String> = g.aggregates.iter().map(|(v, _)| v.to_string()).collect();
                format!(
                    "Group[keys={}; aggregates={}]",
                    join_vars(g.keys.iter()),
                    aggs.join(" ")
                )
            }
            Operator::Construct(template) => format!("Construct[{} quads]", template.len()),
            Operator::Generate(t) => format!("Generate{}", t),
            Operator::ConstructPredicate(a) => format!("ConstructPredicate[{}]", atom_label(a)),
            Operator::TriplePatternMatch(t) => format!("TriplePattern{}", t),
            Operator::PredicatePattern(a) => format!("PredicatePattern[{}]", atom_label(a)),
            Operator::Load {
                source,
                destination,
                ..
            } => match destination {
                Some(d) => format!("Load[{} into {}]", source, d),
                None => format!("Load[{}]", source),
            },
            Operator::Clear { target, .. } => format!("Clear[{:?}]", target),
            Operator::Create { graph, .. } => format!("Create[{}]", graph),
            Operator::Drop { target, .. } => format!("Drop[{:?}]", target),
            Operator::Service { endpoint, .. } => format!("Service[{}]", endpoint),
            Operator::Window(w) => format!("Window[{} {:?}]", w.stream, w.kind),
            Operator::Describe(items) => {
                let items: Vec<String> = items.iter().map(|i| i.to_string()).collect();
                format!("Describe[{}]", items.join(" "))
            }
            Operator::Join
            | Operator::Optional
            | Operator::Minus
            | Operator::Union
            | Operator::Distinct
            | Operator::IndexDistinct
            | Operator::Insert
            | Operator::Delete => format!("{:?}", self.kind()),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl IndexScan {
    pub fn variables(&self) -> VarSet {
        let mut vars: VarSet = self.patterns.iter().flat_map(|p| p.variables()).collect();
        if let Some(Item::Var(g)) = &self.graph {
            vars.insert(g.clone());
        }
        vars
    }
}

impl RuleFilter {
    pub fn variables(&self) -> VarSet {
        self.equalities
            .iter()
            .flat_map(|(l, r)| [l, r])
            .filter_map(|item| item.as_var().cloned())
            .collect()
    }
}

impl Renaming {
    pub fn new(pairs: BTreeMap<Variable, Variable>) -> Self {
        Self { pairs }
    }

    /// Variable set produced from `input` by this renaming
    pub fn apply_to(&self, input: &VarSet) -> VarSet {
        let sources: BTreeSet<&Variable> = self.pairs.values().collect();
        let mut out: VarSet = input
            .iter()
            .filter(|v| !sources.contains(v) || self.pairs.contains_key(*v))
            .cloned()
            .collect();
        for (target, source) in &self.pairs {
            if input.contains(source) {
                out.insert(target.clone());
            } else {
                out.remove(target);
            }
        }
        out
    }
}

impl GroupOperator {
    pub fn output_variables(&self) -> VarSet {
        self.keys
            .iter()
            .cloned()
            .chain(self.aggregates.iter().map(|(v, _)| v.clone()))
            .collect()
    }
}

fn join_vars<'a>(vars: impl Iterator<Item = &'a Variable>) -> String {
    vars.map(|v| v.to_string()).collect::<Vec<_>>().join(" ")
}

fn atom_label(atom: &PredicateAtom) -> String {
    let args: Vec<String> = atom.arguments.iter().map(|a| a.to_string()).collect();
    format!("{}({})", atom.name, args.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(names: &[&str]) -> VarSet {
        names.iter().map(|n| Variable::new(*n)).collect()
    }

    #[test]
    fn test_renaming_drops_sources_that_are_not_targets() {
        let renaming = Operator::replace_var(Variable::new("z"), Variable::new("o"));
        let Operator::ReplaceVar(r) = renaming else {
            panic!("expected ReplaceVar");
        };
        assert_eq!(r.apply_to(&vars(&["s", "o"])), vars(&["s", "z"]));
    }

    #[test]
    fn test_renaming_is_simultaneous() {
        let mut pairs = BTreeMap::new();
        pairs.insert(Variable::new("a"), Variable::new("b"));
        pairs.insert(Variable::new("b"), Variable::new("a"));
        let r = Renaming::new(pairs);
        assert_eq!(r.apply_to(&vars(&["a", "b", "c"])), vars(&["a", "b", "c"]));
        assert_eq!(r.apply_to(&vars(&["a", "c"])), vars(&["b", "c"]));
    }

    #[test]
    fn test_kind_tags_match() {
        assert_eq!(Operator::Join.kind(), OperatorKind::Join);
        assert_eq!(
            Operator::projection(vec![Variable::new("s")]).kind(),
            OperatorKind::Projection
        );
        assert_eq!(
            Operator::rule_filter(Item::var("a"), Item::iri("http://ex/x")).kind(),
            OperatorKind::RuleFilter
        );
    }
}
