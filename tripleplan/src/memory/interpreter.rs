// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Reference interpreter for operator graphs
//!
//! Operators are evaluated in topological order over unflagged edges. A
//! feedback input reads what its producer emitted in the previous iteration
//! (nothing in the first one), and the whole graph is re-evaluated until no
//! output changes. Operators on a loop keep set semantics so that recursive
//! plans reach a fixpoint; everything else keeps bag semantics and row order.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use crate::ast::{OrderDirection, QuadPattern};
use crate::compile::{CompiledPlan, DatasetDescription};
use crate::error::{CompileError, CompileResult};
use crate::memory::expression::{aggregate, effective_boolean, evaluate, order, ExistsResults};
use crate::memory::row::{compatible, merge, resolve, unify, Binding, Fact, Row, UpdateAction};
use crate::memory::store::MemoryStore;
use crate::plan::{
    FilterOperator, GroupOperator, IndexScan, Operator, OperatorGraph, OperatorId, Renaming,
    ResultForm,
};
use crate::types::{Item, Literal, Quad, Triple, TriplePattern};

/// Upper bound on re-evaluations of a plan with loops
pub const DEFAULT_MAX_ITERATIONS: usize = 1024;

/// What the Result operators of a plan produced
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Evaluation {
    pub form: Option<ResultForm>,
    /// Solutions of SELECT and ASK plans, in order
    pub solutions: Vec<Binding>,
    /// Constructed, described or derived triples, without duplicates
    pub quads: Vec<Quad>,
    /// Derived predicate facts, without duplicates
    pub facts: Vec<Fact>,
    /// Store changes of an update plan
    pub actions: Vec<UpdateAction>,
    /// Number of full evaluations of the graph
    pub iterations: usize,
}

impl Evaluation {
    /// Answer of an ASK plan
    pub fn ask(&self) -> bool {
        !self.solutions.is_empty()
    }

    /// Derived or constructed triples, ignoring graphs
    pub fn triples(&self) -> BTreeSet<Triple> {
        self.quads.iter().map(|q| q.triple.clone()).collect()
    }
}

#[derive(Debug, Clone)]
pub struct Interpreter<'s> {
    store: &'s MemoryStore,
    dataset: DatasetDescription,
    max_iterations: usize,
}

impl<'s> Interpreter<'s> {
    pub fn new(store: &'s MemoryStore, dataset: DatasetDescription) -> Self {
        Self {
            store,
            dataset,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }

    /// Interpreter over the dataset a plan was compiled against
    pub fn for_plan(store: &'s MemoryStore, plan: &CompiledPlan) -> Self {
        Self::new(store, plan.dataset.clone())
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Run a compiled plan
    pub fn run(&self, plan: &CompiledPlan) -> CompileResult<Evaluation> {
        self.evaluate(&plan.graph)
    }

    pub fn evaluate(&self, graph: &OperatorGraph) -> CompileResult<Evaluation> {
        let order = graph.topological_order()?;
        let looped = graph.loop_members();
        let mut previous: HashMap<OperatorId, Vec<Row>> = HashMap::new();

        for iteration in 1..=self.max_iterations {
            let mut current: HashMap<OperatorId, Vec<Row>> = HashMap::with_capacity(order.len());
            for id in &order {
                let mut groups: BTreeMap<usize, Vec<Row>> = BTreeMap::new();
                for input in graph.inputs(*id) {
                    let outputs = if input.feedback { &previous } else { &current };
                    let rows = groups.entry(input.operand).or_default();
                    if let Some(produced) = outputs.get(&input.source) {
                        rows.extend(produced.iter().cloned());
                    }
                }
                let mut rows = self.evaluate_operator(graph, *id, groups)?;
                if looped.contains(id) {
                    let set: BTreeSet<Row> = rows.into_iter().collect();
                    rows = set.into_iter().collect();
                }
                current.insert(*id, rows);
            }
            if looped.is_empty() || current == previous {
                log::debug!("plan evaluated in {} iterations", iteration);
                return self.collect(graph, &current, iteration);
            }
            previous = current;
        }
        Err(CompileError::internal(format!(
            "plan evaluation did not converge within {} iterations",
            self.max_iterations
        )))
    }

    fn collect(
        &self,
        graph: &OperatorGraph,
        outputs: &HashMap<OperatorId, Vec<Row>>,
        iterations: usize,
    ) -> CompileResult<Evaluation> {
        let mut evaluation = Evaluation {
            iterations,
            ..Evaluation::default()
        };
        let mut seen_quads = HashSet::new();
        let mut seen_facts = HashSet::new();
        for id in graph.results() {
            let Operator::Result(form) = graph.operator(id)? else {
                continue;
            };
            let rows = outputs.get(&id).cloned().unwrap_or_default();
            match form {
                ResultForm::Select(vars) => {
                    for row in solutions(id, rows)? {
                        let row = if vars.is_empty() {
                            row
                        } else {
                            row.into_iter().filter(|(v, _)| vars.contains(v)).collect()
                        };
                        evaluation.solutions.push(row);
                    }
                }
                ResultForm::Ask => evaluation.solutions.extend(solutions(id, rows)?),
                ResultForm::Update => {
                    for row in rows {
                        match row {
                            Row::Action(action) => evaluation.actions.push(action),
                            other => return Err(unexpected(id, "update actions", &other)),
                        }
                    }
                }
                ResultForm::Construct
                | ResultForm::Describe
                | ResultForm::Materialize { .. } => {
                    let (triples, predicates) = match form {
                        ResultForm::Materialize { triples, predicates } => (*triples, *predicates),
                        _ => (true, false),
                    };
                    for row in rows {
                        match row {
                            Row::Quad(quad) if triples => {
                                if seen_quads.insert(quad.clone()) {
                                    evaluation.quads.push(quad);
                                }
                            }
                            Row::Fact(fact) if predicates => {
                                if seen_facts.insert(fact.clone()) {
                                    evaluation.facts.push(fact);
                                }
                            }
                            Row::Quad(_) | Row::Fact(_) => {}
                            other => return Err(unexpected(id, "triples or facts", &other)),
                        }
                    }
                }
            }
            evaluation.form.get_or_insert_with(|| form.clone());
        }
        Ok(evaluation)
    }

    fn evaluate_operator(
        &self,
        graph: &OperatorGraph,
        id: OperatorId,
        mut groups: BTreeMap<usize, Vec<Row>>,
    ) -> CompileResult<Vec<Row>> {
        let operator = graph.operator(id)?;
        let rows = match operator {
            Operator::Root => vec![Row::Solution(Binding::new())],
            Operator::Result(_) | Operator::Union | Operator::Window(_) => flatten(groups),
            Operator::IndexScan(scan) => {
                let input = solutions(id, flatten(groups))?;
                wrap(join(&input, &self.scan(scan)))
            }
            Operator::EmptyIndexScan { graph: g } => {
                let input = solutions(id, flatten(groups))?;
                wrap(join(&input, &self.probe(g.as_ref())))
            }
            Operator::Join => {
                let mut joined: Option<Vec<Binding>> = None;
                for rows in groups.into_values() {
                    let rows = solutions(id, rows)?;
                    joined = Some(match joined {
                        None => rows,
                        Some(left) => join(&left, &rows),
                    });
                }
                wrap(joined.unwrap_or_default())
            }
            Operator::Optional => {
                let outer = solutions(id, groups.remove(&0).unwrap_or_default())?;
                let inner = solutions(id, flatten(groups))?;
                let mut out = Vec::new();
                for left in &outer {
                    let before = out.len();
                    out.extend(
                        inner
                            .iter()
                            .filter(|right| compatible(left, right))
                            .map(|right| merge(left, right)),
                    );
                    if out.len() == before {
                        out.push(left.clone());
                    }
                }
                wrap(out)
            }
            Operator::Minus => {
                let outer = solutions(id, groups.remove(&0).unwrap_or_default())?;
                let removed = solutions(id, flatten(groups))?;
                let kept = outer
                    .into_iter()
                    .filter(|left| {
                        !removed.iter().any(|right| {
                            compatible(left, right) && left.keys().any(|v| right.contains_key(v))
                        })
                    })
                    .collect();
                wrap(kept)
            }
            Operator::Filter(filter) => {
                let input = solutions(id, flatten(groups))?;
                wrap(self.filter(filter, input)?)
            }
            Operator::RuleFilter(filter) => {
                let input = solutions(id, flatten(groups))?;
                let kept = input
                    .into_iter()
                    .filter(|row| {
                        filter.equalities.iter().all(|(l, r)| match (resolve(l, row), resolve(r, row)) {
                            (Some(a), Some(b)) => a == b,
                            _ => false,
                        })
                    })
                    .collect();
                wrap(kept)
            }
            Operator::Projection(vars) => {
                let input = solutions(id, flatten(groups))?;
                wrap(
                    input
                        .into_iter()
                        .map(|row| row.into_iter().filter(|(v, _)| vars.contains(v)).collect())
                        .collect(),
                )
            }
            Operator::Bind {
                variable,
                expression,
            } => {
                let none = ExistsResults::default();
                let mut input = solutions(id, flatten(groups))?;
                for row in &mut input {
                    if let Some(value) = evaluate(expression, row, &none) {
                        row.insert(variable.clone(), value);
                    }
                }
                wrap(input)
            }
            Operator::ReplaceVar(renaming) => {
                let input = solutions(id, flatten(groups))?;
                wrap(input.iter().map(|row| rename(renaming, row)).collect())
            }
            Operator::Sort(conditions) => {
                let none = ExistsResults::default();
                let mut input = solutions(id, flatten(groups))?;
                input.sort_by(|a, b| {
                    for condition in conditions {
                        let left = evaluate(&condition.expression, a, &none);
                        let right = evaluate(&condition.expression, b, &none);
                        let mut ordering = order(left.as_ref(), right.as_ref());
                        if matches!(condition.direction, OrderDirection::Descending) {
                            ordering = ordering.reverse();
                        }
                        if ordering.is_ne() {
                            return ordering;
                        }
                    }
                    std::cmp::Ordering::Equal
                });
                wrap(input)
            }
            Operator::Limit(n) => flatten(groups)
                .into_iter()
                .take(usize::try_from(*n).unwrap_or(usize::MAX))
                .collect(),
            Operator::Offset(n) => flatten(groups)
                .into_iter()
                .skip(usize::try_from(*n).unwrap_or(usize::MAX))
                .collect(),
            Operator::Distinct | Operator::IndexDistinct => {
                let mut seen = HashSet::new();
                flatten(groups)
                    .into_iter()
                    .filter(|row| seen.insert(row.clone()))
                    .collect()
            }
            Operator::Group(group) => {
                let input = solutions(id, flatten(groups))?;
                wrap(group_rows(group, &input))
            }
            Operator::Construct(template) => {
                let input = solutions(id, flatten(groups))?;
                let mut out = Vec::new();
                for (index, row) in input.iter().enumerate() {
                    for pattern in template {
                        if let Some(quad) = instantiate_quad(pattern, row, index) {
                            out.push(Row::Quad(quad));
                        }
                    }
                }
                out
            }
            Operator::Generate(pattern) => {
                let input = solutions(id, flatten(groups))?;
                input
                    .iter()
                    .filter_map(|row| instantiate(pattern, row, None))
                    .map(|triple| Row::Quad(Quad::new(None, triple)))
                    .collect()
            }
            Operator::ConstructPredicate(atom) => {
                let input = solutions(id, flatten(groups))?;
                input
                    .iter()
                    .filter_map(|row| {
                        let arguments: Option<Vec<Literal>> =
                            atom.arguments.iter().map(|a| resolve(a, row)).collect();
                        Some(Row::Fact(Fact {
                            name: atom.name.clone(),
                            arguments: arguments?,
                        }))
                    })
                    .collect()
            }
            Operator::TriplePatternMatch(pattern) => {
                let mut out = Vec::new();
                for row in flatten(groups) {
                    let Row::Quad(quad) = row else {
                        return Err(unexpected(id, "derived triples", &row));
                    };
                    if let Some(binding) = match_triple(pattern, &quad.triple, Binding::new()) {
                        out.push(Row::Solution(binding));
                    }
                }
                out
            }
            Operator::PredicatePattern(atom) => {
                let mut out = Vec::new();
                for row in flatten(groups) {
                    let Row::Fact(fact) = row else {
                        return Err(unexpected(id, "derived facts", &row));
                    };
                    if fact.name != atom.name || fact.arguments.len() != atom.arguments.len() {
                        continue;
                    }
                    let mut binding = Binding::new();
                    let matched = atom
                        .arguments
                        .iter()
                        .zip(&fact.arguments)
                        .all(|(item, value)| unify(item, value, &mut binding));
                    if matched {
                        out.push(Row::Solution(binding));
                    }
                }
                out
            }
            Operator::Insert | Operator::Delete => {
                let mut out = Vec::new();
                for row in flatten(groups) {
                    let Row::Quad(quad) = row else {
                        return Err(unexpected(id, "quads", &row));
                    };
                    out.push(Row::Action(if matches!(operator, Operator::Insert) {
                        UpdateAction::Insert(quad)
                    } else {
                        UpdateAction::Delete(quad)
                    }));
                }
                out
            }
            Operator::Load {
                source,
                destination,
                silent,
            } => once(
                groups,
                UpdateAction::Load {
                    source: source.clone(),
                    destination: destination.clone(),
                    silent: *silent,
                },
            ),
            Operator::Clear { target, silent } => once(
                groups,
                UpdateAction::Clear {
                    target: target.clone(),
                    silent: *silent,
                },
            ),
            Operator::Create { graph: g, silent } => once(
                groups,
                UpdateAction::Create {
                    graph: g.clone(),
                    silent: *silent,
                },
            ),
            Operator::Drop { target, silent } => once(
                groups,
                UpdateAction::Drop {
                    target: target.clone(),
                    silent: *silent,
                },
            ),
            Operator::Service { endpoint, .. } => {
                return Err(CompileError::unsupported(format!(
                    "the in-memory interpreter cannot call SERVICE {}",
                    endpoint
                )))
            }
            Operator::Describe(items) => {
                let input = solutions(id, flatten(groups))?;
                let default = self.store.default_graph(&self.dataset);
                let mut resources: Vec<Literal> = Vec::new();
                for row in &input {
                    for item in items {
                        if let Some(resource) = resolve(item, row) {
                            if !resources.contains(&resource) {
                                resources.push(resource);
                            }
                        }
                    }
                }
                resources
                    .iter()
                    .flat_map(|r| default.iter().filter(move |t| t.subject == *r))
                    .map(|t| Row::Quad(Quad::new(None, t.clone())))
                    .collect()
            }
        };
        log::trace!("{} {} produced {} rows", id, operator.label(), rows.len());
        Ok(rows)
    }

    fn filter(&self, filter: &FilterOperator, input: Vec<Binding>) -> CompileResult<Vec<Binding>> {
        let mut exists = ExistsResults::default();
        for (position, pattern) in filter.expression.exists_patterns().into_iter().enumerate() {
            let Some(nested) = filter.exists.get(&position) else {
                return Err(CompileError::internal(format!(
                    "filter has no nested plan for EXISTS pattern {}",
                    position
                )));
            };
            let nested = Interpreter::new(self.store, self.dataset.clone())
                .with_max_iterations(self.max_iterations)
                .evaluate(nested)?;
            exists.push(pattern, nested.solutions);
        }
        Ok(input
            .into_iter()
            .filter(|row| {
                evaluate(&filter.expression, row, &exists)
                    .and_then(|value| effective_boolean(&value))
                    .unwrap_or(false)
            })
            .collect())
    }

    /// Solutions of a basic graph pattern in the scan's graph(s)
    fn scan(&self, scan: &IndexScan) -> Vec<Binding> {
        match &scan.graph {
            None => match_patterns(
                &scan.patterns,
                &self.store.default_graph(&self.dataset),
                Binding::new(),
            ),
            Some(Item::Lit(g)) => {
                if !self.store.visible_graphs(&self.dataset).contains(g) {
                    return Vec::new();
                }
                let triples: BTreeSet<Triple> = self.store.triples_in(Some(g)).cloned().collect();
                match_patterns(&scan.patterns, &triples, Binding::new())
            }
            Some(Item::Var(v)) => {
                let mut out = Vec::new();
                for g in self.store.visible_graphs(&self.dataset) {
                    let triples: BTreeSet<Triple> = self.store.triples_in(Some(&g)).cloned().collect();
                    let mut start = Binding::new();
                    start.insert(v.clone(), g);
                    out.extend(match_patterns(&scan.patterns, &triples, start));
                }
                out
            }
        }
    }

    fn probe(&self, graph: Option<&Item>) -> Vec<Binding> {
        match graph {
            Some(Item::Var(v)) => self
                .store
                .visible_graphs(&self.dataset)
                .into_iter()
                .map(|g| {
                    let mut row = Binding::new();
                    row.insert(v.clone(), g);
                    row
                })
                .collect(),
            _ => vec![Binding::new()],
        }
    }
}

fn flatten(groups: BTreeMap<usize, Vec<Row>>) -> Vec<Row> {
    groups.into_values().flatten().collect()
}

fn wrap(rows: Vec<Binding>) -> Vec<Row> {
    rows.into_iter().map(Row::Solution).collect()
}

fn solutions(id: OperatorId, rows: Vec<Row>) -> CompileResult<Vec<Binding>> {
    rows.into_iter()
        .map(|row| match row {
            Row::Solution(binding) => Ok(binding),
            other => Err(unexpected(id, "solutions", &other)),
        })
        .collect()
}

fn unexpected(id: OperatorId, expected: &str, row: &Row) -> CompileError {
    CompileError::internal(format!("{} expected {} but received {:?}", id, expected, row))
}

/// One action if the operator's probe produced a row
fn once(groups: BTreeMap<usize, Vec<Row>>, action: UpdateAction) -> Vec<Row> {
    if groups.values().any(|rows| !rows.is_empty()) {
        vec![Row::Action(action)]
    } else {
        Vec::new()
    }
}

fn join(left: &[Binding], right: &[Binding]) -> Vec<Binding> {
    let mut out = Vec::new();
    for l in left {
        for r in right {
            if compatible(l, r) {
                out.push(merge(l, r));
            }
        }
    }
    out
}

fn match_triple(pattern: &TriplePattern, triple: &Triple, mut binding: Binding) -> Option<Binding> {
    let matched = unify(&pattern.subject, &triple.subject, &mut binding)
        && unify(&pattern.predicate, &triple.predicate, &mut binding)
        && unify(&pattern.object, &triple.object, &mut binding);
    matched.then_some(binding)
}

fn match_patterns(patterns: &[TriplePattern], triples: &BTreeSet<Triple>, start: Binding) -> Vec<Binding> {
    let mut rows = vec![start];
    for pattern in patterns {
        rows = rows
            .iter()
            .flat_map(|row| triples.iter().filter_map(move |t| match_triple(pattern, t, row.clone())))
            .collect();
    }
    rows
}

/// Simultaneous renaming of one solution
fn rename(renaming: &Renaming, row: &Binding) -> Binding {
    let sources: BTreeSet<_> = renaming.pairs.values().collect();
    let mut out: Binding = row
        .iter()
        .filter(|(v, _)| !sources.contains(v) || renaming.pairs.contains_key(*v))
        .map(|(v, l)| (v.clone(), l.clone()))
        .collect();
    for (target, source) in &renaming.pairs {
        match row.get(source) {
            Some(value) => {
                out.insert(target.clone(), value.clone());
            }
            None => {
                out.remove(target);
            }
        }
    }
    out
}

fn group_rows(group: &GroupOperator, input: &[Binding]) -> Vec<Binding> {
    let mut order: Vec<Vec<Option<Literal>>> = Vec::new();
    let mut members: HashMap<Vec<Option<Literal>>, Vec<&Binding>> = HashMap::new();
    for row in input {
        let key: Vec<Option<Literal>> = group.keys.iter().map(|k| row.get(k).cloned()).collect();
        let entry = members.entry(key.clone()).or_default();
        if entry.is_empty() {
            order.push(key);
        }
        entry.push(row);
    }
    // aggregating without keys over no rows still yields one group
    if input.is_empty() && group.keys.is_empty() {
        order.push(Vec::new());
        members.insert(Vec::new(), Vec::new());
    }

    let mut out = Vec::with_capacity(order.len());
    for key in order {
        let rows = members.get(&key).map(Vec::as_slice).unwrap_or(&[]);
        let mut binding = Binding::new();
        for (var, value) in group.keys.iter().zip(key) {
            if let Some(value) = value {
                binding.insert(var.clone(), value);
            }
        }
        for (var, expression) in &group.aggregates {
            if let Some(value) = aggregate(expression, rows) {
                binding.insert(var.clone(), value);
            }
        }
        out.push(binding);
    }
    out
}

/// Ground a triple pattern; blank nodes are made fresh per row when `row_index` is given
fn instantiate(pattern: &TriplePattern, row: &Binding, row_index: Option<usize>) -> Option<Triple> {
    let ground = |item: &Item| -> Option<Literal> {
        match (item, row_index) {
            (Item::Lit(Literal::Blank(label)), Some(index)) => {
                Some(Literal::blank(format!("{}_{}", label, index)))
            }
            _ => resolve(item, row),
        }
    };
    let subject = ground(&pattern.subject)?;
    let predicate = ground(&pattern.predicate)?;
    let object = ground(&pattern.object)?;
    let valid_subject = subject.is_iri() || subject.is_blank();
    (valid_subject && predicate.is_iri()).then(|| Triple::new(subject, predicate, object))
}

fn instantiate_quad(pattern: &QuadPattern, row: &Binding, row_index: usize) -> Option<Quad> {
    let triple = instantiate(&pattern.triple, row, Some(row_index))?;
    let graph = match &pattern.graph {
        None => None,
        Some(item) => {
            let g = resolve(item, row)?;
            if !g.is_iri() {
                return None;
            }
            Some(g)
        }
    };
    Some(Quad::new(graph, triple))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Variable;

    fn iri(s: &str) -> Literal {
        Literal::iri(format!("http://ex/{}", s))
    }

    fn store(edges: &[(&str, &str)]) -> MemoryStore {
        edges
            .iter()
            .map(|(s, o)| Quad::new(None, Triple::new(iri(s), iri("p"), iri(o))))
            .collect()
    }

    fn scan(s: &str, o: &str) -> Operator {
        Operator::IndexScan(IndexScan {
            patterns: vec![TriplePattern::new(Item::var(s), Item::Lit(iri("p")), Item::var(o))],
            graph: None,
            source: crate::plan::ScanSource {
                dataset: "mem".to_string(),
                in_memory: true,
            },
        })
    }

    #[test]
    fn test_join_over_shared_variable() {
        let data = store(&[("a", "b"), ("b", "c"), ("b", "d")]);
        let mut graph = OperatorGraph::new();
        let root = graph.root();
        let left = graph.add(scan("x", "y"));
        let right = graph.add(scan("y", "z"));
        let join = graph.add(Operator::Join);
        let result = graph.add(Operator::Result(ResultForm::Select(vec![
            Variable::new("x"),
            Variable::new("z"),
        ])));
        graph.connect(root, left, 0).unwrap();
        graph.connect(root, right, 0).unwrap();
        graph.connect(left, join, 0).unwrap();
        graph.connect(right, join, 1).unwrap();
        graph.connect(join, result, 0).unwrap();

        let evaluation = Interpreter::new(&data, DatasetDescription::default())
            .evaluate(&graph)
            .unwrap();
        assert_eq!(evaluation.solutions.len(), 2);
        assert!(evaluation.solutions.iter().all(|s| s.len() == 2));
        assert_eq!(evaluation.iterations, 1);
    }

    #[test]
    fn test_feedback_loop_reaches_fixpoint() {
        let data = store(&[("a", "b"), ("b", "c"), ("c", "d")]);
        let mut graph = OperatorGraph::new();
        let root = graph.root();
        let base = graph.add(scan("s", "o"));
        let union = graph.add(Operator::Union);
        let distinct = graph.add(Operator::Distinct);
        let step = graph.add(Operator::replace_var(Variable::new("m"), Variable::new("o")));
        let edge = graph.add(scan("m", "o"));
        let join = graph.add(Operator::Join);
        let project = graph.add(Operator::projection(vec![Variable::new("s"), Variable::new("o")]));
        let result = graph.add(Operator::Result(ResultForm::Select(vec![])));
        graph.connect(root, base, 0).unwrap();
        graph.connect(root, edge, 0).unwrap();
        graph.connect(base, union, 0).unwrap();
        graph.connect(union, distinct, 0).unwrap();
        graph.connect(distinct, step, 0).unwrap();
        graph.connect(step, join, 0).unwrap();
        graph.connect(edge, join, 1).unwrap();
        graph.connect(join, project, 0).unwrap();
        graph.connect_feedback(project, union, 1).unwrap();
        graph.connect(distinct, result, 0).unwrap();

        let evaluation = Interpreter::new(&data, DatasetDescription::default())
            .evaluate(&graph)
            .unwrap();
        // a->b a->c a->d b->c b->d c->d
        assert_eq!(evaluation.solutions.len(), 6);
        assert!(evaluation.iterations > 1);
    }

    #[test]
    fn test_iteration_bound_is_an_error() {
        let data = store(&[("a", "b"), ("b", "c"), ("c", "d")]);
        let mut graph = OperatorGraph::new();
        let root = graph.root();
        let base = graph.add(scan("s", "o"));
        let union = graph.add(Operator::Union);
        let step = graph.add(Operator::replace_var(Variable::new("m"), Variable::new("o")));
        let edge = graph.add(scan("m", "o"));
        let join = graph.add(Operator::Join);
        let project = graph.add(Operator::projection(vec![Variable::new("s"), Variable::new("o")]));
        graph.connect(root, base, 0).unwrap();
        graph.connect(root, edge, 0).unwrap();
        graph.connect(base, union, 0).unwrap();
        graph.connect(union, step, 0).unwrap();
        graph.connect(step, join, 0).unwrap();
        graph.connect(edge, join, 1).unwrap();
        graph.connect(join, project, 0).unwrap();
        graph.connect_feedback(project, union, 1).unwrap();

        let err = Interpreter::new(&data, DatasetDescription::default())
            .with_max_iterations(1)
            .evaluate(&graph)
            .unwrap_err();
        assert!(matches!(err, CompileError::InternalBuild(_)));
    }

    #[test]
    fn test_rename_is_simultaneous() {
        let mut pairs = BTreeMap::new();
        pairs.insert(Variable::new("a"), Variable::new("b"));
        pairs.insert(Variable::new("b"), Variable::new("a"));
        let renaming = Renaming::new(pairs);
        let row: Binding = [(Variable::new("a"), iri("1")), (Variable::new("b"), iri("2"))]
            .into_iter()
            .collect();
        let renamed = rename(&renaming, &row);
        assert_eq!(renamed.get(&Variable::new("a")), Some(&iri("2")));
        assert_eq!(renamed.get(&Variable::new("b")), Some(&iri("1")));
    }

    #[test]
    fn test_group_without_keys_over_no_rows() {
        let group = GroupOperator {
            keys: vec![],
            aggregates: vec![(
                Variable::new("n"),
                crate::ast::AggregateExpression {
                    function: crate::ast::AggregateFunction::Count,
                    distinct: false,
                    argument: None,
                },
            )],
        };
        let out = group_rows(&group, &[]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].get(&Variable::new("n")), Some(&Literal::integer(0)));
    }
}
