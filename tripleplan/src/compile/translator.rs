// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! AST translator
//!
//! Walks the syntax tree and assembles one operator graph per query, update
//! operation or rule program. Construction runs from the Result downwards: each
//! step receives a [`Cursor`] naming the operand it must feed.

use std::collections::BTreeMap;

use crate::ast::{
    AggregateExpression, DatasetClause, DistinctQualifier, Document, Expression, GroupCondition,
    GroupElement, GroupGraphPattern, OrderCondition, Query, QueryForm, SelectClause, SelectItem,
    SelectItems,
};
use crate::compile::bindings::{sort_bindings, ComputedBinding};
use crate::compile::collaborators::{Dataset, DatasetDescription, Evaluator, IndexScanFactory};
use crate::compile::cursor::Cursor;
use crate::compile::path::PathCompiler;
use crate::config::CompilerConfig;
use crate::error::{CompileError, CompileResult};
use crate::plan::{
    FilterOperator, GroupOperator, Operator, OperatorGraph, OperatorId, ResultForm,
};
use crate::types::{Item, TriplePattern, VarSet, Variable};

/// Plan produced for one query, update operation or rule program
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledPlan {
    pub graph: OperatorGraph,
    /// Graph identifiers the plan was compiled against
    pub dataset: DatasetDescription,
}

/// Operators of a rule program that are wired together after all rules are built
#[derive(Debug, Default)]
pub(crate) struct RuleWiring {
    pub generates: Vec<OperatorId>,
    pub triple_matches: Vec<OperatorId>,
    pub predicate_heads: Vec<OperatorId>,
    pub predicate_patterns: Vec<OperatorId>,
}

/// One independent join partner of a group segment
enum Partner<'g> {
    /// OPTIONAL / MINUS / BIND together with everything before it
    Closed(&'g GroupElement, &'g [&'g GroupElement]),
    Triples(Vec<TriplePattern>),
    Element(&'g GroupElement),
}

/// Translates syntax trees into operator graphs
pub struct Translator<'a> {
    pub(crate) factory: &'a dyn IndexScanFactory,
    pub(crate) evaluator: &'a dyn Evaluator,
    pub(crate) config: &'a CompilerConfig,
    pub(crate) dataset: Box<dyn Dataset>,
    pub(crate) graph: OperatorGraph,
    pub(crate) next_var: usize,
    pub(crate) rules: Option<RuleWiring>,
}

impl<'a> Translator<'a> {
    pub fn new(
        factory: &'a dyn IndexScanFactory,
        dataset: Box<dyn Dataset>,
        evaluator: &'a dyn Evaluator,
        config: &'a CompilerConfig,
    ) -> Self {
        Self {
            factory,
            evaluator,
            config,
            dataset,
            graph: OperatorGraph::new(),
            next_var: 0,
            rules: None,
        }
    }

    /// Translate any document; updates produce one plan per operation
    pub fn translate(&mut self, document: &Document) -> CompileResult<Vec<CompiledPlan>> {
        match document {
            Document::Query(query) => Ok(vec![self.translate_query(query)?]),
            Document::Update(update) => self.translate_update(update),
            Document::Rules(program) => Ok(vec![self.translate_rules(program)?]),
        }
    }

    /// Translate a SELECT / CONSTRUCT / ASK / DESCRIBE query
    pub fn translate_query(&mut self, query: &Query) -> CompileResult<CompiledPlan> {
        log::debug!("translating {} query", form_name(&query.form));
        let saved = self.enter_dataset(query.dataset.as_ref())?;
        let outcome = self.build_query(query);
        if let Some(previous) = saved {
            self.dataset = previous;
        }
        outcome
    }

    fn build_query(&mut self, query: &Query) -> CompileResult<CompiledPlan> {
        let description = DatasetDescription::of(self.dataset.as_ref());
        self.graph = OperatorGraph::new();

        match &query.form {
            QueryForm::Select(clause) => {
                let vars = result_variables(query, clause);
                let result = self.graph.add(Operator::Result(ResultForm::Select(vars)));
                self.compile_solutions(query, Some(clause), Cursor::new(result, 0), &None)?;
            }
            QueryForm::Construct(template) => {
                let result = self.graph.add(Operator::Result(ResultForm::Construct));
                let quads = template
                    .iter()
                    .cloned()
                    .map(crate::ast::QuadPattern::default_graph)
                    .collect();
                let cursor = Cursor::new(result, 0).attach(&mut self.graph, Operator::Construct(quads))?;
                self.compile_solutions(query, None, cursor, &None)?;
            }
            QueryForm::Ask => {
                let result = self.graph.add(Operator::Result(ResultForm::Ask));
                let cursor = Cursor::new(result, 0).attach(&mut self.graph, Operator::Limit(1))?;
                self.compile_where(query.pattern.as_ref(), cursor, &None)?;
            }
            QueryForm::Describe(items) => {
                let result = self.graph.add(Operator::Result(ResultForm::Describe));
                let cursor = Cursor::new(result, 0)
                    .attach(&mut self.graph, Operator::Describe(items.clone()))?;
                self.compile_solutions(query, None, cursor, &None)?;
            }
        }

        self.finish(description)
    }

    /// Check the current graph and hand it out
    pub(crate) fn finish(&mut self, dataset: DatasetDescription) -> CompileResult<CompiledPlan> {
        let mut graph = std::mem::take(&mut self.graph);
        graph.detect_cycles()?;
        graph.update_variables()?;
        log::debug!("translated plan with {} operators", graph.len());
        Ok(CompiledPlan { graph, dataset })
    }

    /// Apply a FROM / USING clause; returns the dataset to restore afterwards
    pub(crate) fn enter_dataset(
        &mut self,
        clause: Option<&DatasetClause>,
    ) -> CompileResult<Option<Box<dyn Dataset>>> {
        let Some(clause) = clause else {
            return Ok(None);
        };
        if !clause.named_graphs.is_empty() {
            self.require(self.config.capabilities.named_graphs, "FROM NAMED")?;
        }
        let restricted = self.dataset.restrict(clause);
        Ok(Some(std::mem::replace(&mut self.dataset, restricted)))
    }

    pub(crate) fn require(&self, enabled: bool, feature: &str) -> CompileResult<()> {
        if enabled {
            Ok(())
        } else {
            Err(CompileError::unsupported(format!(
                "{} is not supported by the configured evaluator",
                feature
            )))
        }
    }

    pub(crate) fn fresh_var(&mut self) -> Variable {
        let var = Variable::interim(self.next_var);
        self.next_var += 1;
        var
    }

    /// Solution modifiers, projection and the WHERE clause of a query
    fn compile_solutions(
        &mut self,
        query: &Query,
        select: Option<&SelectClause>,
        cursor: Cursor,
        graph_constraint: &Option<Item>,
    ) -> CompileResult<()> {
        let modifiers = &query.modifiers;
        let mut aggregates: Vec<(Variable, AggregateExpression)> = Vec::new();

        let mut projected: Vec<Variable> = Vec::new();
        let mut plain_projected: Vec<Variable> = Vec::new();
        let mut select_binds: Vec<ComputedBinding> = Vec::new();
        let wildcard = match select.map(|s| &s.items) {
            Some(SelectItems::Explicit(items)) => {
                for item in items {
                    match item {
                        SelectItem::Variable(v) => {
                            projected.push(v.clone());
                            plain_projected.push(v.clone());
                        }
                        SelectItem::Expression { expression, alias } => {
                            let expression = self.extract_aggregates(expression, &mut aggregates);
                            projected.push(alias.clone());
                            select_binds.push(ComputedBinding::new(alias.clone(), expression));
                        }
                    }
                }
                false
            }
            _ => true,
        };

        let having: Vec<Expression> = modifiers
            .having
            .iter()
            .map(|h| self.extract_aggregates(h, &mut aggregates))
            .collect();
        let order_by: Vec<OrderCondition> = modifiers
            .order_by
            .iter()
            .map(|c| OrderCondition {
                expression: self.extract_aggregates(&c.expression, &mut aggregates),
                direction: c.direction,
            })
            .collect();

        let mut keys: Vec<Variable> = Vec::new();
        let mut group_binds: Vec<ComputedBinding> = Vec::new();
        for condition in &modifiers.group_by {
            match condition {
                GroupCondition::Variable(v) => keys.push(v.clone()),
                GroupCondition::Expression { expression, alias } => {
                    let var = match alias {
                        Some(alias) => alias.clone(),
                        None => self.fresh_var(),
                    };
                    group_binds.push(ComputedBinding::new(var.clone(), expression.clone()));
                    keys.push(var);
                }
            }
        }

        let grouping = !modifiers.group_by.is_empty() || !aggregates.is_empty();
        if grouping {
            validate_grouping(select.is_some() && wildcard, &plain_projected, &select_binds, &keys, &aggregates)?;
        }

        let select_binds = sort_bindings(select_binds)?;
        let group_binds = sort_bindings(group_binds)?;

        let mut cursor = cursor;
        if let Some(limit) = modifiers.limit {
            cursor = cursor.attach(&mut self.graph, Operator::Limit(limit))?;
        }
        if let Some(offset) = modifiers.offset {
            cursor = cursor.attach(&mut self.graph, Operator::Offset(offset))?;
        }
        if let Some(clause) = select {
            if clause.distinct != DistinctQualifier::All {
                cursor = cursor.attach(&mut self.graph, Operator::Distinct)?;
            }
            if !wildcard {
                cursor = cursor.attach(&mut self.graph, Operator::projection(projected))?;
            }
        }
        if !order_by.is_empty() {
            cursor = cursor.attach(&mut self.graph, Operator::Sort(order_by))?;
        }
        for binding in select_binds.into_iter().rev() {
            cursor = cursor.attach(
                &mut self.graph,
                Operator::bind(binding.variable, binding.expression),
            )?;
        }
        let having_scope: VarSet = keys
            .iter()
            .cloned()
            .chain(aggregates.iter().map(|(v, _)| v.clone()))
            .collect();
        for condition in &having {
            cursor = self.attach_filter(condition, cursor, &having_scope, graph_constraint)?;
        }
        if grouping {
            cursor = cursor.attach(
                &mut self.graph,
                Operator::Group(GroupOperator { keys, aggregates }),
            )?;
        }
        for binding in group_binds.into_iter().rev() {
            cursor = cursor.attach(
                &mut self.graph,
                Operator::bind(binding.variable, binding.expression),
            )?;
        }

        self.compile_where(query.pattern.as_ref(), cursor, graph_constraint)
    }

    /// Replace aggregates by fresh variables, collecting the aggregate definitions
    fn extract_aggregates(
        &mut self,
        expression: &Expression,
        aggregates: &mut Vec<(Variable, AggregateExpression)>,
    ) -> Expression {
        let next_var = &mut self.next_var;
        expression.map_aggregates(&mut |aggregate: &AggregateExpression| {
            if let Some((var, _)) = aggregates.iter().find(|(_, a)| a == aggregate) {
                return Expression::Variable(var.clone());
            }
            let var = Variable::interim(*next_var);
            *next_var += 1;
            aggregates.push((var.clone(), aggregate.clone()));
            Expression::Variable(var)
        })
    }

    fn compile_where(
        &mut self,
        pattern: Option<&GroupGraphPattern>,
        cursor: Cursor,
        graph_constraint: &Option<Item>,
    ) -> CompileResult<()> {
        match pattern {
            Some(pattern) => self.compile_group(pattern, cursor, graph_constraint),
            None => {
                let probe = self.factory.create_empty_index_scan(graph_constraint.clone());
                cursor.attach_source(&mut self.graph, probe)?;
                Ok(())
            }
        }
    }

    /// Compile a group graph pattern into `cursor`
    pub(crate) fn compile_group(
        &mut self,
        group: &GroupGraphPattern,
        cursor: Cursor,
        graph_constraint: &Option<Item>,
    ) -> CompileResult<()> {
        let scope = group.in_scope_variables();
        let mut cursor = cursor;
        for element in &group.elements {
            if let GroupElement::Filter(expression) = element {
                cursor = self.attach_filter(expression, cursor, &scope, graph_constraint)?;
            }
        }
        let body: Vec<&GroupElement> = group
            .elements
            .iter()
            .filter(|e| !matches!(e, GroupElement::Filter(_)))
            .collect();
        self.compile_sequence(&body, cursor, graph_constraint)
    }

    /// Elements of a group without its filters; the last OPTIONAL / MINUS /
    /// BIND closes everything before it into one partner
    fn compile_sequence(
        &mut self,
        elements: &[&GroupElement],
        cursor: Cursor,
        graph_constraint: &Option<Item>,
    ) -> CompileResult<()> {
        let closer = elements.iter().rposition(|e| {
            matches!(
                e,
                GroupElement::Optional(_) | GroupElement::Minus(_) | GroupElement::Bind { .. }
            )
        });

        let mut partners = Vec::new();
        let rest = match closer {
            Some(index) => {
                partners.push(Partner::Closed(elements[index], &elements[..index]));
                &elements[index + 1..]
            }
            None => elements,
        };

        let rule_mode = self.rules.is_some();
        let mut triples = Vec::new();
        let mut others = Vec::new();
        for element in rest {
            match element {
                GroupElement::Triple(t) if !rule_mode => triples.push(t.clone()),
                GroupElement::Path(p) if !rule_mode && p.path.as_predicate().is_some() => {
                    if let Some(iri) = p.path.as_predicate() {
                        triples.push(TriplePattern::new(
                            p.subject.clone(),
                            Item::Lit(iri.clone()),
                            p.object.clone(),
                        ));
                    }
                }
                other => others.push(Partner::Element(*other)),
            }
        }
        if !triples.is_empty() {
            partners.push(Partner::Triples(triples));
        }
        partners.extend(others);

        match partners.len() {
            0 => {
                let probe = self.factory.create_empty_index_scan(graph_constraint.clone());
                cursor.attach_source(&mut self.graph, probe)?;
                Ok(())
            }
            1 => {
                let partner = partners.remove(0);
                self.compile_partner(partner, cursor, graph_constraint)
            }
            k => {
                log::trace!("group segment with {} join partners", k);
                let join = cursor.attach(&mut self.graph, Operator::Join)?;
                for (operand, partner) in partners.into_iter().enumerate() {
                    self.compile_partner(partner, join.at(operand), graph_constraint)?;
                }
                Ok(())
            }
        }
    }

    fn compile_partner(
        &mut self,
        partner: Partner<'_>,
        cursor: Cursor,
        graph_constraint: &Option<Item>,
    ) -> CompileResult<()> {
        match partner {
            Partner::Triples(patterns) => {
                let scan = self
                    .factory
                    .create_index_scan(patterns, graph_constraint.clone());
                cursor.attach_source(&mut self.graph, scan)?;
                Ok(())
            }
            Partner::Element(element) => self.compile_element(element, cursor, graph_constraint),
            Partner::Closed(closer, before) => match closer {
                GroupElement::Optional(inner) | GroupElement::Minus(inner) => {
                    let operator = if matches!(closer, GroupElement::Optional(_)) {
                        Operator::Optional
                    } else {
                        Operator::Minus
                    };
                    let node = cursor.attach(&mut self.graph, operator)?;
                    self.compile_sequence(before, node.at(0), graph_constraint)?;
                    self.compile_group(inner, node.at(1), graph_constraint)
                }
                GroupElement::Bind {
                    expression,
                    variable,
                } => {
                    let in_scope: VarSet = GroupGraphPattern::new(before.iter().map(|e| (*e).clone()).collect())
                        .in_scope_variables();
                    if in_scope.contains(variable) {
                        return Err(CompileError::malformed(format!(
                            "BIND target {} is already in scope",
                            variable
                        )));
                    }
                    if expression.contains_exists() {
                        return Err(CompileError::unsupported("EXISTS inside BIND"));
                    }
                    let node = cursor.attach(
                        &mut self.graph,
                        Operator::bind(variable.clone(), expression.clone()),
                    )?;
                    self.compile_sequence(before, node, graph_constraint)
                }
                other => Err(CompileError::internal(format!(
                    "{:?} cannot close a group segment",
                    other
                ))),
            },
        }
    }

    fn compile_element(
        &mut self,
        element: &GroupElement,
        cursor: Cursor,
        graph_constraint: &Option<Item>,
    ) -> CompileResult<()> {
        match element {
            GroupElement::Triple(pattern) => self.compile_rule_triple(pattern, cursor, graph_constraint),
            GroupElement::Path(path) => {
                if let (Some(iri), true) = (path.path.as_predicate(), self.rules.is_some()) {
                    let pattern =
                        TriplePattern::new(path.subject.clone(), Item::Lit(iri.clone()), path.object.clone());
                    return self.compile_rule_triple(&pattern, cursor, graph_constraint);
                }
                let output = PathCompiler::new(
                    &mut self.graph,
                    self.factory,
                    self.config,
                    &mut self.next_var,
                    graph_constraint.clone(),
                )
                .compile(&path.path, &path.subject, &path.object)?;
                cursor.feed(&mut self.graph, output)
            }
            GroupElement::Group(group) => self.compile_group(group, cursor, graph_constraint),
            GroupElement::Union(branches) => match branches.len() {
                0 => {
                    let probe = self.factory.create_empty_index_scan(graph_constraint.clone());
                    cursor.attach_source(&mut self.graph, probe)?;
                    Ok(())
                }
                1 => self.compile_group(&branches[0], cursor, graph_constraint),
                _ => {
                    let union = cursor.attach(&mut self.graph, Operator::Union)?;
                    for (operand, branch) in branches.iter().enumerate() {
                        self.compile_group(branch, union.at(operand), graph_constraint)?;
                    }
                    Ok(())
                }
            },
            GroupElement::Graph { name, pattern } => {
                self.require(self.config.capabilities.named_graphs, "GRAPH")?;
                self.compile_group(pattern, cursor, &Some(name.clone()))
            }
            GroupElement::SubSelect(query) => {
                let QueryForm::Select(clause) = &query.form else {
                    return Err(CompileError::malformed("a sub-query must be a SELECT"));
                };
                if query.dataset.is_some() {
                    return Err(CompileError::malformed("a sub-query cannot carry FROM clauses"));
                }
                self.compile_solutions(query, Some(clause), cursor, graph_constraint)
            }
            GroupElement::Service {
                endpoint,
                pattern,
                silent,
            } => {
                self.require(self.config.capabilities.federation, "SERVICE")?;
                cursor.attach_source(
                    &mut self.graph,
                    Operator::Service {
                        endpoint: endpoint.clone(),
                        pattern: pattern.clone(),
                        silent: *silent,
                    },
                )?;
                Ok(())
            }
            GroupElement::Window { window, pattern } => {
                self.require(self.config.capabilities.streaming, "stream windows")?;
                let inner = cursor.attach(&mut self.graph, Operator::Window(window.clone()))?;
                self.compile_group(pattern, inner, graph_constraint)
            }
            GroupElement::Predicate(atom) => {
                let Some(wiring) = self.rules.as_mut() else {
                    return Err(CompileError::malformed(
                        "predicate atoms are only allowed in rule bodies",
                    ));
                };
                let id = self.graph.add(Operator::PredicatePattern(atom.clone()));
                wiring.predicate_patterns.push(id);
                cursor.feed(&mut self.graph, id)
            }
            GroupElement::Optional(_)
            | GroupElement::Minus(_)
            | GroupElement::Bind { .. }
            | GroupElement::Filter(_) => Err(CompileError::internal(
                "segment closers and filters are handled by the group compiler",
            )),
        }
    }

    /// Plain triple outside rule bodies, or a rule-body triple that also
    /// matches derived triples
    fn compile_rule_triple(
        &mut self,
        pattern: &TriplePattern,
        cursor: Cursor,
        graph_constraint: &Option<Item>,
    ) -> CompileResult<()> {
        let scan = self
            .factory
            .create_index_scan(vec![pattern.clone()], graph_constraint.clone());
        if self.rules.is_none() {
            cursor.attach_source(&mut self.graph, scan)?;
            return Ok(());
        }
        let union = cursor.attach(&mut self.graph, Operator::Union)?;
        union.attach_source(&mut self.graph, scan)?;
        let matcher = self.graph.add(Operator::TriplePatternMatch(pattern.clone()));
        union.at(1).feed(&mut self.graph, matcher)?;
        if let Some(wiring) = self.rules.as_mut() {
            wiring.triple_matches.push(matcher);
        }
        Ok(())
    }

    /// Attach a filter, building nested plans for its EXISTS patterns
    pub(crate) fn attach_filter(
        &mut self,
        expression: &Expression,
        cursor: Cursor,
        scope: &VarSet,
        graph_constraint: &Option<Item>,
    ) -> CompileResult<Cursor> {
        let mut exists = BTreeMap::new();
        for (position, pattern) in expression.exists_patterns().into_iter().enumerate() {
            exists.insert(position, self.compile_exists(pattern, graph_constraint)?);
        }
        let binding = self.evaluator.bind_filter_expression(expression, scope)?;
        cursor.attach(
            &mut self.graph,
            Operator::Filter(FilterOperator {
                expression: expression.clone(),
                exists,
                binding: Some(binding),
            }),
        )
    }

    /// Independent plan for an EXISTS pattern, built over a forked dataset
    fn compile_exists(
        &mut self,
        pattern: &GroupGraphPattern,
        graph_constraint: &Option<Item>,
    ) -> CompileResult<OperatorGraph> {
        log::debug!("building nested plan for EXISTS pattern");
        let mut nested = Translator::new(self.factory, self.dataset.fork(), self.evaluator, self.config);
        nested.next_var = self.next_var;

        let mut vars: VarSet = pattern.in_scope_variables();
        if let Some(Item::Var(g)) = graph_constraint {
            vars.insert(g.clone());
        }
        let result = nested
            .graph
            .add(Operator::Result(ResultForm::Select(vars.into_iter().collect())));
        nested.compile_group(pattern, Cursor::new(result, 0), graph_constraint)?;
        self.next_var = nested.next_var;

        let mut graph = nested.graph;
        graph.detect_cycles()?;
        graph.update_variables()?;
        Ok(graph)
    }
}

fn form_name(form: &QueryForm) -> &'static str {
    match form {
        QueryForm::Select(_) => "SELECT",
        QueryForm::Construct(_) => "CONSTRUCT",
        QueryForm::Ask => "ASK",
        QueryForm::Describe(_) => "DESCRIBE",
    }
}

/// Output variables of a SELECT, in projection order
fn result_variables(query: &Query, clause: &SelectClause) -> Vec<Variable> {
    match &clause.items {
        SelectItems::Explicit(items) => items
            .iter()
            .map(|item| match item {
                SelectItem::Variable(v) => v.clone(),
                SelectItem::Expression { alias, .. } => alias.clone(),
            })
            .collect(),
        SelectItems::Wildcard => query
            .pattern
            .as_ref()
            .map(GroupGraphPattern::in_scope_variables)
            .unwrap_or_default()
            .into_iter()
            .filter(|v| !v.is_interim())
            .collect(),
    }
}

/// Every projected variable of a grouped query must be a key, an aggregate or
/// an earlier computed alias
fn validate_grouping(
    wildcard: bool,
    plain_projected: &[Variable],
    select_binds: &[ComputedBinding],
    keys: &[Variable],
    aggregates: &[(Variable, AggregateExpression)],
) -> CompileResult<()> {
    if wildcard {
        return Err(CompileError::malformed("SELECT * cannot be combined with GROUP BY"));
    }
    for var in plain_projected {
        if !keys.contains(var) {
            return Err(CompileError::malformed(format!(
                "variable {} is not bound by GROUP BY",
                var
            )));
        }
    }
    let mut available: VarSet = keys.iter().cloned().collect();
    available.extend(aggregates.iter().map(|(v, _)| v.clone()));
    available.extend(select_binds.iter().map(|b| b.variable.clone()));
    for binding in select_binds {
        if let Some(var) = binding
            .expression
            .variables()
            .into_iter()
            .find(|v| !available.contains(v))
        {
            return Err(CompileError::malformed(format!(
                "variable {} in the expression for {} is not bound by GROUP BY",
                var, binding.variable
            )));
        }
    }
    Ok(())
}
