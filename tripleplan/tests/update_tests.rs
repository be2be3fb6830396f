#[path = "testutils/mod.rs"]
mod testutils;

use testutils::sample_data_generator::{ex, node, people, term, tp};
use testutils::test_fixture::TestFixture;
use tripleplan::ast::{
    Document, Expression, GraphTarget, GroupElement, GroupGraphPattern, ModifyOperation,
    Operator as Op, QuadPattern, Update, UpdateOperation,
};
use tripleplan::plan::ResultForm;
use tripleplan::types::{Item, Literal, Quad, Triple, TriplePattern};
use tripleplan::{CompileError, CompilerConfig, EvaluatorCapabilities, Operator, OperatorKind};

fn update(operations: Vec<UpdateOperation>) -> Update {
    Update { operations }
}

fn data(triples: &[TriplePattern]) -> Vec<QuadPattern> {
    triples.iter().cloned().map(QuadPattern::default_graph).collect()
}

fn people_fixture() -> TestFixture {
    TestFixture::with_triples(people())
}

fn contains(fixture: &TestFixture, graph: Option<Literal>, s: Literal, p: &str, o: Literal) -> bool {
    fixture
        .store()
        .contains(&Quad::new(graph, Triple::new(s, ex(p), o)))
}

#[test]
fn test_insert_data_is_visible_to_queries() {
    let mut fixture = people_fixture();
    let before = fixture.store().len();
    let changed = fixture.assert_update_succeeds(&update(vec![UpdateOperation::InsertData(data(&[
        tp("n1", "knows", "n2"),
        tp("n2", "knows", "n3"),
    ]))]));
    assert_eq!(changed, 2);
    assert_eq!(fixture.store().len(), before + 2);

    let query = tripleplan::ast::Query::select_all(GroupGraphPattern::triples(vec![tp("?a", "knows", "?b")]));
    assert_eq!(fixture.pairs(&query, "a", "b").len(), 2);
}

#[test]
fn test_data_forms_reject_variables_and_blank_nodes() {
    let fixture = people_fixture();
    let with_variable = Document::Update(update(vec![UpdateOperation::InsertData(data(&[tp(
        "?x", "knows", "n2",
    )]))]));
    assert!(matches!(
        fixture.assert_compile_fails(&with_variable),
        CompileError::MalformedQuery(_)
    ));

    let blank = TriplePattern::new(Item::Lit(Literal::blank("b0")), term("knows"), term("n2"));
    let with_blank = Document::Update(update(vec![UpdateOperation::DeleteData(data(&[blank]))]));
    assert!(matches!(
        fixture.assert_compile_fails(&with_blank),
        CompileError::MalformedQuery(_)
    ));
}

#[test]
fn test_delete_data_removes_listed_quads() {
    let mut fixture = people_fixture();
    let changed = fixture.assert_update_succeeds(&update(vec![UpdateOperation::DeleteData(data(&[
        tp("n1", "dept", "d1"),
        tp("n1", "dept", "d9"),
    ]))]));
    assert_eq!(changed, 1);
    assert!(!contains(&fixture, None, node(1), "dept", ex("d1")));
    assert!(contains(&fixture, None, node(2), "dept", ex("d1")));
}

#[test]
fn test_delete_where_uses_template_as_pattern() {
    let mut fixture = people_fixture();
    let plans = fixture
        .compile(&Document::Update(update(vec![UpdateOperation::DeleteWhere(data(&[tp(
            "?x", "email", "?e",
        )]))])))
        .expect("delete where compiles");
    assert_eq!(plans.len(), 1);
    assert_eq!(plans[0].graph.count(OperatorKind::Delete), 1);
    assert_eq!(plans[0].graph.count(OperatorKind::IndexScan), 1);

    let changed = fixture.assert_update_succeeds(&update(vec![UpdateOperation::DeleteWhere(data(&[
        tp("?x", "email", "?e"),
    ]))]));
    assert_eq!(changed, 1);
    assert_eq!(fixture.store().len(), people().len() - 1);
}

#[test]
fn test_modify_rewrites_matched_values() {
    let mut fixture = people_fixture();
    let modify = ModifyOperation {
        with: None,
        delete: data(&[tp("?x", "age", "?a")]),
        insert: data(&[tp("?x", "age", "?b")]),
        using: None,
        pattern: GroupGraphPattern::new(vec![
            GroupElement::Triple(tp("?x", "age", "?a")),
            GroupElement::Bind {
                expression: Expression::binary(
                    Expression::var("a"),
                    Op::Plus,
                    Expression::constant(Literal::integer(1)),
                ),
                variable: tripleplan::types::Variable::new("b"),
            },
        ]),
    };

    let plans = fixture
        .compile(&Document::Update(update(vec![UpdateOperation::Modify(modify.clone())])))
        .expect("modify compiles");
    let graph = &plans[0].graph;
    assert_eq!(graph.count(OperatorKind::Delete), 1);
    assert_eq!(graph.count(OperatorKind::Insert), 1);
    assert_eq!(graph.count(OperatorKind::Construct), 2);

    let changed = fixture.assert_update_succeeds(&update(vec![UpdateOperation::Modify(modify)]));
    assert_eq!(changed, 6);
    assert!(contains(&fixture, None, node(1), "age", Literal::integer(26)));
    assert!(!contains(&fixture, None, node(1), "age", Literal::integer(25)));
    assert!(contains(&fixture, None, node(3), "age", Literal::integer(46)));
}

#[test]
fn test_modify_with_graph_reads_and_writes_that_graph() {
    let mut fixture = people_fixture();
    fixture
        .store_mut()
        .insert(Quad::new(Some(ex("g1")), Triple::new(node(1), ex("age"), Literal::integer(30))));

    let changed = fixture.assert_update_succeeds(&update(vec![UpdateOperation::Modify(ModifyOperation {
        with: Some(ex("g1")),
        delete: vec![],
        insert: data(&[tp("?x", "checked", "?a")]),
        using: None,
        pattern: GroupGraphPattern::triples(vec![tp("?x", "age", "?a")]),
    })]));
    assert_eq!(changed, 1);
    assert!(contains(&fixture, Some(ex("g1")), node(1), "checked", Literal::integer(30)));
    assert!(!contains(&fixture, None, node(1), "checked", Literal::integer(25)));
}

#[test]
fn test_create_twice_fails_unless_silent() {
    let mut fixture = TestFixture::empty();
    let create = |silent| UpdateOperation::Create {
        graph: ex("g9"),
        silent,
    };
    fixture.assert_update_succeeds(&update(vec![create(false)]));
    assert!(fixture.store().named_graphs().contains(&ex("g9")));

    assert!(fixture.update(&update(vec![create(false)])).is_err());
    assert_eq!(fixture.assert_update_succeeds(&update(vec![create(true)])), 0);
}

#[test]
fn test_drop_of_missing_graph_fails_unless_silent() {
    let mut fixture = people_fixture();
    let drop = |silent| UpdateOperation::Drop {
        target: GraphTarget::Named(ex("missing")),
        silent,
    };
    assert!(fixture.update(&update(vec![drop(false)])).is_err());
    assert_eq!(fixture.assert_update_succeeds(&update(vec![drop(true)])), 0);
    assert_eq!(fixture.store().len(), people().len());
}

#[test]
fn test_clear_default_keeps_named_graphs() {
    let mut fixture = people_fixture();
    let named = Quad::new(Some(ex("g1")), Triple::new(node(1), ex("p"), node(2)));
    fixture.store_mut().insert(named.clone());

    let changed = fixture.assert_update_succeeds(&update(vec![UpdateOperation::Clear {
        target: GraphTarget::Default,
        silent: false,
    }]));
    assert_eq!(changed, people().len());
    assert_eq!(fixture.store().len(), 1);
    assert!(fixture.store().contains(&named));
    assert!(fixture.store().named_graphs().contains(&ex("g1")));

    fixture.assert_update_succeeds(&update(vec![UpdateOperation::Drop {
        target: GraphTarget::All,
        silent: false,
    }]));
    assert!(fixture.store().is_empty());
    assert!(fixture.store().named_graphs().is_empty());
}

#[test]
fn test_load_is_not_supported_by_the_memory_store() {
    let mut fixture = TestFixture::empty();
    let load = |silent| UpdateOperation::Load {
        source: Literal::iri("http://example.org/data.ttl"),
        destination: None,
        silent,
    };
    let err = fixture.update(&update(vec![load(false)])).unwrap_err();
    assert!(matches!(err, CompileError::UnsupportedFeature(_)));
    assert_eq!(fixture.assert_update_succeeds(&update(vec![load(true)])), 0);
}

#[test]
fn test_graph_management_needs_named_graph_support() {
    let fixture = TestFixture::empty().with_config(CompilerConfig {
        capabilities: EvaluatorCapabilities::local_only(),
        ..CompilerConfig::default()
    });
    for operation in [
        UpdateOperation::Create {
            graph: ex("g1"),
            silent: false,
        },
        UpdateOperation::Clear {
            target: GraphTarget::AllNamed,
            silent: false,
        },
        UpdateOperation::InsertData(vec![QuadPattern::in_graph(
            Item::Lit(ex("g1")),
            tp("n1", "p", "n2"),
        )]),
    ] {
        let err = fixture.assert_compile_fails(&Document::Update(update(vec![operation])));
        assert!(matches!(err, CompileError::UnsupportedFeature(_)));
    }

    let plans = fixture
        .compile(&Document::Update(update(vec![UpdateOperation::Clear {
            target: GraphTarget::Default,
            silent: false,
        }])))
        .expect("clearing the default graph needs no named graphs");
    assert_eq!(plans.len(), 1);
}

#[test]
fn test_each_operation_gets_its_own_plan() {
    let fixture = people_fixture();
    let plans = fixture
        .compile(&Document::Update(update(vec![
            UpdateOperation::InsertData(data(&[tp("n1", "knows", "n2")])),
            UpdateOperation::DeleteWhere(data(&[tp("?x", "email", "?e")])),
            UpdateOperation::Clear {
                target: GraphTarget::Default,
                silent: true,
            },
        ])))
        .expect("update compiles");
    assert_eq!(plans.len(), 3);
    for plan in &plans {
        let results = plan.graph.results();
        assert_eq!(results.len(), 1);
        assert!(matches!(
            plan.graph.operator(results[0]),
            Ok(Operator::Result(ResultForm::Update))
        ));
    }
}
