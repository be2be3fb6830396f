#[path = "testutils/mod.rs"]
mod testutils;

use std::collections::BTreeSet;

use testutils::sample_data_generator::{edges, ex, node, term, tp};
use testutils::test_fixture::{TestFixture, DATASET};
use tripleplan::ast::{
    Document, GroupElement, GroupGraphPattern, InferenceRule, PredicateAtom, RuleHead, RuleOutput,
    RuleProgram,
};
use tripleplan::memory::{Fact, MemoryDataset, MemoryEvaluator, MemoryIndexScanFactory};
use tripleplan::rewrite::RewriteStats;
use tripleplan::types::Triple;
use tripleplan::{CompileError, CompiledPlan, Compiler, CompilerConfig, OperatorKind};

fn family() -> TestFixture {
    TestFixture::with_triples(edges(&[
        (1, "parent", 2),
        (2, "parent", 3),
        (3, "parent", 4),
        (5, "parent", 6),
    ]))
}

fn ancestor_pairs() -> BTreeSet<(u32, u32)> {
    BTreeSet::from([(1, 2), (1, 3), (1, 4), (2, 3), (2, 4), (3, 4), (5, 6)])
}

fn atom(name: &str, arguments: &[&str]) -> PredicateAtom {
    PredicateAtom {
        name: ex(name),
        arguments: arguments.iter().map(|a| term(a)).collect(),
    }
}

/// Transitive closure of `parent` as derived `ancestor` triples
fn triple_program() -> RuleProgram {
    RuleProgram {
        rules: vec![
            InferenceRule {
                head: vec![RuleHead::Triple(tp("?x", "ancestor", "?y"))],
                body: GroupGraphPattern::triples(vec![tp("?x", "parent", "?y")]),
            },
            InferenceRule {
                head: vec![RuleHead::Triple(tp("?x", "ancestor", "?z"))],
                body: GroupGraphPattern::triples(vec![tp("?x", "parent", "?y"), tp("?y", "ancestor", "?z")]),
            },
        ],
        output: RuleOutput {
            triples: true,
            predicates: false,
        },
    }
}

/// The same closure as `ancestor(x, y)` facts
fn predicate_program(output: RuleOutput) -> RuleProgram {
    RuleProgram {
        rules: vec![
            InferenceRule {
                head: vec![RuleHead::Predicate(atom("ancestor", &["?x", "?y"]))],
                body: GroupGraphPattern::triples(vec![tp("?x", "parent", "?y")]),
            },
            InferenceRule {
                head: vec![RuleHead::Predicate(atom("ancestor", &["?x", "?z"]))],
                body: GroupGraphPattern::new(vec![
                    GroupElement::Triple(tp("?x", "parent", "?y")),
                    GroupElement::Predicate(atom("ancestor", &["?y", "?z"])),
                ]),
            },
            InferenceRule {
                head: vec![RuleHead::Triple(tp("?x", "ancestorOf", "?y"))],
                body: GroupGraphPattern::new(vec![GroupElement::Predicate(atom("ancestor", &["?x", "?y"]))]),
            },
        ],
        output,
    }
}

fn derive(fixture: &TestFixture, program: &RuleProgram) -> tripleplan::memory::Evaluation {
    let plans = fixture
        .compile(&Document::Rules(program.clone()))
        .expect("rule program compiles");
    assert_eq!(plans.len(), 1);
    fixture.run(&plans[0])
}

fn expected_triples(predicate: &str) -> BTreeSet<Triple> {
    ancestor_pairs()
        .into_iter()
        .map(|(a, b)| Triple::new(node(a), ex(predicate), node(b)))
        .collect()
}

#[test]
fn test_recursive_rules_derive_closure() {
    let fixture = family();
    let program = triple_program();

    let translated = derive(&fixture.without_rewrite(), &program);
    assert_eq!(translated.triples(), expected_triples("ancestor"));
    assert!(translated.iterations > 1);

    let rewritten = derive(&fixture, &program);
    assert_eq!(rewritten.triples(), expected_triples("ancestor"));
    assert!(rewritten.facts.is_empty());
}

#[test]
fn test_translated_rules_link_heads_to_matchers_by_feedback() {
    let fixture = family().without_rewrite();
    let plans = fixture
        .compile(&Document::Rules(triple_program()))
        .expect("rule program compiles");
    let graph = &plans[0].graph;

    let generates = graph.find(OperatorKind::Generate);
    let matchers = graph.find(OperatorKind::TriplePatternMatch);
    assert_eq!(generates.len(), 2);
    assert_eq!(matchers.len(), 3);
    for generate in generates {
        let feedback: Vec<_> = graph
            .succeeding(generate)
            .iter()
            .filter(|edge| edge.feedback)
            .map(|edge| edge.target)
            .collect();
        assert_eq!(feedback.len(), matchers.len());
    }
    graph.detect_cycles().expect("feedback edges break the recursion");
}

#[test]
fn test_specialization_replaces_matchers() {
    let fixture = family();
    let plans = fixture
        .compile(&Document::Rules(triple_program()))
        .expect("rule program compiles");
    let graph = &plans[0].graph;
    // every head was either unified into its matcher or pruned
    assert_eq!(graph.count(OperatorKind::TriplePatternMatch), 0);
    assert_eq!(graph.count(OperatorKind::Generate), 2);
    graph.detect_cycles().expect("specialized loop keeps a feedback edge");
}

#[test]
fn test_predicate_facts() {
    let fixture = family();
    let output = RuleOutput {
        triples: false,
        predicates: true,
    };
    let expected: BTreeSet<Fact> = ancestor_pairs()
        .into_iter()
        .map(|(a, b)| Fact {
            name: ex("ancestor"),
            arguments: vec![node(a), node(b)],
        })
        .collect();

    for fixture in [fixture.without_rewrite(), fixture] {
        let evaluation = derive(&fixture, &predicate_program(output));
        let facts: BTreeSet<Fact> = evaluation.facts.into_iter().collect();
        assert_eq!(facts, expected);
        assert!(evaluation.quads.is_empty());
    }
}

#[test]
fn test_triples_derived_through_predicates() {
    let fixture = family();
    let output = RuleOutput {
        triples: true,
        predicates: false,
    };
    for fixture in [fixture.without_rewrite(), fixture] {
        let evaluation = derive(&fixture, &predicate_program(output));
        assert_eq!(evaluation.triples(), expected_triples("ancestorOf"));
        assert!(evaluation.facts.is_empty());
    }
}

#[test]
fn test_rules_can_read_derived_and_stored_triples() {
    // one stored ancestor triple seeds the recursion from the other side
    let mut fixture = family();
    fixture
        .store_mut()
        .insert_triple(node(4), ex("ancestor"), node(7));
    let evaluation = derive(&fixture, &triple_program());
    let derived = evaluation.triples();
    assert!(derived.contains(&Triple::new(node(1), ex("ancestor"), node(7))));
    assert!(derived.contains(&Triple::new(node(3), ex("ancestor"), node(7))));
    assert!(!derived.contains(&Triple::new(node(4), ex("ancestor"), node(7))));

    let translated = derive(&fixture.without_rewrite(), &triple_program());
    assert_eq!(translated.triples(), derived);
}

#[test]
fn test_head_constants_prune_unmatched_bodies() {
    let fixture = family();
    let program = RuleProgram {
        rules: vec![
            InferenceRule {
                head: vec![RuleHead::Triple(tp("?x", "knows", "?y"))],
                body: GroupGraphPattern::triples(vec![tp("?x", "parent", "?y")]),
            },
            InferenceRule {
                head: vec![RuleHead::Triple(tp("?x", "relative", "?y"))],
                body: GroupGraphPattern::triples(vec![tp("?x", "knows", "n1"), tp("?y", "parent", "?x")]),
            },
        ],
        output: RuleOutput {
            triples: true,
            predicates: false,
        },
    };
    let translated = derive(&fixture.without_rewrite(), &program).triples();
    let rewritten = derive(&fixture, &program).triples();
    assert_eq!(translated, rewritten);
    assert!(rewritten.contains(&Triple::new(node(1), ex("knows"), node(2))));
    assert!(!rewritten.iter().any(|t| t.predicate == ex("relative")));
}

#[test]
fn test_rule_without_head_is_malformed() {
    let fixture = family();
    let program = RuleProgram {
        rules: vec![InferenceRule {
            head: vec![],
            body: GroupGraphPattern::triples(vec![tp("?x", "parent", "?y")]),
        }],
        output: RuleOutput::default(),
    };
    let err = fixture.assert_compile_fails(&Document::Rules(program));
    assert!(matches!(err, CompileError::MalformedQuery(_)));
}

/// Translate without rewriting, then rewrite and report the applied rules
fn translate_and_optimize(fixture: &TestFixture, program: &RuleProgram) -> (CompiledPlan, CompiledPlan, RewriteStats) {
    let factory = MemoryIndexScanFactory::new(DATASET, fixture.store());
    let evaluator = MemoryEvaluator::new(DATASET);
    let plain = Compiler::new(&factory, &evaluator, CompilerConfig::default().without_rewrite());
    let mut plans = plain
        .compile(&Document::Rules(program.clone()), Box::new(MemoryDataset::new(DATASET)))
        .expect("rule program compiles");
    let translated = plans.remove(0);

    let compiler = Compiler::new(&factory, &evaluator, CompilerConfig::default());
    let mut rewritten = translated.clone();
    let stats = compiler.optimize(&mut rewritten).expect("plan rewrites");
    (translated, rewritten, stats)
}

/// `related(x, y)` and `{x relatedTo y}` both derived from one `ancestor` body
fn shared_body_program() -> RuleProgram {
    let mut program = predicate_program(RuleOutput {
        triples: true,
        predicates: true,
    });
    program.rules.truncate(2);
    program.rules.push(InferenceRule {
        head: vec![
            RuleHead::Predicate(atom("related", &["?x", "?y"])),
            RuleHead::Triple(tp("?x", "relatedTo", "?y")),
        ],
        body: GroupGraphPattern::new(vec![GroupElement::Predicate(atom("ancestor", &["?x", "?y"]))]),
    });
    program
}

#[test]
fn test_shared_predicate_body_is_split_per_head() {
    let fixture = family();
    let (translated, rewritten, stats) = translate_and_optimize(&fixture, &shared_body_program());
    for rule in [
        "SplitPredicatePattern",
        "SplitConstructPredicate",
        "GeneratePatConstructPredicate",
        "ReplaceGeneratePat",
    ] {
        assert!(stats.count(rule) > 0, "{} never applied: {:?}", rule, stats);
    }
    assert_eq!(rewritten.graph.count(OperatorKind::PredicatePattern), 0);
    rewritten.graph.detect_cycles().expect("specialized loop keeps a feedback edge");

    let before = fixture.run(&translated);
    let after = fixture.run(&rewritten);
    let facts = |evaluation: &tripleplan::memory::Evaluation| -> BTreeSet<Fact> {
        evaluation.facts.iter().cloned().collect()
    };
    assert_eq!(facts(&after), facts(&before));
    assert_eq!(after.triples(), before.triples());

    let mut expected: BTreeSet<Fact> = BTreeSet::new();
    for (a, b) in ancestor_pairs() {
        for name in ["ancestor", "related"] {
            expected.insert(Fact {
                name: ex(name),
                arguments: vec![node(a), node(b)],
            });
        }
    }
    assert_eq!(facts(&after), expected);
    assert_eq!(after.triples(), expected_triples("relatedTo"));
}

#[test]
fn test_closure_rewrite_reports_specialization() {
    let fixture = family();
    let (translated, rewritten, stats) = translate_and_optimize(&fixture, &triple_program());
    assert!(stats.count("SplitGenerate") > 0);
    assert!(stats.count("ReplaceGeneratePat") > 0);
    assert_eq!(fixture.run(&rewritten).triples(), fixture.run(&translated).triples());
}
